use std::time::Duration;

use dca_quant::trading::cache::candle_series_cache::{CandleSeriesCache, SeriesKey};
use dca_quant::CandleItem;

fn key(inst_id: &str) -> SeriesKey {
    SeriesKey {
        inst_id: inst_id.to_string(),
        start_ts: 0,
        end_ts: 1_000_000,
        limit: None,
    }
}

fn series(price: f64, n: usize) -> Vec<CandleItem> {
    (0..n)
        .map(|i| {
            CandleItem::builder()
                .ts(i as i64 * 60_000)
                .o(price)
                .h(price)
                .l(price)
                .c(price)
                .v(1.0)
                .build()
                .unwrap()
        })
        .collect()
}

#[test]
fn test_cache_key_is_stable_per_bounds() {
    let a = key("BTC-USDT");
    let b = key("BTC-USDT");
    assert_eq!(a.cache_key(), b.cache_key());

    // 任何一个边界变了键就不同
    let mut c = key("BTC-USDT");
    c.end_ts = 2_000_000;
    assert_ne!(a.cache_key(), c.cache_key());
    let d = key("ETH-USDT");
    assert_ne!(a.cache_key(), d.cache_key());
    let mut e = key("BTC-USDT");
    e.limit = Some(100);
    assert_ne!(a.cache_key(), e.cache_key());
}

#[test]
fn test_hit_within_ttl() {
    let cache = CandleSeriesCache::new(10, Duration::from_secs(3600));
    let k = key("BTC-USDT");
    assert!(cache.get(&k).is_none());

    let data = series(100.0, 5);
    cache.insert(&k, &data);

    // TTL内两次读取返回相同数据，不需要重新加载
    let first = cache.get(&k).unwrap();
    let second = cache.get(&k).unwrap();
    assert_eq!(first, data);
    assert_eq!(second, data);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_expires_after_ttl() {
    let cache = CandleSeriesCache::new(10, Duration::from_millis(50));
    let k = key("BTC-USDT");
    cache.insert(&k, &series(100.0, 3));
    assert!(cache.get(&k).is_some());

    std::thread::sleep(Duration::from_millis(80));
    // 过期后未命中，需要重新加载
    assert!(cache.get(&k).is_none());
    assert_eq!(cache.len(), 0);
}

#[test]
fn test_defensive_copy() {
    let cache = CandleSeriesCache::new(10, Duration::from_secs(3600));
    let k = key("BTC-USDT");
    cache.insert(&k, &series(100.0, 3));

    // 调用方修改返回值不影响缓存内的数据
    let mut got = cache.get(&k).unwrap();
    got.pop();
    got.pop();
    assert_eq!(cache.get(&k).unwrap().len(), 3);
}

#[test]
fn test_lru_eviction_order() {
    let cache = CandleSeriesCache::new(2, Duration::from_secs(3600));
    let k1 = key("BTC-USDT");
    let k2 = key("ETH-USDT");
    let k3 = key("SOL-USDT");

    cache.insert(&k1, &series(1.0, 1));
    std::thread::sleep(Duration::from_millis(5));
    cache.insert(&k2, &series(2.0, 1));
    std::thread::sleep(Duration::from_millis(5));

    // 访问k1使k2成为最久未使用者
    assert!(cache.get(&k1).is_some());
    std::thread::sleep(Duration::from_millis(5));

    cache.insert(&k3, &series(3.0, 1));
    assert_eq!(cache.len(), 2);
    assert!(cache.get(&k2).is_none());
    assert!(cache.get(&k1).is_some());
    assert!(cache.get(&k3).is_some());
}

#[test]
fn test_clear_and_introspection() {
    let cache = CandleSeriesCache::new(5, Duration::from_secs(60));
    assert_eq!(cache.maxsize(), 5);
    assert_eq!(cache.ttl(), Duration::from_secs(60));
    assert!(cache.is_empty());

    cache.insert(&key("BTC-USDT"), &series(1.0, 1));
    assert_eq!(cache.len(), 1);
    cache.clear();
    assert!(cache.is_empty());
}
