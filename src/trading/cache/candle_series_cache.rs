use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::AppError;
use crate::trading::model::market::candles::CandlesModel;
use crate::CandleItem;

/// 数据集边界键：相同边界的加载请求共享同一份缓存数据
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub inst_id: String,
    pub start_ts: i64,
    pub end_ts: i64,
    pub limit: Option<u64>,
}

impl SeriesKey {
    /// 边界元组的内容哈希
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            format!(
                "{}:{}:{}:{}",
                self.inst_id,
                self.start_ts,
                self.end_ts,
                self.limit.map(|l| l.to_string()).unwrap_or_default()
            )
            .as_bytes(),
        );
        hex::encode(hasher.finalize())
    }
}

struct CacheEntry {
    series: Vec<CandleItem>,
    inserted_at: Instant,
    last_access: Instant,
}

/// 进程内有界缓存：TTL 过期 + 超容量时按 LRU 淘汰
/// （最久未访问者先出，同为最久未访问时先淘汰插入更早的）。
/// 显式维护每个条目的插入/访问时间，不依赖缓存库的隐式行为
pub struct CandleSeriesCache {
    inner: Mutex<HashMap<String, CacheEntry>>,
    maxsize: usize,
    ttl: Duration,
}

impl CandleSeriesCache {
    pub fn new(maxsize: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            maxsize: maxsize.max(1),
            ttl,
        }
    }

    /// 命中且未过期时返回数据副本，调用方的修改不会影响缓存
    pub fn get(&self, key: &SeriesKey) -> Option<Vec<CandleItem>> {
        let cache_key = key.cache_key();
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = map.get_mut(&cache_key) {
            if entry.inserted_at.elapsed() > self.ttl {
                map.remove(&cache_key);
                return None;
            }
            entry.last_access = Instant::now();
            return Some(entry.series.clone());
        }
        None
    }

    /// 存入副本。先清理过期条目，容量仍满时按 LRU 淘汰一个
    pub fn insert(&self, key: &SeriesKey, series: &[CandleItem]) {
        let cache_key = key.cache_key();
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);

        while map.len() >= self.maxsize && !map.contains_key(&cache_key) {
            let evict_key = map
                .iter()
                .min_by_key(|(_, e)| (e.last_access, e.inserted_at))
                .map(|(k, _)| k.clone());
            match evict_key {
                Some(k) => {
                    debug!("缓存容量已满，按LRU淘汰 key={}", k);
                    map.remove(&k);
                }
                None => break,
            }
        }

        let now = Instant::now();
        map.insert(
            cache_key,
            CacheEntry {
                series: series.to_vec(),
                inserted_at: now,
                last_access: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn maxsize(&self) -> usize {
        self.maxsize
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// 数据集提供者：缓存未命中时从 MySQL 按时间范围加载并解析校验。
/// 缓存为进程私有，数据库读取是唯一的共享资源且只读
pub struct CandleSeriesProvider {
    cache: CandleSeriesCache,
    model: CandlesModel,
}

impl CandleSeriesProvider {
    pub async fn new(maxsize: usize, ttl: Duration) -> Self {
        Self {
            cache: CandleSeriesCache::new(maxsize, ttl),
            model: CandlesModel::new().await,
        }
    }

    pub async fn get(&self, key: &SeriesKey) -> anyhow::Result<Vec<CandleItem>> {
        if let Some(series) = self.cache.get(key) {
            debug!(
                "从缓存获取数据: inst_id={} start={} end={}",
                key.inst_id, key.start_ts, key.end_ts
            );
            return Ok(series);
        }

        let rows = self
            .model
            .get_range(&key.inst_id, key.start_ts, key.end_ts, key.limit)
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
        let series = rows
            .iter()
            .map(|row| row.to_item())
            .collect::<Result<Vec<CandleItem>, AppError>>()?;
        if series.is_empty() {
            return Err(AppError::Validation(format!(
                "时间范围内没有历史数据: inst_id={} start={} end={}",
                key.inst_id, key.start_ts, key.end_ts
            ))
            .into());
        }

        self.cache.insert(key, &series);
        info!(
            "已缓存数据: inst_id={} start={} end={} 共{}根K线",
            key.inst_id,
            key.start_ts,
            key.end_ts,
            series.len()
        );
        Ok(series)
    }

    pub fn cache(&self) -> &CandleSeriesCache {
        &self.cache
    }
}
