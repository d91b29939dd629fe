use approx::assert_relative_eq;

use dca_quant::trading::strategy::dca_strategy::{
    idle_threshold_hours, DcaParams, DcaStrategy, TradeKind, TradeSide,
};
use dca_quant::CandleItem;

const HOUR_MS: i64 = 3_600_000;

fn candle(ts: i64, price: f64) -> CandleItem {
    CandleItem::builder()
        .ts(ts)
        .o(price)
        .h(price)
        .l(price)
        .c(price)
        .v(1.0)
        .build()
        .unwrap()
}

/// 每小时一根，价格由确定性公式生成的波动序列
fn wavy_series(n: usize) -> Vec<CandleItem> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            let price = 100.0 + 10.0 * (t / 7.0).sin() + 4.0 * (t / 3.0).cos();
            candle(i as i64 * HOUR_MS, price)
        })
        .collect()
}

fn base_params() -> DcaParams {
    DcaParams {
        inst_id: "BTC-USDT".to_string(),
        price_drop_threshold: 0.02,
        max_time_since_last_trade: 96.0,
        min_time_since_last_trade: 24.0,
        take_profit_threshold: 0.01,
        initial_capital: 100000.0,
        initial_investment_ratio: 0.1,
        initial_dca_value: 0.035,
        buy_fee_rate: 0.001,
        sell_fee_rate: 0.001,
    }
}

#[test]
fn test_initial_buy_sizing() {
    // 资金1000、投入比例0.5、买入费率0.001、首个tick价格100：
    // 报价金额500，总扣款 500/(1-0.001)，手续费从上浮部分支付
    let params = DcaParams {
        initial_capital: 1000.0,
        initial_investment_ratio: 0.5,
        buy_fee_rate: 0.001,
        take_profit_threshold: 10.0,
        ..base_params()
    };
    let out = DcaStrategy::new(params)
        .unwrap()
        .run(&[candle(0, 100.0)])
        .unwrap();

    assert_eq!(out.trades.len(), 1);
    let trade = &out.trades[0];
    assert_eq!(trade.kind, TradeKind::InitialBuy);
    assert_eq!(trade.side, TradeSide::Buy);

    let total = 500.0 / 0.999;
    assert_relative_eq!(trade.fee, total - 500.0, max_relative = 1e-12);
    assert_relative_eq!(trade.size_delta, 5.0, max_relative = 1e-12);
    assert_relative_eq!(trade.cash, 1000.0 - total, max_relative = 1e-12);
    assert_relative_eq!(out.portfolio.avg_price, 100.0, max_relative = 1e-12);
}

#[test]
fn test_take_profit_at_exact_threshold() {
    // 持仓均价100、止盈阈值0.02、tick价格102：102/100-1=0.02，等于阈值即触发
    let params = DcaParams {
        take_profit_threshold: 0.02,
        price_drop_threshold: 0.5,
        ..base_params()
    };
    let series = vec![candle(0, 100.0), candle(HOUR_MS, 102.0)];
    let out = DcaStrategy::new(params).unwrap().run(&series).unwrap();

    assert_eq!(out.trades.len(), 2);
    let tp = &out.trades[1];
    assert_eq!(tp.kind, TradeKind::TakeProfit);
    assert_eq!(tp.side, TradeSide::Sell);
    assert_eq!(tp.position, 0.0);
    assert_eq!(out.portfolio.position, 0.0);
    assert_eq!(out.portfolio.avg_price, 0.0);
    // 利润 = 净收入 - 持仓成本
    let shares = out.trades[0].size_delta;
    let expected_profit = shares * 102.0 * 0.999 - shares * 100.0;
    assert_relative_eq!(tp.profit.unwrap(), expected_profit, max_relative = 1e-12);
}

#[test]
fn test_take_profit_below_threshold_not_fired() {
    let params = DcaParams {
        take_profit_threshold: 0.02,
        price_drop_threshold: 0.5,
        ..base_params()
    };
    let series = vec![candle(0, 100.0), candle(HOUR_MS, 101.9)];
    let out = DcaStrategy::new(params).unwrap().run(&series).unwrap();
    assert_eq!(out.trades.len(), 1);
    assert!(out.portfolio.position > 0.0);
}

#[test]
fn test_price_drop_triggers_average_down() {
    // 上次成交价100、当前97：100/97-1≈0.0309，超过0.03触发补仓
    let params = DcaParams {
        price_drop_threshold: 0.03,
        take_profit_threshold: 10.0,
        initial_dca_value: 0.1,
        ..base_params()
    };
    let series = vec![candle(0, 100.0), candle(HOUR_MS, 97.0)];
    let out = DcaStrategy::new(params.clone()).unwrap().run(&series).unwrap();

    assert_eq!(out.trades.len(), 2);
    let dca = &out.trades[1];
    assert_eq!(dca.kind, TradeKind::AverageDown);

    // 锚定金额 = 首次补仓时刻剩余现金的initial_dca_value
    let cash_after_initial = out.trades[0].cash;
    let anchor = cash_after_initial * params.initial_dca_value;
    let gross = anchor / (1.0 - params.buy_fee_rate);
    assert_relative_eq!(dca.fee, gross - anchor, max_relative = 1e-12);
    assert_relative_eq!(dca.size_delta, anchor / 97.0, max_relative = 1e-12);

    // 均价按持仓加权
    let pos0 = out.trades[0].size_delta;
    let expected_avg = (pos0 * 100.0 + gross) / (pos0 + anchor / 97.0);
    assert_relative_eq!(out.portfolio.avg_price, expected_avg, max_relative = 1e-12);
}

#[test]
fn test_idle_time_triggers_average_down() {
    // 价格不变、无价格回撤，但超过最大无交易时长一定触发
    let params = DcaParams {
        price_drop_threshold: 0.5,
        take_profit_threshold: 10.0,
        min_time_since_last_trade: 24.0,
        max_time_since_last_trade: 96.0,
        ..base_params()
    };
    let series = vec![candle(0, 100.0), candle(97 * HOUR_MS, 100.0)];
    let out = DcaStrategy::new(params).unwrap().run(&series).unwrap();
    assert_eq!(out.trades.len(), 2);
    assert_eq!(out.trades[1].kind, TradeKind::AverageDown);
}

#[test]
fn test_idle_threshold_reproducible() {
    // 同一上次交易时间戳作为种子，得到同一阈值
    let ts = 1_700_000_000_000_i64;
    let a = idle_threshold_hours(ts, 6.0, 48.0);
    let b = idle_threshold_hours(ts, 6.0, 48.0);
    assert_eq!(a, b);
    assert!((6.0..48.0).contains(&a));

    // 不同种子大概率得到不同阈值
    let c = idle_threshold_hours(ts + 1000, 6.0, 48.0);
    assert_ne!(a, c);

    // 区间退化时取下界
    assert_eq!(idle_threshold_hours(ts, 24.0, 24.0), 24.0);
}

#[test]
fn test_deterministic_replay() {
    // 相同 (参数, 序列) 两次运行输出逐字节一致
    let params = base_params();
    let series = wavy_series(500);
    let out1 = DcaStrategy::new(params.clone()).unwrap().run(&series).unwrap();
    let out2 = DcaStrategy::new(params).unwrap().run(&series).unwrap();

    assert_eq!(
        serde_json::to_string(&out1).unwrap(),
        serde_json::to_string(&out2).unwrap()
    );
    assert!(!out1.trades.is_empty());
}

#[test]
fn test_conservation_per_trade() {
    // 每笔成交前后：新现金 + 新持仓×成交价 = 交易前组合价值 - 手续费
    let params = DcaParams {
        take_profit_threshold: 0.02,
        price_drop_threshold: 0.01,
        initial_investment_ratio: 0.3,
        initial_dca_value: 0.2,
        ..base_params()
    };
    let series = wavy_series(800);
    let out = DcaStrategy::new(params.clone()).unwrap().run(&series).unwrap();
    assert!(out.trades.len() > 3);

    let mut cash = params.initial_capital;
    let mut position = 0.0;
    for trade in &out.trades {
        let pre_value = cash + position * trade.price;
        let post_value = trade.cash + trade.position * trade.price;
        assert_relative_eq!(post_value, pre_value - trade.fee, max_relative = 1e-9);
        cash = trade.cash;
        position = trade.position;
    }
}

#[test]
fn test_zero_investment_ratio_yields_no_trades() {
    let params = DcaParams {
        initial_investment_ratio: 0.0,
        ..base_params()
    };
    let out = DcaStrategy::new(params.clone()).unwrap().run(&wavy_series(200)).unwrap();
    assert!(out.trades.is_empty());
    assert_eq!(out.portfolio.position, 0.0);
    for v in &out.values {
        assert_relative_eq!(*v, params.initial_capital, max_relative = 1e-12);
    }
}

#[test]
fn test_cash_exhaustion_is_noop_not_crash() {
    // 初始全仓买入后资金耗尽，后续补仓tick应当跳过且现金不为负
    let params = DcaParams {
        initial_investment_ratio: 1.0,
        initial_dca_value: 1.0,
        price_drop_threshold: 0.01,
        take_profit_threshold: 10.0,
        ..base_params()
    };
    let mut series = vec![candle(0, 100.0)];
    for i in 1..50 {
        series.push(candle(i * HOUR_MS, 100.0 - i as f64));
    }
    let out = DcaStrategy::new(params).unwrap().run(&series).unwrap();
    assert!(out.portfolio.cash >= 0.0);
    // 耗尽后不再产生买入
    let last = out.trades.last().unwrap();
    assert!(last.cash >= 0.0);
}

#[test]
fn test_series_must_be_ascending() {
    let params = base_params();
    let series = vec![candle(HOUR_MS, 100.0), candle(0, 100.0)];
    let res = DcaStrategy::new(params).unwrap().run(&series);
    assert!(res.is_err());
}

#[test]
fn test_empty_series_is_validation_error() {
    let res = DcaStrategy::new(base_params()).unwrap().run(&[]);
    assert!(res.is_err());
}

#[test]
fn test_content_hash_dedup_key() {
    let a = base_params();
    let b = base_params();
    assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());

    let c = DcaParams {
        take_profit_threshold: 0.011,
        ..base_params()
    };
    assert_ne!(a.content_hash().unwrap(), c.content_hash().unwrap());
}

#[test]
fn test_params_validation() {
    assert!(base_params().validate().is_ok());
    assert!(DcaParams {
        buy_fee_rate: 1.0,
        ..base_params()
    }
    .validate()
    .is_err());
    assert!(DcaParams {
        initial_capital: 0.0,
        ..base_params()
    }
    .validate()
    .is_err());
    assert!(DcaParams {
        initial_investment_ratio: 1.5,
        ..base_params()
    }
    .validate()
    .is_err());
}
