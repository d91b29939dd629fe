use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::trading::strategy::dca_strategy::{BackTestOutput, TradeKind};

const MS_PER_DAY: f64 = 86_400_000.0;
const DAYS_PER_YEAR: f64 = 365.0;

/// 回测性能指标，任务完成后序列化写入任务表的 result 列
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PerformanceReport {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub trade_count: u32,
    pub dca_count: u32,
    pub take_profit_count: u32,
    pub win_rate: f64,
    pub final_portfolio_value: f64,
    pub total_fees: f64,
}

/// 非有限数值一律回落为0，指标列不允许出现 NaN/Inf
fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// 由成交序列和净值轨迹归约出全部指标
pub fn evaluate(output: &BackTestOutput, initial_capital: f64) -> Result<PerformanceReport, AppError> {
    if output.values.is_empty() {
        return Err(AppError::Validation("净值轨迹为空".to_string()));
    }
    if !(initial_capital.is_finite() && initial_capital > 0.0) {
        return Err(AppError::Validation(format!(
            "initial_capital 非法: {}",
            initial_capital
        )));
    }

    let final_value = output.values[output.values.len() - 1];
    let total_return = final_value / initial_capital - 1.0;

    let elapsed_days = (output.end_ts - output.start_ts) as f64 / MS_PER_DAY;
    let annualized_return = if elapsed_days > 0.0 && 1.0 + total_return > 0.0 {
        (1.0 + total_return).powf(DAYS_PER_YEAR / elapsed_days) - 1.0
    } else {
        total_return
    };

    let sharpe_ratio = sharpe(&output.values, elapsed_days);
    let max_drawdown = max_drawdown(&output.values);

    let mut dca_count = 0u32;
    let mut take_profit_count = 0u32;
    let mut wins = 0u32;
    let mut total_fees = 0.0;
    for trade in &output.trades {
        total_fees += trade.fee;
        match trade.kind {
            TradeKind::AverageDown => dca_count += 1,
            TradeKind::TakeProfit => {
                take_profit_count += 1;
                if trade.profit.unwrap_or(0.0) >= 0.0 {
                    wins += 1;
                }
            }
            TradeKind::InitialBuy => {}
        }
    }
    let win_rate = if take_profit_count > 0 {
        wins as f64 / take_profit_count as f64
    } else {
        0.0
    };

    Ok(PerformanceReport {
        total_return: finite_or_zero(total_return),
        annualized_return: finite_or_zero(annualized_return),
        sharpe_ratio: finite_or_zero(sharpe_ratio),
        max_drawdown: finite_or_zero(max_drawdown),
        trade_count: output.trades.len() as u32,
        dca_count,
        take_profit_count,
        win_rate: finite_or_zero(win_rate),
        final_portfolio_value: finite_or_zero(final_value),
        total_fees: finite_or_zero(total_fees),
    })
}

/// 每期收益率的均值/标准差，按采样频率折算到年。
/// 标准差为0或样本不足时定义为0，而不是 NaN
fn sharpe(values: &[f64], elapsed_days: f64) -> f64 {
    if values.len() < 2 || elapsed_days <= 0.0 {
        return 0.0;
    }
    let mut returns = Vec::with_capacity(values.len() - 1);
    for w in values.windows(2) {
        if w[0] > 0.0 {
            returns.push(w[1] / w[0] - 1.0);
        }
    }
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if std == 0.0 {
        return 0.0;
    }
    // 由tick数和覆盖时长推算每年的采样期数
    let periods_per_year = (values.len() - 1) as f64 / (elapsed_days / DAYS_PER_YEAR);
    finite_or_zero(mean / std * periods_per_year.sqrt())
}

/// 净值轨迹上最大的峰谷回撤，取正数比例
fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0f64;
    for &v in values {
        if v > peak {
            peak = v;
        }
        if peak > 0.0 {
            let dd = (peak - v) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}
