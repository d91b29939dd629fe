use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::time_util;
use crate::CandleItem;

/// DCA 策略参数。字段顺序即规范化 JSON 的字段顺序，
/// 内容哈希基于该序列化结果，语义相同的参数集只会入库一行。
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DcaParams {
    /// 交易对
    pub inst_id: String,
    /// 价格下跌触发补仓的阈值（比例）
    pub price_drop_threshold: f64,
    /// 最长无交易时间触发补仓（小时）
    pub max_time_since_last_trade: f64,
    /// 最短无交易时间触发补仓（小时）
    pub min_time_since_last_trade: f64,
    /// 止盈阈值（比例）
    pub take_profit_threshold: f64,
    /// 初始资金
    pub initial_capital: f64,
    /// 初始投资使用的资金比例
    pub initial_investment_ratio: f64,
    /// 首次补仓使用剩余资金的比例（锚定金额）
    pub initial_dca_value: f64,
    /// 买入手续费比例
    pub buy_fee_rate: f64,
    /// 卖出手续费比例
    pub sell_fee_rate: f64,
}

impl Default for DcaParams {
    fn default() -> Self {
        Self {
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
}

impl DcaParams {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.inst_id.is_empty() {
            return Err(AppError::Validation("inst_id 为空".to_string()));
        }
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(AppError::Validation(format!(
                "initial_capital 非法: {}",
                self.initial_capital
            )));
        }
        for (name, v) in [
            ("price_drop_threshold", self.price_drop_threshold),
            ("max_time_since_last_trade", self.max_time_since_last_trade),
            ("min_time_since_last_trade", self.min_time_since_last_trade),
            ("take_profit_threshold", self.take_profit_threshold),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(AppError::Validation(format!("{} 非法: {}", name, v)));
            }
        }
        for (name, v) in [
            ("initial_investment_ratio", self.initial_investment_ratio),
            ("initial_dca_value", self.initial_dca_value),
        ] {
            if !(v.is_finite() && (0.0..=1.0).contains(&v)) {
                return Err(AppError::Validation(format!("{} 非法: {}", name, v)));
            }
        }
        for (name, v) in [
            ("buy_fee_rate", self.buy_fee_rate),
            ("sell_fee_rate", self.sell_fee_rate),
        ] {
            if !(v.is_finite() && (0.0..1.0).contains(&v)) {
                return Err(AppError::Validation(format!("{} 非法: {}", name, v)));
            }
        }
        Ok(())
    }

    /// 规范化序列化：serde 按结构体字段声明顺序输出，结果稳定
    pub fn canonical_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 内容哈希，作为任务表的去重键
    pub fn content_hash(&self) -> anyhow::Result<String> {
        let json = self.canonical_json()?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeKind {
    InitialBuy,
    AverageDown,
    TakeProfit,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// 单笔成交记录，生成后只追加不修改
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TradeEvent {
    pub ts: i64,
    pub kind: TradeKind,
    pub side: TradeSide,
    pub price: f64,
    /// 持仓变化量，买为正、卖为负
    pub size_delta: f64,
    pub fee: f64,
    pub cash: f64,
    pub position: f64,
    pub portfolio_value: f64,
    /// 止盈时的已实现利润
    pub profit: Option<f64>,
}

/// 投资组合状态，仅由状态机逐笔修改
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub position: f64,
    pub avg_price: f64,
    pub last_trade_ts: Option<i64>,
    pub last_trade_price: Option<f64>,
    pub peak_value: f64,
}

impl Portfolio {
    fn new(initial_capital: f64) -> Self {
        Self {
            cash: initial_capital,
            position: 0.0,
            avg_price: 0.0,
            last_trade_ts: None,
            last_trade_price: None,
            peak_value: initial_capital,
        }
    }
}

/// 回测输出：成交序列、终态组合、每个tick的组合净值轨迹
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BackTestOutput {
    pub trades: Vec<TradeEvent>,
    pub portfolio: Portfolio,
    pub values: Vec<f64>,
    pub start_ts: i64,
    pub end_ts: i64,
}

/// 基于上次交易时间生成可复现的无交易时长阈值（小时），
/// 同一种子得到同一阈值，不依赖任何全局随机状态
pub fn idle_threshold_hours(last_trade_ts_ms: i64, min_hours: f64, max_hours: f64) -> f64 {
    if max_hours <= min_hours {
        return min_hours;
    }
    let seed = time_util::epoch_secs(last_trade_ts_ms) as u64;
    let mut rng = StdRng::seed_from_u64(seed);
    rng.gen_range(min_hours..max_hours)
}

pub struct DcaStrategy {
    params: DcaParams,
    portfolio: Portfolio,
    /// 首次补仓时锚定的金额，之后的补仓都复用；初始建仓时重置
    anchor_amount: Option<f64>,
    trades: Vec<TradeEvent>,
}

impl DcaStrategy {
    pub fn new(params: DcaParams) -> Result<Self, AppError> {
        params.validate()?;
        let portfolio = Portfolio::new(params.initial_capital);
        Ok(Self {
            params,
            portfolio,
            anchor_amount: None,
            trades: Vec::new(),
        })
    }

    /// 按时间顺序回放整个K线序列。
    /// 输出是 (params, series) 的纯函数，相同输入两次运行结果完全一致。
    pub fn run(mut self, series: &[CandleItem]) -> Result<BackTestOutput, AppError> {
        if series.is_empty() {
            return Err(AppError::Validation("历史数据为空".to_string()));
        }
        for w in series.windows(2) {
            if w[1].ts() < w[0].ts() {
                return Err(AppError::Validation(format!(
                    "K线时间非升序: {} -> {}",
                    w[0].ts(),
                    w[1].ts()
                )));
            }
        }

        let mut values = Vec::with_capacity(series.len());
        for candle in series {
            self.on_tick(candle.ts(), candle.c())?;

            let value = self.portfolio.cash + self.portfolio.position * candle.c();
            if !value.is_finite() {
                return Err(AppError::Simulation(format!(
                    "组合净值出现非法数值 ts={}",
                    candle.ts()
                )));
            }
            if value > self.portfolio.peak_value {
                self.portfolio.peak_value = value;
            }
            values.push(value);
        }

        Ok(BackTestOutput {
            trades: self.trades,
            portfolio: self.portfolio,
            values,
            start_ts: series[0].ts(),
            end_ts: series[series.len() - 1].ts(),
        })
    }

    /// 单个tick的决策：无持仓先建仓，有持仓先判断止盈再判断补仓
    fn on_tick(&mut self, ts: i64, price: f64) -> Result<Option<TradeEvent>, AppError> {
        if !(price.is_finite() && price > 0.0) {
            return Err(AppError::Validation(format!("非法价格 {} ts={}", price, ts)));
        }

        if self.portfolio.position == 0.0 {
            return self.create_initial_position(ts, price);
        }
        if self.should_take_profit(price) {
            return self.create_take_profit_order(ts, price).map(Some);
        }
        if self.should_average_down(ts, price) {
            return self.create_average_down_order(ts, price);
        }
        Ok(None)
    }

    /// 建立初始仓位。投入比例为0时不产生任何交易
    fn create_initial_position(
        &mut self,
        ts: i64,
        price: f64,
    ) -> Result<Option<TradeEvent>, AppError> {
        let amount_to_invest = self.portfolio.cash * self.params.initial_investment_ratio;
        if amount_to_invest <= 0.0 {
            return Ok(None);
        }
        // 重新锚定：每轮建仓后第一次补仓重新确定锚定金额
        self.anchor_amount = None;
        let event = self.execute_buy(ts, price, amount_to_invest, TradeKind::InitialBuy)?;
        Ok(Some(event))
    }

    fn should_take_profit(&self, price: f64) -> bool {
        if self.portfolio.avg_price == 0.0 {
            return false;
        }
        let current_return = (price / self.portfolio.avg_price) - 1.0;
        current_return >= self.params.take_profit_threshold
    }

    /// 补仓条件：价格回撤超过阈值，或无交易时长超过种子化的随机阈值
    fn should_average_down(&self, ts: i64, price: f64) -> bool {
        let last_price = match self.portfolio.last_trade_price {
            Some(p) => p,
            None => return false,
        };
        let price_drop = (last_price / price) - 1.0;
        if price_drop >= self.params.price_drop_threshold {
            return true;
        }

        match self.portfolio.last_trade_ts {
            Some(last_ts) => {
                let elapsed_hours = time_util::hours_between_ms(last_ts, ts);
                let threshold = idle_threshold_hours(
                    last_ts,
                    self.params.min_time_since_last_trade,
                    self.params.max_time_since_last_trade,
                );
                elapsed_hours >= threshold
            }
            // 从未交易过，时间触发不生效
            None => false,
        }
    }

    /// 补仓。金额复用锚定金额；剩余资金不足时全额投入；资金耗尽则跳过
    fn create_average_down_order(
        &mut self,
        ts: i64,
        price: f64,
    ) -> Result<Option<TradeEvent>, AppError> {
        if self.anchor_amount.is_none() {
            self.anchor_amount = Some(self.portfolio.cash * self.params.initial_dca_value);
        }
        let anchor = self.anchor_amount.unwrap_or(0.0);

        let amount_to_invest = if self.portfolio.cash < anchor {
            // 资金不足时投入全部剩余现金（含手续费），现金清零
            self.portfolio.cash * (1.0 - self.params.buy_fee_rate)
        } else {
            anchor
        };
        if amount_to_invest <= 0.0 {
            return Ok(None);
        }
        let event = self.execute_buy(ts, price, amount_to_invest, TradeKind::AverageDown)?;
        Ok(Some(event))
    }

    /// 买入的共同路径：报价金额按手续费率上浮后从现金扣除，
    /// 份额按净投入金额计算，均价按持仓加权
    fn execute_buy(
        &mut self,
        ts: i64,
        price: f64,
        amount_to_invest: f64,
        kind: TradeKind,
    ) -> Result<TradeEvent, AppError> {
        let mut total_amount = amount_to_invest / (1.0 - self.params.buy_fee_rate);
        let mut amount = amount_to_invest;
        if total_amount > self.portfolio.cash {
            // 上浮后超出可用现金时按现金封顶，保证现金不为负
            total_amount = self.portfolio.cash;
            amount = total_amount * (1.0 - self.params.buy_fee_rate);
        }
        let fee = total_amount - amount;
        let shares_to_buy = amount / price;

        let new_position = self.portfolio.position + shares_to_buy;
        let new_avg_price = (self.portfolio.position * self.portfolio.avg_price + total_amount)
            / new_position;
        let mut new_cash = self.portfolio.cash - total_amount;
        if new_cash < -1e-9 || !new_cash.is_finite() {
            return Err(AppError::Simulation(format!(
                "买入后现金非法: {} ts={}",
                new_cash, ts
            )));
        }
        if new_cash < 0.0 {
            // 全额投入时的浮点残差
            new_cash = 0.0;
        }

        self.portfolio.cash = new_cash;
        self.portfolio.position = new_position;
        self.portfolio.avg_price = if kind == TradeKind::InitialBuy {
            price
        } else {
            new_avg_price
        };
        self.portfolio.last_trade_ts = Some(ts);
        self.portfolio.last_trade_price = Some(price);

        let event = TradeEvent {
            ts,
            kind,
            side: TradeSide::Buy,
            price,
            size_delta: shares_to_buy,
            fee,
            cash: self.portfolio.cash,
            position: self.portfolio.position,
            portfolio_value: self.portfolio.cash + self.portfolio.position * price,
            profit: None,
        };
        self.trades.push(event.clone());
        Ok(event)
    }

    /// 止盈：全部平仓，利润为净收入减持仓成本，均价归零
    fn create_take_profit_order(&mut self, ts: i64, price: f64) -> Result<TradeEvent, AppError> {
        let position_value = self.portfolio.position * price;
        let fee = position_value * self.params.sell_fee_rate;
        let actual_income = position_value - fee;
        let profit = actual_income - self.portfolio.position * self.portfolio.avg_price;
        let sell_size = self.portfolio.position;

        self.portfolio.cash += actual_income;
        self.portfolio.position = 0.0;
        self.portfolio.avg_price = 0.0;
        self.portfolio.last_trade_ts = Some(ts);
        self.portfolio.last_trade_price = Some(price);

        let event = TradeEvent {
            ts,
            kind: TradeKind::TakeProfit,
            side: TradeSide::Sell,
            price,
            size_delta: -sell_size,
            fee,
            cash: self.portfolio.cash,
            position: 0.0,
            portfolio_value: self.portfolio.cash,
            profit: Some(profit),
        };
        self.trades.push(event.clone());
        Ok(event)
    }
}
