use crate::trading::strategy::dca_strategy::DcaParams;

/// 生成从min到max的等间隔数值列表（含max，带浮点容差）
pub fn generate_range(min_val: f64, max_val: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || max_val < min_val {
        return vec![min_val];
    }
    let mut values = Vec::new();
    let mut i = 0u32;
    loop {
        let v = min_val + step * i as f64;
        if v > max_val + step * 1e-9 {
            break;
        }
        values.push(v);
        i += 1;
    }
    values
}

/// 各参数轴的取值列表，空轴退化为基础配置的单值
#[derive(Clone, Debug, Default)]
pub struct ParamAxes {
    pub price_drop_threshold: Vec<f64>,
    pub max_time_since_last_trade: Vec<f64>,
    pub min_time_since_last_trade: Vec<f64>,
    pub take_profit_threshold: Vec<f64>,
    pub initial_investment_ratio: Vec<f64>,
    pub initial_dca_value: Vec<f64>,
}

/// 按索引展开笛卡尔积的参数组合生成器，避免一次性持有所有组合
pub struct ParamGenerator {
    base: DcaParams,
    axes: ParamAxes,
    current_index: usize,
    total_count: usize,
}

impl ParamGenerator {
    pub fn new(base: DcaParams, mut axes: ParamAxes) -> Self {
        if axes.price_drop_threshold.is_empty() {
            axes.price_drop_threshold = vec![base.price_drop_threshold];
        }
        if axes.max_time_since_last_trade.is_empty() {
            axes.max_time_since_last_trade = vec![base.max_time_since_last_trade];
        }
        if axes.min_time_since_last_trade.is_empty() {
            axes.min_time_since_last_trade = vec![base.min_time_since_last_trade];
        }
        if axes.take_profit_threshold.is_empty() {
            axes.take_profit_threshold = vec![base.take_profit_threshold];
        }
        if axes.initial_investment_ratio.is_empty() {
            axes.initial_investment_ratio = vec![base.initial_investment_ratio];
        }
        if axes.initial_dca_value.is_empty() {
            axes.initial_dca_value = vec![base.initial_dca_value];
        }

        let total_count = axes.price_drop_threshold.len()
            * axes.max_time_since_last_trade.len()
            * axes.min_time_since_last_trade.len()
            * axes.take_profit_threshold.len()
            * axes.initial_investment_ratio.len()
            * axes.initial_dca_value.len();

        Self {
            base,
            axes,
            current_index: 0,
            total_count,
        }
    }

    /// 把基础配置与第index个组合合并成完整参数集
    fn merge_at(&self, mut index: usize) -> DcaParams {
        let mut params = self.base.clone();

        let pdt_size = self.axes.price_drop_threshold.len();
        let i_pdt = index % pdt_size;
        index /= pdt_size;

        let max_t_size = self.axes.max_time_since_last_trade.len();
        let i_max_t = index % max_t_size;
        index /= max_t_size;

        let min_t_size = self.axes.min_time_since_last_trade.len();
        let i_min_t = index % min_t_size;
        index /= min_t_size;

        let tpt_size = self.axes.take_profit_threshold.len();
        let i_tpt = index % tpt_size;
        index /= tpt_size;

        let iir_size = self.axes.initial_investment_ratio.len();
        let i_iir = index % iir_size;
        index /= iir_size;

        let idv_size = self.axes.initial_dca_value.len();
        let i_idv = index % idv_size;

        params.price_drop_threshold = self.axes.price_drop_threshold[i_pdt];
        params.max_time_since_last_trade = self.axes.max_time_since_last_trade[i_max_t];
        params.min_time_since_last_trade = self.axes.min_time_since_last_trade[i_min_t];
        params.take_profit_threshold = self.axes.take_profit_threshold[i_tpt];
        params.initial_investment_ratio = self.axes.initial_investment_ratio[i_iir];
        params.initial_dca_value = self.axes.initial_dca_value[i_idv];
        params
    }

    pub fn next_batch(&mut self, batch_size: usize) -> Vec<DcaParams> {
        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size && self.current_index < self.total_count {
            batch.push(self.merge_at(self.current_index));
            self.current_index += 1;
        }
        batch
    }

    pub fn progress(&self) -> (usize, usize) {
        (self.current_index, self.total_count)
    }

    pub fn is_completed(&self) -> bool {
        self.current_index >= self.total_count
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    /// 重置到开始位置
    pub fn reset(&mut self) {
        self.current_index = 0;
    }
}
