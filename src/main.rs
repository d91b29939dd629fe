use chrono::{Duration, NaiveDate, Utc};
use clap::Parser;
use dotenv::dotenv;
use tracing::info;

use dca_quant::app_config::{db, log as app_log};
use dca_quant::trading::model::market::candles::CandlesModel;
use dca_quant::trading::model::strategy::strategy_job::StrategyJobModel;
use dca_quant::trading::strategy::dca_strategy::DcaParams;
use dca_quant::trading::task::param_generator::{generate_range, ParamAxes};
use dca_quant::trading::task::sweep_runner::{run_param_sweep, SweepConfig};

/// DCA 参数扫描回测调度器
#[derive(Parser, Debug)]
#[command(name = "dca_quant")]
struct Cli {
    /// 交易对
    #[arg(long, default_value = "BTC-USDT")]
    inst_id: String,

    /// 回测窗口天数（结束时间往前推）
    #[arg(long, default_value_t = 120)]
    days: i64,

    /// 回测结束日期，格式 YYYY-MM-DD，缺省为当前时间
    #[arg(long)]
    end_date: Option<String>,

    /// worker 数量
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// 数据集缓存最多保存的条目数
    #[arg(long, default_value_t = 10)]
    cache_maxsize: usize,

    /// 缓存条目有效时间（秒）
    #[arg(long, default_value_t = 3600)]
    cache_ttl_secs: u64,

    /// 初始化任务表和K线表后退出
    #[arg(long, default_value_t = false)]
    init_tables: bool,

    /// 把滞留在 executing 状态的任务重置回 pending 后退出
    #[arg(long, default_value_t = false)]
    reset_executing: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    // 设置日志
    app_log::setup_logging().await?;
    db::init_db().await?;

    if cli.init_tables {
        StrategyJobModel::new().await.create_table().await?;
        CandlesModel::new().await.create_table(&cli.inst_id).await?;
        info!("数据表初始化完成");
        return Ok(());
    }

    if cli.reset_executing {
        let reset = StrategyJobModel::new().await.reset_executing().await?;
        info!("已重置 {} 个 executing 任务", reset);
        return Ok(());
    }

    let end = match &cli.end_date {
        Some(s) => {
            let date = s.parse::<NaiveDate>()?;
            date.and_hms_opt(0, 0, 0)
                .ok_or_else(|| anyhow::anyhow!("end_date 非法: {}", s))?
                .and_utc()
        }
        None => Utc::now(),
    };
    let start = end - Duration::days(cli.days);

    let config = SweepConfig {
        inst_id: cli.inst_id.clone(),
        start_ts: start.timestamp_millis(),
        end_ts: end.timestamp_millis(),
        worker_count: cli.workers,
        cache_maxsize: cli.cache_maxsize,
        cache_ttl_secs: cli.cache_ttl_secs,
    };

    // 基础策略配置
    let base = DcaParams {
        inst_id: cli.inst_id,
        ..DcaParams::default()
    };

    // 各参数轴的扫描范围
    let axes = ParamAxes {
        price_drop_threshold: generate_range(0.01, 0.05, 0.005),
        max_time_since_last_trade: generate_range(24.0, 120.0, 24.0),
        min_time_since_last_trade: generate_range(6.0, 48.0, 6.0),
        take_profit_threshold: generate_range(0.005, 0.03, 0.005),
        initial_investment_ratio: generate_range(0.05, 0.3, 0.05),
        initial_dca_value: generate_range(0.02, 0.2, 0.005),
    };

    info!(
        "开始参数扫描: inst_id={} window=[{} ~ {}] workers={}",
        config.inst_id, start, end, config.worker_count
    );
    run_param_sweep(config, base, axes).await?;
    Ok(())
}
