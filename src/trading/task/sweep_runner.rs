use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tracing::{error, info, warn};

use crate::trading::cache::candle_series_cache::{CandleSeriesProvider, SeriesKey};
use crate::trading::model::strategy::strategy_job::StrategyJobModel;
use crate::trading::strategy::dca_strategy::{DcaParams, DcaStrategy};
use crate::trading::strategy::performance::{self, PerformanceReport};
use crate::trading::task::param_generator::{ParamAxes, ParamGenerator};

const ENQUEUE_BATCH_SIZE: usize = 500;

/// 一次参数扫描的运行配置
#[derive(Clone, Debug)]
pub struct SweepConfig {
    pub inst_id: String,
    pub start_ts: i64,
    pub end_ts: i64,
    pub worker_count: usize,
    pub cache_maxsize: usize,
    pub cache_ttl_secs: u64,
}

impl SweepConfig {
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey {
            inst_id: self.inst_id.clone(),
            start_ts: self.start_ts,
            end_ts: self.end_ts,
            limit: None,
        }
    }
}

/// 参数扫描入口：生成全部组合入库（去重由唯一键兜底），
/// 预热共享数据集，再启动 worker 并行消费任务队列
pub async fn run_param_sweep(
    config: SweepConfig,
    base: DcaParams,
    axes: ParamAxes,
) -> Result<()> {
    let job_model = StrategyJobModel::new().await;

    let mut generator = ParamGenerator::new(base, axes);
    info!("参数组合总数: {}", generator.total_count());
    let mut inserted = 0u64;
    loop {
        let batch = generator.next_batch(ENQUEUE_BATCH_SIZE);
        if batch.is_empty() {
            break;
        }
        inserted += job_model.enqueue(&batch).await?;
    }
    info!(
        "参数生成完成: 共{}个组合，本次新插入{}行",
        generator.total_count(),
        inserted
    );

    let provider = Arc::new(
        CandleSeriesProvider::new(
            config.cache_maxsize,
            Duration::from_secs(config.cache_ttl_secs),
        )
        .await,
    );
    let key = config.series_key();
    // 预热一次，之后所有任务命中缓存
    let series = provider.get(&key).await?;
    info!(
        "共享数据集已加载: inst_id={} 共{}根K线",
        config.inst_id,
        series.len()
    );

    let mut handles = Vec::with_capacity(config.worker_count);
    for worker_id in 0..config.worker_count.max(1) {
        let provider = Arc::clone(&provider);
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            worker_loop(worker_id, key, provider).await
        }));
    }

    let mut total_processed = 0u64;
    for result in join_all(handles).await {
        match result {
            Ok(Ok(processed)) => total_processed += processed,
            Ok(Err(e)) => error!("worker 异常退出: {}", e),
            Err(e) => error!("worker join 失败: {}", e),
        }
    }
    info!("参数扫描结束，共处理 {} 个任务", total_processed);
    Ok(())
}

/// worker 主循环：认领一个任务、回测、写回结果，直到队列为空。
/// 单个任务失败只记为 failed，不中断 worker，也不影响其它 worker
pub async fn worker_loop(
    worker_id: usize,
    key: SeriesKey,
    provider: Arc<CandleSeriesProvider>,
) -> Result<u64> {
    let job_model = StrategyJobModel::new().await;
    // 进入认领循环前先加载共享数据集，通常直接命中预热过的缓存
    provider.get(&key).await?;
    let mut processed = 0u64;
    loop {
        let claimed = match job_model.claim_next().await {
            Ok(c) => c,
            Err(e) => {
                // 认领事务失败：不能假定任务已被认领，本worker直接退出
                error!("worker {} 认领任务失败: {}", worker_id, e);
                return Err(e.into());
            }
        };
        let Some((job_id, params)) = claimed else {
            break;
        };

        match run_one_job(&params, &key, &provider).await {
            Ok(report) => {
                if let Err(e) = job_model.complete(job_id, &report).await {
                    error!("worker {} 写回任务 {} 结果失败: {}", worker_id, job_id, e);
                }
            }
            Err(e) => {
                warn!("worker {} 处理任务 {} 失败: {}", worker_id, job_id, e);
                if let Err(e2) = job_model.fail(job_id, &e.to_string()).await {
                    error!("worker {} 标记任务 {} 失败状态时出错: {}", worker_id, job_id, e2);
                }
            }
        }
        processed += 1;
    }
    info!("worker {} 完成，共处理 {} 个任务", worker_id, processed);
    Ok(processed)
}

/// 单个任务：取共享数据集，跑状态机，归约指标
async fn run_one_job(
    params: &DcaParams,
    key: &SeriesKey,
    provider: &CandleSeriesProvider,
) -> Result<PerformanceReport> {
    let series = provider.get(key).await?;
    let output = DcaStrategy::new(params.clone())?.run(&series)?;
    let report = performance::evaluate(&output, params.initial_capital)?;
    Ok(report)
}
