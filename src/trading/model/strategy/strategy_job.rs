extern crate rbatis;

use anyhow::Result;
use rbatis::executor::Executor;
use rbatis::rbdc::db::ExecResult;
use rbatis::RBatis;
use rbs::Value;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app_config::db;
use crate::error::AppError;
use crate::trading::strategy::dca_strategy::DcaParams;
use crate::trading::strategy::performance::PerformanceReport;

const TABLE_NAME: &str = "strategy_job";

/// table
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StrategyJobEntity {
    pub id: i64,
    pub params: String,
    pub params_hash: String,
    pub status: String,
    pub result: Option<String>,
}

/// claim 事务中取出的待执行行
#[derive(Debug, Deserialize)]
struct PendingRow {
    id: i64,
    params: serde_json::Value,
}

pub struct StrategyJobModel {
    db: &'static RBatis,
}

impl StrategyJobModel {
    pub async fn new() -> StrategyJobModel {
        Self {
            db: db::get_db_client(),
        }
    }

    pub async fn create_table(&self) -> Result<ExecResult> {
        let create_table_sql = format!(
            "CREATE TABLE IF NOT EXISTS `{}` (
            `id` int NOT NULL AUTO_INCREMENT,
            `params` json NOT NULL,
            `params_hash` varchar(64) NOT NULL COMMENT '参数规范化序列化的SHA-256，去重键',
            `status` enum('pending','executing','completed','failed') DEFAULT 'pending',
            `result` json NULL,
            `created_at` timestamp DEFAULT CURRENT_TIMESTAMP,
            `updated_at` timestamp DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
            PRIMARY KEY (`id`),
            UNIQUE KEY `uk_params_hash` (`params_hash`)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;",
            TABLE_NAME
        );
        let res = self.db.exec(&create_table_sql, vec![]).await?;
        Ok(res)
    }

    /// 批量插入参数组合，内容哈希重复的行静默跳过。
    /// 幂等，重复调用同一批参数不会产生新行。返回实际插入的行数
    pub async fn enqueue(&self, params_list: &[DcaParams]) -> Result<u64> {
        if params_list.is_empty() {
            return Ok(0);
        }
        let mut query = format!(
            "INSERT IGNORE INTO `{}` (params, params_hash, status) VALUES ",
            TABLE_NAME
        );
        let mut params: Vec<Value> = Vec::new();
        for p in params_list {
            query.push_str("(?, ?, 'pending'),");
            params.push(p.canonical_json()?.into());
            params.push(p.content_hash()?.into());
        }
        // 移除最后一个逗号
        query.pop();

        debug!("enqueue_strategy_job_query = {}", query);
        let res = self
            .db
            .exec(&query, params)
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
        info!(
            "成功插入 {} 个参数组合（提交 {} 个，重复项已忽略）",
            res.rows_affected,
            params_list.len()
        );
        Ok(res.rows_affected)
    }

    /// 在单个事务内取出最旧的 pending 任务并标记为 executing。
    /// SELECT ... FOR UPDATE 的行锁覆盖查改两步，并发调用不会取到同一行。
    /// 没有待执行任务时返回 None，通知 worker 退出
    pub async fn claim_next(&self) -> Result<Option<(i64, DcaParams)>, AppError> {
        let mut tx = self
            .db
            .acquire_begin()
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        let claimed = Self::claim_in_tx(&tx).await;
        match claimed {
            Ok(v) => {
                tx.commit()
                    .await
                    .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
                Ok(v)
            }
            Err(e) => {
                // 事务失败时回滚，调用方不能假定任务已被认领
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn claim_in_tx(tx: &dyn Executor) -> Result<Option<(i64, DcaParams)>, AppError> {
        let select_sql = format!(
            "SELECT id, params FROM `{}` WHERE status = 'pending' ORDER BY id ASC LIMIT 1 FOR UPDATE",
            TABLE_NAME
        );
        let res: Value = tx
            .query(&select_sql, vec![])
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        let json_value: serde_json::Value = serde_json::from_str(&res.to_string())
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
        let rows: Vec<PendingRow> = serde_json::from_value(json_value)
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        let row = match rows.into_iter().next() {
            Some(row) => row,
            None => return Ok(None),
        };

        // MySQL 的 json 列可能以字符串或对象两种形态返回
        let params: DcaParams = match &row.params {
            serde_json::Value::String(s) => serde_json::from_str(s)
                .map_err(|e| AppError::Validation(format!("任务 {} 参数解析失败: {}", row.id, e)))?,
            other => serde_json::from_value(other.clone())
                .map_err(|e| AppError::Validation(format!("任务 {} 参数解析失败: {}", row.id, e)))?,
        };

        let update_sql = format!(
            "UPDATE `{}` SET status = 'executing', updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            TABLE_NAME
        );
        tx.exec(&update_sql, vec![row.id.into()])
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        Ok(Some((row.id, params)))
    }

    /// 任务成功：写入序列化后的性能报告
    pub async fn complete(&self, job_id: i64, report: &PerformanceReport) -> Result<u64> {
        let result_json = serde_json::to_string(report)?;
        self.update_status(job_id, "completed", Some(result_json)).await
    }

    /// 任务失败：写入错误文本，worker 继续处理下一个任务
    pub async fn fail(&self, job_id: i64, error_message: &str) -> Result<u64> {
        let result_json = serde_json::to_string(&error_message)?;
        self.update_status(job_id, "failed", Some(result_json)).await
    }

    async fn update_status(
        &self,
        job_id: i64,
        status: &str,
        result: Option<String>,
    ) -> Result<u64> {
        let sql = format!(
            "UPDATE `{}` SET status = ?, result = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            TABLE_NAME
        );
        let params: Vec<Value> = vec![
            status.to_string().into(),
            match result {
                Some(r) => r.into(),
                None => Value::Null,
            },
            job_id.into(),
        ];
        let res = self
            .db
            .exec(&sql, params)
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
        debug!("任务 {} 状态已更新为 {}", job_id, status);
        Ok(res.rows_affected)
    }

    /// 统计某个状态下的任务数
    pub async fn count_by_status(&self, status: &str) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM `{}` WHERE status = ?",
            TABLE_NAME
        );
        let count: u64 = self
            .db
            .query_decode(&sql, vec![status.to_string().into()])
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
        Ok(count)
    }

    /// 运维工具：worker 进程崩溃后把滞留在 executing 的任务重置回 pending。
    /// 协议本身没有租约回收，需要操作者手动触发
    pub async fn reset_executing(&self) -> Result<u64> {
        let sql = format!(
            "UPDATE `{}` SET status = 'pending', updated_at = CURRENT_TIMESTAMP WHERE status = 'executing'",
            TABLE_NAME
        );
        let res = self
            .db
            .exec(&sql, vec![])
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
        Ok(res.rows_affected)
    }
}
