extern crate rbatis;

use anyhow::{anyhow, Result};
use rbatis::rbdc::db::ExecResult;
use rbatis::RBatis;
use rbs::Value;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app_config::db;
use crate::error::AppError;
use crate::CandleItem;

/// table
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub struct CandlesEntity {
    pub ts: String,  // 开始时间，Unix时间戳的毫秒数格式
    pub o: String,   // 开盘价格
    pub h: String,   // 最高价格
    pub l: String,   // 最低价格
    pub c: String,   // 收盘价格
    pub vol: String, // 交易量
}

impl CandlesEntity {
    /// 解析为数值K线，任何一列不可解析都视为校验错误
    pub fn to_item(&self) -> Result<CandleItem, AppError> {
        let parse = |name: &str, v: &str| {
            v.parse::<f64>()
                .map_err(|e| AppError::Validation(format!("K线字段 {} 解析失败: {}", name, e)))
        };
        let ts = self
            .ts
            .parse::<i64>()
            .map_err(|e| AppError::Validation(format!("K线字段 ts 解析失败: {}", e)))?;
        CandleItem::builder()
            .ts(ts)
            .o(parse("o", &self.o)?)
            .h(parse("h", &self.h)?)
            .l(parse("l", &self.l)?)
            .c(parse("c", &self.c)?)
            .v(parse("vol", &self.vol)?)
            .build()
            .map_err(|e| AppError::Validation(format!("K线数据非法 ts={}: {}", self.ts, e)))
    }
}

pub struct CandlesModel {
    db: &'static RBatis,
}

impl CandlesModel {
    pub async fn new() -> CandlesModel {
        Self {
            db: db::get_db_client(),
        }
    }

    fn get_table_name(&self, inst_id: &str) -> String {
        format!("{}_history", inst_id.replace('-', "_").to_lowercase())
    }

    pub async fn create_table(&self, inst_id: &str) -> Result<ExecResult> {
        let table_name = self.get_table_name(inst_id);
        let create_table_sql = format!(
            "CREATE TABLE IF NOT EXISTS `{}` (
            `id` int NOT NULL AUTO_INCREMENT,
            `ts` varchar(20) NOT NULL COMMENT '开始时间，Unix时间戳的毫秒数格式，如 1597026383085',
            `o` varchar(20) NOT NULL COMMENT '开盘价格',
            `h` varchar(20) NOT NULL COMMENT '最高价格',
            `l` varchar(20) NOT NULL COMMENT '最低价格',
            `c` varchar(20) NOT NULL COMMENT '收盘价格',
            `vol` varchar(20) NOT NULL COMMENT '交易量',
            `created_at` datetime NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (`id`),
            KEY `idx_ts` (`ts`)
        ) ENGINE=InnoDB AUTO_INCREMENT=1 DEFAULT CHARSET=utf8mb4;",
            table_name
        );
        let res = self.db.exec(&create_table_sql, vec![]).await?;
        Ok(res)
    }

    pub async fn add(&self, list: Vec<CandlesEntity>, inst_id: &str) -> Result<ExecResult> {
        let table_name = self.get_table_name(inst_id);
        // 构建批量插入的 SQL 语句
        let mut query = format!("INSERT INTO `{}` (ts, o, h, l, c, vol) VALUES ", table_name);
        let mut params = Vec::new();

        for candle in list {
            query.push_str("(?, ?, ?, ?, ?, ?),");
            params.push(candle.ts.into());
            params.push(candle.o.into());
            params.push(candle.h.into());
            params.push(candle.l.into());
            params.push(candle.c.into());
            params.push(candle.vol.into());
        }

        // 移除最后一个逗号
        query.pop();
        if params.is_empty() {
            return Err(anyhow!("params is empty"));
        }
        let res = self.db.exec(&query, params).await?;
        Ok(res)
    }

    /// 按时间范围升序获取历史K线
    pub async fn get_range(
        &self,
        inst_id: &str,
        start_ts: i64,
        end_ts: i64,
        limit: Option<u64>,
    ) -> Result<Vec<CandlesEntity>> {
        let mut query = format!(
            "SELECT ts, o, h, l, c, vol FROM `{}` WHERE ts >= ? AND ts <= ? ORDER BY ts ASC",
            self.get_table_name(inst_id)
        );
        if let Some(limit) = limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }
        debug!("query: {}", query);
        let params = vec![
            start_ts.to_string().into(),
            end_ts.to_string().into(),
        ];
        let res: Value = self.db.query(&query, params).await?;

        if res.is_array() && res.as_array().map(|a| a.is_empty()).unwrap_or(true) {
            info!("No candles found in MySQL for {}", inst_id);
            return Ok(vec![]);
        }

        // 将 rbs::Value 转换为 serde_json::Value 再反序列化
        let json_value: serde_json::Value = serde_json::from_str(&res.to_string())?;
        let candles: Vec<CandlesEntity> = serde_json::from_value(json_value)?;
        Ok(candles)
    }
}
