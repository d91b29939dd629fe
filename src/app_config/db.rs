use std::env;

use anyhow::anyhow;
use once_cell::sync::OnceCell;
use rbatis::RBatis;
use rbdc_mysql::MysqlDriver;

static DB_CLIENT: OnceCell<RBatis> = OnceCell::new();

/// 初始化数据库连接（进程内单例，可重复调用）
pub async fn init_db() -> anyhow::Result<&'static RBatis> {
    if let Some(rb) = DB_CLIENT.get() {
        return Ok(rb);
    }
    let url = env::var("DB_HOST").map_err(|_| anyhow!("DB_HOST is not configured"))?;
    let rb = RBatis::new();
    rb.link(MysqlDriver {}, &url).await?;
    //这里建议 需要调整数据库的最大连接数
    rb.get_pool()?.set_max_open_conns(100).await;

    let _ = DB_CLIENT.set(rb);
    DB_CLIENT
        .get()
        .ok_or_else(|| anyhow!("DB_CLIENT is not initialized"))
}

pub fn get_db_client() -> &'static RBatis {
    DB_CLIENT.get().expect("DB_CLIENT is not initialized")
}
