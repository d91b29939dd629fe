use thiserror::Error;

/// 应用错误
#[derive(Error, Debug)]
pub enum AppError {
    /// 存储不可用：连接或事务失败，当前操作终止并上抛给调用方
    #[error("存储错误: {0}")]
    StoreUnavailable(String),

    /// 参数或数据校验错误：记录为 failed 任务，不中断 worker
    #[error("校验错误: {0}")]
    Validation(String),

    /// 回测过程中出现的异常数值条件：记录为 failed 任务
    #[error("回测错误: {0}")]
    Simulation(String),
}

impl From<rbatis::Error> for AppError {
    fn from(err: rbatis::Error) -> Self {
        AppError::StoreUnavailable(err.to_string())
    }
}
