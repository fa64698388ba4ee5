//! AnyBusiness HTTP 服务

use std::process::ExitCode;

use anybiz_api::configure_router;
use anybiz_bootstrap::{RuntimeConfig, run};
use anybiz_errors::AppError;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    match run(&RuntimeConfig::default(), configure_router).await {
        // 监听失败与强制关闭都已记录日志，按正常退出处理
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            match &err {
                // 日志尚未安装
                AppError::Config(_) | AppError::Logger(_) => eprintln!("{err}"),
                _ => error!(error = %err, "Fatal error, exiting"),
            }
            ExitCode::from(err.exit_code())
        }
    }
}
