use std::process::ExitCode;

use anyhow::Result;
use tracing::error;
use visa_status_watch::utils::logging;
use visa_status_watch::{App, Config};

#[tokio::main]
async fn main() -> ExitCode {
    // 初始化日志
    logging::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ 运行失败: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // 加载配置
    let config = Config::from_env()?;

    // 初始化并运行应用
    let _report = App::initialize(config).await?.run().await?;

    Ok(())
}
