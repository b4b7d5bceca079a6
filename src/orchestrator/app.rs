//! 应用入口 - 编排层
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：启动或连接浏览器，装配会话、识别器、存储和通知
//! 2. **取消信号**：收到 Ctrl-C 后在当前尝试结束时停止
//! 3. **运行**：执行一次查询 + 比对 + 通知，并输出统计
//!
//! 只有本模块持有 Browser（通过会话）

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::browser;
use crate::config::Config;
use crate::error::AppResult;
use crate::orchestrator::retry_orchestrator::RetryOrchestrator;
use crate::orchestrator::status_watch::{RunReport, StatusWatch};
use crate::services::{
    BrowserFormSession, BrowserSessionOptions, JsonFileStateStore, ResendNotifier,
    ResultExtractor, ResultFieldIds, VisionSolver,
};
use crate::utils::logging::{log_startup, print_run_summary};

/// 应用主结构
pub struct App {
    config: Config,
    watch: StatusWatch<BrowserFormSession>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> AppResult<Self> {
        log_startup(&config);

        // 连接或启动浏览器
        let browser = match config.browser_debug_port {
            Some(port) => browser::connect_to_browser(port).await?,
            None => browser::launch_headless_browser(config.chrome_executable.as_deref()).await?,
        };
        let session = BrowserFormSession::new(browser, BrowserSessionOptions::from_config(&config));

        let extractor = ResultExtractor::new(
            &config.rejection_phrases,
            ResultFieldIds::from(&config.selectors),
        );
        let orchestrator =
            RetryOrchestrator::new(session, Arc::new(VisionSolver::new(&config)), extractor)
                .with_cancellation(cancel_on_ctrl_c());

        let watch = StatusWatch::new(
            orchestrator,
            Box::new(JsonFileStateStore::new(&config.state_dir)),
            Box::new(ResendNotifier::new(&config)),
            config.recipient_email.clone(),
        );

        Ok(Self { config, watch })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> AppResult<RunReport> {
        let report = self.watch.run(&self.config.run_request()).await?;
        print_run_summary(&report);
        Ok(report)
    }
}

/// 收到 Ctrl-C 时触发取消
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，当前尝试结束后停止");
            trigger.cancel();
        }
    });
    token
}
