//! # Visa Status Watch
//!
//! 定时查询签证案件状态，状态变化时发送邮件通知的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 单次尝试的 page owner，提供 eval() / 截图 / 点击能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个能力都是可替换的接口
//! - `FormSession` - 取验证码 / 提交表单（`BrowserFormSession`）
//! - `ChallengeSolver` - 验证码识别（`VisionSolver`，不兼容时归一化自愈）
//! - `ResultExtractor` - 解析结果页面
//! - `StateStore` - 历史状态（`JsonFileStateStore`）
//! - `Notifier` - 邮件通知（`ResendNotifier`）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次尝试"的完整流程
//! - `AttemptFlow` - 取验证码 → 识别 → 提交 → 解析
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/retry_orchestrator` - 重试循环，区分验证码被拒与瞬时失败
//! - `orchestrator/status_watch` - 比对历史状态、通知、保存
//! - `orchestrator/app` - 装配所有组件
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{ObservedRecord, PersistedState, RunRequest, TrackedIdentifier};
pub use orchestrator::{App, NotificationResult, RetryOrchestrator, RunReport, StatusWatch};
pub use workflow::AttemptFlow;
