//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、运行）
//! - 装配浏览器会话、识别器、状态存储、通知
//!
//! ### `retry_orchestrator` - 重试编排器
//! - 反复执行单次尝试，区分"验证码被拒绝"和"瞬时失败"
//! - 控制尝试次数和失败间隔，响应外部取消
//!
//! ### `status_watch` - 比对与通知
//! - 与历史状态比较，有变化时通知，最后保存
//!
//! ## 层次关系
//!
//! ```text
//! app
//!     ↓
//! status_watch (比对 / 通知 / 保存)
//!     ↓
//! retry_orchestrator (处理多次尝试)
//!     ↓
//! workflow::AttemptFlow (处理单次尝试)
//!     ↓
//! services (能力层：会话 / 识别 / 解析 / 存储 / 通知)
//!     ↓
//! infrastructure (基础设施：JsExecutor)
//! ```

pub mod app;
pub mod retry_orchestrator;
pub mod status_watch;

// 重新导出主要类型
pub use app::App;
pub use retry_orchestrator::{Pacer, Retrieved, RetryOrchestrator, TokioPacer};
pub use status_watch::{NotificationResult, RunReport, StatusWatch};
