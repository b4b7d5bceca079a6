/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::ObservedRecord;
use crate::orchestrator::{NotificationResult, RunReport};

/// 初始化日志
///
/// 默认级别为 info，可通过 `RUST_LOG` 覆盖；输出到 stderr。
/// 重复调用不会 panic（测试中会多次初始化）。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// 密钥类配置只输出掩码
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 签证状态查询启动");
    info!(
        "📋 案件号: {} | 类型: {} | 领馆: {}",
        config.case_number, config.visa_type, config.location
    );
    info!(
        "🔁 最多尝试 {} 次, 失败间隔 {} 秒",
        config.max_attempts,
        config.retry_delay.as_secs()
    );
    info!(
        "📧 通知: {} -> {} (Resend key: {})",
        config.sender_address,
        config.recipient_email,
        mask_secret(&config.resend_api_key)
    );
    info!(
        "🤖 验证码识别模型: {} @ {} (key: {})",
        config.llm_model_name,
        config.llm_api_base_url,
        mask_secret(&config.llm_api_key)
    );
    info!("{}", "=".repeat(60));
}

/// 记录单次尝试开始
///
/// # 参数
/// - `attempt`: 当前尝试编号（从1开始）
/// - `max_attempts`: 最多尝试次数
pub fn log_attempt_start(attempt: u32, max_attempts: u32) {
    info!("\n{}", "─".repeat(60));
    info!("🔄 第 {}/{} 次尝试", attempt, max_attempts);
}

/// 记录查询到的状态
pub fn log_record(record: &ObservedRecord) {
    info!("签证状态: {}", record.status);
    info!("Case Created: {}", record.created_at);
    info!("Case Last Updated: {}", record.last_updated_at);
    info!("详细信息: {}", truncate_text(&record.message, 120));
}

/// 打印运行结果
pub fn print_run_summary(report: &RunReport) {
    info!("\n{}", "=".repeat(60));
    info!("📊 运行完成 (共尝试 {} 次)", report.attempts);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    if report.changed {
        info!("🔔 状态发生变化");
    } else {
        info!("状态未发生变化");
    }
    match &report.notification {
        NotificationResult::Skipped => info!("📭 跳过邮件通知"),
        NotificationResult::Sent => info!("✅ 邮件通知已发送"),
        NotificationResult::Failed(reason) => warn!("⚠️ 邮件通知发送失败: {}", reason),
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

/// 展开错误链，形如 `外层: 内层: 根因`
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

/// 密钥掩码，只保留前 4 个字符
pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}
