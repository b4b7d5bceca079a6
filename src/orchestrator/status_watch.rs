//! 状态比对与通知 - 编排层
//!
//! 运行开始时读取一次历史状态；拿到记录后与之比较 → 有变化则发通知 → 无论通知成败都保存新状态。
//! 通知失败不回滚保存，下次运行不会因为同一份记录再次通知。

use tracing::{info, warn};

use crate::error::RunError;
use crate::models::{ObservedRecord, RunRequest};
use crate::orchestrator::retry_orchestrator::RetryOrchestrator;
use crate::services::{changed_against, FormSession, NotificationMessage, Notifier, StateStore};
use crate::utils::logging::{error_chain, log_record};

/// 通知结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationResult {
    /// 状态未变化，没有发送
    Skipped,
    /// 已发送
    Sent,
    /// 发送失败（不影响运行结果）
    Failed(String),
}

/// 一次运行的结果
#[derive(Debug, Clone)]
pub struct RunReport {
    pub record: ObservedRecord,
    pub attempts: u32,
    pub changed: bool,
    pub notification: NotificationResult,
}

/// 查询 + 比对 + 通知
pub struct StatusWatch<S: FormSession> {
    orchestrator: RetryOrchestrator<S>,
    store: Box<dyn StateStore>,
    notifier: Box<dyn Notifier>,
    recipient: String,
}

impl<S: FormSession> StatusWatch<S> {
    pub fn new(
        orchestrator: RetryOrchestrator<S>,
        store: Box<dyn StateStore>,
        notifier: Box<dyn Notifier>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            store,
            notifier,
            recipient: recipient.into(),
        }
    }

    pub async fn run(&self, request: &RunRequest) -> Result<RunReport, RunError> {
        let identifier = request.identifier();

        // 历史状态只在开始时读取一次，读取失败按"无历史状态"处理
        let previous = match self.store.load(identifier) {
            Ok(previous) => previous,
            Err(e) => {
                warn!("⚠️ 读取历史状态失败，按状态已变化处理: {}", error_chain(&e));
                None
            }
        };

        let retrieved = self.orchestrator.run(request).await?;
        let record = retrieved.record;
        log_record(&record);

        let changed = changed_against(previous.as_ref(), &record);

        let notification = if changed {
            info!("🔔 状态发生变化，发送邮件通知...");
            let message = NotificationMessage::for_record(&record);
            match self
                .notifier
                .send(&message.subject, &message.body, &self.recipient)
                .await
            {
                Ok(()) => NotificationResult::Sent,
                Err(e) => {
                    let reason = error_chain(&e);
                    warn!("⚠️ 邮件通知发送失败: {}", reason);
                    NotificationResult::Failed(reason)
                }
            }
        } else {
            info!("状态未发生变化，跳过邮件通知");
            NotificationResult::Skipped
        };

        // 保存新状态
        self.store.persist(identifier, &record)?;

        Ok(RunReport {
            record,
            attempts: retrieved.attempts,
            changed,
            notification,
        })
    }
}
