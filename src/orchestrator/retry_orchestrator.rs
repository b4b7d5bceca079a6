//! 重试编排器 - 编排层
//!
//! ## 职责
//!
//! 反复执行单次尝试流程，直到拿到结果或用完尝试次数。
//!
//! ## 重试规则
//!
//! - 成功：立即返回，不再尝试
//! - 验证码被拒绝：计一次尝试，不等待，下一次重新取验证码
//! - 瞬时失败（网络、会话、识别、响应不完整、案件号不匹配）：
//!   计一次尝试，还有机会时等待固定间隔后重试
//! - 用完次数：返回 `RetryExhausted`，携带最后一次的失败原因
//!
//! 外部取消只在两次尝试之间生效，不会打断正在进行的提交。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{AttemptFailure, RunError};
use crate::models::{AttemptOutcome, ObservedRecord, RunRequest};
use crate::services::{ChallengeSolver, FormSession, ResultExtractor};
use crate::utils::logging::{error_chain, log_attempt_start};
use crate::workflow::AttemptFlow;

/// 两次尝试之间的等待
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, delay: Duration);
}

/// 基于 tokio 定时器的等待
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// 成功获取的记录
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub record: ObservedRecord,
    /// 用掉的尝试次数（含成功的那一次）
    pub attempts: u32,
}

/// 重试编排器
pub struct RetryOrchestrator<S: FormSession> {
    session: S,
    solver: Arc<dyn ChallengeSolver>,
    extractor: ResultExtractor,
    pacer: Arc<dyn Pacer>,
    cancel: CancellationToken,
}

impl<S: FormSession> RetryOrchestrator<S> {
    pub fn new(session: S, solver: Arc<dyn ChallengeSolver>, extractor: ResultExtractor) -> Self {
        Self {
            session,
            solver,
            extractor,
            pacer: Arc::new(TokioPacer),
            cancel: CancellationToken::new(),
        }
    }

    /// 替换等待实现
    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    /// 绑定外部取消信号
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 执行重试循环
    pub async fn run(&self, request: &RunRequest) -> Result<Retrieved, RunError> {
        let max_attempts = request.policy.max_attempts.get();
        let flow = AttemptFlow::new(&self.session, self.solver.as_ref(), &self.extractor);
        let mut attempt = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                warn!("收到取消信号，停止重试");
                return Err(RunError::Cancelled {
                    completed_attempts: attempt,
                });
            }

            attempt += 1;
            log_attempt_start(attempt, max_attempts);

            let failure = match flow.run(&request.fields).await {
                AttemptOutcome::Success(record) => {
                    info!("✓ 第 {} 次尝试成功", attempt);
                    return Ok(Retrieved {
                        record,
                        attempts: attempt,
                    });
                }
                AttemptOutcome::ChallengeRejected => {
                    warn!("验证码错误 (第 {} 次尝试)", attempt);
                    AttemptFailure::ChallengeRejected
                }
                AttemptOutcome::TransientFailure(cause) => {
                    warn!("第 {} 次尝试失败: {}", attempt, error_chain(&cause));
                    cause
                }
            };

            if attempt >= max_attempts {
                error!("已达到最大尝试次数 {}，放弃", max_attempts);
                return Err(RunError::RetryExhausted {
                    attempts: attempt,
                    last_cause: failure,
                });
            }

            if matches!(failure, AttemptFailure::ChallengeRejected) {
                info!("重新获取验证码后立即重试...");
                continue;
            }

            let delay = request.policy.retry_delay;
            info!("等待 {} 秒后重试...", delay.as_secs());
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    warn!("等待期间收到取消信号，停止重试");
                    return Err(RunError::Cancelled {
                        completed_attempts: attempt,
                    });
                }
                _ = self.pacer.pause(delay) => {}
            }
        }
    }
}
