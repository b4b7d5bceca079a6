//! 单次尝试流程 - 流程层
//!
//! 核心职责：定义"一次尝试"的完整处理流程
//!
//! 流程顺序：
//! 1. 取验证码（新的页面渲染）
//! 2. 识别验证码（不兼容时归一化自愈一次）
//! 3. 覆盖字段后提交
//! 4. 解析结果页面

use tracing::{debug, info};

use crate::error::AttemptFailure;
use crate::models::{AttemptOutcome, SubmissionFields};
use crate::services::{solve_with_self_heal, Challenge, ChallengeSolver, FormSession, ResultExtractor};

/// 单次尝试流程
///
/// - 不持有任何资源，只借用会话、识别器和解析器
/// - 不决定是否重试，只给出本次尝试的结果
/// - 所有故障都归为 `TransientFailure`，不会向外抛错
pub struct AttemptFlow<'a, S: FormSession> {
    session: &'a S,
    solver: &'a dyn ChallengeSolver,
    extractor: &'a ResultExtractor,
}

impl<'a, S: FormSession> AttemptFlow<'a, S> {
    pub fn new(session: &'a S, solver: &'a dyn ChallengeSolver, extractor: &'a ResultExtractor) -> Self {
        Self {
            session,
            solver,
            extractor,
        }
    }

    pub async fn run(&self, fields: &SubmissionFields) -> AttemptOutcome {
        match self.try_run(fields).await {
            Ok(outcome) => outcome,
            Err(failure) => AttemptOutcome::TransientFailure(failure),
        }
    }

    async fn try_run(&self, fields: &SubmissionFields) -> Result<AttemptOutcome, AttemptFailure> {
        let Challenge { image, state } = self.session.fetch_challenge().await?;
        debug!("{} 获取到验证码 ({} 字节)", fields, image.len());

        let token = match solve_with_self_heal(self.solver, &image).await {
            Ok(token) => token,
            Err(e) => {
                self.session.discard(state).await;
                return Err(e.into());
            }
        };
        info!("🔤 识别验证码: {}", token);

        let document = self.session.submit(state, fields, &token).await?;
        let outcome = self.extractor.extract(&document, &fields.case_number);
        debug!("{} 本次尝试结果: {}", fields, outcome.label());

        Ok(outcome)
    }
}
