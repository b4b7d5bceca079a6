//! 验证码识别 - 业务能力层
//!
//! 识别结果不保证正确，错误的识别由重试编排器通过"验证码被拒绝"分支兜底。

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::SolverError;
use crate::services::image_normalizer::normalize_challenge_image;

/// 验证码识别器
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    /// 把验证码图片识别为文本
    ///
    /// 图片与模型不兼容时返回 `SolverError::IncompatibleImage`，
    /// 调用方可以归一化图片后再试一次。
    async fn classify(&self, image: &[u8]) -> Result<String, SolverError>;
}

/// 识别验证码，图片不兼容时归一化后原地重试一次
///
/// 自愈重试不算一次新的尝试，也不会重新获取验证码。
pub async fn solve_with_self_heal(
    solver: &dyn ChallengeSolver,
    image: &[u8],
) -> Result<String, SolverError> {
    match solver.classify(image).await {
        Err(SolverError::IncompatibleImage { reason }) => {
            warn!("验证码图片不兼容 ({})，归一化后重试识别", reason);
            let normalized = normalize_challenge_image(image)?;
            let token = solver.classify(&normalized).await?;
            info!("归一化后识别成功");
            Ok(token)
        }
        other => other,
    }
}
