//! 验证码图片归一化 - 业务能力层
//!
//! 识别模型不接受的图片统一缩放到固定高度并转成 PNG。

use std::io::Cursor;

use image::imageops::FilterType;
use image::ImageFormat;
use tracing::debug;

use crate::error::SolverError;

/// 归一化后的验证码高度（像素）
pub const NORMALIZED_HEIGHT: u32 = 64;

/// 把验证码缩放到固定高度（保持宽高比，Lanczos3）并重新编码为 PNG
pub fn normalize_challenge_image(bytes: &[u8]) -> Result<Vec<u8>, SolverError> {
    let img = image::load_from_memory(bytes)?;
    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return Err(SolverError::IncompatibleImage {
            reason: format!("图片尺寸无效: {}x{}", width, height),
        });
    }

    let new_width = ((u64::from(width) * u64::from(NORMALIZED_HEIGHT)) / u64::from(height)).max(1);
    let new_width = u32::try_from(new_width).unwrap_or(u32::MAX);
    debug!(
        "验证码归一化: {}x{} -> {}x{}",
        width, height, new_width, NORMALIZED_HEIGHT
    );

    let resized = img.resize_exact(new_width, NORMALIZED_HEIGHT, FilterType::Lanczos3);
    let mut out = Cursor::new(Vec::new());
    resized.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
