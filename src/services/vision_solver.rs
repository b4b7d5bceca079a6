//! 视觉模型验证码识别
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的视觉模型服务（可自定义端点和模型）
//! - 验证码以 base64 data URL 的形式随消息发送

use std::io::Cursor;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{ImageFormat, ImageReader};
use tracing::debug;

use crate::config::Config;
use crate::error::SolverError;
use crate::services::challenge_solver::ChallengeSolver;
use crate::services::image_normalizer::NORMALIZED_HEIGHT;

const SYSTEM_PROMPT: &str = "你是一个验证码识别助手。图片中是一个由字母和数字组成的验证码，\
只输出验证码本身的字符，不要输出任何解释、空格或标点。";

const USER_PROMPT: &str = "请识别这张验证码图片中的字符。";

/// 基于视觉模型的验证码识别器
pub struct VisionSolver {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl VisionSolver {
    /// 创建新的识别器
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        }
    }

    async fn ask_model(&self, data_url: String) -> Result<String, SolverError> {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_PROMPT)
            .build()?;

        let content_parts = vec![
            ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: USER_PROMPT.to_string(),
                },
            ),
            ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: data_url,
                        detail: Some(ImageDetail::High),
                    },
                },
            ),
        ];
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
            .build()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(0.0)
            .max_tokens(32u32)
            .build()?;

        let response = self.client.chat().create(request).await?;

        Ok(response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ChallengeSolver for VisionSolver {
    async fn classify(&self, image: &[u8]) -> Result<String, SolverError> {
        let format = check_compatibility(image)?;
        debug!("调用识别模型 {}，图片 {} 字节", self.model_name, image.len());

        let data_url = format!(
            "data:{};base64,{}",
            format.to_mime_type(),
            STANDARD.encode(image)
        );
        let raw = self.ask_model(data_url).await?;

        let token = clean_token(&raw);
        if token.is_empty() {
            return Err(SolverError::EmptyAnswer { raw });
        }
        debug!("识别结果: {}", token);
        Ok(token)
    }
}

/// 检查图片能否直接交给模型
///
/// 只接受 PNG / JPEG / WebP / GIF，且高度不超过归一化高度。
fn check_compatibility(image: &[u8]) -> Result<ImageFormat, SolverError> {
    let reader = ImageReader::new(Cursor::new(image))
        .with_guessed_format()
        .map_err(|e| SolverError::IncompatibleImage {
            reason: format!("无法读取图片: {}", e),
        })?;

    let format = match reader.format() {
        Some(f @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP | ImageFormat::Gif)) => f,
        Some(other) => {
            return Err(SolverError::IncompatibleImage {
                reason: format!("不支持的图片格式 {:?}", other),
            })
        }
        None => {
            return Err(SolverError::IncompatibleImage {
                reason: "无法识别图片格式".to_string(),
            })
        }
    };

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| SolverError::IncompatibleImage {
            reason: format!("无法读取图片尺寸: {}", e),
        })?;
    if height > NORMALIZED_HEIGHT {
        return Err(SolverError::IncompatibleImage {
            reason: format!("图片尺寸 {}x{} 超过 {} 像素高度", width, height, NORMALIZED_HEIGHT),
        });
    }

    Ok(format)
}

/// 只保留字母和数字
fn clean_token(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb([0u8, 0, 0]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_clean_token() {
        assert_eq!(clean_token("AB12C"), "AB12C");
        assert_eq!(clean_token("验证码是: `x7 K9p`。"), "x7K9p");
        assert_eq!(clean_token("  \n"), "");
    }

    #[test]
    fn test_small_png_is_compatible() {
        assert_eq!(
            check_compatibility(&encode(160, 50, ImageFormat::Png)).unwrap(),
            ImageFormat::Png
        );
    }

    #[test]
    fn test_tall_image_is_incompatible() {
        let err = check_compatibility(&encode(300, 120, ImageFormat::Png)).unwrap_err();
        assert!(matches!(err, SolverError::IncompatibleImage { .. }));
    }

    #[test]
    fn test_bmp_is_incompatible() {
        let err = check_compatibility(&encode(160, 50, ImageFormat::Bmp)).unwrap_err();
        assert!(matches!(err, SolverError::IncompatibleImage { .. }));
    }

    #[test]
    fn test_unknown_bytes_are_incompatible() {
        let err = check_compatibility(b"definitely not an image").unwrap_err();
        assert!(matches!(err, SolverError::IncompatibleImage { .. }));
    }
}
