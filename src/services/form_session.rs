//! 表单会话 - 业务能力层
//!
//! 一次尝试 = 取验证码 + 提交表单。验证码和页面上的隐藏状态
//! （会话 cookie、防伪 token、隐藏字段）来自同一次页面渲染，必须成对使用。

use async_trait::async_trait;

use crate::error::SessionError;
use crate::models::SubmissionFields;

/// 一次取验证码的结果
pub struct Challenge<S> {
    /// 验证码图片
    pub image: Vec<u8>,
    /// 与该验证码配对的表单状态，原样传给 `submit`
    pub state: S,
}

/// 提交后返回的页面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDocument {
    pub html: String,
}

impl ResponseDocument {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }
}

/// 表单会话
///
/// `State` 对编排层不透明，且 `submit` 按值接收，
/// 一份状态只能提交一次，下一次尝试必须重新 `fetch_challenge`。
#[async_trait]
pub trait FormSession: Send + Sync {
    type State: Send;

    /// 打开新的页面渲染，返回验证码图片及配对的表单状态
    async fn fetch_challenge(&self) -> Result<Challenge<Self::State>, SessionError>;

    /// 在表单状态上覆盖查询字段和验证码后提交，返回结果页面
    async fn submit(
        &self,
        state: Self::State,
        fields: &SubmissionFields,
        challenge_token: &str,
    ) -> Result<ResponseDocument, SessionError>;

    /// 放弃未提交的表单状态（例如验证码识别失败时）
    async fn discard(&self, _state: Self::State) {}
}
