//! JS 执行器 - 基础设施层
//!
//! 持有一次尝试所用的 page，只暴露"执行 JS"和页面级操作的能力

use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::SessionError;

/// JS 执行器
///
/// 职责：
/// - 持有 Page 资源，随尝试结束一起关闭
/// - 暴露 eval() 能力
/// - 不认识案件号 / 验证码
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 执行 JS 表达式并返回 JSON 结果
    ///
    /// 始终按表达式求值（`(fn)(args)` 形式的脚本不会被当作函数声明）
    ///
    /// # 参数
    /// - `js_code`: 要执行的 JavaScript 代码
    ///
    /// # 返回
    /// 返回 JSON 值
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue, SessionError> {
        let result = self
            .page
            .evaluate_expression(EvaluateParams::new(js_code.into()))
            .await
            .map_err(|source| SessionError::Cdp {
                action: "执行脚本",
                source,
            })?;
        result
            .into_value()
            .map_err(|e| SessionError::Script(format!("脚本返回值无法解析: {}", e)))
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(
        &self,
        js_code: impl Into<String>,
    ) -> Result<T, SessionError> {
        let json_value = self.eval(js_code).await?;
        serde_json::from_value(json_value)
            .map_err(|e| SessionError::Script(format!("脚本返回值类型不符: {}", e)))
    }

    /// 对指定 id 的元素截图（PNG）
    pub async fn screenshot_element(&self, id: &str) -> Result<Vec<u8>, SessionError> {
        let element = self
            .page
            .find_element(format!("#{}", id))
            .await
            .map_err(|_| SessionError::ElementMissing { id: id.to_string() })?;

        element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|source| SessionError::Cdp {
                action: "元素截图",
                source,
            })
    }

    /// 点击指定 id 的元素
    pub async fn click(&self, id: &str) -> Result<(), SessionError> {
        let element = self
            .page
            .find_element(format!("#{}", id))
            .await
            .map_err(|_| SessionError::ElementMissing { id: id.to_string() })?;

        element.click().await.map_err(|source| SessionError::Cdp {
            action: "点击元素",
            source,
        })?;
        Ok(())
    }

    /// 获取当前页面的 HTML
    pub async fn content(&self) -> Result<String, SessionError> {
        self.page.content().await.map_err(|source| SessionError::Cdp {
            action: "读取页面内容",
            source,
        })
    }

    /// 关闭页面，失败只记录日志
    pub async fn close(self) {
        if let Err(e) = self.page.close().await {
            debug!("关闭页面失败: {}", e);
        }
    }
}
