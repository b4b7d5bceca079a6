//! 浏览器表单会话
//!
//! 每次取验证码都打开一个新页面，提交后关闭，页面不会跨尝试复用。

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Browser;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::{Config, SiteSelectors};
use crate::error::SessionError;
use crate::infrastructure::JsExecutor;
use crate::models::{SubmissionFields, VisaType};
use crate::services::form_session::{Challenge, FormSession, ResponseDocument};

/// 轮询页面状态的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// 触发回发或点击提交后等待页面开始跳转的时间
const SUBMIT_SETTLE: Duration = Duration::from_millis(500);

const ELEMENT_EXISTS_JS: &str = "(id) => document.getElementById(id) !== null";

/// 取值已经正确时不触发事件，避免无谓的回发
const SELECT_OPTION_JS: &str = r#"(id, value) => {
    const el = document.getElementById(id);
    if (!el) return { found: false, changed: false, value: null };
    if (el.value === value) return { found: true, changed: false, value: el.value };
    el.value = value;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return { found: true, changed: true, value: el.value };
}"#;

/// 页面加载完成、下拉框保持期望取值且验证码已出现
const SELECTIONS_SETTLED_JS: &str = r#"(selections, captchaId) => {
    if (document.readyState !== 'complete') return false;
    const kept = selections.every(([id, value]) => {
        const el = document.getElementById(id);
        return el !== null && el.value === value;
    });
    return kept && document.getElementById(captchaId) !== null;
}"#;

const FILL_INPUT_JS: &str = r#"(id, value) => {
    const el = document.getElementById(id);
    if (!el) return false;
    el.focus();
    el.value = value;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
}"#;

const READ_HIDDEN_JS: &str = r#"() => Array.from(document.querySelectorAll('input[type="hidden"]'))
    .filter((el) => el.name)
    .map((el) => ({ name: el.name, value: el.value }))"#;

const RESTORE_HIDDEN_JS: &str = r#"(fields) => {
    let restored = 0;
    for (const field of fields) {
        const el = Array.from(document.querySelectorAll('input[type="hidden"]'))
            .find((candidate) => candidate.name === field.name);
        if (el) {
            el.value = field.value;
            restored += 1;
        }
    }
    return restored;
}"#;

const OUTCOME_READY_JS: &str = r#"(statusId, phrases) => {
    const status = document.getElementById(statusId);
    if (status && status.innerText.trim()) return true;
    const text = (document.body ? document.body.innerText : '').toLowerCase();
    return phrases.some((phrase) => text.includes(phrase));
}"#;

/// 页面上的隐藏字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenField {
    pub name: String,
    pub value: String,
}

/// 浏览器会话的表单状态：本次尝试的页面 + 渲染时读到的隐藏字段
pub struct BrowserFormState {
    executor: JsExecutor,
    hidden_fields: Vec<HiddenField>,
}

impl BrowserFormState {
    /// 渲染时读到的隐藏字段
    pub fn hidden_fields(&self) -> &[HiddenField] {
        &self.hidden_fields
    }
}

/// 浏览器会话配置
#[derive(Debug, Clone)]
pub struct BrowserSessionOptions {
    pub target_url: String,
    pub selectors: SiteSelectors,
    pub page_timeout: Duration,
    /// 用于判断提交结果是否已渲染
    pub rejection_phrases: Vec<String>,
    /// 取验证码前预先选择的签证类型和领馆
    pub visa_type: VisaType,
    pub location: String,
}

impl BrowserSessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_url: config.target_url.clone(),
            selectors: config.selectors.clone(),
            page_timeout: config.page_timeout,
            rejection_phrases: config
                .rejection_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            visa_type: config.visa_type,
            location: config.location.clone(),
        }
    }
}

/// 基于无头浏览器的表单会话
pub struct BrowserFormSession {
    browser: Browser,
    options: BrowserSessionOptions,
}

impl BrowserFormSession {
    pub fn new(browser: Browser, options: BrowserSessionOptions) -> Self {
        Self { browser, options }
    }

    /// 打开新页面并准备好验证码
    async fn prepare(&self, executor: &JsExecutor) -> Result<(Vec<u8>, Vec<HiddenField>), SessionError> {
        let selectors = &self.options.selectors;

        self.wait_for_element(executor, &selectors.visa_type).await?;

        // 每次选择都可能触发回发，回发结束后再操作下一个下拉框
        let mut selections: Vec<(&str, &str)> = Vec::with_capacity(2);
        for (id, value) in [
            (selectors.visa_type.as_str(), self.options.visa_type.code()),
            (selectors.location.as_str(), self.options.location.as_str()),
        ] {
            let changed = select_option(executor, id, value).await?;
            selections.push((id, value));
            if changed {
                sleep(SUBMIT_SETTLE).await;
            }
            self.wait_for_settled(executor, &selections).await?;
        }

        let hidden_fields: Vec<HiddenField> =
            executor.eval_as(format!("({})()", READ_HIDDEN_JS)).await?;
        debug!("读取到 {} 个隐藏字段", hidden_fields.len());

        let image = executor.screenshot_element(&selectors.captcha_image).await?;
        debug!("验证码截图 {} 字节", image.len());

        Ok((image, hidden_fields))
    }

    /// 回填隐藏字段、覆盖查询字段和验证码后提交
    async fn fill_and_submit(
        &self,
        executor: &JsExecutor,
        hidden_fields: &[HiddenField],
        fields: &SubmissionFields,
        challenge_token: &str,
    ) -> Result<ResponseDocument, SessionError> {
        let selectors = &self.options.selectors;

        let restored: usize = executor
            .eval_as(format!(
                "({})({})",
                RESTORE_HIDDEN_JS,
                to_js_literal(&hidden_fields)?
            ))
            .await?;
        if restored != hidden_fields.len() {
            warn!(
                "隐藏字段回填不完整: {}/{}",
                restored,
                hidden_fields.len()
            );
        }

        // 只核对下拉框，不再触发 change，否则回发会换掉已截图的验证码
        let selections = [
            (selectors.visa_type.as_str(), fields.visa_type.code()),
            (selectors.location.as_str(), fields.location.as_str()),
        ];
        if !self.selections_settled(executor, &selections).await? {
            return Err(SessionError::Script(
                "下拉框取值与获取验证码时不一致".to_string(),
            ));
        }
        fill_input(executor, &selectors.case_number, fields.case_number.as_str()).await?;
        fill_input(executor, &selectors.passport_number, &fields.passport_number).await?;
        fill_input(executor, &selectors.surname, &fields.surname).await?;
        fill_input(executor, &selectors.captcha_input, challenge_token).await?;

        info!("📤 正在提交查询表单...");
        executor.click(&selectors.submit_button).await?;
        sleep(SUBMIT_SETTLE).await;

        self.wait_for_outcome(executor).await;

        let html = executor.content().await?;
        Ok(ResponseDocument::new(html))
    }

    /// 等待元素出现
    async fn wait_for_element(&self, executor: &JsExecutor, id: &str) -> Result<(), SessionError> {
        let deadline = Instant::now() + self.options.page_timeout;
        let script = format!("({})({})", ELEMENT_EXISTS_JS, to_js_literal(&id)?);

        loop {
            // 页面跳转期间脚本可能执行失败，继续等待
            if let Ok(true) = executor.eval_as::<bool>(script.clone()).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SessionError::ElementMissing { id: id.to_string() });
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// 下拉框取值是否保持且验证码已出现
    async fn selections_settled(
        &self,
        executor: &JsExecutor,
        selections: &[(&str, &str)],
    ) -> Result<bool, SessionError> {
        let script = format!(
            "({})({}, {})",
            SELECTIONS_SETTLED_JS,
            to_js_literal(selections)?,
            to_js_literal(&self.options.selectors.captcha_image)?
        );
        executor.eval_as::<bool>(script).await
    }

    /// 等待回发结束：页面加载完成、下拉框取值保持、验证码出现
    async fn wait_for_settled(
        &self,
        executor: &JsExecutor,
        selections: &[(&str, &str)],
    ) -> Result<(), SessionError> {
        let deadline = Instant::now() + self.options.page_timeout;

        loop {
            // 回发期间脚本可能执行失败，继续等待
            if let Ok(true) = self.selections_settled(executor, selections).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SessionError::Script(format!(
                    "选择下拉框后页面未稳定 ({} 秒)",
                    self.options.page_timeout.as_secs()
                )));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// 等待结果或拒绝提示渲染出来，超时后交给解析器判断
    async fn wait_for_outcome(&self, executor: &JsExecutor) {
        let deadline = Instant::now() + self.options.page_timeout;
        let script = match (
            to_js_literal(&self.options.selectors.result_status),
            to_js_literal(&self.options.rejection_phrases),
        ) {
            (Ok(status), Ok(phrases)) => format!("({})({}, {})", OUTCOME_READY_JS, status, phrases),
            _ => return,
        };

        loop {
            if let Ok(true) = executor.eval_as::<bool>(script.clone()).await {
                return;
            }
            if Instant::now() >= deadline {
                warn!(
                    "等待查询结果超时 ({} 秒)",
                    self.options.page_timeout.as_secs()
                );
                return;
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl FormSession for BrowserFormSession {
    type State = BrowserFormState;

    async fn fetch_challenge(&self) -> Result<Challenge<Self::State>, SessionError> {
        debug!("打开查询页面: {}", self.options.target_url);
        let page = self
            .browser
            .new_page(self.options.target_url.as_str())
            .await
            .map_err(|source| SessionError::Cdp {
                action: "打开查询页面",
                source,
            })?;
        let executor = JsExecutor::new(page);

        match self.prepare(&executor).await {
            Ok((image, hidden_fields)) => Ok(Challenge {
                image,
                state: BrowserFormState {
                    executor,
                    hidden_fields,
                },
            }),
            Err(e) => {
                executor.close().await;
                Err(e)
            }
        }
    }

    async fn submit(
        &self,
        state: Self::State,
        fields: &SubmissionFields,
        challenge_token: &str,
    ) -> Result<ResponseDocument, SessionError> {
        let BrowserFormState {
            executor,
            hidden_fields,
        } = state;

        let result = self
            .fill_and_submit(&executor, &hidden_fields, fields, challenge_token)
            .await;
        executor.close().await;
        result
    }

    async fn discard(&self, state: Self::State) {
        state.executor.close().await;
    }
}

/// 下拉框选择脚本的返回值
#[derive(Debug, Deserialize)]
struct SelectResult {
    found: bool,
    changed: bool,
    value: Option<String>,
}

impl SelectResult {
    /// 返回是否触发了 change 事件
    fn into_changed(self, id: &str, expected: &str) -> Result<bool, SessionError> {
        if !self.found {
            return Err(SessionError::ElementMissing { id: id.to_string() });
        }
        if self.value.as_deref() != Some(expected) {
            return Err(SessionError::Script(format!(
                "下拉框 #{} 没有选项 '{}'",
                id, expected
            )));
        }
        Ok(self.changed)
    }
}

/// 选择下拉框，返回是否实际改变了取值
async fn select_option(executor: &JsExecutor, id: &str, value: &str) -> Result<bool, SessionError> {
    let script = format!(
        "({})({}, {})",
        SELECT_OPTION_JS,
        to_js_literal(&id)?,
        to_js_literal(&value)?
    );
    executor
        .eval_as::<SelectResult>(script)
        .await?
        .into_changed(id, value)
}

async fn fill_input(executor: &JsExecutor, id: &str, value: &str) -> Result<(), SessionError> {
    let script = format!(
        "({})({}, {})",
        FILL_INPUT_JS,
        to_js_literal(&id)?,
        to_js_literal(&value)?
    );
    if executor.eval_as::<bool>(script).await? {
        Ok(())
    } else {
        Err(SessionError::ElementMissing { id: id.to_string() })
    }
}

/// 序列化为可直接嵌入脚本的 JS 字面量
fn to_js_literal<T: Serialize + ?Sized>(value: &T) -> Result<String, SessionError> {
    serde_json::to_string(value).map_err(|e| SessionError::Script(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::launch_headless_browser;

    #[test]
    fn test_js_literal_escapes_quotes() {
        let literal = to_js_literal(&"O'Brien \"Jr\"").unwrap();
        assert_eq!(literal, r#""O'Brien \"Jr\"""#);
    }

    #[test]
    fn test_hidden_fields_serialize_as_name_value_pairs() {
        let fields = vec![HiddenField {
            name: "__VIEWSTATE".to_string(),
            value: "abc".to_string(),
        }];
        let literal = to_js_literal(&fields).unwrap();
        assert_eq!(literal, r#"[{"name":"__VIEWSTATE","value":"abc"}]"#);
    }

    fn select_result(json: &str) -> SelectResult {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_select_already_set_reports_no_change() {
        let result = select_result(r#"{"found":true,"changed":false,"value":"NIV"}"#);
        assert!(!result.into_changed("Visa_Application_Type", "NIV").unwrap());
    }

    #[test]
    fn test_select_new_value_reports_change() {
        let result = select_result(r#"{"found":true,"changed":true,"value":"GUZ"}"#);
        assert!(result.into_changed("Location_Dropdown", "GUZ").unwrap());
    }

    #[test]
    fn test_select_missing_element_or_option_fails() {
        let missing = select_result(r#"{"found":false,"changed":false,"value":null}"#);
        assert!(matches!(
            missing.into_changed("Location_Dropdown", "GUZ"),
            Err(SessionError::ElementMissing { .. })
        ));

        // 没有该选项时浏览器会把取值置空
        let no_option = select_result(r#"{"found":true,"changed":true,"value":""}"#);
        assert!(matches!(
            no_option.into_changed("Location_Dropdown", "XXX"),
            Err(SessionError::Script(_))
        ));
    }

    #[test]
    fn test_selections_serialize_as_id_value_pairs() {
        let selections = [("Visa_Application_Type", "NIV"), ("Location_Dropdown", "GUZ")];
        let literal = to_js_literal(&selections[..]).unwrap();
        assert_eq!(
            literal,
            r#"[["Visa_Application_Type","NIV"],["Location_Dropdown","GUZ"]]"#
        );
    }

    /// 访问真实站点，手动运行：cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_fetch_challenge_from_live_site() {
        crate::utils::logging::init();

        let browser = launch_headless_browser(None)
            .await
            .expect("启动浏览器失败");
        let options = BrowserSessionOptions {
            target_url: "https://ceac.state.gov/CEACStatTracker/Status.aspx".to_string(),
            selectors: SiteSelectors::default(),
            page_timeout: Duration::from_secs(30),
            rejection_phrases: vec!["invalid".to_string(), "incorrect".to_string()],
            visa_type: VisaType::NonImmigrant,
            location: "GUZ".to_string(),
        };
        let session = BrowserFormSession::new(browser, options);

        let challenge = session.fetch_challenge().await.expect("获取验证码失败");
        assert!(!challenge.image.is_empty());
        assert!(!challenge.state.hidden_fields().is_empty());
    }
}
