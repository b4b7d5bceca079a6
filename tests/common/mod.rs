//! 集成测试用的替身实现
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use visa_status_watch::config::SiteSelectors;
use visa_status_watch::error::{DeliveryError, SessionError, SolverError, StoreError};
use visa_status_watch::models::{
    ObservedRecord, PersistedState, RetryPolicy, RunRequest, SubmissionFields, TrackedIdentifier,
    VisaType,
};
use visa_status_watch::orchestrator::Pacer;
use visa_status_watch::services::{
    Challenge, ChallengeSolver, FormSession, Notifier, ResponseDocument, ResultExtractor,
    ResultFieldIds, StateStore,
};

pub const CASE: &str = "AA00ABCDEF";

pub fn identifier() -> TrackedIdentifier {
    TrackedIdentifier::new(CASE).unwrap()
}

pub fn request(max_attempts: u32) -> RunRequest {
    RunRequest::new(
        SubmissionFields {
            case_number: identifier(),
            passport_number: "E12345678".to_string(),
            surname: "ZHANG".to_string(),
            visa_type: VisaType::NonImmigrant,
            location: "GUZ".to_string(),
        },
        RetryPolicy::new(NonZeroU32::new(max_attempts).unwrap(), Duration::from_secs(5)),
    )
}

pub fn extractor() -> ResultExtractor {
    ResultExtractor::new(
        &["invalid".to_string(), "incorrect".to_string()],
        ResultFieldIds::from(&SiteSelectors::default()),
    )
}

pub fn record(status: &str, created: &str, updated: &str, message: &str) -> ObservedRecord {
    ObservedRecord {
        status: status.to_string(),
        created_at: created.to_string(),
        last_updated_at: updated.to_string(),
        message: message.to_string(),
    }
}

/// 渲染一个 CEAC 风格的结果页面
pub fn status_page(case: &str, record: &ObservedRecord) -> String {
    format!(
        r#"<html><body><form id="aspnetForm">
        <input type="hidden" name="__VIEWSTATE" value="dDwtMTA4" />
        <span id="ctl00_ContentPlaceHolder1_ucApplicationStatusView_lblCaseNo">{}</span>
        <span id="ctl00_ContentPlaceHolder1_ucApplicationStatusView_lblStatus">{}</span>
        <span id="ctl00_ContentPlaceHolder1_ucApplicationStatusView_lblSubmitDate">{}</span>
        <span id="ctl00_ContentPlaceHolder1_ucApplicationStatusView_lblStatusDate">{}</span>
        <span id="ctl00_ContentPlaceHolder1_ucApplicationStatusView_lblMessage">{}</span>
        </form></body></html>"#,
        case, record.status, record.created_at, record.last_updated_at, record.message
    )
}

pub const REJECTED_PAGE: &str = r#"<html><body><form>
    <span id="ctl00_ContentPlaceHolder1_lblError" style="color:red">Invalid Code. Please try again.</span>
    </form></body></html>"#;

/// 没有状态字段、也没有拒绝提示的页面
pub const INCOMPLETE_PAGE: &str = r#"<html><body><form>
    <span id="ctl00_ContentPlaceHolder1_ucApplicationStatusView_lblCaseNo">AA00ABCDEF</span>
    <span id="ctl00_ContentPlaceHolder1_ucApplicationStatusView_lblSubmitDate">01-Jan-2024</span>
    <span id="ctl00_ContentPlaceHolder1_ucApplicationStatusView_lblStatusDate">01-Jan-2024</span>
    <span id="ctl00_ContentPlaceHolder1_ucApplicationStatusView_lblMessage">Pending</span>
    </form></body></html>"#;

/// 会话事件，用于检查"先取验证码再提交"的顺序
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Fetch(u32),
    Submit { challenge: u32, token: String },
}

/// 按脚本返回结果页面的会话
pub struct ScriptedSession {
    responses: Mutex<VecDeque<Result<String, SessionError>>>,
    serial: Mutex<u32>,
    pub events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl ScriptedSession {
    pub fn new(responses: Vec<Result<String, SessionError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            serial: Mutex::new(0),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn submissions(events: &[SessionEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Submit { .. }))
            .count()
    }
}

#[async_trait]
impl FormSession for ScriptedSession {
    type State = u32;

    async fn fetch_challenge(&self) -> Result<Challenge<u32>, SessionError> {
        let mut serial = self.serial.lock().unwrap();
        *serial += 1;
        self.events.lock().unwrap().push(SessionEvent::Fetch(*serial));
        Ok(Challenge {
            image: format!("captcha-{}", serial).into_bytes(),
            state: *serial,
        })
    }

    async fn submit(
        &self,
        state: u32,
        _fields: &SubmissionFields,
        challenge_token: &str,
    ) -> Result<ResponseDocument, SessionError> {
        self.events.lock().unwrap().push(SessionEvent::Submit {
            challenge: state,
            token: challenge_token.to_string(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SessionError::Other("没有更多脚本响应".to_string())))
            .map(ResponseDocument::new)
    }
}

/// 把图片内容原样作为识别结果
pub struct EchoSolver;

#[async_trait]
impl ChallengeSolver for EchoSolver {
    async fn classify(&self, image: &[u8]) -> Result<String, SolverError> {
        Ok(String::from_utf8_lossy(image).replace('-', ""))
    }
}

/// 只记录等待次数，不真正等待
#[derive(Default)]
pub struct CountingPacer {
    pub pauses: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Pacer for CountingPacer {
    async fn pause(&self, delay: Duration) {
        self.pauses.lock().unwrap().push(delay);
    }
}

/// 内存状态存储
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    pub states: Arc<Mutex<HashMap<String, PersistedState>>>,
    pub persist_calls: Arc<Mutex<u32>>,
}

impl MemoryStateStore {
    pub fn with_state(identifier: &TrackedIdentifier, state: PersistedState) -> Self {
        let store = Self::default();
        store
            .states
            .lock()
            .unwrap()
            .insert(identifier.as_str().to_string(), state);
        store
    }

    pub fn get(&self, identifier: &TrackedIdentifier) -> Option<PersistedState> {
        self.states.lock().unwrap().get(identifier.as_str()).cloned()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, identifier: &TrackedIdentifier) -> Result<Option<PersistedState>, StoreError> {
        Ok(self.get(identifier))
    }

    fn persist(
        &self,
        identifier: &TrackedIdentifier,
        candidate: &ObservedRecord,
    ) -> Result<PersistedState, StoreError> {
        *self.persist_calls.lock().unwrap() += 1;
        let state = PersistedState::capture(candidate.clone());
        self.states
            .lock()
            .unwrap()
            .insert(identifier.as_str().to_string(), state.clone());
        Ok(state)
    }
}

/// 发出的一封通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub subject: String,
    pub body: String,
    pub recipient: String,
}

/// 记录通知的发送器，可配置为总是失败
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub sent: Arc<Mutex<Vec<SentMessage>>>,
    pub fail: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(SentMessage {
            subject: subject.to_string(),
            body: body.to_string(),
            recipient: recipient.to_string(),
        });
        if self.fail {
            Err(DeliveryError::Rejected {
                status: 503,
                body: "service unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}
