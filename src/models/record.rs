//! 查询结果模型
//!
//! 一次成功查询得到的 `ObservedRecord`、跨运行持久化的 `PersistedState`，
//! 以及只在单次运行内存在的 `AttemptOutcome`。

use std::fmt::Display;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::AttemptFailure;

/// 被跟踪的案件号
///
/// 既是查询参数，也是持久化状态的分区键
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackedIdentifier(String);

impl TrackedIdentifier {
    /// 创建案件号，空白字符串返回 `None`
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TrackedIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 一次成功查询的结果
///
/// 四个字段都是页面上渲染出来的原始文本，日期不做解析。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedRecord {
    /// 当前状态
    pub status: String,
    /// 案件创建时间
    pub created_at: String,
    /// 最近一次状态变更时间
    pub last_updated_at: String,
    /// 详细信息
    pub message: String,
}

impl ObservedRecord {
    /// 与上一次的记录相比是否有实质变化
    ///
    /// `created_at` 对同一案件不会变化，不参与比较。
    pub fn changed_since(&self, previous: &ObservedRecord) -> bool {
        self.status != previous.status
            || self.last_updated_at != previous.last_updated_at
            || self.message != previous.message
    }
}

/// 持久化的上一次观测结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(flatten)]
    pub record: ObservedRecord,
    /// 写入时间
    pub captured_at: DateTime<Local>,
}

impl PersistedState {
    pub fn capture(record: ObservedRecord) -> Self {
        Self {
            record,
            captured_at: Local::now(),
        }
    }
}

/// 单次尝试的结果
#[derive(Debug)]
pub enum AttemptOutcome {
    /// 成功获取到完整记录
    Success(ObservedRecord),
    /// 验证码被拒绝，立即重试
    ChallengeRejected,
    /// 瞬时失败，等待后重试
    TransientFailure(AttemptFailure),
}

impl AttemptOutcome {
    /// 结果的简短标签（用于日志）
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Success(_) => "success",
            AttemptOutcome::ChallengeRejected => "challenge-rejected",
            AttemptOutcome::TransientFailure(_) => "transient-failure",
        }
    }
}
