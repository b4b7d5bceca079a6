//! 查询请求
//!
//! 封装"查哪个案件、用什么身份信息查、最多查几次"这一信息

use std::fmt::Display;
use std::num::NonZeroU32;
use std::time::Duration;

use crate::models::{TrackedIdentifier, VisaType};

/// 表单上需要填写的字段
#[derive(Debug, Clone)]
pub struct SubmissionFields {
    /// 案件号
    pub case_number: TrackedIdentifier,
    /// 护照号
    pub passport_number: String,
    /// 姓氏
    pub surname: String,
    /// 签证类型
    pub visa_type: VisaType,
    /// 领馆代码
    pub location: String,
}

impl Display for SubmissionFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[案件 {} 类型 {} 领馆 {}]",
            self.case_number,
            self.visa_type.code(),
            self.location
        )
    }
}

/// 重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 最多尝试次数
    pub max_attempts: NonZeroU32,
    /// 瞬时失败后的固定等待时间
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: NonZeroU32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay,
        }
    }
}

/// 一次运行的完整请求
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub fields: SubmissionFields,
    pub policy: RetryPolicy,
}

impl RunRequest {
    pub fn new(fields: SubmissionFields, policy: RetryPolicy) -> Self {
        Self { fields, policy }
    }

    pub fn identifier(&self) -> &TrackedIdentifier {
        &self.fields.case_number
    }
}
