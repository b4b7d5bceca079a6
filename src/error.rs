//! 错误类型
//!
//! 每一层一个错误枚举，`AppError` 汇总对外暴露的错误。
//! 可恢复的错误（验证码被拒、瞬时失败）只在重试编排器内部流转，
//! 只有 `RunError::RetryExhausted` 这类终止性错误会越过编排层。

use thiserror::Error;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 必填项缺失
    #[error("缺少必填配置项 {key} (环境变量 {env})")]
    Missing {
        key: &'static str,
        env: &'static str,
    },
    /// 取值无法解析
    #[error("配置项 {key} 解析失败: 值 '{value}' 无法转换为 {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
    /// 读取配置文件失败
    #[error("读取配置文件 {path} 失败")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 配置文件格式错误
    #[error("配置文件 {path} 解析失败")]
    FileParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 表单会话错误（浏览器 / 网络层）
#[derive(Debug, Error)]
pub enum SessionError {
    /// 启动或连接浏览器失败
    #[error("浏览器不可用: {0}")]
    BrowserUnavailable(String),
    /// CDP 调用失败
    #[error("浏览器操作失败 ({action})")]
    Cdp {
        action: &'static str,
        #[source]
        source: chromiumoxide::error::CdpError,
    },
    /// 页面上找不到指定元素
    #[error("页面元素不存在: #{id}")]
    ElementMissing { id: String },
    /// 页面脚本执行结果不符合预期
    #[error("页面脚本执行失败: {0}")]
    Script(String),
    /// 其他会话故障
    #[error("{0}")]
    Other(String),
}

/// 验证码识别错误
#[derive(Debug, Error)]
pub enum SolverError {
    /// 图片格式或尺寸与识别模型不兼容，可通过归一化图片自愈
    #[error("验证码图片与识别模型不兼容: {reason}")]
    IncompatibleImage { reason: String },
    /// 图片解码或重新编码失败
    #[error("验证码图片处理失败")]
    Image(#[from] image::ImageError),
    /// 识别模型调用失败
    #[error("识别模型调用失败")]
    Model(#[from] async_openai::error::OpenAIError),
    /// 识别结果为空
    #[error("识别结果为空 (原始输出: '{raw}')")]
    EmptyAnswer { raw: String },
}

/// 状态存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 文件读写失败
    #[error("状态文件读写失败: {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 序列化失败
    #[error("状态序列化失败")]
    Serialize(#[from] serde_json::Error),
}

/// 通知投递错误
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// 请求未能发出
    #[error("通知请求发送失败")]
    Request(#[from] reqwest::Error),
    /// 通知服务拒绝了请求
    #[error("通知服务返回错误 (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}

/// 单次尝试失败的原因
///
/// `ChallengeRejected` 以外的变体都属于瞬时失败，会消耗一次重试间隔。
#[derive(Debug, Error)]
pub enum AttemptFailure {
    /// 验证码被远端拒绝
    #[error("验证码被拒绝 (challenge rejected)")]
    ChallengeRejected,
    /// 响应缺少必要字段且没有拒绝提示
    #[error("响应不完整 (incomplete response), 缺少字段: {}", missing.join(", "))]
    IncompleteResponse { missing: Vec<&'static str> },
    /// 响应回显的案件号与请求不一致
    #[error("案件号不匹配 (identifier mismatch): 期望 {expected}, 实际 {found}")]
    IdentifierMismatch { expected: String, found: String },
    /// 会话故障
    #[error("会话失败")]
    Session(#[from] SessionError),
    /// 验证码识别故障
    #[error("验证码识别失败")]
    Solver(#[from] SolverError),
}

/// 一次运行的终止性错误
#[derive(Debug, Error)]
pub enum RunError {
    /// 重试次数耗尽
    #[error("重试 {attempts} 次后仍未获取到状态")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last_cause: AttemptFailure,
    },
    /// 收到外部取消信号
    #[error("运行在第 {completed_attempts} 次尝试后被取消")]
    Cancelled { completed_attempts: u32 },
    /// 状态持久化失败
    #[error("状态存储失败")]
    Store(#[from] StoreError),
}

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误")]
    Config(#[from] ConfigError),
    /// 浏览器初始化错误
    #[error("浏览器初始化失败")]
    Session(#[from] SessionError),
    /// 运行错误
    #[error("运行失败")]
    Run(#[from] RunError),
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_retry_exhausted_keeps_last_cause_in_chain() {
        let err = RunError::RetryExhausted {
            attempts: 3,
            last_cause: AttemptFailure::ChallengeRejected,
        };

        let source = err.source().expect("应该携带最后一次失败原因");
        assert!(source.to_string().contains("challenge rejected"));
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn test_incomplete_response_lists_missing_fields() {
        let err = AttemptFailure::IncompleteResponse {
            missing: vec!["status", "message"],
        };
        assert!(err.to_string().contains("status, message"));
    }
}
