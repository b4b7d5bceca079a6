//! 程序配置
//!
//! 取值优先级：环境变量 > TOML 配置文件 > 默认值。
//! 配置文件路径由 `VISA_WATCH_CONFIG` 指定，未指定时尝试当前目录下的 `visa_watch.toml`。

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::{RetryPolicy, RunRequest, SubmissionFields, TrackedIdentifier, VisaType};

/// 配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "VISA_WATCH_CONFIG";
/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "visa_watch.toml";

/// 目标站点上各元素的 id
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteSelectors {
    // --- 查询表单 ---
    pub visa_type: String,
    pub location: String,
    pub case_number: String,
    pub passport_number: String,
    pub surname: String,
    pub captcha_image: String,
    pub captcha_input: String,
    pub submit_button: String,
    // --- 查询结果 ---
    pub result_status: String,
    pub result_created_at: String,
    pub result_last_updated_at: String,
    pub result_message: String,
    pub result_case_number: String,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            visa_type: "Visa_Application_Type".to_string(),
            location: "Location_Dropdown".to_string(),
            case_number: "Visa_Case_Number".to_string(),
            passport_number: "Passport_Number".to_string(),
            surname: "Surname".to_string(),
            captcha_image: "c_status_ctl00_contentplaceholder1_defaultcaptcha_CaptchaImage"
                .to_string(),
            captcha_input: "Captcha".to_string(),
            submit_button: "ctl00_ContentPlaceHolder1_btnSubmit".to_string(),
            result_status: "ctl00_ContentPlaceHolder1_ucApplicationStatusView_lblStatus"
                .to_string(),
            result_created_at: "ctl00_ContentPlaceHolder1_ucApplicationStatusView_lblSubmitDate"
                .to_string(),
            result_last_updated_at:
                "ctl00_ContentPlaceHolder1_ucApplicationStatusView_lblStatusDate".to_string(),
            result_message: "ctl00_ContentPlaceHolder1_ucApplicationStatusView_lblMessage"
                .to_string(),
            result_case_number: "ctl00_ContentPlaceHolder1_ucApplicationStatusView_lblCaseNo"
                .to_string(),
        }
    }
}

/// TOML 配置文件的内容，所有字段都可省略
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub case_number: Option<String>,
    pub passport_number: Option<String>,
    pub surname: Option<String>,
    pub visa_type: Option<String>,
    pub location: Option<String>,
    pub target_url: Option<String>,
    pub resend_api_key: Option<String>,
    pub sender_address: Option<String>,
    pub sender_name: Option<String>,
    pub recipient_email: Option<String>,
    pub max_attempts: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub state_dir: Option<PathBuf>,
    pub rejection_phrases: Option<Vec<String>>,
    pub browser_debug_port: Option<u16>,
    pub chrome_executable: Option<PathBuf>,
    pub page_timeout_secs: Option<u64>,
    pub llm_api_key: Option<String>,
    pub llm_api_base_url: Option<String>,
    pub llm_model_name: Option<String>,
    pub selectors: Option<SiteSelectors>,
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    // --- 查询参数 ---
    pub case_number: TrackedIdentifier,
    pub passport_number: String,
    pub surname: String,
    pub visa_type: VisaType,
    pub location: String,
    /// 查询页面地址
    pub target_url: String,
    // --- 重试 ---
    pub max_attempts: NonZeroU32,
    pub retry_delay: Duration,
    /// 判定验证码被拒绝的提示语（不区分大小写）
    pub rejection_phrases: Vec<String>,
    // --- 状态存储 ---
    pub state_dir: PathBuf,
    // --- 邮件通知 ---
    pub resend_api_key: String,
    pub sender_address: String,
    pub sender_name: String,
    pub recipient_email: String,
    // --- 浏览器 ---
    /// 设置后连接到已启动的浏览器，否则启动无头浏览器
    pub browser_debug_port: Option<u16>,
    pub chrome_executable: Option<PathBuf>,
    pub page_timeout: Duration,
    // --- 验证码识别模型 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub selectors: SiteSelectors,
}

/// 可选项的默认值
mod defaults {
    pub const VISA_TYPE: &str = "NIV";
    pub const LOCATION: &str = "GUZ";
    pub const TARGET_URL: &str = "https://ceac.state.gov/CEACStatTracker/Status.aspx";
    pub const SENDER_NAME: &str = "Visa_bot";
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const RETRY_DELAY_SECS: u64 = 5;
    pub const STATE_DIR: &str = ".";
    pub const REJECTION_PHRASES: [&str; 2] = ["invalid", "incorrect"];
    pub const PAGE_TIMEOUT_SECS: u64 = 30;
    pub const LLM_API_BASE_URL: &str = "https://api.openai.com/v1";
    pub const LLM_MODEL_NAME: &str = "gpt-4o-mini";
}

impl Config {
    /// 从配置文件和环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => load_config_file(Path::new(&path))?,
            Err(_) => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    load_config_file(path)?
                } else {
                    FileConfig::default()
                }
            }
        };

        Self::from_sources(file, |name| std::env::var(name).ok())
    }

    /// 合并配置文件和环境变量
    ///
    /// `env` 返回空白字符串时视为未设置。
    pub fn from_sources(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let lookup = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let text = |name: &str, from_file: Option<String>| lookup(name).or(from_file);
        let required = |key: &'static str, name: &'static str, from_file: Option<String>| {
            text(name, from_file)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing { key, env: name })
        };

        let case_number = required("case_number", "VISA_CASE_NUMBER", file.case_number)?;
        let case_number = TrackedIdentifier::new(case_number).ok_or(ConfigError::Missing {
            key: "case_number",
            env: "VISA_CASE_NUMBER",
        })?;
        let passport_number = required("passport_number", "PASSPORT_NUMBER", file.passport_number)?;
        let surname = required("surname", "SURNAME", file.surname)?;
        let resend_api_key = required("resend_api_key", "RESEND_API_KEY", file.resend_api_key)?;
        let sender_address = required("sender_address", "SENDER_ADDRESS", file.sender_address)?;
        let llm_api_key = required("llm_api_key", "LLM_API_KEY", file.llm_api_key)?;

        let visa_type_code = text("VISA_TYPE", file.visa_type)
            .unwrap_or_else(|| defaults::VISA_TYPE.to_string());
        let visa_type =
            VisaType::from_code(&visa_type_code).ok_or_else(|| ConfigError::Invalid {
                key: "visa_type",
                value: visa_type_code.clone(),
                expected: "签证类型 (NIV / IV)",
            })?;

        let max_attempts = parse_env(&lookup, "max_attempts", "MAX_ATTEMPTS", "正整数")?
            .or(file.max_attempts)
            .unwrap_or(defaults::MAX_ATTEMPTS);
        let max_attempts = NonZeroU32::new(max_attempts).ok_or(ConfigError::Invalid {
            key: "max_attempts",
            value: max_attempts.to_string(),
            expected: "正整数",
        })?;

        let retry_delay_secs: u64 =
            parse_env(&lookup, "retry_delay_secs", "RETRY_DELAY_SECS", "秒数")?
                .or(file.retry_delay_secs)
                .unwrap_or(defaults::RETRY_DELAY_SECS);
        let page_timeout_secs: u64 =
            parse_env(&lookup, "page_timeout_secs", "PAGE_TIMEOUT_SECS", "秒数")?
                .or(file.page_timeout_secs)
                .unwrap_or(defaults::PAGE_TIMEOUT_SECS);
        let browser_debug_port: Option<u16> =
            parse_env(&lookup, "browser_debug_port", "BROWSER_DEBUG_PORT", "端口号")?
                .or(file.browser_debug_port);

        let rejection_phrases = match lookup("REJECTION_PHRASES") {
            Some(raw) => split_phrases(&raw),
            None => file
                .rejection_phrases
                .map(|phrases| {
                    phrases
                        .iter()
                        .flat_map(|p| split_phrases(p))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
        };
        let rejection_phrases = if rejection_phrases.is_empty() {
            defaults::REJECTION_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect()
        } else {
            rejection_phrases
        };

        // 未设置收件人时发给发件地址
        let recipient_email =
            text("RECIPIENT_EMAIL", file.recipient_email).unwrap_or_else(|| sender_address.clone());

        Ok(Self {
            case_number,
            passport_number,
            surname,
            visa_type,
            location: text("LOCATION", file.location)
                .unwrap_or_else(|| defaults::LOCATION.to_string()),
            target_url: text("TARGET_URL", file.target_url)
                .unwrap_or_else(|| defaults::TARGET_URL.to_string()),
            max_attempts,
            retry_delay: Duration::from_secs(retry_delay_secs),
            rejection_phrases,
            state_dir: lookup("STATE_DIR")
                .map(PathBuf::from)
                .or(file.state_dir)
                .unwrap_or_else(|| PathBuf::from(defaults::STATE_DIR)),
            resend_api_key,
            sender_address,
            sender_name: text("SENDER_NAME", file.sender_name)
                .unwrap_or_else(|| defaults::SENDER_NAME.to_string()),
            recipient_email,
            browser_debug_port,
            chrome_executable: lookup("CHROME_EXECUTABLE")
                .map(PathBuf::from)
                .or(file.chrome_executable),
            page_timeout: Duration::from_secs(page_timeout_secs),
            llm_api_key,
            llm_api_base_url: text("LLM_API_BASE_URL", file.llm_api_base_url)
                .unwrap_or_else(|| defaults::LLM_API_BASE_URL.to_string()),
            llm_model_name: text("LLM_MODEL_NAME", file.llm_model_name)
                .unwrap_or_else(|| defaults::LLM_MODEL_NAME.to_string()),
            selectors: file.selectors.unwrap_or_default(),
        })
    }

    /// 表单字段
    pub fn submission_fields(&self) -> SubmissionFields {
        SubmissionFields {
            case_number: self.case_number.clone(),
            passport_number: self.passport_number.clone(),
            surname: self.surname.clone(),
            visa_type: self.visa_type,
            location: self.location.clone(),
        }
    }

    /// 重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_delay)
    }

    /// 本次运行的请求
    pub fn run_request(&self) -> RunRequest {
        RunRequest::new(self.submission_fields(), self.retry_policy())
    }
}

/// 读取并解析 TOML 配置文件
pub fn load_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::FileParse {
        path: path.display().to_string(),
        source,
    })
}

fn parse_env<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    name: &str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                key,
                value: raw,
                expected,
            }),
        None => Ok(None),
    }
}

fn split_phrases(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}
