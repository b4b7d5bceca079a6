//! 查询结果解析 - 业务能力层
//!
//! 判定顺序：
//! 1. 页面文本含拒绝提示语 → 验证码被拒绝（无论结果字段是否存在）
//! 2. 任一字段缺失或为空 → 响应不完整
//! 3. 回显的案件号与请求不一致 → 案件号不匹配
//! 4. 否则成功

use regex::{Captures, Regex};

use crate::config::SiteSelectors;
use crate::error::AttemptFailure;
use crate::models::{AttemptOutcome, ObservedRecord, TrackedIdentifier};
use crate::services::form_session::ResponseDocument;

/// 结果字段对应的元素 id
#[derive(Debug, Clone)]
pub struct ResultFieldIds {
    pub status: String,
    pub created_at: String,
    pub last_updated_at: String,
    pub message: String,
    pub case_number: String,
}

impl From<&SiteSelectors> for ResultFieldIds {
    fn from(selectors: &SiteSelectors) -> Self {
        Self {
            status: selectors.result_status.clone(),
            created_at: selectors.result_created_at.clone(),
            last_updated_at: selectors.result_last_updated_at.clone(),
            message: selectors.result_message.clone(),
            case_number: selectors.result_case_number.clone(),
        }
    }
}

/// 查询结果解析器
pub struct ResultExtractor {
    rejection_phrases: Vec<String>,
    ids: ResultFieldIds,
    invisible_re: Regex,
    tag_re: Regex,
    entity_re: Regex,
    whitespace_re: Regex,
}

impl ResultExtractor {
    /// # 参数
    /// - `rejection_phrases`: 表示验证码错误的提示语，匹配时不区分大小写
    /// - `ids`: 结果字段的元素 id
    pub fn new(rejection_phrases: &[String], ids: ResultFieldIds) -> Self {
        Self {
            rejection_phrases: rejection_phrases
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            ids,
            invisible_re: Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)\s*>|<!--.*?-->")
                .expect("静态正则"),
            tag_re: Regex::new(r"(?s)<[^>]*>").expect("静态正则"),
            entity_re: Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("静态正则"),
            whitespace_re: Regex::new(r"\s+").expect("静态正则"),
        }
    }

    /// 解析提交后的页面
    pub fn extract(
        &self,
        document: &ResponseDocument,
        expected_identifier: &TrackedIdentifier,
    ) -> AttemptOutcome {
        let visible = self.invisible_re.replace_all(&document.html, " ");

        let page_text = self.render_text(&visible).to_lowercase();
        if self
            .rejection_phrases
            .iter()
            .any(|phrase| page_text.contains(phrase.as_str()))
        {
            return AttemptOutcome::ChallengeRejected;
        }

        let fields = [
            ("status", &self.ids.status),
            ("created_at", &self.ids.created_at),
            ("last_updated_at", &self.ids.last_updated_at),
            ("message", &self.ids.message),
            ("case_number", &self.ids.case_number),
        ];
        let mut values = Vec::with_capacity(fields.len());
        let mut missing = Vec::new();
        for (name, id) in fields {
            match element_inner_html(&visible, id)
                .map(|inner| self.render_text(inner))
                .filter(|text| !text.is_empty())
            {
                Some(text) => values.push(text),
                None => missing.push(name),
            }
        }
        if !missing.is_empty() {
            return AttemptOutcome::TransientFailure(AttemptFailure::IncompleteResponse {
                missing,
            });
        }

        let mut values = values.into_iter();
        let (Some(status), Some(created_at), Some(last_updated_at), Some(message), Some(echoed)) = (
            values.next(),
            values.next(),
            values.next(),
            values.next(),
            values.next(),
        ) else {
            return AttemptOutcome::TransientFailure(AttemptFailure::IncompleteResponse {
                missing: Vec::new(),
            });
        };

        if echoed != expected_identifier.as_str() {
            return AttemptOutcome::TransientFailure(AttemptFailure::IdentifierMismatch {
                expected: expected_identifier.to_string(),
                found: echoed,
            });
        }

        AttemptOutcome::Success(ObservedRecord {
            status,
            created_at,
            last_updated_at,
            message,
        })
    }

    /// HTML 片段转为可见文本：去标签、解码实体、合并空白
    fn render_text(&self, html: &str) -> String {
        let without_tags = self.tag_re.replace_all(html, " ");
        let decoded = self
            .entity_re
            .replace_all(&without_tags, |caps: &Captures| decode_entity(&caps[1]));
        self.whitespace_re
            .replace_all(&decoded, " ")
            .trim()
            .to_string()
    }
}

/// 查找指定 id 元素的内部 HTML
///
/// 按标签名计数嵌套，支持 `<span id="x">a <b>b</b></span>` 这类内容。
fn element_inner_html<'a>(html: &'a str, id: &str) -> Option<&'a str> {
    let open_re = Regex::new(&format!(
        r#"(?is)<([a-z][a-z0-9]*)\b[^>]*?\sid\s*=\s*["']{}["'][^>]*>"#,
        regex::escape(id)
    ))
    .ok()?;
    let caps = open_re.captures(html)?;
    let open = caps.get(0)?;
    let tag = caps.get(1)?.as_str().to_ascii_lowercase();

    // 自闭合标签没有内容
    if open.as_str().ends_with("/>") {
        return Some("");
    }

    // ASCII 小写不改变字节偏移
    let lower = html.to_ascii_lowercase();
    let open_pat = format!("<{}", tag);
    let close_pat = format!("</{}", tag);

    let start = open.end();
    let mut depth = 1usize;
    let mut cursor = start;
    while depth > 0 {
        let next_close = lower[cursor..].find(&close_pat).map(|i| cursor + i)?;
        let next_open = lower[cursor..]
            .find(&open_pat)
            .map(|i| cursor + i)
            .filter(|&i| i < next_close && is_tag_boundary(&lower, i + open_pat.len()));

        match next_open {
            Some(i) => {
                depth += 1;
                cursor = i + open_pat.len();
            }
            None => {
                depth -= 1;
                if depth == 0 {
                    return Some(&html[start..next_close]);
                }
                cursor = next_close + close_pat.len();
            }
        }
    }
    None
}

/// `<span` 后面必须是空白、`>` 或 `/`，避免把 `<spanner` 当成 `<span`
fn is_tag_boundary(lower: &str, index: usize) -> bool {
    lower[index..]
        .chars()
        .next()
        .map(|c| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(false)
}

fn decode_entity(entity: &str) -> String {
    let numeric = if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse().ok()
    } else {
        None
    };
    if let Some(c) = numeric.and_then(char::from_u32) {
        return c.to_string();
    }

    match entity {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        _ => return format!("&{};", entity),
    }
    .to_string()
}
