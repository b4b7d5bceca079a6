/// 签证申请类型（查询表单的第一个下拉框）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum VisaType {
    /// 非移民签证
    #[serde(rename = "NIV")]
    NonImmigrant,
    /// 移民签证
    #[serde(rename = "IV")]
    Immigrant,
}

impl VisaType {
    /// 获取表单取值
    pub fn code(self) -> &'static str {
        match self {
            VisaType::NonImmigrant => "NIV",
            VisaType::Immigrant => "IV",
        }
    }

    /// 获取显示名称
    pub fn name(self) -> &'static str {
        match self {
            VisaType::NonImmigrant => "非移民签证",
            VisaType::Immigrant => "移民签证",
        }
    }

    /// 从表单取值解析（忽略大小写）
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "NIV" => Some(VisaType::NonImmigrant),
            "IV" => Some(VisaType::Immigrant),
            _ => None,
        }
    }
}

impl std::fmt::Display for VisaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}
