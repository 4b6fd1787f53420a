use serde::{Deserialize, Serialize};

/// Represents ways to match a UI element inside a surface
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Matcher {
    /// Match by visible text, substring, case-insensitive
    Text(String),
    /// Match by visible text, exact (after trimming)
    ExactText(String),
    /// Match a container whose own text content exactly equals the value.
    /// Used where the target wraps additional markup and a plain text match
    /// would land on an inner node instead of the clickable container.
    TextBlock(String),
    /// Match by ARIA/accessibility role
    Role(String),
    /// Match by CSS selector
    Css(String),
}

impl Matcher {
    pub fn text(value: impl Into<String>) -> Self {
        Matcher::Text(value.into())
    }

    pub fn exact_text(value: impl Into<String>) -> Self {
        Matcher::ExactText(value.into())
    }

    pub fn role(value: impl Into<String>) -> Self {
        Matcher::Role(value.into())
    }

    pub fn css(value: impl Into<String>) -> Self {
        Matcher::Css(value.into())
    }
}

impl std::fmt::Display for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Matcher::Text(v) => write!(f, "text:{v}"),
            Matcher::ExactText(v) => write!(f, "text={v}"),
            Matcher::TextBlock(v) => write!(f, "block:{v}"),
            Matcher::Role(v) => write!(f, "role:{v}"),
            Matcher::Css(v) => write!(f, "css:{v}"),
        }
    }
}

impl From<&str> for Matcher {
    fn from(s: &str) -> Self {
        match s {
            _ if s.starts_with("text=") => Matcher::ExactText(s["text=".len()..].to_string()),
            _ if s.starts_with("text:") => Matcher::Text(s["text:".len()..].to_string()),
            _ if s.starts_with("block:") => Matcher::TextBlock(s["block:".len()..].to_string()),
            _ if s.starts_with("role:") => Matcher::Role(s["role:".len()..].to_string()),
            _ if s.starts_with("css:") => Matcher::Css(s["css:".len()..].to_string()),
            // Bare CSS-looking strings keep working as selectors
            _ if s.starts_with('#') || s.starts_with('.') || s.starts_with('[') => {
                Matcher::Css(s.to_string())
            }
            _ => Matcher::Text(s.to_string()),
        }
    }
}

/// Ordered fallback chain of matchers, evaluated first-match-wins.
///
/// UI selectors are the most volatile part of an automation flow, so the
/// chains are data (parseable from strings, serializable into config files)
/// rather than inlined at call sites.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateList(pub Vec<Matcher>);

impl CandidateList {
    pub fn new(matchers: Vec<Matcher>) -> Self {
        Self(matchers)
    }

    /// Parse a `,`-separated list of matcher strings, in priority order.
    pub fn parse(list: &str) -> Self {
        Self(
            list.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(Matcher::from)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Matcher> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a CandidateList {
    type Item = &'a Matcher;
    type IntoIter = std::slice::Iter<'a, Matcher>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_matchers() {
        assert_eq!(Matcher::from("text:业务"), Matcher::Text("业务".into()));
        assert_eq!(Matcher::from("text=管理"), Matcher::ExactText("管理".into()));
        assert_eq!(
            Matcher::from("block:项目日志填报"),
            Matcher::TextBlock("项目日志填报".into())
        );
        assert_eq!(Matcher::from("role:tabpanel"), Matcher::Role("tabpanel".into()));
        assert_eq!(Matcher::from("css:canvas"), Matcher::Css("canvas".into()));
    }

    #[test]
    fn bare_css_shapes_stay_css() {
        assert_eq!(
            Matcher::from("#dx_11181_riqi"),
            Matcher::Css("#dx_11181_riqi".into())
        );
        assert_eq!(
            Matcher::from(".ant-calendar-input-wrap"),
            Matcher::Css(".ant-calendar-input-wrap".into())
        );
        assert_eq!(
            Matcher::from("[title=\"业务\"]"),
            Matcher::Css("[title=\"业务\"]".into())
        );
    }

    #[test]
    fn bare_text_defaults_to_substring_match() {
        assert_eq!(Matcher::from("提交"), Matcher::Text("提交".into()));
    }

    #[test]
    fn candidate_list_parse_keeps_order() {
        let list = CandidateList::parse("css:canvas, .qrcode img, text:扫码");
        let matchers: Vec<_> = list.iter().cloned().collect();
        assert_eq!(
            matchers,
            vec![
                Matcher::Css("canvas".into()),
                Matcher::Css(".qrcode img".into()),
                Matcher::Text("扫码".into()),
            ]
        );
    }
}
