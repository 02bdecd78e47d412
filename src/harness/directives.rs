//! Directives embedded in data-defined test scripts
//!
//! ```text
//! MARIONETTE_HEAD_JS = "head.js";
//! MARIONETTE_CONTEXT = "chrome";
//! MARIONETTE_TIMEOUT = 60000;
//! MARIONETTE_INACTIVITY_TIMEOUT = 5000;
//! ```
//!
//! Each directive is found by its first match anywhere in the text.

use std::sync::LazyLock;

use regex::Regex;

static HEAD_JS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"MARIONETTE_HEAD_JS\s*=\s*['|"](.*?)['|"];"#).expect("valid regex"));
static CONTEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"MARIONETTE_CONTEXT\s*=\s*['|"](.*?)['|"];"#).expect("valid regex"));
static TIMEOUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"MARIONETTE_TIMEOUT\s*=\s*(\d+);").expect("valid regex"));
static INACTIVITY_TIMEOUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"MARIONETTE_INACTIVITY_TIMEOUT\s*=\s*(\d+);").expect("valid regex"));

/// Directives found in a script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    pub head_js: Option<String>,
    /// Raw context name; validated when applied
    pub context: Option<String>,
    pub timeout: Option<u64>,
    pub inactivity_timeout: Option<u64>,
}

impl Directives {
    pub fn parse(source: &str) -> Self {
        Self {
            head_js: capture(&HEAD_JS, source),
            context: capture(&CONTEXT, source),
            timeout: capture(&TIMEOUT, source).and_then(|t| t.parse().ok()),
            inactivity_timeout: capture(&INACTIVITY_TIMEOUT, source).and_then(|t| t.parse().ok()),
        }
    }

    pub fn is_chrome(&self) -> bool {
        self.context.as_deref() == Some("chrome")
    }
}

fn capture(re: &Regex, source: &str) -> Option<String> {
    re.captures(source)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_directives() {
        let source = r#"
MARIONETTE_HEAD_JS = 'head.js';
MARIONETTE_CONTEXT="chrome";
MARIONETTE_TIMEOUT = 60000;
MARIONETTE_INACTIVITY_TIMEOUT=5000;
ok(true);
"#;
        let directives = Directives::parse(source);
        assert_eq!(directives.head_js.as_deref(), Some("head.js"));
        assert_eq!(directives.context.as_deref(), Some("chrome"));
        assert!(directives.is_chrome());
        assert_eq!(directives.timeout, Some(60000));
        assert_eq!(directives.inactivity_timeout, Some(5000));
    }

    #[test]
    fn test_timeout_does_not_match_inactivity_timeout() {
        let directives = Directives::parse("MARIONETTE_INACTIVITY_TIMEOUT = 10;");
        assert_eq!(directives.timeout, None);
        assert_eq!(directives.inactivity_timeout, Some(10));
    }

    #[test]
    fn test_no_directives() {
        assert_eq!(Directives::parse("ok(1 == 1);"), Directives::default());
    }

    #[test]
    fn test_first_match_wins() {
        let directives = Directives::parse("MARIONETTE_CONTEXT = 'content';\nMARIONETTE_CONTEXT = 'chrome';");
        assert_eq!(directives.context.as_deref(), Some("content"));
    }
}
