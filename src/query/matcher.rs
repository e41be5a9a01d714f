use std::fmt;
use wildmatch::WildMatch;

/// 字符串匹配抽象：查询里的字面量编译成 Matcher，对每个字符串叶子求值
pub trait Matcher: Send + Sync + fmt::Debug {
    fn matches(&self, text: &str) -> bool;
    /// 原始字面量（数值/bool 叶子按渲染结果比较时用）
    fn literal(&self) -> &str;
}

/// 无通配符：整串相等 或 子串包含
#[derive(Debug)]
pub struct ExactMatcher {
    pattern: String,
    whole: bool,
}

impl ExactMatcher {
    pub fn new(pattern: &str, whole: bool) -> Self {
        Self {
            pattern: pattern.to_string(),
            whole,
        }
    }
}

impl Matcher for ExactMatcher {
    fn matches(&self, text: &str) -> bool {
        if self.whole {
            text == self.pattern
        } else {
            text.contains(&self.pattern)
        }
    }

    fn literal(&self) -> &str {
        &self.pattern
    }
}

/// 通配符匹配（`*` / `?`）；子串模式下两端补 `*`
pub struct GlobMatcher {
    wild: WildMatch,
    pattern: String,
}

impl GlobMatcher {
    pub fn new(pattern: &str, whole: bool) -> Self {
        let wild = if whole {
            WildMatch::new(pattern)
        } else {
            WildMatch::new(&format!("*{pattern}*"))
        };
        Self {
            wild,
            pattern: pattern.to_string(),
        }
    }
}

impl fmt::Debug for GlobMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobMatcher").field("pattern", &self.pattern).finish()
    }
}

impl Matcher for GlobMatcher {
    fn matches(&self, text: &str) -> bool {
        self.wild.matches(text)
    }

    fn literal(&self) -> &str {
        &self.pattern
    }
}

pub fn has_wildcards(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// 匹配器工厂：含通配符走 glob，否则走精确比较
pub fn create_matcher(pattern: &str, whole: bool) -> Box<dyn Matcher> {
    if has_wildcards(pattern) {
        Box::new(GlobMatcher::new(pattern, whole))
    } else {
        Box::new(ExactMatcher::new(pattern, whole))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_vs_substring() {
        let eq = create_matcher("error", true);
        assert!(eq.matches("error"));
        assert!(!eq.matches("an error"));

        let sub = create_matcher("error", false);
        assert!(sub.matches("an error occurred"));
        assert!(!sub.matches("warning"));
    }

    #[test]
    fn globs_anchor_only_in_whole_mode() {
        let eq = create_matcher("time?ut*", true);
        assert!(eq.matches("timeout after 5s"));
        assert!(!eq.matches("request timeout"));

        let sub = create_matcher("time?ut", false);
        assert!(sub.matches("request timeout after 5s"));
        assert_eq!(sub.literal(), "time?ut");
    }
}
