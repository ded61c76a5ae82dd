//! Literal invocation rewrites

use crate::config::RewriteRule;

/// Apply every rule in a single left-to-right pass
///
/// Text produced by one rule is never rescanned, so a replacement that
/// happens to contain another rule's input is left alone. When several
/// rules match at the same position the longest `from` wins, then table
/// order.
pub fn rewrite_invocations(content: &str, rules: &[RewriteRule]) -> String {
    let mut ordered: Vec<&RewriteRule> = rules.iter().filter(|r| !r.from.is_empty()).collect();
    ordered.sort_by(|a, b| b.from.len().cmp(&a.from.len()));

    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(ch) = rest.chars().next() {
        match ordered.iter().find(|r| rest.starts_with(r.from.as_str())) {
            Some(rule) => {
                out.push_str(&rule.to);
                rest = &rest[rule.from.len()..];
            }
            None => {
                out.push(ch);
                rest = &rest[ch.len_utf8()..];
            }
        }
    }
    out
}
