//! Wrapping flat configuration scripts into callables

use crate::config::CallableTemplate;
use crate::error::{MigrationError, MigrationResult};
use regex::Regex;

/// Result of wrapping file content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wrapped {
    /// New content
    Content(String),
    /// The callable marker is already present
    AlreadyWrapped,
    /// No builder statement to open the callable before
    NothingToWrap,
}

/// First line whose first token is a member access on the builder variable
///
/// Leading blank lines belong to the match, so the preamble lands where
/// the blank run starts.
fn builder_statement(template: &CallableTemplate) -> MigrationResult<Regex> {
    let pattern = format!(r"(?m)^\s*{}->", regex::escape(&template.builder_variable));
    Regex::new(&pattern).map_err(|e| MigrationError::config(format!("builder variable: {e}")))
}

/// Wrap a flat script into a callable taking the template's parameters
///
/// Adds the strict-types declaration after the first open tag when the
/// file lacks one, opens the callable before the first builder statement,
/// and closes it after the trimmed content.
pub fn wrap_content(content: &str, template: &CallableTemplate) -> MigrationResult<Wrapped> {
    if content.contains(&template.marker) {
        return Ok(Wrapped::AlreadyWrapped);
    }

    let statement = builder_statement(template)?;

    let declared;
    let content = if content.contains(&template.strict_types_marker) {
        content
    } else {
        declared = content.replacen(
            &template.open_tag,
            &format!("{}\n\n{}", template.open_tag, template.strict_types_declaration),
            1,
        );
        declared.as_str()
    };

    let Some(first) = statement.find(content) else {
        return Ok(Wrapped::NothingToWrap);
    };

    let mut wrapped = String::with_capacity(content.len() + 256);
    wrapped.push_str(&content[..first.start()]);
    wrapped.push_str(&template.preamble());
    wrapped.push('\n');
    wrapped.push_str(&content[first.start()..]);

    let mut out = wrapped.trim().to_string();
    out.push('\n');
    out.push_str(&template.closing);
    out.push('\n');
    Ok(Wrapped::Content(out))
}
