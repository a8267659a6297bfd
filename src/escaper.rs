//! Repairs stray double quotes inside `key="..."` values.
//!
//! Upstream translators regularly paste values such as `key="a "quoted" word"`.
//! Every quote between the two structural ones is rewritten as `\"`.

use crate::error::EscapeError;
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// `key = "` | value containing at least one quote | closing quote and optional comment.
const VALUE_SPAN: &str = r#"(?m)(^.*?=\s*")(.*".*)("\s*(;.*)?$)"#;

static VALUE_SPAN_REGEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn value_span() -> Result<&'static Regex, EscapeError> {
    VALUE_SPAN_REGEX
        .get_or_init(|| Regex::new(VALUE_SPAN))
        .as_ref()
        .map_err(|e| EscapeError::RegexError(e.clone()))
}

/// Escapes every unescaped quote inside value spans. Idempotent.
pub fn escape_quotes(content: &str) -> Result<String, EscapeError> {
    let regex = value_span()?;
    let escaped = regex.replace_all(content, |caps: &Captures| {
        format!(
            "{}{}{}",
            &caps[1],
            escape_unescaped(&caps[2]),
            &caps[3]
        )
    });
    Ok(escaped.into_owned())
}

/// Decodes a raw download body and escapes it.
pub fn escape_body(body: Vec<u8>) -> Result<String, EscapeError> {
    let content = String::from_utf8(body)?;
    escape_quotes(&content)
}

/// Prefixes `\` to each quote whose preceding character is not already `\`.
fn escape_unescaped(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    let mut prev = None;
    for c in value.chars() {
        if c == '"' && prev != Some('\\') {
            out.push('\\');
        }
        out.push(c);
        prev = Some(c);
    }
    out
}
