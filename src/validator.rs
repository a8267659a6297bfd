//! Syntax checks for downloaded `.ini` translation files.
//!
//! Every non-blank, non-comment line must look like `KEY="VALUE"` with exactly
//! two unescaped quotes and a key that the consuming INI reader will not turn
//! into a boolean or null. On top of the per-line rules the whole file must load
//! as an INI document.

use crate::error::{IniParseError, SyntaxIssue, ValidationError};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

/// Keys the INI reader interprets as booleans or null.
pub const BLACKLISTED_KEYS: [&str; 8] = ["YES", "NO", "NULL", "FALSE", "ON", "OFF", "NONE", "TRUE"];

const LINE_FORMAT: &str = r#"^[A-Za-z][A-Za-z0-9_\-.]*\s*=\s*".*"\s*(;.*)?$"#;

static LINE_FORMAT_REGEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn line_format() -> Result<&'static Regex, &'static regex::Error> {
    LINE_FORMAT_REGEX
        .get_or_init(|| Regex::new(LINE_FORMAT))
        .as_ref()
}

/// Number of `"` characters not directly preceded by a backslash.
pub fn count_unescaped_quotes(line: &str) -> usize {
    let mut count = 0;
    let mut prev = None;
    for c in line.chars() {
        if c == '"' && prev != Some('\\') {
            count += 1;
        }
        prev = Some(c);
    }
    count
}

/// Checks file content and returns every issue found; empty means valid.
pub fn validate_content(content: &str) -> Vec<SyntaxIssue> {
    let mut issues = Vec::new();
    let line_format = match line_format() {
        Ok(regex) => regex,
        Err(e) => {
            return vec![SyntaxIssue::Unparseable {
                reason: e.to_string(),
            }]
        }
    };

    for (index, line) in content.split('\n').enumerate() {
        let line_number = index + 1;

        if line.trim().is_empty() || line.starts_with(';') {
            continue;
        }

        if !line_format.is_match(line) {
            issues.push(SyntaxIssue::FormatMismatch { line: line_number });
            continue;
        }

        let quotes = count_unescaped_quotes(line);
        if quotes != 2 {
            issues.push(SyntaxIssue::QuoteCount {
                line: line_number,
                found: quotes,
            });
            continue;
        }

        // The format check guarantees an `=`.
        let key = line
            .split_once('=')
            .map(|(key, _)| key.trim().to_uppercase())
            .unwrap_or_default();
        if BLACKLISTED_KEYS.contains(&key.as_str()) {
            issues.push(SyntaxIssue::BlacklistedKey {
                line: line_number,
                key,
            });
        }
    }

    if let Err(e) = IniDocument::parse(content) {
        issues.push(SyntaxIssue::Unparseable {
            reason: e.to_string(),
        });
    }

    issues
}

/// Reads and checks a file.
///
/// Only an unreadable file is an `Err`; syntax problems come back as the issue list.
pub fn validate_file(path: &Path) -> Result<Vec<SyntaxIssue>, ValidationError> {
    let content = std::fs::read_to_string(path).map_err(|source| ValidationError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(validate_content(&content))
}

/// Like [`validate_file`], but turns a non-empty issue list into an error.
pub fn ensure_file_valid(path: &Path) -> Result<(), ValidationError> {
    let issues = validate_file(path)?;
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Invalid {
            path: path.to_path_buf(),
            issues,
        })
    }
}

/// Characters the INI reader refuses inside keys.
const RESERVED_KEY_CHARS: &[char] = &['?', '{', '}', '|', '&', '~', '!', '(', ')', '^', '"', '='];
/// Characters the INI reader refuses in unquoted values.
const RESERVED_VALUE_CHARS: &[char] = &['{', '}', '|', '&', '~', '!', '(', ')', '^', '='];

/// Sections of key/value pairs; keys before the first header live in the `""` section.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IniDocument {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl IniDocument {
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sections.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parses INI text: `[section]` headers, `;` comments, `key = value` pairs where
    /// values mix unquoted text and double-quoted strings (which may span lines and
    /// honour `\"` and `\\`).
    pub fn parse(content: &str) -> Result<Self, IniParseError> {
        let mut doc = IniDocument::default();
        let mut section = String::new();
        let chars: Vec<char> = content.chars().collect();
        let mut pos = 0;
        let mut line = 1;

        let error = |line: usize, message: String| IniParseError { line, message };

        while pos < chars.len() {
            // Start of a logical line.
            while pos < chars.len() && chars[pos] != '\n' && chars[pos].is_whitespace() {
                pos += 1;
            }
            if pos >= chars.len() {
                break;
            }
            match chars[pos] {
                '\n' => {
                    pos += 1;
                    line += 1;
                }
                ';' => {
                    while pos < chars.len() && chars[pos] != '\n' {
                        pos += 1;
                    }
                }
                '[' => {
                    let start = pos + 1;
                    while pos < chars.len() && chars[pos] != ']' && chars[pos] != '\n' {
                        pos += 1;
                    }
                    if pos >= chars.len() || chars[pos] != ']' {
                        return Err(error(line, "unterminated section header".to_string()));
                    }
                    let name: String = chars[start..pos].iter().collect();
                    let name = name.trim().to_string();
                    if name.is_empty() {
                        return Err(error(line, "empty section name".to_string()));
                    }
                    pos += 1;
                    Self::expect_end_of_line(&chars, &mut pos, line)?;
                    doc.sections.entry(name.clone()).or_default();
                    section = name;
                }
                _ => {
                    let key_line = line;
                    let start = pos;
                    while pos < chars.len() && chars[pos] != '=' && chars[pos] != '\n' {
                        pos += 1;
                    }
                    if pos >= chars.len() || chars[pos] != '=' {
                        return Err(error(key_line, "expected '=' after key".to_string()));
                    }
                    let key: String = chars[start..pos].iter().collect();
                    let key = key.trim().to_string();
                    if let Some(c) = key.chars().find(|c| RESERVED_KEY_CHARS.contains(c)) {
                        return Err(error(key_line, format!("unexpected '{}' in key", c)));
                    }
                    pos += 1;
                    let value = Self::parse_value(&chars, &mut pos, &mut line)?;
                    doc.sections
                        .entry(section.clone())
                        .or_default()
                        .insert(key, value);
                }
            }
        }

        Ok(doc)
    }

    fn expect_end_of_line(chars: &[char], pos: &mut usize, line: usize) -> Result<(), IniParseError> {
        while *pos < chars.len() && chars[*pos] != '\n' {
            match chars[*pos] {
                ';' => {
                    while *pos < chars.len() && chars[*pos] != '\n' {
                        *pos += 1;
                    }
                }
                c if c.is_whitespace() => *pos += 1,
                c => {
                    return Err(IniParseError {
                        line,
                        message: format!("unexpected '{}' after section header", c),
                    })
                }
            }
        }
        Ok(())
    }

    fn parse_value(chars: &[char], pos: &mut usize, line: &mut usize) -> Result<String, IniParseError> {
        let mut value = String::new();
        let mut raw = String::new();

        while *pos < chars.len() && chars[*pos] != '\n' {
            match chars[*pos] {
                ';' => {
                    while *pos < chars.len() && chars[*pos] != '\n' {
                        *pos += 1;
                    }
                }
                '"' => {
                    value.push_str(raw.trim());
                    raw.clear();
                    let opened = *line;
                    *pos += 1;
                    loop {
                        let Some(&c) = chars.get(*pos) else {
                            return Err(IniParseError {
                                line: opened,
                                message: "unterminated quoted value".to_string(),
                            });
                        };
                        match c {
                            '"' => {
                                *pos += 1;
                                break;
                            }
                            '\\' if matches!(chars.get(*pos + 1), Some('"') | Some('\\')) => {
                                value.push(chars[*pos + 1]);
                                *pos += 2;
                            }
                            '$' if chars.get(*pos + 1) == Some(&'{') => {
                                let close = chars[*pos..]
                                    .iter()
                                    .position(|&c| c == '}' || c == '"')
                                    .map(|offset| *pos + offset);
                                match close {
                                    Some(end) if chars[end] == '}' => {
                                        value.extend(&chars[*pos..=end]);
                                        *pos = end + 1;
                                    }
                                    _ => {
                                        return Err(IniParseError {
                                            line: *line,
                                            message: "unterminated ${ expansion".to_string(),
                                        })
                                    }
                                }
                            }
                            '\n' => {
                                *line += 1;
                                value.push(c);
                                *pos += 1;
                            }
                            _ => {
                                value.push(c);
                                *pos += 1;
                            }
                        }
                    }
                }
                c if RESERVED_VALUE_CHARS.contains(&c) => {
                    return Err(IniParseError {
                        line: *line,
                        message: format!("unexpected '{}' in value", c),
                    });
                }
                c => {
                    raw.push(c);
                    *pos += 1;
                }
            }
        }

        value.push_str(raw.trim());
        Ok(value)
    }
}
