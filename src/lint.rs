//! Structural pre-execution checks
//!
//! Best-effort lint passes that short-circuit obviously broken HTML/CSS
//! before it reaches the execution host. A non-empty result means the run
//! is over: the records become the run's output and execution never starts.

use regex::Regex;
use std::sync::LazyLock;

use crate::classify::CodeType;
use crate::sandbox::protocol::LogRecord;

/// Tags that never take a closing counterpart
const SELF_CLOSING: &[&str] = &["br", "hr", "img", "input", "meta", "link"];

static TAG_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9]*)[^<>]*?(/?)>").expect("valid regex"));

/// Run the checks applicable to the classified type.
///
/// HTML flavors get the tag-balance walk, CSS-only gets the statement scan;
/// every other type lints clean. Returns error records only.
pub fn lint(text: &str, code_type: CodeType) -> Vec<LogRecord> {
    match code_type {
        CodeType::HtmlDocument | CodeType::HtmlFragment => check_html_balance(text),
        CodeType::CssOnly => check_css_statements(text),
        _ => Vec::new(),
    }
}

/// Walk `<tag>`/`</tag>` tokens with a stack and report unmatched closes
/// and tags left open at end of input.
pub fn check_html_balance(text: &str) -> Vec<LogRecord> {
    let mut records = Vec::new();
    let mut stack: Vec<String> = Vec::new();

    for token in TAG_TOKEN.captures_iter(text) {
        let closing = !token[1].is_empty();
        let name = token[2].to_lowercase();
        let self_closed = !token[3].is_empty();

        if SELF_CLOSING.contains(&name.as_str()) || self_closed {
            continue;
        }

        if closing {
            match stack.last() {
                Some(open) if *open == name => {
                    stack.pop();
                }
                Some(open) => {
                    records.push(LogRecord::error(format!(
                        "Mismatched closing tag </{}>; expected </{}>",
                        name, open
                    )));
                }
                None => {
                    records.push(LogRecord::error(format!(
                        "Unexpected closing tag </{}> with no matching open tag",
                        name
                    )));
                }
            }
        } else {
            stack.push(name);
        }
    }

    if !stack.is_empty() {
        let open_list = stack
            .iter()
            .map(|t| format!("<{}>", t))
            .collect::<Vec<_>>()
            .join(", ");
        records.push(LogRecord::error(format!("Unclosed tag(s): {}", open_list)));
    }

    records
}

/// Flag lines that look like CSS declarations missing their semicolon:
/// the trimmed line contains `:` but ends with neither `;` nor `{`.
pub fn check_css_statements(text: &str) -> Vec<LogRecord> {
    let mut records = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || !trimmed.contains(':') {
            continue;
        }
        if trimmed.ends_with(';') || trimmed.ends_with('{') || trimmed.ends_with('}') {
            continue;
        }
        records.push(LogRecord::error(format!(
            "Line {}: probable missing semicolon: \"{}\"",
            index + 1,
            trimmed
        )));
    }

    records
}
