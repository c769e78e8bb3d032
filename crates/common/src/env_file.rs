//! Flat `KEY=value` settings files.
//!
//! The settings file is shared with other tooling (an admin passcode lives in
//! the same file), so writing is always a merge: keys being saved are updated
//! in place or appended, and every other line (unrelated keys, comments,
//! blank lines) is written back byte-for-byte in its original position.
//!
//! Accepted line forms:
//!
//! ```text
//! # comment
//! KEY=value
//! export KEY=value
//! KEY="value with spaces"
//! KEY='single quoted'
//! ```

use std::fmt::Write as _;

/// One line of a settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// A parsed `KEY=value` entry. `raw` holds the original text until the
    /// value is replaced.
    Entry {
        key: String,
        value: String,
        raw: Option<String>,
    },
    /// Comment, blank, or unparseable line, preserved verbatim.
    Other(String),
}

/// An in-memory settings file that preserves layout on render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    lines: Vec<Line>,
}

impl EnvFile {
    /// Parse file contents. Never fails; lines that are not entries are kept
    /// as opaque text.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let lines = content.lines().map(parse_line).collect();
        Self { lines }
    }

    /// Value for `key`. When a key repeats, the last occurrence wins.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// All entries in file order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry { key, value, .. } => Some((key.as_str(), value.as_str())),
            Line::Other(_) => None,
        })
    }

    /// Set `key` to `value`. Every existing occurrence is updated in place;
    /// a missing key is appended at the end.
    pub fn set(&mut self, key: &str, value: &str) {
        let mut found = false;
        for line in &mut self.lines {
            if let Line::Entry {
                key: k,
                value: v,
                raw,
            } = line
            {
                if k == key {
                    found = true;
                    if v != value {
                        *v = value.to_string();
                        *raw = None;
                    }
                }
            }
        }

        if !found {
            self.lines.push(Line::Entry {
                key: key.to_string(),
                value: value.to_string(),
                raw: None,
            });
        }
    }

    /// Render back to text. Untouched lines keep their original form; the
    /// output always ends with a newline when non-empty.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Other(text) | Line::Entry { raw: Some(text), .. } => out.push_str(text),
                Line::Entry {
                    key,
                    value,
                    raw: None,
                } => {
                    let _ = write!(out, "{key}={}", quote_value(value));
                }
            }
            out.push('\n');
        }
        out
    }
}

fn parse_line(raw: &str) -> Line {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Line::Other(raw.to_string());
    }

    let body = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let Some((key, value)) = body.split_once('=') else {
        return Line::Other(raw.to_string());
    };

    let key = key.trim();
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return Line::Other(raw.to_string());
    }

    Line::Entry {
        key: key.to_string(),
        value: unquote_value(value.trim()),
        raw: Some(raw.to_string()),
    }
}

fn unquote_value(value: &str) -> String {
    if let Some(inner) = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some(other) => out.push(other),
                    None => out.push('\\'),
                }
            } else {
                out.push(c);
            }
        }
        return out;
    }

    if let Some(inner) = value
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return inner.to_string();
    }

    value.to_string()
}

fn quote_value(value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '\\'));
    if !needs_quotes {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
