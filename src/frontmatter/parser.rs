//! Frontmatter header detection and parsing
//!
//! The opening fence of a body decides the header format:
//!
//! ```text
//! ---        YAML, closed by `---` or `...`
//! +++        TOML, closed by `+++`
//! {          JSON, closed by a line `}`
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Header formats recognised at the top of a body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fence {
    Yaml,
    Toml,
    Json,
}

impl Fence {
    fn open(line: &str) -> Option<Self> {
        match line {
            "---" => Some(Fence::Yaml),
            "+++" => Some(Fence::Toml),
            "{" => Some(Fence::Json),
            _ => None,
        }
    }

    fn closes(self, line: &str) -> bool {
        match self {
            Fence::Yaml => line == "---" || line == "...",
            Fence::Toml => line == "+++",
            Fence::Json => line == "}",
        }
    }
}

/// Parse failure located within the body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontMatterError {
    /// 1-based line within the body
    pub line: usize,
    /// 1-based column
    pub column: usize,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<String>,
}

impl std::fmt::Display for FrontMatterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.detail)
    }
}

/// Outcome of parsing a body's header
#[derive(Debug, Clone, PartialEq)]
pub enum FrontMatter {
    Absent,
    Parsed(Map<String, Value>),
    Malformed(FrontMatterError),
}

/// A detected header block
#[derive(Debug, PartialEq, Eq)]
struct Header {
    fence: Fence,
    text: String,
    /// Body line number of the first line of `text`
    first_line: usize,
}

fn detect(body: &str) -> Option<Header> {
    let body = body.strip_prefix('\u{feff}').unwrap_or(body);
    let mut lines = body.lines();
    let fence = Fence::open(lines.next()?.trim_end())?;

    let mut inner = Vec::new();
    for line in lines {
        if fence.closes(line.trim_end()) {
            let (text, first_line) = match fence {
                Fence::Json => (format!("{{\n{}\n}}", inner.join("\n")), 1),
                _ => (inner.join("\n"), 2),
            };
            return Some(Header {
                fence,
                text,
                first_line,
            });
        }
        inner.push(line);
    }
    None
}

/// Parse the header of a Markdown body.
///
/// Bodies without a closed header block are [`FrontMatter::Absent`].
pub fn parse(body: &str) -> FrontMatter {
    let Some(header) = detect(body) else {
        return FrontMatter::Absent;
    };
    if header.fence != Fence::Json && header.text.trim().is_empty() {
        return FrontMatter::Parsed(Map::new());
    }

    let value = match header.fence {
        Fence::Yaml => serde_yaml::from_str::<Value>(&header.text).map_err(|e| {
            let (line, column) = e
                .location()
                .map(|location| (location.line(), location.column()))
                .unwrap_or((1, 1));
            header.error(line, column, e.to_string())
        }),
        Fence::Toml => toml::from_str::<toml::Table>(&header.text)
            .map(|table| toml_to_json(toml::Value::Table(table)))
            .map_err(|e| {
                let (line, column) = e
                    .span()
                    .map(|span| line_column(&header.text, span.start))
                    .unwrap_or((1, 1));
                let message = if e.message().trim().is_empty() {
                    e.to_string()
                } else {
                    e.message().to_string()
                };
                let (detail, expected) = split_toml_message(&message);
                FrontMatterError {
                    expected,
                    ..header.error(line, column, detail)
                }
            }),
        Fence::Json => serde_json::from_str::<Value>(&header.text).map_err(|e| {
            header.error(e.line().max(1), e.column().max(1), e.to_string())
        }),
    };

    match value {
        Ok(Value::Object(map)) => FrontMatter::Parsed(map),
        Ok(Value::Null) => FrontMatter::Parsed(Map::new()),
        Ok(other) => FrontMatter::Malformed(FrontMatterError {
            line: header.first_line,
            column: 1,
            detail: "frontmatter must be a mapping".to_string(),
            expected: Some("mapping".to_string()),
            found: Some(kind_of(&other).to_string()),
        }),
        Err(e) => FrontMatter::Malformed(e),
    }
}

impl Header {
    /// Build an error from a position relative to `text`.
    fn error(&self, line: usize, column: usize, detail: String) -> FrontMatterError {
        let found = self
            .text
            .lines()
            .nth(line.saturating_sub(1))
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        FrontMatterError {
            line: self.first_line + line.saturating_sub(1),
            column,
            detail,
            expected: None,
            found,
        }
    }
}

/// Split a toml error message into its description and `expected ...` part.
///
/// The rendered form of an error repeats the position and a source excerpt
/// (`3 | broken =`, `  |   ^`); those lines are dropped.
fn split_toml_message(message: &str) -> (String, Option<String>) {
    let mut detail = Vec::new();
    let mut expected = None;
    let mut heading = None;
    for line in message.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if let Some(rest) = line.strip_prefix("expected ") {
            expected = Some(rest.to_string());
        } else if line.starts_with("TOML parse error") {
            heading = Some(line);
        } else if !is_excerpt(line) {
            detail.push(line);
        }
    }
    let detail = match (detail.is_empty(), heading) {
        (false, _) => detail.join("; "),
        (true, Some(heading)) => heading.to_string(),
        (true, None) => "invalid TOML".to_string(),
    };
    (detail, expected)
}

fn is_excerpt(line: &str) -> bool {
    match line.split_once('|') {
        Some((gutter, _)) => gutter.trim().chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let before = &text.as_bytes()[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|position| position + 1)
        .unwrap_or(0);
    (line, offset - line_start + 1)
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_json(value)))
                .collect(),
        ),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
