//! Parser for the line-based text exposition format served at `/metrics`.
//!
//! Only sample lines matter to the snapshot extractor, so `# HELP` / `# TYPE`
//! metadata is skipped and samples are returned flat, in input order. Family
//! grouping is done by name suffix in [`crate::snapshot`].

use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

/// One sample line: `name{label="value",...} value [timestamp]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl Sample {
    /// Value of the label `key`, if the sample carries it.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A line of the body could not be parsed as a sample.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed exposition at line {line}: {reason}")]
pub struct ExpositionError {
    /// 1-based line number.
    pub line: usize,
    pub reason: String,
}

/// Parse a full exposition body into its samples.
pub fn parse(text: &str) -> Result<Vec<Sample>, ExpositionError> {
    let mut samples = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let sample = parse_line(line).map_err(|reason| ExpositionError { line: idx + 1, reason })?;
        samples.push(sample);
    }
    Ok(samples)
}

/// Parse a sample value or an `le` boundary. Accepts the exposition spellings
/// `+Inf`, `-Inf` and `NaN` in addition to ordinary floats.
pub fn parse_value(raw: &str) -> Option<f64> {
    match raw {
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => raw.parse::<f64>().ok(),
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

fn parse_line(line: &str) -> Result<Sample, String> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .ok_or_else(|| "sample has no value".to_string())?;
    let name = &line[..name_end];
    if name.is_empty() || !name.chars().all(is_name_char) {
        return Err(format!("invalid metric name {name:?}"));
    }

    let mut rest = &line[name_end..];
    let labels = if let Some(body) = rest.strip_prefix('{') {
        let (labels, after) = parse_labels(body)?;
        rest = after;
        labels
    } else {
        Vec::new()
    };

    let mut fields = rest.split_whitespace();
    let raw = fields.next().ok_or_else(|| "sample has no value".to_string())?;
    let value = parse_value(raw).ok_or_else(|| format!("invalid sample value {raw:?}"))?;

    // An optional trailing timestamp is allowed and ignored.
    if let Some(ts) = fields.next() {
        if ts.parse::<i64>().is_err() {
            return Err(format!("invalid timestamp {ts:?}"));
        }
    }
    if fields.next().is_some() {
        return Err("trailing data after timestamp".to_string());
    }

    Ok(Sample { name: name.to_string(), labels, value })
}

/// Parse the label set following `{`. Returns the labels and the remainder of
/// the line after the closing `}`.
fn parse_labels(input: &str) -> Result<(Vec<(String, String)>, &str), String> {
    let mut labels = Vec::new();
    let mut chars = input.char_indices().peekable();

    loop {
        skip_whitespace(&mut chars);
        match chars.peek() {
            None => return Err("unterminated label set".to_string()),
            Some(&(idx, '}')) => return Ok((labels, &input[idx + 1..])),
            Some(_) => {}
        }

        let mut key = String::new();
        loop {
            match chars.next() {
                Some((_, '=')) => break,
                Some((_, c)) if is_name_char(c) => key.push(c),
                Some((_, c)) if c.is_whitespace() => {}
                Some((_, c)) => return Err(format!("unexpected {c:?} in label name")),
                None => return Err("unterminated label set".to_string()),
            }
        }
        if key.is_empty() {
            return Err("empty label name".to_string());
        }

        skip_whitespace(&mut chars);
        if !matches!(chars.next(), Some((_, '"'))) {
            return Err(format!("label {key:?} value is not quoted"));
        }
        let value = read_quoted(&mut chars).ok_or_else(|| format!("unterminated value for label {key:?}"))?;
        labels.push((key, value));

        skip_whitespace(&mut chars);
        match chars.peek() {
            Some(&(_, ',')) => {
                chars.next();
            }
            Some(&(_, '}')) => {}
            Some(&(_, c)) => return Err(format!("unexpected {c:?} after label value")),
            None => return Err("unterminated label set".to_string()),
        }
    }
}

/// Read an escaped label value up to and including its closing quote.
fn read_quoted(chars: &mut Peekable<CharIndices<'_>>) -> Option<String> {
    let mut value = String::new();
    loop {
        match chars.next()? {
            (_, '"') => return Some(value),
            (_, '\\') => match chars.next()? {
                (_, 'n') => value.push('\n'),
                (_, '"') => value.push('"'),
                (_, '\\') => value.push('\\'),
                (_, other) => {
                    value.push('\\');
                    value.push(other);
                }
            },
            (_, c) => value.push(c),
        }
    }
}

fn skip_whitespace(chars: &mut Peekable<CharIndices<'_>>) {
    while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
        chars.next();
    }
}
