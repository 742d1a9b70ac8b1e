//! `.env` parsing and the environment variable set handed to the managed container.
//!
//! The grammar is line based:
//!
//! - blank lines and lines starting with `#` are ignored
//! - every other line is `KEY=VALUE`, optionally prefixed with `export `
//! - `KEY` must match `[A-Za-z_][A-Za-z0-9_]*`
//! - double-quoted values understand `\n`, `\t`, `\"` and `\\`
//! - single-quoted values are taken literally
//! - unquoted values lose a trailing ` # comment` and surrounding whitespace
//!
//! Quoted values must be closed on the line they start on.
//!
//! Two parse modes exist. [`ParseMode::Strict`] fails on the first malformed
//! line and is what the resource file and secret payloads are parsed with.
//! [`ParseMode::Lenient`] skips malformed lines and returns every error next
//! to the pairs it could read.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("environment key pattern is valid")
});

/// Returns whether `key` is a valid environment variable identifier.
pub fn is_valid_key(key: &str) -> bool {
    KEY_PATTERN.is_match(key)
}

/// A malformed `.env` line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The line has no `=` separator
    #[error("line {line}: expected KEY=VALUE")]
    MissingSeparator { line: usize },

    /// The key is empty or not an identifier
    #[error("line {line}: invalid variable name {key:?}")]
    InvalidKey { line: usize, key: String },

    /// A quoted value is never closed
    #[error("line {line}: unterminated quoted value")]
    UnterminatedQuote { line: usize },

    /// Characters follow the closing quote
    #[error("line {line}: unexpected characters after quoted value")]
    TrailingCharacters { line: usize },
}

impl ParseError {
    /// 1-based line number of the offending line.
    pub fn line(&self) -> usize {
        match self {
            ParseError::MissingSeparator { line }
            | ParseError::InvalidKey { line, .. }
            | ParseError::UnterminatedQuote { line }
            | ParseError::TrailingCharacters { line } => *line,
        }
    }
}

/// How malformed lines are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Fail the whole parse on the first malformed line
    #[default]
    Strict,
    /// Skip malformed lines and report them
    Lenient,
}

/// Result of a parse: the variables read plus the lines that were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parsed {
    pub env: EnvironmentSet,
    pub errors: Vec<ParseError>,
}

/// Environment variables for the managed container.
///
/// Keys are unique. The map is ordered so that two sets with the same pairs
/// compare and serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentSet(BTreeMap<String, String>);

impl EnvironmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a variable, returning the value it replaced.
    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merge(&mut self, other: EnvironmentSet) {
        self.0.extend(other.0);
    }

    /// Merge layers in order of increasing precedence.
    pub fn layered<I: IntoIterator<Item = EnvironmentSet>>(layers: I) -> Self {
        let mut merged = Self::new();
        for layer in layers {
            merged.merge(layer);
        }
        merged
    }

    /// Render as `KEY=VALUE` strings, the shape the Docker API expects.
    pub fn to_env_list(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Parse `.env` content in strict mode.
pub fn parse(content: &str) -> Result<EnvironmentSet, ParseError> {
    parse_with_mode(content, ParseMode::Strict).map(|parsed| parsed.env)
}

/// Parse `.env` content, skipping and reporting malformed lines.
pub fn parse_lenient(content: &str) -> Parsed {
    let mut parsed = Parsed::default();
    for (index, raw) in content.lines().enumerate() {
        match parse_line(index + 1, raw) {
            Ok(Some((key, value))) => {
                parsed.env.insert(key, value);
            }
            Ok(None) => {}
            Err(e) => parsed.errors.push(e),
        }
    }
    parsed
}

/// Parse `.env` content with an explicit mode.
///
/// In strict mode the first malformed line is returned as the error; in
/// lenient mode this never fails.
pub fn parse_with_mode(content: &str, mode: ParseMode) -> Result<Parsed, ParseError> {
    let parsed = parse_lenient(content);
    match mode {
        ParseMode::Strict => match parsed.errors.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(Parsed {
                env: parsed.env,
                errors: Vec::new(),
            }),
        },
        ParseMode::Lenient => Ok(parsed),
    }
}

fn parse_line(line: usize, raw: &str) -> Result<Option<(String, String)>, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let body = trimmed
        .strip_prefix("export ")
        .map(str::trim_start)
        .unwrap_or(trimmed);

    let (key, value) = body
        .split_once('=')
        .ok_or(ParseError::MissingSeparator { line })?;

    let key = key.trim();
    if !is_valid_key(key) {
        return Err(ParseError::InvalidKey {
            line,
            key: key.to_string(),
        });
    }

    let value = parse_value(line, value.trim())?;
    Ok(Some((key.to_string(), value)))
}

fn parse_value(line: usize, value: &str) -> Result<String, ParseError> {
    if let Some(rest) = value.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = rest.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    check_trailing(line, &rest[i + 1..])?;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, other)) => out.push(other),
                    None => break,
                },
                _ => out.push(c),
            }
        }
        return Err(ParseError::UnterminatedQuote { line });
    }

    if let Some(rest) = value.strip_prefix('\'') {
        let end = rest
            .find('\'')
            .ok_or(ParseError::UnterminatedQuote { line })?;
        check_trailing(line, &rest[end + 1..])?;
        return Ok(rest[..end].to_string());
    }

    // Unquoted: a `#` preceded by whitespace starts a comment
    let unquoted = match value.find(" #").or_else(|| value.find("\t#")) {
        Some(pos) => &value[..pos],
        None => value,
    };
    Ok(unquoted.trim().to_string())
}

fn check_trailing(line: usize, rest: &str) -> Result<(), ParseError> {
    let rest = rest.trim_start();
    if rest.is_empty() || rest.starts_with('#') {
        Ok(())
    } else {
        Err(ParseError::TrailingCharacters { line })
    }
}
