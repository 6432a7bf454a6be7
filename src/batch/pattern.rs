use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{MergeError, Result};

use super::BatchMatch;

/// Placeholders usable in a batch pattern, mapping to tag fields.
pub const PLACEHOLDERS: &[(char, &str)] = &[
    ('t', "title"),
    ('a', "artist"),
    ('m', "album"),
    ('s', "series"),
    ('p', "series-part"),
    ('g', "genre"),
    ('y', "year"),
    ('w', "writer"),
    ('c', "comment"),
    ('d', "description"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Placeholder(char),
}

/// A path template with named placeholders (e.g. `%a/%t` for author/title),
/// compiled once and matched against every candidate directory.
#[derive(Debug, Clone)]
pub struct BatchPattern {
    raw: String,
    segments: Vec<Vec<Token>>,
}

impl BatchPattern {
    /// Compile a pattern string into literal separators and named captures.
    pub fn compile(pattern: &str) -> Result<Self> {
        let normalized = normalize(pattern);
        if normalized.is_empty() {
            return Err(MergeError::InvalidInput(
                "batch pattern must not be empty".to_string(),
            ));
        }

        let mut segments = Vec::new();
        for segment in normalized.split('/') {
            segments.push(compile_segment(segment, pattern)?);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of path segments the pattern consumes.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Match the normalized path suffix of a directory against the pattern,
    /// extracting the captured field values. A non-matching directory yields
    /// `None`.
    pub fn match_directory(&self, directory: &Path) -> Option<BatchMatch> {
        let normalized = normalize(&directory.to_string_lossy());
        let path_segments: Vec<&str> = normalized.split('/').collect();
        if path_segments.len() < self.segments.len() {
            return None;
        }

        let tail = &path_segments[path_segments.len() - self.segments.len()..];

        let mut fields = BTreeMap::new();
        for (tokens, text) in self.segments.iter().zip(tail) {
            if !match_segment(tokens, text, &mut fields) {
                return None;
            }
        }

        Some(BatchMatch {
            directory: directory.to_path_buf(),
            fields,
        })
    }
}

/// Backslashes become slashes, trailing slashes are trimmed.
fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_end_matches('/').to_string()
}

fn compile_segment(segment: &str, pattern: &str) -> Result<Vec<Token>> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut literal = String::new();
    let mut chars = segment.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }

        let placeholder = chars.next().ok_or_else(|| {
            MergeError::InvalidInput(format!("dangling '%' in batch pattern '{pattern}'"))
        })?;

        if !PLACEHOLDERS.iter().any(|(p, _)| *p == placeholder) {
            return Err(MergeError::InvalidInput(format!(
                "unknown placeholder '%{placeholder}' in batch pattern '{pattern}'"
            )));
        }

        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(&mut literal)));
        }

        if matches!(tokens.last(), Some(Token::Placeholder(_))) {
            return Err(MergeError::InvalidInput(format!(
                "adjacent placeholders without separator in batch pattern '{pattern}'"
            )));
        }

        tokens.push(Token::Placeholder(placeholder));
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }

    if tokens.is_empty() {
        return Err(MergeError::InvalidInput(format!(
            "empty path segment in batch pattern '{pattern}'"
        )));
    }

    Ok(tokens)
}

/// Match one path segment: literals anchor, placeholders capture non-empty
/// text up to the next literal (or the segment end).
fn match_segment(tokens: &[Token], text: &str, fields: &mut BTreeMap<char, String>) -> bool {
    let mut position = 0;
    let mut index = 0;

    while index < tokens.len() {
        match &tokens[index] {
            Token::Literal(literal) => {
                if !text[position..].starts_with(literal.as_str()) {
                    return false;
                }
                position += literal.len();
            }
            Token::Placeholder(placeholder) => match tokens.get(index + 1) {
                Some(Token::Literal(literal)) => {
                    match text[position..].find(literal.as_str()) {
                        Some(0) | None => return false,
                        Some(offset) => {
                            fields.insert(
                                *placeholder,
                                text[position..position + offset].to_string(),
                            );
                            position += offset;
                        }
                    }
                }
                // adjacent placeholders are rejected at compile time
                Some(Token::Placeholder(_)) => return false,
                None => {
                    if position == text.len() {
                        return false;
                    }
                    fields.insert(*placeholder, text[position..].to_string());
                    position = text.len();
                }
            },
        }
        index += 1;
    }

    position == text.len()
}
