//! `$name` / `${name}` placeholder substitution for client configurations.
//!
//! Rendering is plain text substitution and knows nothing about the output
//! format. `$$` emits a literal `$`. Identifiers are `[A-Za-z_][A-Za-z0-9_]*`.

use crate::error::ClientError;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Variables bound for a client configuration.
pub const SERVER_ADDR: &str = "server_addr";
pub const SERVER_PORT: &str = "server_port";
pub const CLIENT_UUID: &str = "client_uuid";
pub const PRIVATE_KEY: &str = "private_key";
pub const HOST_KEYS: &str = "host_keys";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template text, rejecting malformed placeholders.
    pub fn parse(text: &str) -> Result<Self, ClientError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let bytes = text.as_bytes();
        let mut i = 0;

        while let Some(rel) = text[i..].find('$') {
            let start = i + rel;
            literal.push_str(&text[i..start]);
            let next = start + 1;
            match bytes.get(next) {
                Some(b'$') => {
                    literal.push('$');
                    i = next + 1;
                }
                Some(b'{') => {
                    let close = text[next..].find('}').ok_or_else(|| ClientError::TemplateParse {
                        offset: start,
                        reason: "unterminated '${'".to_string(),
                    })?;
                    let name = &text[next + 1..next + close];
                    if !is_identifier(name) {
                        return Err(ClientError::TemplateParse {
                            offset: start,
                            reason: format!("invalid placeholder name '{}'", name),
                        });
                    }
                    flush(&mut segments, &mut literal);
                    segments.push(Segment::Placeholder(name.to_string()));
                    i = next + close + 1;
                }
                Some(&b) if is_ident_start(b) => {
                    let len = bytes[next..]
                        .iter()
                        .take_while(|&&c| is_ident_continue(c))
                        .count();
                    flush(&mut segments, &mut literal);
                    segments.push(Segment::Placeholder(text[next..next + len].to_string()));
                    i = next + len;
                }
                _ => {
                    return Err(ClientError::TemplateParse {
                        offset: start,
                        reason: "'$' must be followed by '$', '{' or an identifier".to_string(),
                    });
                }
            }
        }
        literal.push_str(&text[i..]);
        flush(&mut segments, &mut literal);
        Ok(Self { segments })
    }

    /// Read and parse a template file.
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let text = fs::read_to_string(path).map_err(|source| ClientError::TemplateNotFound {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Substitute every placeholder; any unbound name is an error.
    pub fn render(&self, vars: &BTreeMap<&str, String>) -> Result<String, ClientError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = vars
                        .get(name.as_str())
                        .ok_or_else(|| ClientError::UnboundPlaceholder(name.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

/// Parse and render in one step.
pub fn render(template_text: &str, vars: &BTreeMap<&str, String>) -> Result<String, ClientError> {
    Template::parse(template_text)?.render(vars)
}

fn flush(segments: &mut Vec<Segment>, literal: &mut String) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_identifier(name: &str) -> bool {
    let bytes = name.as_bytes();
    match bytes.first() {
        Some(&b) if is_ident_start(b) => bytes[1..].iter().all(|&c| is_ident_continue(c)),
        _ => false,
    }
}
