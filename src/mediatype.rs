//! Media type parsing for `Content-Type` and `Content-Disposition` values.
//!
//! The grammar is the RFC 2045 one: a lowercased `type/subtype` (or a bare token, which is what
//! dispositions look like) followed by `; name=value` parameters, where the value is either a
//! token or a quoted string.

use std::{collections::BTreeMap, fmt};

use thiserror::Error;

/// The media type of a directory introduced by a form upload.
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";
/// The media type of a plain multipart body.
pub const MULTIPART_MIXED: &str = "multipart/mixed";
/// The media type of a nested directory marker part.
pub const APPLICATION_DIRECTORY: &str = "application/x-directory";
/// The media type of a symlink part.  The body is the link target.
pub const APPLICATION_SYMLINK: &str = "application/symlink";
/// The media type of a regular file part.
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

/// Errors from [`parse`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaTypeError {
    #[error("no media type")]
    Empty,
    #[error("invalid media type {0:?}")]
    InvalidType(String),
    #[error("invalid media parameter in {0:?}")]
    InvalidParameter(String),
    #[error("duplicate media parameter {0:?}")]
    DuplicateParameter(String),
    #[error("missing boundary parameter in {0:?}")]
    MissingBoundary(String),
}

/// A parsed media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    essence: String,
    params: BTreeMap<String, String>,
}

/// Returns true if `mediatype` (already lowercased, without parameters) introduces a directory.
pub fn is_directory(mediatype: &str) -> bool {
    mediatype == MULTIPART_FORM_DATA || mediatype == APPLICATION_DIRECTORY
}

fn is_token_char(c: char) -> bool {
    c.is_ascii() && !c.is_ascii_control() && !" ()<>@,;:\\\"/[]?=".contains(c)
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_token_char)
}

/// Splits a leading token off `v`.
fn consume_token(v: &str) -> (&str, &str) {
    let end = v.find(|c| !is_token_char(c)).unwrap_or(v.len());
    v.split_at(end)
}

/// Splits a leading token or quoted string off `v`, returning the unquoted value.
fn consume_value(v: &str) -> Option<(String, &str)> {
    let Some(quoted) = v.strip_prefix('"') else {
        let (token, rest) = consume_token(v);
        return (!token.is_empty()).then(|| (token.to_string(), rest));
    };

    let mut value = String::new();
    let mut chars = quoted.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((value, &quoted[i + 1..])),
            '\\' => value.push(chars.next()?.1),
            _ => value.push(c),
        }
    }

    // unterminated quoted string
    None
}

/// Parses a media type value such as `multipart/form-data; boundary=xyz` or
/// `form-data; name="file"; filename="a/b.txt"`.
pub fn parse(value: &str) -> Result<MediaType, MediaTypeError> {
    let (base, mut rest) = value.split_once(';').map_or((value, ""), |(b, _)| {
        (b, &value[b.len()..])
    });

    let essence = base.trim().to_ascii_lowercase();
    if essence.is_empty() {
        return Err(MediaTypeError::Empty);
    }
    let valid = match essence.split_once('/') {
        Some((main, sub)) => is_token(main) && is_token(sub),
        None => is_token(&essence),
    };
    if !valid {
        return Err(MediaTypeError::InvalidType(value.to_string()));
    }

    let invalid = || MediaTypeError::InvalidParameter(value.to_string());
    let mut params = BTreeMap::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        rest = rest.strip_prefix(';').ok_or_else(invalid)?.trim_start();
        if rest.is_empty() || rest.starts_with(';') {
            // trailing or repeated semicolons are ignored
            continue;
        }

        let (name, after) = consume_token(rest);
        if name.is_empty() {
            return Err(invalid());
        }
        let after = after.trim_start().strip_prefix('=').ok_or_else(invalid)?;
        let (param, after) = consume_value(after.trim_start()).ok_or_else(invalid)?;

        let name = name.to_ascii_lowercase();
        if params.contains_key(&name) {
            return Err(MediaTypeError::DuplicateParameter(name));
        }
        params.insert(name, param);
        rest = after;
    }

    Ok(MediaType { essence, params })
}

impl MediaType {
    /// The lowercased `type/subtype` without parameters.
    pub fn essence(&self) -> &str {
        &self.essence
    }

    /// Looks up a parameter by its (case-insensitive) name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_directory(&self) -> bool {
        is_directory(&self.essence)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.essence)?;
        for (name, value) in &self.params {
            if is_token(value) {
                write!(f, "; {name}={value}")?;
            } else {
                write!(f, "; {name}=\"")?;
                for c in value.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"")?;
            }
        }
        Ok(())
    }
}
