//! Slash-delimited data paths.
//!
//! Paths follow JSON pointer escaping (`~0` is `~`, `~1` is `/`). The empty
//! path, `/` and `.` all address the root of whatever they are resolved
//! against. A path without a leading `/` is relative and gets joined onto a
//! base path by [`join`].

use crate::error::DataPathError;

/// Splits a path into unescaped segments. Empty segments are skipped so that
/// `/a//b/` and `/a/b` address the same node.
pub fn parse(path: &str) -> Result<Vec<String>, DataPathError> {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .map(unescape_token)
        .collect()
}

pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// Resolves `path` against `base`. Absolute paths are returned unchanged.
pub fn join(base: &str, path: &str) -> String {
    if is_absolute(path) {
        return path.to_string();
    }

    let relative = path.trim_start_matches("./");
    if relative.is_empty() || relative == "." {
        return normalize(base);
    }

    let base = base.trim_end_matches('/');
    if base.is_empty() {
        format!("/{relative}")
    } else if is_absolute(base) {
        format!("{base}/{relative}")
    } else {
        format!("/{base}/{relative}")
    }
}

pub fn child(base: &str, key: &str) -> String {
    let base = normalize(base);
    if base == "/" {
        format!("/{}", escape_token(key))
    } else {
        format!("{base}/{}", escape_token(key))
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if is_absolute(trimmed) {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Parses an array index segment. `max_len` is the largest index accepted,
/// which lets writers address one past the end to append.
pub fn parse_index(token: &str, max_len: usize, path: &str) -> Result<usize, DataPathError> {
    let index = token
        .parse::<usize>()
        .map_err(|_| DataPathError::InvalidIndex {
            token: token.to_string(),
            path: path.to_string(),
        })?;

    if index > max_len {
        Err(DataPathError::IndexOutOfBounds {
            token: token.to_string(),
            path: path.to_string(),
        })
    } else {
        Ok(index)
    }
}

fn unescape_token(token: &str) -> Result<String, DataPathError> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();

    while let Some(ch) = chars.next() {
        if ch == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                Some(other) => return Err(DataPathError::InvalidEscape { escape: other }),
                None => return Err(DataPathError::TrailingEscape),
            }
        } else {
            out.push(ch);
        }
    }

    Ok(out)
}

fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
