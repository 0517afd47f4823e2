use std::io::{Error, ErrorKind, Read, Result};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left alone by [`query_escape`].
const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Undoes URL query escaping: `%XX` sequences are decoded and `+` becomes a space.
///
/// Fails with ErrorKind::InvalidInput on a truncated or non-hex escape, and with
/// ErrorKind::InvalidData if the decoded bytes are not UTF-8.
pub fn query_unescape(s: &str) -> Result<String> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("invalid URL escape {:?}", String::from_utf8_lossy(&bytes[i..end])),
                ));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let plus_decoded = s.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|source| Error::new(ErrorKind::InvalidData, source))
}

/// Escapes a filename so that it survives a `Content-Disposition` parameter and decodes back
/// with [`query_unescape`].  Path separators are kept readable.
pub fn query_escape(s: &str) -> String {
    utf8_percent_encode(s, QUERY_ESCAPE).to_string()
}

/// Splits a pathname at its last `/` into the containing directory and the final component.
///
/// The directory part carries no trailing slash; it is empty for names without a `/`.
pub fn split_path(name: &str) -> (&str, &str) {
    match name.rsplit_once('/') {
        Some((dir, base)) => (dir, base),
        None => ("", name),
    }
}

/// Normalizes a pathname into its list of components.
///
/// Empty components and `.` are dropped and `..` removes the previous component when there is
/// one, so `""`, `"."` and `"/"` all refer to the root (an empty list).
pub fn path_segments(path: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = vec![];
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." if segments.last().is_some_and(|s| *s != "..") => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    segments
}

/// Reads a reader to its end, discarding the data.  Returns the number of bytes skipped.
pub(crate) fn drain(reader: &mut impl Read) -> Result<u64> {
    std::io::copy(reader, &mut std::io::sink())
}
