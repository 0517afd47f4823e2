//! Parts as produced by a multipart tokenizer.
//!
//! A [`Part`] is one segment of a multipart body: its headers plus a body that can be read
//! exactly once.  Anything that produces parts in order implements [`PartSource`].

use std::{fmt, io, io::Read};

use crate::{mediatype, util::drain};

/// Name of the header that drives classification.
pub const CONTENT_TYPE: &str = "Content-Type";
/// Name of the header that carries the filename.
pub const CONTENT_DISPOSITION: &str = "Content-Disposition";
/// Name of the header holding an opaque absolute path hint for files.
pub const ABSPATH: &str = "abspath";

/// An ordered list of header fields with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field, keeping any earlier field of the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Returns the first value of the named field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value of the named field in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One multipart segment.
pub struct Part {
    headers: Headers,
    body: Box<dyn Read>,
}

impl fmt::Debug for Part {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Part")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Part {
    pub fn new(headers: Headers, body: impl Read + 'static) -> Self {
        Self {
            headers,
            body: Box::new(body),
        }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The raw `Content-Type` value, or `""` if there is none.
    pub fn content_type(&self) -> &str {
        self.headers.get(CONTENT_TYPE).unwrap_or("")
    }

    pub fn abspath(&self) -> Option<&str> {
        self.headers.get(ABSPATH)
    }

    fn disposition_param(&self, name: &str) -> Option<String> {
        let disposition = self.headers.get(CONTENT_DISPOSITION)?;
        let parsed = mediatype::parse(disposition).ok()?;
        parsed.param(name).map(str::to_string)
    }

    /// The `filename` parameter of the `Content-Disposition` field, still escaped.
    ///
    /// This is `None` if the field is missing, unparsable or has no filename.
    pub fn file_name(&self) -> Option<String> {
        self.disposition_param("filename")
    }

    /// The `name` parameter of the `Content-Disposition` field.
    pub fn form_name(&self) -> Option<String> {
        self.disposition_param("name")
    }

    /// Reads and discards whatever is left of the body, releasing the part.
    pub fn close(mut self) -> io::Result<()> {
        drain(&mut self.body).map(|_| ())
    }
}

impl Read for Part {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

/// A producer of parts in stream order.
///
/// `Ok(None)` signals the ordinary end of input and is distinct from a transport failure.
pub trait PartSource {
    fn next_part(&mut self) -> io::Result<Option<Part>>;
}

impl<S: PartSource + ?Sized> PartSource for Box<S> {
    fn next_part(&mut self) -> io::Result<Option<Part>> {
        (**self).next_part()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn part_with(disposition: &str) -> Part {
        let headers = Headers::from_iter([(CONTENT_DISPOSITION, disposition)]);
        Part::new(headers, io::empty())
    }

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.append("content-type", "text/plain");
        headers.append("X-Dup", "1");
        headers.append("x-dup", "2");
        assert_eq!(headers.get(CONTENT_TYPE), Some("text/plain"));
        assert_eq!(headers.get_all("X-DUP").collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(headers.get("missing"), None);
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn test_file_name() {
        let part = part_with(r#"form-data; name="file"; filename="a%2Fb.txt""#);
        assert_eq!(part.file_name().as_deref(), Some("a%2Fb.txt"));
        assert_eq!(part.form_name().as_deref(), Some("file"));

        assert_eq!(part_with("form-data; name=file").file_name(), None);
        assert_eq!(part_with("form-data; filename=").file_name(), None);
        assert_eq!(Part::new(Headers::new(), io::empty()).file_name(), None);
    }

    #[test]
    fn test_content_type_default() {
        let part = Part::new(Headers::new(), io::empty());
        assert_eq!(part.content_type(), "");
        assert_eq!(part.abspath(), None);
    }

    #[test]
    fn test_read_and_close() {
        let mut part = Part::new(Headers::new(), b"hello world" as &[u8]);
        let mut buf = [0u8; 5];
        part.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        part.close().unwrap();
    }
}
