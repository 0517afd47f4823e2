//! A streaming multipart tokenizer.
//!
//! [`MultipartReader`] splits a raw `multipart/*` body into [`Part`]s without holding more than
//! a delimiter's worth of body data back.  All bodies share the reader's state: a body can only
//! be read while its part is the current one, and asking for the next part skips whatever is
//! left of the current body.

use std::{
    cell::RefCell,
    cmp::min,
    io::{self, Error, ErrorKind, Read},
    rc::Rc,
};

use log::trace;

use crate::{
    error::Result,
    mediatype::{self, MediaTypeError},
    part::{Headers, Part, PartSource},
};

const READ_CHUNK: usize = 8192;
/// Header lines longer than this are rejected.
const MAX_LINE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Inside the body of the current part (or the preamble).
    Body,
    /// Just past a delimiter, before its line ending.
    Delimiter,
    /// The closing delimiter has been read.
    Finished,
}

struct Stream<R> {
    reader: R,
    buf: Vec<u8>,
    /// `CRLF--boundary`
    delimiter: Vec<u8>,
    position: Position,
    /// True until the first byte of the current body was handed out.
    at_body_start: bool,
    /// Incremented for every part handed out.
    index: u64,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

impl<R: Read> Stream<R> {
    /// Reads another chunk into the buffer.  Returns false at the end of the input.
    fn fill(&mut self) -> io::Result<bool> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.reader.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn take(&mut self, out: &mut [u8], available: usize) -> usize {
        let n = min(available, out.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.buf.drain(..n);
        n
    }

    fn read_body(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.position != Position::Body || out.is_empty() {
            return Ok(0);
        }

        if self.at_body_start {
            // an empty body: the header block's blank line already took the delimiter's CRLF
            let dash_len = self.delimiter.len() - 2;
            while self.buf.len() < dash_len && self.fill()? {}
            self.at_body_start = false;
            if self.buf.starts_with(&self.delimiter[2..]) {
                self.buf.drain(..dash_len);
                self.position = Position::Delimiter;
                return Ok(0);
            }
        }

        loop {
            if let Some(pos) = find(&self.buf, &self.delimiter) {
                if pos == 0 {
                    self.buf.drain(..self.delimiter.len());
                    self.position = Position::Delimiter;
                    return Ok(0);
                }
                return Ok(self.take(out, pos));
            }

            // anything before the last delimiter.len() - 1 bytes can't start a delimiter
            let keep = self.delimiter.len() - 1;
            if self.buf.len() > keep {
                let available = self.buf.len() - keep;
                return Ok(self.take(out, available));
            }

            if !self.fill()? {
                return Err(Error::new(
                    ErrorKind::UnexpectedEof,
                    "multipart body ended before the closing delimiter",
                ));
            }
        }
    }

    fn skip_body(&mut self) -> io::Result<()> {
        let mut scratch = [0u8; READ_CHUNK];
        while self.read_body(&mut scratch)? != 0 {}
        Ok(())
    }

    /// Reads one line and returns it without its line ending.
    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let mut searched = 0;
        loop {
            if let Some(pos) = self.buf[searched..].iter().position(|&c| c == b'\n') {
                let end = searched + pos;
                let mut line: Vec<u8> = self.buf.drain(..=end).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(line);
            }
            searched = self.buf.len();

            if self.buf.len() > MAX_LINE {
                return Err(Error::new(ErrorKind::InvalidData, "multipart line too long"));
            }
            if !self.fill()? {
                return Err(Error::new(
                    ErrorKind::UnexpectedEof,
                    "multipart body ended inside a header block",
                ));
            }
        }
    }

    fn read_headers(&mut self) -> io::Result<Headers> {
        let mut fields: Vec<(String, String)> = vec![];

        loop {
            let line = self.read_line()?;
            if line.is_empty() {
                break;
            }
            let line = String::from_utf8(line)
                .map_err(|source| Error::new(ErrorKind::InvalidData, source))?;

            if line.starts_with([' ', '\t']) {
                let Some((_, value)) = fields.last_mut() else {
                    return Err(Error::new(
                        ErrorKind::InvalidData,
                        "header continuation without a header",
                    ));
                };
                value.push(' ');
                value.push_str(line.trim());
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("malformed header line {line:?}"),
                ));
            };
            fields.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(Headers::from_iter(fields))
    }

    /// Moves to the next part and returns its headers, or `None` after the closing delimiter.
    fn next_headers(&mut self) -> io::Result<Option<Headers>> {
        if self.position == Position::Body {
            self.skip_body()?;
        }
        if self.position == Position::Finished {
            return Ok(None);
        }

        // the closing delimiter may be the last thing in the input, without a line ending
        while self.buf.len() < 2 && self.fill()? {}
        if self.buf.starts_with(b"--") {
            trace!("closing delimiter after part {}", self.index);
            self.position = Position::Finished;
            return Ok(None);
        }

        let rest = self.read_line()?;
        if !rest.iter().all(|c| *c == b' ' || *c == b'\t') {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "garbage after multipart delimiter",
            ));
        }

        let headers = self.read_headers()?;
        self.index += 1;
        self.position = Position::Body;
        self.at_body_start = true;
        Ok(Some(headers))
    }
}

/// Splits a multipart body into parts.
pub struct MultipartReader<R> {
    stream: Rc<RefCell<Stream<R>>>,
    boundary: String,
}

impl<R: Read> MultipartReader<R> {
    pub fn new(reader: R, boundary: &str) -> Self {
        let mut delimiter = b"\r\n--".to_vec();
        delimiter.extend_from_slice(boundary.as_bytes());

        let stream = Stream {
            reader,
            // lets a delimiter on the very first line match like any other
            buf: b"\r\n".to_vec(),
            delimiter,
            position: Position::Body,
            at_body_start: false,
            index: 0,
        };

        Self {
            stream: Rc::new(RefCell::new(stream)),
            boundary: boundary.to_string(),
        }
    }

    /// Creates a reader using the `boundary` parameter of a `Content-Type` value.
    pub fn from_content_type(reader: R, content_type: &str) -> Result<Self> {
        let media_type = mediatype::parse(content_type)?;
        match media_type.param("boundary") {
            Some(boundary) if !boundary.is_empty() => Ok(Self::new(reader, boundary)),
            _ => Err(MediaTypeError::MissingBoundary(content_type.to_string()).into()),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }
}

/// The body of a part read through a [`MultipartReader`].
struct PartBody<R> {
    stream: Rc<RefCell<Stream<R>>>,
    index: u64,
}

impl<R: Read> Read for PartBody<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream = self.stream.borrow_mut();
        if stream.index != self.index {
            // the reader has moved on to a later part
            return Ok(0);
        }
        stream.read_body(buf)
    }
}

impl<R: Read + 'static> PartSource for MultipartReader<R> {
    fn next_part(&mut self) -> io::Result<Option<Part>> {
        let (headers, index) = {
            let mut stream = self.stream.borrow_mut();
            match stream.next_headers()? {
                Some(headers) => (headers, stream.index),
                None => return Ok(None),
            }
        };

        let body = PartBody {
            stream: Rc::clone(&self.stream),
            index,
        };
        Ok(Some(Part::new(headers, body)))
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::error::Error as CrateError;

    const BODY: &[u8] = b"preamble to ignore\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
Content-Type: application/octet-stream\r\n\
\r\n\
first body\r\nwith --XY lookalikes\r\n\
--XyZ  \r\n\
Content-Disposition: form-data;\r\n\
\tname=\"file\"; filename=\"b\"\n\
\n\
\r\n\
--XyZ--\r\n\
epilogue";

    /// A reader that hands out one byte per read.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0[0];
            self.0 = &self.0[1..];
            Ok(1)
        }
    }

    fn read_all(part: &mut Part) -> String {
        let mut data = String::new();
        part.read_to_string(&mut data).unwrap();
        data
    }

    fn check_body(mut reader: impl PartSource) {
        let mut first = reader.next_part().unwrap().unwrap();
        assert_eq!(first.file_name().as_deref(), Some("a.txt"));
        assert_eq!(first.content_type(), "application/octet-stream");
        assert_eq!(read_all(&mut first), "first body\r\nwith --XY lookalikes");

        let mut second = reader.next_part().unwrap().unwrap();
        assert_eq!(
            second.headers().get("content-disposition"),
            Some("form-data; name=\"file\"; filename=\"b\"")
        );
        assert_eq!(second.file_name().as_deref(), Some("b"));
        assert_eq!(second.content_type(), "");
        assert_eq!(read_all(&mut second), "");

        assert!(reader.next_part().unwrap().is_none());
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_parts() {
        check_body(MultipartReader::new(BODY, "XyZ"));
    }

    #[test]
    fn test_parts_one_byte_at_a_time() {
        check_body(MultipartReader::new(Trickle(BODY), "XyZ"));
    }

    #[test]
    fn test_unread_body_is_skipped() {
        let mut reader = MultipartReader::new(BODY, "XyZ");
        let mut first = reader.next_part().unwrap().unwrap();
        let mut buf = [0u8; 5];
        first.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"first");

        let second = reader.next_part().unwrap().unwrap();
        assert_eq!(second.file_name().as_deref(), Some("b"));

        // the first body is stale now
        assert_eq!(read_all(&mut first), "");
    }

    #[test]
    fn test_empty_multipart() {
        let mut reader = MultipartReader::new(b"--b--\r\n" as &[u8], "b");
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_close_delimiter_at_eof() {
        let body: &[u8] = b"--b\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"a\"\r\n\
\r\n\
A\r\n\
--b--";
        for mut reader in [
            MultipartReader::new(Box::new(body) as Box<dyn Read>, "b"),
            MultipartReader::new(Box::new(Trickle(body)) as Box<dyn Read>, "b"),
        ] {
            let mut part = reader.next_part().unwrap().unwrap();
            assert_eq!(read_all(&mut part), "A");
            assert!(reader.next_part().unwrap().is_none());
            assert!(reader.next_part().unwrap().is_none());
        }

        let mut reader = MultipartReader::new(b"--b--" as &[u8], "b");
        assert!(reader.next_part().unwrap().is_none());
    }

    const EMPTY_FIRST: &[u8] = b"--b\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"e\"\r\n\
\r\n\
--b\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"f\"\r\n\
\r\n\
F\r\n\
--b--\r\n";

    #[test]
    fn test_empty_body_right_after_headers() {
        let mut reader = MultipartReader::new(Trickle(EMPTY_FIRST), "b");
        let mut empty = reader.next_part().unwrap().unwrap();
        assert_eq!(empty.file_name().as_deref(), Some("e"));
        assert_eq!(read_all(&mut empty), "");

        let mut next = reader.next_part().unwrap().unwrap();
        assert_eq!(next.file_name().as_deref(), Some("f"));
        assert_eq!(read_all(&mut next), "F");
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_unread_empty_body_is_skipped() {
        let mut reader = MultipartReader::new(EMPTY_FIRST, "b");
        let first = reader.next_part().unwrap().unwrap();
        assert_eq!(first.file_name().as_deref(), Some("e"));

        let mut next = reader.next_part().unwrap().unwrap();
        assert_eq!(next.file_name().as_deref(), Some("f"));
        assert_eq!(read_all(&mut next), "F");
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_truncated_body() {
        let body = b"--b\r\nContent-Type: text/plain\r\n\r\nno end in sight" as &[u8];
        let mut reader = MultipartReader::new(body, "b");
        let mut part = reader.next_part().unwrap().unwrap();
        let mut data = vec![];
        assert_eq!(
            part.read_to_end(&mut data).unwrap_err().kind(),
            ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn test_truncated_headers() {
        let body = b"--b\r\nContent-Type: text/plain\r\n" as &[u8];
        let mut reader = MultipartReader::new(body, "b");
        assert_eq!(
            reader.next_part().unwrap_err().kind(),
            ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn test_malformed_header() {
        let body = b"--b\r\nnot a header\r\n\r\n\r\n--b--" as &[u8];
        let mut reader = MultipartReader::new(body, "b");
        assert_eq!(
            reader.next_part().unwrap_err().kind(),
            ErrorKind::InvalidData
        );
    }

    #[test]
    fn test_from_content_type() {
        let reader =
            MultipartReader::from_content_type(BODY, "multipart/form-data; boundary=\"XyZ\"")
                .unwrap();
        assert_eq!(reader.boundary(), "XyZ");
        check_body(reader);

        assert!(matches!(
            MultipartReader::from_content_type(BODY, "multipart/form-data"),
            Err(CrateError::MediaType(MediaTypeError::MissingBoundary(_)))
        ));
        assert!(matches!(
            MultipartReader::from_content_type(BODY, "multipart/form-data; boundary=\"\""),
            Err(CrateError::MediaType(MediaTypeError::MissingBoundary(_)))
        ));
    }
}
