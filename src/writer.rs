//! Writing file trees in the multipart layout that [`crate::directory`] decodes.
//!
//! The layout is flat: every file, symlink and directory is one part, named by its full path in
//! the `filename` parameter.  Directory parts have an empty body and must come before their
//! contents, which must follow each other without interruption.

use std::{
    ffi::OsStr,
    io::{self, Read, Write},
    os::unix::ffi::OsStrExt,
};

use crate::{
    directory::MultipartDirectory,
    error::Result,
    mediatype::{
        APPLICATION_DIRECTORY, APPLICATION_OCTET_STREAM, APPLICATION_SYMLINK, MULTIPART_FORM_DATA,
    },
    node::Node,
    part::{ABSPATH, CONTENT_DISPOSITION, CONTENT_TYPE},
    util::query_escape,
};

/// Writes parts to an underlying writer.  Call [`Self::finish()`] to write the closing
/// delimiter.
pub struct MultipartWriter<W: Write> {
    writer: W,
    boundary: String,
}

impl<W: Write> MultipartWriter<W> {
    /// Creates a writer with a random boundary.
    pub fn new(writer: W) -> Self {
        let random: [u8; 16] = rand::random();
        Self::with_boundary(writer, &hex::encode(random))
    }

    pub fn with_boundary(writer: W, boundary: &str) -> Self {
        Self {
            writer,
            boundary: boundary.to_string(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// The `Content-Type` value describing the body being written.
    pub fn content_type(&self) -> String {
        format!("{MULTIPART_FORM_DATA}; boundary={}", self.boundary)
    }

    fn begin_part(&mut self, path: &str, content_type: &str, abspath: Option<&str>) -> io::Result<()> {
        if let Some(abspath) = abspath.filter(|v| v.contains(['\r', '\n'])) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("line break in {ABSPATH} header value {abspath:?}"),
            ));
        }

        write!(self.writer, "--{}\r\n", self.boundary)?;
        write!(
            self.writer,
            "{CONTENT_DISPOSITION}: form-data; name=\"file\"; filename=\"{}\"\r\n",
            query_escape(path)
        )?;
        write!(self.writer, "{CONTENT_TYPE}: {content_type}\r\n")?;
        if let Some(abspath) = abspath {
            write!(self.writer, "{ABSPATH}: {abspath}\r\n")?;
        }
        self.writer.write_all(b"\r\n")
    }

    fn end_part(&mut self) -> io::Result<()> {
        self.writer.write_all(b"\r\n")
    }

    /// Writes a directory marker.  Its entries must be added right after it.
    pub fn add_directory(&mut self, path: &str) -> io::Result<()> {
        self.begin_part(path, APPLICATION_DIRECTORY, None)?;
        self.end_part()
    }

    /// Writes a regular file, streaming its contents.  Returns the number of bytes copied.
    pub fn add_file(&mut self, path: &str, contents: impl Read) -> io::Result<u64> {
        self.add_file_part(path, None, contents)
    }

    /// Like [`Self::add_file()`], also sending an `abspath` hint.
    pub fn add_file_with_abspath(
        &mut self,
        path: &str,
        abspath: &str,
        contents: impl Read,
    ) -> io::Result<u64> {
        self.add_file_part(path, Some(abspath), contents)
    }

    fn add_file_part(
        &mut self,
        path: &str,
        abspath: Option<&str>,
        mut contents: impl Read,
    ) -> io::Result<u64> {
        self.begin_part(path, APPLICATION_OCTET_STREAM, abspath)?;
        let copied = io::copy(&mut contents, &mut self.writer)?;
        self.end_part()?;
        Ok(copied)
    }

    pub fn add_symlink(&mut self, path: &str, target: impl AsRef<OsStr>) -> io::Result<()> {
        self.begin_part(path, APPLICATION_SYMLINK, None)?;
        self.writer.write_all(target.as_ref().as_bytes())?;
        self.end_part()
    }

    /// Writes the closing delimiter and returns the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        write!(self.writer, "--{}--\r\n", self.boundary)?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Re-encodes a decoded directory, draining it.  Entry paths are prefixed with `prefix`.
pub fn write_directory<W: Write>(
    writer: &mut MultipartWriter<W>,
    prefix: &str,
    dir: &mut MultipartDirectory,
) -> Result<()> {
    let mut entries = dir.entries();
    while let Some((name, node)) = entries.next_entry()? {
        let path = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };

        match node {
            Node::File(mut file) => {
                let abspath = file.abspath().map(str::to_string);
                match abspath {
                    Some(abspath) => writer.add_file_with_abspath(&path, &abspath, &mut file)?,
                    None => writer.add_file(&path, &mut file)?,
                };
            }
            Node::Symlink(link) => writer.add_symlink(&path, link.target())?,
            Node::Directory(mut subdir) => {
                writer.add_directory(&path)?;
                write_directory(writer, &path, &mut subdir)?;
            }
        }
    }
    Ok(())
}
