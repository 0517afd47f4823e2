//! Test utilities for multipartfs.
//!
//! This module provides an in-memory [`PartSource`] and builders for the kinds of parts a
//! multipart directory body is made of.

use std::{
    collections::VecDeque,
    io::{self, Cursor, Read},
};

use crate::{
    mediatype::{APPLICATION_DIRECTORY, APPLICATION_OCTET_STREAM, APPLICATION_SYMLINK},
    part::{Headers, Part, PartSource, ABSPATH, CONTENT_DISPOSITION, CONTENT_TYPE},
    util::query_escape,
};

/// A part source that hands out a fixed list of parts.
#[derive(Debug, Default)]
pub struct VecSource {
    parts: VecDeque<Part>,
}

impl VecSource {
    pub fn new(parts: impl IntoIterator<Item = Part>) -> Self {
        Self {
            parts: parts.into_iter().collect(),
        }
    }
}

impl PartSource for VecSource {
    fn next_part(&mut self) -> io::Result<Option<Part>> {
        Ok(self.parts.pop_front())
    }
}

/// A reader that fails every read.
#[derive(Debug)]
pub struct BrokenReader;

impl Read for BrokenReader {
    fn read(&mut self, _buffer: &mut [u8]) -> io::Result<usize> {
        Err(io::ErrorKind::ConnectionReset.into())
    }
}

fn headers(filename: &str, content_type: Option<&str>) -> Headers {
    let mut headers = Headers::new();
    headers.append(
        CONTENT_DISPOSITION,
        format!(
            "form-data; name=\"file\"; filename=\"{}\"",
            query_escape(filename)
        ),
    );
    if let Some(content_type) = content_type {
        headers.append(CONTENT_TYPE, content_type);
    }
    headers
}

/// A part named `filename` with an arbitrary (or missing) content type.
pub fn part(filename: &str, content_type: Option<&str>, body: impl Into<Vec<u8>>) -> Part {
    Part::new(headers(filename, content_type), Cursor::new(body.into()))
}

/// A part whose body fails to read.
pub fn broken_part(filename: &str, content_type: Option<&str>) -> Part {
    Part::new(headers(filename, content_type), BrokenReader)
}

pub fn file_part(filename: &str, body: &str) -> Part {
    part(filename, Some(APPLICATION_OCTET_STREAM), body)
}

pub fn file_part_with_abspath(filename: &str, abspath: &str, body: &str) -> Part {
    let mut headers = headers(filename, Some(APPLICATION_OCTET_STREAM));
    headers.append(ABSPATH, abspath);
    Part::new(headers, Cursor::new(body.as_bytes().to_vec()))
}

pub fn dir_part(filename: &str) -> Part {
    part(filename, Some(APPLICATION_DIRECTORY), "")
}

pub fn symlink_part(filename: &str, target: &str) -> Part {
    part(filename, Some(APPLICATION_SYMLINK), target)
}
