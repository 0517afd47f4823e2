//! The nodes a decoded multipart tree is made of.

use std::{
    ffi::OsStr,
    io::{self, Read},
    os::unix::ffi::OsStrExt,
};

use crate::{
    directory::MultipartDirectory,
    error::{Error, Result},
    part::Part,
};

/// A node in a decoded tree: a streamed file, a symlink, or a directory whose entries are still
/// to be read from the stream.
#[derive(Debug)]
pub enum Node {
    File(File),
    Symlink(Symlink),
    Directory(MultipartDirectory),
}

/// The variant of a [`Node`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Symlink,
    Directory,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::File(_) => NodeKind::File,
            Node::Symlink(_) => NodeKind::Symlink,
            Node::Directory(_) => NodeKind::Directory,
        }
    }

    /// The size of the node in bytes.
    ///
    /// Only symlinks know their size up front.  Files and directories are streamed, so asking
    /// them fails with [`Error::NotSupported`].
    pub fn size(&self) -> Result<u64> {
        match self {
            Node::Symlink(link) => Ok(link.target.len() as u64),
            Node::File(_) | Node::Directory(_) => Err(Error::NotSupported),
        }
    }

    /// Releases the part backing this node.
    pub fn close(self) -> Result<()> {
        match self {
            Node::File(file) => file.close(),
            Node::Symlink(_) => Ok(()),
            Node::Directory(dir) => dir.close(),
        }
    }
}

/// A regular file whose contents are read straight from its part.
#[derive(Debug)]
pub struct File {
    part: Part,
}

impl File {
    pub(crate) fn new(part: Part) -> Self {
        Self { part }
    }

    /// The `abspath` hint sent along with the part, if any.  It is not interpreted.
    pub fn abspath(&self) -> Option<&str> {
        self.part.abspath()
    }

    /// Skips the unread rest of the file.
    pub fn close(self) -> Result<()> {
        Ok(self.part.close()?)
    }
}

impl Read for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.part.read(buf)
    }
}

/// A symbolic link.  The target was read from the part when the node was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symlink {
    target: Box<OsStr>,
}

impl Symlink {
    pub fn new(target: impl AsRef<OsStr>) -> Self {
        Self {
            target: Box::from(target.as_ref()),
        }
    }

    pub(crate) fn from_bytes(target: &[u8]) -> Self {
        Self::new(OsStr::from_bytes(target))
    }

    pub fn target(&self) -> &OsStr {
        &self.target
    }
}
