//! Directories backed by a multipart stream and the iterator over their entries.
//!
//! All directories of one decoded tree share a single [`Lookahead`] over the part stream.
//! Entries come out in stream order, and a nested directory has to be read to its end before its
//! parent is advanced again.  If the caller moves on early, the parts that belong to the
//! abandoned subtree are skipped (or rejected, see [`OrphanPolicy`]) until a part shows up that
//! belongs to the directory being read.

use std::{cell::RefCell, fmt, io::Read, rc::Rc};

use log::{debug, trace};

use crate::{
    classify::{classify, Classified},
    error::{Error, Result},
    lookahead::Lookahead,
    mediatype,
    multipart::MultipartReader,
    node::Node,
    part::{Part, PartSource},
};

/// What to do with parts belonging to a subdirectory that the caller did not drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrphanPolicy {
    /// Skip them silently until the directory being read is reached again.
    #[default]
    Discard,
    /// Stop with [`Error::UndrainedChild`].
    Reject,
}

/// Settings shared by every directory of a decoded tree.
#[derive(Debug, Clone, Default)]
pub struct DecoderOptions {
    pub orphans: OrphanPolicy,
}

/// State shared by the whole tree: the part stream and the options.
pub(crate) struct Traversal {
    parts: RefCell<Lookahead>,
    options: DecoderOptions,
}

impl Traversal {
    pub(crate) fn new(parts: Lookahead, options: DecoderOptions) -> Self {
        Self {
            parts: RefCell::new(parts),
            options,
        }
    }
}

/// A directory in a decoded multipart tree.
pub struct MultipartDirectory {
    /// The part that introduced this directory, `None` for the root.
    part: Option<Part>,
    path: String,
    media_type: String,
    traversal: Rc<Traversal>,
    entries_taken: bool,
}

impl fmt::Debug for MultipartDirectory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MultipartDirectory")
            .field("path", &self.path)
            .field("media_type", &self.media_type)
            .field("root", &self.part.is_none())
            .finish_non_exhaustive()
    }
}

impl MultipartDirectory {
    /// Creates the root directory of a tree from a part source and the media type of the whole
    /// body.
    ///
    /// The media type must be a directory type (`multipart/form-data` or
    /// `application/x-directory`), otherwise this fails with [`Error::NotADirectory`].
    pub fn new(source: impl PartSource + 'static, media_type: &str) -> Result<Self> {
        Self::with_options(source, media_type, DecoderOptions::default())
    }

    /// Like [`Self::new()`] with explicit decoder options.
    pub fn with_options(
        source: impl PartSource + 'static,
        media_type: &str,
        options: DecoderOptions,
    ) -> Result<Self> {
        let media_type = mediatype::parse(media_type)?;
        if !media_type.is_directory() {
            return Err(Error::NotADirectory(media_type.essence().to_string()));
        }

        let traversal = Traversal::new(Lookahead::new(source), options);

        Ok(Self {
            part: None,
            path: String::new(),
            media_type: media_type.essence().to_string(),
            traversal: Rc::new(traversal),
            entries_taken: false,
        })
    }

    /// Creates the root directory from a raw multipart body and its `Content-Type` value, which
    /// must carry a `boundary` parameter.
    pub fn from_reader(
        reader: impl Read + 'static,
        content_type: &str,
        options: DecoderOptions,
    ) -> Result<Self> {
        let source = MultipartReader::from_content_type(reader, content_type)?;
        Self::with_options(source, content_type, options)
    }

    pub(crate) fn nested(
        part: Part,
        path: String,
        media_type: String,
        traversal: &Rc<Traversal>,
    ) -> Self {
        Self {
            part: Some(part),
            path,
            media_type,
            traversal: Rc::clone(traversal),
            entries_taken: false,
        }
    }

    /// The full path of this directory inside the tree.  The root has the empty path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The media type that introduced this directory.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn is_root(&self) -> bool {
        self.part.is_none()
    }

    /// Returns the iterator over this directory's entries.
    ///
    /// The entries can only be read once.  Later calls return an iterator that is already
    /// exhausted.
    pub fn entries(&mut self) -> Entries {
        let state = if self.entries_taken {
            State::Exhausted
        } else {
            State::Active
        };
        self.entries_taken = true;

        Entries {
            path: self.path.clone(),
            traversal: Rc::clone(&self.traversal),
            state,
            current: None,
        }
    }

    /// Releases the part that introduced this directory.  Does nothing for the root.
    pub fn close(self) -> Result<()> {
        match self.part {
            Some(part) => Ok(part.close()?),
            None => Ok(()),
        }
    }
}

enum State {
    Active,
    Exhausted,
    Errored(Error),
}

struct Current {
    name: String,
    node: Option<Node>,
}

/// Iterator over the entries of a [`MultipartDirectory`].
///
/// Entries can be consumed in two ways: with [`Self::next_entry()`] (or the [`Iterator`]
/// implementation), or cursor style with [`Self::advance()`], [`Self::name()`],
/// [`Self::take_node()`] and [`Self::err()`].
pub struct Entries {
    path: String,
    traversal: Rc<Traversal>,
    state: State,
    current: Option<Current>,
}

impl fmt::Debug for Entries {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = match &self.state {
            State::Active => "active",
            State::Exhausted => "exhausted",
            State::Errored(_) => "errored",
        };
        f.debug_struct("Entries")
            .field("path", &self.path)
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

impl Entries {
    /// The path of the directory being iterated.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Pulls parts until one is an entry of this directory or the directory ends.
    fn step(&mut self) -> Result<Option<(String, Node)>> {
        loop {
            let part = self.traversal.parts.borrow_mut().pull()?;
            let Some(part) = part else {
                trace!("end of stream while reading {:?}", self.path);
                return Ok(None);
            };

            match classify(&self.path, part, &self.traversal)? {
                Classified::Entry(name, node) => return Ok(Some((name, node))),
                Classified::InChildTree(name, part) => match self.traversal.options.orphans {
                    OrphanPolicy::Discard => {
                        debug!("discarding {name:?}: inside undrained child of {:?}", self.path);
                        drop(part);
                    }
                    OrphanPolicy::Reject => return Err(Error::UndrainedChild(name)),
                },
                Classified::OutsideParent(name, part) => {
                    debug!("{name:?} is outside {:?}, putting it back", self.path);
                    self.traversal.parts.borrow_mut().push_back(part)?;
                    return Ok(None);
                }
            }
        }
    }

    /// Returns the next entry, or `None` when the directory has no more entries.
    ///
    /// Once this returned `None` or an error, every later call returns the same thing again.
    pub fn next_entry(&mut self) -> Result<Option<(String, Node)>> {
        self.current = None;

        match &self.state {
            State::Active => {}
            State::Exhausted => return Ok(None),
            State::Errored(err) => return Err(err.clone()),
        }

        match self.step() {
            Ok(Some(entry)) => Ok(Some(entry)),
            Ok(None) => {
                debug!("finished reading {:?}", self.path);
                self.state = State::Exhausted;
                Ok(None)
            }
            Err(err) => {
                debug!("reading {:?} failed: {err}", self.path);
                self.state = State::Errored(err.clone());
                Err(err)
            }
        }
    }

    /// Moves to the next entry.  Returns false when there are no more entries or an error
    /// occurred; check [`Self::err()`] to tell the two apart.
    pub fn advance(&mut self) -> bool {
        match self.next_entry() {
            Ok(Some((name, node))) => {
                self.current = Some(Current {
                    name,
                    node: Some(node),
                });
                true
            }
            Ok(None) | Err(_) => false,
        }
    }

    /// The name of the current entry.  Fails with [`Error::NoCurrentEntry`] unless the last
    /// [`Self::advance()`] succeeded.
    pub fn name(&self) -> Result<&str> {
        self.current
            .as_ref()
            .map(|current| current.name.as_str())
            .ok_or(Error::NoCurrentEntry)
    }

    /// Takes the node of the current entry.  The node can be taken only once.
    pub fn take_node(&mut self) -> Result<Node> {
        self.current
            .as_mut()
            .and_then(|current| current.node.take())
            .ok_or(Error::NoCurrentEntry)
    }

    /// The error that stopped the iteration, if any.
    pub fn err(&self) -> Option<&Error> {
        match &self.state {
            State::Errored(err) => Some(err),
            State::Active | State::Exhausted => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, State::Exhausted)
    }
}

impl Iterator for Entries {
    type Item = Result<(String, Node)>;

    /// Yields the stored error once and then ends.
    fn next(&mut self) -> Option<Self::Item> {
        if let State::Errored(_) = self.state {
            return None;
        }
        self.next_entry().transpose()
    }
}
