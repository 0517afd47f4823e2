//! Deciding what a part is relative to the directory being read.

use std::{io::Read, rc::Rc};

use log::trace;

use crate::{
    directory::{MultipartDirectory, Traversal},
    error::Result,
    mediatype::{self, APPLICATION_OCTET_STREAM, APPLICATION_SYMLINK},
    node::{File, Node, Symlink},
    part::Part,
    util::{path_segments, query_unescape, split_path},
};

/// Where a part's parent directory lies relative to the directory being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// The part is an entry of the directory.
    Direct,
    /// The part is somewhere below one of the directory's subdirectories.
    InChildTree,
    /// The part is not below the directory at all.
    OutsideParent,
}

/// The outcome of [`classify()`].  Parts that are not entries of the directory are handed back
/// together with their full name.
pub(crate) enum Classified {
    Entry(String, Node),
    InChildTree(String, Part),
    OutsideParent(String, Part),
}

fn scope(current: &str, parent: &str) -> Scope {
    let current = path_segments(current);
    let parent = path_segments(parent);

    if parent == current {
        Scope::Direct
    } else if parent.starts_with(&current) {
        Scope::InChildTree
    } else {
        Scope::OutsideParent
    }
}

/// The part's filename with URL escaping undone.  Names that fail to unescape are used as is.
pub(crate) fn unescaped_file_name(part: &Part) -> String {
    let raw = part.file_name().unwrap_or_default();
    match query_unescape(&raw) {
        Ok(name) => name,
        Err(err) => {
            trace!("using {raw:?} verbatim: {err}");
            raw
        }
    }
}

/// Turns `part` into an entry of the directory at `current`, or hands it back if it is not one.
///
/// Directory parts become [`MultipartDirectory`] nodes reading from `traversal`.  Fails if the
/// part's content type does not parse or a symlink target can't be read.
pub(crate) fn classify(
    current: &str,
    mut part: Part,
    traversal: &Rc<Traversal>,
) -> Result<Classified> {
    let filename = unescaped_file_name(&part);
    let (parent, base) = split_path(&filename);

    let scope = scope(current, parent);
    trace!("{filename:?} relative to {current:?}: {scope:?}");
    let name = base.to_string();
    match scope {
        Scope::Direct => {}
        Scope::InChildTree => return Ok(Classified::InChildTree(filename, part)),
        Scope::OutsideParent => return Ok(Classified::OutsideParent(filename, part)),
    }

    let content_type = part.content_type().to_string();
    match content_type.as_str() {
        APPLICATION_SYMLINK => {
            let mut target = vec![];
            part.read_to_end(&mut target)?;
            return Ok(Classified::Entry(
                name,
                Node::Symlink(Symlink::from_bytes(&target)),
            ));
        }
        "" | APPLICATION_OCTET_STREAM => {
            return Ok(Classified::Entry(name, Node::File(File::new(part))));
        }
        _ => {}
    }

    let media_type = mediatype::parse(&content_type)?;
    if !media_type.is_directory() {
        return Ok(Classified::Entry(name, Node::File(File::new(part))));
    }

    let essence = media_type.essence().to_string();
    let dir = MultipartDirectory::nested(part, filename, essence, traversal);
    Ok(Classified::Entry(name, Node::Directory(dir)))
}
