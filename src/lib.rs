//! Decoding streamed multipart bodies into file trees.
//!
//! A multipart body in this layout is a flat sequence of parts, each naming its full path in the
//! `filename` parameter of its `Content-Disposition`.  Directory parts carry a directory media
//! type and come right before their contents.  [`MultipartDirectory`] turns such a stream back
//! into a tree in a single forward pass, holding at most one part back.
//!
//! ```
//! use std::io::Read;
//!
//! use multipartfs::{DecoderOptions, MultipartDirectory, MultipartWriter, Node};
//!
//! let mut writer = MultipartWriter::new(vec![]);
//! writer.add_directory("docs")?;
//! writer.add_file("docs/readme.txt", b"hello" as &[u8])?;
//! let content_type = writer.content_type();
//! let body = writer.finish()?;
//!
//! let mut root =
//!     MultipartDirectory::from_reader(std::io::Cursor::new(body), &content_type, DecoderOptions::default())?;
//! let mut entries = root.entries();
//! while let Some((_, node)) = entries.next_entry()? {
//!     if let Node::Directory(mut docs) = node {
//!         let (name, node) = docs.entries().next_entry()?.expect("one file");
//!         assert_eq!(name, "readme.txt");
//!         let Node::File(mut file) = node else { panic!() };
//!         let mut contents = String::new();
//!         file.read_to_string(&mut contents)?;
//!         assert_eq!(contents, "hello");
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod classify;
pub mod directory;
pub mod error;
pub mod fs;
pub mod lookahead;
pub mod mediatype;
pub mod multipart;
pub mod node;
pub mod part;
pub mod util;
pub mod writer;

#[cfg(any(test, feature = "test"))]
pub mod test;

pub use directory::{DecoderOptions, Entries, MultipartDirectory, OrphanPolicy};
pub use error::{Error, Result};
pub use multipart::MultipartReader;
pub use node::{File, Node, NodeKind, Symlink};
pub use part::{Headers, Part, PartSource};
pub use writer::MultipartWriter;
