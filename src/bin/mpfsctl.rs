use std::{
    fs::File,
    io::{self, BufRead, BufReader, Cursor, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::debug;
use sha2::{Digest, Sha256};

use multipartfs::{
    fs::{pack_path, write_to_path},
    mediatype::MULTIPART_FORM_DATA,
    DecoderOptions, MultipartDirectory, MultipartWriter, Node, OrphanPolicy,
};

/// mpfsctl
#[derive(Debug, Parser)]
#[clap(name = "mpfsctl", version)]
pub struct App {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Lists the tree contained in a multipart body
    Ls {
        /// the Content-Type of the body, including its boundary
        #[clap(long)]
        content_type: Option<String>,
        /// print the sha256 digest of every file
        #[clap(long)]
        digest: bool,
        /// the body to read, stdin if omitted
        file: Option<PathBuf>,
    },
    /// Writes the tree contained in a multipart body to a directory
    Extract {
        /// the Content-Type of the body, including its boundary
        #[clap(long)]
        content_type: Option<String>,
        /// fail if the parts of a subdirectory are not contiguous
        #[clap(long)]
        strict: bool,
        /// the directory to extract into, which must exist
        dest: PathBuf,
        /// the body to read, stdin if omitted
        file: Option<PathBuf>,
    },
    /// Encodes a directory as a multipart body on stdout
    Pack { path: PathBuf },
}

/// Reads up to the first non-empty line, which has to be a `--BOUNDARY` delimiter.  Returns the
/// boundary and everything consumed so far, to be read again.
fn sniff_boundary(reader: &mut impl BufRead) -> Result<(String, Vec<u8>)> {
    let mut consumed = vec![];
    loop {
        let start = consumed.len();
        if reader.read_until(b'\n', &mut consumed)? == 0 {
            bail!("No multipart delimiter found in input");
        }
        let line = std::str::from_utf8(&consumed[start..])
            .context("Multipart delimiter is not UTF-8")?
            .trim();
        if line.is_empty() {
            continue;
        }
        let Some(boundary) = line.strip_prefix("--") else {
            bail!("Expected a multipart delimiter, found {line:?}");
        };
        if boundary.is_empty() {
            bail!("Empty multipart boundary");
        }
        let boundary = boundary.to_string();
        return Ok((boundary, consumed));
    }
}

fn open_input(file: Option<&Path>) -> Result<Box<dyn Read>> {
    Ok(match file {
        Some(path) => Box::new(File::open(path).with_context(|| format!("Opening {path:?}"))?),
        None => Box::new(io::stdin()),
    })
}

fn open_tree(
    file: Option<&Path>,
    content_type: Option<String>,
    options: DecoderOptions,
) -> Result<MultipartDirectory> {
    let input = open_input(file)?;

    let (content_type, input): (String, Box<dyn Read>) = match content_type {
        Some(content_type) => (content_type, input),
        None => {
            let mut input = BufReader::new(input);
            let (boundary, consumed) = sniff_boundary(&mut input)?;
            debug!("using sniffed boundary {boundary:?}");
            (
                format!("{MULTIPART_FORM_DATA}; boundary=\"{boundary}\""),
                Box::new(Cursor::new(consumed).chain(input)),
            )
        }
    };

    Ok(MultipartDirectory::from_reader(
        input,
        &content_type,
        options,
    )?)
}

fn list(dir: &mut MultipartDirectory, digest: bool, out: &mut impl Write) -> Result<()> {
    let mut entries = dir.entries();
    while let Some((name, node)) = entries.next_entry()? {
        let path = match entries.path() {
            "" => name,
            parent => format!("{parent}/{name}"),
        };

        match node {
            Node::Directory(mut subdir) => {
                writeln!(out, "d {path}")?;
                list(&mut subdir, digest, out)?;
            }
            Node::Symlink(link) => writeln!(out, "l {path} -> {}", link.target().to_string_lossy())?,
            Node::File(mut file) if digest => {
                let mut context = Sha256::new();
                io::copy(&mut file, &mut context)?;
                writeln!(out, "f {path} {}", hex::encode(context.finalize()))?;
            }
            Node::File(_) => writeln!(out, "f {path}")?,
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let args = App::parse();

    match args.cmd {
        Command::Ls {
            content_type,
            digest,
            file,
        } => {
            let mut root = open_tree(file.as_deref(), content_type, DecoderOptions::default())?;
            let mut out = io::stdout().lock();
            list(&mut root, digest, &mut out)?;
            out.flush()?;
        }
        Command::Extract {
            content_type,
            strict,
            dest,
            file,
        } => {
            let options = DecoderOptions {
                orphans: if strict {
                    OrphanPolicy::Reject
                } else {
                    OrphanPolicy::Discard
                },
            };
            let mut root = open_tree(file.as_deref(), content_type, options)?;
            write_to_path(&mut root, &dest)?;
        }
        Command::Pack { path } => {
            let mut writer = MultipartWriter::new(io::stdout().lock());
            pack_path(&path, &mut writer)?;
            eprintln!("{}", writer.content_type());
            writer.finish()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_boundary() -> Result<()> {
        let mut input = Cursor::new(b"\r\n--abc\r\nrest".to_vec());
        let (boundary, consumed) = sniff_boundary(&mut input)?;
        assert_eq!(boundary, "abc");
        assert_eq!(consumed, b"\r\n--abc\r\n");

        assert!(sniff_boundary(&mut Cursor::new(b"preamble\r\n".to_vec())).is_err());
        assert!(sniff_boundary(&mut Cursor::new(b"\n\n".to_vec())).is_err());
        Ok(())
    }

    #[test]
    fn test_list() -> Result<()> {
        let mut writer = MultipartWriter::with_boundary(vec![], "b");
        writer.add_directory("d")?;
        writer.add_file("d/f", b"abc" as &[u8])?;
        writer.add_symlink("l", "d/f")?;
        let body = writer.finish()?;

        let mut root = open_tree_from(body)?;
        let mut out = vec![];
        list(&mut root, true, &mut out)?;
        assert_eq!(
            String::from_utf8(out)?,
            "d d\n\
             f d/f ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad\n\
             l l -> d/f\n"
        );
        Ok(())
    }

    fn open_tree_from(body: Vec<u8>) -> Result<MultipartDirectory> {
        let mut input = BufReader::new(Cursor::new(body));
        let (boundary, consumed) = sniff_boundary(&mut input)?;
        Ok(MultipartDirectory::from_reader(
            Cursor::new(consumed).chain(input),
            &format!("{MULTIPART_FORM_DATA}; boundary={boundary}"),
            DecoderOptions::default(),
        )?)
    }
}
