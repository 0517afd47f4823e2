//! Moving multipart trees to and from the local filesystem.

use std::{
    ffi::{OsStr, OsString},
    fs::File,
    io::{self, Write},
    os::unix::ffi::OsStrExt,
    path::Path,
};

use anyhow::{ensure, Context, Result};
use log::{trace, warn};
use rustix::{
    fd::OwnedFd,
    fs::{
        mkdirat, openat, readlinkat, statat, symlinkat, AtFlags, Dir, FileType, Mode, OFlags, CWD,
    },
    io::Errno,
};

use crate::{
    directory::MultipartDirectory,
    node::{File as FileNode, Node},
    writer::MultipartWriter,
};

/// Entry names have to be usable as a single path component.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

fn write_file(dirfd: &OwnedFd, name: &str, file: &mut FileNode) -> Result<()> {
    let fd = openat(
        dirfd,
        name,
        OFlags::CREATE | OFlags::TRUNC | OFlags::WRONLY | OFlags::NOFOLLOW | OFlags::CLOEXEC,
        Mode::from_raw_mode(0o644),
    )?;
    let mut output = File::from(fd);
    io::copy(file, &mut output)?;
    output.flush()?;
    Ok(())
}

fn write_directory(dir: &mut MultipartDirectory, dirfd: &OwnedFd, name: &str) -> Result<()> {
    match mkdirat(dirfd, name, Mode::from_raw_mode(0o755)) {
        Ok(()) | Err(Errno::EXIST) => {}
        Err(e) => Err(e)?,
    }

    let fd = openat(
        dirfd,
        name,
        OFlags::PATH | OFlags::DIRECTORY | OFlags::NOFOLLOW | OFlags::CLOEXEC,
        Mode::empty(),
    )?;
    write_directory_contents(dir, &fd)
}

fn write_directory_contents(dir: &mut MultipartDirectory, fd: &OwnedFd) -> Result<()> {
    let mut entries = dir.entries();

    while let Some((name, node)) = entries.next_entry()? {
        ensure!(
            is_valid_name(&name),
            "Refusing to write entry {name:?} in {:?}",
            entries.path()
        );
        trace!("writing {name:?} in {:?}", entries.path());

        match node {
            Node::Directory(mut subdir) => write_directory(&mut subdir, fd, &name),
            Node::File(mut file) => write_file(fd, &name, &mut file),
            Node::Symlink(link) => Ok(symlinkat(link.target(), fd, name.as_str())?),
        }
        .with_context(|| format!("Writing {name:?} in {:?}", entries.path()))?;
    }

    Ok(())
}

/// Drains a decoded tree into `output_dir`, which must exist.  Existing directories are reused.
pub fn write_to_path(dir: &mut MultipartDirectory, output_dir: &Path) -> Result<()> {
    let fd = openat(
        CWD,
        output_dir,
        OFlags::PATH | OFlags::DIRECTORY | OFlags::CLOEXEC,
        Mode::empty(),
    )
    .with_context(|| format!("Opening output directory {output_dir:?}"))?;
    write_directory_contents(dir, &fd)
}

fn file_type(dirfd: &OwnedFd, name: &OsStr, ifmt: FileType) -> Result<FileType> {
    if ifmt != FileType::Unknown {
        return Ok(ifmt);
    }
    let buf = statat(dirfd, name, AtFlags::SYMLINK_NOFOLLOW)?;
    Ok(FileType::from_raw_mode(buf.st_mode))
}

fn pack_directory<W: Write>(
    dirfd: &OwnedFd,
    prefix: &str,
    writer: &mut MultipartWriter<W>,
) -> Result<()> {
    let mut names: Vec<(OsString, FileType)> = vec![];
    for item in Dir::read_from(dirfd)? {
        let entry = item?;
        let name = OsStr::from_bytes(entry.file_name().to_bytes());
        if name == "." || name == ".." {
            continue;
        }
        names.push((name.to_os_string(), entry.file_type()));
    }
    names.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, ifmt) in names {
        let utf8 = name
            .to_str()
            .with_context(|| format!("Filename {name:?} is not UTF-8"))?;
        let path = if prefix.is_empty() {
            utf8.to_string()
        } else {
            format!("{prefix}/{utf8}")
        };

        match file_type(dirfd, &name, ifmt)? {
            FileType::Directory => {
                writer.add_directory(&path)?;
                let fd = openat(
                    dirfd,
                    name.as_os_str(),
                    OFlags::RDONLY | OFlags::DIRECTORY | OFlags::NOFOLLOW | OFlags::CLOEXEC,
                    Mode::empty(),
                )?;
                pack_directory(&fd, &path, writer)?;
            }
            FileType::RegularFile => {
                let fd = openat(
                    dirfd,
                    name.as_os_str(),
                    OFlags::RDONLY | OFlags::NOFOLLOW | OFlags::CLOEXEC,
                    Mode::empty(),
                )?;
                writer.add_file(&path, File::from(fd))?;
            }
            FileType::Symlink => {
                let target = readlinkat(dirfd, name.as_os_str(), [])?;
                writer.add_symlink(&path, OsStr::from_bytes(target.as_bytes()))?;
            }
            other => warn!("Skipping {path:?}: {other:?} can't be sent as a part"),
        }
    }

    Ok(())
}

/// Encodes the directory at `path` with `writer`, in the order the decoder expects: sorted by
/// name, each directory followed directly by its contents.
///
/// Only directories, regular files and symlinks are sent.  Other file types are skipped.
pub fn pack_path<W: Write>(path: &Path, writer: &mut MultipartWriter<W>) -> Result<()> {
    let fd = openat(
        CWD,
        path,
        OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC,
        Mode::empty(),
    )
    .with_context(|| format!("Opening {path:?}"))?;
    pack_directory(&fd, "", writer)
}
