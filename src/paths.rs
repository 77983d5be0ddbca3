//! Capability-scoped access to local files named by absolute or relative
//! paths.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};

/// Splits `path` into an opened parent directory and the final component.
fn open_parent(path: &Utf8Path) -> io::Result<(Dir, &str)> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path has no file name: {path}"),
        )
    })?;
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

/// Reads `path` as UTF-8 text.
///
/// # Errors
///
/// Returns the underlying I/O error when the parent directory or file cannot
/// be opened or read.
pub fn read_to_string(path: &Utf8Path) -> io::Result<String> {
    let (dir, file_name) = open_parent(path)?;
    dir.read_to_string(file_name)
}

/// Reads `path` as raw bytes.
///
/// # Errors
///
/// Returns the underlying I/O error when the file cannot be read.
pub fn read_bytes(path: &Utf8Path) -> io::Result<Vec<u8>> {
    let (dir, file_name) = open_parent(path)?;
    dir.read(file_name)
}

/// Returns whether `path` exists; a missing parent counts as absent.
///
/// # Errors
///
/// Returns I/O errors other than `NotFound`.
pub fn exists(path: &Utf8Path) -> io::Result<bool> {
    match open_parent(path) {
        Ok((dir, file_name)) => dir.try_exists(file_name),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Kind of local entry a staging source resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Nothing at that path.
    Missing,
}

/// Classifies `path` without following it further than `metadata` does.
///
/// # Errors
///
/// Returns I/O errors other than `NotFound`.
pub fn entry_kind(path: &Utf8Path) -> io::Result<EntryKind> {
    let (dir, file_name) = match open_parent(path) {
        Ok(pair) => pair,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(EntryKind::Missing),
        Err(err) => return Err(err),
    };
    match dir.metadata(file_name) {
        Ok(meta) if meta.is_dir() => Ok(EntryKind::Directory),
        Ok(_) => Ok(EntryKind::File),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(EntryKind::Missing),
        Err(err) => Err(err),
    }
}

/// Unix permission bits of `path`, masked to `0o7777`.
///
/// # Errors
///
/// Returns the underlying I/O error when metadata cannot be read.
#[cfg(unix)]
pub fn mode(path: &Utf8Path) -> io::Result<u32> {
    use cap_std::fs_utf8::PermissionsExt;

    let (dir, file_name) = open_parent(path)?;
    Ok(dir.metadata(file_name)?.permissions().mode() & 0o7777)
}

/// Unix permission bits of `path`; non-Unix platforms report `0o644`.
///
/// # Errors
///
/// Returns the underlying I/O error when metadata cannot be read.
#[cfg(not(unix))]
pub fn mode(path: &Utf8Path) -> io::Result<u32> {
    let (dir, file_name) = open_parent(path)?;
    dir.metadata(file_name)?;
    Ok(0o644)
}

/// Relative paths of every regular file and directory under `root`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    /// Subdirectories, parents before children.
    pub directories: Vec<Utf8PathBuf>,
    /// Regular files.
    pub files: Vec<Utf8PathBuf>,
}

/// Walks `root` recursively, collecting entries before any transfer starts.
///
/// # Errors
///
/// Returns I/O errors from opening or reading directories.
pub fn walk(root: &Utf8Path) -> io::Result<DirectoryListing> {
    let dir = Dir::open_ambient_dir(root, ambient_authority())?;
    let mut listing = DirectoryListing::default();
    walk_into(&dir, Utf8Path::new(""), &mut listing)?;
    listing.directories.sort();
    listing.files.sort();
    Ok(listing)
}

fn walk_into(dir: &Dir, prefix: &Utf8Path, listing: &mut DirectoryListing) -> io::Result<()> {
    for entry in dir.entries()? {
        let item = entry?;
        let name = item.file_name()?;
        let relative = prefix.join(&name);
        let file_type = item.file_type()?;
        if file_type.is_dir() {
            listing.directories.push(relative.clone());
            let child = item.open_dir()?;
            walk_into(&child, &relative, listing)?;
        } else if file_type.is_file() {
            listing.files.push(relative);
        }
    }
    Ok(())
}
