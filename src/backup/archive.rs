//! Zip packing and unpacking.
//!
//! Both directions are blocking; async callers wrap them in
//! `tokio::task::spawn_blocking`.

use crate::error::Result;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// What part of an instance directory goes into an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveScope {
    /// The whole directory tree.
    Full,
    /// Only these entries, relative to the source directory. Entries that do
    /// not exist are skipped.
    Only(Vec<PathBuf>),
}

/// Packs `source` into a new zip at `dest`, returning the number of files
/// written.
pub fn create_archive(source: &Path, dest: &Path, scope: &ArchiveScope) -> Result<usize> {
    let file = File::create(dest)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let roots = match scope {
        ArchiveScope::Full => vec![PathBuf::new()],
        ArchiveScope::Only(entries) => entries.clone(),
    };

    let mut written = 0;
    for relative in roots {
        let path = source.join(&relative);
        if !path.exists() {
            continue;
        }
        written += add_path(&mut zip, source, &path, options)?;
    }

    zip.finish()?;
    Ok(written)
}

fn add_path<W: io::Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    base: &Path,
    path: &Path,
    options: SimpleFileOptions,
) -> Result<usize> {
    let name = entry_name(base, path);

    if path.is_dir() {
        if !name.is_empty() {
            zip.add_directory(format!("{}/", name), options)?;
        }
        let mut children: Vec<PathBuf> = std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<_>>()?;
        children.sort();

        let mut written = 0;
        for child in children {
            written += add_path(zip, base, &child, options)?;
        }
        return Ok(written);
    }

    zip.start_file(name, options)?;
    let mut file = File::open(path)?;
    io::copy(&mut file, zip)?;
    Ok(1)
}

/// Archive entry name: the path relative to `base` with `/` separators.
fn entry_name(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Unpacks `archive` into `dest`, creating it when needed.
///
/// Entries escaping `dest` are rejected by the zip reader; unix permission bits
/// recorded in the archive are restored.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    zip.extract(dest)?;
    Ok(())
}
