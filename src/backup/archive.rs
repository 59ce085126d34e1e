// backupcenter/src/backup/archive.rs
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tar::Builder;
use walkdir::WalkDir;

use crate::errors::{AppError, Result};

/// Creates a gzipped tar archive of a file store.
///
/// Paths inside the archive are relative to `source_dir`. A missing or empty
/// store still yields a valid zero-entry archive, so callers can rely on an
/// artifact existing whenever file trees were requested. Symlinks are not
/// followed and not archived; a store is expected to hold regular files, and
/// each skipped link is logged.
pub fn archive_file_tree(source_dir: &Path, archive_dest_path: &Path) -> Result<PathBuf> {
    if let Some(parent) = archive_dest_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let archive_file = File::create(archive_dest_path)?;
    let enc = GzEncoder::new(archive_file, Compression::default());
    let mut tar_builder = Builder::new(enc);

    if source_dir.is_dir() {
        for entry in WalkDir::new(source_dir) {
            let entry = entry.map_err(|e| {
                AppError::Io(e.into_io_error().unwrap_or_else(|| {
                    io::Error::other(format!("failed to walk {}", source_dir.display()))
                }))
            })?;
            if entry.path_is_symlink() {
                tracing::warn!(path = %entry.path().display(), "skipping symlink in file store");
                continue;
            }
            let path = entry.path();
            let name = path.strip_prefix(source_dir).map_err(|_| {
                AppError::Validation(format!(
                    "walked entry {} escaped {}",
                    path.display(),
                    source_dir.display()
                ))
            })?;
            if name.as_os_str().is_empty() {
                continue;
            }
            if path.is_dir() {
                tar_builder.append_dir(name, path)?;
            } else if path.is_file() {
                tar_builder.append_path_with_name(path, name)?;
            }
        }
    }

    let encoder = tar_builder.into_inner()?;
    encoder.finish()?;
    Ok(archive_dest_path.to_path_buf())
}

/// Extracts a gzipped tar archive into a destination directory.
pub fn extract_tar_gz(archive_path: &Path, extract_to_dir: &Path) -> Result<PathBuf> {
    if !archive_path.is_file() {
        return Err(AppError::Validation(format!(
            "archive for extraction is not a file: {}",
            archive_path.display()
        )));
    }
    std::fs::create_dir_all(extract_to_dir)?;

    let archive_file = File::open(archive_path)?;
    let gz_decoder = flate2::read::GzDecoder::new(archive_file);
    let mut archive = tar::Archive::new(gz_decoder);
    archive.unpack(extract_to_dir)?;
    Ok(extract_to_dir.to_path_buf())
}

/// Gzips a single file, removing the plain original.
pub fn gzip_file(source: &Path, dest: &Path) -> Result<PathBuf> {
    let mut input = File::open(source)?;
    let output = File::create(dest)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    std::fs::remove_file(source)?;
    Ok(dest.to_path_buf())
}

/// Gunzips a file to `dest`, leaving the source in place.
pub fn gunzip_file(source: &Path, dest: &Path) -> Result<PathBuf> {
    let input = File::open(source)?;
    let mut decoder = flate2::read::GzDecoder::new(input);
    let mut output = File::create(dest)?;
    io::copy(&mut decoder, &mut output)?;
    Ok(dest.to_path_buf())
}

/// Packages already-produced artifacts into one downloadable container.
/// Entries are stored flat under their file names, mirroring how operators
/// expect to unpack a bundle.
pub fn bundle_artifacts(artifact_paths: &[&Path], bundle_dest_path: &Path) -> Result<PathBuf> {
    let bundle_file = File::create(bundle_dest_path)?;
    let enc = GzEncoder::new(bundle_file, Compression::default());
    let mut tar_builder = Builder::new(enc);

    for path in artifact_paths {
        if !path.is_file() {
            continue;
        }
        let name = path.file_name().ok_or_else(|| {
            AppError::Validation(format!("artifact has no file name: {}", path.display()))
        })?;
        tar_builder.append_path_with_name(path, name)?;
    }

    let encoder = tar_builder.into_inner()?;
    encoder.finish()?;
    Ok(bundle_dest_path.to_path_buf())
}
