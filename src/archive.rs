//! Per-page archiving: compress a completed workspace into a zip and
//! remove the workspace. Blocking; callers run it under `spawn_blocking`.
use anyhow::{anyhow, Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::ZipWriter;

/// Suffix pairing an archive with its `{timestamp}` workspace and log.
pub const ARCHIVE_SUFFIX: &str = "_photo.zip";

/// Compress every regular file directly under `workspace` into
/// `{workspace}_photo.zip`, then delete the workspace directory.
///
/// Only called after the download pool reports success. On error the
/// workspace is left on disk for inspection and the caller halts the run:
/// the page must complete before any further cursor advancement is safe.
pub fn archive_workspace(workspace: &Path) -> Result<PathBuf> {
    let dir_name = workspace
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("workspace has no directory name: {}", workspace.display()))?;
    let archive_path = workspace.with_file_name(format!("{}{}", dir_name, ARCHIVE_SUFFIX));

    let mut entries: Vec<PathBuf> = fs::read_dir(workspace)
        .with_context(|| format!("failed to read workspace {}", workspace.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    entries.sort();

    let file = File::create(&archive_path)
        .with_context(|| format!("failed to create archive {}", archive_path.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default();

    for path in &entries {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("unrepresentable filename in workspace: {}", path.display()))?;
        writer
            .start_file(name, options)
            .with_context(|| format!("failed to add {} to archive", name))?;
        let mut src = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        io::copy(&mut src, &mut writer)
            .with_context(|| format!("failed to compress {}", path.display()))?;
    }
    writer.finish().context("failed to finish archive")?;

    fs::remove_dir_all(workspace).with_context(|| {
        format!(
            "archive written but workspace removal failed: {}",
            workspace.display()
        )
    })?;

    Ok(archive_path)
}
