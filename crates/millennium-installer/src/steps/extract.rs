//! Unpacking a verified archive over the install root.

use std::fs;
use std::path::Path;

use crate::error::{InstallError, Result};
use crate::extract::{ExtractReport, extract};
use crate::scheduler::TaskContext;

/// Extracts `archive` into `install_dir` and deletes the archive afterwards.
///
/// Entries that fail are logged and skipped; with `strict` any skipped
/// entry fails the step instead.
pub fn extract_archive(
    ctx: &TaskContext,
    archive: &Path,
    install_dir: &Path,
    strict: bool,
) -> Result<ExtractReport> {
    ctx.progress().reset();
    ctx.detail().reset();

    let report = extract(archive, install_dir, ctx.progress(), ctx.detail())?;
    if !report.is_complete() {
        tracing::warn!(
            "{} entries of {} were not extracted",
            report.failed.len(),
            archive.display()
        );
    }

    if strict && !report.is_complete() {
        return Err(InstallError::ArchiveExtraction(format!(
            "{} of {} entries could not be extracted",
            report.failed.len(),
            report.entries
        )));
    }

    if let Err(e) = fs::remove_file(archive) {
        tracing::debug!("Could not remove {}: {}", archive.display(), e);
    }
    Ok(report)
}
