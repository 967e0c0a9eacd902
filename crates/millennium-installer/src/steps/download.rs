//! Downloading an asset to a local file.

use std::path::Path;

use crate::error::Result;
use crate::github::types::Asset;
use crate::http::HttpClient;
use crate::scheduler::TaskContext;

/// Streams `asset` to `dest`, reporting the byte ratio as step progress.
pub fn download_asset(
    ctx: &TaskContext,
    http: &dyn HttpClient,
    asset: &Asset,
    dest: &Path,
) -> Result<()> {
    tracing::info!(
        "Downloading {} ({} bytes) to {}",
        asset.name,
        asset.size,
        dest.display()
    );
    ctx.progress().reset();
    ctx.detail().reset();

    let progress = ctx.progress();
    http.download_file(
        &asset.browser_download_url,
        dest,
        asset.size,
        &mut |downloaded, total| {
            if total > 0 {
                progress.set_ratio(downloaded, total);
            }
        },
        true,
    )?;

    progress.complete();
    Ok(())
}
