//! Reading source images from disk.

use std::path::{Path, PathBuf};

use kenburns_core::job::SourceFile;

/// Read every path into a [`SourceFile`], sniffing its content type.
///
/// Unreadable paths are logged and skipped; non-images are kept so the
/// queue can count them as rejected.
pub async fn load_sources(paths: &[PathBuf]) -> Vec<SourceFile> {
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        match tokio::fs::read(path).await {
            Ok(data) => sources.push(SourceFile::sniff(display_name(path), data)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read file, skipping");
            }
        }
    }
    sources
}

/// File name component, or the whole path when there is none.
fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
