//! Writes finished clips into the output directory.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use kenburns_client::ConversionApi;
use kenburns_core::job::Job;
use kenburns_core::naming::indexed_filename;
use kenburns_pipeline::{Artifact, CompletionSink, DeliveryError};
use tokio::io::AsyncWriteExt;

/// [`CompletionSink`] that saves every artifact as a file.
///
/// Remote artifacts are downloaded from the Conversion Service first.
/// Existing files are never overwritten: `motion_pan.mp4` becomes
/// `motion_pan_2.mp4`, `motion_pan_3.mp4`, ...
#[derive(Debug, Clone)]
pub struct FileWriterSink {
    api: ConversionApi,
    output_dir: PathBuf,
}

impl FileWriterSink {
    pub fn new(api: ConversionApi, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            api,
            output_dir: output_dir.into(),
        }
    }

    /// Write `bytes` under the first free variant of `filename`.
    pub async fn write_unique(&self, filename: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let mut index = 1u32;
        loop {
            let path = self.output_dir.join(indexed_filename(filename, index));
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            match opened {
                Ok(file) => {
                    finish_or_remove(&path, write_all(file, bytes)).await?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => index += 1,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Await `write` for the freshly created `path`; on failure the file is
/// removed so no truncated clip is left behind.
async fn finish_or_remove<F>(path: &Path, write: F) -> std::io::Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    let result = write.await;
    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial file");
        }
    }
    result
}

async fn write_all(mut file: tokio::fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

impl CompletionSink for FileWriterSink {
    async fn deliver(&self, job: &Job, artifact: Artifact) -> Result<(), DeliveryError> {
        let (filename, bytes) = match artifact {
            Artifact::Inline { filename, bytes } => (filename, bytes),
            Artifact::Remote { handle, filename } => {
                tracing::debug!(job_id = job.id, handle = %handle, "Downloading artifact");
                (filename, self.api.download(&handle).await?)
            }
        };

        let path = self.write_unique(&filename, &bytes).await?;
        tracing::info!(
            job_id = job.id,
            file = %job.source.name,
            path = %path.display(),
            size = bytes.len(),
            "Video saved",
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_write_removes_the_file() {
        let dir = std::env::temp_dir().join(format!("kenburns-partial-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("motion_zoom_in_center.mp4");
        tokio::fs::write(&path, b"half a clip").await.unwrap();

        let result =
            finish_or_remove(&path, async { Err(std::io::Error::other("disk full")) }).await;

        assert_eq!(result.unwrap_err().to_string(), "disk full");
        assert!(!path.exists());
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn successful_write_keeps_the_file() {
        let dir = std::env::temp_dir().join(format!("kenburns-complete-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("motion_pan_left_to_right.mp4");
        let file = tokio::fs::File::create(&path).await.unwrap();

        finish_or_remove(&path, write_all(file, &[1, 2, 3])).await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), vec![1, 2, 3]);
        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
