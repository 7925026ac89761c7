//! Checksum verification of generated files
//!
//! The store digests the gzip of an attachment body (level 8, no name), so
//! the digest in a file name is checked against a gzipped copy of the file.

use crate::error::SyncError;
use crate::path::digest_from_file_name;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

const GZIP_BATCH: usize = 256;

/// Decides which local files no longer match the digest in their name
#[async_trait]
pub trait ChecksumVerifier: Send + Sync {
    /// Subset of `files` with a mismatching or unparsable digest.
    async fn invalid_paths(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>, SyncError>;
}

/// Verifier shelling out to `gzip` and `md5sum`
#[derive(Debug, Clone, Default)]
pub struct GzipMd5Verifier;

/// One parsed line of `md5sum -c` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckLine {
    Ok(PathBuf),
    Failed(PathBuf),
}

/// Parse a line of `md5sum -c` output.
///
/// Anything other than an `OK` or `FAILED` verdict is a tool failure.
pub fn parse_check_line(line: &str) -> Result<CheckLine, SyncError> {
    if let Some(path) = line.strip_suffix(": OK") {
        return Ok(CheckLine::Ok(PathBuf::from(path)));
    }
    if let Some((path, verdict)) = line.rsplit_once(": ") {
        if verdict.starts_with("FAILED") {
            return Ok(CheckLine::Failed(PathBuf::from(path)));
        }
    }
    Err(SyncError::ChecksumTool(format!(
        "Unable to parse md5sum output: {:?}",
        line
    )))
}

fn gz_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".gz");
    PathBuf::from(name)
}

fn strip_gz(path: PathBuf) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_suffix(".gz")) {
        Some(stripped) => PathBuf::from(stripped),
        None => path,
    }
}

impl GzipMd5Verifier {
    pub fn new() -> Self {
        Self
    }

    async fn gzip(&self, files: &[&Path]) -> Result<(), SyncError> {
        for batch in files.chunks(GZIP_BATCH) {
            let status = Command::new("gzip")
                .arg("-fkn8")
                .args(batch)
                .stdin(Stdio::null())
                .status()
                .await
                .map_err(|e| SyncError::ChecksumTool(format!("failed to run gzip: {}", e)))?;
            if !status.success() {
                return Err(SyncError::ChecksumTool(format!("gzip exited with {}", status)));
            }
        }
        Ok(())
    }

    async fn md5sum(&self, checks: String) -> Result<Vec<PathBuf>, SyncError> {
        let mut child = Command::new("md5sum")
            .arg("-c")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SyncError::ChecksumTool(format!("failed to run md5sum: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SyncError::ChecksumTool("md5sum stdin unavailable".to_string()))?;
        let writer = tokio::spawn(async move {
            stdin.write_all(checks.as_bytes()).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SyncError::ChecksumTool(format!("md5sum failed: {}", e)))?;
        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SyncError::ChecksumTool(format!("writing to md5sum: {}", e))),
            Err(e) => return Err(SyncError::ChecksumTool(format!("md5sum writer: {}", e))),
        }
        // A non-zero exit only means some files failed the check.
        debug!(status = %output.status, stderr = %String::from_utf8_lossy(&output.stderr), "md5sum finished");

        let mut invalid = Vec::new();
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            if let CheckLine::Failed(path) = parse_check_line(line)? {
                invalid.push(strip_gz(path));
            }
        }
        Ok(invalid)
    }
}

#[async_trait]
impl ChecksumVerifier for GzipMd5Verifier {
    async fn invalid_paths(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>, SyncError> {
        let mut invalid = Vec::new();
        let mut checks = String::new();
        let mut candidates: Vec<&Path> = Vec::new();
        for file in files {
            let digest = file
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(digest_from_file_name);
            match digest {
                Some(digest) if digest.len() == 32 => {
                    checks.push_str(digest);
                    checks.push_str("  ");
                    checks.push_str(&gz_path(file).to_string_lossy());
                    checks.push('\n');
                    candidates.push(file);
                }
                _ => {
                    debug!(path = %file.display(), "No digest in file name");
                    invalid.push(file.clone());
                }
            }
        }
        if candidates.is_empty() {
            return Ok(invalid);
        }

        let result = match self.gzip(&candidates).await {
            Ok(()) => self.md5sum(checks).await,
            Err(e) => Err(e),
        };
        for file in &candidates {
            let gz = gz_path(file);
            if let Err(e) = tokio::fs::remove_file(&gz).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %gz.display(), error = %e, "Failed to remove gzip copy");
                }
            }
        }
        invalid.extend(result?);
        Ok(invalid)
    }
}
