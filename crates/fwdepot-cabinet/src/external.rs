//! External decompressor
//!
//! Archives using compression the native reader cannot inflate can be extracted
//! with a helper such as `cabextract`. The helper runs in a scratch directory
//! under a timeout and is killed if the timeout elapses.

use crate::archive::{CabArchive, CabFile};
use crate::error::{CabError, CabResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Default helper location
pub const DEFAULT_PROGRAM: &str = "/usr/bin/cabextract";

/// Default time allowed for one extraction
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// `cabextract`-compatible helper process
#[derive(Debug, Clone)]
pub struct ExternalDecompressor {
    program: PathBuf,
    timeout: Duration,
}

impl Default for ExternalDecompressor {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM, DEFAULT_TIMEOUT)
    }
}

impl ExternalDecompressor {
    /// Create a decompressor invoking `program`
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Helper path
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Time allowed for one extraction
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the helper exists on this host
    pub fn is_available(&self) -> bool {
        self.program.is_file()
    }

    /// Extract every member of `bytes`
    ///
    /// Members are returned sorted by name, with `\` as the directory separator.
    ///
    /// # Errors
    ///
    /// [`CabError::DecompressorTimeout`] when the helper does not finish in time;
    /// [`CabError::DecompressorFailed`] when it exits unsuccessfully.
    pub async fn extract(&self, bytes: &[u8], max_size: u64) -> CabResult<CabArchive> {
        let scratch = tempfile::TempDir::new()?;
        let input = scratch.path().join("input.cab");
        let output_dir = scratch.path().join("out");
        tokio::fs::write(&input, bytes).await?;
        tokio::fs::create_dir(&output_dir).await?;

        let child = Command::new(&self.program)
            .arg("-q")
            .arg("-d")
            .arg(&output_dir)
            .arg(&input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.timeout, child).await {
            Ok(result) => result?,
            Err(elapsed) => {
                warn!(program = %self.program.display(), %elapsed, "External decompressor timed out");
                return Err(CabError::DecompressorTimeout(self.timeout));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CabError::DecompressorFailed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let files = tokio::task::spawn_blocking(move || collect_members(&output_dir, max_size))
            .await
            .map_err(|e| CabError::DecompressorFailed(format!("collecting output: {e}")))??;

        debug!(files = files.len(), "External decompressor extracted cabinet");
        drop(scratch);
        Ok(CabArchive::from_files(files))
    }
}

fn collect_members(root: &Path, max_size: u64) -> CabResult<Vec<CabFile>> {
    let mut files = Vec::new();
    let mut total: u64 = 0;

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| CabError::DecompressorFailed(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| CabError::DecompressorFailed(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("\\");

        let data = std::fs::read(entry.path())?;
        total = total.saturating_add(data.len() as u64);
        if total > max_size {
            return Err(CabError::LimitExceeded { limit: max_size });
        }

        files.push(CabFile::new(name, data));
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_unavailable() {
        let decompressor = ExternalDecompressor::new("/nonexistent/cabextract", DEFAULT_TIMEOUT);
        assert!(!decompressor.is_available());
    }

    #[test]
    fn test_collect_members_sorted_with_backslashes() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        std::fs::create_dir(dir.path().join("sub"))?;
        std::fs::write(dir.path().join("b.bin"), b"bb")?;
        std::fs::write(dir.path().join("a.inf"), b"a")?;
        std::fs::write(dir.path().join("sub").join("c.xml"), b"ccc")?;

        let files = collect_members(dir.path(), 1024)?;
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.inf", "b.bin", "sub\\c.xml"]);

        assert!(matches!(
            collect_members(dir.path(), 4),
            Err(CabError::LimitExceeded { limit: 4 })
        ));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_retryable() -> Result<(), Box<dyn std::error::Error>> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new()?;
        let script = dir.path().join("slow-extract");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n")?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

        let decompressor = ExternalDecompressor::new(&script, Duration::from_millis(100));
        let err = decompressor
            .extract(b"MSCF", 1024)
            .await
            .err()
            .ok_or("expected timeout")?;
        assert!(err.is_retryable());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_helper() -> Result<(), Box<dyn std::error::Error>> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new()?;
        let script = dir.path().join("bad-extract");
        std::fs::write(&script, "#!/bin/sh\necho broken >&2\nexit 1\n")?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

        let decompressor = ExternalDecompressor::new(&script, DEFAULT_TIMEOUT);
        let err = decompressor
            .extract(b"MSCF", 1024)
            .await
            .err()
            .ok_or("expected failure")?;
        assert!(matches!(err, CabError::DecompressorFailed(ref msg) if msg.contains("broken")));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_helper_output_collected() -> Result<(), Box<dyn std::error::Error>> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new()?;
        let script = dir.path().join("fake-extract");
        // invoked as: fake-extract -q -d <dir> <input>
        std::fs::write(&script, "#!/bin/sh\nprintf 'payload' > \"$3/firmware.bin\"\n")?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

        let decompressor = ExternalDecompressor::new(&script, DEFAULT_TIMEOUT);
        let archive = decompressor.extract(b"MSCF", 1024).await?;
        assert_eq!(
            archive.find_file("firmware.bin").map(|f| f.data.as_slice()),
            Some(&b"payload"[..])
        );
        Ok(())
    }
}
