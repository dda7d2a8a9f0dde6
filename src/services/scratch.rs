use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A file in its own `upload-*` directory under the scratch root.
/// Call [`ScratchFile::cleanup`] once done; dropping the guard removes
/// whatever is left. Failures are logged only.
#[derive(Debug)]
pub struct ScratchFile {
    dir: PathBuf,
    path: PathBuf,
    removed: bool,
}

impl ScratchFile {
    pub async fn write(root: &Path, file_name: &str, bytes: &[u8]) -> io::Result<Self> {
        let dir = root.join(format!(
            "upload-{}-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::create_dir_all(&dir).await?;

        // Guard exists before the write so a failed write still cleans up.
        let scratch = Self {
            path: dir.join(file_name),
            dir,
            removed: false,
        };
        tokio::fs::write(&scratch.path, bytes).await?;

        log::debug!("💾 Wrote {} bytes to {}", bytes.len(), scratch.path.display());
        Ok(scratch)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn cleanup(mut self) {
        log_removal("file", &self.path, tokio::fs::remove_file(&self.path).await);
        log_removal("dir", &self.dir, tokio::fs::remove_dir(&self.dir).await);
        self.removed = true;
    }
}

fn log_removal(what: &str, path: &Path, result: io::Result<()>) {
    match result {
        Ok(()) => log::debug!("🗑️ Deleted temp {} {}", what, path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::error!("Failed to delete temp {} {}: {}", what, path.display(), e),
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        log_removal("file", &self.path, std::fs::remove_file(&self.path));
        log_removal("dir", &self.dir, std::fs::remove_dir(&self.dir));
    }
}
