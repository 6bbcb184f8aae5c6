//! Temporary storage for uploaded firmware images
//!
//! [`StagingArea::stage`] writes an upload to disk and hands back a
//! [`StagedImage`] guard. The file lives exactly as long as the guard: it is
//! removed when the guard is dropped, whether the flash succeeded, failed,
//! panicked or the caller went away.
//!
//! Names are derived from the upload (`temp_<filename>`) with no further
//! uniqueness, so two concurrent uploads with the same filename overwrite
//! each other.

use std::path::{Path, PathBuf};

use crate::error::{FlashError, FlashResult};

/// Extension every accepted upload must carry
pub const IMAGE_EXTENSION: &str = ".elf";

/// Prefix applied to staged file names
pub const STAGED_PREFIX: &str = "temp_";

/// Validate an uploaded filename and return the component used for staging.
///
/// Directory components are discarded so an upload can never be written
/// outside the staging directory.
pub fn validate_filename(filename: &str) -> FlashResult<&str> {
    if !filename.ends_with(IMAGE_EXTENSION) {
        return Err(FlashError::InvalidInput(
            "file type must be ELF (.elf)".to_string(),
        ));
    }

    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| name.ends_with(IMAGE_EXTENSION))
        .ok_or_else(|| FlashError::InvalidInput(format!("Invalid filename: {}", filename)))
}

/// Directory that staged images are written to
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl Default for StagingArea {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path an upload named `filename` is staged at
    pub fn path_for(&self, filename: &str) -> FlashResult<PathBuf> {
        let name = validate_filename(filename)?;
        Ok(self.dir.join(format!("{}{}", STAGED_PREFIX, name)))
    }

    /// Write `data` for an upload named `filename`.
    ///
    /// The filename is validated before anything touches the disk. If the
    /// write itself fails, the partial file is removed before returning.
    pub async fn stage(&self, filename: &str, data: &[u8]) -> FlashResult<StagedImage> {
        let path = self.path_for(filename)?;

        // Guard first so a failed write still cleans up
        let staged = StagedImage::adopt(path);
        tokio::fs::write(staged.path(), data).await?;

        tracing::info!(
            path = %staged.path().display(),
            size = data.len(),
            "Saved image to temporary file"
        );

        Ok(staged)
    }
}

/// Owner of one staged image file
///
/// Removal is attempted exactly once, on [`StagedImage::remove`] or on drop.
#[derive(Debug)]
pub struct StagedImage {
    path: PathBuf,
    removed: bool,
}

impl StagedImage {
    /// Take ownership of an existing file; it will be removed with the guard
    pub fn adopt(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now and report the result.
    ///
    /// A file that is already gone is not an error.
    pub fn remove(mut self) -> std::io::Result<()> {
        self.remove_once()
    }

    fn remove_once(&mut self) -> std::io::Result<()> {
        if self.removed {
            return Ok(());
        }
        self.removed = true;

        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Removed temporary file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for StagedImage {
    fn drop(&mut self) {
        if let Err(e) = self.remove_once() {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove temporary file"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_filename() {
        assert_eq!(validate_filename("blink.elf").unwrap(), "blink.elf");
        assert_eq!(validate_filename("../../etc/evil.elf").unwrap(), "evil.elf");
        assert!(matches!(
            validate_filename("firmware.bin"),
            Err(FlashError::InvalidInput(_))
        ));
        assert!(validate_filename("firmware.ELF").is_err());
        assert!(validate_filename("").is_err());
    }

    #[tokio::test]
    async fn test_stage_writes_prefixed_file() {
        let dir = tempfile::tempdir().unwrap();
        let area = StagingArea::new(dir.path());

        let staged = area.stage("blink.elf", b"\x7fELF-data").await.unwrap();
        assert_eq!(staged.path(), dir.path().join("temp_blink.elf"));
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"\x7fELF-data");
    }

    #[tokio::test]
    async fn test_rejected_upload_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let area = StagingArea::new(dir.path());

        let err = area.stage("firmware.bin", b"data").await.unwrap_err();
        assert!(matches!(err, FlashError::InvalidInput(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let area = StagingArea::new(dir.path());

        let staged = area.stage("blink.elf", b"data").await.unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_explicit_remove_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let area = StagingArea::new(dir.path());

        let staged = area.stage("blink.elf", b"data").await.unwrap();
        std::fs::remove_file(staged.path()).unwrap();
        assert!(staged.remove().is_ok());
    }

    #[tokio::test]
    async fn test_removed_when_consumer_panics() {
        let dir = tempfile::tempdir().unwrap();
        let area = StagingArea::new(dir.path());

        let staged = area.stage("blink.elf", b"data").await.unwrap();
        let path = staged.path().to_path_buf();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _owned = staged;
            panic!("consumer failed");
        }));
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let area = StagingArea::new(dir.path().join("missing-subdir"));

        let err = area.stage("blink.elf", b"data").await.unwrap_err();
        assert!(matches!(err, FlashError::Staging(_)));
        assert!(!dir.path().join("missing-subdir").exists());
    }
}
