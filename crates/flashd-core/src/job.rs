//! Flash job construction
//!
//! A [`FlashJob`] is the fully resolved OpenOCD invocation for one image: the
//! programmer executable, the fixed interface/target configuration and the
//! command script that erases, writes, verifies and resets the chip.

use std::path::{Path, PathBuf};

use crate::error::{FlashError, FlashResult};

/// Programmer looked up on the search path when none is configured
pub const DEFAULT_PROGRAMMER: &str = "openocd";

/// Debug interface and chip configuration files passed to OpenOCD with `-f`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetConfig {
    pub interface: &'static str,
    pub target: &'static str,
}

/// The only supported target: ST-LINK probe on an STM32F4 part
pub const STM32F4_STLINK: TargetConfig = TargetConfig {
    interface: "interface/stlink.cfg",
    target: "target/stm32f4x.cfg",
};

/// Make `path` absolute and convert it to forward-slash form.
///
/// OpenOCD's Tcl command syntax treats backslashes as escapes, so the image
/// path must never reach the script with them.
pub fn normalize_image_path(path: &Path) -> FlashResult<String> {
    let absolute = std::path::absolute(path)
        .map_err(|e| FlashError::InvalidInput(format!("Invalid image path: {}", e)))?;
    Ok(absolute.to_string_lossy().replace('\\', "/"))
}

/// One resolved programmer invocation
#[derive(Debug, Clone)]
pub struct FlashJob {
    image: String,
    programmer: PathBuf,
    target: TargetConfig,
}

impl FlashJob {
    /// Resolve a job for `image`.
    ///
    /// Fails with [`FlashError::ImageNotFound`] if the image does not exist and
    /// with [`FlashError::ProgrammerNotFound`] if `programmer` is given but does
    /// not exist. When `programmer` is `None`, [`DEFAULT_PROGRAMMER`] is resolved
    /// from the search path at spawn time.
    pub fn new(image: impl AsRef<Path>, programmer: Option<&Path>) -> FlashResult<Self> {
        let image = image.as_ref();
        if !image.exists() {
            return Err(FlashError::ImageNotFound(image.to_path_buf()));
        }

        let programmer = match programmer {
            Some(path) => {
                if !path.exists() {
                    return Err(FlashError::ProgrammerNotFound(path.to_path_buf()));
                }
                path.to_path_buf()
            }
            None => PathBuf::from(DEFAULT_PROGRAMMER),
        };

        Ok(Self {
            image: normalize_image_path(image)?,
            programmer,
            target: STM32F4_STLINK,
        })
    }

    /// Normalized image path substituted into the script
    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn programmer(&self) -> &Path {
        &self.programmer
    }

    pub fn target(&self) -> TargetConfig {
        self.target
    }

    /// Ordered OpenOCD commands for one flash cycle
    pub fn commands(&self) -> Vec<String> {
        vec![
            "init".to_string(),
            "reset".to_string(),
            "halt".to_string(),
            format!("flash write_image erase {}", self.image),
            format!("verify_image {}", self.image),
            "reset".to_string(),
            "exit".to_string(),
        ]
    }

    /// Commands joined for a single `-c` argument
    pub fn script(&self) -> String {
        self.commands().join("; ")
    }

    /// Argument vector passed to the programmer
    pub fn args(&self) -> Vec<String> {
        vec![
            "-f".to_string(),
            self.target.interface.to_string(),
            "-f".to_string(),
            self.target.target.to_string(),
            "-c".to_string(),
            self.script(),
        ]
    }

    /// Human-readable command line, as announced before spawning
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.programmer.to_string_lossy().into_owned()];
        parts.extend(self.args());
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_in(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"\x7fELF").unwrap();
        path
    }

    #[test]
    fn test_script_order() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_in(&dir, "x.elf");
        let job = FlashJob::new(&image, None).unwrap();
        let normalized = job.image().to_string();

        assert_eq!(
            job.commands(),
            vec![
                "init".to_string(),
                "reset".to_string(),
                "halt".to_string(),
                format!("flash write_image erase {}", normalized),
                format!("verify_image {}", normalized),
                "reset".to_string(),
                "exit".to_string(),
            ]
        );
        assert_eq!(
            job.script(),
            format!(
                "init; reset; halt; flash write_image erase {0}; verify_image {0}; reset; exit",
                normalized
            )
        );
    }

    #[test]
    fn test_script_references_image_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_in(&dir, "x.elf");
        let job = FlashJob::new(&image, None).unwrap();
        let write = format!("flash write_image erase {}", job.image());
        let verify = format!("verify_image {}", job.image());

        let script = job.script();
        let positions: Vec<usize> = ["init", "reset", "halt", write.as_str(), verify.as_str(), "exit"]
            .iter()
            .map(|needle| script.find(needle).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        // second reset comes after verify
        assert!(script.rfind("reset").unwrap() > positions[4]);
        assert!(job.image().ends_with("/x.elf"));
    }

    #[test]
    fn test_args_and_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_in(&dir, "fw.elf");
        let job = FlashJob::new(&image, None).unwrap();

        let args = job.args();
        assert_eq!(&args[..5], &["-f", "interface/stlink.cfg", "-f", "target/stm32f4x.cfg", "-c"]);
        assert_eq!(args[5], job.script());
        assert!(job
            .command_line()
            .starts_with("openocd -f interface/stlink.cfg -f target/stm32f4x.cfg -c init; "));
    }

    #[test]
    fn test_backslash_path_normalized() {
        let normalized = normalize_image_path(Path::new("build\\out\\fw.elf")).unwrap();
        assert!(!normalized.contains('\\'));
        assert!(normalized.ends_with("build/out/fw.elf"));
        assert!(Path::new(&normalized).is_absolute());
    }

    #[test]
    fn test_relative_path_made_absolute() {
        let normalized = normalize_image_path(Path::new("fw.elf")).unwrap();
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(
            normalized,
            format!("{}/fw.elf", cwd.to_string_lossy().replace('\\', "/"))
        );
    }

    #[test]
    fn test_missing_image() {
        let err = FlashJob::new("/definitely/not/here.elf", None).unwrap_err();
        assert!(matches!(err, FlashError::ImageNotFound(_)));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_missing_programmer() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_in(&dir, "fw.elf");
        let err = FlashJob::new(&image, Some(Path::new("/no/such/openocd"))).unwrap_err();
        assert!(matches!(err, FlashError::ProgrammerNotFound(_)));
        assert_eq!(err.to_string(), "OpenOCD not found: /no/such/openocd");
    }

    #[test]
    fn test_explicit_programmer() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_in(&dir, "fw.elf");
        let programmer = image_in(&dir, "openocd");
        let job = FlashJob::new(&image, Some(&programmer)).unwrap();
        assert_eq!(job.programmer(), programmer.as_path());
        assert_eq!(job.target(), STM32F4_STLINK);
    }
}
