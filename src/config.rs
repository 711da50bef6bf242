use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Run configuration for the backfill pipeline.
///
/// Holds the input tree and the destination folders for a single run.
/// The value is passed explicitly to [`crate::pipeline::run`], so two runs with
/// different configs never share state.
///
/// # Example
///
/// ```rust,no_run
/// use exif_backfill::config::Config;
///
/// let mut config = Config {
///     input_folder: "Takeout/Google Photos".into(),
///     output_folder: "fixed".into(),
///     skipped_folder: Some("already-tagged".into()),
///     ..Config::default()
/// };
/// config.prepare().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the tree searched for `.json` sidecar records.
    pub input_folder: PathBuf,
    /// Folder that receives rewritten images.
    pub output_folder: PathBuf,
    /// Folder that receives byte-for-byte copies of images that already
    /// carry a capture timestamp. `None` disables archiving.
    pub skipped_folder: Option<PathBuf>,
    /// Run one discovery pass per directory of the input tree.
    pub recursive: bool,
    /// In recursive mode, process nested sidecars again for every ancestor
    /// directory pass instead of once per run.
    pub rewalk_nested: bool,
    /// If `true`, decide and report what would happen without writing files.
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_folder: PathBuf::from("."),
            output_folder: PathBuf::from("output"),
            skipped_folder: None,
            recursive: false,
            rewalk_nested: false,
            dry_run: false,
        }
    }
}

impl Config {
    /// Create the destination folders.
    ///
    /// The skipped folder is normalized to an absolute path. A missing input
    /// folder is only warned about: the run then finds no sidecars. Failing
    /// to create a destination is fatal.
    pub fn prepare(&mut self) -> Result<()> {
        if !self.input_folder.is_dir() {
            log::warn!(
                "Input folder does not exist: {}",
                self.input_folder.display()
            );
        }

        std::fs::create_dir_all(&self.output_folder).with_context(|| {
            format!(
                "Failed to create output folder {}",
                self.output_folder.display()
            )
        })?;

        match self.skipped_folder.take() {
            Some(dir) => {
                let dir = std::path::absolute(&dir).with_context(|| {
                    format!("Failed to resolve skipped folder {}", dir.display())
                })?;
                std::fs::create_dir_all(&dir).with_context(|| {
                    format!("Failed to create skipped folder {}", dir.display())
                })?;
                self.skipped_folder = Some(dir);
            }
            None => {
                log::info!("No skipped folder provided. Already-tagged images will not be copied.");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_cli_defaults() {
        let config = Config::default();
        assert_eq!(config.input_folder, PathBuf::from("."));
        assert_eq!(config.output_folder, PathBuf::from("output"));
        assert!(config.skipped_folder.is_none());
        assert!(!config.recursive);
        assert!(!config.rewalk_nested);
        assert!(!config.dry_run);
    }

    #[test]
    fn prepare_creates_output_and_skipped_folders() {
        let dir = TempDir::new().unwrap();
        let mut config = Config {
            input_folder: dir.path().to_path_buf(),
            output_folder: dir.path().join("out/nested"),
            skipped_folder: Some(dir.path().join("skipped")),
            ..Config::default()
        };

        config.prepare().unwrap();

        assert!(dir.path().join("out/nested").is_dir());
        assert!(dir.path().join("skipped").is_dir());
        assert!(config.skipped_folder.as_ref().unwrap().is_absolute());
    }

    #[test]
    fn missing_input_gives_an_empty_run() {
        let dir = TempDir::new().unwrap();
        let mut config = Config {
            input_folder: dir.path().join("nope"),
            output_folder: dir.path().join("out"),
            recursive: true,
            ..Config::default()
        };

        config.prepare().unwrap();

        assert!(dir.path().join("out").is_dir());
        assert!(crate::pipeline::run(&config).is_empty());
        config.recursive = false;
        assert!(crate::pipeline::run(&config).is_empty());
    }

    #[test]
    fn prepare_fails_when_output_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("out");
        std::fs::write(&blocker, b"file").unwrap();
        let mut config = Config {
            input_folder: dir.path().to_path_buf(),
            output_folder: blocker,
            ..Config::default()
        };

        let err = config.prepare().unwrap_err();
        assert!(err.to_string().contains("Failed to create output folder"));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"recursive": true}"#).unwrap();
        assert!(config.recursive);
        assert_eq!(config.output_folder, PathBuf::from("output"));
    }
}
