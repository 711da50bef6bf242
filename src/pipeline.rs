use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::exif;
use crate::sidecar::{self, CaptureInfo, SidecarRecord, SkipReason};

/// Recognized image extensions (matched case-insensitively).
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp", "tiff", "heic"];

/// Image container, determined by file extension.
///
/// Selects both the encoder used for the rewritten copy and how the
/// `DateTimeOriginal` tag is embedded.
///
/// # Example
///
/// ```rust
/// use exif_backfill::pipeline::ImageKind;
/// use std::path::Path;
///
/// assert_eq!(ImageKind::from_path(Path::new("IMG_0001.JPG")), Some(ImageKind::Jpeg));
/// assert_eq!(ImageKind::from_path(Path::new("notes.txt")), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// JPEG: EXIF in an APP1 segment
    Jpeg,
    /// PNG: EXIF in an eXIf chunk
    Png,
    /// WebP: EXIF chunk in RIFF
    WebP,
    /// TIFF: EXIF sub-IFD
    Tiff,
    /// BMP: no metadata container
    Bmp,
    /// GIF: no metadata container
    Gif,
    /// HEIC: recognized but cannot be decoded
    Heic,
}

impl ImageKind {
    /// Determine the image kind from a file path extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            "tiff" => Some(Self::Tiff),
            "bmp" => Some(Self::Bmp),
            "gif" => Some(Self::Gif),
            "heic" => Some(Self::Heic),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::WebP => "WebP",
            Self::Tiff => "TIFF",
            Self::Bmp => "BMP",
            Self::Gif => "GIF",
            Self::Heic => "HEIC",
        }
    }
}

/// What happened to a single sidecar.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A new copy carrying the capture time was written (or would be, in a dry run).
    Rewritten {
        output: PathBuf,
        /// `false` when the format has no EXIF container.
        tag_embedded: bool,
    },
    /// The image already has `DateTimeOriginal`; `archived` is the copy in the
    /// skipped folder, if one is configured.
    AlreadyTagged { archived: Option<PathBuf> },
    /// The sidecar or its companion did not qualify.
    Skipped(SkipReason),
    /// Decoding, encoding, writing, or copying failed.
    Failed(String),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rewritten { .. } => "rewritten",
            Self::AlreadyTagged { .. } => "already_tagged",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
        }
    }
}

/// The result of processing one sidecar record.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub sidecar: PathBuf,
    /// Companion image path, once the sidecar named one.
    pub image: Option<PathBuf>,
    pub outcome: Outcome,
}

/// Collect sidecar files from the full subtree of `root`.
///
/// Directories are walked recursively (following symlinks); unreadable
/// entries are ignored.
pub fn collect_sidecars(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && sidecar::is_sidecar(e.path()))
        .map(|e| e.into_path())
        .collect()
}

/// Directories that each get their own discovery pass.
///
/// Just the input folder normally; every directory of the tree (the input
/// folder first) in recursive mode.
pub fn discovery_roots(config: &Config) -> Vec<PathBuf> {
    if !config.recursive {
        return vec![config.input_folder.clone()];
    }

    WalkDir::new(&config.input_folder)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect()
}

/// Run the whole backfill over `config.input_folder`.
///
/// Destinations must already exist (see [`Config::prepare`]). Per-sidecar
/// problems are reported in the returned results and never abort the run.
pub fn run(config: &Config) -> Vec<ProcessResult> {
    let mut results = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    // Destinations promised during a dry run, which never touch the disk
    let mut planned: HashSet<PathBuf> = HashSet::new();

    for root in discovery_roots(config) {
        log::info!("Processing files in '{}'...", root.display());

        for sidecar in collect_sidecars(&root) {
            if !config.rewalk_nested && !seen.insert(sidecar.clone()) {
                log::debug!("Already processed {}", sidecar.display());
                continue;
            }
            log::info!("Processing file: {}", sidecar.display());
            results.push(process_planned(&sidecar, config, &mut planned));
        }
    }

    results
}

/// Process one sidecar: validate it, find its image, then rewrite or archive.
pub fn process_sidecar(path: &Path, config: &Config) -> ProcessResult {
    process_planned(path, config, &mut HashSet::new())
}

fn process_planned(path: &Path, config: &Config, planned: &mut HashSet<PathBuf>) -> ProcessResult {
    let mut result = ProcessResult {
        sidecar: path.to_path_buf(),
        image: None,
        outcome: Outcome::Failed(String::new()),
    };

    let capture = match SidecarRecord::load(path).and_then(|r| r.capture_info()) {
        Ok(capture) => capture,
        Err(reason) => {
            log::warn!("Skipped {}: {reason}", path.display());
            result.outcome = Outcome::Skipped(reason);
            return result;
        }
    };

    let image_path = path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(&capture.title);
    log::debug!("Constructed image path: {}", image_path.display());
    result.image = Some(image_path.clone());

    result.outcome = match decide(&image_path, &capture, config, planned) {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("Failed {}: {e:#}", path.display());
            Outcome::Failed(format!("{e:#}"))
        }
    };

    if let Outcome::Skipped(ref reason) = result.outcome {
        log::warn!("Skipped {}: {reason}", path.display());
    }

    result
}

fn decide(
    image_path: &Path,
    capture: &CaptureInfo,
    config: &Config,
    planned: &mut HashSet<PathBuf>,
) -> Result<Outcome> {
    if !image_path.exists() {
        return Ok(Outcome::Skipped(SkipReason::ImageNotFound(
            image_path.to_path_buf(),
        )));
    }

    let kind = match ImageKind::from_path(image_path) {
        Some(kind) if image_path.is_file() && is_supported_image(image_path) => kind,
        _ => {
            return Ok(Outcome::Skipped(SkipReason::NotAnImage(
                image_path.to_path_buf(),
            )));
        }
    };

    if let Some(existing) = exif::read_creation_time(image_path)? {
        log::info!(
            "Skipped {} because EXIF data already exists ({existing}).",
            image_path.display()
        );
        let archived = match config.skipped_folder.as_deref() {
            Some(dir) => Some(archive_image(image_path, dir, config.dry_run, planned)?),
            None => None,
        };
        return Ok(Outcome::AlreadyTagged { archived });
    }

    let image = exif::decode_image(image_path)?;
    let output = free_path(&config.output_folder.join(file_name(image_path)?), planned);

    if config.dry_run {
        planned.insert(output.clone());
        log::info!(
            "Would modify {} and save to {}",
            capture.title,
            output.display()
        );
        return Ok(Outcome::Rewritten {
            output,
            tag_embedded: !matches!(kind, ImageKind::Bmp | ImageKind::Gif),
        });
    }

    let written = exif::write_with_creation_time(&image, &output, kind, &capture.date_time)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    log::info!("Modified {} and saved to {}", capture.title, output.display());

    Ok(Outcome::Rewritten {
        output,
        tag_embedded: written.tag_embedded,
    })
}

/// Copy an already-tagged image into the skipped folder, unmodified.
///
/// Names in `planned` count as taken; a dry run adds its destination there
/// instead of copying.
pub fn archive_image(
    image_path: &Path,
    skipped_folder: &Path,
    dry_run: bool,
    planned: &mut HashSet<PathBuf>,
) -> Result<PathBuf> {
    let dest = free_path(&skipped_folder.join(file_name(image_path)?), planned);
    let title = image_path.display();

    if dry_run {
        planned.insert(dest.clone());
        log::info!("Would copy {title} to {}", dest.display());
        return Ok(dest);
    }

    std::fs::copy(image_path, &dest)
        .with_context(|| format!("Failed to copy {title} to {}", dest.display()))?;
    log::info!("Skipped {title} and copied to {}", dest.display());
    Ok(dest)
}

/// Return `path` if it is free, else the first free `stem_N.ext` (N = 1, 2, ...).
pub fn unique_path(path: &Path) -> PathBuf {
    free_path(path, &HashSet::new())
}

/// Like [`unique_path`], but names in `planned` are treated as taken too.
fn free_path(path: &Path, planned: &HashSet<PathBuf>) -> PathBuf {
    let taken = |p: &Path| p.exists() || planned.contains(p);
    if !taken(path) {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1u64..)
        .map(|n| path.with_file_name(format!("{stem}_{n}{ext}")))
        .find(|candidate| !taken(candidate.as_path()))
        .unwrap_or_else(|| path.to_path_buf())
}

/// Check if a file has a recognized image extension.
fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name()
        .with_context(|| format!("No file name in {}", path.display()))
}
