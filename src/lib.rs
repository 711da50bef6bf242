//! # exif-backfill
//!
//! Restore missing capture timestamps on exported photos. Photo-export
//! services ship each image with a JSON sidecar such as
//! `IMG_0001.jpg.json` that records the original capture time, while the
//! image itself often lost its EXIF `DateTimeOriginal` tag. This crate reads
//! the sidecars, finds each companion image, and writes a corrected copy that
//! carries the tag. Source files are never modified.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exif_backfill::config::Config;
//! use exif_backfill::pipeline::{self, Outcome};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut config = Config {
//!         input_folder: "Takeout/Google Photos".into(),
//!         output_folder: "fixed".into(),
//!         skipped_folder: Some("already-tagged".into()),
//!         recursive: true,
//!         ..Config::default()
//!     };
//!     config.prepare()?;
//!
//!     for result in pipeline::run(&config) {
//!         if let Outcome::Rewritten { output, .. } = &result.outcome {
//!             println!("{} -> {}", result.sidecar.display(), output.display());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Formats
//!
//! | Format | Tag embedding |
//! |--------|---------------|
//! | JPEG (`.jpg`, `.jpeg`) | EXIF APP1 segment |
//! | PNG (`.png`) | `eXIf` chunk |
//! | WebP (`.webp`) | RIFF `EXIF` chunk |
//! | TIFF (`.tiff`) | EXIF sub-IFD |
//! | BMP, GIF | none (copy written without the tag) |
//! | HEIC (`.heic`) | recognized, not decodable |
//!
//! ## Modules
//!
//! - [`config`]: Run configuration and destination bootstrapping
//! - [`sidecar`]: Sidecar record decoding and timestamp conversion
//! - [`exif`]: Capture-time EXIF reading and writing
//! - [`pipeline`]: Discovery, pairing, and per-sidecar outcomes

pub mod config;
pub mod exif;
pub mod pipeline;
pub mod sidecar;
