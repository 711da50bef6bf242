//! JSON sidecar records exported next to each photo.
//!
//! Only the fields needed to recover the capture time are decoded; everything
//! else in the record is ignored.

use chrono::DateTime;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name suffix that marks a sidecar record.
pub const SIDECAR_EXTENSION: &str = ".json";

/// Format of the EXIF `DateTimeOriginal` value.
const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Why a sidecar was skipped without touching its image.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("invalid UTF-8 text")]
    InvalidEncoding,

    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("missing title or timestamp")]
    MissingTitleOrTimestamp,

    #[error("missing timestamp")]
    MissingTimestamp,

    #[error("invalid timestamp \"{0}\"")]
    InvalidTimestamp(String),

    #[error("image does not exist: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("not an image: {}", .0.display())]
    NotAnImage(PathBuf),
}

/// A decoded sidecar record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarRecord {
    pub title: Option<String>,
    pub photo_taken_time: Option<PhotoTakenTime>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhotoTakenTime {
    pub timestamp: Option<RawTimestamp>,
}

/// Exporters write the epoch seconds either as a string or as a number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Text(String),
    Number(serde_json::Number),
}

impl RawTimestamp {
    fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(n) => n.as_i64() == Some(0) || n.as_f64() == Some(0.0),
        }
    }

    /// Seconds since the Unix epoch. Fractional numbers are truncated.
    pub fn seconds(&self) -> Option<i64> {
        match self {
            Self::Text(s) => s.trim().parse().ok(),
            Self::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        }
    }
}

impl std::fmt::Display for RawTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// The fields of a sidecar that passed the presence checks.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureInfo {
    /// File name of the companion image.
    pub title: String,
    /// Capture time formatted as `YYYY:MM:DD HH:MM:SS` (UTC).
    pub date_time: String,
}

impl SidecarRecord {
    /// Decode a sidecar from raw file bytes, tolerating a leading BOM.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SkipReason> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let text = std::str::from_utf8(bytes).map_err(|_| SkipReason::InvalidEncoding)?;
        serde_json::from_str(text).map_err(|e| SkipReason::Malformed(e.to_string()))
    }

    /// Read and decode a sidecar file.
    pub fn load(path: &Path) -> Result<Self, SkipReason> {
        let bytes =
            std::fs::read(path).map_err(|e| SkipReason::Malformed(format!("unreadable: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Check the required fields and convert the timestamp.
    pub fn capture_info(&self) -> Result<CaptureInfo, SkipReason> {
        let title = self
            .title
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(SkipReason::MissingTitleOrTimestamp)?;
        let taken = self
            .photo_taken_time
            .as_ref()
            .ok_or(SkipReason::MissingTitleOrTimestamp)?;
        let raw = taken
            .timestamp
            .as_ref()
            .filter(|t| !t.is_empty())
            .ok_or(SkipReason::MissingTimestamp)?;

        let date_time = raw
            .seconds()
            .and_then(format_exif_datetime)
            .ok_or_else(|| SkipReason::InvalidTimestamp(raw.to_string()))?;

        Ok(CaptureInfo {
            title: title.to_string(),
            date_time,
        })
    }
}

/// Format epoch seconds as an EXIF date-time string in UTC.
pub fn format_exif_datetime(seconds: i64) -> Option<String> {
    DateTime::from_timestamp(seconds, 0).map(|dt| dt.format(EXIF_DATETIME_FORMAT).to_string())
}

/// Whether a path names a sidecar record.
pub fn is_sidecar(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(SIDECAR_EXTENSION))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(json: &str) -> Result<CaptureInfo, SkipReason> {
        SidecarRecord::from_bytes(json.as_bytes())?.capture_info()
    }

    #[test]
    fn formats_epoch_in_utc() {
        assert_eq!(
            format_exif_datetime(1_700_000_000).as_deref(),
            Some("2023:11:14 22:13:20")
        );
        assert_eq!(format_exif_datetime(0).as_deref(), Some("1970:01:01 00:00:00"));
    }

    #[test]
    fn out_of_range_epoch_is_none() {
        assert_eq!(format_exif_datetime(i64::MAX), None);
    }

    #[test]
    fn string_timestamp() {
        let info = info(r#"{"title":"a.jpg","photoTakenTime":{"timestamp":"1700000000"}}"#).unwrap();
        assert_eq!(info.title, "a.jpg");
        assert_eq!(info.date_time, "2023:11:14 22:13:20");
    }

    #[test]
    fn numeric_timestamp() {
        let info = info(r#"{"title":"a.jpg","photoTakenTime":{"timestamp":1700000000}}"#).unwrap();
        assert_eq!(info.date_time, "2023:11:14 22:13:20");
    }

    #[test]
    fn fractional_timestamp_truncates() {
        let info = info(r#"{"title":"a.jpg","photoTakenTime":{"timestamp":1700000000.9}}"#).unwrap();
        assert_eq!(info.date_time, "2023:11:14 22:13:20");
    }

    #[test]
    fn extra_fields_are_ignored() {
        let json = r#"{
            "title": "IMG_0001.JPG",
            "description": "",
            "imageViews": "3",
            "creationTime": {"timestamp": "1", "formatted": "x"},
            "photoTakenTime": {"timestamp": "1700000000", "formatted": "Nov 14, 2023"},
            "geoData": {"latitude": 0.0, "longitude": 0.0}
        }"#;
        assert_eq!(info(json).unwrap().title, "IMG_0001.JPG");
    }

    #[test]
    fn bom_is_stripped() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(br#"{"title":"a.jpg","photoTakenTime":{"timestamp":"1"}}"#);
        let record = SidecarRecord::from_bytes(&bytes).unwrap();
        assert_eq!(record.title.as_deref(), Some("a.jpg"));
    }

    #[test]
    fn invalid_utf8_is_an_encoding_error() {
        let bytes = b"{\"title\":\"\xff\xfe\"}";
        assert_eq!(
            SidecarRecord::from_bytes(bytes).unwrap_err(),
            SkipReason::InvalidEncoding
        );
    }

    #[test]
    fn malformed_json() {
        let err = SidecarRecord::from_bytes(b"{not json").unwrap_err();
        assert!(matches!(err, SkipReason::Malformed(_)));
    }

    #[test]
    fn missing_title() {
        assert_eq!(
            info(r#"{"photoTakenTime":{"timestamp":"1"}}"#).unwrap_err(),
            SkipReason::MissingTitleOrTimestamp
        );
        assert_eq!(
            info(r#"{"title":"","photoTakenTime":{"timestamp":"1"}}"#).unwrap_err(),
            SkipReason::MissingTitleOrTimestamp
        );
    }

    #[test]
    fn missing_photo_taken_time() {
        assert_eq!(
            info(r#"{"title":"a.jpg"}"#).unwrap_err(),
            SkipReason::MissingTitleOrTimestamp
        );
        assert_eq!(
            info(r#"{"title":"a.jpg","photoTakenTime":null}"#).unwrap_err(),
            SkipReason::MissingTitleOrTimestamp
        );
    }

    #[test]
    fn missing_timestamp() {
        assert_eq!(
            info(r#"{"title":"a.jpg","photoTakenTime":{"formatted":"x"}}"#).unwrap_err(),
            SkipReason::MissingTimestamp
        );
        assert_eq!(
            info(r#"{"title":"a.jpg","photoTakenTime":{"timestamp":""}}"#).unwrap_err(),
            SkipReason::MissingTimestamp
        );
    }

    #[test]
    fn non_numeric_timestamp() {
        assert_eq!(
            info(r#"{"title":"a.jpg","photoTakenTime":{"timestamp":"yesterday"}}"#).unwrap_err(),
            SkipReason::InvalidTimestamp("yesterday".to_string())
        );
    }

    #[test]
    fn reason_messages() {
        assert_eq!(
            SkipReason::MissingTitleOrTimestamp.to_string(),
            "missing title or timestamp"
        );
        assert_eq!(
            SkipReason::ImageNotFound(PathBuf::from("in/a.jpg")).to_string(),
            "image does not exist: in/a.jpg"
        );
    }

    #[test]
    fn sidecar_detection() {
        assert!(is_sidecar(Path::new("in/a.jpg.json")));
        assert!(is_sidecar(Path::new("metadata.json")));
        assert!(!is_sidecar(Path::new("a.JSON")));
        assert!(!is_sidecar(Path::new("a.jpg")));
    }
}
