//! Capture-time EXIF reading and writing.
//!
//! - [`read_creation_time`]: look up `DateTimeOriginal` in an existing image
//! - [`decode_image`]: fully decode an image into memory
//! - [`write_with_creation_time`]: re-encode pixels into a new file carrying
//!   only a `DateTimeOriginal` tag
//!
//! JPEG, PNG, and WebP get their EXIF block spliced in with img-parts, TIFF
//! files get an Exif sub-IFD appended directly, and BMP/GIF are written
//! without metadata.

mod reader;
mod tiff;
mod writer;

pub use reader::read_creation_time;
pub use writer::{WriteResult, decode_image, write_with_creation_time};
