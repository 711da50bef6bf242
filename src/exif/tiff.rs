//! Raw TIFF-structure access for the `DateTimeOriginal` tag.
//!
//! Works on both whole TIFF files and the TIFF-structured EXIF blocks stored
//! inside JPEG, PNG, and WebP containers.

use anyhow::{Context, Result};

const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
const FORMAT_ASCII: u16 = 2;
const FORMAT_LONG: u16 = 4;

// Some writers keep the JPEG APP1 prefix on eXIf chunks
const EXIF_PREFIX: &[u8] = b"Exif\0\0";

type RawEntry = [u8; 12];

#[derive(Debug, Clone, Copy)]
struct ByteOrder {
    big_endian: bool,
}

impl ByteOrder {
    fn detect(data: &[u8]) -> Option<Self> {
        match data.get(0..4)? {
            b"MM\0*" => Some(Self { big_endian: true }),
            b"II*\0" => Some(Self { big_endian: false }),
            _ => None,
        }
    }

    fn read_u16(self, data: &[u8], offset: usize) -> Option<u16> {
        let bytes: [u8; 2] = data.get(offset..offset.checked_add(2)?)?.try_into().ok()?;
        Some(if self.big_endian {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        })
    }

    fn read_u32(self, data: &[u8], offset: usize) -> Option<u32> {
        let bytes: [u8; 4] = data.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
        Some(if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        })
    }

    fn encode_u16(self, val: u16) -> [u8; 2] {
        if self.big_endian { val.to_be_bytes() } else { val.to_le_bytes() }
    }

    fn encode_u32(self, val: u32) -> [u8; 4] {
        if self.big_endian { val.to_be_bytes() } else { val.to_le_bytes() }
    }

    fn entry(self, tag_id: u16, format: u16, count: u32, value: [u8; 4]) -> RawEntry {
        let mut raw = [0u8; 12];
        raw[0..2].copy_from_slice(&self.encode_u16(tag_id));
        raw[2..4].copy_from_slice(&self.encode_u16(format));
        raw[4..8].copy_from_slice(&self.encode_u32(count));
        raw[8..12].copy_from_slice(&value);
        raw
    }

    fn tag_of(self, entry: &RawEntry) -> u16 {
        if self.big_endian {
            u16::from_be_bytes([entry[0], entry[1]])
        } else {
            u16::from_le_bytes([entry[0], entry[1]])
        }
    }
}

/// One image file directory: its 12-byte entries and the next-IFD pointer.
struct Ifd {
    entries: Vec<RawEntry>,
    next: u32,
}

impl Ifd {
    fn read(data: &[u8], order: ByteOrder, offset: usize) -> Option<Self> {
        let count = order.read_u16(data, offset)? as usize;
        let start = offset.checked_add(2)?;
        let end = start.checked_add(count * 12)?;
        let next = order.read_u32(data, end)?;

        let entries = data[start..end]
            .chunks_exact(12)
            .map(|chunk| {
                let mut raw = [0u8; 12];
                raw.copy_from_slice(chunk);
                raw
            })
            .collect();

        Some(Self { entries, next })
    }

    fn find(&self, order: ByteOrder, tag_id: u16) -> Option<&RawEntry> {
        self.entries.iter().find(|e| order.tag_of(e) == tag_id)
    }
}

/// Look up `DateTimeOriginal` in the Exif sub-IFD of a TIFF structure.
///
/// Returns the raw ASCII value (normally `YYYY:MM:DD HH:MM:SS`), or `None`
/// if the structure is malformed or the tag is absent.
pub fn find_date_time_original(block: &[u8]) -> Option<String> {
    let tiff = block.strip_prefix(EXIF_PREFIX).unwrap_or(block);
    let order = ByteOrder::detect(tiff)?;

    let ifd0 = Ifd::read(tiff, order, order.read_u32(tiff, 4)? as usize)?;
    let exif_offset = order.read_u32(ifd0.find(order, TAG_EXIF_IFD)?, 8)? as usize;
    let exif_ifd = Ifd::read(tiff, order, exif_offset)?;

    let entry = exif_ifd.find(order, TAG_DATE_TIME_ORIGINAL)?;
    if order.read_u16(entry, 2)? != FORMAT_ASCII {
        return None;
    }
    let count = order.read_u32(entry, 4)? as usize;
    let raw = if count <= 4 {
        &entry[8..8 + count]
    } else {
        let offset = order.read_u32(entry, 8)? as usize;
        tiff.get(offset..offset.checked_add(count)?)?
    };

    let value = String::from_utf8_lossy(raw);
    let value = value.trim_end_matches('\0').trim();
    if value.is_empty() { None } else { Some(value.to_string()) }
}

/// Add an Exif sub-IFD holding only `DateTimeOriginal` to a TIFF file.
///
/// The original bytes are kept untouched; a new Exif IFD and a rebuilt IFD0
/// are appended and the header is pointed at the new IFD0. Any previous
/// Exif IFD pointer is replaced.
pub fn insert_date_time_original(tiff: &[u8], date_time: &str) -> Result<Vec<u8>> {
    let order = ByteOrder::detect(tiff).context("Invalid TIFF header")?;
    let ifd0_offset = order.read_u32(tiff, 4).context("TIFF data too short")? as usize;
    let ifd0 = Ifd::read(tiff, order, ifd0_offset).context("IFD0 extends beyond TIFF data")?;

    let mut result = tiff.to_vec();
    pad_to_word(&mut result);

    // === Exif IFD: one ASCII entry, string data right after the IFD ===
    let mut text = date_time.as_bytes().to_vec();
    text.push(0); // null terminator
    let text_len = u32::try_from(text.len()).context("Timestamp too long")?;

    let exif_ifd_start = offset_of(&result)?;
    let value = if text.len() <= 4 {
        let mut inline = [0u8; 4];
        inline[..text.len()].copy_from_slice(&text);
        inline
    } else {
        order.encode_u32(exif_ifd_start + 2 + 12 + 4)
    };

    result.extend_from_slice(&order.encode_u16(1));
    result.extend_from_slice(&order.entry(TAG_DATE_TIME_ORIGINAL, FORMAT_ASCII, text_len, value));
    result.extend_from_slice(&order.encode_u32(0));
    if text.len() > 4 {
        result.extend_from_slice(&text);
    }
    pad_to_word(&mut result);

    // === Rebuild IFD0 with the Exif pointer, tags kept in ascending order ===
    let mut entries: Vec<RawEntry> = ifd0
        .entries
        .into_iter()
        .filter(|e| order.tag_of(e) != TAG_EXIF_IFD)
        .collect();
    let pointer = order.entry(TAG_EXIF_IFD, FORMAT_LONG, 1, order.encode_u32(exif_ifd_start));
    let pos = entries
        .iter()
        .position(|e| order.tag_of(e) > TAG_EXIF_IFD)
        .unwrap_or(entries.len());
    entries.insert(pos, pointer);

    let new_ifd0_start = offset_of(&result)?;
    let count = u16::try_from(entries.len()).context("Too many IFD0 entries")?;
    result.extend_from_slice(&order.encode_u16(count));
    for entry in &entries {
        result.extend_from_slice(entry);
    }
    result.extend_from_slice(&order.encode_u32(ifd0.next));

    // Update TIFF header to point to new IFD0
    result[4..8].copy_from_slice(&order.encode_u32(new_ifd0_start));

    Ok(result)
}

/// IFDs must start on a word boundary.
fn pad_to_word(data: &mut Vec<u8>) {
    if data.len() % 2 != 0 {
        data.push(0);
    }
}

fn offset_of(data: &[u8]) -> Result<u32> {
    u32::try_from(data.len()).context("TIFF data exceeds 4 GiB")
}
