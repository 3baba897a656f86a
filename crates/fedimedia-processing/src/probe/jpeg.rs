//! Native JPEG probe: header-only decode plus an EXIF orientation scan.

use fedimedia_core::{allowlist::MIME_JPEG, FileType};
use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, ImageDecoder};
use std::io::Cursor;

use super::{orientation, ProbeResult};
use crate::{ProcessingError, ProcessingResult};

const MARKER_SOI: u8 = 0xD8;
const MARKER_EOI: u8 = 0xD9;
const MARKER_SOS: u8 = 0xDA;
const MARKER_APP1: u8 = 0xE1;
const MARKER_TEM: u8 = 0x01;
const EXIF_HEADER: &[u8] = b"Exif\0\0";
const TAG_ORIENTATION: u16 = 0x0112;

pub fn probe_jpeg(data: &[u8]) -> ProcessingResult<ProbeResult> {
    ensure_complete(data)?;

    let decoder = JpegDecoder::new(Cursor::new(data))
        .map_err(|e| ProcessingError::decode("jpeg", e.to_string()))?;
    let (width, height) = decoder.dimensions();
    let pixel_format = match decoder.color_type() {
        ColorType::L8 | ColorType::L16 => "gray",
        _ => "yuvj420p",
    };

    let orientation = match exif_orientation(data) {
        Some(tag) => orientation::from_tag(i64::from(tag))?,
        None => orientation::NORMAL,
    };

    Ok(ProbeResult {
        kind: FileType::Image,
        container: "jpeg".to_string(),
        mime: Some(MIME_JPEG),
        extension: Some("jpg"),
        width,
        height,
        framerate: None,
        duration: None,
        bitrate: None,
        orientation,
        pixel_format: Some(pixel_format.to_string()),
        has_alpha: false,
    })
}

/// A header decode succeeds on a cut-off file, so walk the marker segments
/// and entropy-coded data until EOI. Anything appended after EOI, such as a
/// motion photo payload, is ignored.
fn ensure_complete(data: &[u8]) -> ProcessingResult<()> {
    match end_of_image(data) {
        Some(_) => Ok(()),
        None => Err(ProcessingError::decode("jpeg", "unexpected EOF")),
    }
}

/// Offset of the EOI marker, or `None` if the stream ends before it.
fn end_of_image(data: &[u8]) -> Option<usize> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != MARKER_SOI {
        return None;
    }

    let mut pos = 2;
    loop {
        if *data.get(pos)? != 0xFF {
            return None;
        }
        let marker = *data.get(pos + 1)?;
        match marker {
            0xFF => {
                pos += 1;
                continue;
            }
            MARKER_EOI => return Some(pos),
            MARKER_SOI | MARKER_TEM | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            _ => {}
        }

        let len = usize::from(read_u16(data, pos + 2, true)?);
        if len < 2 {
            return None;
        }
        pos += 2 + len;
        if pos > data.len() {
            return None;
        }
        if marker == MARKER_SOS {
            pos = skip_entropy_coded(data, pos)?;
        }
    }
}

/// Advance past scan data to the next real marker. Stuffed `FF 00`, restart
/// markers and fill bytes belong to the scan.
fn skip_entropy_coded(data: &[u8], mut pos: usize) -> Option<usize> {
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        match data[pos + 1] {
            0x00 | 0xD0..=0xD7 => pos += 2,
            0xFF => pos += 1,
            _ => return Some(pos),
        }
    }
    None
}

/// Walk the marker segments up to the start of scan looking for an APP1
/// EXIF block and read tag 0x0112 from IFD0.
pub fn exif_orientation(data: &[u8]) -> Option<u16> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != MARKER_SOI {
        return None;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        match marker {
            0xFF => {
                pos += 1;
                continue;
            }
            MARKER_SOI | MARKER_TEM | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            MARKER_SOS | MARKER_EOI => return None,
            _ => {}
        }

        let len = usize::from(read_u16(data, pos + 2, true)?);
        if len < 2 {
            return None;
        }
        let segment = data.get(pos + 4..pos + 2 + len)?;
        if marker == MARKER_APP1 && segment.starts_with(EXIF_HEADER) {
            return tiff_orientation(&segment[EXIF_HEADER.len()..]);
        }
        pos += 2 + len;
    }
    None
}

fn tiff_orientation(tiff: &[u8]) -> Option<u16> {
    let big_endian = match tiff.get(0..2)? {
        b"II" => false,
        b"MM" => true,
        _ => return None,
    };
    if read_u16(tiff, 2, big_endian)? != 42 {
        return None;
    }

    let ifd = read_u32(tiff, 4, big_endian)? as usize;
    let count = usize::from(read_u16(tiff, ifd, big_endian)?);
    for i in 0..count {
        let entry = ifd + 2 + i * 12;
        if read_u16(tiff, entry, big_endian)? == TAG_ORIENTATION {
            // SHORT value stored inline in the first two bytes of the value field.
            return read_u16(tiff, entry + 8, big_endian);
        }
    }
    None
}

fn read_u16(buf: &[u8], at: usize, big_endian: bool) -> Option<u16> {
    let bytes: [u8; 2] = buf.get(at..at + 2)?.try_into().ok()?;
    Some(if big_endian {
        u16::from_be_bytes(bytes)
    } else {
        u16::from_le_bytes(bytes)
    })
}

fn read_u32(buf: &[u8], at: usize, big_endian: bool) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
    Some(if big_endian {
        u32::from_be_bytes(bytes)
    } else {
        u32::from_le_bytes(bytes)
    })
}
