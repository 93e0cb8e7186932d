use std::fs::File;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use ndarray::Array2;

use crate::error::{HeliographError, Result};

pub const SER_HEADER_SIZE: usize = 178;
const SER_MAGIC: &[u8; 14] = b"LUCAM-RECORDER";

/// SER file header (178 bytes).
#[derive(Clone, Debug)]
pub struct SerHeader {
    pub color_id: i32,
    pub little_endian: bool,
    pub width: u32,
    pub height: u32,
    pub pixel_depth: u32,
    pub frame_count: u32,
    pub observer: String,
    pub instrument: String,
    pub telescope: String,
    pub date_time: u64,
    pub date_time_utc: u64,
}

impl SerHeader {
    /// Bytes per sample (1 for 8-bit, 2 for 9-16 bit).
    pub fn bytes_per_sample(&self) -> usize {
        if self.pixel_depth <= 8 { 1 } else { 2 }
    }

    /// Total bytes per frame.
    pub fn frame_byte_size(&self) -> usize {
        let pixels = (self.width as usize)
            .checked_mul(self.height as usize)
            .expect("Image dimensions too large");
        pixels
            .checked_mul(self.bytes_per_sample())
            .expect("Frame size calculation overflow")
    }
}

/// Memory-mapped SER file reader.
pub struct SerReader {
    mmap: Mmap,
    pub header: SerHeader,
}

impl SerReader {
    /// Open a SER file and parse its header.
    ///
    /// Spectrograph scans are single-plane; color SER files are rejected.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < SER_HEADER_SIZE {
            return Err(HeliographError::InvalidSer(
                "File too small for SER header".into(),
            ));
        }

        if &mmap[0..14] != SER_MAGIC {
            return Err(HeliographError::InvalidSer(
                "Missing LUCAM-RECORDER magic".into(),
            ));
        }

        let header = parse_header(&mmap[..SER_HEADER_SIZE])?;

        if matches!(header.color_id, 100 | 101) {
            return Err(HeliographError::InvalidSer(format!(
                "Color SER (ColorID {}) is not a slit-scan recording",
                header.color_id
            )));
        }

        let expected_data_size =
            SER_HEADER_SIZE + header.frame_byte_size() * header.frame_count as usize;
        if mmap.len() < expected_data_size {
            return Err(HeliographError::InvalidSer(format!(
                "File truncated: expected at least {} bytes, got {}",
                expected_data_size,
                mmap.len()
            )));
        }

        Ok(Self { mmap, header })
    }

    pub fn frame_count(&self) -> usize {
        self.header.frame_count as usize
    }

    /// Raw bytes for a single frame (zero-copy from mmap).
    pub fn frame_raw(&self, index: usize) -> Result<&[u8]> {
        let count = self.frame_count();
        if index >= count {
            return Err(HeliographError::FrameIndexOutOfRange {
                index,
                total: count,
            });
        }
        let offset = SER_HEADER_SIZE + index * self.header.frame_byte_size();
        let end = offset + self.header.frame_byte_size();
        Ok(&self.mmap[offset..end])
    }
}

fn parse_header(buf: &[u8]) -> Result<SerHeader> {
    let mut cursor = std::io::Cursor::new(&buf[14..]); // skip magic

    let _lu_id = cursor.read_i32::<LittleEndian>()?;
    let color_id = cursor.read_i32::<LittleEndian>()?;
    let le_flag = cursor.read_i32::<LittleEndian>()?;
    let width = cursor.read_i32::<LittleEndian>()? as u32;
    let height = cursor.read_i32::<LittleEndian>()? as u32;
    let pixel_depth = cursor.read_i32::<LittleEndian>()? as u32;
    let frame_count = cursor.read_i32::<LittleEndian>()? as u32;

    let observer = read_fixed_string(&buf[42..82]);
    let instrument = read_fixed_string(&buf[82..122]);
    let telescope = read_fixed_string(&buf[122..162]);

    let mut cursor = std::io::Cursor::new(&buf[162..]);
    let date_time = cursor.read_u64::<LittleEndian>()?;
    let date_time_utc = cursor.read_u64::<LittleEndian>()?;

    if width == 0 || height == 0 {
        return Err(HeliographError::InvalidDimensions { width, height });
    }

    // SER spec: LittleEndian field = 0 means big-endian pixel data,
    // but many writers (including FireCapture) use 0 for little-endian.
    // Follow Siril's convention: treat 0 as little-endian.
    let little_endian = le_flag != 1;

    Ok(SerHeader {
        color_id,
        little_endian,
        width,
        height,
        pixel_depth,
        frame_count,
        observer,
        instrument,
        telescope,
        date_time,
        date_time_utc,
    })
}

fn read_fixed_string(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

/// Read-only u16 view over the scan's frame sequence.
///
/// Frames are normalized so that rows are always the spectral axis:
/// when the camera recorded the spectrum horizontally (width > height),
/// each frame is transposed and flipped. 8-bit data is scaled by 256
/// onto the 16-bit range so every downstream threshold works unchanged.
pub struct FrameSequence {
    reader: SerReader,
    rotated: bool,
}

impl FrameSequence {
    pub fn new(reader: SerReader) -> Result<Self> {
        if reader.frame_count() == 0 {
            return Err(HeliographError::EmptySequence);
        }
        let rotated = reader.header.width > reader.header.height;
        Ok(Self { reader, rotated })
    }

    pub fn open(path: &Path) -> Result<Self> {
        Self::new(SerReader::open(path)?)
    }

    pub fn header(&self) -> &SerHeader {
        &self.reader.header
    }

    pub fn frame_count(&self) -> usize {
        self.reader.frame_count()
    }

    /// Height of a normalized frame (spectral axis).
    pub fn height(&self) -> usize {
        if self.rotated {
            self.reader.header.width as usize
        } else {
            self.reader.header.height as usize
        }
    }

    /// Width of a normalized frame (dispersion axis).
    pub fn width(&self) -> usize {
        if self.rotated {
            self.reader.header.height as usize
        } else {
            self.reader.header.width as usize
        }
    }

    pub fn bit_depth(&self) -> u32 {
        self.reader.header.pixel_depth
    }

    /// Long camera dimension, used by the partial-disk check.
    pub fn sensor_height(&self) -> usize {
        (self.reader.header.width.max(self.reader.header.height)) as usize
    }

    /// Decode one frame to a normalized u16 array.
    pub fn frame(&self, index: usize) -> Result<Array2<u16>> {
        let raw = self.reader.frame_raw(index)?;
        let h = self.reader.header.height as usize;
        let w = self.reader.header.width as usize;
        let bps = self.reader.header.bytes_per_sample();
        let le = self.reader.header.little_endian;

        let mut data = Array2::<u16>::zeros((h, w));
        for row in 0..h {
            for col in 0..w {
                let idx = (row * w + col) * bps;
                let val = if bps == 1 {
                    // scale 8-bit acquisitions onto the 16-bit range
                    (raw[idx] as u16) << 8
                } else {
                    let pair = [raw[idx], raw[idx + 1]];
                    if le {
                        u16::from_le_bytes(pair)
                    } else {
                        u16::from_be_bytes(pair)
                    }
                };
                data[[row, col]] = val;
            }
        }

        if self.rotated {
            // transpose, then flip rows: the spectrum ends up vertical
            // with the same handedness as a native vertical recording
            let t = data.t().as_standard_layout().into_owned();
            let mut flipped = Array2::<u16>::zeros((w, h));
            for row in 0..w {
                for col in 0..h {
                    flipped[[row, col]] = t[[w - 1 - row, col]];
                }
            }
            Ok(flipped)
        } else {
            Ok(data)
        }
    }

    /// Iterator over all frames.
    pub fn frames(&self) -> impl Iterator<Item = Result<Array2<u16>>> + '_ {
        (0..self.frame_count()).map(move |i| self.frame(i))
    }
}
