use heliograph_core::io::ser::SER_HEADER_SIZE;

/// Build a SER file header for mono frames.
///
/// Returns a `Vec<u8>` containing just the 178-byte header.
/// Append frame pixel data after calling this function.
pub fn build_ser_header(width: u32, height: u32, bit_depth: u32, num_frames: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SER_HEADER_SIZE);

    // Magic (14 bytes)
    buf.extend_from_slice(b"LUCAM-RECORDER");
    // LuID (4 bytes)
    buf.extend_from_slice(&0i32.to_le_bytes());
    // ColorID = MONO (4 bytes)
    buf.extend_from_slice(&0i32.to_le_bytes());
    // LittleEndian = 0 (little-endian per Siril convention)
    buf.extend_from_slice(&0i32.to_le_bytes());
    // Width
    buf.extend_from_slice(&(width as i32).to_le_bytes());
    // Height
    buf.extend_from_slice(&(height as i32).to_le_bytes());
    // PixelDepth
    buf.extend_from_slice(&(bit_depth as i32).to_le_bytes());
    // FrameCount
    buf.extend_from_slice(&(num_frames as i32).to_le_bytes());
    // Observer, Instrument, Telescope (40 bytes each)
    buf.extend_from_slice(&[0u8; 40]);
    buf.extend_from_slice(&[0u8; 40]);
    buf.extend_from_slice(&[0u8; 40]);
    // DateTime + DateTimeUTC (8 bytes each)
    buf.extend_from_slice(&0u64.to_le_bytes());
    buf.extend_from_slice(&0u64.to_le_bytes());

    assert_eq!(buf.len(), SER_HEADER_SIZE);
    buf
}

/// Build a complete synthetic mono 16-bit SER file from u16 frames,
/// each given in row-major order.
pub fn build_ser_u16(width: u32, height: u32, frames: &[Vec<u16>]) -> Vec<u8> {
    let mut buf = build_ser_header(width, height, 16, frames.len());
    for frame in frames {
        assert_eq!(frame.len(), (width * height) as usize);
        for &v in frame {
            buf.extend_from_slice(&v.to_le_bytes());
        }
    }
    buf
}

/// Write a SER buffer to a temporary file and return the temp file handle.
///
/// The file stays alive as long as the returned `NamedTempFile` is not
/// dropped.
pub fn write_test_ser(data: &[u8]) -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut f = tempfile::NamedTempFile::new().expect("create temp file");
    f.write_all(data).expect("write SER data");
    f.flush().expect("flush");
    f
}
