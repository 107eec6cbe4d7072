//! Length-delimited framing over a byte stream.
//!
//! One frame carries one logical message. The prefix is a big-endian `u32`
//! byte count, which keeps message boundaries intact across TCP's stream
//! semantics without any escaping.

use std::io::{self, Read, Write};

/// Upper bound on a single frame, large enough for any serialized circuit
/// or result document.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Write one frame.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame of {} bytes exceeds the frame limit", payload.len()),
            )
        })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Read one frame, blocking until it is complete.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("incoming frame of {len} bytes exceeds the frame limit"),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}
