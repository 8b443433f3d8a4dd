// Length-delimited message framing over TCP.
//
// Wire format for `message.rs` envelopes: a 4-byte big-endian length prefix
// followed by the JSON payload. `write_message` and `read_message` work on
// raw bytes; JSON encoding is the caller's job, which keeps this module
// format-agnostic.
//
// `MAX_MESSAGE_SIZE` (1 MiB) bounds the allocation a malformed or hostile
// length prefix can trigger. The largest legitimate message is a full
// `gameState` snapshot of a ten-player session, a few KiB at most.

use std::io::{self, Read, Write};

/// Maximum allowed payload size in bytes.
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Write a length-delimited message: 4-byte big-endian length, then payload.
pub fn write_message<W: Write>(writer: &mut W, msg: &[u8]) -> io::Result<()> {
    let len = msg.len();
    if len > MAX_MESSAGE_SIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"),
        ));
    }
    #[expect(clippy::cast_possible_truncation)]
    let len_bytes = (len as u32).to_be_bytes();
    writer.write_all(&len_bytes)?;
    writer.write_all(msg)?;
    writer.flush()?;
    Ok(())
}

/// Read a length-delimited message: 4-byte big-endian length, then payload.
///
/// Returns `UnexpectedEof` if the stream closes before or during a message,
/// and `InvalidData` if the length prefix exceeds `MAX_MESSAGE_SIZE`.
pub fn read_message<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frames_are_read_back_in_order() {
        let messages: [&[u8]; 3] = [br#"{"type":"join"}"#, b"", br#"{"type":"vote"}"#];
        let mut buf = Vec::new();
        for msg in messages {
            write_message(&mut buf, msg).unwrap();
        }

        let mut cursor = Cursor::new(&buf);
        for expected in messages {
            assert_eq!(read_message(&mut cursor).unwrap(), expected);
        }
        let err = read_message(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn length_prefix_is_big_endian() {
        let mut buf = Vec::new();
        write_message(&mut buf, b"abc").unwrap();
        assert_eq!(&buf[..4], &[0, 0, 0, 3]);
        assert_eq!(&buf[4..], b"abc");
    }

    #[test]
    fn rejects_oversized_write() {
        let big = vec![0u8; MAX_MESSAGE_SIZE as usize + 1];
        let mut buf = Vec::new();
        let err = write_message(&mut buf, &big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_oversized_read() {
        let fake_len = (MAX_MESSAGE_SIZE + 1).to_be_bytes();
        let mut cursor = Cursor::new(fake_len.to_vec());
        let err = read_message(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_payload_is_eof() {
        let mut cursor = Cursor::new(vec![0u8, 0, 0, 10, b'x']);
        let err = read_message(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
