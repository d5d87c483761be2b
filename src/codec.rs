//! Newline-delimited JSON framing
//!
//! One envelope per line. serde_json escapes control characters inside
//! strings, so an encoded frame never contains a raw newline before its
//! terminator regardless of payload content.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::AppError;
use crate::message::Envelope;

/// Default upper bound for a single incoming frame, newline included
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Serialize an envelope into a single newline-terminated frame
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, AppError> {
    let mut frame = serde_json::to_vec(envelope)?;
    frame.push(b'\n');
    Ok(frame)
}

/// Encode and write one frame, flushing afterwards
pub async fn write_frame<W>(writer: &mut W, envelope: &Envelope) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(envelope)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads envelopes from a buffered byte stream
pub struct FrameReader<R> {
    reader: R,
    max_frame_bytes: usize,
    buf: Vec<u8>,
}

impl<R> FrameReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            reader,
            max_frame_bytes,
            buf: Vec::new(),
        }
    }

    /// Read the next frame and parse it
    ///
    /// EOF (clean or mid-frame) and I/O failures yield connection errors;
    /// oversized or unparsable frames yield protocol errors.
    pub async fn decode(&mut self) -> Result<Envelope, AppError> {
        self.buf.clear();

        let limit = self.max_frame_bytes as u64;
        let read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.buf)
            .await?;

        if read == 0 {
            return Err(AppError::ConnectionClosed);
        }

        if self.buf.last() != Some(&b'\n') {
            if self.buf.len() >= self.max_frame_bytes {
                return Err(AppError::Protocol(format!(
                    "frame exceeds {} bytes",
                    self.max_frame_bytes
                )));
            }
            return Err(AppError::Connection(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended inside a frame",
            )));
        }

        serde_json::from_slice(&self.buf)
            .map_err(|e| AppError::Protocol(format!("malformed frame: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use tokio::io::BufReader;
    use tokio_test::io::Builder;

    #[test]
    fn test_encode_is_single_line() {
        let msg = Envelope::new(MessageKind::SendVoice, "line1\nline2\r\n", "a.txt");
        let frame = encode(&msg).unwrap();
        assert_eq!(frame.iter().filter(|b| **b == b'\n').count(), 1);
        assert_eq!(frame.last(), Some(&b'\n'));
    }

    #[tokio::test]
    async fn test_round_trip_special_characters() {
        let msg = Envelope::new(
            MessageKind::SendVoice,
            "{\"quoted\": \"x\"}\n\\back\tslash \u{0} ünïcødé",
            "we|ird\"name.mp3",
        );
        let frame = encode(&msg).unwrap();
        let mock = Builder::new().read(&frame).build();
        let mut reader = FrameReader::new(BufReader::new(mock), DEFAULT_MAX_FRAME_BYTES);
        assert_eq!(reader.decode().await.unwrap(), msg);
    }

    #[tokio::test]
    async fn test_decode_frames_split_across_reads() {
        let mock = Builder::new()
            .read(b"{\"msg_type\":3,\"da")
            .read(b"ta\":\"alice\",\"meta_data\":\"\"}\n{\"msg_type\":2,")
            .read(b"\"data\":\"\",\"meta_data\":\"\"}\n")
            .build();
        let mut reader = FrameReader::new(BufReader::new(mock), DEFAULT_MAX_FRAME_BYTES);

        let first = reader.decode().await.unwrap();
        assert_eq!(first, Envelope::new(MessageKind::SetName, "alice", ""));
        let second = reader.decode().await.unwrap();
        assert_eq!(second.kind, MessageKind::GetUsers);
    }

    #[tokio::test]
    async fn test_decode_tolerates_crlf() {
        let mock = Builder::new()
            .read(b"{\"msg_type\":2,\"data\":\"\",\"meta_data\":\"\"}\r\n")
            .build();
        let mut reader = FrameReader::new(BufReader::new(mock), DEFAULT_MAX_FRAME_BYTES);
        assert_eq!(reader.decode().await.unwrap().kind, MessageKind::GetUsers);
    }

    #[tokio::test]
    async fn test_decode_clean_eof() {
        let mock = Builder::new().build();
        let mut reader = FrameReader::new(BufReader::new(mock), DEFAULT_MAX_FRAME_BYTES);
        assert!(matches!(reader.decode().await, Err(AppError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_decode_truncated_frame_is_connection_error() {
        let mock = Builder::new().read(b"{\"msg_type\":2,").build();
        let mut reader = FrameReader::new(BufReader::new(mock), DEFAULT_MAX_FRAME_BYTES);
        assert!(matches!(reader.decode().await, Err(AppError::Connection(_))));
    }

    #[tokio::test]
    async fn test_decode_malformed_json() {
        let mock = Builder::new().read(b"not json at all\n").build();
        let mut reader = FrameReader::new(BufReader::new(mock), DEFAULT_MAX_FRAME_BYTES);
        assert!(matches!(reader.decode().await, Err(AppError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_decode_wrong_shape() {
        let mock = Builder::new().read(b"{\"msg_type\":\"SendText\"}\n").build();
        let mut reader = FrameReader::new(BufReader::new(mock), DEFAULT_MAX_FRAME_BYTES);
        assert!(matches!(reader.decode().await, Err(AppError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_decode_oversized_frame() {
        let mock = Builder::new().read(&[b'a'; 64]).build();
        let mut reader = FrameReader::new(BufReader::new(mock), 16);
        assert!(matches!(reader.decode().await, Err(AppError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_write_frame() {
        let msg = Envelope::text("ok");
        let mock = Builder::new()
            .write(b"{\"msg_type\":1,\"data\":\"ok\",\"meta_data\":\"\"}\n")
            .build();
        let mut writer = mock;
        write_frame(&mut writer, &msg).await.unwrap();
    }
}
