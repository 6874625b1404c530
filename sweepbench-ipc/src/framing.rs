//! Wire Frames
//!
//! Every message travels as a little-endian `u32` length followed by a
//! validated rkyv archive. The worker reads and writes frames with blocking
//! stdio; the harness drives the same frames through tokio pipes.
//!
//! ```text
//! +----------------+------------------+
//! | length (4 LE)  | rkyv payload     |
//! +----------------+------------------+
//! ```

use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{AlignedVec, Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{BufReader, BufWriter, Read, Write};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size (1 GiB). Frames carry whole input files.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024 * 1024;

const IO_BUFFER: usize = 64 * 1024;

/// Framing failures on either side of the pipe
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("End of stream")]
    EndOfStream,
}

fn encode<T>(message: &T) -> Result<AlignedVec, FrameError>
where
    T: Serialize<AllocSerializer<256>>,
{
    let bytes =
        rkyv::to_bytes::<_, 256>(message).map_err(|e| FrameError::Serialization(e.to_string()))?;

    if bytes.len() > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: bytes.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(bytes)
}

// EOF on the header means the peer closed the pipe between frames
fn header_error(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::EndOfStream
    } else {
        FrameError::Io(e)
    }
}

fn payload_buffer(len: usize) -> AlignedVec {
    let mut buf = AlignedVec::with_capacity(len);
    buf.resize(len, 0);
    buf
}

fn check_len(header: [u8; 4]) -> Result<usize, FrameError> {
    let len = u32::from_le_bytes(header) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    if len == 0 {
        return Err(FrameError::InvalidFrame("zero-length frame".to_string()));
    }

    Ok(len)
}

fn decode<T>(buf: &AlignedVec) -> Result<T, FrameError>
where
    T: Archive,
    T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    let archived = rkyv::check_archived_root::<T>(buf)
        .map_err(|e| FrameError::Deserialization(e.to_string()))?;

    archived
        .deserialize(&mut Infallible)
        .map_err(|_| FrameError::Deserialization("infallible deserializer failed".to_string()))
}

/// Write one frame and flush
pub fn write_frame<W, T>(writer: &mut BufWriter<W>, message: &T) -> Result<(), FrameError>
where
    W: Write,
    T: Serialize<AllocSerializer<256>>,
{
    let bytes = encode(message)?;

    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()?;

    Ok(())
}

/// Read one frame. A clean EOF before the header is [`FrameError::EndOfStream`].
pub fn read_frame<R, T>(reader: &mut BufReader<R>) -> Result<T, FrameError>
where
    R: Read,
    T: Archive,
    T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).map_err(header_error)?;

    let mut buf = payload_buffer(check_len(header)?);
    reader.read_exact(&mut buf)?;

    decode(&buf)
}

/// Async counterpart of [`write_frame`]
pub async fn write_frame_async<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize<AllocSerializer<256>>,
{
    let bytes = encode(message)?;

    writer.write_all(&(bytes.len() as u32).to_le_bytes()).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;

    Ok(())
}

/// Async counterpart of [`read_frame`]
pub async fn read_frame_async<R, T>(reader: &mut R) -> Result<T, FrameError>
where
    R: AsyncRead + Unpin,
    T: Archive,
    T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await.map_err(header_error)?;

    let mut buf = payload_buffer(check_len(header)?);
    reader.read_exact(&mut buf).await?;

    decode(&buf)
}

/// Buffered blocking frame sink
pub struct FrameWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> FrameWriter<W> {
    /// Wrap `writer` in a 64 KiB buffer
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(IO_BUFFER, writer),
        }
    }

    /// Send one message
    pub fn write<T>(&mut self, message: &T) -> Result<(), FrameError>
    where
        T: Serialize<AllocSerializer<256>>,
    {
        write_frame(&mut self.writer, message)
    }
}

/// Buffered blocking frame source
pub struct FrameReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Wrap `reader` in a 64 KiB buffer
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(IO_BUFFER, reader),
        }
    }

    /// Receive one message
    pub fn read<T>(&mut self) -> Result<T, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        read_frame(&mut self.reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallOutcome, HarnessCommand, Invocation, Operation, Payload, WorkerMessage};
    use std::io::Cursor;

    #[test]
    fn test_command_roundtrip() {
        let command = HarnessCommand::Invoke {
            call_id: 7,
            invocation: Invocation::new(
                Operation::Compress {
                    codec: "zstd".to_string(),
                },
                Some(3),
                Payload::new(b"hello world".to_vec()),
            ),
        };

        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            writer.write(&command).unwrap();
        }

        let mut reader = FrameReader::new(Cursor::new(buffer));
        let decoded: HarnessCommand = reader.read().unwrap();

        match decoded {
            HarnessCommand::Invoke {
                call_id,
                invocation,
            } => {
                assert_eq!(call_id, 7);
                assert_eq!(invocation.level, Some(3));
                assert_eq!(invocation.input.as_slice(), b"hello world");
                assert_eq!(invocation.operation.target(), "zstd");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_multiple_messages() {
        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            for call_id in 1..=3u64 {
                writer
                    .write(&WorkerMessage::Completed {
                        call_id,
                        outcome: CallOutcome {
                            elapsed_ms: call_id as f64 * 1.5,
                            output: None,
                        },
                    })
                    .unwrap();
            }
        }

        let mut reader = FrameReader::new(Cursor::new(buffer));
        for expected in 1..=3u64 {
            let decoded: WorkerMessage = reader.read().unwrap();
            match decoded {
                WorkerMessage::Completed { call_id, outcome } => {
                    assert_eq!(call_id, expected);
                    assert_eq!(outcome.elapsed_ms, expected as f64 * 1.5);
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    #[test]
    fn test_end_of_stream() {
        let buffer: Vec<u8> = Vec::new();
        let mut reader = FrameReader::new(Cursor::new(buffer));
        let result: Result<HarnessCommand, _> = reader.read();
        assert!(matches!(result, Err(FrameError::EndOfStream)));
    }

    #[test]
    fn test_zero_length_frame_rejected() {
        let buffer = 0u32.to_le_bytes().to_vec();
        let mut reader = FrameReader::new(Cursor::new(buffer));
        let result: Result<HarnessCommand, _> = reader.read();
        assert!(matches!(result, Err(FrameError::InvalidFrame(_))));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let buffer = ((MAX_FRAME_SIZE as u32) + 1).to_le_bytes().to_vec();
        let mut reader = FrameReader::new(Cursor::new(buffer));
        let result: Result<HarnessCommand, _> = reader.read();
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_async_frames_interoperate_with_sync() {
        // Async writer, sync reader
        let mut bytes = Vec::new();
        write_frame_async(&mut bytes, &HarnessCommand::Shutdown)
            .await
            .unwrap();
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let decoded: HarnessCommand = reader.read().unwrap();
        assert!(matches!(decoded, HarnessCommand::Shutdown));

        // Sync writer, async reader over a duplex pipe
        let mut sync_bytes = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut sync_bytes);
            writer
                .write(&WorkerMessage::Completed {
                    call_id: 1,
                    outcome: CallOutcome {
                        elapsed_ms: 2.0,
                        output: Some(Payload::new(vec![9; 16])),
                    },
                })
                .unwrap();
        }
        let (mut tx, mut rx) = tokio::io::duplex(1024);
        tx.write_all(&sync_bytes).await.unwrap();
        drop(tx);

        let decoded: WorkerMessage = read_frame_async(&mut rx).await.unwrap();
        match decoded {
            WorkerMessage::Completed { outcome, .. } => {
                assert_eq!(outcome.output.map(|p| p.len()), Some(16));
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let eof: Result<WorkerMessage, _> = read_frame_async(&mut rx).await;
        assert!(matches!(eof, Err(FrameError::EndOfStream)));
    }
}
