//! Background draining of a child's output pipe into a [`StreamBuffer`].

use crate::buffer::StreamBuffer;
use runproc_common::HostId;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Read size for each drain iteration.
pub const DRAIN_CHUNK_SIZE: usize = 8192;

/// Spawn a task that copies `reader` into `buffer` until the reader reaches
/// end of file or fails.
///
/// Either way the buffer is marked complete: a closed pipe is the expected end
/// of a child's output, and a read error is treated the same. The task yields
/// the number of bytes drained.
pub fn spawn_drain<R>(reader: R, buffer: StreamBuffer, host: HostId) -> JoinHandle<u64>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(drain(reader, buffer, host))
}

async fn drain<R>(mut reader: R, buffer: StreamBuffer, host: HostId) -> u64
where
    R: AsyncRead + Unpin,
{
    let stream = buffer.stream_type();
    debug!(host = %host, stream = %stream, "Stream drain started");

    let mut chunk = vec![0u8; DRAIN_CHUNK_SIZE];
    let mut total: u64 = 0;

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                debug!(host = %host, stream = %stream, "Stream ended");
                break;
            }
            Ok(n) => {
                buffer.append(&chunk[..n]);
                total += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(
                    host = %host,
                    stream = %stream,
                    error = %e,
                    "Error reading from stream, treating as end of stream"
                );
                break;
            }
        }
    }

    buffer.mark_complete();
    debug!(host = %host, stream = %stream, bytes = total, "Stream drain finished");
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreamType;
    use runproc_common::TextEncoding;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_drain_reads_until_eof() {
        let buffer = StreamBuffer::new(StreamType::Stdout);
        let reader = std::io::Cursor::new(b"line one\nline two\n".to_vec());

        let total = spawn_drain(reader, buffer.clone(), HostId::from("test"))
            .await
            .unwrap();

        assert_eq!(total, 18);
        assert!(buffer.is_complete());
        assert_eq!(
            buffer.read_all_text(TextEncoding::Utf8).unwrap(),
            "line one\nline two\n"
        );
    }

    #[tokio::test]
    async fn test_drain_preserves_chunk_order() {
        let (mut writer, reader) = tokio::io::duplex(16);
        let buffer = StreamBuffer::new(StreamType::Stderr);
        let task = spawn_drain(reader, buffer.clone(), HostId::from("test"));

        for i in 0..20 {
            writer.write_all(format!("{};", i).as_bytes()).await.unwrap();
        }
        drop(writer);

        task.await.unwrap();
        let expected: String = (0..20).map(|i| format!("{};", i)).collect();
        assert_eq!(buffer.read_all_text(TextEncoding::Utf8).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_buffer_observes_partial_output_before_eof() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let buffer = StreamBuffer::new(StreamType::Stdout);
        let _task = spawn_drain(reader, buffer.clone(), HostId::from("test"));

        writer.write_all(b"ready>").await.unwrap();
        let mut changes = buffer.changes();
        while buffer.len() < 6 {
            tokio::time::timeout(Duration::from_secs(5), changes.changed())
                .await
                .expect("append notification")
                .unwrap();
        }

        assert!(!buffer.is_complete());
        assert_eq!(buffer.read_all_text(TextEncoding::Utf8).unwrap(), "ready>");
    }
}
