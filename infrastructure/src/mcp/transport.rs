//! Framed byte transport for MCP stdio servers.
//!
//! A [`Transport`] moves whole frames over a pair of byte streams, usually
//! a child's stdout/stdin. It knows nothing about JSON-RPC; the session
//! parses frame bodies.
//!
//! Two framings are supported, chosen per server:
//!
//! | Framing | Wire format |
//! |---------|-------------|
//! | [`Framing::NewlineDelimited`] | one JSON object per `\n`-terminated line |
//! | [`Framing::ContentLength`] | `Content-Length: N\r\n\r\n` followed by `N` bytes |

use crate::mcp::error::TransportError;
use crate::mcp::supervisor::ProcessGuard;
use serde::{Deserialize, Serialize};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};
use tracing::trace;

/// Largest frame body accepted from a server (16 MiB).
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Longest `Content-Length` header line accepted.
const MAX_HEADER_LINE: u64 = 8 * 1024;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Frame delimiting scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    #[default]
    #[serde(alias = "newline", alias = "ndjson", alias = "newline_delimited")]
    NewlineDelimited,
    #[serde(alias = "content_length", alias = "lsp")]
    ContentLength,
}

impl std::fmt::Display for Framing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Framing::NewlineDelimited => write!(f, "newline-delimited"),
            Framing::ContentLength => write!(f, "content-length"),
        }
    }
}

/// Read half of a transport.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    framing: Framing,
    max_frame: usize,
    line: String,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, framing: Framing) -> Self {
        Self {
            inner: BufReader::new(reader),
            framing,
            max_frame: MAX_FRAME_BYTES,
            line: String::new(),
        }
    }

    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// Suspend until one complete frame is available and return its body.
    pub async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let body = match self.framing {
            Framing::NewlineDelimited => self.receive_line().await?,
            Framing::ContentLength => self.receive_content_length().await?,
        };
        trace!("Transport received {} bytes", body.len());
        Ok(body)
    }

    /// Lines are accumulated chunk by chunk so an unterminated line fails
    /// as soon as it outgrows `max_frame`, instead of buffering without
    /// bound.
    async fn receive_line(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut buf = Vec::new();
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Err(TransportError::UnexpectedEof);
            }
            let newline = available.iter().position(|&b| b == b'\n');
            let used = newline.map_or(available.len(), |i| i + 1);
            buf.extend_from_slice(&available[..used]);
            self.inner.consume(used);

            if newline.is_none() {
                // Allow for a trailing '\r' still to be stripped.
                if buf.len() > self.max_frame.saturating_add(1) {
                    return Err(TransportError::FrameTooLarge {
                        size: buf.len(),
                        limit: self.max_frame,
                    });
                }
                continue;
            }

            while matches!(buf.last(), Some(b'\n' | b'\r')) {
                buf.pop();
            }
            if buf.iter().all(|b| b.is_ascii_whitespace()) {
                buf.clear();
                continue;
            }
            if buf.len() > self.max_frame {
                return Err(TransportError::FrameTooLarge {
                    size: buf.len(),
                    limit: self.max_frame,
                });
            }
            return Ok(buf);
        }
    }

    async fn receive_content_length(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut content_length: Option<usize> = None;
        let mut saw_header = false;

        loop {
            self.line.clear();
            let n = (&mut self.inner)
                .take(MAX_HEADER_LINE)
                .read_line(&mut self.line)
                .await?;
            if n == 0 {
                return Err(TransportError::UnexpectedEof);
            }
            if !self.line.ends_with('\n') && n as u64 == MAX_HEADER_LINE {
                return Err(TransportError::InvalidHeader(format!(
                    "header line longer than {MAX_HEADER_LINE} bytes"
                )));
            }
            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                if saw_header {
                    break;
                }
                // Blank lines between frames
                continue;
            }
            saw_header = true;

            let Some((name, value)) = trimmed.split_once(':') else {
                return Err(TransportError::InvalidHeader(trimmed.to_string()));
            };
            if name.trim().eq_ignore_ascii_case("content-length") {
                let len = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| TransportError::InvalidHeader(trimmed.to_string()))?;
                content_length = Some(len);
            }
        }

        let len = content_length
            .ok_or_else(|| TransportError::InvalidHeader("missing Content-Length".into()))?;
        if len > self.max_frame {
            return Err(TransportError::FrameTooLarge {
                size: len,
                limit: self.max_frame,
            });
        }

        let mut body = vec![0u8; len];
        self.inner.read_exact(&mut body).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TransportError::UnexpectedEof
            } else {
                TransportError::Io(e)
            }
        })?;
        Ok(body)
    }
}

/// Write half of a transport.
pub struct FrameWriter<W> {
    inner: BufWriter<W>,
    framing: Framing,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W, framing: Framing) -> Self {
        Self {
            inner: BufWriter::new(writer),
            framing,
        }
    }

    /// Write one complete frame and flush it.
    pub async fn send(&mut self, body: &[u8]) -> Result<(), TransportError> {
        match self.framing {
            Framing::NewlineDelimited => {
                if body.contains(&b'\n') {
                    return Err(TransportError::InvalidHeader(
                        "newline-delimited frame body contains a newline".into(),
                    ));
                }
                self.inner.write_all(body).await?;
                self.inner.write_all(b"\n").await?;
            }
            Framing::ContentLength => {
                let header = format!("Content-Length: {}\r\n\r\n", body.len());
                self.inner.write_all(header.as_bytes()).await?;
                self.inner.write_all(body).await?;
            }
        }
        self.inner.flush().await?;
        trace!("Transport sent {} bytes", body.len());
        Ok(())
    }

    /// Flush and close the stream, signalling EOF to the peer.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner.flush().await?;
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// A bidirectional frame transport, optionally owning the server process.
///
/// Dropping the transport (or the parts taken from it) drops the process
/// guard, which kills the child if it is still running.
pub struct Transport {
    reader: FrameReader<BoxedReader>,
    writer: FrameWriter<BoxedWriter>,
    process: Option<ProcessGuard>,
}

impl Transport {
    pub fn new<R, W>(reader: R, writer: W, framing: Framing) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: FrameReader::new(Box::new(reader) as BoxedReader, framing),
            writer: FrameWriter::new(Box::new(writer) as BoxedWriter, framing),
            process: None,
        }
    }

    pub fn with_process(mut self, guard: ProcessGuard) -> Self {
        self.process = Some(guard);
        self
    }

    pub fn process(&self) -> Option<&ProcessGuard> {
        self.process.as_ref()
    }

    pub async fn send(&mut self, body: &[u8]) -> Result<(), TransportError> {
        self.writer.send(body).await
    }

    pub async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        self.reader.receive().await
    }

    /// Close the write side and release the process guard.
    pub async fn close(mut self) -> Result<(), TransportError> {
        let result = self.writer.shutdown().await;
        drop(self.process.take());
        result
    }

    pub fn into_parts(
        self,
    ) -> (
        FrameReader<BoxedReader>,
        FrameWriter<BoxedWriter>,
        Option<ProcessGuard>,
    ) {
        (self.reader, self.writer, self.process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;

    fn pair(framing: Framing) -> (Transport, Transport) {
        let (a, b) = duplex(4096);
        let (ar, aw) = tokio::io::split(a);
        let (br, bw) = tokio::io::split(b);
        (
            Transport::new(ar, aw, framing),
            Transport::new(br, bw, framing),
        )
    }

    #[tokio::test]
    async fn test_newline_frames_round_trip() {
        let (mut client, mut server) = pair(Framing::NewlineDelimited);
        client.send(br#"{"a":1}"#).await.unwrap();
        client.send(br#"{"b":2}"#).await.unwrap();
        assert_eq!(server.receive().await.unwrap(), br#"{"a":1}"#);
        assert_eq!(server.receive().await.unwrap(), br#"{"b":2}"#);
    }

    #[tokio::test]
    async fn test_content_length_frames_round_trip() {
        let (mut client, mut server) = pair(Framing::ContentLength);
        client.send("{\"text\":\"line\\nbreak\"}".as_bytes()).await.unwrap();
        assert_eq!(
            server.receive().await.unwrap(),
            "{\"text\":\"line\\nbreak\"}".as_bytes()
        );
    }

    #[tokio::test]
    async fn test_partial_writes_are_reassembled() {
        let (a, b) = duplex(8);
        let mut reader = FrameReader::new(b, Framing::ContentLength);
        let writer = tokio::spawn(async move {
            let mut a = a;
            let chunks: [&[u8]; 4] = [b"Content-Len", b"gth: 11\r\n", b"\r\n{\"ok\":", b"true}"];
            for chunk in chunks {
                a.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
            a
        });
        assert_eq!(reader.receive().await.unwrap(), br#"{"ok":true}"#);
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_crlf_and_blank_lines_skipped() {
        let (mut a, b) = duplex(1024);
        let mut reader = FrameReader::new(b, Framing::NewlineDelimited);
        a.write_all(b"\r\n\n{\"x\":1}\r\n").await.unwrap();
        assert_eq!(reader.receive().await.unwrap(), br#"{"x":1}"#);
    }

    #[tokio::test]
    async fn test_eof_mid_frame() {
        let (mut a, b) = duplex(1024);
        let mut reader = FrameReader::new(b, Framing::NewlineDelimited);
        a.write_all(br#"{"partial":"#).await.unwrap();
        drop(a);
        assert!(matches!(
            reader.receive().await,
            Err(TransportError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_eof_inside_content_length_body() {
        let (mut a, b) = duplex(1024);
        let mut reader = FrameReader::new(b, Framing::ContentLength);
        a.write_all(b"Content-Length: 50\r\n\r\n{\"short\":true}").await.unwrap();
        drop(a);
        assert!(matches!(
            reader.receive().await,
            Err(TransportError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_oversize_frame_rejected() {
        let (mut a, b) = duplex(1024);
        let mut reader = FrameReader::new(b, Framing::ContentLength).with_max_frame(10);
        a.write_all(b"Content-Length: 11\r\n\r\n").await.unwrap();
        assert!(matches!(
            reader.receive().await,
            Err(TransportError::FrameTooLarge { size: 11, limit: 10 })
        ));
    }

    #[tokio::test]
    async fn test_unterminated_line_over_limit_rejected() {
        let (mut a, b) = duplex(64 * 1024);
        let mut reader = FrameReader::new(b, Framing::NewlineDelimited).with_max_frame(10);
        a.write_all(&vec![b'x'; 32 * 1024]).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), reader.receive())
            .await
            .expect("reader must give up without waiting for a newline");
        assert!(matches!(
            result,
            Err(TransportError::FrameTooLarge { limit: 10, .. })
        ));
        drop(a);
    }

    #[tokio::test]
    async fn test_line_at_limit_with_crlf_accepted() {
        let (mut a, b) = duplex(1024);
        let mut reader = FrameReader::new(b, Framing::NewlineDelimited).with_max_frame(7);
        a.write_all(b"{\"x\":1}\r\n").await.unwrap();
        assert_eq!(reader.receive().await.unwrap(), br#"{"x":1}"#);
    }

    #[tokio::test]
    async fn test_endless_header_line_rejected() {
        let (mut a, b) = duplex(64 * 1024);
        let mut reader = FrameReader::new(b, Framing::ContentLength);
        a.write_all(&vec![b'X'; 16 * 1024]).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), reader.receive())
            .await
            .expect("header read must be bounded");
        assert!(matches!(result, Err(TransportError::InvalidHeader(_))));
        drop(a);
    }

    #[tokio::test]
    async fn test_close_signals_eof() {
        let (client, mut server) = pair(Framing::NewlineDelimited);
        client.close().await.unwrap();
        assert!(matches!(
            server.receive().await,
            Err(TransportError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_framing_parses_from_config_spellings() {
        let f: Framing = serde_json::from_str("\"content-length\"").unwrap();
        assert_eq!(f, Framing::ContentLength);
        let f: Framing = serde_json::from_str("\"ndjson\"").unwrap();
        assert_eq!(f, Framing::NewlineDelimited);
    }
}
