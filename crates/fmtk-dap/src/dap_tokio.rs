//! Async DAP framing (`Content-Length` headers + JSON bodies).

use std::io;

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::protocol::Request;

pub const MAX_DAP_MESSAGE_BYTES: usize = 16 * 1024 * 1024; // 16 MiB
pub const MAX_DAP_HEADER_LINE_BYTES: usize = 8 * 1024; // 8 KiB

#[derive(Debug, Error)]
pub enum DapError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("dap protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, DapError>;

pub struct DapReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> DapReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
        }
    }

    /// Read one header line, refusing lines longer than
    /// [`MAX_DAP_HEADER_LINE_BYTES`]. `None` on a clean EOF.
    async fn read_header_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if buf.is_empty() {
                    return Ok(None);
                }
                break;
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let take = newline.map_or(available.len(), |pos| pos + 1);
            if buf.len() + take > MAX_DAP_HEADER_LINE_BYTES {
                return Err(DapError::Protocol(format!(
                    "header line exceeds maximum size ({MAX_DAP_HEADER_LINE_BYTES} bytes)"
                )));
            }
            buf.extend_from_slice(&available[..take]);
            self.reader.consume(take);
            if newline.is_some() {
                break;
            }
        }

        String::from_utf8(buf)
            .map(Some)
            .map_err(|_| DapError::Protocol("header line is not UTF-8".to_string()))
    }

    pub async fn read_value(&mut self) -> Result<Option<Value>> {
        let mut content_length: Option<usize> = None;
        let mut saw_header = false;

        loop {
            let Some(line) = self.read_header_line().await? else {
                if !saw_header {
                    return Ok(None);
                }
                return Err(DapError::Protocol("EOF while reading headers".to_string()));
            };
            saw_header = true;

            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }

            let Some((name, value)) = trimmed.split_once(':') else {
                continue;
            };

            if name.eq_ignore_ascii_case("Content-Length") {
                let value = value.trim();
                content_length = Some(value.parse::<usize>().map_err(|e| {
                    DapError::Protocol(format!("invalid Content-Length {value:?}: {e}"))
                })?);
            }
        }

        let Some(len) = content_length else {
            return Err(DapError::Protocol("missing Content-Length header".to_string()));
        };
        if len > MAX_DAP_MESSAGE_BYTES {
            return Err(DapError::Protocol(format!(
                "Content-Length {len} exceeds maximum allowed size {MAX_DAP_MESSAGE_BYTES}"
            )));
        }

        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).await?;
        Ok(Some(serde_json::from_slice::<Value>(&buf)?))
    }

    /// Next editor request. Responses and events from the editor (the adapter
    /// never sends reverse requests) are skipped.
    pub async fn read_request(&mut self) -> Result<Option<Request>> {
        loop {
            let Some(value) = self.read_value().await? else {
                return Ok(None);
            };
            match value.get("type").and_then(Value::as_str) {
                Some("request") => return Ok(Some(serde_json::from_value::<Request>(value)?)),
                other => debug!(kind = ?other, "ignoring non-request message"),
            }
        }
    }
}

pub struct DapWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> DapWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_value(&mut self, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.writer
            .write_all(format!("Content-Length: {}\r\n\r\n", bytes.len()).as_bytes())
            .await?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
