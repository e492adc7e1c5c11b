//! `Content-Length` framing for JSON-RPC over byte streams

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::session::SessionError;

const CONTENT_LENGTH: &str = "content-length";

/// Reads one framed message. Returns `Ok(None)` on a clean EOF between messages.
pub async fn read_message<R>(reader: &mut R, buf: &mut String) -> Result<Option<Value>, SessionError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    loop {
        buf.clear();
        let bytes_read = reader.read_line(buf).await?;
        if bytes_read == 0 {
            if content_length.is_some() {
                return Err(SessionError::Protocol(
                    "connection closed inside a message header".to_string(),
                ));
            }
            return Ok(None);
        }

        let line = buf.trim();
        if line.is_empty() {
            // Tolerate stray blank lines before the header block.
            if content_length.is_some() {
                break;
            }
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            return Err(SessionError::Protocol(format!("malformed header: {}", line)));
        };
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            let length = value.trim().parse().map_err(|_| {
                SessionError::Protocol(format!("invalid Content-Length: {}", value.trim()))
            })?;
            content_length = Some(length);
        }
    }

    let length =
        content_length.ok_or_else(|| SessionError::Protocol("missing Content-Length".into()))?;

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;

    Ok(Some(serde_json::from_slice(&body)?))
}

/// Writes one message with the `jsonrpc` marker and a `Content-Length` header.
pub async fn write_message<W>(writer: &mut W, message: &Value) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    let mut message = message.clone();
    if let Value::Object(map) = &mut message {
        map.insert("jsonrpc".to_string(), Value::from("2.0"));
    }

    let json = serde_json::to_string(&message)?;
    let frame = format!("Content-Length: {}\r\n\r\n{}", json.len(), json);
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
