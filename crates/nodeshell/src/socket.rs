// ABOUTME: Unix socket accepting inbound window messages as JSON lines.
// ABOUTME: Each line is queued on the controller loop and answered with a success flag.

use anyhow::{Context, Result};
use nodeshell_core::{InboundMessage, ShellEvent};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

/// Longest accepted message line, newline included.
const MAX_LINE_BYTES: u64 = 64 * 1024;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

pub fn bind(path: &Path) -> Result<UnixListener> {
    // Remove a socket left behind by a previous run
    let _ = std::fs::remove_file(path);

    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind socket {}", path.display()))?;
    tracing::info!(path = %path.display(), "Socket server listening");
    Ok(listener)
}

pub async fn serve(listener: UnixListener, events: mpsc::UnboundedSender<ShellEvent>) -> Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let events = events.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, events).await {
                tracing::warn!(error = %e, "Socket connection error");
            }
        });
    }
}

async fn handle_connection(
    stream: UnixStream,
    events: mpsc::UnboundedSender<ShellEvent>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES + 1)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            break;
        }
        if buf.len() as u64 > MAX_LINE_BYTES {
            tracing::warn!(limit = MAX_LINE_BYTES, "Inbound message too long, closing connection");
            write_response(&mut writer, &Response::failed("Message too long")).await?;
            break;
        }

        let response = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(line, &events),
            Err(e) => Response::failed(format!("Invalid message: {e}")),
        };
        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> Result<()> {
    let response_json = serde_json::to_string(response)? + "\n";
    writer.write_all(response_json.as_bytes()).await?;
    Ok(())
}

fn handle_line(line: &str, events: &mpsc::UnboundedSender<ShellEvent>) -> Response {
    let message: InboundMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => return Response::failed(format!("Invalid message: {e}")),
    };
    tracing::debug!(channel = %message.channel, sender = ?message.sender, "Inbound message");
    if events.send(ShellEvent::Inbound(message)).is_err() {
        return Response::failed("Shell unavailable");
    }
    Response::ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeshell_core::WindowId;
    use serde_json::json;

    async fn roundtrip(stream: &mut BufReader<UnixStream>, line: &str) -> Response {
        stream.get_mut().write_all(line.as_bytes()).await.unwrap();
        let mut reply = String::new();
        stream.read_line(&mut reply).await.unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    #[tokio::test]
    async fn test_messages_are_queued_and_acknowledged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shell.sock");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = bind(&path).unwrap();
        tokio::spawn(serve(listener, tx));

        let mut stream = BufReader::new(UnixStream::connect(&path).await.unwrap());

        let response = roundtrip(
            &mut stream,
            "{\"channel\":\"closePage\",\"payload\":2,\"sender\":1}\n",
        )
        .await;
        assert_eq!(response, Response::ok());
        assert_eq!(
            rx.recv().await.unwrap(),
            ShellEvent::Inbound(
                InboundMessage::new("closePage", json!(2)).from_window(WindowId::new(1))
            )
        );

        let response = roundtrip(&mut stream, "not json\n").await;
        assert!(!response.success);
        assert!(response.error.unwrap().starts_with("Invalid message"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_oversized_line_is_rejected_and_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shell.sock");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = bind(&path).unwrap();
        tokio::spawn(serve(listener, tx));

        let mut stream = BufReader::new(UnixStream::connect(&path).await.unwrap());
        let flood = vec![b'x'; MAX_LINE_BYTES as usize + 10];
        stream.get_mut().write_all(&flood).await.unwrap();

        let mut reply = String::new();
        stream.read_line(&mut reply).await.unwrap();
        let response: Response = serde_json::from_str(&reply).unwrap();
        assert_eq!(response, Response::failed("Message too long"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_loop_reports_failure() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let response = handle_line("{\"channel\":\"showChildWindow\"}", &tx);
        assert_eq!(response, Response::failed("Shell unavailable"));
    }

    #[test]
    fn test_response_omits_missing_error() {
        let encoded = serde_json::to_string(&Response::ok()).unwrap();
        assert_eq!(encoded, r#"{"success":true}"#);
    }
}
