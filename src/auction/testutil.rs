//! In-process servers for exercising the client against real sockets.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

pub type RequestLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub body: String,
}

impl CannedResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn error(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        409 => "Conflict",
        _ => "Error",
    }
}

/// Serves one canned response per connection, in order, recording each raw
/// request head. The listener closes after the last response, so later
/// connections are refused rather than hanging.
pub async fn spawn_canned_http_server(responses: Vec<CannedResponse>) -> (String, RequestLog) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("test listener should bind");
    let address = listener
        .local_addr()
        .expect("test listener should expose its address");
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));

    let task_log = Arc::clone(&log);
    tokio::spawn(async move {
        for response in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };

            let mut head = Vec::new();
            let mut buffer = [0_u8; 4_096];
            loop {
                let Ok(read) = socket.read(&mut buffer).await else {
                    break;
                };
                if read == 0 {
                    break;
                }
                head.extend_from_slice(&buffer[..read]);
                if head.windows(4).any(|window| window == b"\r\n\r\n") {
                    break;
                }
            }
            task_log
                .lock()
                .push(String::from_utf8_lossy(&head).to_string());

            let payload = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                response.status,
                reason_phrase(response.status),
                response.body.len(),
                response.body
            );
            let _ = socket.write_all(payload.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{address}"), log)
}

/// Accepts a single websocket client, pushes the given text frames, then
/// holds the connection open until the client disconnects.
pub async fn spawn_one_shot_ws_server(frames: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("test ws listener should bind");
    let address = listener
        .local_addr()
        .expect("test ws listener should expose its address");

    tokio::spawn(async move {
        let Ok((socket, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws_stream) = tokio_tungstenite::accept_async(socket).await else {
            return;
        };

        for frame in frames {
            if ws_stream.send(Message::Text(frame)).await.is_err() {
                return;
            }
        }

        // Park until the client goes away so the channel stays "connected".
        while let Some(Ok(_)) = ws_stream.next().await {}
    });

    format!("ws://{address}")
}

/// A websocket endpoint that refuses connections outright.
pub fn refused_ws_endpoint() -> String {
    "ws://127.0.0.1:9".to_string()
}
