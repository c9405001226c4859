use crate::auction::types::AuctionSnapshot;
use crate::error::ClientError;
use simd_json::prelude::ValueAsScalar;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

pub type AuctionWsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn live_endpoint(ws_base_url: &str, auction_id: &str) -> String {
    format!("{ws_base_url}/auctions/{auction_id}/live")
}

/// Opens the one live channel for an auction. Anonymous viewers connect
/// without a credential and receive read-only snapshots.
pub async fn connect_live_channel(
    ws_base_url: &str,
    auction_id: &str,
    bearer_token: Option<&str>,
) -> Result<AuctionWsStream, ClientError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(4 << 20),
        max_frame_size: Some(1 << 20),
        ..Default::default()
    };

    let mut request = live_endpoint(ws_base_url, auction_id).into_client_request()?;
    if let Some(token) = bearer_token {
        let header_value = format!("Bearer {token}").parse().map_err(|_| {
            ClientError::InvalidArgument("bearer token is not a valid header value".to_string())
        })?;
        request.headers_mut().insert(AUTHORIZATION, header_value);
    }

    let (stream, _) = connect_async_with_config(request, Some(ws_config), true).await?;
    Ok(stream)
}

/// Typed inbound message. Only `snapshot` carries state; everything else is
/// surfaced as `Ignored` so new server message types never break old clients.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeMessage {
    Snapshot(AuctionSnapshot),
    Ignored { kind: String },
}

pub fn parse_realtime_payload(payload: &mut [u8]) -> Result<RealtimeMessage, ClientError> {
    let value = simd_json::to_owned_value(payload)?;
    let simd_json::OwnedValue::Object(mut envelope) = value else {
        return Err(ClientError::InvalidArgument(
            "realtime payload must be a JSON object".to_string(),
        ));
    };

    let kind = envelope
        .get("type")
        .and_then(|tag| tag.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            ClientError::InvalidArgument("realtime payload is missing a type tag".to_string())
        })?;

    if kind != "snapshot" {
        return Ok(RealtimeMessage::Ignored { kind });
    }

    let data = envelope.remove("data").ok_or_else(|| {
        ClientError::InvalidArgument("snapshot message is missing its data field".to_string())
    })?;
    let snapshot: AuctionSnapshot = simd_json::serde::from_owned_value(data)?;
    Ok(RealtimeMessage::Snapshot(snapshot))
}
