use crate::error::ClientError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "https://api.word2wallet.com";
pub const DEFAULT_WS_BASE_URL: &str = "wss://api.word2wallet.com";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_SNAPSHOT_THROTTLE_MS: u64 = 2_000;
pub const DEFAULT_BID_HISTORY_LIMIT: u16 = 20;
pub const MIN_POLL_INTERVAL_MS: u64 = 1_000;
pub const MAX_POLL_INTERVAL_MS: u64 = 300_000;
pub const MIN_SNAPSHOT_THROTTLE_MS: u64 = 0;
pub const MAX_SNAPSHOT_THROTTLE_MS: u64 = 60_000;
pub const MIN_BID_HISTORY_LIMIT: u16 = 1;
pub const MAX_BID_HISTORY_LIMIT: u16 = 200;

/// Fixed minimum increment over the current high bid. The server owns the
/// real increment rules; this constant only guards the obvious client-side
/// rejection before a request is made.
pub const MINIMUM_BID_INCREMENT: f64 = 1.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Scheduled,
    Active,
    Paused,
    Ended,
    EndedNoSale,
    Sold,
    SoldBuyNow,
    SoldOffer,
    Cancelled,
}

impl AuctionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Ended
                | Self::EndedNoSale
                | Self::Sold
                | Self::SoldBuyNow
                | Self::SoldOffer
                | Self::Cancelled
        )
    }

    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Live,
    Polling,
    Reconnecting,
    Stopped,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Loading,
    Live,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Leader {
    pub name: String,
}

/// Server-authoritative view of one auction at a point in time. The client
/// never mutates a snapshot; fresher snapshots replace the whole document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuctionSnapshot {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub status: AuctionStatus,
    pub high_bid: f64,
    pub leader: Option<Leader>,
    pub reserve_met: bool,
    pub buy_now_price: Option<f64>,
    #[serde(default)]
    pub online: u32,
    pub time_remaining: i64,
    pub currency: String,
}

impl AuctionSnapshot {
    /// A leader is present iff at least one bid has been accepted.
    pub fn has_bids(&self) -> bool {
        self.leader.is_some()
    }

    pub fn minimum_acceptable_bid(&self) -> f64 {
        self.high_bid + MINIMUM_BID_INCREMENT
    }

    pub fn buy_now_available(&self) -> bool {
        self.status.is_active() && self.buy_now_price.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BidStatus {
    Pending,
    Accepted,
    Outbid,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bidder {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: String,
    pub amount: f64,
    pub bidder: Bidder,
    pub status: BidStatus,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
    Countered,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: String,
    pub amount: f64,
    pub buyer: String,
    pub status: OfferStatus,
    pub created_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    pub country: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub phone: String,
    pub email: String,
}

impl ShippingInfo {
    /// Name of the first empty field, if any. All seven fields are required
    /// before a bid submission may leave the client.
    pub fn first_missing_field(&self) -> Option<&'static str> {
        let fields: [(&'static str, &str); 7] = [
            ("country", &self.country),
            ("street", &self.street),
            ("city", &self.city),
            ("state", &self.state),
            ("zipCode", &self.zip_code),
            ("phone", &self.phone),
            ("email", &self.email),
        ];
        fields
            .into_iter()
            .find(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
    }

    pub fn is_complete(&self) -> bool {
        self.first_missing_field().is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidSubmission {
    pub amount: f64,
    pub shipping_info: ShippingInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferSubmission {
    pub amount: f64,
}

/// Explicitly injected auth context. Anonymous viewers carry no token and
/// receive read-only snapshots; every mutating action requires a token.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub bearer_token: Option<String>,
    pub display_name: Option<String>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
            display_name: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.bearer_token
            .as_deref()
            .map(|token| !token.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LiveViewArgs {
    pub auction_id: String,
    pub api_base_url: Option<String>,
    pub ws_base_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub snapshot_throttle_ms: Option<u64>,
    pub bid_history_limit: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct LiveViewConfig {
    pub auction_id: String,
    pub api_base_url: String,
    pub ws_base_url: String,
    pub poll_interval_ms: u64,
    pub snapshot_throttle_ms: u64,
    pub bid_history_limit: u16,
}

impl LiveViewArgs {
    pub fn normalize(self) -> Result<LiveViewConfig, ClientError> {
        let auction_id = self.auction_id.trim().to_string();
        if auction_id.is_empty()
            || !auction_id
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        {
            return Err(ClientError::InvalidArgument(
                "auctionId must be a non-empty identifier".to_string(),
            ));
        }

        let api_base_url = normalize_base_url(
            self.api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            "apiBaseUrl",
        )?;
        let ws_base_url = normalize_base_url(
            self.ws_base_url
                .unwrap_or_else(|| DEFAULT_WS_BASE_URL.to_string()),
            "wsBaseUrl",
        )?;

        let poll_interval_ms = self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&poll_interval_ms) {
            return Err(ClientError::InvalidArgument(format!(
                "pollIntervalMs must be between {MIN_POLL_INTERVAL_MS} and {MAX_POLL_INTERVAL_MS}"
            )));
        }

        let snapshot_throttle_ms = self
            .snapshot_throttle_ms
            .unwrap_or(DEFAULT_SNAPSHOT_THROTTLE_MS);
        if !(MIN_SNAPSHOT_THROTTLE_MS..=MAX_SNAPSHOT_THROTTLE_MS).contains(&snapshot_throttle_ms) {
            return Err(ClientError::InvalidArgument(format!(
                "snapshotThrottleMs must be between {MIN_SNAPSHOT_THROTTLE_MS} and {MAX_SNAPSHOT_THROTTLE_MS}"
            )));
        }

        let bid_history_limit = self.bid_history_limit.unwrap_or(DEFAULT_BID_HISTORY_LIMIT);
        if !(MIN_BID_HISTORY_LIMIT..=MAX_BID_HISTORY_LIMIT).contains(&bid_history_limit) {
            return Err(ClientError::InvalidArgument(format!(
                "bidHistoryLimit must be between {MIN_BID_HISTORY_LIMIT} and {MAX_BID_HISTORY_LIMIT}"
            )));
        }

        Ok(LiveViewConfig {
            auction_id,
            api_base_url,
            ws_base_url,
            poll_interval_ms,
            snapshot_throttle_ms,
            bid_history_limit,
        })
    }
}

fn normalize_base_url(raw: String, field: &str) -> Result<String, ClientError> {
    let trimmed = raw.trim().trim_end_matches('/').to_string();
    if trimmed.is_empty() {
        return Err(ClientError::InvalidArgument(format!(
            "{field} must be non-empty"
        )));
    }
    Ok(trimmed)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusSnapshot {
    pub state: ConnectionState,
    pub phase: SyncPhase,
    pub auction_id: String,
    pub last_applied_seq: Option<u64>,
    pub online: Option<u32>,
    pub reason: Option<String>,
}

impl SyncStatusSnapshot {
    pub fn stopped(auction_id: String, reason: Option<String>) -> Self {
        Self {
            state: ConnectionState::Stopped,
            phase: SyncPhase::Loading,
            auction_id,
            last_applied_seq: None,
            online: None,
            reason,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveViewSession {
    pub running: bool,
    pub auction_id: String,
    pub poll_interval_ms: u64,
    pub snapshot_throttle_ms: u64,
    pub bid_history_limit: u16,
}

impl LiveViewSession {
    pub fn from_config(config: &LiveViewConfig) -> Self {
        Self {
            running: true,
            auction_id: config.auction_id.clone(),
            poll_interval_ms: config.poll_interval_ms,
            snapshot_throttle_ms: config.snapshot_throttle_ms,
            bid_history_limit: config.bid_history_limit,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveViewStopResult {
    pub stopped: bool,
}

/// Fan-out payload for subscribers of the live view. A snapshot event always
/// carries the complete replacement document, never a partial update.
#[derive(Debug, Clone)]
pub enum AuctionEvent {
    Snapshot(AuctionSnapshot),
    Status(SyncStatusSnapshot),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_json() -> &'static str {
        r#"{
            "id": "a-17",
            "title": "Signed first edition",
            "images": ["https://cdn.example/a-17.jpg"],
            "status": "active",
            "highBid": 250.0,
            "leader": {"name": "J. Prescott"},
            "reserveMet": true,
            "buyNowPrice": 900.0,
            "online": 12,
            "timeRemaining": 3600,
            "currency": "USD"
        }"#
    }

    #[test]
    fn deserializes_snapshot_payload() {
        let snapshot: AuctionSnapshot =
            serde_json::from_str(snapshot_json()).expect("snapshot payload should deserialize");

        assert_eq!(snapshot.id, "a-17");
        assert_eq!(snapshot.status, AuctionStatus::Active);
        assert_eq!(snapshot.high_bid, 250.0);
        assert!(snapshot.has_bids());
        assert!(snapshot.buy_now_available());
        assert_eq!(snapshot.minimum_acceptable_bid(), 251.0);
    }

    #[test]
    fn deserializes_snapshot_without_leader_or_buy_now() {
        let snapshot: AuctionSnapshot = serde_json::from_str(
            r#"{
                "id": "a-18",
                "title": "Untouched lot",
                "status": "scheduled",
                "highBid": 0.0,
                "leader": null,
                "reserveMet": false,
                "buyNowPrice": null,
                "timeRemaining": 0,
                "currency": "EUR"
            }"#,
        )
        .expect("snapshot without optional fields should deserialize");

        assert!(!snapshot.has_bids());
        assert!(!snapshot.buy_now_available());
        assert_eq!(snapshot.online, 0);
        assert!(snapshot.images.is_empty());
    }

    #[test]
    fn classifies_terminal_statuses() {
        let terminal = [
            AuctionStatus::Ended,
            AuctionStatus::EndedNoSale,
            AuctionStatus::Sold,
            AuctionStatus::SoldBuyNow,
            AuctionStatus::SoldOffer,
            AuctionStatus::Cancelled,
        ];
        let open = [
            AuctionStatus::Scheduled,
            AuctionStatus::Active,
            AuctionStatus::Paused,
        ];

        assert!(terminal.iter().all(|status| status.is_terminal()));
        assert!(open.iter().all(|status| !status.is_terminal()));
    }

    #[test]
    fn status_serde_uses_snake_case_tags() {
        let status: AuctionStatus =
            serde_json::from_str("\"sold_buy_now\"").expect("status tag should parse");
        assert_eq!(status, AuctionStatus::SoldBuyNow);
        assert_eq!(
            serde_json::to_string(&AuctionStatus::EndedNoSale).expect("status should serialize"),
            "\"ended_no_sale\""
        );
    }

    #[test]
    fn shipping_reports_first_missing_field() {
        let mut shipping = ShippingInfo {
            country: "US".to_string(),
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            zip_code: "62701".to_string(),
            phone: "+1 555 0100".to_string(),
            email: "buyer@example.com".to_string(),
        };
        assert!(shipping.is_complete());

        shipping.zip_code = "  ".to_string();
        assert_eq!(shipping.first_missing_field(), Some("zipCode"));
    }

    #[test]
    fn session_requires_non_blank_token() {
        assert!(!SessionContext::anonymous().is_authenticated());
        assert!(!SessionContext::with_token("   ").is_authenticated());
        assert!(SessionContext::with_token("tok-1").is_authenticated());
    }

    #[test]
    fn normalizes_args_defaults() {
        let config = LiveViewArgs {
            auction_id: " a-17 ".to_string(),
            ..LiveViewArgs::default()
        }
        .normalize()
        .expect("defaults should be valid");

        assert_eq!(config.auction_id, "a-17");
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.ws_base_url, DEFAULT_WS_BASE_URL);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.snapshot_throttle_ms, DEFAULT_SNAPSHOT_THROTTLE_MS);
        assert_eq!(config.bid_history_limit, DEFAULT_BID_HISTORY_LIMIT);
    }

    #[test]
    fn rejects_empty_auction_id() {
        let result = LiveViewArgs {
            auction_id: "  ".to_string(),
            ..LiveViewArgs::default()
        }
        .normalize();

        assert!(result.is_err());
    }

    #[test]
    fn rejects_poll_interval_out_of_range() {
        let result = LiveViewArgs {
            auction_id: "a-17".to_string(),
            poll_interval_ms: Some(10),
            ..LiveViewArgs::default()
        }
        .normalize();

        assert!(result.is_err());
    }

    #[test]
    fn trims_trailing_slash_from_base_urls() {
        let config = LiveViewArgs {
            auction_id: "a-17".to_string(),
            api_base_url: Some("https://backend.test/".to_string()),
            ws_base_url: Some("wss://backend.test/".to_string()),
            ..LiveViewArgs::default()
        }
        .normalize()
        .expect("custom base urls should be valid");

        assert_eq!(config.api_base_url, "https://backend.test");
        assert_eq!(config.ws_base_url, "wss://backend.test");
    }
}
