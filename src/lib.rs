//! Live-view synchronization and bidding client for a server-authoritative
//! auction. The server is the sole source of truth: state arrives as complete
//! snapshots over a realtime channel (with a polling fallback) and every
//! mutating action is confirmed by re-fetching, never applied optimistically.

pub mod auction;
pub mod client;
pub mod error;

pub use auction::api::demo_login;
pub use auction::presenter::{describe, ActionFeedback, FeedbackKind, StatusPresentation};
pub use auction::types::{
    AuctionEvent, AuctionSnapshot, AuctionStatus, Bid, LiveViewArgs, Offer, SessionContext,
    ShippingInfo, SyncStatusSnapshot,
};
pub use client::AuctionLiveView;
pub use error::ClientError;
