use crate::auction::types::AuctionStatus;
use crate::error::ClientError;
use std::time::{Duration, Instant};

pub const SUCCESS_FEEDBACK_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPresentation {
    pub label: String,
    pub status_text: &'static str,
}

/// Derives the human-readable countdown label and status text from raw state.
/// Pure and total over the status enum; `time_remaining_seconds` only matters
/// for an active auction.
pub fn describe(status: AuctionStatus, time_remaining_seconds: i64) -> StatusPresentation {
    let (label, status_text) = match status {
        AuctionStatus::Scheduled => ("Scheduled".to_string(), "Scheduled"),
        AuctionStatus::Paused => ("Paused".to_string(), "Paused"),
        AuctionStatus::Ended | AuctionStatus::EndedNoSale => ("Ended".to_string(), "Ended"),
        AuctionStatus::Sold | AuctionStatus::SoldBuyNow | AuctionStatus::SoldOffer => {
            ("Sold".to_string(), "Sold")
        }
        AuctionStatus::Cancelled => ("Cancelled".to_string(), "Cancelled"),
        AuctionStatus::Active => {
            if time_remaining_seconds <= 0 {
                ("Ended".to_string(), "Active")
            } else {
                (format_countdown(time_remaining_seconds), "Active")
            }
        }
    };

    StatusPresentation { label, status_text }
}

/// Largest-unit-first breakdown: days+hours+minutes, hours+minutes,
/// minutes+seconds, or seconds only.
fn format_countdown(total_seconds: i64) -> String {
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;

    if days >= 1 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else if minutes >= 1 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

pub fn format_amount(amount: f64) -> String {
    format!("{amount:.2}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    Success,
    Error,
}

/// Inline feedback for one bid/offer form. Success messages expire after
/// three seconds; error messages persist until the next user action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionFeedback {
    pub kind: FeedbackKind,
    pub message: String,
    pub posted_at: Instant,
}

impl ActionFeedback {
    pub fn success(message: impl Into<String>, posted_at: Instant) -> Self {
        Self {
            kind: FeedbackKind::Success,
            message: message.into(),
            posted_at,
        }
    }

    pub fn error(message: impl Into<String>, posted_at: Instant) -> Self {
        Self {
            kind: FeedbackKind::Error,
            message: message.into(),
            posted_at,
        }
    }

    /// Collapses a submission outcome from the `submit_*` flows on
    /// [`AuctionLiveView`](crate::AuctionLiveView) into displayable feedback:
    /// the caller's success message on `Ok`, the error's own message on `Err`.
    pub fn from_submission<T>(
        result: &Result<T, ClientError>,
        success_message: impl Into<String>,
        posted_at: Instant,
    ) -> Self {
        match result {
            Ok(_) => Self::success(success_message, posted_at),
            Err(error) => Self::error(error.to_string(), posted_at),
        }
    }

    pub fn is_visible(&self, now: Instant) -> bool {
        match self.kind {
            FeedbackKind::Error => true,
            FeedbackKind::Success => now.duration_since(self.posted_at) < SUCCESS_FEEDBACK_TTL,
        }
    }
}
