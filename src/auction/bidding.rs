use crate::auction::presenter::format_amount;
use crate::auction::types::{AuctionSnapshot, SessionContext, ShippingInfo};
use crate::error::ClientError;

/// Local preconditions for a bid, checked before any network call. Violations
/// are descriptive `Validation` errors; the server never sees them.
pub fn validate_bid(
    snapshot: Option<&AuctionSnapshot>,
    session: &SessionContext,
    amount: f64,
    shipping: &ShippingInfo,
) -> Result<(), ClientError> {
    let snapshot = require_active(snapshot, "bids")?;

    if !session.is_authenticated() {
        return Err(ClientError::Validation(
            "sign in to place a bid".to_string(),
        ));
    }

    if !amount.is_finite() {
        return Err(ClientError::Validation(
            "bid amount must be a number".to_string(),
        ));
    }

    let minimum = snapshot.minimum_acceptable_bid();
    if amount < minimum {
        return Err(ClientError::Validation(format!(
            "minimum bid is {} {}",
            format_amount(minimum),
            snapshot.currency
        )));
    }

    if let Some(field) = shipping.first_missing_field() {
        return Err(ClientError::Validation(format!(
            "shipping {field} is required"
        )));
    }

    Ok(())
}

/// Offers compete at parity with the current high bid, so the minimum uses
/// `>=` rather than the bid increment. Asymmetric on purpose; pending product
/// clarification, do not unify with the bid rule.
pub fn validate_offer(
    snapshot: Option<&AuctionSnapshot>,
    session: &SessionContext,
    amount: f64,
) -> Result<(), ClientError> {
    let snapshot = require_active(snapshot, "offers")?;

    if !session.is_authenticated() {
        return Err(ClientError::Validation(
            "sign in to make an offer".to_string(),
        ));
    }

    if !amount.is_finite() {
        return Err(ClientError::Validation(
            "offer amount must be a number".to_string(),
        ));
    }

    if amount < snapshot.high_bid {
        return Err(ClientError::Validation(format!(
            "offer must be at least {} {}",
            format_amount(snapshot.high_bid),
            snapshot.currency
        )));
    }

    Ok(())
}

pub fn validate_buy_now(
    snapshot: Option<&AuctionSnapshot>,
    session: &SessionContext,
) -> Result<(), ClientError> {
    let snapshot = require_active(snapshot, "buy now")?;

    if !session.is_authenticated() {
        return Err(ClientError::Validation("sign in to buy now".to_string()));
    }

    if snapshot.buy_now_price.is_none() {
        return Err(ClientError::Validation(
            "buy now is not available for this auction".to_string(),
        ));
    }

    Ok(())
}

fn require_active<'a>(
    snapshot: Option<&'a AuctionSnapshot>,
    action: &str,
) -> Result<&'a AuctionSnapshot, ClientError> {
    let snapshot = snapshot.ok_or_else(|| {
        ClientError::Validation("auction state is still loading".to_string())
    })?;

    if !snapshot.status.is_active() {
        return Err(ClientError::Validation(format!(
            "{action} are only accepted while the auction is active"
        )));
    }

    Ok(snapshot)
}
