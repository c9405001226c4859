use crate::auction::types::{AuctionSnapshot, Bid, BidSubmission, Offer, OfferSubmission};
use crate::error::ClientError;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;

pub fn snapshot_endpoint(base_url: &str, auction_id: &str) -> String {
    format!("{base_url}/auctions/{auction_id}/snapshot")
}

pub fn bids_endpoint(base_url: &str, auction_id: &str, limit: u16) -> String {
    format!("{base_url}/auctions/{auction_id}/bids?limit={limit}")
}

pub fn offers_endpoint(base_url: &str, auction_id: &str) -> String {
    format!("{base_url}/auctions/{auction_id}/offers")
}

pub fn place_bid_endpoint(base_url: &str, auction_id: &str) -> String {
    format!("{base_url}/auctions/{auction_id}/bids")
}

pub fn buy_now_endpoint(base_url: &str, auction_id: &str) -> String {
    format!("{base_url}/auctions/{auction_id}/buy-now")
}

pub fn demo_login_endpoint(base_url: &str) -> String {
    format!("{base_url}/auth/demo-login")
}

/// Single round trip for the authoritative snapshot. No retry policy here;
/// the caller owns throttling and retries.
pub async fn fetch_snapshot(
    client: &Client,
    base_url: &str,
    auction_id: &str,
) -> Result<AuctionSnapshot, ClientError> {
    let endpoint = snapshot_endpoint(base_url, auction_id);
    let response = client.get(endpoint).send().await?.error_for_status()?;
    Ok(response.json::<AuctionSnapshot>().await?)
}

pub async fn fetch_bid_history(
    client: &Client,
    base_url: &str,
    auction_id: &str,
    limit: u16,
) -> Result<Vec<Bid>, ClientError> {
    let endpoint = bids_endpoint(base_url, auction_id, limit);
    let response = client.get(endpoint).send().await?.error_for_status()?;
    Ok(response.json::<Vec<Bid>>().await?)
}

pub async fn fetch_offers(
    client: &Client,
    base_url: &str,
    auction_id: &str,
) -> Result<Vec<Offer>, ClientError> {
    let endpoint = offers_endpoint(base_url, auction_id);
    let response = client.get(endpoint).send().await?.error_for_status()?;
    Ok(response.json::<Vec<Offer>>().await?)
}

pub async fn post_bid(
    client: &Client,
    base_url: &str,
    auction_id: &str,
    bearer_token: Option<&str>,
    submission: &BidSubmission,
) -> Result<(), ClientError> {
    let endpoint = place_bid_endpoint(base_url, auction_id);
    let request = with_bearer(client.post(endpoint), bearer_token).json(submission);
    let response = request.send().await?;
    ensure_accepted(response).await?;
    Ok(())
}

pub async fn post_offer(
    client: &Client,
    base_url: &str,
    auction_id: &str,
    bearer_token: Option<&str>,
    submission: &OfferSubmission,
) -> Result<Offer, ClientError> {
    let endpoint = offers_endpoint(base_url, auction_id);
    let request = with_bearer(client.post(endpoint), bearer_token).json(submission);
    let response = request.send().await?;
    let response = ensure_accepted(response).await?;
    Ok(response.json::<Offer>().await?)
}

pub async fn post_buy_now(
    client: &Client,
    base_url: &str,
    auction_id: &str,
    bearer_token: Option<&str>,
) -> Result<(), ClientError> {
    let endpoint = buy_now_endpoint(base_url, auction_id);
    let request = with_bearer(client.post(endpoint), bearer_token);
    let response = request.send().await?;
    ensure_accepted(response).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct DemoLoginWire {
    token: String,
}

pub async fn demo_login(client: &Client, base_url: &str) -> Result<String, ClientError> {
    let endpoint = demo_login_endpoint(base_url);
    let response = client.post(endpoint).send().await?.error_for_status()?;
    let payload = response.json::<DemoLoginWire>().await?;
    Ok(payload.token)
}

fn with_bearer(request: RequestBuilder, bearer_token: Option<&str>) -> RequestBuilder {
    match bearer_token {
        Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
        None => request,
    }
}

#[derive(Debug, Deserialize)]
struct RejectionWire {
    message: String,
}

/// Surfaces a server rejection as its own message, verbatim. The wire
/// contract has no structured error codes; message text is all we get.
async fn ensure_accepted(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let mut raw = body.clone().into_bytes();
    if let Ok(wire) = simd_json::serde::from_slice::<RejectionWire>(raw.as_mut_slice()) {
        return Err(ClientError::Rejected(wire.message));
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        Err(ClientError::Rejected(format!(
            "request failed with status {status}"
        )))
    } else {
        Err(ClientError::Rejected(trimmed.to_string()))
    }
}
