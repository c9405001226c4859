use crate::auction::api;
use crate::auction::bidding::{validate_bid, validate_buy_now, validate_offer};
use crate::auction::sync::{run_live_view, SyncCommand, SyncShared};
use crate::auction::types::{
    AuctionEvent, AuctionSnapshot, Bid, BidSubmission, LiveViewArgs, LiveViewConfig,
    LiveViewSession, LiveViewStopResult, Offer, OfferSubmission, SessionContext, ShippingInfo,
    SyncStatusSnapshot,
};
use crate::error::ClientError;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const COMMAND_CHANNEL_CAPACITY: usize = 8;

struct ViewRuntime {
    shared: Arc<SyncShared>,
    commands: mpsc::Sender<SyncCommand>,
    join_handle: JoinHandle<()>,
}

/// Handle for one auction's live view: owns the background sync task and is
/// the entry point for bidding, offers, buy-now, and history queries. The
/// viewer identity is fixed at construction.
pub struct AuctionLiveView {
    config: LiveViewConfig,
    session: SessionContext,
    events: broadcast::Sender<AuctionEvent>,
    runtime: Mutex<Option<ViewRuntime>>,
}

impl AuctionLiveView {
    pub fn new(args: LiveViewArgs, session: SessionContext) -> Result<Self, ClientError> {
        let config = args.normalize()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            session,
            events,
            runtime: Mutex::new(None),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuctionEvent> {
        self.events.subscribe()
    }

    /// Starts the sync task. Idempotent: a second call while the task is
    /// running does not open a duplicate connection.
    pub async fn start(&self) -> Result<LiveViewSession, ClientError> {
        let mut slot = self.runtime.lock().await;

        if let Some(runtime) = slot.as_ref() {
            if !runtime.join_handle.is_finished() {
                return Ok(LiveViewSession::from_config(&self.config));
            }
        }

        let shared = Arc::new(SyncShared::new(
            self.config.clone(),
            self.session.clone(),
            self.events.clone(),
        ));
        let (commands, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let task_shared = Arc::clone(&shared);
        let join_handle = tokio::spawn(async move {
            run_live_view(task_shared, command_rx).await;
        });

        *slot = Some(ViewRuntime {
            shared,
            commands,
            join_handle,
        });

        Ok(LiveViewSession::from_config(&self.config))
    }

    /// Tears the view down: disconnects the channel, clears the polling
    /// timer, and waits for the task to finish. Safe to call repeatedly.
    pub async fn stop(&self) -> LiveViewStopResult {
        let runtime = {
            let mut slot = self.runtime.lock().await;
            slot.take()
        };

        let stopped = if let Some(runtime) = runtime {
            runtime.shared.cancel_token.cancel();
            let _ = runtime.join_handle.await;
            true
        } else {
            false
        };

        LiveViewStopResult { stopped }
    }

    pub async fn status(&self) -> SyncStatusSnapshot {
        let slot = self.runtime.lock().await;
        match slot.as_ref() {
            Some(runtime) => runtime.shared.status_store.read().await.clone(),
            None => SyncStatusSnapshot::stopped(
                self.config.auction_id.clone(),
                Some("view idle".to_string()),
            ),
        }
    }

    pub async fn snapshot(&self) -> Option<AuctionSnapshot> {
        let slot = self.runtime.lock().await;
        slot.as_ref()
            .and_then(|runtime| runtime.shared.current_snapshot())
    }

    /// Requests a forced snapshot refresh; also the retry action after a
    /// failed initial load.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let (_, commands) = self.runtime_parts().await?;
        commands
            .send(SyncCommand::ForceRefresh)
            .await
            .map_err(|_| ClientError::Validation("live view is not running".to_string()))
    }

    /// Validates locally, submits the bid, and on success pulls the
    /// authoritative post-bid snapshot. Never applies the bid optimistically.
    /// Map the outcome to [`ActionFeedback`](crate::ActionFeedback) for
    /// inline display.
    pub async fn submit_bid(
        &self,
        amount: f64,
        shipping: ShippingInfo,
    ) -> Result<(), ClientError> {
        let (shared, commands) = self.runtime_parts().await?;

        let snapshot = shared.current_snapshot();
        validate_bid(snapshot.as_ref(), &self.session, amount, &shipping)?;

        let submission = BidSubmission {
            amount,
            shipping_info: shipping,
        };
        api::post_bid(
            &shared.http_client,
            &shared.config.api_base_url,
            &shared.config.auction_id,
            self.session.bearer_token.as_deref(),
            &submission,
        )
        .await?;

        Self::request_confirmation_refresh(&commands).await;
        Ok(())
    }

    /// Same confirmation pattern as [`submit_bid`](Self::submit_bid); the
    /// returned [`Offer`] is the server's accepted record. Outcomes map to
    /// [`ActionFeedback`](crate::ActionFeedback) the same way.
    pub async fn submit_offer(&self, amount: f64) -> Result<Offer, ClientError> {
        let (shared, commands) = self.runtime_parts().await?;

        let snapshot = shared.current_snapshot();
        validate_offer(snapshot.as_ref(), &self.session, amount)?;

        let offer = api::post_offer(
            &shared.http_client,
            &shared.config.api_base_url,
            &shared.config.auction_id,
            self.session.bearer_token.as_deref(),
            &OfferSubmission { amount },
        )
        .await?;

        Self::request_confirmation_refresh(&commands).await;
        Ok(offer)
    }

    /// Immediate purchase at the listed price; valid only while the auction
    /// is active and a buy-now price is present. Outcomes map to
    /// [`ActionFeedback`](crate::ActionFeedback) like the other submissions.
    pub async fn buy_now(&self) -> Result<(), ClientError> {
        let (shared, commands) = self.runtime_parts().await?;

        let snapshot = shared.current_snapshot();
        validate_buy_now(snapshot.as_ref(), &self.session)?;

        api::post_buy_now(
            &shared.http_client,
            &shared.config.api_base_url,
            &shared.config.auction_id,
            self.session.bearer_token.as_deref(),
        )
        .await?;

        Self::request_confirmation_refresh(&commands).await;
        Ok(())
    }

    /// Pulls the authoritative post-action snapshot. The sync task can exit
    /// between the runtime lookup and the POST completing; a dropped send
    /// loses only this confirmation fetch, so it is logged rather than
    /// surfaced as an error on an already-accepted action.
    async fn request_confirmation_refresh(commands: &mpsc::Sender<SyncCommand>) {
        if commands.send(SyncCommand::ForceRefresh).await.is_err() {
            tracing::warn!("confirmation refresh dropped; live view task already stopped");
        }
    }

    pub async fn bid_history(&self) -> Result<Vec<Bid>, ClientError> {
        let (shared, _) = self.runtime_parts().await?;
        api::fetch_bid_history(
            &shared.http_client,
            &shared.config.api_base_url,
            &shared.config.auction_id,
            shared.config.bid_history_limit,
        )
        .await
    }

    pub async fn offers(&self) -> Result<Vec<Offer>, ClientError> {
        let (shared, _) = self.runtime_parts().await?;
        api::fetch_offers(
            &shared.http_client,
            &shared.config.api_base_url,
            &shared.config.auction_id,
        )
        .await
    }

    async fn runtime_parts(
        &self,
    ) -> Result<(Arc<SyncShared>, mpsc::Sender<SyncCommand>), ClientError> {
        let slot = self.runtime.lock().await;
        match slot.as_ref() {
            Some(runtime) if !runtime.join_handle.is_finished() => {
                Ok((Arc::clone(&runtime.shared), runtime.commands.clone()))
            }
            _ => Err(ClientError::Validation(
                "live view is not started".to_string(),
            )),
        }
    }
}
