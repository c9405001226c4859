use crate::auction::api::fetch_snapshot;
use crate::auction::channel::{connect_live_channel, parse_realtime_payload, RealtimeMessage};
use crate::auction::types::{
    AuctionEvent, AuctionSnapshot, ConnectionState, LiveViewConfig, SessionContext, SyncPhase,
    SyncStatusSnapshot,
};
use crate::error::ClientError;
use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const RECONNECT_BASE_DELAY_MS: u64 = 1_000;
const RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Commands accepted by the running sync task. A forced refresh bypasses the
/// snapshot throttle; it is how submissions pull the authoritative post-action
/// state and how a failed initial load is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    ForceRefresh,
}

/// Monotonic marker source. Every asynchronous update takes a marker when it
/// begins (fetch start, push receipt); the reconciler discards any update
/// whose marker is older than the last one applied, so a stale in-flight
/// fetch can never clobber a fresher push.
#[derive(Debug, Default)]
pub struct UpdateSequence(AtomicU64);

impl UpdateSequence {
    pub fn begin(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// The single snapshot slot the view renders from. Snapshots replace the
/// whole document; there is no field-level merging.
#[derive(Debug, Default)]
pub struct ReconciledState {
    pub snapshot: Option<AuctionSnapshot>,
    pub last_applied_seq: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotApplyOutcome {
    Applied { changed: bool },
    Stale { seq: u64, last_applied: u64 },
}

pub fn apply_snapshot(
    state: &mut ReconciledState,
    snapshot: AuctionSnapshot,
    seq: u64,
) -> SnapshotApplyOutcome {
    if seq <= state.last_applied_seq {
        return SnapshotApplyOutcome::Stale {
            seq,
            last_applied: state.last_applied_seq,
        };
    }

    let changed = state.snapshot.as_ref() != Some(&snapshot);
    state.snapshot = Some(snapshot);
    state.last_applied_seq = seq;
    SnapshotApplyOutcome::Applied { changed }
}

/// Caller-side throttle for UI-triggered refresh bursts: at most one accepted
/// fetch per window; excess calls are dropped, not queued. Forced calls
/// (initial load, post-submit refresh) always pass.
#[derive(Debug)]
pub struct SnapshotThrottle {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl SnapshotThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    pub fn admit(&mut self, forced: bool, now: Instant) -> bool {
        if !forced {
            if let Some(last) = self.last_accepted {
                if now.duration_since(last) < self.window {
                    return false;
                }
            }
        }
        self.last_accepted = Some(now);
        true
    }
}

/// Everything the sync task, the polling task, and the client handle share.
pub(crate) struct SyncShared {
    pub config: LiveViewConfig,
    pub session: SessionContext,
    pub http_client: Client,
    pub state: Mutex<ReconciledState>,
    pub sequence: UpdateSequence,
    pub throttle: Mutex<SnapshotThrottle>,
    pub channel_connected: AtomicBool,
    pub initial_fetch_failed: AtomicBool,
    pub status_store: RwLock<SyncStatusSnapshot>,
    pub events: broadcast::Sender<AuctionEvent>,
    pub cancel_token: CancellationToken,
}

impl SyncShared {
    pub fn new(
        config: LiveViewConfig,
        session: SessionContext,
        events: broadcast::Sender<AuctionEvent>,
    ) -> Self {
        let status = SyncStatusSnapshot::stopped(
            config.auction_id.clone(),
            Some("view idle".to_string()),
        );
        let throttle = SnapshotThrottle::new(Duration::from_millis(config.snapshot_throttle_ms));

        Self {
            config,
            session,
            http_client: Client::new(),
            state: Mutex::new(ReconciledState::default()),
            sequence: UpdateSequence::default(),
            throttle: Mutex::new(throttle),
            channel_connected: AtomicBool::new(false),
            initial_fetch_failed: AtomicBool::new(false),
            status_store: RwLock::new(status),
            events,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn current_snapshot(&self) -> Option<AuctionSnapshot> {
        self.state.lock().snapshot.clone()
    }
}

fn build_status(
    shared: &SyncShared,
    state: ConnectionState,
    reason: Option<String>,
) -> SyncStatusSnapshot {
    let (has_snapshot, last_applied_seq, online) = {
        let readable = shared.state.lock();
        (
            readable.snapshot.is_some(),
            readable.last_applied_seq,
            readable.snapshot.as_ref().map(|snapshot| snapshot.online),
        )
    };

    let phase = if has_snapshot {
        SyncPhase::Live
    } else if shared.initial_fetch_failed.load(Ordering::Relaxed) {
        SyncPhase::Error
    } else {
        SyncPhase::Loading
    };

    SyncStatusSnapshot {
        state,
        phase,
        auction_id: shared.config.auction_id.clone(),
        last_applied_seq: (last_applied_seq > 0).then_some(last_applied_seq),
        online,
        reason,
    }
}

async fn publish_status(shared: &SyncShared, state: ConnectionState, reason: Option<String>) {
    let snapshot = build_status(shared, state, reason);
    {
        let mut writable = shared.status_store.write().await;
        *writable = snapshot.clone();
    }
    let _ = shared.events.send(AuctionEvent::Status(snapshot));
}

async fn current_connection_state(shared: &SyncShared) -> ConnectionState {
    let readable = shared.status_store.read().await;
    readable.state
}

/// One throttled fetch-and-reconcile round trip. Returns whether a snapshot
/// was applied; a dropped (throttled) or stale call is `Ok(false)`.
pub(crate) async fn fetch_and_apply(
    shared: &Arc<SyncShared>,
    forced: bool,
) -> Result<bool, ClientError> {
    {
        let mut throttle = shared.throttle.lock();
        if !throttle.admit(forced, Instant::now()) {
            return Ok(false);
        }
    }

    let seq = shared.sequence.begin();
    let snapshot = fetch_snapshot(
        &shared.http_client,
        &shared.config.api_base_url,
        &shared.config.auction_id,
    )
    .await?;

    if shared.cancel_token.is_cancelled() {
        return Ok(false);
    }

    Ok(reconcile(shared, snapshot, seq).await)
}

/// Replaces the snapshot slot if the marker is still fresh and fans the
/// replacement out to subscribers. Used by both the fetch and push paths.
async fn reconcile(shared: &Arc<SyncShared>, snapshot: AuctionSnapshot, seq: u64) -> bool {
    let outcome = {
        let mut writable = shared.state.lock();
        apply_snapshot(&mut writable, snapshot, seq)
    };

    match outcome {
        SnapshotApplyOutcome::Applied { changed } => {
            shared.initial_fetch_failed.store(false, Ordering::Relaxed);
            if changed {
                if let Some(applied) = shared.current_snapshot() {
                    let _ = shared.events.send(AuctionEvent::Snapshot(applied));
                }
            }
            let state = current_connection_state(shared).await;
            publish_status(shared, state, None).await;
            true
        }
        SnapshotApplyOutcome::Stale { seq, last_applied } => {
            tracing::debug!(seq, last_applied, "discarding stale snapshot update");
            false
        }
    }
}

pub fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(5);
    let base_ms = RECONNECT_BASE_DELAY_MS.saturating_mul(1_u64 << exponent);
    let jitter_ms = (now_unix_ms().unsigned_abs() % 250).min(249);
    Duration::from_millis((base_ms + jitter_ms).min(RECONNECT_MAX_DELAY_MS))
}

fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}

/// The long-running view task: initial load, realtime channel with bounded
/// backoff, polling fallback while the channel is down, and command handling.
pub(crate) async fn run_live_view(shared: Arc<SyncShared>, commands: mpsc::Receiver<SyncCommand>) {
    if shared.cancel_token.is_cancelled() {
        publish_status(
            &shared,
            ConnectionState::Stopped,
            Some("view stopped".to_string()),
        )
        .await;
        return;
    }

    publish_status(
        &shared,
        ConnectionState::Connecting,
        Some("loading initial snapshot".to_string()),
    )
    .await;

    if let Err(error) = fetch_and_apply(&shared, true).await {
        shared.initial_fetch_failed.store(true, Ordering::Relaxed);
        publish_status(
            &shared,
            ConnectionState::Connecting,
            Some(format!("initial snapshot fetch failed: {error}")),
        )
        .await;
    }

    let poll_shared = Arc::clone(&shared);
    let poll_handle = tokio::spawn(async move {
        run_poll_loop(poll_shared, commands).await;
    });

    let mut reconnect_attempt = 0_u32;
    while !shared.cancel_token.is_cancelled() {
        let (state, reason) = if reconnect_attempt == 0 {
            (
                ConnectionState::Connecting,
                Some("opening realtime channel".to_string()),
            )
        } else {
            (
                ConnectionState::Reconnecting,
                Some(format!("reconnect attempt {reconnect_attempt}")),
            )
        };
        publish_status(&shared, state, reason).await;

        let connect_result = connect_live_channel(
            &shared.config.ws_base_url,
            &shared.config.auction_id,
            shared.session.bearer_token.as_deref(),
        )
        .await;

        match connect_result {
            Ok(mut ws_stream) => {
                reconnect_attempt = 0;
                shared.channel_connected.store(true, Ordering::Relaxed);
                publish_status(
                    &shared,
                    ConnectionState::Live,
                    Some("realtime channel connected".to_string()),
                )
                .await;

                loop {
                    let frame = tokio::select! {
                        _ = shared.cancel_token.cancelled() => break,
                        next_message = ws_stream.next() => next_message,
                    };

                    let Some(frame_result) = frame else {
                        break;
                    };

                    match frame_result {
                        Ok(Message::Text(text_payload)) => {
                            let mut owned_payload = text_payload.into_bytes();
                            handle_channel_payload(&shared, owned_payload.as_mut_slice()).await;
                        }
                        Ok(Message::Binary(mut binary_payload)) => {
                            handle_channel_payload(&shared, binary_payload.as_mut_slice()).await;
                        }
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(error) => {
                            tracing::warn!(%error, "realtime channel frame error");
                            break;
                        }
                    }
                }

                shared.channel_connected.store(false, Ordering::Relaxed);
                if shared.cancel_token.is_cancelled() {
                    break;
                }
            }
            Err(error) => {
                // Channel failure is never a user-facing hard error; the
                // polling timer keeps the view fresh while we back off.
                publish_status(
                    &shared,
                    ConnectionState::Polling,
                    Some(format!(
                        "realtime channel unavailable: {error}; polling fallback active"
                    )),
                )
                .await;
            }
        }

        reconnect_attempt = reconnect_attempt.saturating_add(1);
        let delay = reconnect_delay(reconnect_attempt);
        tokio::select! {
            _ = shared.cancel_token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    shared.channel_connected.store(false, Ordering::Relaxed);
    shared.cancel_token.cancel();
    let _ = poll_handle.await;

    publish_status(
        &shared,
        ConnectionState::Stopped,
        Some("view stopped".to_string()),
    )
    .await;
}

/// Polling fallback plus command intake. The timer only fetches while the
/// realtime channel is down; commands are honored in either mode.
async fn run_poll_loop(shared: Arc<SyncShared>, mut commands: mpsc::Receiver<SyncCommand>) {
    let mut ticker =
        tokio::time::interval(Duration::from_millis(shared.config.poll_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shared.cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                if shared.channel_connected.load(Ordering::Relaxed) {
                    continue;
                }
                if let Err(error) = fetch_and_apply(&shared, false).await {
                    let state = current_connection_state(&shared).await;
                    publish_status(
                        &shared,
                        state,
                        Some(format!("snapshot poll failed: {error}")),
                    )
                    .await;
                }
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                match command {
                    SyncCommand::ForceRefresh => {
                        if let Err(error) = fetch_and_apply(&shared, true).await {
                            let state = current_connection_state(&shared).await;
                            publish_status(
                                &shared,
                                state,
                                Some(format!("snapshot refresh failed: {error}")),
                            )
                            .await;
                        }
                    }
                }
            }
        }
    }
}

async fn handle_channel_payload(shared: &Arc<SyncShared>, payload: &mut [u8]) {
    match parse_realtime_payload(payload) {
        Ok(RealtimeMessage::Snapshot(snapshot)) => {
            let seq = shared.sequence.begin();
            reconcile(shared, snapshot, seq).await;
        }
        Ok(RealtimeMessage::Ignored { kind }) => {
            tracing::debug!(kind, "ignoring unknown realtime message type");
        }
        Err(error) => {
            tracing::warn!(%error, "failed to decode realtime payload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::types::{AuctionStatus, Leader, LiveViewArgs};

    fn sample_snapshot(high_bid: f64) -> AuctionSnapshot {
        AuctionSnapshot {
            id: "a-17".to_string(),
            title: "Signed first edition".to_string(),
            images: Vec::new(),
            status: AuctionStatus::Active,
            high_bid,
            leader: Some(Leader {
                name: "M. Ortega".to_string(),
            }),
            reserve_met: false,
            buy_now_price: None,
            online: 3,
            time_remaining: 120,
            currency: "USD".to_string(),
        }
    }

    #[test]
    fn applying_same_snapshot_twice_is_idempotent() {
        let mut state = ReconciledState::default();

        let first = apply_snapshot(&mut state, sample_snapshot(100.0), 1);
        assert_eq!(first, SnapshotApplyOutcome::Applied { changed: true });

        let second = apply_snapshot(&mut state, sample_snapshot(100.0), 2);
        assert_eq!(second, SnapshotApplyOutcome::Applied { changed: false });

        assert_eq!(state.snapshot, Some(sample_snapshot(100.0)));
        assert_eq!(state.last_applied_seq, 2);
    }

    #[test]
    fn discards_update_with_stale_marker() {
        let mut state = ReconciledState::default();

        let fresh = apply_snapshot(&mut state, sample_snapshot(150.0), 5);
        assert_eq!(fresh, SnapshotApplyOutcome::Applied { changed: true });

        // A fetch that started before the push finished must not win.
        let stale = apply_snapshot(&mut state, sample_snapshot(100.0), 3);
        assert_eq!(
            stale,
            SnapshotApplyOutcome::Stale {
                seq: 3,
                last_applied: 5
            }
        );
        assert_eq!(state.snapshot.as_ref().map(|s| s.high_bid), Some(150.0));
    }

    #[test]
    fn snapshot_replaces_whole_document() {
        let mut state = ReconciledState::default();
        let _ = apply_snapshot(&mut state, sample_snapshot(100.0), 1);

        let mut replacement = sample_snapshot(175.0);
        replacement.leader = None;
        replacement.time_remaining = 30;
        let _ = apply_snapshot(&mut state, replacement.clone(), 2);

        assert_eq!(state.snapshot, Some(replacement));
    }

    #[test]
    fn sequence_markers_are_strictly_increasing() {
        let sequence = UpdateSequence::default();
        let first = sequence.begin();
        let second = sequence.begin();
        assert!(second > first);
    }

    #[test]
    fn throttle_drops_calls_inside_window() {
        let mut throttle = SnapshotThrottle::new(Duration::from_secs(2));
        let start = Instant::now();

        assert!(throttle.admit(false, start));
        assert!(!throttle.admit(false, start + Duration::from_millis(500)));
        assert!(throttle.admit(false, start + Duration::from_millis(2_500)));
    }

    #[test]
    fn throttle_always_admits_forced_calls() {
        let mut throttle = SnapshotThrottle::new(Duration::from_secs(2));
        let start = Instant::now();

        assert!(throttle.admit(false, start));
        assert!(throttle.admit(true, start + Duration::from_millis(10)));
        // A forced call still restarts the window.
        assert!(!throttle.admit(false, start + Duration::from_millis(20)));
    }

    #[test]
    fn reconnect_delay_grows_and_caps_at_thirty_seconds() {
        let first = reconnect_delay(1);
        assert!(first >= Duration::from_millis(1_000));
        assert!(first < Duration::from_millis(1_250));

        let second = reconnect_delay(2);
        assert!(second >= Duration::from_millis(2_000));
        assert!(second < Duration::from_millis(2_250));

        assert_eq!(reconnect_delay(10), Duration::from_millis(30_000));
    }

    #[tokio::test]
    async fn torn_down_view_processes_nothing() {
        let config = LiveViewArgs {
            auction_id: "a-17".to_string(),
            api_base_url: Some("http://127.0.0.1:9".to_string()),
            ws_base_url: Some("ws://127.0.0.1:9".to_string()),
            ..LiveViewArgs::default()
        }
        .normalize()
        .expect("test config should be valid");

        let (events, mut receiver) = broadcast::channel(16);
        let shared = Arc::new(SyncShared::new(config, SessionContext::anonymous(), events));
        shared.cancel_token.cancel();

        let (_commands, command_rx) = mpsc::channel(4);
        run_live_view(Arc::clone(&shared), command_rx).await;

        let status = shared.status_store.read().await.clone();
        assert_eq!(status.state, ConnectionState::Stopped);
        assert!(shared.current_snapshot().is_none());

        // The only event a pre-cancelled view may publish is its stop status.
        while let Ok(event) = receiver.try_recv() {
            assert!(matches!(event, AuctionEvent::Status(_)));
        }
    }
}
