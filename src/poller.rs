use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::{stream, StreamExt};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::api::latency::CycleLatency;
use crate::config::{BackoffConfig, Config};
use crate::db::store::GameStore;
use crate::error::{ItemError, TransportError};
use crate::fetcher::{extract_live_games, FeedSource, LiveGame};
use crate::state::GameCache;
use crate::transformer::{transform_game, TransformOptions};
use crate::types::WinProbability;

/// Scheduling and mapping knobs for the poller.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub poll_interval: Duration,
    pub backoff: BackoffConfig,
    pub live_statuses: Vec<String>,
    pub max_concurrent_fetches: usize,
    pub transform: TransformOptions,
}

impl PollerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            poll_interval: cfg.poll_interval,
            backoff: cfg.backoff,
            live_statuses: cfg.live_statuses.clone(),
            max_concurrent_fetches: cfg.max_concurrent_fetches.max(1),
            transform: TransformOptions::from_config(cfg),
        }
    }
}

/// Per-cycle counts, logged at the end of every cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Games the scoreboard reported as live.
    pub live: usize,
    /// Games whose record reached the cache this cycle.
    pub updated: usize,
    /// Games whose record also reached the durable store.
    pub persisted: usize,
    /// Games that hit a transport, mapping or store error.
    pub failed: usize,
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// Discovery worked; individual games may still have failed.
    Succeeded(CycleReport),
    /// Discovery itself failed. The scheduler backs off.
    Failed(TransportError),
    /// Another cycle was still running; nothing was done.
    Skipped,
}

/// Drives fetch → transform → cache + store on a fixed cadence.
///
/// - Only one cycle runs at a time; a trigger during a running cycle is a no-op.
/// - One game failing never stops the others.
/// - Only a failed scoreboard fetch counts as a failed cycle and stretches the
///   delay before the next one.
/// - A store failure leaves that game's cache update in place: the cache always
///   shows the freshest successful transform.
pub struct Poller {
    feed: Arc<dyn FeedSource>,
    store: Arc<dyn GameStore>,
    cache: Arc<GameCache>,
    health: Arc<HealthState>,
    latency: Arc<CycleLatency>,
    settings: PollerSettings,
    /// Held for the whole cycle.
    cycle_lock: Mutex<()>,
    consecutive_failures: AtomicU32,
    stopping: AtomicBool,
    shutdown: Notify,
}

impl Poller {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        store: Arc<dyn GameStore>,
        cache: Arc<GameCache>,
        health: Arc<HealthState>,
        latency: Arc<CycleLatency>,
        settings: PollerSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            feed,
            store,
            cache,
            health,
            latency,
            settings,
            cycle_lock: Mutex::new(()),
            consecutive_failures: AtomicU32::new(0),
            stopping: AtomicBool::new(false),
            shutdown: Notify::new(),
        })
    }

    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run())
    }

    /// Poll until [`Poller::shutdown`] is called. A cycle that is already running
    /// finishes before this returns; only the sleep between cycles is cut short.
    pub async fn run(self: Arc<Self>) {
        info!(
            interval_s = self.settings.poll_interval.as_secs(),
            live_statuses = ?self.settings.live_statuses,
            "Poller started"
        );

        while !self.stopping.load(Ordering::Acquire) {
            match self.run_cycle().await {
                CycleOutcome::Succeeded(report) => info!(
                    live = report.live,
                    updated = report.updated,
                    persisted = report.persisted,
                    failed = report.failed,
                    "Poll cycle complete: {} live, {} updated, {} failed",
                    report.live,
                    report.updated,
                    report.failed,
                ),
                CycleOutcome::Failed(e) => error!(
                    operation = %e.operation,
                    consecutive_failures = self.consecutive_failures(),
                    "Poll cycle failed: {e}"
                ),
                CycleOutcome::Skipped => {}
            }

            let delay = self.next_delay();
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Poller stopped");
    }

    /// Ask the run loop to stop after the current cycle (if any).
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::Release);
        self.shutdown.notify_one();
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Delay before the next cycle given the current failure streak.
    pub fn next_delay(&self) -> Duration {
        let failures = self.consecutive_failures();
        let delay = backoff_delay(self.settings.poll_interval, &self.settings.backoff, failures);
        if failures > 0 {
            info!(
                delay_ms = delay.as_millis() as u64,
                consecutive_failures = failures,
                "Backing off before next poll"
            );
        }
        delay
    }

    /// Run one discovery + per-game pass unless one is already in flight.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!("Poll cycle skipped: previous cycle still running");
            return CycleOutcome::Skipped;
        };

        self.health.set_cycle_running(true);
        let started = Instant::now();
        let outcome = self.do_cycle().await;
        self.latency.record(started.elapsed());
        self.health.set_cycle_running(false);
        outcome
    }

    async fn do_cycle(&self) -> CycleOutcome {
        let scoreboard = match self.feed.discover().await {
            Ok(doc) => doc,
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                self.health.record_failure(failures);
                return CycleOutcome::Failed(e);
            }
        };

        let live = extract_live_games(&scoreboard, &self.settings.live_statuses);
        drop(scoreboard);

        let mut report = CycleReport {
            live: live.len(),
            ..CycleReport::default()
        };

        let results: Vec<(String, ItemResult)> = stream::iter(live)
            .map(|game| async move {
                let game_id = game.game_id.clone();
                (game_id, self.process_game(game).await)
            })
            .buffer_unordered(self.settings.max_concurrent_fetches.max(1))
            .collect()
            .await;

        for (game_id, result) in results {
            match result {
                ItemResult { cached, error: None } => {
                    report.updated += usize::from(cached);
                    report.persisted += 1;
                }
                ItemResult {
                    cached,
                    error: Some(e),
                } => {
                    report.updated += usize::from(cached);
                    report.failed += 1;
                    warn!(game_id = %game_id, kind = e.kind(), "Game failed: {e}");
                }
            }
        }

        self.consecutive_failures.store(0, Ordering::Release);
        self.health.record_success(Utc::now(), report.updated);
        CycleOutcome::Succeeded(report)
    }

    async fn process_game(&self, game: LiveGame) -> ItemResult {
        let summary = match self.feed.detail(&game.game_id).await {
            Ok(doc) => doc,
            Err(e) => return ItemResult::failed(false, e.into()),
        };
        let observed_at = Utc::now();

        let payload = match transform_game(&game.entry, &summary, &self.settings.transform, observed_at)
        {
            Ok(p) => p,
            Err(e) => return ItemResult::failed(false, e.into()),
        };

        let score = format!("{}-{}", payload.game.home_team.score, payload.game.away_team.score);
        self.cache.upsert(payload.clone());

        if let Err(e) = self.store.upsert(&payload).await {
            return ItemResult::failed(true, e.into());
        }

        let home_win_prob = payload
            .events
            .last()
            .and_then(|e| e.win_probability)
            .map(WinProbability::value);
        info!(
            game_id = %payload.game_id(),
            status = %payload.game.status,
            quarter = %payload.game.quarter,
            score = %score,
            home_win_prob = ?home_win_prob,
            "Game processed"
        );
        ItemResult {
            cached: true,
            error: None,
        }
    }
}

/// What happened to one game in a cycle. `cached` can be true alongside an
/// error when only the durable write failed.
struct ItemResult {
    cached: bool,
    error: Option<ItemError>,
}

impl ItemResult {
    fn failed(cached: bool, error: ItemError) -> Self {
        Self {
            cached,
            error: Some(error),
        }
    }
}

/// `poll_interval` with no failures, otherwise
/// `min(initial * multiplier^(failures - 1), max)`.
pub fn backoff_delay(poll_interval: Duration, backoff: &BackoffConfig, consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
        return poll_interval;
    }
    let exponent = (consecutive_failures - 1).min(i32::MAX as u32) as i32;
    let secs = backoff.initial.as_secs_f64() * backoff.multiplier.powi(exponent);
    let max = backoff.max.as_secs_f64();
    if secs.is_finite() && secs < max {
        Duration::from_secs_f64(secs.max(0.0))
    } else {
        backoff.max
    }
}
