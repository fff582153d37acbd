//! Cache freshness manager.
//!
//! Owns the serving state and decides when it must be rebuilt. Readers take
//! an `Arc<ServingState>` snapshot and never wait on a refresh: a refresh
//! builds a complete new state on a blocking task and publishes it with a
//! single swap. Only the most recently requested refresh may commit.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::corpus::{self, CorpusSource};
use crate::error::LoadWarning;
use crate::serving::ServingState;
use crate::upstream::UpstreamProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Freshness {
    Fresh,
    Stale,
    Refreshing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Committed { version: String },
    /// A newer refresh was requested before this one finished.
    Superseded,
    Failed(String),
}

/// Snapshot of the manager for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub channel: String,
    pub version: String,
    pub content_hash: String,
    pub documents: usize,
    pub sections: usize,
    pub freshness: Freshness,
    pub pending_version: Option<String>,
    pub last_error: Option<String>,
    pub warnings: Vec<LoadWarning>,
}

struct Status {
    freshness: Freshness,
    /// Upstream version observed but not yet served.
    pending_version: Option<String>,
    last_error: Option<String>,
}

pub struct FreshnessManager {
    source: CorpusSource,
    serving: watch::Sender<Arc<ServingState>>,
    // Also serialises commits.
    status: Mutex<Status>,
    generation: AtomicU64,
    inflight: Mutex<Option<CancellationToken>>,
}

impl FreshnessManager {
    /// Start serving `initial`, which is assumed to match the source.
    #[must_use]
    pub fn new(source: CorpusSource, initial: ServingState) -> Self {
        let (serving, _) = watch::channel(Arc::new(initial));
        Self {
            source,
            serving,
            status: Mutex::new(Status {
                freshness: Freshness::Fresh,
                pending_version: None,
                last_error: None,
            }),
            generation: AtomicU64::new(0),
            inflight: Mutex::new(None),
        }
    }

    /// Load the source and start serving it.
    ///
    /// A failed initial load does not prevent startup: the manager serves an
    /// empty corpus and starts out Stale so the next check retries.
    #[must_use]
    pub fn bootstrap(source: CorpusSource) -> Self {
        match corpus::load(&source) {
            Ok(corpus) => Self::new(source, ServingState::build(corpus, None)),
            Err(e) => {
                warn!(
                    "Initial load of channel '{}' failed, serving an empty corpus: {e}",
                    source.channel
                );
                let empty = ServingState::empty(&source.channel);
                let manager = Self::new(source, empty);
                {
                    let mut status = manager.lock_status();
                    status.freshness = Freshness::Stale;
                    status.last_error = Some(e.to_string());
                }
                manager
            }
        }
    }

    #[must_use]
    pub fn source(&self) -> &CorpusSource {
        &self.source
    }

    /// The state queries should run against.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ServingState> {
        self.serving.borrow().clone()
    }

    #[must_use]
    pub fn freshness(&self) -> Freshness {
        self.lock_status().freshness
    }

    #[must_use]
    pub fn status(&self) -> CacheStatus {
        let state = self.snapshot();
        let status = self.lock_status();
        CacheStatus {
            channel: state.manifest.channel.clone(),
            version: state.manifest.version.clone(),
            content_hash: state.manifest.content_hash.clone(),
            documents: state.corpus.documents.len(),
            sections: state.index.section_count(),
            freshness: status.freshness,
            pending_version: status.pending_version.clone(),
            last_error: status.last_error.clone(),
            warnings: state.corpus.warnings.clone(),
        }
    }

    /// Record the version upstream reports. A version other than the one
    /// being served makes a Fresh cache Stale.
    pub fn observe_upstream(&self, version: &str) -> Freshness {
        let serving = self.snapshot().manifest.version.clone();
        let mut status = self.lock_status();
        if serving == version {
            return status.freshness;
        }

        if status.pending_version.as_deref() != Some(version) {
            info!("Upstream reports version {version}, serving {serving}");
        }
        status.pending_version = Some(version.to_string());
        if status.freshness == Freshness::Fresh {
            status.freshness = Freshness::Stale;
        }
        status.freshness
    }

    /// Record the content hash of the cache directory as it is on disk.
    pub fn observe_content_hash(&self, content_hash: &str) -> Freshness {
        let serving = self.snapshot().manifest.content_hash.clone();
        let mut status = self.lock_status();
        if serving != content_hash && status.freshness == Freshness::Fresh {
            info!("Cache content of channel '{}' changed on disk", self.source.channel);
            status.freshness = Freshness::Stale;
        }
        status.freshness
    }

    /// Rebuild the serving state from disk.
    ///
    /// Cancels any build still in flight. On failure the previous state keeps
    /// serving and the manager is left Stale.
    pub async fn refresh(&self) -> RefreshOutcome {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        if let Some(previous) = self.lock_inflight().replace(token.clone()) {
            previous.cancel();
        }

        // Without a newer upstream version the served one still applies.
        let served = self.snapshot().manifest.upstream_version.clone();
        let target = {
            let mut status = self.lock_status();
            status.freshness = Freshness::Refreshing;
            status.pending_version.clone().or(served)
        };
        info!(
            "Refresh #{generation} of channel '{}' started",
            self.source.channel
        );

        let source = self.source.clone();
        let build_target = target.clone();
        let built = tokio::task::spawn_blocking(move || {
            corpus::load_cancellable(&source, &token)
                .map(|corpus| ServingState::build(corpus, build_target))
        })
        .await;

        let mut status = self.lock_status();
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Refresh #{generation} superseded, discarding its result");
            return RefreshOutcome::Superseded;
        }
        self.lock_inflight().take();

        let error = match built {
            Ok(Ok(state)) => {
                let version = state.manifest.version.clone();
                info!(
                    "Refresh #{generation} committed version {version} ({} documents, {} sections)",
                    state.corpus.documents.len(),
                    state.index.section_count()
                );
                self.serving.send_replace(Arc::new(state));

                // A newer upstream version may have been observed meanwhile.
                if status.pending_version.is_some() && status.pending_version != target {
                    status.freshness = Freshness::Stale;
                } else {
                    status.freshness = Freshness::Fresh;
                    status.pending_version = None;
                }
                status.last_error = None;
                return RefreshOutcome::Committed { version };
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("refresh task failed: {e}"),
        };

        warn!("Refresh #{generation} failed, keeping the previous corpus: {error}");
        status.freshness = Freshness::Stale;
        status.last_error = Some(error.clone());
        RefreshOutcome::Failed(error)
    }

    /// One scheduled check: ask upstream (if configured), fingerprint the
    /// cache directory, and refresh when Stale.
    pub async fn check_once(&self, probe: Option<&UpstreamProbe>) -> Freshness {
        if let Some(probe) = probe {
            match probe.fetch_version().await {
                Ok(version) => {
                    self.observe_upstream(&version);
                }
                Err(e) => warn!("Upstream check against {} failed: {e:#}", probe.url()),
            }
        }

        let source = self.source.clone();
        match tokio::task::spawn_blocking(move || corpus::fingerprint(&source)).await {
            Ok(Ok(hash)) => {
                self.observe_content_hash(&hash);
            }
            Ok(Err(e)) => warn!("Fingerprint of channel '{}' failed: {e}", self.source.channel),
            Err(e) => warn!("Fingerprint task failed: {e}"),
        }

        if self.freshness() == Freshness::Stale {
            self.refresh().await;
        }
        self.freshness()
    }

    /// Run [`check_once`](Self::check_once) every `interval` until `shutdown`.
    pub async fn run_scheduler(
        self: Arc<Self>,
        interval: Duration,
        probe: Option<UpstreamProbe>,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let freshness = self.check_once(probe.as_ref()).await;
            debug!("Scheduled freshness check: {freshness:?}");
        }

        info!("Freshness scheduler stopped");
    }

    fn lock_status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_inflight(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
