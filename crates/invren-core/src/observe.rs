//! Injected event sinks for the resolver and the governor.
//!
//! Neither component logs through global state directly; they hand typed
//! events to an [`Observer`]. [`TracingObserver`] forwards them to `tracing`.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::resolve::{CollectorStrategy, SiteStrategy};

/// Something noteworthy that happened while resolving a document.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionEvent {
    /// Step A picked a collector.
    CollectorResolved {
        provider: String,
        key: String,
        strategy: CollectorStrategy,
    },
    /// The invoice address is the operator's own and was dropped.
    OperatorAddressDiscarded { address: String },
    /// Step B picked a site.
    SiteResolved {
        entreprise: String,
        site_id: String,
        strategy: SiteStrategy,
    },
    /// A lone name match was accepted with nothing to corroborate it.
    UnvalidatedFallback { entreprise: String, site_id: String },
}

/// Governor state transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum GovernorEvent {
    Admitted {
        date: NaiveDate,
        daily_count: u32,
        window_count: usize,
    },
    /// The minute window is full; the caller sleeps for `wait`.
    Throttled { wait: Duration, window_count: usize },
    DailyLimitReached {
        date: NaiveDate,
        count: u32,
        limit: u32,
    },
    /// The ledger file was unreadable and started over empty.
    LedgerReset { path: PathBuf, reason: String },
}

/// Receiver for resolver and governor events.
pub trait Observer: Send + Sync {
    fn on_resolution(&self, _event: &ResolutionEvent) {}

    fn on_governor(&self, _event: &GovernorEvent) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_resolution(&self, event: &ResolutionEvent) {
        match event {
            ResolutionEvent::CollectorResolved {
                provider,
                key,
                strategy,
            } => debug!("Collector {:?} -> {} ({})", provider, key, strategy),
            ResolutionEvent::OperatorAddressDiscarded { address } => {
                info!("Ignoring operator's own address {:?}", address)
            }
            ResolutionEvent::SiteResolved {
                entreprise,
                site_id,
                strategy,
            } => debug!("Site {:?} -> {} ({})", entreprise, site_id, strategy),
            ResolutionEvent::UnvalidatedFallback {
                entreprise,
                site_id,
            } => warn!(
                "Unvalidated fallback: {:?} -> {} without address or postal code",
                entreprise, site_id
            ),
        }
    }

    fn on_governor(&self, event: &GovernorEvent) {
        match event {
            GovernorEvent::Admitted {
                date,
                daily_count,
                window_count,
            } => debug!(
                "Call admitted ({} today on {}, {} in the last minute)",
                daily_count, date, window_count
            ),
            GovernorEvent::Throttled { wait, window_count } => info!(
                "Minute limit reached ({} calls), waiting {:.1}s",
                window_count,
                wait.as_secs_f64()
            ),
            GovernorEvent::DailyLimitReached { date, count, limit } => {
                warn!("Daily limit reached for {}: {}/{}", date, count, limit)
            }
            GovernorEvent::LedgerReset { path, reason } => warn!(
                "Rate ledger {} unreadable ({}), starting empty",
                path.display(),
                reason
            ),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    resolution: Mutex<Vec<ResolutionEvent>>,
    governor: Mutex<Vec<GovernorEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolution_events(&self) -> Vec<ResolutionEvent> {
        self.resolution
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn governor_events(&self) -> Vec<GovernorEvent> {
        self.governor
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl Observer for RecordingObserver {
    fn on_resolution(&self, event: &ResolutionEvent) {
        if let Ok(mut events) = self.resolution.lock() {
            events.push(event.clone());
        }
    }

    fn on_governor(&self, event: &GovernorEvent) {
        if let Ok(mut events) = self.governor.lock() {
            events.push(event.clone());
        }
    }
}
