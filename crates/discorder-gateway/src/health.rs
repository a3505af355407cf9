//! Passive provider health tracking, based on real request outcomes rather
//! than synthetic pings — a rolling 5-minute window of success/failure and
//! latency per provider.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

const WINDOW_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Ok,
    Degraded,
    Down,
    RateLimited,
    Unknown,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Degraded => write!(f, "degraded"),
            Self::Down => write!(f, "down"),
            Self::RateLimited => write!(f, "rate-limited"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealthEntry {
    pub name: String,
    pub status: ProviderStatus,
    pub avg_latency_ms: u64,
    pub requests_ok: u32,
    pub requests_err: u32,
}

struct InternalEntry {
    window: VecDeque<(Instant, bool, u64)>,
    rate_limited_until: Option<Instant>,
}

impl InternalEntry {
    fn new() -> Self {
        Self {
            window: VecDeque::new(),
            rate_limited_until: None,
        }
    }

    fn prune(&mut self) {
        let cutoff = Instant::now() - Duration::from_secs(WINDOW_SECS);
        while self.window.front().is_some_and(|(t, _, _)| *t < cutoff) {
            self.window.pop_front();
        }
    }

    fn derive_status(&self) -> ProviderStatus {
        if let Some(until) = self.rate_limited_until {
            if Instant::now() < until {
                return ProviderStatus::RateLimited;
            }
        }
        if self.window.is_empty() {
            return ProviderStatus::Unknown;
        }
        let total = self.window.len() as f64;
        let ok = self.window.iter().filter(|(_, ok, _)| *ok).count() as f64;
        let rate = ok / total;
        if rate > 0.8 {
            ProviderStatus::Ok
        } else if rate >= 0.5 {
            ProviderStatus::Degraded
        } else {
            ProviderStatus::Down
        }
    }

    fn avg_latency_ms(&self) -> u64 {
        if self.window.is_empty() {
            return 0;
        }
        let sum: u64 = self.window.iter().map(|(_, _, lat)| lat).sum();
        sum / self.window.len() as u64
    }
}

/// Records request outcomes per provider name and derives a status from the
/// rolling window, for surfacing in the `!status` command.
pub struct HealthTracker {
    entries: DashMap<String, InternalEntry>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn record_success(&self, provider: &str, latency_ms: u64) {
        let mut entry = self.entries.entry(provider.to_string()).or_insert_with(InternalEntry::new);
        entry.prune();
        entry.window.push_back((Instant::now(), true, latency_ms));
    }

    pub fn record_failure(&self, provider: &str, latency_ms: u64) {
        let mut entry = self.entries.entry(provider.to_string()).or_insert_with(InternalEntry::new);
        entry.prune();
        entry.window.push_back((Instant::now(), false, latency_ms));
    }

    pub fn record_rate_limited(&self, provider: &str, retry_after_ms: u64) {
        let mut entry = self.entries.entry(provider.to_string()).or_insert_with(InternalEntry::new);
        entry.rate_limited_until = Some(Instant::now() + Duration::from_millis(retry_after_ms));
    }

    pub fn snapshot(&self, provider: &str) -> ProviderHealthEntry {
        let mut entry = self.entries.entry(provider.to_string()).or_insert_with(InternalEntry::new);
        entry.prune();
        ProviderHealthEntry {
            name: provider.to_string(),
            status: entry.derive_status(),
            avg_latency_ms: entry.avg_latency_ms(),
            requests_ok: entry.window.iter().filter(|(_, ok, _)| *ok).count() as u32,
            requests_err: entry.window.iter().filter(|(_, ok, _)| !*ok).count() as u32,
        }
    }

    pub fn snapshot_all(&self) -> Vec<ProviderHealthEntry> {
        self.entries
            .iter()
            .map(|e| {
                let entry_ref = e.value();
                ProviderHealthEntry {
                    name: e.key().clone(),
                    status: entry_ref.derive_status(),
                    avg_latency_ms: entry_ref.avg_latency_ms(),
                    requests_ok: entry_ref.window.iter().filter(|(_, ok, _)| *ok).count() as u32,
                    requests_err: entry_ref.window.iter().filter(|(_, ok, _)| !*ok).count() as u32,
                }
            })
            .collect()
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_before_any_traffic() {
        let tracker = HealthTracker::new();
        assert_eq!(tracker.snapshot("ollama").status, ProviderStatus::Unknown);
    }

    #[test]
    fn mostly_successful_is_ok() {
        let tracker = HealthTracker::new();
        for _ in 0..9 {
            tracker.record_success("ollama", 50);
        }
        tracker.record_failure("ollama", 50);
        assert_eq!(tracker.snapshot("ollama").status, ProviderStatus::Ok);
    }

    #[test]
    fn mixed_results_is_degraded() {
        let tracker = HealthTracker::new();
        tracker.record_success("ollama", 50);
        tracker.record_failure("ollama", 50);
        assert_eq!(tracker.snapshot("ollama").status, ProviderStatus::Degraded);
    }

    #[test]
    fn mostly_failing_is_down() {
        let tracker = HealthTracker::new();
        tracker.record_success("ollama", 50);
        for _ in 0..5 {
            tracker.record_failure("ollama", 50);
        }
        assert_eq!(tracker.snapshot("ollama").status, ProviderStatus::Down);
    }

    #[test]
    fn rate_limited_overrides_window() {
        let tracker = HealthTracker::new();
        tracker.record_success("ollama", 50);
        tracker.record_rate_limited("ollama", 5000);
        assert_eq!(tracker.snapshot("ollama").status, ProviderStatus::RateLimited);
    }
}
