//! Composed analysis pipeline
//!
//! `AnalysisService` is what the AutoMix engine actually talks to: a
//! read-through cache in front of the worker-isolated gateway, with
//! request deduplication so a burst of identical requests spawns a
//! single worker.

use crate::cache::AnalysisCache;
use crate::error::{AnalysisError, Result};
use crate::gateway::{Analyser, AnalyserGateway};
use crate::single_flight::SingleFlight;
use nocturne_core::analysis::{AdvancedTransition, AudioAnalysis, TransitionProposal};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum interval between repeated warnings for the same request key
const WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Cache + gateway + single-flight, as one service value
///
/// Shared across the AutoMix engine's fetch workers; all methods block
/// the calling thread and are safe to call concurrently.
pub struct AnalysisService<A: Analyser> {
    cache: AnalysisCache,
    gateway: AnalyserGateway<A>,
    analyses: SingleFlight<AudioAnalysis>,
    proposals: SingleFlight<TransitionProposal>,
    long_mixes: SingleFlight<AdvancedTransition>,
    warned_at: Mutex<HashMap<String, Instant>>,
}

impl<A: Analyser> AnalysisService<A> {
    pub fn new(cache: AnalysisCache, analyser: A) -> Self {
        Self {
            cache,
            gateway: AnalyserGateway::new(analyser),
            analyses: SingleFlight::new(),
            proposals: SingleFlight::new(),
            long_mixes: SingleFlight::new(),
            warned_at: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch an analysis, preferring the cache.
    ///
    /// Concurrent identical requests share one gateway call. Fresh
    /// results are written through the cache before being returned.
    pub fn analysis(&self, path: &Path, window: f64, head: bool) -> Result<AudioAnalysis> {
        let key = if head {
            format!("{}|head|{}", path.display(), window)
        } else {
            format!("{}|{}", path.display(), window)
        };

        let outcome = self.analyses.run(&key, || {
            if let Some(hit) = self.cache.get(path, window, head) {
                return Ok(hit);
            }
            let fresh = if head {
                self.gateway.analyze_head(path, window)
            } else {
                self.gateway.analyze(path, window)
            }
            .map_err(|e| e.to_string())?;

            self.cache.put(path, &fresh, head);
            Ok(fresh.sanitized())
        });

        self.surface(&key, outcome)
    }

    /// Short-mix proposal for a pair of tracks. Never cached; proposals
    /// depend on the pair, not on a single file.
    pub fn proposal(&self, current: &Path, next: &Path) -> Result<TransitionProposal> {
        let key = format!("{}|{}|proposal", current.display(), next.display());
        let outcome = self.proposals.run(&key, || {
            self.gateway
                .suggest_transition(current, next)
                .map_err(|e| e.to_string())
        });
        self.surface(&key, outcome)
    }

    /// Mashup plan for a pair of tracks
    pub fn long_mix(&self, current: &Path, next: &Path) -> Result<AdvancedTransition> {
        let key = format!("{}|{}|longmix", current.display(), next.display());
        let outcome = self.long_mixes.run(&key, || {
            self.gateway
                .suggest_long_mix(current, next)
                .map_err(|e| e.to_string())
        });
        self.surface(&key, outcome)
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    /// Convert a broadcast outcome back into a typed error, warning at
    /// most once per key per interval.
    fn surface<T>(&self, key: &str, outcome: std::result::Result<T, String>) -> Result<T> {
        match outcome {
            Ok(value) => Ok(value),
            Err(message) => {
                if self.should_warn(key) {
                    tracing::warn!("analysis failed for {}: {}", key, message);
                }
                Err(AnalysisError::AnalyserUnavailable(message))
            }
        }
    }

    fn should_warn(&self, key: &str) -> bool {
        let mut warned = match self.warned_at.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        match warned.get(key) {
            Some(last) if now.duration_since(*last) < WARN_INTERVAL => false,
            _ => {
                warned.insert(key.to_string(), now);
                true
            }
        }
    }
}
