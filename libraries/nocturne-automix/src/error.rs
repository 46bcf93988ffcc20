//! Error types for the AutoMix engine

use thiserror::Error;

/// AutoMix errors, in roughly ascending severity
#[derive(Debug, Error)]
pub enum AutomixError {
    /// The planner declined to produce a plan for this boundary.
    /// Harmless; monitoring continues and planning retries next tick.
    #[error("No viable transition plan: {0}")]
    PlanRejected(String),

    /// Analyser worker crashed, timed out, or is missing. AutoMix
    /// degrades to a hard cut for this boundary.
    #[error(transparent)]
    AnalyserUnavailable(#[from] nocturne_analysis::AnalysisError),

    /// The incoming engine failed to start or seek; the switch is
    /// committed immediately without a crossfade.
    #[error("Pending engine failed to start: {0}")]
    EnginePrimeFailure(String),

    /// Work resumed under a superseded session token. Never surfaced
    /// to the user; callers drop it silently.
    #[error("Session token superseded")]
    SessionStale,

    /// The engine does not support the requested capability
    #[error("Engine capability not supported: {0}")]
    Unsupported(&'static str),

    /// Generic playback engine failure
    #[error("Engine error: {0}")]
    Engine(String),
}

/// Result type for AutoMix operations
pub type Result<T> = std::result::Result<T, AutomixError>;
