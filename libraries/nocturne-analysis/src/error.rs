//! Error types for the analysis pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Analysis pipeline errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The analyser worker crashed, hung past its deadline, returned
    /// nothing, or is missing on this platform
    #[error("Analyser unavailable: {0}")]
    AnalyserUnavailable(String),

    /// The audio file is not reachable on disk
    #[error("File not reachable: {0}")]
    FileNotReachable(PathBuf),

    /// The track has no local path to analyse
    #[error("Track has no local path")]
    NoPath,

    /// Cache storage error
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;
