//! Nocturne - Analysis Pipeline
//!
//! Offline audio analysis for the AutoMix engine: a persistent,
//! validity-checked cache of analyser results and a strongly-typed
//! gateway over the four native analyser operations.
//!
//! This crate provides:
//! - `AnalysisCache`: keyed, versioned, mtime/size-validated store
//! - `SingleFlight`: deduplication of concurrent identical requests
//! - `AnalyserGateway`: worker-isolated analyser calls with timeouts
//! - `AnalysisService`: the composed read-through pipeline
//!
//! # Architecture
//!
//! The analyser itself lives behind the [`Analyser`] trait; this crate
//! never inspects audio bytes. Every gateway call runs on a disposable
//! worker thread so that a crash or hang in native code cannot take the
//! main loop with it. Successful analyses are written through the cache
//! and validated again on every read.

#![forbid(unsafe_code)]

mod cache;
mod error;
mod gateway;
mod service;
mod single_flight;

pub use cache::AnalysisCache;
pub use error::{AnalysisError, Result};
pub use gateway::{Analyser, AnalyserGateway, FULL_TIMEOUT, HEAD_TIMEOUT};
pub use service::AnalysisService;
pub use single_flight::SingleFlight;
