//! Nocturne - AutoMix Core Types
//!
//! Shared domain types for the AutoMix engine, used by the analysis
//! pipeline and the playback orchestrator.
//!
//! This crate provides:
//! - The analysis result schema (`AudioAnalysis`, `TransitionProposal`,
//!   `AdvancedTransition`) produced by the native analyser
//! - The executable transition plan (`TransitionPlan`)
//! - Track descriptors with ReplayGain metadata (`TrackRef`)
//! - Fade curves, beat-grid math, and Camelot key helpers
//! - Process-global AutoMix configuration (`AutomixConfig`)
//!
//! # Architecture
//!
//! `nocturne-core` is completely platform-agnostic: no audio I/O, no
//! filesystem access, no threads. Everything here is a plain value type
//! so that the planner can stay a pure function and the cache can treat
//! analyses as immutable payloads.

#![forbid(unsafe_code)]

pub mod analysis;
pub mod beat;
pub mod camelot;
pub mod config;
pub mod curve;
pub mod plan;
pub mod track;

pub use analysis::{
    AdvancedTransition, AudioAnalysis, AutomationPoint, MixType, TransitionProposal,
    ANALYSIS_VERSION,
};
pub use config::{AutomixConfig, ReplayGainMode};
pub use curve::FadeCurve;
pub use plan::TransitionPlan;
pub use track::{ReplayGainInfo, TrackRef};
