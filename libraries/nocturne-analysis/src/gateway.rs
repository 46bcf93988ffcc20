//! Analyser gateway
//!
//! Strongly-typed wrapper over the four native analyser operations.
//! Every call runs on a disposable worker thread with a hard deadline,
//! so a crash or hang inside native code can never stall the main loop
//! or the scheduler. A worker that misses its deadline is abandoned.

use crate::error::{AnalysisError, Result};
use crossbeam_channel::{bounded, RecvTimeoutError};
use nocturne_core::analysis::{AdvancedTransition, AudioAnalysis, TransitionProposal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Deadline for head analyses (cheap, intro-only)
pub const HEAD_TIMEOUT: Duration = Duration::from_secs(4);
/// Deadline for full analyses and mix suggestions
pub const FULL_TIMEOUT: Duration = Duration::from_secs(30);

/// Analysis window bounds in seconds
const MIN_WINDOW: f64 = 10.0;
const MAX_WINDOW: f64 = 300.0;

/// The native analyser contract
///
/// Implementations examine audio bytes; nothing else in the AutoMix
/// engine does. `None` means the analyser could not produce a result
/// for the given input, which the gateway surfaces as
/// [`AnalysisError::AnalyserUnavailable`].
pub trait Analyser: Send + Sync + 'static {
    /// Full analysis, covering head and tail. Expensive.
    fn analyze(&self, path: &Path, max_window: f64) -> Option<AudioAnalysis>;

    /// Fast analysis covering only the intro region
    fn analyze_head(&self, path: &Path, max_window: f64) -> Option<AudioAnalysis>;

    /// Short-mix proposal for a pair of tracks
    fn suggest_transition(&self, current: &Path, next: &Path) -> Option<TransitionProposal>;

    /// Long automation-rich mashup plan for a pair of tracks
    fn suggest_long_mix(&self, current: &Path, next: &Path) -> Option<AdvancedTransition>;
}

impl<A: Analyser> Analyser for Arc<A> {
    fn analyze(&self, path: &Path, max_window: f64) -> Option<AudioAnalysis> {
        (**self).analyze(path, max_window)
    }

    fn analyze_head(&self, path: &Path, max_window: f64) -> Option<AudioAnalysis> {
        (**self).analyze_head(path, max_window)
    }

    fn suggest_transition(&self, current: &Path, next: &Path) -> Option<TransitionProposal> {
        (**self).suggest_transition(current, next)
    }

    fn suggest_long_mix(&self, current: &Path, next: &Path) -> Option<AdvancedTransition> {
        (**self).suggest_long_mix(current, next)
    }
}

/// Worker-isolated front end over an [`Analyser`]
pub struct AnalyserGateway<A: Analyser> {
    analyser: Arc<A>,
}

impl<A: Analyser> AnalyserGateway<A> {
    pub fn new(analyser: A) -> Self {
        Self {
            analyser: Arc::new(analyser),
        }
    }

    /// Full analysis of `path`, analysing at most `max_window` seconds
    pub fn analyze(&self, path: &Path, max_window: f64) -> Result<AudioAnalysis> {
        self.require_reachable(path)?;
        let window = clamp_window(max_window);
        let path = path.to_path_buf();
        self.isolated("analyze", FULL_TIMEOUT, move |a| a.analyze(&path, window))
    }

    /// Head-only analysis of `path`
    pub fn analyze_head(&self, path: &Path, max_window: f64) -> Result<AudioAnalysis> {
        self.require_reachable(path)?;
        let window = clamp_window(max_window);
        let path = path.to_path_buf();
        self.isolated("analyze_head", HEAD_TIMEOUT, move |a| {
            a.analyze_head(&path, window)
        })
    }

    /// Short-mix proposal for the current/next pair
    pub fn suggest_transition(&self, current: &Path, next: &Path) -> Result<TransitionProposal> {
        self.require_reachable(current)?;
        self.require_reachable(next)?;
        let (current, next) = (current.to_path_buf(), next.to_path_buf());
        self.isolated("suggest_transition", FULL_TIMEOUT, move |a| {
            a.suggest_transition(&current, &next)
        })
    }

    /// Mashup plan for the current/next pair
    pub fn suggest_long_mix(&self, current: &Path, next: &Path) -> Result<AdvancedTransition> {
        self.require_reachable(current)?;
        self.require_reachable(next)?;
        let (current, next) = (current.to_path_buf(), next.to_path_buf());
        self.isolated("suggest_long_mix", FULL_TIMEOUT, move |a| {
            a.suggest_long_mix(&current, &next)
        })
    }

    fn require_reachable(&self, path: &Path) -> Result<()> {
        if path.is_file() {
            Ok(())
        } else {
            Err(AnalysisError::FileNotReachable(PathBuf::from(path)))
        }
    }

    /// Run one analyser call on a disposable worker.
    ///
    /// A panic in the worker drops the sender, which surfaces as a
    /// disconnect; a deadline miss abandons the worker entirely.
    fn isolated<T, F>(&self, op: &'static str, timeout: Duration, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&A) -> Option<T> + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let analyser = Arc::clone(&self.analyser);

        let spawned = thread::Builder::new()
            .name(format!("analyser-{}", op))
            .spawn(move || {
                let _ = tx.send(call(&analyser));
            });
        if let Err(e) = spawned {
            return Err(AnalysisError::AnalyserUnavailable(format!(
                "could not spawn {} worker: {}",
                op, e
            )));
        }

        match rx.recv_timeout(timeout) {
            Ok(Some(result)) => Ok(result),
            Ok(None) => Err(AnalysisError::AnalyserUnavailable(format!(
                "{} produced no result",
                op
            ))),
            Err(RecvTimeoutError::Timeout) => Err(AnalysisError::AnalyserUnavailable(format!(
                "{} timed out after {:?}",
                op, timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(AnalysisError::AnalyserUnavailable(
                format!("{} worker crashed", op),
            )),
        }
    }
}

fn clamp_window(window: f64) -> f64 {
    window.clamp(MIN_WINDOW, MAX_WINDOW)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nocturne_core::analysis::ANALYSIS_VERSION;
    use std::io::Write;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    fn dummy_analysis(window: f64) -> AudioAnalysis {
        AudioAnalysis {
            version: ANALYSIS_VERSION,
            analyze_window: window,
            duration: 180.0,
            bpm: None,
            bpm_confidence: None,
            first_beat_pos: None,
            key_root: None,
            key_mode: None,
            key_confidence: None,
            camelot_key: None,
            loudness: None,
            fade_in_pos: 0.0,
            fade_out_pos: 180.0,
            cut_in_pos: None,
            cut_out_pos: None,
            vocal_in_pos: None,
            vocal_out_pos: None,
            vocal_last_in_pos: None,
            drop_pos: None,
            mix_start_pos: None,
            mix_center_pos: None,
            mix_end_pos: None,
            outro_energy_level: None,
            energy_profile: None,
        }
    }

    /// Analyser whose behaviour is scripted per test
    struct Scripted {
        mode: &'static str,
        windows_seen: AtomicU64,
    }

    impl Analyser for Scripted {
        fn analyze(&self, _path: &Path, max_window: f64) -> Option<AudioAnalysis> {
            self.windows_seen
                .store(max_window.to_bits(), Ordering::SeqCst);
            match self.mode {
                "none" => None,
                "panic" => panic!("native analyser fell over"),
                _ => Some(dummy_analysis(max_window)),
            }
        }

        fn analyze_head(&self, path: &Path, max_window: f64) -> Option<AudioAnalysis> {
            if self.mode == "hang" {
                thread::sleep(Duration::from_secs(60));
            }
            self.analyze(path, max_window)
        }

        fn suggest_transition(&self, _c: &Path, _n: &Path) -> Option<TransitionProposal> {
            None
        }

        fn suggest_long_mix(&self, _c: &Path, _n: &Path) -> Option<AdvancedTransition> {
            None
        }
    }

    fn audio_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("track.flac");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"pcm-ish").unwrap();
        path
    }

    fn gateway(mode: &'static str) -> AnalyserGateway<Scripted> {
        AnalyserGateway::new(Scripted {
            mode,
            windows_seen: AtomicU64::new(0),
        })
    }

    #[test]
    fn successful_call_returns_result() {
        let dir = TempDir::new().unwrap();
        let file = audio_file(&dir);
        let g = gateway("ok");
        let analysis = g.analyze(&file, 60.0).unwrap();
        assert_eq!(analysis.analyze_window, 60.0);
    }

    #[test]
    fn window_is_clamped() {
        let dir = TempDir::new().unwrap();
        let file = audio_file(&dir);

        let g = gateway("ok");
        assert_eq!(g.analyze(&file, 3.0).unwrap().analyze_window, 10.0);
        assert_eq!(g.analyze(&file, 900.0).unwrap().analyze_window, 300.0);
    }

    #[test]
    fn missing_file_fails_before_spawning() {
        let g = gateway("ok");
        let err = g.analyze(Path::new("/no/such/file.flac"), 60.0);
        assert!(matches!(err, Err(AnalysisError::FileNotReachable(_))));
        assert_eq!(g.analyser.windows_seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn null_result_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let file = audio_file(&dir);
        let g = gateway("none");
        assert!(matches!(
            g.analyze(&file, 60.0),
            Err(AnalysisError::AnalyserUnavailable(_))
        ));
    }

    #[test]
    fn worker_panic_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let file = audio_file(&dir);
        let g = gateway("panic");
        assert!(matches!(
            g.analyze(&file, 60.0),
            Err(AnalysisError::AnalyserUnavailable(_))
        ));
    }

    #[test]
    fn head_timeout_abandons_worker() {
        // The scripted analyser sleeps for a minute; the head deadline
        // is 4 seconds, so this must come back unavailable (and well
        // before the sleep finishes, or the test itself would time out)
        let dir = TempDir::new().unwrap();
        let file = audio_file(&dir);
        let g = gateway("hang");

        let start = std::time::Instant::now();
        let result = g.analyze_head(&file, 60.0);
        assert!(matches!(
            result,
            Err(AnalysisError::AnalyserUnavailable(_))
        ));
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
