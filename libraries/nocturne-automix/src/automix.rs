//! AutoMix orchestrator
//!
//! Owns the engine pair, the scheduler, the session token, and the
//! state machine, and wires the planner to the analysis pipeline. All
//! mutations run under one lock; scheduler jobs and analysis workers
//! re-enter through a weak handle and validate the session token before
//! touching anything.
//!
//! Control flow per boundary: the playback loop calls
//! [`AutomixEngine::pump`] periodically; once the current track is
//! inside the monitor window the analyses are fetched on a worker, the
//! planner produces a plan, the plan is armed on the scheduler, and the
//! fire job runs the crossfade protocol against both engines.

use crate::engine::{EngineEvent, EngineFactory, PlayRequest};
use crate::error::{AutomixError, Result};
use crate::events::AutomixEvent;
use crate::gain;
use crate::pair::{EnginePair, EngineRole};
use crate::planner::{self, PlanRequest};
use crate::scheduler::{AudioClock, Scheduler, Ticker};
use crate::session::SessionToken;
use crate::state::{
    AutomixState, StateMachine, ABORT_RAMP_SECS, COOLDOWN_SECS, TEARDOWN_MARGIN_SECS,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use nocturne_analysis::{Analyser, AnalysisService};
use nocturne_core::analysis::{
    AdvancedTransition, AudioAnalysis, AutomationPoint, MixType, TransitionProposal,
};
use nocturne_core::plan::TransitionPlan;
use nocturne_core::{AutomixConfig, FadeCurve, TrackRef};
use std::sync::{Arc, Mutex, Weak};
use std::thread;

/// Pre-arm volume anchors this far ahead of the ramp start, in seconds
const PRE_ARM_SECS: f64 = 0.02;

/// Rate restoration ramp length and resolution
const RATE_RESTORE_SECS: f64 = 2.0;
const RATE_RESTORE_STEPS: u32 = 8;

/// Bass-swap filter sweep endpoints, in Hz
const BASS_SWAP_LOW_HZ: f64 = 10.0;
const BASS_SWAP_HIGH_HZ: f64 = 400.0;

/// Callback invoked exactly once per handover, when the logical
/// "now playing" flips to the next track
pub type SwitchCallback = Box<dyn Fn(&TrackRef, usize) + Send + Sync>;

/// Analyses and suggestions gathered for one boundary
struct PlanInputs {
    current: AudioAnalysis,
    current_is_full: bool,
    next: AudioAnalysis,
    proposal: Option<TransitionProposal>,
    advanced: Option<AdvancedTransition>,
}

enum FetchOutcome {
    Ready { token: u64, inputs: Box<PlanInputs> },
    Failed { token: u64, reason: String },
}

struct Core {
    config: AutomixConfig,
    state: StateMachine,
    pair: EnginePair,
    current: Option<TrackRef>,
    next: Option<(TrackRef, usize)>,
    paused: bool,
    personal_radio: bool,
    inputs: Option<PlanInputs>,
    fetching: bool,
    analyser_down: bool,
    active_plan: Option<TransitionPlan>,
    ui_committed: bool,
    events: Vec<AutomixEvent>,
    fetch_rx: Receiver<FetchOutcome>,
}

impl Core {
    fn eligible(&self) -> bool {
        self.config.enabled
            && self.config.analysis_supported
            && !self.personal_radio
            && !self.paused
            && !self.analyser_down
            && self.current.is_some()
            && self.next.is_some()
            && self.pair.has_primary()
    }

    fn emit(&mut self, event: AutomixEvent) {
        self.events.push(event);
    }

    fn set_state(&mut self, to: AutomixState) {
        let from = self.state.state();
        if self.state.transition(to) {
            self.emit(AutomixEvent::StateChanged { from, to });
        }
    }
}

struct Shared<A: Analyser> {
    weak: Weak<Shared<A>>,
    core: Mutex<Core>,
    service: Arc<AnalysisService<A>>,
    scheduler: Scheduler,
    session: Arc<SessionToken>,
    clock: Arc<dyn AudioClock>,
    factory: Box<dyn EngineFactory>,
    on_switch: SwitchCallback,
    fetch_tx: Sender<FetchOutcome>,
}

/// The AutoMix engine
///
/// Explicitly constructed with its collaborators and torn down on drop;
/// there are no ambient globals.
pub struct AutomixEngine<A: Analyser> {
    shared: Arc<Shared<A>>,
}

impl<A: Analyser> AutomixEngine<A> {
    pub fn new(
        config: AutomixConfig,
        service: Arc<AnalysisService<A>>,
        clock: Arc<dyn AudioClock>,
        factory: Box<dyn EngineFactory>,
        on_switch: SwitchCallback,
    ) -> Self {
        let session = Arc::new(SessionToken::new());
        let scheduler = Scheduler::new(clock.clone(), session.clone());
        let (fetch_tx, fetch_rx) = unbounded();
        let shared = Arc::new_cyclic(|weak| Shared {
            weak: weak.clone(),
            core: Mutex::new(Core {
                config,
                state: StateMachine::new(),
                pair: EnginePair::new(),
                current: None,
                next: None,
                paused: false,
                personal_radio: false,
                inputs: None,
                fetching: false,
                analyser_down: false,
                active_plan: None,
                ui_committed: false,
                events: Vec::new(),
                fetch_rx,
            }),
            service,
            scheduler,
            session,
            clock,
            factory,
            on_switch,
            fetch_tx,
        });
        Self { shared }
    }

    /// The shared scheduler (clones share one job queue)
    pub fn scheduler(&self) -> Scheduler {
        self.shared.scheduler.clone()
    }

    /// Spawn the background tick source driving the scheduler
    pub fn spawn_ticker(&self) -> Ticker {
        Ticker::spawn(self.shared.scheduler.clone())
    }

    pub fn session_token(&self) -> u64 {
        self.shared.session.current()
    }

    pub fn state(&self) -> AutomixState {
        self.shared.lock().state.state()
    }

    pub fn position(&self) -> f64 {
        self.shared.lock().pair.position()
    }

    pub fn config(&self) -> AutomixConfig {
        self.shared.lock().config.clone()
    }

    pub fn set_config(&self, config: AutomixConfig) {
        self.shared.lock().config = config;
    }

    pub fn set_enabled(&self, enabled: bool) {
        let mut core = self.shared.lock();
        core.config.enabled = enabled;
        if !enabled && core.state.is(AutomixState::Scheduled) {
            self.shared.cancel_scheduled(&mut core, "automix disabled");
        }
    }

    pub fn set_personal_radio(&self, on: bool) {
        self.shared.lock().personal_radio = on;
    }

    /// Start playback of `track`, replacing whatever is playing.
    ///
    /// Bumps the session token: all outstanding plans, jobs, and
    /// analysis replies for the previous track die silently.
    pub fn play(&self, track: TrackRef, next: Option<(TrackRef, usize)>) -> Result<()> {
        self.shared.session.bump();
        let mut core = self.shared.lock();
        self.shared.abort_transition(&mut core, "new play request");

        core.inputs = None;
        core.fetching = false;
        core.analyser_down = false;
        core.active_plan = None;
        core.ui_committed = false;

        let mut engine = self.shared.factory.create()?;
        engine.set_replay_gain(gain::replay_gain_linear(
            core.config.replay_gain_mode,
            track.replay_gain.as_ref(),
        ));
        engine.play(PlayRequest::immediate(engine_url(&track)))?;

        if let Some(mut old) = core.pair.set_primary(engine) {
            old.stop();
        }
        core.current = Some(track);
        core.next = next;
        core.paused = false;
        Ok(())
    }

    /// User pressed next (or picked another track): bump once for the
    /// skip, then start fresh playback, which bumps again and aborts
    /// any running crossfade.
    pub fn skip_to(&self, track: TrackRef, next: Option<(TrackRef, usize)>) -> Result<()> {
        self.shared.session.bump();
        self.play(track, next)
    }

    /// The queue changed; update (or clear) the upcoming track
    pub fn set_next(&self, next: Option<(TrackRef, usize)>) {
        let mut core = self.shared.lock();
        let changed = match (&core.next, &next) {
            (Some((a, _)), Some((b, _))) => a.id != b.id,
            (None, None) => false,
            _ => true,
        };
        core.next = next;
        if changed {
            core.inputs = None;
            core.analyser_down = false;
            if core.state.is(AutomixState::Scheduled) {
                self.shared.cancel_scheduled(&mut core, "queue changed");
            }
        }
    }

    /// User sought within the current track
    pub fn notify_seek(&self, _position: f64) {
        let mut core = self.shared.lock();
        if core.state.is(AutomixState::Scheduled) {
            // the armed trigger is anchored to the old position
            self.shared.cancel_scheduled(&mut core, "seek");
        }
    }

    pub fn pause(&self) {
        let mut core = self.shared.lock();
        if let Some(primary) = core.pair.primary_mut() {
            let _ = primary.pause(Default::default());
        }
        core.paused = true;
    }

    pub fn resume(&self) {
        let mut core = self.shared.lock();
        if let Some(primary) = core.pair.primary_mut() {
            let _ = primary.resume();
        }
        core.paused = false;
    }

    /// Main-loop tick: drain engine events and analysis replies, then
    /// advance the state machine. Cheap when nothing changed.
    pub fn pump(&self) {
        let shared = &self.shared;
        let mut core = shared.lock();
        shared.drain_engine_events(&mut core);
        shared.drain_fetch_outcomes(&mut core);
        shared.evaluate(&mut core);
    }

    /// Take all pending UI events
    pub fn drain_events(&self) -> Vec<AutomixEvent> {
        std::mem::take(&mut self.shared.lock().events)
    }

    /// Stop and drop every engine; used on player shutdown
    pub fn shutdown(&self) {
        self.shared.session.bump();
        let mut core = self.shared.lock();
        for mut engine in core.pair.take_all() {
            engine.stop();
        }
        core.active_plan = None;
    }
}

impl<A: Analyser> Drop for AutomixEngine<A> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<A: Analyser> Shared<A> {
    fn lock(&self) -> std::sync::MutexGuard<'_, Core> {
        match self.core.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn weak(&self) -> Weak<Shared<A>> {
        self.weak.clone()
    }

    // ===== Event intake =====

    fn drain_engine_events(&self, core: &mut Core) {
        for pair_event in core.pair.poll_events() {
            match (pair_event.role, &pair_event.event) {
                (EngineRole::Primary, EngineEvent::Pause) => core.paused = true,
                (EngineRole::Primary, EngineEvent::Play | EngineEvent::Playing) => {
                    core.paused = false
                }
                (EngineRole::Primary, EngineEvent::Ended) => {
                    // Natural end with no crossfade running: degrade to
                    // a hard cut and let the player advance the queue
                    if !core.state.is(AutomixState::Transitioning) {
                        if core.state.is(AutomixState::Scheduled) {
                            self.cancel_scheduled(core, "track ended before trigger");
                        }
                        let track_id = core.current.as_ref().map(|t| t.id.clone());
                        core.emit(AutomixEvent::HardCut { track_id });
                    }
                }
                (EngineRole::Pending, EngineEvent::Error { message, .. }) => {
                    tracing::warn!("pending engine error during crossfade: {}", message);
                }
                _ => {}
            }
        }
    }

    fn drain_fetch_outcomes(&self, core: &mut Core) {
        while let Ok(outcome) = core.fetch_rx.try_recv() {
            core.fetching = false;
            match outcome {
                FetchOutcome::Ready { token, inputs } => {
                    // stale replies vanish silently
                    if self.session.is_live(token) {
                        core.inputs = Some(*inputs);
                    }
                }
                FetchOutcome::Failed { token, reason } => {
                    if self.session.is_live(token) {
                        tracing::warn!("analysis unavailable for boundary: {}", reason);
                        core.analyser_down = true;
                    }
                }
            }
        }
    }

    // ===== State machine =====

    fn evaluate(&self, core: &mut Core) {
        match core.state.state() {
            AutomixState::Idle => {
                if core.eligible() {
                    core.set_state(AutomixState::Monitoring);
                }
            }
            AutomixState::Monitoring => {
                if !core.eligible() {
                    core.set_state(AutomixState::Idle);
                    return;
                }
                let position = core.pair.position();
                let duration = effective_duration(core);
                if duration <= 0.0 {
                    return;
                }
                if duration - position < core.config.monitor_window() {
                    self.ensure_fetch(core);
                    self.try_plan(core, position);
                }
            }
            AutomixState::Scheduled => {
                if !core.eligible() {
                    self.cancel_scheduled(core, "context changed");
                }
            }
            // Driven entirely by scheduler jobs
            AutomixState::Transitioning | AutomixState::Cooldown => {}
        }
    }

    fn ensure_fetch(&self, core: &mut Core) {
        if core.fetching || core.inputs.is_some() || core.analyser_down {
            return;
        }
        let (Some(current), Some((next, _))) = (&core.current, &core.next) else {
            return;
        };
        let (Some(current_path), Some(next_path)) = (current.path.clone(), next.path.clone())
        else {
            // remote-only tracks cannot be analysed
            core.analyser_down = true;
            return;
        };

        core.fetching = true;
        let token = self.session.current();
        let window = core.config.analyze_window();
        let service = Arc::clone(&self.service);
        let tx = self.fetch_tx.clone();

        let spawned = thread::Builder::new()
            .name("automix-fetch".to_string())
            .spawn(move || {
                // Full analysis for the outgoing track (the exit region
                // lives in the tail); degrade to head-only if it fails
                let (current, current_is_full) =
                    match service.analysis(&current_path, window, false) {
                        Ok(analysis) => (analysis, true),
                        Err(full_err) => match service.analysis(&current_path, window, true) {
                            Ok(analysis) => (analysis, false),
                            Err(_) => {
                                let _ = tx.send(FetchOutcome::Failed {
                                    token,
                                    reason: full_err.to_string(),
                                });
                                return;
                            }
                        },
                    };
                let next = match service.analysis(&next_path, window, true) {
                    Ok(analysis) => analysis,
                    Err(e) => {
                        let _ = tx.send(FetchOutcome::Failed {
                            token,
                            reason: e.to_string(),
                        });
                        return;
                    }
                };
                let proposal = service.proposal(&current_path, &next_path).ok();
                let advanced = service.long_mix(&current_path, &next_path).ok();
                let _ = tx.send(FetchOutcome::Ready {
                    token,
                    inputs: Box::new(PlanInputs {
                        current,
                        current_is_full,
                        next,
                        proposal,
                        advanced,
                    }),
                });
            });
        if let Err(e) = spawned {
            tracing::error!("failed to spawn analysis fetch worker: {}", e);
            core.fetching = false;
        }
    }

    fn try_plan(&self, core: &mut Core, position: f64) {
        if core.active_plan.is_some() {
            return;
        }
        let Some((next_track, next_index)) = core.next.clone() else {
            return;
        };
        let Some(inputs) = &core.inputs else {
            return;
        };

        let harmonic = nocturne_core::camelot::camelot_compatible(
            inputs.current.camelot_key.as_deref(),
            inputs.next.camelot_key.as_deref(),
        );
        tracing::debug!(
            "planning boundary to {} (harmonic match: {})",
            next_track.id,
            harmonic
        );

        let token = self.session.current();
        let request = PlanRequest {
            current: &inputs.current,
            current_is_full: inputs.current_is_full,
            next: &inputs.next,
            proposal: inputs.proposal.as_ref(),
            advanced: inputs.advanced.as_ref(),
            token,
            next_track: &next_track,
            next_index,
        };

        let Some(plan) = planner::plan(&request) else {
            return; // keep monitoring, retry next tick
        };

        if plan.trigger_time > position {
            let fire_at = self.clock.now() + (plan.trigger_time - position);
            let weak = self.weak();
            let fire_plan = plan.clone();
            self.scheduler
                .run_at(&fire_group(plan.token), fire_at, move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.fire(fire_plan);
                    }
                });
            core.emit(AutomixEvent::TransitionScheduled {
                trigger_time: plan.trigger_time,
                crossfade_duration: plan.crossfade_duration,
                mix_type: plan.mix_type,
            });
            core.active_plan = Some(plan);
            core.set_state(AutomixState::Scheduled);
        } else {
            // Already inside the fade window: fire immediately
            self.start_crossfade(core, plan);
        }
    }

    /// Entry point of the scheduled fire job
    fn fire(&self, plan: TransitionPlan) {
        let mut core = self.lock();
        if !self.session.is_live(plan.token) {
            // stale plan: drop silently and fall back to monitoring
            core.active_plan = None;
            core.set_state(AutomixState::Monitoring);
            return;
        }
        if !core.state.is(AutomixState::Scheduled) && !core.state.is(AutomixState::Monitoring) {
            return;
        }
        self.start_crossfade(&mut core, plan);
    }

    // ===== Crossfade protocol =====

    fn start_crossfade(&self, core: &mut Core, plan: TransitionPlan) {
        // A crossfade start supersedes everything outstanding
        self.session.bump();
        let now = self.clock.now();
        let curve = core.config.fade_curve;

        // 1. Instantiate the pending engine muted, rate-matched
        let mut pending = match self.factory.create() {
            Ok(engine) => engine,
            Err(e) => {
                self.prime_failure(core, &plan, e);
                return;
            }
        };
        pending.set_volume(0.0);
        if plan.initial_rate != 1.0 {
            if pending.capabilities().rate {
                if let Err(e) = pending.set_rate(plan.initial_rate) {
                    tracing::warn!("rate matching unavailable: {}", e);
                }
            } else {
                tracing::debug!("engine lacks rate support; skipping BPM alignment");
            }
        }

        // 2. Prime bass-swap filters
        if plan.mix_type == MixType::BassSwap {
            if let Some(primary) = core.pair.primary_mut() {
                primary.set_high_pass_q(1.0);
            }
            pending.set_high_pass_q(1.0);
            pending.set_high_pass(BASS_SWAP_HIGH_HZ, 0.0);
        }

        // 3. Loudness compensation -> the pending pre-fade target
        let replay_gain = gain::replay_gain_linear(
            core.config.replay_gain_mode,
            plan.next_track.replay_gain.as_ref(),
        );
        let peak = gain::peak_for_mode(
            core.config.replay_gain_mode,
            plan.next_track.replay_gain.as_ref(),
        );
        let (current_lufs, next_lufs) = match &core.inputs {
            Some(inputs) => (inputs.current.loudness, inputs.next.loudness),
            None => (None, None),
        };
        let target = gain::mix_gain(current_lufs, next_lufs, replay_gain, peak);

        // 4. Start the incoming track at its entry point
        let seek = plan.start_seek_ms as f64 / 1000.0;
        if let Err(e) = pending.play(PlayRequest::seeked(engine_url(&plan.next_track), seek)) {
            self.prime_failure(core, &plan, e);
            return;
        }

        // 5. Opposing gain ramps, pre-armed to dodge read/write races
        // on the audio clock
        let pre_arm = now + PRE_ARM_SECS;
        pending.set_volume_at(0.0, pre_arm);
        pending.ramp_volume_to(target.linear, plan.crossfade_duration, curve);
        if let Some(primary) = core.pair.primary_mut() {
            let current_volume = primary.volume();
            primary.set_volume_at(current_volume, pre_arm);
            primary.ramp_volume_to(0.0, plan.crossfade_duration, curve);
        }

        // 6. Bass-swap filter sweeps across the fade
        if plan.mix_type == MixType::BassSwap {
            let fade_end = now + plan.crossfade_duration;
            if let Some(primary) = core.pair.primary_mut() {
                primary.set_high_pass_at(BASS_SWAP_LOW_HZ, now);
                primary.ramp_high_pass_to_at(BASS_SWAP_HIGH_HZ, fade_end);
            }
            pending.set_high_pass_at(BASS_SWAP_HIGH_HZ, now);
            pending.ramp_high_pass_to_at(BASS_SWAP_LOW_HZ, fade_end);
        }

        core.pair.install_pending(pending);

        // 7. Analyser-authored automation, armed ahead through the
        // scheduler
        self.schedule_automation(&plan, now, true);
        self.schedule_automation(&plan, now, false);

        // 8. UI commit at the switch point
        {
            let weak = self.weak();
            let switch_plan = plan.clone();
            self.scheduler.run_at(
                &post_group(plan.token),
                now + plan.ui_switch_delay,
                move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.commit_ui(&switch_plan);
                    }
                },
            );
        }

        // 9. Rate restoration after the fade
        if plan.initial_rate != 1.0 {
            self.schedule_rate_restore(&plan, now + plan.crossfade_duration);
        }

        // 10. Old-engine teardown one safety margin after fade end
        {
            let weak = self.weak();
            let token = plan.token;
            self.scheduler.run_at(
                &post_group(plan.token),
                now + plan.crossfade_duration + TEARDOWN_MARGIN_SECS,
                move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.finish_crossfade(token);
                    }
                },
            );
        }

        core.ui_committed = false;
        core.emit(AutomixEvent::TransitionStarted {
            crossfade_duration: plan.crossfade_duration,
            mix_type: plan.mix_type,
            initial_rate: plan.initial_rate,
        });
        core.active_plan = Some(plan);
        core.set_state(AutomixState::Transitioning);
    }

    fn schedule_automation(&self, plan: &TransitionPlan, fade_start: f64, outgoing: bool) {
        let points = if outgoing {
            &plan.automation_current
        } else {
            &plan.automation_next
        };
        for point in points.clone() {
            let at = fade_start + point.time;
            let weak = self.weak();
            self.scheduler
                .schedule(&fade_group(plan.token), at, move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.apply_automation(outgoing, &point, at);
                    }
                });
        }
    }

    fn apply_automation(&self, outgoing: bool, point: &AutomationPoint, at: f64) {
        let mut core = self.lock();
        let engine = if outgoing {
            core.pair.outgoing_mut()
        } else {
            core.pair.incoming_mut()
        };
        let Some(engine) = engine else { return };
        if let Some(gain) = point.gain {
            engine.ramp_volume_to_at(gain, at);
        }
        if let Some(hz) = point.filter_hz {
            engine.ramp_high_pass_to_at(hz, at);
        }
        if let Some(q) = point.q {
            engine.set_high_pass_q(q);
        }
    }

    fn schedule_rate_restore(&self, plan: &TransitionPlan, fade_end: f64) {
        let from = plan.initial_rate;
        for step in 1..=RATE_RESTORE_STEPS {
            let fraction = f64::from(step) / f64::from(RATE_RESTORE_STEPS);
            let rate = from + (1.0 - from) * fraction;
            let weak = self.weak();
            self.scheduler.run_at(
                &post_group(plan.token),
                fade_end + fraction * RATE_RESTORE_SECS,
                move || {
                    if let Some(shared) = weak.upgrade() {
                        let mut core = shared.lock();
                        if let Some(engine) = core.pair.incoming_mut() {
                            let _ = engine.set_rate(rate);
                        }
                    }
                },
            );
        }
    }

    /// Step 8: flip the logical "now playing". Exactly once per plan;
    /// performs no state transition.
    fn commit_ui(&self, plan: &TransitionPlan) {
        let switched = {
            let mut core = self.lock();
            let live = core
                .active_plan
                .as_ref()
                .is_some_and(|active| active.token == plan.token);
            if !live || core.ui_committed {
                false
            } else {
                core.ui_committed = true;
                core.pair.promote_pending();
                core.current = Some(plan.next_track.clone());
                if core
                    .next
                    .as_ref()
                    .is_some_and(|(t, _)| t.id == plan.next_track.id)
                {
                    core.next = None;
                }
                core.inputs = None;
                core.analyser_down = false;
                self.scheduler.clear_group(&fire_group(plan.token));
                core.emit(AutomixEvent::UiSwitched {
                    track_id: plan.next_track.id.clone(),
                    next_index: plan.next_index,
                });
                true
            }
        };
        // run the callback without holding the lock; it may call back
        // into this engine
        if switched {
            (self.on_switch)(&plan.next_track, plan.next_index);
        }
    }

    /// Step 10: drop the retired engine and cool down
    fn finish_crossfade(&self, token: u64) {
        let mut core = self.lock();
        let live = core
            .active_plan
            .as_ref()
            .is_some_and(|active| active.token == token);
        if !live {
            return;
        }
        core.pair.teardown_retiring();
        core.active_plan = None;
        core.emit(AutomixEvent::TransitionCompleted);
        core.set_state(AutomixState::Cooldown);

        let weak = self.weak();
        self.scheduler.run_at(
            &post_group(token),
            self.clock.now() + COOLDOWN_SECS,
            move || {
                if let Some(shared) = weak.upgrade() {
                    let mut core = shared.lock();
                    if core.state.is(AutomixState::Cooldown) {
                        core.set_state(AutomixState::Monitoring);
                    }
                }
            },
        );
    }

    // ===== Failure paths =====

    /// The pending engine refused to start: commit the switch with no
    /// crossfade and fall through to a plain play of the next track
    fn prime_failure(&self, core: &mut Core, plan: &TransitionPlan, error: AutomixError) {
        tracing::warn!("pending engine failed to prime: {}", error);
        self.clear_plan_groups(plan.token);

        let started = self
            .factory
            .create()
            .and_then(|mut engine| {
                engine.play(PlayRequest::immediate(engine_url(&plan.next_track)))?;
                Ok(engine)
            })
            .map(|engine| {
                if let Some(mut old) = core.pair.set_primary(engine) {
                    old.stop();
                }
            });

        core.current = Some(plan.next_track.clone());
        core.next = None;
        core.inputs = None;
        core.active_plan = None;
        core.emit(AutomixEvent::UiSwitched {
            track_id: plan.next_track.id.clone(),
            next_index: plan.next_index,
        });
        core.emit(AutomixEvent::TransitionAborted {
            reason: format!("engine prime failure: {}", error),
        });
        if started.is_err() {
            let track_id = Some(plan.next_track.id.clone());
            core.emit(AutomixEvent::HardCut { track_id });
        }
        core.set_state(AutomixState::Monitoring);

        // the switch callback runs off-lock on the next tick
        let weak = self.weak();
        let track = plan.next_track.clone();
        let index = plan.next_index;
        self.scheduler
            .run_at("switch", self.clock.now(), move || {
                if let Some(shared) = weak.upgrade() {
                    (shared.on_switch)(&track, index);
                }
            });
    }

    /// Abort a queued (not yet firing) transition
    fn cancel_scheduled(&self, core: &mut Core, reason: &str) {
        if let Some(plan) = core.active_plan.take() {
            self.clear_plan_groups(plan.token);
        }
        core.emit(AutomixEvent::TransitionAborted {
            reason: reason.to_string(),
        });
        core.set_state(AutomixState::Monitoring);
    }

    /// Abort a running crossfade: short opposing ramps to silence,
    /// then both engines go away. The fresh playback that follows is
    /// the caller's move.
    fn abort_transition(&self, core: &mut Core, reason: &str) {
        if core.state.is(AutomixState::Scheduled) {
            self.cancel_scheduled(core, reason);
            return;
        }
        if !core.state.is(AutomixState::Transitioning) && !core.pair.has_pending() {
            return;
        }
        if let Some(plan) = core.active_plan.take() {
            self.clear_plan_groups(plan.token);
        }

        let mut engines = core.pair.take_all();
        for engine in engines.iter_mut() {
            engine.ramp_volume_to(0.0, ABORT_RAMP_SECS, FadeCurve::Linear);
        }
        // keep them alive until the ramp has played out
        let drop_at = self.clock.now() + ABORT_RAMP_SECS + 0.05;
        self.scheduler.run_at("abort", drop_at, move || {
            for mut engine in engines {
                engine.stop();
            }
        });

        core.ui_committed = false;
        core.emit(AutomixEvent::TransitionAborted {
            reason: reason.to_string(),
        });
        core.set_state(AutomixState::Monitoring);
    }

    fn clear_plan_groups(&self, token: u64) {
        self.scheduler.clear_group(&fire_group(token));
        self.scheduler.clear_group(&fade_group(token));
        self.scheduler.clear_group(&post_group(token));
    }
}

fn fire_group(token: u64) -> String {
    format!("mix-fire-{}", token)
}

fn fade_group(token: u64) -> String {
    format!("mix-fade-{}", token)
}

fn post_group(token: u64) -> String {
    format!("mix-post-{}", token)
}

fn engine_url(track: &TrackRef) -> String {
    track
        .path
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| track.id.clone())
}

fn effective_duration(core: &Core) -> f64 {
    let engine_duration = core.pair.duration();
    if engine_duration > 0.0 {
        engine_duration
    } else {
        core.current
            .as_ref()
            .map(|t| t.duration_secs())
            .unwrap_or(0.0)
    }
}
