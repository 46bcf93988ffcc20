//! Engine pair
//!
//! At most two live engines share the output graph: the `primary`
//! (audible track) and, during a crossfade, either the `pending`
//! incoming engine (before the UI commit) or the `retiring` outgoing
//! engine (after it). The pair also owns event fan-in and masks the
//! retiring engine's terminal events so downstream consumers never see
//! a stale "track ended" while the handover is still in flight.

use crate::engine::{EngineEvent, PlaybackEngine};

/// Which engine an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRole {
    Primary,
    Pending,
    Retiring,
}

/// An engine event tagged with its source
#[derive(Debug, Clone, PartialEq)]
pub struct PairEvent {
    pub role: EngineRole,
    pub event: EngineEvent,
}

/// Holder of the (at most) two live engines
#[derive(Default)]
pub struct EnginePair {
    primary: Option<Box<dyn PlaybackEngine>>,
    pending: Option<Box<dyn PlaybackEngine>>,
    retiring: Option<Box<dyn PlaybackEngine>>,
}

impl EnginePair {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new primary engine, returning the previous one
    pub fn set_primary(&mut self, engine: Box<dyn PlaybackEngine>) -> Option<Box<dyn PlaybackEngine>> {
        self.primary.replace(engine)
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn has_retiring(&self) -> bool {
        self.retiring.is_some()
    }

    pub fn primary_mut(&mut self) -> Option<&mut (dyn PlaybackEngine + '_)> {
        match &mut self.primary {
            Some(engine) => Some(engine.as_mut()),
            None => None,
        }
    }

    pub fn pending_mut(&mut self) -> Option<&mut (dyn PlaybackEngine + '_)> {
        match &mut self.pending {
            Some(engine) => Some(engine.as_mut()),
            None => None,
        }
    }

    pub fn retiring_mut(&mut self) -> Option<&mut (dyn PlaybackEngine + '_)> {
        match &mut self.retiring {
            Some(engine) => Some(engine.as_mut()),
            None => None,
        }
    }

    /// The engine fading out during a transition: the retiring engine
    /// once the UI committed, the primary before that
    pub fn outgoing_mut(&mut self) -> Option<&mut (dyn PlaybackEngine + '_)> {
        if self.retiring.is_some() {
            match &mut self.retiring {
                Some(engine) => Some(engine.as_mut()),
                None => None,
            }
        } else if self.pending.is_some() {
            match &mut self.primary {
                Some(engine) => Some(engine.as_mut()),
                None => None,
            }
        } else {
            None
        }
    }

    /// The engine fading in during a transition: the pending engine
    /// before the UI commit, the primary after it
    pub fn incoming_mut(&mut self) -> Option<&mut (dyn PlaybackEngine + '_)> {
        if self.pending.is_some() {
            match &mut self.pending {
                Some(engine) => Some(engine.as_mut()),
                None => None,
            }
        } else if self.retiring.is_some() {
            match &mut self.primary {
                Some(engine) => Some(engine.as_mut()),
                None => None,
            }
        } else {
            None
        }
    }

    /// Attach the pre-seeked, pre-muted incoming engine
    pub fn install_pending(&mut self, engine: Box<dyn PlaybackEngine>) {
        debug_assert!(self.pending.is_none(), "pending engine already installed");
        self.pending = Some(engine);
    }

    /// The UI commit: pending becomes primary, the old primary keeps
    /// fading out as the retiring engine until teardown
    pub fn promote_pending(&mut self) {
        if let Some(incoming) = self.pending.take() {
            if let Some(mut old) = self.retiring.take() {
                // A previous retiree still around is stale by now
                old.stop();
            }
            self.retiring = self.primary.take();
            self.primary = Some(incoming);
        }
    }

    /// Stop and drop the retiring engine (end of the teardown margin)
    pub fn teardown_retiring(&mut self) {
        if let Some(mut engine) = self.retiring.take() {
            engine.stop();
        }
    }

    /// Remove every engine, for an abort or shutdown. Gains are left
    /// untouched; the caller ramps before calling this.
    pub fn take_all(&mut self) -> Vec<Box<dyn PlaybackEngine>> {
        [
            self.primary.take(),
            self.pending.take(),
            self.retiring.take(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Primary playback position in seconds, 0 with no engine
    pub fn position(&self) -> f64 {
        self.primary.as_ref().map(|e| e.position()).unwrap_or(0.0)
    }

    /// Primary track duration in seconds, 0 when unknown
    pub fn duration(&self) -> f64 {
        self.primary.as_ref().map(|e| e.duration()).unwrap_or(0.0)
    }

    /// Drain events from all engines, preserving per-engine order.
    ///
    /// The retiring engine's pause/ended/error events are swallowed
    /// here: during a handover they describe a track the UI already
    /// left behind.
    pub fn poll_events(&mut self) -> Vec<PairEvent> {
        let mut events = Vec::new();
        if let Some(engine) = self.primary.as_deref_mut() {
            events.extend(engine.poll_events().into_iter().map(|event| PairEvent {
                role: EngineRole::Primary,
                event,
            }));
        }
        if let Some(engine) = self.pending.as_deref_mut() {
            events.extend(engine.poll_events().into_iter().map(|event| PairEvent {
                role: EngineRole::Pending,
                event,
            }));
        }
        if let Some(engine) = self.retiring.as_deref_mut() {
            for event in engine.poll_events() {
                if event.is_terminal() {
                    tracing::trace!("masking retiring engine event {:?}", event);
                    continue;
                }
                events.push(PairEvent {
                    role: EngineRole::Retiring,
                    event,
                });
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEngine;

    #[test]
    fn promote_swaps_roles() {
        let mut pair = EnginePair::new();
        let (primary, primary_state) = MockEngine::with_handle();
        let (pending, pending_state) = MockEngine::with_handle();
        pair.set_primary(Box::new(primary));
        pair.install_pending(Box::new(pending));

        pair.promote_pending();
        assert!(pair.has_primary());
        assert!(!pair.has_pending());
        assert!(pair.has_retiring());

        pair.teardown_retiring();
        assert!(!pair.has_retiring());
        assert!(primary_state.lock().unwrap().stopped);
        assert!(!pending_state.lock().unwrap().stopped);
    }

    #[test]
    fn outgoing_and_incoming_track_the_handover() {
        let mut pair = EnginePair::new();
        let (primary, primary_state) = MockEngine::with_handle();
        let (pending, pending_state) = MockEngine::with_handle();
        pair.set_primary(Box::new(primary));

        // no transition: neither side exists
        assert!(pair.outgoing_mut().is_none());
        assert!(pair.incoming_mut().is_none());

        pair.install_pending(Box::new(pending));
        pair.outgoing_mut().unwrap().set_volume(0.25);
        pair.incoming_mut().unwrap().set_volume(0.75);
        assert_eq!(primary_state.lock().unwrap().volume, 0.25);
        assert_eq!(pending_state.lock().unwrap().volume, 0.75);

        pair.promote_pending();
        pair.outgoing_mut().unwrap().set_volume(0.1);
        pair.incoming_mut().unwrap().set_volume(0.9);
        assert_eq!(primary_state.lock().unwrap().volume, 0.1);
        assert_eq!(pending_state.lock().unwrap().volume, 0.9);
    }

    #[test]
    fn events_follow_roles_after_promote() {
        let mut pair = EnginePair::new();
        let (primary, _) = MockEngine::with_handle();
        let (pending, pending_state) = MockEngine::with_handle();
        pair.set_primary(Box::new(primary));
        pair.install_pending(Box::new(pending));
        pair.promote_pending();

        // the promoted engine reports as primary now
        pending_state
            .lock()
            .unwrap()
            .queued_events
            .push(EngineEvent::TimeUpdate { position: 5.0 });

        let events = pair.poll_events();
        assert!(events
            .iter()
            .any(|e| e.role == EngineRole::Primary
                && matches!(e.event, EngineEvent::TimeUpdate { .. })));
    }

    #[test]
    fn retiring_ended_is_swallowed_but_timeupdate_passes() {
        let mut pair = EnginePair::new();
        let (primary, primary_state) = MockEngine::with_handle();
        let (pending, _) = MockEngine::with_handle();
        pair.set_primary(Box::new(primary));
        pair.install_pending(Box::new(pending));
        pair.promote_pending();

        {
            let mut state = primary_state.lock().unwrap();
            state.queued_events.push(EngineEvent::Ended);
            state.queued_events.push(EngineEvent::Pause);
            state
                .queued_events
                .push(EngineEvent::Error { code: 3, message: "decode".into() });
            state
                .queued_events
                .push(EngineEvent::TimeUpdate { position: 99.0 });
        }

        let events = pair.poll_events();
        let retiring: Vec<_> = events
            .iter()
            .filter(|e| e.role == EngineRole::Retiring)
            .collect();
        assert_eq!(retiring.len(), 1);
        assert!(matches!(
            retiring[0].event,
            EngineEvent::TimeUpdate { .. }
        ));
    }

    #[test]
    fn take_all_empties_the_pair() {
        let mut pair = EnginePair::new();
        let (a, _) = MockEngine::with_handle();
        let (b, _) = MockEngine::with_handle();
        pair.set_primary(Box::new(a));
        pair.install_pending(Box::new(b));

        let engines = pair.take_all();
        assert_eq!(engines.len(), 2);
        assert!(!pair.has_primary());
        assert!(!pair.has_pending());
        assert_eq!(pair.position(), 0.0);
    }
}
