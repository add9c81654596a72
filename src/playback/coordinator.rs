use super::{BeadState, format_time};

/// A bead's position in the post's declared order; doubles as its handle.
pub type BeadId = usize;

/// Seam between the coordinator and whatever actually produces sound.
///
/// Durations are unknown until the source's metadata has loaded; every
/// transport operation on a duration-less source is a no-op at the
/// coordinator level, so implementations never see one.
pub trait Media {
    fn play(&mut self);
    fn pause(&mut self);
    /// Seconds, `None` until metadata is known (or forever, on load failure).
    fn duration(&self) -> Option<f64>;
    /// Current position in seconds.
    fn position(&self) -> f64;
    fn set_position(&mut self, seconds: f64);
}

struct Slot<M> {
    media: M,
    state: BeadState,
    /// `[start, end]` second spans, rendering-only.
    buffered: Vec<(f64, f64)>,
}

/// Typed per-bead view-state; the renderer consumes this and nothing else.
#[derive(Debug, Clone, PartialEq)]
pub struct BeadView {
    pub state: BeadState,
    pub position: f64,
    pub duration: Option<f64>,
    /// 0..=100, 0 while duration is unknown.
    pub played_percent: f64,
    /// 0..=100, end of the furthest buffered range.
    pub buffered_percent: f64,
    pub current_time: String,
    pub total_time: String,
}

/// Owns every registered bead's playback state plus the session (which bead,
/// if any, is active). Passed by handle to whoever needs transport control;
/// there is deliberately no global.
pub struct Coordinator<M: Media> {
    slots: Vec<Slot<M>>,
    active: Option<BeadId>,
}

impl<M: Media> Coordinator<M> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            active: None,
        }
    }

    /// Register the next bead in collection order, returning its id.
    pub fn register(&mut self, media: M) -> BeadId {
        self.slots.push(Slot {
            media,
            state: BeadState::Idle,
            buffered: Vec::new(),
        });
        self.slots.len() - 1
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The bead currently holding the session, if any.
    pub fn active(&self) -> Option<BeadId> {
        self.active
    }

    /// Start `id`, pausing every other playing bead first. The scan and the
    /// activation happen in one synchronous pass, so no observer can catch
    /// two beads playing. Unknown ids and beads whose metadata has not
    /// loaded are no-ops.
    pub fn request_play(&mut self, id: BeadId, reset: bool) {
        let Some(slot) = self.slots.get(id) else {
            return;
        };
        if slot.media.duration().is_none() {
            return;
        }

        for (other_id, other) in self.slots.iter_mut().enumerate() {
            if other_id != id && other.state == BeadState::Playing {
                other.media.pause();
                other.state = BeadState::Paused;
            }
        }

        let slot = &mut self.slots[id];
        if reset {
            slot.media.set_position(0.0);
        }
        slot.media.play();
        slot.state = BeadState::Playing;
        self.active = Some(id);
    }

    /// Pause `id` if it is playing, otherwise behave as `request_play`.
    pub fn request_toggle(&mut self, id: BeadId) {
        match self.slots.get(id).map(|s| s.state) {
            Some(BeadState::Playing) => {
                let slot = &mut self.slots[id];
                slot.media.pause();
                slot.state = BeadState::Paused;
                if self.active == Some(id) {
                    self.active = None;
                }
            }
            Some(_) => self.request_play(id, false),
            None => {}
        }
    }

    /// Media-ended notification: advance to the next bead in order, from the
    /// top. Past the last bead the session simply goes idle.
    pub fn on_ended(&mut self, id: BeadId) {
        let Some(slot) = self.slots.get_mut(id) else {
            return;
        };
        slot.state = BeadState::Idle;
        if self.active == Some(id) {
            self.active = None;
        }
        let next = id + 1;
        if next < self.slots.len() {
            self.request_play(next, true);
        }
    }

    /// Position the bead at `percent` of its duration. Clamped to 0..=100;
    /// a no-op until the duration is known.
    pub fn seek(&mut self, id: BeadId, percent: f64) {
        let Some(slot) = self.slots.get_mut(id) else {
            return;
        };
        let Some(duration) = slot.media.duration() else {
            return;
        };
        let percent = percent.clamp(0.0, 100.0);
        slot.media.set_position(duration * percent / 100.0);
    }

    /// Replace the buffered-range set. Rendering-only; playback state is
    /// untouched no matter what arrives here.
    pub fn on_progress(&mut self, id: BeadId, ranges: Vec<(f64, f64)>) {
        if let Some(slot) = self.slots.get_mut(id) {
            slot.buffered = ranges;
        }
    }

    pub fn view(&self, id: BeadId) -> Option<BeadView> {
        let slot = self.slots.get(id)?;
        let position = slot.media.position();
        let duration = slot.media.duration();
        let played_percent = match duration {
            Some(d) if d > 0.0 => (position / d * 100.0).clamp(0.0, 100.0),
            _ => 0.0,
        };
        let buffered_percent = match duration {
            Some(d) if d > 0.0 => slot
                .buffered
                .iter()
                .map(|&(_, end)| end)
                .fold(0.0f64, f64::max)
                .min(d)
                / d
                * 100.0,
            _ => 0.0,
        };
        Some(BeadView {
            state: slot.state,
            position,
            duration,
            played_percent,
            buffered_percent,
            current_time: format_time(position),
            total_time: format_time(duration.unwrap_or(0.0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeMedia {
        duration: Option<f64>,
        position: f64,
        playing: bool,
    }

    impl FakeMedia {
        fn loaded(duration: f64) -> Self {
            Self {
                duration: Some(duration),
                position: 0.0,
                playing: false,
            }
        }

        fn unloaded() -> Self {
            Self {
                duration: None,
                position: 0.0,
                playing: false,
            }
        }
    }

    impl Media for FakeMedia {
        fn play(&mut self) {
            self.playing = true;
        }
        fn pause(&mut self) {
            self.playing = false;
        }
        fn duration(&self) -> Option<f64> {
            self.duration
        }
        fn position(&self) -> f64 {
            self.position
        }
        fn set_position(&mut self, seconds: f64) {
            self.position = seconds;
        }
    }

    fn coordinator(durations: &[f64]) -> Coordinator<FakeMedia> {
        let mut c = Coordinator::new();
        for &d in durations {
            c.register(FakeMedia::loaded(d));
        }
        c
    }

    fn state(c: &Coordinator<FakeMedia>, id: BeadId) -> Option<BeadState> {
        c.view(id).map(|v| v.state)
    }

    fn playing_count(c: &Coordinator<FakeMedia>) -> usize {
        (0..c.len())
            .filter(|&i| state(&c, i) == Some(BeadState::Playing))
            .count()
    }

    #[test]
    fn at_most_one_bead_plays_after_any_play_sequence() {
        let mut c = coordinator(&[30.0, 45.0, 60.0, 15.0]);
        for &id in &[0, 2, 1, 1, 3, 0, 2] {
            c.request_play(id, false);
            assert!(playing_count(&c) <= 1);
            assert_eq!(c.active(), Some(id));
            assert_eq!(state(&c, id), Some(BeadState::Playing));
        }
    }

    #[test]
    fn play_pauses_the_previous_bead_without_moving_its_position() {
        let mut c = coordinator(&[30.0, 30.0]);
        c.request_play(0, false);
        c.seek(0, 50.0);
        c.request_play(1, false);

        assert_eq!(state(&c, 0), Some(BeadState::Paused));
        assert_eq!(state(&c, 1), Some(BeadState::Playing));
        assert_eq!(c.view(0).unwrap().position, 15.0);
        assert_eq!(c.view(1).unwrap().position, 0.0);
    }

    #[test]
    fn toggle_pauses_a_playing_bead_and_clears_the_session() {
        let mut c = coordinator(&[30.0, 30.0]);
        c.request_play(0, false);
        c.request_toggle(0);
        assert_eq!(state(&c, 0), Some(BeadState::Paused));
        assert_eq!(c.active(), None);
        assert_eq!(state(&c, 1), Some(BeadState::Idle));

        // toggling again resumes from the paused position
        c.seek(0, 10.0);
        c.request_toggle(0);
        assert_eq!(state(&c, 0), Some(BeadState::Playing));
        assert_eq!(c.view(0).unwrap().position, 3.0);
    }

    #[test]
    fn ended_advances_to_the_next_bead_from_the_top() {
        let mut c = coordinator(&[20.0, 40.0]);
        c.request_play(0, false);
        c.seek(1, 50.0); // stale position from an earlier listen
        c.on_ended(0);

        assert_eq!(state(&c, 0), Some(BeadState::Idle));
        assert_eq!(state(&c, 1), Some(BeadState::Playing));
        assert_eq!(c.active(), Some(1));
        // auto-advance resets the target to the start
        assert_eq!(c.view(1).unwrap().position, 0.0);
    }

    #[test]
    fn ended_on_the_last_bead_leaves_the_session_idle() {
        let mut c = coordinator(&[20.0, 40.0]);
        c.request_play(1, false);
        c.on_ended(1);
        assert_eq!(c.active(), None);
        assert_eq!(playing_count(&c), 0);
    }

    #[test]
    fn ended_chain_skips_nothing_and_respects_unready_successor() {
        let mut c = Coordinator::new();
        c.register(FakeMedia::loaded(10.0));
        c.register(FakeMedia::unloaded());
        c.request_play(0, false);
        c.on_ended(0);
        // successor has no metadata yet: request is deferred-ineffective
        assert_eq!(c.active(), None);
        assert_eq!(state(&c, 1), Some(BeadState::Idle));
    }

    #[test]
    fn seek_boundaries_and_idempotence() {
        let mut c = coordinator(&[80.0]);
        c.seek(0, 0.0);
        assert_eq!(c.view(0).unwrap().position, 0.0);
        c.seek(0, 100.0);
        assert_eq!(c.view(0).unwrap().position, 80.0);
        c.seek(0, 25.0);
        let first = c.view(0).unwrap().position;
        c.seek(0, 25.0);
        assert_eq!(c.view(0).unwrap().position, first);
        // out-of-range input clamps rather than erroring
        c.seek(0, 140.0);
        assert_eq!(c.view(0).unwrap().position, 80.0);
        c.seek(0, -5.0);
        assert_eq!(c.view(0).unwrap().position, 0.0);
    }

    #[test]
    fn operations_on_unready_media_are_no_ops() {
        let mut c = Coordinator::new();
        c.register(FakeMedia::unloaded());
        c.request_play(0, true);
        assert_eq!(state(&c, 0), Some(BeadState::Idle));
        assert_eq!(c.active(), None);
        c.seek(0, 50.0);
        assert_eq!(c.view(0).unwrap().position, 0.0);
    }

    #[test]
    fn operations_on_unknown_ids_are_no_ops() {
        let mut c = coordinator(&[30.0]);
        c.request_play(7, false);
        c.request_toggle(7);
        c.seek(7, 50.0);
        c.on_ended(7);
        c.on_progress(7, vec![(0.0, 1.0)]);
        assert_eq!(c.active(), None);
        assert!(c.view(7).is_none());
    }

    #[test]
    fn progress_feeds_rendering_but_never_playback_state() {
        let mut c = coordinator(&[100.0]);
        c.request_play(0, false);
        c.on_progress(0, vec![(0.0, 25.0), (30.0, 40.0)]);
        let view = c.view(0).unwrap();
        assert_eq!(view.state, BeadState::Playing);
        assert_eq!(view.buffered_percent, 40.0);
    }

    #[test]
    fn view_reports_clock_strings_and_percentages() {
        let mut c = coordinator(&[90.0]);
        c.seek(0, 50.0);
        let view = c.view(0).unwrap();
        assert_eq!(view.position, 45.0);
        assert_eq!(view.played_percent, 50.0);
        assert_eq!(view.current_time, "00m 45s");
        assert_eq!(view.total_time, "01m 30s");
    }
}
