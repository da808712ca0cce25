//! The shared render context: clock, voice slots, master bus and the
//! teardown queue. Engines hold an `Arc<AudioContext>` and mutate the graph
//! under its lock, so every control call is atomic relative to rendering.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, MutexGuard};

use crate::clock::{AudioClock, ClockState};
use crate::error::EngineError;
use crate::graph::Param;
use crate::scheduler::{TeardownQueue, TeardownToken, VoiceKey};
use crate::voices::{Voice, VoiceKind, VoiceSnapshot};

/// Where a voice's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Through the shared master gain.
    Master,
    /// Straight to the device, bypassing the master gain.
    Output,
}

struct Slot {
    route: Option<Destination>,
    voice: VoiceKind,
}

/// Mutable graph state. Obtained through [`AudioContext::lock`].
pub struct Graph {
    sample_rate: f32,
    frame: u64,
    slots: BTreeMap<VoiceKey, Slot>,
    next_key: u64,
    master: Param,
    teardowns: TeardownQueue,
    bus: Vec<f32>,
    scratch: Vec<f32>,
}

impl Graph {
    fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            frame: 0,
            slots: BTreeMap::new(),
            next_key: 0,
            master: Param::new(1.0),
            teardowns: TeardownQueue::new(),
            bus: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Render time in seconds.
    pub fn now(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Insert a voice. `None` builds it without connecting it anywhere.
    pub fn add(&mut self, voice: VoiceKind, route: Option<Destination>) -> VoiceKey {
        self.next_key += 1;
        let key = VoiceKey(self.next_key);
        self.slots.insert(key, Slot { route, voice });
        tracing::debug!("slot {} added ({route:?})", key.0);
        key
    }

    pub fn connect(&mut self, key: VoiceKey, destination: Destination) -> bool {
        match self.slots.get_mut(&key) {
            Some(slot) => {
                slot.route = Some(destination);
                true
            }
            None => false,
        }
    }

    pub fn voice(&self, key: VoiceKey) -> Option<&VoiceKind> {
        self.slots.get(&key).map(|s| &s.voice)
    }

    pub fn voice_mut(&mut self, key: VoiceKey) -> Option<&mut VoiceKind> {
        self.slots.get_mut(&key).map(|s| &mut s.voice)
    }

    pub fn snapshot(&self, key: VoiceKey) -> Option<VoiceSnapshot> {
        let now = self.now();
        self.voice(key).map(|v| v.snapshot(now))
    }

    pub fn contains(&self, key: VoiceKey) -> bool {
        self.slots.contains_key(&key)
    }

    /// Tear the slot down `delay` seconds from now. A key has at most one
    /// pending teardown, so scheduling again replaces the earlier one and the
    /// engines never need to hold on to the returned token.
    pub fn schedule_teardown(&mut self, key: VoiceKey, delay: f64) -> TeardownToken {
        let at = self.now() + delay.max(0.0);
        let at_frame = (at * self.sample_rate as f64).ceil() as u64;
        self.teardowns.schedule(key, at_frame)
    }

    pub fn cancel_teardown(&mut self, token: TeardownToken) -> bool {
        self.teardowns.cancel(token)
    }

    pub fn teardown_pending(&self, key: VoiceKey) -> bool {
        self.teardowns.is_pending(key)
    }

    /// Stop every source of the slot, dispose its nodes and drop it.
    pub fn teardown(&mut self, key: VoiceKey) -> bool {
        self.teardowns.clear(key);
        let Some(mut slot) = self.slots.remove(&key) else {
            return false;
        };
        let now = self.now();
        let mut errors = slot.voice.stop_sources(now);
        errors.extend(slot.voice.dispose());
        for err in &errors {
            tracing::debug!("slot {} teardown: {err}", key.0);
        }
        tracing::debug!("slot {} torn down", key.0);
        true
    }

    pub fn master(&mut self) -> &mut Param {
        &mut self.master
    }

    /// Linear gain the master bus is at or heading to.
    pub fn master_gain(&self) -> f32 {
        self.master.target()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Source nodes still alive across every slot.
    pub fn live_sources(&self) -> usize {
        self.slots.values().map(|s| s.voice.live_sources()).sum()
    }

    fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let frames = out.len() / 2;
        let mut done = 0;
        while done < frames {
            for key in self.teardowns.take_due(self.frame) {
                self.teardown(key);
            }
            let mut chunk = frames - done;
            if let Some(due) = self.teardowns.next_due() {
                chunk = chunk.min((due - self.frame) as usize);
            }
            self.render_chunk(&mut out[done * 2..(done + chunk) * 2]);
            done += chunk;
            self.frame += chunk as u64;
        }
        for key in self.teardowns.take_due(self.frame) {
            self.teardown(key);
        }
    }

    fn render_chunk(&mut self, out: &mut [f32]) {
        let time = self.now();
        let dt = 1.0 / self.sample_rate as f64;
        self.bus.clear();
        self.bus.resize(out.len(), 0.0);
        for slot in self.slots.values_mut() {
            match slot.route {
                Some(Destination::Master) => slot.voice.process(&mut self.bus, time, dt),
                Some(Destination::Output) => slot.voice.process(out, time, dt),
                None => {
                    self.scratch.clear();
                    self.scratch.resize(out.len(), 0.0);
                    slot.voice.process(&mut self.scratch, time, dt);
                }
            }
        }
        for (i, (frame, bus)) in out.chunks_exact_mut(2).zip(self.bus.chunks_exact(2)).enumerate() {
            let g = self.master.value_at(time + i as f64 * dt);
            frame[0] += bus[0] * g;
            frame[1] += bus[1] * g;
        }
    }
}

pub struct AudioContext {
    me: Weak<AudioContext>,
    clock: Mutex<Box<dyn AudioClock>>,
    graph: Mutex<Graph>,
    sample_rate: u32,
    wake_lock: AtomicBool,
    last_stamp: Mutex<u128>,
}

impl AudioContext {
    pub fn new<C: AudioClock + 'static>(clock: C) -> Arc<Self> {
        let sample_rate = clock.sample_rate();
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            clock: Mutex::new(Box::new(clock) as Box<dyn AudioClock>),
            graph: Mutex::new(Graph::new(sample_rate as f32)),
            sample_rate,
            wake_lock: AtomicBool::new(false),
            last_stamp: Mutex::new(0),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn clock_state(&self) -> ClockState {
        self.clock.lock().state()
    }

    /// Bring the clock to `Running`, resuming it if needed. Idempotent and
    /// never retries: a clock that stays down is reported immediately.
    pub fn ensure_running(&self) -> Result<(), EngineError> {
        let mut clock = self.clock.lock();
        let state = clock.state();
        if state != ClockState::Running {
            tracing::debug!("audio clock is {state}, resuming");
            if let Err(err) = clock.resume(&self.me) {
                tracing::warn!("audio clock resume failed: {err}");
                return Err(match err {
                    EngineError::AudioUnavailable { .. } => err,
                    other => EngineError::audio_unavailable(clock.state(), other.to_string()),
                });
            }
        }
        let state = clock.state();
        if state != ClockState::Running {
            tracing::warn!("audio clock still {state} after resume");
            return Err(EngineError::audio_unavailable(
                state,
                "the platform refused to start audio",
            ));
        }
        if !self.wake_lock.load(Ordering::Relaxed) {
            if clock.request_wake_lock() {
                self.wake_lock.store(true, Ordering::Relaxed);
                tracing::debug!("wake lock acquired");
            } else {
                tracing::debug!("wake lock not available");
            }
        }
        Ok(())
    }

    pub fn close(&self) {
        self.clock.lock().close();
        self.wake_lock.store(false, Ordering::Relaxed);
    }

    pub fn lock(&self) -> MutexGuard<'_, Graph> {
        self.graph.lock()
    }

    /// Render interleaved stereo into `out`, advancing time and firing
    /// teardowns at their exact frame.
    pub fn render(&self, out: &mut [f32]) {
        self.graph.lock().render(out);
    }

    /// `{prefix}-{nanosecond timestamp}`, strictly increasing per context.
    pub fn voice_id(&self, prefix: &str) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let mut last = self.last_stamp.lock();
        let stamp = if now > *last { now } else { *last + 1 };
        *last = stamp;
        format!("{prefix}-{stamp}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::OfflineClock;
    use crate::voices::BinauralVoice;

    fn tone(ctx: &AudioContext, route: Option<Destination>) -> VoiceKey {
        let mut graph = ctx.lock();
        let mut voice = VoiceKind::Binaural(BinauralVoice::new(200.0, 200.0, 0.0));
        voice.set_gain(0.5);
        voice.start(0.0);
        graph.add(voice, route)
    }

    fn peak(buf: &[f32]) -> f32 {
        buf.iter().fold(0.0f32, |a, b| a.max(b.abs()))
    }

    #[test]
    fn locked_clock_reports_audio_unavailable() {
        let ctx = AudioContext::new(OfflineClock::locked(8_000));
        let err = ctx.ensure_running().unwrap_err();
        assert!(err.requires_user_interaction());
        assert_eq!(ctx.clock_state(), ClockState::Suspended);
    }

    #[test]
    fn ensure_running_resumes_and_is_idempotent() {
        let ctx = AudioContext::new(OfflineClock::new(8_000));
        ctx.ensure_running().unwrap();
        ctx.ensure_running().unwrap();
        assert_eq!(ctx.clock_state(), ClockState::Running);
        ctx.close();
        assert_eq!(ctx.clock_state(), ClockState::Closed);
        ctx.ensure_running().unwrap();
    }

    #[test]
    fn unrouted_voices_are_silent() {
        let ctx = AudioContext::new(OfflineClock::running(8_000));
        let key = tone(&ctx, None);
        let mut buf = vec![0.0; 512];
        ctx.render(&mut buf);
        assert_eq!(peak(&buf), 0.0);
        assert!(ctx.lock().connect(key, Destination::Master));
        ctx.render(&mut buf);
        assert!(peak(&buf) > 0.4);
    }

    #[test]
    fn master_gain_scales_only_the_master_bus() {
        let ctx = AudioContext::new(OfflineClock::running(8_000));
        tone(&ctx, Some(Destination::Master));
        ctx.lock().master().set_value(0.0);
        let mut buf = vec![0.0; 512];
        ctx.render(&mut buf);
        assert_eq!(peak(&buf), 0.0);
        tone(&ctx, Some(Destination::Output));
        ctx.render(&mut buf);
        assert!(peak(&buf) > 0.4);
    }

    #[test]
    fn teardown_fires_at_its_frame() {
        let ctx = AudioContext::new(OfflineClock::running(1_000));
        let key = tone(&ctx, Some(Destination::Master));
        ctx.lock().schedule_teardown(key, 0.1);
        let mut buf = vec![0.0; 2 * 64];
        ctx.render(&mut buf);
        assert!(ctx.lock().contains(key));
        ctx.render(&mut buf);
        assert!(!ctx.lock().contains(key));
        // second block goes silent from frame 100
        assert_eq!(peak(&buf[2 * 40..]), 0.0);
        assert!(peak(&buf[..2 * 36]) > 0.0);
        assert_eq!(ctx.lock().live_sources(), 0);
    }

    #[test]
    fn rescheduled_teardown_cancels_the_earlier_one() {
        let ctx = AudioContext::new(OfflineClock::running(1_000));
        let key = tone(&ctx, Some(Destination::Master));
        let first = ctx.lock().schedule_teardown(key, 0.01);
        ctx.lock().schedule_teardown(key, 0.5);
        assert!(!ctx.lock().cancel_teardown(first));
        let mut buf = vec![0.0; 2 * 100];
        ctx.render(&mut buf);
        assert!(ctx.lock().contains(key));
        assert!(ctx.lock().teardown_pending(key));
    }

    #[test]
    fn voice_ids_never_repeat() {
        let ctx = AudioContext::new(OfflineClock::running(8_000));
        let a = ctx.voice_id("alpha-10");
        let b = ctx.voice_id("alpha-10");
        assert_ne!(a, b);
        assert!(a.starts_with("alpha-10-"));
    }
}
