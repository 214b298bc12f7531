//! Monitor: the polling loop.
//!
//! Sole owner of every `ChannelState`. Each cycle walks the channels in
//! configured order: probe, transition, then play the announcement for a
//! `Notify` before the next channel is probed. With parallel probes all
//! channels are probed up front and the results applied in the same order.
//! Playback never overlaps: either it blocks the cycle, or it goes through
//! the single audio queue.

use crate::asset_cache::AssetCache;
use crate::channel::{Action, ChannelConfig, ChannelState};
use crate::error::Error;
use crate::player::Playback;
use crate::probe::StatusProbe;
use crate::scheduler::{Clock, PollScheduler};
use chrono::TimeDelta;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Per-run knobs the monitor needs from `Settings`.
#[derive(Debug, Clone, Copy)]
pub struct MonitorOptions {
    pub cooldown: TimeDelta,
    pub volume: f32,
    pub parallel_probes: bool,
}

/// Outcome for one channel in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub channel: String,
    pub probed_live: bool,
    pub action: Action,
    /// A non-empty clip was handed to playback.
    pub played: bool,
}

pub struct Monitor {
    channels: Vec<ChannelConfig>,
    states: Vec<ChannelState>,
    probe: Box<dyn StatusProbe>,
    cache: AssetCache,
    playback: Box<dyn Playback>,
    clock: Arc<dyn Clock>,
    options: MonitorOptions,
}

impl Monitor {
    /// Build a monitor with every channel believed offline.
    pub fn new(
        channels: Vec<ChannelConfig>,
        probe: Box<dyn StatusProbe>,
        cache: AssetCache,
        playback: Box<dyn Playback>,
        clock: Arc<dyn Clock>,
        options: MonitorOptions,
    ) -> Self {
        let states = channels.iter().map(|c| ChannelState::new(&c.name)).collect();
        Monitor {
            channels,
            states,
            probe,
            cache,
            playback,
            clock,
            options,
        }
    }

    pub fn channels(&self) -> &[ChannelConfig] {
        &self.channels
    }

    pub fn states(&self) -> &[ChannelState] {
        &self.states
    }

    /// Replace the state of one channel, e.g. to restore a known history.
    pub fn set_state(&mut self, state: ChannelState) -> Result<(), Error> {
        let slot = self
            .states
            .iter_mut()
            .find(|s| s.name == state.name)
            .ok_or_else(|| Error::UnknownChannel(state.name.clone()))?;
        *slot = state;
        Ok(())
    }

    /// Seed every state from one probe. Channels already live are left
    /// unannounced, so the first cycle announces them.
    pub fn prime(&mut self) {
        let results = self.probe_all();
        for (state, live) in self.states.iter_mut().zip(results) {
            *state = ChannelState::primed(&state.name, live);
        }
        info!(
            channels = self.states.len(),
            live = self.states.iter().filter(|s| s.is_live).count(),
            "initial probe done"
        );
    }

    /// One pass over all channels.
    pub fn run_cycle(&mut self) -> Vec<CycleReport> {
        let prefetched = self.options.parallel_probes.then(|| self.probe_all());
        let mut reports = Vec::with_capacity(self.channels.len());

        for idx in 0..self.channels.len() {
            let probed_live = match &prefetched {
                Some(results) => results[idx],
                None => self.probe.probe(&self.channels[idx].name),
            };
            let now = self.clock.now();
            let action = self.states[idx].advance(
                &self.channels[idx],
                probed_live,
                now,
                self.options.cooldown,
            );

            let played = match action {
                Action::Notify => self.announce(idx),
                Action::None => false,
            };
            debug!(
                channel = %self.channels[idx].name,
                probed_live,
                %action,
                played,
                "channel processed"
            );

            reports.push(CycleReport {
                channel: self.channels[idx].name.clone(),
                probed_live,
                action,
                played,
            });
        }

        reports
    }

    /// Cycle, report, wait; repeat while `on_cycle` returns true.
    pub fn run_until<F>(&mut self, scheduler: &mut PollScheduler, mut on_cycle: F)
    where
        F: FnMut(&[ChannelState], &[CycleReport]) -> bool,
    {
        loop {
            let reports = self.run_cycle();
            if !on_cycle(&self.states, &reports) {
                break;
            }
            scheduler.wait_for_next_cycle();
        }
    }

    /// Cycle forever.
    pub fn run<F>(&mut self, scheduler: &mut PollScheduler, mut on_cycle: F) -> !
    where
        F: FnMut(&[ChannelState], &[CycleReport]),
    {
        loop {
            let reports = self.run_cycle();
            on_cycle(&self.states, &reports);
            scheduler.wait_for_next_cycle();
        }
    }

    fn announce(&mut self, idx: usize) -> bool {
        let name = &self.channels[idx].name;
        let clip = self.cache.get_audio(name);
        if clip.is_empty() {
            warn!(channel = %name, "no announcement clip, staying silent");
            return false;
        }
        info!(channel = %name, "announcing");
        self.playback.play(clip, self.options.volume);
        true
    }

    /// Probe results in channel order. Probing may run concurrently; the
    /// results are only applied afterwards, on this thread.
    fn probe_all(&self) -> Vec<bool> {
        let probe = self.probe.as_ref();
        if !self.options.parallel_probes || self.channels.len() < 2 {
            return self.channels.iter().map(|c| probe.probe(&c.name)).collect();
        }

        thread::scope(|scope| {
            let handles: Vec<_> = self
                .channels
                .iter()
                .map(|c| scope.spawn(move || probe.probe(&c.name)))
                .collect();
            handles
                .into_iter()
                .zip(&self.channels)
                .map(|(h, c)| {
                    h.join().unwrap_or_else(|_| {
                        warn!(channel = %c.name, "probe panicked, treating as offline");
                        false
                    })
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_cache::tests::ScriptedSynth;
    use crate::scheduler::ManualClock;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Probe answering from a per-channel script; exhausted scripts read offline.
    #[derive(Clone, Default)]
    struct ScriptedProbe {
        scripts: Arc<Mutex<HashMap<String, VecDeque<bool>>>>,
    }

    impl ScriptedProbe {
        fn script(self, channel: &str, answers: &[bool]) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(channel.to_string(), answers.iter().copied().collect());
            self
        }
    }

    impl StatusProbe for ScriptedProbe {
        fn probe(&self, channel: &str) -> bool {
            self.scripts
                .lock()
                .unwrap()
                .get_mut(channel)
                .and_then(|q| q.pop_front())
                .unwrap_or(false)
        }
    }

    #[derive(Clone, Default)]
    struct RecordingPlayback {
        played: Arc<Mutex<Vec<(Vec<u8>, f32)>>>,
    }

    impl Playback for RecordingPlayback {
        fn play(&mut self, clip: Vec<u8>, volume: f32) {
            self.played.lock().unwrap().push((clip, volume));
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    struct Rig {
        monitor: Monitor,
        playback: RecordingPlayback,
        synth: ScriptedSynth,
        clock: ManualClock,
        _dir: tempfile::TempDir,
    }

    fn rig(
        channels: &[(&str, bool)],
        probe: ScriptedProbe,
        synth: ScriptedSynth,
        parallel: bool,
    ) -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(t0());
        let playback = RecordingPlayback::default();
        let configs = channels.iter().map(|&(n, on)| ChannelConfig::new(n, on)).collect();
        let monitor = Monitor::new(
            configs,
            Box::new(probe),
            AssetCache::new(dir.path(), Box::new(synth.clone())),
            Box::new(playback.clone()),
            Arc::new(clock.clone()),
            MonitorOptions {
                cooldown: TimeDelta::minutes(5),
                volume: 0.05,
                parallel_probes: parallel,
            },
        );
        Rig {
            monitor,
            playback,
            synth,
            clock,
            _dir: dir,
        }
    }

    fn actions(reports: &[CycleReport]) -> Vec<Action> {
        reports.iter().map(|r| r.action).collect()
    }

    #[test]
    fn going_live_plays_clip_once() {
        let probe = ScriptedProbe::default().script("alice", &[false, true, true, true]);
        let synth = ScriptedSynth::default().then_ok(b"alice-clip");
        let mut r = rig(&[("alice", true)], probe, synth, false);

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.extend(actions(&r.monitor.run_cycle()));
            r.clock.advance(TimeDelta::minutes(5));
        }

        assert_eq!(seen, vec![Action::None, Action::Notify, Action::None, Action::None]);
        let played = r.playback.played.lock().unwrap();
        assert_eq!(played.as_slice(), [(b"alice-clip".to_vec(), 0.05)]);
        assert_eq!(r.synth.call_count(), 1);
    }

    #[test]
    fn primed_live_channel_is_announced_on_first_cycle() {
        let probe = ScriptedProbe::default().script("alice", &[true, true]);
        let synth = ScriptedSynth::default().then_ok(b"clip");
        let mut r = rig(&[("alice", true)], probe, synth, false);

        r.monitor.prime();
        assert!(r.monitor.states()[0].is_live);
        assert!(!r.monitor.states()[0].has_notified);

        let reports = r.monitor.run_cycle();
        assert_eq!(reports[0].action, Action::Notify);
        assert!(reports[0].played);
    }

    #[test]
    fn disabled_channel_tracks_state_silently() {
        let probe = ScriptedProbe::default()
            .script("alice", &[true])
            .script("bob", &[true]);
        let synth = ScriptedSynth::default().then_ok(b"alice-clip");
        let mut r = rig(&[("alice", true), ("bob", false)], probe, synth.clone(), false);

        let reports = r.monitor.run_cycle();
        assert_eq!(actions(&reports), vec![Action::Notify, Action::None]);
        assert!(r.monitor.states()[1].is_live);
        assert_eq!(synth.calls.lock().unwrap().as_slice(), ["alice is now live.".to_string()]);
    }

    #[test]
    fn synthesis_failure_is_contained_to_its_channel() {
        let probe = ScriptedProbe::default()
            .script("alice", &[true])
            .script("bob", &[true]);
        let synth = ScriptedSynth::default().then_err().then_ok(b"bob-clip");
        let mut r = rig(&[("alice", true), ("bob", true)], probe, synth, false);

        let reports = r.monitor.run_cycle();
        assert_eq!(actions(&reports), vec![Action::Notify, Action::Notify]);
        assert!(!reports[0].played);
        assert!(reports[1].played);
        assert_eq!(r.playback.played.lock().unwrap().len(), 1);
    }

    #[test]
    fn flapping_channel_is_debounced() {
        let probe = ScriptedProbe::default().script("alice", &[true, false, true, true]);
        let synth = ScriptedSynth::default().then_ok(b"clip");
        let mut r = rig(&[("alice", true)], probe, synth, false);

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.extend(actions(&r.monitor.run_cycle()));
            r.clock.advance(TimeDelta::minutes(1));
        }

        assert_eq!(seen, vec![Action::Notify, Action::None, Action::None, Action::None]);
        assert!(r.monitor.states()[0].is_live);
        assert_eq!(r.playback.played.lock().unwrap().len(), 1);
    }

    #[test]
    fn parallel_probes_keep_channel_order() {
        let names = ["a", "b", "c", "d", "e"];
        let mut probe = ScriptedProbe::default();
        for (i, n) in names.iter().enumerate() {
            probe = probe.script(n, &[i % 2 == 0]);
        }
        let mut synth = ScriptedSynth::default();
        for n in ["a", "c", "e"] {
            synth = synth.then_ok(n.as_bytes());
        }
        let channels: Vec<(&str, bool)> = names.iter().map(|n| (*n, true)).collect();
        let mut r = rig(&channels, probe, synth, true);

        let reports = r.monitor.run_cycle();
        let live: Vec<bool> = reports.iter().map(|r| r.probed_live).collect();
        assert_eq!(live, vec![true, false, true, false, true]);

        let played: Vec<Vec<u8>> = r
            .playback
            .played
            .lock()
            .unwrap()
            .iter()
            .map(|(c, _)| c.clone())
            .collect();
        assert_eq!(played, vec![b"a".to_vec(), b"c".to_vec(), b"e".to_vec()]);
    }

    #[test]
    fn run_until_waits_between_cycles() {
        let probe = ScriptedProbe::default().script("alice", &[false, true, true]);
        let synth = ScriptedSynth::default().then_ok(b"clip");
        let mut r = rig(&[("alice", true)], probe, synth, false);
        let mut scheduler = PollScheduler::new(Arc::new(r.clock.clone()), Duration::from_secs(300));

        let mut cycles = 0;
        r.monitor.run_until(&mut scheduler, |states, reports| {
            cycles += 1;
            assert_eq!(states.len(), reports.len());
            cycles < 3
        });

        assert_eq!(cycles, 3);
        assert_eq!(scheduler.cycles(), 2);
        assert_eq!(r.clock.now(), t0() + TimeDelta::minutes(10));
        assert_eq!(r.playback.played.lock().unwrap().len(), 1);
    }

    #[test]
    fn set_state_rejects_unknown_channel() {
        let probe = ScriptedProbe::default();
        let mut r = rig(&[("alice", true)], probe, ScriptedSynth::default(), false);
        assert!(matches!(
            r.monitor.set_state(ChannelState::new("zed")),
            Err(Error::UnknownChannel(name)) if name == "zed"
        ));
        assert!(r.monitor.set_state(ChannelState::primed("alice", true)).is_ok());
        assert!(r.monitor.states()[0].is_live);
    }

    /// Shared log of status checks and play calls, in the order they happened.
    type EventLog = Arc<Mutex<Vec<String>>>;

    struct LoggingStatus(EventLog);

    impl StatusProbe for LoggingStatus {
        fn probe(&self, channel: &str) -> bool {
            self.0.lock().unwrap().push(format!("check:{}", channel));
            true
        }
    }

    struct LoggingPlayback(EventLog);

    impl Playback for LoggingPlayback {
        fn play(&mut self, clip: Vec<u8>, _volume: f32) {
            let name = String::from_utf8_lossy(&clip).into_owned();
            self.0.lock().unwrap().push(format!("play:{}", name));
        }
    }

    fn logging_monitor(parallel: bool, log: &EventLog, dir: &tempfile::TempDir) -> Monitor {
        let synth = ScriptedSynth::default().then_ok(b"alice").then_ok(b"bob");
        Monitor::new(
            vec![ChannelConfig::new("alice", true), ChannelConfig::new("bob", true)],
            Box::new(LoggingStatus(log.clone())),
            AssetCache::new(dir.path(), Box::new(synth)),
            Box::new(LoggingPlayback(log.clone())),
            Arc::new(ManualClock::new(t0())),
            MonitorOptions {
                cooldown: TimeDelta::minutes(5),
                volume: 0.05,
                parallel_probes: parallel,
            },
        )
    }

    #[test]
    fn announcement_finishes_before_next_channel_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::default();
        let mut monitor = logging_monitor(false, &log, &dir);

        monitor.run_cycle();
        assert_eq!(
            log.lock().unwrap().as_slice(),
            ["check:alice", "play:alice", "check:bob", "play:bob"]
        );
    }

    #[test]
    fn parallel_mode_checks_every_channel_before_playing() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::default();
        let mut monitor = logging_monitor(true, &log, &dir);

        monitor.run_cycle();
        let events = log.lock().unwrap();
        assert_eq!(&events[2..], ["play:alice", "play:bob"]);
        let mut checks = events[..2].to_vec();
        checks.sort();
        assert_eq!(checks, ["check:alice", "check:bob"]);
    }
}
