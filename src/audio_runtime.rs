//! AudioRuntime: dedicated playback thread fed by a queue.
//!
//! Owns a `Player` on a single thread, so clips are rendered strictly one at
//! a time in the order they were queued, while the monitor keeps polling.
//! `AudioHandle` wraps the `mpsc::Sender` and is cheap to clone.

use crate::player::{Playback, Player};
use std::sync::mpsc;
use std::thread;
use tracing::warn;

// ── Commands & Events ────────────────────────────────────────────────────────

/// Commands sent to the audio thread.
pub enum AudioCmd {
    Play { clip: Vec<u8>, volume: f32 },
    Shutdown,
}

/// Events emitted by the audio thread back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    Playing,
    Finished,
    PlayError(String),
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Thread-safe handle for queueing clips on the audio runtime.
#[derive(Clone)]
pub struct AudioHandle {
    tx: mpsc::Sender<AudioCmd>,
}

impl AudioHandle {
    pub fn enqueue(&self, clip: Vec<u8>, volume: f32) {
        if self.tx.send(AudioCmd::Play { clip, volume }).is_err() {
            warn!("audio runtime is gone, dropping clip");
        }
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(AudioCmd::Shutdown);
    }
}

impl Playback for AudioHandle {
    fn play(&mut self, clip: Vec<u8>, volume: f32) {
        self.enqueue(clip, volume);
    }
}

// ── Runtime ──────────────────────────────────────────────────────────────────

/// Spawn the audio runtime on a dedicated thread.
///
/// `on_event` is called from the audio thread after each state change.
/// Queued clips still play after `shutdown` is sent only if they were queued
/// before it.
pub fn spawn_audio_runtime<F>(on_event: F) -> std::io::Result<AudioHandle>
where
    F: Fn(AudioEvent) + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<AudioCmd>();

    thread::Builder::new()
        .name("audio-runtime".into())
        .spawn(move || audio_thread_loop(rx, on_event))?;

    Ok(AudioHandle { tx })
}

/// Main loop for the audio thread. Owns the Player.
fn audio_thread_loop<F>(rx: mpsc::Receiver<AudioCmd>, on_event: F)
where
    F: Fn(AudioEvent),
{
    let mut player = Player::new();

    // Ends when Shutdown arrives or every handle is dropped.
    while let Ok(cmd) = rx.recv() {
        match cmd {
            AudioCmd::Play { clip, volume } => {
                on_event(AudioEvent::Playing);
                match player.play_clip(&clip, volume) {
                    Ok(()) => on_event(AudioEvent::Finished),
                    Err(e) => {
                        warn!("skipping clip: {}", e);
                        on_event(AudioEvent::PlayError(e.to_string()));
                    }
                }
            }
            AudioCmd::Shutdown => break,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
