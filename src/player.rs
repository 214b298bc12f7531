use crate::error::Error;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::io::Cursor;
use tracing::{debug, warn};

/// Something that can render an announcement clip.
pub trait Playback {
    /// Play a clip. Failures are logged, never returned.
    fn play(&mut self, clip: Vec<u8>, volume: f32);
}

/// Blocking rodio player. Renders one clip at a time on the calling thread.
///
/// The output device is opened on first use, so a machine without audio can
/// still run the monitor. Not `Send`: keep it on the thread that created it.
pub struct Player {
    output: Option<(OutputStream, OutputStreamHandle)>,
}

impl Player {
    pub fn new() -> Self {
        Player { output: None }
    }

    /// True once the output device has been opened.
    pub fn is_open(&self) -> bool {
        self.output.is_some()
    }

    fn handle(&mut self) -> Result<&OutputStreamHandle, Error> {
        if self.output.is_none() {
            let opened = OutputStream::try_default()
                .map_err(|e| Error::AudioOutput(format!("Failed to open audio output: {}", e)))?;
            self.output = Some(opened);
        }
        match &self.output {
            Some((_, handle)) => Ok(handle),
            None => Err(Error::AudioOutput("no output stream".to_string())),
        }
    }

    /// Decode and play a clip, blocking until it ends.
    ///
    /// The clip is decoded before the device is touched, and its sink is
    /// dropped on every return path.
    pub fn play_clip(&mut self, clip: &[u8], volume: f32) -> Result<(), Error> {
        if clip.is_empty() {
            return Err(Error::EmptyClip);
        }
        let source =
            Decoder::new(Cursor::new(clip.to_vec())).map_err(|e| Error::Decode(e.to_string()))?;

        let handle = self.handle()?;
        let sink = Sink::try_new(handle)
            .map_err(|e| Error::AudioOutput(format!("Failed to create audio sink: {}", e)))?;
        sink.set_volume(volume);
        sink.append(source);
        sink.sleep_until_end();
        debug!(bytes = clip.len(), "clip finished");
        Ok(())
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

impl Playback for Player {
    fn play(&mut self, clip: Vec<u8>, volume: f32) {
        if let Err(e) = self.play_clip(&clip, volume) {
            warn!("skipping clip: {}", e);
        }
    }
}
