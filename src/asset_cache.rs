use crate::channel::validate_name;
use crate::error::Error;
use crate::speech::{SpeechSynth, announcement_text};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extension of cached clips.
const CLIP_EXTENSION: &str = "mp3";

/// Persistent store of spoken "<channel> is now live." clips.
///
/// One file per channel, `<dir>/<channel>.mp3`. Entries are written once and
/// never updated or evicted. A failed synthesis writes nothing, so the next
/// request tries again.
pub struct AssetCache {
    dir: PathBuf,
    synth: Box<dyn SpeechSynth>,
}

impl AssetCache {
    pub fn new(dir: &Path, synth: Box<dyn SpeechSynth>) -> Self {
        AssetCache {
            dir: dir.to_path_buf(),
            synth,
        }
    }

    /// Path of the clip for a channel, or `None` when the name would leave
    /// the cache directory.
    pub fn clip_path(&self, channel: &str) -> Option<PathBuf> {
        validate_name(channel).ok()?;
        Some(self.dir.join(format!("{}.{}", channel, CLIP_EXTENSION)))
    }

    /// True when a clip for this channel is already on disk.
    pub fn contains(&self, channel: &str) -> bool {
        self.clip_path(channel).is_some_and(|p| p.is_file())
    }

    /// Clip bytes for a channel, synthesizing and storing them on a miss.
    /// Returns an empty vec when no clip could be produced.
    pub fn get_audio(&self, channel: &str) -> Vec<u8> {
        let Some(path) = self.clip_path(channel) else {
            warn!(channel, "refusing clip: {}", Error::InvalidChannelName(channel.to_string()));
            return Vec::new();
        };

        match fs::read(&path) {
            Ok(bytes) => {
                debug!(channel, "clip cache hit");
                return bytes;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                // Leave the entry alone; it is not ours to replace.
                warn!(channel, "cannot read cached clip {}: {}", path.display(), e);
                return self.synthesize(channel).unwrap_or_default();
            }
        }

        let Some(bytes) = self.synthesize(channel) else {
            return Vec::new();
        };
        match self.persist(&path, &bytes) {
            Ok(()) => info!(channel, "cached clip at {}", path.display()),
            Err(e) => warn!(channel, "clip not cached: {}", e),
        }
        bytes
    }

    fn synthesize(&self, channel: &str) -> Option<Vec<u8>> {
        match self.synth.synthesize(&announcement_text(channel)) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => {
                warn!(channel, "speech synthesis failed: {}", Error::EmptyPayload);
                None
            }
            Err(e) => {
                warn!(channel, "speech synthesis failed: {}", e);
                None
            }
        }
    }

    /// Write via a temporary sibling and rename, so readers never see a
    /// partial clip.
    fn persist(&self, path: &Path, bytes: &[u8]) -> Result<(), Error> {
        let cache_io = |source| Error::CacheIo {
            path: path.to_path_buf(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(cache_io)?;
        let partial = path.with_extension(format!("{}.part", CLIP_EXTENSION));
        fs::write(&partial, bytes).map_err(cache_io)?;
        if let Err(e) = fs::rename(&partial, path) {
            let _ = fs::remove_file(&partial);
            return Err(cache_io(e));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Synthesizer that replays scripted outcomes and records every request.
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedSynth {
        pub(crate) outcomes: Arc<Mutex<VecDeque<Result<Vec<u8>, String>>>>,
        pub(crate) calls: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedSynth {
        pub(crate) fn then_ok(self, bytes: &[u8]) -> Self {
            self.outcomes.lock().unwrap().push_back(Ok(bytes.to_vec()));
            self
        }

        pub(crate) fn then_err(self) -> Self {
            self.outcomes.lock().unwrap().push_back(Err("down".to_string()));
            self
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl SpeechSynth for ScriptedSynth {
        fn synthesize(&self, text: &str) -> Result<Vec<u8>, Error> {
            self.calls.lock().unwrap().push(text.to_string());
            match self.outcomes.lock().unwrap().pop_front() {
                Some(Ok(bytes)) => Ok(bytes),
                Some(Err(_)) | None => Err(Error::EmptyPayload),
            }
        }
    }

    #[test]
    fn miss_synthesizes_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let synth = ScriptedSynth::default().then_ok(b"clip");
        let cache = AssetCache::new(dir.path(), Box::new(synth.clone()));

        assert_eq!(cache.get_audio("alice"), b"clip".to_vec());
        assert_eq!(synth.calls.lock().unwrap().as_slice(), ["alice is now live.".to_string()]);
        assert_eq!(fs::read(dir.path().join("alice.mp3")).unwrap(), b"clip".to_vec());
        assert!(!dir.path().join("alice.mp3.part").exists());
    }

    #[test]
    fn hit_returns_identical_bytes_without_synthesis() {
        let dir = tempfile::tempdir().unwrap();
        let synth = ScriptedSynth::default().then_ok(b"clip").then_ok(b"other");
        let cache = AssetCache::new(dir.path(), Box::new(synth.clone()));

        let first = cache.get_audio("alice");
        let second = cache.get_audio("alice");
        assert_eq!(first, second);
        assert_eq!(synth.call_count(), 1);
    }

    #[test]
    fn existing_file_is_served_as_is() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bob.mp3"), b"prerecorded").unwrap();
        let synth = ScriptedSynth::default();
        let cache = AssetCache::new(dir.path(), Box::new(synth.clone()));

        assert!(cache.contains("bob"));
        assert_eq!(cache.get_audio("bob"), b"prerecorded".to_vec());
        assert_eq!(synth.call_count(), 0);
    }

    #[test]
    fn failure_then_success_retries_synthesis() {
        let dir = tempfile::tempdir().unwrap();
        let synth = ScriptedSynth::default().then_err().then_ok(b"clip");
        let cache = AssetCache::new(dir.path(), Box::new(synth.clone()));

        assert!(cache.get_audio("alice").is_empty());
        assert!(!cache.contains("alice"));

        assert_eq!(cache.get_audio("alice"), b"clip".to_vec());
        assert!(cache.contains("alice"));
        assert_eq!(synth.call_count(), 2);
    }

    #[test]
    fn empty_synthesis_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let synth = ScriptedSynth::default().then_ok(b"");
        let cache = AssetCache::new(dir.path(), Box::new(synth));

        assert!(cache.get_audio("alice").is_empty());
        assert!(!cache.contains("alice"));
    }

    #[test]
    fn creates_missing_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let cache = AssetCache::new(&nested, Box::new(ScriptedSynth::default().then_ok(b"x")));

        assert_eq!(cache.get_audio("alice"), b"x".to_vec());
        assert!(nested.join("alice.mp3").is_file());
    }

    #[test]
    fn unsafe_names_never_touch_the_filesystem() {
        let root = tempfile::tempdir().unwrap();
        let clips = root.path().join("clips");
        let synth = ScriptedSynth::default().then_ok(b"x").then_ok(b"y");
        let cache = AssetCache::new(&clips, Box::new(synth.clone()));

        assert!(cache.get_audio("../escaped").is_empty());
        assert!(cache.get_audio("nested/name").is_empty());
        assert!(!root.path().join("escaped.mp3").exists());
        assert!(!clips.exists());
        assert!(cache.clip_path("../escaped").is_none());
        assert_eq!(synth.call_count(), 0);
    }

    #[test]
    fn unwritable_cache_still_returns_clip() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"file").unwrap();
        let synth = ScriptedSynth::default().then_ok(b"x").then_ok(b"y");
        let cache = AssetCache::new(&blocker, Box::new(synth.clone()));

        assert_eq!(cache.get_audio("alice"), b"x".to_vec());
        assert_eq!(cache.get_audio("alice"), b"y".to_vec());
        assert_eq!(synth.call_count(), 2);
    }
}
