//! live_alert: spoken go-live notifications for a watched set of channels.
//!
//! Channel state tracking, liveness probes, the clip cache and playback live
//! here. The `livealert` binary wires them together.

pub mod asset_cache;
pub mod audio_runtime;
pub mod channel;
pub mod channel_list;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod player;
pub mod probe;
pub mod scheduler;
pub mod settings;
pub mod speech;
pub mod status;
