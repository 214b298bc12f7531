use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by live_alert components.
///
/// Only the startup variants are ever fatal; everything a monitoring cycle
/// touches is degraded to a safe default by the caller and logged.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read channel list {path}")]
    ReadChannels {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read settings {path}")]
    ReadSettings {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("failed to write settings {path}")]
    WriteSettings {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{0}' is not a valid channel name")]
    InvalidChannelName(String),

    #[error("channel '{0}' is not configured")]
    UnknownChannel(String),

    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("speech endpoint returned no audio")]
    EmptyPayload,

    #[error("cache I/O on {path}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("audio output unavailable: {0}")]
    AudioOutput(String),

    #[error("cannot decode clip: {0}")]
    Decode(String),

    #[error("clip is empty")]
    EmptyClip,
}
