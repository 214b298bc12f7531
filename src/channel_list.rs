//! The channel file: one `name=true|false` entry per line.
//!
//! Blank lines and `#` comments are ignored, malformed lines are skipped
//! with a warning, and a name that appears twice keeps its last entry.

use crate::channel::{ChannelConfig, validate_name};
use crate::error::Error;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Read and parse the channel file. A missing or unreadable file is fatal.
pub fn load_channel_list(path: &Path) -> Result<Vec<ChannelConfig>, Error> {
    let text = fs::read_to_string(path).map_err(|source| Error::ReadChannels {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_channel_list(&text))
}

/// Parse channel file contents.
pub fn parse_channel_list(text: &str) -> Vec<ChannelConfig> {
    let mut channels: Vec<ChannelConfig> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Ok(config) => {
                channels.retain(|c| c.name != config.name);
                channels.push(config);
            }
            Err(reason) => warn!(line = idx + 1, "skipping channel entry {:?}: {}", raw, reason),
        }
    }

    channels
}

fn parse_line(line: &str) -> Result<ChannelConfig, String> {
    let (name, flag) = line
        .split_once('=')
        .ok_or_else(|| "expected name=true|false".to_string())?;
    let name = name.trim();
    let flag = flag.trim();

    validate_name(name).map_err(|e| e.to_string())?;

    let notify_enabled = match flag.to_ascii_lowercase().as_str() {
        "true" => true,
        "false" => false,
        _ => return Err(format!("'{}' is not true or false", flag)),
    };

    Ok(ChannelConfig::new(name, notify_enabled))
}
