use crate::error::Error;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// One configured channel. Immutable for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Case-sensitive channel identifier.
    pub name: String,
    /// Whether going live should be announced.
    pub notify_enabled: bool,
}

impl ChannelConfig {
    pub fn new(name: &str, notify_enabled: bool) -> Self {
        ChannelConfig {
            name: name.to_string(),
            notify_enabled,
        }
    }
}

/// Channel names double as cache file names, so they must stay inside one
/// directory: non-empty, no whitespace, no path separators, no `..`.
pub fn validate_name(name: &str) -> Result<(), Error> {
    let unsafe_char = |c: char| c.is_whitespace() || c == '/' || c == '\\';
    if name.is_empty() || name.chars().any(unsafe_char) || name.contains("..") {
        return Err(Error::InvalidChannelName(name.to_string()));
    }
    Ok(())
}

/// What the monitor should do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Notify,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::None => write!(f, "none"),
            Action::Notify => write!(f, "notify"),
        }
    }
}

/// Believed liveness of a single channel, owned by the monitor.
///
/// `has_notified` is only ever true while `is_live` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    pub name: String,
    pub is_live: bool,
    pub has_notified: bool,
    /// Time of the last accepted edge. `None` until the first edge is seen,
    /// which means no cooldown applies yet.
    pub last_transition: Option<DateTime<Utc>>,
}

impl ChannelState {
    /// Fresh state for a channel believed offline.
    pub fn new(name: &str) -> Self {
        ChannelState {
            name: name.to_string(),
            is_live: false,
            has_notified: false,
            last_transition: None,
        }
    }

    /// State seeded from a startup probe. Nothing has been announced yet.
    pub fn primed(name: &str, is_live: bool) -> Self {
        ChannelState {
            is_live,
            ..ChannelState::new(name)
        }
    }

    /// Apply a probe result in place and return the gated action.
    pub fn advance(
        &mut self,
        config: &ChannelConfig,
        probed_live: bool,
        now: DateTime<Utc>,
        cooldown: TimeDelta,
    ) -> Action {
        let (next, action) = transition(self, probed_live, now, cooldown);
        *self = next;
        gate(action, config)
    }

    fn cooldown_elapsed(&self, now: DateTime<Utc>, cooldown: TimeDelta) -> bool {
        match self.last_transition {
            Some(at) => now.signed_duration_since(at) > cooldown,
            None => true,
        }
    }
}

/// Compute the next state of a channel from the latest probe.
///
/// Rules, first match wins:
/// 1. Live but not yet announced -> announce (catch-up, no re-probe needed).
/// 2. Probe agrees with the current belief -> nothing.
/// 3. Offline -> live edge. Announce only if the cooldown since the last
///    edge has passed; inside the cooldown the edge is still recorded and
///    the session counts as announced.
/// 4. Live -> offline edge. Clears the announcement flag.
pub fn transition(
    state: &ChannelState,
    probed_live: bool,
    now: DateTime<Utc>,
    cooldown: TimeDelta,
) -> (ChannelState, Action) {
    let mut next = state.clone();

    if state.is_live && !state.has_notified {
        next.has_notified = true;
        return (next, Action::Notify);
    }

    if state.is_live == probed_live {
        return (next, Action::None);
    }

    if probed_live {
        let action = if state.cooldown_elapsed(now, cooldown) {
            Action::Notify
        } else {
            Action::None
        };
        next.is_live = true;
        next.has_notified = true;
        next.last_transition = Some(now);
        return (next, action);
    }

    next.is_live = false;
    next.has_notified = false;
    next.last_transition = Some(now);
    (next, Action::None)
}

/// Drop notifications for channels that have announcements turned off.
pub fn gate(action: Action, config: &ChannelConfig) -> Action {
    if config.notify_enabled { action } else { Action::None }
}
