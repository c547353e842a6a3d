//! Trace Channels
//!
//! Named debug channels for the scheduler. A channel is a runtime gate on top
//! of the `log` facade: the message is formatted only when the channel is
//! enabled, and it is emitted on the channel's own `log` target so it can be
//! filtered independently (e.g. `RUST_LOG=myth_scheduler::render_action=trace`).
//!
//! | Channel | Target | Content |
//! |---------|--------|---------|
//! | `RENDER_ACTION` | `myth_scheduler::render_action` | Compiled RenderAction sequence |
//! | `FRAME_GRAPH` | `myth_scheduler::frame_graph` | Compiled render passes and their ops |
//! | `GPU_TIMINGS` | `myth_scheduler::gpu_timings` | Per-slot GPU timings |

use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Set of trace channels.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct TraceChannels: u32 {
        const RENDER_ACTION = 1 << 0;
        const FRAME_GRAPH   = 1 << 1;
        const GPU_TIMINGS   = 1 << 2;
    }
}

pub const TARGET_RENDER_ACTION: &str = "myth_scheduler::render_action";
pub const TARGET_FRAME_GRAPH: &str = "myth_scheduler::frame_graph";
pub const TARGET_GPU_TIMINGS: &str = "myth_scheduler::gpu_timings";

static ACTIVE_CHANNELS: AtomicU32 = AtomicU32::new(0);

/// Enables or disables the given channels.
pub fn set(channels: TraceChannels, enabled: bool) {
    if enabled {
        ACTIVE_CHANNELS.fetch_or(channels.bits(), Ordering::Relaxed);
    } else {
        ACTIVE_CHANNELS.fetch_and(!channels.bits(), Ordering::Relaxed);
    }
}

/// Returns `true` when every channel in `channels` is enabled and the `log`
/// target accepts trace-level records.
#[must_use]
pub fn is_enabled(channels: TraceChannels) -> bool {
    let active = TraceChannels::from_bits_truncate(ACTIVE_CHANNELS.load(Ordering::Relaxed));
    active.contains(channels) && log::log_enabled!(target: target(channels), log::Level::Trace)
}

/// Returns the currently enabled channels.
#[must_use]
pub fn active() -> TraceChannels {
    TraceChannels::from_bits_truncate(ACTIVE_CHANNELS.load(Ordering::Relaxed))
}

/// `log` target for a channel. Multi-channel sets map to the first channel.
#[must_use]
pub fn target(channels: TraceChannels) -> &'static str {
    if channels.contains(TraceChannels::RENDER_ACTION) {
        TARGET_RENDER_ACTION
    } else if channels.contains(TraceChannels::FRAME_GRAPH) {
        TARGET_FRAME_GRAPH
    } else {
        TARGET_GPU_TIMINGS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_targets() {
        assert_eq!(target(TraceChannels::RENDER_ACTION), TARGET_RENDER_ACTION);
        assert_eq!(target(TraceChannels::FRAME_GRAPH), TARGET_FRAME_GRAPH);
        assert_eq!(target(TraceChannels::GPU_TIMINGS), TARGET_GPU_TIMINGS);
    }

    #[test]
    fn test_set_and_clear() {
        set(TraceChannels::FRAME_GRAPH, true);
        assert!(active().contains(TraceChannels::FRAME_GRAPH));
        set(TraceChannels::FRAME_GRAPH, false);
        assert!(!active().contains(TraceChannels::FRAME_GRAPH));
    }
}
