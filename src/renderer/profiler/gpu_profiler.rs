//! GPU Profiler
//!
//! Named GPU timing slots per frame, reconciled asynchronously.
//!
//! # State machine
//!
//! ```text
//!             set_enabled(true)          frame_start()
//! Disabled ─────────────────► Enabling ─────────────────► Enabled
//!    ▲                                                       │
//!    └──────────── frame_start() ◄──── set_enabled(false) ───┘
//! ```
//!
//! The requested and the effective state are separate fields; a request only
//! takes effect at the next [`GpuProfiler::frame_start`], so slots handed out
//! during a frame always belong to a frame whose queries get resolved.
//!
//! # Frame protocol
//!
//! ```text
//! frame_start() → get_slot(name)* → frame_end() → … → request()
//! ```
//!
//! [`GpuProfiler::request`] only looks at the *oldest* pending frame and pops
//! it once the backend has its results. Results lag the CPU by one or more
//! frames. A GPU interruption discards every pending frame; those frames are
//! reported with `timings: None`, which means "no data", never zero. A frame
//! started while `frames_in_flight` frames are still pending is not timed but
//! is queued all the same, and reported as no data in its turn.

use std::collections::VecDeque;

use log::{debug, trace, warn};

use crate::errors::Result;
use crate::settings::ProfilerSettings;
use crate::trace::{self as trace_channels, TraceChannels};

// ============================================================================
// Backend interface
// ============================================================================

/// How the executor writes a slot's timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampMode {
    /// Through `timestamp_writes` of the render pass descriptor.
    PassWrites,
    /// With `CommandEncoder::write_timestamp` around the pass.
    EncoderWrites,
}

/// Query indices reserved for one slot.
#[derive(Debug, Clone)]
pub struct SlotQueries {
    pub query_set: wgpu::QuerySet,
    pub begin: u32,
    pub end: u32,
    pub mode: TimestampMode,
}

/// Result of polling one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryStatus {
    Pending,
    /// Milliseconds per slot, in slot order. `None` for slots that had no
    /// queries.
    Ready(Vec<Option<f64>>),
    /// The frame's results are gone (readback failure or interruption).
    Lost,
}

/// GPU side of the profiler.
///
/// Every call is non-blocking. Frames are identified by the profiler's frame
/// counter.
pub trait TimestampBackend {
    /// Starts recording `frame`. `false` when the backend has no capacity, in
    /// which case the frame is not timed.
    fn begin_frame(&mut self, frame: u64) -> bool;

    /// Queries for slot `index` of `frame`, `None` when out of capacity.
    fn slot_queries(&mut self, frame: u64, index: u32) -> Option<SlotQueries>;

    /// Issues the resolve/copy work for the `slot_count` slots of `frame`.
    fn end_frame(&mut self, frame: u64, slot_count: u32);

    fn poll_frame(&mut self, frame: u64) -> QueryStatus;

    /// Returns and clears the interruption flag.
    fn take_disjoint(&mut self) -> bool;

    /// Releases everything held for `frame`.
    fn discard_frame(&mut self, frame: u64);
}

// ============================================================================
// Profiler
// ============================================================================

/// A timing slot, valid only for the frame that allocated it.
#[derive(Debug, Clone)]
pub struct TimingSlot {
    pub frame: u64,
    pub index: u32,
    pub queries: Option<SlotQueries>,
}

impl TimingSlot {
    /// Timestamp writes for a render pass descriptor.
    #[must_use]
    pub fn render_pass_timestamp_writes(&self) -> Option<wgpu::RenderPassTimestampWrites<'_>> {
        let queries = self.queries.as_ref()?;
        (queries.mode == TimestampMode::PassWrites).then(|| wgpu::RenderPassTimestampWrites {
            query_set: &queries.query_set,
            beginning_of_pass_write_index: Some(queries.begin),
            end_of_pass_write_index: Some(queries.end),
        })
    }

    pub fn write_begin(&self, encoder: &mut wgpu::CommandEncoder) {
        if let Some(queries) = &self.queries
            && queries.mode == TimestampMode::EncoderWrites
        {
            encoder.write_timestamp(&queries.query_set, queries.begin);
        }
    }

    pub fn write_end(&self, encoder: &mut wgpu::CommandEncoder) {
        if let Some(queries) = &self.queries
            && queries.mode == TimestampMode::EncoderWrites
        {
            encoder.write_timestamp(&queries.query_set, queries.end);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotTiming {
    pub name: String,
    /// GPU time in milliseconds, `None` when the slot had no queries.
    pub ms: Option<f64>,
}

/// Timings of one finished frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    /// `None`: no data for this frame.
    pub timings: Option<Vec<SlotTiming>>,
}

struct PendingFrame {
    frame: u64,
    // `false` when the backend had no room for the frame; reported as no data.
    timed: bool,
    slot_names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Idle,
    Timed,
    Untimed,
}

pub struct GpuProfiler<B: TimestampBackend> {
    backend: B,

    enable_request: bool,
    enabled: bool,

    frame: u64,
    frame_state: FrameState,
    slot_names: Vec<String>,
    max_slots: u32,
    slot_overflow_warned: bool,

    pending: VecDeque<PendingFrame>,
    max_pending: usize,
}

impl<B: TimestampBackend> GpuProfiler<B> {
    pub fn new(backend: B, settings: &ProfilerSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            backend,
            enable_request: settings.enabled,
            enabled: false,
            frame: 0,
            frame_state: FrameState::Idle,
            slot_names: Vec::new(),
            max_slots: settings.max_slots,
            slot_overflow_warned: false,
            pending: VecDeque::new(),
            max_pending: settings.frames_in_flight as usize,
        })
    }

    #[inline]
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Requests a state change, applied at the next `frame_start`.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enable_request = enabled;
    }

    /// Effective state.
    #[inline]
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    #[must_use]
    pub fn enable_requested(&self) -> bool {
        self.enable_request
    }

    /// Current frame number.
    #[inline]
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Frames submitted and not yet reported.
    #[inline]
    #[must_use]
    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    pub fn frame_start(&mut self) {
        self.frame += 1;
        self.slot_names.clear();
        self.slot_overflow_warned = false;
        self.frame_state = FrameState::Idle;

        if self.enable_request != self.enabled {
            self.enabled = self.enable_request;
            debug!(
                "GPU profiler {} at frame {}",
                if self.enabled { "enabled" } else { "disabled" },
                self.frame
            );
            if !self.enabled {
                for pending in self.pending.drain(..) {
                    if pending.timed {
                        self.backend.discard_frame(pending.frame);
                    }
                }
            }
        }

        if !self.enabled {
            return;
        }
        let in_flight = self.pending.iter().filter(|pending| pending.timed).count();
        self.frame_state = if in_flight < self.max_pending && self.backend.begin_frame(self.frame) {
            FrameState::Timed
        } else {
            debug!("GPU profiler: no queries free for frame {}, not timed", self.frame);
            FrameState::Untimed
        };
    }

    /// Allocates a named slot in the current frame. `None` when the profiler
    /// is disabled, the frame is not timed or the slot budget is exhausted.
    pub fn get_slot(&mut self, name: &str) -> Option<TimingSlot> {
        if !self.enabled || self.frame_state != FrameState::Timed {
            return None;
        }
        let index = self.slot_names.len() as u32;
        if index >= self.max_slots {
            if !self.slot_overflow_warned {
                warn!(
                    "GPU profiler: more than {} slots in frame {}, '{name}' is not timed",
                    self.max_slots, self.frame
                );
                self.slot_overflow_warned = true;
            }
            return None;
        }
        let queries = self.backend.slot_queries(self.frame, index);
        self.slot_names.push(name.to_string());
        Some(TimingSlot {
            frame: self.frame,
            index,
            queries,
        })
    }

    pub fn frame_end(&mut self) {
        let timed = match std::mem::replace(&mut self.frame_state, FrameState::Idle) {
            FrameState::Idle => return,
            FrameState::Timed => true,
            FrameState::Untimed => false,
        };
        if timed {
            self.backend.end_frame(self.frame, self.slot_names.len() as u32);
        }
        self.pending.push_back(PendingFrame {
            frame: self.frame,
            timed,
            slot_names: std::mem::take(&mut self.slot_names),
        });
    }

    /// Collects every frame whose results became available, oldest first.
    /// Never blocks.
    pub fn request(&mut self) -> Vec<FrameReport> {
        let mut reports = Vec::new();

        while let Some(oldest) = self.pending.front() {
            if !oldest.timed {
                let frame = oldest.frame;
                self.pending.pop_front();
                reports.push(FrameReport {
                    frame,
                    timings: None,
                });
                continue;
            }
            if self.backend.take_disjoint() {
                self.discard_pending(&mut reports);
                break;
            }
            match self.backend.poll_frame(oldest.frame) {
                QueryStatus::Pending => break,
                QueryStatus::Ready(times) => {
                    // Interruption detected while reading this frame back.
                    if self.backend.take_disjoint() {
                        self.discard_pending(&mut reports);
                        break;
                    }
                    let Some(done) = self.pending.pop_front() else {
                        break;
                    };
                    let timings = done
                        .slot_names
                        .into_iter()
                        .zip(times.into_iter().chain(std::iter::repeat(None)))
                        .map(|(name, ms)| SlotTiming { name, ms })
                        .collect();
                    reports.push(FrameReport {
                        frame: done.frame,
                        timings: Some(timings),
                    });
                }
                QueryStatus::Lost => {
                    self.discard_pending(&mut reports);
                    break;
                }
            }
        }

        if trace_channels::is_enabled(TraceChannels::GPU_TIMINGS) {
            for report in &reports {
                log_report(report);
            }
        }
        reports
    }

    fn discard_pending(&mut self, reports: &mut Vec<FrameReport>) {
        if !self.pending.is_empty() {
            debug!(
                "GPU profiler: interruption, discarding {} pending frames",
                self.pending.len()
            );
        }
        for pending in self.pending.drain(..) {
            if pending.timed {
                self.backend.discard_frame(pending.frame);
            }
            reports.push(FrameReport {
                frame: pending.frame,
                timings: None,
            });
        }
    }
}

fn log_report(report: &FrameReport) {
    let Some(timings) = &report.timings else {
        trace!(target: trace_channels::TARGET_GPU_TIMINGS, "frame {}: no data", report.frame);
        return;
    };
    for timing in timings {
        match timing.ms {
            Some(ms) => trace!(
                target: trace_channels::TARGET_GPU_TIMINGS,
                "frame {} {:<32} {ms:>8.3} ms",
                report.frame,
                timing.name
            ),
            None => trace!(
                target: trace_channels::TARGET_GPU_TIMINGS,
                "frame {} {:<32}        - ms",
                report.frame,
                timing.name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Completes every frame after `latency` polls.
    #[derive(Default)]
    struct CountingBackend {
        latency: u32,
        polls: u32,
        discarded: Vec<u64>,
    }

    impl TimestampBackend for CountingBackend {
        fn begin_frame(&mut self, _frame: u64) -> bool {
            true
        }
        fn slot_queries(&mut self, _frame: u64, _index: u32) -> Option<SlotQueries> {
            None
        }
        fn end_frame(&mut self, _frame: u64, _slot_count: u32) {}
        fn poll_frame(&mut self, _frame: u64) -> QueryStatus {
            self.polls += 1;
            if self.polls > self.latency {
                self.polls = 0;
                QueryStatus::Ready(vec![Some(1.0)])
            } else {
                QueryStatus::Pending
            }
        }
        fn take_disjoint(&mut self) -> bool {
            false
        }
        fn discard_frame(&mut self, frame: u64) {
            self.discarded.push(frame);
        }
    }

    #[test]
    fn test_enable_applies_at_frame_start() {
        let mut profiler = GpuProfiler::new(CountingBackend::default(), &ProfilerSettings::default()).unwrap();
        profiler.frame_start();
        profiler.set_enabled(true);
        assert!(profiler.enable_requested());
        assert!(!profiler.enabled());
        assert!(profiler.get_slot("early").is_none());
        profiler.frame_end();
        assert_eq!(profiler.pending_frames(), 0);

        profiler.frame_start();
        assert!(profiler.enabled());
        let slot = profiler.get_slot("forward").unwrap();
        assert_eq!((slot.frame, slot.index), (2, 0));
        assert_eq!(profiler.get_slot("post").unwrap().index, 1);
    }

    #[test]
    fn test_slot_budget() {
        let settings = ProfilerSettings {
            enabled: true,
            max_slots: 1,
            ..Default::default()
        };
        let mut profiler = GpuProfiler::new(CountingBackend::default(), &settings).unwrap();
        profiler.frame_start();
        assert!(profiler.get_slot("a").is_some());
        assert!(profiler.get_slot("b").is_none());
        assert!(profiler.slot_overflow_warned);
        profiler.frame_end();

        // The overflow warning is re-armed every frame.
        profiler.frame_start();
        assert!(!profiler.slot_overflow_warned);
        assert!(profiler.get_slot("a").is_some());
        assert!(profiler.get_slot("b").is_none());
        assert!(profiler.slot_overflow_warned);
    }

    #[test]
    fn test_disable_discards_pending() {
        let settings = ProfilerSettings {
            enabled: true,
            ..Default::default()
        };
        let backend = CountingBackend {
            latency: 100,
            ..Default::default()
        };
        let mut profiler = GpuProfiler::new(backend, &settings).unwrap();
        profiler.frame_start();
        profiler.get_slot("a");
        profiler.frame_end();
        assert!(profiler.request().is_empty());

        profiler.set_enabled(false);
        profiler.frame_start();
        assert_eq!(profiler.pending_frames(), 0);
        assert_eq!(profiler.backend().discarded, vec![1]);
    }

    #[test]
    fn test_pending_is_bounded_by_frames_in_flight() {
        let settings = ProfilerSettings {
            enabled: true,
            frames_in_flight: 2,
            ..Default::default()
        };
        let backend = CountingBackend {
            latency: u32::MAX,
            ..Default::default()
        };
        let mut profiler = GpuProfiler::new(backend, &settings).unwrap();
        for frame in 1..=5 {
            profiler.frame_start();
            assert_eq!(profiler.get_slot("a").is_some(), frame <= 2);
            profiler.frame_end();
        }
        // Frames past the budget stay queued so they are reported as no data.
        assert_eq!(profiler.pending_frames(), 5);
        assert_eq!(profiler.pending.iter().filter(|p| p.timed).count(), 2);
    }
}
