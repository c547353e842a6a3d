//! Render-pass timestamp backend.
//!
//! One query set of `2 * max_slots` timestamps per frame in flight. Slot `i`
//! owns queries `2i` (beginning of pass) and `2i + 1` (end of pass), written
//! through the pass descriptor's `timestamp_writes`. `end_frame` resolves the
//! used range in one go.

use log::{debug, warn};

use super::gpu_profiler::{QueryStatus, SlotQueries, TimestampBackend, TimestampMode};
use super::readback::{ReadbackStatus, TimestampReadback, ticks_to_millis};
use crate::errors::{Result, SchedulerError};
use crate::settings::ProfilerSettings;

struct FrameQueries {
    frame: Option<u64>,
    query_set: wgpu::QuerySet,
    readback: TimestampReadback,
    slot_count: u32,
}

pub struct QuerySetTimer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    period_ns: f64,
    frames: Vec<FrameQueries>,
    disjoint: bool,
}

impl QuerySetTimer {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, settings: &ProfilerSettings) -> Result<Self> {
        settings.validate()?;
        if !device.features().contains(wgpu::Features::TIMESTAMP_QUERY) {
            return Err(SchedulerError::TimestampQueryUnsupported("TIMESTAMP_QUERY"));
        }
        let max = wgpu::QUERY_SET_MAX_QUERIES / 2;
        if settings.max_slots > max {
            return Err(SchedulerError::ProfilerCapacity {
                requested: settings.max_slots,
                max,
            });
        }

        let query_count = settings.max_slots * 2;
        let frames = (0..settings.frames_in_flight)
            .map(|i| {
                let label = format!("GpuProfiler.frame{i}");
                FrameQueries {
                    frame: None,
                    query_set: device.create_query_set(&wgpu::QuerySetDescriptor {
                        label: Some(&label),
                        ty: wgpu::QueryType::Timestamp,
                        count: query_count,
                    }),
                    readback: TimestampReadback::new(device, &label, query_count),
                    slot_count: 0,
                }
            })
            .collect();

        let period_ns = f64::from(queue.get_timestamp_period());
        debug!(
            "QuerySetTimer: {} frames x {} queries, period {period_ns} ns",
            settings.frames_in_flight, query_count
        );

        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            period_ns,
            frames,
            disjoint: false,
        })
    }

    fn entry(&mut self, frame: u64) -> Option<&mut FrameQueries> {
        self.frames.iter_mut().find(|entry| entry.frame == Some(frame))
    }
}

impl TimestampBackend for QuerySetTimer {
    fn begin_frame(&mut self, frame: u64) -> bool {
        let Some(entry) = self
            .frames
            .iter_mut()
            .find_map(|entry| (entry.frame.is_none() && entry.readback.try_reclaim()).then_some(entry))
        else {
            return false;
        };
        entry.frame = Some(frame);
        entry.slot_count = 0;
        true
    }

    fn slot_queries(&mut self, frame: u64, index: u32) -> Option<SlotQueries> {
        let entry = self.entry(frame)?;
        Some(SlotQueries {
            query_set: entry.query_set.clone(),
            begin: index * 2,
            end: index * 2 + 1,
            mode: TimestampMode::PassWrites,
        })
    }

    fn end_frame(&mut self, frame: u64, slot_count: u32) {
        let Some(entry) = self.frames.iter_mut().find(|entry| entry.frame == Some(frame)) else {
            return;
        };
        entry.slot_count = slot_count;
        if slot_count == 0 {
            return;
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("GpuProfiler Resolve"),
            });
        entry
            .readback
            .resolve(&mut encoder, &entry.query_set, 0..slot_count * 2);
        self.queue.submit(Some(encoder.finish()));
    }

    fn poll_frame(&mut self, frame: u64) -> QueryStatus {
        let _ = self.device.poll(wgpu::PollType::Poll);
        let period_ns = self.period_ns;
        let Some(entry) = self.frames.iter_mut().find(|entry| entry.frame == Some(frame)) else {
            warn!("QuerySetTimer: frame {frame} is not in flight");
            return QueryStatus::Lost;
        };
        if entry.slot_count == 0 {
            entry.frame = None;
            return QueryStatus::Ready(Vec::new());
        }
        match entry.readback.poll() {
            ReadbackStatus::Pending => QueryStatus::Pending,
            ReadbackStatus::Ready(ticks) => {
                entry.frame = None;
                let (times, disjoint) = ticks_to_millis(&ticks, entry.slot_count as usize, period_ns);
                self.disjoint |= disjoint;
                QueryStatus::Ready(times)
            }
            ReadbackStatus::Failed => {
                entry.frame = None;
                QueryStatus::Lost
            }
        }
    }

    fn take_disjoint(&mut self) -> bool {
        std::mem::take(&mut self.disjoint)
    }

    fn discard_frame(&mut self, frame: u64) {
        // The readback is reclaimed lazily by `begin_frame`.
        if let Some(entry) = self.entry(frame) {
            entry.frame = None;
        }
    }
}
