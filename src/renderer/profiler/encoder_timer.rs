//! Command-encoder timestamp backend.
//!
//! Every slot gets its own two-query set, written with
//! `CommandEncoder::write_timestamp` around the pass, so passes that cannot
//! take `timestamp_writes` (or several passes grouped under one slot) can be
//! timed. Query pairs are pooled and results are cached per slot until the
//! whole frame is known.

use log::{debug, warn};

use super::gpu_profiler::{QueryStatus, SlotQueries, TimestampBackend, TimestampMode};
use super::readback::{ReadbackStatus, TimestampReadback, ticks_to_millis};
use crate::errors::{Result, SchedulerError};
use crate::settings::ProfilerSettings;

struct QueryPair {
    query_set: wgpu::QuerySet,
    readback: TimestampReadback,
}

enum SlotState {
    Waiting(QueryPair),
    Done(Option<f64>),
}

struct EncoderFrame {
    frame: u64,
    slots: Vec<SlotState>,
}

pub struct EncoderTimer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    period_ns: f64,

    frames: Vec<EncoderFrame>,
    max_frames: usize,

    // Ready for reuse.
    free_pairs: Vec<QueryPair>,
    // Released while a readback may still be in flight.
    reclaiming: Vec<QueryPair>,
    allocated_pairs: usize,
    max_pairs: usize,

    disjoint: bool,
}

impl EncoderTimer {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, settings: &ProfilerSettings) -> Result<Self> {
        settings.validate()?;
        let features = device.features();
        if !features.contains(wgpu::Features::TIMESTAMP_QUERY) {
            return Err(SchedulerError::TimestampQueryUnsupported("TIMESTAMP_QUERY"));
        }
        if !features.contains(wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS) {
            return Err(SchedulerError::TimestampQueryUnsupported(
                "TIMESTAMP_QUERY_INSIDE_ENCODERS",
            ));
        }

        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            period_ns: f64::from(queue.get_timestamp_period()),
            frames: Vec::new(),
            max_frames: settings.frames_in_flight as usize,
            free_pairs: Vec::new(),
            reclaiming: Vec::new(),
            allocated_pairs: 0,
            max_pairs: settings.max_slots as usize * settings.frames_in_flight as usize,
            disjoint: false,
        })
    }

    /// Number of query pairs created so far.
    #[must_use]
    pub fn allocated_pairs(&self) -> usize {
        self.allocated_pairs
    }

    fn acquire_pair(&mut self) -> Option<QueryPair> {
        let mut index = 0;
        while index < self.reclaiming.len() {
            if self.reclaiming[index].readback.try_reclaim() {
                let pair = self.reclaiming.swap_remove(index);
                self.free_pairs.push(pair);
            } else {
                index += 1;
            }
        }

        if let Some(pair) = self.free_pairs.pop() {
            return Some(pair);
        }
        if self.allocated_pairs >= self.max_pairs {
            return None;
        }
        let label = format!("GpuProfiler.pair{}", self.allocated_pairs);
        self.allocated_pairs += 1;
        Some(QueryPair {
            query_set: self.device.create_query_set(&wgpu::QuerySetDescriptor {
                label: Some(&label),
                ty: wgpu::QueryType::Timestamp,
                count: 2,
            }),
            readback: TimestampReadback::new(&self.device, &label, 2),
        })
    }

    fn release_frame(&mut self, position: usize) {
        let frame = self.frames.remove(position);
        for slot in frame.slots {
            if let SlotState::Waiting(pair) = slot {
                self.reclaiming.push(pair);
            }
        }
    }
}

impl TimestampBackend for EncoderTimer {
    fn begin_frame(&mut self, frame: u64) -> bool {
        if self.frames.len() >= self.max_frames {
            return false;
        }
        self.frames.push(EncoderFrame {
            frame,
            slots: Vec::new(),
        });
        true
    }

    fn slot_queries(&mut self, frame: u64, index: u32) -> Option<SlotQueries> {
        let position = self.frames.iter().position(|f| f.frame == frame)?;
        let pair = self.acquire_pair();
        let slots = &mut self.frames[position].slots;
        while slots.len() < index as usize {
            slots.push(SlotState::Done(None));
        }

        let Some(pair) = pair else {
            slots.push(SlotState::Done(None));
            return None;
        };
        let queries = SlotQueries {
            query_set: pair.query_set.clone(),
            begin: 0,
            end: 1,
            mode: TimestampMode::EncoderWrites,
        };
        slots.push(SlotState::Waiting(pair));
        Some(queries)
    }

    fn end_frame(&mut self, frame: u64, slot_count: u32) {
        let Some(entry) = self.frames.iter_mut().find(|f| f.frame == frame) else {
            return;
        };
        if entry.slots.len() != slot_count as usize {
            debug!(
                "EncoderTimer: frame {frame} has {} slots, profiler reported {slot_count}",
                entry.slots.len()
            );
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("GpuProfiler Resolve"),
            });
        let mut resolved = false;
        for slot in &mut entry.slots {
            if let SlotState::Waiting(pair) = slot {
                pair.readback.resolve(&mut encoder, &pair.query_set, 0..2);
                resolved = true;
            }
        }
        if resolved {
            self.queue.submit(Some(encoder.finish()));
        }
    }

    fn poll_frame(&mut self, frame: u64) -> QueryStatus {
        let Some(position) = self.frames.iter().position(|f| f.frame == frame) else {
            warn!("EncoderTimer: frame {frame} is not in flight");
            return QueryStatus::Lost;
        };
        let _ = self.device.poll(wgpu::PollType::Poll);

        let mut complete = true;
        let mut lost = false;
        let mut finished = Vec::new();
        for slot in &mut self.frames[position].slots {
            let SlotState::Waiting(pair) = &mut *slot else {
                continue;
            };
            match pair.readback.poll() {
                ReadbackStatus::Pending => complete = false,
                ReadbackStatus::Ready(ticks) => {
                    let (times, disjoint) = ticks_to_millis(&ticks, 1, self.period_ns);
                    self.disjoint |= disjoint;
                    if let SlotState::Waiting(pair) =
                        std::mem::replace(slot, SlotState::Done(times.first().copied().flatten()))
                    {
                        finished.push(pair);
                    }
                }
                ReadbackStatus::Failed => {
                    lost = true;
                    if let SlotState::Waiting(pair) = std::mem::replace(slot, SlotState::Done(None)) {
                        finished.push(pair);
                    }
                }
            }
        }
        self.reclaiming.append(&mut finished);

        if lost {
            self.release_frame(position);
            return QueryStatus::Lost;
        }
        if !complete {
            return QueryStatus::Pending;
        }
        let entry = self.frames.remove(position);
        QueryStatus::Ready(
            entry
                .slots
                .into_iter()
                .map(|slot| match slot {
                    SlotState::Done(ms) => ms,
                    SlotState::Waiting(_) => None,
                })
                .collect(),
        )
    }

    fn take_disjoint(&mut self) -> bool {
        std::mem::take(&mut self.disjoint)
    }

    fn discard_frame(&mut self, frame: u64) {
        if let Some(position) = self.frames.iter().position(|f| f.frame == frame) {
            self.release_frame(position);
        }
    }
}
