//! Non-blocking timestamp readback.
//!
//! A resolve buffer receives the query results on the GPU, a mappable buffer
//! receives a copy of it. Mapping is requested on the first poll after
//! submission and completion is observed through a channel the map callback
//! writes to, so a poll never waits on the GPU.
//!
//! ```text
//! Idle ──resolve()──► Submitted ──poll()──► Mapping ──poll()──► Idle
//!                                              │ (map done: read, unmap)
//!                                              └─ Pending while the GPU is busy
//! ```

use log::warn;

/// Result of one [`TimestampReadback::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadbackStatus {
    Pending,
    Ready(Vec<u64>),
    Failed,
}

enum ReadbackState {
    Idle,
    Submitted,
    Mapping {
        receiver: flume::Receiver<Result<(), wgpu::BufferAsyncError>>,
    },
}

pub struct TimestampReadback {
    resolve_buffer: wgpu::Buffer,
    readback_buffer: wgpu::Buffer,
    query_count: u32,
    state: ReadbackState,
}

impl TimestampReadback {
    #[must_use]
    pub fn new(device: &wgpu::Device, label: &str, query_count: u32) -> Self {
        let size = u64::from(query_count) * std::mem::size_of::<u64>() as u64;
        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label}.resolve")),
            size,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label}.readback")),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            resolve_buffer,
            readback_buffer,
            query_count,
            state: ReadbackState::Idle,
        }
    }

    /// Records the resolve of `queries` and the copy into the mappable buffer.
    /// The encoder must be submitted before the next [`poll`](Self::poll).
    pub fn resolve(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        query_set: &wgpu::QuerySet,
        queries: std::ops::Range<u32>,
    ) {
        debug_assert!(queries.end <= self.query_count);
        if !matches!(self.state, ReadbackState::Idle) {
            warn!("Timestamp readback resolved while still in flight, ignoring");
            return;
        }
        let size = u64::from(queries.end - queries.start) * std::mem::size_of::<u64>() as u64;
        encoder.resolve_query_set(query_set, queries, &self.resolve_buffer, 0);
        encoder.copy_buffer_to_buffer(&self.resolve_buffer, 0, &self.readback_buffer, 0, size);
        self.state = ReadbackState::Submitted;
    }

    /// Advances the readback without blocking. The device must have been
    /// polled for map callbacks to fire.
    pub fn poll(&mut self) -> ReadbackStatus {
        match std::mem::replace(&mut self.state, ReadbackState::Idle) {
            ReadbackState::Idle => ReadbackStatus::Failed,
            ReadbackState::Submitted => {
                let (sender, receiver) = flume::bounded(1);
                self.readback_buffer
                    .slice(..)
                    .map_async(wgpu::MapMode::Read, move |result| {
                        let _ = sender.send(result);
                    });
                self.state = ReadbackState::Mapping { receiver };
                ReadbackStatus::Pending
            }
            ReadbackState::Mapping { receiver } => match receiver.try_recv() {
                Ok(Ok(())) => {
                    let ticks = {
                        let mapped = self.readback_buffer.slice(..).get_mapped_range();
                        bytemuck::cast_slice::<u8, u64>(&mapped).to_vec()
                    };
                    self.readback_buffer.unmap();
                    ReadbackStatus::Ready(ticks)
                }
                Ok(Err(err)) => {
                    warn!("Timestamp readback failed: {err}");
                    ReadbackStatus::Failed
                }
                Err(flume::TryRecvError::Empty) => {
                    self.state = ReadbackState::Mapping { receiver };
                    ReadbackStatus::Pending
                }
                Err(flume::TryRecvError::Disconnected) => ReadbackStatus::Failed,
            },
        }
    }

    /// Returns `true` once the buffers can be reused. An abandoned mapping is
    /// finished (and its data dropped) as soon as it completes.
    pub fn try_reclaim(&mut self) -> bool {
        match &self.state {
            ReadbackState::Idle => true,
            ReadbackState::Submitted => {
                self.state = ReadbackState::Idle;
                true
            }
            ReadbackState::Mapping { .. } => !matches!(self.poll(), ReadbackStatus::Pending),
        }
    }
}

/// Converts resolved begin/end tick pairs to milliseconds.
///
/// Returns the per-slot times and whether a pair ran backwards, which means
/// the GPU timeline was interrupted between the two writes. A pair that was
/// never written (both zero) has no time.
#[must_use]
pub fn ticks_to_millis(ticks: &[u64], slot_count: usize, period_ns: f64) -> (Vec<Option<f64>>, bool) {
    let mut disjoint = false;
    let times = (0..slot_count)
        .map(|slot| {
            let (Some(&begin), Some(&end)) = (ticks.get(slot * 2), ticks.get(slot * 2 + 1)) else {
                return None;
            };
            if begin == 0 && end == 0 {
                return None;
            }
            if end < begin {
                disjoint = true;
                return None;
            }
            Some((end - begin) as f64 * period_ns / 1_000_000.0)
        })
        .collect();
    (times, disjoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_to_millis() {
        let (times, disjoint) = ticks_to_millis(&[1_000, 3_000_000, 0, 0], 3, 1.0);
        assert!(!disjoint);
        assert_eq!(times.len(), 3);
        assert!((times[0].unwrap() - 2.999).abs() < 1e-9);
        assert_eq!(times[1], None);
        assert_eq!(times[2], None);
    }

    #[test]
    fn test_backwards_ticks_are_disjoint() {
        let (times, disjoint) = ticks_to_millis(&[500, 100], 1, 1.0);
        assert!(disjoint);
        assert_eq!(times, vec![None]);
    }
}
