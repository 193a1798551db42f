//! Per-sink frame queues
//!
//! Decoded frames wait in the cache queue until the sync engine lets them
//! out. Rendered or discarded frames move to the release queue until the
//! scheduling thread hands them back to their decoder.

use crate::decoder::OutputBuffer;
use std::collections::VecDeque;

/// Queue statistics for monitoring
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueueStats {
    /// Total frames added
    pub frames_added: u64,

    /// Frames that reached the device
    pub frames_rendered: u64,

    /// Frames discarded without rendering
    pub frames_dropped: u64,

    /// Maximum cache depth reached
    pub max_depth: usize,
}

/// Cache and release queues of one sink
#[derive(Debug, Default)]
pub struct RenderQueue {
    cache: VecDeque<OutputBuffer>,
    release: VecDeque<OutputBuffer>,
    stats: QueueStats,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a decoded frame for rendering
    pub fn push(&mut self, frame: OutputBuffer) {
        if let Some(last) = self.cache.back() {
            if frame.pts_ms < last.pts_ms {
                log::debug!(
                    "frame pts {} behind queued pts {}, keeping decode order",
                    frame.pts_ms,
                    last.pts_ms
                );
            }
        }
        self.cache.push_back(frame);
        self.stats.frames_added += 1;
        self.stats.max_depth = self.stats.max_depth.max(self.cache.len());
    }

    /// Next frame to render
    pub fn front(&self) -> Option<&OutputBuffer> {
        self.cache.front()
    }

    /// Move the head of the cache queue to the release queue
    ///
    /// # Arguments
    ///
    /// * `rendered` - Whether the frame reached the device or was dropped
    pub fn retire_front(&mut self, rendered: bool) -> Option<i64> {
        let frame = self.cache.pop_front()?;
        let pts = frame.pts_ms;
        if rendered {
            self.stats.frames_rendered += 1;
        } else {
            self.stats.frames_dropped += 1;
        }
        self.release.push_back(frame);
        Some(pts)
    }

    /// Move every cached frame to the release queue without rendering
    pub fn discard_all(&mut self) -> usize {
        let count = self.cache.len();
        self.stats.frames_dropped += count as u64;
        self.release.extend(self.cache.drain(..));
        count
    }

    /// Take one frame that is ready to go back to the decoder
    pub fn pop_release(&mut self) -> Option<OutputBuffer> {
        self.release.pop_front()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn release_len(&self) -> usize {
        self.release.len()
    }

    pub fn is_cache_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        self.stats.clone()
    }
}
