//! Decoder that turns every packet straight into one output frame

use super::{BackendStats, AUDIO_FRAME_MS};
use crate::decoder::{
    AudioSamples, BufferPool, DecodeOutput, Decoder, DecoderAttr, FramePayload, InputStatus,
    MediaKind, OutputBuffer, VideoPicture,
};
use crate::source::FramePacket;
use crate::utils::error::{PlayerError, Result};
use log::warn;
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const INPUT_CAPACITY: usize = 8;

/// Pass-through `Decoder`
///
/// Video packets become pictures of the configured size; audio packets
/// become `AUDIO_FRAME_MS` of silence. End of stream is reported once all
/// preceding input has been drained and keeps being reported until flush.
pub struct PassthroughDecoder {
    attr: DecoderAttr,
    stats: Arc<BackendStats>,
    pool: BufferPool,
    input: VecDeque<FramePacket>,
    started: bool,
}

impl PassthroughDecoder {
    pub fn new(attr: DecoderAttr, stats: Arc<BackendStats>) -> Self {
        let pool = BufferPool::new(attr.output_buffers.max(1) as usize);
        Self {
            attr,
            stats,
            pool,
            input: VecDeque::with_capacity(INPUT_CAPACITY),
            started: false,
        }
    }

    fn payload(&self, packet: &FramePacket) -> FramePayload {
        match self.attr.kind {
            MediaKind::Video => FramePayload::Video(VideoPicture {
                width: self.attr.width,
                height: self.attr.height,
                data: packet.data.clone().unwrap_or_default(),
            }),
            MediaKind::Audio => {
                let frames = self.attr.sample_rate as usize * AUDIO_FRAME_MS as usize / 1000;
                FramePayload::Audio(AudioSamples {
                    sample_rate: self.attr.sample_rate,
                    channels: self.attr.channels,
                    data: vec![0; frames * self.attr.channels as usize],
                })
            }
        }
    }
}

impl Decoder for PassthroughDecoder {
    fn kind(&self) -> MediaKind {
        self.attr.kind
    }

    fn start(&mut self) -> Result<()> {
        self.started = true;
        BackendStats::bump(&self.stats.decoders_started);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        self.input.clear();
        BackendStats::bump(&self.stats.decoders_stopped);
        let outstanding = self.pool.outstanding();
        if outstanding > 0 {
            self.stats
                .buffers_outstanding_at_stop
                .fetch_add(outstanding, Ordering::SeqCst);
            warn!("{:?} decoder stopped with {} buffers lent out", self.attr.kind, outstanding);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.input.clear();
        BackendStats::bump(&self.stats.decoder_flushes);
        Ok(())
    }

    fn queue_input(&mut self, packet: &FramePacket) -> Result<InputStatus> {
        if !self.started {
            return Err(PlayerError::decoder_error("input before start"));
        }
        if packet.kind != self.attr.kind {
            return Err(PlayerError::decoder_error(format!(
                "{:?} packet sent to {:?} decoder",
                packet.kind, self.attr.kind
            )));
        }
        if self.input.len() >= INPUT_CAPACITY {
            return Ok(InputStatus::Full);
        }
        self.input.push_back(packet.clone());
        Ok(InputStatus::Accepted)
    }

    fn dequeue_output(&mut self) -> Result<DecodeOutput> {
        let Some(front) = self.input.front() else {
            return Ok(DecodeOutput::Pending);
        };
        if front.is_end_of_stream() {
            return Ok(DecodeOutput::EndOfStream);
        }
        let Some(handle) = self.pool.acquire() else {
            return Ok(DecodeOutput::Pending);
        };
        let payload = self.payload(front);
        let pts_ms = front.pts_ms.unwrap_or_default();
        self.input.pop_front();
        Ok(DecodeOutput::Frame(OutputBuffer::new(handle, pts_ms, payload)))
    }

    fn release_output(&mut self, buffer: OutputBuffer) -> Result<()> {
        self.pool.release(buffer.handle())
    }

    fn free_output_buffers(&self) -> usize {
        self.pool.available()
    }
}
