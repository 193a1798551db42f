//! Audio sink
//!
//! Bridges decoded PCM to an `AudioDevice` and derives the audible
//! stream position from the device's consumed sample count.

use crate::audio::{AudioDevice, AudioSinkAttr, AudioStreamType, SyncEngine, VolumeAttr};
use crate::decoder::{FramePayload, MediaKind, OutputBuffer};
use crate::sink::{
    RenderMode, RenderQueue, RenderStatus, Sink, SinkCore, SinkEvent, SinkState, WriteStatus,
};
use crate::utils::error::{PlayerError, Result};
use log::{debug, info};

pub struct AudioSink {
    core: SinkCore,
    device: Box<dyn AudioDevice>,
    attr: AudioSinkAttr,
    opened: bool,
    /// Timestamp of the first sample written since start or reset
    anchor_pts: Option<i64>,
    position_ms: Option<i64>,
}

impl AudioSink {
    pub fn new(device: Box<dyn AudioDevice>, attr: AudioSinkAttr) -> Self {
        Self {
            core: SinkCore::new(MediaKind::Audio),
            device,
            attr,
            opened: false,
            anchor_pts: None,
            position_ms: None,
        }
    }

    /// Open the device
    pub fn init(&mut self) -> Result<()> {
        self.device.open(&self.attr)?;
        if let Some(volume) = self.attr.volume {
            self.device.set_volume(volume)?;
        }
        self.opened = true;
        info!(
            "audio sink opened: {}Hz, {} channels, {:?}",
            self.attr.sample_rate, self.attr.channels, self.attr.stream_type
        );
        Ok(())
    }

    /// Close the device
    pub fn deinit(&mut self) -> Result<()> {
        if self.opened {
            self.opened = false;
            self.device.close()?;
        }
        Ok(())
    }

    pub fn set_volume(&mut self, volume: VolumeAttr) -> Result<()> {
        self.attr.volume = Some(volume);
        if self.opened {
            self.device.set_volume(volume)?;
        }
        Ok(())
    }

    pub fn set_stream_type(&mut self, stream_type: AudioStreamType) -> Result<()> {
        self.attr.stream_type = stream_type;
        if self.opened {
            self.device.set_stream_type(stream_type)?;
        }
        Ok(())
    }

    /// Stream time currently audible at the device output
    pub fn position_ms(&self) -> Option<i64> {
        self.position_ms
    }

    fn update_position(&mut self, sync: &mut SyncEngine) {
        let Some(anchor) = self.anchor_pts else {
            return;
        };
        if self.attr.sample_rate == 0 {
            return;
        }

        let consumed_ms = (self.device.consumed_samples() * 1000 / self.attr.sample_rate as u64) as i64;
        let position = (anchor + consumed_ms - self.device.latency_ms() as i64).max(anchor);
        self.position_ms = Some(position);
        sync.update_audio_position(position);
    }
}

impl Sink for AudioSink {
    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn start(&mut self) -> Result<()> {
        self.core.start();
        self.anchor_pts = None;
        self.position_ms = None;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.core.stop();
        if self.opened {
            self.device.flush()?;
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.core.pause();
        if self.opened {
            self.device.pause()?;
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if self.opened {
            self.device.resume()?;
        }
        self.core.resume();
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset();
        self.anchor_pts = None;
        self.position_ms = None;
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        if self.opened {
            self.device.flush()?;
        }
        Ok(())
    }

    fn render_frame(
        &mut self,
        frame: Option<OutputBuffer>,
        sync: &mut SyncEngine,
        events: &mut Vec<SinkEvent>,
    ) -> RenderStatus {
        let device = &mut self.device;
        let anchor = &mut self.anchor_pts;
        let status = self.core.render(frame, sync, events, |buffer| match &buffer.payload {
            FramePayload::Audio(samples) => {
                let written = device.write(samples)?;
                if written == WriteStatus::Written && anchor.is_none() {
                    debug!("audio position anchored at {}ms", buffer.pts_ms);
                    *anchor = Some(buffer.pts_ms);
                }
                Ok(written)
            }
            FramePayload::Video(_) => Err(PlayerError::AudioPlay(
                "video frame routed to audio sink".to_string(),
            )),
        });

        if self.core.state() == SinkState::Started {
            self.update_position(sync);
        }
        status
    }

    fn render_eos(&mut self) {
        self.core.signal_eos();
    }

    fn dequeue_release(&mut self) -> Option<OutputBuffer> {
        self.core.queue_mut().pop_release()
    }

    fn set_render_mode(&mut self, mode: RenderMode) {
        self.core.set_mode(mode);
    }

    fn last_rendered_pts(&self) -> Option<i64> {
        self.position_ms.or(self.core.last_pts())
    }

    fn state(&self) -> SinkState {
        self.core.state()
    }

    fn queue(&self) -> &RenderQueue {
        self.core.queue()
    }
}
