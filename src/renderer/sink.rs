//! Video sink

use crate::audio::SyncEngine;
use crate::decoder::{FramePayload, MediaKind, OutputBuffer};
use crate::renderer::{DisplayRegion, VideoDevice, VideoSinkAttr};
use crate::sink::{RenderMode, RenderQueue, RenderStatus, Sink, SinkCore, SinkEvent, SinkState};
use crate::utils::error::{PlayerError, Result};
use log::info;

pub struct VideoSink {
    core: SinkCore,
    device: Box<dyn VideoDevice>,
    attr: VideoSinkAttr,
    opened: bool,
}

impl VideoSink {
    pub fn new(device: Box<dyn VideoDevice>, attr: VideoSinkAttr) -> Self {
        Self {
            core: SinkCore::new(MediaKind::Video),
            device,
            attr,
            opened: false,
        }
    }

    /// Open the device and apply the display region, if one is set
    pub fn init(&mut self) -> Result<()> {
        self.device.open(&self.attr)?;
        if let Some(region) = self.attr.region {
            self.device.set_display_region(region)?;
        }
        self.opened = true;
        info!("video sink opened: {}x{}", self.attr.width, self.attr.height);
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

    pub fn set_display_region(&mut self, region: DisplayRegion) -> Result<()> {
        if region.width == 0 || region.height == 0 {
            return Err(PlayerError::illegal_param("display region must be non-empty"));
        }
        self.attr.region = Some(region);
        if self.opened {
            self.device.set_display_region(region)?;
        }
        Ok(())
    }
}

impl Sink for VideoSink {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn start(&mut self) -> Result<()> {
        self.core.start();
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.core.stop();
        self.flush()
    }

    fn pause(&mut self) -> Result<()> {
        self.core.pause();
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.core.resume();
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.core.reset();
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
        self.core.render(frame, sync, events, |buffer| match &buffer.payload {
            FramePayload::Video(picture) => device.render(picture, buffer.pts_ms),
            FramePayload::Audio(_) => Err(PlayerError::VideoPlay(
                "audio frame routed to video sink".to_string(),
            )),
        })
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
        self.core.last_pts()
    }

    fn state(&self) -> SinkState {
        self.core.state()
    }

    fn queue(&self) -> &RenderQueue {
        self.core.queue()
    }
}
