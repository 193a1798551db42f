//! Volume attributes for the audio sink

use serde::{Deserialize, Serialize};

/// Per-channel gain, each in 0.0 - 1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeAttr {
    pub left: f32,
    pub right: f32,
}

impl VolumeAttr {
    /// Create a volume, clamping each side into range
    pub fn new(left: f32, right: f32) -> Self {
        Self {
            left: sanitize(left),
            right: sanitize(right),
        }
    }

    pub fn is_muted(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }

    /// Scale interleaved samples in place
    ///
    /// Mono input uses the average of both gains; for more than two
    /// channels only the first two are scaled.
    pub fn apply(&self, samples: &mut [i16], channels: u16) {
        let scale = |s: i16, gain: f32| (s as f32 * gain) as i16;
        match channels {
            0 => {}
            1 => {
                let gain = (self.left + self.right) / 2.0;
                samples.iter_mut().for_each(|s| *s = scale(*s, gain));
            }
            n => {
                for frame in samples.chunks_mut(n as usize) {
                    frame[0] = scale(frame[0], self.left);
                    if let Some(right) = frame.get_mut(1) {
                        *right = scale(*right, self.right);
                    }
                }
            }
        }
    }
}

impl Default for VolumeAttr {
    fn default() -> Self {
        Self {
            left: 1.0,
            right: 1.0,
        }
    }
}

fn sanitize(gain: f32) -> f32 {
    if gain.is_nan() {
        0.0
    } else {
        crate::utils::clamp(gain, 0.0, 1.0)
    }
}
