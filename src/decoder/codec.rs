//! Codec identification
//!
//! Maps container-level codec identifiers to decoder mime types. The table
//! is a pure function over the enum, so it needs no runtime initialisation.

use serde::{Deserialize, Serialize};

/// Codec reported by the source for a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodecFormat {
    H264,
    H265,
    Jpeg,
    Aac,
    G711A,
    G711U,
    Pcm,
    Mp3,
    G726,
    Unknown,
}

/// Mime type handed to the decoder factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodecMime {
    VideoAvc,
    VideoHevc,
    ImageJpeg,
    AudioAac,
    AudioG711A,
    AudioG711U,
    AudioPcm,
    AudioMpeg,
    AudioG726,
    Invalid,
}

impl CodecFormat {
    /// Mime type for this codec
    pub fn mime(self) -> CodecMime {
        match self {
            CodecFormat::H264 => CodecMime::VideoAvc,
            CodecFormat::H265 => CodecMime::VideoHevc,
            CodecFormat::Jpeg => CodecMime::ImageJpeg,
            CodecFormat::Aac => CodecMime::AudioAac,
            CodecFormat::G711A => CodecMime::AudioG711A,
            CodecFormat::G711U => CodecMime::AudioG711U,
            CodecFormat::Pcm => CodecMime::AudioPcm,
            CodecFormat::Mp3 => CodecMime::AudioMpeg,
            CodecFormat::G726 => CodecMime::AudioG726,
            CodecFormat::Unknown => CodecMime::Invalid,
        }
    }

    /// Whether the engine can play this codec on a video track
    pub fn is_playable_video(self) -> bool {
        matches!(self, CodecFormat::H264 | CodecFormat::H265 | CodecFormat::Jpeg)
    }

    /// Still-image codecs cannot be seeked or trick-played
    pub fn is_image(self) -> bool {
        self == CodecFormat::Jpeg
    }

    /// Audio decoder implementation name, if one exists for this codec
    pub fn audio_decoder_name(self) -> Option<&'static str> {
        match self {
            CodecFormat::Aac => Some("aac"),
            CodecFormat::Mp3 => Some("mp3"),
            CodecFormat::Pcm => Some("pcm"),
            _ => None,
        }
    }
}

impl CodecMime {
    /// Canonical mime string
    pub fn as_str(self) -> &'static str {
        match self {
            CodecMime::VideoAvc => "video/avc",
            CodecMime::VideoHevc => "video/hevc",
            CodecMime::ImageJpeg => "image/jpeg",
            CodecMime::AudioAac => "audio/aac",
            CodecMime::AudioG711A => "audio/g711a",
            CodecMime::AudioG711U => "audio/g711u",
            CodecMime::AudioPcm => "audio/pcm",
            CodecMime::AudioMpeg => "audio/mpeg",
            CodecMime::AudioG726 => "audio/g726",
            CodecMime::Invalid => "",
        }
    }
}

impl std::fmt::Display for CodecMime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
