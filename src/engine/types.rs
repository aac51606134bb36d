//! Configuration value types shared with the engine collaborator interface.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the A/V pair an encoder handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    Video,
    Audio,
}

impl fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncoderKind::Video => write!(f, "video"),
            EncoderKind::Audio => write!(f, "audio"),
        }
    }
}

/// Which mix lane a capture source feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Video,
    Audio,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Video => write!(f, "video"),
            SourceKind::Audio => write!(f, "audio"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerLayout {
    Mono,
    Stereo,
    Quad,
    FourPointOne,
    FivePointOne,
    SevenPointOne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleType {
    Point,
    Bilinear,
    Bicubic,
    Lanczos,
    Area,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Colorspace {
    Default,
    Cs601,
    Cs709,
    Srgb,
    Cs2100Pq,
    Cs2100Hlg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoRange {
    Partial,
    Full,
}

/// Rendering backend the video subsystem is initialized with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphicsBackend {
    OpenGl,
    D3d11,
}

impl GraphicsBackend {
    /// Backend expected on the current platform.
    pub fn platform_default() -> Self {
        if cfg!(target_os = "windows") {
            GraphicsBackend::D3d11
        } else {
            GraphicsBackend::OpenGl
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    I420,
    Nv12,
    Yuy2,
    Uyvy,
    Rgba,
    Bgra,
    I444,
    I010,
    P010,
}

/// Frame rate as an exact rational, never a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32,
}

impl Fps {
    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }
}

impl fmt::Display for Fps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Parameters for the audio subsystem reset (bring-up stage 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub fixed_buffering: bool,
    pub speakers: SpeakerLayout,
    pub max_buffering_ms: u32,
    pub samples_per_sec: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fixed_buffering: false,
            speakers: SpeakerLayout::Stereo,
            max_buffering_ms: 1000,
            samples_per_sec: 48_000,
        }
    }
}

/// Parameters for the video subsystem reset (bring-up stage 3).
///
/// Legal at most once per instance lifetime; the sequencer rejects a second
/// reset before it ever reaches the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    pub adapter: u32,
    pub base_width: u32,
    pub base_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub scale_type: ScaleType,
    pub colorspace: Colorspace,
    pub fps: Fps,
    pub gpu_conversion: bool,
    pub range: VideoRange,
    pub graphics_backend: GraphicsBackend,
    pub output_format: PixelFormat,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            adapter: 0,
            base_width: 2560,
            base_height: 1440,
            output_width: 2560,
            output_height: 1440,
            scale_type: ScaleType::Bicubic,
            colorspace: Colorspace::Cs709,
            fps: Fps::new(60, 1),
            gpu_conversion: true,
            range: VideoRange::Partial,
            graphics_backend: GraphicsBackend::platform_default(),
            output_format: PixelFormat::Nv12,
        }
    }
}
