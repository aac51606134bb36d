use crate::engine::settings::{Settings, SettingsBuilder};
use crate::engine::types::{AudioConfig, SourceKind, VideoConfig};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub fn app_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

pub fn app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Namespaced socket name for one supervisor/worker pair. Scoped by pid so
/// concurrent sessions on the same machine never collide.
pub fn channel_id() -> String {
    format!("{}-{}.sock", app_name(), std::process::id())
}

/// An encoder to create during bring-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderSpec {
    pub name: String,
    pub type_id: String,
    #[serde(default)]
    pub settings: Settings,
}

/// A capture source to create during bring-up, bound to a mix channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub kind: SourceKind,
    pub name: String,
    pub type_id: String,
    pub channel: u32,
    #[serde(default)]
    pub settings: Settings,
}

/// The output sink to create during bring-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    pub type_id: String,
    #[serde(default)]
    pub settings: Settings,
}

/// Everything the worker needs to bring one session up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub locale: String,
    pub shutdown_on_dispose: bool,
    pub excluded_modules: Vec<String>,
    pub strict_modules: bool,
    pub audio: AudioConfig,
    pub video: VideoConfig,
    pub video_encoder: EncoderSpec,
    pub audio_encoder: EncoderSpec,
    pub sources: Vec<SourceSpec>,
    pub output: OutputSpec,
}

impl SessionConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            locale: "en-US".to_string(),
            shutdown_on_dispose: true,
            excluded_modules: [
                "aja",
                "aja-output-ui",
                "decklink",
                "win-decklink",
                "enc-amf",
                "rtmp-services",
                "frontend-tools",
                "obs-websocket",
                "win-mf",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            strict_modules: false,
            audio: AudioConfig::default(),
            video: VideoConfig::default(),
            video_encoder: EncoderSpec {
                name: "nvenc".to_string(),
                type_id: "jim_nvenc".to_string(),
                settings: SettingsBuilder::new()
                    .set_string("rate_control", "CQP")
                    .set_int("cqp", 23)
                    .set_string("preset", "medium")
                    .set_string("profile", "high")
                    .build(),
            },
            audio_encoder: EncoderSpec {
                name: "aac".to_string(),
                type_id: "ffmpeg_aac".to_string(),
                settings: SettingsBuilder::new()
                    .set_string("rate_control", "CBR")
                    .set_int("bitrate", 192)
                    .build(),
            },
            sources: vec![
                SourceSpec {
                    kind: SourceKind::Video,
                    name: "screen_capture".to_string(),
                    type_id: "monitor_capture".to_string(),
                    channel: 0,
                    settings: SettingsBuilder::new()
                        .set_bool("capture_cursor", false)
                        .set_int("monitor", 1)
                        .set_int("method", 2)
                        .build(),
                },
                SourceSpec {
                    kind: SourceKind::Audio,
                    name: "audio_capture".to_string(),
                    type_id: "wasapi_output_capture".to_string(),
                    channel: 1,
                    settings: Settings::default(),
                },
            ],
            output: OutputSpec {
                name: "output".to_string(),
                type_id: "ffmpeg_muxer".to_string(),
                settings: SettingsBuilder::new()
                    .set_string("path", "castpilot.mkv")
                    .build(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_consistent() {
        let config = SessionConfig::default();
        assert_eq!(config.audio.samples_per_sec, 48_000);
        assert_eq!(config.video.fps.num, 60);

        // channels unique per kind
        let mut seen = std::collections::HashSet::new();
        for source in &config.sources {
            assert!(seen.insert((source.kind, source.channel)));
        }
    }

    #[test]
    fn test_partial_config_file_falls_back_to_defaults() {
        let config: SessionConfig = serde_json::from_str(
            r#"{
                "locale": "de-DE",
                "output": {
                    "name": "output",
                    "type_id": "flv_output",
                    "settings": {"path": "session.flv"}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.locale, "de-DE");
        assert_eq!(config.output.type_id, "flv_output");
        assert_eq!(
            config.output.settings.get_string("path"),
            Some("session.flv")
        );
        // untouched sections keep their defaults
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.video_encoder.type_id, "jim_nvenc");
    }
}
