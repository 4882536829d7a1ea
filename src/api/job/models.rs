use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::render::{RenderRequest, StyleConfig, VoiceConfig};

fn default_duration() -> u32 {
    30
}

fn default_voice_type() -> String {
    "female-natural".to_string()
}

fn default_template() -> String {
    "modern".to_string()
}

fn default_color_scheme() -> String {
    "blue-gradient".to_string()
}

fn default_font_family() -> String {
    "roboto".to_string()
}

fn default_speech_speed() -> String {
    "normal".to_string()
}

/// Video generation request, validated before a job is created
#[derive(Deserialize, Serialize, Debug, Clone, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VideoRequest {
    #[validate(length(min = 1, max = 1000, message = "Text must be 1-1000 characters"))]
    pub text: String,

    /// Target length in seconds
    #[serde(default = "default_duration")]
    #[validate(range(min = 10, max = 300, message = "Duration must be 10-300 seconds"))]
    pub duration: u32,

    #[serde(default = "default_voice_type")]
    pub voice_type: String,

    #[serde(default = "default_template")]
    pub template: String,

    #[serde(default = "default_color_scheme")]
    pub color_scheme: String,

    #[serde(default = "default_font_family")]
    pub font_family: String,

    #[serde(default = "default_speech_speed")]
    pub speech_speed: String,
}

impl From<VideoRequest> for RenderRequest {
    fn from(request: VideoRequest) -> Self {
        RenderRequest {
            text: request.text,
            duration_secs: request.duration,
            voice: VoiceConfig {
                voice_type: request.voice_type,
                speech_speed: request.speech_speed,
            },
            style: StyleConfig {
                template: request.template,
                color_scheme: request.color_scheme,
                font_family: request.font_family,
            },
        }
    }
}
