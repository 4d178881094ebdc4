use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// Sample rate of the PCM16 audio the endpoint expects from the microphone.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of the PCM16 audio the endpoint streams back.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

const PCM_MIME_PREFIX: &str = "audio/pcm";

/// Builds the mime type of a raw PCM16 block, e.g. `audio/pcm;rate=16000`.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("{};rate={}", PCM_MIME_PREFIX, sample_rate)
}

/// Extracts the `rate=` parameter of an `audio/pcm` mime type.
///
/// Returns `None` for non-PCM mime types or when no rate is present.
pub fn parse_pcm_rate(mime_type: &str) -> Option<u32> {
    let mut params = mime_type.split(';').map(str::trim);
    if params.next()? != PCM_MIME_PREFIX {
        return None;
    }
    params
        .filter_map(|p| p.strip_prefix("rate="))
        .find_map(|rate| rate.parse().ok())
}

pub fn is_audio_mime_type(mime_type: &str) -> bool {
    mime_type.starts_with("audio/")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Voice {
    Puck,
    Charon,
    Kore,
    Fenrir,
    Aoede,
    Zephyr,
    Custom(String),
}

impl Default for Voice {
    fn default() -> Self {
        Voice::Puck
    }
}

impl Voice {
    pub fn as_str(&self) -> &str {
        match self {
            Voice::Puck => "Puck",
            Voice::Charon => "Charon",
            Voice::Kore => "Kore",
            Voice::Fenrir => "Fenrir",
            Voice::Aoede => "Aoede",
            Voice::Zephyr => "Zephyr",
            Voice::Custom(s) => s,
        }
    }
}

impl Serialize for Voice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Puck" => Voice::Puck,
            "Charon" => Voice::Charon,
            "Kore" => Voice::Kore,
            "Fenrir" => Voice::Fenrir,
            "Aoede" => Voice::Aoede,
            "Zephyr" => Voice::Zephyr,
            _ => Voice::Custom(s.to_string()),
        })
    }
}

impl<'de> Deserialize<'de> for Voice {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Voice::from_str(&s).map_err(|never| match never {})
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Text,
    Audio,
}
