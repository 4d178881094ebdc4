use crate::audio::{Base64EncodedAudioBytes, is_audio_mime_type, pcm_mime_type};

/// Inline binary payload: base64 data tagged with its mime type.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    mime_type: String,
    data: Base64EncodedAudioBytes,
}

impl Blob {
    pub fn new(mime_type: &str, data: String) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data,
        }
    }

    /// A raw PCM16 block at the given sample rate.
    pub fn pcm(data: Base64EncodedAudioBytes, sample_rate: u32) -> Self {
        Self {
            mime_type: pcm_mime_type(sample_rate),
            data,
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn into_data(self) -> String {
        self.data
    }

    pub fn is_audio(&self) -> bool {
        is_audio_mime_type(&self.mime_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }

    pub fn inline(blob: Blob) -> Self {
        Self {
            text: None,
            inline_data: Some(blob),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn inline_data(&self) -> Option<&Blob> {
        self.inline_data.as_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    pub fn new(parts: Vec<Part>) -> Self {
        Self { role: None, parts }
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Inline audio payloads in part order.
    pub fn audio_blobs(&self) -> impl Iterator<Item = &Blob> {
        self.parts
            .iter()
            .filter_map(Part::inline_data)
            .filter(|blob| blob.is_audio())
    }
}
