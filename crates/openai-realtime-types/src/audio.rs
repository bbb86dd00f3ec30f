mod consts;
mod transcription;

pub use consts::*;
pub use transcription::InputAudioTranscription;

/// Audio data encoded as base64
pub type Base64EncodedAudioBytes = String;

/// Audio settings for the input (microphone) side of a session.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AudioInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<AudioFormat>,

    /// Transcription of participant audio. `None` disables it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<InputAudioTranscription>,
}

/// Audio settings for the model's spoken output.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AudioOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<AudioFormat>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<Voice>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AudioConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<AudioInput>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<AudioOutput>,
}
