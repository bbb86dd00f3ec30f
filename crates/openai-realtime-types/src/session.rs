use crate::audio::{
    AudioConfig, AudioFormat, AudioInput, AudioOutput, InputAudioTranscription, Voice,
};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Session {
    /// Session kind. Always "realtime" for speech-to-speech sessions.
    #[serde(rename = "type")]
    kind: String,

    /// Model that serves the session, e.g. "gpt-realtime".
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,

    /// The default system instructions prepended to model calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    audio: Option<AudioConfig>,
}

impl Session {
    pub fn new() -> SessionConfigurator {
        SessionConfigurator::new()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub fn audio(&self) -> Option<&AudioConfig> {
        self.audio.as_ref()
    }
}

pub struct SessionConfigurator {
    session: Session,
}

impl Default for SessionConfigurator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfigurator {
    pub fn new() -> Self {
        Self {
            session: Session {
                kind: "realtime".to_string(),
                model: None,
                instructions: None,
                audio: None,
            },
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.session.model = Some(model.to_string());
        self
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.session.instructions = Some(instructions.to_string());
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.output().voice = Some(voice);
        self
    }

    pub fn with_output_audio_format(mut self, format: AudioFormat) -> Self {
        self.output().format = Some(format);
        self
    }

    pub fn with_input_audio_format(mut self, format: AudioFormat) -> Self {
        self.input().format = Some(format);
        self
    }

    pub fn with_input_audio_transcription(
        mut self,
        transcription: InputAudioTranscription,
    ) -> Self {
        self.input().transcription = Some(transcription);
        self
    }

    pub fn build(self) -> Session {
        self.session
    }

    fn input(&mut self) -> &mut AudioInput {
        self.session
            .audio
            .get_or_insert_with(AudioConfig::default)
            .input
            .get_or_insert_with(AudioInput::default)
    }

    fn output(&mut self) -> &mut AudioOutput {
        self.session
            .audio
            .get_or_insert_with(AudioConfig::default)
            .output
            .get_or_insert_with(AudioOutput::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::TranscriptionModel;
    use serde_json::json;

    #[test]
    fn test_session_serializes_nested_audio_config() {
        let session = Session::new()
            .with_model("gpt-realtime")
            .with_instructions("You are Lune.")
            .with_voice(Voice::Shimmer)
            .with_input_audio_transcription(
                InputAudioTranscription::new()
                    .with_model(TranscriptionModel::Gpt4oTranscribe)
                    .with_language("en"),
            )
            .build();

        let json = serde_json::to_value(&session).unwrap();

        assert_eq!(
            json,
            json!({
                "type": "realtime",
                "model": "gpt-realtime",
                "instructions": "You are Lune.",
                "audio": {
                    "input": {
                        "transcription": { "model": "gpt-4o-transcribe", "language": "en" }
                    },
                    "output": { "voice": "shimmer" }
                }
            })
        );
    }
}
