use crate::audio::TranscriptionModel;

/// Transcription settings for participant audio.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InputAudioTranscription {
    model: TranscriptionModel,

    /// ISO-639-1 language hint, e.g. "en".
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,

    /// Free text that biases the transcriber towards domain vocabulary.
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<String>,
}

impl Default for InputAudioTranscription {
    fn default() -> Self {
        Self::new()
    }
}

impl InputAudioTranscription {
    pub fn new() -> Self {
        Self {
            model: TranscriptionModel::Gpt4oTranscribe,
            language: None,
            prompt: None,
        }
    }

    pub fn with_model(mut self, model: TranscriptionModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = Some(prompt.to_string());
        self
    }

    pub fn model(&self) -> &TranscriptionModel {
        &self.model
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }
}
