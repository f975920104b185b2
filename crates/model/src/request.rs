use crate::GenerationConfig;

/// A request to be sent to the model provider.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequest {
    /// The system instructions, if any.
    pub system: Option<String>,
    /// The conversation turns, oldest first. Providers expect the last one
    /// to be a user turn.
    pub messages: Vec<ModelMessage>,
    /// Sampling controls for this request.
    pub generation: GenerationConfig,
}

impl ModelRequest {
    /// Creates a single-turn request with the default sampling controls.
    #[inline]
    pub fn single_turn<S: Into<String>>(prompt: S) -> Self {
        Self {
            system: None,
            messages: vec![ModelMessage::User(prompt.into())],
            generation: GenerationConfig::default(),
        }
    }
}

/// One turn of the conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelMessage {
    /// A user input text.
    User(String),
    /// A text previously generated by the model.
    Model(String),
}

impl ModelMessage {
    /// Returns the text of this turn.
    #[inline]
    pub fn text(&self) -> &str {
        match self {
            ModelMessage::User(text) | ModelMessage::Model(text) => text,
        }
    }
}
