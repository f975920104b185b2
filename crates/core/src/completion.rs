//! The completion client: persona, sampling profile and the request
//! plumbing around one chat exchange.

use bhaiya_model::{
    ErrorKind, GenerationProfile, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest,
};

use crate::conversation::Message;
use crate::model_client::ModelClient;
use crate::prompts;

const FALLBACK_TITLE_CHARS: usize = 30;

/// The error type of [`CompletionClient::complete`].
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// No model provider is configured.
    #[error("no model provider is configured")]
    Unconfigured,
    /// The provider failed.
    #[error("model provider failed: {0}")]
    Provider(Box<dyn ModelProviderError>),
    /// The provider answered without any text.
    #[error("model returned an empty response")]
    EmptyResponse,
}

impl CompletionError {
    /// Returns the provider error kind, if the provider failed.
    pub fn provider_kind(&self) -> Option<ErrorKind> {
        match self {
            CompletionError::Provider(err) => Some(err.kind()),
            _ => None,
        }
    }
}

/// Exchanges user turns for model turns.
///
/// A client without a model provider is still usable: every request just
/// fails with [`CompletionError::Unconfigured`].
#[derive(Clone)]
pub struct CompletionClient {
    model_client: Option<ModelClient>,
    persona: String,
    profile: GenerationProfile,
}

impl CompletionClient {
    /// Creates a client with no model provider.
    #[inline]
    pub fn uninitialized() -> Self {
        Self {
            model_client: None,
            persona: prompts::PERSONA.to_owned(),
            profile: GenerationProfile::Default,
        }
    }

    /// Creates a client backed by `provider`.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(provider: P) -> Self {
        Self {
            model_client: Some(ModelClient::new(provider)),
            ..Self::uninitialized()
        }
    }

    /// Replaces the persona prompt.
    #[inline]
    pub fn with_persona<S: Into<String>>(mut self, persona: S) -> Self {
        self.persona = persona.into();
        self
    }

    /// Sets the sampling profile for chat completions.
    #[inline]
    pub fn with_profile(mut self, profile: GenerationProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Returns `true` if a model provider is configured.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.model_client.is_some()
    }

    /// Generates the reply to `prompt`, given the finalized messages before
    /// it. Text deltas are handed to `on_delta` while streaming.
    pub async fn complete(
        &self,
        history: &[Message],
        prompt: &str,
        on_delta: impl Fn(&str) + Send + 'static,
    ) -> Result<String, CompletionError> {
        let mut messages: Vec<ModelMessage> =
            history.iter().filter_map(Message::to_model_message).collect();
        messages.push(ModelMessage::User(prompt.to_owned()));
        let request = ModelRequest {
            system: Some(self.persona.clone()),
            messages,
            generation: self.profile.config(),
        };
        self.send(request, on_delta).await
    }

    /// Generates a short title for a conversation that starts with
    /// `first_message`. Never fails: any problem yields
    /// [`fallback_title`].
    pub async fn generate_title(&self, first_message: &str) -> String {
        let mut request =
            ModelRequest::single_turn(prompts::title_prompt(first_message));
        request.generation = GenerationProfile::Precise.config();

        match self.send(request, |_| {}).await {
            Ok(text) => match clean_title(&text) {
                Some(title) => title,
                None => fallback_title(first_message),
            },
            Err(err) => {
                debug!("title generation failed: {err}");
                fallback_title(first_message)
            }
        }
    }

    /// Sends a single-turn request with the given profile.
    pub(crate) async fn single_turn(
        &self,
        prompt: &str,
        profile: GenerationProfile,
    ) -> Result<String, CompletionError> {
        let mut request = ModelRequest::single_turn(prompt);
        request.generation = profile.config();
        self.send(request, |_| {}).await
    }

    async fn send(
        &self,
        request: ModelRequest,
        on_delta: impl Fn(&str) + Send + 'static,
    ) -> Result<String, CompletionError> {
        let Some(model_client) = &self.model_client else {
            return Err(CompletionError::Unconfigured);
        };
        let resp = model_client
            .send_request(request, on_delta)
            .await
            .map_err(CompletionError::Provider)?;
        if resp.text.trim().is_empty() {
            return Err(CompletionError::EmptyResponse);
        }
        Ok(resp.text)
    }
}

/// The title used when the model cannot come up with one: the first
/// characters of the message.
pub fn fallback_title(message: &str) -> String {
    let message = message.trim();
    let mut chars = message.char_indices();
    match chars.nth(FALLBACK_TITLE_CHARS) {
        Some((idx, _)) => format!("{}...", message[..idx].trim_end()),
        None => message.to_owned(),
    }
}

fn clean_title(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.strip_prefix("Title:").unwrap_or(line);
    let title = line
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '*' | '#'))
        .trim()
        .trim_end_matches('.');
    (!title.is_empty()).then(|| title.to_owned())
}
