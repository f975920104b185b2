use bhaiya_model::{
    GenerationConfig as ModelGenerationConfig, ModelFinishReason, ModelMessage,
    ModelRequest,
};
use serde::{Deserialize, Serialize};

// ---------------------
// Shared content types
// ---------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<Role>, text: &str) -> Self {
        Self {
            role,
            parts: vec![Part {
                text: text.to_owned(),
            }],
        }
    }
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

/// The body of a non-2xx reply.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    pub status: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String =
            content.parts.iter().map(|p| p.text.as_str()).collect();
        (!text.is_empty()).then_some(text)
    }

    pub fn finish_reason(&self) -> Option<ModelFinishReason> {
        let reason = self.candidates.first()?.finish_reason.as_deref()?;
        Some(match reason {
            "STOP" => ModelFinishReason::Stop,
            "MAX_TOKENS" => ModelFinishReason::MaxTokens,
            "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" => {
                ModelFinishReason::Safety
            }
            "FINISH_REASON_UNSPECIFIED" => return None,
            _ => ModelFinishReason::Other,
        })
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback.as_ref()?.block_reason.as_deref()
    }
}

// -----------
// Conversions
// -----------

pub fn create_request(req: &ModelRequest) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: req.messages.iter().map(create_content).collect(),
        system_instruction: req
            .system
            .as_deref()
            .map(|system| Content::text(None, system)),
        generation_config: create_generation_config(&req.generation),
    }
}

#[inline]
fn create_content(msg: &ModelMessage) -> Content {
    match msg {
        ModelMessage::User(text) => Content::text(Some(Role::User), text),
        ModelMessage::Model(text) => Content::text(Some(Role::Model), text),
    }
}

#[inline]
fn create_generation_config(
    config: &ModelGenerationConfig,
) -> GenerationConfig {
    GenerationConfig {
        temperature: config.temperature,
        top_p: config.top_p,
        top_k: config.top_k,
        max_output_tokens: config.max_output_tokens,
    }
}

#[cfg(test)]
mod tests {
    use bhaiya_model::GenerationProfile;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            system: Some("You are Bhaiya AI.".to_owned()),
            messages: vec![
                ModelMessage::User("Hello".to_owned()),
                ModelMessage::Model("Hi there!".to_owned()),
                ModelMessage::User("What is Rust?".to_owned()),
            ],
            generation: GenerationProfile::Precise.config(),
        };
        let body = serde_json::to_value(create_request(&request)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "Hello" }] },
                    { "role": "model", "parts": [{ "text": "Hi there!" }] },
                    { "role": "user", "parts": [{ "text": "What is Rust?" }] },
                ],
                "systemInstruction": {
                    "parts": [{ "text": "You are Bhaiya AI." }]
                },
                "generationConfig": {
                    "temperature": 0.3f32,
                    "topP": 0.8f32,
                    "topK": 30,
                    "maxOutputTokens": 800,
                },
            })
        );
    }

    #[test]
    fn test_parse_chunk() {
        let chunk: GenerateContentResponse = serde_json::from_str(
            r#"{
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [{ "text": "Oh, " }, { "text": "what fun!" }]
                    },
                    "finishReason": "MAX_TOKENS",
                    "index": 0
                }],
                "usageMetadata": { "promptTokenCount": 4 }
            }"#,
        )
        .unwrap();
        assert_eq!(chunk.text().as_deref(), Some("Oh, what fun!"));
        assert_eq!(chunk.finish_reason(), Some(ModelFinishReason::MaxTokens));
        assert_eq!(chunk.block_reason(), None);

        let blocked: GenerateContentResponse = serde_json::from_str(
            r#"{ "promptFeedback": { "blockReason": "SAFETY" } }"#,
        )
        .unwrap();
        assert_eq!(blocked.text(), None);
        assert_eq!(blocked.block_reason(), Some("SAFETY"));
    }
}
