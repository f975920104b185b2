//! Example prompts for the home screen.

use bhaiya_model::GenerationProfile;

use crate::completion::CompletionClient;
use crate::prompts;

/// Number of suggestions shown at a time.
pub const SUGGESTION_COUNT: usize = 4;

/// Shown when the model can't produce suggestions.
pub const FALLBACK_SUGGESTIONS: [&str; SUGGESTION_COUNT] = [
    "Explain quantum computing",
    "Write a poem about spring",
    "Debug my JavaScript code",
    "Plan a 7-day itinerary",
];

/// Asks the model for example prompts.
#[derive(Clone)]
pub struct SuggestionGenerator {
    client: CompletionClient,
}

impl SuggestionGenerator {
    /// Creates a generator that shares `client`'s model provider.
    #[inline]
    pub fn new(client: CompletionClient) -> Self {
        Self { client }
    }

    /// Produces exactly [`SUGGESTION_COUNT`] suggestions, or none at all
    /// when no model provider is configured.
    pub async fn generate(&self) -> Vec<String> {
        if !self.client.is_initialized() {
            debug!("no model provider, no suggestions");
            return Vec::new();
        }

        let text = match self
            .client
            .single_turn(prompts::SUGGESTIONS_PROMPT, GenerationProfile::Creative)
            .await
        {
            Ok(text) => text,
            Err(err) => {
                warn!("failed to generate suggestions: {err}");
                return fallback_suggestions();
            }
        };
        pad_suggestions(parse_suggestions(&text))
    }
}

/// Extracts one suggestion per non-empty line, dropping list markers and a
/// leading bold category.
pub fn parse_suggestions(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| strip_bold_prefix(strip_list_marker(line.trim())).trim())
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Truncates or pads `suggestions` to exactly [`SUGGESTION_COUNT`] items.
/// Padding cycles through [`FALLBACK_SUGGESTIONS`].
pub fn pad_suggestions(mut suggestions: Vec<String>) -> Vec<String> {
    suggestions.truncate(SUGGESTION_COUNT);
    let missing = SUGGESTION_COUNT - suggestions.len();
    suggestions.extend(
        FALLBACK_SUGGESTIONS
            .iter()
            .cycle()
            .take(missing)
            .map(|s| (*s).to_owned()),
    );
    suggestions
}

#[inline]
fn fallback_suggestions() -> Vec<String> {
    pad_suggestions(Vec::new())
}

fn strip_bold_prefix(line: &str) -> &str {
    let Some(rest) = line.strip_prefix("**") else {
        return line;
    };
    match rest.find("**") {
        // A fully bold line keeps its text.
        Some(end) if rest[end + 2..].trim().is_empty() => rest[..end].trim(),
        Some(end) => &rest[end + 2..],
        None => line,
    }
}

fn strip_list_marker(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix("- ").or(line.strip_prefix("* ")) {
        return rest;
    }
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or(rest.strip_prefix(") "))
        {
            return rest;
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use bhaiya_model::ErrorKind;
    use bhaiya_test_model::{PresetResponse, TestModelProvider};

    use super::*;

    #[test]
    fn test_parse_and_pad() {
        let parsed = parse_suggestions("**Tech:** What's new in AI?\nHow are you?\n\n");
        assert_eq!(parsed, ["What's new in AI?", "How are you?"]);
        assert_eq!(
            pad_suggestions(parsed),
            [
                "What's new in AI?",
                "How are you?",
                "Explain quantum computing",
                "Write a poem about spring",
            ]
        );
    }

    #[test]
    fn test_parse_list_markers() {
        let text = "1. **Science:** Why is the sky blue?\n\
                    2) Teach me chess\n\
                    - Write a haiku\n\
                    * Plan a picnic\n\
                    2024 was a good year";
        assert_eq!(
            parse_suggestions(text),
            [
                "Why is the sky blue?",
                "Teach me chess",
                "Write a haiku",
                "Plan a picnic",
                "2024 was a good year",
            ]
        );
        assert_eq!(parse_suggestions("**unterminated bold"), ["**unterminated bold"]);
        assert_eq!(
            parse_suggestions(
                "**How do black holes form?**\n- **Tech:** What's new in AI?"
            ),
            ["How do black holes form?", "What's new in AI?"]
        );
    }

    #[test]
    fn test_pad_truncates() {
        let many: Vec<String> = (0..6).map(|i| format!("s{i}")).collect();
        assert_eq!(pad_suggestions(many), ["s0", "s1", "s2", "s3"]);
        assert_eq!(pad_suggestions(Vec::new()), FALLBACK_SUGGESTIONS);
    }

    #[tokio::test]
    async fn test_generate() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_text(
            "**Tech:** What's new in AI?\nHow are you?\n\n",
        ));
        let generator = SuggestionGenerator::new(
            CompletionClient::with_model_provider(provider.clone()),
        );
        assert_eq!(
            generator.generate().await,
            [
                "What's new in AI?",
                "How are you?",
                "Explain quantum computing",
                "Write a poem about spring",
            ]
        );
        let request = &provider.requests()[0];
        assert_eq!(request.generation, GenerationProfile::Creative.config());
    }

    #[tokio::test]
    async fn test_generate_fallback_is_stable() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::failing(ErrorKind::Other));
        provider.add_response(PresetResponse::failing(ErrorKind::Other));
        let generator =
            SuggestionGenerator::new(CompletionClient::with_model_provider(provider));

        let first = generator.generate().await;
        let second = generator.generate().await;
        assert_eq!(first, FALLBACK_SUGGESTIONS);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_generate_uninitialized() {
        let generator = SuggestionGenerator::new(CompletionClient::uninitialized());
        assert!(generator.generate().await.is_empty());
    }
}
