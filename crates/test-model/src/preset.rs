use bhaiya_model::ErrorKind;
use serde::{Deserialize, Serialize};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
}

/// How a preset response should fail.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetFailure {
    /// The error kind reported to the caller.
    pub kind: ErrorKind,
    /// The error message.
    pub message: String,
}

/// The preset response for one request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the response fails after delivering `events`. With no
    /// events, the request itself fails.
    pub failure: Option<PresetFailure>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failure: None,
        }
    }

    /// Creates a `PresetResponse` that streams `text` word by word.
    pub fn with_text(text: &str) -> Self {
        let mut events = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            let end = rest
                .char_indices()
                .skip(1)
                .find(|(_, c)| *c == ' ')
                .map(|(idx, _)| idx)
                .unwrap_or(rest.len());
            events.push(PresetEvent::MessageDelta(rest[..end].to_owned()));
            rest = &rest[end..];
        }
        Self::with_events(events)
    }

    /// Creates a `PresetResponse` that fails right away.
    #[inline]
    pub fn failing(kind: ErrorKind) -> Self {
        Self::with_events(Vec::new()).with_failure(kind, "preset failure")
    }

    /// Makes the response fail after its events are delivered.
    #[inline]
    pub fn with_failure(
        mut self,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        self.failure = Some(PresetFailure {
            kind,
            message: message.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let response = PresetResponse::with_events([
            PresetEvent::MessageDelta("Hello, ".to_string()),
            PresetEvent::MessageDelta("friend!".to_string()),
        ])
        .with_failure(ErrorKind::RateLimitExceeded, "slow down");

        let serialized = serde_json::to_string(&response).unwrap();
        let deserialized: PresetResponse =
            serde_json::from_str(&serialized).unwrap();

        assert_eq!(response, deserialized);
    }

    #[test]
    fn test_with_text() {
        let response = PresetResponse::with_text("How are you?");
        assert_eq!(
            response.events,
            vec![
                PresetEvent::MessageDelta("How".to_owned()),
                PresetEvent::MessageDelta(" are".to_owned()),
                PresetEvent::MessageDelta(" you?".to_owned()),
            ]
        );
    }
}
