//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bhaiya_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    preset: PresetResponse,
    delay: Duration,
    event_idx: usize,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        let preset_events = &this.preset.events;

        if let Some(sleep) = &mut this.sleep {
            let sleep = sleep.as_mut();
            ready!(sleep.poll(cx));
            this.sleep = None;

            if this.event_idx < preset_events.len() {
                let event = match &preset_events[this.event_idx] {
                    PresetEvent::MessageDelta(msg) => {
                        ModelResponseEvent::MessageDelta(msg.clone())
                    }
                };
                this.event_idx += 1;
                return Poll::Ready(Ok(Some(event)));
            } else if this.event_idx == preset_events.len() {
                this.event_idx += 1;
                if let Some(failure) = &this.preset.failure {
                    return Poll::Ready(Err(Error {
                        message: failure.message.clone(),
                        kind: failure.kind,
                    }));
                }
                return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                    ModelFinishReason::Stop,
                ))));
            } else {
                // In case this method is called after completion.
                return Poll::Ready(Ok(None));
            }
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

struct ScriptedStep {
    needle: Option<String>,
    response: PresetResponse,
}

#[derive(Default)]
struct Script {
    steps: VecDeque<ScriptedStep>,
    requests: Vec<ModelRequest>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to script how the model should
/// respond. Each request consumes the first step whose needle occurs in the
/// last user turn of the request (a step without a needle matches any
/// request). If no step matches, the request fails.
///
/// Clones share the same script, so a test can keep one handle to inspect
/// the recorded requests after handing the provider over.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    /// Adds a step that answers any request.
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.push_step(None, preset);
    }

    /// Adds a step that only answers requests whose last user turn contains
    /// `needle`.
    #[inline]
    pub fn add_response_for(&mut self, needle: &str, preset: PresetResponse) {
        self.push_step(Some(needle.to_owned()), preset);
    }

    /// Sets the delay before each event.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    /// Returns the number of steps not consumed yet.
    pub fn remaining_steps(&self) -> usize {
        self.lock().steps.len()
    }

    fn push_step(&mut self, needle: Option<String>, response: PresetResponse) {
        self.lock()
            .steps
            .push_back(ScriptedStep { needle, response });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|err| err.into_inner())
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let mut script = self.lock();
        script.requests.push(req.clone());

        let prompt = req.messages.last().map(|m| m.text()).unwrap_or_default();
        let step_idx = script.steps.iter().position(|step| {
            step.needle
                .as_deref()
                .is_none_or(|needle| prompt.contains(needle))
        });
        let Some(step) = step_idx.and_then(|idx| script.steps.remove(idx))
        else {
            return ready(Err(Error {
                message: "no enough steps".to_owned(),
                kind: ErrorKind::Other,
            }));
        };

        let preset = step.response;
        if preset.events.is_empty() {
            if let Some(failure) = preset.failure {
                return ready(Err(Error {
                    message: failure.message,
                    kind: failure.kind,
                }));
            }
        }

        ready(Ok(TestModelResponse {
            preset,
            delay: self.delay.unwrap_or(Duration::from_millis(1)),
            event_idx: 0,
            sleep: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bhaiya_model::ModelMessage;

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> Result<String, Error> {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        loop {
            let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await?;
            match event {
                Some(ModelResponseEvent::Completed(_)) | None => break,
                Some(ModelResponseEvent::MessageDelta(delta)) => {
                    msg.push_str(&delta);
                }
            }
        }
        Ok(msg)
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestModelProvider::default();
        provider.add_response_for(
            "title",
            PresetResponse::with_text("Greetings and Small Talk"),
        );
        provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Hello, ".to_owned()),
            PresetEvent::MessageDelta("world!".to_owned()),
        ]));

        let req = ModelRequest::single_turn("Hi");
        let resp = provider.send_request(&req).await.unwrap();
        assert_eq!(collect_response(resp).await.unwrap(), "Hello, world!");

        let mut req = req.clone();
        req.messages.push(ModelMessage::Model("Hello, world!".to_owned()));
        req.messages
            .push(ModelMessage::User("Give me a title".to_owned()));
        let resp = provider.send_request(&req).await.unwrap();
        assert_eq!(
            collect_response(resp).await.unwrap(),
            "Greetings and Small Talk"
        );

        assert_eq!(provider.requests().len(), 2);
        assert_eq!(provider.remaining_steps(), 0);
        let err = provider.send_request(&req).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[tokio::test]
    async fn test_failures() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::failing(ErrorKind::Moderated));
        provider.add_response(
            PresetResponse::with_text("Half an")
                .with_failure(ErrorKind::Other, "connection reset"),
        );

        let req = ModelRequest::single_turn("Hi");
        let err = provider.send_request(&req).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Moderated);

        let resp = provider.send_request(&req).await.unwrap();
        let err = collect_response(resp).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
