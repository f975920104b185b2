use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bhaiya_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::Sse;
use crate::proto::GenerateContentResponse;

struct PartialState {
    sse: Sse,
    // One chunk may carry both a text delta and a finish reason, the events
    // not yet handed out wait here.
    pending_events: VecDeque<ModelResponseEvent>,
    completed: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    /// A streaming reply of `streamGenerateContent`.
    pub struct GeminiResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl GeminiResponse {
    #[inline]
    pub(crate) fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            pending_events: Default::default(),
            completed: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for GeminiResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    loop {
        if let Some(event) = partial_state.pending_events.pop_front() {
            return Ok((Some(event), partial_state));
        }

        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {sse_event}");

        let chunk = serde_json::from_str::<GenerateContentResponse>(&sse_event)
            .map_err(|err| {
                Error::new(format!("{err}"), ErrorKind::MalformedResponse)
            })?;

        if let Some(reason) = chunk.block_reason() {
            return Err(Error::new(
                format!("prompt blocked: {reason}"),
                ErrorKind::Moderated,
            ));
        }
        if let Some(text) = chunk.text() {
            partial_state
                .pending_events
                .push_back(ModelResponseEvent::MessageDelta(text));
        }
        if let Some(reason) = chunk.finish_reason() {
            if !partial_state.completed {
                partial_state.completed = true;
                partial_state
                    .pending_events
                    .push_back(ModelResponseEvent::Completed(reason));
            }
        }
    }

    // Some proxies cut the stream without a finish reason, treat the end of
    // the body as a normal stop.
    if !partial_state.completed {
        partial_state.completed = true;
        return Ok((
            Some(ModelResponseEvent::Completed(ModelFinishReason::Stop)),
            partial_state,
        ));
    }

    Ok((None, partial_state))
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bhaiya_model::ModelProviderError;

    use super::*;
    use crate::io::Chunks;

    async fn collect(
        chunks: Chunks,
    ) -> Result<(String, Option<ModelFinishReason>), Error> {
        let mut resp = pin!(GeminiResponse::from_sse(Sse::new(chunks)));
        let mut text = String::new();
        let mut finish_reason = None;
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await?
        {
            match event {
                ModelResponseEvent::MessageDelta(delta) => {
                    text.push_str(&delta);
                }
                ModelResponseEvent::Completed(reason) => {
                    assert!(finish_reason.is_none());
                    finish_reason = Some(reason);
                }
            }
        }
        Ok((text, finish_reason))
    }

    #[tokio::test]
    async fn test_simple_events() {
        let chunks = Chunks::from_static(&[include_bytes!(
            "../fixtures/test_response.txt"
        )]);
        let (text, finish_reason) = collect(chunks).await.unwrap();
        assert_eq!(
            text,
            "Oh, what a great question! Rust is a systems language."
        );
        assert_eq!(finish_reason, Some(ModelFinishReason::Stop));
    }

    #[tokio::test]
    async fn test_missing_finish_reason() {
        let chunks = Chunks::from_static(&[
            b"data: {\"candidates\": [{\"content\": {\"parts\": [{\"text\": \"Hi\"}]}}]}\n\n",
        ]);
        let (text, finish_reason) = collect(chunks).await.unwrap();
        assert_eq!(text, "Hi");
        assert_eq!(finish_reason, Some(ModelFinishReason::Stop));
    }

    #[tokio::test]
    async fn test_blocked_prompt() {
        let chunks = Chunks::from_static(&[
            b"data: {\"promptFeedback\": {\"blockReason\": \"SAFETY\"}}\n\n",
        ]);
        let err = collect(chunks).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Moderated);
    }

    #[tokio::test]
    async fn test_malformed_chunk() {
        let chunks = Chunks::from_static(&[b"data: {not json}\n\n"]);
        let err = collect(chunks).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }
}
