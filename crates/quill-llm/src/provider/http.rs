//! HTTP plumbing shared by the adapters
//!
//! Sending races the request against the call's cancellation token, error
//! responses are classified into rate limits, missing models and upstream
//! failures, and streamed events are drained into a single response.

use std::time::Duration;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::LlmError;
use crate::fallback::ModelFallbacks;
use crate::types::{CallContext, CompletionResponse, StreamAccumulator, StreamEvent};

/// Substrings marking quota rejections in error bodies
const QUOTA_MARKERS: &[&str] = &["resource_exhausted", "rate_limit", "rate limit", "quota"];

/// Substrings marking unknown-model rejections in error bodies
const NOT_FOUND_MARKERS: &[&str] = &[
    "model_not_found",
    "not_found",
    "not found",
    "does not exist",
    "no such model",
    "unknown model",
];

/// Client with the configured request timeout
pub fn build_client(timeout: Duration) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::Internal(anyhow::anyhow!("failed to build http client: {e}")))
}

/// `base` with `segments` appended as percent-encoded path segments
///
/// A model id can never add path segments, a query or a fragment.
pub fn join_segments<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, LlmError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| LlmError::Internal(anyhow::anyhow!("base url cannot carry a path: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Whether an error message says the model does not exist
pub fn is_not_found_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    NOT_FOUND_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn is_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    QUOTA_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Send a request, aborting when the call is cancelled
///
/// Non-success statuses are classified with [`classify`].
pub async fn send(
    provider: &str,
    builder: RequestBuilder,
    cancel: &CancellationToken,
    fallbacks: &ModelFallbacks,
    model: &str,
) -> Result<Response, LlmError> {
    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(LlmError::Cancelled),
        result = builder.send() => result.map_err(|e| {
            tracing::error!(provider = %provider, error = %e, "upstream request failed");
            LlmError::Upstream(e.to_string())
        })?,
    };

    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let retry_after = retry_after(&response);
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(provider = %provider, status = %status, "upstream returned error");

    Err(classify(status, retry_after, &body, fallbacks, model))
}

/// Map an error status and body onto an [`LlmError`]
pub fn classify(
    status: StatusCode,
    retry_after: Option<u64>,
    body: &str,
    fallbacks: &ModelFallbacks,
    model: &str,
) -> LlmError {
    if status == StatusCode::TOO_MANY_REQUESTS || is_quota_message(body) {
        LlmError::RateLimited { retry_after }
    } else if status == StatusCode::NOT_FOUND || is_not_found_message(body) {
        fallbacks.not_found(model)
    } else {
        LlmError::Upstream(format!("provider returned {status}: {body}"))
    }
}

fn retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Decode a JSON body, aborting when the call is cancelled
pub async fn read_json<T: DeserializeOwned>(response: Response, cancel: &CancellationToken) -> Result<T, LlmError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(LlmError::Cancelled),
        result = response.json::<T>() => {
            result.map_err(|e| LlmError::Upstream(format!("failed to parse response: {e}")))
        }
    }
}

/// Decode a server-sent event body with a per-vendor decoder
///
/// The decoder sees each event's trimmed data field. Transport errors end
/// the stream with [`LlmError::Upstream`].
pub fn sse_events<F>(response: Response, mut decode: F) -> impl Stream<Item = Result<StreamEvent, LlmError>> + Send
where
    F: FnMut(&str) -> Result<Vec<StreamEvent>, LlmError> + Send,
{
    response
        .bytes_stream()
        .eventsource()
        .map(move |result| match result {
            Ok(event) => match decode(event.data.trim()) {
                Ok(events) => events.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            },
            Err(e) => vec![Err(LlmError::Upstream(format!("stream error: {e}")))],
        })
        .flat_map(futures_util::stream::iter)
}

/// Consume a stream of events into one response
///
/// Text fragments are forwarded to the context's progress channel as they
/// arrive. The response resolves only at the backend's end marker; a
/// connection that closes first is an [`LlmError::Upstream`] failure.
/// Cancellation drops the stream and returns [`LlmError::Cancelled`].
///
/// Once a fragment has been reported, a failure is never one the caller
/// retries or falls back from, since a second attempt would repeat text
/// already on the progress channel.
pub async fn drain<S>(stream: S, context: &CallContext, model: &str) -> Result<CompletionResponse, LlmError>
where
    S: Stream<Item = Result<StreamEvent, LlmError>> + Send,
{
    let mut stream = std::pin::pin!(stream);
    let mut accumulator = StreamAccumulator::new();
    let mut reported = false;
    let cancel = context.cancellation();

    while !accumulator.is_done() {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(LlmError::Cancelled),
            next = stream.next() => next,
        };

        let Some(event) = next else {
            tracing::warn!(model = %model, "stream closed before end marker");
            return Err(LlmError::Upstream("stream ended before completion".to_owned()));
        };

        let event = match event {
            Ok(event) => event,
            Err(e) if reported => return Err(interrupted(e)),
            Err(e) => return Err(e),
        };

        if let Some(fragment) = accumulator.apply(event) {
            context.report(&fragment);
            reported = true;
        }
    }

    Ok(accumulator.finish(model.to_owned()))
}

/// Make a mid-stream failure final
fn interrupted(error: LlmError) -> LlmError {
    match error {
        LlmError::RateLimited { .. } | LlmError::ModelNotFound { .. } => {
            LlmError::Upstream(format!("stream interrupted after partial output: {error}"))
        }
        other => other,
    }
}
