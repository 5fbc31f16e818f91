//! Conversion between internal types and the Ollama generate wire format
//!
//! Ollama's generate endpoint takes a single prompt, so the conversation is
//! flattened into role-prefixed turns. Tool definitions have no equivalent
//! and are dropped with a warning.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::LlmError;
use crate::protocol::ollama::{OllamaGenerateRequest, OllamaGenerateResponse, OllamaOptions};
use crate::types::{
    CompletionRequest, CompletionResponse, FinishReason, Message, Role, StreamDelta, StreamEvent, Usage,
    parse_data_uri,
};

// -- Outbound: internal request -> Ollama wire request --

impl From<&CompletionRequest> for OllamaGenerateRequest {
    fn from(req: &CompletionRequest) -> Self {
        if req.tools.is_some() {
            tracing::warn!(provider = "ollama", "tool definitions are not supported, dropping");
        }

        let turns: Vec<&Message> = req.conversation().collect();
        let mut images = Vec::new();
        for msg in &turns {
            for url in msg.content.images() {
                match parse_data_uri(url) {
                    Some(image) if STANDARD.decode(image.data).is_ok() => images.push(image.data.to_owned()),
                    Some(image) => {
                        tracing::warn!(provider = "ollama", media_type = %image.media_type, "invalid base64 image payload, skipping");
                    }
                    None => tracing::warn!(provider = "ollama", url = %url, "remote image urls are not supported, skipping"),
                }
            }
        }

        let options = OllamaOptions {
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            num_predict: req.params.max_tokens,
            stop: req.params.stop.clone(),
        };

        Self {
            // Filled in by the adapter
            model: req.model.clone().unwrap_or_default(),
            prompt: flatten_prompt(&turns),
            system: req.system_prompt(),
            images: (!images.is_empty()).then_some(images),
            stream: req.stream,
            format: req.wants_json().then(|| "json".to_owned()),
            options: (options != OllamaOptions::default()).then_some(options),
        }
    }
}

/// Join conversation turns into a single prompt
///
/// A lone user message is sent verbatim.
fn flatten_prompt(turns: &[&Message]) -> String {
    if let [only] = turns
        && only.role == Role::User
    {
        return only.content.as_text();
    }

    let mut prompt = turns
        .iter()
        .map(|msg| {
            let speaker = match msg.role {
                Role::Assistant => "Assistant",
                Role::User | Role::System => "User",
            };
            format!("{speaker}: {}", msg.content.as_text())
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    if !turns.is_empty() {
        prompt.push_str("\n\nAssistant:");
    }
    prompt
}

// -- Inbound: Ollama wire response -> internal types --

impl From<OllamaGenerateResponse> for CompletionResponse {
    fn from(resp: OllamaGenerateResponse) -> Self {
        let finish_reason = finish_reason(&resp);
        Self {
            tokens_used: usage(&resp).map(|u| u.total_tokens),
            content: resp.response,
            model: resp.model,
            finish_reason,
            tool_calls: None,
        }
    }
}

/// Token counts from the evaluation counters, when the runtime reported any
fn usage(resp: &OllamaGenerateResponse) -> Option<Usage> {
    if resp.prompt_eval_count.is_none() && resp.eval_count.is_none() {
        return None;
    }
    Some(Usage::from_counts(
        resp.prompt_eval_count.unwrap_or(0),
        resp.eval_count.unwrap_or(0),
    ))
}

fn finish_reason(resp: &OllamaGenerateResponse) -> Option<FinishReason> {
    match resp.done_reason.as_deref() {
        Some("length") => Some(FinishReason::Length),
        Some(_) => Some(FinishReason::Stop),
        None => resp.done.then_some(FinishReason::Stop),
    }
}

// -- Stream conversion --

/// Convert one NDJSON line to internal stream events
pub fn ollama_chunk_to_events(chunk: &OllamaGenerateResponse) -> Result<Vec<StreamEvent>, LlmError> {
    if let Some(error) = &chunk.error {
        return Err(LlmError::Upstream(error.clone()));
    }

    let mut events = Vec::new();

    if !chunk.response.is_empty() {
        events.push(StreamEvent::Delta(StreamDelta::text(chunk.response.clone())));
    }

    if chunk.done {
        if let Some(reason) = finish_reason(chunk) {
            events.push(StreamEvent::Delta(StreamDelta::finished(reason)));
        }
        if let Some(usage) = usage(chunk) {
            events.push(StreamEvent::Usage(usage));
        }
        events.push(StreamEvent::Done);
    }

    Ok(events)
}
