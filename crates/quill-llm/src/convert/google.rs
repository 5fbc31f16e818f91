//! Conversion between internal types and the Google `generateContent` wire format

use crate::protocol::google::{
    GoogleCandidate, GoogleContent, GoogleFunctionCallingConfig, GoogleFunctionDeclaration, GoogleGenerationConfig,
    GooglePart, GoogleRequest, GoogleResponse, GoogleTool, GoogleToolConfig, GoogleUsageMetadata,
};
use crate::types::{
    CompletionRequest, CompletionResponse, Content, ContentPart, FinishReason, FunctionCall, Message, Role,
    StreamDelta, StreamEvent, StreamFunctionCall, StreamToolCall, ToolCall, ToolChoice, ToolChoiceMode, Usage,
    parse_data_uri,
};

const JSON_MIME_TYPE: &str = "application/json";

// -- Outbound: internal request -> Google wire request --

impl From<&CompletionRequest> for GoogleRequest {
    fn from(req: &CompletionRequest) -> Self {
        let system_instruction = req.system_prompt().map(|text| GoogleContent {
            role: None,
            parts: vec![GooglePart::text(text)],
        });

        let contents = req.conversation().map(internal_message_to_google).collect();

        let generation_config = GoogleGenerationConfig {
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            max_output_tokens: req.params.max_tokens,
            stop_sequences: req.params.stop.clone(),
            response_mime_type: req.wants_json().then(|| JSON_MIME_TYPE.to_owned()),
        };

        let tools = req.tools.as_ref().map(|tools| {
            vec![GoogleTool {
                function_declarations: tools
                    .iter()
                    .map(|t| GoogleFunctionDeclaration {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: t.function.parameters.clone(),
                    })
                    .collect(),
            }]
        });

        let tool_config = req.tool_choice.as_ref().map(|tc| {
            let (mode, allowed_names) = match tc {
                ToolChoice::Mode(ToolChoiceMode::None) => ("NONE", None),
                ToolChoice::Mode(ToolChoiceMode::Auto) => ("AUTO", None),
                ToolChoice::Mode(ToolChoiceMode::Required) => ("ANY", None),
                ToolChoice::Function(func) => ("ANY", Some(vec![func.function.name.clone()])),
            };
            GoogleToolConfig {
                function_calling_config: GoogleFunctionCallingConfig {
                    mode: mode.to_owned(),
                    allowed_function_names: allowed_names,
                },
            }
        });

        Self {
            contents,
            system_instruction,
            generation_config: Some(generation_config),
            tools,
            tool_config,
        }
    }
}

/// Convert an internal message to a Google content object
fn internal_message_to_google(msg: &Message) -> GoogleContent {
    let role = match msg.role {
        Role::Assistant => "model",
        Role::User | Role::System => "user",
    };

    let mut parts = Vec::new();

    match &msg.content {
        Content::Text(text) => parts.push(GooglePart::text(text.clone())),
        Content::Parts(content_parts) => {
            for part in content_parts {
                match part {
                    ContentPart::Text { text } => parts.push(GooglePart::text(text.clone())),
                    ContentPart::Image { url, .. } => {
                        if let Some(image) = parse_data_uri(url) {
                            parts.push(GooglePart::inline_data(image.media_type, image.data));
                        } else {
                            tracing::warn!(url = %url, "remote image urls are not supported by google, skipping");
                        }
                    }
                }
            }
        }
    }

    // Google rejects contents without parts
    if parts.is_empty() {
        parts.push(GooglePart::text(String::new()));
    }

    GoogleContent {
        role: Some(role.to_owned()),
        parts,
    }
}

// -- Inbound: Google wire response -> internal types --

impl From<GoogleResponse> for CompletionResponse {
    fn from(resp: GoogleResponse) -> Self {
        let candidate = resp.candidates.into_iter().next().unwrap_or_default();

        let mut content = String::new();
        let mut tool_calls = Vec::new();

        for part in candidate.content.parts.into_iter().filter(|p| !p.is_thought()) {
            if let Some(text) = part.text {
                content.push_str(&text);
            }
            if let Some(fc) = part.function_call {
                let arguments = serde_json::to_string(&fc.args).unwrap_or_else(|_| "{}".to_owned());
                tool_calls.push(ToolCall {
                    id: format!("call_{}", tool_calls.len()),
                    function: FunctionCall {
                        name: fc.name,
                        arguments,
                    },
                });
            }
        }

        let finish_reason = if tool_calls.is_empty() {
            candidate.finish_reason.as_deref().and_then(parse_finish_reason)
        } else {
            Some(FinishReason::ToolCalls)
        };

        Self {
            content,
            model: resp.model_version.unwrap_or_default(),
            tokens_used: resp.usage_metadata.map(|u| usage_from_metadata(u).total_tokens),
            finish_reason,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        }
    }
}

/// Map a Google finish reason
pub fn parse_finish_reason(s: &str) -> Option<FinishReason> {
    match s {
        "STOP" => Some(FinishReason::Stop),
        "MAX_TOKENS" => Some(FinishReason::Length),
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

fn usage_from_metadata(meta: GoogleUsageMetadata) -> Usage {
    // Older API versions omit the total
    if meta.total_token_count > 0 {
        Usage {
            prompt_tokens: meta.prompt_token_count,
            completion_tokens: meta.candidates_token_count,
            total_tokens: meta.total_token_count,
        }
    } else {
        Usage::from_counts(meta.prompt_token_count, meta.candidates_token_count)
    }
}

// -- Stream conversion --

/// State tracker for converting Google stream chunks
///
/// Google delivers each function call whole, so calls are numbered in
/// arrival order across chunks.
#[derive(Debug, Default)]
pub struct GoogleStreamState {
    next_tool_call_index: u32,
}

impl GoogleStreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a Google streaming chunk to internal stream events
    ///
    /// Google has no end-of-stream marker; the chunk carrying a finish
    /// reason ends the stream once its usage has been recorded.
    pub fn convert_chunk(&mut self, chunk: &GoogleResponse) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let mut finished = false;

        if let Some(candidate) = chunk.candidates.first() {
            self.convert_candidate(candidate, &mut events);
            finished = candidate.finish_reason.is_some();
        }

        if let Some(usage) = chunk.usage_metadata {
            events.push(StreamEvent::Usage(usage_from_metadata(usage)));
        }

        if finished {
            events.push(StreamEvent::Done);
        }

        events
    }

    fn convert_candidate(&mut self, candidate: &GoogleCandidate, events: &mut Vec<StreamEvent>) {
        for part in candidate.content.parts.iter().filter(|p| !p.is_thought()) {
            if let Some(text) = &part.text {
                events.push(StreamEvent::Delta(StreamDelta::text(text.clone())));
            }
            if let Some(fc) = &part.function_call {
                let index = self.next_tool_call_index;
                self.next_tool_call_index += 1;
                let arguments = serde_json::to_string(&fc.args).unwrap_or_else(|_| "{}".to_owned());
                events.push(StreamEvent::Delta(StreamDelta {
                    tool_call: Some(StreamToolCall {
                        index,
                        id: Some(format!("call_{index}")),
                        function: Some(StreamFunctionCall {
                            name: Some(fc.name.clone()),
                            arguments: Some(arguments),
                        }),
                    }),
                    ..StreamDelta::default()
                }));
            }
        }

        if let Some(reason) = candidate.finish_reason.as_deref().and_then(parse_finish_reason) {
            events.push(StreamEvent::Delta(StreamDelta::finished(reason)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResponseFormat, StreamAccumulator};

    #[test]
    fn request_uses_system_instruction_and_model_role() {
        let mut req = CompletionRequest::new(vec![
            Message::system("be terse"),
            Message::user("hi"),
            Message::assistant("hello"),
        ]);
        req.response_format = Some(ResponseFormat::JsonObject);

        let json = serde_json::to_value(GoogleRequest::from(&req)).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(json["contents"].as_array().unwrap().len(), 2);
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn data_uri_images_become_inline_data() {
        let msg = Message {
            role: Role::User,
            content: Content::Parts(vec![
                ContentPart::Image {
                    url: "data:image/jpeg;base64,/9j/".to_owned(),
                    detail: None,
                },
                ContentPart::Image {
                    url: "https://example.com/a.png".to_owned(),
                    detail: None,
                },
            ]),
        };

        let json = serde_json::to_value(internal_message_to_google(&msg)).unwrap();
        let parts = json["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
    }

    #[test]
    fn response_skips_thoughts_and_maps_function_calls() {
        let wire: GoogleResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "pondering", "thought": true},
                    {"text": "Result"},
                    {"functionCall": {"name": "lookup", "args": {"q": 1}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2, "totalTokenCount": 6},
            "modelVersion": "gemini-1.5-pro-002"
        }))
        .unwrap();

        let resp = CompletionResponse::from(wire);
        assert_eq!(resp.content, "Result");
        assert_eq!(resp.tokens_used, Some(6));
        assert_eq!(resp.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(resp.tool_calls.unwrap()[0].function.arguments, "{\"q\":1}");
    }

    #[test]
    fn stream_chunks_number_tool_calls_in_order() {
        let chunks = [
            serde_json::json!({"candidates": [{"content": {"parts": [{"text": "A"}]}}]}),
            serde_json::json!({"candidates": [{"content": {"parts": [{"functionCall": {"name": "f", "args": {}}}]}}]}),
            serde_json::json!({
                "candidates": [{"content": {"parts": [{"functionCall": {"name": "g", "args": {"x": true}}}]}, "finishReason": "STOP"}],
                "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 4}
            }),
        ];

        let mut state = GoogleStreamState::new();
        let mut acc = StreamAccumulator::new();
        for chunk in chunks {
            let chunk: GoogleResponse = serde_json::from_value(chunk).unwrap();
            for event in state.convert_chunk(&chunk) {
                acc.apply(event);
            }
        }

        assert!(acc.is_done());
        let resp = acc.finish("gemini".to_owned());
        assert_eq!(resp.content, "A");
        assert_eq!(resp.tokens_used, Some(7));
        let calls = resp.tool_calls.unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].function.name, "g");
        assert_eq!(calls[1].id, "call_1");
    }

    #[test]
    fn stream_only_ends_at_finish_reason() {
        let mut state = GoogleStreamState::new();
        let partial: GoogleResponse =
            serde_json::from_value(serde_json::json!({"candidates": [{"content": {"parts": [{"text": "A"}]}}]}))
                .unwrap();
        assert!(!state.convert_chunk(&partial).iter().any(|e| matches!(e, StreamEvent::Done)));

        let last: GoogleResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": ""}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 1, "candidatesTokenCount": 1}
        }))
        .unwrap();
        let events = state.convert_chunk(&last);
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
        assert!(matches!(events[events.len() - 2], StreamEvent::Usage(_)));
    }
}
