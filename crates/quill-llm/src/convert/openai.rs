//! Conversion between internal types and the `OpenAI` chat completion wire format

use crate::protocol::openai::{
    OpenAiContent, OpenAiContentPart, OpenAiFunction, OpenAiImageUrl, OpenAiMessage, OpenAiRequest,
    OpenAiResponse, OpenAiResponseFormat, OpenAiStreamChoice, OpenAiStreamChunk, OpenAiTool,
};
use crate::types::{
    CompletionRequest, CompletionResponse, Content, ContentPart, FinishReason, FunctionCall, Message, Role,
    StreamDelta, StreamEvent, StreamFunctionCall, StreamToolCall, ToolCall, ToolChoice, Usage,
};

// -- Outbound: internal request -> OpenAI wire request --

impl From<&CompletionRequest> for OpenAiRequest {
    fn from(req: &CompletionRequest) -> Self {
        let tools = req.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| OpenAiTool {
                    tool_type: "function".to_owned(),
                    function: OpenAiFunction {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: t.function.parameters.clone(),
                    },
                })
                .collect()
        });

        let response_format = req.wants_json().then(|| OpenAiResponseFormat {
            format_type: "json_object".to_owned(),
        });

        Self {
            // Filled in by the adapter
            model: req.model.clone().unwrap_or_default(),
            messages: req.messages.iter().map(Into::into).collect(),
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            max_tokens: req.params.max_tokens,
            stop: req.params.stop.clone(),
            stream: req.stream.then_some(true),
            stream_options: None,
            tools,
            tool_choice: req.tool_choice.as_ref().map(tool_choice_to_openai_value),
            response_format,
        }
    }
}

impl From<&Message> for OpenAiMessage {
    fn from(msg: &Message) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };

        let content = match &msg.content {
            Content::Text(text) => OpenAiContent::Text(text.clone()),
            Content::Parts(parts) => OpenAiContent::Parts(parts.iter().map(Into::into).collect()),
        };

        Self {
            role: role.to_owned(),
            content,
        }
    }
}

impl From<&ContentPart> for OpenAiContentPart {
    fn from(part: &ContentPart) -> Self {
        match part {
            ContentPart::Text { text } => Self::Text { text: text.clone() },
            ContentPart::Image { url, detail } => Self::ImageUrl {
                image_url: OpenAiImageUrl {
                    url: url.clone(),
                    detail: detail.clone(),
                },
            },
        }
    }
}

/// Tool choice as `OpenAI` expects it: a bare mode string or a function object
fn tool_choice_to_openai_value(choice: &ToolChoice) -> serde_json::Value {
    serde_json::to_value(choice).unwrap_or(serde_json::Value::Null)
}

// -- Inbound: OpenAI wire response -> internal types --

impl From<OpenAiResponse> for CompletionResponse {
    fn from(resp: OpenAiResponse) -> Self {
        let choice = resp.choices.into_iter().next();

        let (content, tool_calls, finish_reason) = match choice {
            Some(choice) => {
                let tool_calls = choice.message.tool_calls.map(|calls| {
                    calls
                        .into_iter()
                        .map(|tc| ToolCall {
                            id: tc.id,
                            function: FunctionCall {
                                name: tc.function.name,
                                arguments: tc.function.arguments,
                            },
                        })
                        .collect::<Vec<_>>()
                });
                let finish_reason = choice.finish_reason.as_deref().and_then(parse_finish_reason);
                (
                    choice.message.content.unwrap_or_default(),
                    tool_calls.filter(|calls| !calls.is_empty()),
                    finish_reason,
                )
            }
            None => (String::new(), None, None),
        };

        Self {
            content,
            model: resp.model,
            tokens_used: resp.usage.map(|u| u.total_tokens),
            finish_reason,
            tool_calls,
        }
    }
}

// -- Stream conversion --

/// Convert an `OpenAI` streaming chunk to internal stream events
pub fn openai_chunk_to_events(chunk: &OpenAiStreamChunk) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    // Only the first choice is surfaced; requests never ask for n > 1
    for choice in chunk.choices.iter().filter(|c| c.index == 0) {
        events.extend(openai_stream_choice_to_deltas(choice).into_iter().map(StreamEvent::Delta));
    }

    if let Some(usage) = &chunk.usage {
        events.push(StreamEvent::Usage(Usage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }));
    }

    events
}

/// One delta per tool call fragment, plus text and finish reason on the first
fn openai_stream_choice_to_deltas(choice: &OpenAiStreamChoice) -> Vec<StreamDelta> {
    let mut deltas = vec![StreamDelta {
        content: choice.delta.content.clone(),
        tool_call: None,
        finish_reason: choice.finish_reason.as_deref().and_then(parse_finish_reason),
    }];

    for tc in choice.delta.tool_calls.iter().flatten() {
        deltas.push(StreamDelta {
            tool_call: Some(StreamToolCall {
                index: tc.index,
                id: tc.id.clone(),
                function: tc.function.as_ref().map(|f| StreamFunctionCall {
                    name: f.name.clone(),
                    arguments: f.arguments.clone(),
                }),
            }),
            ..StreamDelta::default()
        });
    }

    deltas
}

/// Map an `OpenAI` finish reason string
pub fn parse_finish_reason(s: &str) -> Option<FinishReason> {
    match s {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "tool_calls" | "function_call" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}
