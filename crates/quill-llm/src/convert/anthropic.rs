//! Conversion between internal types and Anthropic wire format

use crate::error::LlmError;
use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicRequest,
    AnthropicResponse, AnthropicResponseBlock, AnthropicStreamContentBlock, AnthropicStreamDelta,
    AnthropicStreamEvent, AnthropicTool, AnthropicToolChoice,
};
use crate::types::{
    CompletionRequest, CompletionResponse, Content, ContentPart, FinishReason, FunctionCall, Message, Role,
    StreamDelta, StreamEvent, StreamFunctionCall, StreamToolCall, ToolCall, ToolChoice, ToolChoiceMode, Usage,
    parse_data_uri,
};

/// Default max tokens when not specified (Anthropic requires this field)
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Appended to the system prompt when JSON output is requested
const JSON_INSTRUCTION: &str = "Respond with a single valid JSON object and nothing else.";

// -- Outbound: internal request -> Anthropic wire request --

impl From<&CompletionRequest> for AnthropicRequest {
    fn from(req: &CompletionRequest) -> Self {
        let system = match (req.system_prompt(), req.wants_json()) {
            (Some(system), true) => Some(format!("{system}\n\n{JSON_INSTRUCTION}")),
            (None, true) => Some(JSON_INSTRUCTION.to_owned()),
            (system, false) => system,
        };

        let messages = req.conversation().map(internal_message_to_anthropic).collect();

        let tools = req.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.function.name.clone(),
                    description: t.function.description.clone(),
                    input_schema: t.function.schema(),
                })
                .collect()
        });

        Self {
            // Filled in by the adapter
            model: req.model.clone().unwrap_or_default(),
            max_tokens: req.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages,
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            stop_sequences: req.params.stop.clone(),
            stream: req.stream.then_some(true),
            tools,
            tool_choice: req.tool_choice.as_ref().map(internal_tool_choice_to_anthropic),
        }
    }
}

/// Convert an internal message to Anthropic wire format
fn internal_message_to_anthropic(msg: &Message) -> AnthropicMessage {
    let role = match msg.role {
        Role::Assistant => "assistant",
        Role::User | Role::System => "user",
    };

    let content = match &msg.content {
        Content::Text(text) => AnthropicContent::Text(text.clone()),
        Content::Parts(parts) => AnthropicContent::Blocks(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => AnthropicContentBlock::Text { text: text.clone() },
                    ContentPart::Image { url, .. } => AnthropicContentBlock::Image {
                        source: parse_data_uri(url).map_or_else(
                            || AnthropicImageSource::Url { url: url.clone() },
                            |image| AnthropicImageSource::Base64 {
                                media_type: image.media_type.to_owned(),
                                data: image.data.to_owned(),
                            },
                        ),
                    },
                })
                .collect(),
        ),
    };

    AnthropicMessage {
        role: role.to_owned(),
        content,
    }
}

/// Convert internal tool choice to Anthropic wire format
fn internal_tool_choice_to_anthropic(choice: &ToolChoice) -> AnthropicToolChoice {
    let (choice_type, name) = match choice {
        ToolChoice::Mode(ToolChoiceMode::None) => ("none", None),
        ToolChoice::Mode(ToolChoiceMode::Auto) => ("auto", None),
        ToolChoice::Mode(ToolChoiceMode::Required) => ("any", None),
        ToolChoice::Function(func) => ("tool", Some(func.function.name.clone())),
    };

    AnthropicToolChoice {
        choice_type: choice_type.to_owned(),
        name,
    }
}

// -- Inbound: Anthropic wire response -> internal types --

impl From<AnthropicResponse> for CompletionResponse {
    fn from(resp: AnthropicResponse) -> Self {
        let mut content = String::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                AnthropicResponseBlock::Text { text } => content.push_str(&text),
                AnthropicResponseBlock::ToolUse { id, name, input } => {
                    let arguments = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_owned());
                    tool_calls.push(ToolCall {
                        id,
                        function: FunctionCall { name, arguments },
                    });
                }
                AnthropicResponseBlock::Other => {}
            }
        }

        Self {
            content,
            model: resp.model,
            tokens_used: resp
                .usage
                .map(|u| Usage::from_counts(u.input_tokens, u.output_tokens).total_tokens),
            finish_reason: resp.stop_reason.as_deref().and_then(parse_stop_reason),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        }
    }
}

/// Map an Anthropic stop reason
pub fn parse_stop_reason(s: &str) -> Option<FinishReason> {
    match s {
        "end_turn" | "stop_sequence" => Some(FinishReason::Stop),
        "max_tokens" => Some(FinishReason::Length),
        "tool_use" => Some(FinishReason::ToolCalls),
        "refusal" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

// -- Stream conversion --

/// State tracker for converting Anthropic stream events
///
/// Content block indices are shared by text and tool-use blocks, so tool
/// calls get their own sequential index.
#[derive(Debug, Default)]
pub struct AnthropicStreamState {
    current_tool_call_index: u32,
    next_tool_call_index: u32,
    input_tokens: u32,
}

impl AnthropicStreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert an Anthropic stream event to internal stream events
    pub fn convert_event(&mut self, event: &AnthropicStreamEvent) -> Result<Vec<StreamEvent>, LlmError> {
        let events = match event {
            AnthropicStreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.input_tokens = usage.input_tokens;
                }
                Vec::new()
            }

            AnthropicStreamEvent::ContentBlockStart { content_block, .. } => match content_block {
                AnthropicStreamContentBlock::ToolUse { id, name } => {
                    self.current_tool_call_index = self.next_tool_call_index;
                    self.next_tool_call_index += 1;
                    vec![tool_delta(self.current_tool_call_index, Some(id.clone()), Some(name.clone()), None)]
                }
                AnthropicStreamContentBlock::Text { text } if !text.is_empty() => {
                    vec![StreamEvent::Delta(StreamDelta::text(text.clone()))]
                }
                _ => Vec::new(),
            },

            AnthropicStreamEvent::ContentBlockDelta { delta, .. } => match delta {
                AnthropicStreamDelta::TextDelta { text } => vec![StreamEvent::Delta(StreamDelta::text(text.clone()))],
                AnthropicStreamDelta::InputJsonDelta { partial_json } => {
                    vec![tool_delta(self.current_tool_call_index, None, None, Some(partial_json.clone()))]
                }
                AnthropicStreamDelta::Other => Vec::new(),
            },

            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                let mut events = Vec::new();

                if let Some(reason) = delta.stop_reason.as_deref().and_then(parse_stop_reason) {
                    events.push(StreamEvent::Delta(StreamDelta::finished(reason)));
                }

                if let Some(usage) = usage {
                    let input = if usage.input_tokens > 0 {
                        usage.input_tokens
                    } else {
                        self.input_tokens
                    };
                    events.push(StreamEvent::Usage(Usage::from_counts(input, usage.output_tokens)));
                }

                events
            }

            AnthropicStreamEvent::MessageStop => vec![StreamEvent::Done],

            AnthropicStreamEvent::ContentBlockStop { .. } | AnthropicStreamEvent::Ping => Vec::new(),

            AnthropicStreamEvent::Error { error } => {
                return Err(if error.error_type == "rate_limit_error" {
                    LlmError::RateLimited { retry_after: None }
                } else {
                    LlmError::Upstream(format!("{}: {}", error.error_type, error.message))
                });
            }
        };

        Ok(events)
    }
}

fn tool_delta(index: u32, id: Option<String>, name: Option<String>, arguments: Option<String>) -> StreamEvent {
    StreamEvent::Delta(StreamDelta {
        tool_call: Some(StreamToolCall {
            index,
            id,
            function: Some(StreamFunctionCall { name, arguments }),
        }),
        ..StreamDelta::default()
    })
}
