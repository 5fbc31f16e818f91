use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::message::{FunctionCall, ToolCall};
use super::response::{CompletionResponse, FinishReason};

/// Event decoded from a vendor stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Incremental content delta
    Delta(StreamDelta),
    /// Token usage statistics
    Usage(Usage),
    /// Backend signalled end of stream
    Done,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    pub completion_tokens: u32,
    /// Total tokens (prompt + completion)
    pub total_tokens: u32,
}

impl Usage {
    /// Usage from separate prompt and completion counts
    pub const fn from_counts(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Incremental update within a streaming response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamDelta {
    /// Incremental text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Incremental tool call data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<StreamToolCall>,
    /// Reason generation finished (present on final delta)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl StreamDelta {
    /// Text-only delta
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Delta carrying only a finish reason
    pub fn finished(reason: FinishReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Self::default()
        }
    }
}

/// Partial tool call data within a stream delta
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamToolCall {
    /// Sequential index of this tool call within the response
    pub index: u32,
    /// Tool call ID (present on first chunk only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Partial function call data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<StreamFunctionCall>,
}

/// Partial function call data within a streaming tool call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamFunctionCall {
    /// Function name (present on first chunk only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Incremental arguments JSON fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Folds stream events into a single [`CompletionResponse`]
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    tool_calls: BTreeMap<u32, PartialToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    done: bool,
}

impl StreamAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event, returning the text fragment it carried, if any
    pub fn apply(&mut self, event: StreamEvent) -> Option<String> {
        match event {
            StreamEvent::Delta(delta) => {
                if let Some(tc) = delta.tool_call {
                    let entry = self.tool_calls.entry(tc.index).or_default();
                    if tc.id.is_some() {
                        entry.id = tc.id;
                    }
                    if let Some(function) = tc.function {
                        if let Some(name) = function.name {
                            entry.name = name;
                        }
                        if let Some(arguments) = function.arguments {
                            entry.arguments.push_str(&arguments);
                        }
                    }
                }

                if delta.finish_reason.is_some() {
                    self.finish_reason = delta.finish_reason;
                }

                let fragment = delta.content.filter(|c| !c.is_empty())?;
                self.content.push_str(&fragment);
                Some(fragment)
            }
            StreamEvent::Usage(usage) => {
                self.usage = Some(usage);
                None
            }
            StreamEvent::Done => {
                self.done = true;
                None
            }
        }
    }

    /// Whether the backend signalled end of stream
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Build the final response
    pub fn finish(self, model: String) -> CompletionResponse {
        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .into_iter()
            .map(|(index, partial)| ToolCall {
                id: partial.id.unwrap_or_else(|| format!("call_{index}")),
                function: FunctionCall {
                    name: partial.name,
                    arguments: if partial.arguments.is_empty() {
                        "{}".to_owned()
                    } else {
                        partial.arguments
                    },
                },
            })
            .collect();

        let finish_reason = match self.finish_reason {
            None if !tool_calls.is_empty() => Some(FinishReason::ToolCalls),
            other => other,
        };

        CompletionResponse {
            content: self.content,
            model,
            tokens_used: self.usage.map(|u| u.total_tokens),
            finish_reason,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_fragment(index: u32, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> StreamEvent {
        StreamEvent::Delta(StreamDelta {
            tool_call: Some(StreamToolCall {
                index,
                id: id.map(str::to_owned),
                function: Some(StreamFunctionCall {
                    name: name.map(str::to_owned),
                    arguments: args.map(str::to_owned),
                }),
            }),
            ..StreamDelta::default()
        })
    }

    #[test]
    fn text_fragments_are_concatenated() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.apply(StreamEvent::Delta(StreamDelta::text("Hel"))).as_deref(), Some("Hel"));
        assert_eq!(acc.apply(StreamEvent::Delta(StreamDelta::text("lo"))).as_deref(), Some("lo"));
        assert!(acc.apply(StreamEvent::Delta(StreamDelta::finished(FinishReason::Stop))).is_none());
        acc.apply(StreamEvent::Usage(Usage::from_counts(3, 2)));
        acc.apply(StreamEvent::Done);
        assert!(acc.is_done());

        let response = acc.finish("m".to_owned());
        assert_eq!(response.content, "Hello");
        assert_eq!(response.tokens_used, Some(5));
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
        assert!(response.tool_calls.is_none());
    }

    #[test]
    fn tool_call_arguments_are_stitched_by_index() {
        let mut acc = StreamAccumulator::new();
        acc.apply(tool_fragment(0, Some("call_a"), Some("get_diff"), None));
        acc.apply(tool_fragment(1, Some("call_b"), Some("get_log"), Some("{}")));
        acc.apply(tool_fragment(0, None, None, Some("{\"path\":")));
        acc.apply(tool_fragment(0, None, None, Some("\"src\"}")));

        let response = acc.finish("m".to_owned());
        let calls = response.tool_calls.unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.arguments, "{\"path\":\"src\"}");
        assert_eq!(calls[1].function.name, "get_log");
        assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
    }
}
