//! Backend-agnostic request, response and streaming types
//!
//! Every adapter translates to and from these shapes.

pub mod context;
pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use context::CallContext;
pub use message::{Content, ContentPart, FunctionCall, InlineImage, Message, Role, ToolCall, parse_data_uri};
pub use request::{CompletionParams, CompletionRequest, ResponseFormat};
pub use response::{CompletionResponse, FinishReason};
pub use stream::{StreamAccumulator, StreamDelta, StreamEvent, StreamFunctionCall, StreamToolCall, Usage};
pub use tool::{
    FunctionDefinition, ToolChoice, ToolChoiceFunction, ToolChoiceFunctionName, ToolChoiceMode, ToolDefinition,
};
