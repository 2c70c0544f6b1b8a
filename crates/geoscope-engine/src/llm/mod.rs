//! Chat-completion plumbing: wire messages, the [`ChatModel`] seam and the
//! OpenAI-compatible HTTP client.

pub mod client;
pub mod models;

use crate::tools::ToolDefinition;
use models::Usage;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallMessage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text("assistant", content)
    }

    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolCallMessage>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallMessage {
    pub id: String,
    #[serde(rename = "type", default = "function_call_type")]
    pub call_type: String,
    pub function: FunctionCallMessage,
}

impl ToolCallMessage {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: function_call_type(),
            function: FunctionCallMessage {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

fn function_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallMessage {
    pub name: String,
    /// JSON-encoded arguments, as produced by the model.
    #[serde(default)]
    pub arguments: String,
}

/// One completion from the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallMessage>,
    pub refusal: Option<String>,
    pub usage: Option<Usage>,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn tool_calls(calls: Vec<ToolCallMessage>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::default()
        }
    }
}

pub type ModelFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<ModelReply>> + Send + 'a>>;

/// A chat model able to answer with text or tool calls.
pub trait ChatModel: Send + Sync {
    /// One completion over the full transcript. `tools` may be empty, in
    /// which case no tool declarations are sent.
    fn complete<'a>(&'a self, messages: &'a [Message], tools: &'a [ToolDefinition])
        -> ModelFuture<'a>;
}
