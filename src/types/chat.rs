//! Text generation types

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;

use crate::error::{BoxError, HubError};
use crate::types::SettingsMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Text generation request.
///
/// `settings` holds request-scoped overrides when built by the caller; the hub
/// replaces it with the merged capability settings before handing it to the
/// provider client.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub settings: SettingsMap,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            settings: SettingsMap::new(),
        }
    }

    /// Set a request-scoped override (wins over persisted settings).
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub text: String,
    pub model: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ChatResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Stream of text deltas as produced by a provider client.
pub type ClientTextStream = Pin<Box<dyn Stream<Item = Result<String, BoxError>> + Send>>;

/// Stream of text deltas as surfaced by the hub (downstream errors wrapped).
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, HubError>> + Send>>;
