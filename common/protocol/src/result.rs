//! Hook result types.
//!
//! A module call produces exactly one [`HookResult`]; the dispatch engine
//! folds the results of a blocking chain into one aggregate `HookResult` per
//! hook invocation.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::context::MessageBody;
use crate::extraction::Extraction;

/// The outcome of a module call, or of a whole hook invocation once folded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HookResult {
    /// Continue normal execution, optionally carrying modifications and
    /// emitted extractions.
    Continue {
        /// Edits to the in-flight message/response/output.
        #[serde(default, skip_serializing_if = "Modifications::is_empty")]
        modifications: Modifications,
        /// Extractions emitted during the call (or accumulated across the
        /// chain, in the folded result).
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        extractions: Vec<Extraction>,
    },

    /// Stop the chain: nothing after the blocking module runs.
    Block {
        /// Human-readable reason for blocking.
        reason: String,
        /// A direct response to show the end user instead of the AI output.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<String>,
        /// Extractions emitted by the chain up to and including the blocking
        /// module.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        extractions: Vec<Extraction>,
    },
}

impl HookResult {
    /// A plain `continue` with no modifications or extractions.
    pub fn ok() -> Self {
        Self::Continue {
            modifications: Modifications::default(),
            extractions: Vec::new(),
        }
    }

    /// A `continue` carrying the given modifications.
    pub fn modified(modifications: Modifications) -> Self {
        Self::Continue {
            modifications,
            extractions: Vec::new(),
        }
    }

    /// A `block` with the given reason and no user-facing response.
    pub fn block(reason: impl Into<String>) -> Self {
        Self::Block {
            reason: reason.into(),
            response: None,
            extractions: Vec::new(),
        }
    }

    /// A `block` with a direct response for the end user.
    pub fn block_with_response(reason: impl Into<String>, response: impl Into<String>) -> Self {
        Self::Block {
            reason: reason.into(),
            response: Some(response.into()),
            extractions: Vec::new(),
        }
    }

    /// Returns `true` for the `Block` variant.
    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block { .. })
    }
}

/// Edits a module asks the host to apply to the in-flight data.
///
/// When several blocking modules modify the same field, the later module
/// wins: it already observed the earlier edit through context threading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Modifications {
    /// Replacement for the user message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageBody>,

    /// Replacement for the AI response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<MessageBody>,

    /// Replacement tool output, for tool hooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl Modifications {
    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.response.is_none() && self.output.is_none()
    }

    /// Folds another set of modifications into this one, field by field.
    pub fn merge(&mut self, other: Modifications) {
        if other.message.is_some() {
            self.message = other.message;
        }
        if other.response.is_some() {
            self.response = other.response;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
    }
}

#[cfg(test)]
#[path = "result.test.rs"]
mod tests;
