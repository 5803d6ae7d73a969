//! Data-access query shapes.
//!
//! The four read-only queries a module may issue through the sandboxed data
//! proxy, and the replies the external store produces for them.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::extraction::Extraction;

/// A read-only extraction query issued by a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ExtractionQuery {
    /// All extractions recorded for one session.
    SessionExtractions {
        /// The session to read.
        session_id: String,
    },

    /// All extractions for one user within a class. Subject to the proxy's
    /// user-scope authorization check.
    UserExtractions {
        /// The user to read.
        user_id: String,
        /// The class scope.
        class_id: String,
    },

    /// Extractions of one type, optionally narrowed by session or user.
    ByType {
        /// The extraction type to select.
        #[serde(rename = "type")]
        kind: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        /// Maximum number of rows to return.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },

    /// Count extractions matching the given filters.
    Count {
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        /// Only count extractions recorded at or after this instant.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        since: Option<DateTime<Utc>>,
    },
}

impl ExtractionQuery {
    /// The user id this query is scoped to, if any. Queries carrying a user
    /// scope are subject to the proxy's same-user authorization check.
    pub fn scoped_user_id(&self) -> Option<&str> {
        match self {
            Self::SessionExtractions { .. } => None,
            Self::UserExtractions { user_id, .. } => Some(user_id),
            Self::ByType { user_id, .. } | Self::Count { user_id, .. } => user_id.as_deref(),
        }
    }
}

/// The reply produced by the store for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryReply {
    /// Rows for the three row-returning queries.
    Extractions {
        /// The matching extractions.
        items: Vec<Extraction>,
    },
    /// The result of a `count` query.
    Count {
        /// Number of matching extractions.
        count: u64,
    },
}

#[cfg(test)]
#[path = "query.test.rs"]
mod tests;
