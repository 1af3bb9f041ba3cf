//! Request/reply message contract.
//!
//! Bodies are JSON with camelCase keys. A reply echoes the context fields
//! of its request so callers can correlate it without transport metadata.

use crate::change::ChangeRequest;
use gridbase_core::{Grid, GridError, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// REQUEST
// ============================================================================

/// Command selecting the request handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Init,
    Heartbeat,
    Authentication,
    Load,
    Change,
    Locate,
    Prompt,
}

impl Command {
    pub fn parse(command: &str) -> Option<Self> {
        match command {
            "init" => Some(Command::Init),
            "heartbeat" => Some(Command::Heartbeat),
            "authentication" => Some(Command::Authentication),
            "load" => Some(Command::Load),
            "change" => Some(Command::Change),
            "locate" => Some(Command::Locate),
            "prompt" => Some(Command::Prompt),
            _ => None,
        }
    }

    /// Whether the command requires a valid token.
    pub fn is_protected(&self) -> bool {
        matches!(
            self,
            Command::Load | Command::Change | Command::Locate | Command::Prompt
        )
    }
}

/// An incoming request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_initiated_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ChangeRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
}

// ============================================================================
// REPLY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failed,
    Error,
}

/// Grid payload of a load reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSet {
    pub grid_uuid: Uuid,
    pub grid: Grid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_uuid: Option<Uuid>,
    pub rows: Vec<Row>,
    pub count_rows: usize,
}

/// A reply to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_initiated_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_set: Option<DataSet>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_uuid: Option<Uuid>,
}

impl Reply {
    fn bare(status: Status) -> Self {
        Self {
            command: None,
            command_text: None,
            url: None,
            request_uuid: None,
            context_uuid: None,
            db_name: None,
            from: None,
            request_initiated_on: None,
            correlation_id: None,
            status,
            message: None,
            data_set: None,
            login_id: None,
            user_uuid: None,
            user: None,
            first_name: None,
            last_name: None,
            jwt: None,
            grid_uuid: None,
            column_uuid: None,
            row_uuid: None,
        }
    }

    /// Start a reply that echoes the context of `request`.
    pub fn to(request: &Request, status: Status) -> Self {
        Self {
            command: Some(request.command.clone()),
            command_text: request.command_text.clone(),
            url: request.url.clone(),
            request_uuid: request.request_uuid.clone(),
            context_uuid: request.context_uuid.clone(),
            db_name: request.db_name.clone(),
            from: request.from.clone(),
            request_initiated_on: request.request_initiated_on.clone(),
            ..Self::bare(status)
        }
    }

    pub fn success(request: &Request) -> Self {
        Self::to(request, Status::Success)
    }

    pub fn failed(request: &Request, message: impl Into<String>) -> Self {
        Self::to(request, Status::Failed).with_message(message)
    }

    /// Reply to a body that could not be decoded as a request.
    pub fn error(message: impl Into<String>) -> Self {
        Self::bare(Status::Error).with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

/// Message text of an error as shown to callers, without the category prefix.
pub fn reply_message(error: &GridError) -> String {
    match error {
        GridError::Validation(e) => e.to_string(),
        GridError::Storage(e) => e.to_string(),
        GridError::Auth(e) => e.to_string(),
        GridError::Config(e) => e.to_string(),
        GridError::Transport(e) => e.to_string(),
    }
}
