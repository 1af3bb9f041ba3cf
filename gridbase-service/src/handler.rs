//! Command dispatch.
//!
//! [`GridService`] turns one request into one reply. Protected commands are
//! gated by token validation before their body runs, so a rejected token
//! never reaches the engine. Every failure becomes a reply; nothing here
//! returns an error to the transport.

use crate::auth::{Principal, TokenService};
use crate::change::Operation;
use crate::engine::{BatchOutcome, GridEngine};
use crate::message::{reply_message, Command, DataSet, Reply, Request};
use gridbase_core::{AuthError, GridResult, ValidationError};
use gridbase_storage::{compiler, Persistence};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct GridService {
    engine: GridEngine,
    tokens: Arc<dyn TokenService>,
}

impl GridService {
    pub fn new(persistence: Arc<dyn Persistence>, tokens: Arc<dyn TokenService>) -> Self {
        Self {
            engine: GridEngine::new(persistence),
            tokens,
        }
    }

    pub fn engine(&self) -> &GridEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut GridEngine {
        &mut self.engine
    }

    /// Decode a message body and process it.
    pub async fn process_body(&mut self, body: &[u8], correlation_id: Option<String>) -> Reply {
        let request: Request = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Undecodable request");
                return Reply::error(format!("invalid request: {}", e))
                    .with_correlation_id(correlation_id);
            }
        };
        self.handle(&request).await.with_correlation_id(correlation_id)
    }

    /// Process one decoded request.
    pub async fn handle(&mut self, request: &Request) -> Reply {
        let command = match Command::parse(&request.command) {
            Some(command) => command,
            None => {
                warn!(command = %request.command, "Unknown command");
                return Reply::failed(request, "Unknown command");
            }
        };
        debug!(
            command = %request.command,
            request_uuid = request.request_uuid.as_deref().unwrap_or(""),
            "Request received"
        );

        let principal = if command.is_protected() {
            match self.tokens.validate(request.jwt.as_deref()) {
                Ok(principal) => principal,
                Err(e) => {
                    warn!(command = %request.command, error = %e, "Token rejected");
                    return Reply::failed(request, e.to_string());
                }
            }
        } else {
            Principal::default()
        };

        let result = match command {
            Command::Init | Command::Heartbeat => Ok(Reply::success(request)),
            Command::Authentication => self.authenticate(request).await,
            Command::Load => self.load(request).await,
            Command::Change => self.change(request, &principal).await,
            Command::Locate => Ok(Self::locate(request, &principal)),
            Command::Prompt => Ok(Reply::failed(request, "Not implemented")),
        };

        match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!(command = %request.command, error = %e, "Request failed");
                Reply::failed(request, reply_message(&e))
            }
        }
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    async fn authenticate(&mut self, request: &Request) -> GridResult<Reply> {
        let login_id = request
            .login_id
            .as_deref()
            .ok_or_else(|| ValidationError::missing("login id"))?;
        let password = request
            .password_hash
            .as_deref()
            .ok_or_else(|| ValidationError::missing("password"))?;

        let tuple = self
            .engine
            .persistence()
            .select_one(&compiler::authenticate(login_id, password))
            .await?;
        let Some(tuple) = tuple else {
            info!(login_id, "Authentication rejected");
            let mut reply = Reply::failed(request, AuthError::InvalidCredentials.to_string());
            reply.login_id = Some(login_id.to_string());
            return Ok(reply);
        };

        let user = compiler::decode_user(login_id, &tuple)?;
        let jwt = self.tokens.issue(user.uuid, login_id)?;
        info!(login_id, user_uuid = %user.uuid, "User authenticated");

        let mut reply = Reply::success(request).with_message("Authentication successful");
        reply.login_id = Some(user.login_id);
        reply.user_uuid = Some(user.uuid);
        reply.first_name = Some(user.first_name);
        reply.last_name = Some(user.last_name);
        reply.jwt = Some(jwt);
        Ok(reply)
    }

    async fn load(&mut self, request: &Request) -> GridResult<Reply> {
        let grid_uuid = request
            .grid_uuid
            .ok_or_else(|| ValidationError::missing("grid UUID"))?;
        self.grid_reply(request, grid_uuid, request.row_uuid).await
    }

    async fn change(&mut self, request: &Request, principal: &Principal) -> GridResult<Reply> {
        let operations = request
            .changes
            .iter()
            .map(Operation::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        if operations.is_empty() {
            return Err(ValidationError::missing("changes").into());
        }

        match self.engine.apply(operations).await? {
            BatchOutcome::Loaded { grid_uuid } => self.grid_reply(request, grid_uuid, None).await,
            BatchOutcome::Applied { count } => {
                info!(changes = count, "Changes applied");
                let mut reply = Reply::success(request)
                    .with_message(format!("{} change(s) applied", count));
                reply.user_uuid = principal.user_uuid;
                reply.user = principal.user.clone();
                Ok(reply)
            }
        }
    }

    fn locate(request: &Request, principal: &Principal) -> Reply {
        let mut reply = Reply::success(request);
        reply.grid_uuid = request.grid_uuid;
        reply.column_uuid = request.column_uuid;
        reply.row_uuid = request.row_uuid;
        reply.user_uuid = principal.user_uuid;
        reply.user = principal.user.clone();
        reply
    }

    /// Reply carrying a grid and its rows, or one row when `row_uuid` is set.
    async fn grid_reply(
        &mut self,
        request: &Request,
        grid_uuid: Uuid,
        row_uuid: Option<Uuid>,
    ) -> GridResult<Reply> {
        let (grid, rows) = self.engine.load(grid_uuid).await?;
        let rows = match row_uuid {
            Some(row_uuid) => {
                let row = rows
                    .get(row_uuid)
                    .ok_or(ValidationError::RowNotFound { grid_uuid, row_uuid })?;
                vec![row.clone()]
            }
            None => rows.iter().cloned().collect(),
        };

        let mut reply = Reply::success(request).with_message(format!("'{}' loaded", grid.name));
        reply.data_set = Some(DataSet {
            grid_uuid,
            grid: grid.clone(),
            row_uuid,
            count_rows: rows.len(),
            rows,
        });
        Ok(reply)
    }
}

impl std::fmt::Debug for GridService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridService")
            .field("cached_grids", &self.engine.cache().grid_count())
            .finish()
    }
}
