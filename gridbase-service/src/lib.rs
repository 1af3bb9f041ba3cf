//! GRIDBASE Service - Grid Engine and Request/Reply Layer
//!
//! This crate owns the in-memory grid cache and the engine that applies
//! change batches against it, and exposes both through a JSON request/reply
//! contract consumed from a message queue. Protected commands are gated by
//! JWT validation.

pub mod auth;
pub mod cache;
pub mod change;
pub mod config;
pub mod engine;
pub mod handler;
pub mod listener;
pub mod message;
pub mod telemetry;
pub mod transport;

// Re-export commonly used types
pub use auth::{Claims, FixedClock, JwtClock, JwtValidator, Principal, SystemClock, TokenService};
pub use cache::{GridCache, GridRows};
pub use change::{ChangeRequest, Operation, ReferencePayload};
pub use config::{queue_name, ServiceConfig, TelemetryConfig, TransportConfig};
pub use engine::{BatchOutcome, GridEngine};
pub use handler::GridService;
pub use listener::{QueueListener, StopHandle};
pub use message::{reply_message, Command, DataSet, Reply, Request, Status};
pub use telemetry::init_tracing;
pub use transport::{channel, ChannelClient, ChannelTransport, Delivery, Published, Transport};
