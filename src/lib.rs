//! Banking Gateway
//!
//! Exposes a fixed catalog of banking operations against an Open Bank
//! Project platform as named tools:
//! - One shared DirectLogin session, refreshed on expiry or rejection
//! - Typed, validated parameters checked before any network call
//! - A uniform response envelope for every outcome, failures included
//! - Served over MCP (stdio) and a small HTTP API
//!
//! FLOW:
//! TOOL CALL → VALIDATE → SESSION → TRANSPORT → NORMALIZE → ENVELOPE

pub mod api;
pub mod banking;
pub mod config;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod mcp;
pub mod models;
pub mod session;
pub mod tools;
pub mod transport;

#[cfg(test)]
mod testing;

pub use error::{GatewayError, Result};

// Re-export common types
pub use config::{CredentialMode, Credentials, GatewayConfig};
pub use envelope::ResponseEnvelope;
pub use gateway::BankingGateway;
pub use models::{Operation, OperationOutput, OperationRequest};
