//! # Concord Core
//!
//! Client library for quorum-verified JSON-RPC calls through a multi-provider relay.
//!
//! A relay forwards every request to several independent providers and streams back what
//! each of them answered. This crate decides which of those answers to trust:
//!
//! - **[`client`]**: [`RelayClient`], request building, id/nonce generation and mapping of
//!   trusted replies back to caller ids.
//!
//! - **[`pipeline`]**: the per-call stream stages: finalization, timeout, signature
//!   verification, consensus and completeness.
//!
//! - **[`transport`]**: HTTP and WebSocket connections to the relay.
//!
//! - **[`crypto`]** and **[`keys`]**: signed-message construction, ECDSA P-256 verification
//!   and the provider public key table.
//!
//! - **[`config`]**: layered TOML + environment configuration.
//!
//! - **[`metrics`]**: call, reply and rejection counters.
//!
//! ## Call Flow
//!
//! ```text
//! call_multi(requests)
//!       │
//!       ▼
//! ┌──────────────┐
//! │ WireRequest  │  internal ids, nonces, quorum, dkey
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │  Transport   │  HTTP POST or WebSocket frame
//! └──────┬───────┘
//!        │ reply items from N providers
//!        ▼
//! ┌──────────────┐
//! │   Pipeline   │ ─── failure ──► RelayError
//! └──────┬───────┘
//!        │ one trusted reply per subrequest
//!        ▼
//! Vec<JsonRpcResponse>  (request order, caller ids)
//! ```

pub mod client;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod keys;
pub mod metrics;
pub mod pipeline;
pub mod transport;
pub mod types;
pub mod utils;

pub use client::{IdGenerator, RelayClient};
pub use config::{AppConfig, ClientConfig, TransportKind};
pub use errors::RelayError;
pub use keys::PublicKeyTable;
pub use types::{JsonRpcRequest, JsonRpcResponse};
