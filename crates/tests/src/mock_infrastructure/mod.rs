//! Mock Infrastructure for Testing Concord
//!
//! Reusable mock relays for testing the client without a real relay or real providers.
//!
//! ## Components
//!
//! - `RelayMockBuilder`: Wraps mockito to serve the HTTP relay protocol
//! - `MockRelayWsServer`: A mock WebSocket relay that multiplexes calls
//! - `ScriptedProvider`: Deterministic signing providers with configurable behavior
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{honest_trio, RelayMockBuilder};
//!
//! let mut relay = RelayMockBuilder::new().await;
//! relay.mock_providers(honest_trio(&json!("0x100001"))).await;
//!
//! // Use relay.url() as the client's relay URL
//! ```

pub mod test_helpers;

pub use relay_mock::RelayMockBuilder;
pub use test_helpers::*;
pub use websocket_mock::MockRelayWsServer;
