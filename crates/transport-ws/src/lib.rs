//! WebSocket transport for rally realtime subscriptions.
//!
//! Speaks `graphql-transport-ws` over a single multiplexed socket and plugs
//! into [`rally_realtime::TransportProvider`] through [`WsTransportFactory`].

pub mod client;
pub mod error;
pub mod router;

pub use {
    client::{ConnectSettings, WsTransport, WsTransportFactory},
    error::{Error, Result},
    router::OperationRouter,
};
