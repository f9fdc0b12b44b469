pub mod client;

pub use client::{ConnectionState, HandlerId, SocketClient, SocketClientConfig, TransportKind};
