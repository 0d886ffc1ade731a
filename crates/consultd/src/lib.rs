//! Consultation chat daemon - session rooms and participant connections
//!
//! This crate provides the real-time chat core:
//! - `hub` - Hub actor owning one room per ongoing consultation session
//! - `client` - Per-connection read/write tasks
//! - `transport` - Socket abstraction (axum WebSocket, in-memory pair)
//! - `store` - In-memory session, message and profile stores
//! - `server` - HTTP routes and the WebSocket upgrade
//! - `config` - TOML configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        consultd                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │   ChatServer    │────▶│          HubActor           │    │
//! │  │ (axum + ws)     │     │   (SessionId -> Room)       │    │
//! │  └────────┬────────┘     └──────────────┬──────────────┘    │
//! │           │                             │                   │
//! │           │ upgrades                    │ try_send          │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │  Client tasks   │◀────│   bounded outbound queues   │    │
//! │  │  (read + write) │     │   (one per connection)      │    │
//! │  └─────────────────┘     └─────────────────────────────┘    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod client;
pub mod config;
pub mod hub;
pub mod server;
pub mod store;
pub mod transport;
