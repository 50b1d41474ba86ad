//! Permission-gated multi-room chat server library
//!
//! A line-oriented TCP chat server. Clients pass a shared host password,
//! log in or register, then talk in rooms whose visibility and write access
//! depend on each user's numeric permission level.
//!
//! # Features
//! - Host password gate and argon2-hashed accounts
//! - Rooms with per-level view and chat sets
//! - Private whispers with `/reply`
//! - Owner and level-based permission checks for room creation and `/editperms`
//! - Optional registration with an external lookup service
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning sessions, rooms and permissions
//! - Each connection runs a `Session` for the handshake and read loop, plus
//!   a writer task draining its outbound line queue
//! - No locks on chat state; all access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio_util::sync::CancellationToken;
//! use permchat::{serve, ChatServer, MemoryStore, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let shutdown = CancellationToken::new();
//!     let ctx = ChatServer::spawn(&config, Arc::new(MemoryStore::new()), shutdown);
//!
//!     let listener = TcpListener::bind(&config.bind).await.unwrap();
//!     serve(listener, ctx).await;
//! }
//! ```

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod handler;
pub mod lookup;
pub mod message;
pub mod permission;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use command::{Command, CommandProcessor, Outcome};
pub use config::ServerConfig;
pub use error::{AppError, ChatError, SendError, StoreError};
pub use handler::{handle_connection, handle_stream, serve};
pub use message::ServerMessage;
pub use permission::{PermissionLevel, PermissionTable};
pub use registry::{RoomRegistry, SessionRegistry};
pub use room::Room;
pub use server::{ChatServer, ServerCommand, ServerContext};
pub use session::{Session, SessionState};
pub use store::{CredentialStore, MemoryStore};
pub use types::{Identity, Level, SessionId};
