//! Weald World Engine
//!
//! The server core of a multi-user virtual-world simulation: a world of
//! interrelated entities, typed operations routed between them, and a
//! logical clock advancing their state.
//!
//! ## Architecture
//!
//! ```text
//! Server  (server.rs)  ← the pump: input drain, timer drain, outboxes
//!   ├── Connection  (connection.rs)  ← gateway, accounts, possession
//!   └── World  (world.rs)  ← registry, containment, broadcast
//!         ├── Entity  (entity.rs)  ← handler dispatch, properties
//!         │     └── CharacterState  (character.rs)  ← five pipes, metabolism
//!         │           ├── Pedestrian  (movement.rs)
//!         │           └── Mind / ExternalMind  (mind.rs)
//!         └── Scheduler  (scheduler.rs)  ← future-seconds queue
//! ```
//!
//! Characters split incoming traffic three ways: world→body (physical
//! effects), world→mind (perception), and – once the mind replies –
//! mind→body (intent), which re-enters the world as outbound operations.

// Protocol types are always available (no server feature needed).
pub mod config;
pub mod location;
pub mod operation;
pub mod property;
pub mod types;

// Server-side modules require the `server` feature.
#[cfg(feature = "server")]
pub mod account;
#[cfg(feature = "server")]
pub mod character;
#[cfg(feature = "server")]
pub mod connection;
#[cfg(feature = "server")]
pub mod entity;
#[cfg(feature = "server")]
pub mod factory;
#[cfg(feature = "server")]
pub mod mind;
#[cfg(feature = "server")]
pub mod movement;
#[cfg(feature = "server")]
pub mod persistence;
#[cfg(feature = "server")]
pub mod scheduler;
#[cfg(feature = "server")]
pub mod script;
#[cfg(feature = "server")]
pub mod server;
#[cfg(feature = "server")]
pub mod world;

// Convenience re-exports (server only)
#[cfg(feature = "server")]
pub use account::Account;
#[cfg(feature = "server")]
pub use connection::Connection;
#[cfg(feature = "server")]
pub use entity::Entity;
#[cfg(feature = "server")]
pub use persistence::{AccountStore, MemoryStore};
#[cfg(feature = "server")]
pub use server::Server;
#[cfg(feature = "server")]
pub use world::World;
pub use config::ServerConfig;
pub use location::Location;
pub use operation::{OpKind, OpVec, Operation};
pub use types::{Quaternion, Vec3};
