//! # aura-store
//!
//! Local storage for the Aura client: message history per conversation,
//! known peer profiles and the signed-in session. The crate exposes a
//! synchronous `Database` handle that wraps a `rusqlite::Connection` and
//! provides typed CRUD helpers for every domain model.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod peers;
pub mod session;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
