//! Persistence for agents, concept knowledge, and teaching sessions.

mod db;
mod error;
mod schema;
mod types;

pub use db::{default_database_path, PupilStore};
pub use error::StoreError;
pub use schema::{SCHEMA, SCHEMA_VERSION};
pub use types::{
    Agent, InteractionRecord, Message, Role, TeachingSession, TurnCommit, TurnRecord, XpAward,
};
