//! Document synchronization and access control for a shared text editor.
//!
//! A [`Workspace`] creates, shares and deletes documents in a realtime
//! key-value store and opens editing sessions ([`EditorHandle`]) that
//! buffer local edits, persist them after a debounce window and keep
//! access and version history in sync with the store.

pub mod actors;
pub mod assistant;
pub mod auth;
pub mod config;
pub mod error;
pub mod history;
pub mod permissions;
pub mod protocol;
pub mod store;
pub mod types;
pub mod workspace;

pub use actors::editor::{DenyReason, EditorHandle, SessionState, SessionView};
pub use auth::{Identity, IdentitySession, Session};
pub use config::FolioConfig;
pub use error::FolioError;
pub use store::{DocumentStore, MemoryStore, RemoteStore, Subscription};
pub use types::{Document, DocumentPatch, Version};
pub use workspace::Workspace;
