//! Typed access to the shared document store.
//!
//! Every document lives under a fixed root collection keyed by its id.
//! Writes from all clients are last-write-wins per top-level field, and
//! subscribers observe every mutation including their own.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::FolioError;
use crate::types::{Document, DocumentPatch};

pub mod memory;
pub mod remote;

pub use memory::MemoryStore;
pub use remote::RemoteStore;

/// Root collection of document records
pub const FILES: &str = "files";

/// State of a record as seen by a subscriber, `None` if it does not exist
pub type Snapshot = Option<Document>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Live listener. The first item is the current state, the following
    /// ones arrive after every mutation of the record.
    async fn subscribe(&self, id: &str) -> Result<Subscription, FolioError>;

    async fn read_once(&self, id: &str) -> Result<Option<Document>, FolioError>;

    /// Point read of every record in the root collection, in no particular
    /// order
    async fn list(&self) -> Result<Vec<Document>, FolioError>;

    async fn write_full(&self, id: &str, doc: &Document) -> Result<(), FolioError>;

    async fn patch(&self, id: &str, patch: DocumentPatch) -> Result<(), FolioError>;

    /// Allocates an id for a record that is not written yet
    async fn create_unique(&self, parent: &str) -> Result<String, FolioError>;

    async fn remove(&self, id: &str) -> Result<(), FolioError>;
}

/// Fresh record id, unique without coordinating with other clients
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub type ReleaseCallback = Box<dyn FnOnce() + Send>;

/// Stream of snapshots for a single record.
///
/// The listener is released by `unsubscribe` or when the subscription is
/// dropped, whichever happens first.
pub struct Subscription {
    id: String,
    receiver: mpsc::UnboundedReceiver<Snapshot>,
    on_release: Option<ReleaseCallback>,
}

impl Subscription {
    pub fn new(
        id: String,
        receiver: mpsc::UnboundedReceiver<Snapshot>,
        on_release: Option<ReleaseCallback>,
    ) -> Self {
        Self {
            id,
            receiver,
            on_release,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next snapshot, `None` once the store ended the subscription
    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(on_release) = self.on_release.take() {
            on_release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("released", &self.on_release.is_none())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl Stream for Subscription {
    type Item = Snapshot;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
