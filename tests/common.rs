#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use folio::store::{DocumentStore, Subscription};
use folio::{
    Document, DocumentPatch, EditorHandle, FolioError, Identity, MemoryStore, Session,
    SessionView, Version, Workspace,
};

pub const DEBOUNCE: Duration = Duration::from_millis(500);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn session(email: &str) -> Arc<Session> {
    Arc::new(Session::signed_in(Identity::new(email)))
}

/// Memory store that records patches and point reads and can be switched
/// into a failing mode
pub struct RecordingStore {
    inner: MemoryStore,
    patches: Mutex<Vec<DocumentPatch>>,
    reads: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            patches: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        })
    }

    pub fn patches(&self) -> Vec<DocumentPatch> {
        self.patches.lock().unwrap().clone()
    }

    /// Contents of every attempted content patch, in order
    pub fn content_patches(&self) -> Vec<String> {
        self.patches()
            .into_iter()
            .filter_map(|patch| patch.content)
            .collect()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn fail_if_offline(&self) -> Result<(), FolioError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(FolioError::persistence("Store is offline"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn subscribe(&self, id: &str) -> Result<Subscription, FolioError> {
        self.inner.subscribe(id).await
    }

    async fn read_once(&self, id: &str) -> Result<Option<Document>, FolioError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.fail_if_offline()?;
        self.inner.read_once(id).await
    }

    async fn list(&self) -> Result<Vec<Document>, FolioError> {
        self.fail_if_offline()?;
        self.inner.list().await
    }

    async fn write_full(&self, id: &str, doc: &Document) -> Result<(), FolioError> {
        self.fail_if_offline()?;
        self.inner.write_full(id, doc).await
    }

    async fn patch(&self, id: &str, patch: DocumentPatch) -> Result<(), FolioError> {
        self.patches.lock().unwrap().push(patch.clone());
        self.fail_if_offline()?;
        self.inner.patch(id, patch).await
    }

    async fn create_unique(&self, parent: &str) -> Result<String, FolioError> {
        self.inner.create_unique(parent).await
    }

    async fn remove(&self, id: &str) -> Result<(), FolioError> {
        self.fail_if_offline()?;
        self.inner.remove(id).await
    }
}

pub fn workspace(store: &Arc<RecordingStore>, email: &str) -> Workspace {
    Workspace::new(store.clone(), session(email), DEBOUNCE)
}

/// Writes a document directly, bypassing the workspace
pub async fn seed(
    store: &Arc<RecordingStore>,
    creator: &str,
    content: &str,
    history: Vec<Version>,
) -> Document {
    let id = store.create_unique("files").await.unwrap();
    let mut doc = Document::new(id.clone(), "notes".to_string(), creator.to_string());
    doc.content = content.to_string();
    doc.version_history = history;
    store.write_full(&id, &doc).await.unwrap();
    doc
}

pub fn version(timestamp: i64, content: &str) -> Version {
    Version {
        timestamp,
        content: content.to_string(),
    }
}

/// Waits until the published view of `handle` satisfies `f`
pub async fn wait_for_view(
    handle: &EditorHandle,
    f: impl FnMut(&SessionView) -> bool,
) -> SessionView {
    let mut view = handle.watch();
    let matched = tokio::time::timeout(Duration::from_secs(10), view.wait_for(f))
        .await
        .expect("view condition not met")
        .expect("session exited")
        .clone();
    matched
}
