use std::pin::Pin;
use std::sync::Arc;

use log::{error, trace, warn};
use tokio::{
    select,
    sync::{mpsc, oneshot, watch},
    time::{sleep, Duration, Instant, Sleep},
};

use crate::actors::supervisor::Supervisor;
use crate::auth::IdentitySession;
use crate::error::FolioError;
use crate::history;
use crate::permissions::{AccessPolicy, Action};
use crate::store::{DocumentStore, Snapshot, Subscription};
use crate::types::{Document, DocumentPatch, Version};

// Editor actor owns the local buffer of one open document. Local edits
// land in the buffer immediately and are persisted after the debounce
// window, coalescing everything typed in between into a single patch.
// The store subscription is used for access and metadata only: once the
// document is loaded, remote content never replaces the buffer.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotFound,
    AccessDenied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Denied(DenyReason),
    Editing,
    /// Subscription could not be established
    Failed,
    Closed,
}

impl SessionState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, SessionState::Loading)
    }
}

/// Everything an observer of the session needs to render it
#[derive(Debug, Clone)]
pub struct SessionView {
    pub state: SessionState,
    pub file_name: String,
    pub creator: String,
    pub content: String,
    /// Content of the last successful write (or the initial load)
    pub last_known: String,
    pub allowed_users: Vec<String>,
    pub version_history: Vec<Version>,
    pub suspended: bool,
    pub latency_ms: Option<u64>,
    pub ops_per_second: u32,
    pub writes: u64,
    pub last_error: Option<FolioError>,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            state: SessionState::Loading,
            file_name: String::new(),
            creator: String::new(),
            content: String::new(),
            last_known: String::new(),
            allowed_users: Vec::new(),
            version_history: Vec::new(),
            suspended: false,
            latency_ms: None,
            ops_per_second: 0,
            writes: 0,
            last_error: None,
        }
    }
}

impl SessionView {
    pub fn is_saved(&self) -> bool {
        self.content == self.last_known
    }
}

pub enum EditorMessage {
    Edit(String),
    CreateVersion {
        reply: oneshot::Sender<Result<Version, FolioError>>,
    },
    RestoreVersion {
        timestamp: i64,
        reply: oneshot::Sender<Result<String, FolioError>>,
    },
    Flush {
        reply: oneshot::Sender<Result<(), FolioError>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

struct Telemetry {
    window_start: Instant,
    ops_in_window: u32,
}

impl Telemetry {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            ops_in_window: 0,
        }
    }

    fn record(&mut self, view: &mut SessionView, latency: Duration) {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= Duration::from_secs(1) {
            self.window_start = now;
            self.ops_in_window = 0;
        }
        self.ops_in_window += 1;
        view.ops_per_second = self.ops_in_window;
        view.latency_ms = Some(latency.as_millis() as u64);
        view.writes += 1;
    }
}

struct EditorActor {
    id: String,
    store: Arc<dyn DocumentStore>,
    session: Arc<dyn IdentitySession>,
    receiver: mpsc::UnboundedReceiver<EditorMessage>,
    subscription: Option<Subscription>,
    published: watch::Sender<SessionView>,
    view: SessionView,
    // latest record seen by the subscription, used for access checks
    remote: Option<Document>,
    debounce_window: Duration,
    debounce: Pin<Box<Sleep>>,
    dirty: bool,
    telemetry: Telemetry,
}

async fn next_snapshot(subscription: &mut Option<Subscription>) -> Option<Snapshot> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

impl EditorActor {
    async fn run(&mut self) {
        trace!("doc-{}: session start", self.id);

        match self.store.subscribe(&self.id).await {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(err) => {
                error!("doc-{}: subscribe failed: {}", self.id, err);
                self.view.last_error = Some(err);
                self.set_state(SessionState::Failed);
            }
        }

        loop {
            select! {
                _ = &mut self.debounce, if self.dirty => {
                    _ = self.persist().await;
                },
                snapshot = next_snapshot(&mut self.subscription) => {
                    match snapshot {
                        Some(snapshot) => self.handle_snapshot(snapshot).await,
                        None => self.handle_subscription_end(),
                    }
                },
                msg = self.receiver.recv() => {
                    match msg {
                        Some(EditorMessage::Close { reply }) => {
                            self.close().await;
                            _ = reply.send(());
                            break;
                        }
                        Some(msg) => self.handle_message(msg).await,
                        None => {
                            self.close().await;
                            break;
                        }
                    }
                },
            }
        }

        trace!("doc-{}: session exit", self.id);
    }

    async fn handle_message(&mut self, msg: EditorMessage) {
        match msg {
            EditorMessage::Edit(content) => self.apply_local_edit(content),
            EditorMessage::CreateVersion { reply } => {
                let res = self.create_version().await;
                if let Err(err) = &res {
                    warn!("doc-{}: create version failed: {}", self.id, err);
                }
                _ = reply.send(res);
            }
            EditorMessage::RestoreVersion { timestamp, reply } => {
                let res = self.restore_version(timestamp);
                _ = reply.send(res);
            }
            EditorMessage::Flush { reply } => {
                let res = if self.dirty {
                    self.persist().await
                } else {
                    self.check(Action::Update)
                };
                _ = reply.send(res);
            }
            EditorMessage::Close { reply } => {
                // handled by the run loop
                _ = reply.send(());
            }
        }
    }

    fn publish(&self) {
        self.published.send_replace(self.view.clone());
    }

    fn set_state(&mut self, state: SessionState) {
        trace!("doc-{}: {:?} -> {:?}", self.id, self.view.state, state);
        self.view.state = state;
        self.publish();
    }

    fn identity(&self) -> Option<String> {
        self.session.email()
    }

    fn check(&self, action: Action) -> Result<(), FolioError> {
        match self.view.state {
            SessionState::Editing => {}
            SessionState::Loading => {
                return Err(FolioError::unprocessable("Document is still loading"))
            }
            SessionState::Denied(DenyReason::NotFound) => {
                return Err(FolioError::not_found("Document not found"))
            }
            SessionState::Denied(DenyReason::AccessDenied) => {
                return Err(FolioError::access_denied("No access to this document"))
            }
            SessionState::Failed => {
                return Err(FolioError::persistence("Document store is unavailable"))
            }
            SessionState::Closed => {
                return Err(FolioError::unprocessable("Session is closed"))
            }
        }
        let Some(remote) = &self.remote else {
            return Err(FolioError::not_found("Document not found"));
        };
        AccessPolicy::of(remote).check(self.identity().as_deref(), action)
    }

    // Local edits

    fn apply_local_edit(&mut self, content: String) {
        if self.view.state != SessionState::Editing {
            trace!("doc-{}: edit ignored in {:?}", self.id, self.view.state);
            return;
        }
        self.view.content = content;
        if !self.view.suspended {
            self.dirty = true;
            self.debounce
                .as_mut()
                .reset(Instant::now() + self.debounce_window);
        }
        self.publish();
    }

    async fn persist(&mut self) -> Result<(), FolioError> {
        self.dirty = false;
        let res = self.write_content().await;
        match &res {
            Ok(()) => self.view.last_error = None,
            Err(err) => {
                // buffer is kept, the next edit schedules another write
                error!("doc-{}: autosave failed: {}", self.id, err);
                self.view.last_error = Some(err.clone());
            }
        }
        self.publish();
        res
    }

    async fn write_content(&mut self) -> Result<(), FolioError> {
        self.check(Action::Update)?;
        let content = self.view.content.clone();
        let started = Instant::now();
        self.store
            .patch(&self.id, DocumentPatch::content(content.clone()))
            .await?;
        trace!("doc-{}: saved {} bytes", self.id, content.len());
        self.view.last_known = content;
        self.telemetry.record(&mut self.view, started.elapsed());
        Ok(())
    }

    // Versions

    async fn create_version(&mut self) -> Result<Version, FolioError> {
        self.check(Action::Update)?;
        let fresh = self
            .store
            .read_once(&self.id)
            .await?
            .ok_or_else(|| FolioError::not_found("Document not found"))?;
        let next = history::snapshot(
            &fresh.version_history,
            &self.view.content,
            history::now_millis(),
        );
        let version = next[0].clone();
        self.store
            .patch(&self.id, DocumentPatch::version_history(next.clone()))
            .await?;
        trace!("doc-{}: created version {}", self.id, version.timestamp);
        if let Some(remote) = &mut self.remote {
            remote.version_history = next.clone();
        }
        self.view.version_history = next;
        self.publish();
        Ok(version)
    }

    fn restore_version(&mut self, timestamp: i64) -> Result<String, FolioError> {
        self.check(Action::Read)?;
        let version = history::find(&self.view.version_history, timestamp)
            .cloned()
            .ok_or_else(|| FolioError::not_found("Version not found"))?;
        let content = history::restore(&version);

        self.view.suspended = true;
        // a pending autosave would write over the restored content
        self.dirty = false;
        self.apply_local_edit(content.clone());
        self.view.last_known = content.clone();
        self.view.suspended = false;
        self.publish();

        trace!("doc-{}: restored version {}", self.id, timestamp);
        Ok(content)
    }

    // Remote state

    async fn handle_snapshot(&mut self, snapshot: Snapshot) {
        match (self.view.state, snapshot) {
            (SessionState::Loading | SessionState::Editing, None) => {
                self.deny(DenyReason::NotFound);
            }
            (SessionState::Loading | SessionState::Editing, Some(doc))
                if doc.creator.is_empty() =>
            {
                self.remove_residue().await;
            }
            (SessionState::Loading, Some(doc)) => self.load(doc).await,
            (SessionState::Editing, Some(doc)) => self.refresh(doc),
            _ => {}
        }
    }

    async fn load(&mut self, doc: Document) {
        let Some(identity) = self.identity() else {
            self.deny(DenyReason::AccessDenied);
            return;
        };
        if !AccessPolicy::of(&doc).can_access(&identity) {
            self.deny(DenyReason::AccessDenied);
            return;
        }
        // content comes from a point read, the subscription only decides
        // whether we may load it
        let record = match self.store.read_once(&self.id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.deny(DenyReason::NotFound);
                return;
            }
            Err(err) => {
                warn!(
                    "doc-{}: initial read failed, using subscription state: {}",
                    self.id, err
                );
                doc
            }
        };
        if !AccessPolicy::of(&record).can_access(&identity) {
            self.deny(DenyReason::AccessDenied);
            return;
        }
        self.view.content = record.content.clone();
        self.view.last_known = record.content.clone();
        self.set_metadata(record);
        trace!("doc-{}: loaded for {}", self.id, identity);
        self.set_state(SessionState::Editing);
    }

    fn refresh(&mut self, doc: Document) {
        let allowed = self
            .identity()
            .is_some_and(|identity| AccessPolicy::of(&doc).can_access(&identity));
        if !allowed {
            self.deny(DenyReason::AccessDenied);
            return;
        }
        if doc.content != self.view.last_known {
            trace!("doc-{}: remote content changed, keeping local buffer", self.id);
        }
        self.set_metadata(doc);
        self.publish();
    }

    fn set_metadata(&mut self, doc: Document) {
        self.view.file_name = doc.file_name.clone();
        self.view.creator = doc.creator.clone();
        self.view.allowed_users = doc.allowed_users.clone();
        self.view.version_history = doc.version_history.clone();
        self.remote = Some(doc);
    }

    // A record without a creator is left behind by a field write that raced
    // the deletion of the document. Nobody can access it, so drop it.
    async fn remove_residue(&mut self) {
        warn!("doc-{}: record has no creator, removing it", self.id);
        if let Err(err) = self.store.remove(&self.id).await {
            warn!("doc-{}: could not remove residue: {}", self.id, err);
        }
        self.deny(DenyReason::NotFound);
    }

    fn deny(&mut self, reason: DenyReason) {
        warn!("doc-{}: denied, {:?}", self.id, reason);
        self.dirty = false;
        self.remote = None;
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        // nothing of the record stays visible
        self.view = SessionView {
            state: SessionState::Denied(reason),
            ..Default::default()
        };
        self.publish();
    }

    fn handle_subscription_end(&mut self) {
        warn!("doc-{}: subscription ended by the store", self.id);
        self.subscription = None;
        if self.view.state == SessionState::Loading {
            self.set_state(SessionState::Failed);
        }
    }

    async fn close(&mut self) {
        if self.dirty {
            _ = self.persist().await;
        }
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.set_state(SessionState::Closed);
    }
}

/// Handle to an open editing session of a single document
#[derive(Clone)]
pub struct EditorHandle {
    id: String,
    sender: mpsc::UnboundedSender<EditorMessage>,
    view: watch::Receiver<SessionView>,
    supervisor: Supervisor,
}

impl EditorHandle {
    pub fn new(
        id: String,
        store: Arc<dyn DocumentStore>,
        session: Arc<dyn IdentitySession>,
        debounce_window: Duration,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (published, view) = watch::channel(SessionView::default());
        let supervisor = Supervisor::new(format!("doc-{}", id));
        let mut actor = EditorActor {
            id: id.clone(),
            store,
            session,
            receiver,
            subscription: None,
            published,
            view: SessionView::default(),
            remote: None,
            debounce_window,
            debounce: Box::pin(sleep(debounce_window)),
            dirty: false,
            telemetry: Telemetry::new(),
        };
        supervisor.spawn(async move { actor.run().await });
        Self {
            id,
            sender,
            view,
            supervisor,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Replaces the buffer with `content`, persisted after the debounce window
    pub fn edit(&self, content: impl Into<String>) {
        _ = self.sender.send(EditorMessage::Edit(content.into()));
    }

    pub async fn create_version(&self) -> Result<Version, FolioError> {
        self.request(|reply| EditorMessage::CreateVersion { reply })
            .await?
    }

    /// Installs the content of the version with `timestamp` as the buffer,
    /// without writing anything
    pub async fn restore_version(&self, timestamp: i64) -> Result<String, FolioError> {
        self.request(|reply| EditorMessage::RestoreVersion { timestamp, reply })
            .await?
    }

    /// Persists pending edits now instead of at the end of the window
    pub async fn flush(&self) -> Result<(), FolioError> {
        self.request(|reply| EditorMessage::Flush { reply }).await?
    }

    /// Flushes pending edits, releases the subscription and stops the session
    pub async fn close(&self) {
        _ = self.request(|reply| EditorMessage::Close { reply }).await;
        self.supervisor.exited().await;
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Waits until the session left `Loading`
    pub async fn loaded(&self) -> SessionState {
        let mut view = self.view.clone();
        let state = match view.wait_for(|view| view.state.is_settled()).await {
            Ok(view) => view.state,
            Err(_) => SessionState::Closed,
        };
        state
    }

    async fn request<T>(
        &self,
        msg: impl FnOnce(oneshot::Sender<T>) -> EditorMessage,
    ) -> Result<T, FolioError> {
        let (sender, receiver) = oneshot::channel();
        self.sender
            .send(msg(sender))
            .map_err(|_| FolioError::unprocessable("Session is closed"))?;
        receiver
            .await
            .map_err(|_| FolioError::unprocessable("Session is closed"))
    }
}
