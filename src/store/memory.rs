use std::collections::HashMap;

use async_trait::async_trait;
use log::trace;
use tokio::sync::{mpsc, oneshot};

use crate::actors::supervisor::Supervisor;
use crate::error::FolioError;
use crate::store::{new_id, DocumentStore, ReleaseCallback, Snapshot, Subscription};
use crate::types::{Document, DocumentPatch};

// Store actor keeps every record in memory, applies operations one at a
// time in submission order, and after each mutation broadcasts the new
// state of the record to all of its subscribers.

pub enum StoreMessage {
    Subscribe {
        id: String,
        sender: mpsc::UnboundedSender<Snapshot>,
        reply: oneshot::Sender<u64>,
    },
    Unsubscribe {
        subscriber: u64,
    },
    Get {
        id: String,
        reply: oneshot::Sender<Option<Document>>,
    },
    List {
        reply: oneshot::Sender<Vec<Document>>,
    },
    Write {
        id: String,
        doc: Document,
        reply: oneshot::Sender<()>,
    },
    Patch {
        id: String,
        patch: DocumentPatch,
        reply: oneshot::Sender<Result<(), FolioError>>,
    },
    Remove {
        id: String,
        reply: oneshot::Sender<()>,
    },
}

struct Subscriber {
    id: String,
    sender: mpsc::UnboundedSender<Snapshot>,
}

struct StoreActor {
    receiver: mpsc::UnboundedReceiver<StoreMessage>,
    documents: HashMap<String, Document>,
    subscribers: HashMap<u64, Subscriber>,
    next_subscriber: u64,
}

impl StoreActor {
    fn new(receiver: mpsc::UnboundedReceiver<StoreMessage>) -> Self {
        Self {
            receiver,
            documents: HashMap::new(),
            subscribers: HashMap::new(),
            next_subscriber: 0,
        }
    }

    async fn run(&mut self) {
        trace!("store: actor start");
        while let Some(msg) = self.receiver.recv().await {
            self.handle_message(msg);
        }
        trace!("store: actor exit");
    }

    fn handle_message(&mut self, msg: StoreMessage) {
        match msg {
            StoreMessage::Subscribe { id, sender, reply } => {
                self.next_subscriber += 1;
                let key = self.next_subscriber;
                _ = sender.send(self.documents.get(&id).cloned());
                trace!("store: subscribed {} to {}", key, id);
                self.subscribers.insert(key, Subscriber { id, sender });
                _ = reply.send(key);
            }
            StoreMessage::Unsubscribe { subscriber } => {
                self.subscribers.remove(&subscriber);
                trace!("store: unsubscribed {}", subscriber);
            }
            StoreMessage::Get { id, reply } => {
                _ = reply.send(self.documents.get(&id).cloned());
            }
            StoreMessage::List { reply } => {
                _ = reply.send(self.documents.values().cloned().collect());
            }
            StoreMessage::Write { id, mut doc, reply } => {
                trace!("store: write {}", id);
                doc.id = id.clone();
                doc.normalize();
                self.documents.insert(id.clone(), doc);
                _ = reply.send(());
                self.broadcast(&id);
            }
            StoreMessage::Patch { id, patch, reply } => {
                trace!("store: patch {}", id);
                let res = match self.documents.get_mut(&id) {
                    Some(doc) => {
                        let changed = !patch.is_empty();
                        patch.apply(doc);
                        Ok(changed)
                    }
                    None => Err(FolioError::not_found("Document not found")),
                };
                let changed = matches!(res, Ok(true));
                _ = reply.send(res.map(|_| ()));
                if changed {
                    self.broadcast(&id);
                }
            }
            StoreMessage::Remove { id, reply } => {
                trace!("store: remove {}", id);
                let existed = self.documents.remove(&id).is_some();
                _ = reply.send(());
                if existed {
                    self.broadcast(&id);
                }
            }
        }
    }

    fn broadcast(&mut self, id: &str) {
        let snapshot = self.documents.get(id).cloned();
        self.subscribers.retain(|_, subscriber| {
            subscriber.id != id || subscriber.sender.send(snapshot.clone()).is_ok()
        });
    }
}

/// In-process store with the same observable behavior as the remote one
#[derive(Clone)]
pub struct MemoryStore {
    sender: mpsc::UnboundedSender<StoreMessage>,
    supervisor: Supervisor,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new("store");
        let mut actor = StoreActor::new(receiver);
        supervisor.spawn(async move { actor.run().await });
        Self { sender, supervisor }
    }

    pub fn shutdown(&self) {
        self.supervisor.stop();
    }

    pub fn is_running(&self) -> bool {
        !self.supervisor.is_exited()
    }

    async fn request<T>(
        &self,
        msg: impl FnOnce(oneshot::Sender<T>) -> StoreMessage,
    ) -> Result<T, FolioError> {
        let (sender, receiver) = oneshot::channel();
        self.sender
            .send(msg(sender))
            .map_err(|_| FolioError::persistence("Store is not running"))?;
        receiver
            .await
            .map_err(|_| FolioError::persistence("Store is not running"))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn subscribe(&self, id: &str) -> Result<Subscription, FolioError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let key = self
            .request(|reply| StoreMessage::Subscribe {
                id: id.to_string(),
                sender,
                reply,
            })
            .await?;
        let store = self.sender.clone();
        let on_release: ReleaseCallback = Box::new(move || {
            _ = store.send(StoreMessage::Unsubscribe { subscriber: key });
        });
        Ok(Subscription::new(id.to_string(), receiver, Some(on_release)))
    }

    async fn read_once(&self, id: &str) -> Result<Option<Document>, FolioError> {
        self.request(|reply| StoreMessage::Get {
            id: id.to_string(),
            reply,
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Document>, FolioError> {
        self.request(|reply| StoreMessage::List { reply }).await
    }

    async fn write_full(&self, id: &str, doc: &Document) -> Result<(), FolioError> {
        self.request(|reply| StoreMessage::Write {
            id: id.to_string(),
            doc: doc.clone(),
            reply,
        })
        .await
    }

    async fn patch(&self, id: &str, patch: DocumentPatch) -> Result<(), FolioError> {
        self.request(|reply| StoreMessage::Patch {
            id: id.to_string(),
            patch,
            reply,
        })
        .await?
    }

    async fn create_unique(&self, parent: &str) -> Result<String, FolioError> {
        let id = new_id();
        trace!("store: allocated {}/{}", parent, id);
        Ok(id)
    }

    async fn remove(&self, id: &str) -> Result<(), FolioError> {
        self.request(|reply| StoreMessage::Remove {
            id: id.to_string(),
            reply,
        })
        .await
    }
}
