use std::sync::Arc;

use log::trace;
use tokio::time::Duration;

use crate::actors::editor::EditorHandle;
use crate::auth::IdentitySession;
use crate::config::FolioConfig;
use crate::error::FolioError;
use crate::permissions::{AccessPolicy, Action};
use crate::store::{DocumentStore, RemoteStore, FILES};
use crate::types::{Document, DocumentPatch};

/// Entry point of the crate: document lifecycle and access management on
/// top of an injected store and identity session.
#[derive(Clone)]
pub struct Workspace {
    store: Arc<dyn DocumentStore>,
    session: Arc<dyn IdentitySession>,
    debounce: Duration,
}

impl Workspace {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        session: Arc<dyn IdentitySession>,
        debounce: Duration,
    ) -> Self {
        Self {
            store,
            session,
            debounce,
        }
    }

    /// Workspace backed by the remote store named in `config`
    pub fn connect(config: &FolioConfig, session: Arc<dyn IdentitySession>) -> Self {
        let store = Arc::new(RemoteStore::new(&config.store, session.clone()));
        Self::new(store, session, config.debounce())
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    fn identity(&self) -> Result<String, FolioError> {
        self.session
            .email()
            .ok_or_else(|| FolioError::access_denied("Not signed in"))
    }

    async fn fetch(&self, id: &str) -> Result<Document, FolioError> {
        self.store
            .read_once(id)
            .await?
            .ok_or_else(|| FolioError::not_found("Document not found"))
    }

    pub async fn create_document(&self, file_name: &str) -> Result<Document, FolioError> {
        let creator = self.identity()?;
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return Err(FolioError::bad_request("File name is empty"));
        }
        let id = self.store.create_unique(FILES).await?;
        let doc = Document::new(id.clone(), file_name.to_string(), creator);
        self.store.write_full(&id, &doc).await?;
        trace!("workspace: created {} ({})", id, file_name);
        Ok(doc)
    }

    /// Point read that only returns documents the current identity may read
    pub async fn get_document(&self, id: &str) -> Result<Document, FolioError> {
        let identity = self.identity()?;
        let doc = self.fetch(id).await?;
        AccessPolicy::of(&doc).check(Some(&identity), Action::Read)?;
        Ok(doc)
    }

    /// Documents the current identity may open, ordered by file name
    pub async fn list_documents(&self) -> Result<Vec<Document>, FolioError> {
        let identity = self.identity()?;
        let mut docs: Vec<Document> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|doc| AccessPolicy::of(doc).can_access(&identity))
            .collect();
        docs.sort_by(|a, b| a.file_name.cmp(&b.file_name).then_with(|| a.id.cmp(&b.id)));
        trace!("workspace: {} documents visible to {}", docs.len(), identity);
        Ok(docs)
    }

    pub async fn delete_document(&self, id: &str) -> Result<(), FolioError> {
        let identity = self.identity()?;
        let doc = self.fetch(id).await?;
        AccessPolicy::of(&doc).check(Some(&identity), Action::Delete)?;
        self.store.remove(id).await?;
        trace!("workspace: deleted {}", id);
        Ok(())
    }

    pub async fn add_allowed_user(
        &self,
        id: &str,
        user: &str,
    ) -> Result<Vec<String>, FolioError> {
        let user = user.trim();
        if user.is_empty() {
            return Err(FolioError::bad_request("User is empty"));
        }
        let doc = self.fetch_for_management(id).await?;
        let mut users = doc.allowed_users;
        if users.iter().any(|u| u == user) {
            return Ok(users);
        }
        users.push(user.to_string());
        self.store
            .patch(id, DocumentPatch::allowed_users(users.clone()))
            .await?;
        trace!("workspace: {} shared with {}", id, user);
        Ok(users)
    }

    pub async fn remove_allowed_user(
        &self,
        id: &str,
        user: &str,
    ) -> Result<Vec<String>, FolioError> {
        let doc = self.fetch_for_management(id).await?;
        if user == doc.creator {
            return Err(FolioError::unprocessable(
                "Creator can't be removed from the document",
            ));
        }
        let mut users = doc.allowed_users;
        let len = users.len();
        users.retain(|u| u != user);
        if users.len() == len {
            return Ok(users);
        }
        self.store
            .patch(id, DocumentPatch::allowed_users(users.clone()))
            .await?;
        trace!("workspace: {} unshared with {}", id, user);
        Ok(users)
    }

    async fn fetch_for_management(&self, id: &str) -> Result<Document, FolioError> {
        let identity = self.identity()?;
        let doc = self.fetch(id).await?;
        AccessPolicy::of(&doc).check(Some(&identity), Action::ManageAccess)?;
        Ok(doc)
    }

    /// Opens an editing session, access is decided once the document loads
    pub fn open(&self, id: &str) -> EditorHandle {
        EditorHandle::new(
            id.to_string(),
            self.store.clone(),
            self.session.clone(),
            self.debounce,
        )
    }
}
