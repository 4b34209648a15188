use crate::error::FolioError;
use crate::types::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Update,
    ManageAccess,
    Delete,
}

/// Access decisions for a single already-fetched document.
///
/// The creator may do everything; members of the allow-list may read and
/// update; nobody else may do anything.
pub struct AccessPolicy<'a> {
    creator: &'a str,
    allowed_users: &'a [String],
}

impl<'a> AccessPolicy<'a> {
    pub fn of(doc: &'a Document) -> Self {
        Self {
            creator: &doc.creator,
            allowed_users: &doc.allowed_users,
        }
    }

    pub fn can_access(&self, identity: &str) -> bool {
        identity == self.creator
            || self.allowed_users.iter().any(|user| user == identity)
    }

    pub fn can_manage(&self, identity: &str) -> bool {
        identity == self.creator
    }

    pub fn allows(&self, identity: Option<&str>, action: Action) -> bool {
        let Some(identity) = identity else {
            return false;
        };
        match action {
            Action::Read | Action::Update => self.can_access(identity),
            Action::ManageAccess | Action::Delete => self.can_manage(identity),
        }
    }

    pub fn check(
        &self,
        identity: Option<&str>,
        action: Action,
    ) -> Result<(), FolioError> {
        if self.allows(identity, action) {
            return Ok(());
        }
        let msg = match (identity, action) {
            (None, _) => "Not signed in",
            (Some(_), Action::Read | Action::Update) => {
                "No access to this document"
            }
            (Some(_), Action::ManageAccess) => {
                "Only the creator can change who has access"
            }
            (Some(_), Action::Delete) => "Only the creator can delete",
        };
        Err(FolioError::access_denied(msg))
    }
}

pub fn can_access(doc: &Document, identity: &str) -> bool {
    AccessPolicy::of(doc).can_access(identity)
}

pub fn can_manage(doc: &Document, identity: &str) -> bool {
    AccessPolicy::of(doc).can_manage(identity)
}
