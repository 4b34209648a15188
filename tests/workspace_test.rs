mod common;

use std::sync::Arc;

use common::{seed, workspace, RecordingStore, DEBOUNCE};
use folio::protocol::ErrorCode;
use folio::store::DocumentStore;
use folio::{Session, Workspace};

const A: &str = "a@example.com";
const B: &str = "b@example.com";
const C: &str = "c@example.com";

#[tokio::test]
async fn create_document_owned_by_creator() {
    common::init_logging();
    let store = RecordingStore::new();
    let doc = workspace(&store, A)
        .create_document("  Meeting notes ")
        .await
        .unwrap();
    assert_eq!(doc.file_name, "Meeting notes");
    assert_eq!(doc.creator, A);
    assert_eq!(doc.allowed_users, vec![A.to_string()]);
    assert_eq!(doc.content, "");
    assert!(doc.version_history.is_empty());

    let stored = store.read_once(&doc.id).await.unwrap().unwrap();
    assert_eq!(stored, doc);
}

#[tokio::test]
async fn create_document_rejects_blank_name() {
    let store = RecordingStore::new();
    let err = workspace(&store, A)
        .create_document("   ")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::BadRequest);
}

#[tokio::test]
async fn create_document_requires_identity() {
    let store = RecordingStore::new();
    let anonymous = Workspace::new(store.clone(), Arc::new(Session::anonymous()), DEBOUNCE);
    let err = anonymous.create_document("notes").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);
}

#[tokio::test]
async fn get_document_checks_access() {
    let store = RecordingStore::new();
    let doc = seed(&store, A, "private", Vec::new()).await;

    let own = workspace(&store, A).get_document(&doc.id).await.unwrap();
    assert_eq!(own.content, "private");

    let err = workspace(&store, B).get_document(&doc.id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);

    let err = workspace(&store, A).get_document("missing").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn share_and_unshare() {
    let store = RecordingStore::new();
    let a = workspace(&store, A);
    let doc = a.create_document("notes").await.unwrap();

    let users = a.add_allowed_user(&doc.id, B).await.unwrap();
    assert_eq!(users, vec![A.to_string(), B.to_string()]);
    // adding twice is a no-op
    let users = a.add_allowed_user(&doc.id, B).await.unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(store.patches().len(), 1);

    let shared = workspace(&store, B).get_document(&doc.id).await.unwrap();
    assert_eq!(shared.id, doc.id);

    let users = a.remove_allowed_user(&doc.id, B).await.unwrap();
    assert_eq!(users, vec![A.to_string()]);
    let err = workspace(&store, B).get_document(&doc.id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);

    // removing someone without access changes nothing
    let users = a.remove_allowed_user(&doc.id, C).await.unwrap();
    assert_eq!(users, vec![A.to_string()]);
    assert_eq!(store.patches().len(), 2);
}

#[tokio::test]
async fn creator_cannot_be_removed() {
    let store = RecordingStore::new();
    let a = workspace(&store, A);
    let doc = a.create_document("notes").await.unwrap();
    let err = a.remove_allowed_user(&doc.id, A).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Unprocessable);
    let stored = store.read_once(&doc.id).await.unwrap().unwrap();
    assert_eq!(stored.allowed_users, vec![A.to_string()]);
}

#[tokio::test]
async fn only_creator_manages_access() {
    let store = RecordingStore::new();
    let a = workspace(&store, A);
    let doc = a.create_document("notes").await.unwrap();
    a.add_allowed_user(&doc.id, B).await.unwrap();

    let b = workspace(&store, B);
    let err = b.add_allowed_user(&doc.id, C).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);
    let err = b.remove_allowed_user(&doc.id, B).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);
    let err = b.delete_document(&doc.id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);
    assert!(store.read_once(&doc.id).await.unwrap().is_some());
}

#[tokio::test]
async fn blank_user_is_rejected() {
    let store = RecordingStore::new();
    let a = workspace(&store, A);
    let doc = a.create_document("notes").await.unwrap();
    let err = a.add_allowed_user(&doc.id, " ").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::BadRequest);
}

#[tokio::test]
async fn creator_deletes_document() {
    let store = RecordingStore::new();
    let a = workspace(&store, A);
    let doc = a.create_document("notes").await.unwrap();
    a.delete_document(&doc.id).await.unwrap();
    assert!(store.read_once(&doc.id).await.unwrap().is_none());

    let err = a.delete_document(&doc.id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn store_failures_surface_as_persistence_errors() {
    let store = RecordingStore::new();
    let a = workspace(&store, A);
    let doc = a.create_document("notes").await.unwrap();

    store.set_failing(true);
    let err = a.add_allowed_user(&doc.id, B).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::PersistenceFailed);
    let err = a.create_document("other").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::PersistenceFailed);
}

#[tokio::test]
async fn list_shows_only_accessible_documents() {
    let store = RecordingStore::new();
    let a = workspace(&store, A);
    let b = workspace(&store, B);
    let plans = a.create_document("plans").await.unwrap();
    let agenda = a.create_document("agenda").await.unwrap();
    let diary = b.create_document("diary").await.unwrap();
    a.add_allowed_user(&plans.id, B).await.unwrap();

    let names = |docs: Vec<folio::Document>| -> Vec<String> {
        docs.into_iter().map(|doc| doc.file_name).collect()
    };
    assert_eq!(names(a.list_documents().await.unwrap()), vec!["agenda", "plans"]);
    assert_eq!(names(b.list_documents().await.unwrap()), vec!["diary", "plans"]);
    assert!(workspace(&store, C).list_documents().await.unwrap().is_empty());

    a.delete_document(&agenda.id).await.unwrap();
    assert_eq!(names(a.list_documents().await.unwrap()), vec!["plans"]);
    let listed = b.list_documents().await.unwrap();
    assert_eq!(listed[0].id, diary.id);

    let anonymous = Workspace::new(store.clone(), Arc::new(Session::anonymous()), DEBOUNCE);
    let err = anonymous.list_documents().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);
}
