use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use log::{trace, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::actors::supervisor::Supervisor;
use crate::auth::IdentitySession;
use crate::config::StoreConfig;
use crate::error::{internal_error, persistence_error, FolioError};
use crate::protocol::{EventStreamParser, StoreEvent};
use crate::store::{new_id, DocumentStore, ReleaseCallback, Snapshot, Subscription};
use crate::types::{Document, DocumentPatch};

/// Client of a realtime key-value store speaking the REST dialect:
/// `{url}/{namespace}/{id}.json` with GET, PUT, PATCH and DELETE, and
/// streaming reads over server-sent events.
///
/// `patch` is not conditional: a field write that lands after the record was
/// deleted recreates it with only that field. Editor sessions remove such
/// creator-less records when they observe them.
pub struct RemoteStore {
    client: reqwest::Client,
    url: String,
    namespace: String,
    session: Arc<dyn IdentitySession>,
}

impl RemoteStore {
    pub fn new(config: &StoreConfig, session: Arc<dyn IdentitySession>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            session,
        }
    }

    fn record_url(&self, id: &str) -> String {
        self.url_for(&format!("{}/{}", self.namespace, id))
    }

    fn url_for(&self, path: &str) -> String {
        let mut url = format!("{}/{}.json", self.url, path);
        if let Some(token) = self.session.current().and_then(|i| i.id_token) {
            url.push_str("?auth=");
            url.push_str(&token);
        }
        url
    }

    async fn send_json(
        &self,
        method: reqwest::Method,
        id: &str,
        body: String,
    ) -> Result<(), FolioError> {
        let res = self
            .client
            .request(method, self.record_url(id))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(persistence_error)?;
        check_status(res)?;
        Ok(())
    }
}

fn check_status(res: Response) -> Result<Response, FolioError> {
    match res.status() {
        status if status.is_success() => Ok(res),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(FolioError::access_denied("Permission denied"))
        }
        StatusCode::NOT_FOUND => Err(FolioError::not_found("Document not found")),
        status => Err(FolioError::persistence(&format!(
            "Store responded with {}",
            status
        ))),
    }
}

async fn stream_snapshots(
    id: String,
    res: Response,
    sender: mpsc::UnboundedSender<Snapshot>,
) {
    trace!("stream-{}: open", id);
    let mut parser = EventStreamParser::new();
    let mut root = Value::Null;
    let mut body = res.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!("stream-{}: connection lost: {}", id, err);
                return;
            }
        };
        for event in parser.feed(&chunk) {
            let change = match StoreEvent::parse(&event) {
                Ok(Some(change)) => change,
                Ok(None) => continue,
                Err(err) => {
                    warn!("stream-{}: malformed event: {}", id, err);
                    continue;
                }
            };
            match change {
                StoreEvent::KeepAlive => continue,
                StoreEvent::Cancel(reason) => {
                    warn!("stream-{}: cancelled by store: {}", id, reason);
                    return;
                }
                StoreEvent::AuthRevoked => {
                    warn!("stream-{}: credentials revoked", id);
                    return;
                }
                change => {
                    change.apply(&mut root);
                }
            }
            match Document::from_value(&id, root.clone()) {
                Ok(snapshot) => {
                    if sender.send(snapshot).is_err() {
                        return;
                    }
                }
                Err(err) => warn!("stream-{}: undecodable record: {}", id, err),
            }
        }
    }
    trace!("stream-{}: closed", id);
}

#[async_trait]
impl DocumentStore for RemoteStore {
    async fn subscribe(&self, id: &str) -> Result<Subscription, FolioError> {
        let res = self
            .client
            .get(self.record_url(id))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(persistence_error)?;
        let res = check_status(res)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(format!("stream-{}", id));
        let doc_id = id.to_string();
        supervisor.spawn(async move { stream_snapshots(doc_id, res, sender).await });
        let on_release: ReleaseCallback = Box::new(move || supervisor.stop());
        Ok(Subscription::new(id.to_string(), receiver, Some(on_release)))
    }

    async fn read_once(&self, id: &str) -> Result<Option<Document>, FolioError> {
        let res = self
            .client
            .get(self.record_url(id))
            .send()
            .await
            .map_err(persistence_error)?;
        let text = check_status(res)?
            .text()
            .await
            .map_err(persistence_error)?;
        let value: Value = serde_json::from_str(&text).map_err(internal_error)?;
        Document::from_value(id, value).map_err(internal_error)
    }

    async fn list(&self) -> Result<Vec<Document>, FolioError> {
        let res = self
            .client
            .get(self.url_for(&self.namespace))
            .send()
            .await
            .map_err(persistence_error)?;
        let text = check_status(res)?
            .text()
            .await
            .map_err(persistence_error)?;
        let value: Value = serde_json::from_str(&text).map_err(internal_error)?;
        let Value::Object(records) = value else {
            return Ok(Vec::new());
        };
        let mut docs = Vec::with_capacity(records.len());
        for (id, record) in records {
            match Document::from_value(&id, record) {
                Ok(Some(doc)) => docs.push(doc),
                Ok(None) => {}
                Err(err) => warn!("store: skipping undecodable record {}: {}", id, err),
            }
        }
        Ok(docs)
    }

    async fn write_full(&self, id: &str, doc: &Document) -> Result<(), FolioError> {
        let body = serde_json::to_string(doc).map_err(internal_error)?;
        self.send_json(reqwest::Method::PUT, id, body).await
    }

    async fn patch(&self, id: &str, patch: DocumentPatch) -> Result<(), FolioError> {
        let body = serde_json::to_string(&patch).map_err(internal_error)?;
        self.send_json(reqwest::Method::PATCH, id, body).await
    }

    async fn create_unique(&self, parent: &str) -> Result<String, FolioError> {
        let id = new_id();
        trace!("store: allocated {}/{}", parent, id);
        Ok(id)
    }

    async fn remove(&self, id: &str) -> Result<(), FolioError> {
        let res = self
            .client
            .delete(self.record_url(id))
            .send()
            .await
            .map_err(persistence_error)?;
        check_status(res)?;
        Ok(())
    }
}
