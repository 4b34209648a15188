use std::sync::Arc;

use log::trace;
use tokio::select;
use tokio::sync::{watch, Notify};

/// Owns the lifetime of one spawned actor task: it can be stopped from
/// outside and awaited until it has fully exited.
#[derive(Clone)]
pub struct Supervisor {
    name: Arc<str>,
    stop: Arc<Notify>,
    exited: Arc<watch::Sender<bool>>,
}

impl Supervisor {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let (exited, _) = watch::channel(false);
        Self {
            name: name.into(),
            stop: Arc::new(Notify::new()),
            exited: Arc::new(exited),
        }
    }

    pub fn spawn<T>(&self, task: T)
    where
        T: std::future::Future + Send + 'static,
    {
        let name = self.name.clone();
        let stop = self.stop.clone();
        let exited = self.exited.clone();
        tokio::spawn(async move {
            select! {
                _ = task => {},
                () = stop.notified() => {
                    trace!("{}: stopped", name);
                },
            }
            exited.send_replace(true);
        });
    }

    /// Stops the task, a stop requested before the task first runs is kept
    pub fn stop(&self) {
        self.stop.notify_one();
    }

    pub fn is_exited(&self) -> bool {
        *self.exited.borrow()
    }

    pub async fn exited(&self) {
        let mut receiver = self.exited.subscribe();
        _ = receiver.wait_for(|exited| *exited).await;
    }
}
