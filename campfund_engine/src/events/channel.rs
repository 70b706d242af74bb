//! In-process publish/subscribe for engine signals.
//!
//! An [`EventHandler`] owns the receiving end of a bounded channel and runs one async callback per event. Any number of
//! [`EventProducer`]s can feed it. Handlers are stateless: they see the event and nothing else, so a slow or failing
//! subscriber can never hold up or roll back the ledger work that raised the event.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, listener) = mpsc::channel(buffer_size);
        Self { listener, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until every producer has been dropped, then waits for in-flight callbacks before returning.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // Only producers may keep the channel open
        drop(self.sender);
        let mut jobs = JoinSet::new();
        loop {
            tokio::select! {
                event = self.listener.recv() => match event {
                    Some(event) => {
                        trace!("📬️ Handling event");
                        let handler = Arc::clone(&self.handler);
                        jobs.spawn(async move { (handler)(event).await });
                    },
                    None => break,
                },
                Some(result) = jobs.join_next(), if !jobs.is_empty() => log_join_result(result),
            }
        }
        debug!("📬️ All producers are gone. Waiting for {} callbacks to finish", jobs.len());
        while let Some(result) = jobs.join_next().await {
            log_join_result(result);
        }
        debug!("📬️ Event handler has shut down");
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => trace!("📬️ Event handled"),
        Err(e) => warn!("📬️ An event callback did not run to completion. {e}"),
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }
}
