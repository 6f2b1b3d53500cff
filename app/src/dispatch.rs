//! Runs advisor requests off the UI thread and queues their replies.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use wavespeed_core::AdvisorRequest;
use wavespeed_suggest::{Advisor, AdvisorError};

use crate::panel::{AdvisorReply, RequestToken};

/// Spawns one task per request. Replies arrive on the receiver returned by
/// [`Dispatcher::new`], which the UI loop drains. Every submitted request gets
/// exactly one reply, even if its worker panics or its request has since gone
/// stale; the panel decides what to keep.
#[derive(Clone)]
pub struct Dispatcher {
    advisor: Arc<Advisor>,
    handle: Handle,
    tx: UnboundedSender<AdvisorReply>,
}

impl Dispatcher {
    pub fn new(advisor: Arc<Advisor>, handle: Handle) -> (Self, UnboundedReceiver<AdvisorReply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { advisor, handle, tx }, rx)
    }

    pub fn submit(&self, token: RequestToken, request: AdvisorRequest) -> JoinHandle<()> {
        let advisor = Arc::clone(&self.advisor);
        let tx = self.tx.clone();
        let worker = self.handle.spawn(async move { advisor.improve(&request).await });
        self.handle.spawn(async move {
            let outcome = match worker.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(generation = token.generation, error = %e, "advisor worker died");
                    Err(AdvisorError::Interrupted(e.to_string()))
                }
            };
            if tx.send(AdvisorReply { token, outcome }).is_err() {
                tracing::debug!(generation = token.generation, "UI queue closed, reply discarded");
            }
        })
    }
}
