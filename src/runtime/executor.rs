//! Bot event loop

use super::traits::TransportError;
use crate::chat::{InboundEvent, UserId};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Pause before polling again after a failed poll
const POLL_BACKOFF: Duration = Duration::from_secs(3);

/// Upper bound on waiting for in-flight handlers at shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Where inbound events come from
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Wait for the next batch; an empty batch is a normal poll timeout
    async fn next_batch(&self) -> Result<Vec<InboundEvent>, TransportError>;
}

/// Whatever consumes events; handlers never fail past this boundary
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: InboundEvent);
}

#[async_trait]
impl EventHandler for crate::dispatcher::Dispatcher {
    async fn handle(&self, event: InboundEvent) {
        self.dispatch(event).await;
    }
}

#[async_trait]
impl<T: EventSource + ?Sized> EventSource for Arc<T> {
    async fn next_batch(&self) -> Result<Vec<InboundEvent>, TransportError> {
        (**self).next_batch().await
    }
}

fn actor_of(event: &InboundEvent) -> Option<UserId> {
    match event {
        InboundEvent::Text(m) => Some(m.actor.id),
        InboundEvent::Button(b) => Some(b.actor.id),
        InboundEvent::Membership(_) => None,
    }
}

fn kind_of(event: &InboundEvent) -> &'static str {
    match event {
        InboundEvent::Text(_) => "text",
        InboundEvent::Button(_) => "button",
        InboundEvent::Membership(_) => "membership",
    }
}

/// Polls a source and runs every event on its own task, so a slow handler
/// in one conversation never holds up the others
pub struct BotRuntime<S, H>
where
    S: EventSource + 'static,
    H: EventHandler + ?Sized + 'static,
{
    source: S,
    handler: Arc<H>,
    shutdown: CancellationToken,
    tasks: JoinSet<()>,
    backoff: Duration,
}

impl<S, H> BotRuntime<S, H>
where
    S: EventSource + 'static,
    H: EventHandler + ?Sized + 'static,
{
    pub fn new(source: S, handler: Arc<H>, shutdown: CancellationToken) -> Self {
        Self {
            source,
            handler,
            shutdown,
            tasks: JoinSet::new(),
            backoff: POLL_BACKOFF,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("Starting bot runtime");

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                batch = self.source.next_batch() => match batch {
                    Ok(events) => {
                        for event in events {
                            self.spawn(event);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Polling for updates failed");
                        tokio::select! {
                            () = self.shutdown.cancelled() => break,
                            () = tokio::time::sleep(self.backoff) => {}
                        }
                    }
                },
            }
            self.reap();
        }

        tracing::info!(in_flight = self.tasks.len(), "Stopping bot runtime");
        let drain = async { while self.tasks.join_next().await.is_some() {} };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            tracing::warn!("Handlers still running at shutdown; aborting them");
            self.tasks.abort_all();
        }
        tracing::info!("Bot runtime stopped");
    }

    fn spawn(&mut self, event: InboundEvent) {
        let span = tracing::info_span!(
            "event",
            event_id = %uuid::Uuid::new_v4(),
            kind = kind_of(&event),
            chat_id = event.conversation().id,
            user_id = actor_of(&event),
        );
        let handler = Arc::clone(&self.handler);
        self.tasks.spawn(
            async move {
                tracing::debug!("Handling event");
                handler.handle(event).await;
            }
            .instrument(span),
        );
    }

    /// Collect finished handlers; a panicking handler is logged and forgotten
    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                tracing::error!(error = %e, "Event handler panicked");
            }
        }
    }
}
