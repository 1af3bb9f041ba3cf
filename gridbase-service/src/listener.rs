//! Queue listener.
//!
//! Connects to the broker, retrying on a fixed delay until it succeeds, then
//! consumes one delivery at a time: process, publish the reply, acknowledge.
//! A stop signal halts the loop between deliveries; the delivery being
//! processed always completes.

use crate::config::TransportConfig;
use crate::handler::GridService;
use crate::transport::{Delivery, Transport};
use gridbase_core::TransportError;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Requests a [`QueueListener`] to stop.
#[derive(Debug, Clone)]
pub struct StopHandle {
    sender: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        // receivers may already be gone once the listener finished
        let _ = self.sender.send(true);
    }
}

pub struct QueueListener<T: Transport> {
    transport: T,
    service: GridService,
    queue_name: String,
    retry_delay: Duration,
    stop: watch::Receiver<bool>,
    processed: u64,
}

impl<T: Transport> QueueListener<T> {
    pub fn new(
        transport: T,
        service: GridService,
        queue_name: impl Into<String>,
        retry_delay: Duration,
    ) -> (Self, StopHandle) {
        let (sender, stop) = watch::channel(false);
        (
            Self {
                transport,
                service,
                queue_name: queue_name.into(),
                retry_delay,
                stop,
                processed: 0,
            },
            StopHandle { sender },
        )
    }

    pub fn from_config(
        transport: T,
        service: GridService,
        config: &TransportConfig,
    ) -> (Self, StopHandle) {
        Self::new(transport, service, config.queue_name.clone(), config.retry_delay)
    }

    pub fn service(&self) -> &GridService {
        &self.service
    }

    pub fn into_service(self) -> GridService {
        self.service
    }

    /// Deliveries processed so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    /// Connect, retrying indefinitely until the stop signal is raised.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        let mut attempt: u32 = 0;
        loop {
            if self.stop_requested() {
                info!(queue = %self.queue_name, attempts = attempt, "Connection loop interrupted");
                return Err(TransportError::Interrupted);
            }
            attempt += 1;
            match self.transport.connect().await {
                Ok(()) => {
                    info!(queue = %self.queue_name, attempts = attempt, "Connected to broker");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        queue = %self.queue_name,
                        attempt,
                        retry_in_ms = self.retry_delay.as_millis() as u64,
                        error = %e,
                        "Broker unreachable, retrying"
                    );
                    let delay = self.retry_delay;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        changed = self.stop.changed() => {
                            // no stop handle left: only the delay applies
                            if changed.is_err() {
                                tokio::time::sleep(delay).await;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Connect and consume until stopped or the channel closes.
    pub async fn run(&mut self) -> Result<(), TransportError> {
        self.connect().await?;
        info!(queue = %self.queue_name, "Waiting for messages");

        let mut stoppable = true;
        loop {
            if self.stop_requested() {
                info!(queue = %self.queue_name, processed = self.processed, "Listener stopped");
                return Ok(());
            }
            let delivery = tokio::select! {
                changed = self.stop.changed(), if stoppable => {
                    if changed.is_err() {
                        stoppable = false;
                    }
                    continue;
                }
                delivery = self.transport.receive() => delivery?,
            };
            match delivery {
                Some(delivery) => self.process(delivery).await?,
                None => {
                    info!(queue = %self.queue_name, processed = self.processed, "Queue closed");
                    return Ok(());
                }
            }
        }
    }

    async fn process(&mut self, delivery: Delivery) -> Result<(), TransportError> {
        let reply = self
            .service
            .process_body(&delivery.body, delivery.correlation_id.clone())
            .await;

        if let Some(reply_to) = delivery.reply_to.as_deref() {
            let body = serde_json::to_vec(&reply).map_err(|e| TransportError::PublishFailed {
                reason: e.to_string(),
            })?;
            self.transport
                .publish(reply_to, delivery.correlation_id.as_deref(), body)
                .await?;
        }
        self.transport.ack(delivery.tag).await?;
        self.processed += 1;
        debug!(
            tag = delivery.tag,
            status = ?reply.status,
            command = reply.command.as_deref().unwrap_or(""),
            "Delivery acknowledged"
        );
        Ok(())
    }
}

impl<T: Transport> std::fmt::Debug for QueueListener<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueListener")
            .field("queue_name", &self.queue_name)
            .field("retry_delay", &self.retry_delay)
            .field("processed", &self.processed)
            .finish()
    }
}
