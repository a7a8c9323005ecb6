use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::workflows::booking::repository::{Notification, NotificationDispatcher};

enum OutboxMessage {
    Deliver(Notification),
    Flush(mpsc::Sender<()>),
}

/// Fire-and-forget delivery queue drained by a dedicated worker thread.
///
/// Dispatch failures are logged and dropped; the transition that produced the
/// notification has already been committed by the time the worker sees it.
pub struct NotificationOutbox {
    sender: mpsc::Sender<OutboxMessage>,
}

impl NotificationOutbox {
    pub fn spawn(dispatcher: Arc<dyn NotificationDispatcher>) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<OutboxMessage>();

        thread::Builder::new()
            .name("booking-notifications".to_string())
            .spawn(move || {
                for message in receiver {
                    match message {
                        OutboxMessage::Deliver(notification) => {
                            deliver(dispatcher.as_ref(), &notification)
                        }
                        OutboxMessage::Flush(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
                debug!("notification outbox closed");
            })?;

        Ok(Self { sender })
    }

    /// Queue a notification. Returns `false` when the worker is gone.
    pub fn enqueue(&self, notification: Notification) -> bool {
        match self.sender.send(OutboxMessage::Deliver(notification)) {
            Ok(()) => true,
            Err(mpsc::SendError(OutboxMessage::Deliver(lost))) => {
                warn!(
                    key = %lost.idempotency_key,
                    template = %lost.template,
                    "notification outbox closed; dropping notification"
                );
                false
            }
            Err(_) => false,
        }
    }

    /// Block until everything queued before this call has been handed to the dispatcher.
    pub fn flush(&self) {
        let (ack_sender, ack_receiver) = mpsc::channel();
        if self.sender.send(OutboxMessage::Flush(ack_sender)).is_ok() {
            let _ = ack_receiver.recv();
        }
    }
}

fn deliver(dispatcher: &dyn NotificationDispatcher, notification: &Notification) {
    match dispatcher.dispatch(notification) {
        Ok(()) => debug!(
            recipient = %notification.recipient,
            role = %notification.role,
            template = %notification.template,
            key = %notification.idempotency_key,
            "notification dispatched"
        ),
        Err(err) => warn!(
            recipient = %notification.recipient,
            role = %notification.role,
            template = %notification.template,
            key = %notification.idempotency_key,
            error = %err,
            "notification dispatch failed"
        ),
    }
}
