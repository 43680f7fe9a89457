use std::fmt::Debug;

use tokio::sync::broadcast::{self, error::RecvError};

//Fan-out to every listener. A listener that falls behind loses the oldest events.
pub struct EventBus<T> {
    tx: broadcast::Sender<T>,
}

#[derive(Clone)]
pub struct EventEmitter<T>(broadcast::Sender<T>);

pub struct EventListener<T> {
    rx: broadcast::Receiver<T>,
    skipped: u64,
}

impl<T: Clone + Debug> EventBus<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
        }
    }

    pub fn subscribe(&self) -> EventListener<T> {
        EventListener {
            rx: self.tx.subscribe(),
            skipped: 0,
        }
    }

    pub fn emitter(&self) -> EventEmitter<T> {
        EventEmitter(self.tx.clone())
    }
}

impl<T: Clone + Debug> EventEmitter<T> {
    //Number of listeners the event was handed to
    pub fn send(&self, event: T) -> usize {
        let topic = std::any::type_name::<T>();

        self.0.send(event).unwrap_or_else(|broadcast::error::SendError(event)| {
            tracing::debug!("Dropping {} event without listener: {:?}", topic, event);
            0
        })
    }
}

impl<T: Clone> EventListener<T> {
    //None once the bus and all emitters are dropped
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(count)) => {
                    self.skipped += count;
                    tracing::warn!(
                        "Listener for {} events fell behind, skipped {} ({} in total)",
                        std::any::type_name::<T>(),
                        count,
                        self.skipped
                    );
                }
                Err(RecvError::Closed) => {
                    tracing::info!("Event bus of {} closed", std::any::type_name::<T>());
                    return None;
                }
            }
        }
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
