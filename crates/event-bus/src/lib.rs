use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    /// Publishes to every live subscriber and returns how many received it.
    /// Publishing with nobody listening is not an error.
    fn publish(&self, event: E) -> usize;
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// Broadcast bus backed by a tokio channel. Slow subscribers lag rather than
/// block publishers.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    fn publish(&self, event: E) -> usize {
        match self.sender.send(event) {
            Ok(delivered) => delivered,
            Err(broadcast::error::SendError(event)) => {
                trace!(?event, "event dropped, no subscribers");
                0
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = InMemoryBus::<u32>::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.publish(7), 1);
        assert_eq!(rx.recv().await.unwrap(), 7);
    }

    #[test]
    fn publishing_without_subscribers_is_not_an_error() {
        let bus = InMemoryBus::<&'static str>::new(4);
        assert_eq!(bus.publish("lost"), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
