//! Process-local interrupt notifications
//!
//! An interrupt asks every live run to stop at its next checkpoint. Runs
//! that are idle when the notification arrives ignore it.

use once_cell::sync::Lazy;
use tokio::sync::broadcast::{self, error::TryRecvError};

const CHANNEL_CAPACITY: usize = 16;

static GLOBAL_BUS: Lazy<InterruptBus> = Lazy::new(InterruptBus::new);

#[derive(Debug, Clone)]
pub struct InterruptBus {
    sender: broadcast::Sender<()>,
}

impl InterruptBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// The bus shared by every orchestrator in this process
    pub fn global() -> InterruptBus {
        GLOBAL_BUS.clone()
    }

    /// Notify every subscriber, returns how many were listening
    pub fn publish(&self) -> usize {
        self.sender.send(()).unwrap_or(0)
    }

    pub fn subscribe(&self) -> InterruptListener {
        InterruptListener {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for InterruptBus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct InterruptListener {
    receiver: broadcast::Receiver<()>,
}

impl InterruptListener {
    /// Drain pending notifications; true if at least one arrived
    pub fn take_pending(&mut self) -> bool {
        let mut seen = false;
        loop {
            match self.receiver.try_recv() {
                Ok(()) | Err(TryRecvError::Lagged(_)) => seen = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return seen,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listener_sees_an_interrupt() {
        let bus = InterruptBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        assert_eq!(bus.publish(), 2);
        assert!(a.take_pending());
        assert!(b.take_pending());
        assert!(!a.take_pending());
    }

    #[test]
    fn test_burst_is_seen_once_and_overflow_still_counts() {
        let bus = InterruptBus::new();
        let mut listener = bus.subscribe();
        for _ in 0..CHANNEL_CAPACITY * 2 {
            bus.publish();
        }
        assert!(listener.take_pending());
        assert!(!listener.take_pending());
    }

    #[test]
    fn test_publish_without_listeners() {
        assert_eq!(InterruptBus::new().publish(), 0);
    }

    #[test]
    fn test_late_subscribers_miss_earlier_interrupts() {
        let bus = InterruptBus::new();
        bus.publish();
        let mut listener = bus.subscribe();
        assert!(!listener.take_pending());
    }
}
