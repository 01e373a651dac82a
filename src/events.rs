//! Connection events and per-address telegram listeners.
//!
//! Lifecycle events and every dispatched telegram go out on one broadcast
//! channel. Listeners interested in a single address register on the
//! listener table instead and receive only frames of that kind and
//! destination.

use crate::addressing::KnxAddress;
use crate::protocol::cemi::{CemiFrame, TelegramKind};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc};

/// Capacity of the broadcast channel; slow subscribers see `Lagged`.
pub const EVENT_CAPACITY: usize = 64;

/// Everything a connection reports to its observers.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A connect attempt starts
    Connecting,
    /// The connect request went out
    Connect,
    /// The gateway assigned a channel
    Connected,
    /// The gateway answered a state request
    Alive,
    /// The transport binding was released
    Close,
    /// The tunnel was torn down
    Disconnect,
    /// Teardown finished
    Disconnected,
    /// A group value write was observed on the bus
    Event(CemiFrame),
    /// A group value response was observed on the bus
    Status(CemiFrame),
}

type Listeners = HashMap<(TelegramKind, KnxAddress), Vec<mpsc::UnboundedSender<CemiFrame>>>;

/// Fan-out point for [`ConnectionEvent`]s.
#[derive(Debug)]
pub struct EventBus {
    events: broadcast::Sender<ConnectionEvent>,
    listeners: Mutex<Listeners>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// A bus with no subscribers or listeners yet
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            events,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Receive telegrams of one kind addressed to `address`.
    ///
    /// Listeners whose receiver was dropped are cleared out first.
    pub fn listen(&self, kind: TelegramKind, address: KnxAddress) -> mpsc::UnboundedReceiver<CemiFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|_, senders| {
            senders.retain(|sender| !sender.is_closed());
            !senders.is_empty()
        });
        listeners.entry((kind, address)).or_default().push(tx);
        rx
    }

    /// Drop the closed listeners of one address
    pub fn prune(&self, kind: TelegramKind, address: KnxAddress) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(senders) = listeners.get_mut(&(kind, address)) {
            senders.retain(|sender| !sender.is_closed());
            if senders.is_empty() {
                listeners.remove(&(kind, address));
            }
        }
    }

    /// Send a lifecycle event to every subscriber
    pub fn emit(&self, event: ConnectionEvent) {
        if self.events.send(event).is_err() {
            knx_log!(trace, "event dropped, no subscribers");
        }
    }

    /// Deliver a telegram to its address listeners, then to all subscribers.
    pub fn publish(&self, kind: TelegramKind, frame: CemiFrame) {
        {
            let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(senders) = listeners.get_mut(&(kind, frame.destination)) {
                senders.retain(|tx| tx.send(frame.clone()).is_ok());
                if senders.is_empty() {
                    listeners.remove(&(kind, frame.destination));
                }
            }
        }

        self.emit(match kind {
            TelegramKind::Event => ConnectionEvent::Event(frame),
            TelegramKind::Status => ConnectionEvent::Status(frame),
        });
    }

    /// Listener count for an address, closed receivers included until the
    /// next publish, prune or listen clears them
    pub fn listener_count(&self, kind: TelegramKind, address: KnxAddress) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind, address))
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(apdu_type: u8) -> CemiFrame {
        let data = [0x29, 0x00, 0xBC, 0xE0, 0x11, 0x01, 0x0A, 0x03, 0x01, 0x00, apdu_type | 0x01];
        CemiFrame::parse(&data, true).unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_lifecycle() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(ConnectionEvent::Connecting);
        bus.emit(ConnectionEvent::Connected);
        assert_eq!(rx.recv().await.unwrap(), ConnectionEvent::Connecting);
        assert_eq!(rx.recv().await.unwrap(), ConnectionEvent::Connected);
    }

    #[tokio::test]
    async fn test_address_listeners() {
        let bus = EventBus::new();
        let event = frame(0x80);
        let dest = event.destination;

        let mut events = bus.listen(TelegramKind::Event, dest);
        let mut statuses = bus.listen(TelegramKind::Status, dest);
        let mut all = bus.subscribe();

        bus.publish(TelegramKind::Event, event.clone());

        assert_eq!(events.recv().await.unwrap(), event);
        assert!(statuses.try_recv().is_err());
        assert_eq!(all.recv().await.unwrap(), ConnectionEvent::Event(event));
    }

    #[test]
    fn test_closed_listeners_pruned() {
        let bus = EventBus::new();
        let status = frame(0x40);
        let dest = status.destination;

        drop(bus.listen(TelegramKind::Status, dest));
        let _kept = bus.listen(TelegramKind::Status, dest);
        assert_eq!(bus.listener_count(TelegramKind::Status, dest), 2);

        bus.publish(TelegramKind::Status, status);
        assert_eq!(bus.listener_count(TelegramKind::Status, dest), 1);
    }

    #[test]
    fn test_prune_and_listen_clear_closed() {
        let bus = EventBus::new();
        let first = frame(0x40).destination;
        let second = KnxAddress::from(crate::addressing::GroupAddress::from(0x0A04));

        drop(bus.listen(TelegramKind::Status, first));
        assert_eq!(bus.listener_count(TelegramKind::Status, first), 1);
        bus.prune(TelegramKind::Status, first);
        assert_eq!(bus.listener_count(TelegramKind::Status, first), 0);

        drop(bus.listen(TelegramKind::Status, first));
        let _kept = bus.listen(TelegramKind::Event, second);
        assert_eq!(bus.listener_count(TelegramKind::Status, first), 0);
        assert_eq!(bus.listener_count(TelegramKind::Event, second), 1);
    }

    #[test]
    fn test_emit_without_subscribers() {
        EventBus::new().emit(ConnectionEvent::Alive);
    }
}
