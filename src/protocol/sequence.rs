//! Sequence numbering for a tunneling session.
//!
//! Outbound requests carry a counter that wraps mod 256. Inbound requests
//! are checked against the last accepted number so that gateway
//! retransmissions are acknowledged without being handled twice.

/// Outcome of checking an inbound sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundSeq {
    /// First time this number is seen; handle the payload
    Process,
    /// Already accepted; acknowledge only
    Duplicate,
}

/// Outbound counter plus the last accepted inbound number.
#[derive(Debug, Clone, Default)]
pub struct SequenceManager {
    next: u8,
    last_inbound: Option<u8>,
}

impl SequenceManager {
    /// Fresh manager: counter at 0, nothing accepted yet
    pub const fn new() -> Self {
        Self {
            next: 0,
            last_inbound: None,
        }
    }

    /// Return the current counter and advance it
    pub fn next(&mut self) -> u8 {
        let seq = self.next;
        self.next = self.next.wrapping_add(1);
        seq
    }

    /// Step back over a number that never reached the wire
    pub fn revert_last(&mut self) {
        self.next = self.next.wrapping_sub(1);
    }

    /// The value the next call to [`next`](Self::next) returns
    pub const fn peek(&self) -> u8 {
        self.next
    }

    /// Last accepted inbound number
    pub const fn last_inbound(&self) -> Option<u8> {
        self.last_inbound
    }

    /// Back to the initial state; used on every new connection
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Check an inbound number.
    ///
    /// "Greater" is serial-number arithmetic over 8 bits: `seq` is newer
    /// when it lies 1..=127 steps ahead of the last accepted value, so the
    /// window survives the wrap from 255 to 0.
    pub fn accept_inbound(&mut self, seq: u8) -> InboundSeq {
        let newer = match self.last_inbound {
            None => true,
            Some(last) => (1..=127).contains(&seq.wrapping_sub(last)),
        };

        if newer {
            self.last_inbound = Some(seq);
            InboundSeq::Process
        } else {
            InboundSeq::Duplicate
        }
    }
}
