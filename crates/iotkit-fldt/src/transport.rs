//! Transport contract consumed by the protocol engine
//!
//! The engine hands complete frames to a [`Transport`] and is fed inbound
//! frames by whoever drives it. Framing, addressing and delivery are the
//! transport's business.

use crate::error::{FldtError, FldtResult};
use iotkit_update::MacAddr;
use std::collections::VecDeque;

/// Outbound half of a message transport
pub trait Transport {
    /// Address frames from this endpoint carry
    fn local_addr(&self) -> MacAddr;

    /// Queue `frame` for `dest`, which may be [`MacAddr::BROADCAST`]
    fn send(&mut self, dest: MacAddr, frame: Vec<u8>) -> FldtResult<()>;
}

/// A frame in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sender
    pub from: MacAddr,
    /// Recipient or broadcast
    pub to: MacAddr,
    /// Encoded message
    pub frame: Vec<u8>,
}

impl Envelope {
    /// Whether `addr` should receive this frame
    pub fn is_for(&self, addr: MacAddr) -> bool {
        self.to == addr || self.to.is_broadcast()
    }
}

/// Transport that queues frames in memory until drained
#[derive(Debug)]
pub struct MemoryTransport {
    addr: MacAddr,
    outbox: VecDeque<Envelope>,
    capacity: usize,
}

impl MemoryTransport {
    /// Default number of frames held before sends fail
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Endpoint at `addr`
    pub fn new(addr: MacAddr) -> Self {
        Self::with_capacity(addr, Self::DEFAULT_CAPACITY)
    }

    /// Endpoint holding at most `capacity` undrained frames
    pub fn with_capacity(addr: MacAddr, capacity: usize) -> Self {
        Self {
            addr,
            outbox: VecDeque::new(),
            capacity,
        }
    }

    /// Take every queued frame in send order
    pub fn drain(&mut self) -> Vec<Envelope> {
        self.outbox.drain(..).collect()
    }

    /// Frames waiting to be drained
    pub fn pending(&self) -> usize {
        self.outbox.len()
    }
}

impl Transport for MemoryTransport {
    fn local_addr(&self) -> MacAddr {
        self.addr
    }

    fn send(&mut self, dest: MacAddr, frame: Vec<u8>) -> FldtResult<()> {
        if self.outbox.len() >= self.capacity {
            return Err(FldtError::Transport(format!(
                "Outbox full ({} frames)",
                self.capacity
            )));
        }
        self.outbox.push_back(Envelope {
            from: self.addr,
            to: dest,
            frame,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_order() -> FldtResult<()> {
        let mut transport = MemoryTransport::new(MacAddr([2, 0, 0, 0, 0, 1]));
        transport.send(MacAddr::BROADCAST, vec![1])?;
        transport.send(MacAddr([2, 0, 0, 0, 0, 2]), vec![2])?;

        let frames = transport.drain();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames.first().map(|e| e.frame.clone()), Some(vec![1]));
        assert_eq!(transport.pending(), 0);
        Ok(())
    }

    #[test]
    fn test_full_outbox_fails() -> FldtResult<()> {
        let mut transport = MemoryTransport::with_capacity(MacAddr::default(), 1);
        transport.send(MacAddr::BROADCAST, vec![1])?;
        assert!(matches!(
            transport.send(MacAddr::BROADCAST, vec![2]),
            Err(FldtError::Transport(_))
        ));
        Ok(())
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let envelope = Envelope {
            from: MacAddr::default(),
            to: MacAddr::BROADCAST,
            frame: Vec::new(),
        };
        assert!(envelope.is_for(MacAddr([2, 0, 0, 0, 0, 9])));
    }
}
