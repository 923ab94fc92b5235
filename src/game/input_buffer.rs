//! Lock-free input buffer between connection handlers and the tick loop
//!
//! Uses crossbeam-channel for lock-free MPSC communication: connection
//! tasks decode input records and push them here, the tick loop drains
//! everything pending at the start of each simulation step.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::game::state::EntityId;
use crate::net::snapshot::InputFrame;

/// One decoded input attributed to its entity
#[derive(Debug, Clone, Copy)]
pub struct InputCommand {
    pub entity: EntityId,
    pub frame: InputFrame,
}

/// Bounded MPSC input queue
///
/// Connection handlers submit without blocking; a full buffer applies
/// backpressure to the offending sender instead of stalling the tick.
pub struct InputBuffer {
    sender: Sender<InputCommand>,
    receiver: Receiver<InputCommand>,
    capacity: usize,
}

impl InputBuffer {
    /// Capacity should cover one tick's worth of burst input across all
    /// connections, e.g. 1024 for 100+ players at 60 Hz client send rate
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// New sender handle; each connection holds its own clone
    pub fn sender(&self) -> InputSender {
        InputSender {
            sender: self.sender.clone(),
        }
    }

    /// Drain all pending inputs, called once per tick
    pub fn drain(&self) -> Vec<InputCommand> {
        self.receiver.try_iter().collect()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Clonable sender handle for connection handlers
#[derive(Clone)]
pub struct InputSender {
    sender: Sender<InputCommand>,
}

impl InputSender {
    /// Submit one input without blocking
    #[inline]
    pub fn try_send(&self, entity: EntityId, frame: InputFrame) -> Result<(), InputBufferError> {
        self.sender
            .try_send(InputCommand { entity, frame })
            .map_err(|e| match e {
                TrySendError::Full(_) => InputBufferError::Full,
                TrySendError::Disconnected(_) => InputBufferError::Disconnected,
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputBufferError {
    /// Buffer is full (backpressure)
    Full,
    /// Tick loop stopped
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::movement::action;

    fn frame(sequence: u32) -> InputFrame {
        InputFrame {
            flags: action::FORWARD,
            yaw: 0.0,
            pitch: 0.0,
            sequence,
            timestamp_ms: sequence * 16,
        }
    }

    #[test]
    fn test_submit_and_drain_preserves_order() {
        let buffer = InputBuffer::new(10);
        let sender = buffer.sender();

        sender.try_send(1, frame(1)).unwrap();
        sender.try_send(1, frame(2)).unwrap();
        sender.try_send(2, frame(3)).unwrap();
        assert_eq!(buffer.pending_count(), 3);

        let inputs = buffer.drain();
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[0].frame.sequence, 1);
        assert_eq!(inputs[1].frame.sequence, 2);
        assert_eq!(inputs[2].entity, 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_backpressure_when_full() {
        let buffer = InputBuffer::new(2);
        let sender = buffer.sender();

        sender.try_send(1, frame(1)).unwrap();
        sender.try_send(1, frame(2)).unwrap();
        assert_eq!(sender.try_send(1, frame(3)), Err(InputBufferError::Full));

        buffer.drain();
        assert!(sender.try_send(1, frame(3)).is_ok());
    }

    #[test]
    fn test_senders_are_independent_clones() {
        let buffer = InputBuffer::new(10);
        let a = buffer.sender();
        let b = buffer.sender();

        a.try_send(1, frame(1)).unwrap();
        b.try_send(2, frame(2)).unwrap();
        assert_eq!(buffer.drain().len(), 2);
    }

    #[test]
    fn test_disconnected_after_buffer_drop() {
        let buffer = InputBuffer::new(2);
        let sender = buffer.sender();
        drop(buffer);
        assert_eq!(
            sender.try_send(1, frame(1)),
            Err(InputBufferError::Disconnected)
        );
    }
}
