//! Last known register contents and sequence counter.
use crate::protocol::{self as proto, KettleState, Register};

/// The client's view of the kettle register.
///
/// `sequence` is the counter value the next write increments. It tracks the
/// counter byte without the schedule overlay a write may have forced into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateCache {
    #[default]
    Empty,
    Fresh { register: Register, sequence: u8 },
}

impl StateCache {
    /// Stores a register observed from the device by a read or a notification.
    pub fn store(&mut self, register: Register) {
        *self = StateCache::Fresh {
            register,
            sequence: register.counter(),
        };
    }

    /// Stores a register this client has just written with `sequence`.
    pub fn record_write(&mut self, register: Register, sequence: u8) {
        *self = StateCache::Fresh { register, sequence };
    }

    /// Drops the cached register, the next read goes to the kettle.
    pub fn clear(&mut self) {
        *self = StateCache::Empty;
    }

    /// Whether a register is cached.
    pub fn is_fresh(&self) -> bool {
        matches!(self, StateCache::Fresh { .. })
    }

    /// Cached register and its sequence byte.
    pub fn snapshot(&self) -> Option<(Register, u8)> {
        match *self {
            StateCache::Empty => None,
            StateCache::Fresh { register, sequence } => Some((register, sequence)),
        }
    }

    /// Decoded view of the cached register.
    pub fn state(&self) -> Option<KettleState> {
        self.snapshot().map(|(register, _)| proto::decode(&register))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_takes_sequence_from_counter() {
        let mut bytes = [0u8; proto::REGISTER_LEN];
        bytes[proto::COUNTER_BYTE] = 0x2A;
        let register = Register::from_bytes(bytes);

        let mut cache = StateCache::default();
        assert!(!cache.is_fresh());
        assert_eq!(cache.state(), None);

        cache.store(register);
        assert_eq!(cache.snapshot(), Some((register, 0x2A)));

        cache.record_write(register, 0x22);
        assert_eq!(cache.snapshot(), Some((register, 0x22)));
        assert_eq!(cache.state().map(|s| s.counter), Some(0x2A));

        cache.clear();
        assert_eq!(cache, StateCache::Empty);
    }
}
