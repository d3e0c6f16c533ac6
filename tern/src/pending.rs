// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use heapless::Vec;

use codec::PacketId;

/// Capacity of the pending-PUBREC set.
pub const PENDING_PUBREC_CAPACITY: usize = 128;

/// Packet ids of `QoS` 2 publishes that were delivered to the application
/// but whose PUBREL has not arrived yet.
///
/// A small fixed-capacity array with linear scans; at this capacity the
/// scan cost is negligible. A full set refuses new entries instead of
/// evicting old ones.
#[derive(Debug, Default)]
pub struct PendingPubrec {
    ids: Vec<PacketId, PENDING_PUBREC_CAPACITY>,
}

impl PendingPubrec {
    #[must_use]
    pub const fn new() -> Self {
        Self { ids: Vec::new() }
    }

    #[must_use]
    pub fn contains(&self, packet_id: PacketId) -> bool {
        self.ids.iter().any(|id| *id == packet_id)
    }

    /// Track a packet id.
    ///
    /// # Errors
    ///
    /// Returns the id back if the set is full.
    pub fn insert(&mut self, packet_id: PacketId) -> Result<(), PacketId> {
        self.ids.push(packet_id)
    }

    /// Stop tracking a packet id. Unknown ids are ignored.
    pub fn remove(&mut self, packet_id: PacketId) {
        if let Some(pos) = self.ids.iter().position(|id| *id == packet_id) {
            self.ids.swap_remove(pos);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove() {
        let mut pending = PendingPubrec::new();
        assert!(pending.insert(PacketId::new(1)).is_ok());
        assert!(pending.insert(PacketId::new(2)).is_ok());
        assert!(pending.contains(PacketId::new(1)));
        assert!(!pending.contains(PacketId::new(3)));

        pending.remove(PacketId::new(1));
        assert!(!pending.contains(PacketId::new(1)));
        assert_eq!(pending.len(), 1);

        // Removing an unknown id is a no-op.
        pending.remove(PacketId::new(42));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_full_set_rejects() {
        let mut pending = PendingPubrec::new();
        for id in 1..=PENDING_PUBREC_CAPACITY {
            #[allow(clippy::cast_possible_truncation)]
            let packet_id = PacketId::new(id as u16);
            assert!(pending.insert(packet_id).is_ok());
        }
        assert_eq!(
            pending.insert(PacketId::new(9999)),
            Err(PacketId::new(9999))
        );
        assert_eq!(pending.len(), PENDING_PUBREC_CAPACITY);
    }
}
