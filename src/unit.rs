// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus device addressing

use std::fmt;

/// Raw unit (slave) identifier, a single byte on the wire.
pub type UnitId = u8;

/// A validated bus address: broadcast (0) or a single device (1-247).
///
/// The serial line specification reserves 248-255; [`Unit::new`] rejects
/// that range, and it is the only way to obtain a `Unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Unit(UnitId);

impl Unit {
    /// Addresses all devices at once. Broadcast requests are one-way;
    /// no device answers them.
    pub const BROADCAST: Self = Self(0);

    /// Highest addressable single device.
    pub const MAX_DEVICE: UnitId = 247;

    /// Validates a raw id, rejecting the reserved range.
    #[must_use]
    pub fn new(id: UnitId) -> Option<Self> {
        (id <= Self::MAX_DEVICE).then_some(Self(id))
    }

    /// The raw wire value.
    #[must_use]
    pub fn id(self) -> UnitId {
        self.0
    }

    /// Whether this is the broadcast address.
    #[must_use]
    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }
}

impl From<Unit> for UnitId {
    fn from(unit: Unit) -> Self {
        unit.0
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            f.write_str("broadcast")
        } else {
            write!(f, "unit {}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_range_is_rejected() {
        assert_eq!(Unit::new(0), Some(Unit::BROADCAST));
        assert!(Unit::new(1).is_some());
        assert!(Unit::new(Unit::MAX_DEVICE).is_some());
        assert!(Unit::new(Unit::MAX_DEVICE + 1).is_none());
        assert!(Unit::new(255).is_none());
    }

    #[test]
    fn broadcast_detection() {
        assert!(Unit::new(0).unwrap().is_broadcast());
        assert!(!Unit::new(17).unwrap().is_broadcast());
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", Unit::BROADCAST), "broadcast");
        assert_eq!(format!("{}", Unit::new(42).unwrap()), "unit 42");
    }

    #[test]
    fn raw_id_round_trip() {
        let unit = Unit::new(9).unwrap();
        assert_eq!(unit.id(), 9);
        assert_eq!(UnitId::from(unit), 9);
    }
}
