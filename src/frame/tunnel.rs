// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::bytes::Bytes;

/// A `SLAVE_COMMAND` poll received from the external bus master.
///
/// `payload` is everything after the two-byte `[SLAVE_COMMAND][sequence]`
/// header; when non-empty it carries the response to our previously
/// piggybacked request, starting with the responding unit id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Poll {
    pub(crate) sequence: u8,
    pub(crate) payload: Bytes,
}

/// Classification tag of a sniffed bus frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffKind {
    /// A well-framed PDU (CRC verified).
    Pdu,
    /// Fewer bytes than the minimal frame length.
    Incomplete,
    /// A frame of plausible length whose CRC did not match.
    BadChecksum,
}

/// One passively observed bus frame, surfaced for monitoring.
///
/// `data` holds the raw frame bytes as received, CRC included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sniff {
    pub kind: SniffKind,
    pub data: Bytes,
}
