// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Piggyback framing for the tunnel dialect.
//!
//! Frames are RTU-identical; this module only knows how to recognize a
//! `SLAVE_COMMAND` poll and how to assemble our reply to one.

use crate::{
    bytes::{BufMut, Bytes, BytesMut},
    codec::rtu::calc_crc,
    frame::{fn_code, rtu::ResponseFrame, tunnel::Poll},
    unit::UnitId,
};

/// Recognizes a `SLAVE_COMMAND` poll in a well-framed PDU addressed to us.
///
/// Returns `None` for any other PDU; those are ignored per the dialect.
pub(crate) fn parse_poll(frame: &ResponseFrame) -> Option<Poll> {
    if frame.pdu.len() < 2 || frame.pdu[0] != fn_code::SLAVE_COMMAND {
        return None;
    }
    Some(Poll {
        sequence: frame.pdu[1],
        payload: frame.pdu.slice(2..),
    })
}

/// Builds the reply to a poll.
///
/// With a piggybacked request the frame is
/// `[our-unit] [SLAVE_COMMAND] [seq] [target-unit] [request-pdu] [crc]`,
/// without one it is the minimal `[our-unit] [SLAVE_COMMAND] [seq] [crc]`.
pub(crate) fn encode_reply(
    our_unit: UnitId,
    sequence: u8,
    piggyback: Option<(UnitId, &[u8])>,
) -> Bytes {
    let payload_len = piggyback.map_or(0, |(_, pdu)| 1 + pdu.len());
    let mut buf = BytesMut::with_capacity(3 + payload_len + 2);
    buf.put_u8(our_unit);
    buf.put_u8(fn_code::SLAVE_COMMAND);
    buf.put_u8(sequence);
    if let Some((target_unit, pdu)) = piggyback {
        buf.put_u8(target_unit);
        buf.put_slice(pdu);
    }
    let crc = calc_crc(&buf);
    buf.put_u16_le(crc);
    buf.freeze()
}
