// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serial line framing: CRC-16 and gap-delimited ADUs.

use crate::{
    bytes::{BufMut, Bytes, BytesMut},
    error::Error,
    frame::rtu::{Header, ResponseFrame},
    unit::UnitId,
};

// [Modbus over Serial Line Specification and Implementation Guide V1.02](http://modbus.org/docs/Modbus_over_serial_line_V1_02.pdf), page 13
// "The maximum size of a Modbus RTU frame is 256 bytes."
pub(crate) const MAX_FRAME_LEN: usize = 256;

/// Unit byte, at least a one-byte PDU and the two CRC bytes.
pub(crate) const MIN_FRAME_LEN: usize = 5;

const CRC_BYTE_COUNT: usize = 2;

/// Precomputed table for the reflected 0xA001 polynomial.
const CRC_TABLE: [u16; 256] = crc_table();

const fn crc_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x0001 != 0 {
                (crc >> 1) ^ 0xA001
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Standard Modbus CRC-16, seeded at 0xFFFF.
///
/// The low byte goes on the wire first.
pub(crate) fn calc_crc(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for x in data {
        let index = ((crc ^ u16::from(*x)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC_TABLE[index];
    }
    crc
}

pub(crate) fn check_crc(adu_data: &[u8], expected_crc: u16) -> Result<(), Error> {
    let actual_crc = calc_crc(adu_data);
    if expected_crc != actual_crc {
        return Err(Error::InvalidChecksum {
            expected: expected_crc,
            actual: actual_crc,
        });
    }
    Ok(())
}

/// Frames a PDU into a serial ADU: `[unit] [pdu] [crc lo] [crc hi]`.
pub(crate) fn encode_adu(unit_id: UnitId, pdu: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + pdu.len() + CRC_BYTE_COUNT);
    buf.put_u8(unit_id);
    buf.put_slice(pdu);
    let crc = calc_crc(&buf);
    buf.put_u16_le(crc);
    buf.freeze()
}

/// Parses one gap-delimited frame accumulated by the idle timer.
///
/// Validation order: length, then CRC. The unit byte is checked against
/// the in-flight transaction by the transport, not here.
pub(crate) fn decode_frame(frame: Bytes) -> Result<ResponseFrame, Error> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(Error::IncompleteResponseFrame);
    }
    if frame.len() > MAX_FRAME_LEN {
        return Err(Error::InvalidResponseData("frame exceeds 256 bytes"));
    }
    let adu_len = frame.len() - CRC_BYTE_COUNT;
    let expected_crc =
        u16::from_le_bytes([frame[adu_len], frame[adu_len + 1]]);
    check_crc(&frame[..adu_len], expected_crc)?;

    let unit_id = frame[0];
    let pdu = frame.slice(1..adu_len);
    Ok(ResponseFrame {
        hdr: Header { unit_id },
        pdu,
    })
}
