// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MBAP header framing for the multiplexed stream transport.

use std::io;

use byteorder::{BigEndian, ByteOrder};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    bytes::{Buf, BufMut, Bytes, BytesMut},
    frame::tcp::Header,
};

pub(crate) const HEADER_LEN: usize = 7;

pub(crate) const PROTOCOL_ID: u16 = 0x0000;

/// One frame lifted off the stream, before semantic validation.
///
/// The raw `protocol_id` and `length` fields are preserved so that the
/// transport can fail the transaction matched by `hdr.transaction_id`
/// instead of tearing down the whole stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DecodedAdu {
    pub(crate) hdr: Header,
    pub(crate) protocol_id: u16,
    pub(crate) length: u16,
    pub(crate) pdu: Bytes,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ClientCodec;

impl Decoder for ClientCodec {
    type Item = DecodedAdu;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<DecodedAdu>> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let transaction_id = BigEndian::read_u16(&buf[0..2]);
        let protocol_id = BigEndian::read_u16(&buf[2..4]);
        let length = BigEndian::read_u16(&buf[4..6]);
        let unit_id = buf[6];

        // length counts the unit byte plus the PDU
        let pdu_len = usize::from(length).saturating_sub(1);
        if length > 0 && buf.len() < HEADER_LEN + pdu_len {
            // Incomplete frame
            return Ok(None);
        }

        buf.advance(HEADER_LEN);
        let pdu = buf.split_to(pdu_len).freeze();

        Ok(Some(DecodedAdu {
            hdr: Header {
                transaction_id,
                unit_id,
            },
            protocol_id,
            length,
            pdu,
        }))
    }
}

impl Encoder<(Header, &[u8])> for ClientCodec {
    type Error = io::Error;

    fn encode(&mut self, (hdr, pdu): (Header, &[u8]), buf: &mut BytesMut) -> io::Result<()> {
        buf.reserve(HEADER_LEN + pdu.len());
        buf.put_u16(hdr.transaction_id);
        buf.put_u16(PROTOCOL_ID);
        buf.put_u16(crate::codec::u16_len(pdu.len() + 1));
        buf.put_u8(hdr.unit_id);
        buf.put_slice(pdu);
        Ok(())
    }
}
