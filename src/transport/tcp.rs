// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stream transport: MBAP-framed, multiplexed by transaction id.

use std::collections::HashMap;

use tokio_util::codec::{Decoder as _, Encoder as _};

use crate::{
    bytes::{Bytes, BytesMut},
    codec::tcp::{ClientCodec, PROTOCOL_ID},
    error::Error,
    frame::tcp::Header,
    transaction::{AduBuf, Transaction, TransactionId},
    transport::{Context, Outcome},
};

/// First identifier handed out after connecting.
const INITIAL_TRANSACTION_ID: u16 = 1;

/// Stream transport options.
#[derive(Debug, Clone, Default)]
pub struct IpConfig {}

pub(crate) struct IpTransport {
    transactions: HashMap<u16, Transaction>,
    next_id: u16,
    reader: BytesMut,
    codec: ClientCodec,
}

impl IpTransport {
    pub(crate) fn new(_config: IpConfig) -> Self {
        Self {
            transactions: HashMap::new(),
            next_id: INITIAL_TRANSACTION_ID,
            reader: BytesMut::new(),
            codec: ClientCodec,
        }
    }

    /// Allocates the next free transaction id, stepping over ids that are
    /// still in flight. 0xFFFF is never used; the counter wraps back to 1.
    fn next_transaction_id(&mut self) -> u16 {
        loop {
            let id = self.next_id;
            self.next_id = if id >= 0xFFFE { INITIAL_TRANSACTION_ID } else { id + 1 };
            if !self.transactions.contains_key(&id) {
                return id;
            }
        }
    }

    pub(crate) fn send_request(
        &mut self,
        mut transaction: Transaction,
        ctx: &mut Context<'_>,
    ) -> Result<(), (Transaction, Error)> {
        let transaction_id = self.next_transaction_id();

        match transaction.adu_mut() {
            Some(adu) => {
                // Re-issue of the cached ADU under a fresh id.
                adu[0..2].copy_from_slice(&transaction_id.to_be_bytes());
            }
            None => {
                let pdu = Bytes::from(transaction.request());
                let hdr = Header {
                    transaction_id,
                    unit_id: transaction.unit_id(),
                };
                let mut buf = BytesMut::new();
                self.codec
                    .encode((hdr, &pdu[..]), &mut buf)
                    .expect("MBAP encoding is infallible");
                transaction.set_adu(AduBuf::from_slice(&buf));
            }
        }

        ctx.conn
            .write(Bytes::copy_from_slice(transaction.adu().expect("ADU cached above")));
        transaction.mark_in_flight();
        ctx.arm_timer(&mut transaction);
        self.transactions.insert(transaction_id, transaction);
        Ok(())
    }

    pub(crate) fn on_data(&mut self, bytes: Bytes, ctx: &mut Context<'_>) -> Vec<Outcome> {
        self.reader.extend_from_slice(&bytes);
        let mut outcomes = Vec::new();

        while let Ok(Some(adu)) = self.codec.decode(&mut self.reader) {
            let Some(mut transaction) = self.transactions.remove(&adu.hdr.transaction_id) else {
                log::warn!(
                    "Skipping response for unknown transaction id {}",
                    adu.hdr.transaction_id
                );
                continue;
            };
            ctx.disarm_timer(&mut transaction);

            let outcome = if adu.protocol_id != PROTOCOL_ID {
                Outcome::Failed(
                    transaction,
                    Error::InvalidResponseData("invalid protocol identifier"),
                )
            } else if adu.length == 0 {
                Outcome::Failed(transaction, Error::InvalidResponseData("invalid data length"))
            } else if adu.hdr.unit_id != transaction.unit_id() {
                Outcome::Failed(transaction, Error::InvalidResponseData("unit mismatch"))
            } else {
                match transaction.request().decode_response(adu.pdu) {
                    Ok(pdu) => Outcome::Response(transaction, pdu),
                    Err(err) => Outcome::Failed(transaction, err),
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    pub(crate) fn take(&mut self, id: TransactionId) -> Option<Transaction> {
        let transaction_id = self
            .transactions
            .iter()
            .find_map(|(tid, t)| (t.id() == id).then_some(*tid))?;
        self.transactions.remove(&transaction_id)
    }

    pub(crate) fn take_all(&mut self) -> Vec<Transaction> {
        self.reader.clear();
        self.transactions.drain().map(|(_, t)| t).collect()
    }
}
