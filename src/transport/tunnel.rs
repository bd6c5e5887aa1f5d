// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tunnel transport: we are a slave on an RTU bus run by a foreign
//! master, and piggyback our own requests on its `SLAVE_COMMAND` polls.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::time::delay_queue;

use crate::{
    bytes::{Bytes, BytesMut},
    codec::{rtu as rtu_codec, tunnel as codec},
    error::Error,
    frame::tunnel::{Sniff, SniffKind},
    transaction::{AduBuf, Transaction, TransactionId},
    transport::{Context, Outcome, Timer},
    unit::UnitId,
};

use super::rtu::DEFAULT_EOF_TIMEOUT;

const MIN_EOF_TIMEOUT: Duration = Duration::from_millis(1);

/// Tunnel transport options.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// The slave id under which we answer the external master's polls.
    pub unit: UnitId,
    /// Inter-character idle gap; values below 1 ms are clamped up.
    pub eof_timeout: Duration,
    /// Passive monitoring sink: every inbound frame is surfaced here,
    /// including frames not addressed to us.
    pub sniff: Option<mpsc::UnboundedSender<Sniff>>,
}

impl TunnelConfig {
    #[must_use]
    pub fn new(unit: UnitId) -> Self {
        Self {
            unit,
            eof_timeout: DEFAULT_EOF_TIMEOUT,
            sniff: None,
        }
    }

    fn eof_timeout(&self) -> Duration {
        self.eof_timeout.max(MIN_EOF_TIMEOUT)
    }
}

pub(crate) struct TunnelTransport {
    config: TunnelConfig,
    current: Option<Transaction>,
    next: Option<Transaction>,
    sequence: u8,
    reader: BytesMut,
    eof_key: Option<delay_queue::Key>,
}

impl TunnelTransport {
    pub(crate) fn new(config: TunnelConfig) -> Self {
        Self {
            config,
            current: None,
            next: None,
            sequence: 0,
            reader: BytesMut::new(),
            eof_key: None,
        }
    }

    /// Queues a transaction for the next poll exchanges. At most two may
    /// be queued: the one being serviced and one successor.
    ///
    /// The response timer starts immediately; the configured timeout is
    /// expected to span a couple of poll periods of the external master.
    pub(crate) fn send_request(
        &mut self,
        mut transaction: Transaction,
        ctx: &mut Context<'_>,
    ) -> Result<(), (Transaction, Error)> {
        let slot = if self.current.is_none() {
            &mut self.current
        } else if self.next.is_none() {
            &mut self.next
        } else {
            return Err((transaction, Error::TooManyRequests));
        };

        if transaction.adu().is_none() {
            // Only the bare request PDU is cached; sequence and target
            // unit are framed per poll.
            let pdu = Bytes::from(transaction.request());
            transaction.set_adu(AduBuf::from_slice(&pdu));
        }
        ctx.arm_timer(&mut transaction);
        *slot = Some(transaction);
        Ok(())
    }

    pub(crate) fn on_data(&mut self, bytes: Bytes, ctx: &mut Context<'_>) {
        self.reader.extend_from_slice(&bytes);
        let eof_timeout = self.config.eof_timeout();
        match self.eof_key {
            Some(ref key) => ctx.timers.reset(key, eof_timeout),
            None => self.eof_key = Some(ctx.timers.insert(Timer::Eof, eof_timeout)),
        }
    }

    fn sniff(&self, kind: SniffKind, data: &Bytes) {
        if let Some(sniff) = &self.config.sniff {
            let _ = sniff.send(Sniff {
                kind,
                data: data.clone(),
            });
        }
    }

    pub(crate) fn on_eof(&mut self, ctx: &mut Context<'_>) -> Vec<Outcome> {
        self.eof_key = None;
        let raw = self.reader.split().freeze();

        let frame = match rtu_codec::decode_frame(raw.clone()) {
            Ok(frame) => {
                self.sniff(SniffKind::Pdu, &raw);
                frame
            }
            Err(Error::IncompleteResponseFrame) => {
                self.sniff(SniffKind::Incomplete, &raw);
                return Vec::new();
            }
            Err(_) => {
                self.sniff(SniffKind::BadChecksum, &raw);
                return Vec::new();
            }
        };

        // Frames for other units are observe-only.
        if frame.hdr.unit_id != self.config.unit {
            return Vec::new();
        }
        let Some(poll) = codec::parse_poll(&frame) else {
            return Vec::new();
        };

        if poll.sequence != self.sequence {
            log::debug!(
                "Out-of-sequence poll: expected {}, got {}",
                self.sequence,
                poll.sequence
            );
            let reply = codec::encode_reply(self.config.unit, poll.sequence, None);
            ctx.conn.write(reply);
            return Vec::new();
        }

        let mut outcomes = Vec::new();

        // A non-empty payload answers the request piggybacked on the
        // previous exchange.
        if self
            .current
            .as_ref()
            .is_some_and(|t| t.is_in_flight())
            && !poll.payload.is_empty()
        {
            let mut transaction = self.current.take().expect("checked above");
            ctx.disarm_timer(&mut transaction);
            self.current = self.next.take();
            let outcome = match transaction.request().decode_response(poll.payload) {
                Ok(pdu) => Outcome::Response(transaction, pdu),
                Err(err) => Outcome::Failed(transaction, err),
            };
            outcomes.push(outcome);
        }

        self.sequence = self.sequence.wrapping_add(1);

        let piggyback = match &mut self.current {
            Some(transaction) if !transaction.is_in_flight() => {
                transaction.mark_in_flight();
                Some((
                    transaction.unit_id(),
                    transaction.adu().expect("ADU cached at submit"),
                ))
            }
            _ => None,
        };
        let reply = codec::encode_reply(
            self.config.unit,
            poll.sequence,
            piggyback.map(|(unit, adu)| (unit, &adu[..])),
        );
        ctx.conn.write(reply);

        outcomes
    }

    pub(crate) fn take(&mut self, id: TransactionId) -> Option<Transaction> {
        if self.current.as_ref().is_some_and(|t| t.id() == id) {
            let transaction = self.current.take();
            self.current = self.next.take();
            transaction
        } else if self.next.as_ref().is_some_and(|t| t.id() == id) {
            self.next.take()
        } else {
            None
        }
    }

    pub(crate) fn take_all(&mut self) -> Vec<Transaction> {
        self.reader.clear();
        self.current
            .take()
            .into_iter()
            .chain(self.next.take())
            .collect()
    }
}
