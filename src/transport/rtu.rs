// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serial line transport: gap-delimited frames, one transaction at a time.

use std::time::Duration;

use tokio_util::time::delay_queue;

use crate::{
    bytes::{Bytes, BytesMut},
    codec::rtu as codec,
    connection::ControlOptions,
    error::Error,
    transaction::{AduBuf, Transaction, TransactionId},
    transport::{Context, Outcome, Timer},
};

/// Default inter-character idle gap after which a frame is complete.
///
/// A faithful deployment configures 3.5 character times at the actual
/// baud rate; 10 ms covers common rates down to 4800 baud.
pub const DEFAULT_EOF_TIMEOUT: Duration = Duration::from_millis(10);

const MIN_EOF_TIMEOUT: Duration = Duration::from_millis(1);

/// Serial transport options.
#[derive(Debug, Clone)]
pub struct RtuConfig {
    /// Inter-character idle gap; values below 1 ms are clamped up.
    pub eof_timeout: Duration,
    /// Discard the transmit echo of an optically coupled bus before
    /// parsing responses.
    pub enable_echo: bool,
    /// Drive the RS-485 direction pin around each write.
    pub rts_control: bool,
}

impl Default for RtuConfig {
    fn default() -> Self {
        Self {
            eof_timeout: DEFAULT_EOF_TIMEOUT,
            enable_echo: false,
            rts_control: false,
        }
    }
}

impl RtuConfig {
    fn eof_timeout(&self) -> Duration {
        self.eof_timeout.max(MIN_EOF_TIMEOUT)
    }
}

pub(crate) struct RtuTransport {
    config: RtuConfig,
    current: Option<Transaction>,
    reader: BytesMut,
    eof_key: Option<delay_queue::Key>,
    /// Echo bytes expected ahead of the response, per attempt.
    echo_len: usize,
}

impl RtuTransport {
    pub(crate) fn new(config: RtuConfig) -> Self {
        Self {
            config,
            current: None,
            reader: BytesMut::new(),
            eof_key: None,
            echo_len: 0,
        }
    }

    pub(crate) fn send_request(
        &mut self,
        mut transaction: Transaction,
        ctx: &mut Context<'_>,
    ) -> Result<(), (Transaction, Error)> {
        if self.current.is_some() {
            return Err((transaction, Error::TooManyRequests));
        }

        if transaction.adu().is_none() {
            let pdu = Bytes::from(transaction.request());
            let adu = codec::encode_adu(transaction.unit_id(), &pdu);
            transaction.set_adu(AduBuf::from_slice(&adu));
        }
        let adu = Bytes::copy_from_slice(transaction.adu().expect("ADU cached above"));

        if self.config.rts_control {
            ctx.conn.set(ControlOptions { rts: Some(true) });
        }
        ctx.conn.write(adu.clone());
        if self.config.rts_control {
            ctx.conn.drain();
            ctx.conn.set(ControlOptions { rts: Some(false) });
        }

        self.echo_len = if self.config.enable_echo {
            adu.len()
        } else {
            0
        };
        transaction.mark_in_flight();
        ctx.arm_timer(&mut transaction);
        self.current = Some(transaction);
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

    pub(crate) fn on_eof(&mut self, ctx: &mut Context<'_>) -> Vec<Outcome> {
        self.eof_key = None;
        let mut frame = self.reader.split().freeze();

        let Some(mut transaction) = self.current.take() else {
            log::debug!("Flushing {} unexpected byte(s)", frame.len());
            return Vec::new();
        };
        ctx.disarm_timer(&mut transaction);

        if self.echo_len > 0 {
            if frame.len() < self.echo_len {
                log::warn!(
                    "Expected {} echo byte(s), got {}",
                    self.echo_len,
                    frame.len()
                );
                return vec![Outcome::Failed(transaction, Error::NoEcho)];
            }
            frame = frame.slice(self.echo_len..);
        }

        let outcome = match codec::decode_frame(frame) {
            Ok(frame) => {
                if frame.hdr.unit_id != transaction.unit_id() {
                    Outcome::Failed(transaction, Error::InvalidResponseData("unit mismatch"))
                } else {
                    match transaction.request().decode_response(frame.pdu) {
                        Ok(pdu) => Outcome::Response(transaction, pdu),
                        Err(err) => Outcome::Failed(transaction, err),
                    }
                }
            }
            Err(err) => Outcome::Failed(transaction, err),
        };
        vec![outcome]
    }

    pub(crate) fn take(&mut self, id: TransactionId) -> Option<Transaction> {
        if self.current.as_ref().is_some_and(|t| t.id() == id) {
            // Drop bytes of the aborted exchange so that they are not
            // parsed as the next response.
            self.reader.clear();
            self.current.take()
        } else {
            None
        }
    }

    pub(crate) fn take_all(&mut self) -> Vec<Transaction> {
        self.reader.clear();
        self.current.take().into_iter().collect()
    }
}
