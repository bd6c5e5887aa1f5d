// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Framing state machines.
//!
//! A transport owns the transactions that have been handed to it and is
//! the only component talking to the connection. It reports reconciled
//! [`Outcome`]s back to the master, which decides about retries.

#[cfg(feature = "rtu")]
pub(crate) mod rtu;

#[cfg(feature = "tcp")]
pub(crate) mod tcp;

#[cfg(feature = "tunnel")]
pub(crate) mod tunnel;

use tokio_util::time::DelayQueue;

use crate::{
    bytes::Bytes,
    connection::Connection,
    error::Error,
    frame::ResponsePdu,
    transaction::{Transaction, TransactionId},
};

/// Entries of the master's single timer wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Timer {
    /// Per-attempt response timeout of one transaction.
    Response(TransactionId),
    /// The serial inter-frame idle gap elapsed.
    Eof,
}

/// Everything a transport may touch while handling an event: the shared
/// connection (writer side) and the timer wheel.
pub(crate) struct Context<'a> {
    pub(crate) conn: &'a mut dyn Connection,
    pub(crate) timers: &'a mut DelayQueue<Timer>,
}

impl Context<'_> {
    pub(crate) fn disarm_timer(&mut self, transaction: &mut Transaction) {
        if let Some(key) = transaction.timer_key.take() {
            self.timers.try_remove(&key);
        }
    }

    pub(crate) fn arm_timer(&mut self, transaction: &mut Transaction) {
        debug_assert!(transaction.timer_key.is_none());
        let key = self
            .timers
            .insert(Timer::Response(transaction.id()), transaction.timeout());
        transaction.timer_key = Some(key);
    }
}

/// A transaction the transport is done with, together with what happened.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// A matching, well-formed response was decoded.
    Response(Transaction, ResponsePdu),
    /// The attempt failed; the master reconciles against the retry budget.
    Failed(Transaction, Error),
}

pub(crate) enum Transport {
    #[cfg(feature = "rtu")]
    Rtu(rtu::RtuTransport),
    #[cfg(feature = "tcp")]
    Ip(tcp::IpTransport),
    #[cfg(feature = "tunnel")]
    Tunnel(tunnel::TunnelTransport),
}

impl Transport {
    /// Hands a transaction to the transport and issues its first write
    /// (or queues it for the next poll, for the tunnel).
    ///
    /// Fails synchronously with `TooManyRequests` when the transport's
    /// concurrency ceiling is reached; the transaction is handed back for
    /// completion.
    pub(crate) fn send_request(
        &mut self,
        transaction: Transaction,
        ctx: &mut Context<'_>,
    ) -> Result<(), (Transaction, Error)> {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu(t) => t.send_request(transaction, ctx),
            #[cfg(feature = "tcp")]
            Self::Ip(t) => t.send_request(transaction, ctx),
            #[cfg(feature = "tunnel")]
            Self::Tunnel(t) => t.send_request(transaction, ctx),
        }
    }

    /// Feeds inbound connection bytes into the framing state machine.
    pub(crate) fn on_data(&mut self, bytes: Bytes, ctx: &mut Context<'_>) -> Vec<Outcome> {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu(t) => {
                t.on_data(bytes, ctx);
                Vec::new()
            }
            #[cfg(feature = "tcp")]
            Self::Ip(t) => t.on_data(bytes, ctx),
            #[cfg(feature = "tunnel")]
            Self::Tunnel(t) => {
                t.on_data(bytes, ctx);
                Vec::new()
            }
        }
    }

    /// The serial idle gap elapsed: parse the accumulated frame.
    pub(crate) fn on_eof(&mut self, ctx: &mut Context<'_>) -> Vec<Outcome> {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu(t) => t.on_eof(ctx),
            #[cfg(feature = "tcp")]
            Self::Ip(_) => Vec::new(),
            #[cfg(feature = "tunnel")]
            Self::Tunnel(t) => t.on_eof(ctx),
        }
    }

    /// Removes the transaction whose response timer fired.
    pub(crate) fn take_timed_out(&mut self, id: TransactionId) -> Option<Transaction> {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu(t) => t.take(id),
            #[cfg(feature = "tcp")]
            Self::Ip(t) => t.take(id),
            #[cfg(feature = "tunnel")]
            Self::Tunnel(t) => t.take(id),
        }
    }

    /// Removes a transaction for cancellation, disarming its timer.
    pub(crate) fn cancel(
        &mut self,
        id: TransactionId,
        ctx: &mut Context<'_>,
    ) -> Option<Transaction> {
        let mut transaction = self.take_timed_out(id)?;
        ctx.disarm_timer(&mut transaction);
        Some(transaction)
    }

    /// Removes all owned transactions, e.g. when the connection closed.
    pub(crate) fn take_all(&mut self, ctx: &mut Context<'_>) -> Vec<Transaction> {
        let mut transactions = match self {
            #[cfg(feature = "rtu")]
            Self::Rtu(t) => t.take_all(),
            #[cfg(feature = "tcp")]
            Self::Ip(t) => t.take_all(),
            #[cfg(feature = "tunnel")]
            Self::Tunnel(t) => t.take_all(),
        };
        for transaction in &mut transactions {
            ctx.disarm_timer(transaction);
        }
        transactions
    }
}
