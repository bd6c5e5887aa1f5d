// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The narrow byte-stream contract consumed by the transports.
//!
//! Connection drivers (serial ports, sockets, WebSocket or BLE bridges)
//! live outside this crate. They implement [`Connection`] for the outbound
//! direction and feed [`ConnectionEvent`]s into the channel handed to the
//! master for the inbound direction.

use std::{fmt::Debug, io};

use crate::bytes::Bytes;

/// Out-of-band line control, currently only the RS-485 direction pin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlOptions {
    pub rts: Option<bool>,
}

/// A byte-stream endpoint.
///
/// All methods are synchronous and non-blocking; completion and failure
/// of writes surface asynchronously as [`ConnectionEvent`]s.
pub trait Connection: Debug + Send {
    /// Whether the endpoint is currently able to transmit.
    fn is_open(&self) -> bool;

    /// Queues bytes for transmission. Ordering of consecutive writes is
    /// preserved.
    fn write(&mut self, bytes: Bytes);

    /// Applies line control. Optional; the default does nothing.
    fn set(&mut self, _options: ControlOptions) {}

    /// Blocks until queued bytes have left the transmit buffer.
    /// Optional; the default does nothing.
    fn drain(&mut self) {}

    /// Tears the endpoint down. No events fire afterwards.
    fn destroy(&mut self);
}

/// Inbound notifications from a connection driver.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The endpoint became ready.
    Open,
    /// The endpoint went down.
    Close,
    /// The driver reported a failure.
    Error(io::Error),
    /// Bytes arrived.
    Data(Bytes),
}
