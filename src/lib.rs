// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A pure [Rust](https://www.rust-lang.org)
//! [Modbus](https://en.wikipedia.org/wiki/Modbus) master engine
//! based on [tokio](https://tokio.rs).
//!
//! The crate frames, dispatches and reconciles Modbus request/response
//! transactions over three wire formats:
//!
//! - **RTU**: serial line framing with CRC-16 and inter-frame gap
//!   detection, one transaction at a time.
//! - **IP**: MBAP header framing over a stream, many concurrent
//!   transactions multiplexed by transaction id.
//! - **Tunnel**: a non-standard dialect in which this process is a slave
//!   on a bus run by a foreign master and piggybacks its own requests on
//!   polled `SLAVE_COMMAND` exchanges.
//!
//! Connection drivers are not part of this crate: the master consumes any
//! byte-stream endpoint through the narrow [`Connection`] contract plus a
//! channel of [`ConnectionEvent`]s. Serial ports, TCP sockets, WebSocket
//! or BLE bridges all plug in the same way.
//!
//! # Example
//!
//! ```rust,no_run
//! use modbus_master::prelude::*;
//!
//! # async fn run(conn: Box<dyn Connection>, events: tokio::sync::mpsc::UnboundedReceiver<ConnectionEvent>) {
//! let config = MasterConfig::new(TransportConfig::Rtu(RtuConfig::default()));
//! let master = Master::new(config, conn, events);
//!
//! let handle = master
//!     .read_holding_registers(0x082B, 2, CallOptions::unit(1))
//!     .unwrap();
//! match handle.completed().await {
//!     Ok(Ok(response)) => println!("response: {response:?}"),
//!     Ok(Err(exception)) => println!("device exception: {exception}"),
//!     Err(err) => println!("transaction failed: {err}"),
//! }
//! # }
//! ```
//!
//! # Protocol specification
//!
//! - [MODBUS Application Protocol Specification v1.1b3 (PDF)](http://modbus.org/docs/Modbus_Application_Protocol_V1_1b3.pdf)
//! - [MODBUS over serial line specification and implementation guide v1.02 (PDF)](http://modbus.org/docs/Modbus_over_serial_line_V1_02.pdf)
//! - [MODBUS Messaging on TCP/IP Implementation Guide v1.0b (PDF)](http://modbus.org/docs/Modbus_Messaging_Implementation_Guide_V1_0b.pdf)

pub mod prelude;

pub mod connection;

mod codec;
mod error;
mod frame;
mod master;
mod transaction;
mod transport;
mod unit;

// Re-export to decouple the embedder from an explicit dependency.
pub use bytes;

pub use self::{
    connection::{Connection, ConnectionEvent, ControlOptions},
    error::Error,
    frame::{
        Address, Coil, Exception, ExceptionResponse, FileRecord, FileRecordData, FunctionCode,
        Quantity, Request, Response, ResponsePdu, SlaveIdInfo, Word,
    },
    master::{
        CallOptions, Master, MasterConfig, TransactionHandle, TransportConfig,
    },
    transaction::{Completion, TransactionEvent, TransactionId},
    unit::{Unit, UnitId},
};

#[cfg(feature = "rtu")]
pub use self::transport::rtu::RtuConfig;

#[cfg(feature = "tcp")]
pub use self::transport::tcp::IpConfig;

#[cfg(feature = "tunnel")]
pub use self::{
    frame::tunnel::{Sniff, SniffKind},
    transport::tunnel::TunnelConfig,
};
