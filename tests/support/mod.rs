// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test harness: a channel-backed connection simulating the peer.

#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use bytes::Bytes;
use tokio::sync::mpsc;

use modbus_master::{Connection, ConnectionEvent, Master, MasterConfig};

#[derive(Debug)]
struct MockConnection {
    open: Arc<AtomicBool>,
    destroyed: Arc<AtomicBool>,
    writes: mpsc::UnboundedSender<Bytes>,
}

impl Connection for MockConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn write(&mut self, bytes: Bytes) {
        let _ = self.writes.send(bytes);
    }

    fn destroy(&mut self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// The peer's side of the wire: feed events in, observe writes out.
pub struct Peer {
    pub events: mpsc::UnboundedSender<ConnectionEvent>,
    pub written: mpsc::UnboundedReceiver<Bytes>,
    pub open: Arc<AtomicBool>,
    pub destroyed: Arc<AtomicBool>,
}

impl Peer {
    /// Feeds inbound bytes to the master.
    pub fn send(&self, bytes: impl Into<Bytes>) {
        let _ = self.events.send(ConnectionEvent::Data(bytes.into()));
    }

    /// Awaits the next outbound frame.
    pub async fn next_write(&mut self) -> Bytes {
        self.written.recv().await.expect("connection dropped")
    }

    /// Asserts that nothing else was written.
    pub fn assert_no_more_writes(&mut self) {
        assert!(self.written.try_recv().is_err(), "unexpected write");
    }
}

/// Builds a master over a mock connection that is already open.
pub fn master(config: MasterConfig) -> (Master, Peer) {
    master_with_state(config, true)
}

/// Builds a master over a mock connection in the given open state.
pub fn master_with_state(config: MasterConfig, open: bool) -> (Master, Peer) {
    let _ = env_logger::builder().is_test(true).try_init();

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (write_tx, write_rx) = mpsc::unbounded_channel();
    let open = Arc::new(AtomicBool::new(open));
    let destroyed = Arc::new(AtomicBool::new(false));
    let conn = MockConnection {
        open: Arc::clone(&open),
        destroyed: Arc::clone(&destroyed),
        writes: write_tx,
    };
    let master = Master::new(config, Box::new(conn), event_rx);
    (
        master,
        Peer {
            events: event_tx,
            written: write_rx,
            open,
            destroyed,
        },
    )
}

/// Standard Modbus CRC-16, reimplemented bit-by-bit so that the test
/// vectors do not depend on the code under test.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            let odd = crc & 0x0001 != 0;
            crc >>= 1;
            if odd {
                crc ^= 0xA001;
            }
        }
    }
    crc
}

/// Frames `unit + pdu` as a serial ADU with a trailing CRC (low byte
/// first).
pub fn rtu_frame(unit: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(pdu.len() + 3);
    frame.push(unit);
    frame.extend_from_slice(pdu);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Frames a PDU with an MBAP header.
pub fn mbap_frame(transaction_id: u16, unit: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(pdu.len() + 7);
    frame.extend_from_slice(&transaction_id.to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x00]);
    frame.extend_from_slice(&(pdu.len() as u16 + 1).to_be_bytes());
    frame.push(unit);
    frame.extend_from_slice(pdu);
    frame
}
