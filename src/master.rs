// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The public master API and its service task.
//!
//! All transport state lives inside one spawned task; the [`Master`]
//! handle and the [`TransactionHandle`]s only talk to it over channels.
//! This is the single ownership boundary that serializes every state
//! mutation.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use futures_util::StreamExt as _;
use tokio::sync::{mpsc, oneshot};
use tokio_util::time::DelayQueue;

use crate::{
    connection::{Connection, ConnectionEvent},
    error::Error,
    frame::{Quantity, Request, Word},
    transaction::{Completion, Disposition, Transaction, TransactionEvent, TransactionId},
    transport::{Context, Outcome, Timer, Transport},
    unit::{Unit, UnitId},
};

#[cfg(feature = "rtu")]
use crate::transport::rtu::{RtuConfig, RtuTransport};
#[cfg(feature = "tcp")]
use crate::transport::tcp::{IpConfig, IpTransport};
#[cfg(feature = "tunnel")]
use crate::transport::tunnel::{TunnelConfig, TunnelTransport};

use crate::bytes::Bytes;
use crate::frame::{Address, Coil, FileRecord, FileRecordData};

/// Selects the framing state machine.
#[derive(Debug, Clone)]
pub enum TransportConfig {
    #[cfg(feature = "rtu")]
    Rtu(RtuConfig),
    #[cfg(feature = "tcp")]
    Ip(IpConfig),
    #[cfg(feature = "tunnel")]
    Tunnel(TunnelConfig),
}

/// Master configuration.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub transport: TransportConfig,
    /// When set, terminal errors are only delivered on the completion
    /// path and never published on the master's error channel.
    pub suppress_transaction_errors: bool,
    /// Retry exception responses against the retry budget instead of
    /// completing with the exception exposed.
    pub retry_on_exception: bool,
    /// Requests beyond this many in flight queue in FIFO order.
    pub max_concurrent_requests: u16,
    /// Target unit when a request does not override it.
    pub default_unit: UnitId,
    /// Initial retry budget when a request does not override it.
    pub default_max_retries: u8,
    /// Per-attempt timeout when a request does not override it.
    pub default_timeout: Duration,
}

impl MasterConfig {
    #[must_use]
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            transport,
            suppress_transaction_errors: false,
            retry_on_exception: false,
            max_concurrent_requests: 1,
            default_unit: 1,
            default_max_retries: 0,
            default_timeout: Duration::from_millis(1000),
        }
    }
}

/// Per-call overrides of the configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    pub unit: Option<UnitId>,
    pub max_retries: Option<u8>,
    pub timeout: Option<Duration>,
}

impl CallOptions {
    #[must_use]
    pub fn unit(unit: UnitId) -> Self {
        Self {
            unit: Some(unit),
            ..Self::default()
        }
    }
}

enum Command {
    Submit(Transaction),
    Cancel(TransactionId),
    Destroy,
}

/// Handle of one submitted transaction.
#[derive(Debug)]
pub struct TransactionHandle {
    id: TransactionId,
    cmd_tx: mpsc::UnboundedSender<Command>,
    done: oneshot::Receiver<Completion>,
    events: mpsc::UnboundedReceiver<TransactionEvent>,
}

impl TransactionHandle {
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Cancels the transaction. The completion resolves with
    /// `Err(Cancelled)`; a response arriving afterwards is dropped.
    pub fn cancel(&self) {
        let _ = self.cmd_tx.send(Command::Cancel(self.id));
    }

    /// Waits for the terminal outcome.
    pub async fn completed(self) -> Completion {
        self.done.await.unwrap_or(Err(Error::Cancelled))
    }

    /// Lifecycle notifications of this transaction.
    pub fn events(&mut self) -> &mut mpsc::UnboundedReceiver<TransactionEvent> {
        &mut self.events
    }
}

/// A Modbus master over one connection.
///
/// Dropping the master destroys the service task, cancelling every
/// queued and in-flight transaction.
#[derive(Debug)]
pub struct Master {
    cmd_tx: mpsc::UnboundedSender<Command>,
    next_id: AtomicU64,
    errors: Option<mpsc::UnboundedReceiver<Error>>,
    default_unit: UnitId,
    default_max_retries: u8,
    default_timeout: Duration,
}

impl Master {
    /// Spawns the service task over the given connection.
    ///
    /// The embedder keeps feeding `events` from its connection driver;
    /// the master starts out disconnected until the first
    /// [`ConnectionEvent::Open`] arrives (requests submitted before that
    /// are queued).
    #[must_use]
    pub fn new(
        config: MasterConfig,
        conn: Box<dyn Connection>,
        events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();

        let transport = match config.transport.clone() {
            #[cfg(feature = "rtu")]
            TransportConfig::Rtu(rtu) => Transport::Rtu(RtuTransport::new(rtu)),
            #[cfg(feature = "tcp")]
            TransportConfig::Ip(ip) => Transport::Ip(IpTransport::new(ip)),
            #[cfg(feature = "tunnel")]
            TransportConfig::Tunnel(tunnel) => Transport::Tunnel(TunnelTransport::new(tunnel)),
        };

        let connected = conn.is_open();
        let service = Service {
            suppress_transaction_errors: config.suppress_transaction_errors,
            retry_on_exception: config.retry_on_exception,
            max_concurrent: usize::from(config.max_concurrent_requests.max(1)),
            transport,
            conn,
            conn_rx: events,
            cmd_rx,
            error_tx,
            timers: DelayQueue::new(),
            queue: VecDeque::new(),
            active: 0,
            connected,
        };
        tokio::spawn(service.run());

        Self {
            cmd_tx,
            next_id: AtomicU64::new(1),
            errors: Some(error_rx),
            default_unit: config.default_unit,
            default_max_retries: config.default_max_retries,
            default_timeout: config.default_timeout,
        }
    }

    /// Terminal errors of all transactions, unless
    /// `suppress_transaction_errors` is configured. Can be taken once.
    pub fn take_error_events(&mut self) -> Option<mpsc::UnboundedReceiver<Error>> {
        self.errors.take()
    }

    /// Cancels everything and tears the transport down.
    pub fn destroy(&self) {
        let _ = self.cmd_tx.send(Command::Destroy);
    }

    /// Validates and submits a request, returning its handle.
    ///
    /// Validation failures (`InvalidOptions`) are reported synchronously
    /// and nothing is submitted.
    pub fn submit(&self, request: Request, opts: CallOptions) -> Result<TransactionHandle, Error> {
        request.validate()?;
        let unit = Unit::new(opts.unit.unwrap_or(self.default_unit))
            .ok_or(Error::InvalidOptions("unit id must be in 0..=247"))?;

        let id = TransactionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (done_tx, done_rx) = oneshot::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transaction = Transaction::new(
            id,
            request,
            unit.id(),
            opts.max_retries.unwrap_or(self.default_max_retries),
            opts.timeout.unwrap_or(self.default_timeout),
            done_tx,
            events_tx,
        );
        self.cmd_tx
            .send(Command::Submit(transaction))
            .map_err(|_| Error::ConnectionClosed)?;

        Ok(TransactionHandle {
            id,
            cmd_tx: self.cmd_tx.clone(),
            done: done_rx,
            events: events_rx,
        })
    }

    /// Read multiple coils (0x01).
    pub fn read_coils(
        &self,
        addr: Address,
        cnt: Quantity,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::ReadCoils(addr, cnt), opts)
    }

    /// Read multiple discrete inputs (0x02).
    pub fn read_discrete_inputs(
        &self,
        addr: Address,
        cnt: Quantity,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::ReadDiscreteInputs(addr, cnt), opts)
    }

    /// Read multiple holding registers (0x03).
    pub fn read_holding_registers(
        &self,
        addr: Address,
        cnt: Quantity,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::ReadHoldingRegisters(addr, cnt), opts)
    }

    /// Read multiple input registers (0x04).
    pub fn read_input_registers(
        &self,
        addr: Address,
        cnt: Quantity,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::ReadInputRegisters(addr, cnt), opts)
    }

    /// Write a single coil (0x05).
    pub fn write_single_coil(
        &self,
        addr: Address,
        coil: Coil,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::WriteSingleCoil(addr, coil), opts)
    }

    /// Write a single holding register (0x06).
    pub fn write_single_register(
        &self,
        addr: Address,
        word: Word,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::WriteSingleRegister(addr, word), opts)
    }

    /// Read a diagnostic value (0x08).
    pub fn read_diagnostics(
        &self,
        sub_function: u16,
        data: Word,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::ReadDiagnostics(sub_function, data), opts)
    }

    /// Write multiple coils (0x0F).
    pub fn write_multiple_coils(
        &self,
        addr: Address,
        coils: Vec<Coil>,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::WriteMultipleCoils(addr, coils), opts)
    }

    /// Write multiple holding registers (0x10).
    pub fn write_multiple_registers(
        &self,
        addr: Address,
        words: Vec<Word>,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::WriteMultipleRegisters(addr, words), opts)
    }

    /// Read the slave identification (0x11).
    pub fn report_slave_id(&self, opts: CallOptions) -> Result<TransactionHandle, Error> {
        self.submit(Request::ReportSlaveId, opts)
    }

    /// Read file records (0x14).
    pub fn read_file_record(
        &self,
        records: Vec<FileRecord>,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::ReadFileRecord(records), opts)
    }

    /// Write file records (0x15).
    pub fn write_file_record(
        &self,
        records: Vec<FileRecordData>,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::WriteFileRecord(records), opts)
    }

    /// Read bytes from a byte FIFO (0x41).
    pub fn read_fifo8(
        &self,
        id: u8,
        max_count: u8,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::ReadFifo8 { id, max_count }, opts)
    }

    /// Append bytes to a byte FIFO (0x42).
    pub fn write_fifo8(
        &self,
        id: u8,
        data: Bytes,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::WriteFifo8 { id, data }, opts)
    }

    /// Read an object (0x43).
    pub fn read_object(&self, id: u8, opts: CallOptions) -> Result<TransactionHandle, Error> {
        self.submit(Request::ReadObject { id }, opts)
    }

    /// Write an object (0x44).
    pub fn write_object(
        &self,
        id: u8,
        data: Bytes,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::WriteObject { id, data }, opts)
    }

    /// Read raw memory (0x45).
    pub fn read_memory(
        &self,
        address: Address,
        count: u8,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::ReadMemory { address, count }, opts)
    }

    /// Write raw memory (0x46).
    pub fn write_memory(
        &self,
        address: Address,
        data: Bytes,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::WriteMemory { address, data }, opts)
    }

    /// Execute a device command (0x47).
    pub fn command(
        &self,
        id: u8,
        data: Bytes,
        opts: CallOptions,
    ) -> Result<TransactionHandle, Error> {
        self.submit(Request::Command { id, data }, opts)
    }
}

impl Drop for Master {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Destroy);
    }
}

/// What one `select!` round produced.
enum Tick {
    Cmd(Option<Command>),
    Conn(Option<ConnectionEvent>),
    Timer(Timer),
}

struct Service {
    suppress_transaction_errors: bool,
    retry_on_exception: bool,
    max_concurrent: usize,
    transport: Transport,
    conn: Box<dyn Connection>,
    conn_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    error_tx: mpsc::UnboundedSender<Error>,
    timers: DelayQueue<Timer>,
    queue: VecDeque<Transaction>,
    /// Transactions currently owned by the transport.
    active: usize,
    connected: bool,
}

impl Service {
    async fn run(mut self) {
        loop {
            let tick = tokio::select! {
                cmd = self.cmd_rx.recv() => Tick::Cmd(cmd),
                ev = self.conn_rx.recv() => Tick::Conn(ev),
                Some(expired) = self.timers.next() => Tick::Timer(expired.into_inner()),
            };
            match tick {
                Tick::Cmd(Some(Command::Submit(transaction))) => self.submit(transaction),
                Tick::Cmd(Some(Command::Cancel(id))) => self.cancel(id),
                Tick::Cmd(Some(Command::Destroy) | None) => {
                    self.destroy();
                    return;
                }
                Tick::Conn(Some(ConnectionEvent::Open)) => {
                    log::debug!("Connection open");
                    self.connected = true;
                    self.drain_queue();
                }
                Tick::Conn(Some(ConnectionEvent::Close)) => {
                    log::debug!("Connection closed");
                    self.connected = false;
                    self.fail_in_flight(Error::ConnectionClosed);
                }
                Tick::Conn(Some(ConnectionEvent::Error(err))) => {
                    log::warn!("Connection error: {err}");
                }
                Tick::Conn(Some(ConnectionEvent::Data(bytes))) => {
                    let mut ctx = Context {
                        conn: &mut *self.conn,
                        timers: &mut self.timers,
                    };
                    let outcomes = self.transport.on_data(bytes, &mut ctx);
                    self.handle_outcomes(outcomes);
                }
                Tick::Conn(None) => {
                    log::debug!("Connection event channel dropped");
                    self.destroy();
                    return;
                }
                Tick::Timer(Timer::Eof) => {
                    let mut ctx = Context {
                        conn: &mut *self.conn,
                        timers: &mut self.timers,
                    };
                    let outcomes = self.transport.on_eof(&mut ctx);
                    self.handle_outcomes(outcomes);
                }
                Tick::Timer(Timer::Response(id)) => self.on_timeout(id),
            }
        }
    }

    fn submit(&mut self, transaction: Transaction) {
        if !self.connected || self.active >= self.max_concurrent {
            self.queue.push_back(transaction);
            return;
        }
        self.dispatch(transaction);
    }

    /// Hands a transaction to the transport for its first attempt.
    fn dispatch(&mut self, transaction: Transaction) {
        let mut ctx = Context {
            conn: &mut *self.conn,
            timers: &mut self.timers,
        };
        match self.transport.send_request(transaction, &mut ctx) {
            Ok(()) => self.active += 1,
            Err((mut transaction, err)) => {
                // The ceiling rejection is not retriable; deliver without
                // touching the active count, the transport never owned
                // this transaction.
                if let Disposition::Deliver(completion) = transaction.on_error(err) {
                    if let Err(err) = &completion {
                        self.publish_error(err);
                    }
                    transaction.complete(completion);
                }
            }
        }
    }

    /// Re-issues a transaction that still has budget. The transport just
    /// released it, so there is room.
    fn resend(&mut self, transaction: Transaction) {
        log::debug!("Retrying transaction {:?}", transaction.id());
        let mut ctx = Context {
            conn: &mut *self.conn,
            timers: &mut self.timers,
        };
        if let Err((transaction, err)) = self.transport.send_request(transaction, &mut ctx) {
            self.finish(transaction, Err(err));
        }
    }

    fn handle_outcomes(&mut self, outcomes: Vec<Outcome>) {
        for outcome in outcomes {
            match outcome {
                Outcome::Response(mut transaction, pdu) => {
                    match transaction.on_response(pdu, self.retry_on_exception) {
                        Disposition::Retry => self.resend(transaction),
                        Disposition::Deliver(completion) => self.finish(transaction, completion),
                    }
                }
                Outcome::Failed(mut transaction, err) => {
                    log::warn!("Transaction {:?} failed: {err}", transaction.id());
                    match transaction.on_error(err) {
                        Disposition::Retry => self.resend(transaction),
                        Disposition::Deliver(completion) => self.finish(transaction, completion),
                    }
                }
            }
        }
        self.drain_queue();
    }

    fn on_timeout(&mut self, id: TransactionId) {
        let Some(mut transaction) = self.transport.take_timed_out(id) else {
            // Stale timer of an already reconciled transaction.
            return;
        };
        transaction.timer_key = None;
        transaction.notify_timeout();
        match transaction.on_error(Error::Timeout) {
            Disposition::Retry => self.resend(transaction),
            Disposition::Deliver(completion) => self.finish(transaction, completion),
        }
        self.drain_queue();
    }

    /// Terminal delivery; the transaction has left the transport.
    fn finish(&mut self, transaction: Transaction, completion: Completion) {
        if let Err(err) = &completion {
            self.publish_error(err);
        }
        transaction.complete(completion);
        self.active = self.active.saturating_sub(1);
    }

    fn fail_in_flight(&mut self, err: Error) {
        let mut ctx = Context {
            conn: &mut *self.conn,
            timers: &mut self.timers,
        };
        let transactions = self.transport.take_all(&mut ctx);
        for mut transaction in transactions {
            match transaction.on_error(err.clone()) {
                // Non-retriable by classification, but match for form.
                Disposition::Retry => self.resend(transaction),
                Disposition::Deliver(completion) => self.finish(transaction, completion),
            }
        }
    }

    fn cancel(&mut self, id: TransactionId) {
        if let Some(pos) = self.queue.iter().position(|t| t.id() == id) {
            if let Some(transaction) = self.queue.remove(pos) {
                transaction.cancel();
            }
            return;
        }
        let mut ctx = Context {
            conn: &mut *self.conn,
            timers: &mut self.timers,
        };
        if let Some(transaction) = self.transport.cancel(id, &mut ctx) {
            transaction.cancel();
            self.active = self.active.saturating_sub(1);
            self.drain_queue();
        }
    }

    fn drain_queue(&mut self) {
        while self.connected && self.active < self.max_concurrent {
            let Some(transaction) = self.queue.pop_front() else {
                return;
            };
            self.dispatch(transaction);
        }
    }

    fn publish_error(&self, err: &Error) {
        if !self.suppress_transaction_errors {
            let _ = self.error_tx.send(err.clone());
        }
    }

    fn destroy(&mut self) {
        for transaction in self.queue.drain(..) {
            transaction.cancel();
        }
        let mut ctx = Context {
            conn: &mut *self.conn,
            timers: &mut self.timers,
        };
        for transaction in self.transport.take_all(&mut ctx) {
            transaction.cancel();
        }
        self.conn.destroy();
    }
}
