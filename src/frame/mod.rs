// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request, response and exception value types.

#[cfg(feature = "rtu")]
pub(crate) mod rtu;

#[cfg(feature = "tcp")]
pub(crate) mod tcp;

#[cfg(feature = "tunnel")]
pub(crate) mod tunnel;

use std::{error, fmt};

use crate::bytes::Bytes;

/// A Modbus function code is represented by an unsigned 8 bit integer.
pub type FunctionCode = u8;

/// A Modbus protocol address is represented by 16 bit from `0` to `65535`.
pub type Address = u16;

/// A coil represents a single bit.
///
/// - `true` is equivalent to `ON`, `1` and `0xFF00`.
/// - `false` is equivalent to `OFF`, `0` and `0x0000`.
pub type Coil = bool;

/// Modbus uses 16 bit for its data items, transmitted big-endian.
pub type Word = u16;

/// Number of items to process.
pub type Quantity = u16;

/// Function code constants, including the vendor extension range.
pub(crate) mod fn_code {
    pub(crate) const READ_COILS: u8 = 0x01;
    pub(crate) const READ_DISCRETE_INPUTS: u8 = 0x02;
    pub(crate) const READ_HOLDING_REGISTERS: u8 = 0x03;
    pub(crate) const READ_INPUT_REGISTERS: u8 = 0x04;
    pub(crate) const WRITE_SINGLE_COIL: u8 = 0x05;
    pub(crate) const WRITE_SINGLE_REGISTER: u8 = 0x06;
    pub(crate) const READ_DIAGNOSTICS: u8 = 0x08;
    pub(crate) const WRITE_MULTIPLE_COILS: u8 = 0x0F;
    pub(crate) const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
    pub(crate) const REPORT_SLAVE_ID: u8 = 0x11;
    pub(crate) const READ_FILE_RECORD: u8 = 0x14;
    pub(crate) const WRITE_FILE_RECORD: u8 = 0x15;
    pub(crate) const READ_FIFO8: u8 = 0x41;
    pub(crate) const WRITE_FIFO8: u8 = 0x42;
    pub(crate) const READ_OBJECT: u8 = 0x43;
    pub(crate) const WRITE_OBJECT: u8 = 0x44;
    pub(crate) const READ_MEMORY: u8 = 0x45;
    pub(crate) const WRITE_MEMORY: u8 = 0x46;
    pub(crate) const COMMAND: u8 = 0x47;

    /// In the tunnel dialect the external bus master polls our slave id
    /// with this code to give us a transmit opportunity.
    pub(crate) const SLAVE_COMMAND: u8 = COMMAND;
}

/// A request represents a message from the master to a device.
///
/// All payloads are owned so that a request can be cached inside a
/// transaction for the whole retry lifetime without borrowing from
/// anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Read multiple coils (0x01).
    ReadCoils(Address, Quantity),

    /// Read multiple discrete inputs (0x02).
    ReadDiscreteInputs(Address, Quantity),

    /// Read multiple holding registers (0x03).
    ReadHoldingRegisters(Address, Quantity),

    /// Read multiple input registers (0x04).
    ReadInputRegisters(Address, Quantity),

    /// Write a single coil (0x05).
    WriteSingleCoil(Address, Coil),

    /// Write a single holding register (0x06).
    WriteSingleRegister(Address, Word),

    /// Read a diagnostic value (0x08).
    /// The first parameter is the sub-function, the second the request data.
    ReadDiagnostics(u16, Word),

    /// Write multiple coils (0x0F).
    WriteMultipleCoils(Address, Vec<Coil>),

    /// Write multiple holding registers (0x10).
    WriteMultipleRegisters(Address, Vec<Word>),

    /// Read the slave identification (0x11).
    ReportSlaveId,

    /// Read file records (0x14), one sub-request per element.
    ReadFileRecord(Vec<FileRecord>),

    /// Write file records (0x15), one sub-request per element.
    WriteFileRecord(Vec<FileRecordData>),

    /// Read up to `max_count` bytes from a byte FIFO (0x41, vendor).
    ReadFifo8 { id: u8, max_count: u8 },

    /// Append bytes to a byte FIFO (0x42, vendor).
    WriteFifo8 { id: u8, data: Bytes },

    /// Read an object by id (0x43, vendor).
    ReadObject { id: u8 },

    /// Write an object by id (0x44, vendor).
    WriteObject { id: u8, data: Bytes },

    /// Read `count` bytes of raw memory (0x45, vendor).
    ReadMemory { address: Address, count: u8 },

    /// Write raw memory (0x46, vendor).
    WriteMemory { address: Address, data: Bytes },

    /// Execute a device command (0x47, vendor).
    Command { id: u8, data: Bytes },
}

/// The data of a successful response.
///
/// `ReadCoils`/`ReadDiscreteInputs` vectors are truncated to the quantity
/// that was requested; trailing pad bits of the last byte on the wire are
/// not exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Response to a `ReadCoils` request.
    ReadCoils(Vec<Coil>),

    /// Response to a `ReadDiscreteInputs` request.
    ReadDiscreteInputs(Vec<Coil>),

    /// Response to a `ReadHoldingRegisters` request.
    ReadHoldingRegisters(Vec<Word>),

    /// Response to a `ReadInputRegisters` request.
    ReadInputRegisters(Vec<Word>),

    /// Echo of a `WriteSingleCoil` request.
    WriteSingleCoil(Address, Coil),

    /// Echo of a `WriteSingleRegister` request.
    WriteSingleRegister(Address, Word),

    /// Response to a `ReadDiagnostics` request: sub-function and data.
    ReadDiagnostics(u16, Word),

    /// Response to a `WriteMultipleCoils` request: start address and
    /// quantity written.
    WriteMultipleCoils(Address, Quantity),

    /// Response to a `WriteMultipleRegisters` request: start address and
    /// quantity written.
    WriteMultipleRegisters(Address, Quantity),

    /// Response to a `ReportSlaveId` request.
    ReportSlaveId(SlaveIdInfo),

    /// Response to a `ReadFileRecord` request: the record data of each
    /// sub-request, in request order.
    ReadFileRecord(Vec<Vec<Word>>),

    /// Echo of a `WriteFileRecord` request.
    WriteFileRecord(Vec<FileRecordData>),

    /// Response to a `ReadFifo8` request.
    ReadFifo8 { status: u8, data: Bytes },

    /// Response to a `WriteFifo8` request: number of bytes accepted.
    WriteFifo8 { count: u8 },

    /// Response to a `ReadObject` request.
    ReadObject { data: Bytes },

    /// Response to a `WriteObject` request.
    WriteObject { status: u8 },

    /// Response to a `ReadMemory` request.
    ReadMemory { data: Bytes },

    /// Response to a `WriteMemory` request.
    WriteMemory { status: u8 },

    /// Response to a `Command` request.
    Command { id: u8, data: Bytes },
}

/// One sub-request of a `ReadFileRecord` request (reference type 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRecord {
    pub file_number: u16,
    pub record_number: u16,
    pub record_length: u16,
}

/// One sub-request of a `WriteFileRecord` request, and one element of its
/// echoed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecordData {
    pub file_number: u16,
    pub record_number: u16,
    pub data: Vec<Word>,
}

/// Decoded payload of a `ReportSlaveId` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveIdInfo {
    pub product_id: u8,
    /// `true` when the device reports RUN (wire value other than `0x00`).
    pub run_indicator: bool,
    /// Firmware version triple (major, minor, patch).
    pub version: (u8, u8, u8),
    /// Additional vendor-defined values, 0-243 bytes.
    pub extra: Bytes,
}

impl Request {
    /// The function code of this request on the wire.
    #[must_use]
    pub fn function_code(&self) -> FunctionCode {
        use fn_code::*;
        match self {
            Self::ReadCoils(..) => READ_COILS,
            Self::ReadDiscreteInputs(..) => READ_DISCRETE_INPUTS,
            Self::ReadHoldingRegisters(..) => READ_HOLDING_REGISTERS,
            Self::ReadInputRegisters(..) => READ_INPUT_REGISTERS,
            Self::WriteSingleCoil(..) => WRITE_SINGLE_COIL,
            Self::WriteSingleRegister(..) => WRITE_SINGLE_REGISTER,
            Self::ReadDiagnostics(..) => READ_DIAGNOSTICS,
            Self::WriteMultipleCoils(..) => WRITE_MULTIPLE_COILS,
            Self::WriteMultipleRegisters(..) => WRITE_MULTIPLE_REGISTERS,
            Self::ReportSlaveId => REPORT_SLAVE_ID,
            Self::ReadFileRecord(..) => READ_FILE_RECORD,
            Self::WriteFileRecord(..) => WRITE_FILE_RECORD,
            Self::ReadFifo8 { .. } => READ_FIFO8,
            Self::WriteFifo8 { .. } => WRITE_FIFO8,
            Self::ReadObject { .. } => READ_OBJECT,
            Self::WriteObject { .. } => WRITE_OBJECT,
            Self::ReadMemory { .. } => READ_MEMORY,
            Self::WriteMemory { .. } => WRITE_MEMORY,
            Self::Command { .. } => COMMAND,
        }
    }
}

impl Response {
    /// The function code of this response on the wire.
    #[must_use]
    pub fn function_code(&self) -> FunctionCode {
        use fn_code::*;
        match self {
            Self::ReadCoils(..) => READ_COILS,
            Self::ReadDiscreteInputs(..) => READ_DISCRETE_INPUTS,
            Self::ReadHoldingRegisters(..) => READ_HOLDING_REGISTERS,
            Self::ReadInputRegisters(..) => READ_INPUT_REGISTERS,
            Self::WriteSingleCoil(..) => WRITE_SINGLE_COIL,
            Self::WriteSingleRegister(..) => WRITE_SINGLE_REGISTER,
            Self::ReadDiagnostics(..) => READ_DIAGNOSTICS,
            Self::WriteMultipleCoils(..) => WRITE_MULTIPLE_COILS,
            Self::WriteMultipleRegisters(..) => WRITE_MULTIPLE_REGISTERS,
            Self::ReportSlaveId(..) => REPORT_SLAVE_ID,
            Self::ReadFileRecord(..) => READ_FILE_RECORD,
            Self::WriteFileRecord(..) => WRITE_FILE_RECORD,
            Self::ReadFifo8 { .. } => READ_FIFO8,
            Self::WriteFifo8 { .. } => WRITE_FIFO8,
            Self::ReadObject { .. } => READ_OBJECT,
            Self::WriteObject { .. } => WRITE_OBJECT,
            Self::ReadMemory { .. } => READ_MEMORY,
            Self::WriteMemory { .. } => WRITE_MEMORY,
            Self::Command { .. } => COMMAND,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadCoils(addr, qty) => write!(f, "read {qty} coils from {addr}"),
            Self::ReadDiscreteInputs(addr, qty) => {
                write!(f, "read {qty} discrete inputs from {addr}")
            }
            Self::ReadHoldingRegisters(addr, qty) => {
                write!(f, "read {qty} holding registers from {addr}")
            }
            Self::ReadInputRegisters(addr, qty) => {
                write!(f, "read {qty} input registers from {addr}")
            }
            Self::WriteSingleCoil(addr, state) => {
                write!(f, "write coil {addr} = {}", if *state { "ON" } else { "OFF" })
            }
            Self::WriteSingleRegister(addr, word) => {
                write!(f, "write register {addr} = {word}")
            }
            Self::ReadDiagnostics(sub, data) => {
                write!(f, "read diagnostics sub-function {sub} (data 0x{data:04X})")
            }
            Self::WriteMultipleCoils(addr, coils) => {
                write!(f, "write {} coils from {addr}", coils.len())
            }
            Self::WriteMultipleRegisters(addr, words) => {
                write!(f, "write {} registers from {addr}", words.len())
            }
            Self::ReportSlaveId => write!(f, "report slave id"),
            Self::ReadFileRecord(records) => {
                write!(f, "read {} file record(s)", records.len())
            }
            Self::WriteFileRecord(records) => {
                write!(f, "write {} file record(s)", records.len())
            }
            Self::ReadFifo8 { id, max_count } => {
                write!(f, "read up to {max_count} bytes from FIFO {id}")
            }
            Self::WriteFifo8 { id, data } => {
                write!(f, "write {} bytes to FIFO {id}", data.len())
            }
            Self::ReadObject { id } => write!(f, "read object {id}"),
            Self::WriteObject { id, data } => {
                write!(f, "write object {id} ({} bytes)", data.len())
            }
            Self::ReadMemory { address, count } => {
                write!(f, "read {count} bytes of memory from 0x{address:04X}")
            }
            Self::WriteMemory { address, data } => {
                write!(f, "write {} bytes of memory to 0x{address:04X}", data.len())
            }
            Self::Command { id, data } => {
                write!(f, "command {id} ({} bytes)", data.len())
            }
        }
    }
}

/// A device exception code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Exception {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    NegativeAcknowledge = 0x07,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDevice = 0x0B,
}

impl From<Exception> for u8 {
    fn from(from: Exception) -> Self {
        from as u8
    }
}

impl Exception {
    pub(crate) fn description(&self) -> &str {
        use Exception::*;

        match *self {
            IllegalFunction => "Illegal function",
            IllegalDataAddress => "Illegal data address",
            IllegalDataValue => "Illegal data value",
            ServerDeviceFailure => "Server device failure",
            Acknowledge => "Acknowledge",
            ServerDeviceBusy => "Server device busy",
            NegativeAcknowledge => "Negative acknowledge",
            MemoryParityError => "Memory parity error",
            GatewayPathUnavailable => "Gateway path unavailable",
            GatewayTargetDevice => "Gateway target device failed to respond",
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl error::Error for Exception {}

/// A device exception response.
///
/// `function` carries the original function code; on the wire the high bit
/// is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionResponse {
    pub function: FunctionCode,
    pub exception: Exception,
}

impl fmt::Display for ExceptionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modbus function {}: {}", self.function, self.exception)
    }
}

impl error::Error for ExceptionResponse {}

/// Either a successful response or an exception, as demultiplexed from a
/// response buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePdu(pub Result<Response, ExceptionResponse>);

impl From<Response> for ResponsePdu {
    fn from(from: Response) -> Self {
        ResponsePdu(Ok(from))
    }
}

impl From<ExceptionResponse> for ResponsePdu {
    fn from(from: ExceptionResponse) -> Self {
        ResponsePdu(Err(from))
    }
}

impl From<ResponsePdu> for Result<Response, ExceptionResponse> {
    fn from(from: ResponsePdu) -> Self {
        from.0
    }
}
