// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Function code catalog: PDU encoding, decoding and validation.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt as _};

use crate::{
    bytes::{Buf, BufMut, Bytes, BytesMut},
    error::Error,
    frame::{fn_code, *},
};

#[cfg(feature = "rtu")]
pub(crate) mod rtu;

#[cfg(feature = "tcp")]
pub(crate) mod tcp;

#[cfg(feature = "tunnel")]
pub(crate) mod tunnel;

// Length fields of validated requests sit far below the limits of their
// wire-level integer width, so these casts never truncate in practice.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn u16_len(len: usize) -> u16 {
    debug_assert!(u16::try_from(len).is_ok());
    len as u16
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn u8_len(len: usize) -> u8 {
    debug_assert!(u8::try_from(len).is_ok());
    len as u8
}

fn bool_to_coil(state: bool) -> u16 {
    if state {
        0xFF00
    } else {
        0x0000
    }
}

fn coil_to_bool(coil: u16) -> Result<bool, Error> {
    match coil {
        0xFF00 => Ok(true),
        0x0000 => Ok(false),
        _ => Err(Error::InvalidResponseData("invalid coil value")),
    }
}

pub(crate) fn packed_coils_len(bitcount: usize) -> usize {
    bitcount.div_ceil(8)
}

/// Packs coil states LSB-first; trailing bits of the last byte stay zero.
pub(crate) fn pack_coils(coils: &[Coil]) -> Vec<u8> {
    let packed_size = packed_coils_len(coils.len());
    let mut res = vec![0; packed_size];
    for (i, b) in coils.iter().enumerate() {
        let v = u8::from(*b); // 0 or 1
        res[i / 8] |= v << (i % 8);
    }
    res
}

pub(crate) fn unpack_coils(bytes: &[u8], count: u16) -> Vec<Coil> {
    let mut res = Vec::with_capacity(count.into());
    for i in 0usize..count.into() {
        res.push((bytes[i / 8] >> (i % 8)) & 0b1 > 0);
    }
    res
}

fn read_u8(rdr: &mut Cursor<&Bytes>) -> Result<u8, Error> {
    rdr.read_u8().map_err(|_| Error::IncompletePdu)
}

fn read_u16(rdr: &mut Cursor<&Bytes>) -> Result<u16, Error> {
    rdr.read_u16::<BigEndian>().map_err(|_| Error::IncompletePdu)
}

impl Request {
    /// Range-check all fields the way the wire layout bounds them.
    ///
    /// Called once before a request is ever submitted; encoding assumes a
    /// validated request.
    pub fn validate(&self) -> Result<(), Error> {
        use Request::*;
        match self {
            ReadCoils(_, quantity) | ReadDiscreteInputs(_, quantity) => {
                if !(1..=2000).contains(quantity) {
                    return Err(Error::InvalidOptions("quantity must be in 1..=2000"));
                }
            }
            ReadHoldingRegisters(_, quantity) | ReadInputRegisters(_, quantity) => {
                if !(1..=125).contains(quantity) {
                    return Err(Error::InvalidOptions("quantity must be in 1..=125"));
                }
            }
            WriteSingleCoil(..) | WriteSingleRegister(..) | ReadDiagnostics(..)
            | ReportSlaveId | ReadObject { .. } => {}
            WriteMultipleCoils(_, coils) => {
                if !(1..=1968).contains(&coils.len()) {
                    return Err(Error::InvalidOptions("coil count must be in 1..=1968"));
                }
            }
            WriteMultipleRegisters(_, words) => {
                if !(1..=123).contains(&words.len()) {
                    return Err(Error::InvalidOptions("register count must be in 1..=123"));
                }
            }
            ReadFileRecord(records) => {
                if !(1..=35).contains(&records.len()) {
                    return Err(Error::InvalidOptions("sub-request count must be in 1..=35"));
                }
                for record in records {
                    if record.record_number > 0x270F {
                        return Err(Error::InvalidOptions("record number must be <= 9999"));
                    }
                    if !(1..=124).contains(&record.record_length) {
                        return Err(Error::InvalidOptions("record length must be in 1..=124"));
                    }
                }
            }
            WriteFileRecord(records) => {
                if records.is_empty() {
                    return Err(Error::InvalidOptions("at least one sub-request required"));
                }
                let byte_count: usize = records.iter().map(|r| 7 + 2 * r.data.len()).sum();
                if byte_count > 245 {
                    return Err(Error::InvalidOptions("request data exceeds 245 bytes"));
                }
                for record in records {
                    if record.record_number > 0x270F {
                        return Err(Error::InvalidOptions("record number must be <= 9999"));
                    }
                    if record.data.is_empty() {
                        return Err(Error::InvalidOptions("record data must not be empty"));
                    }
                }
            }
            ReadFifo8 { max_count, .. } => {
                if !(1..=250).contains(max_count) {
                    return Err(Error::InvalidOptions("max count must be in 1..=250"));
                }
            }
            WriteFifo8 { data, .. } | WriteObject { data, .. } => {
                if !(1..=250).contains(&data.len()) {
                    return Err(Error::InvalidOptions("byte count must be in 1..=250"));
                }
            }
            ReadMemory { count, .. } => {
                if !(1..=250).contains(count) {
                    return Err(Error::InvalidOptions("byte count must be in 1..=250"));
                }
            }
            WriteMemory { data, .. } => {
                if !(1..=250).contains(&data.len()) {
                    return Err(Error::InvalidOptions("byte count must be in 1..=250"));
                }
            }
            Command { data, .. } => {
                if data.len() > 250 {
                    return Err(Error::InvalidOptions("byte count must be <= 250"));
                }
            }
        }
        Ok(())
    }

    /// Decode the paired response from a raw response PDU.
    ///
    /// Demultiplexes exception responses (first byte > 0x80) and uses the
    /// request context where the wire layout needs it: the requested
    /// quantity delimits coil bits, and `ReadMemory` responses carry raw
    /// data without a length byte.
    pub fn decode_response(&self, bytes: Bytes) -> Result<ResponsePdu, Error> {
        let Some(&code) = bytes.first() else {
            return Err(Error::IncompletePdu);
        };
        if code > 0x80 {
            return ExceptionResponse::try_from(bytes).map(Into::into);
        }
        if code != self.function_code() {
            return Err(Error::InvalidFunctionCode(code));
        }

        let mut rdr = Cursor::new(&bytes);
        rdr.advance(1);

        use Request::*;
        let rsp = match *self {
            ReadCoils(_, quantity) | ReadDiscreteInputs(_, quantity) => {
                let byte_count = read_u8(&mut rdr)?;
                if usize::from(byte_count) != packed_coils_len(quantity.into()) {
                    return Err(Error::InvalidResponseData("unexpected coil byte count"));
                }
                if bytes.len() < 2 + usize::from(byte_count) {
                    return Err(Error::IncompletePdu);
                }
                let coils = unpack_coils(&bytes[2..], quantity);
                if matches!(self, ReadCoils(..)) {
                    Response::ReadCoils(coils)
                } else {
                    Response::ReadDiscreteInputs(coils)
                }
            }
            ReadHoldingRegisters(_, quantity) | ReadInputRegisters(_, quantity) => {
                let byte_count = read_u8(&mut rdr)?;
                if usize::from(byte_count) != 2 * usize::from(quantity) {
                    return Err(Error::InvalidResponseData("unexpected register byte count"));
                }
                let mut data = Vec::with_capacity(quantity.into());
                for _ in 0..quantity {
                    data.push(read_u16(&mut rdr)?);
                }
                if matches!(self, ReadHoldingRegisters(..)) {
                    Response::ReadHoldingRegisters(data)
                } else {
                    Response::ReadInputRegisters(data)
                }
            }
            WriteSingleCoil(..) => {
                let address = read_u16(&mut rdr)?;
                let state = coil_to_bool(read_u16(&mut rdr)?)?;
                Response::WriteSingleCoil(address, state)
            }
            WriteSingleRegister(..) => {
                Response::WriteSingleRegister(read_u16(&mut rdr)?, read_u16(&mut rdr)?)
            }
            ReadDiagnostics(..) => {
                Response::ReadDiagnostics(read_u16(&mut rdr)?, read_u16(&mut rdr)?)
            }
            WriteMultipleCoils(..) => {
                Response::WriteMultipleCoils(read_u16(&mut rdr)?, read_u16(&mut rdr)?)
            }
            WriteMultipleRegisters(..) => {
                Response::WriteMultipleRegisters(read_u16(&mut rdr)?, read_u16(&mut rdr)?)
            }
            ReportSlaveId => {
                let byte_count = read_u8(&mut rdr)?;
                if byte_count < 5 {
                    return Err(Error::InvalidResponseData("slave id data too short"));
                }
                if bytes.len() < 2 + usize::from(byte_count) {
                    return Err(Error::IncompletePdu);
                }
                let product_id = read_u8(&mut rdr)?;
                let run_indicator = read_u8(&mut rdr)? != 0x00;
                let version = (read_u8(&mut rdr)?, read_u8(&mut rdr)?, read_u8(&mut rdr)?);
                let extra = bytes.slice(7..2 + usize::from(byte_count));
                Response::ReportSlaveId(SlaveIdInfo {
                    product_id,
                    run_indicator,
                    version,
                    extra,
                })
            }
            ReadFileRecord(ref records) => {
                let _resp_len = read_u8(&mut rdr)?;
                let mut data = Vec::with_capacity(records.len());
                for record in records {
                    let sub_len = read_u8(&mut rdr)?;
                    if usize::from(sub_len) != 1 + 2 * usize::from(record.record_length) {
                        return Err(Error::InvalidResponseData("unexpected record length"));
                    }
                    let ref_type = read_u8(&mut rdr)?;
                    if ref_type != 0x06 {
                        return Err(Error::InvalidResponseData("invalid reference type"));
                    }
                    let mut words = Vec::with_capacity(record.record_length.into());
                    for _ in 0..record.record_length {
                        words.push(read_u16(&mut rdr)?);
                    }
                    data.push(words);
                }
                Response::ReadFileRecord(data)
            }
            WriteFileRecord(ref records) => {
                let _resp_len = read_u8(&mut rdr)?;
                let mut data = Vec::with_capacity(records.len());
                for _ in records {
                    let ref_type = read_u8(&mut rdr)?;
                    if ref_type != 0x06 {
                        return Err(Error::InvalidResponseData("invalid reference type"));
                    }
                    let file_number = read_u16(&mut rdr)?;
                    let record_number = read_u16(&mut rdr)?;
                    let record_length = read_u16(&mut rdr)?;
                    let mut words = Vec::with_capacity(record_length.into());
                    for _ in 0..record_length {
                        words.push(read_u16(&mut rdr)?);
                    }
                    data.push(FileRecordData {
                        file_number,
                        record_number,
                        data: words,
                    });
                }
                Response::WriteFileRecord(data)
            }
            ReadFifo8 { .. } => {
                let status = read_u8(&mut rdr)?;
                let byte_count = read_u8(&mut rdr)?;
                if bytes.len() < 3 + usize::from(byte_count) {
                    return Err(Error::IncompletePdu);
                }
                Response::ReadFifo8 {
                    status,
                    data: bytes.slice(3..3 + usize::from(byte_count)),
                }
            }
            WriteFifo8 { .. } => {
                let count = read_u8(&mut rdr)?;
                if count > 250 {
                    return Err(Error::InvalidResponseData("invalid byte count"));
                }
                Response::WriteFifo8 { count }
            }
            ReadObject { .. } => {
                let byte_count = read_u8(&mut rdr)?;
                if bytes.len() < 2 + usize::from(byte_count) {
                    return Err(Error::IncompletePdu);
                }
                Response::ReadObject {
                    data: bytes.slice(2..2 + usize::from(byte_count)),
                }
            }
            WriteObject { .. } => Response::WriteObject {
                status: read_u8(&mut rdr)?,
            },
            ReadMemory { count, .. } => {
                // Raw data without a length byte; the requested count is
                // the only delimiter.
                if bytes.len() < 1 + usize::from(count) {
                    return Err(Error::IncompletePdu);
                }
                Response::ReadMemory {
                    data: bytes.slice(1..1 + usize::from(count)),
                }
            }
            WriteMemory { .. } => Response::WriteMemory {
                status: read_u8(&mut rdr)?,
            },
            Command { .. } => {
                let id = read_u8(&mut rdr)?;
                Response::Command {
                    id,
                    data: bytes.slice(2..),
                }
            }
        };
        Ok(rsp.into())
    }
}

impl From<&Request> for Bytes {
    fn from(req: &Request) -> Bytes {
        use Request::*;
        let mut data = BytesMut::with_capacity(8);
        data.put_u8(req.function_code());
        match req {
            ReadCoils(address, quantity)
            | ReadDiscreteInputs(address, quantity)
            | ReadHoldingRegisters(address, quantity)
            | ReadInputRegisters(address, quantity) => {
                data.put_u16(*address);
                data.put_u16(*quantity);
            }
            WriteSingleCoil(address, state) => {
                data.put_u16(*address);
                data.put_u16(bool_to_coil(*state));
            }
            WriteSingleRegister(address, word) => {
                data.put_u16(*address);
                data.put_u16(*word);
            }
            ReadDiagnostics(sub_function, word) => {
                data.put_u16(*sub_function);
                data.put_u16(*word);
            }
            WriteMultipleCoils(address, coils) => {
                data.put_u16(*address);
                data.put_u16(u16_len(coils.len()));
                let packed_coils = pack_coils(coils);
                data.put_u8(u8_len(packed_coils.len()));
                data.put_slice(&packed_coils);
            }
            WriteMultipleRegisters(address, words) => {
                data.put_u16(*address);
                data.put_u16(u16_len(words.len()));
                data.put_u8(u8_len(words.len() * 2));
                for w in words {
                    data.put_u16(*w);
                }
            }
            ReportSlaveId => {}
            ReadFileRecord(records) => {
                data.put_u8(u8_len(records.len() * 7));
                for record in records {
                    data.put_u8(0x06);
                    data.put_u16(record.file_number);
                    data.put_u16(record.record_number);
                    data.put_u16(record.record_length);
                }
            }
            WriteFileRecord(records) => {
                let byte_count: usize = records.iter().map(|r| 7 + 2 * r.data.len()).sum();
                data.put_u8(u8_len(byte_count));
                for record in records {
                    data.put_u8(0x06);
                    data.put_u16(record.file_number);
                    data.put_u16(record.record_number);
                    data.put_u16(u16_len(record.data.len()));
                    for w in &record.data {
                        data.put_u16(*w);
                    }
                }
            }
            ReadFifo8 { id, max_count } => {
                data.put_u8(*id);
                data.put_u8(*max_count);
            }
            WriteFifo8 { id, data: payload } => {
                data.put_u8(*id);
                data.put_u8(u8_len(payload.len()));
                data.put_slice(payload);
            }
            ReadObject { id } => {
                data.put_u8(*id);
            }
            WriteObject { id, data: payload } => {
                data.put_u8(*id);
                data.put_u8(u8_len(payload.len()));
                data.put_slice(payload);
            }
            ReadMemory { address, count } => {
                data.put_u16(*address);
                data.put_u8(*count);
            }
            WriteMemory { address, data: payload } => {
                data.put_u16(*address);
                data.put_slice(payload);
            }
            Command { id, data: payload } => {
                data.put_u8(*id);
                data.put_slice(payload);
            }
        }
        data.freeze()
    }
}

impl TryFrom<Bytes> for Request {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        use fn_code::*;
        use Request::*;
        let mut rdr = Cursor::new(&bytes);
        let code = read_u8(&mut rdr)?;
        let req = match code {
            READ_COILS => ReadCoils(read_u16(&mut rdr)?, read_u16(&mut rdr)?),
            READ_DISCRETE_INPUTS => ReadDiscreteInputs(read_u16(&mut rdr)?, read_u16(&mut rdr)?),
            READ_HOLDING_REGISTERS => {
                ReadHoldingRegisters(read_u16(&mut rdr)?, read_u16(&mut rdr)?)
            }
            READ_INPUT_REGISTERS => ReadInputRegisters(read_u16(&mut rdr)?, read_u16(&mut rdr)?),
            WRITE_SINGLE_COIL => {
                WriteSingleCoil(read_u16(&mut rdr)?, coil_to_bool(read_u16(&mut rdr)?)?)
            }
            WRITE_SINGLE_REGISTER => WriteSingleRegister(read_u16(&mut rdr)?, read_u16(&mut rdr)?),
            READ_DIAGNOSTICS => ReadDiagnostics(read_u16(&mut rdr)?, read_u16(&mut rdr)?),
            WRITE_MULTIPLE_COILS => {
                let address = read_u16(&mut rdr)?;
                let quantity = read_u16(&mut rdr)?;
                let byte_count = read_u8(&mut rdr)?;
                if usize::from(byte_count) != packed_coils_len(quantity.into()) {
                    return Err(Error::InvalidResponseData("unexpected coil byte count"));
                }
                if bytes.len() < 6 + usize::from(byte_count) {
                    return Err(Error::IncompletePdu);
                }
                WriteMultipleCoils(address, unpack_coils(&bytes[6..], quantity))
            }
            WRITE_MULTIPLE_REGISTERS => {
                let address = read_u16(&mut rdr)?;
                let quantity = read_u16(&mut rdr)?;
                let byte_count = read_u8(&mut rdr)?;
                if usize::from(byte_count) != 2 * usize::from(quantity) {
                    return Err(Error::InvalidResponseData("unexpected register byte count"));
                }
                let mut words = Vec::with_capacity(quantity.into());
                for _ in 0..quantity {
                    words.push(read_u16(&mut rdr)?);
                }
                WriteMultipleRegisters(address, words)
            }
            REPORT_SLAVE_ID => ReportSlaveId,
            READ_FILE_RECORD => {
                let byte_count = read_u8(&mut rdr)?;
                if byte_count % 7 != 0 {
                    return Err(Error::InvalidResponseData("unexpected sub-request length"));
                }
                let mut records = Vec::with_capacity(usize::from(byte_count) / 7);
                for _ in 0..byte_count / 7 {
                    let ref_type = read_u8(&mut rdr)?;
                    if ref_type != 0x06 {
                        return Err(Error::InvalidResponseData("invalid reference type"));
                    }
                    records.push(FileRecord {
                        file_number: read_u16(&mut rdr)?,
                        record_number: read_u16(&mut rdr)?,
                        record_length: read_u16(&mut rdr)?,
                    });
                }
                ReadFileRecord(records)
            }
            WRITE_FILE_RECORD => {
                let byte_count = read_u8(&mut rdr)?;
                if bytes.len() < 2 + usize::from(byte_count) {
                    return Err(Error::IncompletePdu);
                }
                let mut records = Vec::new();
                while (rdr.position() as usize) < 2 + usize::from(byte_count) {
                    let ref_type = read_u8(&mut rdr)?;
                    if ref_type != 0x06 {
                        return Err(Error::InvalidResponseData("invalid reference type"));
                    }
                    let file_number = read_u16(&mut rdr)?;
                    let record_number = read_u16(&mut rdr)?;
                    let record_length = read_u16(&mut rdr)?;
                    let mut words = Vec::with_capacity(record_length.into());
                    for _ in 0..record_length {
                        words.push(read_u16(&mut rdr)?);
                    }
                    records.push(FileRecordData {
                        file_number,
                        record_number,
                        data: words,
                    });
                }
                WriteFileRecord(records)
            }
            READ_FIFO8 => ReadFifo8 {
                id: read_u8(&mut rdr)?,
                max_count: read_u8(&mut rdr)?,
            },
            WRITE_FIFO8 => {
                let id = read_u8(&mut rdr)?;
                let byte_count = read_u8(&mut rdr)?;
                if bytes.len() < 3 + usize::from(byte_count) {
                    return Err(Error::IncompletePdu);
                }
                WriteFifo8 {
                    id,
                    data: bytes.slice(3..3 + usize::from(byte_count)),
                }
            }
            READ_OBJECT => ReadObject {
                id: read_u8(&mut rdr)?,
            },
            WRITE_OBJECT => {
                let id = read_u8(&mut rdr)?;
                let byte_count = read_u8(&mut rdr)?;
                if bytes.len() < 3 + usize::from(byte_count) {
                    return Err(Error::IncompletePdu);
                }
                WriteObject {
                    id,
                    data: bytes.slice(3..3 + usize::from(byte_count)),
                }
            }
            READ_MEMORY => ReadMemory {
                address: read_u16(&mut rdr)?,
                count: read_u8(&mut rdr)?,
            },
            WRITE_MEMORY => {
                if bytes.len() < 4 {
                    return Err(Error::IncompletePdu);
                }
                WriteMemory {
                    address: read_u16(&mut rdr)?,
                    data: bytes.slice(3..),
                }
            }
            COMMAND => {
                let id = read_u8(&mut rdr)?;
                Command {
                    id,
                    data: bytes.slice(2..),
                }
            }
            code => return Err(Error::InvalidFunctionCode(code)),
        };
        Ok(req)
    }
}

impl From<&Response> for Bytes {
    fn from(rsp: &Response) -> Bytes {
        use Response::*;
        let mut data = BytesMut::with_capacity(8);
        data.put_u8(rsp.function_code());
        match rsp {
            ReadCoils(coils) | ReadDiscreteInputs(coils) => {
                let packed_coils = pack_coils(coils);
                data.put_u8(u8_len(packed_coils.len()));
                data.put_slice(&packed_coils);
            }
            ReadHoldingRegisters(words) | ReadInputRegisters(words) => {
                data.put_u8(u8_len(words.len() * 2));
                for w in words {
                    data.put_u16(*w);
                }
            }
            WriteSingleCoil(address, state) => {
                data.put_u16(*address);
                data.put_u16(bool_to_coil(*state));
            }
            WriteSingleRegister(address, word) => {
                data.put_u16(*address);
                data.put_u16(*word);
            }
            ReadDiagnostics(sub_function, word) => {
                data.put_u16(*sub_function);
                data.put_u16(*word);
            }
            WriteMultipleCoils(address, quantity) | WriteMultipleRegisters(address, quantity) => {
                data.put_u16(*address);
                data.put_u16(*quantity);
            }
            ReportSlaveId(info) => {
                data.put_u8(u8_len(5 + info.extra.len()));
                data.put_u8(info.product_id);
                data.put_u8(if info.run_indicator { 0xFF } else { 0x00 });
                data.put_u8(info.version.0);
                data.put_u8(info.version.1);
                data.put_u8(info.version.2);
                data.put_slice(&info.extra);
            }
            ReadFileRecord(records) => {
                let byte_count: usize = records.iter().map(|words| 2 + 2 * words.len()).sum();
                data.put_u8(u8_len(byte_count));
                for words in records {
                    data.put_u8(u8_len(1 + 2 * words.len()));
                    data.put_u8(0x06);
                    for w in words {
                        data.put_u16(*w);
                    }
                }
            }
            WriteFileRecord(records) => {
                let byte_count: usize = records.iter().map(|r| 7 + 2 * r.data.len()).sum();
                data.put_u8(u8_len(byte_count));
                for record in records {
                    data.put_u8(0x06);
                    data.put_u16(record.file_number);
                    data.put_u16(record.record_number);
                    data.put_u16(u16_len(record.data.len()));
                    for w in &record.data {
                        data.put_u16(*w);
                    }
                }
            }
            ReadFifo8 { status, data: payload } => {
                data.put_u8(*status);
                data.put_u8(u8_len(payload.len()));
                data.put_slice(payload);
            }
            WriteFifo8 { count } => {
                data.put_u8(*count);
            }
            ReadObject { data: payload } => {
                data.put_u8(u8_len(payload.len()));
                data.put_slice(payload);
            }
            WriteObject { status } => {
                data.put_u8(*status);
            }
            ReadMemory { data: payload } => {
                data.put_slice(payload);
            }
            WriteMemory { status } => {
                data.put_u8(*status);
            }
            Command { id, data: payload } => {
                data.put_u8(*id);
                data.put_slice(payload);
            }
        }
        data.freeze()
    }
}

impl From<&ExceptionResponse> for Bytes {
    fn from(ex: &ExceptionResponse) -> Bytes {
        let mut data = BytesMut::with_capacity(2);
        debug_assert!(ex.function < 0x80);
        data.put_u8(ex.function + 0x80);
        data.put_u8(ex.exception.into());
        data.freeze()
    }
}

impl TryFrom<Bytes> for ExceptionResponse {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        let mut rdr = Cursor::new(&bytes);
        let fn_err_code = read_u8(&mut rdr)?;
        if fn_err_code < 0x80 {
            return Err(Error::InvalidResponseData("not an exception response"));
        }
        let function = fn_err_code - 0x80;
        let exception = Exception::try_from(read_u8(&mut rdr)?)?;
        Ok(ExceptionResponse {
            function,
            exception,
        })
    }
}

impl TryFrom<u8> for Exception {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        use Exception::*;
        let ex = match code {
            0x01 => IllegalFunction,
            0x02 => IllegalDataAddress,
            0x03 => IllegalDataValue,
            0x04 => ServerDeviceFailure,
            0x05 => Acknowledge,
            0x06 => ServerDeviceBusy,
            0x07 => NegativeAcknowledge,
            0x08 => MemoryParityError,
            0x0A => GatewayPathUnavailable,
            0x0B => GatewayTargetDevice,
            _ => {
                return Err(Error::InvalidResponseData("invalid exception code"));
            }
        };
        Ok(ex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_bool_to_coil() {
        assert_eq!(bool_to_coil(true), 0xFF00);
        assert_eq!(bool_to_coil(false), 0x0000);
    }

    #[test]
    fn convert_coil_to_bool() {
        assert!(coil_to_bool(0xFF00).unwrap());
        assert!(!coil_to_bool(0x0000).unwrap());
        assert!(coil_to_bool(0x1234).is_err());
    }

    #[test]
    fn convert_booleans_to_bytes() {
        assert_eq!(pack_coils(&[]), &[]);
        assert_eq!(pack_coils(&[true]), &[0b1]);
        assert_eq!(pack_coils(&[false]), &[0b0]);
        assert_eq!(pack_coils(&[true, false]), &[0b_01]);
        assert_eq!(pack_coils(&[false, true]), &[0b_10]);
        assert_eq!(pack_coils(&[true, true]), &[0b_11]);
        assert_eq!(pack_coils(&[true; 8]), &[0b_1111_1111]);
        assert_eq!(pack_coils(&[true; 9]), &[255, 1]);
        assert_eq!(pack_coils(&[false; 8]), &[0]);
        assert_eq!(pack_coils(&[false; 9]), &[0, 0]);
    }

    #[test]
    fn unpack_bits() {
        assert_eq!(unpack_coils(&[], 0), &[]);
        assert_eq!(unpack_coils(&[0, 0], 0), &[]);
        assert_eq!(unpack_coils(&[0b1], 1), &[true]);
        assert_eq!(unpack_coils(&[0b01], 2), &[true, false]);
        assert_eq!(unpack_coils(&[0b10], 2), &[false, true]);
        assert_eq!(unpack_coils(&[0b101], 3), &[true, false, true]);
        assert_eq!(unpack_coils(&[0xff, 0b11], 10), &[true; 10]);
    }

    mod validation {
        use super::*;

        #[test]
        fn read_quantity_ranges() {
            assert!(Request::ReadCoils(0, 1).validate().is_ok());
            assert!(Request::ReadCoils(0, 2000).validate().is_ok());
            assert!(Request::ReadCoils(0, 0).validate().is_err());
            assert!(Request::ReadCoils(0, 2001).validate().is_err());

            assert!(Request::ReadHoldingRegisters(0, 125).validate().is_ok());
            assert!(Request::ReadHoldingRegisters(0, 126).validate().is_err());
            assert!(Request::ReadInputRegisters(0, 0).validate().is_err());
        }

        #[test]
        fn write_quantity_ranges() {
            assert!(Request::WriteMultipleCoils(0, vec![true; 1968])
                .validate()
                .is_ok());
            assert!(Request::WriteMultipleCoils(0, vec![true; 1969])
                .validate()
                .is_err());
            assert!(Request::WriteMultipleCoils(0, vec![]).validate().is_err());

            assert!(Request::WriteMultipleRegisters(0, vec![0; 123])
                .validate()
                .is_ok());
            assert!(Request::WriteMultipleRegisters(0, vec![0; 124])
                .validate()
                .is_err());
        }

        #[test]
        fn vendor_byte_counts() {
            assert!(Request::ReadFifo8 { id: 1, max_count: 250 }.validate().is_ok());
            assert!(Request::ReadFifo8 { id: 1, max_count: 0 }.validate().is_err());
            assert!(Request::ReadFifo8 {
                id: 1,
                max_count: 251
            }
            .validate()
            .is_err());

            assert!(Request::WriteFifo8 {
                id: 1,
                data: Bytes::from(vec![0; 250])
            }
            .validate()
            .is_ok());
            assert!(Request::WriteFifo8 {
                id: 1,
                data: Bytes::from(vec![0; 251])
            }
            .validate()
            .is_err());
            assert!(Request::WriteFifo8 {
                id: 1,
                data: Bytes::new()
            }
            .validate()
            .is_err());

            assert!(Request::ReadMemory {
                address: 0xFFFF,
                count: 250
            }
            .validate()
            .is_ok());
            assert!(Request::ReadMemory {
                address: 0,
                count: 251
            }
            .validate()
            .is_err());

            // An empty command payload is allowed.
            assert!(Request::Command {
                id: 1,
                data: Bytes::new()
            }
            .validate()
            .is_ok());
        }

        #[test]
        fn file_records() {
            let record = FileRecord {
                file_number: 1,
                record_number: 2,
                record_length: 3,
            };
            assert!(Request::ReadFileRecord(vec![record; 35]).validate().is_ok());
            assert!(Request::ReadFileRecord(vec![record; 36]).validate().is_err());
            assert!(Request::ReadFileRecord(vec![]).validate().is_err());
            assert!(Request::ReadFileRecord(vec![FileRecord {
                record_number: 10_000,
                ..record
            }])
            .validate()
            .is_err());
        }
    }

    mod serialize_requests {
        use super::*;

        #[test]
        fn read_coils() {
            let bytes: Bytes = (&Request::ReadCoils(0x12, 4)).into();
            assert_eq!(&bytes[..], &[0x01, 0x00, 0x12, 0x00, 0x04]);
        }

        #[test]
        fn read_holding_registers() {
            let bytes: Bytes = (&Request::ReadHoldingRegisters(0x082B, 2)).into();
            assert_eq!(&bytes[..], &[0x03, 0x08, 0x2B, 0x00, 0x02]);
        }

        #[test]
        fn write_single_coil() {
            let bytes: Bytes = (&Request::WriteSingleCoil(0x1234, true)).into();
            assert_eq!(&bytes[..], &[0x05, 0x12, 0x34, 0xFF, 0x00]);

            let bytes: Bytes = (&Request::WriteSingleCoil(0x1234, false)).into();
            assert_eq!(&bytes[..], &[0x05, 0x12, 0x34, 0x00, 0x00]);
        }

        #[test]
        fn write_multiple_coils() {
            let states = vec![true, false, true, true];
            let bytes: Bytes = (&Request::WriteMultipleCoils(0x3311, states)).into();
            assert_eq!(
                &bytes[..],
                &[0x0F, 0x33, 0x11, 0x00, 0x04, 0x01, 0b_0000_1101]
            );
        }

        #[test]
        fn write_multiple_registers() {
            let bytes: Bytes =
                (&Request::WriteMultipleRegisters(0x06, vec![0xABCD, 0xEF12])).into();
            assert_eq!(
                &bytes[..],
                &[0x10, 0x00, 0x06, 0x00, 0x02, 0x04, 0xAB, 0xCD, 0xEF, 0x12]
            );
        }

        #[test]
        fn read_diagnostics() {
            let bytes: Bytes = (&Request::ReadDiagnostics(0x0000, 0xA537)).into();
            assert_eq!(&bytes[..], &[0x08, 0x00, 0x00, 0xA5, 0x37]);
        }

        #[test]
        fn report_slave_id() {
            let bytes: Bytes = (&Request::ReportSlaveId).into();
            assert_eq!(&bytes[..], &[0x11]);
        }

        #[test]
        fn read_file_record() {
            let bytes: Bytes = (&Request::ReadFileRecord(vec![FileRecord {
                file_number: 4,
                record_number: 1,
                record_length: 2,
            }]))
                .into();
            assert_eq!(
                &bytes[..],
                &[0x14, 0x07, 0x06, 0x00, 0x04, 0x00, 0x01, 0x00, 0x02]
            );
        }

        #[test]
        fn fifo8() {
            let bytes: Bytes = (&Request::ReadFifo8 { id: 2, max_count: 16 }).into();
            assert_eq!(&bytes[..], &[0x41, 0x02, 0x10]);

            let bytes: Bytes = (&Request::WriteFifo8 {
                id: 2,
                data: Bytes::from_static(&[0xAA, 0xBB]),
            })
                .into();
            assert_eq!(&bytes[..], &[0x42, 0x02, 0x02, 0xAA, 0xBB]);
        }

        #[test]
        fn object_and_memory() {
            let bytes: Bytes = (&Request::ReadObject { id: 7 }).into();
            assert_eq!(&bytes[..], &[0x43, 0x07]);

            let bytes: Bytes = (&Request::WriteObject {
                id: 7,
                data: Bytes::from_static(&[0x01, 0x02, 0x03]),
            })
                .into();
            assert_eq!(&bytes[..], &[0x44, 0x07, 0x03, 0x01, 0x02, 0x03]);

            let bytes: Bytes = (&Request::ReadMemory {
                address: 0x0102,
                count: 8,
            })
                .into();
            assert_eq!(&bytes[..], &[0x45, 0x01, 0x02, 0x08]);

            // No byte count on the wire for memory writes.
            let bytes: Bytes = (&Request::WriteMemory {
                address: 0x0102,
                data: Bytes::from_static(&[0x55, 0x66]),
            })
                .into();
            assert_eq!(&bytes[..], &[0x46, 0x01, 0x02, 0x55, 0x66]);
        }

        #[test]
        fn command() {
            let bytes: Bytes = (&Request::Command {
                id: 3,
                data: Bytes::from_static(&[0xDE, 0xAD]),
            })
                .into();
            assert_eq!(&bytes[..], &[0x47, 0x03, 0xDE, 0xAD]);
        }
    }

    mod deserialize_requests {
        use super::*;

        #[test]
        fn empty_request() {
            assert!(Request::try_from(Bytes::new()).is_err());
        }

        #[test]
        fn round_trips() {
            let requests = [
                Request::ReadCoils(0x12, 4),
                Request::ReadDiscreteInputs(0x03, 19),
                Request::ReadHoldingRegisters(0x09, 77),
                Request::ReadInputRegisters(0x09, 77),
                Request::WriteSingleCoil(0x1234, true),
                Request::WriteSingleRegister(0x07, 0xABCD),
                Request::ReadDiagnostics(0x0002, 0x0000),
                Request::WriteMultipleCoils(0x3311, vec![true, false, true, true]),
                Request::WriteMultipleRegisters(0x06, vec![0xABCD, 0xEF12]),
                Request::ReportSlaveId,
                Request::ReadFileRecord(vec![FileRecord {
                    file_number: 1,
                    record_number: 2,
                    record_length: 3,
                }]),
                Request::WriteFileRecord(vec![FileRecordData {
                    file_number: 1,
                    record_number: 2,
                    data: vec![0x1234, 0x5678],
                }]),
                Request::ReadFifo8 { id: 1, max_count: 8 },
                Request::WriteFifo8 {
                    id: 1,
                    data: Bytes::from_static(&[1, 2, 3]),
                },
                Request::ReadObject { id: 9 },
                Request::WriteObject {
                    id: 9,
                    data: Bytes::from_static(&[4, 5]),
                },
                Request::ReadMemory {
                    address: 0x4000,
                    count: 4,
                },
                Request::WriteMemory {
                    address: 0x4000,
                    data: Bytes::from_static(&[6, 7, 8]),
                },
                Request::Command {
                    id: 2,
                    data: Bytes::from_static(&[9]),
                },
            ];
            for req in requests {
                let bytes: Bytes = (&req).into();
                assert_eq!(Request::try_from(bytes).unwrap(), req);
            }
        }

        #[test]
        fn truncated() {
            assert!(matches!(
                Request::try_from(Bytes::from_static(&[0x01])),
                Err(Error::IncompletePdu)
            ));
            assert!(matches!(
                Request::try_from(Bytes::from_static(&[0x01, 0x00, 0x00, 0x22])),
                Err(Error::IncompletePdu)
            ));
        }

        #[test]
        fn bad_byte_count() {
            assert!(Request::try_from(Bytes::from_static(&[
                0x0F,
                0x33,
                0x11,
                0x00,
                0x04,
                0x02,
                0b_0000_1101,
            ]))
            .is_err());
        }

        #[test]
        fn unknown_function_code() {
            assert!(matches!(
                Request::try_from(Bytes::from_static(&[0x2A, 0x00])),
                Err(Error::InvalidFunctionCode(0x2A))
            ));
        }
    }

    mod decode_responses {
        use super::*;

        #[test]
        fn read_coils_uses_requested_quantity() {
            let req = Request::ReadCoils(0, 5);
            let pdu = req
                .decode_response(Bytes::from_static(&[0x01, 0x01, 0b_0000_1001]))
                .unwrap();
            assert_eq!(
                pdu.0.unwrap(),
                Response::ReadCoils(vec![true, false, false, true, false])
            );
        }

        #[test]
        fn read_coils_wrong_byte_count() {
            let req = Request::ReadCoils(0, 5);
            assert!(req
                .decode_response(Bytes::from_static(&[0x01, 0x02, 0x00, 0x00]))
                .is_err());
        }

        #[test]
        fn read_holding_registers() {
            let req = Request::ReadHoldingRegisters(0, 3);
            let pdu = req
                .decode_response(Bytes::from_static(&[
                    0x03, 0x06, 0x00, 0x0A, 0x00, 0x0B, 0x00, 0x0C,
                ]))
                .unwrap();
            assert_eq!(
                pdu.0.unwrap(),
                Response::ReadHoldingRegisters(vec![10, 11, 12])
            );
        }

        #[test]
        fn write_single_coil_echo() {
            let req = Request::WriteSingleCoil(0x33, true);
            let pdu = req
                .decode_response(Bytes::from_static(&[0x05, 0x00, 0x33, 0xFF, 0x00]))
                .unwrap();
            assert_eq!(pdu.0.unwrap(), Response::WriteSingleCoil(0x33, true));
        }

        #[test]
        fn exception_demux() {
            let req = Request::ReadHoldingRegisters(0, 3);
            let pdu = req
                .decode_response(Bytes::from_static(&[0x83, 0x02]))
                .unwrap();
            assert_eq!(
                pdu.0,
                Err(ExceptionResponse {
                    function: 0x03,
                    exception: Exception::IllegalDataAddress,
                })
            );
        }

        #[test]
        fn mismatched_function_code() {
            let req = Request::ReadHoldingRegisters(0, 1);
            assert!(matches!(
                req.decode_response(Bytes::from_static(&[0x04, 0x02, 0x00, 0x01])),
                Err(Error::InvalidFunctionCode(0x04))
            ));
        }

        #[test]
        fn truncated_response() {
            let req = Request::ReadHoldingRegisters(0, 2);
            assert!(matches!(
                req.decode_response(Bytes::from_static(&[0x03, 0x04, 0x00])),
                Err(Error::IncompletePdu)
            ));
        }

        #[test]
        fn report_slave_id() {
            let req = Request::ReportSlaveId;
            let pdu = req
                .decode_response(Bytes::from_static(&[
                    0x11, 0x07, 0x42, 0xFF, 0x01, 0x02, 0x03, 0xAA, 0xBB,
                ]))
                .unwrap();
            assert_eq!(
                pdu.0.unwrap(),
                Response::ReportSlaveId(SlaveIdInfo {
                    product_id: 0x42,
                    run_indicator: true,
                    version: (1, 2, 3),
                    extra: Bytes::from_static(&[0xAA, 0xBB]),
                })
            );
        }

        #[test]
        fn report_slave_id_too_short() {
            let req = Request::ReportSlaveId;
            assert!(req
                .decode_response(Bytes::from_static(&[0x11, 0x04, 0x42, 0xFF, 0x01, 0x02]))
                .is_err());
        }

        #[test]
        fn read_memory_uses_requested_count() {
            let req = Request::ReadMemory {
                address: 0x0100,
                count: 3,
            };
            let pdu = req
                .decode_response(Bytes::from_static(&[0x45, 0x0A, 0x0B, 0x0C]))
                .unwrap();
            assert_eq!(
                pdu.0.unwrap(),
                Response::ReadMemory {
                    data: Bytes::from_static(&[0x0A, 0x0B, 0x0C]),
                }
            );

            assert!(matches!(
                req.decode_response(Bytes::from_static(&[0x45, 0x0A, 0x0B])),
                Err(Error::IncompletePdu)
            ));
        }

        #[test]
        fn read_fifo8() {
            let req = Request::ReadFifo8 { id: 1, max_count: 8 };
            let pdu = req
                .decode_response(Bytes::from_static(&[0x41, 0x00, 0x02, 0x11, 0x22]))
                .unwrap();
            assert_eq!(
                pdu.0.unwrap(),
                Response::ReadFifo8 {
                    status: 0x00,
                    data: Bytes::from_static(&[0x11, 0x22]),
                }
            );
        }

        #[test]
        fn write_fifo8_count_range() {
            let req = Request::WriteFifo8 {
                id: 1,
                data: Bytes::from_static(&[0x00]),
            };
            let pdu = req.decode_response(Bytes::from_static(&[0x42, 0x00])).unwrap();
            assert_eq!(pdu.0.unwrap(), Response::WriteFifo8 { count: 0 });

            assert!(req.decode_response(Bytes::from_static(&[0x42, 0xFB])).is_err());
        }

        #[test]
        fn read_file_record() {
            let req = Request::ReadFileRecord(vec![FileRecord {
                file_number: 4,
                record_number: 1,
                record_length: 2,
            }]);
            let pdu = req
                .decode_response(Bytes::from_static(&[
                    0x14, 0x06, 0x05, 0x06, 0x0D, 0xFE, 0x00, 0x20,
                ]))
                .unwrap();
            assert_eq!(
                pdu.0.unwrap(),
                Response::ReadFileRecord(vec![vec![0x0DFE, 0x0020]])
            );
        }

        #[test]
        fn command_response() {
            let req = Request::Command {
                id: 3,
                data: Bytes::new(),
            };
            let pdu = req
                .decode_response(Bytes::from_static(&[0x47, 0x03, 0x01, 0x02]))
                .unwrap();
            assert_eq!(
                pdu.0.unwrap(),
                Response::Command {
                    id: 3,
                    data: Bytes::from_static(&[0x01, 0x02]),
                }
            );
        }

        #[test]
        fn empty_buffer() {
            let req = Request::ReportSlaveId;
            assert!(matches!(
                req.decode_response(Bytes::new()),
                Err(Error::IncompletePdu)
            ));
        }
    }

    mod serialize_responses {
        use super::*;

        #[test]
        fn read_coils() {
            let bytes: Bytes = (&Response::ReadCoils(vec![true, false, false, true, false])).into();
            assert_eq!(&bytes[..], &[0x01, 0x01, 0b_0000_1001]);
        }

        #[test]
        fn read_holding_registers() {
            let bytes: Bytes = (&Response::ReadHoldingRegisters(vec![0xAA00, 0x1111])).into();
            assert_eq!(&bytes[..], &[0x03, 0x04, 0xAA, 0x00, 0x11, 0x11]);
        }

        #[test]
        fn report_slave_id() {
            let bytes: Bytes = (&Response::ReportSlaveId(SlaveIdInfo {
                product_id: 0x42,
                run_indicator: false,
                version: (1, 0, 9),
                extra: Bytes::new(),
            }))
                .into();
            assert_eq!(&bytes[..], &[0x11, 0x05, 0x42, 0x00, 0x01, 0x00, 0x09]);
        }

        #[test]
        fn read_memory_is_raw() {
            let bytes: Bytes = (&Response::ReadMemory {
                data: Bytes::from_static(&[0x0A, 0x0B]),
            })
                .into();
            assert_eq!(&bytes[..], &[0x45, 0x0A, 0x0B]);
        }

        #[test]
        fn exception_response_into_bytes() {
            let bytes: Bytes = (&ExceptionResponse {
                function: 0x03,
                exception: Exception::IllegalDataAddress,
            })
                .into();
            assert_eq!(&bytes[..], &[0x83, 0x02]);
        }

        #[test]
        fn exception_response_from_bytes() {
            assert!(ExceptionResponse::try_from(Bytes::from_static(&[0x79, 0x02])).is_err());

            let rsp = ExceptionResponse::try_from(Bytes::from_static(&[0x83, 0x02])).unwrap();
            assert_eq!(
                rsp,
                ExceptionResponse {
                    function: 0x03,
                    exception: Exception::IllegalDataAddress,
                }
            );
        }
    }
}
