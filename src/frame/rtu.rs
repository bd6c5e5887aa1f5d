// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{bytes::Bytes, unit::UnitId};

/// The one-byte prefix of a serial ADU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) unit_id: UnitId,
}

/// A deframed serial ADU: unit byte plus the raw PDU, CRC already
/// verified and stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResponseFrame {
    pub(crate) hdr: Header,
    pub(crate) pdu: Bytes,
}
