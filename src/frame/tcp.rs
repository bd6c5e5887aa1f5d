// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::unit::UnitId;

/// A 16 bit transaction identifier correlating MBAP requests with
/// responses on a multiplexed stream.
pub(crate) type TransactionId = u16;

/// The decoded MBAP header of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) transaction_id: TransactionId,
    pub(crate) unit_id: UnitId,
}
