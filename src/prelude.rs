// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types and traits

pub use crate::{CallOptions, Master, MasterConfig, TransportConfig};

pub use crate::{Connection, ConnectionEvent, ControlOptions};

pub use crate::{Completion, TransactionEvent, TransactionHandle, TransactionId};

pub use crate::{Error, Exception, ExceptionResponse};

pub use crate::{Request, Response};

pub use crate::{Unit, UnitId};

#[cfg(feature = "rtu")]
pub use crate::RtuConfig;

#[cfg(feature = "tcp")]
pub use crate::IpConfig;

#[cfg(feature = "tunnel")]
pub use crate::{Sniff, SniffKind, TunnelConfig};
