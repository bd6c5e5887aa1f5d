// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use thiserror::Error;

use crate::frame::ExceptionResponse;

/// Error type for everything that can terminate a transaction or reject a
/// request before it is ever submitted.
///
/// Errors are kept free of `io::Error` payloads so that they stay `Clone`
/// and can be fanned out on event channels in addition to the completion
/// path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Constructor-time range check failure.
    #[error("invalid options: {0}")]
    InvalidOptions(&'static str),

    /// A PDU decoder saw fewer bytes than the layout requires.
    #[error("incomplete PDU")]
    IncompletePdu,

    /// A transport frame ended before it could possibly be valid.
    #[error("incomplete response frame")]
    IncompleteResponseFrame,

    /// CRC-16 mismatch on a serial frame.
    #[error("invalid checksum: expected = 0x{expected:04X}, actual = 0x{actual:04X}")]
    InvalidChecksum { expected: u16, actual: u16 },

    /// Header or unit mismatch, or a malformed payload.
    #[error("invalid response data: {0}")]
    InvalidResponseData(&'static str),

    /// The response function code matches neither the request nor an
    /// exception.
    #[error("invalid function code: 0x{0:02X}")]
    InvalidFunctionCode(u8),

    /// A well-formed Modbus exception response, surfaced as an error after
    /// the exception retry budget is exhausted.
    #[error(transparent)]
    Exception(#[from] ExceptionResponse),

    /// No response within the per-attempt window.
    #[error("response timed out")]
    Timeout,

    /// Echo suppression was enabled but fewer bytes than the transmitted
    /// frame length came back.
    #[error("no echo received")]
    NoEcho,

    /// The underlying connection went down.
    #[error("connection closed")]
    ConnectionClosed,

    /// The transport's concurrency ceiling was exceeded.
    #[error("too many concurrent requests")]
    TooManyRequests,

    /// The transaction was cancelled by the application.
    #[error("transaction cancelled")]
    Cancelled,
}

impl Error {
    /// Whether a transaction failing with this error may be re-issued when
    /// retry budget remains.
    ///
    /// Exceptions are special-cased by the master configuration
    /// (`retry_on_exception`) and intentionally classified as non-retriable
    /// here.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::IncompletePdu
                | Self::IncompleteResponseFrame
                | Self::InvalidChecksum { .. }
                | Self::InvalidResponseData(_)
                | Self::InvalidFunctionCode(_)
                | Self::Timeout
                | Self::NoEcho
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Exception, ExceptionResponse};

    #[test]
    fn retriable_classification() {
        assert!(Error::IncompletePdu.is_retriable());
        assert!(Error::IncompleteResponseFrame.is_retriable());
        assert!(Error::InvalidChecksum {
            expected: 0,
            actual: 1
        }
        .is_retriable());
        assert!(Error::InvalidResponseData("unit mismatch").is_retriable());
        assert!(Error::InvalidFunctionCode(0x2A).is_retriable());
        assert!(Error::Timeout.is_retriable());
        assert!(Error::NoEcho.is_retriable());

        assert!(!Error::InvalidOptions("quantity").is_retriable());
        assert!(!Error::ConnectionClosed.is_retriable());
        assert!(!Error::TooManyRequests.is_retriable());
        assert!(!Error::Cancelled.is_retriable());
        assert!(!Error::Exception(ExceptionResponse {
            function: 0x03,
            exception: Exception::IllegalDataAddress,
        })
        .is_retriable());
    }
}
