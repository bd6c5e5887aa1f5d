// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One in-flight request with its retry budget, timeout and completion
//! state.

use std::time::Duration;

use smallvec::SmallVec;
use tokio::sync::{mpsc, oneshot};
use tokio_util::time::delay_queue;

use crate::{
    error::Error,
    frame::{ExceptionResponse, Request, Response, ResponsePdu},
    unit::UnitId,
};

/// Inline capacity of the cached ADU buffer; a serial ADU never exceeds
/// 256 bytes and MBAP adds only a few more.
const ADU_INLINE_LEN: usize = 64;

pub(crate) type AduBuf = SmallVec<[u8; ADU_INLINE_LEN]>;

/// Master-level identifier of a submitted transaction, used for
/// cancellation and timer correlation. Unrelated to MBAP transaction ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub(crate) u64);

/// The terminal outcome delivered for every transaction: transport and
/// lifecycle errors on the outside, a Modbus exception response on the
/// inside.
pub type Completion = Result<Result<Response, ExceptionResponse>, Error>;

/// Lifecycle notifications; `Complete` is strictly last and nothing
/// follows `Cancel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionEvent {
    /// The request was written to the wire; `attempt` starts at 1.
    Request { attempt: u8 },
    /// The per-attempt timer expired.
    Timeout,
    /// A matching response arrived.
    Response,
    /// An attempt failed.
    Error(Error),
    /// The transaction was cancelled; nothing else follows.
    Cancel,
    /// Terminal; the completion outcome has been delivered.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Pending,
    InFlight,
}

/// What the master should do with a transaction after a response or an
/// error was reconciled against its retry budget.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Re-issue the cached ADU.
    Retry,
    /// Terminal; complete with this outcome.
    Deliver(Completion),
}

#[derive(Debug)]
pub(crate) struct Transaction {
    id: TransactionId,
    request: Request,
    unit_id: UnitId,
    retries_left: u8,
    timeout: Duration,
    attempt: u8,
    state: State,
    adu: Option<AduBuf>,
    done: Option<oneshot::Sender<Completion>>,
    events: mpsc::UnboundedSender<TransactionEvent>,
    pub(crate) timer_key: Option<delay_queue::Key>,
}

impl Transaction {
    pub(crate) fn new(
        id: TransactionId,
        request: Request,
        unit_id: UnitId,
        max_retries: u8,
        timeout: Duration,
        done: oneshot::Sender<Completion>,
        events: mpsc::UnboundedSender<TransactionEvent>,
    ) -> Self {
        Self {
            id,
            request,
            unit_id,
            retries_left: max_retries,
            timeout,
            attempt: 0,
            state: State::Pending,
            adu: None,
            done: Some(done),
            events,
            timer_key: None,
        }
    }

    pub(crate) fn id(&self) -> TransactionId {
        self.id
    }

    pub(crate) fn request(&self) -> &Request {
        &self.request
    }

    pub(crate) fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.state == State::InFlight
    }

    /// Caches the encoded ADU. Set at most once; retries reuse it.
    pub(crate) fn set_adu(&mut self, adu: AduBuf) {
        debug_assert!(self.adu.is_none());
        self.adu = Some(adu);
    }

    pub(crate) fn adu(&self) -> Option<&AduBuf> {
        self.adu.as_ref()
    }

    /// Mutable access for transports that patch the cached ADU between
    /// attempts (MBAP transaction id rewrite).
    pub(crate) fn adu_mut(&mut self) -> Option<&mut AduBuf> {
        self.adu.as_mut()
    }

    /// Marks the start of a wire attempt and emits the `request` event.
    pub(crate) fn mark_in_flight(&mut self) {
        self.state = State::InFlight;
        self.attempt = self.attempt.saturating_add(1);
        let _ = self.events.send(TransactionEvent::Request {
            attempt: self.attempt,
        });
    }

    /// Marks the transaction re-armable for another attempt.
    pub(crate) fn mark_pending(&mut self) {
        self.state = State::Pending;
    }

    pub(crate) fn notify_timeout(&self) {
        let _ = self.events.send(TransactionEvent::Timeout);
    }

    /// Reconciles a decoded response against the retry budget.
    pub(crate) fn on_response(
        &mut self,
        pdu: ResponsePdu,
        retry_on_exception: bool,
    ) -> Disposition {
        let _ = self.events.send(TransactionEvent::Response);
        match pdu.0 {
            Ok(rsp) => Disposition::Deliver(Ok(Ok(rsp))),
            Err(exception) => {
                if retry_on_exception {
                    if self.retries_left > 0 {
                        self.retries_left -= 1;
                        self.mark_pending();
                        Disposition::Retry
                    } else {
                        Disposition::Deliver(Err(Error::Exception(exception)))
                    }
                } else {
                    Disposition::Deliver(Ok(Err(exception)))
                }
            }
        }
    }

    /// Reconciles a failed attempt against the retry budget.
    pub(crate) fn on_error(&mut self, err: Error) -> Disposition {
        let _ = self.events.send(TransactionEvent::Error(err.clone()));
        if err.is_retriable() && self.retries_left > 0 {
            self.retries_left -= 1;
            self.mark_pending();
            Disposition::Retry
        } else {
            Disposition::Deliver(Err(err))
        }
    }

    /// Delivers the terminal outcome. Fires exactly once; the `complete`
    /// event is strictly last.
    pub(crate) fn complete(mut self, completion: Completion) {
        if let Some(done) = self.done.take() {
            let _ = done.send(completion);
        }
        let _ = self.events.send(TransactionEvent::Complete);
    }

    /// Cancels the transaction. The completion channel receives
    /// `Err(Cancelled)` and no further events fire after `cancel`.
    pub(crate) fn cancel(mut self) {
        let _ = self.events.send(TransactionEvent::Cancel);
        if let Some(done) = self.done.take() {
            let _ = done.send(Err(Error::Cancelled));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Exception;

    fn transaction(max_retries: u8) -> (Transaction, oneshot::Receiver<Completion>) {
        let (done_tx, done_rx) = oneshot::channel();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let transaction = Transaction::new(
            TransactionId(1),
            Request::ReadHoldingRegisters(0, 1),
            1,
            max_retries,
            Duration::from_millis(100),
            done_tx,
            events_tx,
        );
        (transaction, done_rx)
    }

    #[test]
    fn retriable_error_consumes_budget() {
        let (mut txn, _done) = transaction(2);
        assert_eq!(txn.on_error(Error::Timeout), Disposition::Retry);
        assert_eq!(
            txn.on_error(Error::InvalidChecksum {
                expected: 0,
                actual: 1
            }),
            Disposition::Retry
        );
        assert_eq!(
            txn.on_error(Error::Timeout),
            Disposition::Deliver(Err(Error::Timeout))
        );
    }

    #[test]
    fn non_retriable_error_is_terminal() {
        let (mut txn, _done) = transaction(2);
        assert_eq!(
            txn.on_error(Error::ConnectionClosed),
            Disposition::Deliver(Err(Error::ConnectionClosed))
        );
    }

    #[test]
    fn exception_without_retry_flag_is_delivered() {
        let (mut txn, _done) = transaction(2);
        let exception = ExceptionResponse {
            function: 0x03,
            exception: Exception::IllegalDataAddress,
        };
        assert_eq!(
            txn.on_response(ResponsePdu(Err(exception)), false),
            Disposition::Deliver(Ok(Err(exception)))
        );
    }

    #[test]
    fn exception_with_retry_flag_consumes_budget() {
        let (mut txn, _done) = transaction(1);
        let exception = ExceptionResponse {
            function: 0x03,
            exception: Exception::IllegalDataAddress,
        };
        assert_eq!(
            txn.on_response(ResponsePdu(Err(exception)), true),
            Disposition::Retry
        );
        assert_eq!(
            txn.on_response(ResponsePdu(Err(exception)), true),
            Disposition::Deliver(Err(Error::Exception(exception)))
        );
    }

    #[test]
    fn completion_is_delivered_once() {
        let (txn, mut done) = transaction(0);
        txn.complete(Ok(Ok(Response::ReadHoldingRegisters(vec![1]))));
        assert_eq!(
            done.try_recv().unwrap(),
            Ok(Ok(Response::ReadHoldingRegisters(vec![1])))
        );
    }

    #[test]
    fn cancellation_resolves_completion() {
        let (txn, mut done) = transaction(0);
        txn.cancel();
        assert_eq!(done.try_recv().unwrap(), Err(Error::Cancelled));
    }

    #[test]
    fn event_order_ends_with_complete() {
        let (done_tx, _done_rx) = oneshot::channel();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut txn = Transaction::new(
            TransactionId(7),
            Request::ReportSlaveId,
            1,
            0,
            Duration::from_millis(10),
            done_tx,
            events_tx,
        );
        txn.mark_in_flight();
        txn.notify_timeout();
        assert_eq!(
            txn.on_error(Error::Timeout),
            Disposition::Deliver(Err(Error::Timeout))
        );
        txn.complete(Err(Error::Timeout));

        assert_eq!(
            events_rx.try_recv().unwrap(),
            TransactionEvent::Request { attempt: 1 }
        );
        assert_eq!(events_rx.try_recv().unwrap(), TransactionEvent::Timeout);
        assert_eq!(
            events_rx.try_recv().unwrap(),
            TransactionEvent::Error(Error::Timeout)
        );
        assert_eq!(events_rx.try_recv().unwrap(), TransactionEvent::Complete);
        assert!(events_rx.try_recv().is_err());
    }
}
