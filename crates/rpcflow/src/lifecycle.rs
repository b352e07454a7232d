use crate::{Result, Status};

/// The observable state of a call.
///
/// "Send" and "receive" are from the point of view of the side holding the
/// [`Lifecycle`]: `HalfClosedSend` means this side has finished sending but is
/// still receiving.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallState {
    Open,
    HalfClosedSend,
    HalfClosedRecv,
    Closed,
}

/// Per-call state machine: two direction flags and the terminal outcome.
///
/// Direction flags only ever move from open to closed. The outcome is settled
/// at most once; whichever of [`Lifecycle::complete`] or [`Lifecycle::fail`]
/// runs first decides it, and later attempts observe the recorded outcome
/// instead of replacing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lifecycle {
    send_open: bool,
    recv_open: bool,
    outcome: Option<Result<()>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            send_open: true,
            recv_open: true,
            outcome: None,
        }
    }

    pub const fn state(&self) -> CallState {
        if self.outcome.is_some() {
            return CallState::Closed;
        }
        match (self.send_open, self.recv_open) {
            (true, true) => CallState::Open,
            (false, true) => CallState::HalfClosedSend,
            (true, false) => CallState::HalfClosedRecv,
            (false, false) => CallState::Closed,
        }
    }

    pub const fn is_send_open(&self) -> bool {
        self.send_open
    }

    pub const fn is_recv_open(&self) -> bool {
        self.recv_open
    }

    /// Marks the outbound direction finished. Returns `true` if this call
    /// performed the transition.
    pub fn close_send(&mut self) -> bool {
        core::mem::replace(&mut self.send_open, false)
    }

    /// Marks the inbound direction finished after the peer's clean
    /// end-of-stream. Returns `true` if this call performed the transition.
    pub fn close_recv(&mut self) -> bool {
        core::mem::replace(&mut self.recv_open, false)
    }

    /// Settles the call as successful unless it was already settled, and
    /// returns the outcome on record.
    pub fn complete(&mut self) -> Result<()> {
        match &self.outcome {
            Some(outcome) => outcome.clone(),
            None => {
                self.send_open = false;
                self.recv_open = false;
                self.outcome = Some(Ok(()));
                #[cfg(feature = "tracing")]
                tracing::trace!("call completed");
                Ok(())
            }
        }
    }

    /// Settles the call with `status` unless it was already settled.
    ///
    /// Returns the failure on record: the first one if the call had already
    /// failed, otherwise `status` itself. Failing a call that completed
    /// successfully leaves the success in place and hands `status` back so the
    /// caller can still report the late error.
    pub fn fail(&mut self, status: Status) -> Status {
        match &self.outcome {
            Some(Err(first)) => first.clone(),
            Some(Ok(())) => status,
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!(code = %status.code(), reason = status.message(), "call failed");
                self.send_open = false;
                self.recv_open = false;
                self.outcome = Some(Err(status.clone()));
                status
            }
        }
    }

    pub const fn outcome(&self) -> Option<&Result<()>> {
        self.outcome.as_ref()
    }

    pub fn failure(&self) -> Option<&Status> {
        match &self.outcome {
            Some(Err(status)) => Some(status),
            _ => None,
        }
    }

    pub const fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }

    pub const fn is_closed(&self) -> bool {
        matches!(self.state(), CallState::Closed)
    }
}
