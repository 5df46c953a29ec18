//! Cancellable pending result handles.
//!
//! A transport answers each request with a [`PendingResult`] and keeps the
//! matching [`Responder`] to resolve it later. Either side may act first:
//!
//! - the responder resolves the handle with an outcome, or
//! - the caller (or the node watcher) cancels it.
//!
//! Whichever happens first wins; the loser's action is a no-op. Waiting is
//! single-consumer: the outcome is handed out once.

use crate::error::RpcCause;
use crate::result::RpcResult;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

/// What a pending handle eventually resolves to.
pub type RpcOutcome<T> = Result<RpcResult<T>, RpcCause>;

enum SlotState<T> {
    Pending,
    Ready(RpcOutcome<T>),
    Cancelled,
    Taken,
}

struct Slot<T> {
    state: Mutex<SlotState<T>>,
    notify: Notify,
}

impl<T> Slot<T> {
    fn new(state: SlotState<T>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            notify: Notify::new(),
        })
    }

    fn resolve(&self, outcome: RpcOutcome<T>) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, SlotState::Pending) {
            return false;
        }
        *state = SlotState::Ready(outcome);
        drop(state);
        self.notify.notify_one();
        true
    }

    fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, SlotState::Pending) {
            return false;
        }
        *state = SlotState::Cancelled;
        drop(state);
        self.notify.notify_one();
        true
    }

    fn is_cancelled(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Cancelled)
    }

    fn is_done(&self) -> bool {
        !matches!(*self.state.lock(), SlotState::Pending)
    }
}

/// Type-erased cancellation side of a pending handle.
///
/// Held by the node watcher registration so a removal signal can cancel a
/// call without knowing its output type.
pub trait Cancellable: Send + Sync {
    /// Cancels the handle. Returns false if it had already resolved or been
    /// cancelled.
    fn cancel(&self) -> bool;

    /// Returns true if the handle ended cancelled.
    fn is_cancelled(&self) -> bool;
}

impl<T: Send> Cancellable for Slot<T> {
    fn cancel(&self) -> bool {
        Slot::cancel(self)
    }

    fn is_cancelled(&self) -> bool {
        Slot::is_cancelled(self)
    }
}

/// Caller side of an in-flight RPC.
pub struct PendingResult<T> {
    slot: Arc<Slot<T>>,
}

impl<T: Send + 'static> PendingResult<T> {
    /// Creates an unresolved handle and the responder that resolves it.
    pub fn channel() -> (Self, Responder<T>) {
        let slot = Slot::new(SlotState::Pending);
        (
            Self {
                slot: Arc::clone(&slot),
            },
            Responder { slot },
        )
    }

    /// Creates a handle that is already resolved.
    pub fn ready(outcome: RpcOutcome<T>) -> Self {
        Self {
            slot: Slot::new(SlotState::Ready(outcome)),
        }
    }

    /// Creates a handle resolved with a successful result.
    pub fn success(value: T) -> Self {
        Self::ready(Ok(RpcResult::success(value)))
    }

    /// Creates a handle resolved with a failure cause.
    pub fn failed(cause: RpcCause) -> Self {
        Self::ready(Err(cause))
    }

    /// Creates a handle that is already cancelled.
    pub fn cancelled() -> Self {
        Self {
            slot: Slot::new(SlotState::Cancelled),
        }
    }

    /// Cancels the handle (best effort). Cancelling a resolved handle is a
    /// no-op that returns false.
    pub fn cancel(&self) -> bool {
        self.slot.cancel()
    }

    /// Returns true if the handle ended cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.slot.is_cancelled()
    }

    /// Returns true once the handle resolved, was cancelled or was consumed.
    pub fn is_done(&self) -> bool {
        self.slot.is_done()
    }

    /// Returns the cancellation side of this handle.
    pub fn canceller(&self) -> Arc<dyn Cancellable> {
        let slot: Arc<dyn Cancellable> = self.slot.clone();
        slot
    }

    /// Waits for the handle to resolve and takes the outcome.
    ///
    /// A cancelled handle yields [`RpcCause::Cancelled`]. The outcome is
    /// handed out once; later waits yield a transport failure.
    pub async fn wait(&self) -> RpcOutcome<T> {
        loop {
            let notified = self.slot.notify.notified();
            {
                let mut state = self.slot.state.lock();
                match &*state {
                    SlotState::Pending => {}
                    SlotState::Cancelled => {
                        return Err(RpcCause::Cancelled("request was cancelled".to_string()));
                    }
                    SlotState::Taken => {
                        return Err(RpcCause::Transport("result already consumed".to_string()));
                    }
                    SlotState::Ready(_) => {
                        if let SlotState::Ready(outcome) =
                            std::mem::replace(&mut *state, SlotState::Taken)
                        {
                            return outcome;
                        }
                    }
                }
            }
            notified.await;
        }
    }
}

impl<T> std::fmt::Debug for PendingResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.slot.state.lock() {
            SlotState::Pending => "pending",
            SlotState::Ready(_) => "ready",
            SlotState::Cancelled => "cancelled",
            SlotState::Taken => "taken",
        };
        f.debug_struct("PendingResult").field("state", &state).finish()
    }
}

/// Transport side of an in-flight RPC.
///
/// Dropping a responder without answering resolves the handle with a
/// transport failure, so the caller never waits on a request nobody owns.
pub struct Responder<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Responder<T> {
    /// Resolves the handle. Returns false if it was already cancelled.
    pub fn complete(self, outcome: RpcOutcome<T>) -> bool {
        self.slot.resolve(outcome)
    }

    /// Resolves the handle with a successful result.
    pub fn succeed(self, value: T) -> bool {
        self.complete(Ok(RpcResult::success(value)))
    }

    /// Resolves the handle with a device-reported failure.
    pub fn fail(self, errors: Vec<crate::result::RpcErrorMessage>) -> bool {
        self.complete(Ok(RpcResult::failed(errors)))
    }

    /// Resolves the handle with a failure cause.
    pub fn fail_with(self, cause: RpcCause) -> bool {
        self.complete(Err(cause))
    }

    /// Returns true if the caller cancelled the request.
    pub fn is_cancelled(&self) -> bool {
        self.slot.is_cancelled()
    }
}

impl<T> Drop for Responder<T> {
    fn drop(&mut self) {
        self.slot.resolve(Err(RpcCause::Transport(
            "request dropped without a response".to_string(),
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::RpcErrorMessage;
    use std::time::Duration;

    #[tokio::test]
    async fn test_ready_handle() {
        let pending = PendingResult::success(5_u32);
        assert!(pending.is_done());
        let outcome = pending.wait().await.unwrap();
        assert_eq!(outcome.result(), Some(&5));
    }

    #[tokio::test]
    async fn test_responder_resolves_waiter() {
        let (pending, responder) = PendingResult::<u32>::channel();
        assert!(!pending.is_done());

        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            responder.succeed(9)
        });

        let outcome = pending.wait().await.unwrap();
        assert_eq!(outcome.result(), Some(&9));
        assert!(task.await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let (pending, responder) = PendingResult::<u32>::channel();
        let canceller = pending.canceller();

        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            canceller.cancel()
        });

        let outcome = pending.wait().await;
        assert!(matches!(outcome, Err(RpcCause::Cancelled(_))));
        assert!(task.await.unwrap());
        assert!(pending.is_cancelled());
        assert!(responder.is_cancelled());
        // Answering a cancelled request is a no-op.
        assert!(!responder.succeed(1));
        assert!(pending.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_after_resolve_is_noop() {
        let (pending, responder) = PendingResult::<u32>::channel();
        assert!(responder.fail(vec![RpcErrorMessage::error("nope")]));
        assert!(!pending.cancel());
        assert!(!pending.is_cancelled());

        let outcome = pending.wait().await.unwrap();
        assert!(!outcome.is_successful());
    }

    #[tokio::test]
    async fn test_cancel_twice() {
        let pending = PendingResult::<u32>::channel().0;
        // Dropping the responder above resolved the handle already.
        assert!(!pending.cancel());

        let (pending, _responder) = PendingResult::<u32>::channel();
        assert!(pending.cancel());
        assert!(!pending.cancel());
        assert!(pending.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_responder_fails_handle() {
        let (pending, responder) = PendingResult::<u32>::channel();
        drop(responder);
        let outcome = pending.wait().await;
        assert!(matches!(outcome, Err(RpcCause::Transport(_))));
    }

    #[tokio::test]
    async fn test_outcome_is_taken_once() {
        let pending = PendingResult::success(1_u8);
        assert!(pending.wait().await.is_ok());
        assert!(matches!(pending.wait().await, Err(RpcCause::Transport(_))));
        assert!(!pending.is_cancelled());
    }

    #[test]
    fn test_debug_shows_state() {
        let pending = PendingResult::<u8>::cancelled();
        assert!(format!("{:?}", pending).contains("cancelled"));
    }
}
