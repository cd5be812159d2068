//! Background operations reporting into a single controller inbox.
//!
//! Every [`Worker::start`] spawns one task for one operation. The task delivers at most
//! one [`Signal::Result`] or [`Signal::Error`], then exactly one [`Signal::Finished`],
//! all through the inbox the worker was built with. Cancelling a [`TaskHandle`] only
//! suppresses the payload; the operation keeps running and `Finished` still arrives.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl std::fmt::Display for TaskId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "#{}", self.0)
  }
}

#[derive(Debug)]
pub enum Signal<T> {
  Result(T),
  Error(CoreError),
  Finished,
}

/// Returned synchronously by [`Worker::start`]. Owns the cancellation flag for one operation.
#[derive(Debug)]
pub struct TaskHandle {
  id: TaskId,
  cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
  pub fn id(&self) -> TaskId {
    self.id
  }

  /// Set-once: there is no way to clear the flag again.
  pub fn cancel(&self) {
    if !self.cancelled.swap(true, Ordering::AcqRel) {
      debug!(task = %self.id, "task: cancelled");
    }
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::Acquire)
  }
}

/// The sending half for one operation: tags every signal with the task id and wraps it
/// into the controller's message type.
pub struct ResultChannel<T, M> {
  id: TaskId,
  cancelled: Arc<AtomicBool>,
  inbox: mpsc::UnboundedSender<M>,
  wrap: fn(TaskId, Signal<T>) -> M,
}

impl<T, M> ResultChannel<T, M> {
  fn send(&self, signal: Signal<T>) {
    // The controller may already be gone on shutdown; nothing left to report to.
    let _ = self.inbox.send((self.wrap)(self.id, signal));
  }

  /// Deliver the payload unless the handle was cancelled, then signal completion.
  fn deliver(self, outcome: Result<T>) {
    if self.cancelled.load(Ordering::Acquire) {
      debug!(task = %self.id, "task: payload suppressed after cancel");
    } else {
      match outcome {
        Ok(value) => self.send(Signal::Result(value)),
        Err(e) => {
          debug!(task = %self.id, err = %e, "task: operation failed");
          self.send(Signal::Error(e));
        }
      }
    }
    self.send(Signal::Finished);
  }
}

/// Starts background operations whose signals all land in one inbox of `M`.
pub struct Worker<M> {
  inbox: mpsc::UnboundedSender<M>,
  next_id: AtomicU64,
}

impl<M: Send + 'static> Worker<M> {
  pub fn new(inbox: mpsc::UnboundedSender<M>) -> Self {
    Self { inbox, next_id: AtomicU64::new(1) }
  }

  /// Create a worker together with the receiving end the controller drains.
  pub fn with_inbox() -> (Self, mpsc::UnboundedReceiver<M>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self::new(tx), rx)
  }

  /// Begin `operation` concurrently and return its handle immediately.
  ///
  /// `wrap` is usually an enum variant constructor, e.g. `Message::Search`. Must be called
  /// from within a tokio runtime.
  pub fn start<T, F>(&self, wrap: fn(TaskId, Signal<T>) -> M, operation: F) -> TaskHandle
  where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
  {
    let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
    let cancelled = Arc::new(AtomicBool::new(false));
    let channel = ResultChannel { id, cancelled: Arc::clone(&cancelled), inbox: self.inbox.clone(), wrap };

    debug!(task = %id, "task: started");
    tokio::spawn(async move {
      let outcome = match AssertUnwindSafe(operation).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(CoreError::TaskFailed(panic_message(panic.as_ref()))),
      };
      channel.deliver(outcome);
    });

    TaskHandle { id, cancelled }
  }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "operation panicked".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;
  use tokio::sync::oneshot;

  #[derive(Debug)]
  enum Msg {
    Text(TaskId, Signal<String>),
    Number(TaskId, Signal<u32>),
  }

  async fn next(rx: &mut mpsc::UnboundedReceiver<Msg>) -> Msg {
    tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.expect("inbox timed out").expect("inbox closed")
  }

  #[tokio::test]
  async fn result_then_finished() {
    let (worker, mut rx) = Worker::with_inbox();
    let handle = worker.start(Msg::Text, async { Ok("hello".to_string()) });

    match next(&mut rx).await {
      Msg::Text(id, Signal::Result(s)) => {
        assert_eq!(id, handle.id());
        assert_eq!(s, "hello");
      }
      other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(next(&mut rx).await, Msg::Text(_, Signal::Finished)));
  }

  #[tokio::test]
  async fn error_then_finished() {
    let (worker, mut rx) = Worker::with_inbox();
    worker.start(Msg::Number, async { Err::<u32, _>(CoreError::provider("boom")) });

    match next(&mut rx).await {
      Msg::Number(_, Signal::Error(CoreError::Provider(msg))) => assert_eq!(msg, "boom"),
      other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(next(&mut rx).await, Msg::Number(_, Signal::Finished)));
  }

  #[tokio::test]
  async fn cancel_suppresses_payload_but_not_completion() {
    let (worker, mut rx) = Worker::with_inbox();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let handle = worker.start(Msg::Text, async move {
      let _ = release_rx.await;
      Ok("late".to_string())
    });

    handle.cancel();
    assert!(handle.is_cancelled());
    release_tx.send(()).unwrap();

    match next(&mut rx).await {
      Msg::Text(id, Signal::Finished) => assert_eq!(id, handle.id()),
      other => panic!("payload leaked after cancel: {:?}", other),
    }
    let extra = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(extra.is_err(), "more than one signal after cancel");
  }

  #[tokio::test]
  async fn cancelled_error_is_suppressed_too() {
    let (worker, mut rx) = Worker::with_inbox();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let handle = worker.start(Msg::Number, async move {
      let _ = release_rx.await;
      Err::<u32, _>(CoreError::provider("late failure"))
    });
    handle.cancel();
    handle.cancel();
    release_tx.send(()).unwrap();
    assert!(matches!(next(&mut rx).await, Msg::Number(_, Signal::Finished)));
  }

  #[tokio::test]
  async fn panic_is_reported_then_finished() {
    let (worker, mut rx) = Worker::with_inbox();
    worker.start(Msg::Number, async {
      if true {
        panic!("provider exploded");
      }
      Ok(1)
    });
    match next(&mut rx).await {
      Msg::Number(_, Signal::Error(CoreError::TaskFailed(msg))) => assert!(msg.contains("provider exploded")),
      other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(next(&mut rx).await, Msg::Number(_, Signal::Finished)));
  }

  #[tokio::test]
  async fn concurrent_operations_deliver_independently() {
    let (worker, mut rx) = Worker::with_inbox();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    // The slow one starts first but finishes last.
    let slow = worker.start(Msg::Text, async move {
      let _ = release_rx.await;
      Ok("search".to_string())
    });
    let fast = worker.start(Msg::Number, async { Err::<u32, _>(CoreError::provider("thumbnail 404")) });
    assert_ne!(slow.id(), fast.id());

    assert!(matches!(next(&mut rx).await, Msg::Number(id, Signal::Error(_)) if id == fast.id()));
    assert!(matches!(next(&mut rx).await, Msg::Number(id, Signal::Finished) if id == fast.id()));

    release_tx.send(()).unwrap();
    assert!(matches!(next(&mut rx).await, Msg::Text(id, Signal::Result(_)) if id == slow.id()));
    assert!(matches!(next(&mut rx).await, Msg::Text(id, Signal::Finished) if id == slow.id()));
  }

  #[tokio::test]
  async fn start_returns_before_operation_completes() {
    let (worker, mut rx) = Worker::with_inbox();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let _handle = worker.start(Msg::Number, async move {
      let _ = release_rx.await;
      Ok(7)
    });
    assert!(rx.try_recv().is_err());
    release_tx.send(()).unwrap();
    assert!(matches!(next(&mut rx).await, Msg::Number(_, Signal::Result(7))));
  }
}
