//! Lazy, cancelable async value sequences.
//!
//! A [`Producer`] wraps a setup function that only runs when the producer is
//! consumed. Cache hits and network fetches are both expressed as producers,
//! so a caller cannot tell which path served it.
//!
//! Every producer terminates on its first error: the error is delivered and
//! nothing follows it.

use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TaskError};

type Setup<T> = Box<dyn FnOnce() -> BoxStream<'static, Result<T>> + Send>;

/// Cold async sequence of `Result<T>` notifications.
#[must_use = "producers do nothing until consumed"]
pub struct Producer<T> {
  setup: Setup<T>,
}

impl<T: Send + 'static> Producer<T> {
  /// Create a producer whose stream is built at subscription time.
  pub fn new<F, S>(setup: F) -> Self
  where
    F: FnOnce() -> S + Send + 'static,
    S: Stream<Item = Result<T>> + Send + 'static,
  {
    Self {
      setup: Box::new(move || setup().boxed()),
    }
  }

  /// Decide which producer to run at subscription time.
  pub fn defer<F>(decide: F) -> Self
  where
    F: FnOnce() -> Producer<T> + Send + 'static,
  {
    Self::new(move || decide().into_stream())
  }

  /// Emit a single value, then complete.
  pub fn value(value: T) -> Self {
    Self::new(move || stream::once(future::ready(Ok(value))))
  }

  /// Fail immediately.
  pub fn fail(err: TaskError) -> Self {
    Self::new(move || stream::once(future::ready(Err(err))))
  }

  /// Complete without emitting anything.
  pub fn empty() -> Self {
    Self::new(stream::empty::<Result<T>>)
  }

  /// Run `fut` when subscribed and emit its outcome.
  pub fn from_future<Fut>(fut: Fut) -> Self
  where
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    Self::new(move || stream::once(fut))
  }

  /// Transform each emitted value.
  pub fn map<U, F>(self, mut f: F) -> Producer<U>
  where
    U: Send + 'static,
    F: FnMut(T) -> U + Send + 'static,
  {
    Producer::new(move || self.into_stream().map(move |r| r.map(&mut f)))
  }

  /// Chain every value into a dependent producer, in order (concatMap).
  pub fn and_then<U, F>(self, mut f: F) -> Producer<U>
  where
    U: Send + 'static,
    F: FnMut(T) -> Producer<U> + Send + 'static,
  {
    Producer::new(move || {
      self
        .into_stream()
        .map(move |r| match r {
          Ok(v) => f(v).into_stream(),
          Err(e) => stream::once(future::ready(Err(e))).boxed(),
        })
        .flatten()
    })
  }

  /// Observe a failure on its way to the error channel.
  pub fn inspect_err<F>(self, mut handler: F) -> Self
  where
    F: FnMut(&TaskError) + Send + 'static,
  {
    Self::new(move || {
      self.into_stream().map(move |r| {
        if let Err(e) = &r {
          handler(e);
        }
        r
      })
    })
  }

  /// Replace a failure with another error.
  pub fn map_err<F>(self, mut f: F) -> Self
  where
    F: FnMut(TaskError) -> TaskError + Send + 'static,
  {
    Self::new(move || self.into_stream().map(move |r| r.map_err(&mut f)))
  }

  /// Complete after `n` emissions.
  pub fn take(self, n: usize) -> Self {
    Self::new(move || self.into_stream().take(n))
  }

  /// Stop emitting once `token` is cancelled. Dropping the inner stream
  /// aborts whatever it was awaiting.
  pub fn until_cancelled(self, token: CancellationToken) -> Self {
    Self::new(move || {
      self
        .into_stream()
        .take_until(async move { token.cancelled().await })
    })
  }

  /// Run setup and obtain the notification stream.
  pub fn into_stream(self) -> BoxStream<'static, Result<T>> {
    stop_after_error((self.setup)()).boxed()
  }

  /// Run to completion, handing every value to `f`.
  pub async fn for_each<F>(self, mut f: F) -> Result<()>
  where
    F: FnMut(T),
  {
    let mut stream = self.into_stream();
    while let Some(item) = stream.next().await {
      f(item?);
    }
    Ok(())
  }

  /// Run to completion and gather every value.
  pub async fn collect(self) -> Result<Vec<T>> {
    let mut out = Vec::new();
    self.for_each(|v| out.push(v)).await?;
    Ok(out)
  }

  /// Await the first value; the rest of the sequence is dropped.
  pub async fn first(self) -> Result<T> {
    let mut stream = self.into_stream();
    match stream.next().await {
      Some(item) => item,
      None => Err(TaskError::Empty),
    }
  }

  /// Drive the producer on a background task.
  ///
  /// Setup runs before this returns, so a cache probe has already happened.
  /// Requires a tokio runtime.
  pub fn subscribe(self) -> Subscription<T> {
    let token = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let mut stream = self.into_stream();
    let cancelled = token.clone();

    let handle = tokio::spawn(async move {
      loop {
        tokio::select! {
          _ = cancelled.cancelled() => break,
          item = stream.next() => match item {
            Some(item) => {
              if tx.send(item).is_err() {
                break;
              }
            }
            None => break,
          },
        }
      }
    });

    Subscription { rx, token, handle }
  }
}

/// Live subscription to a producer.
///
/// Dropping it cancels delivery and aborts the in-flight work.
pub struct Subscription<T> {
  rx: mpsc::UnboundedReceiver<Result<T>>,
  token: CancellationToken,
  handle: JoinHandle<()>,
}

impl<T> Subscription<T> {
  /// Next notification; `None` once the producer has completed or failed.
  pub async fn next(&mut self) -> Option<Result<T>> {
    self.rx.recv().await
  }

  pub fn cancel(&self) {
    self.token.cancel();
  }

  pub fn is_cancelled(&self) -> bool {
    self.token.is_cancelled()
  }

  /// Whether the driving task has exited.
  pub fn is_finished(&self) -> bool {
    self.handle.is_finished()
  }
}

impl<T> Drop for Subscription<T> {
  fn drop(&mut self) {
    self.token.cancel();
  }
}

fn stop_after_error<T, S>(stream: S) -> impl Stream<Item = Result<T>>
where
  S: Stream<Item = Result<T>>,
{
  stream.scan(false, |failed, item| {
    if *failed {
      return future::ready(None);
    }
    *failed = item.is_err();
    future::ready(Some(item))
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  #[tokio::test]
  async fn test_setup_runs_only_on_subscription() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let producer = Producer::defer(move || {
      counter.fetch_add(1, Ordering::SeqCst);
      Producer::value(7)
    });
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    assert_eq!(producer.first().await, Ok(7));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_map_and_then_preserve_order() {
    let producer = Producer::new(|| stream::iter(vec![Ok(1), Ok(2), Ok(3)]))
      .map(|v| v * 10)
      .and_then(|v| Producer::new(move || stream::iter(vec![Ok(v), Ok(v + 1)])));

    assert_eq!(producer.collect().await, Ok(vec![10, 11, 20, 21, 30, 31]));
  }

  #[tokio::test]
  async fn test_nothing_follows_an_error() {
    let producer = Producer::new(|| {
      stream::iter(vec![Ok(1), Err(TaskError::transport("boom")), Ok(2)])
    });

    let mut seen = Vec::new();
    let result = producer.for_each(|v| seen.push(v)).await;
    assert_eq!(seen, vec![1]);
    assert_eq!(result, Err(TaskError::transport("boom")));
  }

  #[tokio::test]
  async fn test_error_stops_and_then_chain() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let producer = Producer::<i32>::fail(TaskError::remote(500, "down")).and_then(move |v| {
      counter.fetch_add(1, Ordering::SeqCst);
      Producer::value(v)
    });

    assert_eq!(producer.first().await, Err(TaskError::remote(500, "down")));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_inspect_err_does_not_swallow() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let producer = Producer::<()>::fail(TaskError::merge("bad key")).inspect_err(move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(producer.first().await.is_err());
    assert_eq!(seen.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_take_completes_early() {
    let producer = Producer::new(|| stream::iter((0..10).map(Ok))).take(2);
    assert_eq!(producer.collect().await, Ok(vec![0, 1]));
  }

  #[tokio::test]
  async fn test_empty_first_is_an_error() {
    assert_eq!(Producer::<u8>::empty().first().await, Err(TaskError::Empty));
  }

  #[tokio::test]
  async fn test_subscription_delivers_then_ends() {
    let mut sub = Producer::new(|| stream::iter(vec![Ok("a"), Ok("b")])).subscribe();
    assert_eq!(sub.next().await, Some(Ok("a")));
    assert_eq!(sub.next().await, Some(Ok("b")));
    assert_eq!(sub.next().await, None);
  }

  #[tokio::test]
  async fn test_cancel_aborts_pending_work() {
    let finished = Arc::new(AtomicUsize::new(0));
    let flag = finished.clone();
    let producer = Producer::from_future(async move {
      tokio::time::sleep(Duration::from_secs(30)).await;
      flag.fetch_add(1, Ordering::SeqCst);
      Ok(1)
    });

    let mut sub = producer.subscribe();
    sub.cancel();
    assert_eq!(sub.next().await, None);
    assert!(sub.is_cancelled());
    assert_eq!(finished.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_until_cancelled_stops_stream() {
    let token = CancellationToken::new();
    token.cancel();
    let producer = Producer::from_future(async {
      tokio::time::sleep(Duration::from_secs(30)).await;
      Ok(1)
    })
    .until_cancelled(token);

    assert_eq!(producer.collect().await, Ok(vec![]));
  }
}
