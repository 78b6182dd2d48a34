#![allow(dead_code)]

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use resourcache_core::{FetchContext, FetchError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

pub type StringFetcher =
    Box<dyn Fn(FetchContext) -> BoxFuture<'static, Result<String, FetchError>> + Send + Sync>;

/// A fetcher that resolves immediately with `value` and counts its calls.
pub fn counting(
    calls: &Arc<AtomicUsize>,
    value: &str,
) -> impl Fn(FetchContext) -> BoxFuture<'static, Result<String, FetchError>> + Send + Sync + 'static
{
    let calls = Arc::clone(calls);
    let value = value.to_string();
    move |_ctx| {
        calls.fetch_add(1, Ordering::SeqCst);
        let value = value.clone();
        async move { Ok(value) }.boxed()
    }
}

/// A fetcher whose calls stay pending until the test resolves them, one by
/// one, in any order. It ignores its cancellation token on purpose.
#[derive(Clone, Default)]
pub struct Gate {
    senders: Arc<Mutex<Vec<Option<oneshot::Sender<Result<String, FetchError>>>>>>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetcher(
        &self,
    ) -> impl Fn(FetchContext) -> BoxFuture<'static, Result<String, FetchError>> + Send + Sync + 'static
    {
        let gate = self.clone();
        move |_ctx| {
            let (tx, rx) = oneshot::channel();
            gate.senders.lock().push(Some(tx));
            async move { rx.await.unwrap_or(Err(FetchError::Cancelled)) }.boxed()
        }
    }

    pub fn calls(&self) -> usize {
        self.senders.lock().len()
    }

    pub async fn wait_calls(&self, n: usize) {
        while self.calls() < n {
            tokio::task::yield_now().await;
        }
    }

    pub fn resolve(&self, call: usize, result: Result<&str, FetchError>) {
        let tx = self.senders.lock()[call]
            .take()
            .expect("call already resolved");
        let _ = tx.send(result.map(str::to_string));
    }
}

/// Lets spawned fetch tasks run to completion.
pub async fn settle_tasks() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub async fn wait_count(calls: &AtomicUsize, n: usize) {
    while calls.load(Ordering::SeqCst) < n {
        tokio::task::yield_now().await;
    }
}
