//! The fetcher contract and the type-erased plumbing behind it.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio_util::sync::CancellationToken;

use crate::dependency::Dependency;
use crate::error::FetchError;

/// Handed to the fetcher on every invocation.
///
/// The cache never aborts a fetch itself: it cancels the token and ignores
/// whatever the fetch produces afterwards. Transports should pass the token
/// down (or `select!` on [`FetchContext::cancelled`]) to stop network work.
///
/// # Examples
///
/// ```ignore
/// cache.subscribe(key, |ctx: FetchContext| async move {
///     tokio::select! {
///         _ = ctx.cancelled() => Err(FetchError::Cancelled),
///         res = api.get_portfolio(42) => res,
///     }
/// }, ResourceOptions::new())?;
/// ```
#[derive(Debug, Clone)]
pub struct FetchContext {
    token: CancellationToken,
    force: bool,
}

impl FetchContext {
    pub(crate) fn new(token: CancellationToken, force: bool) -> Self {
        Self { token, force }
    }

    /// Whether this fetch was started by a forced refresh.
    pub fn force(&self) -> bool {
        self.force
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the cache cancels this fetch.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// The underlying token, for transports that accept one directly.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

pub(crate) type ErasedFetcher =
    Arc<dyn Fn(FetchContext) -> BoxFuture<'static, Result<ErasedValue, FetchError>> + Send + Sync>;

/// Wraps a typed fetcher so entries of any payload type share one table.
pub(crate) fn erase<T, F, Fut>(fetcher: F) -> ErasedFetcher
where
    T: Send + Sync + 'static,
    F: Fn(FetchContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    Arc::new(move |ctx| {
        fetcher(ctx)
            .map(|res| res.map(|value| Arc::new(value) as ErasedValue))
            .boxed()
    })
}

/// How a fetch ended, as seen by the callers awaiting it.
#[derive(Clone)]
pub(crate) enum Settlement {
    /// The outcome was written to the entry.
    Applied(Result<ErasedValue, FetchError>),
    /// The outcome was thrown away: the fetch was cancelled or superseded.
    Discarded,
}

pub(crate) type SettlementFuture = Shared<BoxFuture<'static, Settlement>>;

/// The fetch currently running for a key.
pub(crate) struct InFlight {
    pub(crate) seq: u64,
    pub(crate) forced: bool,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) token: CancellationToken,
    pub(crate) settled: SettlementFuture,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_erased_fetcher_boxes_value() {
        let fetcher = erase(|ctx: FetchContext| async move {
            assert!(ctx.force());
            Ok::<_, FetchError>(42u32)
        });

        let value = fetcher(FetchContext::new(CancellationToken::new(), true))
            .await
            .unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&42));
    }

    #[tokio::test]
    async fn test_context_observes_cancellation() {
        let token = CancellationToken::new();
        let ctx = FetchContext::new(token.clone(), false);
        assert!(!ctx.is_cancelled());

        token.cancel();
        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
    }
}
