//! Bounded parallel map for "query every node" sweeps.

use std::future::Future;

use futures_util::StreamExt;
use futures_util::stream;

/// Run `f` over `items` with at most `limit` futures in flight.
///
/// Results come back in completion order.
pub async fn map_bounded<I, F, Fut, T>(items: I, limit: usize, f: F) -> Vec<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(items)
        .map(f)
        .buffer_unordered(limit.max(1))
        .collect()
        .await
}
