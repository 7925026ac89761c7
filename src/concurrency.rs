//! Bounded concurrency for independent I/O
//!
//! Attachment downloads, file writes and deletions inside one pass run
//! through [`bounded`], so a large tree never opens more than `limit`
//! requests or file handles at once.

use futures::stream::{self, StreamExt};
use std::future::Future;

/// Run `f` over `items` with at most `limit` futures in flight.
///
/// Results come back in input order. A `limit` of zero is treated as one.
pub async fn bounded<I, F, Fut>(items: I, limit: usize, f: F) -> Vec<Fut::Output>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future,
{
    stream::iter(items)
        .map(f)
        .buffered(limit.max(1))
        .collect()
        .await
}
