//! Content-addressed review cache for wispbit.
//!
//! A review of file `f` can be skipped when `f`'s patch hash, the applied
//! rule set, and every file visited during the original review are all
//! unchanged. The cache is one JSON document under the workspace's
//! `.wispbit` directory; writes are serialised behind a lock and failures
//! degrade caching without failing the review.

mod store;

pub use store::{freshness_token, ReviewCache, CACHE_FILE};
