//! Client-side channel telemetry cache.
//!
//! # Overview
//!
//! `tidemark` caches time-series telemetry on the client side of a remote
//! store, per channel, in two cooperating layers:
//!
//! - A **dynamic cache** ([`DynamicCache`]) absorbs live streaming writes
//!   into fixed-capacity rolling buffers, normalizing samples to float32
//!   for rendering, and flushes each filled buffer downstream.
//! - A **static cache** ([`StaticCache`]) holds immutable historical spans
//!   as a sorted, non-overlapping timeline, answers coverage queries with
//!   the stored series plus the *gaps* still missing, and guards the
//!   gap-fill sequence with an exclusive per-channel [`FillPermit`].
//!
//! The [`Cache`] registry ties the layers together: it maps channel keys to
//! per-channel [`UnaryCache`] entries, batch-fetches metadata for unknown
//! channels through a [`ChannelRetriever`], and periodically purges
//! historical data nobody is reading.
//!
//! # Quick Start
//!
//! ```no_run
//! use tidemark::{Cache, CacheConfig, Channel, ChannelRetriever, ChannelKey, TimeRange};
//!
//! struct StoreClient;
//!
//! impl ChannelRetriever for StoreClient {
//!     async fn retrieve(&self, _keys: &[ChannelKey]) -> tidemark::Result<Vec<Channel>> {
//!         // Resolve metadata against the remote store here.
//!         Ok(Vec::new())
//!     }
//! }
//!
//! # async fn demo() -> tidemark::Result<()> {
//! let cache = Cache::new(StoreClient, CacheConfig::default());
//! cache.populate_missing(&[1, 2]).await?;
//!
//! let entry = cache.get(1)?;
//! let range = TimeRange::new(0u64, 1_000_000_000u64);
//! let (read, permit) = entry.dirty_read_for_write(range).await;
//! for _gap in &read.gaps {
//!     // Fetch each gap from the store and write it back:
//!     // entry.write_static(&fetched)?;
//! }
//! drop(permit);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`telem`]: timestamps and half-open time ranges.
//! - [`series`]: typed sample buffers with alignment and float32 conversion.
//! - [`bounds`]: alignment bounds and the insertion-plan computation.
//! - [`channel`]: channel metadata and the retriever trait.
//! - [`dynamic`]: the live rolling-buffer layer.
//! - [`static_cache`]: the historical interval layer.
//! - [`unary`]: the per-channel composite of the two layers.
//! - [`cache`]: the registry and its garbage collector.

pub mod bounds;
pub mod cache;
pub mod channel;
pub mod dynamic;
pub mod error;
pub mod series;
pub mod static_cache;
pub mod telem;
pub mod unary;

pub use bounds::{Bounds, InsertionPlan};
pub use cache::{Cache, CacheConfig, DEFAULT_DYNAMIC_BUFFER_SIZE};
pub use channel::{Channel, ChannelKey, ChannelRetriever};
pub use dynamic::{DynamicCache, DynamicWriteResponse};
pub use error::{CacheError, IntegrityError, RegistryError, Result, SeriesError};
pub use series::{DataType, Series, SeriesDigest};
pub use static_cache::{DirtyReadResult, FillPermit, GcMetrics, StaticCache};
pub use telem::{TimeRange, TimeStamp};
pub use unary::UnaryCache;
