//! Channel metadata and the external retriever boundary.
//!
//! Channels are owned by the remote data store; the cache only consumes
//! their metadata to size and type its per-channel buffers, and never
//! mutates it. The [`ChannelRetriever`] trait is the sole external
//! collaborator of the registry: `populate_missing` batch-fetches metadata
//! for exactly the keys it has never seen.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::series::DataType;

/// Uniquely identifies a channel within the remote store.
pub type ChannelKey = u32;

/// Metadata describing a named, typed source of time-ordered samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// The channel's unique key.
    pub key: ChannelKey,
    /// Human-readable channel name.
    pub name: String,
    /// The sample type the channel carries.
    pub data_type: DataType,
    /// Key of the channel's index channel (0 when the channel is its own
    /// index or has none).
    pub index: ChannelKey,
    /// Nominal sample rate in Hz (0.0 for purely index-driven channels).
    pub rate: f32,
}

impl Channel {
    /// Creates channel metadata with no index and no fixed rate.
    pub fn new(key: ChannelKey, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            key,
            name: name.into(),
            data_type,
            index: 0,
            rate: 0.0,
        }
    }
}

/// Batch retriever for channel metadata.
///
/// Implemented by the surrounding client against the remote store's channel
/// API. The registry calls it only from `populate_missing`, and only with
/// keys that have no cache entry yet. Keys absent from the returned list
/// simply never get an entry; transport failures should be surfaced via
/// [`CacheError::retrieval`](crate::error::CacheError::retrieval) and are
/// passed through to the caller unchanged.
pub trait ChannelRetriever {
    /// Fetches metadata for the given channel keys.
    fn retrieve(
        &self,
        keys: &[ChannelKey],
    ) -> impl Future<Output = Result<Vec<Channel>>> + Send;
}
