//! Feed ingestion: one websocket connection, classified events, bounded
//! caches and listener buses.

pub mod backoff;
pub mod bus;
pub mod cache;
pub mod classifier;
pub mod client;

pub use backoff::ReconnectPolicy;
pub use bus::{Delivery, EventBus, SubscriptionId};
pub use cache::RingBuffer;
pub use classifier::{FeedEvent, classify};
pub use client::{ConnectionState, ConnectivityStatus, StreamClient, StreamStats};
