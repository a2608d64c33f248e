//! Storage layer: page channel, scratch-buffer pool, and usage maps.

pub mod pager;
pub mod pool;
pub mod usage_map;

pub use pager::{Codec, IdentityCodec, PageChannel, PageType};
pub use usage_map::UsageMap;
