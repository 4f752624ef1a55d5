//! Local caching module for per-server dashboard data.
//!
//! This module provides the `ResourceCache` for storing and retrieving
//! backend responses locally, keyed by server and resource kind. Each kind
//! has its own freshness window:
//! - Status and traffic: 60 minutes
//! - Action logs: 5 minutes (and never served from cache)

pub mod clock;
pub mod key;
pub mod manager;

pub use clock::{Clock, SystemClock};
pub use key::{CacheKey, ResourceKind};
pub use manager::{CacheLookup, CacheTtls, CachedData, ResourceCache};
