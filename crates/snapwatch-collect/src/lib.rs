//! Collectors turn an external source into a [`snapwatch_core::Snapshot`].
//!
//! Fetching and parsing are kept apart: each collector pulls bytes through
//! [`HttpFetcher`] and hands them to a pure parse function that the tests
//! exercise on fixture documents.

pub mod health;
pub mod http;
pub mod listing;
pub mod pagespeed;
pub mod ratings;
pub mod sitemap;
pub mod spec;
pub mod traits;

pub use health::{PageHealthCollector, PageHealthSpec};
pub use http::HttpFetcher;
pub use listing::{FieldSelector, ListingCollector, ListingSpec};
pub use pagespeed::{PageSpeedCollector, PageSpeedSpec, PageSpeedTest};
pub use ratings::{RatingsCollector, RatingsSpec};
pub use sitemap::{UrlStatusCollector, UrlStatusSpec};
pub use spec::CollectorSpec;
pub use traits::{Collector, FailingCollector, StaticCollector};
