use anyhow::Result;
use serde::{Deserialize, Serialize};
use snapwatch_core::Snapshot;

use crate::health::{PageHealthCollector, PageHealthSpec};
use crate::http::HttpFetcher;
use crate::listing::{ListingCollector, ListingSpec};
use crate::pagespeed::{PageSpeedCollector, PageSpeedSpec};
use crate::ratings::{RatingsCollector, RatingsSpec};
use crate::sitemap::{UrlStatusCollector, UrlStatusSpec};
use crate::traits::{Collector, StaticCollector};

/// Collector section of a target in the config file, selected by `kind`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollectorSpec {
    Listing(ListingSpec),
    Ratings(RatingsSpec),
    UrlStatus(UrlStatusSpec),
    PageSpeed(PageSpeedSpec),
    PageHealth(PageHealthSpec),
    /// Fixed id set; no network.
    Static { ids: Vec<String> },
}

impl CollectorSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            CollectorSpec::Listing(_) => "listing",
            CollectorSpec::Ratings(_) => "ratings",
            CollectorSpec::UrlStatus(_) => "url_status",
            CollectorSpec::PageSpeed(_) => "page_speed",
            CollectorSpec::PageHealth(_) => "page_health",
            CollectorSpec::Static { .. } => "static",
        }
    }

    /// Instantiate the collector. Fails on invalid selectors, never on the network.
    pub fn build(&self, fetcher: &HttpFetcher) -> Result<Box<dyn Collector>> {
        Ok(match self {
            CollectorSpec::Listing(spec) => Box::new(ListingCollector::new(spec.clone(), Some(fetcher.clone()))?),
            CollectorSpec::Ratings(spec) => Box::new(RatingsCollector::new(spec.clone(), Some(fetcher.clone()))?),
            CollectorSpec::UrlStatus(spec) => Box::new(UrlStatusCollector::new(spec.clone(), fetcher.clone())),
            CollectorSpec::PageSpeed(spec) => {
                let api_key = std::env::var(&spec.api_key_env).ok().filter(|k| !k.is_empty());
                Box::new(PageSpeedCollector::new(spec.clone(), fetcher.clone(), api_key))
            }
            CollectorSpec::PageHealth(spec) => {
                Box::new(PageHealthCollector::new(spec.clone(), Some(fetcher.clone()))?)
            }
            CollectorSpec::Static { ids } => {
                Box::new(StaticCollector::new(Snapshot::from_ids(ids.iter().map(String::as_str))))
            }
        })
    }
}
