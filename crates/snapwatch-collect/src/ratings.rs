use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use snapwatch_core::{CollectionError, EntityRecord, FieldValue, Snapshot};

use crate::http::HttpFetcher;
use crate::listing::{compile, element_text};
use crate::traits::Collector;

/// Product grid whose tiles carry a review summary ("4.5 out of 5, 12 reviews").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RatingsSpec {
    pub url: String,
    pub tile_selector: String,
    #[serde(default)]
    pub name_selector: Option<String>,
    #[serde(default)]
    pub name_attr: Option<String>,
    pub rating_selector: String,
    /// Which match of `rating_selector` inside a tile holds the review text.
    #[serde(default)]
    pub rating_index: usize,
    /// Observe only the first `limit` tiles.
    #[serde(default)]
    pub limit: Option<usize>,
}

pub struct RatingsCollector {
    spec: RatingsSpec,
    fetcher: Option<HttpFetcher>,
    tile: Selector,
    name: Option<Selector>,
    rating: Selector,
}

fn review_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d[\d,]*)\s+reviews?\b").expect("review count regex"))
}

/// `"4.6 out of 5 stars, 1,204 reviews"` -> 1204. `None` when no count is present.
pub fn parse_review_count(text: &str) -> Option<i64> {
    let caps = review_count_re().captures(text)?;
    caps.get(1)?.as_str().replace(',', "").parse().ok()
}

impl RatingsCollector {
    pub fn new(spec: RatingsSpec, fetcher: Option<HttpFetcher>) -> Result<Self> {
        let tile = compile(&spec.tile_selector)?;
        let name = spec.name_selector.as_deref().map(compile).transpose()?;
        let rating = compile(&spec.rating_selector)?;
        Ok(Self { spec, fetcher, tile, name, rating })
    }

    pub fn parse(&self, html: &str) -> Result<Snapshot, CollectionError> {
        let doc = Html::parse_document(html);
        let limit = self.spec.limit.unwrap_or(usize::MAX);
        let mut snap = Snapshot::new();

        for (i, tile) in doc.select(&self.tile).take(limit).enumerate() {
            let name_el = match &self.name {
                Some(sel) => tile.select(sel).next(),
                None => Some(tile),
            };
            let name = name_el
                .and_then(|el| match &self.spec.name_attr {
                    Some(attr) => el.value().attr(attr).map(|s| s.trim().to_string()),
                    None => Some(element_text(&el)),
                })
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| format!("product {}", i + 1));

            let rating_text = tile
                .select(&self.rating)
                .nth(self.spec.rating_index)
                .map(|el| element_text(&el))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "No rating".to_string());

            let mut record = EntityRecord::new();
            if let Some(n) = parse_review_count(&rating_text) {
                record.insert("reviews".into(), FieldValue::Integer(n));
            }
            record.insert("rating".into(), FieldValue::Text(rating_text));

            // first tile wins when two products share a name
            if !snap.contains(&name.as_str().into()) {
                snap.insert(name, record);
            }
        }

        if snap.is_empty() {
            return Err(CollectionError::partial(
                &self.spec.url,
                format!("no product tiles matched {:?}", self.spec.tile_selector),
            ));
        }
        Ok(snap)
    }
}

impl Collector for RatingsCollector {
    fn describe(&self) -> String {
        format!("ratings {}", self.spec.url)
    }

    fn collect(&self) -> Result<Snapshot, CollectionError> {
        let fetcher = self
            .fetcher
            .as_ref()
            .ok_or_else(|| CollectionError::unreachable(&self.spec.url, "no HTTP client configured"))?;
        let html = fetcher.get_text(&self.spec.url)?;
        self.parse(&html)
    }
}
