use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use snapwatch_core::{CollectionError, EntityRecord, FieldValue, Snapshot};

use crate::http::HttpFetcher;
use crate::traits::Collector;

/// Link health check over a sitemap plus hand-picked URLs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UrlStatusSpec {
    #[serde(default)]
    pub sitemap_index: Option<String>,
    /// Child sitemaps kept when their URL contains any of these (all when empty).
    #[serde(default)]
    pub sitemap_filters: Vec<String>,
    /// Page URLs kept when they contain any of these (all when empty).
    #[serde(default)]
    pub url_filters: Vec<String>,
    #[serde(default)]
    pub manual_urls: Vec<String>,
}

pub struct UrlStatusCollector {
    spec: UrlStatusSpec,
    fetcher: HttpFetcher,
}

fn loc_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<loc>\s*(.*?)\s*</loc>").expect("loc regex"))
}

/// All `<loc>` values of a sitemap or sitemap index, entity-decoded.
pub fn extract_locs(xml: &str) -> Vec<String> {
    loc_re()
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .replace("&lt;", "<")
                .replace("&gt;", ">")
                .replace("&quot;", "\"")
                .replace("&apos;", "'")
                .replace("&amp;", "&")
        })
        .filter(|s| !s.is_empty())
        .collect()
}

fn keep(url: &str, filters: &[String]) -> bool {
    filters.is_empty() || filters.iter().any(|f| url.contains(f.as_str()))
}

impl UrlStatusCollector {
    pub fn new(spec: UrlStatusSpec, fetcher: HttpFetcher) -> Self {
        Self { spec, fetcher }
    }

    /// URLs to check. A sitemap that cannot be fetched fails the whole collection.
    pub fn discover(&self) -> Result<BTreeSet<String>, CollectionError> {
        let mut urls: BTreeSet<String> = self.spec.manual_urls.iter().cloned().collect();

        if let Some(index) = &self.spec.sitemap_index {
            let index_xml = self.fetcher.get_text(index)?;
            let sitemaps = extract_locs(&index_xml);
            if sitemaps.is_empty() {
                return Err(CollectionError::malformed(index, "sitemap index lists no sitemaps"));
            }
            for sitemap in sitemaps.iter().filter(|s| keep(s, &self.spec.sitemap_filters)) {
                tracing::info!(sitemap = %sitemap, "parsing sitemap");
                let xml = self.fetcher.get_text(sitemap)?;
                urls.extend(extract_locs(&xml).into_iter().filter(|u| keep(u, &self.spec.url_filters)));
            }
        }
        Ok(urls)
    }
}

/// One record per URL: integer HTTP status, or the transport error as text.
pub fn status_snapshot<I>(results: I) -> Snapshot
where
    I: IntoIterator<Item = (String, Result<u16, String>)>,
{
    let mut snap = Snapshot::new();
    for (url, result) in results {
        let value = match result {
            Ok(code) => FieldValue::Integer(code as i64),
            Err(reason) => FieldValue::Text(reason),
        };
        let mut record = EntityRecord::new();
        record.insert("status".into(), value);
        snap.insert(url, record);
    }
    snap
}

impl Collector for UrlStatusCollector {
    fn describe(&self) -> String {
        match &self.spec.sitemap_index {
            Some(index) => format!("url status {}", index),
            None => format!("url status ({} urls)", self.spec.manual_urls.len()),
        }
    }

    fn collect(&self) -> Result<Snapshot, CollectionError> {
        let urls = self.discover()?;
        if urls.is_empty() {
            return Err(CollectionError::partial(self.describe(), "no URLs to check"));
        }
        tracing::info!(count = urls.len(), "checking URLs");

        let results = urls.into_iter().map(|url| {
            let result = self.fetcher.status_of(&url);
            match &result {
                Ok(code) if *code != 200 => tracing::warn!(url = %url, status = code, "non-200 status"),
                Err(e) => tracing::warn!(url = %url, error = %e, "URL check failed"),
                _ => {}
            }
            (url, result)
        });
        Ok(status_snapshot(results))
    }
}
