use serde::{Deserialize, Serialize};
use snapwatch_core::{CollectionError, EntityRecord, FieldValue, Snapshot};

use crate::http::HttpFetcher;
use crate::traits::Collector;

pub const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/pagespeedonline/v5/runPagespeed";

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_api_key_env() -> String {
    "API_KEY".to_string()
}

/// Lighthouse performance score of one page under one or more test profiles.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageSpeedSpec {
    pub url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub tests: Vec<PageSpeedTest>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageSpeedTest {
    /// Becomes the `#name` suffix of the entity id, e.g. `mobile_slow`.
    pub name: String,
    pub strategy: String,
    #[serde(default)]
    pub throttling_method: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    lighthouse_result: LighthouseResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LighthouseResult {
    final_url: Option<String>,
    categories: Categories,
    #[serde(default)]
    config_settings: Option<ConfigSettings>,
}

#[derive(Debug, Deserialize)]
struct Categories {
    performance: Category,
}

#[derive(Debug, Deserialize)]
struct Category {
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigSettings {
    form_factor: Option<String>,
}

/// Turn one API response into a record. A missing score is malformed: the
/// API returns `null` when Lighthouse could not finish the audit.
pub fn parse_pagespeed(source: &str, body: &serde_json::Value) -> Result<EntityRecord, CollectionError> {
    let resp: ApiResponse =
        serde_json::from_value(body.clone()).map_err(|e| CollectionError::malformed(source, e))?;
    let lighthouse = resp.lighthouse_result;
    let score = lighthouse
        .categories
        .performance
        .score
        .ok_or_else(|| CollectionError::malformed(source, "performance score missing"))?;

    let mut record = EntityRecord::new();
    record.insert("performance".into(), FieldValue::Integer((score * 100.0).round() as i64));
    if let Some(url) = lighthouse.final_url {
        record.insert("final_url".into(), FieldValue::Text(url));
    }
    if let Some(form_factor) = lighthouse.config_settings.and_then(|c| c.form_factor) {
        record.insert("strategy".into(), FieldValue::Text(form_factor));
    }
    Ok(record)
}

pub struct PageSpeedCollector {
    spec: PageSpeedSpec,
    fetcher: HttpFetcher,
    api_key: Option<String>,
}

impl PageSpeedCollector {
    pub fn new(spec: PageSpeedSpec, fetcher: HttpFetcher, api_key: Option<String>) -> Self {
        Self { spec, fetcher, api_key }
    }
}

impl Collector for PageSpeedCollector {
    fn describe(&self) -> String {
        format!("pagespeed {} ({} tests)", self.spec.url, self.spec.tests.len())
    }

    fn collect(&self) -> Result<Snapshot, CollectionError> {
        let key = self.api_key.as_deref().ok_or_else(|| {
            CollectionError::unreachable(&self.spec.endpoint, format!("{} is not set", self.spec.api_key_env))
        })?;
        if self.spec.tests.is_empty() {
            return Err(CollectionError::partial(&self.spec.url, "no tests configured"));
        }

        let mut snap = Snapshot::new();
        for test in &self.spec.tests {
            let mut query = vec![("url", self.spec.url.as_str()), ("key", key), ("strategy", test.strategy.as_str())];
            if let Some(method) = &test.throttling_method {
                query.push(("throttlingMethod", method.as_str()));
            }
            tracing::info!(url = %self.spec.url, test = %test.name, "requesting pagespeed audit");
            let body: serde_json::Value = self.fetcher.get_json(&self.spec.endpoint, &query)?;
            let record = parse_pagespeed(&self.spec.url, &body)?;
            snap.insert(format!("{}#{}", self.spec.url, test.name), record);
        }
        Ok(snap)
    }
}
