use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use snapwatch_core::{CollectionError, EntityRecord, FieldValue, Snapshot};

use crate::http::HttpFetcher;
use crate::traits::Collector;

/// Listing page watched for new entries (e.g. a dealer's used-inventory results).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListingSpec {
    pub url: String,
    /// Must match somewhere on the page, otherwise the page did not render as expected.
    #[serde(default)]
    pub ready_selector: Option<String>,
    pub item_selector: String,
    /// Attribute carrying the identity; the item's text when unset.
    #[serde(default)]
    pub id_attr: Option<String>,
    /// Resolve attribute ids against the page URL. Turn off for non-URL
    /// attributes such as `data-vin`. Text ids are never resolved.
    #[serde(default = "default_true")]
    pub resolve_ids: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSelector>,
    /// A page with zero items is an error unless this is set.
    #[serde(default)]
    pub allow_empty: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldSelector {
    /// Relative to the item; the item itself when unset.
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub attr: Option<String>,
    /// Strip currency symbols and separators and store a number.
    #[serde(default)]
    pub numeric: bool,
}

struct CompiledField {
    name: String,
    selector: Option<Selector>,
    attr: Option<String>,
    numeric: bool,
}

pub struct ListingCollector {
    spec: ListingSpec,
    fetcher: Option<HttpFetcher>,
    ready: Option<Selector>,
    item: Selector,
    fields: Vec<CompiledField>,
}

pub(crate) fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid selector {:?}: {}", selector, e))
}

pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `"$21,450"` -> 21450, `"4.5 stars"` -> 4.5; text that holds no number stays text.
pub(crate) fn numeric_value(raw: &str) -> FieldValue {
    let cleaned: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-').collect();
    if let Ok(v) = cleaned.parse::<i64>() {
        return FieldValue::Integer(v);
    }
    match cleaned.parse::<f64>() {
        Ok(v) => FieldValue::Float(v),
        Err(_) => FieldValue::Text(raw.to_string()),
    }
}

impl ListingCollector {
    pub fn new(spec: ListingSpec, fetcher: Option<HttpFetcher>) -> Result<Self> {
        let ready = spec.ready_selector.as_deref().map(compile).transpose()?;
        let item = compile(&spec.item_selector)?;
        let fields = spec
            .fields
            .iter()
            .map(|(name, f)| -> Result<CompiledField> {
                Ok(CompiledField {
                    name: name.clone(),
                    selector: f.selector.as_deref().map(compile).transpose()?,
                    attr: f.attr.clone(),
                    numeric: f.numeric,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { spec, fetcher, ready, item, fields })
    }

    // Relative links become absolute so ids stay stable if the page moves.
    fn resolve(base: Option<&Url>, raw: &str) -> String {
        if Url::parse(raw).is_ok() {
            return raw.to_string();
        }
        match base.and_then(|b| b.join(raw).ok()) {
            Some(u) => u.to_string(),
            None => raw.to_string(),
        }
    }

    /// Pure half of the collector: page HTML in, snapshot out.
    pub fn parse(&self, html: &str) -> Result<Snapshot, CollectionError> {
        let source = self.spec.url.as_str();
        let doc = Html::parse_document(html);

        if let Some(ready) = &self.ready {
            if doc.select(ready).next().is_none() {
                return Err(CollectionError::malformed(
                    source,
                    format!("ready selector {:?} not found", self.spec.ready_selector.as_deref().unwrap_or_default()),
                ));
            }
        }

        let base = Url::parse(source).ok();
        let mut snap = Snapshot::new();
        let mut items = 0usize;
        let mut skipped = 0usize;

        for el in doc.select(&self.item) {
            items += 1;
            let (raw_id, is_link) = match &self.spec.id_attr {
                Some(attr) => (
                    el.value().attr(attr).map(str::trim).unwrap_or_default().to_string(),
                    self.spec.resolve_ids,
                ),
                None => (element_text(&el), false),
            };
            if raw_id.is_empty() {
                skipped += 1;
                continue;
            }

            let mut record = EntityRecord::new();
            for field in &self.fields {
                let target = match &field.selector {
                    Some(sel) => el.select(sel).next(),
                    None => Some(el),
                };
                let Some(target) = target else { continue };
                let raw = match &field.attr {
                    Some(attr) => target.value().attr(attr).map(|s| s.trim().to_string()),
                    None => Some(element_text(&target)),
                };
                if let Some(raw) = raw.filter(|s| !s.is_empty()) {
                    let value = if field.numeric { numeric_value(&raw) } else { FieldValue::Text(raw) };
                    record.insert(field.name.clone(), value);
                }
            }
            let id = if is_link { Self::resolve(base.as_ref(), &raw_id) } else { raw_id };
            snap.insert(id, record);
        }

        if skipped > 0 {
            tracing::warn!(source, skipped, "listing items without identity skipped");
        }
        if items > 0 && snap.is_empty() {
            return Err(CollectionError::partial(source, format!("{} items matched but none carried an identity", items)));
        }
        if snap.is_empty() && !self.spec.allow_empty {
            return Err(CollectionError::partial(
                source,
                format!("no items matched {:?}", self.spec.item_selector),
            ));
        }
        Ok(snap)
    }
}

impl Collector for ListingCollector {
    fn describe(&self) -> String {
        format!("listing {}", self.spec.url)
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
