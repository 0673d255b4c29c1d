use anyhow::Result;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use snapwatch_core::{CollectionError, EntityRecord, FieldValue, Snapshot};

use crate::http::HttpFetcher;
use crate::listing::compile;
use crate::traits::Collector;

pub const STATUS_OK: &str = "ok";

/// Structural checks on one page: elements that must be present, a minimum
/// item count and an attribute every item must carry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageHealthSpec {
    pub url: String,
    #[serde(default)]
    pub expected_selectors: Vec<String>,
    #[serde(default)]
    pub item_selector: Option<String>,
    #[serde(default)]
    pub min_items: usize,
    /// Attribute each item must carry with a non-blank value.
    #[serde(default)]
    pub required_attr: Option<String>,
}

/// One entity per check, each with a `status` field that is `"ok"` or the
/// failure. Pair with `not_equal { field = "status", value = "ok" }`.
pub struct PageHealthCollector {
    spec: PageHealthSpec,
    fetcher: Option<HttpFetcher>,
    expected: Vec<(String, Selector)>,
    item: Option<Selector>,
}

fn check(status: impl Into<String>) -> EntityRecord {
    let mut record = EntityRecord::new();
    record.insert("status".into(), FieldValue::Text(status.into()));
    record
}

impl PageHealthCollector {
    pub fn new(spec: PageHealthSpec, fetcher: Option<HttpFetcher>) -> Result<Self> {
        let expected = spec
            .expected_selectors
            .iter()
            .map(|s| Ok((s.clone(), compile(s)?)))
            .collect::<Result<Vec<_>>>()?;
        let item = spec.item_selector.as_deref().map(compile).transpose()?;
        Ok(Self { spec, fetcher, expected, item })
    }

    pub fn parse(&self, html: &str) -> Result<Snapshot, CollectionError> {
        let doc = Html::parse_document(html);
        let mut snap = Snapshot::new();

        for (raw, sel) in &self.expected {
            let status = if doc.select(sel).next().is_some() { STATUS_OK } else { "missing" };
            snap.insert(format!("element {}", raw), check(status));
        }

        if let (Some(raw), Some(sel)) = (&self.spec.item_selector, &self.item) {
            let items: Vec<_> = doc.select(sel).collect();
            let count = items.len();
            let mut record = if count < self.spec.min_items {
                check(format!("only {} found, expected at least {}", count, self.spec.min_items))
            } else {
                check(STATUS_OK)
            };
            record.insert("count".into(), FieldValue::Integer(count as i64));
            snap.insert(format!("items {}", raw), record);

            if let Some(attr) = &self.spec.required_attr {
                for (i, el) in items.iter().enumerate() {
                    let value = el.value().attr(attr).map(str::trim).filter(|v| !v.is_empty());
                    let mut record = match value {
                        Some(_) => check(STATUS_OK),
                        None => check(format!("missing {}", attr)),
                    };
                    if let Some(v) = value {
                        record.insert(attr.clone(), FieldValue::Text(v.to_string()));
                    }
                    snap.insert(format!("item {} {}", i + 1, attr), record);
                }
            }
        }

        if snap.is_empty() {
            return Err(CollectionError::partial(&self.spec.url, "no checks configured"));
        }
        Ok(snap)
    }
}

impl Collector for PageHealthCollector {
    fn describe(&self) -> String {
        format!("page health {} ({} selectors)", self.spec.url, self.expected.len())
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

#[cfg(test)]
mod tests {
    use super::*;
    use snapwatch_core::{plan, AlertMode, AlertRule, EntityId};

    const PAGE: &str = r#"
        <header><svg class="icon-cart-icon"></svg></header>
        <label for="pcp-filter-gender-0">Women</label>
        <div class="m-product-tile__name" data-navigation-url="/ghost-16">Ghost 16</div>
        <div class="m-product-tile__name" data-navigation-url="  ">Glycerin 22</div>
        <div class="m-product-tile__name" data-navigation-url="/adrenaline">Adrenaline</div>
    "#;

    fn spec() -> PageHealthSpec {
        PageHealthSpec {
            url: "https://www.shoes.example/en_us/shoes/".into(),
            expected_selectors: vec![
                "svg.icon-cart-icon".into(),
                "label[for='pcp-filter-gender-0']".into(),
                "button.js-load-more-button".into(),
            ],
            item_selector: Some("div.m-product-tile__name".into()),
            min_items: 12,
            required_attr: Some("data-navigation-url".into()),
        }
    }

    fn status<'a>(snap: &'a Snapshot, id: &str) -> &'a FieldValue {
        snap.get(&EntityId::from(id)).and_then(|r| r.get("status")).unwrap()
    }

    #[test]
    fn one_entity_per_check() {
        let snap = PageHealthCollector::new(spec(), None).unwrap().parse(PAGE).unwrap();
        assert_eq!(snap.len(), 3 + 1 + 3);
        assert_eq!(status(&snap, "element svg.icon-cart-icon"), &FieldValue::from("ok"));
        assert_eq!(status(&snap, "element button.js-load-more-button"), &FieldValue::from("missing"));
        assert_eq!(
            status(&snap, "items div.m-product-tile__name"),
            &FieldValue::from("only 3 found, expected at least 12")
        );
        assert_eq!(status(&snap, "item 1 data-navigation-url"), &FieldValue::from("ok"));
        assert_eq!(status(&snap, "item 2 data-navigation-url"), &FieldValue::from("missing data-navigation-url"));
    }

    #[test]
    fn failures_alert_through_not_equal_rule() {
        let snap = PageHealthCollector::new(spec(), None).unwrap().parse(PAGE).unwrap();
        let mode = AlertMode::Predicate {
            rule: AlertRule::NotEqual { field: "status".into(), value: FieldValue::from(STATUS_OK) },
            report_all_clear: false,
        };
        let p = plan("Shoes page", &mode, &Snapshot::new(), &snap);
        assert_eq!(p.matched.len(), 3);
        let body = &p.message.unwrap().body;
        assert!(body.contains("button.js-load-more-button"));
        assert!(body.contains("item 2 data-navigation-url"));
    }

    #[test]
    fn healthy_page_is_all_ok() {
        let mut s = spec();
        s.expected_selectors.truncate(2);
        s.min_items = 2;
        let html = PAGE.replace(r#"data-navigation-url="  ""#, r#"data-navigation-url="/glycerin-22""#);
        let snap = PageHealthCollector::new(s, None).unwrap().parse(&html).unwrap();
        assert!(snap.iter().all(|(_, r)| r.get("status") == Some(&FieldValue::from(STATUS_OK))));
        let items = snap.get(&EntityId::from("items div.m-product-tile__name")).unwrap();
        assert_eq!(items.get("count"), Some(&FieldValue::Integer(3)));
    }

    #[test]
    fn bad_selector_is_rejected_up_front() {
        let mut s = spec();
        s.expected_selectors.push("li[".into());
        assert!(PageHealthCollector::new(s, None).is_err());
    }

    #[test]
    fn nothing_to_check_is_an_error() {
        let s = PageHealthSpec {
            url: "https://x".into(),
            expected_selectors: vec![],
            item_selector: None,
            min_items: 0,
            required_attr: None,
        };
        let collector = PageHealthCollector::new(s, None).unwrap();
        assert!(matches!(collector.parse(PAGE), Err(CollectionError::Partial { .. })));
    }
}
