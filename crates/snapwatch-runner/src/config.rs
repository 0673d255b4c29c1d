use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use snapwatch_collect::{CollectorSpec, FieldSelector, ListingSpec, RatingsSpec};
use snapwatch_core::{AlertMode, AlertRule, TargetName};
use snapwatch_notify::EmailSettings;

pub const DEFAULT_CONFIG_FILE: &str = "snapwatch.toml";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub email: EmailSettings,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Fs,
    Sqlite,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Snapshot directory (fs) or directory holding `snapwatch.db` (sqlite). `~` is expanded.
    #[serde(default = "default_store_dir")]
    pub dir: String,
}

fn default_store_dir() -> String {
    "~/.snapwatch".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { backend: StoreBackend::Fs, dir: default_store_dir() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("snapwatch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: TargetName,
    /// Shown in message subjects; defaults to `name`.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub mode: AlertMode,
    /// Keep every run's snapshot in the store's append-only history.
    #[serde(default)]
    pub history: bool,
    pub collector: CollectorSpec,
}

impl TargetConfig {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(self.name.as_str())
    }
}

enum Format {
    Toml,
    Yaml,
}

fn format_of(path: &Path) -> Format {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Format::Yaml,
        _ => Format::Toml,
    }
}

impl Config {
    /// Two starter targets: a dealer listing watched for new cars and a
    /// product grid alerting on items with no reviews.
    pub fn default_example() -> Self {
        let mut fields = std::collections::BTreeMap::new();
        fields.insert(
            "price".to_string(),
            FieldSelector { selector: Some(".price".to_string()), attr: None, numeric: true },
        );
        Self {
            store: StoreConfig::default(),
            email: EmailSettings::default(),
            http: HttpConfig::default(),
            targets: vec![
                TargetConfig {
                    name: TargetName::from("camry-listings"),
                    label: Some("Used Camry listings".to_string()),
                    mode: AlertMode::Added,
                    history: false,
                    collector: CollectorSpec::Listing(ListingSpec {
                        url: "https://www.dealer.example/used-vehicles/?make=Toyota&model=Camry".to_string(),
                        ready_selector: Some("#srp-results".to_string()),
                        item_selector: "#srp-results .listing".to_string(),
                        id_attr: Some("data-ag-vdp-url".to_string()),
                        resolve_ids: true,
                        fields,
                        allow_empty: false,
                    }),
                },
                TargetConfig {
                    name: TargetName::from("new-arrivals-reviews"),
                    label: None,
                    mode: AlertMode::Predicate {
                        rule: AlertRule::Below { field: "reviews".to_string(), threshold: 1.0 },
                        report_all_clear: false,
                    },
                    history: false,
                    collector: CollectorSpec::Ratings(RatingsSpec {
                        url: "https://www.shoes.example/womens/new-arrivals/".to_string(),
                        tile_selector: "li.tile".to_string(),
                        name_selector: Some("a[title]".to_string()),
                        name_attr: Some("title".to_string()),
                        rating_selector: ".a-rating .v--hidden".to_string(),
                        rating_index: 1,
                        limit: Some(1),
                    }),
                },
            ],
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = match format_of(path) {
            Format::Toml => toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?,
            Format::Yaml => serde_yaml::from_str(&s).with_context(|| format!("parse {}", path.display()))?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
            }
        }
        let s = match format_of(path) {
            Format::Toml => toml::to_string_pretty(self).with_context(|| "serialize toml")?,
            Format::Yaml => serde_yaml::to_string(self).with_context(|| "serialize yaml")?,
        };
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Target names double as file names and must be unique.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for t in &self.targets {
            if !t.name.is_valid() {
                bail!("invalid target name {:?}: use letters, digits, '-', '_' or '.'", t.name.as_str());
            }
            if !seen.insert(t.name.as_str()) {
                bail!("duplicate target name {:?}", t.name.as_str());
            }
        }
        Ok(())
    }

    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name.as_str() == name)
    }

    pub fn store_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.store.dir).to_string())
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.store_dir().join("locks")
    }

    pub fn db_path(&self) -> PathBuf {
        self.store_dir().join("snapwatch.db")
    }
}
