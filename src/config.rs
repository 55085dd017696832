// src/config.rs
//! # Watchlist Configuration
//!
//! The source registry (feed catalog grouped by category) plus the keyword
//! list the scanner matches against.
//!
//! - Ships with a built-in defense-news seed (`WatchConfig::default_seed`).
//! - Optionally loaded from a TOML or JSON file (env path, then `config/`).
//! - `ConfigHandle` wraps the live config in `Arc<RwLock<..>>`: scans take
//!   immutable snapshots, the API mutates through `apply_update` only.
//!
//! Keywords are ordered; the first keyword in the list that matches an entry
//! wins, so sanitization must never reorder them.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

pub const ENV_CONFIG_PATH: &str = "WATCHLIST_CONFIG_PATH";

/// One feed source in the registry. Identity is `id`; runtime updates may
/// only flip `enabled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub category: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// The full watchlist: ordered keyword list + source registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl WatchConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading watchlist from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse_config(&content, ext.as_str())?;
        cfg.keywords = clean_keywords(cfg.keywords);
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $WATCHLIST_CONFIG_PATH
    /// 2) config/watchlist.toml
    /// 3) config/watchlist.json
    /// 4) built-in seed
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("WATCHLIST_CONFIG_PATH points to non-existent path"));
        }
        let toml_p = PathBuf::from("config/watchlist.toml");
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from("config/watchlist.json");
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Ok(Self::default_seed())
    }

    /// Built-in seed: the default defense-news catalog, everything enabled.
    pub fn default_seed() -> Self {
        let mut sources = Vec::new();
        for (id, name, category, url) in [
            (
                "janes_air",
                "Janes Air Platforms",
                "AIR_FORCE",
                "https://www.janes.com/feeds/news",
            ),
            (
                "flight_global",
                "FlightGlobal Defense",
                "AIR_FORCE",
                "https://www.flightglobal.com/rss/defence",
            ),
            (
                "naval_news",
                "Naval News",
                "NAVAL",
                "https://www.navalnews.com/feed/",
            ),
            (
                "hacker_news",
                "The Hacker News",
                "CYBER_INTEL",
                "https://thehackernews.com/feeds/posts/default",
            ),
            (
                "threat_post",
                "ThreatPost",
                "CYBER_INTEL",
                "https://threatpost.com/feed/",
            ),
            (
                "def_one",
                "Defense One",
                "GEOPOLITICS",
                "https://www.defenseone.com/rss/all/",
            ),
            (
                "breaking_def",
                "Breaking Defense",
                "GEOPOLITICS",
                "https://breakingdefense.com/feed/",
            ),
            (
                "asia_def",
                "Asia Pacific Defense",
                "REGIONAL",
                "https://www.asiapacificdefensejournal.com/feeds/posts/default",
            ),
            (
                "global_times",
                "Global Times (Mil)",
                "REGIONAL",
                "https://www.globaltimes.cn/rss/military.xml",
            ),
        ] {
            sources.push(Source {
                id: id.to_string(),
                name: name.to_string(),
                category: category.to_string(),
                url: url.to_string(),
                enabled: true,
            });
        }

        let keywords = ["J-35", "Pakistan", "Stealth", "Cyber", "Drone", "Nuclear", "PAF"]
            .into_iter()
            .map(String::from)
            .collect();

        Self { keywords, sources }
    }

    /// Sources grouped by category, categories in stable (sorted) order.
    pub fn grouped_sources(&self) -> BTreeMap<String, Vec<Source>> {
        let mut out: BTreeMap<String, Vec<Source>> = BTreeMap::new();
        for s in &self.sources {
            out.entry(s.category.clone()).or_default().push(s.clone());
        }
        out
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<WatchConfig> {
    let try_toml_first = hint_ext != "json";
    if try_toml_first {
        if let Ok(v) = parse_toml_config(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json_config(s) {
        return Ok(v);
    }
    if !try_toml_first {
        if let Ok(v) = parse_toml_config(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported watchlist format"))
}

fn parse_toml_config(s: &str) -> Result<WatchConfig> {
    let v: WatchConfig = toml::from_str(s)?;
    Ok(v)
}

fn parse_json_config(s: &str) -> Result<WatchConfig> {
    let v: WatchConfig = serde_json::from_str(s)?;
    Ok(v)
}

/// Trim, drop empties, drop case-insensitive duplicates. Order is preserved.
fn clean_keywords(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if t.is_empty() {
            continue;
        }
        if seen.insert(t.to_lowercase()) {
            out.push(t.to_string());
        }
    }
    out
}

/// A partial update from `POST /api/config`. Absent fields leave the current
/// value untouched; `keywords` replaces the list wholesale.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub sources: Option<BTreeMap<String, bool>>,
}

/// Shared handle over the live watchlist.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<WatchConfig>>,
}

impl ConfigHandle {
    pub fn new(cfg: WatchConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(cfg)),
        }
    }

    /// Clone of the current config. Scans snapshot once at start, so edits
    /// made mid-scan apply from the next scan on.
    pub fn snapshot(&self) -> WatchConfig {
        self.inner.read().expect("rwlock poisoned").clone()
    }

    /// The single write path. Unknown source ids are ignored.
    pub fn apply_update(&self, update: ConfigUpdate) {
        let mut cfg = self.inner.write().expect("rwlock poisoned");
        if let Some(keywords) = update.keywords {
            cfg.keywords = clean_keywords(keywords);
        }
        if let Some(toggles) = update.sources {
            for (id, enabled) in toggles {
                if let Some(src) = cfg.sources.iter_mut().find(|s| s.id == id) {
                    src.enabled = enabled;
                }
            }
        }
    }
}
