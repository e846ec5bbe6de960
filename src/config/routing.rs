//! Hot-reloadable routing/delegation patterns.
//!
//! Operators edit this file to retune which keywords route to which tool
//! without a restart. A `notify` watcher reloads it on write and publishes
//! the new value through an `arc_swap::ArcSwap`, so readers never block on
//! a lock during a reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPattern {
    pub tool: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub regexes: Vec<String>,
}

/// A slot an [`IntentSpec`] needs resolved before the orchestrator can act
/// on it. If none of `regexes` matches the query, the classifier emits
/// `clarifying_question` instead of letting the turn proceed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSpec {
    pub name: String,
    #[serde(default)]
    pub regexes: Vec<String>,
    pub clarifying_question: String,
}

/// A named intent: the first whose `keywords`/`regexes` match the
/// lowercased query wins, ties broken by declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSpec {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub regexes: Vec<String>,
    #[serde(default)]
    pub slots: Vec<SlotSpec>,
}

fn default_requires_tool_keywords() -> Vec<String> {
    vec![
        "search".into(),
        "look up".into(),
        "calculate".into(),
        "compute".into(),
        "fetch".into(),
        "download".into(),
        "run".into(),
        "execute".into(),
    ]
}

fn default_requires_tool_regexes() -> Vec<String> {
    vec![
        r"\d+\s*[+\-*/^]\s*\d+".to_string(),
        r"https?://\S+".to_string(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub patterns: Vec<ToolPattern>,
    #[serde(default)]
    pub intents: Vec<IntentSpec>,
    /// Keywords that, when present, mean the query should see tool schemas
    /// at all — used to suppress tool injection for small talk.
    #[serde(default = "default_requires_tool_keywords")]
    pub requires_tool_keywords: Vec<String>,
    #[serde(default = "default_requires_tool_regexes")]
    pub requires_tool_regexes: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            intents: Vec::new(),
            requires_tool_keywords: default_requires_tool_keywords(),
            requires_tool_regexes: default_requires_tool_regexes(),
        }
    }
}

impl RoutingConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

/// Starts a background file watcher that keeps `handle` in sync with the
/// contents of `path`. The returned `Watcher` must be kept alive for the
/// duration of the watch; dropping it stops the reload.
pub fn watch_routing_config(
    path: impl AsRef<Path>,
    handle: Arc<ArcSwap<RoutingConfig>>,
) -> anyhow::Result<notify::RecommendedWatcher> {
    let path: PathBuf = path.as_ref().to_path_buf();

    if let Ok(initial) = RoutingConfig::from_file(&path) {
        handle.store(Arc::new(initial));
    } else {
        warn!(path = %path.display(), "routing config not found at startup, using defaults");
    }

    let watch_path = path.clone();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        let event = match event {
            Ok(e) => e,
            Err(err) => {
                error!(%err, "routing config watcher error");
                return;
            }
        };
        if !event.kind.is_modify() && !event.kind.is_create() {
            return;
        }
        match RoutingConfig::from_file(&watch_path) {
            Ok(fresh) => {
                info!(path = %watch_path.display(), patterns = fresh.patterns.len(), "reloaded routing config");
                handle.store(Arc::new(fresh));
            }
            Err(err) => {
                error!(%err, path = %watch_path.display(), "failed to reload routing config, keeping previous version");
            }
        }
    })?;

    watcher.watch(&path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Debounce window used by callers that batch reload notifications instead
/// of reacting to every individual filesystem event.
pub const RELOAD_DEBOUNCE: Duration = Duration::from_millis(250);
