use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_ASSET_PREFIX: &str = "/_scripts/";

const BUNDLE: &str = "bundle";

/// Declared value of `assetStrategy`, either inline or in an override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssetStrategy {
    Bundle,
    /// Anything else. Kept for diagnostics, never acted on.
    Other(String),
}

impl AssetStrategy {
    pub fn is_bundle(&self) -> bool {
        matches!(self, AssetStrategy::Bundle)
    }
}

impl From<String> for AssetStrategy {
    fn from(value: String) -> Self {
        if value == BUNDLE {
            AssetStrategy::Bundle
        } else {
            AssetStrategy::Other(value)
        }
    }
}

impl From<&str> for AssetStrategy {
    fn from(value: &str) -> Self {
        value.to_string().into()
    }
}

impl From<AssetStrategy> for String {
    fn from(value: AssetStrategy) -> Self {
        match value {
            AssetStrategy::Bundle => BUNDLE.to_string(),
            AssetStrategy::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptOverride {
    #[serde(default)]
    pub asset_strategy: Option<AssetStrategy>,
}

impl ScriptOverride {
    pub fn bundle() -> Self {
        Self { asset_strategy: Some(AssetStrategy::Bundle) }
    }

    fn bundles(&self) -> bool {
        self.asset_strategy.as_ref().is_some_and(AssetStrategy::is_bundle)
    }
}

/// Host-supplied policy keyed by a call's `key` or by its literal `src`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverrideTable {
    entries: HashMap<String, ScriptOverride>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ScriptOverride) -> &mut Self {
        self.entries.insert(key.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry for `key` wins over the one for `src`, even when its strategy
    /// is not `bundle`.
    pub fn lookup(&self, key: Option<&str>, src: Option<&str>) -> Option<&ScriptOverride> {
        key.and_then(|k| self.entries.get(k))
            .or_else(|| src.and_then(|s| self.entries.get(s)))
    }

    pub fn bundles(&self, key: Option<&str>, src: Option<&str>) -> bool {
        self.lookup(key, src).is_some_and(ScriptOverride::bundles)
    }
}

impl<K: Into<String>> FromIterator<(K, ScriptOverride)> for OverrideTable {
    fn from_iter<T: IntoIterator<Item = (K, ScriptOverride)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect() }
    }
}

/// Per-invocation options of the core transform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformOptions {
    #[serde(default)]
    pub overrides: OverrideTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetsConfig {
    /// Base URL under which published scripts are served.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self { prefix: default_prefix() }
    }
}

fn default_prefix() -> String {
    DEFAULT_ASSET_PREFIX.to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_exclude() -> Vec<String> {
    vec![r"[\\/]node_modules[\\/]".to_string()]
}

/// Host-side configuration, as read from the build tool's JSON options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub overrides: OverrideTable,
    #[serde(default)]
    pub assets: AssetsConfig,
    /// Regular expressions over file ids that are never transformed.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            debug: false,
            overrides: OverrideTable::default(),
            assets: AssetsConfig::default(),
            exclude: default_exclude(),
        }
    }
}

impl ScriptsConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions { overrides: self.overrides.clone() }
    }
}
