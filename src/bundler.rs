use log::{debug, info};

use crate::config::{ScriptsConfig, TransformOptions};
use crate::error::{ConfigError, TransformError};
use crate::filter::FileFilter;
use crate::resolver::{MemoizedResolver, PublicAssetResolver};
use crate::transform::{transform, TransformOutcome};

/// Host-facing pipeline stage: configuration, file filtering and a shared,
/// memoized public-asset resolver around [`transform`].
///
/// One instance is meant to be shared by every file of a build; it is
/// `Send + Sync` and keeps no per-file state.
pub struct ScriptBundler {
    config: ScriptsConfig,
    options: TransformOptions,
    filter: FileFilter,
    resolver: MemoizedResolver<PublicAssetResolver>,
}

impl ScriptBundler {
    pub fn new(config: ScriptsConfig) -> Result<Self, ConfigError> {
        let filter = FileFilter::new(&config.exclude)?;
        let resolver = MemoizedResolver::new(PublicAssetResolver::new(config.assets.prefix.clone()));
        Ok(Self {
            options: config.transform_options(),
            config,
            filter,
            resolver,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Self::new(ScriptsConfig::from_json(json)?)
    }

    pub fn config(&self) -> &ScriptsConfig {
        &self.config
    }

    pub fn transform(&self, source: &str, id: &str) -> Result<TransformOutcome, TransformError> {
        if !self.config.enabled {
            return Ok(TransformOutcome::unchanged());
        }
        if !self.filter.should_transform(id) {
            debug!("[script-bundle] skipping {id}");
            return Ok(TransformOutcome::unchanged());
        }
        let outcome = transform(source, id, &self.options, &self.resolver)?;
        if self.config.debug && !outcome.is_unchanged() {
            info!("[script-bundle] rewrote script urls in {id}");
        }
        Ok(outcome)
    }

    /// Locators seen so far and the public paths they were given. The host
    /// copies these into its public directory. Locators that already are their
    /// own public path are left out.
    pub fn published(&self) -> Vec<(String, String)> {
        let mut published = self.resolver.resolved();
        published.retain(|(src, path)| src != path);
        published
    }
}
