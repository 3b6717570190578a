//! Build-time rewrite of `useScript(...)` calls so that third-party script
//! URLs point at copies served from the application's own origin.
//!
//! ```text
//! useScript('https://a.cdn/x.js', { assetStrategy: 'bundle' })
//! // becomes
//! useScript('/_scripts/x.js', {})
//! ```
//!
//! The text pipeline ([`transform`], [`transform_async`], [`ScriptBundler`])
//! edits the original source in place and returns a source map. The AST
//! pipeline ([`ScriptAssetRewriter`], and `process_transform` with the
//! `plugin` feature) applies the same decisions to an swc program.

mod bundler;
mod config;
mod edit;
mod error;
mod filter;
mod lines;
mod matcher;
mod parse;
mod planner;
mod resolver;
mod rewrite;
mod transform;

pub use bundler::ScriptBundler;
pub use config::{
    AssetStrategy, AssetsConfig, OverrideTable, ScriptOverride, ScriptsConfig, TransformOptions,
    DEFAULT_ASSET_PREFIX,
};
pub use edit::{Edit, EditSet};
pub use error::{ConfigError, ResolveError, TransformError};
pub use filter::{FileFilter, ParseSyntax};
pub use matcher::{
    find_call_sites, CallSite, Directive, LiteralLocator, LocatorShape, DIRECTIVE_PROPERTY,
    ENTRY_POINT, KEY_PROPERTY, SRC_PROPERTY,
};
pub use planner::{quote_literal, should_bundle, ResolveWarning};
pub use resolver::{AsyncScriptResolver, MemoizedResolver, PublicAssetResolver, ScriptResolver};
pub use rewrite::ScriptAssetRewriter;
pub use transform::{transform, transform_async, TransformOutcome, TransformedModule};

// -----------------------------------------------------------------------------
// Entrypoint (swc plugin)
// -----------------------------------------------------------------------------

/// Configuration passed to the swc plugin. Locators are resolved by the host
/// before the plugin runs.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    #[serde(default)]
    pub overrides: OverrideTable,
    #[serde(default)]
    pub resolved: std::collections::HashMap<String, String>,
}

#[cfg(feature = "plugin")]
#[swc_core::plugin::plugin_transform]
pub fn process_transform(
    mut program: swc_core::ecma::ast::Program,
    metadata: swc_core::plugin::proxies::TransformPluginProgramMetadata,
) -> swc_core::ecma::ast::Program {
    use swc_core::ecma::visit::VisitMutWith;

    let config: PluginConfig = metadata
        .get_transform_plugin_config()
        .map(|s| serde_json::from_str(&s).unwrap_or_default())
        .unwrap_or_default();

    program.visit_mut_with(&mut ScriptAssetRewriter::new(&config.overrides, &config.resolved));
    program
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_config_reads_resolved_table() {
        let config: PluginConfig = serde_json::from_str(
            r#"{
                "overrides": { "ga": { "assetStrategy": "bundle" } },
                "resolved": { "https://a.cdn/x.js": "/_scripts/x.js" }
            }"#,
        )
        .unwrap();
        assert!(config.overrides.bundles(Some("ga"), None));
        assert_eq!(config.resolved["https://a.cdn/x.js"], "/_scripts/x.js");
    }
}
