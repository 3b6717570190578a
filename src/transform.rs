use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::join_all;
use log::debug;

use crate::config::TransformOptions;
use crate::error::{ResolveError, TransformError};
use crate::matcher::{collect_call_sites, CallSite, ENTRY_POINT};
use crate::parse::parse_module;
use crate::planner::{collect_edits, plan, PendingRewrite, ResolveWarning};
use crate::resolver::{AsyncScriptResolver, ScriptResolver};

/// Rewritten source of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedModule {
    pub code: String,
    /// Source map v3 JSON pointing back at the original text.
    pub map: String,
    pub warnings: Vec<ResolveWarning>,
}

impl TransformedModule {
    pub fn code_with_inline_map(&self) -> String {
        format!(
            "{}\n//# sourceMappingURL=data:application/json;charset=utf-8;base64,{}\n",
            self.code,
            STANDARD.encode(&self.map)
        )
    }
}

/// Result of running the stage over one file. `Unchanged` tells the host to
/// keep the input as is and skip any follow-up work for this file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    Unchanged { warnings: Vec<ResolveWarning> },
    Transformed(TransformedModule),
}

impl TransformOutcome {
    pub(crate) fn unchanged() -> Self {
        TransformOutcome::Unchanged { warnings: Vec::new() }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, TransformOutcome::Unchanged { .. })
    }

    pub fn warnings(&self) -> &[ResolveWarning] {
        match self {
            TransformOutcome::Unchanged { warnings } => warnings,
            TransformOutcome::Transformed(module) => &module.warnings,
        }
    }

    pub fn into_module(self) -> Option<TransformedModule> {
        match self {
            TransformOutcome::Transformed(module) => Some(module),
            TransformOutcome::Unchanged { .. } => None,
        }
    }
}

/// Parses and matches, or `None` when the file cannot contain a call.
fn call_sites(source: &str, id: &str) -> Result<Option<Vec<CallSite>>, TransformError> {
    if !source.contains(ENTRY_POINT) {
        return Ok(None);
    }
    let module = parse_module(source, id)?;
    let sites = collect_call_sites(&module, source);
    debug!("[script-bundle] {} call(s) to {} in {}", sites.len(), ENTRY_POINT, id);
    Ok(Some(sites))
}

fn finish(
    source: &str,
    id: &str,
    pending: &[PendingRewrite<'_>],
    resolved: Vec<Result<String, ResolveError>>,
) -> Result<TransformOutcome, TransformError> {
    let (edits, warnings) = collect_edits(id, pending, resolved);
    if edits.is_empty() {
        return Ok(TransformOutcome::Unchanged { warnings });
    }
    let (code, map) = edits.apply(source, id)?;
    Ok(TransformOutcome::Transformed(TransformedModule { code, map, warnings }))
}

/// Rewrites every bundled `useScript` call of one file.
///
/// The resolver is called once per call site that needs it, in source order.
pub fn transform(
    source: &str,
    id: &str,
    options: &TransformOptions,
    resolver: &dyn ScriptResolver,
) -> Result<TransformOutcome, TransformError> {
    let Some(sites) = call_sites(source, id)? else {
        return Ok(TransformOutcome::unchanged());
    };
    let pending = plan(&sites, &options.overrides);
    if pending.is_empty() {
        return Ok(TransformOutcome::unchanged());
    }
    let resolved = pending
        .iter()
        .map(|p| ScriptResolver::resolve(resolver, &p.locator.value))
        .collect();
    finish(source, id, &pending, resolved)
}

/// Same as [`transform`] with a resolver that may suspend. All locators of
/// the file are resolved concurrently; results are applied in source order.
pub async fn transform_async(
    source: &str,
    id: &str,
    options: &TransformOptions,
    resolver: &dyn AsyncScriptResolver,
) -> Result<TransformOutcome, TransformError> {
    let Some(sites) = call_sites(source, id)? else {
        return Ok(TransformOutcome::unchanged());
    };
    let pending = plan(&sites, &options.overrides);
    if pending.is_empty() {
        return Ok(TransformOutcome::unchanged());
    }
    let resolved = join_all(
        pending
            .iter()
            .map(|p| AsyncScriptResolver::resolve(resolver, &p.locator.value)),
    )
    .await;
    finish(source, id, &pending, resolved)
}
