use log::{debug, warn};

use crate::config::{AssetStrategy, OverrideTable};
use crate::edit::{Edit, EditSet};
use crate::error::ResolveError;
use crate::matcher::{CallSite, LiteralLocator};

/// A call site whose resolver failed; its text was left as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveWarning {
    pub file: String,
    pub locator: String,
    pub key: Option<String>,
    /// One-based line of the call.
    pub line: u32,
    /// One-based column of the call, counted in characters.
    pub column: u32,
    pub message: String,
}

impl std::fmt::Display for ResolveWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}: could not bundle `{}`: {}",
            self.file, self.line, self.column, self.locator, self.message
        )
    }
}

/// Inline `assetStrategy: 'bundle'`, or an override keyed by `key` and then
/// by `src` whose strategy is `bundle`. A non-literal locator never bundles.
pub fn should_bundle(site: &CallSite, overrides: &OverrideTable) -> bool {
    let Some(locator) = &site.locator else { return false };
    wants_bundle(
        site.directive.as_ref().map(|d| &d.strategy),
        site.key.as_deref(),
        &locator.value,
        overrides,
    )
}

pub(crate) fn wants_bundle(
    directive: Option<&AssetStrategy>,
    key: Option<&str>,
    src: &str,
    overrides: &OverrideTable,
) -> bool {
    directive.is_some_and(AssetStrategy::is_bundle) || overrides.bundles(key, Some(src))
}

/// A call that will be rewritten once its locator is resolved.
pub(crate) struct PendingRewrite<'a> {
    pub site: &'a CallSite,
    pub locator: &'a LiteralLocator,
}

pub(crate) fn plan<'a>(sites: &'a [CallSite], overrides: &OverrideTable) -> Vec<PendingRewrite<'a>> {
    sites
        .iter()
        .filter_map(|site| {
            let locator = site.locator.as_ref()?;
            should_bundle(site, overrides).then_some(PendingRewrite { site, locator })
        })
        .collect()
}

/// Quotes `value` with `quote`, escaping what would end or break the literal.
pub fn quote_literal(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            '$' if quote == '`' => out.push_str("\\$"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn edits_for(pending: &PendingRewrite<'_>, resolved: &str) -> Vec<Edit> {
    let mut edits = Vec::with_capacity(2);
    if resolved != pending.locator.value {
        edits.push(Edit::replace(
            pending.locator.range.clone(),
            quote_literal(resolved, pending.locator.quote),
        ));
    }
    if let Some(removal) = pending.site.directive.as_ref().and_then(|d| d.removal.clone()) {
        edits.push(Edit::remove(removal));
    }
    edits
}

/// Turns resolver results (one per pending rewrite, same order) into edits.
/// Failed resolutions become warnings and leave their call untouched.
pub(crate) fn collect_edits(
    file: &str,
    pending: &[PendingRewrite<'_>],
    resolved: Vec<Result<String, ResolveError>>,
) -> (EditSet, Vec<ResolveWarning>) {
    let mut edits = EditSet::new();
    let mut warnings = Vec::new();

    for (pending, result) in pending.iter().zip(resolved) {
        match result {
            Ok(path) => {
                debug!("[script-bundle] {} -> {} in {}", pending.locator.value, path, file);
                if !edits.insert_group(edits_for(pending, &path)) {
                    debug!(
                        "[script-bundle] overlapping edit for `{}` in {}, skipping",
                        pending.locator.value, file
                    );
                }
            }
            Err(err) => {
                let warning = ResolveWarning {
                    file: file.to_string(),
                    locator: pending.locator.value.clone(),
                    key: pending.site.key.clone(),
                    line: pending.site.line,
                    column: pending.site.column,
                    message: err.message().to_string(),
                };
                warn!("[script-bundle] {warning}");
                warnings.push(warning);
            }
        }
    }

    (edits, warnings)
}
