use std::ops::Range;

use swc_core::{
    common::{BytePos, Span, Spanned},
    ecma::{
        ast::*,
        visit::{Visit, VisitWith},
    },
};

use crate::config::AssetStrategy;
use crate::error::TransformError;
use crate::parse::{parse_module, ParsedChunk, ParsedModule};

/// Callee name recognised as the script loader. Matched by identifier text
/// only; a local rebinding of the name is not detected.
pub const ENTRY_POINT: &str = "useScript";
pub const SRC_PROPERTY: &str = "src";
pub const KEY_PROPERTY: &str = "key";
pub const DIRECTIVE_PROPERTY: &str = "assetStrategy";

// -----------------------------------------------------------------------------
// AST view (shared by the text editor and the AST rewriter)
// -----------------------------------------------------------------------------

/// Where the locator sits in the call's first argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorShape {
    /// `useScript('https://…')`
    StringLiteral,
    /// `useScript({ src: 'https://…' })`
    ObjectField,
}

pub(crate) enum LocatorNode {
    Literal { value: String, span: Span },
    /// Anything that is not a plain literal: identifiers, interpolated
    /// templates, shorthand properties, calls.
    Dynamic,
}

pub(crate) struct DirectiveNode {
    pub strategy: AssetStrategy,
    /// Index of the property in the options object.
    pub index: usize,
    /// Text to delete so the object stays valid. Only for `bundle`.
    pub removal: Option<(BytePos, BytePos)>,
    /// The directive is the object's only property.
    pub sole: bool,
}

pub(crate) struct ScriptCall {
    pub shape: LocatorShape,
    /// `None` when an object argument has no `src` property.
    pub locator: Option<LocatorNode>,
    pub key: Option<String>,
    pub directive: Option<DirectiveNode>,
}

fn prop_name(key: &PropName) -> Option<&str> {
    match key {
        PropName::Ident(i) => Some(i.sym.as_ref()),
        PropName::Str(s) => Some(s.value.as_ref()),
        _ => None,
    }
}

/// Last property named `name` (later keys win in JS). The inner value is
/// `None` for forms without a plain value expression (shorthand, methods).
fn find_prop<'a>(obj: &'a ObjectLit, name: &str) -> Option<(usize, Option<&'a Expr>)> {
    obj.props.iter().enumerate().rev().find_map(|(index, p)| {
        let PropOrSpread::Prop(p) = p else { return None };
        match &**p {
            Prop::KeyValue(kv) if prop_name(&kv.key) == Some(name) => Some((index, Some(&*kv.value))),
            Prop::Shorthand(id) if id.sym.as_ref() == name => Some((index, None)),
            Prop::Method(m) if prop_name(&m.key) == Some(name) => Some((index, None)),
            Prop::Getter(g) if prop_name(&g.key) == Some(name) => Some((index, None)),
            _ => None,
        }
    })
}

/// A quoted string, or a template with no substitutions and no escapes.
fn literal_str(expr: &Expr) -> Option<(String, Span)> {
    match expr {
        Expr::Lit(Lit::Str(s)) => Some((s.value.to_string(), s.span)),
        Expr::Tpl(tpl) if tpl.exprs.is_empty() && tpl.quasis.len() == 1 => {
            let raw = tpl.quasis[0].raw.as_ref();
            (!raw.contains('\\')).then(|| (raw.to_string(), tpl.span))
        }
        _ => None,
    }
}

fn locator_node(expr: Option<&Expr>) -> LocatorNode {
    match expr.and_then(literal_str) {
        Some((value, span)) => LocatorNode::Literal { value, span },
        None => LocatorNode::Dynamic,
    }
}

fn removal_range(obj: &ObjectLit, index: usize) -> (BytePos, BytePos) {
    let props = &obj.props;
    if props.len() == 1 {
        // widened over surrounding whitespace once the text is at hand
        (props[index].span_lo(), props[index].span_hi())
    } else if index + 1 < props.len() {
        (props[index].span_lo(), props[index + 1].span_lo())
    } else {
        (props[index - 1].span_hi(), props[index].span_hi())
    }
}

fn inspect_directive(arg: Option<&ExprOrSpread>) -> Option<DirectiveNode> {
    let arg = arg.filter(|a| a.spread.is_none())?;
    let Expr::Object(obj) = &*arg.expr else { return None };
    let (index, value) = find_prop(obj, DIRECTIVE_PROPERTY)?;
    let (value, _) = literal_str(value?)?;
    let strategy = AssetStrategy::from(value);
    let removal = strategy.is_bundle().then(|| removal_range(obj, index));
    Some(DirectiveNode {
        strategy,
        index,
        removal,
        sole: obj.props.len() == 1,
    })
}

/// Recognises `useScript(...)` and pulls out everything the planner needs.
/// Calls whose first argument is neither a literal nor an object literal
/// (or that have no argument at all) are not matched.
pub(crate) fn inspect_call(call: &CallExpr) -> Option<ScriptCall> {
    let Callee::Expr(callee) = &call.callee else { return None };
    match &**callee {
        Expr::Ident(id) if id.sym.as_ref() == ENTRY_POINT => {}
        _ => return None,
    }

    let first = call.args.first().filter(|a| a.spread.is_none())?;
    let (shape, locator, key) = match &*first.expr {
        Expr::Object(obj) => {
            let locator = find_prop(obj, SRC_PROPERTY).map(|(_, value)| locator_node(value));
            let key = find_prop(obj, KEY_PROPERTY)
                .and_then(|(_, value)| value.and_then(literal_str))
                .map(|(key, _)| key);
            (LocatorShape::ObjectField, locator, key)
        }
        expr @ (Expr::Lit(Lit::Str(_)) | Expr::Tpl(_)) => {
            (LocatorShape::StringLiteral, Some(locator_node(Some(expr))), None)
        }
        _ => return None,
    };

    Some(ScriptCall {
        shape,
        locator,
        key,
        directive: inspect_directive(call.args.get(1)),
    })
}

// -----------------------------------------------------------------------------
// Text view
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralLocator {
    pub value: String,
    /// Byte range of the literal including its quotes.
    pub range: Range<usize>,
    pub quote: char,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub strategy: AssetStrategy,
    /// Byte range to delete; present only when the strategy is `bundle`.
    pub removal: Option<Range<usize>>,
}

/// One matched `useScript` call, with byte ranges into the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub range: Range<usize>,
    /// One-based line of the call.
    pub line: u32,
    /// One-based column of the call, counted in characters.
    pub column: u32,
    pub shape: LocatorShape,
    /// Absent when the locator is missing or not a plain literal.
    pub locator: Option<LiteralLocator>,
    pub key: Option<String>,
    pub directive: Option<Directive>,
}

/// Extends the range of an object's only property over the whitespace (and
/// a trailing comma) around it, so `{ assetStrategy: 'bundle' }` becomes `{}`
/// while comments inside the braces stay.
fn widen_sole_property(source: &str, range: Range<usize>) -> Range<usize> {
    let start = source[..range.start].trim_end_matches(char::is_whitespace).len();
    let rest = source[range.end..].trim_start_matches(char::is_whitespace);
    let rest = rest.strip_prefix(',').unwrap_or(rest).trim_start_matches(char::is_whitespace);
    start..source.len() - rest.len()
}

struct CallSiteCollector<'a> {
    source: &'a str,
    module: &'a ParsedModule,
    chunk: &'a ParsedChunk,
    sites: Vec<CallSite>,
}

impl CallSiteCollector<'_> {
    fn range(&self, lo: BytePos, hi: BytePos) -> Range<usize> {
        self.chunk.positions.offset(lo)..self.chunk.positions.offset(hi)
    }

    fn call_site(&self, span: Span, call: ScriptCall) -> CallSite {
        let locator = match call.locator {
            Some(LocatorNode::Literal { value, span }) => {
                let range = self.range(span.lo(), span.hi());
                let quote = self.source[range.start..].chars().next().unwrap_or('\'');
                Some(LiteralLocator { value, range, quote })
            }
            _ => None,
        };
        let directive = call.directive.map(|d| Directive {
            strategy: d.strategy,
            removal: d.removal.map(|(lo, hi)| {
                let range = self.range(lo, hi);
                if d.sole {
                    widen_sole_property(self.source, range)
                } else {
                    range
                }
            }),
        });
        let (line, column) = self.module.line_col(&self.chunk.positions, span.lo());
        CallSite {
            range: self.range(span.lo(), span.hi()),
            line,
            column,
            shape: call.shape,
            locator,
            key: call.key,
            directive,
        }
    }
}

impl Visit for CallSiteCollector<'_> {
    fn visit_call_expr(&mut self, n: &CallExpr) {
        if let Some(call) = inspect_call(n) {
            let site = self.call_site(n.span, call);
            self.sites.push(site);
        }
        n.visit_children_with(self);
    }
}

pub(crate) fn collect_call_sites(module: &ParsedModule, source: &str) -> Vec<CallSite> {
    let mut sites = Vec::new();
    for chunk in &module.chunks {
        let mut collector = CallSiteCollector {
            source,
            module,
            chunk,
            sites: Vec::new(),
        };
        chunk.program.visit_with(&mut collector);
        sites.append(&mut collector.sites);
    }
    sites.sort_by_key(|s| s.range.start);
    sites
}

/// Parses `source` and lists every `useScript` call in source order.
pub fn find_call_sites(source: &str, id: &str) -> Result<Vec<CallSite>, TransformError> {
    let module = parse_module(source, id)?;
    Ok(collect_call_sites(&module, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sites(code: &str) -> Vec<CallSite> {
        find_call_sites(code, "file.js").unwrap()
    }

    fn text<'a>(code: &'a str, range: &Range<usize>) -> &'a str {
        &code[range.clone()]
    }

    #[test]
    fn string_argument() {
        let code = "const s = useScript('https://a.cdn/x.js', { assetStrategy: 'bundle' })";
        let sites = sites(code);
        assert_eq!(sites.len(), 1);
        let site = &sites[0];
        assert_eq!(site.shape, LocatorShape::StringLiteral);
        assert_eq!(text(code, &site.range), "useScript('https://a.cdn/x.js', { assetStrategy: 'bundle' })");

        let locator = site.locator.as_ref().unwrap();
        assert_eq!(locator.value, "https://a.cdn/x.js");
        assert_eq!(text(code, &locator.range), "'https://a.cdn/x.js'");
        assert_eq!(locator.quote, '\'');

        let directive = site.directive.as_ref().unwrap();
        assert_eq!(directive.strategy, AssetStrategy::Bundle);
        assert_eq!(text(code, directive.removal.as_ref().unwrap()), " assetStrategy: 'bundle' ");
    }

    #[test]
    fn object_argument() {
        let code = r#"useScript({ defer: true, key: "ga", src: "https://a.cdn/x.js" })"#;
        let site = &sites(code)[0];
        assert_eq!(site.shape, LocatorShape::ObjectField);
        assert_eq!(site.key.as_deref(), Some("ga"));
        let locator = site.locator.as_ref().unwrap();
        assert_eq!(text(code, &locator.range), r#""https://a.cdn/x.js""#);
        assert_eq!(locator.quote, '"');
        assert!(site.directive.is_none());
    }

    #[test]
    fn dynamic_src_keeps_key() {
        let code = "useScript({ key: 'ga', src: `https://a.cdn/${id}.js` })";
        let site = &sites(code)[0];
        assert!(site.locator.is_none());
        assert_eq!(site.key.as_deref(), Some("ga"));

        let code = "useScript({ key: 'ga', src })";
        assert!(sites(code)[0].locator.is_none());
    }

    #[test]
    fn plain_template_counts_as_literal() {
        let code = "useScript(`https://a.cdn/x.js`)";
        let locator = sites(code)[0].locator.clone().unwrap();
        assert_eq!(locator.value, "https://a.cdn/x.js");
        assert_eq!(locator.quote, '`');
    }

    #[test]
    fn interpolated_template_is_not_a_literal() {
        let code = "useScript(`https://a.cdn/${v}/x.js`, { assetStrategy: 'bundle' })";
        let site = &sites(code)[0];
        assert_eq!(site.shape, LocatorShape::StringLiteral);
        assert!(site.locator.is_none());
    }

    #[test]
    fn other_directive_values_have_no_removal() {
        let code = "useScript('https://a.cdn/x.js', { assetStrategy: 'cdn' })";
        let directive = sites(code)[0].directive.clone().unwrap();
        assert_eq!(directive.strategy, AssetStrategy::Other("cdn".into()));
        assert!(directive.removal.is_none());

        let code = "useScript('https://a.cdn/x.js', { assetStrategy: strategy })";
        assert!(sites(code)[0].directive.is_none());
    }

    #[test]
    fn removal_ranges_keep_object_valid() {
        let code = "useScript('https://a.cdn/x.js', { assetStrategy: 'bundle', defer: true })";
        let removal = sites(code)[0].directive.clone().unwrap().removal.unwrap();
        assert_eq!(text(code, &removal), "assetStrategy: 'bundle', ");

        let code = "useScript('https://a.cdn/x.js', { defer: true, assetStrategy: 'bundle' })";
        let removal = sites(code)[0].directive.clone().unwrap().removal.unwrap();
        assert_eq!(text(code, &removal), ", assetStrategy: 'bundle'");

        let code = "useScript('https://a.cdn/x.js', {\n  assetStrategy: 'bundle',\n})";
        let removal = sites(code)[0].directive.clone().unwrap().removal.unwrap();
        assert_eq!(text(code, &removal), "\n  assetStrategy: 'bundle',\n");
    }

    #[test]
    fn sole_directive_removal_keeps_comments() {
        let code = "useScript('https://a.cdn/x.js', { /* why */ assetStrategy: 'bundle' })";
        let removal = sites(code)[0].directive.clone().unwrap().removal.unwrap();
        assert_eq!(text(code, &removal), " assetStrategy: 'bundle' ");

        let code = "useScript('https://a.cdn/x.js', {\n  assetStrategy: 'bundle', // pinned\n})";
        let removal = sites(code)[0].directive.clone().unwrap().removal.unwrap();
        assert_eq!(text(code, &removal), "\n  assetStrategy: 'bundle', ");
    }

    #[test]
    fn call_sites_carry_line_and_column() {
        let code = "// héllo\nconst a = 1\n  const b = useScript('https://a.cdn/x.js')";
        let site = &sites(code)[0];
        assert_eq!((site.line, site.column), (3, 13));
    }

    #[test]
    fn calls_survive_unrelated_syntax_errors() {
        let code = "useScript('https://a.cdn/a.js', { assetStrategy: 'bundle' })\nconst = ;\nuseScript({ src: 'https://a.cdn/b.js' })";
        let sites = sites(code);
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].line, 1);
        assert_eq!(text(code, &sites[0].locator.as_ref().unwrap().range), "'https://a.cdn/a.js'");
        assert_eq!(sites[1].line, 3);
        assert_eq!(text(code, &sites[1].locator.as_ref().unwrap().range), "'https://a.cdn/b.js'");
    }

    #[test]
    fn skips_calls_it_cannot_read() {
        assert!(sites("useScript()").is_empty());
        assert!(sites("useScript(...args)").is_empty());
        assert!(sites("useScript(url, { assetStrategy: 'bundle' })").is_empty());
        assert!(sites("obj.useScript('https://a.cdn/x.js')").is_empty());
        assert!(sites("useScriptGoogleAnalytics({ id: 'x' })").is_empty());
    }

    #[test]
    fn nested_calls_in_source_order() {
        let code = "useScript('https://a.cdn/a.js', { onLoaded: () => useScript('https://a.cdn/b.js') })\nuseScript({ src: 'https://a.cdn/c.js' })";
        let values: Vec<_> = sites(code)
            .into_iter()
            .map(|s| s.locator.unwrap().value)
            .collect();
        assert_eq!(values, ["https://a.cdn/a.js", "https://a.cdn/b.js", "https://a.cdn/c.js"]);
    }

    #[test]
    fn ranges_survive_multibyte_text() {
        let code = "// héllo wörld 😀\nuseScript('https://a.cdn/x.js')";
        let locator = sites(code)[0].locator.clone().unwrap();
        assert_eq!(text(code, &locator.range), "'https://a.cdn/x.js'");
    }
}
