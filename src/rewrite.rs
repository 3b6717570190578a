use std::collections::HashMap;

use log::debug;
use swc_core::{
    common::Spanned,
    ecma::{
        ast::*,
        visit::{VisitMut, VisitMutWith},
    },
};

use crate::config::OverrideTable;
use crate::matcher::{inspect_call, LocatorNode, LocatorShape, SRC_PROPERTY};
use crate::planner::wants_bundle;

/// Applies the bundling rewrite to an swc AST instead of source text.
///
/// Used when the host is itself an swc pass and has resolved the locators up
/// front: `resolved` maps each bundled locator to its local path. Locators
/// missing from the table are left alone.
pub struct ScriptAssetRewriter<'a> {
    overrides: &'a OverrideTable,
    resolved: &'a HashMap<String, String>,
    rewritten: usize,
}

impl<'a> ScriptAssetRewriter<'a> {
    pub fn new(overrides: &'a OverrideTable, resolved: &'a HashMap<String, String>) -> Self {
        Self { overrides, resolved, rewritten: 0 }
    }

    /// Number of calls rewritten so far.
    pub fn rewritten(&self) -> usize {
        self.rewritten
    }
}

fn str_expr(expr: &Expr, value: &str) -> Box<Expr> {
    Box::new(Expr::Lit(Lit::Str(Str {
        span: expr.span(),
        value: value.into(),
        raw: None,
    })))
}

fn replace_src(call: &mut CallExpr, shape: LocatorShape, path: &str) {
    let Some(first) = call.args.first_mut() else { return };
    match shape {
        LocatorShape::StringLiteral => first.expr = str_expr(&first.expr, path),
        LocatorShape::ObjectField => {
            let Expr::Object(obj) = &mut *first.expr else { return };
            // last `src` wins, matching the matcher
            let kv = obj.props.iter_mut().rev().find_map(|p| match p {
                PropOrSpread::Prop(p) => match &mut **p {
                    Prop::KeyValue(kv) if prop_is(&kv.key, SRC_PROPERTY) => Some(kv),
                    _ => None,
                },
                _ => None,
            });
            if let Some(kv) = kv {
                kv.value = str_expr(&kv.value, path);
            }
        }
    }
}

fn prop_is(key: &PropName, name: &str) -> bool {
    match key {
        PropName::Ident(i) => i.sym.as_ref() == name,
        PropName::Str(s) => s.value.as_ref() == name,
        _ => false,
    }
}

impl VisitMut for ScriptAssetRewriter<'_> {
    fn visit_mut_call_expr(&mut self, n: &mut CallExpr) {
        n.visit_mut_children_with(self);

        let Some(call) = inspect_call(n) else { return };
        let Some(LocatorNode::Literal { value, .. }) = &call.locator else { return };
        let directive = call.directive.as_ref().map(|d| &d.strategy);
        if !wants_bundle(directive, call.key.as_deref(), value, self.overrides) {
            return;
        }
        let Some(path) = self.resolved.get(value) else {
            debug!("[script-bundle] no resolved path for `{value}`, leaving call as is");
            return;
        };

        replace_src(n, call.shape, path);
        if let Some(d) = call.directive.as_ref().filter(|d| d.removal.is_some()) {
            if let Some(Expr::Object(obj)) = n.args.get_mut(1).map(|a| &mut *a.expr) {
                obj.props.remove(d.index);
            }
        }
        self.rewritten += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScriptOverride;
    use crate::parse::parse_module;

    fn first_call(program: &Program) -> CallExpr {
        struct Find(Option<CallExpr>);
        impl swc_core::ecma::visit::Visit for Find {
            fn visit_call_expr(&mut self, n: &CallExpr) {
                if self.0.is_none() {
                    self.0 = Some(n.clone());
                }
            }
        }
        let mut find = Find(None);
        swc_core::ecma::visit::VisitWith::visit_with(program, &mut find);
        find.0.unwrap()
    }

    fn str_value(expr: &Expr) -> String {
        match expr {
            Expr::Lit(Lit::Str(s)) => s.value.to_string(),
            other => panic!("not a string literal: {other:?}"),
        }
    }

    fn rewrite(code: &str, overrides: &OverrideTable) -> (CallExpr, usize) {
        let resolved: HashMap<_, _> =
            [("https://a.cdn/x.js".to_string(), "/_scripts/x.js".to_string())].into();
        let mut program = parse_module(code, "file.js").unwrap().chunks.remove(0).program;
        let mut rewriter = ScriptAssetRewriter::new(overrides, &resolved);
        program.visit_mut_with(&mut rewriter);
        (first_call(&program), rewriter.rewritten())
    }

    #[test]
    fn rewrites_string_argument_and_drops_directive() {
        let (call, count) = rewrite(
            "useScript('https://a.cdn/x.js', { assetStrategy: 'bundle', defer: true })",
            &OverrideTable::new(),
        );
        assert_eq!(count, 1);
        assert_eq!(str_value(&call.args[0].expr), "/_scripts/x.js");
        let Expr::Object(opts) = &*call.args[1].expr else { panic!("options not an object") };
        assert_eq!(opts.props.len(), 1);
    }

    #[test]
    fn rewrites_src_field_from_key_override() {
        let mut overrides = OverrideTable::new();
        overrides.insert("cdnScript", ScriptOverride::bundle());
        let (call, count) = rewrite(
            "useScript({ key: 'cdnScript', src: 'https://a.cdn/x.js', defer: true })",
            &overrides,
        );
        assert_eq!(count, 1);
        let Expr::Object(obj) = &*call.args[0].expr else { panic!("not an object") };
        assert_eq!(obj.props.len(), 3);
        let src = obj.props.iter().find_map(|p| match p {
            PropOrSpread::Prop(p) => match &**p {
                Prop::KeyValue(kv) if prop_is(&kv.key, SRC_PROPERTY) => Some(str_value(&kv.value)),
                _ => None,
            },
            _ => None,
        });
        assert_eq!(src.as_deref(), Some("/_scripts/x.js"));
    }

    #[test]
    fn leaves_unresolved_and_unrequested_calls() {
        let (call, count) = rewrite("useScript('https://a.cdn/x.js')", &OverrideTable::new());
        assert_eq!(count, 0);
        assert_eq!(str_value(&call.args[0].expr), "https://a.cdn/x.js");

        let (call, count) = rewrite(
            "useScript('https://other.cdn/y.js', { assetStrategy: 'bundle' })",
            &OverrideTable::new(),
        );
        assert_eq!(count, 0);
        let Expr::Object(opts) = &*call.args[1].expr else { panic!("options not an object") };
        assert_eq!(opts.props.len(), 1);
    }

    #[test]
    fn rewrites_relative_locators_with_a_resolved_path() {
        let resolved: HashMap<_, _> =
            [("./vendor/x.js".to_string(), "/_scripts/x.js".to_string())].into();
        let overrides = OverrideTable::new();
        let mut program = parse_module("useScript('./vendor/x.js', { assetStrategy: 'bundle' })", "file.js")
            .unwrap()
            .chunks
            .remove(0)
            .program;
        let mut rewriter = ScriptAssetRewriter::new(&overrides, &resolved);
        program.visit_mut_with(&mut rewriter);
        assert_eq!(rewriter.rewritten(), 1);
        let call = first_call(&program);
        assert_eq!(str_value(&call.args[0].expr), "/_scripts/x.js");
        let Expr::Object(opts) = &*call.args[1].expr else { panic!("options not an object") };
        assert!(opts.props.is_empty());
    }
}
