use regex::Regex;
use swc_core::ecma::parser::{EsSyntax, Syntax, TsSyntax};

use crate::error::ConfigError;

const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx", "ts", "mts", "cts", "tsx"];

/// Splits `path?query` into its parts; the query has no leading `?`.
fn split_query(id: &str) -> (&str, &str) {
    id.split_once('?').unwrap_or((id, ""))
}

fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit(|c: char| c == '/' || c == '\\').next()?;
    name.rsplit_once('.').map(|(_, ext)| ext)
}

/// Decides which module ids the transform runs on.
#[derive(Debug, Clone)]
pub struct FileFilter {
    exclude: Vec<Regex>,
}

impl FileFilter {
    pub fn new<I, S>(exclude: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let exclude = exclude
            .into_iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|source| ConfigError::Pattern {
                    pattern: p.as_ref().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { exclude })
    }

    pub fn should_transform(&self, id: &str) -> bool {
        if self.exclude.iter().any(|re| re.is_match(id)) {
            return false;
        }
        let (path, query) = split_query(id);
        match extension(path) {
            Some("vue") => query.split('&').any(|p| p == "type=script"),
            Some(ext) => SCRIPT_EXTENSIONS.contains(&ext),
            None => false,
        }
    }
}

/// Parser dialect for a module id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseSyntax {
    Ecmascript,
    Jsx,
    Typescript,
    Tsx,
}

impl ParseSyntax {
    pub fn for_file(id: &str) -> Self {
        let (path, query) = split_query(id);
        // vue script blocks carry their language in the query: `?vue&type=script&lang.ts`
        let lang = query
            .split('&')
            .find_map(|p| p.strip_prefix("lang.").or_else(|| p.strip_prefix("lang=")));
        match lang.or_else(|| extension(path)) {
            Some("ts" | "mts" | "cts") => ParseSyntax::Typescript,
            Some("tsx") => ParseSyntax::Tsx,
            Some("jsx") => ParseSyntax::Jsx,
            _ => ParseSyntax::Ecmascript,
        }
    }

    pub(crate) fn to_swc(self) -> Syntax {
        match self {
            ParseSyntax::Ecmascript => Syntax::Es(EsSyntax {
                decorators: true,
                ..Default::default()
            }),
            ParseSyntax::Jsx => Syntax::Es(EsSyntax {
                jsx: true,
                decorators: true,
                ..Default::default()
            }),
            ParseSyntax::Typescript => Syntax::Typescript(TsSyntax {
                decorators: true,
                ..Default::default()
            }),
            ParseSyntax::Tsx => Syntax::Typescript(TsSyntax {
                tsx: true,
                decorators: true,
                ..Default::default()
            }),
        }
    }
}
