use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use log::debug;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::config::DEFAULT_ASSET_PREFIX;
use crate::error::ResolveError;

/// Maps a remote script locator to the local path it is served from.
pub trait ScriptResolver: Send + Sync {
    fn resolve(&self, src: &str) -> Result<String, ResolveError>;
}

impl<F> ScriptResolver for F
where
    F: Fn(&str) -> Result<String, ResolveError> + Send + Sync,
{
    fn resolve(&self, src: &str) -> Result<String, ResolveError> {
        self(src)
    }
}

/// Resolver that may have to wait, e.g. on a download owned by the host.
pub trait AsyncScriptResolver: Send + Sync {
    fn resolve<'a>(&'a self, src: &'a str) -> BoxFuture<'a, Result<String, ResolveError>>;
}

impl<R: ScriptResolver> AsyncScriptResolver for R {
    fn resolve<'a>(&'a self, src: &'a str) -> BoxFuture<'a, Result<String, ResolveError>> {
        Box::pin(future::ready(ScriptResolver::resolve(self, src)))
    }
}

// -----------------------------------------------------------------------------
// Public asset naming
// -----------------------------------------------------------------------------

/// Names a script by the last segment of its URL path under `prefix`:
/// `https://static.cloudflareinsights.com/beacon.min.js` becomes
/// `/_scripts/beacon.min.js`. Copying the file is left to the host.
#[derive(Debug, Clone)]
pub struct PublicAssetResolver {
    prefix: String,
}

impl Default for PublicAssetResolver {
    fn default() -> Self {
        Self::new(DEFAULT_ASSET_PREFIX)
    }
}

impl PublicAssetResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl ScriptResolver for PublicAssetResolver {
    fn resolve(&self, src: &str) -> Result<String, ResolveError> {
        let path = src.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();
        let path = path.split_once("//").map_or(path, |(_, rest)| rest);
        // drop the host, keep the path
        let path = path.split_once('/').map_or("", |(_, rest)| rest);
        let name = path.rsplit('/').next().unwrap_or_default();
        if name.is_empty() {
            return Err(ResolveError::new(format!("no file name in script url `{src}`")));
        }
        Ok(format!("{}{}", self.prefix, name))
    }
}

// -----------------------------------------------------------------------------
// Shared memoization
// -----------------------------------------------------------------------------

/// Wraps a resolver so each distinct locator is resolved successfully at most
/// once, however many files and threads ask for it. Failures are not cached.
pub struct MemoizedResolver<R> {
    inner: R,
    cache: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
}

impl<R: ScriptResolver> MemoizedResolver<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, cache: Mutex::new(HashMap::new()) }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Every locator resolved so far, with its local path.
    pub fn resolved(&self) -> Vec<(String, String)> {
        let cache = self.cache.lock();
        let mut out: Vec<_> = cache
            .iter()
            .filter_map(|(src, cell)| cell.get().map(|path| (src.clone(), path.clone())))
            .collect();
        out.sort();
        out
    }

    fn cell(&self, src: &str) -> Arc<OnceCell<String>> {
        self.cache.lock().entry(src.to_string()).or_default().clone()
    }
}

impl<R: ScriptResolver> ScriptResolver for MemoizedResolver<R> {
    fn resolve(&self, src: &str) -> Result<String, ResolveError> {
        // the map lock is released before resolving; the cell serialises
        // concurrent callers for the same locator only
        let cell = self.cell(src);
        cell.get_or_try_init(|| {
            debug!("[script-bundle] resolving {src}");
            ScriptResolver::resolve(&self.inner, src)
        })
        .cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn names_assets_by_file_name() {
        let resolver = PublicAssetResolver::default();
        let cases = [
            ("https://static.cloudflareinsights.com/beacon.min.js", "/_scripts/beacon.min.js"),
            ("https://cdn.example.com/lib/v2/sdk.js?v=3#x", "/_scripts/sdk.js"),
            ("//cdn.example.com/a.js", "/_scripts/a.js"),
        ];
        for (src, expected) in cases {
            assert_eq!(ScriptResolver::resolve(&resolver, src).unwrap(), expected);
        }
    }

    #[test]
    fn missing_file_name_is_an_error() {
        let resolver = PublicAssetResolver::new("/static");
        assert_eq!(resolver.prefix(), "/static/");
        assert!(ScriptResolver::resolve(&resolver, "https://cdn.example.com/").is_err());
        assert!(ScriptResolver::resolve(&resolver, "https://cdn.example.com").is_err());
    }

    #[test]
    fn closures_are_resolvers() {
        let resolver = |src: &str| -> Result<String, ResolveError> { Ok(src.to_uppercase()) };
        assert_eq!(ScriptResolver::resolve(&resolver, "a").unwrap(), "A");
        let resolved = futures::executor::block_on(AsyncScriptResolver::resolve(&resolver, "b"));
        assert_eq!(resolved.unwrap(), "B");
    }

    #[test]
    fn memoizes_successes_only() {
        let calls = AtomicUsize::new(0);
        let memo = MemoizedResolver::new(|src: &str| -> Result<String, ResolveError> {
            calls.fetch_add(1, Ordering::SeqCst);
            if src.contains("bad") {
                Err("unreachable host".into())
            } else {
                Ok(format!("/_scripts/{}", src.len()))
            }
        });

        assert_eq!(ScriptResolver::resolve(&memo, "https://a/x.js").unwrap(), "/_scripts/14");
        assert_eq!(ScriptResolver::resolve(&memo, "https://a/x.js").unwrap(), "/_scripts/14");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(ScriptResolver::resolve(&memo, "https://bad/x.js").is_err());
        assert!(ScriptResolver::resolve(&memo, "https://bad/x.js").is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        assert_eq!(memo.resolved(), vec![("https://a/x.js".to_string(), "/_scripts/14".to_string())]);
    }

    #[test]
    fn concurrent_callers_resolve_once() {
        let calls = AtomicUsize::new(0);
        let memo = MemoizedResolver::new(|_: &str| -> Result<String, ResolveError> {
            calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(5));
            Ok("/_scripts/x.js".to_string())
        });

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    assert_eq!(ScriptResolver::resolve(&memo, "https://a/x.js").unwrap(), "/_scripts/x.js");
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
