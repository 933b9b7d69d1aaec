// Purpose: Central registry of directories and typed packages; the entry point
//   for all import resolution.
// Inputs/Outputs: Maps import paths to typed packages via vendor chains and the
//   context's source roots; hands out position tables for cached packages.
// Invariants: One mutex serializes every operation. A typed package is computed
//   at most once per parsed package; recursive imports of a package being typed
//   see a forward reference, never a second check.
// Gotchas: Type-checker diagnostics are discarded here; the query layer surfaces
//   them separately. Context change resets every map wholesale.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use once_cell::sync::Lazy;
use strsim::jaro_winkler;
use thiserror::Error;
use tracing::debug;

use crate::frontend::fileset::FileSet;
use crate::pkg::context::PackedContext;
use crate::pkg::dir::{Dir, ParsedPackage};
use crate::sema::universe::unsafe_package;
use crate::sema::{self, Importer, TypedPackage};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no package for import path {0:?}")]
    NotFound(String),
}

/// Cache over source directories, designed for repeated reuse. Modified files
/// are detected by the background sweeper to force package reloading.
pub struct PkgCache {
    state: Mutex<CacheState>,
}

pub struct CacheState {
    pub(crate) ctx: PackedContext,
    pub(crate) dirs: HashMap<PathBuf, Dir>,
    vendor_paths: HashMap<PathBuf, Vec<PathBuf>>,
    gopath: Vec<PathBuf>,
    pub(crate) failed: HashSet<String>,
    pub(crate) last_use: Instant,
}

impl PkgCache {
    pub fn new(ctx: PackedContext) -> Self {
        let gopath = ctx.source_dirs();
        Self {
            state: Mutex::new(CacheState {
                ctx,
                dirs: HashMap::new(),
                vendor_paths: HashMap::new(),
                gopath,
                failed: HashSet::new(),
                last_use: Instant::now(),
            }),
        }
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install a request's context. Any field difference drops all cached
    /// state; an identical context is a no-op.
    pub fn set_context(&self, ctx: &PackedContext) {
        let mut state = self.lock_state();
        if state.ctx == *ctx {
            return;
        }
        debug!(goos = %ctx.goos, goarch = %ctx.goarch, "context changed; resetting cache");
        state.ctx = ctx.clone();
        state.gopath = ctx.source_dirs();
        state.dirs.clear();
        state.vendor_paths.clear();
        state.failed.clear();
    }

    /// Resolve from any source directory; used for dependency roots.
    pub fn import(&self, path: &str) -> Result<Arc<TypedPackage>, ImportError> {
        self.import_from(path, Path::new(""))
    }

    /// Resolve honoring vendor shadowing from `src_dir`.
    pub fn import_from(
        &self,
        path: &str,
        src_dir: &Path,
    ) -> Result<Arc<TypedPackage>, ImportError> {
        let mut state = self.lock_state();
        state.last_use = Instant::now();
        import_state(&mut state, path, src_dir)
            .ok_or_else(|| ImportError::NotFound(path.to_string()))
    }

    /// Position table of an already-cached package, without triggering any
    /// parsing; for symbol-location reporting.
    pub fn file_set(&self, path: &str, src_dir: &Path) -> Option<Arc<FileSet>> {
        let mut state = self.lock_state();
        find_package(&mut state, path, src_dir).map(|pkg| pkg.fset.clone())
    }

    /// Whether the cache saw any use within `secs`; gates the sweeper.
    pub(crate) fn used_within_secs(&self, secs: u64) -> bool {
        self.lock_state().last_use.elapsed().as_secs() < secs
    }
}

/// Re-entrant import: callable while the state lock is held, which is how the
/// type checker's importer hook recurses back into the cache.
pub(crate) fn import_state(
    state: &mut CacheState,
    path: &str,
    src_dir: &Path,
) -> Option<Arc<TypedPackage>> {
    if path == "unsafe" {
        return Some(unsafe_package());
    }
    let pkg = get_package(state, path, src_dir)?;
    ensure_types(state, &pkg)
}

fn ensure_types(state: &mut CacheState, pkg: &Arc<ParsedPackage>) -> Option<Arc<TypedPackage>> {
    if !pkg.begin_types() {
        // Already computed, or in flight further up the stack (an import
        // cycle); the checker treats the latter as a forward reference.
        return pkg.typed();
    }
    // Import all dep packages first or types would be missing.
    for imp_path in &pkg.imports {
        let _ = import_state(state, imp_path, &pkg.dir);
    }
    let files: Vec<_> = pkg.files.iter().map(|(id, _, f)| (*id, f)).collect();
    let mut importer = StateImporter {
        state,
        src_dir: pkg.dir.clone(),
    };
    let result = sema::check_package(&pkg.path, &files, &mut importer, false);
    // Type errors are discarded at this layer; ReportErrors surfaces them
    // for the user's own buffer.
    let typed = Arc::new(result.pkg);
    pkg.publish_types(typed.clone());
    Some(typed)
}

struct StateImporter<'a> {
    state: &'a mut CacheState,
    src_dir: PathBuf,
}

impl<'a> Importer for StateImporter<'a> {
    fn import(&mut self, path: &str) -> Option<Arc<TypedPackage>> {
        import_state(self.state, path, &self.src_dir)
    }
}

/// Candidate directories for `path` from `src_dir`: vendor chain entries
/// first, then each root's `src/`. Order is shadowing order.
fn lookup_paths(state: &mut CacheState, path: &str, src_dir: &Path) -> (String, Vec<PathBuf>) {
    let name = path.rsplit('/').next().unwrap_or(path).to_string();
    let mut paths = Vec::new();
    for vendor in vendor_chain(state, src_dir) {
        paths.push(vendor.join(path));
    }
    for root in &state.gopath {
        paths.push(root.join(path));
    }
    (name, paths)
}

/// Vendor directories visible from `src_dir`, nearest first. Cached per
/// directory; a vendor directory created later is picked up only after a
/// context reset.
fn vendor_chain(state: &mut CacheState, src_dir: &Path) -> Vec<PathBuf> {
    if src_dir.as_os_str().is_empty() {
        return Vec::new();
    }
    if let Some(chain) = state.vendor_paths.get(src_dir) {
        return chain.clone();
    }
    let base = match src_dir.parent() {
        Some(parent) => vendor_chain(state, parent),
        None => Vec::new(),
    };
    let vendor = src_dir.join("vendor");
    let chain = if vendor.is_dir() {
        let mut chain = vec![vendor];
        chain.extend(base);
        chain
    } else {
        base
    };
    state
        .vendor_paths
        .insert(src_dir.to_path_buf(), chain.clone());
    chain
}

pub(crate) fn find_package(
    state: &mut CacheState,
    path: &str,
    src_dir: &Path,
) -> Option<Arc<ParsedPackage>> {
    let (name, candidates) = lookup_paths(state, path, src_dir);
    for candidate in candidates {
        if let Some(dir) = state.dirs.get(&candidate) {
            if let Some(pkg) = dir.find_package(&name) {
                return Some(pkg);
            }
        }
    }
    None
}

pub(crate) fn get_package(
    state: &mut CacheState,
    path: &str,
    src_dir: &Path,
) -> Option<Arc<ParsedPackage>> {
    let (name, candidates) = lookup_paths(state, path, src_dir);
    let ctx = state.ctx.clone();
    for candidate in candidates.iter() {
        let dir = state.dirs.entry(candidate.clone()).or_insert_with(|| {
            let mut dir = Dir::new(candidate.clone());
            dir.update_peek();
            dir
        });
        if let Some(pkg) = dir.get_package(&name, path, &ctx) {
            return Some(pkg);
        }
    }
    if state.failed.insert(path.to_string()) {
        match nearest_sibling(&candidates, &name) {
            Some(hint) => debug!(path, hint = %hint, "import failed; did you mean?"),
            None => debug!(path, "import failed"),
        }
    }
    None
}

/// Remove a parsed package from its directory; the directory itself is
/// unlinked once no packages remain live in it.
pub(crate) fn unlink_package(state: &mut CacheState, pkg: &Arc<ParsedPackage>) {
    let mut drop_dir = false;
    if let Some(dir) = state.dirs.get_mut(&pkg.dir) {
        let is_same = dir
            .packages
            .get(&pkg.name)
            .map(|cur| Arc::ptr_eq(cur, pkg))
            .unwrap_or(false);
        if is_same {
            dir.packages.remove(&pkg.name);
        }
        drop_dir = dir.packages.is_empty();
    }
    if drop_dir {
        state.dirs.remove(&pkg.dir);
    }
}

// A close sibling directory name, for the failed-import log line.
fn nearest_sibling(candidates: &[PathBuf], name: &str) -> Option<String> {
    let parent = candidates.first()?.parent()?;
    let mut best: Option<(String, f64)> = None;
    for entry in std::fs::read_dir(parent).ok()?.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let candidate = entry.file_name().to_string_lossy().into_owned();
        let score = jaro_winkler(name, &candidate);
        if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
            best = Some((candidate, score));
        }
    }
    match best {
        Some((candidate, score)) if score >= 0.84 && candidate != name => Some(candidate),
        _ => None,
    }
}

/// Importer adapter for the query layer: each import takes the cache mutex
/// for the duration of that one resolution.
pub struct CacheImporter<'a> {
    pub cache: &'a PkgCache,
    pub src_dir: PathBuf,
}

impl<'a> Importer for CacheImporter<'a> {
    fn import(&mut self, path: &str) -> Option<Arc<TypedPackage>> {
        self.cache.import_from(path, &self.src_dir).ok()
    }
}

/// Resolved imports of a parsed package: those import paths that currently
/// map to a cached package.
pub(crate) fn resolved_imports(
    state: &mut CacheState,
    pkg: &Arc<ParsedPackage>,
) -> Vec<Arc<ParsedPackage>> {
    let mut out = Vec::new();
    let dir = pkg.dir.clone();
    for imp in &pkg.imports {
        if let Some(found) = find_package(state, imp, &dir) {
            out.push(found);
        }
    }
    out
}

static SHARED: Lazy<Arc<PkgCache>> = Lazy::new(|| {
    let cache = Arc::new(PkgCache::new(PackedContext::from_env()));
    crate::pkg::sweep::start(cache.clone()).detach();
    cache
});

/// The process-wide cache, created on first use with the environment's
/// context and a running sweeper.
pub fn shared_cache() -> Arc<PkgCache> {
    SHARED.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time drift")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "gosense-cache-{}-{}-{}",
            prefix,
            std::process::id(),
            nonce
        ));
        fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    fn ctx_for_root(root: &Path) -> PackedContext {
        PackedContext {
            goos: "linux".to_string(),
            goarch: "amd64".to_string(),
            compiler: "gc".to_string(),
            goroot: root.to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    fn write_pkg(root: &Path, rel: &str, file: &str, src: &str) {
        let dir = root.join("src").join(rel);
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join(file), src).expect("write");
    }

    #[test]
    fn imports_single_package_with_exported_func() {
        let root = temp_dir("s1");
        write_pkg(&root, "a", "a.go", "package a\n\nfunc F() int { return 1 }\n");
        let cache = PkgCache::new(ctx_for_root(&root));

        let pkg = cache.import("a").expect("import a");
        assert_eq!(pkg.name, "a");
        let f = pkg.scope.get("F").expect("F");
        assert_eq!(f.ty.type_string("main"), "func() int");

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn transitive_import_shares_the_typed_instance() {
        let root = temp_dir("s2");
        write_pkg(&root, "a", "a.go", "package a\n\nfunc F() int { return 1 }\n");
        write_pkg(
            &root,
            "b",
            "b.go",
            "package b\n\nimport \"a\"\n\nfunc G() int { return a.F() }\n",
        );
        let cache = PkgCache::new(ctx_for_root(&root));

        let b = cache.import("b").expect("import b");
        assert!(b.scope.contains_key("G"));
        let a_direct = cache.import("a").expect("import a");
        // The checker resolved a's F for b through the same cache entry.
        let a_again = cache.import("a").expect("import a again");
        assert!(Arc::ptr_eq(&a_direct, &a_again));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn repeated_import_returns_same_instance() {
        let root = temp_dir("same");
        write_pkg(&root, "a", "a.go", "package a\n\nfunc F() int { return 1 }\n");
        let cache = PkgCache::new(ctx_for_root(&root));
        let first = cache.import("a").expect("first");
        let second = cache.import("a").expect("second");
        assert!(Arc::ptr_eq(&first, &second));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn vendor_shadowing_wins_from_source_dir() {
        let root = temp_dir("s3");
        write_pkg(&root, "a", "a.go", "package a\n\nfunc F() int { return 1 }\n");
        write_pkg(
            &root,
            "b",
            "b.go",
            "package b\n\nimport \"a\"\n\nfunc G() string { return a.F() }\n",
        );
        write_pkg(
            &root,
            "b/vendor/a",
            "a.go",
            "package a\n\nfunc F() string { return \"\" }\n",
        );
        let cache = PkgCache::new(ctx_for_root(&root));

        let b_src = root.join("src").join("b");
        let vendored = cache.import_from("a", &b_src).expect("vendored a");
        assert_eq!(vendored.scope["F"].ty.type_string("x"), "func() string");

        let plain = cache.import("a").expect("root a");
        assert_eq!(plain.scope["F"].ty.type_string("x"), "func() int");
        assert!(!Arc::ptr_eq(&vendored, &plain));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn build_tags_select_files_per_context() {
        let root = temp_dir("s4");
        write_pkg(&root, "c", "c_linux.go", "package c\n\nfunc L() {}\n");
        write_pkg(&root, "c", "c_darwin.go", "package c\n\nfunc D() {}\n");
        let cache = PkgCache::new(ctx_for_root(&root));

        let linux = cache.import("c").expect("linux c");
        assert!(linux.scope.contains_key("L"));
        assert!(!linux.scope.contains_key("D"));

        let mut darwin_ctx = ctx_for_root(&root);
        darwin_ctx.goos = "darwin".to_string();
        cache.set_context(&darwin_ctx);
        let darwin = cache.import("c").expect("darwin c");
        assert!(darwin.scope.contains_key("D"));
        assert!(!darwin.scope.contains_key("L"));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn context_reset_is_noop_for_identical_context() {
        let root = temp_dir("ctx");
        write_pkg(&root, "a", "a.go", "package a\n\nfunc F() int { return 1 }\n");
        let ctx = ctx_for_root(&root);
        let cache = PkgCache::new(ctx.clone());
        let first = cache.import("a").expect("first");
        cache.set_context(&ctx);
        let second = cache.import("a").expect("second");
        assert!(Arc::ptr_eq(&first, &second));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn unsafe_is_builtin_and_never_read_from_disk() {
        let root = temp_dir("unsafe");
        let cache = PkgCache::new(ctx_for_root(&root));
        let u = cache.import("unsafe").expect("unsafe");
        assert!(u.scope.contains_key("Pointer"));
        assert!(cache.lock_state().dirs.is_empty());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn missing_import_lands_in_failed_set() {
        let root = temp_dir("missing");
        let cache = PkgCache::new(ctx_for_root(&root));
        assert!(cache.import("nosuch").is_err());
        assert!(cache.lock_state().failed.contains("nosuch"));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn file_set_does_not_trigger_parsing() {
        let root = temp_dir("fset");
        write_pkg(&root, "a", "a.go", "package a\n\nfunc F() int { return 1 }\n");
        let cache = PkgCache::new(ctx_for_root(&root));
        assert!(cache.file_set("a", Path::new("")).is_none());
        cache.import("a").expect("import");
        let fset = cache.file_set("a", Path::new("")).expect("fset");
        assert_eq!(fset.len(), 1);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn vendor_chain_is_prefix_closed() {
        let root = temp_dir("chain");
        let abc = root.join("a").join("b").join("c");
        fs::create_dir_all(abc.join("vendor")).expect("mkdir");
        fs::create_dir_all(root.join("a").join("vendor")).expect("mkdir");
        let cache = PkgCache::new(ctx_for_root(&root));
        let mut state = cache.lock_state();
        let deep = vendor_chain(&mut state, &abc);
        let shallow = vendor_chain(&mut state, &root.join("a").join("b"));
        assert!(deep.len() >= shallow.len());
        assert_eq!(&deep[deep.len() - shallow.len()..], &shallow[..]);
        let _ = fs::remove_dir_all(root);
    }
}
