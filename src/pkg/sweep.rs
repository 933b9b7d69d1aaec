// Purpose: Background invalidation: drop stale packages and retry failed imports.
// Inputs/Outputs: Mutates the cache on a fixed cadence while the cache is in use.
// Invariants: The mutex is released roughly every millisecond of work; any
//   observer at a yield point sees a consistent cache with no torn packages.
// Gotchas: There is no back-link from a package to its dependents; dependents
//   are found by scanning all packages per round until the frontier is empty.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::pkg::cache::{self, CacheState, PkgCache};
use crate::pkg::dir::ParsedPackage;

const SWEEP_PERIOD: Duration = Duration::from_secs(5);
const IDLE_AFTER_SECS: u64 = 600;
const YIELD_EVERY: Duration = Duration::from_millis(1);

/// Controls the background sweeper; dropping it stops the task at the next
/// iteration boundary.
pub struct SweeperHandle {
    done: Option<mpsc::Sender<()>>,
}

impl SweeperHandle {
    /// Let the sweeper run for the life of the process.
    pub fn detach(mut self) {
        if let Some(done) = self.done.take() {
            std::mem::forget(done);
        }
    }
}

/// Start the sweeper task: every five seconds, sweep if the cache was used
/// within the last ten minutes.
pub fn start(cache: Arc<PkgCache>) -> SweeperHandle {
    let (tx, rx) = mpsc::channel::<()>();
    thread::Builder::new()
        .name("gosense-sweeper".to_string())
        .spawn(move || loop {
            match rx.recv_timeout(SWEEP_PERIOD) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {}
            }
            if cache.used_within_secs(IDLE_AFTER_SECS) {
                sweep_once(&cache);
            }
        })
        .map(|_| ())
        .unwrap_or_else(|err| debug!(%err, "sweeper thread failed to start"));
    SweeperHandle { done: Some(tx) }
}

fn checkpoint<'a>(
    cache: &'a PkgCache,
    guard: MutexGuard<'a, CacheState>,
    last: &mut Instant,
) -> MutexGuard<'a, CacheState> {
    if last.elapsed() > YIELD_EVERY {
        drop(guard);
        thread::yield_now();
        *last = Instant::now();
        cache.lock_state()
    } else {
        guard
    }
}

/// One sweep pass: probe previously-failed imports, detect modified files,
/// and drop modified packages plus their transitive dependents.
pub fn sweep_once(cache: &PkgCache) {
    let t0 = Instant::now();
    let mut last_yield = Instant::now();
    let mut guard = cache.lock_state();

    let paths: Vec<PathBuf> = guard.dirs.keys().cloned().collect();

    // Union of every parsed package's imports; unsafe is never on disk.
    let mut all_imports: BTreeSet<String> = BTreeSet::new();
    for path in &paths {
        guard = checkpoint(cache, guard, &mut last_yield);
        if let Some(dir) = guard.dirs.get(path) {
            for pkg in dir.packages.values() {
                for imp in &pkg.imports {
                    all_imports.insert(imp.clone());
                }
            }
        }
    }
    all_imports.remove("unsafe");

    // Imports that failed before and resolve now need special attention.
    let mut newly_resolvable: BTreeSet<String> = BTreeSet::new();
    for imp in &all_imports {
        guard = checkpoint(cache, guard, &mut last_yield);
        if cache::find_package(&mut guard, imp, Path::new("")).is_none()
            && cache::get_package(&mut guard, imp, Path::new("")).is_some()
        {
            newly_resolvable.insert(imp.clone());
            guard.failed.remove(imp);
        }
    }

    let mut modified: Vec<Arc<ParsedPackage>> = Vec::new();
    if !newly_resolvable.is_empty() {
        for path in &paths {
            guard = checkpoint(cache, guard, &mut last_yield);
            if let Some(dir) = guard.dirs.get(path) {
                for pkg in dir.packages.values() {
                    if pkg.imports.iter().any(|i| newly_resolvable.contains(i))
                        && !modified.iter().any(|m| Arc::ptr_eq(m, pkg))
                    {
                        modified.push(pkg.clone());
                    }
                }
            }
        }
    }

    // Detect packages whose files moved since they were parsed.
    for path in &paths {
        guard = checkpoint(cache, guard, &mut last_yield);
        if let Some(dir) = guard.dirs.get_mut(path) {
            dir.update_peek();
            dir.modified_packages(&mut modified);
        }
    }

    // Unlink the modified set, then repeat with whoever imported it, until
    // the frontier runs dry.
    let mut dropped = 0usize;
    while !modified.is_empty() {
        let mut dependent: Vec<Arc<ParsedPackage>> = Vec::new();
        for path in &paths {
            guard = checkpoint(cache, guard, &mut last_yield);
            let pkgs: Vec<Arc<ParsedPackage>> = match guard.dirs.get(path) {
                Some(dir) => dir.packages.values().cloned().collect(),
                None => continue,
            };
            for pkg in pkgs {
                if modified.iter().any(|m| Arc::ptr_eq(m, &pkg)) {
                    continue;
                }
                let resolved = cache::resolved_imports(&mut guard, &pkg);
                if resolved
                    .iter()
                    .any(|r| modified.iter().any(|m| Arc::ptr_eq(m, r)))
                    && !dependent.iter().any(|d| Arc::ptr_eq(d, &pkg))
                {
                    dependent.push(pkg);
                }
            }
        }
        for pkg in &modified {
            cache::unlink_package(&mut guard, pkg);
            dropped += 1;
        }
        modified = dependent;
    }
    drop(guard);
    if dropped > 0 {
        debug!(dropped, elapsed_ms = t0.elapsed().as_millis() as u64, "sweep dropped stale packages");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::context::PackedContext;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time drift")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "gosense-sweep-{}-{}-{}",
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
    fn rewritten_file_invalidates_package_and_dependents() {
        let root = temp_dir("stale");
        write_pkg(&root, "a", "a.go", "package a\n\nfunc F() int { return 1 }\n");
        write_pkg(
            &root,
            "b",
            "b.go",
            "package b\n\nimport \"a\"\n\nfunc G() int { return a.F() }\n",
        );
        let cache = PkgCache::new(ctx_for_root(&root));
        let a1 = cache.import("a").expect("a");
        let b1 = cache.import("b").expect("b");
        assert_eq!(a1.scope["F"].ty.type_string("x"), "func() int");

        // Give the filesystem clock room to move past the parse timestamp.
        thread::sleep(Duration::from_millis(50));
        write_pkg(&root, "a", "a.go", "package a\n\nfunc F() string { return \"\" }\n");

        sweep_once(&cache);

        let a2 = cache.import("a").expect("a after sweep");
        assert!(!Arc::ptr_eq(&a1, &a2));
        assert_eq!(a2.scope["F"].ty.type_string("x"), "func() string");

        // The dependent was re-checked on next use, too.
        let b2 = cache.import("b").expect("b after sweep");
        assert!(!Arc::ptr_eq(&b1, &b2));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn newly_resolvable_import_marks_importer_stale() {
        let root = temp_dir("resolvable");
        write_pkg(
            &root,
            "b",
            "b.go",
            "package b\n\nimport \"a\"\n\nfunc G() int { return a.F() }\n",
        );
        let cache = PkgCache::new(ctx_for_root(&root));
        let b1 = cache.import("b").expect("b without a");
        assert!(cache.lock_state().failed.contains("a"));

        write_pkg(&root, "a", "a.go", "package a\n\nfunc F() int { return 1 }\n");
        // First pass refreshes the peek of the (previously empty) candidate
        // directory; the second pass's resolvability probe then sees it.
        sweep_once(&cache);
        sweep_once(&cache);

        assert!(!cache.lock_state().failed.contains("a"));
        let b2 = cache.import("b").expect("b with a");
        assert!(!Arc::ptr_eq(&b1, &b2));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn sweep_with_no_changes_keeps_instances() {
        let root = temp_dir("idle");
        write_pkg(&root, "a", "a.go", "package a\n\nfunc F() int { return 1 }\n");
        let cache = PkgCache::new(ctx_for_root(&root));
        let a1 = cache.import("a").expect("a");
        sweep_once(&cache);
        let a2 = cache.import("a").expect("a again");
        assert!(Arc::ptr_eq(&a1, &a2));
        let _ = fs::remove_dir_all(root);
    }
}
