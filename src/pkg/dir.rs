// Purpose: Watch one directory: file peeks, modification probes, package parsing.
// Inputs/Outputs: Scans source files on disk; publishes ParsedPackages keyed by
//   package name.
// Invariants: At most one ParsedPackage per package name; re-parse replaces the
//   entry atomically under the cache lock. A package with zero parsed files is
//   never published.
// Gotchas: Peeks older than one second are refreshed lazily by the parse entry
//   point, bounding directory syscall rate per query.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::frontend::ast;
use crate::frontend::fileset::{FileId, FileSet};
use crate::frontend::parser::{parse_source, ParseMode};
use crate::pkg::context::{PackedContext, SOURCE_EXT, TEST_SUFFIX};
use crate::sema::TypedPackage;

// Only the head of a file is scanned for the package clause.
const PEEK_SIZE: usize = 200 * 1024;

/// What the watcher last saw for one file.
#[derive(Clone, Debug)]
pub struct FilePeek {
    pub mod_time: SystemTime,
    pub pkg_name: String,
}

/// The syntactic view of a package: all active files parsed into one shared
/// position table. Exclusively mutated by the cache-mutex holder; the typed
/// slot is the only interior-mutable part so concurrent readers observe
/// either "not computed" or the final value.
#[derive(Debug)]
pub struct ParsedPackage {
    pub name: String,
    /// Import path used when the package was first imported.
    pub path: String,
    pub dir: PathBuf,
    pub fset: Arc<FileSet>,
    pub files: Vec<(FileId, PathBuf, ast::File)>,
    pub imports: Vec<String>,
    pub update_time: SystemTime,
    typed: Mutex<TypedSlot>,
}

#[derive(Debug, Default)]
struct TypedSlot {
    cached: bool,
    pkg: Option<Arc<TypedPackage>>,
}

impl ParsedPackage {
    /// The published typed package, if computation has finished.
    pub fn typed(&self) -> Option<Arc<TypedPackage>> {
        self.typed.lock().ok().and_then(|slot| slot.pkg.clone())
    }

    /// Claim the right to type-check. Returns false when a check already ran
    /// or is in flight, so recursive imports see a forward reference instead
    /// of re-entering the checker.
    pub(crate) fn begin_types(&self) -> bool {
        match self.typed.lock() {
            Ok(mut slot) => {
                if slot.cached {
                    false
                } else {
                    slot.cached = true;
                    true
                }
            }
            Err(_) => false,
        }
    }

    pub(crate) fn publish_types(&self, pkg: Arc<TypedPackage>) {
        if let Ok(mut slot) = self.typed.lock() {
            slot.pkg = Some(pkg);
        }
    }
}

/// One watched directory and the packages parsed out of it.
#[derive(Debug)]
pub struct Dir {
    pub path: PathBuf,
    pub packages: HashMap<String, Arc<ParsedPackage>>,
    pub file_peeks: HashMap<String, FilePeek>,
    peek_time: Option<Instant>,
}

impl Dir {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            packages: HashMap::new(),
            file_peeks: HashMap::new(),
            peek_time: None,
        }
    }

    /// Rescan the directory listing. Returns true when any source file's
    /// modification time moved since the last peek.
    pub fn update_peek(&mut self) -> bool {
        self.peek_time = Some(Instant::now());
        let entries = match fs::read_dir(&self.path) {
            Ok(e) => e,
            Err(_) => return false,
        };
        let mut changed = false;
        for entry in entries.flatten() {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !is_cache_file(&file_name) {
                continue;
            }
            let mod_time = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(_) => continue,
            };
            if let Some(peek) = self.file_peeks.get(&file_name) {
                if peek.mod_time == mod_time {
                    continue; // already up to date
                }
            }
            let pkg_name = scan_package_name(&self.path.join(&file_name)).unwrap_or_default();
            self.file_peeks
                .insert(file_name, FilePeek { mod_time, pkg_name });
            changed = true;
        }
        changed
    }

    /// Maximum modification time over current source files; a coarse "did
    /// anything here move" probe.
    pub fn mod_time(&self) -> Option<SystemTime> {
        let entries = fs::read_dir(&self.path).ok()?;
        let mut latest: Option<SystemTime> = None;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(SOURCE_EXT) {
                continue;
            }
            if let Ok(t) = entry.metadata().and_then(|m| m.modified()) {
                if latest.map(|l| l < t).unwrap_or(true) {
                    latest = Some(t);
                }
            }
        }
        latest
    }

    /// Collect packages whose parse timestamp predates a file's mtime.
    pub fn modified_packages(&self, out: &mut Vec<Arc<ParsedPackage>>) {
        for peek in self.file_peeks.values() {
            if let Some(pkg) = self.packages.get(&peek.pkg_name) {
                if pkg.update_time < peek.mod_time
                    && !out.iter().any(|p| Arc::ptr_eq(p, pkg))
                {
                    out.push(pkg.clone());
                }
            }
        }
    }

    pub fn get_package(
        &mut self,
        name: &str,
        pkg_path: &str,
        ctx: &PackedContext,
    ) -> Option<Arc<ParsedPackage>> {
        if let Some(pkg) = self.packages.get(name) {
            return Some(pkg.clone());
        }
        self.parse_package(name, pkg_path, ctx);
        self.packages.get(name).cloned()
    }

    pub fn find_package(&self, name: &str) -> Option<Arc<ParsedPackage>> {
        self.packages.get(name).cloned()
    }

    /// Parse all active files carrying `name` into a fresh shared position
    /// table and publish the result. Per-file parse errors are logged and the
    /// file is skipped.
    pub fn parse_package(&mut self, name: &str, pkg_path: &str, ctx: &PackedContext) {
        let stale = self
            .peek_time
            .map(|t| t.elapsed() > Duration::from_secs(1))
            .unwrap_or(true);
        if stale {
            self.update_peek();
        }
        let mut file_names: Vec<&String> = self
            .file_peeks
            .iter()
            .filter(|(_, peek)| peek.pkg_name == name)
            .map(|(fname, _)| fname)
            .collect();
        file_names.sort();
        if file_names.is_empty() {
            return;
        }
        let mut fset = FileSet::new();
        let mut files = Vec::new();
        let mut imports = BTreeSet::new();
        for fname in file_names {
            if !ctx.good_os_arch_file(fname) {
                continue;
            }
            let full = self.path.join(fname);
            let src = match fs::read_to_string(&full) {
                Ok(s) => s,
                Err(err) => {
                    warn!(file = %full.display(), %err, "read failed; skipping file");
                    continue;
                }
            };
            if !ctx.should_build(src.as_bytes()) {
                continue;
            }
            let (parsed, diags) = parse_source(&src, ParseMode::Full);
            let parsed = match parsed {
                Some(f) if diags.is_empty() => f,
                _ => {
                    warn!(
                        file = %full.display(),
                        errors = diags.len().max(1),
                        "parse failed; skipping file"
                    );
                    continue;
                }
            };
            let id = fset.add_file(&full);
            for imp in &parsed.imports {
                imports.insert(imp.path.clone());
            }
            files.push((id, full, parsed));
        }
        if files.is_empty() {
            return;
        }
        let pkg = Arc::new(ParsedPackage {
            name: name.to_string(),
            path: pkg_path.to_string(),
            dir: self.path.clone(),
            fset: Arc::new(fset),
            files,
            imports: imports.into_iter().collect(),
            update_time: SystemTime::now(),
            typed: Mutex::new(TypedSlot::default()),
        });
        self.packages.insert(name.to_string(), pkg);
    }
}

fn is_cache_file(name: &str) -> bool {
    !name.starts_with('.')
        && !name.starts_with('_')
        && name.ends_with(SOURCE_EXT)
        && !name.ends_with(TEST_SUFFIX)
}

static PACKAGE_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^package[ \t]+([A-Za-z_][A-Za-z0-9_]*)").unwrap());

/// Minimal scanner for the package declaration: skip the leading run of
/// comments and blank lines in the first ~200 kB, then match `package NAME`.
pub fn scan_package_name(path: &Path) -> Option<String> {
    let mut file = fs::File::open(path).ok()?;
    let mut buf = vec![0u8; PEEK_SIZE];
    let mut read = 0usize;
    loop {
        match file.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => {
                read += n;
                if read == buf.len() {
                    break;
                }
            }
            Err(_) => return None,
        }
    }
    let head = String::from_utf8_lossy(&buf[..read]);
    let mut in_block_comment = false;
    for line in head.lines() {
        let trimmed = line.trim();
        if in_block_comment {
            if let Some(idx) = trimmed.find("*/") {
                in_block_comment = false;
                let rest = trimmed[idx + 2..].trim();
                if rest.is_empty() {
                    continue;
                }
                if let Some(c) = PACKAGE_CLAUSE.captures(rest) {
                    return Some(c[1].to_string());
                }
                return None;
            }
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        if trimmed.starts_with("/*") {
            match trimmed.find("*/") {
                Some(idx) => {
                    let rest = trimmed[idx + 2..].trim();
                    if rest.is_empty() {
                        continue;
                    }
                    return PACKAGE_CLAUSE.captures(rest).map(|c| c[1].to_string());
                }
                None => {
                    in_block_comment = true;
                    continue;
                }
            }
        }
        return PACKAGE_CLAUSE.captures(trimmed).map(|c| c[1].to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time drift")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "gosense-dir-{}-{}-{}",
            prefix,
            std::process::id(),
            nonce
        ));
        fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    #[test]
    fn peek_records_package_names_and_detects_change() {
        let root = temp_dir("peek");
        fs::write(root.join("a.go"), "package alpha\n").expect("write");
        fs::write(root.join("a_test.go"), "package alpha\n").expect("write");
        fs::write(root.join(".hidden.go"), "package ghost\n").expect("write");

        let mut dir = Dir::new(root.clone());
        assert!(dir.update_peek());
        assert_eq!(dir.file_peeks.len(), 1);
        assert_eq!(dir.file_peeks["a.go"].pkg_name, "alpha");

        // No filesystem change: second peek reports no movement.
        assert!(!dir.update_peek());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn parse_package_publishes_only_matching_files() {
        let root = temp_dir("parse");
        fs::write(root.join("a.go"), "package alpha\n\nfunc A() int { return 1 }\n")
            .expect("write");
        fs::write(root.join("b.go"), "package beta\n\nfunc B() {}\n").expect("write");

        let mut dir = Dir::new(root.clone());
        dir.update_peek();
        let ctx = PackedContext {
            goos: "linux".to_string(),
            goarch: "amd64".to_string(),
            compiler: "gc".to_string(),
            ..Default::default()
        };
        let pkg = dir.get_package("alpha", "alpha", &ctx).expect("alpha");
        assert_eq!(pkg.files.len(), 1);
        assert!(dir.find_package("beta").is_none());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn build_tagged_files_are_filtered() {
        let root = temp_dir("tags");
        fs::write(root.join("c_linux.go"), "package c\n\nfunc L() {}\n").expect("write");
        fs::write(root.join("c_darwin.go"), "package c\n\nfunc D() {}\n").expect("write");

        let mut dir = Dir::new(root.clone());
        dir.update_peek();
        let ctx = PackedContext {
            goos: "linux".to_string(),
            goarch: "amd64".to_string(),
            compiler: "gc".to_string(),
            ..Default::default()
        };
        let pkg = dir.get_package("c", "c", &ctx).expect("c");
        assert_eq!(pkg.files.len(), 1);
        assert!(pkg.files[0].1.ends_with("c_linux.go"));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn scan_package_name_skips_leading_comments() {
        let root = temp_dir("scan");
        let path = root.join("doc.go");
        fs::write(
            &path,
            "// Package doc is documented.\n/* extensively */\n\npackage doc\n",
        )
        .expect("write");
        assert_eq!(scan_package_name(&path).as_deref(), Some("doc"));
        let _ = fs::remove_dir_all(root);
    }
}
