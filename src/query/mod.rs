// Purpose: Query front shared plumbing: parse the user's buffer, inject sibling
//   package files, type-check against the cache.
// Inputs/Outputs: (filename, in-memory buffer) in; an Analysis with syntax tree,
//   position table, and check results out.
// Invariants: The buffer itself is never read from disk; siblings are discovered
//   by directory listing and package-clause probing.
// Gotchas: Test-file siblings participate only when the query file is itself a
//   test file.

pub mod complete;
pub mod doc;
pub mod lookup;
pub mod report;

use std::fs;
use std::path::{Path, PathBuf};

use crate::frontend::ast;
use crate::frontend::diagnostic::Diagnostics;
use crate::frontend::fileset::{FileId, FileSet};
use crate::frontend::parser::{parse_source, ParseMode};
use crate::pkg::context::{SOURCE_EXT, TEST_SUFFIX};
use crate::pkg::{CacheImporter, PkgCache};
use crate::sema::{self, CheckResult};

pub struct Analysis {
    pub filename: PathBuf,
    pub file_id: FileId,
    pub file: ast::File,
    pub fset: FileSet,
    pub parse_diags: Diagnostics,
    pub check: CheckResult,
}

impl Analysis {
    pub fn pkg_name(&self) -> &str {
        &self.file.package
    }

    pub fn src_dir(&self) -> PathBuf {
        self.filename
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default()
    }
}

/// Parse the buffer, pull in sibling files of the same package, and check the
/// lot against the cache in do-not-stop-on-error posture with bodies walked.
pub fn analyze(cache: &PkgCache, filename: &Path, data: &str) -> Option<Analysis> {
    let (file, parse_diags) = parse_source(data, ParseMode::Full);
    let file = file?;

    let mut fset = FileSet::new();
    let mut sibling_files: Vec<(FileId, ast::File)> = Vec::new();
    for other in find_other_package_files(filename, &file.package) {
        let src = match fs::read_to_string(&other) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let (parsed, _) = parse_source(&src, ParseMode::Full);
        if let Some(parsed) = parsed {
            let id = fset.add_file(&other);
            sibling_files.push((id, parsed));
        }
    }
    let file_id = fset.add_file(filename);

    let mut refs: Vec<(FileId, &ast::File)> = sibling_files
        .iter()
        .map(|(id, f)| (*id, f))
        .collect();
    refs.push((file_id, &file));

    let mut importer = CacheImporter {
        cache,
        src_dir: filename
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default(),
    };
    let check = sema::check_package("", &refs, &mut importer, true);

    Some(Analysis {
        filename: filename.to_path_buf(),
        file_id,
        file,
        fset,
        parse_diags,
        check,
    })
}

/// Sibling discovery: every non-hidden same-package source file in the
/// buffer's directory, test files only alongside a test buffer.
pub fn find_other_package_files(filename: &Path, pkg_name: &str) -> Vec<PathBuf> {
    let dir = match filename.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => return Vec::new(),
    };
    let own_name = filename
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let is_test_file = own_name.ends_with(TEST_SUFFIX);
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || name.starts_with('_') {
            continue;
        }
        if name == own_name || !name.ends_with(SOURCE_EXT) {
            continue;
        }
        if !is_test_file && name.ends_with(TEST_SUFFIX) {
            continue;
        }
        let path = dir.join(&name);
        if sibling_pkg_name(&path).as_deref() == Some(pkg_name) {
            out.push(path);
        }
    }
    out.sort();
    out
}

fn sibling_pkg_name(path: &Path) -> Option<String> {
    let src = fs::read_to_string(path).ok()?;
    let (file, _) = parse_source(&src, ParseMode::PackageClauseOnly);
    file.map(|f| f.package)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::context::PackedContext;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time drift")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "gosense-query-{}-{}-{}",
            prefix,
            std::process::id(),
            nonce
        ));
        fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    #[test]
    fn siblings_join_the_check() {
        let root = temp_dir("siblings");
        fs::write(root.join("other.go"), "package p\n\nfunc Helper() int { return 7 }\n")
            .expect("write");
        fs::write(root.join("test_other.go"), "package q\n\nfunc Wrong() {}\n")
            .expect("write");

        let cache = PkgCache::new(PackedContext::default());
        let buffer = "package p\n\nfunc Use() int { return Helper() }\n";
        let analysis = analyze(&cache, &root.join("buf.go"), buffer).expect("analysis");
        assert!(analysis.check.pkg.scope.contains_key("Helper"));
        assert!(!analysis.check.pkg.scope.contains_key("Wrong"));
        assert!(analysis
            .check
            .errors
            .iter()
            .all(|e| !e.message.contains("undefined: Helper")));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_siblings_only_for_test_buffers() {
        let root = temp_dir("testpolarity");
        fs::write(root.join("a_test.go"), "package p\n\nfunc THelper() {}\n").expect("write");
        let non_test = find_other_package_files(&root.join("buf.go"), "p");
        assert!(non_test.is_empty());
        let test = find_other_package_files(&root.join("buf_test.go"), "p");
        assert_eq!(test.len(), 1);
        let _ = fs::remove_dir_all(root);
    }
}
