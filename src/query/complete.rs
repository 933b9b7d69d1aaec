// Purpose: Produce completion candidates for a cursor position.
// Inputs/Outputs: (filename, buffer, byte cursor) in; ranked candidates plus the
//   length of the partial word being completed.
// Invariants: After a dot, only members of the selected expression or package
//   are offered; otherwise every identifier visible in scope at the cursor.
// Gotchas: Unexported members are offered only for types of the buffer's own
//   package.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::frontend::ast::is_exported;
use crate::pkg::{CacheImporter, PkgCache};
use crate::query::analyze;
use crate::sema::types::Type;
use crate::sema::universe::universe_objects;
use crate::sema::{members_of, Importer, ObjKind, Object, PkgView};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Candidate {
    pub class: String,
    pub name: String,
    #[serde(rename = "type")]
    pub typ: String,
}

pub fn auto_complete(
    cache: &PkgCache,
    filename: &Path,
    data: &str,
    cursor: usize,
) -> (Vec<Candidate>, usize) {
    let cursor = cursor.min(data.len());
    let bytes = data.as_bytes();
    let mut prefix_start = cursor;
    while prefix_start > 0 && is_ident_byte(bytes[prefix_start - 1]) {
        prefix_start -= 1;
    }
    let prefix = &data[prefix_start..cursor];
    let after_dot = prefix_start > 0 && bytes[prefix_start - 1] == b'.';

    let analysis = match analyze(cache, filename, data) {
        Some(a) => a,
        None => return (Vec::new(), 0),
    };
    let current_pkg = analysis.pkg_name().to_string();
    let mut importer = CacheImporter {
        cache,
        src_dir: analysis.src_dir(),
    };

    let mut ordered: BTreeMap<String, Candidate> = BTreeMap::new();
    let add = |obj: &Object, ordered: &mut BTreeMap<String, Candidate>| {
        if obj.name.is_empty() || obj.name == "_" {
            return;
        }
        ordered
            .entry(obj.name.clone())
            .or_insert_with(|| Candidate {
                class: obj.kind.class().to_string(),
                name: obj.name.clone(),
                typ: match obj.kind {
                    ObjKind::Pkg => String::new(),
                    _ => obj.ty.type_string(&current_pkg),
                },
            });
    };

    if after_dot {
        let dot = prefix_start - 1;
        // Package member completion: the ident before the dot resolved to an
        // imported package.
        let pkg_use = analysis
            .check
            .info
            .uses
            .iter()
            .find(|((file, _, end), obj)| {
                *file == analysis.file_id && *end == dot && obj.kind == ObjKind::Pkg
            })
            .map(|(_, obj)| obj.clone());
        if let Some(pkg_obj) = pkg_use {
            if !pkg_obj.pkg_path.is_empty() {
                if let Some(pkg) = importer.import(&pkg_obj.pkg_path) {
                    for obj in pkg.scope.values() {
                        if is_exported(&obj.name) {
                            add(obj, &mut ordered);
                        }
                    }
                }
            }
        } else if let Some(xty) = widest_expr_ending_at(&analysis, dot) {
            let mut view = PkgView {
                pkg: &analysis.check.pkg,
                importer: &mut importer,
            };
            let foreign = matches!(&xty, Type::Named(n) if !n.pkg_path.is_empty())
                || matches!(xty.deref_once(), Type::Named(n) if !n.pkg_path.is_empty());
            for obj in members_of(&mut view, &xty) {
                if foreign && !is_exported(&obj.name) {
                    continue;
                }
                add(&obj, &mut ordered);
            }
        }
    } else {
        // Innermost scopes first so shadowing wins.
        let mut scopes: Vec<_> = analysis
            .check
            .info
            .scopes
            .iter()
            .filter(|s| {
                s.file == analysis.file_id && s.start <= cursor && cursor <= s.end
            })
            .collect();
        scopes.sort_by_key(|s| s.end - s.start);
        for scope in scopes {
            for obj in &scope.objects {
                add(obj, &mut ordered);
            }
        }
        for obj in analysis.check.pkg.scope.values() {
            add(obj, &mut ordered);
        }
        for imp in &analysis.file.imports {
            let name = match &imp.name {
                Some(n) if n.name == "_" || n.name == "." => continue,
                Some(n) => n.name.clone(),
                None => imp
                    .path
                    .rsplit('/')
                    .next()
                    .unwrap_or(imp.path.as_str())
                    .to_string(),
            };
            let obj = Object {
                name,
                kind: ObjKind::Pkg,
                ty: Type::Invalid,
                pkg_path: imp.path.clone(),
                pkg_name: String::new(),
                file: None,
                span: None,
            };
            add(&obj, &mut ordered);
        }
        for obj in universe_objects().values() {
            add(obj, &mut ordered);
        }
    }

    let lowered = prefix.to_lowercase();
    let candidates: Vec<Candidate> = ordered
        .into_values()
        .filter(|c| lowered.is_empty() || c.name.to_lowercase().starts_with(&lowered))
        .collect();
    (candidates, prefix.len())
}

// The widest typed expression ending exactly at the dot is the selector base.
fn widest_expr_ending_at(analysis: &crate::query::Analysis, dot: usize) -> Option<Type> {
    analysis
        .check
        .info
        .expr_types
        .iter()
        .filter(|((file, _, end), ty)| {
            *file == analysis.file_id && *end == dot && !ty.is_invalid()
        })
        .max_by_key(|((_, start, end), _)| end - start)
        .map(|(_, ty)| ty.clone())
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::context::PackedContext;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time drift")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "gosense-complete-{}-{}-{}",
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

    #[test]
    fn completes_package_members_after_dot() {
        let root = temp_dir("pkgdot");
        let dir = root.join("src").join("strs");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(
            dir.join("strs.go"),
            "package strs\n\nfunc Join(a, b string) string { return a + b }\n\nfunc hidden() {}\n",
        )
        .expect("write");

        let cache = PkgCache::new(ctx_for_root(&root));
        let buffer = "package main\n\nimport \"strs\"\n\nfunc main() {\n\tstrs.Jo\n}\n";
        let cursor = buffer.find("Jo\n").expect("cursor") + 2;
        let (candidates, len) = auto_complete(&cache, &root.join("main.go"), buffer, cursor);

        assert_eq!(len, 2);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Join");
        assert_eq!(candidates[0].class, "func");
        assert_eq!(candidates[0].typ, "func(string, string) string");

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn completes_struct_fields_and_methods() {
        let root = temp_dir("fields");
        let buffer = "package main\n\ntype Point struct {\n\tX, Y int\n}\n\nfunc (p Point) Norm() int { return p.X }\n\nfunc main() {\n\tvar p Point\n\tp.\n}\n";
        let cache = PkgCache::new(ctx_for_root(&root));
        let cursor = buffer.rfind("p.\n").expect("cursor") + 2;
        let (candidates, len) = auto_complete(&cache, &root.join("main.go"), buffer, cursor);

        assert_eq!(len, 0);
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"X"));
        assert!(names.contains(&"Y"));
        assert!(names.contains(&"Norm"));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn scope_completion_includes_locals_and_package_scope() {
        let root = temp_dir("scope");
        let buffer = "package main\n\nvar Global = 3\n\nfunc main() {\n\tlocal := 1\n\t_ = local\n\tloc\n}\n";
        let cache = PkgCache::new(ctx_for_root(&root));
        let cursor = buffer.rfind("loc\n").expect("cursor") + 3;
        let (candidates, len) = auto_complete(&cache, &root.join("main.go"), buffer, cursor);

        assert_eq!(len, 3);
        assert!(candidates.iter().any(|c| c.name == "local"));

        let (all, _) = auto_complete(
            &cache,
            &root.join("main.go"),
            buffer,
            buffer.rfind("loc\n").expect("cursor"),
        );
        assert!(all.iter().any(|c| c.name == "Global"));
        assert!(all.iter().any(|c| c.name == "len"));

        let _ = fs::remove_dir_all(root);
    }
}
