// Purpose: Resolve the symbol at a cursor: definition position, type, doc, and
//   call-argument index when inside a call.
// Inputs/Outputs: (filename, buffer, byte cursor) in; an ident result and a call
//   result out, either possibly empty.
// Invariants: The call result is populated only when the cursor sits past the
//   call's opening parenthesis.
// Gotchas: Descent stops at the innermost identifier; a call stays live while
//   descending so the innermost enclosing call wins.

use std::path::Path;

use crate::frontend::ast::{self, Span};
use crate::frontend::fileset::Position;
use crate::pkg::PkgCache;
use crate::query::{analyze, doc::peek_doc, Analysis};
use crate::sema::{ObjKind, Object};

#[derive(Clone, Debug, Default)]
pub struct LookupResult {
    pub position: Position,
    pub name: String,
    pub typ: String,
    pub doc: String,
    pub call_arg: i64,
}

impl LookupResult {
    fn empty() -> Self {
        LookupResult {
            call_arg: -1,
            ..Default::default()
        }
    }
}

pub fn lookup(
    cache: &PkgCache,
    filename: &Path,
    data: &str,
    cursor: usize,
) -> (LookupResult, LookupResult) {
    let analysis = match analyze(cache, filename, data) {
        Some(a) => a,
        None => return (LookupResult::empty(), LookupResult::empty()),
    };
    let mut search = CursorSearch {
        cursor,
        id: None,
        call: None,
        import_path: None,
    };
    search.visit_file(&analysis.file);

    let mut id_result = LookupResult::empty();
    let mut call_result = LookupResult::empty();

    if let Some(span) = &search.id {
        if let Some(obj) = analysis
            .check
            .info
            .object_at(&(analysis.file_id, span.start, span.end))
        {
            id_result = lookup_object(cache, &analysis, obj.clone());
        }
    } else if let Some(path) = &search.import_path {
        id_result.name = path.clone();
        id_result.typ = "package".to_string();
    }

    if let Some((fun, args)) = &search.call {
        if let Some(span) = rightmost_ident(fun) {
            if let Some(obj) = analysis
                .check
                .info
                .object_at(&(analysis.file_id, span.start, span.end))
            {
                call_result = lookup_object(cache, &analysis, obj.clone());
                call_result.call_arg = 0;
                for (i, arg) in args.iter().enumerate() {
                    if arg.span.end < cursor {
                        call_result.call_arg = (i + 1) as i64;
                    }
                }
            }
        }
    }

    (id_result, call_result)
}

fn lookup_object(cache: &PkgCache, analysis: &Analysis, obj: Object) -> LookupResult {
    let mut result = LookupResult::empty();
    result.name = obj.name.clone();
    result.typ = match obj.kind {
        ObjKind::Pkg => String::new(),
        _ => obj.ty.type_string(analysis.pkg_name()),
    };
    if let (Some(file), Some(span)) = (obj.file, &obj.span) {
        if obj.pkg_path.is_empty() {
            // Declared in the buffer's own check: position through its table.
            result.position = analysis.fset.position(file, span);
        } else if let Some(fset) = cache.file_set(&obj.pkg_path, &analysis.src_dir()) {
            result.position = fset.position(file, span);
        }
    }
    if result.position.is_valid() {
        result.doc = peek_doc(&result.position);
    }
    result
}

struct CursorSearch<'a> {
    cursor: usize,
    id: Option<Span>,
    call: Option<(&'a ast::Expr, &'a [ast::Expr])>,
    import_path: Option<String>,
}

impl<'a> CursorSearch<'a> {
    fn hit(&self, span: &Span) -> bool {
        span.contains(self.cursor)
    }

    fn visit_file(&mut self, file: &'a ast::File) {
        for imp in &file.imports {
            if self.hit(&imp.path_span) {
                self.import_path = Some(imp.path.clone());
                return;
            }
        }
        for decl in &file.decls {
            self.visit_decl(decl);
        }
    }

    fn visit_decl(&mut self, decl: &'a ast::Decl) {
        match decl {
            ast::Decl::Func(f) => {
                self.visit_ident(&f.name);
                if let Some(recv) = &f.recv {
                    self.visit_param(recv);
                }
                self.visit_sig(&f.sig);
                if let Some(body) = &f.body {
                    if self.hit(&body.span) {
                        self.visit_block(body);
                    }
                }
            }
            ast::Decl::Const(specs) | ast::Decl::Var(specs) => {
                for spec in specs {
                    for name in &spec.names {
                        self.visit_ident(name);
                    }
                    for value in &spec.values {
                        self.visit_expr(value);
                    }
                }
            }
            ast::Decl::Type(specs) => {
                for spec in specs {
                    self.visit_ident(&spec.name);
                }
            }
        }
    }

    fn visit_sig(&mut self, sig: &'a ast::FuncSig) {
        for p in sig.params.iter().chain(&sig.results) {
            self.visit_param(p);
        }
    }

    fn visit_param(&mut self, p: &'a ast::Param) {
        for name in &p.names {
            self.visit_ident(name);
        }
    }

    fn visit_ident(&mut self, ident: &ast::Ident) {
        if self.hit(&ident.span) {
            self.id = Some(ident.span.clone());
        }
    }

    fn visit_block(&mut self, block: &'a ast::Block) {
        for stmt in &block.stmts {
            self.visit_stmt(stmt);
        }
    }

    fn visit_stmt(&mut self, stmt: &'a ast::Stmt) {
        match stmt {
            ast::Stmt::Decl(decl) => self.visit_decl(decl),
            ast::Stmt::Expr(e) => self.visit_expr(e),
            ast::Stmt::Send { chan, value, .. } => {
                self.visit_expr(chan);
                self.visit_expr(value);
            }
            ast::Stmt::IncDec { expr, .. } => self.visit_expr(expr),
            ast::Stmt::Assign { lhs, rhs, .. } => {
                for e in lhs.iter().chain(rhs) {
                    self.visit_expr(e);
                }
            }
            ast::Stmt::Return { results, .. } => {
                for e in results {
                    self.visit_expr(e);
                }
            }
            ast::Stmt::Branch { .. } | ast::Stmt::Empty | ast::Stmt::Bad(_) => {}
            ast::Stmt::Block(b) => {
                if self.hit(&b.span) {
                    self.visit_block(b);
                }
            }
            ast::Stmt::If {
                init,
                cond,
                then,
                els,
                ..
            } => {
                if let Some(init) = init {
                    self.visit_stmt(init);
                }
                self.visit_expr(cond);
                if self.hit(&then.span) {
                    self.visit_block(then);
                }
                if let Some(els) = els {
                    self.visit_stmt(els);
                }
            }
            ast::Stmt::Switch {
                init,
                tag,
                type_switch,
                cases,
                ..
            } => {
                if let Some(init) = init {
                    self.visit_stmt(init);
                }
                if let Some(tag) = tag {
                    self.visit_expr(tag);
                }
                if let Some(guard) = type_switch {
                    if let Some(bind) = &guard.bind {
                        self.visit_ident(bind);
                    }
                    self.visit_expr(&guard.x);
                }
                for case in cases {
                    for e in &case.exprs {
                        self.visit_expr(e);
                    }
                    for s in &case.body {
                        self.visit_stmt(s);
                    }
                }
            }
            ast::Stmt::Select { cases, .. } => {
                for case in cases {
                    if let Some(comm) = &case.comm {
                        self.visit_stmt(comm);
                    }
                    for s in &case.body {
                        self.visit_stmt(s);
                    }
                }
            }
            ast::Stmt::For {
                init,
                cond,
                post,
                body,
                ..
            } => {
                if let Some(init) = init {
                    self.visit_stmt(init);
                }
                if let Some(cond) = cond {
                    self.visit_expr(cond);
                }
                if let Some(post) = post {
                    self.visit_stmt(post);
                }
                if self.hit(&body.span) {
                    self.visit_block(body);
                }
            }
            ast::Stmt::Range {
                key, value, x, body, ..
            } => {
                for e in [key, value].into_iter().flatten() {
                    self.visit_expr(e);
                }
                self.visit_expr(x);
                if self.hit(&body.span) {
                    self.visit_block(body);
                }
            }
            ast::Stmt::Go { call, .. } | ast::Stmt::Defer { call, .. } => self.visit_expr(call),
            ast::Stmt::Labeled { stmt, .. } => self.visit_stmt(stmt),
        }
    }

    fn visit_expr(&mut self, expr: &'a ast::Expr) {
        if !self.hit(&expr.span) {
            return;
        }
        match &expr.kind {
            ast::ExprKind::Ident(_) => {
                self.id = Some(expr.span.clone());
            }
            ast::ExprKind::BasicLit { .. } | ast::ExprKind::Bad => {}
            ast::ExprKind::CompositeLit { elts, .. } => {
                for e in elts {
                    self.visit_expr(e);
                }
            }
            ast::ExprKind::KeyValue { key, value } => {
                self.visit_expr(key);
                self.visit_expr(value);
            }
            ast::ExprKind::FuncLit { body, .. } => {
                if self.hit(&body.span) {
                    self.visit_block(body);
                }
            }
            ast::ExprKind::Paren(inner) => self.visit_expr(inner),
            ast::ExprKind::Selector { x, sel } => {
                if self.hit(&sel.span) {
                    self.id = Some(sel.span.clone());
                    return;
                }
                self.visit_expr(x);
            }
            ast::ExprKind::Index { x, index } => {
                self.visit_expr(x);
                self.visit_expr(index);
            }
            ast::ExprKind::SliceExpr { x, low, high, max } => {
                self.visit_expr(x);
                for part in [low, high, max].into_iter().flatten() {
                    self.visit_expr(part);
                }
            }
            ast::ExprKind::TypeAssert { x, .. } => self.visit_expr(x),
            ast::ExprKind::Call {
                fun, lparen, args, ..
            } => {
                if *lparen < self.cursor {
                    self.call = Some((fun, args.as_slice()));
                }
                self.visit_expr(fun);
                for arg in args {
                    self.visit_expr(arg);
                }
            }
            ast::ExprKind::Star(x) => self.visit_expr(x),
            ast::ExprKind::Unary { x, .. } => self.visit_expr(x),
            ast::ExprKind::Binary { x, y, .. } => {
                self.visit_expr(x);
                self.visit_expr(y);
            }
            ast::ExprKind::TypeInExpr(_) => {}
        }
    }
}

/// The defining identifier of a call target: the rightmost identifier in the
/// callee expression, e.g. `Sqrt` of `math.Sqrt`.
fn rightmost_ident(expr: &ast::Expr) -> Option<Span> {
    match &expr.kind {
        ast::ExprKind::Ident(_) => Some(expr.span.clone()),
        ast::ExprKind::Selector { sel, .. } => Some(sel.span.clone()),
        ast::ExprKind::Paren(inner) => rightmost_ident(inner),
        ast::ExprKind::Index { x, .. } => rightmost_ident(x),
        _ => None,
    }
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
            "gosense-lookup-{}-{}-{}",
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
    fn call_info_reports_function_and_argument_index() {
        let root = temp_dir("call");
        let math_dir = root.join("src").join("math");
        fs::create_dir_all(&math_dir).expect("mkdir");
        fs::write(
            math_dir.join("math.go"),
            "package math\n\n// Sqrt returns the square root of x.\nfunc Sqrt(x float64) float64 { return x }\n",
        )
        .expect("write");

        let cache = PkgCache::new(ctx_for_root(&root));
        let buffer =
            "package main\n\nimport \"math\"\n\nfunc main() {\n\tmath.Sqrt(4)\n}\n";
        let cursor = buffer.find("(4)").expect("call site") + 1;
        let (id, call) = lookup(&cache, &root.join("main.go"), buffer, cursor);

        assert_eq!(call.name, "Sqrt");
        assert_eq!(call.typ, "func(float64) float64");
        assert_eq!(call.call_arg, 0);
        assert!(call.position.filename.ends_with("math.go"));
        assert!(call.doc.contains("square root"));
        // The cursor sits on the literal `4`, not an identifier.
        assert!(id.name.is_empty() || id.name == "4");

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn call_arg_advances_past_completed_arguments() {
        let root = temp_dir("args");
        let buffer =
            "package main\n\nfunc f(a, b int) int { return a + b }\n\nfunc main() {\n\tf(1, 2)\n}\n";
        let cache = PkgCache::new(ctx_for_root(&root));
        let cursor = buffer.rfind("2)").expect("second arg");
        let (_, call) = lookup(&cache, &root.join("main.go"), buffer, cursor);
        assert_eq!(call.name, "f");
        assert_eq!(call.call_arg, 1);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn identifier_lookup_resolves_local_definition() {
        let root = temp_dir("local");
        let buffer = "package main\n\nfunc main() {\n\tcount := 1\n\t_ = count\n}\n";
        let cache = PkgCache::new(ctx_for_root(&root));
        let cursor = buffer.rfind("count").expect("use site") + 1;
        let (id, _) = lookup(&cache, &root.join("main.go"), buffer, cursor);
        assert_eq!(id.name, "count");
        assert_eq!(id.typ, "int");
        assert!(id.position.filename.ends_with("main.go"));
        let _ = fs::remove_dir_all(root);
    }
}
