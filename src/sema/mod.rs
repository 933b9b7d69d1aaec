// Purpose: Type-check parsed packages at signature level, with optional body analysis.
// Inputs/Outputs: Consumes files of one package plus an importer; yields a typed
//   package (symbol table), type errors, and def/use/type maps in body mode.
// Invariants: Checking never aborts on error; all imports resolve through the
//   importer hook; a published TypedPackage is immutable.
// Gotchas: TypeName objects store the *underlying* type; references to a defined
//   type are Type::Named and resolve back through the owning package's scope.

pub mod types;
pub mod universe;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::frontend::ast;
use crate::frontend::fileset::FileId;

use self::types::{Basic, ChanDir, Field, Method, Named, Signature, Type};
use self::universe::{builtin_object, universe_objects};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjKind {
    Func,
    Var,
    Const,
    TypeName,
    Pkg,
    Builtin,
}

impl ObjKind {
    pub fn class(&self) -> &'static str {
        match self {
            ObjKind::Func => "func",
            ObjKind::Var => "var",
            ObjKind::Const => "const",
            ObjKind::TypeName => "type",
            ObjKind::Pkg => "package",
            ObjKind::Builtin => "func",
        }
    }
}

/// A declared entity. `pkg_path` is empty for universe/builtin objects and for
/// locals; definition position is (file, span) within the owning package's
/// position table.
#[derive(Clone, Debug)]
pub struct Object {
    pub name: String,
    pub kind: ObjKind,
    pub ty: Type,
    pub pkg_path: String,
    pub pkg_name: String,
    pub file: Option<FileId>,
    pub span: Option<ast::Span>,
}

impl Object {
    /// The type a reference to this object has in an expression. Defined
    /// types reference as Named; their underlying stays on the object.
    pub fn reference_type(&self) -> Type {
        match self.kind {
            ObjKind::TypeName => {
                if self.pkg_path.is_empty() && self.pkg_name.is_empty() {
                    self.ty.clone()
                } else {
                    Type::Named(Named {
                        pkg_path: self.pkg_path.clone(),
                        pkg_name: self.pkg_name.clone(),
                        name: self.name.clone(),
                    })
                }
            }
            _ => self.ty.clone(),
        }
    }
}

/// The semantic view of a package: its top-level symbol table. Immutable once
/// published by the cache.
#[derive(Debug)]
pub struct TypedPackage {
    pub path: String,
    pub name: String,
    pub scope: BTreeMap<String, Object>,
    pub methods: BTreeMap<String, Vec<Object>>,
}

#[derive(Clone, Debug)]
pub struct TypeError {
    pub file: FileId,
    pub span: ast::Span,
    pub message: String,
}

pub type SpanKey = (FileId, usize, usize);

/// Body-mode results: resolution and typing maps keyed by node span.
#[derive(Debug, Default)]
pub struct Info {
    pub defs: HashMap<SpanKey, Object>,
    pub uses: HashMap<SpanKey, Object>,
    pub expr_types: HashMap<SpanKey, Type>,
    pub scopes: Vec<ScopeRec>,
}

#[derive(Debug)]
pub struct ScopeRec {
    pub file: FileId,
    pub start: usize,
    pub end: usize,
    pub objects: Vec<Object>,
}

impl Info {
    pub fn object_at(&self, key: &SpanKey) -> Option<&Object> {
        self.defs.get(key).or_else(|| self.uses.get(key))
    }
}

pub struct CheckResult {
    pub pkg: TypedPackage,
    pub errors: Vec<TypeError>,
    pub info: Info,
}

/// The importer hook. Implementations route through the package cache so
/// transitive imports share it; None means the import is unresolvable.
pub trait Importer {
    fn import(&mut self, path: &str) -> Option<Arc<TypedPackage>>;
}

/// An importer that resolves nothing; for tests and fallback paths.
pub struct NoImports;

impl Importer for NoImports {
    fn import(&mut self, _path: &str) -> Option<Arc<TypedPackage>> {
        None
    }
}

enum ImportBinding {
    Resolved(Arc<TypedPackage>),
    // `import "C"` is tolerated without resolving.
    FakeC,
    Failed,
}

pub fn check_package(
    path: &str,
    files: &[(FileId, &ast::File)],
    importer: &mut dyn Importer,
    check_bodies: bool,
) -> CheckResult {
    let pkg_name = files
        .first()
        .map(|(_, f)| f.package.clone())
        .unwrap_or_default();
    let mut checker = Checker {
        path: path.to_string(),
        pkg_name,
        importer,
        scope: BTreeMap::new(),
        methods: BTreeMap::new(),
        type_underlyings: HashMap::new(),
        file_imports: HashMap::new(),
        errors: Vec::new(),
        info: Info::default(),
        locals: Vec::new(),
        current_file: 0,
    };
    checker.bind_imports(files);
    checker.collect_types(files);
    checker.collect_funcs(files);
    checker.collect_values(files);
    if check_bodies {
        checker.check_bodies(files);
    }
    CheckResult {
        pkg: TypedPackage {
            path: checker.path,
            name: checker.pkg_name,
            scope: checker.scope,
            methods: checker.methods,
        },
        errors: checker.errors,
        info: checker.info,
    }
}

struct Checker<'a> {
    path: String,
    pkg_name: String,
    importer: &'a mut dyn Importer,
    scope: BTreeMap<String, Object>,
    methods: BTreeMap<String, Vec<Object>>,
    // type name -> resolved underlying, with in-progress marker for cycles.
    type_underlyings: HashMap<String, Option<Type>>,
    file_imports: HashMap<FileId, HashMap<String, ImportBinding>>,
    errors: Vec<TypeError>,
    info: Info,
    locals: Vec<HashMap<String, Object>>,
    current_file: FileId,
}

impl<'a> Checker<'a> {
    fn error(&mut self, file: FileId, span: &ast::Span, message: impl Into<String>) {
        self.errors.push(TypeError {
            file,
            span: span.clone(),
            message: message.into(),
        });
    }

    // ---- imports ----

    fn bind_imports(&mut self, files: &[(FileId, &ast::File)]) {
        for (file_id, file) in files {
            let mut bindings = HashMap::new();
            for imp in &file.imports {
                if imp.path == "C" {
                    bindings.insert("C".to_string(), ImportBinding::FakeC);
                    continue;
                }
                let local = match &imp.name {
                    Some(n) if n.name == "_" => continue,
                    Some(n) if n.name == "." => {
                        // Dot imports fold into the file scope; bind under the
                        // package's own name as a fallback.
                        None
                    }
                    Some(n) => Some(n.name.clone()),
                    None => None,
                };
                match self.importer.import(&imp.path) {
                    Some(pkg) => {
                        let name = local.unwrap_or_else(|| pkg.name.clone());
                        bindings.insert(name, ImportBinding::Resolved(pkg));
                    }
                    None => {
                        let name = local.unwrap_or_else(|| {
                            imp.path
                                .rsplit('/')
                                .next()
                                .unwrap_or(imp.path.as_str())
                                .to_string()
                        });
                        self.error(
                            *file_id,
                            &imp.path_span,
                            format!("could not import {} (no package)", imp.path),
                        );
                        bindings.insert(name, ImportBinding::Failed);
                    }
                }
            }
            self.file_imports.insert(*file_id, bindings);
        }
    }

    fn imported_package(&self, file: FileId, name: &str) -> Option<&ImportBinding> {
        self.file_imports.get(&file).and_then(|m| m.get(name))
    }

    fn import_object(&self, file: FileId, name: &str) -> Option<Object> {
        match self.imported_package(file, name)? {
            ImportBinding::Resolved(pkg) => Some(Object {
                name: name.to_string(),
                kind: ObjKind::Pkg,
                ty: Type::Invalid,
                pkg_path: pkg.path.clone(),
                pkg_name: pkg.name.clone(),
                file: None,
                span: None,
            }),
            ImportBinding::FakeC | ImportBinding::Failed => Some(Object {
                name: name.to_string(),
                kind: ObjKind::Pkg,
                ty: Type::Invalid,
                pkg_path: String::new(),
                pkg_name: name.to_string(),
                file: None,
                span: None,
            }),
        }
    }

    // ---- package scope: types ----

    fn collect_types(&mut self, files: &[(FileId, &ast::File)]) {
        // Names first so mutually recursive types resolve.
        let mut specs: Vec<(FileId, ast::TypeSpec)> = Vec::new();
        for (file_id, file) in files {
            for decl in &file.decls {
                if let ast::Decl::Type(list) = decl {
                    for spec in list {
                        specs.push((*file_id, spec.clone()));
                    }
                }
            }
        }
        for (_, spec) in &specs {
            self.type_underlyings.insert(spec.name.name.clone(), None);
        }
        for (file_id, spec) in &specs {
            let underlying = self.resolve_type_name(*file_id, spec, &specs);
            let name = spec.name.name.clone();
            if self.scope.contains_key(&name) {
                self.error(
                    *file_id,
                    &spec.name.span,
                    format!("{} redeclared in this block", name),
                );
            }
            self.scope.insert(
                name.clone(),
                Object {
                    name,
                    kind: ObjKind::TypeName,
                    ty: underlying,
                    pkg_path: self.path.clone(),
                    pkg_name: self.pkg_name.clone(),
                    file: Some(*file_id),
                    span: Some(spec.name.span.clone()),
                },
            );
        }
    }

    fn resolve_type_name(
        &mut self,
        file: FileId,
        spec: &ast::TypeSpec,
        all: &[(FileId, ast::TypeSpec)],
    ) -> Type {
        if let Some(Some(done)) = self.type_underlyings.get(&spec.name.name) {
            return done.clone();
        }
        // Mark in progress; a re-entrant request hits Invalid instead of
        // recursing forever.
        self.type_underlyings
            .insert(spec.name.name.clone(), Some(Type::Invalid));
        let resolved = self.resolve_type_expr_rec(file, &spec.ty, all);
        self.type_underlyings
            .insert(spec.name.name.clone(), Some(resolved.clone()));
        resolved
    }

    fn resolve_type_expr_rec(
        &mut self,
        file: FileId,
        ty: &ast::TypeExpr,
        all: &[(FileId, ast::TypeSpec)],
    ) -> Type {
        // Local type names referenced before their own resolution run get
        // resolved on demand.
        if let ast::TypeExprKind::Named(name) = &ty.kind {
            if self.type_underlyings.contains_key(name) && !self.scope.contains_key(name) {
                if let Some((spec_file, spec)) =
                    all.iter().find(|(_, s)| &s.name.name == name).cloned()
                {
                    if matches!(self.type_underlyings.get(name), Some(None)) {
                        self.resolve_type_name(spec_file, &spec, all);
                    }
                }
                return Type::Named(Named {
                    pkg_path: self.path.clone(),
                    pkg_name: self.pkg_name.clone(),
                    name: name.clone(),
                });
            }
        }
        self.resolve_type_expr(file, ty)
    }

    fn resolve_type_expr(&mut self, file: FileId, ty: &ast::TypeExpr) -> Type {
        match &ty.kind {
            ast::TypeExprKind::Named(name) => {
                if self.type_underlyings.contains_key(name) || self.scope.contains_key(name) {
                    return Type::Named(Named {
                        pkg_path: self.path.clone(),
                        pkg_name: self.pkg_name.clone(),
                        name: name.clone(),
                    });
                }
                if let Some(obj) = universe_objects().get(name.as_str()) {
                    if obj.kind == ObjKind::TypeName {
                        return obj.ty.clone();
                    }
                }
                self.error(file, &ty.span, format!("undefined: {}", name));
                Type::Invalid
            }
            ast::TypeExprKind::Qualified(pkg, name) => {
                match self.imported_package(file, pkg) {
                    Some(ImportBinding::Resolved(p)) => {
                        let p = p.clone();
                        match p.scope.get(name) {
                            Some(obj) if obj.kind == ObjKind::TypeName => Type::Named(Named {
                                pkg_path: p.path.clone(),
                                pkg_name: p.name.clone(),
                                name: name.clone(),
                            }),
                            Some(_) => {
                                self.error(
                                    file,
                                    &ty.span,
                                    format!("{}.{} is not a type", pkg, name),
                                );
                                Type::Invalid
                            }
                            None => {
                                self.error(
                                    file,
                                    &ty.span,
                                    format!("undefined: {}.{}", pkg, name),
                                );
                                Type::Invalid
                            }
                        }
                    }
                    Some(ImportBinding::FakeC | ImportBinding::Failed) => Type::Invalid,
                    None => {
                        if pkg == "unsafe" || self.scope.contains_key(pkg) {
                            // `unsafe` without import or shadowed names; keep quiet.
                            return Type::Invalid;
                        }
                        self.error(file, &ty.span, format!("undefined: {}", pkg));
                        Type::Invalid
                    }
                }
            }
            ast::TypeExprKind::Pointer(inner) => {
                Type::Pointer(Box::new(self.resolve_type_expr(file, inner)))
            }
            ast::TypeExprKind::Slice(inner) => {
                Type::Slice(Box::new(self.resolve_type_expr(file, inner)))
            }
            ast::TypeExprKind::Array(len, inner) => {
                let n = len.as_ref().and_then(|e| const_len(e));
                Type::Array(n, Box::new(self.resolve_type_expr(file, inner)))
            }
            ast::TypeExprKind::Map(k, v) => Type::Map(
                Box::new(self.resolve_type_expr(file, k)),
                Box::new(self.resolve_type_expr(file, v)),
            ),
            ast::TypeExprKind::Chan(dir, inner) => {
                let dir = match dir {
                    ast::ChanDir::Both => ChanDir::Both,
                    ast::ChanDir::Send => ChanDir::Send,
                    ast::ChanDir::Recv => ChanDir::Recv,
                };
                Type::Chan(dir, Box::new(self.resolve_type_expr(file, inner)))
            }
            ast::TypeExprKind::Func(sig) => {
                Type::Func(Box::new(self.resolve_signature(file, sig)))
            }
            ast::TypeExprKind::Struct(fields) => {
                let mut out = Vec::new();
                for field in fields {
                    let fty = self.resolve_type_expr(file, &field.ty);
                    if field.embedded {
                        let name = embedded_field_name(&field.ty);
                        out.push(Field {
                            name,
                            ty: fty,
                            embedded: true,
                        });
                    } else {
                        for name in &field.names {
                            out.push(Field {
                                name: name.name.clone(),
                                ty: fty.clone(),
                                embedded: false,
                            });
                        }
                    }
                }
                Type::Struct(out)
            }
            ast::TypeExprKind::Interface(elems) => {
                let mut methods = Vec::new();
                for elem in elems {
                    match elem {
                        ast::InterfaceElem::Method { name, sig } => {
                            methods.push(Method {
                                name: name.name.clone(),
                                sig: self.resolve_signature(file, sig),
                            });
                        }
                        ast::InterfaceElem::Embedded(ty) => {
                            let resolved = self.resolve_type_expr(file, ty);
                            let under = self.underlying(&resolved);
                            if let Type::Interface(embedded) = under {
                                methods.extend(embedded);
                            }
                        }
                    }
                }
                methods.sort_by(|a, b| a.name.cmp(&b.name));
                methods.dedup_by(|a, b| a.name == b.name);
                Type::Interface(methods)
            }
            ast::TypeExprKind::Paren(inner) => self.resolve_type_expr(file, inner),
            ast::TypeExprKind::Bad => Type::Invalid,
        }
    }

    fn resolve_signature(&mut self, file: FileId, sig: &ast::FuncSig) -> Signature {
        let mut params = Vec::new();
        for p in &sig.params {
            let ty = self.resolve_type_expr(file, &p.ty);
            let count = p.names.len().max(1);
            for _ in 0..count {
                params.push(ty.clone());
            }
        }
        // The final variadic parameter has slice type.
        if sig.variadic {
            if let Some(last) = params.last_mut() {
                let elem = last.clone();
                *last = Type::Slice(Box::new(elem));
            }
        }
        let mut results = Vec::new();
        for r in &sig.results {
            let ty = self.resolve_type_expr(file, &r.ty);
            let count = r.names.len().max(1);
            for _ in 0..count {
                results.push(ty.clone());
            }
        }
        Signature {
            params,
            results,
            variadic: sig.variadic,
        }
    }

    // ---- package scope: funcs ----

    fn collect_funcs(&mut self, files: &[(FileId, &ast::File)]) {
        for (file_id, file) in files {
            for decl in &file.decls {
                let f = match decl {
                    ast::Decl::Func(f) => f,
                    _ => continue,
                };
                let sig = self.resolve_signature(*file_id, &f.sig);
                let obj = Object {
                    name: f.name.name.clone(),
                    kind: ObjKind::Func,
                    ty: Type::Func(Box::new(sig)),
                    pkg_path: self.path.clone(),
                    pkg_name: self.pkg_name.clone(),
                    file: Some(*file_id),
                    span: Some(f.name.span.clone()),
                };
                match &f.recv {
                    Some(recv) => {
                        if let Some(type_name) = receiver_type_name(&recv.ty) {
                            self.methods.entry(type_name).or_default().push(obj);
                        }
                    }
                    None => {
                        if f.name.name == "init" {
                            continue;
                        }
                        if self.scope.contains_key(&f.name.name) {
                            self.error(
                                *file_id,
                                &f.name.span,
                                format!("{} redeclared in this block", f.name.name),
                            );
                        }
                        self.scope.insert(f.name.name.clone(), obj);
                    }
                }
            }
        }
    }

    // ---- package scope: consts and vars ----

    fn collect_values(&mut self, files: &[(FileId, &ast::File)]) {
        // Pass 1: declare every name so initializers may reference values
        // declared later in the package.
        for (file_id, file) in files {
            for decl in &file.decls {
                let (specs, kind) = match decl {
                    ast::Decl::Const(specs) => (specs, ObjKind::Const),
                    ast::Decl::Var(specs) => (specs, ObjKind::Var),
                    _ => continue,
                };
                for spec in specs {
                    for name in &spec.names {
                        self.declare_value(*file_id, name, kind, Type::Invalid, true);
                    }
                }
            }
        }
        // Pass 2: compute inferred types from initializers.
        for (file_id, file) in files {
            self.current_file = *file_id;
            for decl in &file.decls {
                match decl {
                    ast::Decl::Const(specs) => self.declare_consts(*file_id, specs, true),
                    ast::Decl::Var(specs) => self.declare_vars(*file_id, specs, true),
                    _ => {}
                }
            }
        }
    }

    fn declare_consts(&mut self, file: FileId, specs: &[ast::ValueSpec], package_level: bool) {
        let mut carried: Option<Type> = None;
        for spec in specs {
            let ty = if let Some(t) = &spec.ty {
                Some(self.resolve_type_expr(file, t))
            } else if !spec.values.is_empty() {
                spec.values
                    .first()
                    .map(|v| self.type_of_expr(file, v).defaulted())
            } else {
                carried.clone()
            };
            let ty = ty.unwrap_or(Type::Invalid);
            carried = Some(ty.clone());
            for name in &spec.names {
                self.declare_value(file, name, ObjKind::Const, ty.clone(), package_level);
            }
        }
    }

    fn declare_vars(&mut self, file: FileId, specs: &[ast::ValueSpec], package_level: bool) {
        for spec in specs {
            if let Some(t) = &spec.ty {
                let ty = self.resolve_type_expr(file, t);
                for name in &spec.names {
                    self.declare_value(file, name, ObjKind::Var, ty.clone(), package_level);
                }
                continue;
            }
            // Inferred: `var a, b = f()` may destructure a tuple.
            let mut value_types: Vec<Type> = Vec::new();
            for value in &spec.values {
                let t = self.type_of_expr(file, value).defaulted();
                match t {
                    Type::Tuple(items) if spec.values.len() == 1 => value_types.extend(items),
                    other => value_types.push(other),
                }
            }
            for (i, name) in spec.names.iter().enumerate() {
                let ty = value_types.get(i).cloned().unwrap_or(Type::Invalid);
                self.declare_value(file, name, ObjKind::Var, ty, package_level);
            }
        }
    }

    fn declare_value(
        &mut self,
        file: FileId,
        name: &ast::Ident,
        kind: ObjKind,
        ty: Type,
        package_level: bool,
    ) {
        if name.name == "_" {
            return;
        }
        let obj = Object {
            name: name.name.clone(),
            kind,
            ty,
            pkg_path: if package_level {
                self.path.clone()
            } else {
                String::new()
            },
            pkg_name: if package_level {
                self.pkg_name.clone()
            } else {
                String::new()
            },
            file: Some(file),
            span: Some(name.span.clone()),
        };
        if package_level {
            self.scope.insert(name.name.clone(), obj);
        } else {
            self.record_def(file, &name.span, obj.clone());
            if let Some(top) = self.locals.last_mut() {
                top.insert(name.name.clone(), obj);
            }
        }
    }

    // ---- environment lookups ----

    fn underlying(&mut self, ty: &Type) -> Type {
        underlying_of(self, ty)
    }

    fn member(&mut self, ty: &Type, name: &str) -> Option<Object> {
        member_of(self, ty, name)
    }

    fn lookup_ident(&mut self, file: FileId, name: &str) -> Option<Object> {
        for scope in self.locals.iter().rev() {
            if let Some(obj) = scope.get(name) {
                return Some(obj.clone());
            }
        }
        if let Some(obj) = self.scope.get(name) {
            return Some(obj.clone());
        }
        if let Some(obj) = self.import_object(file, name) {
            return Some(obj);
        }
        universe_objects().get(name).cloned()
    }

    // ---- expression typing ----

    fn type_of_expr(&mut self, file: FileId, expr: &ast::Expr) -> Type {
        let ty = self.type_of_expr_inner(file, expr);
        self.info.expr_types.insert(
            (file, expr.span.start, expr.span.end),
            ty.clone(),
        );
        ty
    }

    fn type_of_expr_inner(&mut self, file: FileId, expr: &ast::Expr) -> Type {
        match &expr.kind {
            ast::ExprKind::Ident(name) => {
                if name == "_" {
                    return Type::Invalid;
                }
                match self.lookup_ident(file, name) {
                    Some(obj) => {
                        self.record_use(file, &expr.span, obj.clone());
                        obj.reference_type()
                    }
                    None => {
                        self.error(file, &expr.span, format!("undefined: {}", name));
                        Type::Invalid
                    }
                }
            }
            ast::ExprKind::BasicLit { kind, .. } => match kind {
                ast::LitKind::Int => Type::Basic(Basic::UntypedInt),
                ast::LitKind::Float => Type::Basic(Basic::UntypedFloat),
                ast::LitKind::Imag => Type::Basic(Basic::Complex128),
                ast::LitKind::Rune => Type::Basic(Basic::UntypedRune),
                ast::LitKind::Str => Type::Basic(Basic::UntypedString),
            },
            ast::ExprKind::CompositeLit { ty, elts } => {
                for elt in elts {
                    self.type_of_expr(file, elt);
                }
                match ty {
                    Some(t) => self.resolve_type_expr(file, t),
                    None => Type::Invalid,
                }
            }
            ast::ExprKind::KeyValue { value, .. } => self.type_of_expr(file, value),
            ast::ExprKind::FuncLit { sig, body: _ } => {
                Type::Func(Box::new(self.resolve_signature(file, sig)))
            }
            ast::ExprKind::Paren(inner) => self.type_of_expr(file, inner),
            ast::ExprKind::Selector { x, sel } => self.type_of_selector(file, expr, x, sel),
            ast::ExprKind::Index { x, index } => {
                self.type_of_expr(file, index);
                let xty = self.type_of_expr(file, x);
                match self.underlying(&xty) {
                    Type::Slice(elem) => *elem,
                    Type::Array(_, elem) => *elem,
                    Type::Pointer(inner) => match self.underlying(&inner) {
                        Type::Array(_, elem) => *elem,
                        _ => Type::Invalid,
                    },
                    Type::Map(_, value) => *value,
                    Type::Basic(Basic::Str | Basic::UntypedString) => Type::Basic(Basic::Uint8),
                    _ => Type::Invalid,
                }
            }
            ast::ExprKind::SliceExpr { x, low, high, max } => {
                for part in [low, high, max].into_iter().flatten() {
                    self.type_of_expr(file, part);
                }
                let xty = self.type_of_expr(file, x);
                match self.underlying(&xty) {
                    Type::Array(_, elem) => Type::Slice(elem),
                    Type::Pointer(inner) => match self.underlying(&inner) {
                        Type::Array(_, elem) => Type::Slice(elem),
                        _ => Type::Invalid,
                    },
                    Type::Basic(Basic::Str | Basic::UntypedString) => Type::Basic(Basic::Str),
                    Type::Slice(_) => xty,
                    _ => Type::Invalid,
                }
            }
            ast::ExprKind::TypeAssert { x, ty } => {
                self.type_of_expr(file, x);
                match ty {
                    Some(t) => self.resolve_type_expr(file, t),
                    None => Type::Invalid,
                }
            }
            ast::ExprKind::Call { fun, args, .. } => self.type_of_call(file, fun, args),
            ast::ExprKind::Star(inner) => {
                let ity = self.type_of_expr(file, inner);
                match self.underlying(&ity) {
                    Type::Pointer(elem) => *elem,
                    _ => ity, // `*T` in expression position as a pointer type
                }
            }
            ast::ExprKind::Unary { op, x } => {
                let xty = self.type_of_expr(file, x);
                match op {
                    ast::UnaryOp::And => Type::Pointer(Box::new(xty)),
                    ast::UnaryOp::Recv => match self.underlying(&xty) {
                        Type::Chan(_, elem) => *elem,
                        _ => Type::Invalid,
                    },
                    ast::UnaryOp::Not => Type::Basic(Basic::Bool),
                    _ => xty,
                }
            }
            ast::ExprKind::Binary { op, x, y } => {
                let xty = self.type_of_expr(file, x);
                self.type_of_expr(file, y);
                match op {
                    ast::BinaryOp::Eq
                    | ast::BinaryOp::NotEq
                    | ast::BinaryOp::Lt
                    | ast::BinaryOp::Lte
                    | ast::BinaryOp::Gt
                    | ast::BinaryOp::Gte
                    | ast::BinaryOp::LogicalAnd
                    | ast::BinaryOp::LogicalOr => Type::Basic(Basic::UntypedBool),
                    _ => xty,
                }
            }
            ast::ExprKind::TypeInExpr(ty) => self.resolve_type_expr(file, ty),
            ast::ExprKind::Bad => Type::Invalid,
        }
    }

    fn type_of_selector(
        &mut self,
        file: FileId,
        whole: &ast::Expr,
        x: &ast::Expr,
        sel: &ast::Ident,
    ) -> Type {
        // Package member: `fmt.Println`.
        if let ast::ExprKind::Ident(pkg_name) = &x.kind {
            if self.lookup_local_shadow(pkg_name).is_none() {
                if let Some(binding) = self.imported_package(file, pkg_name) {
                    match binding {
                        ImportBinding::Resolved(pkg) => {
                            let pkg = pkg.clone();
                            if let Some(obj) = self.import_object(file, pkg_name) {
                                self.record_use(file, &x.span, obj);
                            }
                            match pkg.scope.get(&sel.name) {
                                Some(member) => {
                                    self.record_use(file, &sel.span, member.clone());
                                    return member.reference_type();
                                }
                                None => {
                                    if !sel.name.is_empty() {
                                        self.error(
                                            file,
                                            &sel.span,
                                            format!("undefined: {}.{}", pkg_name, sel.name),
                                        );
                                    }
                                    return Type::Invalid;
                                }
                            }
                        }
                        ImportBinding::FakeC | ImportBinding::Failed => return Type::Invalid,
                    }
                }
            }
        }
        let xty = self.type_of_expr(file, x);
        if xty.is_invalid() {
            return Type::Invalid;
        }
        match self.member(&xty, &sel.name) {
            Some(obj) => {
                self.record_use(file, &sel.span, obj.clone());
                obj.reference_type()
            }
            None => {
                if !sel.name.is_empty() {
                    let shown = xty.type_string(&self.pkg_name);
                    self.error(
                        file,
                        &whole.span,
                        format!("{} undefined (type {} has no field or method {})",
                            sel.name, shown, sel.name),
                    );
                }
                Type::Invalid
            }
        }
    }

    fn type_of_call(&mut self, file: FileId, fun: &ast::Expr, args: &[ast::Expr]) -> Type {
        // Builtins first: their argument handling is special.
        if let ast::ExprKind::Ident(name) = &fun.kind {
            if self.lookup_local_shadow(name).is_none() && !self.scope.contains_key(name.as_str())
            {
                if let Some(builtin) = builtin_object(name) {
                    self.record_use(file, &fun.span, builtin);
                    return self.type_of_builtin_call(file, name, args);
                }
            }
        }
        let fty = self.type_of_expr(file, fun);
        for arg in args {
            self.type_of_expr(file, arg);
        }
        // Conversion: T(x) where the callee names a type.
        if is_type_reference(fun, self) {
            return fty;
        }
        match self.underlying(&fty) {
            Type::Func(sig) => match sig.results.len() {
                0 => Type::Invalid,
                1 => sig.results[0].clone(),
                _ => Type::Tuple(sig.results.clone()),
            },
            _ => {
                if !fty.is_invalid() {
                    // Conversions through named basic types land here too.
                    return fty;
                }
                Type::Invalid
            }
        }
    }

    fn type_of_builtin_call(&mut self, file: FileId, name: &str, args: &[ast::Expr]) -> Type {
        let arg_types: Vec<Type> = args.iter().map(|a| self.type_of_expr(file, a)).collect();
        match name {
            "len" | "cap" | "copy" => Type::Basic(Basic::Int),
            "new" => Type::Pointer(Box::new(
                arg_types.first().cloned().unwrap_or(Type::Invalid),
            )),
            "make" => arg_types.first().cloned().unwrap_or(Type::Invalid),
            "append" => arg_types.first().cloned().unwrap_or(Type::Invalid),
            "delete" | "close" | "panic" | "print" | "println" => Type::Invalid,
            "recover" => Type::Interface(Vec::new()),
            "complex" => Type::Basic(Basic::Complex128),
            "real" | "imag" => Type::Basic(Basic::Float64),
            _ => Type::Invalid,
        }
    }

    fn lookup_local_shadow(&self, name: &str) -> Option<&Object> {
        for scope in self.locals.iter().rev() {
            if let Some(obj) = scope.get(name) {
                return Some(obj);
            }
        }
        None
    }

    // ---- bodies ----

    fn check_bodies(&mut self, files: &[(FileId, &ast::File)]) {
        for (file_id, file) in files {
            self.current_file = *file_id;
            for decl in &file.decls {
                let f = match decl {
                    ast::Decl::Func(f) => f,
                    _ => continue,
                };
                let body = match &f.body {
                    Some(b) => b,
                    None => continue,
                };
                self.locals.push(HashMap::new());
                if let Some(recv) = &f.recv {
                    let rty = self.resolve_type_expr(*file_id, &recv.ty);
                    for name in &recv.names {
                        self.declare_value(*file_id, name, ObjKind::Var, rty.clone(), false);
                    }
                }
                self.declare_sig_params(*file_id, &f.sig);
                self.walk_block(*file_id, body);
                self.pop_scope(*file_id, &f.span);
            }
        }
    }

    fn declare_sig_params(&mut self, file: FileId, sig: &ast::FuncSig) {
        for (gi, p) in sig.params.iter().enumerate() {
            let mut ty = self.resolve_type_expr(file, &p.ty);
            if sig.variadic && gi == sig.params.len() - 1 {
                ty = Type::Slice(Box::new(ty));
            }
            for name in &p.names {
                self.declare_value(file, name, ObjKind::Var, ty.clone(), false);
            }
        }
        for r in &sig.results {
            let ty = self.resolve_type_expr(file, &r.ty);
            for name in &r.names {
                self.declare_value(file, name, ObjKind::Var, ty.clone(), false);
            }
        }
    }

    fn pop_scope(&mut self, file: FileId, span: &ast::Span) {
        if let Some(scope) = self.locals.pop() {
            if !scope.is_empty() {
                self.info.scopes.push(ScopeRec {
                    file,
                    start: span.start,
                    end: span.end,
                    objects: scope.into_values().collect(),
                });
            }
        }
    }

    fn walk_block(&mut self, file: FileId, block: &ast::Block) {
        self.locals.push(HashMap::new());
        for stmt in &block.stmts {
            self.walk_stmt(file, stmt);
        }
        self.pop_scope(file, &block.span);
    }

    fn walk_stmt(&mut self, file: FileId, stmt: &ast::Stmt) {
        match stmt {
            ast::Stmt::Decl(decl) => match decl {
                ast::Decl::Const(specs) => self.declare_consts(file, specs, false),
                ast::Decl::Var(specs) => self.declare_vars(file, specs, false),
                ast::Decl::Type(specs) => {
                    for spec in specs {
                        let under = self.resolve_type_expr(file, &spec.ty);
                        let obj = Object {
                            name: spec.name.name.clone(),
                            kind: ObjKind::TypeName,
                            ty: under,
                            pkg_path: String::new(),
                            pkg_name: String::new(),
                            file: Some(file),
                            span: Some(spec.name.span.clone()),
                        };
                        self.record_def(file, &spec.name.span, obj.clone());
                        if let Some(top) = self.locals.last_mut() {
                            top.insert(spec.name.name.clone(), obj);
                        }
                    }
                }
                ast::Decl::Func(_) => {}
            },
            ast::Stmt::Expr(e) => {
                self.type_of_expr(file, e);
            }
            ast::Stmt::Send { chan, value, .. } => {
                self.type_of_expr(file, chan);
                self.type_of_expr(file, value);
            }
            ast::Stmt::IncDec { expr, .. } => {
                self.type_of_expr(file, expr);
            }
            ast::Stmt::Assign {
                lhs, rhs, define, ..
            } => self.walk_assign(file, lhs, rhs, *define),
            ast::Stmt::Return { results, .. } => {
                for r in results {
                    self.type_of_expr(file, r);
                }
            }
            ast::Stmt::Branch { .. } | ast::Stmt::Empty | ast::Stmt::Bad(_) => {}
            ast::Stmt::Block(b) => self.walk_block(file, b),
            ast::Stmt::If {
                init,
                cond,
                then,
                els,
                span,
            } => {
                self.locals.push(HashMap::new());
                if let Some(init) = init {
                    self.walk_stmt(file, init);
                }
                self.type_of_expr(file, cond);
                self.walk_block(file, then);
                if let Some(els) = els {
                    self.walk_stmt(file, els);
                }
                self.pop_scope(file, span);
            }
            ast::Stmt::Switch {
                init,
                tag,
                type_switch,
                cases,
                span,
            } => {
                self.locals.push(HashMap::new());
                if let Some(init) = init {
                    self.walk_stmt(file, init);
                }
                if let Some(tag) = tag {
                    self.type_of_expr(file, tag);
                }
                if let Some(guard) = type_switch {
                    self.type_of_expr(file, &guard.x);
                }
                for case in cases {
                    self.locals.push(HashMap::new());
                    for e in &case.exprs {
                        self.type_of_expr(file, e);
                    }
                    let mut bind_ty = Type::Invalid;
                    for t in &case.types {
                        bind_ty = self.resolve_type_expr(file, t);
                    }
                    if let Some(guard) = type_switch {
                        if let Some(bind) = &guard.bind {
                            // Multiple case types leave the binding as the
                            // guard expression's interface type.
                            let ty = if case.types.len() == 1 {
                                bind_ty
                            } else {
                                self.type_of_expr(file, &guard.x)
                            };
                            self.declare_value(file, bind, ObjKind::Var, ty, false);
                        }
                    }
                    for s in &case.body {
                        self.walk_stmt(file, s);
                    }
                    self.pop_scope(file, &case.span);
                }
                self.pop_scope(file, span);
            }
            ast::Stmt::Select { cases, .. } => {
                for case in cases {
                    self.locals.push(HashMap::new());
                    if let Some(comm) = &case.comm {
                        self.walk_stmt(file, comm);
                    }
                    for s in &case.body {
                        self.walk_stmt(file, s);
                    }
                    self.pop_scope(file, &case.span);
                }
            }
            ast::Stmt::For {
                init,
                cond,
                post,
                body,
                span,
            } => {
                self.locals.push(HashMap::new());
                if let Some(init) = init {
                    self.walk_stmt(file, init);
                }
                if let Some(cond) = cond {
                    self.type_of_expr(file, cond);
                }
                if let Some(post) = post {
                    self.walk_stmt(file, post);
                }
                self.walk_block(file, body);
                self.pop_scope(file, span);
            }
            ast::Stmt::Range {
                key,
                value,
                define,
                x,
                body,
                span,
            } => {
                self.locals.push(HashMap::new());
                let xty = self.type_of_expr(file, x);
                let (kty, vty) = self.range_types(&xty);
                if *define {
                    if let Some(k) = key {
                        self.define_from_expr(file, k, kty);
                    }
                    if let Some(v) = value {
                        self.define_from_expr(file, v, vty);
                    }
                } else {
                    for e in [key, value].into_iter().flatten() {
                        self.type_of_expr(file, e);
                    }
                }
                self.walk_block(file, body);
                self.pop_scope(file, span);
            }
            ast::Stmt::Go { call, .. } | ast::Stmt::Defer { call, .. } => {
                self.type_of_expr(file, call);
            }
            ast::Stmt::Labeled { stmt, .. } => self.walk_stmt(file, stmt),
        }
        // Func literal bodies are walked where they appear.
        self.walk_func_lits(file, stmt);
    }

    fn walk_func_lits(&mut self, file: FileId, stmt: &ast::Stmt) {
        let mut lits: Vec<(ast::FuncSig, ast::Block)> = Vec::new();
        collect_func_lits_stmt(stmt, &mut lits);
        for (sig, body) in lits {
            self.locals.push(HashMap::new());
            self.declare_sig_params(file, &sig);
            self.walk_block(file, &body);
            self.pop_scope(file, &body.span);
        }
    }

    fn walk_assign(
        &mut self,
        file: FileId,
        lhs: &[ast::Expr],
        rhs: &[ast::Expr],
        define: bool,
    ) {
        let mut rhs_types: Vec<Type> = Vec::new();
        for r in rhs {
            let t = self.type_of_expr(file, r);
            match t {
                Type::Tuple(items) if rhs.len() == 1 => rhs_types.extend(items),
                other => rhs_types.push(other),
            }
        }
        // `v, ok :=` forms add an untyped bool.
        if rhs.len() == 1 && lhs.len() == 2 && rhs_types.len() == 1 {
            if matches!(
                rhs[0].kind,
                ast::ExprKind::TypeAssert { .. }
                    | ast::ExprKind::Index { .. }
                    | ast::ExprKind::Unary {
                        op: ast::UnaryOp::Recv,
                        ..
                    }
            ) {
                rhs_types.push(Type::Basic(Basic::Bool));
            }
        }
        for (i, l) in lhs.iter().enumerate() {
            let ty = rhs_types.get(i).cloned().unwrap_or(Type::Invalid).defaulted();
            if define {
                self.define_from_expr(file, l, ty);
            } else {
                self.type_of_expr(file, l);
            }
        }
    }

    fn define_from_expr(&mut self, file: FileId, expr: &ast::Expr, ty: Type) {
        match &expr.kind {
            ast::ExprKind::Ident(name) => {
                // Redefinition in `:=` with a name already in this scope is a
                // plain assignment; keep the definition anyway for lookup.
                let ident = ast::Ident {
                    name: name.clone(),
                    span: expr.span.clone(),
                };
                self.declare_value(file, &ident, ObjKind::Var, ty, false);
            }
            _ => {
                self.type_of_expr(file, expr);
            }
        }
    }

    fn range_types(&mut self, xty: &Type) -> (Type, Type) {
        match self.underlying(xty) {
            Type::Slice(elem) => (Type::Basic(Basic::Int), *elem),
            Type::Array(_, elem) => (Type::Basic(Basic::Int), *elem),
            Type::Pointer(inner) => match self.underlying(&inner) {
                Type::Array(_, elem) => (Type::Basic(Basic::Int), *elem),
                _ => (Type::Invalid, Type::Invalid),
            },
            Type::Map(k, v) => (*k, *v),
            Type::Chan(_, elem) => (*elem, Type::Invalid),
            Type::Basic(Basic::Str | Basic::UntypedString) => {
                (Type::Basic(Basic::Int), Type::Basic(Basic::Int32))
            }
            _ => (Type::Invalid, Type::Invalid),
        }
    }

    fn record_def(&mut self, file: FileId, span: &ast::Span, obj: Object) {
        self.info.defs.insert((file, span.start, span.end), obj);
    }

    fn record_use(&mut self, file: FileId, span: &ast::Span, obj: Object) {
        self.info.uses.insert((file, span.start, span.end), obj);
    }
}

/// Resolution environment for member and underlying-type lookups. The checker
/// implements it against its in-progress scope; queries implement it against a
/// finished TypedPackage plus the cache importer.
pub trait MemberEnv {
    fn local_path(&self) -> &str;
    fn local_underlying(&self, name: &str) -> Option<Type>;
    fn local_methods(&self, type_name: &str) -> Vec<Object>;
    fn import_pkg(&mut self, path: &str) -> Option<Arc<TypedPackage>>;
}

impl<'a> MemberEnv for Checker<'a> {
    fn local_path(&self) -> &str {
        &self.path
    }

    fn local_underlying(&self, name: &str) -> Option<Type> {
        if let Some(Some(t)) = self.type_underlyings.get(name) {
            return Some(t.clone());
        }
        self.scope
            .get(name)
            .filter(|o| o.kind == ObjKind::TypeName)
            .map(|o| o.ty.clone())
    }

    fn local_methods(&self, type_name: &str) -> Vec<Object> {
        self.methods.get(type_name).cloned().unwrap_or_default()
    }

    fn import_pkg(&mut self, path: &str) -> Option<Arc<TypedPackage>> {
        self.importer.import(path)
    }
}

/// MemberEnv over a published TypedPackage; what the query layer uses after
/// checking finishes.
pub struct PkgView<'a> {
    pub pkg: &'a TypedPackage,
    pub importer: &'a mut dyn Importer,
}

impl<'a> MemberEnv for PkgView<'a> {
    fn local_path(&self) -> &str {
        &self.pkg.path
    }

    fn local_underlying(&self, name: &str) -> Option<Type> {
        self.pkg
            .scope
            .get(name)
            .filter(|o| o.kind == ObjKind::TypeName)
            .map(|o| o.ty.clone())
    }

    fn local_methods(&self, type_name: &str) -> Vec<Object> {
        self.pkg
            .methods
            .get(type_name)
            .cloned()
            .unwrap_or_default()
    }

    fn import_pkg(&mut self, path: &str) -> Option<Arc<TypedPackage>> {
        self.importer.import(path)
    }
}

fn named_underlying(env: &mut dyn MemberEnv, named: &Named) -> Option<Type> {
    if named.pkg_path == env.local_path() {
        return env.local_underlying(&named.name);
    }
    let pkg = env.import_pkg(&named.pkg_path)?;
    pkg.scope
        .get(&named.name)
        .filter(|o| o.kind == ObjKind::TypeName)
        .map(|o| o.ty.clone())
}

fn methods_for(env: &mut dyn MemberEnv, named: &Named) -> Vec<Object> {
    if named.pkg_path == env.local_path() {
        return env.local_methods(&named.name);
    }
    match env.import_pkg(&named.pkg_path) {
        Some(pkg) => pkg.methods.get(&named.name).cloned().unwrap_or_default(),
        None => Vec::new(),
    }
}

/// Resolve through defined types to the structural type, bounded against
/// self-referential declarations.
pub fn underlying_of(env: &mut dyn MemberEnv, ty: &Type) -> Type {
    let mut current = ty.clone();
    for _ in 0..32 {
        match current {
            Type::Named(named) => match named_underlying(env, &named) {
                Some(next) => current = next,
                None => return Type::Invalid,
            },
            other => return other,
        }
    }
    Type::Invalid
}

pub fn member_of(env: &mut dyn MemberEnv, ty: &Type, name: &str) -> Option<Object> {
    members_of(env, ty).into_iter().find(|o| o.name == name)
}

/// Fields and methods reachable from a value of `ty`: methods of the named
/// type, fields of the underlying struct, embedded members flattened, bounded
/// against cyclic embedding.
pub fn members_of(env: &mut dyn MemberEnv, ty: &Type) -> Vec<Object> {
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    collect_members(env, ty, &mut out, &mut seen, 0);
    out
}

fn collect_members(
    env: &mut dyn MemberEnv,
    ty: &Type,
    out: &mut Vec<Object>,
    seen: &mut std::collections::HashSet<String>,
    depth: usize,
) {
    if depth > 4 {
        return;
    }
    let base = ty.deref_once().clone();
    if let Type::Named(named) = &base {
        let key = format!("{}.{}", named.pkg_path, named.name);
        if !seen.insert(key) {
            return;
        }
        for m in methods_for(env, named) {
            out.push(m);
        }
        if let Some(under) = named_underlying(env, named) {
            collect_members(env, &under, out, seen, depth + 1);
        }
        return;
    }
    match &base {
        Type::Struct(fields) => {
            for f in fields {
                out.push(Object {
                    name: f.name.clone(),
                    kind: ObjKind::Var,
                    ty: f.ty.clone(),
                    pkg_path: String::new(),
                    pkg_name: String::new(),
                    file: None,
                    span: None,
                });
                if f.embedded {
                    let fty = f.ty.clone();
                    collect_members(env, &fty, out, seen, depth + 1);
                }
            }
        }
        Type::Interface(methods) => {
            for m in methods {
                out.push(Object {
                    name: m.name.clone(),
                    kind: ObjKind::Func,
                    ty: Type::Func(Box::new(m.sig.clone())),
                    pkg_path: String::new(),
                    pkg_name: String::new(),
                    file: None,
                    span: None,
                });
            }
        }
        _ => {}
    }
}

fn is_type_reference(expr: &ast::Expr, checker: &Checker) -> bool {
    match &expr.kind {
        ast::ExprKind::Ident(name) => {
            if checker.lookup_local_shadow(name).is_some() {
                return false;
            }
            if let Some(obj) = checker.scope.get(name) {
                return obj.kind == ObjKind::TypeName;
            }
            universe_objects()
                .get(name.as_str())
                .map(|o| o.kind == ObjKind::TypeName)
                .unwrap_or(false)
        }
        ast::ExprKind::TypeInExpr(_) => true,
        ast::ExprKind::Paren(inner) => is_type_reference(inner, checker),
        _ => false,
    }
}

fn const_len(expr: &ast::Expr) -> Option<u64> {
    match &expr.kind {
        ast::ExprKind::BasicLit {
            kind: ast::LitKind::Int,
            value,
        } => value.replace('_', "").parse().ok(),
        _ => None,
    }
}

fn embedded_field_name(ty: &ast::TypeExpr) -> String {
    match &ty.kind {
        ast::TypeExprKind::Named(n) => n.clone(),
        ast::TypeExprKind::Qualified(_, n) => n.clone(),
        ast::TypeExprKind::Pointer(inner) => embedded_field_name(inner),
        _ => String::new(),
    }
}

fn receiver_type_name(ty: &ast::TypeExpr) -> Option<String> {
    match &ty.kind {
        ast::TypeExprKind::Named(n) => Some(n.clone()),
        ast::TypeExprKind::Pointer(inner) => receiver_type_name(inner),
        ast::TypeExprKind::Paren(inner) => receiver_type_name(inner),
        _ => None,
    }
}

fn collect_func_lits_stmt(stmt: &ast::Stmt, out: &mut Vec<(ast::FuncSig, ast::Block)>) {
    match stmt {
        ast::Stmt::Expr(e)
        | ast::Stmt::IncDec { expr: e, .. }
        | ast::Stmt::Go { call: e, .. }
        | ast::Stmt::Defer { call: e, .. } => collect_func_lits_expr(e, out),
        ast::Stmt::Send { chan, value, .. } => {
            collect_func_lits_expr(chan, out);
            collect_func_lits_expr(value, out);
        }
        ast::Stmt::Assign { lhs, rhs, .. } => {
            for e in lhs.iter().chain(rhs) {
                collect_func_lits_expr(e, out);
            }
        }
        ast::Stmt::Return { results, .. } => {
            for e in results {
                collect_func_lits_expr(e, out);
            }
        }
        ast::Stmt::Decl(ast::Decl::Var(specs)) | ast::Stmt::Decl(ast::Decl::Const(specs)) => {
            for spec in specs {
                for e in &spec.values {
                    collect_func_lits_expr(e, out);
                }
            }
        }
        _ => {}
    }
}

fn collect_func_lits_expr(expr: &ast::Expr, out: &mut Vec<(ast::FuncSig, ast::Block)>) {
    match &expr.kind {
        ast::ExprKind::FuncLit { sig, body } => {
            out.push(((**sig).clone(), (**body).clone()));
        }
        ast::ExprKind::Paren(x) | ast::ExprKind::Star(x) => collect_func_lits_expr(x, out),
        ast::ExprKind::Unary { x, .. } => collect_func_lits_expr(x, out),
        ast::ExprKind::Binary { x, y, .. } => {
            collect_func_lits_expr(x, out);
            collect_func_lits_expr(y, out);
        }
        ast::ExprKind::Call { fun, args, .. } => {
            collect_func_lits_expr(fun, out);
            for a in args {
                collect_func_lits_expr(a, out);
            }
        }
        ast::ExprKind::Selector { x, .. }
        | ast::ExprKind::TypeAssert { x, .. } => collect_func_lits_expr(x, out),
        ast::ExprKind::Index { x, index } => {
            collect_func_lits_expr(x, out);
            collect_func_lits_expr(index, out);
        }
        ast::ExprKind::SliceExpr { x, low, high, max } => {
            collect_func_lits_expr(x, out);
            for part in [low, high, max].into_iter().flatten() {
                collect_func_lits_expr(part, out);
            }
        }
        ast::ExprKind::CompositeLit { elts, .. } => {
            for e in elts {
                collect_func_lits_expr(e, out);
            }
        }
        ast::ExprKind::KeyValue { key, value } => {
            collect_func_lits_expr(key, out);
            collect_func_lits_expr(value, out);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::fileset::FileSet;
    use crate::frontend::parser::{parse_source, ParseMode};

    fn check_one(src: &str) -> CheckResult {
        let (file, diags) = parse_source(src, ParseMode::Full);
        assert!(diags.is_empty(), "parse diagnostics: {:?}", diags.items);
        let file = file.expect("file");
        let mut fset = FileSet::new();
        let id = fset.add_file("test.go");
        check_package("test", &[(id, &file)], &mut NoImports, false)
    }

    #[test]
    fn collects_exported_function_signature() {
        let res = check_one("package a\n\nfunc F() int { return 1 }\n");
        let obj = res.pkg.scope.get("F").expect("F in scope");
        assert_eq!(obj.kind, ObjKind::Func);
        assert_eq!(obj.ty.type_string("a"), "func() int");
    }

    #[test]
    fn attaches_methods_to_receiver_type() {
        let res = check_one(
            "package a\n\ntype T struct{ N int }\n\nfunc (t *T) Get() int { return t.N }\n",
        );
        let methods = res.pkg.methods.get("T").expect("methods on T");
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].name, "Get");
        assert_eq!(methods[0].ty.type_string("a"), "func() int");
    }

    #[test]
    fn infers_var_types_from_initializers() {
        let res = check_one("package a\n\nvar N = 42\nvar S = \"hi\"\nvar F = 1.5\n");
        assert_eq!(res.pkg.scope["N"].ty, Type::Basic(Basic::Int));
        assert_eq!(res.pkg.scope["S"].ty, Type::Basic(Basic::Str));
        assert_eq!(res.pkg.scope["F"].ty, Type::Basic(Basic::Float64));
    }

    #[test]
    fn resolves_recursive_types_without_looping() {
        let res = check_one("package a\n\ntype List struct {\n\tNext *List\n\tVal int\n}\n");
        let obj = &res.pkg.scope["List"];
        assert_eq!(obj.kind, ObjKind::TypeName);
        match &obj.ty {
            Type::Struct(fields) => assert_eq!(fields.len(), 2),
            other => panic!("expected struct underlying, got {:?}", other),
        }
    }

    #[test]
    fn unresolved_import_reports_but_does_not_abort() {
        let res = check_one(
            "package a\n\nimport \"missing\"\n\nfunc F() int { return missing.X }\n",
        );
        assert!(res
            .errors
            .iter()
            .any(|e| e.message.contains("could not import missing")));
        assert!(res.pkg.scope.contains_key("F"));
    }

    #[test]
    fn body_walk_records_defs_and_uses() {
        let (file, _) = parse_source(
            "package a\n\nfunc F() int {\n\tx := 3\n\treturn x\n}\n",
            ParseMode::Full,
        );
        let file = file.unwrap();
        let mut fset = FileSet::new();
        let id = fset.add_file("test.go");
        let res = check_package("test", &[(id, &file)], &mut NoImports, true);
        let def = res
            .info
            .defs
            .values()
            .find(|o| o.name == "x")
            .expect("definition of x");
        assert_eq!(def.ty, Type::Basic(Basic::Int));
        assert!(res.info.uses.values().any(|o| o.name == "x"));
    }

    #[test]
    fn undefined_identifier_in_body_is_reported() {
        let (file, _) = parse_source(
            "package a\n\nfunc F() int {\n\treturn nothing\n}\n",
            ParseMode::Full,
        );
        let file = file.unwrap();
        let mut fset = FileSet::new();
        let id = fset.add_file("test.go");
        let res = check_package("test", &[(id, &file)], &mut NoImports, true);
        assert!(res
            .errors
            .iter()
            .any(|e| e.message == "undefined: nothing"));
    }
}
