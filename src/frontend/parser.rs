// Purpose: Parse token streams into syntax trees, tolerantly.
// Inputs/Outputs: Consumes lexed tokens; yields a File plus collected diagnostics.
// Invariants: A File is produced whenever the package clause parses; bad regions
//   become Bad nodes rather than aborting the file.
// Gotchas: Composite literals are disabled inside if/for/switch headers; the
//   parser re-synchronizes at semicolons and closing braces after an error.

use super::ast::*;
use super::diagnostic::Diagnostics;
use super::lexer::{Keyword, Lexer, Symbol, Token, TokenKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseMode {
    Full,
    PackageClauseOnly,
}

pub struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    pub diags: Diagnostics,
    allow_comp_lit: bool,
}

pub fn parse_source(src: &str, mode: ParseMode) -> (Option<File>, Diagnostics) {
    let tokens = Lexer::new(src).lex_all();
    let mut parser = Parser::new(tokens);
    let file = parser.parse_file(mode);
    (file, parser.diags)
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            idx: 0,
            diags: Diagnostics::default(),
            allow_comp_lit: true,
        }
    }

    pub fn parse_file(&mut self, mode: ParseMode) -> Option<File> {
        self.consume_semis();
        if !self.at_keyword(Keyword::Package) {
            self.error_here("expected 'package'");
            return None;
        }
        self.bump();
        let (package, package_span) = match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                let span = self.bump().span;
                (name, span)
            }
            _ => {
                self.error_here("expected package name");
                return None;
            }
        };
        let mut file = File {
            package,
            package_span,
            imports: Vec::new(),
            decls: Vec::new(),
        };
        if mode == ParseMode::PackageClauseOnly {
            return Some(file);
        }
        self.consume_semis();
        while self.at_keyword(Keyword::Import) {
            self.bump();
            if self.at_symbol(Symbol::LParen) {
                self.bump();
                self.consume_semis();
                while !self.at_symbol(Symbol::RParen) && !self.at_eof() {
                    if let Some(spec) = self.parse_import_spec() {
                        file.imports.push(spec);
                    } else {
                        self.sync_stmt();
                    }
                    self.consume_semis();
                }
                self.eat_symbol(Symbol::RParen);
            } else if let Some(spec) = self.parse_import_spec() {
                file.imports.push(spec);
            }
            self.consume_semis();
        }
        while !self.at_eof() {
            if self.at_symbol(Symbol::Semi) {
                self.bump();
                continue;
            }
            match self.parse_decl() {
                Some(decl) => file.decls.push(decl),
                None => self.sync_decl(),
            }
            self.consume_semis();
        }
        Some(file)
    }

    fn parse_import_spec(&mut self) -> Option<ImportSpec> {
        let name = match self.peek().kind.clone() {
            TokenKind::Ident(n) => {
                let span = self.bump().span;
                Some(Ident { name: n, span })
            }
            TokenKind::Symbol(Symbol::Dot) => {
                let span = self.bump().span;
                Some(Ident {
                    name: ".".to_string(),
                    span,
                })
            }
            _ => None,
        };
        match self.peek().kind.clone() {
            TokenKind::StringLit(path) => {
                let path_span = self.bump().span;
                Some(ImportSpec {
                    name,
                    path,
                    path_span,
                })
            }
            _ => {
                self.error_here("expected import path string");
                None
            }
        }
    }

    fn parse_decl(&mut self) -> Option<Decl> {
        match self.peek().kind {
            TokenKind::Keyword(Keyword::Func) => self.parse_func_decl().map(Decl::Func),
            TokenKind::Keyword(Keyword::Var) => {
                self.bump();
                Some(Decl::Var(self.parse_value_specs(true)))
            }
            TokenKind::Keyword(Keyword::Const) => {
                self.bump();
                Some(Decl::Const(self.parse_value_specs(false)))
            }
            TokenKind::Keyword(Keyword::Type) => {
                self.bump();
                Some(Decl::Type(self.parse_type_specs()))
            }
            _ => {
                self.error_here("expected declaration");
                None
            }
        }
    }

    fn parse_func_decl(&mut self) -> Option<FuncDecl> {
        let start = self.bump().span; // func
        let recv = if self.at_symbol(Symbol::LParen) {
            let (params, _) = self.parse_param_list();
            if params.len() > 1 {
                self.diags
                    .push("method has multiple receivers", Some(start.clone()));
            }
            params.into_iter().next()
        } else {
            None
        };
        let name = match self.peek().kind.clone() {
            TokenKind::Ident(n) => {
                let span = self.bump().span;
                Ident { name: n, span }
            }
            _ => {
                self.error_here("expected function name");
                return None;
            }
        };
        let sig = self.parse_signature();
        let body = if self.at_symbol(Symbol::LBrace) {
            Some(self.parse_block())
        } else {
            None
        };
        let end = body
            .as_ref()
            .map(|b| b.span.clone())
            .unwrap_or_else(|| name.span.clone());
        let span = join(&start, &end);
        Some(FuncDecl {
            recv,
            name,
            sig,
            body,
            span,
        })
    }

    fn parse_signature(&mut self) -> FuncSig {
        let (params, variadic) = if self.at_symbol(Symbol::LParen) {
            self.parse_param_list()
        } else {
            self.error_here("expected parameter list");
            (Vec::new(), false)
        };
        let results = self.parse_results();
        FuncSig {
            params,
            results,
            variadic,
        }
    }

    fn parse_results(&mut self) -> Vec<Param> {
        if self.at_symbol(Symbol::LParen) {
            let (params, _) = self.parse_param_list();
            params
        } else if self.at_type_start() && !self.at_symbol(Symbol::LBrace) {
            let ty = self.parse_type();
            vec![Param {
                names: Vec::new(),
                ty,
            }]
        } else {
            Vec::new()
        }
    }

    // Parses `( ... )`. Elements are either all named (`a, b T`) or all bare
    // types; bare idents stay undecided until a following type settles them.
    fn parse_param_list(&mut self) -> (Vec<Param>, bool) {
        self.eat_symbol(Symbol::LParen);
        let mut params = Vec::new();
        let mut pending: Vec<TypeExpr> = Vec::new();
        let mut variadic = false;
        loop {
            if self.at_symbol(Symbol::RParen) || self.at_eof() {
                break;
            }
            if self.at_symbol(Symbol::Ellipsis) {
                self.bump();
                variadic = true;
                let ty = self.parse_type();
                params.push(Param {
                    names: pending_to_names(&mut pending, &mut self.diags),
                    ty,
                });
                break;
            }
            let item = self.parse_type();
            if self.at_symbol(Symbol::Comma) {
                self.bump();
                pending.push(item);
                continue;
            }
            if self.at_symbol(Symbol::Ellipsis) {
                self.bump();
                variadic = true;
                pending.push(item);
                let ty = self.parse_type();
                params.push(Param {
                    names: pending_to_names(&mut pending, &mut self.diags),
                    ty,
                });
                break;
            }
            if self.at_type_start() {
                pending.push(item);
                let ty = self.parse_type();
                params.push(Param {
                    names: pending_to_names(&mut pending, &mut self.diags),
                    ty,
                });
                if self.at_symbol(Symbol::Comma) {
                    self.bump();
                }
                continue;
            }
            pending.push(item);
            break;
        }
        for ty in pending.drain(..) {
            params.push(Param {
                names: Vec::new(),
                ty,
            });
        }
        self.eat_symbol(Symbol::RParen);
        (params, variadic)
    }

    fn parse_value_specs(&mut self, is_var: bool) -> Vec<ValueSpec> {
        let mut specs = Vec::new();
        if self.at_symbol(Symbol::LParen) {
            self.bump();
            self.consume_semis();
            while !self.at_symbol(Symbol::RParen) && !self.at_eof() {
                if let Some(spec) = self.parse_value_spec(is_var) {
                    specs.push(spec);
                } else {
                    self.sync_stmt();
                }
                self.consume_semis();
            }
            self.eat_symbol(Symbol::RParen);
        } else if let Some(spec) = self.parse_value_spec(is_var) {
            specs.push(spec);
        }
        specs
    }

    fn parse_value_spec(&mut self, _is_var: bool) -> Option<ValueSpec> {
        let mut names = Vec::new();
        loop {
            match self.peek().kind.clone() {
                TokenKind::Ident(n) => {
                    let span = self.bump().span;
                    names.push(Ident { name: n, span });
                }
                _ => {
                    self.error_here("expected identifier");
                    return None;
                }
            }
            if self.at_symbol(Symbol::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        let ty = if !self.at_symbol(Symbol::Eq)
            && !self.at_symbol(Symbol::Semi)
            && !self.at_symbol(Symbol::RParen)
            && !self.at_eof()
        {
            Some(self.parse_type())
        } else {
            None
        };
        let mut values = Vec::new();
        if self.at_symbol(Symbol::Eq) {
            self.bump();
            values = self.parse_expr_list();
        }
        let start = names
            .first()
            .map(|n| n.span.clone())
            .unwrap_or_default();
        let end = values
            .last()
            .map(|v| v.span.clone())
            .or_else(|| ty.as_ref().map(|t| t.span.clone()))
            .unwrap_or_else(|| start.clone());
        Some(ValueSpec {
            names,
            ty,
            values,
            span: join(&start, &end),
        })
    }

    fn parse_type_specs(&mut self) -> Vec<TypeSpec> {
        let mut specs = Vec::new();
        if self.at_symbol(Symbol::LParen) {
            self.bump();
            self.consume_semis();
            while !self.at_symbol(Symbol::RParen) && !self.at_eof() {
                if let Some(spec) = self.parse_type_spec() {
                    specs.push(spec);
                } else {
                    self.sync_stmt();
                }
                self.consume_semis();
            }
            self.eat_symbol(Symbol::RParen);
        } else if let Some(spec) = self.parse_type_spec() {
            specs.push(spec);
        }
        specs
    }

    fn parse_type_spec(&mut self) -> Option<TypeSpec> {
        let name = match self.peek().kind.clone() {
            TokenKind::Ident(n) => {
                let span = self.bump().span;
                Ident { name: n, span }
            }
            _ => {
                self.error_here("expected type name");
                return None;
            }
        };
        let is_alias = if self.at_symbol(Symbol::Eq) {
            self.bump();
            true
        } else {
            false
        };
        let ty = self.parse_type();
        let span = join(&name.span, &ty.span);
        Some(TypeSpec {
            name,
            is_alias,
            ty,
            span,
        })
    }

    // ---- types ----

    fn at_type_start(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Ident(_)
                | TokenKind::Symbol(
                    Symbol::Star | Symbol::LBracket | Symbol::LParen | Symbol::Arrow
                )
                | TokenKind::Keyword(
                    Keyword::Map
                        | Keyword::Chan
                        | Keyword::Func
                        | Keyword::Interface
                        | Keyword::Struct
                )
        )
    }

    fn parse_type(&mut self) -> TypeExpr {
        let start = self.peek().span.clone();
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.bump();
                if self.at_symbol(Symbol::Dot) {
                    self.bump();
                    match self.peek().kind.clone() {
                        TokenKind::Ident(sel) => {
                            let end = self.bump().span;
                            TypeExpr {
                                kind: TypeExprKind::Qualified(name, sel),
                                span: join(&start, &end),
                            }
                        }
                        _ => {
                            self.error_here("expected identifier after '.'");
                            TypeExpr {
                                kind: TypeExprKind::Bad,
                                span: start,
                            }
                        }
                    }
                } else {
                    TypeExpr {
                        kind: TypeExprKind::Named(name),
                        span: start,
                    }
                }
            }
            TokenKind::Symbol(Symbol::Star) => {
                self.bump();
                let inner = self.parse_type();
                let span = join(&start, &inner.span);
                TypeExpr {
                    kind: TypeExprKind::Pointer(Box::new(inner)),
                    span,
                }
            }
            TokenKind::Symbol(Symbol::LBracket) => {
                self.bump();
                if self.at_symbol(Symbol::RBracket) {
                    self.bump();
                    let inner = self.parse_type();
                    let span = join(&start, &inner.span);
                    TypeExpr {
                        kind: TypeExprKind::Slice(Box::new(inner)),
                        span,
                    }
                } else {
                    let len = if self.at_symbol(Symbol::Ellipsis) {
                        self.bump();
                        None
                    } else {
                        Some(Box::new(self.parse_expr()))
                    };
                    self.eat_symbol(Symbol::RBracket);
                    let inner = self.parse_type();
                    let span = join(&start, &inner.span);
                    TypeExpr {
                        kind: TypeExprKind::Array(len, Box::new(inner)),
                        span,
                    }
                }
            }
            TokenKind::Keyword(Keyword::Map) => {
                self.bump();
                self.eat_symbol(Symbol::LBracket);
                let key = self.parse_type();
                self.eat_symbol(Symbol::RBracket);
                let value = self.parse_type();
                let span = join(&start, &value.span);
                TypeExpr {
                    kind: TypeExprKind::Map(Box::new(key), Box::new(value)),
                    span,
                }
            }
            TokenKind::Keyword(Keyword::Chan) => {
                self.bump();
                let dir = if self.at_symbol(Symbol::Arrow) {
                    self.bump();
                    ChanDir::Send
                } else {
                    ChanDir::Both
                };
                let inner = self.parse_type();
                let span = join(&start, &inner.span);
                TypeExpr {
                    kind: TypeExprKind::Chan(dir, Box::new(inner)),
                    span,
                }
            }
            TokenKind::Symbol(Symbol::Arrow) => {
                self.bump();
                if self.at_keyword(Keyword::Chan) {
                    self.bump();
                } else {
                    self.error_here("expected 'chan' after '<-'");
                }
                let inner = self.parse_type();
                let span = join(&start, &inner.span);
                TypeExpr {
                    kind: TypeExprKind::Chan(ChanDir::Recv, Box::new(inner)),
                    span,
                }
            }
            TokenKind::Keyword(Keyword::Func) => {
                self.bump();
                let sig = self.parse_signature();
                let end = self.prev_span();
                TypeExpr {
                    kind: TypeExprKind::Func(Box::new(sig)),
                    span: join(&start, &end),
                }
            }
            TokenKind::Keyword(Keyword::Struct) => {
                self.bump();
                let fields = self.parse_struct_fields();
                let end = self.prev_span();
                TypeExpr {
                    kind: TypeExprKind::Struct(fields),
                    span: join(&start, &end),
                }
            }
            TokenKind::Keyword(Keyword::Interface) => {
                self.bump();
                let elems = self.parse_interface_elems();
                let end = self.prev_span();
                TypeExpr {
                    kind: TypeExprKind::Interface(elems),
                    span: join(&start, &end),
                }
            }
            TokenKind::Symbol(Symbol::LParen) => {
                self.bump();
                let inner = self.parse_type();
                self.eat_symbol(Symbol::RParen);
                let end = self.prev_span();
                TypeExpr {
                    kind: TypeExprKind::Paren(Box::new(inner)),
                    span: join(&start, &end),
                }
            }
            _ => {
                self.error_here("expected type");
                TypeExpr {
                    kind: TypeExprKind::Bad,
                    span: start,
                }
            }
        }
    }

    fn parse_struct_fields(&mut self) -> Vec<StructField> {
        let mut fields = Vec::new();
        if !self.eat_symbol(Symbol::LBrace) {
            return fields;
        }
        self.consume_semis();
        while !self.at_symbol(Symbol::RBrace) && !self.at_eof() {
            if let Some(field) = self.parse_struct_field() {
                fields.push(field);
            } else {
                self.sync_stmt();
            }
            self.consume_semis();
        }
        self.eat_symbol(Symbol::RBrace);
        fields
    }

    fn parse_struct_field(&mut self) -> Option<StructField> {
        // Embedded: `Name`, `pkg.Name`, or `*Name` with no following type.
        if self.at_symbol(Symbol::Star) {
            let ty = self.parse_type();
            let tag = self.parse_field_tag();
            return Some(StructField {
                names: Vec::new(),
                ty,
                embedded: true,
                tag,
            });
        }
        let mut names = Vec::new();
        loop {
            match self.peek().kind.clone() {
                TokenKind::Ident(n) => {
                    let span = self.bump().span;
                    names.push(Ident { name: n, span });
                }
                _ => {
                    self.error_here("expected field name");
                    return None;
                }
            }
            if self.at_symbol(Symbol::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        if names.len() == 1 {
            // One ident followed by `.Sel`, a tag, or the end of the field is
            // an embedded type, not a named field.
            if self.at_symbol(Symbol::Dot) {
                self.bump();
                let sel = match self.peek().kind.clone() {
                    TokenKind::Ident(s) => {
                        let end = self.bump().span;
                        let first = names.remove(0);
                        TypeExpr {
                            span: join(&first.span, &end),
                            kind: TypeExprKind::Qualified(first.name, s),
                        }
                    }
                    _ => {
                        self.error_here("expected identifier after '.'");
                        return None;
                    }
                };
                let tag = self.parse_field_tag();
                return Some(StructField {
                    names: Vec::new(),
                    ty: sel,
                    embedded: true,
                    tag,
                });
            }
            if !self.at_type_start() {
                let first = names.remove(0);
                let tag = self.parse_field_tag();
                return Some(StructField {
                    names: Vec::new(),
                    ty: TypeExpr {
                        span: first.span.clone(),
                        kind: TypeExprKind::Named(first.name),
                    },
                    embedded: true,
                    tag,
                });
            }
        }
        let ty = self.parse_type();
        let tag = self.parse_field_tag();
        Some(StructField {
            names,
            ty,
            embedded: false,
            tag,
        })
    }

    fn parse_field_tag(&mut self) -> Option<String> {
        if let TokenKind::StringLit(tag) = self.peek().kind.clone() {
            self.bump();
            Some(tag)
        } else {
            None
        }
    }

    fn parse_interface_elems(&mut self) -> Vec<InterfaceElem> {
        let mut elems = Vec::new();
        if !self.eat_symbol(Symbol::LBrace) {
            return elems;
        }
        self.consume_semis();
        while !self.at_symbol(Symbol::RBrace) && !self.at_eof() {
            match self.peek().kind.clone() {
                TokenKind::Ident(name) => {
                    let span = self.bump().span;
                    if self.at_symbol(Symbol::LParen) {
                        let sig = self.parse_signature();
                        elems.push(InterfaceElem::Method {
                            name: Ident { name, span },
                            sig,
                        });
                    } else if self.at_symbol(Symbol::Dot) {
                        self.bump();
                        match self.peek().kind.clone() {
                            TokenKind::Ident(sel) => {
                                let end = self.bump().span;
                                elems.push(InterfaceElem::Embedded(TypeExpr {
                                    span: join(&span, &end),
                                    kind: TypeExprKind::Qualified(name, sel),
                                }));
                            }
                            _ => self.error_here("expected identifier after '.'"),
                        }
                    } else {
                        elems.push(InterfaceElem::Embedded(TypeExpr {
                            span: span.clone(),
                            kind: TypeExprKind::Named(name),
                        }));
                    }
                }
                _ => {
                    self.error_here("expected method or embedded interface");
                    self.sync_stmt();
                }
            }
            self.consume_semis();
        }
        self.eat_symbol(Symbol::RBrace);
        elems
    }

    // ---- statements ----

    fn parse_block(&mut self) -> Block {
        let start = self.peek().span.clone();
        self.eat_symbol(Symbol::LBrace);
        let mut stmts = Vec::new();
        self.consume_semis();
        while !self.at_symbol(Symbol::RBrace) && !self.at_eof() {
            stmts.push(self.parse_stmt());
            self.consume_semis();
        }
        self.eat_symbol(Symbol::RBrace);
        let end = self.prev_span();
        Block {
            stmts,
            span: join(&start, &end),
        }
    }

    fn parse_stmt(&mut self) -> Stmt {
        let start = self.peek().span.clone();
        match self.peek().kind.clone() {
            TokenKind::Keyword(Keyword::Var | Keyword::Const | Keyword::Type) => {
                match self.parse_decl() {
                    Some(decl) => Stmt::Decl(decl),
                    None => {
                        self.sync_stmt();
                        Stmt::Bad(start)
                    }
                }
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.bump();
                let results = if self.at_symbol(Symbol::Semi)
                    || self.at_symbol(Symbol::RBrace)
                    || self.at_eof()
                {
                    Vec::new()
                } else {
                    self.parse_expr_list()
                };
                let end = self.prev_span();
                Stmt::Return {
                    results,
                    span: join(&start, &end),
                }
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if_stmt(),
            TokenKind::Keyword(Keyword::For) => self.parse_for_stmt(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch_stmt(),
            TokenKind::Keyword(Keyword::Select) => self.parse_select_stmt(),
            TokenKind::Keyword(Keyword::Go) => {
                self.bump();
                let call = self.parse_expr();
                let span = join(&start, &call.span);
                Stmt::Go { call, span }
            }
            TokenKind::Keyword(Keyword::Defer) => {
                self.bump();
                let call = self.parse_expr();
                let span = join(&start, &call.span);
                Stmt::Defer { call, span }
            }
            TokenKind::Keyword(Keyword::Break) => self.parse_branch(BranchKind::Break),
            TokenKind::Keyword(Keyword::Continue) => self.parse_branch(BranchKind::Continue),
            TokenKind::Keyword(Keyword::Goto) => self.parse_branch(BranchKind::Goto),
            TokenKind::Keyword(Keyword::Fallthrough) => {
                let span = self.bump().span;
                Stmt::Branch {
                    kind: BranchKind::Fallthrough,
                    label: None,
                    span,
                }
            }
            TokenKind::Symbol(Symbol::LBrace) => Stmt::Block(self.parse_block()),
            TokenKind::Symbol(Symbol::Semi) => {
                self.bump();
                Stmt::Empty
            }
            _ => {
                let stmt = self.parse_simple_stmt(false);
                // Labels: `name:` followed by a statement.
                if let Stmt::Expr(expr) = &stmt {
                    if let ExprKind::Ident(name) = &expr.kind {
                        if self.at_symbol(Symbol::Colon) {
                            self.bump();
                            let label = Ident {
                                name: name.clone(),
                                span: expr.span.clone(),
                            };
                            self.consume_semis();
                            let inner = if self.at_symbol(Symbol::RBrace) || self.at_eof() {
                                Stmt::Empty
                            } else {
                                self.parse_stmt()
                            };
                            return Stmt::Labeled {
                                label,
                                stmt: Box::new(inner),
                            };
                        }
                    }
                }
                stmt
            }
        }
    }

    fn parse_branch(&mut self, kind: BranchKind) -> Stmt {
        let start = self.bump().span;
        let label = match self.peek().kind.clone() {
            TokenKind::Ident(n) => {
                let span = self.bump().span;
                Some(Ident { name: n, span })
            }
            _ => None,
        };
        let end = label
            .as_ref()
            .map(|l| l.span.clone())
            .unwrap_or_else(|| start.clone());
        Stmt::Branch {
            kind,
            label,
            span: join(&start, &end),
        }
    }

    // Simple statements: expression, send, inc/dec, assignment, short decl.
    // `in_header` additionally recognizes `range` on the right-hand side and
    // returns it wrapped in a Range for the for-statement parser to unpack.
    fn parse_simple_stmt(&mut self, in_header: bool) -> Stmt {
        let start = self.peek().span.clone();
        let lhs = self.parse_expr_list();
        let op = self.peek().kind.clone();
        match op {
            TokenKind::Symbol(Symbol::Define | Symbol::Eq) => {
                let define = matches!(op, TokenKind::Symbol(Symbol::Define));
                self.bump();
                if in_header && self.at_keyword(Keyword::Range) {
                    self.bump();
                    let x = self.parse_expr();
                    let span = join(&start, &x.span);
                    let mut it = lhs.into_iter();
                    return Stmt::Range {
                        key: it.next(),
                        value: it.next(),
                        define,
                        x,
                        body: Block {
                            stmts: Vec::new(),
                            span: Span::default(),
                        },
                        span,
                    };
                }
                let rhs = self.parse_expr_list();
                let end = rhs
                    .last()
                    .map(|e| e.span.clone())
                    .unwrap_or_else(|| start.clone());
                Stmt::Assign {
                    lhs,
                    rhs,
                    define,
                    span: join(&start, &end),
                }
            }
            TokenKind::Symbol(
                Symbol::PlusEq
                | Symbol::MinusEq
                | Symbol::StarEq
                | Symbol::SlashEq
                | Symbol::PercentEq
                | Symbol::AmpEq
                | Symbol::PipeEq
                | Symbol::CaretEq
                | Symbol::AndNotEq
                | Symbol::ShlEq
                | Symbol::ShrEq,
            ) => {
                self.bump();
                let rhs = self.parse_expr_list();
                let end = rhs
                    .last()
                    .map(|e| e.span.clone())
                    .unwrap_or_else(|| start.clone());
                Stmt::Assign {
                    lhs,
                    rhs,
                    define: false,
                    span: join(&start, &end),
                }
            }
            TokenKind::Symbol(Symbol::Arrow) => {
                self.bump();
                let value = self.parse_expr();
                let chan = lhs.into_iter().next().unwrap_or(Expr {
                    kind: ExprKind::Bad,
                    span: start.clone(),
                });
                let span = join(&start, &value.span);
                Stmt::Send { chan, value, span }
            }
            TokenKind::Symbol(Symbol::Inc | Symbol::Dec) => {
                let end = self.bump().span;
                let expr = lhs.into_iter().next().unwrap_or(Expr {
                    kind: ExprKind::Bad,
                    span: start.clone(),
                });
                Stmt::IncDec {
                    expr,
                    span: join(&start, &end),
                }
            }
            _ => {
                let mut it = lhs.into_iter();
                let first = it.next().unwrap_or(Expr {
                    kind: ExprKind::Bad,
                    span: start,
                });
                if it.next().is_some() {
                    self.error_here("expected assignment after expression list");
                }
                Stmt::Expr(first)
            }
        }
    }

    fn parse_if_stmt(&mut self) -> Stmt {
        let start = self.bump().span; // if
        let saved = self.allow_comp_lit;
        self.allow_comp_lit = false;
        let mut init = None;
        let cond;
        if self.at_symbol(Symbol::LBrace) {
            self.error_here("missing condition in if statement");
            cond = Expr {
                kind: ExprKind::Bad,
                span: start.clone(),
            };
        } else {
            let first = self.parse_simple_stmt(false);
            if self.at_symbol(Symbol::Semi) {
                self.bump();
                init = Some(Box::new(first));
                cond = self.parse_expr();
            } else {
                cond = match first {
                    Stmt::Expr(e) => e,
                    other => {
                        self.error_here("expected condition expression");
                        init = Some(Box::new(other));
                        Expr {
                            kind: ExprKind::Bad,
                            span: start.clone(),
                        }
                    }
                };
            }
        }
        self.allow_comp_lit = saved;
        let then = self.parse_block();
        let els = if self.at_keyword(Keyword::Else) {
            self.bump();
            if self.at_keyword(Keyword::If) {
                Some(Box::new(self.parse_if_stmt()))
            } else {
                Some(Box::new(Stmt::Block(self.parse_block())))
            }
        } else {
            None
        };
        let end = self.prev_span();
        Stmt::If {
            init,
            cond,
            then,
            els,
            span: join(&start, &end),
        }
    }

    fn parse_for_stmt(&mut self) -> Stmt {
        let start = self.bump().span; // for
        let saved = self.allow_comp_lit;
        self.allow_comp_lit = false;
        let result = self.parse_for_header(&start);
        self.allow_comp_lit = saved;
        let body = self.parse_block();
        let end = self.prev_span();
        let span = join(&start, &end);
        match result {
            ForHeader::Plain { init, cond, post } => Stmt::For {
                init,
                cond,
                post,
                body,
                span,
            },
            ForHeader::Range {
                key,
                value,
                define,
                x,
            } => Stmt::Range {
                key,
                value,
                define,
                x,
                body,
                span,
            },
        }
    }

    fn parse_for_header(&mut self, start: &Span) -> ForHeader {
        if self.at_symbol(Symbol::LBrace) {
            return ForHeader::Plain {
                init: None,
                cond: None,
                post: None,
            };
        }
        if self.at_keyword(Keyword::Range) {
            self.bump();
            let x = self.parse_expr();
            return ForHeader::Range {
                key: None,
                value: None,
                define: false,
                x,
            };
        }
        if self.at_symbol(Symbol::Semi) {
            // `for ; cond ; post`
            self.bump();
            let cond = if self.at_symbol(Symbol::Semi) {
                None
            } else {
                Some(self.parse_expr())
            };
            self.eat_symbol(Symbol::Semi);
            let post = if self.at_symbol(Symbol::LBrace) {
                None
            } else {
                Some(Box::new(self.parse_simple_stmt(false)))
            };
            return ForHeader::Plain {
                init: None,
                cond,
                post,
            };
        }
        let first = self.parse_simple_stmt(true);
        if let Stmt::Range {
            key,
            value,
            define,
            x,
            ..
        } = first
        {
            return ForHeader::Range {
                key,
                value,
                define,
                x,
            };
        }
        if self.at_symbol(Symbol::Semi) {
            self.bump();
            let cond = if self.at_symbol(Symbol::Semi) {
                None
            } else {
                Some(self.parse_expr())
            };
            self.eat_symbol(Symbol::Semi);
            let post = if self.at_symbol(Symbol::LBrace) {
                None
            } else {
                Some(Box::new(self.parse_simple_stmt(false)))
            };
            ForHeader::Plain {
                init: Some(Box::new(first)),
                cond,
                post,
            }
        } else {
            match first {
                Stmt::Expr(e) => ForHeader::Plain {
                    init: None,
                    cond: Some(e),
                    post: None,
                },
                other => {
                    let _ = other;
                    self.diags
                        .push("expected for-loop condition", Some(start.clone()));
                    ForHeader::Plain {
                        init: None,
                        cond: None,
                        post: None,
                    }
                }
            }
        }
    }

    fn parse_switch_stmt(&mut self) -> Stmt {
        let start = self.bump().span; // switch
        let saved = self.allow_comp_lit;
        self.allow_comp_lit = false;
        let mut init = None;
        let mut tag = None;
        let mut type_switch = None;
        if !self.at_symbol(Symbol::LBrace) {
            let first = self.parse_simple_stmt(false);
            let first = if self.at_symbol(Symbol::Semi) {
                self.bump();
                init = Some(Box::new(first));
                if self.at_symbol(Symbol::LBrace) {
                    None
                } else {
                    Some(self.parse_simple_stmt(false))
                }
            } else {
                Some(first)
            };
            if let Some(stmt) = first {
                match stmt {
                    Stmt::Expr(e) => match e.kind {
                        ExprKind::TypeAssert { x, ty: None } => {
                            type_switch = Some(TypeSwitchGuard { bind: None, x: *x });
                        }
                        _ => tag = Some(e),
                    },
                    Stmt::Assign {
                        lhs,
                        mut rhs,
                        define: true,
                        ..
                    } if rhs.len() == 1 => {
                        let rhs0 = rhs.remove(0);
                        if let ExprKind::TypeAssert { x, ty: None } = rhs0.kind {
                            let bind = lhs.into_iter().next().and_then(|e| match e.kind {
                                ExprKind::Ident(name) => Some(Ident { name, span: e.span }),
                                _ => None,
                            });
                            type_switch = Some(TypeSwitchGuard { bind, x: *x });
                        } else {
                            self.error_here("expected type switch guard");
                        }
                    }
                    _ => self.error_here("expected switch expression"),
                }
            }
        }
        self.allow_comp_lit = saved;
        let mut cases = Vec::new();
        self.eat_symbol(Symbol::LBrace);
        self.consume_semis();
        while !self.at_symbol(Symbol::RBrace) && !self.at_eof() {
            cases.push(self.parse_case_clause(type_switch.is_some()));
        }
        self.eat_symbol(Symbol::RBrace);
        let end = self.prev_span();
        Stmt::Switch {
            init,
            tag,
            type_switch,
            cases,
            span: join(&start, &end),
        }
    }

    fn parse_case_clause(&mut self, is_type_switch: bool) -> CaseClause {
        let start = self.peek().span.clone();
        let mut exprs = Vec::new();
        let mut types = Vec::new();
        if self.at_keyword(Keyword::Case) {
            self.bump();
            if is_type_switch {
                loop {
                    types.push(self.parse_type());
                    if self.at_symbol(Symbol::Comma) {
                        self.bump();
                    } else {
                        break;
                    }
                }
            } else {
                exprs = self.parse_expr_list();
            }
        } else if self.at_keyword(Keyword::Default) {
            self.bump();
        } else {
            self.error_here("expected 'case' or 'default'");
            self.sync_stmt();
        }
        self.eat_symbol(Symbol::Colon);
        let mut body = Vec::new();
        self.consume_semis();
        while !self.at_symbol(Symbol::RBrace)
            && !self.at_keyword(Keyword::Case)
            && !self.at_keyword(Keyword::Default)
            && !self.at_eof()
        {
            body.push(self.parse_stmt());
            self.consume_semis();
        }
        let end = self.prev_span();
        CaseClause {
            exprs,
            types,
            body,
            span: join(&start, &end),
        }
    }

    fn parse_select_stmt(&mut self) -> Stmt {
        let start = self.bump().span; // select
        let mut cases = Vec::new();
        self.eat_symbol(Symbol::LBrace);
        self.consume_semis();
        while !self.at_symbol(Symbol::RBrace) && !self.at_eof() {
            let case_start = self.peek().span.clone();
            let comm = if self.at_keyword(Keyword::Case) {
                self.bump();
                Some(Box::new(self.parse_simple_stmt(false)))
            } else if self.at_keyword(Keyword::Default) {
                self.bump();
                None
            } else {
                self.error_here("expected 'case' or 'default'");
                self.sync_stmt();
                continue;
            };
            self.eat_symbol(Symbol::Colon);
            let mut body = Vec::new();
            self.consume_semis();
            while !self.at_symbol(Symbol::RBrace)
                && !self.at_keyword(Keyword::Case)
                && !self.at_keyword(Keyword::Default)
                && !self.at_eof()
            {
                body.push(self.parse_stmt());
                self.consume_semis();
            }
            let end = self.prev_span();
            cases.push(CommClause {
                comm,
                body,
                span: join(&case_start, &end),
            });
        }
        self.eat_symbol(Symbol::RBrace);
        let end = self.prev_span();
        Stmt::Select {
            cases,
            span: join(&start, &end),
        }
    }

    // ---- expressions ----

    fn parse_expr_list(&mut self) -> Vec<Expr> {
        let mut list = vec![self.parse_expr()];
        while self.at_symbol(Symbol::Comma) {
            self.bump();
            list.push(self.parse_expr());
        }
        list
    }

    pub fn parse_expr(&mut self) -> Expr {
        self.parse_binary_expr(1)
    }

    fn parse_binary_expr(&mut self, min_prec: u8) -> Expr {
        let mut x = self.parse_unary_expr();
        loop {
            let (op, prec) = match binary_op(&self.peek().kind) {
                Some(v) => v,
                None => break,
            };
            if prec < min_prec {
                break;
            }
            self.bump();
            let y = self.parse_binary_expr(prec + 1);
            let span = join(&x.span, &y.span);
            x = Expr {
                kind: ExprKind::Binary {
                    op,
                    x: Box::new(x),
                    y: Box::new(y),
                },
                span,
            };
        }
        x
    }

    fn parse_unary_expr(&mut self) -> Expr {
        let start = self.peek().span.clone();
        let op = match self.peek().kind {
            TokenKind::Symbol(Symbol::Plus) => Some(UnaryOp::Plus),
            TokenKind::Symbol(Symbol::Minus) => Some(UnaryOp::Minus),
            TokenKind::Symbol(Symbol::Bang) => Some(UnaryOp::Not),
            TokenKind::Symbol(Symbol::Caret) => Some(UnaryOp::Xor),
            TokenKind::Symbol(Symbol::Amp) => Some(UnaryOp::And),
            TokenKind::Symbol(Symbol::Arrow) => Some(UnaryOp::Recv),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let x = self.parse_unary_expr();
            let span = join(&start, &x.span);
            return Expr {
                kind: ExprKind::Unary { op, x: Box::new(x) },
                span,
            };
        }
        if self.at_symbol(Symbol::Star) {
            self.bump();
            let x = self.parse_unary_expr();
            let span = join(&start, &x.span);
            return Expr {
                kind: ExprKind::Star(Box::new(x)),
                span,
            };
        }
        self.parse_primary_expr()
    }

    fn parse_primary_expr(&mut self) -> Expr {
        let mut x = self.parse_operand();
        loop {
            match self.peek().kind.clone() {
                TokenKind::Symbol(Symbol::Dot) => {
                    self.bump();
                    match self.peek().kind.clone() {
                        TokenKind::Ident(name) => {
                            let span = self.bump().span;
                            let full = join(&x.span, &span);
                            x = Expr {
                                kind: ExprKind::Selector {
                                    x: Box::new(x),
                                    sel: Ident { name, span },
                                },
                                span: full,
                            };
                        }
                        TokenKind::Symbol(Symbol::LParen) => {
                            self.bump();
                            let ty = if self.at_keyword(Keyword::Type) {
                                self.bump();
                                None
                            } else {
                                Some(Box::new(self.parse_type()))
                            };
                            self.eat_symbol(Symbol::RParen);
                            let end = self.prev_span();
                            let full = join(&x.span, &end);
                            x = Expr {
                                kind: ExprKind::TypeAssert {
                                    x: Box::new(x),
                                    ty,
                                },
                                span: full,
                            };
                        }
                        _ => {
                            // Cursor frequently sits right after a dot in
                            // editor buffers; keep the selector with an empty
                            // name so completion can still find it.
                            let span = self.peek().span.clone();
                            self.error_here("expected selector or type assertion");
                            let full = join(&x.span, &span);
                            x = Expr {
                                kind: ExprKind::Selector {
                                    x: Box::new(x),
                                    sel: Ident {
                                        name: String::new(),
                                        span,
                                    },
                                },
                                span: full,
                            };
                            break;
                        }
                    }
                }
                TokenKind::Symbol(Symbol::LBracket) => {
                    self.bump();
                    let low = if self.at_symbol(Symbol::Colon) {
                        None
                    } else {
                        Some(Box::new(self.parse_expr()))
                    };
                    if self.at_symbol(Symbol::Colon) {
                        self.bump();
                        let high = if self.at_symbol(Symbol::RBracket)
                            || self.at_symbol(Symbol::Colon)
                        {
                            None
                        } else {
                            Some(Box::new(self.parse_expr()))
                        };
                        let max = if self.at_symbol(Symbol::Colon) {
                            self.bump();
                            Some(Box::new(self.parse_expr()))
                        } else {
                            None
                        };
                        self.eat_symbol(Symbol::RBracket);
                        let end = self.prev_span();
                        let full = join(&x.span, &end);
                        x = Expr {
                            kind: ExprKind::SliceExpr {
                                x: Box::new(x),
                                low,
                                high,
                                max,
                            },
                            span: full,
                        };
                    } else {
                        let index = low.unwrap_or_else(|| {
                            Box::new(Expr {
                                kind: ExprKind::Bad,
                                span: self.peek().span.clone(),
                            })
                        });
                        self.eat_symbol(Symbol::RBracket);
                        let end = self.prev_span();
                        let full = join(&x.span, &end);
                        x = Expr {
                            kind: ExprKind::Index {
                                x: Box::new(x),
                                index,
                            },
                            span: full,
                        };
                    }
                }
                TokenKind::Symbol(Symbol::LParen) => {
                    let lparen = self.bump().span.start;
                    let saved = self.allow_comp_lit;
                    self.allow_comp_lit = true;
                    let mut args = Vec::new();
                    let mut ellipsis = false;
                    while !self.at_symbol(Symbol::RParen) && !self.at_eof() {
                        args.push(self.parse_expr());
                        if self.at_symbol(Symbol::Ellipsis) {
                            self.bump();
                            ellipsis = true;
                        }
                        if self.at_symbol(Symbol::Comma) {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    self.allow_comp_lit = saved;
                    self.eat_symbol(Symbol::RParen);
                    let end = self.prev_span();
                    let full = join(&x.span, &end);
                    x = Expr {
                        kind: ExprKind::Call {
                            fun: Box::new(x),
                            lparen,
                            args,
                            ellipsis,
                        },
                        span: full,
                    };
                }
                TokenKind::Symbol(Symbol::LBrace) if self.allow_comp_lit && is_lit_type(&x) => {
                    let ty = expr_to_type(&x);
                    let elts = self.parse_composite_body();
                    let end = self.prev_span();
                    let full = join(&x.span, &end);
                    x = Expr {
                        kind: ExprKind::CompositeLit {
                            ty: ty.map(Box::new),
                            elts,
                        },
                        span: full,
                    };
                }
                _ => break,
            }
        }
        x
    }

    fn parse_composite_body(&mut self) -> Vec<Expr> {
        self.eat_symbol(Symbol::LBrace);
        let mut elts = Vec::new();
        self.consume_semis();
        while !self.at_symbol(Symbol::RBrace) && !self.at_eof() {
            let elt = self.parse_composite_elt();
            elts.push(elt);
            if self.at_symbol(Symbol::Comma) {
                self.bump();
            }
            self.consume_semis();
        }
        self.eat_symbol(Symbol::RBrace);
        elts
    }

    fn parse_composite_elt(&mut self) -> Expr {
        let start = self.peek().span.clone();
        let value = if self.at_symbol(Symbol::LBrace) {
            // Nested literal with elided type.
            let elts = self.parse_composite_body();
            let end = self.prev_span();
            Expr {
                kind: ExprKind::CompositeLit { ty: None, elts },
                span: join(&start, &end),
            }
        } else {
            self.parse_expr()
        };
        if self.at_symbol(Symbol::Colon) {
            self.bump();
            let v = if self.at_symbol(Symbol::LBrace) {
                let elts = self.parse_composite_body();
                let end = self.prev_span();
                Expr {
                    kind: ExprKind::CompositeLit { ty: None, elts },
                    span: join(&start, &end),
                }
            } else {
                self.parse_expr()
            };
            let span = join(&value.span, &v.span);
            return Expr {
                kind: ExprKind::KeyValue {
                    key: Box::new(value),
                    value: Box::new(v),
                },
                span,
            };
        }
        value
    }

    fn parse_operand(&mut self) -> Expr {
        let start = self.peek().span.clone();
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.bump();
                Expr {
                    kind: ExprKind::Ident(name),
                    span: start,
                }
            }
            TokenKind::IntLit(v) => self.lit(LitKind::Int, v),
            TokenKind::FloatLit(v) => self.lit(LitKind::Float, v),
            TokenKind::ImagLit(v) => self.lit(LitKind::Imag, v),
            TokenKind::RuneLit(v) => self.lit(LitKind::Rune, v),
            TokenKind::StringLit(v) => self.lit(LitKind::Str, v),
            TokenKind::Symbol(Symbol::LParen) => {
                self.bump();
                let saved = self.allow_comp_lit;
                self.allow_comp_lit = true;
                let inner = self.parse_expr();
                self.allow_comp_lit = saved;
                self.eat_symbol(Symbol::RParen);
                let end = self.prev_span();
                Expr {
                    kind: ExprKind::Paren(Box::new(inner)),
                    span: join(&start, &end),
                }
            }
            TokenKind::Keyword(Keyword::Func) => {
                self.bump();
                let sig = self.parse_signature();
                if self.at_symbol(Symbol::LBrace) {
                    let saved = self.allow_comp_lit;
                    self.allow_comp_lit = true;
                    let body = self.parse_block();
                    self.allow_comp_lit = saved;
                    let span = join(&start, &body.span);
                    Expr {
                        kind: ExprKind::FuncLit {
                            sig: Box::new(sig),
                            body: Box::new(body),
                        },
                        span,
                    }
                } else {
                    let end = self.prev_span();
                    let span = join(&start, &end);
                    Expr {
                        kind: ExprKind::TypeInExpr(Box::new(TypeExpr {
                            kind: TypeExprKind::Func(Box::new(sig)),
                            span: span.clone(),
                        })),
                        span,
                    }
                }
            }
            TokenKind::Symbol(Symbol::LBracket)
            | TokenKind::Keyword(
                Keyword::Map | Keyword::Chan | Keyword::Struct | Keyword::Interface,
            ) => {
                let ty = self.parse_type();
                let span = ty.span.clone();
                Expr {
                    kind: ExprKind::TypeInExpr(Box::new(ty)),
                    span,
                }
            }
            _ => {
                self.error_here("expected expression");
                self.bump();
                Expr {
                    kind: ExprKind::Bad,
                    span: start,
                }
            }
        }
    }

    fn lit(&mut self, kind: LitKind, value: String) -> Expr {
        let span = self.bump().span;
        Expr {
            kind: ExprKind::BasicLit { kind, value },
            span,
        }
    }

    // ---- cursor helpers ----

    fn peek(&self) -> &Token {
        &self.tokens[self.idx.min(self.tokens.len() - 1)]
    }

    fn prev_span(&self) -> Span {
        if self.idx == 0 {
            return Span::default();
        }
        self.tokens[(self.idx - 1).min(self.tokens.len() - 1)]
            .span
            .clone()
    }

    fn bump(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.idx < self.tokens.len() - 1 {
            self.idx += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn at_symbol(&self, s: Symbol) -> bool {
        matches!(&self.peek().kind, TokenKind::Symbol(x) if *x == s)
    }

    fn at_keyword(&self, k: Keyword) -> bool {
        matches!(&self.peek().kind, TokenKind::Keyword(x) if *x == k)
    }

    fn eat_symbol(&mut self, s: Symbol) -> bool {
        if self.at_symbol(s) {
            self.bump();
            true
        } else {
            self.error_here(&format!("expected {:?}", s));
            false
        }
    }

    fn consume_semis(&mut self) {
        while self.at_symbol(Symbol::Semi) {
            self.bump();
        }
    }

    fn error_here(&mut self, message: &str) {
        let span = self.peek().span.clone();
        self.diags.push(message, Some(span));
    }

    // Always makes progress: the offending token is consumed before scanning
    // for a boundary, so error recovery can never spin in place.
    fn sync_stmt(&mut self) {
        if self.at_eof() {
            return;
        }
        self.bump();
        while !self.at_eof() {
            if self.at_symbol(Symbol::Semi) {
                self.bump();
                return;
            }
            if self.at_symbol(Symbol::RBrace) || self.at_symbol(Symbol::RParen) {
                return;
            }
            self.bump();
        }
    }

    fn sync_decl(&mut self) {
        if self.at_eof() {
            return;
        }
        self.bump();
        let mut depth = 0usize;
        while !self.at_eof() {
            match self.peek().kind {
                TokenKind::Symbol(Symbol::LBrace) => depth += 1,
                TokenKind::Symbol(Symbol::RBrace) => depth = depth.saturating_sub(1),
                TokenKind::Keyword(
                    Keyword::Func | Keyword::Var | Keyword::Const | Keyword::Type,
                ) if depth == 0 => return,
                _ => {}
            }
            self.bump();
        }
    }
}

enum ForHeader {
    Plain {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
    },
    Range {
        key: Option<Expr>,
        value: Option<Expr>,
        define: bool,
        x: Expr,
    },
}

// Merge two spans: the region from the first's start to the second's end,
// positioned at the first.
fn join(start: &Span, end: &Span) -> Span {
    Span {
        start: start.start,
        end: end.end.max(start.end),
        line: start.line,
        column: start.column,
    }
}

fn pending_to_names(pending: &mut Vec<TypeExpr>, diags: &mut Diagnostics) -> Vec<Ident> {
    pending
        .drain(..)
        .map(|ty| match ty.kind {
            TypeExprKind::Named(name) => Ident {
                name,
                span: ty.span,
            },
            _ => {
                diags.push("expected parameter name", Some(ty.span.clone()));
                Ident {
                    name: "_".to_string(),
                    span: ty.span,
                }
            }
        })
        .collect()
}

fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
    let v = match kind {
        TokenKind::Symbol(Symbol::OrOr) => (BinaryOp::LogicalOr, 1),
        TokenKind::Symbol(Symbol::AndAnd) => (BinaryOp::LogicalAnd, 2),
        TokenKind::Symbol(Symbol::EqEq) => (BinaryOp::Eq, 3),
        TokenKind::Symbol(Symbol::NotEq) => (BinaryOp::NotEq, 3),
        TokenKind::Symbol(Symbol::Lt) => (BinaryOp::Lt, 3),
        TokenKind::Symbol(Symbol::Lte) => (BinaryOp::Lte, 3),
        TokenKind::Symbol(Symbol::Gt) => (BinaryOp::Gt, 3),
        TokenKind::Symbol(Symbol::Gte) => (BinaryOp::Gte, 3),
        TokenKind::Symbol(Symbol::Plus) => (BinaryOp::Add, 4),
        TokenKind::Symbol(Symbol::Minus) => (BinaryOp::Sub, 4),
        TokenKind::Symbol(Symbol::Pipe) => (BinaryOp::Or, 4),
        TokenKind::Symbol(Symbol::Caret) => (BinaryOp::Xor, 4),
        TokenKind::Symbol(Symbol::Star) => (BinaryOp::Mul, 5),
        TokenKind::Symbol(Symbol::Slash) => (BinaryOp::Div, 5),
        TokenKind::Symbol(Symbol::Percent) => (BinaryOp::Rem, 5),
        TokenKind::Symbol(Symbol::Shl) => (BinaryOp::Shl, 5),
        TokenKind::Symbol(Symbol::Shr) => (BinaryOp::Shr, 5),
        TokenKind::Symbol(Symbol::Amp) => (BinaryOp::And, 5),
        TokenKind::Symbol(Symbol::AndNot) => (BinaryOp::AndNot, 5),
        _ => return None,
    };
    Some(v)
}

// Composite literals may follow a type-shaped primary: `T{}`, `pkg.T{}`,
// `[]T{}`, `map[K]V{}`, `[N]T{}`.
fn is_lit_type(x: &Expr) -> bool {
    match &x.kind {
        ExprKind::Ident(_) => true,
        ExprKind::Selector { x, .. } => matches!(x.kind, ExprKind::Ident(_)),
        ExprKind::TypeInExpr(ty) => matches!(
            ty.kind,
            TypeExprKind::Slice(_) | TypeExprKind::Array(..) | TypeExprKind::Map(..)
        ),
        ExprKind::Index { x, .. } => is_lit_type(x),
        _ => false,
    }
}

fn expr_to_type(x: &Expr) -> Option<TypeExpr> {
    match &x.kind {
        ExprKind::Ident(name) => Some(TypeExpr {
            kind: TypeExprKind::Named(name.clone()),
            span: x.span.clone(),
        }),
        ExprKind::Selector { x: base, sel } => match &base.kind {
            ExprKind::Ident(pkg) => Some(TypeExpr {
                kind: TypeExprKind::Qualified(pkg.clone(), sel.name.clone()),
                span: x.span.clone(),
            }),
            _ => None,
        },
        ExprKind::TypeInExpr(ty) => Some((**ty).clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> File {
        let (file, diags) = parse_source(src, ParseMode::Full);
        let file = file.expect("file should parse");
        assert!(
            diags.is_empty(),
            "unexpected diagnostics: {:?}",
            diags.items
        );
        file
    }

    #[test]
    fn parses_package_and_imports() {
        let file = parse_ok("package main\n\nimport (\n\t\"fmt\"\n\tm \"math\"\n)\n");
        assert_eq!(file.package, "main");
        assert_eq!(file.imports.len(), 2);
        assert_eq!(file.imports[1].name.as_ref().unwrap().name, "m");
        assert_eq!(file.imports[1].path, "math");
    }

    #[test]
    fn parses_func_with_grouped_params() {
        let file = parse_ok("package p\n\nfunc Add(a, b int, s string) (int, error) { return a + b, nil }\n");
        let decl = match &file.decls[0] {
            Decl::Func(f) => f,
            other => panic!("expected func, got {:?}", other),
        };
        assert_eq!(decl.name.name, "Add");
        assert_eq!(decl.sig.params.len(), 2);
        assert_eq!(decl.sig.params[0].names.len(), 2);
        assert_eq!(decl.sig.results.len(), 2);
    }

    #[test]
    fn parses_method_receiver() {
        let file = parse_ok("package p\n\ntype T struct{}\n\nfunc (t *T) M() {}\n");
        let decl = match &file.decls[1] {
            Decl::Func(f) => f,
            other => panic!("expected func, got {:?}", other),
        };
        let recv = decl.recv.as_ref().expect("receiver");
        assert_eq!(recv.names[0].name, "t");
        assert!(matches!(recv.ty.kind, TypeExprKind::Pointer(_)));
    }

    #[test]
    fn parses_struct_and_interface_types() {
        let file = parse_ok(
            "package p\n\ntype S struct {\n\tName string `json:\"name\"`\n\tio.Reader\n\tA, B int\n}\n\ntype I interface {\n\tRead(p []byte) (int, error)\n\tfmt.Stringer\n}\n",
        );
        let s = match &file.decls[0] {
            Decl::Type(specs) => &specs[0],
            other => panic!("expected type, got {:?}", other),
        };
        match &s.ty.kind {
            TypeExprKind::Struct(fields) => {
                assert_eq!(fields.len(), 3);
                assert!(fields[1].embedded);
                assert_eq!(fields[2].names.len(), 2);
            }
            other => panic!("expected struct, got {:?}", other),
        }
    }

    #[test]
    fn parses_control_flow() {
        let file = parse_ok(
            "package p\n\nfunc f(xs []int) int {\n\tn := 0\n\tfor i, x := range xs {\n\t\tif x > 0 && i < 10 {\n\t\t\tn += x\n\t\t}\n\t}\n\tswitch v := n; v {\n\tcase 0:\n\t\treturn -1\n\tdefault:\n\t}\n\treturn n\n}\n",
        );
        assert_eq!(file.decls.len(), 1);
    }

    #[test]
    fn parses_type_switch() {
        let file = parse_ok(
            "package p\n\nfunc f(x interface{}) {\n\tswitch v := x.(type) {\n\tcase int, string:\n\t\t_ = v\n\tdefault:\n\t}\n}\n",
        );
        assert_eq!(file.decls.len(), 1);
    }

    #[test]
    fn parses_composite_literals() {
        parse_ok(
            "package p\n\nvar m = map[string][]int{\n\t\"a\": {1, 2},\n}\n\nvar s = S{Name: \"x\"}\n\ntype S struct{ Name string }\n",
        );
    }

    #[test]
    fn package_clause_only_stops_early() {
        let (file, _) = parse_source("package fast\nfunc broken(", ParseMode::PackageClauseOnly);
        assert_eq!(file.unwrap().package, "fast");
    }

    #[test]
    fn recovers_from_bad_declaration() {
        let (file, diags) = parse_source(
            "package p\n\nfunc good() {}\n\n@@@\n\nfunc alsoGood() {}\n",
            ParseMode::Full,
        );
        let file = file.unwrap();
        assert!(!diags.is_empty());
        let funcs = file
            .decls
            .iter()
            .filter(|d| matches!(d, Decl::Func(_)))
            .count();
        assert_eq!(funcs, 2);
    }

    #[test]
    fn keeps_selector_with_cursor_after_dot() {
        let (file, _) = parse_source("package p\n\nfunc f() {\n\tfmt.\n}\n", ParseMode::Full);
        assert!(file.is_some());
    }
}
