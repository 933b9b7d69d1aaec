use super::ast::Span;

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Ident(String),
    IntLit(String),
    FloatLit(String),
    ImagLit(String),
    RuneLit(String),
    StringLit(String),
    Unknown(char),
    Keyword(Keyword),
    Symbol(Symbol),
    Eof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    Break,
    Case,
    Chan,
    Const,
    Continue,
    Default,
    Defer,
    Else,
    Fallthrough,
    For,
    Func,
    Go,
    Goto,
    If,
    Import,
    Interface,
    Map,
    Package,
    Range,
    Return,
    Select,
    Struct,
    Switch,
    Type,
    Var,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Symbol {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Colon,
    Dot,
    Ellipsis,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    AndNot,
    Shl,
    Shr,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    AndNotEq,
    ShlEq,
    ShrEq,
    AndAnd,
    OrOr,
    Arrow,
    Inc,
    Dec,
    EqEq,
    Lt,
    Gt,
    Eq,
    Bang,
    NotEq,
    Lte,
    Gte,
    Define,
}

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

pub struct Lexer<'a> {
    bytes: &'a [u8],
    idx: usize,
    line: usize,
    col: usize,
    prev_can_insert_semi: bool,
    pending_semi: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            bytes: src.as_bytes(),
            idx: 0,
            line: 1,
            col: 1,
            prev_can_insert_semi: false,
            pending_semi: false,
        }
    }

    pub fn lex_all(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = matches!(tok.kind, TokenKind::Eof);
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn next_token(&mut self) -> Token {
        if self.pending_semi {
            self.pending_semi = false;
            return self.token_at(TokenKind::Symbol(Symbol::Semi), self.idx);
        }
        self.skip_whitespace_and_comments();
        if self.pending_semi {
            self.pending_semi = false;
            return self.token_at(TokenKind::Symbol(Symbol::Semi), self.idx);
        }
        let start = self.idx;
        let (line, column) = (self.line, self.col);
        if self.idx >= self.bytes.len() {
            // A final newline is not required for the last statement.
            if self.prev_can_insert_semi {
                self.prev_can_insert_semi = false;
                return Token {
                    kind: TokenKind::Symbol(Symbol::Semi),
                    span: Span {
                        start,
                        end: start,
                        line,
                        column,
                    },
                };
            }
            return Token {
                kind: TokenKind::Eof,
                span: Span {
                    start,
                    end: start,
                    line,
                    column,
                },
            };
        }
        let ch = self.peek_char();
        if is_ident_start(ch) {
            let ident = self.read_while(is_ident_continue);
            let kind = match keyword_for(&ident) {
                Some(kw) => TokenKind::Keyword(kw),
                None => TokenKind::Ident(ident),
            };
            return self.finish(kind, start, line, column);
        }
        if ch.is_ascii_digit() || (ch == '.' && self.peek_next_char().is_ascii_digit()) {
            let kind = self.read_number();
            return self.finish(kind, start, line, column);
        }
        let kind = match ch {
            '"' => TokenKind::StringLit(self.read_string()),
            '`' => TokenKind::StringLit(self.read_raw_string()),
            '\'' => TokenKind::RuneLit(self.read_rune_lit()),
            '(' => self.sym(Symbol::LParen),
            ')' => self.sym(Symbol::RParen),
            '{' => self.sym(Symbol::LBrace),
            '}' => self.sym(Symbol::RBrace),
            '[' => self.sym(Symbol::LBracket),
            ']' => self.sym(Symbol::RBracket),
            ',' => self.sym(Symbol::Comma),
            ';' => self.sym(Symbol::Semi),
            ':' => {
                self.advance();
                if self.peek_char() == '=' {
                    self.advance();
                    TokenKind::Symbol(Symbol::Define)
                } else {
                    TokenKind::Symbol(Symbol::Colon)
                }
            }
            '.' => {
                self.advance();
                if self.peek_char() == '.' && self.peek_next_char() == '.' {
                    self.advance();
                    self.advance();
                    TokenKind::Symbol(Symbol::Ellipsis)
                } else {
                    TokenKind::Symbol(Symbol::Dot)
                }
            }
            '+' => self.sym_eq_or(Symbol::Plus, Symbol::PlusEq, Some(('+', Symbol::Inc))),
            '-' => self.sym_eq_or(Symbol::Minus, Symbol::MinusEq, Some(('-', Symbol::Dec))),
            '*' => self.sym_eq_or(Symbol::Star, Symbol::StarEq, None),
            '/' => self.sym_eq_or(Symbol::Slash, Symbol::SlashEq, None),
            '%' => self.sym_eq_or(Symbol::Percent, Symbol::PercentEq, None),
            '^' => self.sym_eq_or(Symbol::Caret, Symbol::CaretEq, None),
            '&' => {
                self.advance();
                match self.peek_char() {
                    '&' => {
                        self.advance();
                        TokenKind::Symbol(Symbol::AndAnd)
                    }
                    '=' => {
                        self.advance();
                        TokenKind::Symbol(Symbol::AmpEq)
                    }
                    '^' => {
                        self.advance();
                        if self.peek_char() == '=' {
                            self.advance();
                            TokenKind::Symbol(Symbol::AndNotEq)
                        } else {
                            TokenKind::Symbol(Symbol::AndNot)
                        }
                    }
                    _ => TokenKind::Symbol(Symbol::Amp),
                }
            }
            '|' => {
                self.advance();
                match self.peek_char() {
                    '|' => {
                        self.advance();
                        TokenKind::Symbol(Symbol::OrOr)
                    }
                    '=' => {
                        self.advance();
                        TokenKind::Symbol(Symbol::PipeEq)
                    }
                    _ => TokenKind::Symbol(Symbol::Pipe),
                }
            }
            '<' => {
                self.advance();
                match self.peek_char() {
                    '-' => {
                        self.advance();
                        TokenKind::Symbol(Symbol::Arrow)
                    }
                    '=' => {
                        self.advance();
                        TokenKind::Symbol(Symbol::Lte)
                    }
                    '<' => {
                        self.advance();
                        if self.peek_char() == '=' {
                            self.advance();
                            TokenKind::Symbol(Symbol::ShlEq)
                        } else {
                            TokenKind::Symbol(Symbol::Shl)
                        }
                    }
                    _ => TokenKind::Symbol(Symbol::Lt),
                }
            }
            '>' => {
                self.advance();
                match self.peek_char() {
                    '=' => {
                        self.advance();
                        TokenKind::Symbol(Symbol::Gte)
                    }
                    '>' => {
                        self.advance();
                        if self.peek_char() == '=' {
                            self.advance();
                            TokenKind::Symbol(Symbol::ShrEq)
                        } else {
                            TokenKind::Symbol(Symbol::Shr)
                        }
                    }
                    _ => TokenKind::Symbol(Symbol::Gt),
                }
            }
            '=' => self.sym_eq_or(Symbol::Eq, Symbol::EqEq, None),
            '!' => self.sym_eq_or(Symbol::Bang, Symbol::NotEq, None),
            _ => {
                self.advance_char();
                TokenKind::Unknown(ch)
            }
        };
        self.finish(kind, start, line, column)
    }

    fn finish(&mut self, kind: TokenKind, start: usize, line: usize, column: usize) -> Token {
        let end = self.idx;
        self.prev_can_insert_semi = can_insert_semi_after(&kind);
        Token {
            kind,
            span: Span {
                start,
                end,
                line,
                column,
            },
        }
    }

    fn token_at(&self, kind: TokenKind, at: usize) -> Token {
        Token {
            kind,
            span: Span {
                start: at,
                end: at,
                line: self.line,
                column: self.col,
            },
        }
    }

    fn sym(&mut self, s: Symbol) -> TokenKind {
        self.advance();
        TokenKind::Symbol(s)
    }

    fn sym_eq_or(
        &mut self,
        plain: Symbol,
        with_eq: Symbol,
        doubled: Option<(char, Symbol)>,
    ) -> TokenKind {
        let first = self.peek_char();
        self.advance();
        if self.peek_char() == '=' {
            self.advance();
            return TokenKind::Symbol(with_eq);
        }
        if let Some((ch, sym)) = doubled {
            if self.peek_char() == ch && first == ch {
                self.advance();
                return TokenKind::Symbol(sym);
            }
        }
        TokenKind::Symbol(plain)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            if self.idx >= self.bytes.len() {
                return;
            }
            let ch = self.peek_char();
            match ch {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                '\n' => {
                    self.advance();
                    if self.prev_can_insert_semi {
                        self.prev_can_insert_semi = false;
                        self.pending_semi = true;
                        return;
                    }
                }
                '/' if self.peek_next_char() == '/' => {
                    self.advance();
                    self.advance();
                    while self.idx < self.bytes.len() && self.peek_char() != '\n' {
                        self.advance();
                    }
                }
                '/' if self.peek_next_char() == '*' => {
                    self.advance();
                    self.advance();
                    let mut saw_newline = false;
                    while self.idx < self.bytes.len() {
                        let c = self.peek_char();
                        if c == '\n' {
                            saw_newline = true;
                        }
                        if c == '*' && self.peek_next_char() == '/' {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                    if saw_newline && self.prev_can_insert_semi {
                        self.prev_can_insert_semi = false;
                        self.pending_semi = true;
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn read_string(&mut self) -> String {
        self.advance(); // opening quote
        let mut s = String::new();
        while self.idx < self.bytes.len() {
            let ch = self.peek_char();
            if ch == '"' {
                self.advance();
                break;
            }
            if ch == '\n' {
                break; // unterminated
            }
            if ch == '\\' {
                self.advance();
                if self.idx >= self.bytes.len() {
                    break;
                }
                let esc = self.peek_char();
                self.advance();
                let actual = match esc {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    '\\' => '\\',
                    '"' => '"',
                    '\'' => '\'',
                    '0' => '\0',
                    _ => esc,
                };
                s.push(actual);
            } else {
                s.push(ch);
                self.advance_char();
            }
        }
        s
    }

    fn read_raw_string(&mut self) -> String {
        self.advance(); // opening backquote
        let mut s = String::new();
        while self.idx < self.bytes.len() {
            let ch = self.peek_char();
            if ch == '`' {
                self.advance();
                break;
            }
            s.push(ch);
            self.advance_char();
        }
        s
    }

    fn read_rune_lit(&mut self) -> String {
        self.advance(); // opening quote
        let mut s = String::new();
        while self.idx < self.bytes.len() {
            let ch = self.peek_char();
            if ch == '\'' {
                self.advance();
                break;
            }
            if ch == '\n' {
                break;
            }
            if ch == '\\' {
                s.push(ch);
                self.advance();
                if self.idx < self.bytes.len() {
                    s.push(self.peek_char());
                    self.advance_char();
                }
                continue;
            }
            s.push(ch);
            self.advance_char();
        }
        s
    }

    fn read_number(&mut self) -> TokenKind {
        let mut s = String::new();
        let mut is_float = false;
        if self.peek_char() == '0'
            && matches!(self.peek_next_char(), 'x' | 'X' | 'o' | 'O' | 'b' | 'B')
        {
            s.push(self.peek_char());
            self.advance();
            s.push(self.peek_char());
            self.advance();
            while self.idx < self.bytes.len() {
                let ch = self.peek_char();
                if ch.is_ascii_hexdigit() || ch == '_' {
                    s.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
            return TokenKind::IntLit(s);
        }
        while self.idx < self.bytes.len() {
            let ch = self.peek_char();
            if ch.is_ascii_digit() || ch == '_' {
                s.push(ch);
                self.advance();
            } else if ch == '.' && self.peek_next_char() != '.' && !is_float {
                is_float = true;
                s.push(ch);
                self.advance();
            } else if (ch == 'e' || ch == 'E')
                && (self.peek_next_char().is_ascii_digit()
                    || self.peek_next_char() == '+'
                    || self.peek_next_char() == '-')
            {
                is_float = true;
                s.push(ch);
                self.advance();
                let sign = self.peek_char();
                if sign == '+' || sign == '-' {
                    s.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }
        if self.peek_char() == 'i' {
            s.push('i');
            self.advance();
            return TokenKind::ImagLit(s);
        }
        if is_float {
            TokenKind::FloatLit(s)
        } else {
            TokenKind::IntLit(s)
        }
    }

    fn read_while<F>(&mut self, f: F) -> String
    where
        F: Fn(char) -> bool,
    {
        let mut s = String::new();
        while self.idx < self.bytes.len() {
            let ch = self.peek_char();
            if !f(ch) {
                break;
            }
            s.push(ch);
            self.advance_char();
        }
        s
    }

    fn advance(&mut self) {
        if self.idx >= self.bytes.len() {
            return;
        }
        let ch = self.bytes[self.idx];
        self.idx += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
    }

    // Advance over one char, multi-byte UTF-8 sequences included.
    fn advance_char(&mut self) {
        if self.idx >= self.bytes.len() {
            return;
        }
        let b = self.bytes[self.idx];
        let width = if b < 0x80 {
            1
        } else if b >= 0xf0 {
            4
        } else if b >= 0xe0 {
            3
        } else if b >= 0xc0 {
            2
        } else {
            1
        };
        for _ in 0..width.min(self.bytes.len() - self.idx) {
            self.advance();
        }
    }

    fn peek_char(&self) -> char {
        match self.bytes.get(self.idx) {
            Some(&b) if b < 0x80 => b as char,
            Some(_) => {
                // Decode the full char for identifier classification. The
                // 4-byte window may cut the following char; fall back to the
                // valid prefix.
                let end = self.bytes.len().min(self.idx + 4);
                let window = &self.bytes[self.idx..end];
                match std::str::from_utf8(window) {
                    Ok(s) => s.chars().next().unwrap_or('\u{fffd}'),
                    Err(e) if e.valid_up_to() > 0 => {
                        std::str::from_utf8(&window[..e.valid_up_to()])
                            .ok()
                            .and_then(|s| s.chars().next())
                            .unwrap_or('\u{fffd}')
                    }
                    Err(_) => '\u{fffd}',
                }
            }
            None => '\0',
        }
    }

    fn peek_next_char(&self) -> char {
        self.bytes.get(self.idx + 1).copied().unwrap_or(b'\0') as char
    }
}

fn keyword_for(ident: &str) -> Option<Keyword> {
    let kw = match ident {
        "break" => Keyword::Break,
        "case" => Keyword::Case,
        "chan" => Keyword::Chan,
        "const" => Keyword::Const,
        "continue" => Keyword::Continue,
        "default" => Keyword::Default,
        "defer" => Keyword::Defer,
        "else" => Keyword::Else,
        "fallthrough" => Keyword::Fallthrough,
        "for" => Keyword::For,
        "func" => Keyword::Func,
        "go" => Keyword::Go,
        "goto" => Keyword::Goto,
        "if" => Keyword::If,
        "import" => Keyword::Import,
        "interface" => Keyword::Interface,
        "map" => Keyword::Map,
        "package" => Keyword::Package,
        "range" => Keyword::Range,
        "return" => Keyword::Return,
        "select" => Keyword::Select,
        "struct" => Keyword::Struct,
        "switch" => Keyword::Switch,
        "type" => Keyword::Type,
        "var" => Keyword::Var,
        _ => return None,
    };
    Some(kw)
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

fn can_insert_semi_after(kind: &TokenKind) -> bool {
    match kind {
        TokenKind::Ident(_) => true,
        TokenKind::IntLit(_)
        | TokenKind::FloatLit(_)
        | TokenKind::ImagLit(_)
        | TokenKind::RuneLit(_)
        | TokenKind::StringLit(_) => true,
        TokenKind::Keyword(
            Keyword::Break | Keyword::Continue | Keyword::Fallthrough | Keyword::Return,
        ) => true,
        TokenKind::Symbol(
            Symbol::RParen | Symbol::RBracket | Symbol::RBrace | Symbol::Inc | Symbol::Dec,
        ) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).lex_all().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn inserts_semicolon_at_line_end() {
        let toks = kinds("x := 1\ny := 2\n");
        let semis = toks
            .iter()
            .filter(|k| matches!(k, TokenKind::Symbol(Symbol::Semi)))
            .count();
        assert_eq!(semis, 2);
    }

    #[test]
    fn no_semicolon_after_operators() {
        let toks = kinds("x := 1 +\n2\n");
        let semis = toks
            .iter()
            .filter(|k| matches!(k, TokenKind::Symbol(Symbol::Semi)))
            .count();
        assert_eq!(semis, 1);
    }

    #[test]
    fn lexes_compound_operators() {
        let toks = kinds("a <<= 1; b &^= 2; c <- d");
        assert!(toks.contains(&TokenKind::Symbol(Symbol::ShlEq)));
        assert!(toks.contains(&TokenKind::Symbol(Symbol::AndNotEq)));
        assert!(toks.contains(&TokenKind::Symbol(Symbol::Arrow)));
    }

    #[test]
    fn lexes_raw_and_interpreted_strings() {
        let toks = kinds("a := `raw\\n`; b := \"esc\\n\"");
        assert!(toks.contains(&TokenKind::StringLit("raw\\n".to_string())));
        assert!(toks.contains(&TokenKind::StringLit("esc\n".to_string())));
    }

    #[test]
    fn block_comment_with_newline_inserts_semicolon() {
        let toks = kinds("x := 1 /* trailing\ncomment */ y := 2\n");
        let semis = toks
            .iter()
            .filter(|k| matches!(k, TokenKind::Symbol(Symbol::Semi)))
            .count();
        assert_eq!(semis, 2);
    }

    #[test]
    fn number_forms() {
        assert!(matches!(&kinds("0x1f")[0], TokenKind::IntLit(s) if s == "0x1f"));
        assert!(matches!(&kinds("1.5e3")[0], TokenKind::FloatLit(s) if s == "1.5e3"));
        assert!(matches!(&kinds("2i")[0], TokenKind::ImagLit(s) if s == "2i"));
    }
}
