use thiserror::Error;

use crate::lexer::{Lexer, Token, TokenKind};
use crate::messages::{EventKind, SourceEvent};
use crate::tree::{ParseTree, Tag};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Parse error [{row}:{col}]: {msg}")]
    Error {
        msg: String,
        pos: usize,
        row: usize,
        col: usize,
        len: usize,
        text: String,
    },
}

impl ParseError {
    fn event(&self) -> SourceEvent {
        match self {
            ParseError::Error {
                pos,
                row,
                col,
                len,
                text,
                ..
            } => SourceEvent::at(
                EventKind::Error,
                "SyntaxError",
                *pos,
                *row,
                *col,
                *len,
                text.clone(),
                vec![],
            ),
        }
    }
}

/// Lex and parse a whole program. Statement-level recovery: a statement that
/// fails to parse becomes a `SyntaxError` diagnostic plus an `Err` marker
/// node, and parsing resumes at the next line.
pub fn parse_source(source: &str) -> (ParseTree, Vec<SourceEvent>) {
    let tokens = match Lexer::new(source).tokenize() {
        Ok(ts) => ts,
        Err(e) => {
            let event = match &e {
                crate::lexer::LexerError::Error { msg, row, col } => SourceEvent::at(
                    EventKind::Error,
                    "SyntaxError",
                    0,
                    *row,
                    *col,
                    0,
                    msg.clone(),
                    vec![],
                ),
            };
            return (ParseTree::new(Tag::Source, 0, 1, 1, 0), vec![event]);
        }
    };
    let mut parser = Parser::new(tokens);
    parser.parse()
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn error(&self, msg: impl Into<String>) -> ParseError {
        let tok = self.current();
        ParseError::Error {
            msg: msg.into(),
            pos: tok.pos,
            row: tok.row,
            col: tok.col,
            len: tok.len,
            text: tok.text.clone(),
        }
    }

    fn current(&self) -> &Token {
        if self.pos < self.tokens.len() {
            &self.tokens[self.pos]
        } else {
            self.tokens.last().unwrap()
        }
    }

    fn peek(&self, offset: usize) -> &Token {
        let idx = self.pos + offset;
        if idx < self.tokens.len() {
            &self.tokens[idx]
        } else {
            self.tokens.last().unwrap()
        }
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn expect(&mut self, kind: &TokenKind, msg: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("{}: found {:?}", msg, self.current().kind)))
        }
    }

    fn is_eof(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn node(&self, tag: Tag, tok: &Token) -> ParseTree {
        ParseTree::new(tag, tok.pos, tok.row, tok.col, tok.len)
    }

    pub fn parse(&mut self) -> (ParseTree, Vec<SourceEvent>) {
        let mut root = ParseTree::new(Tag::Source, 0, 1, 1, 0);
        let mut events = Vec::new();

        while !self.is_eof() {
            match self.parse_statement() {
                Ok(Some(stmt)) => root.push(stmt),
                Ok(None) => {}
                Err(e) => {
                    events.push(e.event());
                    let tok = self.current().clone();
                    root.push(self.node(Tag::Err, &tok));
                    self.recover();
                }
            }
        }

        (root, events)
    }

    /// Skip to the start of the next top-level line: consume up to and past
    /// the next NEWLINE, plus any indented block that follows it.
    fn recover(&mut self) {
        while !matches!(self.current().kind, TokenKind::Newline | TokenKind::Eof) {
            self.advance();
        }
        if matches!(self.current().kind, TokenKind::Newline) {
            self.advance();
        }
        while matches!(self.current().kind, TokenKind::Indent) {
            let mut depth = 0usize;
            loop {
                match self.current().kind {
                    TokenKind::Indent => depth += 1,
                    TokenKind::Dedent => {
                        depth -= 1;
                        if depth == 0 {
                            self.advance();
                            break;
                        }
                    }
                    TokenKind::Eof => return,
                    _ => {}
                }
                self.advance();
            }
        }
    }

    // -- statements ---------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Option<ParseTree>, ParseError> {
        match &self.current().kind {
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent => {
                self.advance();
                Ok(None)
            }
            TokenKind::If => Ok(Some(self.parse_if()?)),
            TokenKind::While => Ok(Some(self.parse_while()?)),
            TokenKind::For => Ok(Some(self.parse_for()?)),
            TokenKind::Def => Ok(Some(self.parse_def()?)),
            TokenKind::Return => Ok(Some(self.parse_return()?)),
            TokenKind::Break => Ok(Some(self.parse_simple(Tag::Break)?)),
            TokenKind::Continue => Ok(Some(self.parse_simple(Tag::Continue)?)),
            TokenKind::Pass => Ok(Some(self.parse_simple(Tag::Pass)?)),
            TokenKind::Import => Ok(Some(self.parse_import()?)),
            _ => Ok(Some(self.parse_expr_statement()?)),
        }
    }

    fn parse_simple(&mut self, tag: Tag) -> Result<ParseTree, ParseError> {
        let tok = self.advance();
        let t = self.node(tag, &tok).with_token(tok.text.clone());
        self.end_of_line()?;
        Ok(t)
    }

    fn end_of_line(&mut self) -> Result<(), ParseError> {
        match self.current().kind {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof | TokenKind::Dedent => Ok(()),
            _ => Err(self.error(format!(
                "Expected end of line, found {:?}",
                self.current().kind
            ))),
        }
    }

    fn parse_expr_statement(&mut self) -> Result<ParseTree, ParseError> {
        let left = self.parse_expr()?;

        let stmt = match self.current().kind {
            TokenKind::Assign => {
                self.advance();
                let right = self.parse_expr()?;
                let mut t = ParseTree::new(Tag::Assign, left.pos, left.row, left.col, left.len);
                t.set("left", left);
                t.set("right", right);
                t
            }
            TokenKind::PlusAssign
            | TokenKind::MinusAssign
            | TokenKind::StarAssign
            | TokenKind::SlashAssign => {
                let op = match self.current().kind {
                    TokenKind::PlusAssign => "+",
                    TokenKind::MinusAssign => "-",
                    TokenKind::StarAssign => "*",
                    _ => "/",
                };
                self.advance();
                let right = self.parse_expr()?;
                let mut t = ParseTree::new(Tag::SelfAssign, left.pos, left.row, left.col, left.len)
                    .with_token(op);
                t.set("left", left);
                t.set("right", right);
                t
            }
            _ => {
                let mut t =
                    ParseTree::new(Tag::ExprStmt, left.pos, left.row, left.col, left.len);
                t.set("expr", left);
                t
            }
        };
        self.end_of_line()?;
        Ok(stmt)
    }

    fn parse_block(&mut self) -> Result<ParseTree, ParseError> {
        let colon = self.expect(&TokenKind::Colon, "Expected ':'")?;
        let mut block = self.node(Tag::Block, &colon);

        if matches!(self.current().kind, TokenKind::Newline) {
            self.advance();
            self.expect(&TokenKind::Indent, "Expected an indented block")?;
            while !matches!(self.current().kind, TokenKind::Dedent | TokenKind::Eof) {
                if let Some(stmt) = self.parse_statement()? {
                    block.push(stmt);
                }
            }
            if matches!(self.current().kind, TokenKind::Dedent) {
                self.advance();
            }
        } else {
            // single-line suite: `if x: y = 1`
            if let Some(stmt) = self.parse_statement()? {
                block.push(stmt);
            }
        }
        Ok(block)
    }

    fn parse_if(&mut self) -> Result<ParseTree, ParseError> {
        let tok = self.advance(); // if / elif
        let mut t = self.node(Tag::If, &tok).with_token(tok.text.clone());
        let cond = self.parse_expr()?;
        t.set("cond", cond);
        let then = self.parse_block()?;
        t.set("then", then);

        match self.current().kind {
            TokenKind::Elif => {
                let nested = self.parse_if()?;
                t.set("else", nested);
            }
            TokenKind::Else => {
                self.advance();
                let block = self.parse_block()?;
                t.set("else", block);
            }
            _ => {}
        }
        Ok(t)
    }

    fn parse_while(&mut self) -> Result<ParseTree, ParseError> {
        let tok = self.advance();
        let mut t = self.node(Tag::While, &tok).with_token(tok.text.clone());
        let cond = self.parse_expr()?;
        t.set("cond", cond);
        let body = self.parse_block()?;
        t.set("body", body);
        Ok(t)
    }

    fn parse_for(&mut self) -> Result<ParseTree, ParseError> {
        let tok = self.advance();
        let mut t = self.node(Tag::For, &tok).with_token(tok.text.clone());
        let each = self.parse_name()?;
        t.set("each", each);
        self.expect(&TokenKind::In, "Expected 'in'")?;
        let list = self.parse_expr()?;
        t.set("list", list);
        let body = self.parse_block()?;
        t.set("body", body);
        Ok(t)
    }

    fn parse_name(&mut self) -> Result<ParseTree, ParseError> {
        match self.current().kind.clone() {
            TokenKind::Ident(name) => {
                let tok = self.advance();
                Ok(self.node(Tag::Name, &tok).with_token(name))
            }
            _ => Err(self.error("Expected a name")),
        }
    }

    fn parse_def(&mut self) -> Result<ParseTree, ParseError> {
        let tok = self.advance();
        let mut t = self.node(Tag::FuncDecl, &tok).with_token(tok.text.clone());
        let name = self.parse_name()?;
        t.set("name", name);

        let lparen = self.expect(&TokenKind::LParen, "Expected '('")?;
        let mut params = self.node(Tag::ListExpr, &lparen);
        while !self.check(&TokenKind::RParen) {
            let pname = self.parse_name()?;
            let mut param =
                ParseTree::new(Tag::Param, pname.pos, pname.row, pname.col, pname.len)
                    .with_token(pname.tokenize().to_string());
            if self.check(&TokenKind::Colon) {
                self.advance();
                let ty = self.parse_name()?;
                param.set("type", ty);
            }
            params.push(param);
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "Expected ')'")?;
        t.set("params", params);

        // `-> type` return annotation
        if self.check(&TokenKind::Minus) && matches!(self.peek(1).kind, TokenKind::Gt) {
            self.advance();
            self.advance();
            let rt = self.parse_name()?;
            t.set("rettype", rt);
        }

        let body = self.parse_block()?;
        t.set("body", body);
        Ok(t)
    }

    fn parse_return(&mut self) -> Result<ParseTree, ParseError> {
        let tok = self.advance();
        let mut t = self.node(Tag::Return, &tok).with_token(tok.text.clone());
        if !matches!(
            self.current().kind,
            TokenKind::Newline | TokenKind::Eof | TokenKind::Dedent
        ) {
            let expr = self.parse_expr()?;
            t.set("expr", expr);
        }
        self.end_of_line()?;
        Ok(t)
    }

    fn parse_import(&mut self) -> Result<ParseTree, ParseError> {
        let tok = self.advance();
        let mut t = self.node(Tag::Import, &tok).with_token(tok.text.clone());
        let name = self.parse_name()?;
        t.set("name", name);
        if self.check(&TokenKind::As) {
            self.advance();
            let alias = self.parse_name()?;
            t.set("alias", alias);
        }
        self.end_of_line()?;
        Ok(t)
    }

    // -- expressions --------------------------------------------------------

    fn parse_expr(&mut self) -> Result<ParseTree, ParseError> {
        let e = self.parse_or()?;
        // conditional expression: `a if c else b`
        if self.check(&TokenKind::If) {
            self.advance();
            let cond = self.parse_or()?;
            self.expect(&TokenKind::Else, "Expected 'else'")?;
            let other = self.parse_expr()?;
            let mut t = ParseTree::new(Tag::IfExpr, e.pos, e.row, e.col, e.len);
            t.set("then", e);
            t.set("cond", cond);
            t.set("else", other);
            return Ok(t);
        }
        Ok(e)
    }

    fn parse_or(&mut self) -> Result<ParseTree, ParseError> {
        let mut left = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            let mut t = ParseTree::new(Tag::Or, left.pos, left.row, left.col, left.len)
                .with_token("or");
            t.set("left", left);
            t.set("right", right);
            left = t;
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ParseTree, ParseError> {
        let mut left = self.parse_not()?;
        while self.check(&TokenKind::And) {
            self.advance();
            let right = self.parse_not()?;
            let mut t = ParseTree::new(Tag::And, left.pos, left.row, left.col, left.len)
                .with_token("and");
            t.set("left", left);
            t.set("right", right);
            left = t;
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<ParseTree, ParseError> {
        if self.check(&TokenKind::Not) {
            let tok = self.advance();
            let sub = self.parse_not()?;
            let mut t = self.node(Tag::Not, &tok).with_token("not");
            t.set("expr", sub);
            return Ok(t);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<ParseTree, ParseError> {
        let left = self.parse_arith()?;
        let op = match self.current().kind {
            TokenKind::Eq => "==",
            TokenKind::Neq => "!=",
            TokenKind::Lte => "<=",
            TokenKind::Gte => ">=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_arith()?;
        let mut t =
            ParseTree::new(Tag::Infix, left.pos, left.row, left.col, left.len).with_token(op);
        t.set("left", left);
        t.set("right", right);
        Ok(t)
    }

    fn parse_arith(&mut self) -> Result<ParseTree, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => "+",
                TokenKind::Minus => "-",
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            let mut t =
                ParseTree::new(Tag::Infix, left.pos, left.row, left.col, left.len).with_token(op);
            t.set("left", left);
            t.set("right", right);
            left = t;
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<ParseTree, ParseError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => "*",
                TokenKind::Slash => "/",
                TokenKind::FloorDiv => "//",
                TokenKind::Percent => "%",
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            let mut t =
                ParseTree::new(Tag::Infix, left.pos, left.row, left.col, left.len).with_token(op);
            t.set("left", left);
            t.set("right", right);
            left = t;
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<ParseTree, ParseError> {
        match self.current().kind {
            TokenKind::Minus => {
                let tok = self.advance();
                let sub = self.parse_factor()?;
                let mut t = self.node(Tag::Unary, &tok).with_token("-");
                t.set("expr", sub);
                Ok(t)
            }
            TokenKind::Plus => {
                self.advance();
                self.parse_factor()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<ParseTree, ParseError> {
        let base = self.parse_postfix()?;
        if self.check(&TokenKind::Power) {
            self.advance();
            let exp = self.parse_factor()?; // right-associative
            let mut t = ParseTree::new(Tag::Infix, base.pos, base.row, base.col, base.len)
                .with_token("**");
            t.set("left", base);
            t.set("right", exp);
            return Ok(t);
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<ParseTree, ParseError> {
        let mut e = self.parse_primary()?;
        loop {
            match self.current().kind {
                TokenKind::LParen => {
                    let args = self.parse_args()?;
                    let mut t =
                        ParseTree::new(Tag::ApplyExpr, e.pos, e.row, e.col, e.len);
                    t.set("name", e);
                    t.set("args", args);
                    e = t;
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.parse_name()?;
                    if self.check(&TokenKind::LParen) {
                        let args = self.parse_args()?;
                        let mut t =
                            ParseTree::new(Tag::MethodExpr, e.pos, e.row, e.col, e.len);
                        t.set("recv", e);
                        t.set("name", name);
                        t.set("args", args);
                        e = t;
                    } else {
                        let mut t =
                            ParseTree::new(Tag::GetField, e.pos, e.row, e.col, e.len);
                        t.set("recv", e);
                        t.set("name", name);
                        e = t;
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    if self.check(&TokenKind::Colon) {
                        // a[:hi]
                        self.advance();
                        let mut t =
                            ParseTree::new(Tag::Slice, e.pos, e.row, e.col, e.len);
                        t.set("recv", e);
                        if !self.check(&TokenKind::RBracket) {
                            let hi = self.parse_expr()?;
                            t.set("high", hi);
                        }
                        self.expect(&TokenKind::RBracket, "Expected ']'")?;
                        e = t;
                    } else {
                        let first = self.parse_expr()?;
                        if self.check(&TokenKind::Colon) {
                            self.advance();
                            let mut t =
                                ParseTree::new(Tag::Slice, e.pos, e.row, e.col, e.len);
                            t.set("recv", e);
                            t.set("low", first);
                            if !self.check(&TokenKind::RBracket) {
                                let hi = self.parse_expr()?;
                                t.set("high", hi);
                            }
                            self.expect(&TokenKind::RBracket, "Expected ']'")?;
                            e = t;
                        } else {
                            self.expect(&TokenKind::RBracket, "Expected ']'")?;
                            let mut t =
                                ParseTree::new(Tag::IndexExpr, e.pos, e.row, e.col, e.len);
                            t.set("recv", e);
                            t.set("index", first);
                            e = t;
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(e)
    }

    /// Call arguments: positional expressions, then `name=value` keyword
    /// pairs collected into one trailing record argument.
    fn parse_args(&mut self) -> Result<ParseTree, ParseError> {
        let lparen = self.expect(&TokenKind::LParen, "Expected '('")?;
        let mut args = self.node(Tag::ListExpr, &lparen);
        let mut kwargs: Option<ParseTree> = None;

        while !self.check(&TokenKind::RParen) {
            let is_keyword = matches!(self.current().kind, TokenKind::Ident(_))
                && matches!(self.peek(1).kind, TokenKind::Assign);
            if is_keyword {
                let key = self.parse_name()?;
                self.advance(); // =
                let value = self.parse_expr()?;
                let mut kv =
                    ParseTree::new(Tag::KeyValue, key.pos, key.row, key.col, key.len)
                        .with_token(key.tokenize().to_string());
                kv.set("key", key);
                kv.set("value", value);
                let data = kwargs.get_or_insert_with(|| {
                    ParseTree::new(Tag::DataExpr, kv.pos, kv.row, kv.col, kv.len)
                });
                data.push(kv);
            } else {
                if kwargs.is_some() {
                    return Err(self.error("Positional argument after keyword argument"));
                }
                let arg = self.parse_expr()?;
                args.push(arg);
            }
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "Expected ')'")?;
        if let Some(data) = kwargs {
            args.push(data);
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<ParseTree, ParseError> {
        match self.current().kind.clone() {
            TokenKind::Num(text) => {
                let tok = self.advance();
                Ok(self.node(Tag::Num, &tok).with_token(text))
            }
            TokenKind::Str(text) => {
                let tok = self.advance();
                Ok(self.node(Tag::Str, &tok).with_token(text))
            }
            TokenKind::FStr(parts) => {
                let tok = self.advance();
                let mut t = self.node(Tag::FormatStr, &tok).with_token(tok.text.clone());
                for (is_expr, text) in parts {
                    let mut seg = self.node(Tag::FormatSeg, &tok);
                    if is_expr {
                        let sub = parse_embedded(&text, &tok)?;
                        seg.set("expr", sub);
                    } else {
                        seg = seg.with_token(text);
                    }
                    t.push(seg);
                }
                Ok(t)
            }
            TokenKind::True => {
                let tok = self.advance();
                Ok(self.node(Tag::TrueLit, &tok).with_token("True"))
            }
            TokenKind::False => {
                let tok = self.advance();
                Ok(self.node(Tag::FalseLit, &tok).with_token("False"))
            }
            TokenKind::None => {
                let tok = self.advance();
                Ok(self.node(Tag::NullLit, &tok).with_token("None"))
            }
            TokenKind::Ident(_) => self.parse_name(),
            TokenKind::LParen => {
                let tok = self.advance();
                let first = self.parse_expr()?;
                if self.check(&TokenKind::Comma) {
                    let mut t = self.node(Tag::TupleExpr, &tok);
                    t.push(first);
                    while self.check(&TokenKind::Comma) {
                        self.advance();
                        if self.check(&TokenKind::RParen) {
                            break;
                        }
                        let e = self.parse_expr()?;
                        t.push(e);
                    }
                    self.expect(&TokenKind::RParen, "Expected ')'")?;
                    Ok(t)
                } else {
                    self.expect(&TokenKind::RParen, "Expected ')'")?;
                    Ok(first)
                }
            }
            TokenKind::LBracket => {
                let tok = self.advance();
                let mut t = self.node(Tag::ListExpr, &tok);
                while !self.check(&TokenKind::RBracket) {
                    let e = self.parse_expr()?;
                    t.push(e);
                    if self.check(&TokenKind::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket, "Expected ']'")?;
                Ok(t)
            }
            TokenKind::LBrace => {
                let tok = self.advance();
                let mut t = self.node(Tag::DataExpr, &tok);
                while !self.check(&TokenKind::RBrace) {
                    let key = match self.current().kind.clone() {
                        TokenKind::Ident(_) => self.parse_name()?,
                        TokenKind::Str(text) => {
                            let ktok = self.advance();
                            let name = text.trim_matches(|c| c == '\'' || c == '"').to_string();
                            self.node(Tag::Name, &ktok).with_token(name)
                        }
                        _ => return Err(self.error("Expected a key")),
                    };
                    self.expect(&TokenKind::Colon, "Expected ':'")?;
                    let value = self.parse_expr()?;
                    let mut kv =
                        ParseTree::new(Tag::KeyValue, key.pos, key.row, key.col, key.len)
                            .with_token(key.tokenize().to_string());
                    kv.set("key", key);
                    kv.set("value", value);
                    t.push(kv);
                    if self.check(&TokenKind::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace, "Expected '}'")?;
                Ok(t)
            }
            other => Err(self.error(format!("Unexpected token: {:?}", other))),
        }
    }
}

/// Parse an expression embedded in an f-string segment. Positions inside the
/// segment are relative to the segment text; the enclosing token supplies
/// the anchor used for diagnostics.
fn parse_embedded(text: &str, anchor: &Token) -> Result<ParseTree, ParseError> {
    let tokens = Lexer::new(text).tokenize().map_err(|e| match e {
        crate::lexer::LexerError::Error { msg, .. } => ParseError::Error {
            msg,
            pos: anchor.pos,
            row: anchor.row,
            col: anchor.col,
            len: anchor.len,
            text: anchor.text.clone(),
        },
    })?;
    let mut parser = Parser::new(tokens);
    parser.parse_expr()
}
