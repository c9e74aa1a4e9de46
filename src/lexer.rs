use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals. Numbers keep their raw text so the transpiler can
    // normalize full-width digits and report the Zenkaku warning itself.
    Num(String),
    Str(String), // raw text including quotes
    FStr(Vec<(bool, String)>), // (is_expr, text)
    // Identifiers
    Ident(String),
    // Keywords
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Def,
    Return,
    Break,
    Continue,
    Pass,
    Import,
    As,
    And,
    Or,
    Not,
    True,
    False,
    None,
    // Operators
    Eq,          // ==
    Neq,         // !=
    Lte,         // <=
    Gte,         // >=
    Lt,          // <
    Gt,          // >
    Assign,      // =
    PlusAssign,  // +=
    MinusAssign, // -=
    StarAssign,  // *=
    SlashAssign, // /=
    Plus,        // +
    Minus,       // -
    Power,       // **
    Star,        // *
    FloorDiv,    // //
    Slash,       // /
    Percent,     // %
    LParen,      // (
    RParen,      // )
    LBracket,    // [
    RBracket,    // ]
    LBrace,      // {
    RBrace,      // }
    Comma,       // ,
    Colon,       // :
    Dot,         // .
    // Structure
    Indent,
    Dedent,
    Newline,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
    pub row: usize,
    pub col: usize,
    pub len: usize,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum LexerError {
    #[error("Lexer error [{row}:{col}]: {msg}")]
    Error {
        msg: String,
        row: usize,
        col: usize,
    },
}

fn keyword(s: &str) -> Option<TokenKind> {
    match s {
        "if" => Some(TokenKind::If),
        "elif" => Some(TokenKind::Elif),
        "else" => Some(TokenKind::Else),
        "while" => Some(TokenKind::While),
        "for" => Some(TokenKind::For),
        "in" => Some(TokenKind::In),
        "def" => Some(TokenKind::Def),
        "return" => Some(TokenKind::Return),
        "break" => Some(TokenKind::Break),
        "continue" => Some(TokenKind::Continue),
        "pass" => Some(TokenKind::Pass),
        "import" => Some(TokenKind::Import),
        "as" => Some(TokenKind::As),
        "and" => Some(TokenKind::And),
        "or" => Some(TokenKind::Or),
        "not" => Some(TokenKind::Not),
        "True" => Some(TokenKind::True),
        "False" => Some(TokenKind::False),
        "None" => Some(TokenKind::None),
        _ => Option::None,
    }
}

/// Full-width digits ('０'..'９') count as digits so that Zenkaku numerals
/// tokenize as numbers; the transpiler converts them and warns.
fn is_digit(ch: char) -> bool {
    ch.is_ascii_digit() || ('\u{FF10}'..='\u{FF19}').contains(&ch)
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    row: usize,
    col: usize,
    indent_stack: Vec<usize>,
    at_line_start: bool,
    paren_depth: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            row: 1,
            col: 1,
            indent_stack: vec![0],
            at_line_start: true,
            paren_depth: 0,
        }
    }

    fn error(&self, msg: impl Into<String>) -> LexerError {
        LexerError::Error {
            msg: msg.into(),
            row: self.row,
            col: self.col,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.row += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();

        while self.pos < self.chars.len() {
            self.scan_token(&mut tokens)?;
        }

        // Close the last logical line, then emit remaining DEDENTs
        let last_is_structural = tokens
            .last()
            .map(|t| {
                matches!(
                    t.kind,
                    TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
                )
            })
            .unwrap_or(true);
        if !last_is_structural {
            tokens.push(self.structural(TokenKind::Newline));
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            tokens.push(self.structural(TokenKind::Dedent));
        }

        tokens.push(self.structural(TokenKind::Eof));
        Ok(tokens)
    }

    fn structural(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            pos: self.pos,
            row: self.row,
            col: self.col,
            len: 0,
            text: String::new(),
        }
    }

    fn scan_token(&mut self, tokens: &mut Vec<Token>) -> Result<(), LexerError> {
        if self.at_line_start && self.paren_depth == 0 {
            self.handle_indentation(tokens)?;
            if self.pos >= self.chars.len() {
                return Ok(());
            }
        }

        let ch = match self.current() {
            Some(c) => c,
            Option::None => return Ok(()),
        };

        if ch == ' ' || ch == '\t' {
            self.advance();
            return Ok(());
        }

        if ch == '\n' {
            let pos = self.pos;
            let row = self.row;
            let col = self.col;
            self.advance();

            // Inside brackets a newline is just whitespace (implicit continuation)
            if self.paren_depth > 0 {
                return Ok(());
            }

            let last_is_structural = tokens
                .last()
                .map(|t| {
                    matches!(
                        t.kind,
                        TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
                    )
                })
                .unwrap_or(true);
            if !tokens.is_empty() && !last_is_structural {
                tokens.push(Token {
                    kind: TokenKind::Newline,
                    pos,
                    row,
                    col,
                    len: 1,
                    text: String::new(),
                });
            }
            self.at_line_start = true;
            return Ok(());
        }

        if ch == '\r' {
            self.advance();
            return Ok(());
        }

        if ch == '#' {
            self.skip_comment();
            return Ok(());
        }

        // f-strings
        if (ch == 'f' || ch == 'F') && matches!(self.peek(1), Some('"') | Some('\'')) {
            let tok = self.scan_fstring()?;
            tokens.push(tok);
            return Ok(());
        }

        if ch == '"' || ch == '\'' {
            let tok = self.scan_string()?;
            tokens.push(tok);
            return Ok(());
        }

        if is_digit(ch) {
            let tok = self.scan_number();
            tokens.push(tok);
            return Ok(());
        }

        if ch.is_alphabetic() || ch == '_' {
            let tok = self.scan_identifier();
            tokens.push(tok);
            return Ok(());
        }

        let tok = self.scan_operator()?;
        tokens.push(tok);
        Ok(())
    }

    fn handle_indentation(&mut self, tokens: &mut Vec<Token>) -> Result<(), LexerError> {
        self.at_line_start = false;
        let mut indent = 0;

        while self.pos < self.chars.len() && self.chars[self.pos] == ' ' {
            indent += 1;
            self.pos += 1;
            self.col += 1;
        }

        // Empty line or comment-only line — no indent/dedent
        if self.pos < self.chars.len() {
            let ch = self.chars[self.pos];
            if ch == '\n' || ch == '\r' || ch == '#' {
                return Ok(());
            }
        } else {
            return Ok(());
        }

        let current = *self.indent_stack.last().unwrap();
        let pos = self.pos;
        let row = self.row;

        if indent > current {
            self.indent_stack.push(indent);
            tokens.push(Token {
                kind: TokenKind::Indent,
                pos,
                row,
                col: 1,
                len: 0,
                text: String::new(),
            });
        } else if indent < current {
            while self.indent_stack.len() > 1 && *self.indent_stack.last().unwrap() > indent {
                self.indent_stack.pop();
                tokens.push(Token {
                    kind: TokenKind::Dedent,
                    pos,
                    row,
                    col: 1,
                    len: 0,
                    text: String::new(),
                });
            }
            if *self.indent_stack.last().unwrap() != indent {
                return Err(self.error(format!("Invalid indentation level: {}", indent)));
            }
        }

        Ok(())
    }

    fn skip_comment(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos] != '\n' {
            self.advance();
        }
    }

    fn scan_string(&mut self) -> Result<Token, LexerError> {
        let start = self.pos;
        let row = self.row;
        let col = self.col;
        let quote = self.advance().unwrap();

        loop {
            match self.current() {
                Option::None | Some('\n') => {
                    return Err(self.error("Unterminated string literal"))
                }
                Some('\\') => {
                    self.advance();
                    self.advance();
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        Ok(Token {
            kind: TokenKind::Str(text.clone()),
            pos: start,
            row,
            col,
            len: self.pos - start,
            text,
        })
    }

    fn scan_fstring(&mut self) -> Result<Token, LexerError> {
        let start = self.pos;
        let row = self.row;
        let col = self.col;
        self.advance(); // f
        let quote = self.advance().unwrap();

        let mut parts: Vec<(bool, String)> = Vec::new();
        let mut current = String::new();

        loop {
            match self.current() {
                Option::None | Some('\n') => {
                    return Err(self.error("Unterminated string literal"))
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('{') => {
                    if !current.is_empty() {
                        parts.push((false, current.clone()));
                        current.clear();
                    }
                    self.advance();
                    let mut expr_text = String::new();
                    loop {
                        match self.current() {
                            Option::None | Some('\n') => {
                                return Err(self.error("Unterminated interpolation"))
                            }
                            Some('}') => {
                                self.advance();
                                break;
                            }
                            Some(c) => {
                                expr_text.push(c);
                                self.advance();
                            }
                        }
                    }
                    parts.push((true, expr_text));
                }
                Some('\\') => {
                    current.push('\\');
                    self.advance();
                    if let Some(c) = self.advance() {
                        current.push(c);
                    }
                }
                Some(c) => {
                    current.push(c);
                    self.advance();
                }
            }
        }
        if !current.is_empty() {
            parts.push((false, current));
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        Ok(Token {
            kind: TokenKind::FStr(parts),
            pos: start,
            row,
            col,
            len: self.pos - start,
            text,
        })
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos;
        let row = self.row;
        let col = self.col;

        while matches!(self.current(), Some(c) if is_digit(c)) {
            self.advance();
        }
        if self.current() == Some('.') && matches!(self.peek(1), Some(c) if is_digit(c)) {
            self.advance();
            while matches!(self.current(), Some(c) if is_digit(c)) {
                self.advance();
            }
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        Token {
            kind: TokenKind::Num(text.clone()),
            pos: start,
            row,
            col,
            len: self.pos - start,
            text,
        }
    }

    fn scan_identifier(&mut self) -> Token {
        let start = self.pos;
        let row = self.row;
        let col = self.col;

        while matches!(self.current(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.advance();
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        let kind = keyword(&text).unwrap_or_else(|| TokenKind::Ident(text.clone()));
        Token {
            kind,
            pos: start,
            row,
            col,
            len: self.pos - start,
            text,
        }
    }

    fn scan_operator(&mut self) -> Result<Token, LexerError> {
        let start = self.pos;
        let row = self.row;
        let col = self.col;
        let ch = self.advance().unwrap();
        let next = self.current();

        let kind = match (ch, next) {
            ('=', Some('=')) => {
                self.advance();
                TokenKind::Eq
            }
            ('!', Some('=')) => {
                self.advance();
                TokenKind::Neq
            }
            ('<', Some('=')) => {
                self.advance();
                TokenKind::Lte
            }
            ('>', Some('=')) => {
                self.advance();
                TokenKind::Gte
            }
            ('+', Some('=')) => {
                self.advance();
                TokenKind::PlusAssign
            }
            ('-', Some('=')) => {
                self.advance();
                TokenKind::MinusAssign
            }
            ('*', Some('=')) => {
                self.advance();
                TokenKind::StarAssign
            }
            ('/', Some('=')) => {
                self.advance();
                TokenKind::SlashAssign
            }
            ('*', Some('*')) => {
                self.advance();
                TokenKind::Power
            }
            ('/', Some('/')) => {
                self.advance();
                TokenKind::FloorDiv
            }
            ('=', _) => TokenKind::Assign,
            ('<', _) => TokenKind::Lt,
            ('>', _) => TokenKind::Gt,
            ('+', _) => TokenKind::Plus,
            ('-', _) => TokenKind::Minus,
            ('*', _) => TokenKind::Star,
            ('/', _) => TokenKind::Slash,
            ('%', _) => TokenKind::Percent,
            ('(', _) => {
                self.paren_depth += 1;
                TokenKind::LParen
            }
            (')', _) => {
                self.paren_depth = self.paren_depth.saturating_sub(1);
                TokenKind::RParen
            }
            ('[', _) => {
                self.paren_depth += 1;
                TokenKind::LBracket
            }
            (']', _) => {
                self.paren_depth = self.paren_depth.saturating_sub(1);
                TokenKind::RBracket
            }
            ('{', _) => {
                self.paren_depth += 1;
                TokenKind::LBrace
            }
            ('}', _) => {
                self.paren_depth = self.paren_depth.saturating_sub(1);
                TokenKind::RBrace
            }
            (',', _) => TokenKind::Comma,
            (':', _) => TokenKind::Colon,
            ('.', _) => TokenKind::Dot,
            _ => return Err(self.error(format!("Unexpected character: {:?}", ch))),
        };

        let text: String = self.chars[start..self.pos].iter().collect();
        Ok(Token {
            kind,
            pos: start,
            row,
            col,
            len: self.pos - start,
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .expect("lex failed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_assignment() {
        let ks = kinds("x = 1\n");
        assert_eq!(
            ks,
            vec![
                TokenKind::Ident("x".to_string()),
                TokenKind::Assign,
                TokenKind::Num("1".to_string()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_indent_dedent() {
        let ks = kinds("while True:\n    x = 1\ny = 2\n");
        assert!(ks.contains(&TokenKind::Indent));
        assert!(ks.contains(&TokenKind::Dedent));
    }

    #[test]
    fn test_fullwidth_digits_lex_as_numbers() {
        let ks = kinds("x = １２３\n");
        assert!(ks.contains(&TokenKind::Num("１２３".to_string())));
    }

    #[test]
    fn test_floordiv_vs_slash() {
        let ks = kinds("1//2/3\n");
        assert!(ks.contains(&TokenKind::FloorDiv));
        assert!(ks.contains(&TokenKind::Slash));
    }

    #[test]
    fn test_fstring_parts() {
        let ks = kinds("f'a{x}b'\n");
        match &ks[0] {
            TokenKind::FStr(parts) => {
                assert_eq!(
                    parts,
                    &vec![
                        (false, "a".to_string()),
                        (true, "x".to_string()),
                        (false, "b".to_string())
                    ]
                );
            }
            other => panic!("expected FStr, got {:?}", other),
        }
    }

    #[test]
    fn test_newline_suppressed_inside_brackets() {
        let ks = kinds("xs = [1,\n      2]\n");
        let newlines = ks.iter().filter(|k| **k == TokenKind::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn test_unterminated_string_is_error() {
        assert!(Lexer::new("x = 'abc\n").tokenize().is_err());
    }
}
