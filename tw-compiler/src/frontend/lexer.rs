//! Tokenizer for `.tw` source text.
//!
//! The token automaton is a [`logos`] lexer; the [`Lexer`] wrapper converts
//! byte spans into 1-based line/column positions, unescapes string literals
//! and keeps scanning after an error so the parser always sees a complete
//! token stream ending in [`TokenKind::Eof`].

use logos::Logos;

/// Raw automaton tokens. `Eof` and `Unknown` are synthesized by the
/// [`Lexer`] wrapper and never produced by the automaton itself.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
enum RawToken {
    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,

    #[regex(r#""([^"\\]|\\.)*""#)]
    #[regex(r"'([^'\\]|\\.)*'")]
    Str,

    // Keywords take precedence over the identifier regex.
    #[token("let")]
    Let,
    #[token("var")]
    Var,
    #[token("const")]
    Const,
    #[token("function")]
    Function,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("return")]
    Return,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*")]
    Identifier,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Mul,
    #[token("/")]
    Div,
    #[token("%")]
    Mod,
    #[token("=")]
    Assign,
    #[token("==")]
    Eq,
    #[token("!=")]
    Neq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Not,

    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    /// Matched only when the full block-comment skip above cannot, i.e. the
    /// comment is unterminated.
    #[token("/*")]
    BlockCommentStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    Str,
    Identifier,
    Let,
    Var,
    Const,
    Function,
    If,
    Else,
    While,
    For,
    Return,
    True,
    False,
    Null,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Assign,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Not,
    Semicolon,
    Comma,
    Dot,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Eof,
    Unknown,
}

fn kind_of(raw: RawToken) -> TokenKind {
    match raw {
        RawToken::Number => TokenKind::Number,
        RawToken::Str => TokenKind::Str,
        RawToken::Let => TokenKind::Let,
        RawToken::Var => TokenKind::Var,
        RawToken::Const => TokenKind::Const,
        RawToken::Function => TokenKind::Function,
        RawToken::If => TokenKind::If,
        RawToken::Else => TokenKind::Else,
        RawToken::While => TokenKind::While,
        RawToken::For => TokenKind::For,
        RawToken::Return => TokenKind::Return,
        RawToken::True => TokenKind::True,
        RawToken::False => TokenKind::False,
        RawToken::Null => TokenKind::Null,
        RawToken::Identifier => TokenKind::Identifier,
        RawToken::Plus => TokenKind::Plus,
        RawToken::Minus => TokenKind::Minus,
        RawToken::Mul => TokenKind::Mul,
        RawToken::Div => TokenKind::Div,
        RawToken::Mod => TokenKind::Mod,
        RawToken::Assign => TokenKind::Assign,
        RawToken::Eq => TokenKind::Eq,
        RawToken::Neq => TokenKind::Neq,
        RawToken::Lt => TokenKind::Lt,
        RawToken::Le => TokenKind::Le,
        RawToken::Gt => TokenKind::Gt,
        RawToken::Ge => TokenKind::Ge,
        RawToken::AndAnd => TokenKind::AndAnd,
        RawToken::OrOr => TokenKind::OrOr,
        RawToken::Not => TokenKind::Not,
        RawToken::Semicolon => TokenKind::Semicolon,
        RawToken::Comma => TokenKind::Comma,
        RawToken::Dot => TokenKind::Dot,
        RawToken::LParen => TokenKind::LParen,
        RawToken::RParen => TokenKind::RParen,
        RawToken::LBrace => TokenKind::LBrace,
        RawToken::RBrace => TokenKind::RBrace,
        RawToken::LBracket => TokenKind::LBracket,
        RawToken::RBracket => TokenKind::RBracket,
        RawToken::BlockCommentStart => TokenKind::Unknown,
    }
}

/// A token with its source position. For string literals the lexeme holds
/// the unescaped contents (without quotes); for everything else it is the
/// matched text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: u32,
    pub column: u32,
}

pub struct Lexer<'a> {
    source: &'a str,
    raw: logos::Lexer<'a, RawToken>,
    line_starts: Vec<usize>,
    errors: usize,
    at_end: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            source,
            raw: RawToken::lexer(source),
            line_starts,
            errors: 0,
            at_end: false,
        }
    }

    /// Number of errors reported so far.
    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn next_token(&mut self) -> Token {
        if self.at_end {
            return self.eof_token();
        }
        match self.raw.next() {
            None => {
                self.at_end = true;
                self.eof_token()
            }
            Some(Ok(RawToken::BlockCommentStart)) => {
                let (line, column) = self.position(self.raw.span().start);
                self.report("Unterminated block comment", line, column);
                // The comment swallows everything up to end of input.
                self.at_end = true;
                Token {
                    kind: TokenKind::Unknown,
                    lexeme: String::new(),
                    line,
                    column,
                }
            }
            Some(Ok(raw)) => {
                let span = self.raw.span();
                let (line, column) = self.position(span.start);
                let kind = kind_of(raw);
                let lexeme = match kind {
                    TokenKind::Str => unescape(&self.source[span]),
                    _ => self.source[span].to_string(),
                };
                Token {
                    kind,
                    lexeme,
                    line,
                    column,
                }
            }
            Some(Err(())) => {
                let span = self.raw.span();
                let (line, column) = self.position(span.start);
                let ch = self.source[span.start..].chars().next().unwrap_or('\0');
                if ch == '"' || ch == '\'' {
                    self.report("Unterminated string", line, column);
                    // No closing quote anywhere ahead, so the rest of the
                    // input belongs to the broken literal.
                    self.at_end = true;
                    Token {
                        kind: TokenKind::Unknown,
                        lexeme: String::new(),
                        line,
                        column,
                    }
                } else {
                    self.report(&format!("Unexpected character: {ch}"), line, column);
                    Token {
                        kind: TokenKind::Unknown,
                        lexeme: ch.to_string(),
                        line,
                        column,
                    }
                }
            }
        }
    }

    /// Scan the whole input. The returned stream always ends with an
    /// [`TokenKind::Eof`] token.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn eof_token(&self) -> Token {
        let (line, column) = self.position(self.source.len());
        Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            line,
            column,
        }
    }

    fn position(&self, offset: usize) -> (u32, u32) {
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let column = offset - self.line_starts[line] + 1;
        (line as u32 + 1, column as u32)
    }

    fn report(&mut self, message: &str, line: u32, column: u32) {
        eprintln!("Lexer Error at line {line}, column {column}: {message}");
        self.errors += 1;
    }
}

fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            // Any other escape yields the character itself.
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).tokenize().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_declaration() {
        assert_eq!(
            kinds("let x = 1.5;"),
            vec![
                TokenKind::Let,
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Number,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("while whilex $x _y"),
            vec![
                TokenKind::While,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(
            kinds("== != <= >= && || = ! < >"),
            vec![
                TokenKind::Eq,
                TokenKind::Neq,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Assign,
                TokenKind::Not,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn positions_are_one_based() {
        let tokens = Lexer::new("let x;\n  x = 2;").tokenize();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (1, 5));
        assert_eq!((tokens[3].line, tokens[3].column), (2, 3));
    }

    #[test]
    fn every_stream_ends_with_eof() {
        for source in ["", "x", "// comment only", "1 + 2"] {
            let tokens = Lexer::new(source).tokenize();
            assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
        }
    }

    #[test]
    fn string_escapes() {
        let tokens = Lexer::new(r#""a\n\t\\\"b" 'it\'s' "\q""#).tokenize();
        assert_eq!(tokens[0].lexeme, "a\n\t\\\"b");
        assert_eq!(tokens[1].lexeme, "it's");
        assert_eq!(tokens[2].lexeme, "q");
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("1 // line\n/* block\n * more */ 2"),
            vec![TokenKind::Number, TokenKind::Number, TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let mut lexer = Lexer::new("let s = \"abc");
        let tokens = lexer.tokenize();
        assert_eq!(lexer.error_count(), 1);
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Unknown));
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn unterminated_block_comment_is_an_error() {
        let mut lexer = Lexer::new("1 /* never closed");
        let tokens = lexer.tokenize();
        assert_eq!(lexer.error_count(), 1);
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![TokenKind::Number, TokenKind::Unknown, TokenKind::Eof]
        );
    }

    #[test]
    fn unexpected_character_keeps_scanning() {
        let mut lexer = Lexer::new("1 @ 2");
        let tokens = lexer.tokenize();
        assert_eq!(lexer.error_count(), 1);
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Number,
                TokenKind::Unknown,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }
}
