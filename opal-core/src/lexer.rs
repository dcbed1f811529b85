//! Lexer for Opal source text.
//!
//! Two entrypoints exist. [`lex`] (and the crate-internal `lex_from`)
//! feeds the parser: comments are dropped, strings stay whole, and an
//! `Eof` token terminates the stream. [`tokenize`] is the standalone
//! operation: it works over an arbitrary byte sub-range of a buffer,
//! optionally keeps comment tokens and splits interpolated strings
//! into segments, mutates nothing shared, and appends no `Eof`.

use crate::diagnostic::Diagnostic;
use crate::span::{FileId, Span};

/// Kind of a token produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Special
    Eof,
    Comment,

    // Identifiers and literals
    Ident,
    IntLiteral,
    BoolLiteral, // true / false
    StringLiteral,
    /// A literal segment of an interpolated string (split mode only).
    StringSegment,
    /// The `\(` opening an interpolation (split mode only).
    InterpolationStart,
    /// The `)` closing an interpolation (split mode only).
    InterpolationEnd,

    // Punctuation
    LParen,   // (
    RParen,   // )
    LBrace,   // {
    RBrace,   // }
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Colon,    // :
    Semi,     // ;
    At,       // @
    Equal,    // =
    Arrow,    // ->

    /// Any other maximal run of symbolic characters, e.g. `+` or `<+>`.
    OperatorSym,

    // Keywords
    Import,
    Operator,
    Let,
    Fn,
    Pub,
    Return,
    Mir,
}

/// A single token with its kind and span.
///
/// `text_start` / `text_end` are byte offsets into the original source
/// string; for string literals and segments they exclude the quotes
/// and escapes so higher layers can slice the content directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text_start: u32,
    pub text_end: u32,
}

/// Result of lexing a source buffer for the parser.
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Options for the standalone [`tokenize`] operation.
#[derive(Debug, Clone, Copy)]
pub struct TokenizeOptions {
    pub keep_comments: bool,
    pub split_interpolated: bool,
}

impl Default for TokenizeOptions {
    fn default() -> Self {
        TokenizeOptions {
            keep_comments: true,
            split_interpolated: true,
        }
    }
}

/// Lex a whole buffer for parsing: no comments, whole strings, `Eof`
/// appended at the end.
pub fn lex(file_id: FileId, source: &str) -> LexResult {
    lex_from(file_id, source, 0)
}

/// Lex from a byte offset to the end of the buffer. Used by resumable
/// parsing so previously consumed input is never lexed twice.
pub(crate) fn lex_from(file_id: FileId, source: &str, offset: u32) -> LexResult {
    let mut lexer = Lexer::new(
        file_id,
        source,
        offset,
        source.len() as u32,
        TokenizeOptions {
            keep_comments: false,
            split_interpolated: false,
        },
    );
    let tokens = lexer.run(true);
    LexResult {
        tokens,
        diagnostics: lexer.diagnostics,
    }
}

/// Tokenize the byte range `[offset, end_offset)` of a buffer, with
/// `end_offset == 0` meaning "to the end". Returns a finite,
/// order-preserving token sequence and performs no mutation of shared
/// state; diagnostics are not collected on this path.
pub fn tokenize(
    source: &str,
    file_id: FileId,
    offset: u32,
    end_offset: u32,
    options: TokenizeOptions,
) -> Vec<Token> {
    let end = if end_offset == 0 {
        source.len() as u32
    } else {
        end_offset.min(source.len() as u32)
    };
    let mut lexer = Lexer::new(file_id, source, offset, end, options);
    lexer.run(false)
}

struct Lexer<'src> {
    file_id: FileId,
    source: &'src str,
    bytes: &'src [u8],
    index: usize,
    end: usize,
    options: TokenizeOptions,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    fn new(
        file_id: FileId,
        source: &'src str,
        offset: u32,
        end: u32,
        options: TokenizeOptions,
    ) -> Lexer<'src> {
        Lexer {
            file_id,
            source,
            bytes: source.as_bytes(),
            index: offset as usize,
            end: end as usize,
            options,
            diagnostics: Vec::new(),
        }
    }

    fn run(&mut self, append_eof: bool) -> Vec<Token> {
        let mut tokens = Vec::new();
        while self.peek().is_some() {
            self.scan_token(&mut tokens);
        }
        if append_eof {
            let pos = self.index as u32;
            tokens.push(Token {
                kind: TokenKind::Eof,
                span: Span::empty(self.file_id, pos),
                text_start: pos,
                text_end: pos,
            });
        }
        tokens
    }

    /// Scan one lexical element, pushing zero or more tokens.
    fn scan_token(&mut self, tokens: &mut Vec<Token>) {
        let Some(ch) = self.peek() else { return };
        if is_whitespace(ch) {
            self.bump();
            return;
        }

        let start = self.index as u32;
        match ch {
            b'(' => self.punct(tokens, TokenKind::LParen, start),
            b')' => self.punct(tokens, TokenKind::RParen, start),
            b'{' => self.punct(tokens, TokenKind::LBrace, start),
            b'}' => self.punct(tokens, TokenKind::RBrace, start),
            b'[' => self.punct(tokens, TokenKind::LBracket, start),
            b']' => self.punct(tokens, TokenKind::RBracket, start),
            b',' => self.punct(tokens, TokenKind::Comma, start),
            b':' => self.punct(tokens, TokenKind::Colon, start),
            b';' => self.punct(tokens, TokenKind::Semi, start),
            b'@' => self.punct(tokens, TokenKind::At, start),
            b'/' if self.peek_next() == Some(b'/') => self.scan_comment(tokens, start),
            b'"' => self.scan_string(tokens, start),
            b'0'..=b'9' => self.scan_number(tokens, start),
            _ if is_operator_char(ch) => self.scan_operator(tokens, start),
            _ if is_ident_start(ch) => self.scan_ident_or_keyword(tokens, start),
            _ => {
                self.bump();
                let span = Span::new(self.file_id, start, self.index as u32);
                self.diagnostics
                    .push(Diagnostic::error("unexpected character", span).with_code("E0001"));
            }
        }
    }

    fn punct(&mut self, tokens: &mut Vec<Token>, kind: TokenKind, start: u32) {
        self.bump();
        tokens.push(self.simple(kind, start));
    }

    fn simple(&self, kind: TokenKind, start: u32) -> Token {
        let end = self.index as u32;
        Token {
            kind,
            span: Span::new(self.file_id, start, end),
            text_start: start,
            text_end: end,
        }
    }

    fn scan_comment(&mut self, tokens: &mut Vec<Token>, start: u32) {
        while let Some(ch) = self.peek() {
            if ch == b'\n' {
                break;
            }
            self.bump();
        }
        if self.options.keep_comments {
            tokens.push(self.simple(TokenKind::Comment, start));
        }
    }

    fn scan_number(&mut self, tokens: &mut Vec<Token>, start: u32) {
        while let Some(ch) = self.peek() {
            if matches!(ch, b'0'..=b'9' | b'_') {
                self.bump();
            } else {
                break;
            }
        }
        tokens.push(self.simple(TokenKind::IntLiteral, start));
    }

    fn scan_operator(&mut self, tokens: &mut Vec<Token>, start: u32) {
        while let Some(ch) = self.peek() {
            if is_operator_char(ch) {
                self.bump();
            } else {
                break;
            }
        }
        let end = self.index as u32;
        let kind = match &self.source[start as usize..end as usize] {
            "=" => TokenKind::Equal,
            "->" => TokenKind::Arrow,
            _ => TokenKind::OperatorSym,
        };
        tokens.push(self.simple(kind, start));
    }

    fn scan_ident_or_keyword(&mut self, tokens: &mut Vec<Token>, start: u32) {
        while let Some(ch) = self.peek() {
            if is_ident_continue(ch) {
                self.bump();
            } else {
                break;
            }
        }
        let end = self.index as u32;
        let kind = match &self.source[start as usize..end as usize] {
            "import" => TokenKind::Import,
            "operator" => TokenKind::Operator,
            "let" => TokenKind::Let,
            "fn" => TokenKind::Fn,
            "pub" => TokenKind::Pub,
            "return" => TokenKind::Return,
            "mir" => TokenKind::Mir,
            "true" | "false" => TokenKind::BoolLiteral,
            _ => TokenKind::Ident,
        };
        tokens.push(self.simple(kind, start));
    }

    fn scan_string(&mut self, tokens: &mut Vec<Token>, start: u32) {
        // Opening quote.
        self.bump();

        if self.options.split_interpolated {
            self.scan_string_split(tokens, start);
            return;
        }

        let content_start = self.index as u32;
        while let Some(ch) = self.peek() {
            match ch {
                b'"' => {
                    let content_end = self.index as u32;
                    self.bump();
                    tokens.push(Token {
                        kind: TokenKind::StringLiteral,
                        span: Span::new(self.file_id, start, self.index as u32),
                        text_start: content_start,
                        text_end: content_end,
                    });
                    return;
                }
                b'\\' => {
                    // Escape sequence: backslash plus one char.
                    self.bump();
                    if self.peek().is_some() {
                        self.bump();
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
        self.unterminated_string(start);
    }

    /// Split mode: `"a \(x + 1) b"` yields a segment for `a `, an
    /// interpolation-start token, the tokens of the inner expression,
    /// an interpolation-end token, and a segment for ` b`.
    fn scan_string_split(&mut self, tokens: &mut Vec<Token>, start: u32) {
        let mut segment_start = self.index as u32;
        while let Some(ch) = self.peek() {
            match ch {
                b'"' => {
                    self.push_segment(tokens, segment_start);
                    self.bump();
                    return;
                }
                b'\\' if self.peek_next() == Some(b'(') => {
                    self.push_segment(tokens, segment_start);
                    let interp_start = self.index as u32;
                    self.bump(); // backslash
                    self.bump(); // paren
                    tokens.push(self.simple(TokenKind::InterpolationStart, interp_start));
                    self.scan_interpolation(tokens);
                    segment_start = self.index as u32;
                }
                b'\\' => {
                    self.bump();
                    if self.peek().is_some() {
                        self.bump();
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
        self.unterminated_string(start);
    }

    /// Lex normal tokens until the parenthesis that opened the
    /// interpolation closes, turning that closer into its own kind.
    fn scan_interpolation(&mut self, tokens: &mut Vec<Token>) {
        let mut depth = 0usize;
        while let Some(ch) = self.peek() {
            if is_whitespace(ch) {
                self.bump();
                continue;
            }
            if ch == b')' && depth == 0 {
                let start = self.index as u32;
                self.bump();
                tokens.push(self.simple(TokenKind::InterpolationEnd, start));
                return;
            }
            let before = tokens.len();
            self.scan_token(tokens);
            for token in &tokens[before..] {
                match token.kind {
                    TokenKind::LParen => depth += 1,
                    TokenKind::RParen => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
        }
    }

    fn push_segment(&mut self, tokens: &mut Vec<Token>, segment_start: u32) {
        let segment_end = self.index as u32;
        if segment_end > segment_start {
            tokens.push(Token {
                kind: TokenKind::StringSegment,
                span: Span::new(self.file_id, segment_start, segment_end),
                text_start: segment_start,
                text_end: segment_end,
            });
        }
    }

    fn unterminated_string(&mut self, start: u32) {
        let span = Span::new(self.file_id, start, self.index as u32);
        self.diagnostics
            .push(Diagnostic::error("unterminated string literal", span).with_code("E0002"));
    }

    fn peek(&self) -> Option<u8> {
        if self.index < self.end {
            Some(self.bytes[self.index])
        } else {
            None
        }
    }

    fn peek_next(&self) -> Option<u8> {
        if self.index + 1 < self.end {
            Some(self.bytes[self.index + 1])
        } else {
            None
        }
    }

    fn bump(&mut self) {
        if self.index < self.end {
            self.index += 1;
        }
    }
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

fn is_operator_char(ch: u8) -> bool {
    matches!(
        ch,
        b'+' | b'-' | b'*' | b'/' | b'<' | b'>' | b'=' | b'!' | b'&' | b'|' | b'^' | b'%' | b'~'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_declarations_and_operators() {
        let result = lex(FileId(0), "let x = 1 + 2");
        assert!(result.diagnostics.is_empty());
        assert_eq!(
            kinds(&result.tokens),
            vec![
                TokenKind::Let,
                TokenKind::Ident,
                TokenKind::Equal,
                TokenKind::IntLiteral,
                TokenKind::OperatorSym,
                TokenKind::IntLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_arrow_and_custom_operators() {
        let result = lex(FileId(0), "fn f() -> Int { a <+> b }");
        let ops: Vec<_> = result
            .tokens
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::Arrow | TokenKind::OperatorSym))
            .map(|t| t.kind)
            .collect();
        assert_eq!(ops, vec![TokenKind::Arrow, TokenKind::OperatorSym]);
    }

    #[test]
    fn tokenize_respects_sub_ranges() {
        let source = "import Foo\nprint(1)";
        let all = tokenize(source, FileId(0), 0, 0, TokenizeOptions::default());
        let tail = tokenize(source, FileId(0), 11, 0, TokenizeOptions::default());
        assert_eq!(all.len(), tail.len() + 2);
        assert_eq!(tail[0].kind, TokenKind::Ident);
        assert_eq!(&source[tail[0].text_start as usize..tail[0].text_end as usize], "print");
    }

    #[test]
    fn comment_inclusion_only_adds_comment_tokens() {
        let source = "let a = 1 // trailing note\nprint(a)";
        let with = tokenize(
            source,
            FileId(0),
            0,
            0,
            TokenizeOptions {
                keep_comments: true,
                split_interpolated: true,
            },
        );
        let without = tokenize(
            source,
            FileId(0),
            0,
            0,
            TokenizeOptions {
                keep_comments: false,
                split_interpolated: true,
            },
        );
        let filtered: Vec<_> = with
            .iter()
            .filter(|t| t.kind != TokenKind::Comment)
            .cloned()
            .collect();
        assert!(with.iter().any(|t| t.kind == TokenKind::Comment));
        assert_eq!(filtered, without);
    }

    #[test]
    fn splits_interpolated_strings_into_segments() {
        let source = "\"a \\(x + (1)) b\"";
        let split = tokenize(source, FileId(0), 0, 0, TokenizeOptions::default());
        assert_eq!(
            kinds(&split),
            vec![
                TokenKind::StringSegment,
                TokenKind::InterpolationStart,
                TokenKind::Ident,
                TokenKind::OperatorSym,
                TokenKind::LParen,
                TokenKind::IntLiteral,
                TokenKind::RParen,
                TokenKind::InterpolationEnd,
                TokenKind::StringSegment,
            ]
        );

        let whole = tokenize(
            source,
            FileId(0),
            0,
            0,
            TokenizeOptions {
                keep_comments: true,
                split_interpolated: false,
            },
        );
        assert_eq!(kinds(&whole), vec![TokenKind::StringLiteral]);
    }

    #[test]
    fn reports_unterminated_strings() {
        let result = lex(FileId(0), "let s = \"oops");
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.message.contains("unterminated")));
    }
}
