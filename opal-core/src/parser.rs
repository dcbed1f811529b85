//! Parsing sessions over a source unit.
//!
//! [`parse_into_source_unit`] consumes top-level elements until the end
//! of the buffer or, in main-file mode, until a statement with side
//! effects has just been appended. A [`PersistentParseState`] makes the
//! session resumable: the byte cursor and the deferred-body registry
//! are read from and written back to it, so a REPL-style caller can
//! alternate "parse one line, act on it" without re-lexing prior
//! input. A [`ParserLinkState`] additionally lets the parser recognize
//! inline low-level IR and attach it to an in-progress MIR module.

use std::collections::VecDeque;

use crate::ast::{
    Expr, ExprKind, FnBody, FnDecl, GenericParam, GenericParamList, ImportDecl, Item, ItemKind,
    LetDecl, OperatorDecl, Param, Stmt, TypeRepr,
};
use crate::context::{CompilationContext, SourceUnit};
use crate::diagnostic::Diagnostic;
use crate::intern::Symbol;
use crate::lexer::{Token, TokenKind, TokenizeOptions, lex_from, tokenize};
use crate::mir::{BinOp, MirFunction, MirInst, MirModule};
use crate::span::Span;

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// In main-file mode, stop after the first side-effecting
    /// top-level statement.
    pub is_main_file: bool,
}

/// What a single parse invocation accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseSummary {
    /// True if the end of the buffer was reached.
    pub done: bool,
    /// True if a side-effecting top-level statement was appended.
    pub found_side_effects: bool,
}

/// Per-declaration policy deciding whether a function body should be
/// parsed now or deferred for later completion.
pub trait DelayedParseCallback {
    fn should_defer(&self, name: &str, is_public: bool) -> bool;
}

/// The default policy: defer nothing.
pub struct NoDelayedParsing;

impl DelayedParseCallback for NoDelayedParsing {
    fn should_defer(&self, _name: &str, _is_public: bool) -> bool {
        false
    }
}

/// Defer every function body. What interactive consumers typically use.
pub struct DeferAllBodies;

impl DelayedParseCallback for DeferAllBodies {
    fn should_defer(&self, _name: &str, _is_public: bool) -> bool {
        true
    }
}

/// Produces completion callbacks for a completion point. Consulted
/// while completing deferred bodies.
pub trait CodeCompletionFactory {
    /// Byte offset of the completion point within the buffer.
    fn completion_offset(&self) -> u32;
    /// Invoked when the deferred body about to be parsed contains the
    /// completion point.
    fn on_completion_in_body(&mut self, name: &str, body_start: u32, body_end: u32);
}

/// A function body whose tokens were recognized but whose statements
/// were not parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredBody {
    pub item_index: usize,
    pub body_start: u32,
    pub body_end: u32,
}

/// Resumable parsing state owned by a long-lived session.
///
/// The cursor only moves forward; deferred bodies are completed in the
/// order they were deferred.
#[derive(Debug, Default)]
pub struct PersistentParseState {
    cursor: u32,
    deferred: VecDeque<DeferredBody>,
}

impl PersistentParseState {
    pub fn new() -> PersistentParseState {
        PersistentParseState::default()
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    pub fn deferred_bodies(&self) -> impl Iterator<Item = &DeferredBody> {
        self.deferred.iter()
    }
}

/// Scoped bridge between the parser and an in-progress MIR module.
///
/// Constructed immediately before a parse call that may contain inline
/// low-level IR; dropping it is the single place the pending builder
/// state is flushed into the module, on every exit path.
pub struct ParserLinkState<'m> {
    module: &'m mut MirModule,
    pending: Vec<MirFunction>,
}

impl<'m> ParserLinkState<'m> {
    pub fn new(module: &'m mut MirModule) -> ParserLinkState<'m> {
        ParserLinkState {
            module,
            pending: Vec::new(),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for ParserLinkState<'_> {
    fn drop(&mut self) {
        self.module.functions.append(&mut self.pending);
    }
}

/// Parse one buffer into the given source unit.
///
/// Consumes top-level elements until end of buffer or, in main-file
/// mode, until a complete side-effecting statement has just been
/// appended, whichever comes first. All user-level problems go to the
/// context's diagnostic sink; the summary reports progress only.
pub fn parse_into_source_unit(
    ctx: &mut CompilationContext,
    unit: &mut SourceUnit,
    source: &str,
    options: ParseOptions,
    mut link: Option<&mut ParserLinkState<'_>>,
    mut persistent: Option<&mut PersistentParseState>,
    delayed: Option<&dyn DelayedParseCallback>,
) -> ParseSummary {
    let start_offset = persistent.as_ref().map_or(0, |state| state.cursor);
    let lexed = lex_from(unit.file_id, source, start_offset);
    for diag in lexed.diagnostics {
        ctx.diagnostics.push(diag);
    }

    let mut parser = Parser {
        ctx,
        source,
        tokens: lexed.tokens,
        pos: 0,
    };

    let mut found_side_effects = false;
    loop {
        parser.skip_semis();
        if parser.at(TokenKind::Eof) {
            break;
        }
        let item_index = unit.items.len();
        match parser.parse_item(
            item_index,
            link.as_deref_mut(),
            persistent.as_deref_mut(),
            delayed,
        ) {
            Some(item) => {
                let side_effecting = item.kind.has_side_effects();
                unit.items.push(item);
                if side_effecting {
                    found_side_effects = true;
                    // Only main-file parsing stops here; the flag is
                    // reported either way.
                    if options.is_main_file {
                        break;
                    }
                }
            }
            None => parser.recover_to_item_start(),
        }
    }

    parser.skip_semis();
    let done = parser.at(TokenKind::Eof);
    if let Some(state) = persistent.as_deref_mut() {
        state.cursor = state.cursor.max(parser.peek().span.start);
    }
    ParseSummary {
        done,
        found_side_effects,
    }
}

/// Finish parsing by completing the bodies deferred so far, in the
/// exact order they were deferred. Each body is parsed against the
/// current session state, so operators registered by name binding in
/// the meantime are visible.
pub fn perform_delayed_parsing(
    ctx: &mut CompilationContext,
    unit: &mut SourceUnit,
    source: &str,
    state: &mut PersistentParseState,
    mut completion: Option<&mut dyn CodeCompletionFactory>,
) {
    while let Some(deferred) = state.deferred.pop_front() {
        if let Some(factory) = completion.as_deref_mut() {
            let point = factory.completion_offset();
            if deferred.body_start <= point && point < deferred.body_end {
                let name = match unit.items[deferred.item_index].kind.name() {
                    Some(sym) => ctx.interner.resolve(sym).to_string(),
                    None => String::new(),
                };
                factory.on_completion_in_body(&name, deferred.body_start, deferred.body_end);
            }
        }

        let mut tokens = tokenize(
            source,
            unit.file_id,
            deferred.body_start,
            deferred.body_end,
            TokenizeOptions {
                keep_comments: false,
                split_interpolated: false,
            },
        );
        tokens.push(Token {
            kind: TokenKind::Eof,
            span: Span::empty(unit.file_id, deferred.body_end),
            text_start: deferred.body_end,
            text_end: deferred.body_end,
        });
        let mut parser = Parser {
            ctx,
            source,
            tokens,
            pos: 0,
        };
        let stmts = parser.parse_block_stmts(TokenKind::Eof);

        let item_span = unit.items[deferred.item_index].span;
        match &mut unit.items[deferred.item_index].kind {
            ItemKind::Fn(decl) => decl.body = FnBody::Parsed(stmts),
            _ => {
                ctx.diagnostics.push(
                    Diagnostic::error("deferred body does not belong to a function", item_span)
                        .with_code("E0108"),
                );
            }
        }
    }
}

struct Parser<'src, 'ctx> {
    ctx: &'ctx mut CompilationContext,
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'src> Parser<'src, '_> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_nth(&self, n: usize) -> &Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) { Some(self.bump()) } else { None }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if self.at(kind) {
            return Some(self.bump());
        }
        let span = self.peek().span;
        self.error(span, format!("expected {what}"));
        None
    }

    fn text(&self, token: &Token) -> &'src str {
        let source = self.source;
        &source[token.text_start as usize..token.text_end as usize]
    }

    fn intern_text(&mut self, token: &Token) -> Symbol {
        let text = self.text(token);
        self.ctx.interner.intern(text)
    }

    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.ctx
            .diagnostics
            .push(Diagnostic::error(message, span).with_code("E0100"));
    }

    fn skip_semis(&mut self) {
        while self.eat(TokenKind::Semi).is_some() {}
    }

    /// Skip to something that plausibly starts the next item.
    fn recover_to_item_start(&mut self) {
        loop {
            match self.peek().kind {
                TokenKind::Eof
                | TokenKind::Import
                | TokenKind::Operator
                | TokenKind::Let
                | TokenKind::Fn
                | TokenKind::Pub
                | TokenKind::Mir => return,
                TokenKind::Semi => {
                    self.bump();
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn parse_item(
        &mut self,
        item_index: usize,
        link: Option<&mut ParserLinkState<'_>>,
        persistent: Option<&mut PersistentParseState>,
        delayed: Option<&dyn DelayedParseCallback>,
    ) -> Option<Item> {
        match self.peek().kind {
            TokenKind::Import => self.parse_import(),
            TokenKind::Operator => self.parse_operator_decl(),
            TokenKind::Mir => self.parse_inline_mir(link),
            TokenKind::Pub => {
                let start = self.bump().span;
                match self.peek().kind {
                    TokenKind::Let => self.parse_let_item(true, start),
                    TokenKind::Fn => self.parse_fn(true, start, item_index, persistent, delayed),
                    _ => {
                        self.error(self.peek().span, "expected `let` or `fn` after `pub`");
                        None
                    }
                }
            }
            TokenKind::Let => {
                let start = self.peek().span;
                self.parse_let_item(false, start)
            }
            TokenKind::Fn => {
                let start = self.peek().span;
                self.parse_fn(false, start, item_index, persistent, delayed)
            }
            _ => self.parse_top_level_stmt(),
        }
    }

    fn parse_import(&mut self) -> Option<Item> {
        let start = self.bump().span;
        let name_tok = self.expect(TokenKind::Ident, "a module name after `import`")?;
        let module = self.intern_text(&name_tok);
        let span = start.join(name_tok.span).unwrap_or(start);
        Some(Item {
            kind: ItemKind::Import(ImportDecl {
                module,
                resolved: false,
            }),
            span,
        })
    }

    fn parse_operator_decl(&mut self) -> Option<Item> {
        let start = self.bump().span;
        let sym_tok = self.expect(TokenKind::OperatorSym, "an operator spelling")?;
        let symbol = self.intern_text(&sym_tok);
        let prec_tok = self.expect(TokenKind::IntLiteral, "an operator precedence")?;
        let precedence = match self.int_value(&prec_tok) {
            value if (0..=255).contains(&value) => value as u8,
            _ => {
                self.error(prec_tok.span, "operator precedence must fit in 0..=255");
                0
            }
        };
        let span = start.join(prec_tok.span).unwrap_or(start);
        Some(Item {
            kind: ItemKind::Operator(OperatorDecl { symbol, precedence }),
            span,
        })
    }

    fn parse_let_item(&mut self, is_public: bool, start: Span) -> Option<Item> {
        let decl = self.parse_let_decl(is_public)?;
        let span = start.join(decl.value.span).unwrap_or(start);
        Some(Item {
            kind: ItemKind::Let(decl),
            span,
        })
    }

    fn parse_let_decl(&mut self, is_public: bool) -> Option<LetDecl> {
        self.expect(TokenKind::Let, "`let`")?;
        let name_tok = self.expect(TokenKind::Ident, "a binding name")?;
        let name = self.intern_text(&name_tok);
        let annotation = if self.eat(TokenKind::Colon).is_some() {
            Some(self.parse_type_repr()?)
        } else {
            None
        };
        self.expect(TokenKind::Equal, "`=` in a binding")?;
        let value = self.parse_expr(0)?;
        Some(LetDecl {
            name,
            annotation,
            value,
            is_public,
            ty: None,
        })
    }

    fn parse_fn(
        &mut self,
        is_public: bool,
        start: Span,
        item_index: usize,
        persistent: Option<&mut PersistentParseState>,
        delayed: Option<&dyn DelayedParseCallback>,
    ) -> Option<Item> {
        self.expect(TokenKind::Fn, "`fn`")?;
        let name_tok = self.expect(TokenKind::Ident, "a function name")?;
        let name = self.intern_text(&name_tok);
        let name_text = self.text(&name_tok).to_string();

        let generics = if self.at(TokenKind::LBracket) {
            Some(self.parse_generic_params()?)
        } else {
            None
        };

        self.expect(TokenKind::LParen, "`(` before parameters")?;
        let mut params = Vec::new();
        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
            let p_name_tok = self.expect(TokenKind::Ident, "a parameter name")?;
            let p_name = self.intern_text(&p_name_tok);
            self.expect(TokenKind::Colon, "`:` before a parameter type")?;
            let annotation = self.parse_type_repr()?;
            params.push(Param {
                name: p_name,
                annotation,
            });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RParen, "`)` after parameters")?;

        let ret = if self.eat(TokenKind::Arrow).is_some() {
            Some(self.parse_type_repr()?)
        } else {
            None
        };

        let brace = self.expect(TokenKind::LBrace, "`{` before a function body")?;

        let defer = delayed.is_some_and(|cb| cb.should_defer(&name_text, is_public));
        let body = if defer && persistent.is_some() {
            let (body_start, body_end) = self.skip_balanced_body(brace.span)?;
            if let Some(state) = persistent {
                state.deferred.push_back(DeferredBody {
                    item_index,
                    body_start,
                    body_end,
                });
            }
            FnBody::Deferred {
                body_start,
                body_end,
            }
        } else {
            let stmts = self.parse_block_stmts(TokenKind::RBrace);
            self.expect(TokenKind::RBrace, "`}` after a function body")?;
            FnBody::Parsed(stmts)
        };

        let end = self.tokens[self.pos.saturating_sub(1)].span;
        Some(Item {
            kind: ItemKind::Fn(FnDecl {
                name,
                generics,
                params,
                ret,
                body,
                is_public,
                sig: None,
            }),
            span: start.join(end).unwrap_or(start),
        })
    }

    /// Consume tokens up to and including the brace matching an
    /// already-consumed `{`, without parsing. Brace matching keeps the
    /// overall buffer position correct for deferred bodies.
    fn skip_balanced_body(&mut self, open: Span) -> Option<(u32, u32)> {
        let body_start = self.peek().span.start;
        let mut depth = 1usize;
        loop {
            match self.peek().kind {
                TokenKind::Eof => {
                    self.error(open, "unterminated function body");
                    return None;
                }
                TokenKind::LBrace => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::RBrace => {
                    depth -= 1;
                    let close = self.bump();
                    if depth == 0 {
                        return Some((body_start, close.span.start));
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn parse_generic_params(&mut self) -> Option<GenericParamList> {
        let open = self.expect(TokenKind::LBracket, "`[`")?;
        let mut params = Vec::new();
        while !self.at(TokenKind::RBracket) && !self.at(TokenKind::Eof) {
            let name_tok = self.expect(TokenKind::Ident, "a generic parameter name")?;
            let name = self.intern_text(&name_tok);
            let constraint = if self.eat(TokenKind::Colon).is_some() {
                Some(self.parse_type_repr()?)
            } else {
                None
            };
            params.push(GenericParam { name, constraint });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        let close = self.expect(TokenKind::RBracket, "`]` after generic parameters")?;
        Some(GenericParamList {
            params,
            span: open.span.join(close.span).unwrap_or(open.span),
        })
    }

    fn parse_type_repr(&mut self) -> Option<TypeRepr> {
        let tok = self.expect(TokenKind::Ident, "a type name")?;
        let name = self.intern_text(&tok);
        Some(TypeRepr {
            name,
            span: tok.span,
        })
    }

    fn parse_top_level_stmt(&mut self) -> Option<Item> {
        let stmt = self.parse_simple_stmt()?;
        let span = match &stmt {
            Stmt::Expr(expr) => expr.span,
            Stmt::Assign { span, .. } => *span,
            Stmt::Return { span, .. } => *span,
            Stmt::Let(decl) => decl.value.span,
        };
        if let Stmt::Return { span, .. } = &stmt {
            self.error(*span, "`return` outside of a function body");
            return None;
        }
        Some(Item {
            kind: ItemKind::Stmt(stmt),
            span,
        })
    }

    fn parse_block_stmts(&mut self, terminator: TokenKind) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        loop {
            self.skip_semis();
            if self.at(terminator) || self.at(TokenKind::Eof) {
                break;
            }
            match self.peek().kind {
                TokenKind::Let => {
                    if let Some(decl) = self.parse_let_decl(false) {
                        stmts.push(Stmt::Let(decl));
                    } else {
                        self.recover_to_item_start();
                    }
                }
                TokenKind::Return => {
                    let start = self.bump().span;
                    let ends_stmt = self.at(terminator)
                        || self.at(TokenKind::Eof)
                        || self.at(TokenKind::Semi);
                    let value = if ends_stmt { None } else { self.parse_expr(0) };
                    let span = value
                        .as_ref()
                        .and_then(|v| start.join(v.span))
                        .unwrap_or(start);
                    stmts.push(Stmt::Return { value, span });
                }
                _ => match self.parse_simple_stmt() {
                    Some(stmt) => stmts.push(stmt),
                    None => self.recover_to_item_start(),
                },
            }
        }
        stmts
    }

    /// Assignment or expression statement.
    fn parse_simple_stmt(&mut self) -> Option<Stmt> {
        if self.at(TokenKind::Ident) && self.peek_nth(1).kind == TokenKind::Equal {
            let target_tok = self.bump();
            let target = self.intern_text(&target_tok);
            self.bump(); // `=`
            let value = self.parse_expr(0)?;
            let span = target_tok.span.join(value.span).unwrap_or(target_tok.span);
            return Some(Stmt::Assign {
                target,
                value,
                span,
            });
        }
        if self.at(TokenKind::Return) {
            let span = self.peek().span;
            self.bump();
            let value = if self.at(TokenKind::Eof) || self.at(TokenKind::Semi) {
                None
            } else {
                self.parse_expr(0)
            };
            let span = value.as_ref().and_then(|v| span.join(v.span)).unwrap_or(span);
            return Some(Stmt::Return { value, span });
        }
        self.parse_expr(0).map(Stmt::Expr)
    }

    /// Precedence-climbing expression parser. Operator precedences come
    /// from the session table, so operators registered by an earlier
    /// name-binding invocation parse here and unknown ones diagnose.
    /// The bound is wider than the stored precedence so `prec + 1` is
    /// well-defined at precedence 255 (all operators left-associative).
    fn parse_expr(&mut self, min_prec: u16) -> Option<Expr> {
        let mut lhs = self.parse_primary()?;
        while self.at(TokenKind::OperatorSym) {
            let op_tok = self.peek().clone();
            let spelling = self.text(&op_tok).to_string();
            let op = self.intern_text(&op_tok);
            let Some(prec) = self.ctx.operators.precedence(op) else {
                self.bump();
                self.error(op_tok.span, format!("unknown operator `{spelling}`"));
                return None;
            };
            let prec = u16::from(prec);
            if prec < min_prec {
                break;
            }
            self.bump();
            let rhs = self.parse_expr(prec + 1)?;
            let span = lhs.span.join(rhs.span).unwrap_or(lhs.span);
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Some(lhs)
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        match self.peek().kind {
            TokenKind::IntLiteral => {
                let tok = self.bump();
                let value = self.int_value(&tok);
                Some(Expr {
                    kind: ExprKind::Int(value),
                    span: tok.span,
                })
            }
            TokenKind::BoolLiteral => {
                let tok = self.bump();
                let value = self.text(&tok) == "true";
                Some(Expr {
                    kind: ExprKind::Bool(value),
                    span: tok.span,
                })
            }
            TokenKind::StringLiteral => {
                let tok = self.bump();
                let value = self.text(&tok).to_string();
                Some(Expr {
                    kind: ExprKind::Str(value),
                    span: tok.span,
                })
            }
            TokenKind::Ident => {
                let tok = self.bump();
                let name = self.intern_text(&tok);
                if self.at(TokenKind::LParen) {
                    self.bump();
                    let mut args = Vec::new();
                    while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
                        args.push(self.parse_expr(0)?);
                        if self.eat(TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                    let close = self.expect(TokenKind::RParen, "`)` after call arguments")?;
                    return Some(Expr {
                        kind: ExprKind::Call { callee: name, args },
                        span: tok.span.join(close.span).unwrap_or(tok.span),
                    });
                }
                Some(Expr {
                    kind: ExprKind::Ident(name),
                    span: tok.span,
                })
            }
            TokenKind::LParen => {
                self.bump();
                let expr = self.parse_expr(0)?;
                self.expect(TokenKind::RParen, "`)`")?;
                Some(expr)
            }
            _ => {
                let span = self.peek().span;
                self.error(span, "expected an expression");
                None
            }
        }
    }

    fn int_value(&mut self, token: &Token) -> i64 {
        let text = self.text(token).replace('_', "");
        match text.parse::<i64>() {
            Ok(value) => value,
            Err(_) => {
                self.error(token.span, "integer literal out of range");
                0
            }
        }
    }

    /// Inline low-level IR: `mir @name(params) { insts }`. Only legal
    /// when an IR link is active; the parsed function goes straight to
    /// the linked module.
    fn parse_inline_mir(&mut self, link: Option<&mut ParserLinkState<'_>>) -> Option<Item> {
        let start = self.bump().span;
        let Some(link) = link else {
            self.error(start, "inline IR requires an active IR module link");
            // Keep the cursor consistent by skipping the whole form.
            while !self.at(TokenKind::LBrace) && !self.at(TokenKind::Eof) {
                self.bump();
            }
            if self.eat(TokenKind::LBrace).is_some() {
                self.skip_balanced_body(start);
            }
            return None;
        };

        self.expect(TokenKind::At, "`@` before an IR function name")?;
        // Operator spellings are legal IR function names; declared
        // operators without a builtin lowering call a function named
        // after their spelling.
        let name_tok = if self.at(TokenKind::Ident) || self.at(TokenKind::OperatorSym) {
            self.bump()
        } else {
            let span = self.peek().span;
            self.error(span, "expected an IR function name");
            return None;
        };
        let name = self.intern_text(&name_tok);
        let name_text = self.text(&name_tok).to_string();
        self.expect(TokenKind::LParen, "`(`")?;
        let params_tok = self.expect(TokenKind::IntLiteral, "a parameter count")?;
        let param_count = self.int_value(&params_tok).max(0) as u32;
        self.expect(TokenKind::RParen, "`)`")?;
        self.expect(TokenKind::LBrace, "`{` before IR instructions")?;

        let mut body = Vec::new();
        let mut max_local = param_count;
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let Some(inst) = self.parse_mir_inst(&mut max_local) else {
                self.recover_to_item_start();
                break;
            };
            body.push(inst);
        }
        self.expect(TokenKind::RBrace, "`}` after IR instructions")?;

        link.pending.push(MirFunction {
            name: name_text,
            param_count,
            local_count: max_local - param_count,
            body,
            is_public: true,
            source_elem: None,
        });

        let end = self.tokens[self.pos.saturating_sub(1)].span;
        Some(Item {
            kind: ItemKind::MirFn(name),
            span: start.join(end).unwrap_or(start),
        })
    }

    fn parse_mir_inst(&mut self, max_local: &mut u32) -> Option<MirInst> {
        let opcode_tok = self.expect(TokenKind::Ident, "an IR opcode")?;
        let opcode = self.text(&opcode_tok).to_string();
        match opcode.as_str() {
            "const_int" => {
                let tok = self.expect(TokenKind::IntLiteral, "an integer operand")?;
                Some(MirInst::ConstInt(self.int_value(&tok)))
            }
            "local_get" | "local_set" => {
                let tok = self.expect(TokenKind::IntLiteral, "a local index")?;
                let index = self.int_value(&tok).max(0) as u32;
                *max_local = (*max_local).max(index + 1);
                if opcode == "local_get" {
                    Some(MirInst::LocalGet(index))
                } else {
                    Some(MirInst::LocalSet(index))
                }
            }
            "global_get" | "global_set" => {
                let tok = self.expect(TokenKind::Ident, "a global name")?;
                let name = self.text(&tok).to_string();
                if opcode == "global_get" {
                    Some(MirInst::GlobalGet(name))
                } else {
                    Some(MirInst::GlobalSet(name))
                }
            }
            "call" => {
                let callee_tok = self.expect(TokenKind::Ident, "a callee name")?;
                let callee = self.text(&callee_tok).to_string();
                let args_tok = self.expect(TokenKind::IntLiteral, "an argument count")?;
                let args = self.int_value(&args_tok).max(0) as u32;
                Some(MirInst::Call { callee, args })
            }
            "bin" => {
                let op_tok = self.expect(TokenKind::OperatorSym, "a binary opcode")?;
                let op = match self.text(&op_tok) {
                    "+" => BinOp::Add,
                    "-" => BinOp::Sub,
                    "*" => BinOp::Mul,
                    "/" => BinOp::Div,
                    "==" => BinOp::Eq,
                    "<" => BinOp::Lt,
                    other => {
                        let message = format!("unknown binary opcode `{other}`");
                        self.error(op_tok.span, message);
                        return None;
                    }
                };
                Some(MirInst::Bin(op))
            }
            "ret" => Some(MirInst::Ret),
            "drop" => Some(MirInst::Drop),
            other => {
                let message = format!("unknown IR opcode `{other}`");
                self.error(opcode_tok.span, message);
                None
            }
        }
    }
}
