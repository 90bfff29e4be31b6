//! Recursive-descent parser producing a resolved [`Mapping`]
//!
//! Sections must appear in the order `@config`, `@aliases`, `@lookups`,
//! `@functions`, then rules. Parsing runs in two phases: the declaration
//! sections are collected first, then alias chains are resolved against
//! them before the first rule is read. An alias may only refer to aliases
//! declared above it.
//!
//! ```text
//! @config { null_handling: omit }
//! @aliases { Clean: trim | collapse_spaces }
//! @lookups { status: { "A": "ACTIVE", "I": "INACTIVE" } }
//!
//! user.name : name | @Clean
//! user.status : status | lookup(@status)
//! user.mobile ?? user.phone : primaryPhone
//! tags[*] : interests[*] | lowercase
//! ```

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::ast::{
    AggregateFn, AliasDef, ArithOp, Compute, ExprId, FieldPath, FunctionBinding, LookupId, LookupTable,
    Mapping, MappingRule, PathSegment, SourceExpr, TargetPath, TransformStep,
};
use crate::builtins::Builtin;
use crate::config::Config;
use crate::error::{Error, ParseError, ParseErrorKind};
use crate::lexer::{Span, Token, TokenKind, tokenize};

/// Parse mapping source into a resolved [`Mapping`].
pub fn parse(source: &str) -> Result<Mapping, Error> {
    let tokens = tokenize(source)?;
    let mapping = Parser::new(tokens).parse_mapping()?;
    Ok(mapping)
}

type PResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Section {
    Start,
    Config,
    Aliases,
    Lookups,
    Functions,
    Rules,
}

impl Section {
    fn keyword(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Config => "@config",
            Self::Aliases => "@aliases",
            Self::Lookups => "@lookups",
            Self::Functions => "@functions",
            Self::Rules => "rules",
        }
    }
}

/// A step as written, before alias and lookup references are resolved
#[derive(Debug, Clone)]
enum RawStep {
    Call {
        name: String,
        args: Vec<RawArg>,
        span: Span,
    },
    Alias {
        name: String,
        span: Span,
    },
}

#[derive(Debug, Clone)]
enum RawArg {
    Value(Value),
    Table(String, Span),
    Inline(LookupTable),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    section: Section,
    mapping: Mapping,
    raw_aliases: IndexMap<String, (Vec<RawStep>, Span)>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            section: Section::Start,
            mapping: Mapping::default(),
            raw_aliases: IndexMap::new(),
        }
    }

    // ---- token helpers ----

    fn token(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek(&self) -> &TokenKind {
        &self.token().kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + offset).min(last)].kind
    }

    fn span(&self) -> Span {
        self.token().span
    }

    fn advance(&mut self) -> Token {
        let token = self.token().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, what: &str) -> ParseError {
        ParseError::new(
            ParseErrorKind::UnexpectedToken,
            format!("expected {what}, found {}", self.peek().describe()),
            Some(self.span()),
        )
    }

    fn skip_newlines(&mut self) {
        while self.eat(&TokenKind::Newline) {}
    }

    fn skip_separators(&mut self) {
        while self.eat(&TokenKind::Newline) || self.eat(&TokenKind::Comma) {}
    }

    fn ident(&mut self, what: &str) -> PResult<(String, Span)> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                let span = self.advance().span;
                Ok((name, span))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    // ---- top level ----

    fn parse_mapping(mut self) -> PResult<Mapping> {
        loop {
            self.skip_newlines();
            match self.peek() {
                TokenKind::Eof => break,
                TokenKind::ConfigSection => {
                    self.enter(Section::Config)?;
                    self.parse_config()?;
                }
                TokenKind::AliasesSection => {
                    self.enter(Section::Aliases)?;
                    self.parse_aliases()?;
                }
                TokenKind::LookupsSection => {
                    self.enter(Section::Lookups)?;
                    self.parse_lookups()?;
                }
                TokenKind::FunctionsSection => {
                    self.enter(Section::Functions)?;
                    self.parse_functions()?;
                }
                _ => {
                    if self.section < Section::Rules {
                        self.resolve_aliases()?;
                        self.section = Section::Rules;
                    }
                    let rule = self.parse_rule()?;
                    self.mapping.rules.push(rule);
                }
            }
        }
        if self.section < Section::Rules {
            self.resolve_aliases()?;
        }
        if self.mapping.rules.is_empty() {
            return Err(self.unexpected("at least one mapping rule"));
        }
        Ok(self.mapping)
    }

    fn enter(&mut self, section: Section) -> PResult<()> {
        let span = self.span();
        if section == self.section {
            return Err(ParseError::new(
                ParseErrorKind::DuplicateDefinition,
                format!("{} declared twice", section.keyword()),
                Some(span),
            ));
        }
        if section < self.section {
            return Err(ParseError::new(
                ParseErrorKind::SectionOutOfOrder,
                format!(
                    "{} must come before {}",
                    section.keyword(),
                    self.section.keyword()
                ),
                Some(span),
            ));
        }
        self.section = section;
        self.advance();
        self.skip_newlines();
        self.expect(&TokenKind::LBrace, "'{'")?;
        Ok(())
    }

    /// Iterate `name : ...` entries of a `{ }` block
    fn block_entries<F>(&mut self, mut entry: F) -> PResult<()>
    where
        F: FnMut(&mut Self, String, Span) -> PResult<()>,
    {
        loop {
            self.skip_separators();
            if self.eat(&TokenKind::RBrace) {
                return Ok(());
            }
            let (name, span) = self.ident("an entry name or '}'")?;
            if !self.eat(&TokenKind::Colon) {
                return Err(ParseError::new(
                    ParseErrorKind::MissingSeparator,
                    format!("expected ':' after '{name}'"),
                    Some(self.span()),
                ));
            }
            entry(self, name, span)?;
            if !matches!(
                self.peek(),
                TokenKind::Newline | TokenKind::Comma | TokenKind::RBrace
            ) {
                return Err(self.unexpected("end of entry"));
            }
        }
    }

    fn parse_config(&mut self) -> PResult<()> {
        let mut entries = Map::new();
        self.block_entries(|p, name, span| {
            let value = p.literal()?;
            if entries.insert(name.clone(), value).is_some() {
                return Err(ParseError::new(
                    ParseErrorKind::DuplicateDefinition,
                    format!("config key '{name}' set twice"),
                    Some(span),
                ));
            }
            Ok(())
        })?;
        self.mapping.config = Config::from_entries(entries)?;
        Ok(())
    }

    fn parse_aliases(&mut self) -> PResult<()> {
        self.block_entries(|p, name, span| {
            p.eat(&TokenKind::Pipe);
            let steps = p.chain(true)?;
            if p.raw_aliases.contains_key(&name) {
                return Err(ParseError::new(
                    ParseErrorKind::DuplicateDefinition,
                    format!("alias '@{name}' declared twice"),
                    Some(span),
                ));
            }
            p.raw_aliases.insert(name, (steps, span));
            Ok(())
        })
    }

    fn parse_lookups(&mut self) -> PResult<()> {
        self.block_entries(|p, name, span| {
            if !p.eat(&TokenKind::LBrace) {
                return Err(p.unexpected("'{' opening the table"));
            }
            let table = p.table_body(Some(name.clone()))?;
            if p.mapping.lookup_names.contains_key(&name) {
                return Err(ParseError::new(
                    ParseErrorKind::DuplicateDefinition,
                    format!("lookup table '{name}' declared twice"),
                    Some(span),
                ));
            }
            let id = p.mapping.push_lookup(table);
            p.mapping.lookup_names.insert(name, id);
            Ok(())
        })
    }

    fn parse_functions(&mut self) -> PResult<()> {
        self.block_entries(|p, name, span| {
            let target = match p.peek().clone() {
                TokenKind::Str(target) => {
                    p.advance();
                    target
                }
                _ => return Err(p.unexpected("a quoted \"module:function\" id")),
            };
            if p.mapping.functions.contains_key(&name) {
                return Err(ParseError::new(
                    ParseErrorKind::DuplicateDefinition,
                    format!("function '{name}' declared twice"),
                    Some(span),
                ));
            }
            p.mapping
                .functions
                .insert(name.clone(), FunctionBinding { name, target });
            Ok(())
        })
    }

    /// Entries of a lookup table after its opening brace
    fn table_body(&mut self, name: Option<String>) -> PResult<LookupTable> {
        let mut table = LookupTable::new(name);
        loop {
            self.skip_separators();
            if self.eat(&TokenKind::RBrace) {
                return Ok(table);
            }
            let span = self.span();
            let key = self.literal()?;
            let key = match key {
                Value::Null | Value::Array(_) | Value::Object(_) => {
                    return Err(ParseError::new(
                        ParseErrorKind::UnexpectedToken,
                        format!("lookup keys must be scalars, found {key}"),
                        Some(span),
                    ));
                }
                other => LookupTable::key_of(&other)
                    .map(|k| k.into_owned())
                    .unwrap_or_default(),
            };
            if !self.eat(&TokenKind::Colon) {
                return Err(ParseError::new(
                    ParseErrorKind::MissingSeparator,
                    format!("expected ':' after lookup key '{key}'"),
                    Some(self.span()),
                ));
            }
            let value = self.literal()?;
            if !table.insert(key.clone(), value) {
                return Err(ParseError::new(
                    ParseErrorKind::DuplicateDefinition,
                    format!("lookup key '{key}' appears twice"),
                    Some(span),
                ));
            }
        }
    }

    /// A literal value: scalars, bare words as strings, `[...]` and `{...}`
    fn literal(&mut self) -> PResult<Value> {
        let value = match self.peek().clone() {
            TokenKind::Str(s) | TokenKind::Ident(s) => Value::String(s),
            TokenKind::Int(n) => Value::from(n),
            TokenKind::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            TokenKind::Bool(b) => Value::Bool(b),
            TokenKind::Null => Value::Null,
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                loop {
                    self.skip_separators();
                    if self.eat(&TokenKind::RBracket) {
                        return Ok(Value::Array(items));
                    }
                    items.push(self.literal()?);
                }
            }
            TokenKind::LBrace => {
                self.advance();
                let mut map = Map::new();
                loop {
                    self.skip_separators();
                    if self.eat(&TokenKind::RBrace) {
                        return Ok(Value::Object(map));
                    }
                    let key = crate::value::stringify(&self.literal()?);
                    self.expect(&TokenKind::Colon, "':'")?;
                    map.insert(key, self.literal()?);
                }
            }
            _ => return Err(self.unexpected("a value")),
        };
        self.advance();
        Ok(value)
    }

    // ---- chains ----

    /// Steps separated by `|`; a chain continues onto the next line when a
    /// line ends with `|` or the next one starts with it.
    fn chain(&mut self, first: bool) -> PResult<Vec<RawStep>> {
        let mut steps = Vec::new();
        let mut need_step = first;
        loop {
            if need_step {
                self.skip_newlines();
                steps.push(self.step()?);
                need_step = false;
                continue;
            }
            let mut ahead = 0;
            while matches!(self.peek_at(ahead), TokenKind::Newline) {
                ahead += 1;
            }
            if !matches!(self.peek_at(ahead), TokenKind::Pipe) {
                return Ok(steps);
            }
            for _ in 0..=ahead {
                self.advance();
            }
            need_step = true;
        }
    }

    fn step(&mut self) -> PResult<RawStep> {
        let span = self.span();
        match self.peek().clone() {
            TokenKind::Reference(name) => {
                self.advance();
                Ok(RawStep::Alias { name, span })
            }
            TokenKind::Ident(name) => {
                self.advance();
                let mut args = Vec::new();
                if self.eat(&TokenKind::LParen) {
                    loop {
                        self.skip_separators();
                        if self.eat(&TokenKind::RParen) {
                            break;
                        }
                        args.push(self.step_arg()?);
                        self.skip_newlines();
                        if !matches!(self.peek(), TokenKind::Comma | TokenKind::RParen) {
                            return Err(self.unexpected("',' or ')'"));
                        }
                    }
                }
                Ok(RawStep::Call { name, args, span })
            }
            _ => Err(self.unexpected("a transform name or alias reference")),
        }
    }

    fn step_arg(&mut self) -> PResult<RawArg> {
        match self.peek().clone() {
            TokenKind::Reference(name) => {
                let span = self.advance().span;
                Ok(RawArg::Table(name, span))
            }
            TokenKind::AtBrace => {
                self.advance();
                Ok(RawArg::Inline(self.table_body(None)?))
            }
            _ => self.literal().map(RawArg::Value),
        }
    }

    // ---- resolution ----

    fn resolve_aliases(&mut self) -> PResult<()> {
        let names: Vec<String> = self.raw_aliases.keys().cloned().collect();
        for name in names {
            if self.mapping.aliases.contains_key(&name) {
                continue;
            }
            let mut stack = Vec::new();
            let steps = self.expand_alias(&name, &mut stack)?;
            tracing::debug!(alias = %name, steps = steps.len(), "alias expanded");
            self.mapping
                .aliases
                .insert(name.clone(), AliasDef { name, steps });
        }
        Ok(())
    }

    fn expand_alias(&mut self, name: &str, stack: &mut Vec<String>) -> PResult<Vec<TransformStep>> {
        if let Some(alias) = self.mapping.aliases.get(name) {
            return Ok(alias.steps.clone());
        }
        let Some((raw, _)) = self.raw_aliases.get(name).cloned() else {
            return Ok(Vec::new());
        };
        stack.push(name.to_string());
        let mut steps = Vec::new();
        for step in &raw {
            if let RawStep::Alias { name: inner, span } = step {
                let inner_pos = self.raw_aliases.get_index_of(inner.as_str());
                let outer_pos = self.raw_aliases.get_index_of(name);
                if stack.iter().any(|s| s == inner) {
                    let mut cycle = stack.clone();
                    cycle.push(inner.clone());
                    return Err(ParseError::new(
                        ParseErrorKind::AliasCycle,
                        format!("alias cycle: @{}", cycle.join(" -> @")),
                        Some(*span),
                    ));
                }
                match (inner_pos, outer_pos) {
                    (Some(i), Some(o)) if i < o => {
                        steps.extend(self.expand_alias(inner, stack)?);
                    }
                    (Some(_), _) => {
                        return Err(ParseError::new(
                            ParseErrorKind::UnknownAliasReference,
                            format!("alias '@{inner}' is used by '@{name}' before it is defined"),
                            Some(*span),
                        ));
                    }
                    (None, _) => return Err(unknown_alias(inner, *span)),
                }
            } else {
                steps.extend(self.resolve_step(step)?);
            }
        }
        stack.pop();
        Ok(steps)
    }

    fn resolve_chain(&mut self, raw: &[RawStep]) -> PResult<Vec<TransformStep>> {
        let mut steps = Vec::new();
        for step in raw {
            match step {
                RawStep::Alias { name, span } => match self.mapping.aliases.get(name) {
                    Some(alias) => steps.extend(alias.steps.iter().cloned()),
                    None => return Err(unknown_alias(name, *span)),
                },
                call => steps.extend(self.resolve_step(call)?),
            }
        }
        Ok(steps)
    }

    fn resolve_step(&mut self, step: &RawStep) -> PResult<Vec<TransformStep>> {
        let RawStep::Call { name, args, span } = step else {
            return Ok(Vec::new());
        };
        let span = *span;
        match name.as_str() {
            "lookup" => {
                let [arg] = args.as_slice() else {
                    return Err(arity_error(name, "1", args.len(), span));
                };
                let id = match arg {
                    RawArg::Table(table, at) => self.named_table(table, *at)?,
                    RawArg::Value(Value::String(table)) => self.named_table(table, span)?,
                    RawArg::Inline(table) => self.mapping.push_lookup(table.clone()),
                    RawArg::Value(other) => {
                        return Err(ParseError::new(
                            ParseErrorKind::UnexpectedToken,
                            format!("lookup expects a table reference, found {other}"),
                            Some(span),
                        ));
                    }
                };
                Ok(vec![TransformStep::Lookup(id)])
            }
            "when" => match literal_args(name, args, span)?.as_slice() {
                [pattern, result] => Ok(vec![TransformStep::When {
                    pattern: pattern.clone(),
                    result: result.clone(),
                }]),
                other => Err(arity_error(name, "2", other.len(), span)),
            },
            "else" => match literal_args(name, args, span)?.as_slice() {
                [fallback] => Ok(vec![TransformStep::Else(fallback.clone())]),
                other => Err(arity_error(name, "1", other.len(), span)),
            },
            _ => {
                let args = literal_args(name, args, span)?;
                match Builtin::from_name(name) {
                    Some(func) => {
                        let arity = func.arity();
                        if !arity.accepts(args.len()) {
                            return Err(arity_error(name, &arity.to_string(), args.len(), span));
                        }
                        Ok(vec![TransformStep::Builtin { func, args }])
                    }
                    None => Ok(vec![TransformStep::External {
                        name: name.clone(),
                        args,
                    }]),
                }
            }
        }
    }

    fn named_table(&self, name: &str, span: Span) -> PResult<LookupId> {
        self.mapping.lookup_names.get(name).copied().ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::UnknownLookupReference,
                format!("no lookup table named '@{name}'"),
                Some(span),
            )
        })
    }

    // ---- rules ----

    fn parse_rule(&mut self) -> PResult<MappingRule> {
        let line = self.span().line;
        let source = self.expr()?;
        if !self.eat(&TokenKind::Colon) {
            return Err(ParseError::new(
                ParseErrorKind::MissingSeparator,
                format!(
                    "expected ':' between source and target, found {}",
                    self.peek().describe()
                ),
                Some(self.span()),
            ));
        }
        let target_span = self.span();
        let target = self.target()?;
        if target.has_wildcard() && !self.mapping.broadcasts(source) {
            return Err(ParseError::new(
                ParseErrorKind::WildcardMismatch,
                format!(
                    "target '{target}' has a wildcard but '{}' yields a single value",
                    self.mapping.render_expr(source)
                ),
                Some(target_span),
            ));
        }
        let raw = self.chain(false)?;
        let chain = self.resolve_chain(&raw)?;
        if !matches!(self.peek(), TokenKind::Newline | TokenKind::Eof) {
            return Err(self.unexpected("end of line"));
        }
        let hint = chain.iter().rev().find_map(|step| match step {
            TransformStep::Builtin { func, .. } => func.output_kind(),
            _ => None,
        });
        Ok(MappingRule {
            source,
            target,
            chain,
            line,
            hint,
        })
    }

    /// `primary (op primary)*` where every `op` is the same operator
    fn expr(&mut self) -> PResult<ExprId> {
        let first = self.primary()?;
        let mut op: Option<TokenKind> = None;
        let mut parts = vec![first];
        while matches!(self.peek(), TokenKind::Plus | TokenKind::DoubleQuestion) {
            let token = self.advance();
            match &op {
                Some(previous) if *previous != token.kind => {
                    return Err(ParseError::new(
                        ParseErrorKind::AmbiguousOperators,
                        "'+' and '??' cannot be mixed without parentheses",
                        Some(token.span),
                    ));
                }
                _ => op = Some(token.kind),
            }
            parts.push(self.primary()?);
        }
        Ok(match op {
            None => first,
            Some(TokenKind::Plus) => self.mapping.push_expr(SourceExpr::Concat(parts)),
            Some(_) => self.mapping.push_expr(SourceExpr::Coalesce(parts)),
        })
    }

    fn primary(&mut self) -> PResult<ExprId> {
        let expr = match self.peek().clone() {
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                return Ok(inner);
            }
            TokenKind::Ident(_) => SourceExpr::Field(self.field_path()?),
            TokenKind::Str(_) | TokenKind::Int(_) | TokenKind::Float(_) | TokenKind::Bool(_)
            | TokenKind::Null => SourceExpr::Literal(self.literal()?),
            TokenKind::Now => {
                self.advance();
                SourceExpr::Now
            }
            TokenKind::Uuid => {
                self.advance();
                SourceExpr::Uuid
            }
            TokenKind::Compute => {
                self.advance();
                return self.compute();
            }
            TokenKind::Call => {
                self.advance();
                return self.call();
            }
            _ => return Err(self.unexpected("a source expression")),
        };
        Ok(self.mapping.push_expr(expr))
    }

    fn segments(&mut self) -> PResult<Vec<PathSegment>> {
        let (first, _) = self.ident("a field name")?;
        let mut segments = vec![PathSegment::Key(first)];
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let segment = match self.peek().clone() {
                        TokenKind::Ident(key) | TokenKind::Str(key) => PathSegment::Key(key),
                        TokenKind::Bool(b) => PathSegment::Key(b.to_string()),
                        TokenKind::Null => PathSegment::Key("null".to_string()),
                        TokenKind::Star => PathSegment::Wildcard,
                        _ => return Err(self.unexpected("a field name after '.'")),
                    };
                    self.advance();
                    segments.push(segment);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let segment = match self.peek().clone() {
                        TokenKind::Star => PathSegment::Wildcard,
                        TokenKind::Int(i) => PathSegment::Index(i),
                        TokenKind::Str(key) => PathSegment::Key(key),
                        _ => return Err(self.unexpected("an index, '*' or a quoted key")),
                    };
                    self.advance();
                    self.expect(&TokenKind::RBracket, "']'")?;
                    segments.push(segment);
                }
                _ => return Ok(segments),
            }
        }
    }

    fn field_path(&mut self) -> PResult<FieldPath> {
        let segments = self.segments()?;
        let optional = self.eat(&TokenKind::Question);
        Ok(FieldPath { segments, optional })
    }

    fn target(&mut self) -> PResult<TargetPath> {
        let span = self.span();
        let segments = self.segments()?;
        let invalid = |message: String| {
            ParseError::new(ParseErrorKind::InvalidTarget, message, Some(span))
        };
        let target = TargetPath { segments };
        if self.at(&TokenKind::Question) {
            return Err(invalid(format!("target '{target}' cannot be optional")));
        }
        let wildcards = target
            .segments
            .iter()
            .filter(|s| matches!(s, PathSegment::Wildcard))
            .count();
        if wildcards > 1 {
            return Err(invalid(format!("target '{target}' has more than one '[*]'")));
        }
        if target
            .segments
            .iter()
            .any(|s| matches!(s, PathSegment::Index(i) if *i < 0))
        {
            return Err(invalid(format!(
                "target '{target}' uses a negative index"
            )));
        }
        Ok(target)
    }

    /// Body of `@compute(...)`: an aggregate, a function call, or arithmetic
    fn compute(&mut self) -> PResult<ExprId> {
        self.expect(&TokenKind::LParen, "'(' after '@compute'")?;
        self.skip_newlines();
        let compute = if let (TokenKind::Ident(name), TokenKind::LParen) =
            (self.peek().clone(), self.peek_at(1).clone())
        {
            let span = self.span();
            self.advance();
            self.advance();
            let args = self.call_args()?;
            match AggregateFn::from_name(&name) {
                Some(func) => match args.as_slice() {
                    [arg] => match self.mapping.expr(*arg) {
                        SourceExpr::Field(path) => {
                            Compute::Aggregate { func, path: path.clone() }
                        }
                        _ => {
                            return Err(ParseError::new(
                                ParseErrorKind::UnexpectedToken,
                                format!("'{name}' aggregates a field path"),
                                Some(span),
                            ));
                        }
                    },
                    other => return Err(arity_error(&name, "1", other.len(), span)),
                },
                None => Compute::Call { name, args },
            }
        } else {
            let lhs = self.operand()?;
            let op = match self.peek().clone() {
                TokenKind::Plus => Some((ArithOp::Add, None)),
                TokenKind::Minus => Some((ArithOp::Sub, None)),
                TokenKind::Star => Some((ArithOp::Mul, None)),
                TokenKind::Slash => Some((ArithOp::Div, None)),
                // `a -1` lexes as a negative literal
                TokenKind::Int(n) if n < 0 => Some((ArithOp::Sub, Some(Value::from(-n)))),
                TokenKind::Float(f) if f < 0.0 => Some((
                    ArithOp::Sub,
                    serde_json::Number::from_f64(-f).map(Value::Number),
                )),
                _ => None,
            };
            match op {
                None => {
                    self.skip_newlines();
                    self.expect(&TokenKind::RParen, "')' or an arithmetic operator")?;
                    return Ok(lhs);
                }
                Some((op, negated)) => {
                    self.advance();
                    let rhs = match negated {
                        Some(value) => self.mapping.push_expr(SourceExpr::Literal(value)),
                        None => self.operand()?,
                    };
                    Compute::Arithmetic { op, lhs, rhs }
                }
            }
        };
        self.skip_newlines();
        self.expect(&TokenKind::RParen, "')' closing '@compute'")?;
        Ok(self.mapping.push_expr(SourceExpr::Compute(compute)))
    }

    fn operand(&mut self) -> PResult<ExprId> {
        self.skip_newlines();
        match self.peek() {
            TokenKind::Ident(_) => {
                let path = self.field_path()?;
                Ok(self.mapping.push_expr(SourceExpr::Field(path)))
            }
            TokenKind::Int(_) | TokenKind::Float(_) => {
                let value = self.literal()?;
                Ok(self.mapping.push_expr(SourceExpr::Literal(value)))
            }
            TokenKind::LParen => self.primary(),
            _ => Err(self.unexpected("a field path or number")),
        }
    }

    /// `@call(name, args...)`
    fn call(&mut self) -> PResult<ExprId> {
        self.expect(&TokenKind::LParen, "'(' after '@call'")?;
        self.skip_newlines();
        let name = match self.peek().clone() {
            TokenKind::Ident(name) | TokenKind::Str(name) => {
                self.advance();
                name
            }
            _ => return Err(self.unexpected("a function name")),
        };
        self.skip_newlines();
        let args = if self.eat(&TokenKind::Comma) {
            self.call_args()?
        } else {
            self.expect(&TokenKind::RParen, "',' or ')'")?;
            Vec::new()
        };
        Ok(self
            .mapping
            .push_expr(SourceExpr::Compute(Compute::Call { name, args })))
    }

    /// Comma separated expressions up to and including `)`
    fn call_args(&mut self) -> PResult<Vec<ExprId>> {
        let mut args = Vec::new();
        loop {
            self.skip_separators();
            if self.eat(&TokenKind::RParen) {
                return Ok(args);
            }
            args.push(self.expr()?);
            self.skip_newlines();
            if !matches!(self.peek(), TokenKind::Comma | TokenKind::RParen) {
                return Err(self.unexpected("',' or ')'"));
            }
        }
    }
}

fn unknown_alias(name: &str, span: Span) -> ParseError {
    ParseError::new(
        ParseErrorKind::UnknownAliasReference,
        format!("no alias named '@{name}'"),
        Some(span),
    )
}

fn arity_error(name: &str, expected: &str, got: usize, span: Span) -> ParseError {
    ParseError::new(
        ParseErrorKind::InvalidTransformArity,
        format!("'{name}' takes {expected} argument(s), got {got}"),
        Some(span),
    )
}

fn literal_args(name: &str, args: &[RawArg], span: Span) -> PResult<Vec<Value>> {
    args.iter()
        .map(|arg| match arg {
            RawArg::Value(value) => Ok(value.clone()),
            RawArg::Table(table, at) => Err(ParseError::new(
                ParseErrorKind::UnexpectedToken,
                format!("'{name}' does not take a table reference '@{table}'"),
                Some(*at),
            )),
            RawArg::Inline(_) => Err(ParseError::new(
                ParseErrorKind::UnexpectedToken,
                format!("'{name}' does not take an inline table"),
                Some(span),
            )),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NullHandling;
    use rstest::rstest;
    use serde_json::json;

    fn parse_ok(source: &str) -> Mapping {
        match parse(source) {
            Ok(mapping) => mapping,
            Err(e) => panic!("Expected mapping, got {e}"),
        }
    }

    fn parse_err(source: &str) -> ParseErrorKind {
        match parse(source) {
            Err(Error::Parse(e)) => e.kind,
            other => panic!("Expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_full_mapping() {
        let mapping = parse_ok(
            r#"
            # customer export
            @config {
                null_handling: omit
                decimal_precision: 3
            }
            @aliases {
                Clean: trim | collapse_spaces
                Name: @Clean | titlecase
            }
            @lookups {
                status: { "A": "ACTIVE", "I": "INACTIVE" }
            }
            @functions {
                discount: "pricing:apply_discount"
            }

            user.name : name | @Name
            user.status : status | lookup(@status)
            user.mobile ?? user.phone : primaryPhone
            "#,
        );
        assert_eq!(mapping.config.null_handling, NullHandling::Omit);
        assert_eq!(mapping.config.decimal_precision, 3);
        assert_eq!(mapping.aliases["Name"].steps.len(), 3);
        assert_eq!(mapping.functions["discount"].target, "pricing:apply_discount");
        assert_eq!(mapping.rules.len(), 3);
        assert_eq!(mapping.rules[0].chain, mapping.aliases["Name"].steps);
        assert_eq!(mapping.rules[0].hint, Some(crate::ast::ValueKind::String));
        match &mapping.rules[1].chain[..] {
            [TransformStep::Lookup(id)] => {
                assert_eq!(mapping.lookup(*id).get(&json!("A")), Some(&json!("ACTIVE")));
            }
            other => panic!("Expected lookup step, got {other:?}"),
        }
        assert!(matches!(
            mapping.expr(mapping.rules[2].source),
            SourceExpr::Coalesce(parts) if parts.len() == 2
        ));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let source = "a.b[0] + \" \" + c? : out.x | trim | lookup(@{\"1\": 2})\n";
        assert_eq!(parse_ok(source), parse_ok(source));
    }

    #[test]
    fn test_inline_table_and_wildcards() {
        let mapping = parse_ok(
            "user.status : status | lookup(@{\"A\":\"ACTIVE\"})\ntags[*] : interests[*] | lowercase\n",
        );
        assert_eq!(mapping.lookups.len(), 1);
        assert_eq!(mapping.lookups[0].name, None);
        assert!(mapping.rules[1].target.has_wildcard());
    }

    #[test]
    fn test_path_segments() {
        let mapping = parse_ok("orders[-1].items.*.sku? : last\n");
        match mapping.expr(mapping.rules[0].source) {
            SourceExpr::Field(path) => {
                assert_eq!(
                    path.segments,
                    vec![
                        PathSegment::Key("orders".into()),
                        PathSegment::Index(-1),
                        PathSegment::Key("items".into()),
                        PathSegment::Wildcard,
                        PathSegment::Key("sku".into()),
                    ]
                );
                assert!(path.optional);
            }
            other => panic!("Expected field, got {other:?}"),
        }
    }

    #[test]
    fn test_multiline_chain() {
        let mapping = parse_ok("name : out |\n  trim\n  | uppercase\nother : o2\n");
        assert_eq!(mapping.rules.len(), 2);
        assert_eq!(mapping.rules[0].chain.len(), 2);
    }

    #[test]
    fn test_when_else_and_external_steps() {
        let mapping = parse_ok("code : label | when(\"A\", \"Alpha\") | else(\"?\") | shout(2)\n");
        assert_eq!(
            mapping.rules[0].chain,
            vec![
                TransformStep::When {
                    pattern: json!("A"),
                    result: json!("Alpha"),
                },
                TransformStep::Else(json!("?")),
                TransformStep::External {
                    name: "shout".into(),
                    args: vec![json!(2)],
                },
            ]
        );
    }

    #[test]
    fn test_compute_forms() {
        let mapping = parse_ok(
            "@compute(sum(items[*].price)) : total\n@compute(qty * price) : line\n@compute(discount(price, 10)) : net\n@call(fmt, name, \"!\") : shout\n",
        );
        let kinds: Vec<_> = mapping
            .rules
            .iter()
            .map(|rule| match mapping.expr(rule.source) {
                SourceExpr::Compute(Compute::Aggregate { func, .. }) => func.name().to_string(),
                SourceExpr::Compute(Compute::Arithmetic { op, .. }) => op.symbol().to_string(),
                SourceExpr::Compute(Compute::Call { name, args }) => format!("{name}/{}", args.len()),
                other => panic!("Expected compute, got {other:?}"),
            })
            .collect();
        assert_eq!(kinds, vec!["sum", "*", "discount/2", "fmt/2"]);
    }

    #[test]
    fn test_parentheses_allow_mixing() {
        let mapping = parse_ok("(first ?? nick) + \" \" + last : name\n");
        assert!(matches!(
            mapping.expr(mapping.rules[0].source),
            SourceExpr::Concat(parts) if parts.len() == 3
        ));
    }

    #[rstest]
    #[case("@aliases { A: trim }\n@config { strict_mode: true }\nx : y\n", ParseErrorKind::SectionOutOfOrder)]
    #[case("x : y\n@lookups { t: { \"a\": 1 } }\n", ParseErrorKind::SectionOutOfOrder)]
    #[case("@aliases { A: trim\n A: lowercase }\nx : y\n", ParseErrorKind::DuplicateDefinition)]
    #[case("@lookups { t: { \"a\": 1, \"a\": 2 } }\nx : y\n", ParseErrorKind::DuplicateDefinition)]
    #[case("@aliases { A: @B\n B: trim }\nx : y\n", ParseErrorKind::UnknownAliasReference)]
    #[case("x : y | @Missing\n", ParseErrorKind::UnknownAliasReference)]
    #[case("@aliases { A: trim | @A }\nx : y\n", ParseErrorKind::AliasCycle)]
    #[case("x : y | lookup(@nope)\n", ParseErrorKind::UnknownLookupReference)]
    #[case("x y\n", ParseErrorKind::MissingSeparator)]
    #[case("x : y | round(1, 2, 3)\n", ParseErrorKind::InvalidTransformArity)]
    #[case("x : y | replace(\"a\")\n", ParseErrorKind::InvalidTransformArity)]
    #[case("a + b ?? c : y\n", ParseErrorKind::AmbiguousOperators)]
    #[case("name : tags[*]\n", ParseErrorKind::WildcardMismatch)]
    #[case("a[*].b[*] : x[*].y[*]\n", ParseErrorKind::InvalidTarget)]
    #[case("a : x[-1]\n", ParseErrorKind::InvalidTarget)]
    #[case("@config { decimal_precision: \"many\" }\nx : y\n", ParseErrorKind::InvalidConfig)]
    #[case("@config { strict_mode: true }\n", ParseErrorKind::UnexpectedToken)]
    #[case("x : y | trim extra\n", ParseErrorKind::UnexpectedToken)]
    fn test_parse_errors(#[case] source: &str, #[case] expected: ParseErrorKind) {
        assert_eq!(parse_err(source), expected);
    }

    #[test]
    fn test_lex_errors_surface() {
        assert!(matches!(parse("x : \"open\n"), Err(Error::Lex(_))));
    }

    #[test]
    fn test_error_carries_position() {
        match parse("x : y\nz : w | lookup(@nope)\n") {
            Err(Error::Parse(e)) => {
                let span = e.span.unwrap_or_default();
                assert_eq!(span.line, 2);
            }
            other => panic!("Expected parse error, got {other:?}"),
        }
    }
}
