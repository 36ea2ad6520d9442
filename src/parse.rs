//! Parse s-expressions into terms and script commands.

use std::fmt::Display;
use std::sync::Arc;

use num::{BigInt, BigRational, Zero};
use thiserror::Error;

use crate::{
    symbols,
    term::{QuantKind, TermId, TermTable},
    Symbol,
};

/// Parses a single term, interning it in `table`.
pub fn parse_term(table: &mut TermTable, input: &str) -> Result<TermId, ParseError> {
    let sexp = parse_sexp(None, input)?;
    term_from_sexp(table, &sexp)
}

/// Parses exactly one s-expression.
pub fn parse_sexp(filename: Option<String>, input: &str) -> Result<Sexp, ParseError> {
    let ctx = Context::new(filename, input);
    let (out, rest) = sexp(&ctx)?;
    if !rest.is_at_end() {
        return Err(ParseError::TrailingInput(rest.span_here()));
    }
    Ok(out)
}

/// Parses a whole file worth of s-expressions.
pub fn parse_sexps(filename: Option<String>, input: &str) -> Result<Vec<Sexp>, ParseError> {
    let (out, _rest) = repeat_all(sexp)(&Context::new(filename, input))?;
    Ok(out)
}

/// A [`Span`] contains the file name and a pair of offsets representing the start and the end.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Span(Arc<SrcFile>, usize, usize);

impl Span {
    pub fn string(&self) -> &str {
        &self.0.contents[self.1..self.2]
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SrcFile {
    name: Option<String>,
    contents: String,
}

struct Location {
    line: usize,
    col: usize,
}

impl SrcFile {
    fn get_location(&self, offset: usize) -> Location {
        let mut line = 1;
        let mut col = 1;
        for (i, c) in self.contents.char_indices() {
            if i >= offset {
                break;
            }
            if c == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        Location { line, col }
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let start = self.0.get_location(self.1);
        let end = self.0.get_location(self.2.max(self.1 + 1) - 1);
        let quote = self.string();
        match (&self.0.name, start.line == end.line) {
            (Some(filename), true) => write!(
                f,
                "In {}:{}-{} of {filename}: {quote}",
                start.line, start.col, end.col
            ),
            (Some(filename), false) => write!(
                f,
                "In {}:{}-{}:{} of {filename}: {quote}",
                start.line, start.col, end.line, end.col
            ),
            (None, false) => write!(
                f,
                "In {}:{}-{}:{}: {quote}",
                start.line, start.col, end.line, end.col
            ),
            (None, true) => write!(f, "In {}:{}-{}: {quote}", start.line, start.col, end.col),
        }
    }
}

/// Raw s-expression with source spans.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sexp {
    Atom(String, Span),
    Str(String, Span),
    List(Vec<Sexp>, Span),
}

impl Sexp {
    pub fn span(&self) -> &Span {
        match self {
            Sexp::Atom(_, span) | Sexp::Str(_, span) | Sexp::List(_, span) => span,
        }
    }

    pub fn atom(&self) -> Option<&str> {
        match self {
            Sexp::Atom(a, _) => Some(a),
            _ => None,
        }
    }

    pub fn list(&self) -> Option<&[Sexp]> {
        match self {
            Sexp::List(items, _) => Some(items),
            _ => None,
        }
    }
}

impl Display for Sexp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.span().string())
    }
}

#[derive(Clone, Debug)]
struct Context {
    source: Arc<SrcFile>,
    index: usize,
}

impl Context {
    fn new(name: Option<String>, contents: &str) -> Context {
        let mut next = Context {
            source: Arc::new(SrcFile {
                name,
                contents: contents.to_string(),
            }),
            index: 0,
        };
        next.advance_past_whitespace();
        next
    }

    fn span_here(&self) -> Span {
        Span(self.source.clone(), self.index, self.index)
    }

    fn rest(&self) -> &str {
        &self.source.contents[self.index..]
    }

    fn advance_text(&self, s: &str) -> Option<(Span, Context)> {
        if self.rest().starts_with(s) {
            let mut next = self.clone();
            next.index += s.len();
            next.advance_past_whitespace();
            Some((Span(self.source.clone(), self.index, self.index + s.len()), next))
        } else {
            None
        }
    }

    fn advance_past_whitespace(&mut self) {
        let mut iter = self.source.contents[self.index..].char_indices();
        loop {
            let end = match iter.next() {
                Some((_, c)) if c.is_whitespace() => None,
                Some((_, ';')) => {
                    loop {
                        match iter.next() {
                            Some((_, '\n' | '\r')) => break,
                            Some(_) => {}
                            None => {
                                self.index = self.source.contents.len();
                                return;
                            }
                        }
                    }
                    None
                }
                Some((i, _)) => Some(self.index + i),
                None => Some(self.source.contents.len()),
            };
            if let Some(i) = end {
                self.index = i;
                return;
            }
        }
    }

    fn is_at_end(&self) -> bool {
        self.index == self.source.contents.len()
    }
}

type Res<T> = Result<(T, Context), ParseError>;

trait Parser<T>: Fn(&Context) -> Res<T> + Clone {}
impl<T, F: Fn(&Context) -> Res<T> + Clone> Parser<T> for F {}

fn text(s: &str) -> impl Parser<Span> + '_ {
    move |ctx| {
        ctx.advance_text(s)
            .ok_or_else(|| ParseError::ExpectedText(ctx.span_here(), s.to_string()))
    }
}

fn repeat<T>(parser: impl Parser<T>) -> impl Parser<Vec<T>> {
    move |ctx| {
        let mut vec = Vec::new();
        let mut next = ctx.clone();
        while let Ok((x, rest)) = parser(&next) {
            vec.push(x);
            next = rest;
        }
        Ok((vec, next))
    }
}

fn repeat_all<T>(parser: impl Parser<T>) -> impl Parser<Vec<T>> {
    move |ctx| {
        let mut vec = Vec::new();
        let mut next = ctx.clone();
        while !next.is_at_end() {
            let (x, rest) = parser(&next)?;
            vec.push(x);
            next = rest;
        }
        Ok((vec, next))
    }
}

fn choice<T>(a: impl Parser<T>, b: impl Parser<T>) -> impl Parser<T> {
    move |ctx| a(ctx).or_else(|_| b(ctx))
}

macro_rules! choices {
    ( $x:expr , ) => { $x };
    ( $x:expr $( , $xs:expr )+ , ) => {
        choice( $x, choices!( $( $xs , )+ ) )
    };
}

fn parens_span<T>(f: impl Parser<T>) -> impl Parser<(Span, T)> {
    move |ctx| {
        let (lo, next) = text("(")(ctx)?;
        let (x, next) = f(&next)?;
        let (hi, next) = text(")")(&next)?;
        Ok(((Span(lo.0, lo.1, hi.2), x), next))
    }
}

fn sexp(ctx: &Context) -> Res<Sexp> {
    choices!(
        |ctx: &Context| {
            let ((span, items), next) = parens_span(repeat(sexp))(ctx)?;
            Ok((Sexp::List(items, span), next))
        },
        string,
        atom,
    )(ctx)
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';')
}

fn atom(ctx: &Context) -> Res<Sexp> {
    let len = ctx
        .rest()
        .char_indices()
        .find(|(_, c)| is_delimiter(*c))
        .map(|(i, _)| i)
        .unwrap_or(ctx.rest().len());
    if len == 0 {
        return Err(ParseError::ExpectedAtom(ctx.span_here()));
    }
    let span = Span(ctx.source.clone(), ctx.index, ctx.index + len);
    let mut next = ctx.clone();
    next.index += len;
    next.advance_past_whitespace();
    Ok((Sexp::Atom(span.string().to_string(), span), next))
}

fn string(ctx: &Context) -> Res<Sexp> {
    let mut span = ctx.span_here();
    if !ctx.rest().starts_with('"') {
        return Err(ParseError::ExpectedString(span));
    }
    let mut in_escape = false;
    let mut end = None;
    for (i, c) in ctx.rest().char_indices().skip(1) {
        if c == '"' && !in_escape {
            end = Some(i);
            break;
        }
        in_escape = c == '\\' && !in_escape;
    }
    let Some(end) = end else {
        span.2 = span.1 + 1;
        return Err(ParseError::MissingEndQuote(span));
    };
    span.2 = ctx.index + end + 1;
    let mut next = ctx.clone();
    next.index = span.2;
    next.advance_past_whitespace();
    let quoted = span.string();
    let contents = quoted[1..quoted.len() - 1].replace("\\\"", "\"");
    Ok((Sexp::Str(contents, span), next))
}

fn number(table: &mut TermTable, s: &str) -> Option<Result<TermId, ()>> {
    let digits = |d: &str| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit());
    let unsigned = s.strip_prefix('-').unwrap_or(s);
    if digits(unsigned) {
        let i: BigInt = s.parse().ok()?;
        return Some(Ok(table.int(i)));
    }
    let (n, d) = s.split_once('/')?;
    if !digits(n.strip_prefix('-').unwrap_or(n)) || !digits(d) {
        return None;
    }
    let n: BigInt = n.parse().ok()?;
    let d: BigInt = d.parse().ok()?;
    if d.is_zero() {
        return Some(Err(()));
    }
    Some(Ok(table.rational(BigRational::new(n, d))))
}

/// Converts an s-expression into a term.
pub fn term_from_sexp(table: &mut TermTable, sexp: &Sexp) -> Result<TermId, ParseError> {
    match sexp {
        Sexp::Str(s, _) => Ok(table.string(s.as_str())),
        Sexp::Atom(a, span) => {
            if let Some(n) = number(table, a) {
                return n.map_err(|()| ParseError::ZeroDenominator(span.clone()));
            }
            match a.as_str() {
                "True" => Ok(table.true_term()),
                "False" => Ok(table.false_term()),
                _ => match a.strip_prefix('?') {
                    Some("") => Err(ParseError::ExpectedAtom(span.clone())),
                    Some(name) => Ok(table.marked(name)),
                    None => Ok(table.var(a.as_str())),
                },
            }
        }
        Sexp::List(items, span) => {
            let Some((head, rest)) = items.split_first() else {
                return Err(ParseError::EmptyList(span.clone()));
            };
            let head_name = head
                .atom()
                .ok_or_else(|| ParseError::ExpectedAtom(head.span().clone()))?;
            if let Some(kind) = QuantKind::from_name(head_name) {
                return quantifier(table, kind, rest, span);
            }
            if head_name == "case" {
                return case(table, rest, span);
            }
            let args = rest
                .iter()
                .map(|s| term_from_sexp(table, s))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(table.app(Symbol::from(head_name), args))
        }
    }
}

fn quantifier(
    table: &mut TermTable,
    kind: QuantKind,
    rest: &[Sexp],
    span: &Span,
) -> Result<TermId, ParseError> {
    let (vars, body, cond) = match rest {
        [vars, body] => (vars, body, None),
        [vars, body, cond] => (vars, body, Some(cond)),
        _ => return Err(ParseError::BadQuantifier(span.clone())),
    };
    let vars = vars
        .list()
        .ok_or_else(|| ParseError::BadQuantifier(span.clone()))?
        .iter()
        .map(|v| {
            v.atom()
                .map(Symbol::from)
                .ok_or_else(|| ParseError::ExpectedAtom(v.span().clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let body = term_from_sexp(table, body)?;
    let cond = match cond {
        Some(c) => term_from_sexp(table, c)?,
        None => table.constant(*symbols::TRUE),
    };
    Ok(table.quant(kind, vars, body, cond))
}

fn case(table: &mut TermTable, rest: &[Sexp], span: &Span) -> Result<TermId, ParseError> {
    let Some((disc, arms)) = rest.split_first() else {
        return Err(ParseError::BadCase(span.clone()));
    };
    let disc = term_from_sexp(table, disc)?;
    let mut flat = Vec::with_capacity(arms.len() * 2);
    for arm in arms {
        match arm.list() {
            Some([pattern, result]) => {
                flat.push(term_from_sexp(table, pattern)?);
                flat.push(term_from_sexp(table, result)?);
            }
            _ => return Err(ParseError::BadCase(arm.span().clone())),
        }
    }
    Ok(table.case(disc, flat))
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{0}\nexpected {1}, found {}", .0.string())]
    ExpectedText(Span, String),
    #[error("{0}\nexpected string")]
    ExpectedString(Span),
    #[error("{0}\nmissing end quote for string")]
    MissingEndQuote(Span),
    #[error("{0}\nexpected atom")]
    ExpectedAtom(Span),
    #[error("{0}\nempty list is not a term")]
    EmptyList(Span),
    #[error("{0}\nrational with zero denominator")]
    ZeroDenominator(Span),
    #[error("{0}\nexpected (quantifier (vars...) body [condition])")]
    BadQuantifier(Span),
    #[error("{0}\nexpected (case term (pattern result)...)")]
    BadCase(Span),
    #[error("{0}\nunexpected input after expression")]
    TrailingInput(Span),
    #[error("{0}\nunknown command {1}")]
    UnknownCommand(Span, String),
    #[error("{0}\nmalformed command, expected {1}")]
    BadCommand(Span, &'static str),
}
