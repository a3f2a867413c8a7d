//! S-expression text front-end.
//!
//! ```text
//! 42  -3  2.5          numbers
//! foo  let*  null?     symbols
//! nil  t               the nil and true markers
//! (op a b)             lists
//! 'x                   (quote x)
//! [1 2 3]              (quote (1 2 3)), a literal data list
//! ; comment            line comments, when enabled
//! ```

use nom::{
    IResult, Parser,
    bytes::complete::{take_till, take_while1},
    character::complete::{char, digit1, multispace0, one_of},
    combinator::{opt, recognize},
    error::ErrorKind as NomErrorKind,
};

use crate::MAX_PARSE_DEPTH;
use crate::ast::{NumberType, SYMBOL_SPECIAL_CHARS, Value, is_valid_symbol, sym};
use crate::error::Error;
use crate::{NIL_SYMBOL, TRUE_SYMBOL};

/// Reader options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Treat `;` up to the end of the line as whitespace
    pub handle_comments: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: true,
        }
    }
}

fn nom_error(input: &str, kind: NomErrorKind) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c)
}

/// Convert nom parsing errors to user-friendly messages
fn parse_error_to_message(input: &str, error: nom::Err<nom::error::Error<&str>>) -> String {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            let near: String = e.input.chars().take(10).collect();
            match e.code {
                NomErrorKind::TooLarge => {
                    format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})")
                }
                _ if e.input.is_empty() => "Unexpected end of input".into(),
                NomErrorKind::Char => format!("Expected closing bracket at position {position} near '{near}'"),
                _ => format!("Invalid syntax at position {position} near '{near}'"),
            }
        }
        nom::Err::Incomplete(_) => "Incomplete input".into(),
    }
}

/// Skips whitespace and, if enabled, `;` comments
fn skip_space(input: &str, config: ParseConfig) -> IResult<&str, ()> {
    let mut input = input;
    loop {
        let (rest, _) = multispace0.parse(input)?;
        if config.handle_comments && rest.starts_with(';') {
            let (rest, _) = take_till(|c: char| c == '\n').parse(rest)?;
            input = rest;
        } else {
            return Ok((rest, ()));
        }
    }
}

/// Integer or decimal with an optional sign
fn parse_number(input: &str) -> IResult<&str, Value> {
    let (rest, number_str) = recognize((
        opt(one_of("+-")),
        digit1,
        opt((char('.'), digit1)),
    ))
    .parse(input)?;

    // "12abc" is neither a number nor a symbol
    if rest.starts_with(is_symbol_char) {
        return Err(nom_error(input, NomErrorKind::Digit));
    }

    match number_str.parse::<NumberType>() {
        Ok(n) => Ok((rest, Value::Number(n))),
        Err(_) => Err(nom_error(input, NomErrorKind::Digit)),
    }
}

/// Symbols, with `nil` and `t` read as the markers
fn parse_symbol(input: &str) -> IResult<&str, Value> {
    let (rest, candidate) = take_while1(is_symbol_char).parse(input)?;

    if !is_valid_symbol(candidate) {
        return Err(nom_error(input, NomErrorKind::Alpha));
    }
    let value = match candidate {
        NIL_SYMBOL => Value::Nil,
        TRUE_SYMBOL => Value::True,
        name => sym(name),
    };
    Ok((rest, value))
}

/// Elements up to `close`, separated by whitespace
fn parse_elements(
    input: &str,
    close: char,
    config: ParseConfig,
    depth: usize,
) -> IResult<&str, Vec<Value>> {
    let mut elements = Vec::new();
    let mut input = input;
    loop {
        let (rest, _) = skip_space(input, config)?;
        if let Ok((rest, _)) = char::<_, nom::error::Error<&str>>(close).parse(rest) {
            return Ok((rest, elements));
        }
        if rest.is_empty() {
            return Err(nom_error(rest, NomErrorKind::Char));
        }
        let (rest, element) = parse_expr(rest, config, depth + 1)?;
        elements.push(element);
        input = rest;
    }
}

fn parse_list(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char('(').parse(input)?;
    let (input, elements) = parse_elements(input, ')', config, depth)?;
    Ok((input, Value::List(elements)))
}

/// `[a b]` is shorthand for `(quote (a b))`
fn parse_data_list(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char('[').parse(input)?;
    let (input, elements) = parse_elements(input, ']', config, depth)?;
    Ok((input, quote(Value::List(elements))))
}

/// `'expr` is shorthand for `(quote expr)`
fn parse_quote(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char('\'').parse(input)?;
    let (input, _) = skip_space(input, config)?;
    let (input, expr) = parse_expr(input, config, depth + 1)?;
    Ok((input, quote(expr)))
}

fn quote(expr: Value) -> Value {
    Value::List(vec![sym("quote"), expr])
}

fn parse_expr(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            NomErrorKind::TooLarge,
        )));
    }

    match input.chars().next() {
        Some('(') => parse_list(input, config, depth),
        Some('[') => parse_data_list(input, config, depth),
        Some('\'') => parse_quote(input, config, depth),
        Some(c) if c.is_ascii_digit() || c == '-' || c == '+' => {
            parse_number(input).or_else(|_| parse_symbol(input))
        }
        Some(_) => parse_symbol(input),
        None => Err(nom_error(input, NomErrorKind::Eof)),
    }
}

/// Parse a complete s-expression from input.
pub fn parse_sexpr(input: &str) -> Result<Value, Error> {
    parse_sexpr_with_config(input, ParseConfig::default())
}

pub fn parse_sexpr_with_config(input: &str, config: ParseConfig) -> Result<Value, Error> {
    let result = skip_space(input, config)
        .and_then(|(rest, _)| parse_expr(rest, config, 0))
        .and_then(|(rest, value)| {
            let (rest, _) = skip_space(rest, config)?;
            Ok((rest, value))
        });

    match result {
        Ok(("", value)) => Ok(value),
        Ok((remaining, _)) => {
            let remaining: String = remaining.chars().take(20).collect();
            Err(Error::parse(format!("Unexpected remaining input: '{remaining}'")))
        }
        Err(e) => Err(Error::parse(parse_error_to_message(input, e))),
    }
}

/// Parse every top-level expression in `input`, in order.
pub fn parse_program(input: &str, config: ParseConfig) -> Result<Vec<Value>, Error> {
    let mut exprs = Vec::new();
    let mut rest = input;
    loop {
        let (after_space, _) = skip_space(rest, config)
            .map_err(|e| Error::parse(parse_error_to_message(input, e)))?;
        if after_space.is_empty() {
            return Ok(exprs);
        }
        let (after_expr, expr) = parse_expr(after_space, config, 0)
            .map_err(|e| Error::parse(parse_error_to_message(input, e)))?;
        exprs.push(expr);
        rest = after_expr;
    }
}
