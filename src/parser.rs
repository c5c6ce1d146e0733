//! Textual coordinate grammar.
//!
//! ```text
//! coordinate := '(' component ',' component ',' component ',' component ')'
//! component  := '0x' HEX+ | DIGIT+
//! ```
//!
//! Parentheses are optional and whitespace is free around every token.

use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, digit1, hex_digit1, multispace0},
    combinator::{map, opt},
    sequence::{delimited, preceded, tuple},
    IResult,
};

use crate::coordinate::{Coordinate, U256};
use crate::error::{Result, TetradError};

#[derive(Debug, PartialEq, Clone, Copy)]
enum Literal<'a> {
    Hex(&'a str),
    Decimal(&'a str),
}

impl Literal<'_> {
    fn into_u256(self) -> Result<U256> {
        match self {
            Literal::Hex(digits) => U256::from_hex(digits),
            Literal::Decimal(digits) => U256::from_decimal(digits),
        }
    }
}

// --- HELPERS ---
fn ws<'a, F, O, E: nom::error::ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where F: FnMut(&'a str) -> IResult<&'a str, O, E> {
    delimited(multispace0, inner, multispace0)
}

// --- LITERALS ---

fn parse_hex(input: &str) -> IResult<&str, Literal<'_>> {
    map(preceded(tag_no_case("0x"), hex_digit1), Literal::Hex)(input)
}

fn parse_decimal(input: &str) -> IResult<&str, Literal<'_>> {
    map(digit1, Literal::Decimal)(input)
}

fn parse_literal(input: &str) -> IResult<&str, Literal<'_>> {
    ws(alt((parse_hex, parse_decimal)))(input)
}

fn parse_quad(input: &str) -> IResult<&str, [Literal<'_>; 4]> {
    let (input, _) = opt(ws(char('(')))(input)?;
    let (input, (x, _, y, _, z, _, t)) = tuple((
        parse_literal,
        char(','),
        parse_literal,
        char(','),
        parse_literal,
        char(','),
        parse_literal,
    ))(input)?;
    let (input, _) = opt(ws(char(')')))(input)?;
    Ok((input, [x, y, z, t]))
}

fn syntax_error(input: &str, e: nom::Err<nom::error::Error<&str>>) -> TetradError {
    match e {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let context = match e.input.char_indices().nth(20) {
                Some((cut, _)) => format!("{}...", &e.input[..cut]),
                None => e.input.to_string(),
            };
            TetradError::InvalidCoordinate(format!("invalid syntax near '{}' in '{}'", context, input))
        }
        nom::Err::Incomplete(_) => TetradError::InvalidCoordinate("incomplete coordinate".to_string()),
    }
}

fn ensure_consumed(remainder: &str) -> Result<()> {
    if remainder.trim().is_empty() {
        Ok(())
    } else {
        Err(TetradError::InvalidCoordinate(format!("unexpected tokens at end: '{}'", remainder)))
    }
}

pub fn parse_u256(input: &str) -> Result<U256> {
    let (remainder, literal) = parse_literal(input).map_err(|e| syntax_error(input, e))?;
    ensure_consumed(remainder)?;
    literal.into_u256()
}

pub fn parse_coordinate(input: &str) -> Result<Coordinate> {
    let (remainder, [x, y, z, t]) = parse_quad(input).map_err(|e| syntax_error(input, e))?;
    ensure_consumed(remainder)?;
    Ok(Coordinate::new(x.into_u256()?, y.into_u256()?, z.into_u256()?, t.into_u256()?))
}
