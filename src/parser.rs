use std::io::Read;
use std::str::FromStr;

use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, char, digit1};
use nom::combinator::{all_consuming, map_res, opt};
use nom::multi::separated_list1;
use nom::sequence::{preceded, tuple};
use nom::{Finish, IResult, Parser};

use crate::error::{Error, Result};

pub fn base10_numeric<N>(input: &str) -> IResult<&str, N>
where
    N: FromStr,
{
    map_res(digit1, |s| N::from_str(s)).parse(input)
}

pub fn nom_error_to_owned<I>(e: nom::error::Error<&I>) -> nom::error::Error<I::Owned>
where
    I: ToOwned + ?Sized,
    I::Owned: 'static,
{
    let nom::error::Error { input, code } = e;
    nom::error::Error {
        input: input.to_owned(),
        code,
    }
}

// Lifetime hacks to make the `?` operator usable with nom results.
//
// This was more work than just pattern matching it.
pub fn nom_parse_to_owned<I, O, P>(
    mut parser: P,
    input: &I,
) -> Result<O, nom::error::Error<I::Owned>>
where
    I: ToOwned + ?Sized,
    I::Owned: 'static,
    P: for<'i> Parser<&'i I, O, nom::error::Error<&'i I>>,
{
    match parser.parse(input).finish() {
        Ok((_i, o)) => Ok(o),
        Err(e) => Err(nom_error_to_owned(e)),
    }
}

pub fn read_and_parse<R, T, F>(mut reader: R, parse: F) -> Result<T>
where
    R: Read,
    F: FnOnce(&str) -> Result<T>,
{
    let mut input = String::new();
    reader.read_to_string(&mut input)?;
    parse(&input)
}

pub fn read_from_stdin_and_parse<T, F>(parse: F) -> Result<T>
where
    F: FnOnce(&str) -> Result<T>,
{
    read_and_parse(std::io::stdin().lock(), parse)
}

/// One line of the puzzle input, before any labels are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValveSpec {
    pub name: String,
    pub flow_rate: u64,
    pub tunnels: Vec<String>,
}

// Accepts every singular/plural mix of "tunnels lead to valves".
fn tunnels_prefix(input: &str) -> IResult<&str, ()> {
    tuple((
        tag("; tunnel"),
        opt(char('s')),
        tag(" lead"),
        opt(char('s')),
        tag(" to valve"),
        opt(char('s')),
        char(' '),
    ))
    .map(|_| ())
    .parse(input)
}

fn valve_fields(input: &str) -> IResult<&str, ValveSpec> {
    tuple((
        preceded(tag("Valve "), alpha1),
        preceded(tag(" has flow rate="), base10_numeric::<u64>),
        preceded(tunnels_prefix, separated_list1(tag(", "), alpha1)),
    ))
    .map(|(name, flow_rate, tunnels)| ValveSpec {
        name: name.to_owned(),
        flow_rate,
        tunnels: tunnels.into_iter().map(|t: &str| t.to_owned()).collect(),
    })
    .parse(input)
}

fn valve_line(input: &str) -> IResult<&str, ValveSpec> {
    all_consuming(valve_fields).parse(input.trim_end())
}

/// Parses every non-blank line, reporting the first malformed one by its
/// 1-based line number.
pub fn parse_valves(input: &str) -> Result<Vec<ValveSpec>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            nom_parse_to_owned(valve_line, line).map_err(|source| Error::Parse {
                line: i + 1,
                source,
            })
        })
        .collect()
}
