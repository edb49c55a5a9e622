//! Nom-based IRC line tokenizer.
//!
//! Splits one decoded line (no terminator) into prefix, command and
//! parameters without copying. IRCv3 message tags are recognized only so
//! they can be skipped.

use nom::{
    bytes::complete::{take_till, take_till1, take_while1},
    character::complete::{char, space0, space1},
    combinator::opt,
    sequence::{preceded, terminated},
    IResult,
};

type ParseResult<'a, O> = IResult<&'a str, O>;

/// A tokenized line with borrowed string slices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine<'a> {
    /// Raw prefix (without the leading `:`), if present.
    pub prefix: Option<&'a str>,
    /// Command word or three-digit numeric.
    pub command: &'a str,
    /// Parameters, the trailing one included.
    pub params: Vec<&'a str>,
}

impl<'a> RawLine<'a> {
    /// Parameter at `index`.
    pub fn arg(&self, index: usize) -> Option<&'a str> {
        self.params.get(index).copied()
    }

    /// The three-digit numeric code, if the command is one.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit()) {
            self.command.parse().ok()
        } else {
            None
        }
    }
}

fn parse_tags(input: &str) -> ParseResult<'_, &str> {
    preceded(char('@'), take_till(|c: char| c == ' '))(input)
}

fn parse_prefix(input: &str) -> ParseResult<'_, &str> {
    preceded(char(':'), take_till1(|c: char| c == ' '))(input)
}

fn parse_command(input: &str) -> ParseResult<'_, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric())(input)
}

fn is_command(word: &str) -> bool {
    word.bytes().all(|b| b.is_ascii_alphabetic())
        || (word.len() == 3 && word.bytes().all(|b| b.is_ascii_digit()))
}

/// Parse `[@tags ][:prefix ]<command>[ params...][ :trailing]`.
pub fn parse_line(input: &str) -> ParseResult<'_, RawLine<'_>> {
    let (input, _) = opt(terminated(parse_tags, space1))(input)?;
    let (input, _) = space0(input)?;
    let (input, prefix) = opt(terminated(parse_prefix, space1))(input)?;
    let (input, command) = parse_command(input)?;

    let mut params = Vec::new();
    let mut rest = input;

    while rest.starts_with(' ') {
        rest = rest.trim_start_matches(' ');
        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing);
            rest = "";
            break;
        }
        if rest.is_empty() {
            break;
        }
        let end = rest.find(' ').unwrap_or(rest.len());
        params.push(&rest[..end]);
        rest = &rest[end..];
    }

    Ok((
        rest,
        RawLine {
            prefix,
            command,
            params,
        },
    ))
}

/// Tokenize a line, returning `None` for anything that isn't a well-formed
/// command line. Never panics.
pub fn tokenize(line: &str) -> Option<RawLine<'_>> {
    let line = line.trim_end_matches(['\r', '\n']);
    match parse_line(line) {
        Ok((rest, raw)) if rest.is_empty() && is_command(raw.command) => Some(raw),
        _ => None,
    }
}
