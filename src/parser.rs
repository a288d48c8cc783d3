use crate::cue::{Cue, CueSequence};
use crate::error::ParseError;

use nom::bytes::complete::tag;
use nom::character::complete::{char, digit0, digit1, one_of, space1};
use nom::combinator::{map_res, opt, recognize};
use nom::error::{convert_error, VerboseError};
use nom::multi::separated_list1;
use nom::sequence::pair;
use nom::{Err, IResult};
use tracing::debug;

const TIMING_ARROW: &str = "-->";

/// Turns WebVTT/SRT-like text into cues.
///
/// Blocks are separated by a blank line. A block without a timing line
/// (headers, `NOTE`, `STYLE`) or without text is skipped. A block whose
/// timing line cannot be read is rejected: in lenient mode it is recorded in
/// [`Parser::rejected`] and parsing continues, in strict mode parsing stops
/// with that error.
#[derive(Debug, Default)]
pub struct Parser {
    strict: bool,
    rejected: Vec<ParseError>,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self {
            strict: true,
            rejected: Vec::new(),
        }
    }

    pub fn rejected(&self) -> &[ParseError] {
        &self.rejected
    }

    pub fn parse(&mut self, input: &str) -> Result<CueSequence, ParseError> {
        let input = input.strip_prefix('\u{FEFF}').unwrap_or(input);
        let normalised = input.replace('\r', "");

        let mut cues = Vec::new();
        for (number, block) in normalised.trim().split("\n\n").enumerate() {
            match cue_block(block) {
                Ok(Some(cue)) => cues.push(cue),
                Ok(None) => {}
                Err(reason) => {
                    let err = ParseError {
                        block: number + 1,
                        reason,
                    };
                    if self.strict {
                        return Err(err);
                    }
                    debug!(%err, "Dropping cue block");
                    self.rejected.push(err);
                }
            }
        }
        Ok(cues)
    }
}

fn cue_block(block: &str) -> Result<Option<Cue>, String> {
    let lines: Vec<&str> = block.split('\n').collect();
    let timing_idx = match lines.iter().position(|line| line.contains(TIMING_ARROW)) {
        Some(idx) => idx,
        None => return Ok(None),
    };

    let text = lines[timing_idx + 1..].join("\n");
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let timing = lines[timing_idx];
    let (start, end) = match show_hide(timing) {
        Ok((_, times)) => times,
        Err(Err::Error(err)) | Err(Err::Failure(err)) => {
            return Err(convert_error(timing, err));
        }
        Err(Err::Incomplete(_)) => {
            unreachable!("Incomplete data received by non-streaming parser.")
        }
    };

    if end <= start {
        return Err(format!(
            "cue ends at {end:.3}s, not after its start at {start:.3}s"
        ));
    }
    Ok(Some(Cue::new(start, end, text)))
}

/// `<start> --> <end>`, with anything after the end time (cue settings)
/// left unconsumed.
fn show_hide(input: &str) -> IResult<&str, (f64, f64), VerboseError<&str>> {
    let (input, start) = timestamp(input)?;
    let (input, _) = space1(input)?;
    let (input, _) = tag(TIMING_ARROW)(input)?;
    let (input, _) = space1(input)?;
    let (input, end) = timestamp(input)?;

    Ok((input, (start, end)))
}

/// Colon separated fields folded as `acc * 60 + field`, so `MM:SS.mmm` and
/// `HH:MM:SS.mmm` both work. The last field may use `,` or `.` before the
/// fraction.
fn timestamp(input: &str) -> IResult<&str, f64, VerboseError<&str>> {
    let (input, fields) = separated_list1(char(':'), field)(input)?;
    Ok((input, fields.into_iter().fold(0.0, |acc, f| acc * 60.0 + f)))
}

fn field(input: &str) -> IResult<&str, f64, VerboseError<&str>> {
    map_res(
        recognize(pair(digit1, opt(pair(one_of(".,"), digit0)))),
        |s: &str| s.replace(',', ".").parse::<f64>(),
    )(input)
}
