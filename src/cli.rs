// src/cli.rs

//! Command-line parsing.
//!
//! `frame-pump [buffer_num] [width] [height]`. Arguments are read the way C's
//! `atoi` reads them: anything that does not start with a number counts as 0,
//! and 0 or negative values fall back to the configured defaults.

use crate::config::{PipelineConfig, MIN_BUFFER_COUNT};

const DEFAULT_PROGRAM_NAME: &str = "frame-pump";

/// What the process was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print `usage` and exit successfully.
    Help { usage: String },
    Run(RunArgs),
}

/// Effective run parameters after defaults and clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunArgs {
    pub buffer_count: usize,
    pub width: u32,
    pub height: u32,
}

/// Parses the full argument list, program name included.
pub fn parse_args<I>(args: I, defaults: &PipelineConfig) -> Command
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut args = args.into_iter();
    let program = args
        .next()
        .map(|p| p.as_ref().to_string())
        .unwrap_or_else(|| DEFAULT_PROGRAM_NAME.to_string());
    let rest: Vec<String> = args.map(|a| a.as_ref().to_string()).collect();

    if let Some(first) = rest.first() {
        if first == "-h" || first == "--help" {
            return Command::Help {
                usage: usage(&program),
            };
        }
    }

    let numeric = |index: usize| rest.get(index).map(|s| atoi(s)).unwrap_or(0);

    let buffer_count = match numeric(0) {
        n if n > 0 => n as usize,
        _ => defaults.default_buffer_count,
    }
    .max(MIN_BUFFER_COUNT);

    let width = positive_u32(numeric(1)).unwrap_or(defaults.default_width);
    let height = positive_u32(numeric(2)).unwrap_or(defaults.default_height);

    Command::Run(RunArgs {
        buffer_count,
        width,
        height,
    })
}

pub fn usage(program: &str) -> String {
    format!("usage: {} [buffer_num] [width] [height]", program)
}

fn positive_u32(value: i64) -> Option<u32> {
    u32::try_from(value).ok().filter(|&v| v > 0)
}

/// Leading-integer parse: optional whitespace, optional sign, digits.
/// Returns 0 when no digits lead the string; saturates on overflow.
fn atoi(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| {
            acc.saturating_mul(10).saturating_add(i64::from(d - b'0'))
        });

    if negative {
        -magnitude
    } else {
        magnitude
    }
}
