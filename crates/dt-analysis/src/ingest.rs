//! Extraction of best-found parameter vectors from run logs.
//!
//! A completed run prints one marker line such as
//! `#### Best para[0]=0.736, [1]=0.144, ...`. Lines without the marker are
//! ignored; marker lines that cannot be turned into a vector are recorded as
//! failures and ingestion carries on with the rest of the input.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::io::BufRead;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

/// Marker printed before the best parameters of a run.
pub const BEST_PARAMS_MARKER: &str = "#### Best para";

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(\d+)\]\s*=\s*([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)")
            .expect("best parameter token regex")
    })
}

/// Why a marker line was not turned into a vector.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum LineFailureReason {
    #[error("marker present but no [index]=value tokens")]
    NoTokens,
    #[error("index {0} appears more than once")]
    DuplicateIndex(usize),
    #[error("index {0} is missing")]
    MissingIndex(usize),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("expected {expected} values, found {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// One run's best vector and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestVector {
    pub source: String,
    /// 1-based line number within the source.
    pub line: usize,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineFailure {
    pub source: String,
    pub line: usize,
    pub reason: LineFailureReason,
}

impl fmt::Display for LineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.source, self.line, self.reason)
    }
}

/// Everything recovered from one or more logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub vectors: Vec<BestVector>,
    pub failures: Vec<LineFailure>,
}

impl IngestReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of marker lines that produced no vector.
    pub fn unparsed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Dimensionality fixed by the first accepted vector.
    pub fn dimensionality(&self) -> Option<usize> {
        self.vectors.first().map(|v| v.values.len())
    }

    pub fn values(&self) -> Vec<Vec<f64>> {
        self.vectors.iter().map(|v| v.values.clone()).collect()
    }

    /// Append another report, re-checking its vectors against this report's
    /// dimensionality.
    pub fn merge(&mut self, other: IngestReport) {
        for vector in other.vectors {
            self.accept(vector);
        }
        self.failures.extend(other.failures);
    }

    fn accept(&mut self, vector: BestVector) {
        match self.dimensionality() {
            Some(expected) if expected != vector.values.len() => {
                let failure = LineFailure {
                    source: vector.source,
                    line: vector.line,
                    reason: LineFailureReason::DimensionMismatch {
                        expected,
                        actual: vector.values.len(),
                    },
                };
                warn!(
                    source = %failure.source,
                    line = failure.line,
                    reason = %failure.reason,
                    "unparsed best-parameter line"
                );
                self.failures.push(failure);
            }
            _ => self.vectors.push(vector),
        }
    }

    fn reject(&mut self, source: &str, line: usize, reason: LineFailureReason) {
        warn!(source, line, %reason, "unparsed best-parameter line");
        self.failures.push(LineFailure {
            source: source.to_string(),
            line,
            reason,
        });
    }
}

/// Parser for marker lines carrying `[index]=value` tokens.
#[derive(Debug, Clone)]
pub struct BestParamsParser {
    marker: String,
}

impl Default for BestParamsParser {
    fn default() -> Self {
        Self::new(BEST_PARAMS_MARKER)
    }
}

impl BestParamsParser {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// `None` when the line has no marker, otherwise the parsed vector or the
    /// reason it could not be parsed.
    pub fn parse_line(&self, line: &str) -> Option<Result<Vec<f64>, LineFailureReason>> {
        let start = line.find(&self.marker)?;
        Some(parse_tokens(&line[start + self.marker.len()..]))
    }

    pub fn ingest_str(&self, source: &str, text: &str) -> IngestReport {
        let mut report = IngestReport::new();
        for (idx, line) in text.lines().enumerate() {
            self.ingest_line(&mut report, source, idx + 1, line);
        }
        debug!(
            source,
            vectors = report.vectors.len(),
            failures = report.failures.len(),
            "ingested log"
        );
        report
    }

    pub fn ingest_reader<R: BufRead>(&self, source: &str, reader: R) -> std::io::Result<IngestReport> {
        let mut report = IngestReport::new();
        for (idx, line) in reader.lines().enumerate() {
            self.ingest_line(&mut report, source, idx + 1, &line?);
        }
        debug!(
            source,
            vectors = report.vectors.len(),
            failures = report.failures.len(),
            "ingested log"
        );
        Ok(report)
    }

    fn ingest_line(&self, report: &mut IngestReport, source: &str, line_no: usize, line: &str) {
        match self.parse_line(line) {
            None => {}
            Some(Ok(values)) => report.accept(BestVector {
                source: source.to_string(),
                line: line_no,
                values,
            }),
            Some(Err(reason)) => report.reject(source, line_no, reason),
        }
    }
}

fn parse_tokens(text: &str) -> Result<Vec<f64>, LineFailureReason> {
    let mut tokens: Vec<(usize, f64)> = Vec::new();
    let mut last_end = 0;
    for caps in token_regex().captures_iter(text) {
        let whole = caps.get(0).map_or(last_end..last_end, |m| m.range());
        check_separator(&text[last_end..whole.start])?;
        last_end = whole.end;
        let index: usize = caps[1]
            .parse()
            .map_err(|_| LineFailureReason::InvalidNumber(caps[1].to_string()))?;
        let value: f64 = caps[2]
            .parse()
            .map_err(|_| LineFailureReason::InvalidNumber(caps[2].to_string()))?;
        tokens.push((index, value));
    }
    if tokens.is_empty() {
        return Err(LineFailureReason::NoTokens);
    }
    check_separator(&text[last_end..])?;

    tokens.sort_by_key(|(index, _)| *index);
    if let Some(window) = tokens.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(LineFailureReason::DuplicateIndex(window[0].0));
    }
    for (expected, (index, _)) in tokens.iter().enumerate() {
        if *index != expected {
            return Err(LineFailureReason::MissingIndex(expected));
        }
    }

    Ok(tokens.into_iter().map(|(_, value)| value).collect())
}

/// Only commas and whitespace may sit between tokens.
fn check_separator(gap: &str) -> Result<(), LineFailureReason> {
    let leftover = gap.trim_matches(|c: char| c.is_whitespace() || c == ',');
    if leftover.is_empty() {
        Ok(())
    } else {
        Err(LineFailureReason::InvalidNumber(leftover.to_string()))
    }
}
