//! Pricing sheet parser
//!
//! Parses the comma-separated price files dropped into the source bucket.
//!
//! # File Format
//! ```text
//! name,variety,63,64,65
//! 1909-S,VDB,1400,1650,2100
//! 1910,,12,18,30
//! ```
//!
//! The first line is the header: columns 0 and 1 are the issue name and
//! variety, every following column is a numeric grade. Each data row carries
//! one price per grade column.
//!
//! Rows with fewer columns than the header are skipped silently. Rows whose
//! grade or price cells are not base-10 integers are rejected one by one as
//! [`PricingError::MalformedRecord`] without affecting the other rows.

use chrono::NaiveDate;
use coin_common::PricingError;
use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, warn};

use crate::models::{IssueRecord, PriceObservation, SeriesSnapshot};

/// First column holding a grade
const FIRST_GRADE_COLUMN: usize = 2;

/// Output of a parse: accepted issues in file order plus rejected rows
#[derive(Debug, Default)]
pub struct ParsedSnapshot {
    pub issues: Vec<IssueRecord>,
    /// Only ever `PricingError::MalformedRecord`
    pub rejected: Vec<PricingError>,
}

impl ParsedSnapshot {
    pub fn into_snapshot(self, series_name: &str, as_of: NaiveDate) -> SeriesSnapshot {
        SeriesSnapshot {
            series_name: series_name.to_string(),
            as_of,
            issues: self.issues,
        }
    }
}

/// Parser for pricing sheets
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceSheetParser;

impl PriceSheetParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse the raw text of one pricing file
    pub fn parse(&self, content: &str) -> ParsedSnapshot {
        let mut parsed = ParsedSnapshot::default();

        // Plain comma split: cells are never quoted and rows may be ragged
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(content.as_bytes());
        let mut records = reader.records();
        let mut lines = LineTracker::new(content);

        let header = match records.next() {
            Some(Ok(header)) => header,
            Some(Err(e)) => {
                warn!(error = %e, "Unreadable pricing header");
                parsed.rejected.push(unreadable_row(&e, &mut lines));
                return parsed;
            },
            None => {
                debug!("Pricing file is empty");
                return parsed;
            },
        };

        for result in records {
            let fields = match result {
                Ok(fields) => fields,
                Err(e) => {
                    warn!(error = %e, "Rejecting unreadable pricing row");
                    parsed.rejected.push(unreadable_row(&e, &mut lines));
                    continue;
                },
            };
            let line_num = lines.line_at(fields.position());

            if fields.len() <= 1 && fields.get(0).map_or(true, |f| f.trim().is_empty()) {
                continue;
            }

            if fields.len() < header.len() {
                debug!(
                    line = line_num,
                    columns = fields.len(),
                    expected = header.len(),
                    "Skipping short row"
                );
                continue;
            }

            match self.parse_row(&header, &fields, line_num) {
                Ok(issue) => parsed.issues.push(issue),
                Err(e) => {
                    warn!(
                        line = line_num,
                        name = fields.get(0).unwrap_or_default(),
                        variety = fields.get(1).unwrap_or_default(),
                        error = %e,
                        "Rejecting malformed pricing row"
                    );
                    parsed.rejected.push(e);
                },
            }
        }

        parsed
    }

    /// Parse one data row whose width already matches the header
    pub fn parse_row(
        &self,
        header: &StringRecord,
        fields: &StringRecord,
        line_num: usize,
    ) -> Result<IssueRecord, PricingError> {
        let name = fields.get(0).unwrap_or_default();
        let variety = fields.get(1).unwrap_or_default();
        let malformed = |reason: String| PricingError::MalformedRecord {
            line: line_num,
            name: name.to_string(),
            variety: variety.to_string(),
            reason,
        };

        let mut issue = IssueRecord::new(name, fields.get(1).map(str::to_string));

        for (column, cell) in fields.iter().enumerate().skip(FIRST_GRADE_COLUMN) {
            let label = header
                .get(column)
                .ok_or_else(|| malformed(format!("column {} has no grade in the header", column + 1)))?;

            let grade = parse_integer::<i32>(label).ok_or_else(|| {
                malformed(format!("grade '{}' in column {} is not an integer", label, column + 1))
            })?;

            let price = parse_integer::<i64>(cell)
                .ok_or_else(|| malformed(format!("price '{}' for grade {} is not an integer", cell, grade)))?;

            issue.prices.push(PriceObservation { grade, price });
        }

        Ok(issue)
    }
}

/// Maps reader positions to 1-based line numbers.
///
/// A record's position is where the reader started scanning for it, which
/// can sit before skipped blank lines or the `\n` of a CRLF pair.
struct LineTracker<'a> {
    bytes: &'a [u8],
    offset: usize,
    line: usize,
}

impl<'a> LineTracker<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            bytes: content.as_bytes(),
            offset: 0,
            line: 1,
        }
    }

    /// Line of the first byte at or after `position` that is not a line break.
    /// Positions must be non-decreasing.
    fn line_at(&mut self, position: Option<&csv::Position>) -> usize {
        let mut start = position
            .map_or(self.offset, |p| usize::try_from(p.byte()).unwrap_or(usize::MAX))
            .clamp(self.offset, self.bytes.len());

        while self.bytes.get(start).is_some_and(|b| matches!(b, b'\r' | b'\n')) {
            start += 1;
        }

        self.line += self.bytes[self.offset..start].iter().filter(|&&b| b == b'\n').count();
        self.offset = start;
        self.line
    }
}

fn unreadable_row(err: &csv::Error, lines: &mut LineTracker<'_>) -> PricingError {
    PricingError::MalformedRecord {
        line: lines.line_at(err.position()),
        name: String::new(),
        variety: String::new(),
        reason: err.to_string(),
    }
}

fn parse_integer<T: std::str::FromStr>(cell: &str) -> Option<T> {
    cell.trim().parse().ok()
}
