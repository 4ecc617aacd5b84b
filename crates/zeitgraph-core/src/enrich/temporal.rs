use chrono::{Datelike, NaiveDate};

use crate::entity::{Precision, TemporalAttributes, TimeType};

#[derive(Debug, thiserror::Error)]
pub enum DateError {
    #[error("Unparseable date expression {0:?}")]
    Unparseable(String),
}

pub type DateResult<T> = Result<T, DateError>;

/// Turns a time expression into an ISO date span.
#[async_trait::async_trait]
pub trait DateResolver: Send + Sync {
    /// `normalized` is tried first; `surface` is the fallback.
    async fn resolve(&self, normalized: &str, surface: &str) -> DateResult<TemporalAttributes>;
}

/// Surface formats tried when the normalized value is not ISO-like.
const SURFACE_FORMATS: &[&str] = &["%d %B %Y", "%d. %B %Y", "%B %d, %Y", "%d.%m.%Y", "%Y-%m-%d"];

/// Offline resolver for ISO-style values, year ranges and a few common
/// written forms.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsoDateResolver;

impl IsoDateResolver {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    pub fn resolve_now(&self, normalized: &str, surface: &str) -> DateResult<TemporalAttributes> {
        let normalized = normalized.trim();

        if let Some(day) = normalized.get(..10).and_then(parse_day) {
            return Ok(TemporalAttributes::span(Precision::Day, TimeType::Point, day, day, 0.9));
        }
        if let Some((start, end)) = normalized.get(..7).and_then(parse_month) {
            return Ok(TemporalAttributes::span(
                Precision::Month,
                TimeType::Period,
                start,
                end,
                0.85,
            ));
        }
        if let Some((start, end)) = parse_year(normalized) {
            return Ok(TemporalAttributes::span(
                Precision::Year,
                TimeType::Period,
                start,
                end,
                0.8,
            ));
        }
        if let Some((start, end)) = parse_year_range(normalized) {
            return Ok(TemporalAttributes::span(
                Precision::Range,
                TimeType::Period,
                start,
                end,
                0.75,
            ));
        }

        let surface = surface.trim();
        SURFACE_FORMATS
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(surface, format).ok())
            .map(|day| TemporalAttributes::span(Precision::Day, TimeType::Point, day, day, 0.7))
            .ok_or_else(|| {
                let shown = if surface.is_empty() { normalized } else { surface };
                DateError::Unparseable(shown.to_string())
            })
    }
}

#[async_trait::async_trait]
impl DateResolver for IsoDateResolver {
    async fn resolve(&self, normalized: &str, surface: &str) -> DateResult<TemporalAttributes> {
        self.resolve_now(normalized, surface)
    }
}

fn parse_day(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn four_digit_year(value: &str) -> Option<i32> {
    if value.len() == 4 && value.bytes().all(|b| b.is_ascii_digit()) {
        value.parse().ok()
    } else {
        None
    }
}

/// `YYYY-MM`, spanning the whole month.
fn parse_month(value: &str) -> Option<(NaiveDate, NaiveDate)> {
    let (year, month) = value.split_once('-')?;
    let year = four_digit_year(year)?;
    if month.len() != 2 {
        return None;
    }
    let month: u32 = month.parse().ok()?;

    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, next.pred_opt()?))
}

fn year_span(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some((
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year, 12, 31)?,
    ))
}

fn parse_year(value: &str) -> Option<(NaiveDate, NaiveDate)> {
    year_span(four_digit_year(value)?)
}

/// `YYYY-YYYY`, `YYYY/YYYY` or `YYYY–YYYY`, from January 1st of the first
/// year to December 31st of the second.
fn parse_year_range(value: &str) -> Option<(NaiveDate, NaiveDate)> {
    let (from, to) = value.split_once(['-', '/', '–'])?;
    let (start, _) = year_span(four_digit_year(from.trim())?)?;
    let (_, end) = year_span(four_digit_year(to.trim())?)?;
    if start.year() > end.year() {
        return None;
    }
    Some((start, end))
}
