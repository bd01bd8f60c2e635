// src/report/model.rs  -  Signal reports, wire rows and session scope
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::IngestError;
use crate::station::Callsign;

/// RS convention: readability 1..=5, strength 1..=9
pub const READABILITY_MIN: u8 = 1;
pub const READABILITY_MAX: u8 = 5;
pub const STRENGTH_MIN:    u8 = 1;
pub const STRENGTH_MAX:    u8 = 9;

// ── Session scope ─────────────────────────────────────────────────────────────

/// Hard partition boundary for reports and participants. Rows without a
/// `session_id` belong to [`SessionScope::Unscoped`] and nowhere else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SessionScope {
    #[default]
    Unscoped,
    Session(String),
}

impl SessionScope {
    pub fn session(id: impl Into<String>) -> Self { Self::Session(id.into()) }

    /// Scope a row's `session_id` column places it in.
    pub fn from_column(session_id: Option<&str>) -> Self {
        match session_id {
            Some(id) => Self::Session(id.to_string()),
            None     => Self::Unscoped,
        }
    }

    pub fn contains(&self, session_id: Option<&str>) -> bool {
        match (self, session_id) {
            (Self::Unscoped, None)          => true,
            (Self::Session(s), Some(other)) => s == other,
            _ => false,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Unscoped   => None,
            Self::Session(s) => Some(s),
        }
    }
}

impl fmt::Display for SessionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unscoped   => f.write_str("no session"),
            Self::Session(s) => write!(f, "session {s}"),
        }
    }
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, IngestError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| IngestError::InvalidTimestamp(raw.to_string()))
}

// ── signal_reports rows ───────────────────────────────────────────────────────

/// One row of `signal_reports` as the backend stores and streams it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub id:                 Option<String>,
    pub reporting_callsign: Option<String>,
    pub heard_callsign:     Option<String>,
    pub readability:        Option<i64>,
    pub strength:           Option<i64>,
    pub notes:              Option<String>,
    pub created_at:         Option<String>,
    pub session_id:         Option<String>,
}

impl ReportRow {
    /// Row as a form submission produces it: no id, no timestamp yet.
    pub fn draft(reporting: &str, heard: &str, readability: i64, strength: i64) -> Self {
        Self {
            reporting_callsign: Some(reporting.to_string()),
            heard_callsign:     Some(heard.to_string()),
            readability:        Some(readability),
            strength:           Some(strength),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_session(mut self, session_id: Option<&str>) -> Self {
        self.session_id = session_id.map(str::to_string);
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at.to_rfc3339());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Decode a JSON array of `signal_reports` rows, one row at a time. A row
/// whose columns have the wrong JSON type is logged and skipped; the second
/// value counts them. Only a document that is not an array is an error.
pub fn parse_report_rows(raw: &str) -> Result<(Vec<ReportRow>, usize), serde_json::Error> {
    let values: Vec<serde_json::Value> = serde_json::from_str(raw)?;
    let mut rows = Vec::with_capacity(values.len());
    let mut skipped = 0;
    for (i, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<ReportRow>(value) {
            Ok(row) => rows.push(row),
            Err(e) => {
                log::warn!("[reports] row {i} skipped: {e}");
                skipped += 1;
            }
        }
    }
    Ok((rows, skipped))
}

// ── Validated report ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReportId(String);

impl ReportId {
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Coarse grading of an RS pair, used as the line colour hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignalQuality { Weak, Fair, Strong }

impl SignalQuality {
    pub fn grade(readability: u8, strength: u8) -> Self {
        if readability >= 5 && strength >= 7 {
            SignalQuality::Strong
        } else if readability >= 3 && strength >= 4 {
            SignalQuality::Fair
        } else {
            SignalQuality::Weak
        }
    }
}

/// Immutable, validated signal report: `reporting` says it can hear `heard`.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalReport {
    id:          ReportId,
    reporting:   Callsign,
    heard:       Callsign,
    readability: u8,
    strength:    u8,
    notes:       Option<String>,
    created_at:  DateTime<Utc>,
    session_id:  Option<String>,
}

impl SignalReport {
    pub fn try_from_row(row: &ReportRow) -> Result<Self, IngestError> {
        let id = row.id.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(IngestError::MissingField("id"))?;
        let reporting = Callsign::parse(
            row.reporting_callsign.as_deref().ok_or(IngestError::MissingField("reporting_callsign"))?,
        )?;
        let heard = Callsign::parse(
            row.heard_callsign.as_deref().ok_or(IngestError::MissingField("heard_callsign"))?,
        )?;
        let readability = in_range(
            "readability",
            row.readability.ok_or(IngestError::MissingField("readability"))?,
            READABILITY_MIN,
            READABILITY_MAX,
        )?;
        let strength = in_range(
            "strength",
            row.strength.ok_or(IngestError::MissingField("strength"))?,
            STRENGTH_MIN,
            STRENGTH_MAX,
        )?;
        let created_at = parse_timestamp(
            row.created_at.as_deref().ok_or(IngestError::MissingField("created_at"))?,
        )?;

        if reporting == heard {
            return Err(IngestError::SelfReport(reporting.to_string()));
        }

        Ok(Self {
            id: ReportId(id.to_string()),
            reporting,
            heard,
            readability,
            strength,
            notes: row.notes.clone().filter(|n| !n.trim().is_empty()),
            created_at,
            session_id: row.session_id.clone(),
        })
    }

    pub fn to_row(&self) -> ReportRow {
        ReportRow {
            id:                 Some(self.id.0.clone()),
            reporting_callsign: Some(self.reporting.to_string()),
            heard_callsign:     Some(self.heard.to_string()),
            readability:        Some(self.readability.into()),
            strength:           Some(self.strength.into()),
            notes:              self.notes.clone(),
            created_at:         Some(self.created_at.to_rfc3339()),
            session_id:         self.session_id.clone(),
        }
    }

    pub fn id(&self) -> &ReportId { &self.id }
    pub fn reporting(&self) -> &Callsign { &self.reporting }
    pub fn heard(&self) -> &Callsign { &self.heard }
    pub fn readability(&self) -> u8 { self.readability }
    pub fn strength(&self) -> u8 { self.strength }
    pub fn notes(&self) -> Option<&str> { self.notes.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn session_id(&self) -> Option<&str> { self.session_id.as_deref() }
    pub fn quality(&self) -> SignalQuality { SignalQuality::grade(self.readability, self.strength) }
}

fn in_range(field: &'static str, value: i64, min: u8, max: u8) -> Result<u8, IngestError> {
    if (i64::from(min)..=i64::from(max)).contains(&value) {
        Ok(value as u8)
    } else {
        Err(IngestError::OutOfRange { field, value, min: min.into(), max: max.into() })
    }
}
