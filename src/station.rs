// src/station.rs  -  Callsigns, coordinates and the station book
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::error::IngestError;
use crate::report::{parse_timestamp, SessionScope};

// ── Callsign ──────────────────────────────────────────────────────────────────

/// Uppercase-normalized amateur callsign. `w7pdx ` and `W7PDX` are the same
/// station; portable suffixes (`W7PDX/P`) are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Callsign(String);

impl Callsign {
    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        let norm = raw.trim().to_ascii_uppercase();
        let valid = !norm.is_empty()
            && norm.chars().all(|c| c.is_ascii_alphanumeric() || c == '/');
        if valid {
            Ok(Self(norm))
        } else {
            Err(IngestError::InvalidCallsign(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Callsign {
    type Err = IngestError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

impl TryFrom<String> for Callsign {
    type Error = IngestError;
    fn try_from(s: String) -> Result<Self, Self::Error> { Self::parse(&s) }
}

impl From<Callsign> for String {
    fn from(c: Callsign) -> Self { c.0 }
}

impl Borrow<str> for Callsign {
    fn borrow(&self) -> &str { &self.0 }
}

// ── Coordinates ───────────────────────────────────────────────────────────────

/// WGS84 position in degrees, as handed over by the geocoder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Result<Self, IngestError> {
        let ok = lat.is_finite() && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        if ok {
            Ok(Self { lat, lng })
        } else {
            Err(IngestError::InvalidCoordinates { lat, lng })
        }
    }

    /// Great-circle distance in kilometres (haversine).
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6_371.0;

        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        EARTH_RADIUS_KM * 2.0 * a.sqrt().asin()
    }
}

// ── Station ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub callsign:    Callsign,
    pub coordinates: Coordinates,
}

impl Station {
    pub fn new(callsign: Callsign, coordinates: Coordinates) -> Self {
        Self { callsign, coordinates }
    }
}

// ── session_participants rows ─────────────────────────────────────────────────

/// One row of `session_participants` exactly as the backend delivers it.
/// Every column is optional here; [`Participant::try_from_row`] decides
/// what is actually required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRow {
    pub id:         Option<String>,
    pub session_id: Option<String>,
    pub callsign:   Option<String>,
    pub latitude:   Option<f64>,
    pub longitude:  Option<f64>,
    pub joined_at:  Option<String>,
    pub left_at:    Option<String>,
}

/// Validated participant. `left_at` set means the station has left the net.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub station:    Station,
    pub session_id: Option<String>,
    pub joined_at:  Option<DateTime<Utc>>,
    pub left_at:    Option<DateTime<Utc>>,
}

impl Participant {
    pub fn try_from_row(row: &ParticipantRow) -> Result<Self, IngestError> {
        let callsign = Callsign::parse(
            row.callsign.as_deref().ok_or(IngestError::MissingField("callsign"))?,
        )?;
        let lat = row.latitude.ok_or(IngestError::MissingField("latitude"))?;
        let lng = row.longitude.ok_or(IngestError::MissingField("longitude"))?;
        let coordinates = Coordinates::new(lat, lng)?;
        let joined_at = row.joined_at.as_deref().map(parse_timestamp).transpose()?;
        let left_at   = row.left_at.as_deref().map(parse_timestamp).transpose()?;

        Ok(Self {
            station: Station::new(callsign, coordinates),
            session_id: row.session_id.clone(),
            joined_at,
            left_at,
        })
    }

    pub fn is_active(&self) -> bool { self.left_at.is_none() }
}

// ── Station book ──────────────────────────────────────────────────────────────

/// Where every placeable station sits: the local operator plus the active
/// participants of the current session, in join order.
#[derive(Debug, Default)]
pub struct StationBook {
    operator:     Option<Station>,
    participants: Vec<Station>,
    revision:     u64,
}

impl StationBook {
    pub fn new(operator: Option<Station>) -> Self {
        Self { operator, ..Default::default() }
    }

    pub fn operator(&self) -> Option<&Station> { self.operator.as_ref() }

    pub fn set_operator(&mut self, operator: Option<Station>) {
        self.operator = operator;
        self.revision += 1;
    }

    /// Bumped on every change that can move or add a marker.
    pub fn revision(&self) -> u64 { self.revision }

    /// Seed from a bulk participant fetch. Rows outside `scope` or already
    /// left are ignored; a callsign listed twice keeps its latest position.
    pub fn replace_participants<I>(&mut self, scope: &SessionScope, participants: I)
    where
        I: IntoIterator<Item = Participant>,
    {
        self.participants.clear();
        for p in participants {
            if p.is_active() && scope.contains(p.session_id.as_deref()) {
                self.upsert(p.station);
            }
        }
        self.revision += 1;
    }

    /// Apply one live participant change. Returns whether anything moved.
    pub fn apply(&mut self, scope: &SessionScope, participant: Participant) -> Result<bool, IngestError> {
        if !scope.contains(participant.session_id.as_deref()) {
            return Err(IngestError::OutOfScope {
                expected: scope.to_string(),
                found:    SessionScope::from_column(participant.session_id.as_deref()).to_string(),
            });
        }
        let changed = if participant.is_active() {
            self.upsert(participant.station)
        } else {
            self.remove(&participant.station.callsign)
        };
        if changed { self.revision += 1; }
        Ok(changed)
    }

    /// Position of `callsign`, resolved the same way as [`Self::stations`]:
    /// the operator wins over a participant row with the same callsign.
    pub fn coordinates(&self, callsign: &Callsign) -> Option<Coordinates> {
        self.operator.iter()
            .chain(self.participants.iter())
            .find(|s| &s.callsign == callsign)
            .map(|s| s.coordinates)
    }

    /// Operator first, then participants in join order, each callsign once.
    pub fn stations(&self) -> Vec<&Station> {
        let mut out: Vec<&Station> = self.operator.iter().collect();
        for p in &self.participants {
            if !out.iter().any(|s| s.callsign == p.callsign) {
                out.push(p);
            }
        }
        out
    }

    pub fn participant_count(&self) -> usize { self.participants.len() }

    fn upsert(&mut self, station: Station) -> bool {
        match self.participants.iter_mut().find(|s| s.callsign == station.callsign) {
            Some(existing) if *existing == station => false,
            Some(existing) => { *existing = station; true }
            None => { self.participants.push(station); true }
        }
    }

    fn remove(&mut self, callsign: &Callsign) -> bool {
        let before = self.participants.len();
        self.participants.retain(|s| &s.callsign != callsign);
        before != self.participants.len()
    }
}
