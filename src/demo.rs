// src/demo.rs  -  Scripted demo net: W7PDX runs net control, three stations check in
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

use crate::error::{IngestError, TransportError};
use crate::report::{ReportRow, SessionScope};
use crate::station::{Callsign, Coordinates, ParticipantRow, Station};
use crate::sync::Backend;

pub struct DemoStation {
    pub call:  &'static str,
    pub place: &'static str,
    pub lat:   f64,
    pub lng:   f64,
}

pub static NET_CONTROL: DemoStation =
    DemoStation { call: "W7PDX", place: "Portland, Oregon", lat: 45.5155, lng: -122.6789 };

pub static CHECK_INS: &[DemoStation] = &[
    DemoStation { call: "K7SEA", place: "Seattle, Washington", lat: 47.6062, lng: -122.3321 },
    DemoStation { call: "K7BOI", place: "Boise, Idaho",        lat: 43.615,  lng: -116.2023 },
    DemoStation { call: "K7EUG", place: "Eugene, Oregon",      lat: 44.0521, lng: -123.0868 },
];

/// RS grades the demo hands out
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Grade { Good, Medium, Poor }

impl Grade {
    pub fn rs(self) -> (i64, i64) {
        match self {
            Grade::Good   => (5, 9),
            Grade::Medium => (4, 5),
            Grade::Poor   => (2, 3),
        }
    }
}

/// Reports filed once the given station is on the net: (from, to, grade)
fn reports_for(call: &str) -> &'static [(&'static str, &'static str, Grade)] {
    match call {
        "K7SEA" => &[
            ("W7PDX", "K7SEA", Grade::Medium),
        ],
        "K7BOI" => &[
            ("W7PDX", "K7BOI", Grade::Poor),
            ("K7BOI", "W7PDX", Grade::Poor),
            ("K7SEA", "K7BOI", Grade::Poor),
            ("K7BOI", "K7SEA", Grade::Poor),
        ],
        "K7EUG" => &[
            ("W7PDX", "K7EUG", Grade::Good),
            ("K7EUG", "W7PDX", Grade::Good),
            ("K7SEA", "K7EUG", Grade::Medium),
            ("K7EUG", "K7SEA", Grade::Medium),
            ("K7EUG", "K7BOI", Grade::Medium),
            ("K7BOI", "K7EUG", Grade::Medium),
        ],
        _ => &[],
    }
}

impl DemoStation {
    pub fn station(&self) -> Result<Station, IngestError> {
        Ok(Station::new(Callsign::parse(self.call)?, Coordinates::new(self.lat, self.lng)?))
    }
}

/// What the script wants shown
#[derive(Debug, Clone, PartialEq)]
pub enum DemoEvent {
    /// A line of net traffic for the log panel
    Say(String),
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Init,
    Calling(usize),
    Answering(usize),
    Confirming(usize),
    Closing,
    Done,
}

pub struct DemoScript {
    phase:     Phase,
    scope:     SessionScope,
    next_at:   Instant,
    min_delay: Duration,
    max_delay: Duration,
    rng:       SmallRng,
}

impl DemoScript {
    pub fn new(scope: SessionScope, min_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self::with_rng(scope, min_delay_ms, max_delay_ms, SmallRng::from_entropy())
    }

    pub fn with_rng(scope: SessionScope, min_delay_ms: u64, max_delay_ms: u64, rng: SmallRng) -> Self {
        Self {
            phase:     Phase::Init,
            scope,
            next_at:   Instant::now(),
            min_delay: Duration::from_millis(min_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms.max(min_delay_ms)),
            rng,
        }
    }

    /// Call every loop tick. Writes go to the backend, so the map only sees
    /// them once they come back on the live feed, like any other client's.
    pub fn tick<B: Backend + ?Sized>(&mut self, now: Instant, backend: &B) -> Result<Option<DemoEvent>, TransportError> {
        if self.phase == Phase::Done {
            return Ok(Some(DemoEvent::Complete));
        }
        if now < self.next_at {
            return Ok(None);
        }

        let say = match self.phase.clone() {
            Phase::Init => {
                self.join(backend, &NET_CONTROL)?;
                self.phase = Phase::Calling(0);
                format!(
                    "Welcome to the simplex net. This is {} acting as net control. \
                     Stations will check in one by one; click a station to see who it can hear, \
                     click again to see who can hear it.",
                    NET_CONTROL.call
                )
            }
            Phase::Calling(i) => {
                self.phase = Phase::Answering(i);
                format!("{} are you there?", CHECK_INS[i].call)
            }
            Phase::Answering(i) => {
                let st = &CHECK_INS[i];
                self.join(backend, st)?;
                self.phase = Phase::Confirming(i);
                format!("{} checking in from {}", st.call, st.place)
            }
            Phase::Confirming(i) => {
                let st = &CHECK_INS[i];
                for &(from, to, grade) in reports_for(st.call) {
                    let (r, s) = grade.rs();
                    backend.insert_report(
                        ReportRow::draft(from, to, r, s).with_session(self.scope.id()),
                    )?;
                }
                self.phase = if i + 1 < CHECK_INS.len() { Phase::Calling(i + 1) } else { Phase::Closing };
                format!("{} you are checked into the net.", st.call)
            }
            Phase::Closing => {
                self.phase = Phase::Done;
                "All stations are checked in. Reception is not symmetric: terrain, antennas \
                 and power decide who hears whom. 73, net closed."
                    .to_string()
            }
            Phase::Done => return Ok(Some(DemoEvent::Complete)),
        };

        log::debug!("[demo] {say}");
        self.schedule(now);
        Ok(Some(DemoEvent::Say(say)))
    }

    pub fn is_done(&self) -> bool { self.phase == Phase::Done }

    fn join<B: Backend + ?Sized>(&self, backend: &B, st: &DemoStation) -> Result<(), TransportError> {
        backend.insert_participant(ParticipantRow {
            session_id: self.scope.id().map(str::to_string),
            callsign:   Some(st.call.to_string()),
            latitude:   Some(st.lat),
            longitude:  Some(st.lng),
            ..Default::default()
        })?;
        Ok(())
    }

    fn schedule(&mut self, now: Instant) {
        let ms = self.rng.gen_range(
            self.min_delay.as_millis() as u64 ..= self.max_delay.as_millis() as u64
        );
        self.next_at = now + Duration::from_millis(ms);
    }
}
