// src/graph/mod.rs  -  Directed "who hears whom" view over the report store
pub mod render;

use std::collections::HashMap;

use crate::report::{ReportStore, SignalQuality, SignalReport};
use crate::station::Callsign;

pub use render::{build_frame, ColorHint, EdgeLine, Marker, MarkerColor, RenderFrame};

/// Which side of the selected station the view shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Outgoing edges `X -> C`: the stations X reported hearing
    #[default]
    CanHear,
    /// Incoming edges `C -> X`: the stations that reported hearing X
    HeardBy,
}

impl Direction {
    pub fn toggle(self) -> Self {
        match self {
            Direction::CanHear => Direction::HeardBy,
            Direction::HeardBy => Direction::CanHear,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::CanHear => "can hear",
            Direction::HeardBy => "heard by",
        }
    }
}

/// One logical edge `from -> to` ("from can hear to"), coalescing every
/// report on that ordered pair. Only the graph builds edges, so an edge
/// always holds at least one report.
#[derive(Debug, Clone)]
pub struct Edge<'a> {
    pub from: &'a Callsign,
    pub to:   &'a Callsign,
    reports:  Vec<&'a SignalReport>,
    best:     &'a SignalReport,
}

impl<'a> Edge<'a> {
    fn new(first: &'a SignalReport) -> Self {
        Self { from: first.reporting(), to: first.heard(), reports: vec![first], best: first }
    }

    fn push(&mut self, report: &'a SignalReport) {
        if (report.readability(), report.strength()) > (self.best.readability(), self.best.strength()) {
            self.best = report;
        }
        self.reports.push(report);
    }

    /// Every report on the pair, in arrival order.
    pub fn reports(&self) -> &[&'a SignalReport] { &self.reports }

    pub fn report_count(&self) -> usize { self.reports.len() }

    /// Report with the best copy: highest readability, then strength.
    /// The earliest report wins a tie.
    pub fn best(&self) -> &'a SignalReport { self.best }

    pub fn quality(&self) -> SignalQuality { self.best().quality() }

    /// The station on the far side of the selection for `direction`.
    pub fn neighbor(&self, direction: Direction) -> &'a Callsign {
        match direction {
            Direction::CanHear => self.to,
            Direction::HeardBy => self.from,
        }
    }
}

/// Pure derived view: every answer is recomputed from the store it borrows,
/// so it can never drift from the source of truth.
#[derive(Debug, Clone, Copy)]
pub struct PropagationGraph<'a> {
    store: &'a ReportStore,
}

impl<'a> PropagationGraph<'a> {
    pub fn new(store: &'a ReportStore) -> Self { Self { store } }

    /// Stations that reported hearing `callsign`, first-seen order.
    /// Unknown or malformed callsigns yield an empty list.
    pub fn stations_who_can_hear(&self, callsign: &str) -> Vec<Callsign> {
        self.neighbors(callsign, Direction::HeardBy)
    }

    /// Stations `callsign` reported hearing, first-seen order.
    pub fn stations_heard_by(&self, callsign: &str) -> Vec<Callsign> {
        self.neighbors(callsign, Direction::CanHear)
    }

    /// Coalesced edges touching `callsign` on the `direction` side, ordered
    /// by the arrival of the first report on each pair.
    pub fn edges(&self, callsign: &Callsign, direction: Direction) -> Vec<Edge<'a>> {
        let reports: Box<dyn Iterator<Item = (usize, &'a SignalReport)> + 'a> = match direction {
            Direction::CanHear => Box::new(self.store.reported_by(callsign)),
            Direction::HeardBy => Box::new(self.store.reports_hearing(callsign)),
        };

        let mut edges: Vec<Edge<'a>> = Vec::new();
        let mut slot: HashMap<&'a Callsign, usize> = HashMap::new();
        // index lists are append-only, so arrival order is already ascending
        for (_, r) in reports {
            let key = match direction {
                Direction::CanHear => r.heard(),
                Direction::HeardBy => r.reporting(),
            };
            match slot.get(key) {
                Some(&i) => edges[i].push(r),
                None => {
                    slot.insert(key, edges.len());
                    edges.push(Edge::new(r));
                }
            }
        }
        edges
    }

    /// The coalesced edge `from -> to`, if any report backs it.
    pub fn edge(&self, from: &Callsign, to: &Callsign) -> Option<Edge<'a>> {
        self.edges(from, Direction::CanHear).into_iter().find(|e| e.to == to)
    }

    /// Every callsign any report mentions, first-seen order.
    pub fn stations(&self) -> Vec<Callsign> {
        let mut seen: Vec<Callsign> = Vec::new();
        for r in self.store.iter() {
            for c in [r.reporting(), r.heard()] {
                if !seen.contains(c) {
                    seen.push(c.clone());
                }
            }
        }
        seen
    }

    /// Number of distinct ordered pairs with at least one report.
    pub fn edge_count(&self) -> usize {
        let mut pairs: Vec<(&Callsign, &Callsign)> = self.store.iter()
            .map(|r| (r.reporting(), r.heard()))
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs.len()
    }

    fn neighbors(&self, callsign: &str, direction: Direction) -> Vec<Callsign> {
        let Ok(call) = Callsign::parse(callsign) else {
            return Vec::new();
        };
        self.edges(&call, direction)
            .iter()
            .map(|e| e.neighbor(direction).clone())
            .collect()
    }
}
