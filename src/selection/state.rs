// src/selection/state.rs  -  Selected station + view direction state machine
use crate::graph::{build_frame, Direction, PropagationGraph, RenderFrame};
use crate::report::ReportStore;
use crate::station::{Callsign, StationBook};

/// Direction a freshly selected station opens in. Re-clicking flips it.
pub const DEFAULT_DIRECTION: Direction = Direction::CanHear;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    Idle,
    Selected { callsign: Callsign, direction: Direction },
}

impl Selection {
    pub fn callsign(&self) -> Option<&Callsign> {
        match self {
            Selection::Idle => None,
            Selection::Selected { callsign, .. } => Some(callsign),
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            Selection::Idle => None,
            Selection::Selected { direction, .. } => Some(*direction),
        }
    }
}

/// Inputs to the state machine. Clicks are the only input the map emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    Click(Callsign),
    Clear,
    /// The session scope changed; every report is gone.
    SessionChange,
    /// The local operator's station was replaced.
    StationChange,
}

/// What the current frame was built from
#[derive(Debug, Clone, PartialEq, Eq)]
struct Stamp {
    store_revision:   u64,
    station_revision: u64,
    selection:        Selection,
}

#[derive(Debug, Default)]
pub struct SelectionController {
    state:    Selection,
    frame:    RenderFrame,
    rendered: Option<Stamp>,
}

impl SelectionController {
    pub fn new() -> Self { Self::default() }

    pub fn state(&self) -> &Selection { &self.state }

    /// Advance the state machine. Returns true when the selection changed.
    pub fn handle(&mut self, event: SelectionEvent) -> bool {
        let next = match (&self.state, event) {
            (Selection::Selected { callsign, direction }, SelectionEvent::Click(clicked))
                if *callsign == clicked =>
            {
                Selection::Selected { callsign: clicked, direction: direction.toggle() }
            }
            (_, SelectionEvent::Click(clicked)) => {
                Selection::Selected { callsign: clicked, direction: DEFAULT_DIRECTION }
            }
            (_, SelectionEvent::Clear | SelectionEvent::SessionChange | SelectionEvent::StationChange) => {
                Selection::Idle
            }
        };
        if next == self.state {
            return false;
        }
        log::debug!("[selection] {:?} -> {:?}", self.state, next);
        self.state = next;
        true
    }

    /// True when the frame no longer reflects the selection, the reports or
    /// the station positions.
    pub fn is_stale(&self, store: &ReportStore, stations: &StationBook) -> bool {
        self.rendered.as_ref() != Some(&self.stamp(store, stations))
    }

    /// Discard the previous frame and build a new one from scratch.
    pub fn refresh(&mut self, store: &ReportStore, stations: &StationBook) -> &RenderFrame {
        let graph = PropagationGraph::new(store);
        let selection = match &self.state {
            Selection::Idle => None,
            Selection::Selected { callsign, direction } => Some((callsign, *direction)),
        };
        self.frame = build_frame(selection, &graph, stations);
        self.rendered = Some(self.stamp(store, stations));
        &self.frame
    }

    /// Current frame, rebuilt first if anything it depends on moved.
    pub fn sync(&mut self, store: &ReportStore, stations: &StationBook) -> &RenderFrame {
        if self.is_stale(store, stations) {
            self.refresh(store, stations);
        }
        &self.frame
    }

    /// Last built frame, possibly stale.
    pub fn frame(&self) -> &RenderFrame { &self.frame }

    fn stamp(&self, store: &ReportStore, stations: &StationBook) -> Stamp {
        Stamp {
            store_revision:   store.revision(),
            station_revision: stations.revision(),
            selection:        self.state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportRow;
    use chrono::{TimeZone, Utc};

    fn call(s: &str) -> Callsign { Callsign::parse(s).unwrap() }

    #[test]
    fn test_first_click_uses_default_direction() {
        let mut sel = SelectionController::new();
        assert!(sel.handle(SelectionEvent::Click(call("W7PDX"))));
        assert_eq!(sel.state().direction(), Some(Direction::CanHear));
    }

    #[test]
    fn test_reclick_toggles() {
        let mut sel = SelectionController::new();
        sel.handle(SelectionEvent::Click(call("W7PDX")));
        sel.handle(SelectionEvent::Click(call("W7PDX")));
        assert_eq!(sel.state().direction(), Some(Direction::HeardBy));
        sel.handle(SelectionEvent::Click(call("W7PDX")));
        assert_eq!(sel.state().direction(), Some(Direction::CanHear));
    }

    #[test]
    fn test_other_station_resets_direction() {
        let mut sel = SelectionController::new();
        sel.handle(SelectionEvent::Click(call("W7PDX")));
        sel.handle(SelectionEvent::Click(call("W7PDX")));
        sel.handle(SelectionEvent::Click(call("K7SEA")));
        assert_eq!(
            sel.state(),
            &Selection::Selected { callsign: call("K7SEA"), direction: DEFAULT_DIRECTION }
        );
    }

    #[test]
    fn test_clear_and_forced_idle() {
        let mut sel = SelectionController::new();
        assert!(!sel.handle(SelectionEvent::Clear));
        for ev in [SelectionEvent::Clear, SelectionEvent::SessionChange, SelectionEvent::StationChange] {
            sel.handle(SelectionEvent::Click(call("W7PDX")));
            assert!(sel.handle(ev));
            assert_eq!(sel.state(), &Selection::Idle);
        }
    }

    #[test]
    fn test_store_mutation_marks_frame_stale() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap();
        let mut store = ReportStore::default();
        let book = StationBook::default();
        let mut sel = SelectionController::new();
        sel.handle(SelectionEvent::Click(call("W7PDX")));
        assert!(sel.is_stale(&store, &book));
        sel.refresh(&store, &book);
        assert!(!sel.is_stale(&store, &book));

        store.ingest(&ReportRow::draft("W7PDX", "K7SEA", 4, 5).with_id("1").with_created_at(t0)).unwrap();
        assert!(sel.is_stale(&store, &book));
        let frame = sel.sync(&store, &book);
        assert_eq!(frame.unplaced, vec![call("K7SEA")]);
        assert!(!sel.is_stale(&store, &book));
    }
}
