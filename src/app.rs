// src/app.rs  -  Application state: one object owning the whole live view
use chrono::Utc;

use crate::error::{IngestError, SubmitError, TransportError};
use crate::graph::{PropagationGraph, RenderFrame};
use crate::report::{ReportRow, ReportStore, SessionScope, SignalReport};
use crate::selection::{Selection, SelectionController, SelectionEvent};
use crate::station::{Callsign, ParticipantRow, Station, StationBook};
use crate::sync::{Backend, LiveSync, PumpSummary, SeedSummary};

/// Everything the map view needs, with an explicit lifecycle:
/// `join_session` starts a scope, `leave_session` falls back to the
/// no-session view, dropping the app tears the feed down.
///
/// Every mutating call rebuilds the frame before returning, so a caller
/// can never render reports or selections the frame does not reflect yet.
pub struct SimplexApp<B: Backend> {
    backend:   B,
    store:     ReportStore,
    stations:  StationBook,
    sync:      LiveSync,
    selection: SelectionController,
}

impl<B: Backend> SimplexApp<B> {
    pub fn new(backend: B, operator: Option<Station>) -> Self {
        let mut app = Self {
            backend,
            store:     ReportStore::default(),
            stations:  StationBook::new(operator),
            sync:      LiveSync::new(),
            selection: SelectionController::new(),
        };
        app.redraw();
        app
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Switch to `scope`. Selection and every report of the old scope are
    /// dropped even when the fetch for the new one fails.
    pub fn join_session(&mut self, scope: SessionScope) -> Result<SeedSummary, TransportError> {
        self.selection.handle(SelectionEvent::SessionChange);
        let seeded = self.sync.start(&self.backend, scope, &mut self.store, &mut self.stations);
        self.redraw();
        seeded
    }

    pub fn leave_session(&mut self) -> Result<SeedSummary, TransportError> {
        self.join_session(SessionScope::Unscoped)
    }

    /// Reconnect-triggered refetch of the current scope.
    pub fn resync(&mut self) -> Result<SeedSummary, TransportError> {
        let seeded = self.sync.resync(&self.backend, &mut self.store, &mut self.stations);
        self.redraw();
        seeded
    }

    /// Apply every pending change event.
    pub fn pump(&mut self) -> PumpSummary {
        let summary = self.sync.pump(&mut self.store, &mut self.stations);
        self.redraw();
        summary
    }

    /// Replace the local operator's station (new callsign or address).
    pub fn set_operator(&mut self, operator: Station) {
        self.stations.set_operator(Some(operator));
        self.selection.handle(SelectionEvent::StationChange);
        self.redraw();
    }

    // ── Map input ─────────────────────────────────────────────────────────

    /// A marker click. Malformed callsigns are refused without touching
    /// the selection.
    pub fn click(&mut self, callsign: &str) -> Result<&RenderFrame, IngestError> {
        let call = Callsign::parse(callsign)?;
        self.selection.handle(SelectionEvent::Click(call));
        Ok(self.redraw())
    }

    pub fn clear_selection(&mut self) -> &RenderFrame {
        self.selection.handle(SelectionEvent::Clear);
        self.redraw()
    }

    // ── Writes (handed to the backend; results come back on the feed) ─────

    /// Validate and insert a report for the current scope.
    pub fn submit_report(
        &self,
        reporting:   &str,
        heard:       &str,
        readability: i64,
        strength:    i64,
        notes:       Option<&str>,
    ) -> Result<ReportRow, SubmitError> {
        let mut draft = ReportRow::draft(reporting, heard, readability, strength)
            .with_session(self.store.scope().id());
        if let Some(n) = notes {
            draft = draft.with_notes(n);
        }
        // id and timestamp are assigned by the backend; stand-ins just for the check
        let probe = draft.clone().with_id("pending").with_created_at(Utc::now());
        let checked = SignalReport::try_from_row(&probe)?;

        draft.reporting_callsign = Some(checked.reporting().to_string());
        draft.heard_callsign = Some(checked.heard().to_string());
        Ok(self.backend.insert_report(draft)?)
    }

    /// Register `station` as a participant of the current session.
    pub fn check_in(&self, station: &Station) -> Result<ParticipantRow, TransportError> {
        self.backend.insert_participant(ParticipantRow {
            session_id: self.store.scope().id().map(str::to_string),
            callsign:   Some(station.callsign.to_string()),
            latitude:   Some(station.coordinates.lat),
            longitude:  Some(station.coordinates.lng),
            ..Default::default()
        })
    }

    // ── Read side ─────────────────────────────────────────────────────────

    /// Current frame, rebuilt first if anything moved since the last build.
    pub fn frame(&mut self) -> &RenderFrame {
        self.selection.sync(&self.store, &self.stations)
    }

    pub fn selection(&self) -> &Selection { self.selection.state() }
    pub fn graph(&self) -> PropagationGraph<'_> { PropagationGraph::new(&self.store) }
    pub fn store(&self) -> &ReportStore { &self.store }
    pub fn stations(&self) -> &StationBook { &self.stations }
    pub fn scope(&self) -> &SessionScope { self.store.scope() }
    pub fn is_live(&self) -> bool { self.sync.is_subscribed() }

    fn redraw(&mut self) -> &RenderFrame {
        self.selection.refresh(&self.store, &self.stations)
    }
}

impl<B: Backend> Drop for SimplexApp<B> {
    fn drop(&mut self) {
        self.sync.stop(&self.backend);
    }
}
