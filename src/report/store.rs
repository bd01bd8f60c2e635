// src/report/store.rs  -  Session-scoped, deduplicating report store
use std::collections::HashMap;

use crate::error::IngestError;
use crate::station::Callsign;
use super::model::{ReportId, ReportRow, SessionScope, SignalReport};

/// Result of a successful append. Redelivery of a known id is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    Inserted,
    Duplicate,
}

/// Counters from a bulk load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded:     usize,
    pub duplicates: usize,
    pub rejected:   usize,
}

/// Owns every report of the active session scope.
///
/// Reports are kept in arrival order with per-callsign indexes on both ends
/// of the edge, so "who reported X" and "what did X report" are hash lookups
/// rather than scans. Arrival position doubles as the first-seen tie-break
/// used by the graph layer.
#[derive(Debug, Default)]
pub struct ReportStore {
    scope:        SessionScope,
    reports:      Vec<SignalReport>,
    ids:          HashMap<ReportId, usize>,
    by_reporting: HashMap<Callsign, Vec<usize>>,
    by_heard:     HashMap<Callsign, Vec<usize>>,
    revision:     u64,
}

impl ReportStore {
    pub fn new(scope: SessionScope) -> Self {
        Self { scope, ..Default::default() }
    }

    pub fn scope(&self) -> &SessionScope { &self.scope }
    pub fn len(&self) -> usize { self.reports.len() }
    pub fn is_empty(&self) -> bool { self.reports.is_empty() }

    /// Bumped on every mutation that can change a query result.
    pub fn revision(&self) -> u64 { self.revision }

    pub fn contains(&self, id: &ReportId) -> bool { self.ids.contains_key(id) }

    /// Insert a validated report. Reports from another scope are refused and
    /// leave the store untouched.
    pub fn append(&mut self, report: SignalReport) -> Result<Appended, IngestError> {
        if !self.scope.contains(report.session_id()) {
            return Err(IngestError::OutOfScope {
                expected: self.scope.to_string(),
                found:    SessionScope::from_column(report.session_id()).to_string(),
            });
        }
        if self.ids.contains_key(report.id()) {
            log::debug!("[store] duplicate report {} ignored", report.id());
            return Ok(Appended::Duplicate);
        }
        self.push(report);
        self.revision += 1;
        Ok(Appended::Inserted)
    }

    /// Validate a raw row and append it.
    pub fn ingest(&mut self, row: &ReportRow) -> Result<Appended, IngestError> {
        let report = SignalReport::try_from_row(row)?;
        self.append(report)
    }

    /// Drop everything and reload from a bulk fetch for `scope`.
    ///
    /// `rows` come newest-first (`order by created_at desc`). Malformed or
    /// out-of-scope rows are logged and counted, never fatal. When `scope` is
    /// the current one, surviving reports keep their arrival position.
    pub fn replace_all<I>(&mut self, scope: SessionScope, rows: I) -> LoadSummary
    where
        I: IntoIterator<Item = ReportRow>,
    {
        let mut summary = LoadSummary::default();
        let mut valid = Vec::new();
        for row in rows {
            match SignalReport::try_from_row(&row) {
                Ok(r) if scope.contains(r.session_id()) => valid.push(r),
                Ok(r) => {
                    log::warn!("[store] bulk row {} outside {scope} skipped", r.id());
                    summary.rejected += 1;
                }
                Err(e) => {
                    log::warn!("[store] bulk row {:?} rejected: {e}", row.id);
                    summary.rejected += 1;
                }
            }
        }
        // Reports already held keep their slot; new ones follow, oldest first.
        // Re-seeding an unchanged set therefore leaves first-seen order alone.
        let prior = if scope == self.scope {
            std::mem::take(&mut self.ids)
        } else {
            HashMap::new()
        };
        valid.reverse();
        valid.sort_by_key(|r| (prior.get(r.id()).copied().unwrap_or(usize::MAX), r.created_at()));

        self.scope = scope;
        self.reports.clear();
        self.ids.clear();
        self.by_reporting.clear();
        self.by_heard.clear();
        for r in valid {
            if self.ids.contains_key(r.id()) {
                summary.duplicates += 1;
            } else {
                self.push(r);
                summary.loaded += 1;
            }
        }
        self.revision += 1;
        summary
    }

    /// Lazy scan over every report matching `pred`, in arrival order.
    /// Calling it again restarts from the top.
    pub fn query<'a, P>(&'a self, pred: P) -> impl Iterator<Item = &'a SignalReport> + 'a
    where
        P: Fn(&SignalReport) -> bool + 'a,
    {
        self.reports.iter().filter(move |r| pred(r))
    }

    /// Reports whose reporting station is `callsign`, with arrival position.
    pub fn reported_by<'a>(&'a self, callsign: &Callsign) -> impl Iterator<Item = (usize, &'a SignalReport)> + 'a {
        self.indexed(self.by_reporting.get(callsign))
    }

    /// Reports in which `callsign` was heard, with arrival position.
    pub fn reports_hearing<'a>(&'a self, callsign: &Callsign) -> impl Iterator<Item = (usize, &'a SignalReport)> + 'a {
        self.indexed(self.by_heard.get(callsign))
    }

    /// Every report, oldest arrival first.
    pub fn iter(&self) -> impl Iterator<Item = &SignalReport> { self.reports.iter() }

    /// The `n` most recently arrived reports, newest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &SignalReport> {
        self.reports.iter().rev().take(n)
    }

    fn indexed<'a>(&'a self, slots: Option<&'a Vec<usize>>) -> impl Iterator<Item = (usize, &'a SignalReport)> + 'a {
        slots.into_iter().flatten().map(move |&i| (i, &self.reports[i]))
    }

    fn push(&mut self, report: SignalReport) {
        let slot = self.reports.len();
        self.ids.insert(report.id().clone(), slot);
        self.by_reporting.entry(report.reporting().clone()).or_default().push(slot);
        self.by_heard.entry(report.heard().clone()).or_default().push(slot);
        self.reports.push(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn row(id: &str, from: &str, to: &str, minute: i64) -> ReportRow {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap();
        ReportRow::draft(from, to, 4, 5)
            .with_id(id)
            .with_created_at(t0 + Duration::minutes(minute))
    }

    fn call(s: &str) -> Callsign { Callsign::parse(s).unwrap() }

    #[test]
    fn test_append_is_idempotent() {
        let mut store = ReportStore::default();
        assert_eq!(store.ingest(&row("a", "W7PDX", "K7SEA", 0)), Ok(Appended::Inserted));
        let rev = store.revision();
        assert_eq!(store.ingest(&row("a", "W7PDX", "K7SEA", 0)), Ok(Appended::Duplicate));
        assert_eq!(store.len(), 1);
        assert_eq!(store.revision(), rev);
    }

    #[test]
    fn test_recent_is_newest_first() {
        let mut store = ReportStore::default();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            store.ingest(&row(id, "W7PDX", "K7SEA", i as i64)).unwrap();
        }
        let ids: Vec<&str> = store.recent(2).map(|r| r.id().as_str()).collect();
        assert_eq!(ids, ["c", "b"]);
    }

    #[test]
    fn test_malformed_row_leaves_state_untouched() {
        let mut store = ReportStore::default();
        store.ingest(&row("a", "W7PDX", "K7SEA", 0)).unwrap();
        let rev = store.revision();

        let mut bad = row("b", "K7SEA", "W7PDX", 1);
        bad.readability = Some(9);
        let err = store.ingest(&bad).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        assert_eq!(store.len(), 1);
        assert_eq!(store.revision(), rev);
    }

    #[test]
    fn test_out_of_scope_append_refused() {
        let mut store = ReportStore::new(SessionScope::session("s1"));
        let foreign = row("a", "W7PDX", "K7SEA", 0).with_session(Some("s2"));
        assert!(matches!(store.ingest(&foreign), Err(IngestError::OutOfScope { .. })));
        let unscoped = row("b", "W7PDX", "K7SEA", 0);
        assert!(matches!(store.ingest(&unscoped), Err(IngestError::OutOfScope { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn test_replace_all_has_no_residue() {
        let mut store = ReportStore::default();
        store.ingest(&row("old", "W7PDX", "K7SEA", 0)).unwrap();

        let s1 = SessionScope::session("s1");
        let summary = store.replace_all(
            s1.clone(),
            vec![
                row("n2", "K7BOI", "W7PDX", 2).with_session(Some("s1")),
                row("n1", "W7PDX", "K7BOI", 1).with_session(Some("s1")),
                row("x", "W7PDX", "K7EUG", 1),
            ],
        );
        assert_eq!(summary, LoadSummary { loaded: 2, duplicates: 0, rejected: 1 });
        assert_eq!(store.scope(), &s1);
        assert_eq!(store.query(|r| r.id().as_str() == "old").count(), 0);
        assert_eq!(store.reported_by(&call("W7PDX")).count(), 1);
        assert_eq!(store.reports_hearing(&call("K7SEA")).count(), 0);

        // bulk input is newest-first, arrival order is oldest-first
        let ids: Vec<&str> = store.iter().map(|r| r.id().as_str()).collect();
        assert_eq!(ids, ["n1", "n2"]);
    }

    #[test]
    fn test_reseed_keeps_arrival_order() {
        let mut store = ReportStore::default();
        store.ingest(&row("late", "K7SEA", "W7PDX", 5)).unwrap();
        store.ingest(&row("early", "K7BOI", "W7PDX", 0)).unwrap();

        // same set plus one newcomer, newest first as fetched
        let fetched = vec![
            row("new", "K7EUG", "W7PDX", 9),
            row("late", "K7SEA", "W7PDX", 5),
            row("early", "K7BOI", "W7PDX", 0),
        ];
        store.replace_all(SessionScope::Unscoped, fetched.clone());
        let ids: Vec<&str> = store.iter().map(|r| r.id().as_str()).collect();
        assert_eq!(ids, ["late", "early", "new"]);

        store.replace_all(SessionScope::Unscoped, fetched);
        let again: Vec<&str> = store.iter().map(|r| r.id().as_str()).collect();
        assert_eq!(again, ["late", "early", "new"]);
    }

    #[test]
    fn test_scope_switch_orders_by_time() {
        let mut store = ReportStore::default();
        store.ingest(&row("late", "K7SEA", "W7PDX", 5)).unwrap();
        store.ingest(&row("early", "K7BOI", "W7PDX", 0)).unwrap();
        let s1 = SessionScope::session("s1");
        store.replace_all(s1.clone(), vec![
            row("late", "K7SEA", "W7PDX", 5).with_session(Some("s1")),
            row("early", "K7BOI", "W7PDX", 0).with_session(Some("s1")),
        ]);
        let ids: Vec<&str> = store.iter().map(|r| r.id().as_str()).collect();
        assert_eq!(ids, ["early", "late"]);
    }

    #[test]
    fn test_replace_all_dedupes_bulk() {
        let mut store = ReportStore::default();
        let summary = store.replace_all(
            SessionScope::Unscoped,
            vec![row("a", "W7PDX", "K7SEA", 0), row("a", "W7PDX", "K7SEA", 0)],
        );
        assert_eq!(summary.loaded, 1);
        assert_eq!(summary.duplicates, 1);
    }

    #[test]
    fn test_query_is_restartable() {
        let mut store = ReportStore::default();
        store.ingest(&row("a", "W7PDX", "K7SEA", 0)).unwrap();
        store.ingest(&row("b", "K7SEA", "W7PDX", 1)).unwrap();
        let pdx = call("W7PDX");
        let hears_pdx = |r: &SignalReport| r.heard() == &pdx;
        assert_eq!(store.query(hears_pdx).count(), 1);
        assert_eq!(store.query(hears_pdx).count(), 1);
        assert_eq!(store.query(|_| true).count(), 2);
    }

    #[test]
    fn test_unknown_callsign_index_is_empty() {
        let store = ReportStore::default();
        assert_eq!(store.reported_by(&call("N0CALL")).count(), 0);
        assert_eq!(store.reports_hearing(&call("N0CALL")).count(), 0);
    }
}
