// src/sync/mod.rs  -  Backend collaborator interface + live change-feed sync
pub mod memory;

use std::sync::mpsc::{Receiver, TryRecvError};

use crate::error::{ErrorKind, IngestError, TransportError};
use crate::report::{Appended, LoadSummary, ReportRow, ReportStore, SessionScope};
use crate::station::{Participant, ParticipantRow, StationBook};

pub use memory::MemoryBackend;

// ── Collaborator interface ────────────────────────────────────────────────────

/// One pushed row change. The realtime feed only ever inserts reports;
/// participant rows are upserted (joining, moving, or `left_at` being set).
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Report(ReportRow),
    Participant(ParticipantRow),
}

/// A change event stamped with the epoch of the subscription it was sent on.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub epoch: u64,
    pub event: ChangeEvent,
}

/// Live change-feed handle. Dropping or stopping it ends delivery.
#[derive(Debug)]
pub struct Subscription {
    id:    u64,
    scope: SessionScope,
    epoch: u64,
    rx:    Receiver<Envelope>,
}

impl Subscription {
    pub fn new(id: u64, scope: SessionScope, epoch: u64, rx: Receiver<Envelope>) -> Self {
        Self { id, scope, epoch, rx }
    }

    pub fn id(&self) -> u64 { self.id }
    pub fn scope(&self) -> &SessionScope { &self.scope }
}

/// Persistence + realtime collaborator (`signal_reports`,
/// `session_participants`). Fetches are `order by created_at desc` for
/// reports and `joined_at asc` for active participants.
pub trait Backend {
    fn fetch_reports(&self, scope: &SessionScope) -> Result<Vec<ReportRow>, TransportError>;
    fn fetch_participants(&self, scope: &SessionScope) -> Result<Vec<ParticipantRow>, TransportError>;
    /// Open a change feed filtered to `scope`; every envelope carries `epoch`.
    fn subscribe(&self, scope: &SessionScope, epoch: u64) -> Result<Subscription, TransportError>;
    fn unsubscribe(&self, subscription: &Subscription);
    /// Insert a report; the backend fills `id` and `created_at` when absent.
    fn insert_report(&self, row: ReportRow) -> Result<ReportRow, TransportError>;
    /// Insert or update the participant row keyed by session + callsign.
    fn insert_participant(&self, row: ParticipantRow) -> Result<ParticipantRow, TransportError>;
}

// ── Sync outcomes ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub reports:               LoadSummary,
    pub participants:          usize,
    pub rejected_participants: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpSummary {
    pub reports:      usize,
    pub duplicates:   usize,
    pub participants: usize,
    pub rejected:     usize,
    pub stale:        usize,
    /// The feed went away; the host should `resync` once the transport is back.
    pub disconnected: bool,
}

// ── LiveSync ──────────────────────────────────────────────────────────────────

/// Keeps the report store and station book in step with the backend for one
/// session scope at a time.
#[derive(Debug, Default)]
pub struct LiveSync {
    scope:        Option<SessionScope>,
    epoch:        u64,
    subscription: Option<Subscription>,
}

impl LiveSync {
    pub fn new() -> Self { Self::default() }

    pub fn scope(&self) -> Option<&SessionScope> { self.scope.as_ref() }
    pub fn is_subscribed(&self) -> bool { self.subscription.is_some() }

    /// Switch to `scope`: tear down the old feed, empty the store, open the
    /// new feed, then seed from a bulk fetch. Events buffered on the new feed
    /// meanwhile are applied by the next `pump`, after the seed, where the
    /// store deduplicates them.
    pub fn start<B: Backend + ?Sized>(
        &mut self,
        backend:  &B,
        scope:    SessionScope,
        store:    &mut ReportStore,
        stations: &mut StationBook,
    ) -> Result<SeedSummary, TransportError> {
        self.stop(backend);
        log::info!("[sync] starting {scope}");

        // nothing from the previous scope may survive a failed fetch
        store.replace_all(scope.clone(), Vec::new());
        stations.replace_participants(&scope, Vec::new());
        self.scope = Some(scope);

        self.open(backend)?;
        self.seed(backend, store, stations)
    }

    /// Unsubscribe. Envelopes already in flight are dropped with the receiver.
    pub fn stop<B: Backend + ?Sized>(&mut self, backend: &B) {
        if let Some(sub) = self.subscription.take() {
            log::info!("[sync] stopping feed {} ({})", sub.id(), sub.scope());
            backend.unsubscribe(&sub);
        }
    }

    /// Reconnect-triggered refetch. Reopens the feed if it was lost and
    /// re-seeds the store; running it twice yields the same state.
    pub fn resync<B: Backend + ?Sized>(
        &mut self,
        backend:  &B,
        store:    &mut ReportStore,
        stations: &mut StationBook,
    ) -> Result<SeedSummary, TransportError> {
        if self.scope.is_none() {
            return Ok(SeedSummary::default());
        }
        if self.subscription.is_none() {
            self.open(backend)?;
        }
        self.seed(backend, store, stations)
    }

    /// Drain every pending envelope into the store / station book.
    pub fn pump(&mut self, store: &mut ReportStore, stations: &mut StationBook) -> PumpSummary {
        let mut summary = PumpSummary::default();
        let Some(sub) = &self.subscription else {
            return summary;
        };

        let mut lost = false;
        loop {
            let env = match sub.rx.try_recv() {
                Ok(env) => env,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => { lost = true; break; }
            };
            if env.epoch != self.epoch {
                log::debug!("[sync] dropping envelope from stale epoch {}", env.epoch);
                summary.stale += 1;
                continue;
            }
            match env.event {
                ChangeEvent::Report(row) => match store.ingest(&row) {
                    Ok(Appended::Inserted)  => summary.reports += 1,
                    Ok(Appended::Duplicate) => summary.duplicates += 1,
                    Err(e) => {
                        log_rejected("report", row.id.as_deref(), &e);
                        summary.rejected += 1;
                    }
                },
                ChangeEvent::Participant(row) => {
                    let scope = store.scope().clone();
                    match Participant::try_from_row(&row).and_then(|p| stations.apply(&scope, p)) {
                        Ok(true)  => summary.participants += 1,
                        Ok(false) => {}
                        Err(e) => {
                            log_rejected("participant", row.callsign.as_deref(), &e);
                            summary.rejected += 1;
                        }
                    }
                }
            }
        }

        if lost {
            log::warn!("[sync] change feed disconnected; waiting for resync");
            self.subscription = None;
            summary.disconnected = true;
        }
        summary
    }

    fn open<B: Backend + ?Sized>(&mut self, backend: &B) -> Result<(), TransportError> {
        let Some(scope) = &self.scope else {
            return Ok(());
        };
        self.epoch += 1;
        let sub = backend.subscribe(scope, self.epoch)?;
        log::debug!("[sync] feed {} open for {scope} at epoch {}", sub.id(), self.epoch);
        self.subscription = Some(sub);
        Ok(())
    }

    fn seed<B: Backend + ?Sized>(
        &mut self,
        backend:  &B,
        store:    &mut ReportStore,
        stations: &mut StationBook,
    ) -> Result<SeedSummary, TransportError> {
        let Some(scope) = self.scope.clone() else {
            return Ok(SeedSummary::default());
        };

        let rows = backend.fetch_reports(&scope)?;
        let people = backend.fetch_participants(&scope)?;

        let reports = store.replace_all(scope.clone(), rows);
        let mut valid = Vec::with_capacity(people.len());
        let mut rejected_participants = 0;
        for row in &people {
            match Participant::try_from_row(row) {
                Ok(p) => valid.push(p),
                Err(e) => {
                    log_rejected("participant", row.callsign.as_deref(), &e);
                    rejected_participants += 1;
                }
            }
        }
        let participants = valid.len();
        stations.replace_participants(&scope, valid);

        log::info!(
            "[sync] seeded {scope}: {} reports ({} rejected), {participants} participants",
            reports.loaded, reports.rejected,
        );
        Ok(SeedSummary { reports, participants, rejected_participants })
    }
}

fn log_rejected(what: &str, key: Option<&str>, e: &IngestError) {
    match e.kind() {
        ErrorKind::Validation => log::warn!("[sync] malformed {what} {key:?} skipped: {e}"),
        ErrorKind::StateInvariantViolation => log::warn!("[sync] {what} {key:?} refused: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::SignalReport;
    use std::sync::mpsc;

    fn row(id: &str, from: &str, to: &str, session: Option<&str>) -> ReportRow {
        ReportRow::draft(from, to, 4, 5)
            .with_id(id)
            .with_created_at("2024-05-01T18:00:00Z".parse().unwrap())
            .with_session(session)
    }

    #[test]
    fn test_seed_then_pump_dedupes_race() {
        let backend = MemoryBackend::new();
        backend.insert_report(row("a", "W7PDX", "K7SEA", Some("s1"))).unwrap();

        let mut store = ReportStore::default();
        let mut book = StationBook::default();
        let mut sync = LiveSync::new();
        let seeded = sync.start(&backend, SessionScope::session("s1"), &mut store, &mut book).unwrap();
        assert_eq!(seeded.reports.loaded, 1);

        // the transport redelivers a row the bulk fetch already returned
        backend.redeliver(ChangeEvent::Report(row("a", "W7PDX", "K7SEA", Some("s1"))));
        backend.insert_report(row("b", "K7SEA", "W7PDX", Some("s1"))).unwrap();

        let pumped = sync.pump(&mut store, &mut book);
        assert_eq!(pumped.reports, 1);
        assert_eq!(pumped.duplicates, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_stale_epoch_discarded() {
        let (tx, rx) = mpsc::channel();
        let mut sync = LiveSync {
            scope:        Some(SessionScope::Unscoped),
            epoch:        2,
            subscription: Some(Subscription::new(7, SessionScope::Unscoped, 2, rx)),
        };
        tx.send(Envelope { epoch: 1, event: ChangeEvent::Report(row("a", "W7PDX", "K7SEA", None)) }).unwrap();
        tx.send(Envelope { epoch: 2, event: ChangeEvent::Report(row("b", "K7SEA", "W7PDX", None)) }).unwrap();

        let mut store = ReportStore::default();
        let mut book = StationBook::default();
        let pumped = sync.pump(&mut store, &mut book);
        assert_eq!(pumped.stale, 1);
        assert_eq!(pumped.reports, 1);
        assert_eq!(store.iter().map(SignalReport::id).map(|i| i.as_str()).collect::<Vec<_>>(), ["b"]);
    }

    #[test]
    fn test_malformed_event_skipped_stream_continues() {
        let backend = MemoryBackend::new();
        let mut store = ReportStore::default();
        let mut book = StationBook::default();
        let mut sync = LiveSync::new();
        sync.start(&backend, SessionScope::Unscoped, &mut store, &mut book).unwrap();

        let mut bad = row("x", "W7PDX", "K7SEA", None);
        bad.readability = Some(9);
        backend.redeliver(ChangeEvent::Report(bad));
        backend.insert_report(row("ok", "W7PDX", "K7SEA", None)).unwrap();

        let pumped = sync.pump(&mut store, &mut book);
        assert_eq!(pumped.rejected, 1);
        assert_eq!(pumped.reports, 1);
    }

    #[test]
    fn test_session_change_tears_down_old_feed() {
        let backend = MemoryBackend::new();
        let mut store = ReportStore::default();
        let mut book = StationBook::default();
        let mut sync = LiveSync::new();

        sync.start(&backend, SessionScope::session("s1"), &mut store, &mut book).unwrap();
        backend.insert_report(row("a", "W7PDX", "K7SEA", Some("s1"))).unwrap();
        sync.start(&backend, SessionScope::session("s2"), &mut store, &mut book).unwrap();
        assert_eq!(backend.subscriber_count(), 1);

        backend.insert_report(row("b", "W7PDX", "K7SEA", Some("s1"))).unwrap();
        let pumped = sync.pump(&mut store, &mut book);
        assert_eq!(pumped, PumpSummary::default());
        assert!(store.is_empty());
        assert_eq!(store.scope(), &SessionScope::session("s2"));
    }

    #[test]
    fn test_disconnect_then_resync() {
        let backend = MemoryBackend::new();
        let mut store = ReportStore::default();
        let mut book = StationBook::default();
        let mut sync = LiveSync::new();
        sync.start(&backend, SessionScope::Unscoped, &mut store, &mut book).unwrap();

        backend.disconnect_all();
        backend.insert_report(row("missed", "W7PDX", "K7SEA", None)).unwrap();
        let pumped = sync.pump(&mut store, &mut book);
        assert!(pumped.disconnected);
        assert!(!sync.is_subscribed());

        let seeded = sync.resync(&backend, &mut store, &mut book).unwrap();
        assert_eq!(seeded.reports.loaded, 1);
        let again = sync.resync(&backend, &mut store, &mut book).unwrap();
        assert_eq!(again, seeded);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_fetch_failure_surfaces_and_clears_old_scope() {
        let backend = MemoryBackend::new();
        let mut store = ReportStore::default();
        let mut book = StationBook::default();
        let mut sync = LiveSync::new();
        backend.insert_report(row("a", "W7PDX", "K7SEA", None)).unwrap();
        sync.start(&backend, SessionScope::Unscoped, &mut store, &mut book).unwrap();
        assert_eq!(store.len(), 1);

        backend.fail_fetches(true);
        let err = sync.start(&backend, SessionScope::session("s1"), &mut store, &mut book).unwrap_err();
        assert!(matches!(err, TransportError::Fetch(_)));
        assert!(store.is_empty());
    }
}
