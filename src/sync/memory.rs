// src/sync/memory.rs  -  In-process backend: tables + realtime fan-out
//
// Stands in for the hosted database in the binary and in tests. Inserts are
// pushed to every subscriber whose scope matches the row, the same filter a
// `session_id=eq.<id>` realtime channel applies.
use chrono::{DateTime, Utc};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::TransportError;
use crate::report::{parse_timestamp, ReportRow, SessionScope};
use crate::station::ParticipantRow;
use super::{Backend, ChangeEvent, Envelope, Subscription};

struct Subscriber {
    id:    u64,
    scope: SessionScope,
    epoch: u64,
    tx:    Sender<Envelope>,
}

#[derive(Default)]
struct Tables {
    reports:      Vec<ReportRow>,
    participants: Vec<ParticipantRow>,
    subscribers:  Vec<Subscriber>,
    next_row:     u64,
    next_sub:     u64,
    fail_fetches: bool,
}

impl Tables {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_row += 1;
        format!("{prefix}-{}", self.next_row)
    }

    /// Push to every matching subscriber, forgetting the ones that hung up.
    fn broadcast(&mut self, session_id: Option<&str>, event: ChangeEvent) {
        self.subscribers.retain(|s| {
            if !s.scope.contains(session_id) {
                return true;
            }
            s.tx.send(Envelope { epoch: s.epoch, event: event.clone() }).is_ok()
        });
    }
}

/// Cheap to clone; every clone shares the same tables.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryBackend {
    pub fn new() -> Self { Self::default() }

    /// Seed `signal_reports` directly, without notifying subscribers.
    pub fn with_reports<I: IntoIterator<Item = ReportRow>>(self, rows: I) -> Self {
        self.lock().reports.extend(rows);
        self
    }

    /// Mark a participant as gone (`left_at = now`) and notify.
    pub fn leave(&self, session_id: Option<&str>, callsign: &str) -> Result<(), TransportError> {
        let mut t = self.lock();
        let now = Utc::now().to_rfc3339();
        let row = t.participants.iter_mut()
            .find(|p| p.session_id.as_deref() == session_id && same_call(p.callsign.as_deref(), callsign))
            .ok_or_else(|| TransportError::Insert(format!("{callsign} is not in the session")))?;
        row.left_at = Some(now);
        let row = row.clone();
        t.broadcast(session_id, ChangeEvent::Participant(row));
        Ok(())
    }

    /// Push an event to subscribers without touching the tables, as a
    /// realtime transport does when it redelivers after a hiccup.
    pub fn redeliver(&self, event: ChangeEvent) {
        let session = match &event {
            ChangeEvent::Report(r)      => r.session_id.clone(),
            ChangeEvent::Participant(p) => p.session_id.clone(),
        };
        self.lock().broadcast(session.as_deref(), event);
    }

    /// Drop every live feed, as a lost connection would.
    pub fn disconnect_all(&self) {
        self.lock().subscribers.clear();
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.lock().fail_fetches = fail;
    }

    pub fn subscriber_count(&self) -> usize { self.lock().subscribers.len() }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for MemoryBackend {
    fn fetch_reports(&self, scope: &SessionScope) -> Result<Vec<ReportRow>, TransportError> {
        let t = self.lock();
        if t.fail_fetches {
            return Err(TransportError::Fetch("signal_reports unavailable".into()));
        }
        let mut rows: Vec<ReportRow> = t.reports.iter()
            .rev()
            .filter(|r| scope.contains(r.session_id.as_deref()))
            .cloned()
            .collect();
        // newest first; unparsable timestamps sink to the end
        rows.sort_by_key(|r| std::cmp::Reverse(created(r)));
        Ok(rows)
    }

    fn fetch_participants(&self, scope: &SessionScope) -> Result<Vec<ParticipantRow>, TransportError> {
        let t = self.lock();
        if t.fail_fetches {
            return Err(TransportError::Fetch("session_participants unavailable".into()));
        }
        Ok(t.participants.iter()
            .filter(|p| scope.contains(p.session_id.as_deref()) && p.left_at.is_none())
            .cloned()
            .collect())
    }

    fn subscribe(&self, scope: &SessionScope, epoch: u64) -> Result<Subscription, TransportError> {
        let mut t = self.lock();
        t.next_sub += 1;
        let id = t.next_sub;
        let (tx, rx) = mpsc::channel();
        t.subscribers.push(Subscriber { id, scope: scope.clone(), epoch, tx });
        Ok(Subscription::new(id, scope.clone(), epoch, rx))
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        self.lock().subscribers.retain(|s| s.id != subscription.id());
    }

    fn insert_report(&self, mut row: ReportRow) -> Result<ReportRow, TransportError> {
        let mut t = self.lock();
        if row.id.is_none() {
            row.id = Some(t.next_id("report"));
        }
        if row.created_at.is_none() {
            row.created_at = Some(Utc::now().to_rfc3339());
        }
        t.reports.push(row.clone());
        let session = row.session_id.clone();
        t.broadcast(session.as_deref(), ChangeEvent::Report(row.clone()));
        Ok(row)
    }

    fn insert_participant(&self, mut row: ParticipantRow) -> Result<ParticipantRow, TransportError> {
        let callsign = row.callsign.clone()
            .ok_or_else(|| TransportError::Insert("participant without callsign".into()))?;
        let mut t = self.lock();
        let existing = t.participants.iter()
            .position(|p| p.session_id == row.session_id && same_call(p.callsign.as_deref(), &callsign));
        match existing {
            Some(i) => {
                let old = &mut t.participants[i];
                row.id = old.id.clone();
                row.joined_at = old.joined_at.clone();
                *old = row.clone();
            }
            None => {
                if row.id.is_none() {
                    row.id = Some(t.next_id("participant"));
                }
                if row.joined_at.is_none() {
                    row.joined_at = Some(Utc::now().to_rfc3339());
                }
                t.participants.push(row.clone());
            }
        }
        let session = row.session_id.clone();
        t.broadcast(session.as_deref(), ChangeEvent::Participant(row.clone()));
        Ok(row)
    }
}

fn created(row: &ReportRow) -> Option<DateTime<Utc>> {
    row.created_at.as_deref().and_then(|s| parse_timestamp(s).ok())
}

fn same_call(stored: Option<&str>, callsign: &str) -> bool {
    stored.map_or(false, |s| s.trim().eq_ignore_ascii_case(callsign.trim()))
}
