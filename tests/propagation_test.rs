// tests/propagation_test.rs  -  End-to-end behaviour through the public API
use chrono::{Duration, TimeZone, Utc};
use simplex_map::graph::{Direction, PropagationGraph};
use simplex_map::report::{ReportRow, ReportStore, SessionScope};
use simplex_map::station::{Callsign, Coordinates, ParticipantRow, Station};
use simplex_map::sync::Backend;
use simplex_map::{IngestError, MemoryBackend, Selection, SimplexApp};

fn row(id: &str, from: &str, to: &str, r: i64, s: i64, minute: i64) -> ReportRow {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap() + Duration::minutes(minute);
    ReportRow::draft(from, to, r, s).with_id(id).with_created_at(at)
}

fn names(v: Vec<Callsign>) -> Vec<String> {
    v.into_iter().map(String::from).collect()
}

fn sorted(mut v: Vec<String>) -> Vec<String> {
    v.sort();
    v
}

fn net() -> Vec<ReportRow> {
    vec![
        row("r1", "W7PDX", "K7SEA", 4, 5, 0),
        row("r2", "K7SEA", "W7PDX", 4, 5, 1),
        row("r3", "K7BOI", "W7PDX", 2, 3, 2),
        row("r4", "W7PDX", "K7EUG", 5, 9, 3),
        row("r5", "K7EUG", "W7PDX", 5, 9, 4),
        row("r6", "K7SEA", "K7EUG", 4, 5, 5),
    ]
}

fn station(call: &str, lat: f64, lng: f64) -> Station {
    Station::new(Callsign::parse(call).unwrap(), Coordinates::new(lat, lng).unwrap())
}

fn check_in(backend: &MemoryBackend, session: &str, call: &str, lat: f64, lng: f64) {
    backend.insert_participant(ParticipantRow {
        session_id: Some(session.into()),
        callsign:   Some(call.into()),
        latitude:   Some(lat),
        longitude:  Some(lng),
        ..Default::default()
    }).unwrap();
}

#[test]
fn test_append_order_does_not_change_query_sets() {
    let forward = {
        let mut s = ReportStore::default();
        for r in net() { s.ingest(&r).unwrap(); }
        s
    };
    let backward = {
        let mut s = ReportStore::default();
        for r in net().iter().rev() { s.ingest(r).unwrap(); }
        s
    };
    let (f, b) = (PropagationGraph::new(&forward), PropagationGraph::new(&backward));
    for call in ["W7PDX", "K7SEA", "K7BOI", "K7EUG", "K7XXX"] {
        assert_eq!(sorted(names(f.stations_who_can_hear(call))), sorted(names(b.stations_who_can_hear(call))));
        assert_eq!(sorted(names(f.stations_heard_by(call))), sorted(names(b.stations_heard_by(call))));
    }
    assert_eq!(sorted(names(f.stations_who_can_hear("W7PDX"))), ["K7BOI", "K7EUG", "K7SEA"]);
}

#[test]
fn test_duplicate_delivery_is_idempotent() {
    let mut once = ReportStore::default();
    let mut twice = ReportStore::default();
    for r in net() {
        once.ingest(&r).unwrap();
        twice.ingest(&r).unwrap();
        twice.ingest(&r).unwrap();
    }
    assert_eq!(once.len(), twice.len());
    let (a, b) = (PropagationGraph::new(&once), PropagationGraph::new(&twice));
    assert_eq!(names(a.stations_who_can_hear("W7PDX")), names(b.stations_who_can_hear("W7PDX")));
    assert_eq!(a.edges(&Callsign::parse("W7PDX").unwrap(), Direction::HeardBy)[0].report_count(), 1);
    assert_eq!(b.edges(&Callsign::parse("W7PDX").unwrap(), Direction::HeardBy)[0].report_count(), 1);
}

#[test]
fn test_replace_all_leaves_no_residue() {
    let mut store = ReportStore::default();
    store.replace_all(SessionScope::Unscoped, net().into_iter().rev());
    assert!(!PropagationGraph::new(&store).stations_heard_by("K7SEA").is_empty());

    let fresh = vec![row("n1", "K7BOI", "K7EUG", 3, 4, 10)];
    let summary = store.replace_all(SessionScope::Unscoped, fresh);
    assert_eq!(summary.loaded, 1);

    let g = PropagationGraph::new(&store);
    assert!(g.stations_heard_by("K7SEA").is_empty());
    assert!(g.stations_who_can_hear("W7PDX").is_empty());
    assert_eq!(names(g.stations_heard_by("K7BOI")), ["K7EUG"]);
    assert_eq!(names(g.stations()), ["K7BOI", "K7EUG"]);
}

#[test]
fn test_queries_are_duals() {
    let mut store = ReportStore::default();
    for r in net() { store.ingest(&r).unwrap(); }
    let g = PropagationGraph::new(&store);
    let calls = names(g.stations());
    for a in &calls {
        for b in &calls {
            let a_hears_b = names(g.stations_heard_by(a)).contains(b);
            let b_heard_by_a = names(g.stations_who_can_hear(b)).contains(a);
            assert_eq!(a_hears_b, b_heard_by_a, "{a} -> {b}");
        }
    }
}

#[test]
fn test_sessions_are_isolated() {
    let backend = MemoryBackend::new().with_reports([
        row("s1-a", "W7PDX", "K7SEA", 4, 5, 0).with_session(Some("s1")),
        row("none-a", "K7BOI", "W7PDX", 2, 3, 1),
    ]);
    let mut app = SimplexApp::new(backend.clone(), None);

    app.join_session(SessionScope::session("s2")).unwrap();
    backend.insert_report(ReportRow::draft("K7EUG", "W7PDX", 5, 9).with_session(Some("s1"))).unwrap();
    app.pump();
    assert!(app.store().is_empty());
    assert!(app.graph().stations_heard_by("W7PDX").is_empty());

    app.leave_session().unwrap();
    assert_eq!(names(app.graph().stations_who_can_hear("W7PDX")), ["K7BOI"]);

    assert_eq!(app.scope(), &SessionScope::Unscoped);

    // a foreign row handed straight to the store is refused, not stored
    let mut store = ReportStore::new(SessionScope::session("s2"));
    let refused = store.ingest(&row("x", "W7PDX", "K7SEA", 4, 5, 0).with_session(Some("s1")));
    assert!(matches!(refused, Err(IngestError::OutOfScope { .. })));
    assert!(store.is_empty());
}

#[test]
fn test_two_station_scenario() {
    let mut store = ReportStore::default();
    store.ingest(&row("a", "W7PDX", "K7SEA", 4, 5, 0)).unwrap();
    store.ingest(&row("b", "K7SEA", "W7PDX", 4, 5, 1)).unwrap();
    let g = PropagationGraph::new(&store);
    assert_eq!(names(g.stations_heard_by("W7PDX")), ["K7SEA"]);
    assert_eq!(names(g.stations_who_can_hear("W7PDX")), ["K7SEA"]);
}

#[test]
fn test_reclick_flips_direction_without_stale_lines() {
    let backend = MemoryBackend::new();
    let mut app = SimplexApp::new(backend.clone(), Some(station("W7PDX", 45.5155, -122.6789)));
    app.join_session(SessionScope::session("net")).unwrap();
    check_in(&backend, "net", "K7SEA", 47.6062, -122.3321);
    check_in(&backend, "net", "K7BOI", 43.615, -116.2023);
    backend.insert_report(ReportRow::draft("W7PDX", "K7SEA", 4, 5).with_session(Some("net"))).unwrap();
    backend.insert_report(ReportRow::draft("K7BOI", "W7PDX", 2, 3).with_session(Some("net"))).unwrap();
    app.pump();

    let frame = app.click("W7PDX").unwrap();
    assert_eq!(frame.lines.len(), 1);
    assert_eq!(frame.lines[0].to.as_str(), "K7SEA");
    assert!(!frame.lines[0].dashed);

    let frame = app.click("w7pdx").unwrap().clone();
    assert_eq!(app.selection().direction(), Some(Direction::HeardBy));
    assert_eq!(frame.lines.len(), 1);
    assert_eq!(frame.lines[0].from.as_str(), "K7BOI");
    assert_eq!(frame.lines[0].to.as_str(), "W7PDX");
    assert!(frame.lines[0].dashed);
    assert!(frame.line_to("K7SEA").is_none());

    // a report arriving while selected shows up on the next frame
    backend.insert_report(ReportRow::draft("K7SEA", "W7PDX", 4, 5).with_session(Some("net"))).unwrap();
    app.pump();
    let frame = app.frame();
    assert_eq!(frame.lines.len(), 2);
    assert!(frame.lines.iter().all(|l| l.to.as_str() == "W7PDX"));

    app.clear_selection();
    assert_eq!(app.selection(), &Selection::Idle);
    assert!(app.frame().lines.is_empty());
}

#[test]
fn test_out_of_range_readability_is_rejected() {
    let mut store = ReportStore::default();
    store.ingest(&row("ok", "W7PDX", "K7SEA", 4, 5, 0)).unwrap();
    let before = store.revision();

    let err = store.ingest(&row("bad", "K7BOI", "W7PDX", 9, 5, 1)).unwrap_err();
    assert!(matches!(err, IngestError::OutOfRange { field: "readability", value: 9, .. }));
    assert_eq!(store.revision(), before);
    assert_eq!(store.len(), 1);

    let g = PropagationGraph::new(&store);
    assert!(g.stations_who_can_hear("W7PDX").is_empty());
    assert_eq!(names(g.stations_heard_by("W7PDX")), ["K7SEA"]);
}

#[test]
fn test_malformed_feed_rows_do_not_stop_the_stream() {
    let backend = MemoryBackend::new();
    let mut app = SimplexApp::new(backend.clone(), None);
    app.join_session(SessionScope::Unscoped).unwrap();

    backend.insert_report(ReportRow::draft("W7PDX", "K7SEA", 9, 5)).unwrap();
    backend.insert_report(ReportRow::draft("W7PDX", "W7PDX", 5, 5)).unwrap();
    backend.insert_report(ReportRow::draft("W7PDX", "K7SEA", 5, 5)).unwrap();
    let summary = app.pump();
    assert_eq!(summary.rejected, 2);
    assert_eq!(summary.reports, 1);
    assert_eq!(names(app.graph().stations_heard_by("W7PDX")), ["K7SEA"]);
}

#[test]
fn test_reports_json_rows_deserialize() {
    let raw = r#"[
        {"id": "1", "reporting_callsign": "W7PDX", "heard_callsign": "K7SEA",
         "readability": 4, "strength": 5, "notes": null,
         "created_at": "2024-05-01T18:00:00+00:00", "session_id": null}
    ]"#;
    let rows: Vec<ReportRow> = serde_json::from_str(raw).unwrap();
    let mut store = ReportStore::default();
    let summary = store.replace_all(SessionScope::Unscoped, rows);
    assert_eq!(summary.loaded, 1);
    assert_eq!(store.recent(5).next().unwrap().heard().as_str(), "K7SEA");
}

#[test]
fn test_resync_keeps_first_seen_order() {
    let backend = MemoryBackend::new();
    let mut app = SimplexApp::new(backend.clone(), None);
    app.join_session(SessionScope::Unscoped).unwrap();

    // arrives first but was filed later
    backend.insert_report(row("late", "K7SEA", "W7PDX", 4, 5, 5)).unwrap();
    backend.insert_report(row("early", "K7BOI", "W7PDX", 2, 3, 0)).unwrap();
    app.pump();
    let before = names(app.graph().stations_who_can_hear("W7PDX"));
    assert_eq!(before, ["K7SEA", "K7BOI"]);

    app.resync().unwrap();
    assert_eq!(names(app.graph().stations_who_can_hear("W7PDX")), before);
    app.resync().unwrap();
    assert_eq!(names(app.graph().stations_who_can_hear("W7PDX")), before);
}
