// src/main.rs  -  simplex-map  entry point
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use simplex_map::config::{self, AppConfig, Cli};
use simplex_map::demo::{DemoEvent, DemoScript, NET_CONTROL};
use simplex_map::graph::{ColorHint, Direction, MarkerColor};
use simplex_map::report::parse_report_rows;
use simplex_map::{MemoryBackend, SessionScope, SimplexApp};
use std::collections::HashSet;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

// ── UI snapshot (passed to TUI draw) ─────────────────────────────────────────
#[derive(Default, Clone)]
pub struct StationRow {
    pub callsign:    String,
    /// None for stations known only from reports (no map position)
    pub color:       Option<MarkerColor>,
    pub selected:    bool,
    pub is_operator: bool,
}

#[derive(Clone)]
pub struct LineRow {
    pub neighbor:     String,
    pub color:        ColorHint,
    pub dashed:       bool,
    pub readability:  u8,
    pub strength:     u8,
    pub report_count: usize,
    pub distance_km:  f64,
}

#[derive(Default, Clone)]
pub struct ViewState {
    pub mycall:    String,
    pub address:   String,
    pub scope:     String,
    pub live:      bool,
    pub selection: Option<(String, Direction)>,
    pub stations:  Vec<StationRow>,
    pub cursor:    usize,
    pub lines:     Vec<LineRow>,
    pub unplaced:  Vec<String>,
    pub recent:    Vec<String>,
    pub net_log:   Vec<String>,
    pub status:    String,
    pub demo:      bool,
}

impl ViewState {
    /// Rebuild everything shown from the app's current frame.
    fn refresh(&mut self, app: &mut SimplexApp<MemoryBackend>, recent: usize) {
        let frame = app.frame().clone();

        let mut seen: HashSet<String> = HashSet::new();
        let mut stations: Vec<StationRow> = frame.markers.iter()
            .map(|m| {
                seen.insert(m.callsign.to_string());
                StationRow {
                    callsign:    m.callsign.to_string(),
                    color:       Some(m.color),
                    selected:    m.selected,
                    is_operator: m.is_operator,
                }
            })
            .collect();
        let selected = frame.selection.as_ref().map(|(c, _)| c.clone());
        for call in app.graph().stations() {
            if seen.insert(call.to_string()) {
                stations.push(StationRow {
                    selected: selected.as_ref() == Some(&call),
                    callsign: call.to_string(),
                    ..Default::default()
                });
            }
        }

        self.selection = frame.selection.as_ref().map(|(c, d)| (c.to_string(), *d));
        self.lines = frame.lines.iter()
            .map(|l| LineRow {
                neighbor:     l.neighbor(l.direction).to_string(),
                color:        l.color,
                dashed:       l.dashed,
                readability:  l.readability,
                strength:     l.strength,
                report_count: l.report_count,
                distance_km:  l.distance_km,
            })
            .collect();
        self.unplaced = frame.unplaced.iter().map(|c| c.to_string()).collect();
        self.cursor = self.cursor.min(stations.len().saturating_sub(1));
        self.stations = stations;
        self.recent = app.store().recent(recent)
            .map(|r| {
                let mut line = format!(
                    "{}  {} → {}  RS {}{}",
                    r.created_at().format("%H:%M:%S"), r.reporting(), r.heard(),
                    r.readability(), r.strength(),
                );
                if let Some(n) = r.notes() {
                    line.push_str("  ");
                    line.push_str(n);
                }
                line
            })
            .collect();
        self.scope = app.scope().to_string();
        self.live = app.is_live();
    }

    fn cursor_call(&self) -> Option<&str> {
        self.stations.get(self.cursor).map(|s| s.callsign.as_str())
    }
}

/// Backend seeded from a JSON array of `signal_reports` rows, if given.
fn load_backend(path: Option<&Path>) -> Result<MemoryBackend> {
    let backend = MemoryBackend::new();
    let Some(path) = path else { return Ok(backend) };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Reading reports {:?}", path))?;
    let (rows, skipped) = parse_report_rows(&raw)
        .with_context(|| format!("Parsing reports {:?}", path))?;
    log::info!("[main] seeding {} report rows from {} ({skipped} skipped)", rows.len(), path.display());
    Ok(backend.with_reports(rows))
}

/// Plain-text dump of both directions for every station in the store.
fn dump(app: &SimplexApp<MemoryBackend>) {
    let graph = app.graph();
    println!("{}: {} reports, {} edges", app.scope(), app.store().len(), graph.edge_count());
    for call in graph.stations() {
        println!("{call}");
        for dir in [Direction::CanHear, Direction::HeardBy] {
            let edges: Vec<String> = graph.edges(&call, dir).iter()
                .map(|e| {
                    let best = e.best();
                    format!("{} (RS {}{} x{})", e.neighbor(dir), best.readability(), best.strength(), e.report_count())
                })
                .collect();
            if !edges.is_empty() {
                println!("  {:<9} {}", dir.label(), edges.join(", "));
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    // ── --print-config  ───────────────────────────────────────────────────────
    if cli.print_config {
        print!("{}", config::DEFAULT_CONFIG_TOML);
        return Ok(());
    }

    // ── --write-config  ───────────────────────────────────────────────────────
    if cli.write_config {
        let path = AppConfig::write_default_config(&cli)?;
        println!("Config written to: {}", path.display());
        println!("Edit it to set your callsign and position.");
        return Ok(());
    }

    // ── Load config ───────────────────────────────────────────────────────────
    let cfg = AppConfig::load(&cli)?;

    // ── Backend + operator ────────────────────────────────────────────────────
    let backend = load_backend(cfg.reports.as_deref())?;
    let (operator, scope) = if cfg.demo {
        let scope = match cfg.scope() {
            SessionScope::Unscoped => SessionScope::session("demo-net"),
            s => s,
        };
        (NET_CONTROL.station()?, scope)
    } else {
        (cfg.operator_station()?, cfg.scope())
    };

    // ── App + session ─────────────────────────────────────────────────────────
    let mut app = SimplexApp::new(backend.clone(), Some(operator.clone()));
    let seeded = app.join_session(scope.clone())
        .with_context(|| format!("Joining {scope}"))?;
    log::info!(
        "[main] joined {scope}: {} reports, {} participants",
        seeded.reports.loaded, seeded.participants
    );

    if cfg.dump {
        dump(&app);
        return Ok(());
    }

    let mut demo = if cfg.demo {
        app.click(NET_CONTROL.call)?;
        Some(DemoScript::new(scope, cfg.min_delay_ms, cfg.max_delay_ms))
    } else {
        if scope != SessionScope::Unscoped {
            app.check_in(&operator).context("Checking in")?;
        }
        None
    };

    // Headless builds have nothing interactive to show outside the demo
    #[cfg(not(feature = "tui"))]
    {
        if demo.is_none() {
            dump(&app);
            return Ok(());
        }
    }

    let mut view = ViewState {
        mycall:  operator.callsign.to_string(),
        address: if cfg.demo { NET_CONTROL.place.to_string() } else { cfg.address.clone() },
        demo:    cfg.demo,
        status:  "Listening…".into(),
        ..Default::default()
    };

    // ── TUI ───────────────────────────────────────────────────────────────────
    let mut tui = tui::Tui::new()?;

    // ── Main loop ─────────────────────────────────────────────────────────────
    let tick = Duration::from_millis(cfg.tick_ms.max(1));

    'main: loop {
        // ── Single crossterm event reader ─────────────────────────────────────
        // ALL events are read here, never in any other thread.
        #[cfg(feature = "tui")]
        {
            use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
            while event::poll(Duration::from_millis(0))? {
                if let Event::Key(k) = event::read()? {
                    if k.kind == KeyEventKind::Release {
                        continue;
                    }
                    if k.code == KeyCode::Esc
                        || (k.code == KeyCode::Char('c')
                            && k.modifiers.contains(KeyModifiers::CONTROL))
                    {
                        break 'main;
                    }
                    match k.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => break 'main,
                        KeyCode::Up => {
                            view.cursor = view.cursor.saturating_sub(1);
                        }
                        KeyCode::Down => {
                            if view.cursor + 1 < view.stations.len() { view.cursor += 1; }
                        }
                        KeyCode::Enter | KeyCode::Char(' ') => {
                            if let Some(call) = view.cursor_call().map(str::to_string) {
                                if let Err(e) = app.click(&call) {
                                    view.status = e.to_string();
                                }
                            }
                        }
                        KeyCode::Char('c') | KeyCode::Char('C') => {
                            app.clear_selection();
                        }
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            view.status = match app.resync() {
                                Ok(s)  => format!("Resynced: {} reports", s.reports.loaded),
                                Err(e) => format!("Resync failed: {e}"),
                            };
                        }
                        _ => {}
                    }
                }
            }
        }

        // Drain the change feed
        let summary = app.pump();
        if summary.disconnected {
            view.status = "Live feed lost, press R to resync".into();
        } else if summary.rejected > 0 {
            view.status = format!("{} malformed rows ignored", summary.rejected);
        }

        // Demo script writes through the backend like any other client
        if let Some(script) = demo.as_mut() {
            match script.tick(Instant::now(), &backend) {
                Ok(Some(DemoEvent::Say(line))) => {
                    #[cfg(not(feature = "tui"))]
                    println!("{line}");
                    view.net_log.push(line);
                    if view.net_log.len() > 50 { view.net_log.remove(0); }
                }
                Ok(Some(DemoEvent::Complete)) => {
                    view.status = "Net closed, 73!".into();
                    #[cfg(not(feature = "tui"))]
                    {
                        app.pump();
                        dump(&app);
                        break 'main;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("[demo] {e}");
                    view.status = format!("Demo write failed: {e}");
                }
            }
        }

        // Draw TUI
        view.refresh(&mut app, cfg.recent_reports);
        tui.draw(&view)?;

        thread::sleep(tick);
    }

    // ── Cleanup ───────────────────────────────────────────────────────────────
    tui.cleanup();

    println!("\n73 de simplex-map!\n");
    Ok(())
}
