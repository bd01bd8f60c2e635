// src/tui/inner.rs  -  ratatui layout
use anyhow::Result;
use crossterm::{execute, terminal::{self, EnterAlternateScreen, LeaveAlternateScreen}};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction as Axis, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Terminal,
};
use simplex_map::graph::{ColorHint, MarkerColor};
use crate::{StationRow, ViewState};
use std::io::stdout;

pub struct Tui {
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
}

fn hint_color(hint: ColorHint) -> Color {
    match hint {
        ColorHint::Green  => Color::Green,
        ColorHint::Yellow => Color::Yellow,
        ColorHint::Orange => Color::Rgb(255, 140, 0),
    }
}

fn station_line(row: &StationRow, under_cursor: bool) -> Line<'static> {
    let color = match row.color {
        Some(MarkerColor::Red)   => Color::Red,
        Some(MarkerColor::Green) => Color::Green,
        None                     => Color::DarkGray,
    };
    let mut style = Style::default().fg(color);
    if row.selected     { style = style.add_modifier(Modifier::BOLD); }
    if under_cursor     { style = style.add_modifier(Modifier::REVERSED); }

    let mut text = format!("{} {}", if row.selected { "●" } else { "○" }, row.callsign);
    if row.is_operator    { text.push_str("  (you)"); }
    if row.color.is_none() { text.push_str("  no position"); }
    Line::from(Span::styled(text, style))
}

impl Tui {
    pub fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        let mut out = stdout();
        execute!(out, EnterAlternateScreen)?;
        let backend  = CrosstermBackend::new(out);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }

    pub fn cleanup(&mut self) {
        let _ = terminal::disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
    }

    pub fn draw(&mut self, s: &ViewState) -> Result<()> {
        self.terminal.draw(|f| {
            let area = f.area();
            let chunks = Layout::default()
                .direction(Axis::Vertical)
                .constraints([
                    Constraint::Length(3),                               // header
                    Constraint::Min(6),                                  // stations | edges
                    Constraint::Length(s.recent.len().max(1) as u16 + 2), // recent reports
                    Constraint::Length(if s.demo { 6 } else { 0 }),      // net log
                    Constraint::Length(3),                               // footer hints
                ])
                .split(area);

            // ── Header ────────────────────────────────────────────────────
            let selection = match &s.selection {
                Some((call, dir)) => format!("{call} {}", dir.label()),
                None              => "nothing selected".into(),
            };
            let header = Paragraph::new(format!(
                " Simplex Map  |  {} ({})  |  {}  |  {}  |  {}",
                s.mycall, s.address, s.scope, selection,
                if s.live { "live" } else { "offline" },
            ))
            .style(Style::default().fg(Color::Black).bg(Color::Cyan)
                   .add_modifier(Modifier::BOLD));
            f.render_widget(header, chunks[0]);

            let middle = Layout::default()
                .direction(Axis::Horizontal)
                .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
                .split(chunks[1]);

            // ── Stations ──────────────────────────────────────────────────
            let rows: Vec<Line> = s.stations.iter().enumerate()
                .map(|(i, row)| station_line(row, i == s.cursor))
                .collect();
            let stations = Paragraph::new(rows)
                .block(Block::default()
                    .title(format!(" STATIONS ({}) ", s.stations.len()))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red)));
            f.render_widget(stations, middle[0]);

            // ── Edges of the selection ────────────────────────────────────
            let mut edges: Vec<Line> = s.lines.iter()
                .map(|l| Line::from(vec![
                    Span::styled(
                        if l.dashed { "╌╌ " } else { "── " },
                        Style::default().fg(hint_color(l.color)),
                    ),
                    Span::styled(format!("{:<10}", l.neighbor), Style::default().fg(Color::White)
                        .add_modifier(Modifier::BOLD)),
                    Span::styled(
                        format!(" RS {}{}  x{}  {:>6.0} km", l.readability, l.strength, l.report_count, l.distance_km),
                        Style::default().fg(hint_color(l.color)),
                    ),
                ]))
                .collect();
            edges.extend(s.unplaced.iter().map(|c| Line::from(Span::styled(
                format!("   {c:<10} no position"),
                Style::default().fg(Color::DarkGray),
            ))));
            let edge_title = match &s.selection {
                Some((call, dir)) => format!(" {call} {} ({}) ", dir.label(), s.lines.len() + s.unplaced.len()),
                None              => " EDGES ".into(),
            };
            let edge_block = Paragraph::new(edges)
                .block(Block::default()
                    .title(edge_title)
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Yellow)));
            f.render_widget(edge_block, middle[1]);

            // ── Recent reports ────────────────────────────────────────────
            let recent: Vec<Line> = s.recent.iter()
                .map(|r| Line::from(Span::styled(r.clone(), Style::default().fg(Color::Gray))))
                .collect();
            let recent_block = Paragraph::new(recent)
                .block(Block::default()
                    .title(" RECENT REPORTS ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Blue)));
            f.render_widget(recent_block, chunks[2]);

            // ── Demo net log ──────────────────────────────────────────────
            if s.demo {
                let log_lines: Vec<Line> = s.net_log.iter().rev().take(4).rev()
                    .map(|l| Line::from(Span::styled(l.clone(), Style::default().fg(Color::Green))))
                    .collect();
                let log_block = Paragraph::new(log_lines)
                    .block(Block::default()
                        .title(" NET ")
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(Color::Green)))
                    .wrap(Wrap { trim: true });
                f.render_widget(log_block, chunks[3]);
            }

            // ── Footer ────────────────────────────────────────────────────
            let footer_text = format!(
                " ↑↓ = move   Enter/Space = select (again = flip)   C = clear   R = resync   Q/Esc = quit   {}",
                s.status
            );
            let footer = Paragraph::new(footer_text)
                .style(Style::default().fg(Color::DarkGray).bg(Color::Black));
            f.render_widget(footer, chunks[4]);
        })?;
        Ok(())
    }
}
