// src/graph/render.rs  -  Declarative marker/line list for the map collaborator
//
// The frame is rebuilt from scratch on every recompute and handed over
// whole. Nothing here is patched in place, so a redraw can never leave a
// line from the previous selection behind.
use crate::report::SignalQuality;
use crate::station::{Callsign, Coordinates, StationBook};
use super::{Direction, PropagationGraph};

pub const Z_SELECTED: u32 = 1000;
pub const Z_DEFAULT:  u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerColor { Red, Green }

/// Line colour by best copy on the edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorHint { Green, Yellow, Orange }

impl From<SignalQuality> for ColorHint {
    fn from(q: SignalQuality) -> Self {
        match q {
            SignalQuality::Strong => ColorHint::Green,
            SignalQuality::Fair   => ColorHint::Yellow,
            SignalQuality::Weak   => ColorHint::Orange,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub callsign:    Callsign,
    pub position:    Coordinates,
    pub color:       MarkerColor,
    pub z_index:     u32,
    pub selected:    bool,
    pub is_operator: bool,
}

/// One edge `from -> to` ("from can hear to") of the active selection.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeLine {
    pub from:         Callsign,
    pub to:           Callsign,
    pub from_coord:   Coordinates,
    pub to_coord:     Coordinates,
    pub direction:    Direction,
    pub color:        ColorHint,
    /// HeardBy lines are dashed, CanHear lines solid
    pub dashed:       bool,
    pub report_count: usize,
    /// Best RS copy on this edge
    pub readability:  u8,
    pub strength:     u8,
    pub distance_km:  f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderFrame {
    pub selection: Option<(Callsign, Direction)>,
    pub markers:   Vec<Marker>,
    pub lines:     Vec<EdgeLine>,
    /// Neighbours with reports but no known position (no line drawn)
    pub unplaced:  Vec<Callsign>,
}

impl RenderFrame {
    pub fn line_to(&self, neighbor: &str) -> Option<&EdgeLine> {
        let (_, dir) = self.selection.as_ref()?;
        self.lines.iter().find(|l| l.neighbor(*dir).as_str() == neighbor)
    }
}

impl EdgeLine {
    pub fn neighbor(&self, direction: Direction) -> &Callsign {
        match direction {
            Direction::CanHear => &self.to,
            Direction::HeardBy => &self.from,
        }
    }
}

/// Pure function from (selection, graph, station positions) to a frame.
pub fn build_frame(
    selection: Option<(&Callsign, Direction)>,
    graph:     &PropagationGraph<'_>,
    stations:  &StationBook,
) -> RenderFrame {
    let operator = stations.operator().map(|s| &s.callsign);

    let markers = stations.stations().into_iter()
        .map(|s| {
            let selected = selection.map_or(false, |(c, _)| *c == s.callsign);
            let color = match selection {
                Some((_, Direction::HeardBy)) if selected => MarkerColor::Green,
                _ => MarkerColor::Red,
            };
            Marker {
                callsign:    s.callsign.clone(),
                position:    s.coordinates,
                color,
                z_index:     if selected { Z_SELECTED } else { Z_DEFAULT },
                selected,
                is_operator: operator == Some(&s.callsign),
            }
        })
        .collect();

    let mut lines = Vec::new();
    let mut unplaced = Vec::new();
    if let Some((call, direction)) = selection {
        for edge in graph.edges(call, direction) {
            let (Some(from_coord), Some(to_coord)) =
                (stations.coordinates(edge.from), stations.coordinates(edge.to))
            else {
                unplaced.push(edge.neighbor(direction).clone());
                continue;
            };
            let best = edge.best();
            lines.push(EdgeLine {
                from:         edge.from.clone(),
                to:           edge.to.clone(),
                from_coord,
                to_coord,
                direction,
                color:        edge.quality().into(),
                dashed:       direction == Direction::HeardBy,
                report_count: edge.report_count(),
                readability:  best.readability(),
                strength:     best.strength(),
                distance_km:  from_coord.distance_km(&to_coord),
            });
        }
    }

    RenderFrame {
        selection: selection.map(|(c, d)| (c.clone(), d)),
        markers,
        lines,
        unplaced,
    }
}
