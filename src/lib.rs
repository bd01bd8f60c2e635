// src/lib.rs  -  simplex-map library: report store, propagation graph, live sync
//
// The binary in `main.rs` is a thin terminal front-end over this crate.
// Everything that decides what the map shows lives here and is testable
// without a terminal.
pub mod app;
pub mod config;
pub mod demo;
pub mod error;
pub mod graph;
pub mod report;
pub mod selection;
pub mod station;
pub mod sync;

pub use app::SimplexApp;
pub use error::{ErrorKind, IngestError, SubmitError, TransportError};
pub use graph::{Direction, PropagationGraph, RenderFrame};
pub use report::{ReportRow, ReportStore, SessionScope, SignalReport};
pub use selection::{Selection, SelectionEvent};
pub use station::{Callsign, Coordinates, Station, StationBook};
pub use sync::{Backend, LiveSync, MemoryBackend};
