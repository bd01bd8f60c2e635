// src/report/mod.rs  -  Signal report model + session-scoped store
pub mod model;
pub mod store;

pub use model::{parse_report_rows, parse_timestamp, ReportId, ReportRow, SessionScope, SignalQuality, SignalReport};
pub use store::{Appended, LoadSummary, ReportStore};
