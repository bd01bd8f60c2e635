// src/selection/mod.rs  -  Selection state machine + frame ownership
pub mod state;

pub use state::{Selection, SelectionController, SelectionEvent, DEFAULT_DIRECTION};
