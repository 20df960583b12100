//! Domain types: bars, events, regimes.

pub mod bar;
pub mod event;
pub mod regime;

pub use bar::{normalize, Bar, BarError, RawBar};
pub use event::{Event, EventLabel, UnknownLabel};
pub use regime::Regime;

/// Symbol type alias
pub type Symbol = String;
