//! Hardware-independent core library for the weather station
//!
//! This crate contains the platform-agnostic logic of the station: the
//! reading source that turns sensor callbacks into a broadcast stream, the
//! replaying selection/unit state cells, the fusion pipeline that combines
//! them into display strings, and the lifecycle that wires the hardware
//! ports together.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).
//!
//! ```text
//!  sensor callbacks ──► ReadingSource ──┐
//!                                       ├─► stage A (kind == selection)
//!  selection button ──► SelectionState ─┘          │
//!                                                  ├─► stage B (convert + format) ──► RenderSink
//!  unit button ───────► UnitState ─────────────────┘
//! ```

#![no_std]

extern crate alloc;

pub mod buttons;
pub mod config;
pub mod display;
pub mod format;
pub mod fusion;
pub mod hal;
pub mod reading;
pub mod source;
pub mod state;
pub mod station;

pub use buttons::{Button, ButtonInputs, KeyCode};
pub use config::{ConfigError, StationConfig};
pub use display::DisplayPanel;
pub use format::{DisplayString, convert, display_string};
pub use fusion::{Fusion, FusionPipeline};
pub use hal::{AlphanumericDisplay, ButtonDriver, RenderSink, SensorDriver};
pub use reading::{Reading, ReadingKind, SensorEvent, SensorInfo, SensorTypeId};
pub use source::{ReadingSource, ReadingSubscriber, SourceError};
pub use state::{Selection, SelectionState, StateCell, StateError, UnitPreference, UnitState};
pub use station::{RunState, Station, StationError};
