//! Fusion pipeline: readings + selection + unit preference → display strings.
//!
//! Two combine-latest stages:
//!
//! - **Stage A** pairs the latest reading with the latest selection and
//!   forwards the reading only when its kind is the selected one.
//! - **Stage B** pairs the latest forwarded reading with the latest unit
//!   preference and formats it.
//!
//! [`Fusion`] is the synchronous state machine holding the latest value of
//! each input. [`FusionPipeline`] is the async driver that waits on the
//! reading source, both state cells and the shutdown signal, feeds the state
//! machine and hands every output to a [`RenderSink`].

use embassy_futures::select::{Either4, select4};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use log::{debug, info};

use crate::format::{DisplayString, display_string};
use crate::hal::RenderSink;
use crate::reading::Reading;
use crate::source::ReadingSubscriber;
use crate::state::{Selection, StateReceiver, UnitPreference};

/// Latest-value state of the two pipeline stages.
#[derive(Debug, Clone)]
pub struct Fusion {
    capacity: usize,
    reading: Option<Reading>,
    selection: Option<Selection>,
    /// Latest reading that passed stage A
    matched: Option<Reading>,
    unit: Option<UnitPreference>,
}

impl Fusion {
    /// `capacity` is the display width in characters.
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            reading: None,
            selection: None,
            matched: None,
            unit: None,
        }
    }

    pub fn on_reading(&mut self, reading: Reading) -> Option<DisplayString> {
        self.reading = Some(reading);
        self.select()
    }

    pub fn on_selection(&mut self, selection: Selection) -> Option<DisplayString> {
        self.selection = Some(selection);
        self.select()
    }

    pub fn on_unit(&mut self, unit: UnitPreference) -> Option<DisplayString> {
        self.unit = Some(unit);
        self.combine()
    }

    /// Latest reading forwarded by stage A.
    pub fn matched(&self) -> Option<Reading> {
        self.matched
    }

    /// Stage A
    fn select(&mut self) -> Option<DisplayString> {
        match (self.reading, self.selection) {
            (Some(reading), Some(selection)) if selection.matches(&reading) => {
                self.matched = Some(reading);
                self.combine()
            }
            _ => None,
        }
    }

    /// Stage B
    fn combine(&self) -> Option<DisplayString> {
        let reading = self.matched?;
        let unit = self.unit?;
        Some(display_string(&reading, unit, self.capacity))
    }
}

/// Async driver of the fusion stages.
///
/// Owns one subscription to each input. Dropping the pipeline unsubscribes.
pub struct FusionPipeline<'a, M: RawMutex> {
    readings: ReadingSubscriber<'a, M>,
    selection: StateReceiver<'a, M, Selection>,
    units: StateReceiver<'a, M, UnitPreference>,
    shutdown: &'a Signal<M, ()>,
    fusion: Fusion,
}

impl<'a, M: RawMutex> FusionPipeline<'a, M> {
    pub fn new(
        readings: ReadingSubscriber<'a, M>,
        selection: StateReceiver<'a, M, Selection>,
        units: StateReceiver<'a, M, UnitPreference>,
        shutdown: &'a Signal<M, ()>,
        capacity: usize,
    ) -> Self {
        Self {
            readings,
            selection,
            units,
            shutdown,
            fusion: Fusion::new(capacity),
        }
    }

    /// Run until shutdown is signalled or the reading source completes.
    ///
    /// Every output is passed to `sink` in the order it was produced. Nothing
    /// is rendered once shutdown has been signalled.
    pub async fn run<S: RenderSink + ?Sized>(&mut self, sink: &S) {
        info!("Fusion pipeline started");

        loop {
            let output = match select4(
                self.shutdown.wait(),
                self.readings.next(),
                self.selection.changed(),
                self.units.changed(),
            )
            .await
            {
                Either4::First(()) => {
                    info!("Fusion pipeline shutting down");
                    break;
                }
                Either4::Second(None) => {
                    info!("Reading source completed, fusion pipeline stopping");
                    break;
                }
                Either4::Second(Some(reading)) => {
                    debug!("Reading {:?}", reading);
                    self.fusion.on_reading(reading)
                }
                Either4::Third(selection) => {
                    debug!("Selection {:?}", selection);
                    self.fusion.on_selection(selection)
                }
                Either4::Fourth(unit) => {
                    debug!("Unit preference {:?}", unit);
                    self.fusion.on_unit(unit)
                }
            };

            let output = self.apply_pending_state(output);

            if self.shutdown.signaled() {
                info!("Fusion pipeline shutting down");
                break;
            }

            if let Some(text) = output {
                info!("Reading: {}", text);
                sink.render(&text);
            }
        }
    }

    /// Fold in state changes that arrived while the last event was handled,
    /// so one output reflects all of them. The last evaluation wins.
    fn apply_pending_state(&mut self, mut output: Option<DisplayString>) -> Option<DisplayString> {
        if let Some(selection) = self.selection.try_changed() {
            debug!("Selection {:?}", selection);
            output = self.fusion.on_selection(selection);
        }
        if let Some(unit) = self.units.try_changed() {
            debug!("Unit preference {:?}", unit);
            output = self.fusion.on_unit(unit);
        }
        output
    }
}
