//! Station lifecycle: wiring the reading source, state cells, buttons and
//! display into one running fusion pipeline, and tearing it all down again.
//!
//! ```rust,ignore
//! static STATION: StaticCell<Station<...>> = StaticCell::new();
//!
//! let station = STATION.init(Station::new(config, sensor, display, selection_button, unit_button));
//! let pipeline = station.start()?;
//!
//! // Sensor bus callbacks go to station.source(), button presses to station.on_key()
//! station.run(pipeline).await;
//! ```

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use log::{debug, info, warn};
use thiserror_no_std::Error;

use crate::buttons::{Button, ButtonInputs, KeyCode};
use crate::config::StationConfig;
use crate::display::DisplayPanel;
use crate::fusion::FusionPipeline;
use crate::hal::{AlphanumericDisplay, ButtonDriver, SensorDriver};
use crate::source::{ReadingSource, SourceError};
use crate::state::{Selection, SelectionState, StateError, UnitPreference, UnitState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopped,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationError {
    #[error("Station already started")]
    AlreadyStarted,
    #[error("Station stopped")]
    Stopped,
    #[error("Reading source error: {0}")]
    Source(SourceError),
    #[error("State error: {0}")]
    State(StateError),
}

impl From<SourceError> for StationError {
    fn from(value: SourceError) -> Self {
        Self::Source(value)
    }
}

impl From<StateError> for StationError {
    fn from(value: StateError) -> Self {
        Self::State(value)
    }
}

/// Everything the station owns for the lifetime of the process.
pub struct Station<M, D, V, B>
where
    M: RawMutex,
    D: SensorDriver,
    V: AlphanumericDisplay,
    B: ButtonDriver,
{
    config: StationConfig,
    source: ReadingSource<M, D>,
    selection: SelectionState<M>,
    units: UnitState<M>,
    panel: DisplayPanel<M, V>,
    buttons: ButtonInputs<M, B>,
    shutdown: Signal<M, ()>,
    run_state: Mutex<M, Cell<RunState>>,
}

impl<M, D, V, B> Station<M, D, V, B>
where
    M: RawMutex,
    D: SensorDriver,
    V: AlphanumericDisplay,
    B: ButtonDriver,
{
    /// Peripherals that failed to open are passed as `None`; the station runs without them.
    pub fn new(
        config: StationConfig,
        sensor: Option<D>,
        display: Option<V>,
        selection_button: Option<B>,
        unit_button: Option<B>,
    ) -> Self {
        Self {
            config,
            source: ReadingSource::new(sensor),
            selection: SelectionState::new(Selection::Temperature),
            units: UnitState::new(UnitPreference::Primary),
            panel: DisplayPanel::new(display),
            buttons: ButtonInputs::new(selection_button, unit_button),
            shutdown: Signal::new(),
            run_state: Mutex::new(Cell::new(RunState::Idle)),
        }
    }

    /// Bring up the display, buttons and sensors and connect the pipeline.
    ///
    /// The returned pipeline does nothing until [`run`](Self::run) drives it.
    /// If this fails part way, [`stop`](Self::stop) still releases whatever
    /// was brought up.
    pub fn start(&self) -> Result<FusionPipeline<'_, M>, StationError> {
        self.run_state.lock(|state| match state.get() {
            RunState::Idle => {
                state.set(RunState::Running);
                Ok(())
            }
            RunState::Running => Err(StationError::AlreadyStarted),
            RunState::Stopped => Err(StationError::Stopped),
        })?;

        info!("Starting weather station");

        self.panel.init(self.config.brightness);
        self.buttons.register();
        self.source.start();

        Ok(FusionPipeline::new(
            self.source.subscribe()?,
            self.selection.subscribe()?,
            self.units.subscribe()?,
            &self.shutdown,
            self.config.display_chars(),
        ))
    }

    /// Drive `pipeline` into the display until the station stops.
    pub async fn run(&self, mut pipeline: FusionPipeline<'_, M>) {
        pipeline.run(&self.panel).await;
        info!("Weather station pipeline finished");
    }

    /// Tear everything down. Safe to call more than once and after a failed start.
    ///
    /// The display stops accepting text before anything else is torn down, so
    /// a render racing with `stop` either lands first or is dropped.
    pub fn stop(&self) {
        let previous = self
            .run_state
            .lock(|state| state.replace(RunState::Stopped));
        if previous == RunState::Stopped {
            debug!("Weather station already stopped");
            return;
        }

        info!("Stopping weather station");

        self.panel.mute();
        self.shutdown.signal(());
        self.source.close();
        self.panel.close();
        self.buttons.close();

        info!("Weather station stopped");
    }

    /// Apply a button press.
    pub fn on_button(&self, button: Button) {
        if self.run_state() == RunState::Stopped {
            debug!("Ignoring {} press after stop", button.label());
            return;
        }

        match button {
            Button::Selection => {
                let selection = self.selection.toggle();
                info!("Showing {:?}", selection);
            }
            Button::Unit => {
                let unit = self.units.toggle();
                info!("Using {:?} units", unit);
            }
        }
    }

    /// Key event from a button driver. Returns whether the key was handled.
    pub fn on_key(&self, key: KeyCode) -> bool {
        match Button::from_key(key) {
            Some(button) => {
                self.on_button(button);
                true
            }
            None => {
                warn!("Unhandled key {:?}", key);
                false
            }
        }
    }

    /// Entry point for sensor bus callbacks.
    pub fn source(&self) -> &ReadingSource<M, D> {
        &self.source
    }

    pub fn selection(&self) -> &SelectionState<M> {
        &self.selection
    }

    pub fn units(&self) -> &UnitState<M> {
        &self.units
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn run_state(&self) -> RunState {
        self.run_state.lock(|state| state.get())
    }

    pub fn is_stopped(&self) -> bool {
        self.run_state() == RunState::Stopped
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::hal::mock::{
        ButtonCall, DisplayCall, DriverCall, MockButton, MockDisplay, MockSensorDriver,
        SharedButton, SharedDisplay, SharedSensorDriver,
    };
    use core::sync::atomic::Ordering;
    use core::time::Duration;
    use std::thread;
    use std::time::Instant;
    use crate::reading::{SensorEvent, SensorInfo, SensorTypeId};
    use alloc::vec;
    use alloc::vec::Vec;
    use embassy_futures::join::join;
    use embassy_futures::{block_on, yield_now};
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    type TestStation = Station<CriticalSectionRawMutex, MockSensorDriver, MockDisplay, MockButton>;

    fn texts(calls: &[DisplayCall]) -> Vec<&str> {
        calls
            .iter()
            .filter_map(|call| match call {
                DisplayCall::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn connect_sensors_on<M: RawMutex, D: SensorDriver>(source: &ReadingSource<M, D>) {
        source.on_sensor_connected(SensorInfo::new(SensorTypeId::AMBIENT_TEMPERATURE, "temp"));
        source.on_sensor_connected(SensorInfo::new(SensorTypeId::PRESSURE, "press"));
    }

    fn connect_sensors(station: &TestStation) {
        connect_sensors_on(station.source());
    }

    #[test]
    fn test_scenario_end_to_end() {
        let display = MockDisplay::default();
        let display_calls = display.calls();
        let station = TestStation::new(
            StationConfig::default(),
            Some(MockSensorDriver::default()),
            Some(display),
            Some(MockButton::default()),
            Some(MockButton::default()),
        );

        let pipeline = station.start().unwrap();
        connect_sensors(&station);

        block_on(join(station.run(pipeline), async {
            yield_now().await;
            station
                .source()
                .on_sensor_event(SensorEvent::new(SensorTypeId::AMBIENT_TEMPERATURE, &[22.5]));
            yield_now().await;
            assert!(station.on_key(KeyCode::Space));
            yield_now().await;
            station
                .source()
                .on_sensor_event(SensorEvent::new(SensorTypeId::PRESSURE, &[1000.0]));
            yield_now().await;
            assert!(station.on_key(KeyCode::Enter));
            yield_now().await;
            assert!(!station.on_key(KeyCode::Other(7)));
            station.stop();
        }));

        let calls = display_calls.take();
        assert_eq!(texts(&calls), vec!["22.5C", "100P", "0.99A"]);
        assert_eq!(calls.first(), Some(&DisplayCall::Brightness(1.0)));
        assert_eq!(calls.last(), Some(&DisplayCall::Close));
    }

    #[test]
    fn test_stop_twice_has_no_extra_effects() {
        let sensor = MockSensorDriver::default();
        let display = MockDisplay::default();
        let button = MockButton::default();
        let (sensor_calls, display_calls, button_calls) =
            (sensor.calls(), display.calls(), button.calls());
        let station = TestStation::new(
            StationConfig::default(),
            Some(sensor),
            Some(display),
            Some(button),
            None,
        );

        let _pipeline = station.start().unwrap();
        station.stop();
        let after_first = (
            sensor_calls.borrow().len(),
            display_calls.borrow().len(),
            button_calls.borrow().len(),
        );
        station.stop();

        assert_eq!(
            after_first,
            (
                sensor_calls.borrow().len(),
                display_calls.borrow().len(),
                button_calls.borrow().len()
            )
        );
        assert_eq!(sensor_calls.borrow().last(), Some(&DriverCall::Close));
        assert_eq!(button_calls.borrow().last(), Some(&ButtonCall::Close));
        assert!(station.is_stopped());
    }

    #[test]
    fn test_stop_after_failed_start_releases_everything_once() {
        let sensor = MockSensorDriver::default();
        let display = MockDisplay::default();
        let (selection, unit) = (MockButton::default(), MockButton::default());
        let (sensor_calls, display_calls) = (sensor.calls(), display.calls());
        let (selection_calls, unit_calls) = (selection.calls(), unit.calls());
        let station = TestStation::new(
            StationConfig::default(),
            Some(sensor),
            Some(display),
            Some(selection),
            Some(unit),
        );

        let _taken = [
            station.source().subscribe().unwrap(),
            station.source().subscribe().unwrap(),
        ];
        assert_eq!(
            station.start().err(),
            Some(StationError::Source(SourceError::TooManySubscribers))
        );

        station.stop();
        station.stop();

        assert_eq!(
            sensor_calls.take(),
            vec![
                DriverCall::RegisterTemperature,
                DriverCall::RegisterPressure,
                DriverCall::UnregisterPressure,
                DriverCall::UnregisterTemperature,
                DriverCall::Close,
            ]
        );
        assert_eq!(
            display_calls.take(),
            vec![
                DisplayCall::Brightness(1.0),
                DisplayCall::Enabled(true),
                DisplayCall::Clear,
                DisplayCall::Close,
            ]
        );
        let buttons = vec![ButtonCall::Register, ButtonCall::Unregister, ButtonCall::Close];
        assert_eq!(selection_calls.take(), buttons);
        assert_eq!(unit_calls.take(), buttons);
    }

    #[test]
    fn test_no_text_reaches_display_once_stop_begins() {
        type ThreadedStation =
            Station<CriticalSectionRawMutex, SharedSensorDriver, SharedDisplay, SharedButton>;

        let sensor = SharedSensorDriver::default();
        let display = SharedDisplay {
            teardown: sensor.released.clone(),
            ..SharedDisplay::default()
        };
        let button = SharedButton::default();
        let station = ThreadedStation::new(
            StationConfig::default(),
            Some(sensor.clone()),
            Some(display.clone()),
            Some(button.clone()),
            Some(button.clone()),
        );
        connect_sensors_on(station.source());

        thread::scope(|s| {
            s.spawn(|| {
                if let Ok(pipeline) = station.start() {
                    block_on(station.run(pipeline));
                }
            });

            s.spawn(|| {
                let mut celsius = 20.0;
                while !station.is_stopped() {
                    station
                        .source()
                        .on_sensor_event(SensorEvent::new(SensorTypeId::AMBIENT_TEMPERATURE, &[celsius]));
                    station.on_button(Button::Unit);
                    celsius += 0.1;
                    thread::yield_now();
                }
            });

            let deadline = Instant::now() + Duration::from_secs(5);
            while display.texts.load(Ordering::SeqCst) < 50 && Instant::now() < deadline {
                thread::yield_now();
            }
            station.stop();
        });

        assert!(display.texts.load(Ordering::SeqCst) > 0);
        assert_eq!(display.late_texts.load(Ordering::SeqCst), 0);
        assert_eq!(sensor.registered.load(Ordering::SeqCst), 2);
        assert_eq!(sensor.released.load(Ordering::SeqCst), 2);
        assert_eq!(sensor.closed.load(Ordering::SeqCst), 1);
        assert_eq!(display.closed.load(Ordering::SeqCst), 1);
        assert_eq!(button.closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stop_without_start() {
        let station = TestStation::new(StationConfig::default(), None, None, None, None);
        station.stop();
        station.stop();

        assert!(station.source().is_closed());
        assert_eq!(station.start().err(), Some(StationError::Stopped));
    }

    #[test]
    fn test_start_twice_is_refused() {
        let station = TestStation::new(StationConfig::default(), None, None, None, None);
        let _pipeline = station.start().unwrap();

        assert_eq!(station.start().err(), Some(StationError::AlreadyStarted));
    }

    #[test]
    fn test_buttons_ignored_after_stop() {
        let station = TestStation::new(StationConfig::default(), None, None, None, None);
        station.stop();
        station.on_button(Button::Selection);

        assert_eq!(station.selection().current(), Selection::Temperature);
    }

    #[test]
    fn test_degraded_station_still_runs() {
        let display = MockDisplay::default();
        let display_calls = display.calls();
        let station = TestStation::new(
            StationConfig::default().with_display_chars(8),
            None,
            Some(display),
            None,
            None,
        );

        let pipeline = station.start().unwrap();
        block_on(join(station.run(pipeline), async {
            yield_now().await;
            station.on_button(Button::Unit);
            yield_now().await;
            station.stop();
        }));

        assert_eq!(texts(&display_calls.take()), Vec::<&str>::new());
        assert_eq!(station.units().current(), UnitPreference::Alternate);
        assert_eq!(station.config().display_chars(), 8);
    }
}
