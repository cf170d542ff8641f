//! Desktop simulator for the weather station.
//!
//! Runs the weather-core station against synthetic hardware: a background
//! thread plays the sensor bus (announcing the temperature and pressure
//! sub-sensors shortly after they are registered, then emitting slowly
//! varying readings), the terminal stands in for the alphanumeric display,
//! and stdin stands in for the two buttons.
//!
//! # Key bindings
//!
//! Type a key and press Return.
//!
//! | Input        | Action                                |
//! |--------------|---------------------------------------|
//! | S or space   | Selection button (temperature/pressure) |
//! | U or empty   | Unit button (primary/alternate)       |
//! | Q            | Quit                                  |
//!
//! `WEATHER_DISPLAY_CHARS` and `WEATHER_BRIGHTNESS` override the station
//! config; `RUST_LOG` controls log output.

use std::convert::Infallible;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{error, info, warn};
use static_cell::StaticCell;

use weather_core::hal::{AlphanumericDisplay, ButtonDriver, SensorDriver};
use weather_core::{KeyCode, SensorEvent, SensorInfo, SensorTypeId, Station, StationConfig};

type SimStation = Station<CriticalSectionRawMutex, SimSensorDriver, TerminalDisplay, SimButton>;

static STATION: StaticCell<SimStation> = StaticCell::new();

/// Delay between a sub-sensor being registered and the bus announcing it.
const DISCOVERY_DELAY: Duration = Duration::from_millis(300);

/// Interval between synthetic sensor events.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Simulated sensor bus
// ---------------------------------------------------------------------------

/// State shared between the sensor driver and the hardware thread.
#[derive(Default)]
struct SimBus {
    temperature: AtomicBool,
    pressure: AtomicBool,
    closed: AtomicBool,
}

struct SimSensorDriver {
    bus: Arc<SimBus>,
}

impl SensorDriver for SimSensorDriver {
    type Error = Infallible;

    fn register_temperature_sensor(&mut self) -> Result<(), Self::Error> {
        self.bus.temperature.store(true, Ordering::Release);
        Ok(())
    }

    fn register_pressure_sensor(&mut self) -> Result<(), Self::Error> {
        self.bus.pressure.store(true, Ordering::Release);
        Ok(())
    }

    fn unregister_temperature_sensor(&mut self) -> Result<(), Self::Error> {
        self.bus.temperature.store(false, Ordering::Release);
        Ok(())
    }

    fn unregister_pressure_sensor(&mut self) -> Result<(), Self::Error> {
        self.bus.pressure.store(false, Ordering::Release);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.bus.closed.store(true, Ordering::Release);
        info!("Sensor bus closed");
        Ok(())
    }
}

/// Generates synthetic readings that vary over time.
struct MockSensorGenerator {
    elapsed_secs: f64,
}

impl MockSensorGenerator {
    fn new() -> Self {
        Self { elapsed_secs: 0.0 }
    }

    /// Advance the internal clock and return `(celsius, hpa)`.
    fn next_sample(&mut self, dt_secs: f64) -> (f32, f32) {
        self.elapsed_secs += dt_secs;
        let t = self.elapsed_secs;

        // Temperature: 17-23 °C sinusoidal with slow drift
        let temperature = 20.0 + 3.0 * (t / 60.0).sin() + 0.5 * (t / 17.0).cos();

        // Pressure: 995-1031 hPa on a longer cycle
        let pressure = 1013.0 + 15.0 * (t / 90.0).sin() + 3.0 * (t / 23.0).cos();

        (temperature as f32, pressure as f32)
    }
}

/// Plays the sensor bus: announces registered sub-sensors, then emits readings
/// until the bus is closed.
fn run_sensor_bus(station: &'static SimStation, bus: Arc<SimBus>) {
    let mut generator = MockSensorGenerator::new();
    let mut announced = [false; 2];

    while !bus.closed.load(Ordering::Acquire) {
        let registered = [
            bus.temperature.load(Ordering::Acquire),
            bus.pressure.load(Ordering::Acquire),
        ];
        let sensors = [
            SensorInfo::new(SensorTypeId::AMBIENT_TEMPERATURE, "sim-bmx280-temperature"),
            SensorInfo::new(SensorTypeId::PRESSURE, "sim-bmx280-pressure"),
        ];

        for ((sensor, registered), announced) in
            sensors.iter().zip(registered).zip(announced.iter_mut())
        {
            if registered && !*announced {
                thread::sleep(DISCOVERY_DELAY);
                station.source().on_sensor_connected(*sensor);
                station.source().on_accuracy_changed(*sensor, 3);
                *announced = true;
            }
        }

        let (celsius, hpa) = generator.next_sample(SAMPLE_INTERVAL.as_secs_f64());
        if registered[0] {
            station
                .source()
                .on_sensor_event(SensorEvent::new(SensorTypeId::AMBIENT_TEMPERATURE, &[celsius]));
        }
        if registered[1] {
            station
                .source()
                .on_sensor_event(SensorEvent::new(SensorTypeId::PRESSURE, &[hpa]));
        }

        thread::sleep(SAMPLE_INTERVAL);
    }

    info!("Sensor bus thread exiting");
}

// ---------------------------------------------------------------------------
// Terminal display
// ---------------------------------------------------------------------------

struct TerminalDisplay {
    capacity: usize,
    brightness: f32,
    enabled: bool,
}

impl TerminalDisplay {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            brightness: 0.0,
            enabled: false,
        }
    }

    fn write_frame(&self, text: &str) -> std::io::Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(
            stdout,
            "[{:>width$}] (brightness {:.0}%)",
            text,
            self.brightness * 100.0,
            width = self.capacity
        )?;
        stdout.flush()
    }
}

impl AlphanumericDisplay for TerminalDisplay {
    type Error = std::io::Error;

    fn set_brightness(&mut self, brightness: f32) -> Result<(), Self::Error> {
        self.brightness = brightness;
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error> {
        self.enabled = enabled;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.write_frame("")
    }

    fn display(&mut self, text: &str) -> Result<(), Self::Error> {
        if !self.enabled {
            return Ok(());
        }
        self.write_frame(text)
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.enabled = false;
        self.write_frame("")
    }
}

// ---------------------------------------------------------------------------
// Keyboard buttons
// ---------------------------------------------------------------------------

struct SimButton {
    name: &'static str,
    registered: Arc<AtomicBool>,
}

impl SimButton {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            registered: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ButtonDriver for SimButton {
    type Error = Infallible;

    fn register(&mut self) -> Result<(), Self::Error> {
        self.registered.store(true, Ordering::Release);
        Ok(())
    }

    fn unregister(&mut self) -> Result<(), Self::Error> {
        self.registered.store(false, Ordering::Release);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        info!("{} button closed", self.name);
        Ok(())
    }
}

/// Map a line of terminal input to a button key event.
fn line_to_key(line: &str) -> Option<KeyCode> {
    match line.trim_end_matches(['\r', '\n']) {
        " " => Some(KeyCode::Space),
        "" => Some(KeyCode::Enter),
        other => match other.trim().to_ascii_lowercase().as_str() {
            "s" => Some(KeyCode::Space),
            "u" => Some(KeyCode::Enter),
            _ => None,
        },
    }
}

/// Reads stdin until EOF or `q`, forwarding presses of registered buttons.
fn run_keyboard(station: &'static SimStation, selection: Arc<AtomicBool>, unit: Arc<AtomicBool>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Unable to read keyboard input: {:?}", e);
                break;
            }
        };

        if line.trim().eq_ignore_ascii_case("q") {
            break;
        }

        let Some(key) = line_to_key(&line) else {
            warn!("Unknown input {:?}", line);
            continue;
        };

        let registered = match key {
            KeyCode::Space => &selection,
            _ => &unit,
        };
        if registered.load(Ordering::Acquire) {
            station.on_key(key);
        }
    }

    station.stop();
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn load_config() -> StationConfig {
    let mut config = StationConfig::default();

    if let Ok(value) = std::env::var("WEATHER_DISPLAY_CHARS") {
        match value.parse() {
            Ok(chars) => config = config.with_display_chars(chars),
            Err(e) => warn!("Ignoring WEATHER_DISPLAY_CHARS={:?}: {}", value, e),
        }
    }
    if let Ok(value) = std::env::var("WEATHER_BRIGHTNESS") {
        match value.parse() {
            Ok(brightness) => config = config.with_brightness(brightness),
            Err(e) => warn!("Ignoring WEATHER_BRIGHTNESS={:?}: {}", value, e),
        }
    }

    // Round-trip through the stored form so overrides get the same checks as a config blob
    match config
        .to_bytes()
        .and_then(|bytes| StationConfig::from_bytes(&bytes))
    {
        Ok(config) => config,
        Err(e) => {
            warn!("{}, using defaults", e);
            StationConfig::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    env_logger::init();
    info!("Starting weather station simulator");
    info!("Keys: S/space=Selection  U/Return=Unit  Q=Quit");

    let config = load_config();
    info!(
        "Display: {} chars at brightness {:.2}",
        config.display_chars, config.brightness
    );

    let bus = Arc::new(SimBus::default());
    let selection_button = SimButton::new("Selection");
    let unit_button = SimButton::new("Unit");
    let (selection_registered, unit_registered) = (
        selection_button.registered.clone(),
        unit_button.registered.clone(),
    );

    let station: &'static SimStation = STATION.init(Station::new(
        config,
        Some(SimSensorDriver { bus: bus.clone() }),
        Some(TerminalDisplay::new(config.display_chars())),
        Some(selection_button),
        Some(unit_button),
    ));

    let pipeline = match station.start() {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Unable to start station: {}", e);
            station.stop();
            std::process::exit(1);
        }
    };

    thread::spawn(move || run_sensor_bus(station, bus));
    thread::spawn(move || run_keyboard(station, selection_registered, unit_registered));

    station.run(pipeline).await;

    info!("Simulator exiting");
    std::process::exit(0);
}
