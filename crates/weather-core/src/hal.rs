//! Hardware ports
//!
//! Thin traits over the peripherals the station talks to. Concrete drivers
//! live in the firmware or simulator; the core only sees these traits. Every
//! operation can fail with the driver's own error type, which the core logs
//! and otherwise ignores.

use core::fmt::Debug;

/// Barometric/temperature sensor driver on the sensor bus.
///
/// Registering a sub-sensor makes the bus announce it through the reading
/// source's discovery callback at some later point.
pub trait SensorDriver {
    type Error: Debug;

    fn register_temperature_sensor(&mut self) -> Result<(), Self::Error>;
    fn register_pressure_sensor(&mut self) -> Result<(), Self::Error>;
    fn unregister_temperature_sensor(&mut self) -> Result<(), Self::Error>;
    fn unregister_pressure_sensor(&mut self) -> Result<(), Self::Error>;
    fn close(&mut self) -> Result<(), Self::Error>;
}

/// Segmented alphanumeric display.
pub trait AlphanumericDisplay {
    type Error: Debug;

    /// Brightness from 0.0 (dimmest) to 1.0 (brightest)
    fn set_brightness(&mut self, brightness: f32) -> Result<(), Self::Error>;
    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error>;
    fn clear(&mut self) -> Result<(), Self::Error>;
    fn display(&mut self, text: &str) -> Result<(), Self::Error>;
    fn close(&mut self) -> Result<(), Self::Error>;
}

/// Debounced push button that reports presses as key events.
pub trait ButtonDriver {
    type Error: Debug;

    fn register(&mut self) -> Result<(), Self::Error>;
    fn unregister(&mut self) -> Result<(), Self::Error>;
    fn close(&mut self) -> Result<(), Self::Error>;
}

/// Where finished display strings go.
///
/// Called once per pipeline output; must tolerate the same text repeatedly.
pub trait RenderSink {
    fn render(&self, text: &str);
}
