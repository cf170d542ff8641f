//! Typed sensor readings and the hardware event shapes they are built from.

/// Hardware-specific identifier of a sensor type, as reported by the sensor bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorTypeId(pub u16);

impl SensorTypeId {
    /// Barometric pressure sub-sensor (hPa)
    pub const PRESSURE: Self = Self(6);
    /// Ambient temperature sub-sensor (°C)
    pub const AMBIENT_TEMPERATURE: Self = Self(13);
}

/// The quantity a reading measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingKind {
    Temperature,
    Pressure,
    /// Any sensor type the station does not understand. Never leaves the reading source.
    Unknown,
}

impl ReadingKind {
    /// Classify a hardware sensor type.
    pub const fn classify(sensor: SensorTypeId) -> Self {
        match sensor {
            SensorTypeId::AMBIENT_TEMPERATURE => Self::Temperature,
            SensorTypeId::PRESSURE => Self::Pressure,
            _ => Self::Unknown,
        }
    }
}

/// A single value delivered by the sensor hardware.
///
/// Readings are created once per hardware callback and never mutated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    kind: ReadingKind,
    value: f32,
}

impl Reading {
    pub const fn new(kind: ReadingKind, value: f32) -> Self {
        Self { kind, value }
    }

    pub const fn temperature(celsius: f32) -> Self {
        Self::new(ReadingKind::Temperature, celsius)
    }

    pub const fn pressure(hpa: f32) -> Self {
        Self::new(ReadingKind::Pressure, hpa)
    }

    pub const fn kind(&self) -> ReadingKind {
        self.kind
    }

    pub const fn value(&self) -> f32 {
        self.value
    }
}

/// A sub-sensor announced by the sensor bus, possibly long after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorInfo {
    pub type_id: SensorTypeId,
    pub name: &'static str,
}

impl SensorInfo {
    pub const fn new(type_id: SensorTypeId, name: &'static str) -> Self {
        Self { type_id, name }
    }

    pub const fn kind(&self) -> ReadingKind {
        ReadingKind::classify(self.type_id)
    }
}

/// Raw payload of one hardware sensor callback.
///
/// `values` mirrors the bus layout: the first element is the measurement,
/// any further elements are sensor-specific extras and ignored.
#[derive(Debug, Clone, Copy)]
pub struct SensorEvent<'a> {
    pub sensor: SensorTypeId,
    pub values: &'a [f32],
}

impl<'a> SensorEvent<'a> {
    pub const fn new(sensor: SensorTypeId, values: &'a [f32]) -> Self {
        Self { sensor, values }
    }

    /// Turn the event into a reading, or `None` if it is noise.
    ///
    /// Unknown sensor types, empty payloads and non-finite values are dropped.
    pub fn to_reading(&self) -> Option<Reading> {
        let kind = ReadingKind::classify(self.sensor);
        if kind == ReadingKind::Unknown {
            return None;
        }

        let value = *self.values.first()?;
        value.is_finite().then(|| Reading::new(kind, value))
    }
}
