//! Reading source: sensor callbacks in, broadcast stream of readings out.
//!
//! The sensor bus calls into the source from its own context
//! ([`ReadingSource::on_sensor_connected`], [`ReadingSource::on_sensor_event`]).
//! Valid readings are published without blocking on a `PubSubChannel`;
//! every subscriber receives every reading published after it subscribed.
//!
//! ## Sub-sensor registry
//!
//! Temperature and pressure sub-sensors can be discovered at any time. Until
//! a sub-sensor has been announced no listener is attached to it, so events
//! from it are dropped. Discovery never holds up the pipeline.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::pubsub::{PubSubChannel, Subscriber, WaitResult};
use heapless::Vec;
use log::{debug, error, info, trace, warn};
use thiserror_no_std::Error;

use crate::hal::SensorDriver;
use crate::reading::{Reading, ReadingKind, SensorEvent, SensorInfo};

/// Channel capacity for readings
/// Sized for bursts from both sub-sensors while the pipeline is busy rendering
pub const READING_CHANNEL_CAPACITY: usize = 8;

/// Number of subscribers that can listen to readings
/// - Subscriber 0: fusion pipeline
/// - Subscriber 1: spare for diagnostics/tests
pub const READING_SUBSCRIBERS: usize = 2;

/// Number of publishers (readings are published through the immediate publisher)
pub const READING_PUBLISHERS: usize = 1;

/// Temperature and pressure
pub const MAX_SUB_SENSORS: usize = 2;

/// Messages on the reading broadcast
#[derive(Debug, Clone, Copy)]
enum SourceEvent {
    Reading(Reading),
    /// The source was closed, no more readings will follow
    Closed,
}

type ReadingChannel<M> = PubSubChannel<
    M,
    SourceEvent,
    READING_CHANNEL_CAPACITY,
    READING_SUBSCRIBERS,
    READING_PUBLISHERS,
>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceError {
    #[error("Reading source is closed")]
    Closed,
    #[error("All reading subscriber slots are taken")]
    TooManySubscribers,
}

struct Registry {
    sensors: Vec<SensorInfo, MAX_SUB_SENSORS>,
    closed: bool,
}

/// Broadcast stream of typed sensor readings.
pub struct ReadingSource<M: RawMutex, D: SensorDriver> {
    channel: ReadingChannel<M>,
    registry: Mutex<M, RefCell<Registry>>,
    driver: Mutex<M, RefCell<Option<D>>>,
}

impl<M: RawMutex, D: SensorDriver> ReadingSource<M, D> {
    /// Create a source over `driver`.
    ///
    /// `None` means the sensor driver could not be opened; the source then
    /// stays silent for the lifetime of the process.
    pub fn new(driver: Option<D>) -> Self {
        if driver.is_none() {
            warn!("Sensor driver unavailable, readings will not be produced");
        }

        Self {
            channel: PubSubChannel::new(),
            registry: Mutex::new(RefCell::new(Registry {
                sensors: Vec::new(),
                closed: false,
            })),
            driver: Mutex::new(RefCell::new(driver)),
        }
    }

    /// Ask the driver to bring up its temperature and pressure sub-sensors.
    ///
    /// The sub-sensors announce themselves later through
    /// [`on_sensor_connected`](Self::on_sensor_connected). A failure only
    /// silences the affected sub-sensor.
    pub fn start(&self) {
        if self.is_closed() {
            warn!("Reading source already closed, not registering sensors");
            return;
        }

        self.driver.lock(|driver| {
            let mut driver = driver.borrow_mut();
            let Some(driver) = driver.as_mut() else {
                return;
            };

            if let Err(e) = driver.register_temperature_sensor() {
                error!("Unable to register temperature sensor: {:?}", e);
            }
            if let Err(e) = driver.register_pressure_sensor() {
                error!("Unable to register pressure sensor: {:?}", e);
            }
        });
    }

    /// Subscribe to readings published from now on.
    pub fn subscribe(&self) -> Result<ReadingSubscriber<'_, M>, SourceError> {
        // Subscribing under the registry lock orders us against `close`, so a
        // subscriber either sees the close message or is refused.
        self.registry.lock(|registry| {
            if registry.borrow().closed {
                return Err(SourceError::Closed);
            }

            let inner = self
                .channel
                .subscriber()
                .map_err(|_| SourceError::TooManySubscribers)?;

            Ok(ReadingSubscriber {
                inner,
                finished: false,
            })
        })
    }

    /// Dynamic discovery callback: a sub-sensor became available.
    pub fn on_sensor_connected(&self, sensor: SensorInfo) {
        let kind = sensor.kind();
        if kind == ReadingKind::Unknown {
            debug!("Ignoring discovered sensor {:?}", sensor);
            return;
        }

        self.registry.lock(|registry| {
            let mut registry = registry.borrow_mut();
            if registry.closed {
                debug!("Reading source closed, ignoring {:?}", sensor);
                return;
            }
            if registry.sensors.iter().any(|s| s.type_id == sensor.type_id) {
                debug!("Sensor {} already registered", sensor.name);
                return;
            }

            match registry.sensors.push(sensor) {
                Ok(()) => info!("Listening to {:?} sensor {}", kind, sensor.name),
                Err(sensor) => warn!("Sensor registry full, dropping {:?}", sensor),
            }
        });
    }

    /// Sensor callback: a sub-sensor produced a value.
    ///
    /// Unknown types, missing or non-finite payloads and events from
    /// sub-sensors that were never announced are dropped silently.
    pub fn on_sensor_event(&self, event: SensorEvent<'_>) {
        let Some(reading) = event.to_reading() else {
            trace!("Dropping unusable sensor event {:?}", event);
            return;
        };

        self.registry.lock(|registry| {
            let registry = registry.borrow();
            if registry.closed {
                trace!("Reading source closed, dropping {:?}", reading);
                return;
            }
            if !registry.sensors.iter().any(|s| s.type_id == event.sensor) {
                trace!("No listener for {:?}, dropping {:?}", event.sensor, reading);
                return;
            }

            self.channel
                .immediate_publisher()
                .publish_immediate(SourceEvent::Reading(reading));
        });
    }

    /// Sensor callback: accuracy of a sub-sensor changed.
    pub fn on_accuracy_changed(&self, sensor: SensorInfo, accuracy: i32) {
        info!("Accuracy of sensor {:?} changed to {}", sensor.type_id, accuracy);
    }

    /// Number of sub-sensors currently listened to.
    pub fn registered_sensors(&self) -> usize {
        self.registry.lock(|registry| registry.borrow().sensors.len())
    }

    pub fn is_closed(&self) -> bool {
        self.registry.lock(|registry| registry.borrow().closed)
    }

    /// Complete the stream and release the sensor hardware.
    ///
    /// Subscribers drain any readings still queued and then end. Release
    /// failures are logged and do not stop the remaining steps. Calling this
    /// again does nothing.
    pub fn close(&self) {
        let first_close = self.registry.lock(|registry| {
            let mut registry = registry.borrow_mut();
            if registry.closed {
                return false;
            }
            registry.closed = true;
            registry.sensors.clear();
            self.channel
                .immediate_publisher()
                .publish_immediate(SourceEvent::Closed);
            true
        });

        if !first_close {
            debug!("Reading source already closed");
            return;
        }

        // Released outside the lock so driver callbacks into the source cannot deadlock
        let Some(mut driver) = self.driver.lock(|driver| driver.borrow_mut().take()) else {
            info!("Reading source closed");
            return;
        };

        if let Err(e) = driver.unregister_pressure_sensor() {
            error!("Unable to unregister pressure sensor: {:?}", e);
        }
        if let Err(e) = driver.unregister_temperature_sensor() {
            error!("Unable to unregister temperature sensor: {:?}", e);
        }
        if let Err(e) = driver.close() {
            error!("Unable to close sensor driver: {:?}", e);
        }

        info!("Reading source closed");
    }
}

/// Handle delivering readings to one consumer.
pub struct ReadingSubscriber<'a, M: RawMutex> {
    inner: Subscriber<
        'a,
        M,
        SourceEvent,
        READING_CHANNEL_CAPACITY,
        READING_SUBSCRIBERS,
        READING_PUBLISHERS,
    >,
    finished: bool,
}

impl<M: RawMutex> ReadingSubscriber<'_, M> {
    /// Wait for the next reading. `None` once the source has been closed.
    ///
    /// A subscriber that falls more than the channel capacity behind skips
    /// the overwritten readings and continues with the oldest one still queued.
    pub async fn next(&mut self) -> Option<Reading> {
        while !self.finished {
            match self.inner.next_message().await {
                WaitResult::Message(SourceEvent::Reading(reading)) => return Some(reading),
                WaitResult::Message(SourceEvent::Closed) => self.finished = true,
                WaitResult::Lagged(missed) => warn!("Reading subscriber lagged, {} readings skipped", missed),
            }
        }
        None
    }

    /// Non-blocking variant of [`next`](Self::next). `None` when nothing is queued
    /// or the source has been closed.
    pub fn try_next(&mut self) -> Option<Reading> {
        while !self.finished {
            match self.inner.try_next_message()? {
                WaitResult::Message(SourceEvent::Reading(reading)) => return Some(reading),
                WaitResult::Message(SourceEvent::Closed) => self.finished = true,
                WaitResult::Lagged(missed) => warn!("Reading subscriber lagged, {} readings skipped", missed),
            }
        }
        None
    }

    /// Whether the source has signalled completion to this subscriber.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
