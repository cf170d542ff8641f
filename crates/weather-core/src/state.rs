//! Replaying state cells for the user's selections.
//!
//! Each cell holds exactly one current value. New observers see the current
//! value on their first wait and every later change after that, the same way
//! an `embassy_sync::watch::Watch` behaves, which is what the cell is built on.

use core::cell::Cell;
use core::fmt::Debug;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::watch::{Receiver, Watch};
use log::debug;
use thiserror_no_std::Error;

use crate::reading::{Reading, ReadingKind};

/// Number of observers each state cell can serve at once
/// - Observer 0: fusion pipeline
/// - Observer 1: spare for diagnostics/tests
pub const STATE_OBSERVERS: usize = 2;

/// The quantity the user wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    Temperature,
    Pressure,
}

impl Selection {
    pub const fn kind(self) -> ReadingKind {
        match self {
            Self::Temperature => ReadingKind::Temperature,
            Self::Pressure => ReadingKind::Pressure,
        }
    }

    /// Whether `reading` is of the selected quantity.
    pub fn matches(self, reading: &Reading) -> bool {
        reading.kind() == self.kind()
    }
}

/// Which unit system readings are shown in.
///
/// Primary is °C and hPa/10, alternate is °F and atmospheres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitPreference {
    #[default]
    Primary,
    Alternate,
}

impl UnitPreference {
    pub const fn is_primary(self) -> bool {
        matches!(self, Self::Primary)
    }
}

impl From<bool> for UnitPreference {
    fn from(primary: bool) -> Self {
        if primary {
            Self::Primary
        } else {
            Self::Alternate
        }
    }
}

impl From<UnitPreference> for bool {
    fn from(value: UnitPreference) -> Self {
        value.is_primary()
    }
}

/// Values a button press flips between.
pub trait Toggle: Copy {
    fn toggled(self) -> Self;
}

impl Toggle for Selection {
    fn toggled(self) -> Self {
        match self {
            Self::Temperature => Self::Pressure,
            Self::Pressure => Self::Temperature,
        }
    }
}

impl Toggle for UnitPreference {
    fn toggled(self) -> Self {
        match self {
            Self::Primary => Self::Alternate,
            Self::Alternate => Self::Primary,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("All state observer slots are taken")]
    TooManyObservers,
}

pub type StateReceiver<'a, M, T> = Receiver<'a, M, T, STATE_OBSERVERS>;

/// Single-value cell with change notification.
///
/// Writes are serialised through a blocking mutex: the stored value and the
/// notification are updated inside the same critical section, so readers
/// never observe a half-applied write and notifications arrive in write order.
pub struct StateCell<M: RawMutex, T: Copy> {
    value: Mutex<M, Cell<T>>,
    watch: Watch<M, T, STATE_OBSERVERS>,
}

impl<M: RawMutex, T: Copy + Debug> StateCell<M, T> {
    /// Create a cell already holding `initial`.
    pub fn new(initial: T) -> Self {
        let cell = Self {
            value: Mutex::new(Cell::new(initial)),
            watch: Watch::new(),
        };
        cell.watch.sender().send(initial);
        cell
    }

    /// The most recently stored value.
    pub fn current(&self) -> T {
        self.value.lock(|value| value.get())
    }

    /// Store `value` and notify every observer.
    pub fn set(&self, value: T) {
        self.update(|_| value);
    }

    /// Atomically replace the value with `f(current)`, returning the new value.
    pub fn update(&self, f: impl FnOnce(T) -> T) -> T {
        self.value.lock(|value| {
            let next = f(value.get());
            value.set(next);
            self.watch.sender().send(next);
            debug!("State changed to {:?}", next);
            next
        })
    }

    /// Observe the cell. The first `changed()` on the receiver yields the current value.
    pub fn subscribe(&self) -> Result<StateReceiver<'_, M, T>, StateError> {
        self.watch.receiver().ok_or(StateError::TooManyObservers)
    }
}

impl<M: RawMutex, T: Toggle + Debug> StateCell<M, T> {
    /// Flip the value, as a button press does.
    pub fn toggle(&self) -> T {
        self.update(T::toggled)
    }
}

pub type SelectionState<M> = StateCell<M, Selection>;
pub type UnitState<M> = StateCell<M, UnitPreference>;
