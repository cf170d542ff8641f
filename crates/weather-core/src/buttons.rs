//! The two front-panel buttons.
//!
//! Button drivers deliver presses as key events: the selection button sends
//! `Space`, the unit button sends `Enter`.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use log::{error, info, warn};

use crate::hal::ButtonDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    /// Switches between temperature and pressure
    Selection,
    /// Switches between primary and alternate units
    Unit,
}

impl Button {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Selection => "reading toggle",
            Self::Unit => "unit toggle",
        }
    }

    pub const fn key_code(self) -> KeyCode {
        match self {
            Self::Selection => KeyCode::Space,
            Self::Unit => KeyCode::Enter,
        }
    }

    pub const fn from_key(key: KeyCode) -> Option<Self> {
        match key {
            KeyCode::Space => Some(Self::Selection),
            KeyCode::Enter => Some(Self::Unit),
            KeyCode::Other(_) => None,
        }
    }
}

/// Key events produced by the button drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Space,
    Enter,
    Other(u16),
}

/// Lifecycle of both button drivers.
pub struct ButtonInputs<M: RawMutex, B: ButtonDriver> {
    selection: Mutex<M, RefCell<Option<B>>>,
    unit: Mutex<M, RefCell<Option<B>>>,
}

impl<M: RawMutex, B: ButtonDriver> ButtonInputs<M, B> {
    /// A `None` driver is a button that failed to open and never reports presses.
    pub fn new(selection: Option<B>, unit: Option<B>) -> Self {
        for (button, driver) in [(Button::Selection, &selection), (Button::Unit, &unit)] {
            if driver.is_none() {
                warn!("{} button unavailable", button.label());
            }
        }

        Self {
            selection: Mutex::new(RefCell::new(selection)),
            unit: Mutex::new(RefCell::new(unit)),
        }
    }

    fn slot(&self, button: Button) -> &Mutex<M, RefCell<Option<B>>> {
        match button {
            Button::Selection => &self.selection,
            Button::Unit => &self.unit,
        }
    }

    /// Start delivering key events from both buttons.
    pub fn register(&self) {
        for button in [Button::Selection, Button::Unit] {
            self.slot(button).lock(|driver| {
                if let Some(driver) = driver.borrow_mut().as_mut() {
                    match driver.register() {
                        Ok(()) => info!("Registered {} button", button.label()),
                        Err(e) => error!("Unable to register {} button: {:?}", button.label(), e),
                    }
                }
            });
        }
    }

    /// Unregister and close both buttons. Every step runs even if an earlier one fails.
    pub fn close(&self) {
        for button in [Button::Selection, Button::Unit] {
            let Some(mut driver) = self.slot(button).lock(|driver| driver.borrow_mut().take()) else {
                continue;
            };

            if let Err(e) = driver.unregister() {
                error!("Unable to unregister {} button: {:?}", button.label(), e);
            }
            if let Err(e) = driver.close() {
                error!("Unable to close {} button: {:?}", button.label(), e);
            }
        }
    }
}
