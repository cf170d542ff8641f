//! Display panel: the single writer to the alphanumeric display.
//!
//! The panel owns the display driver behind a blocking mutex. Rendering,
//! muting and closing take the same lock, so once [`DisplayPanel::mute`] or
//! [`DisplayPanel::close`] has returned no further text reaches the hardware.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use log::{debug, error, info, trace};

use crate::hal::{AlphanumericDisplay, RenderSink};

struct PanelState<V> {
    display: Option<V>,
    /// Text is refused but the driver is still held
    muted: bool,
    closed: bool,
}

pub struct DisplayPanel<M: RawMutex, V: AlphanumericDisplay> {
    state: Mutex<M, RefCell<PanelState<V>>>,
}

impl<M: RawMutex, V: AlphanumericDisplay> DisplayPanel<M, V> {
    /// `None` means the display could not be opened; renders are then dropped.
    pub fn new(display: Option<V>) -> Self {
        if display.is_none() {
            error!("Alphanumeric display unavailable, output will not be shown");
        }

        Self {
            state: Mutex::new(RefCell::new(PanelState {
                display,
                muted: false,
                closed: false,
            })),
        }
    }

    /// Switch the display on at `brightness` and blank it.
    pub fn init(&self, brightness: f32) {
        self.with_display(|display| {
            if let Err(e) = display.set_brightness(brightness) {
                error!("Unable to set display brightness: {:?}", e);
            }
            if let Err(e) = display.set_enabled(true) {
                error!("Unable to enable display: {:?}", e);
            }
            if let Err(e) = display.clear() {
                error!("Unable to clear display: {:?}", e);
            }
        });
    }

    /// Refuse all further text without releasing the driver.
    pub fn mute(&self) {
        self.state.lock(|state| state.borrow_mut().muted = true);
    }

    /// Release the display. Later renders are dropped. Idempotent.
    pub fn close(&self) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.closed {
                debug!("Display already closed");
                return;
            }
            state.closed = true;
            state.muted = true;

            if let Some(mut display) = state.display.take() {
                if let Err(e) = display.close() {
                    error!("Unable to close display: {:?}", e);
                }
                info!("Display closed");
            }
        });
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock(|state| state.borrow().closed)
    }

    fn with_display(&self, f: impl FnOnce(&mut V)) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.muted {
                return;
            }
            if let Some(display) = state.display.as_mut() {
                f(display);
            }
        });
    }
}

impl<M: RawMutex, V: AlphanumericDisplay> RenderSink for DisplayPanel<M, V> {
    fn render(&self, text: &str) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.muted {
                debug!("Display stopped, dropping \"{}\"", text);
                return;
            }
            let Some(display) = state.display.as_mut() else {
                trace!("No display, dropping \"{}\"", text);
                return;
            };

            if let Err(e) = display.display(text) {
                error!("Unable to display \"{}\": {:?}", text, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::{DisplayCall, MockDisplay};
    use alloc::string::ToString;
    use alloc::vec;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    type Panel = DisplayPanel<CriticalSectionRawMutex, MockDisplay>;

    #[test]
    fn test_init_then_render() {
        let display = MockDisplay::default();
        let calls = display.calls();
        let panel = Panel::new(Some(display));

        panel.init(1.0);
        panel.render("22.5C");

        assert_eq!(
            calls.take(),
            vec![
                DisplayCall::Brightness(1.0),
                DisplayCall::Enabled(true),
                DisplayCall::Clear,
                DisplayCall::Text("22.5C".to_string()),
            ]
        );
    }

    #[test]
    fn test_no_render_after_close() {
        let display = MockDisplay::default();
        let calls = display.calls();
        let panel = Panel::new(Some(display));

        panel.close();
        panel.close();
        panel.render("100P");

        assert_eq!(calls.take(), vec![DisplayCall::Close]);
        assert!(panel.is_closed());
    }

    #[test]
    fn test_muted_panel_refuses_text_but_still_closes() {
        let display = MockDisplay::default();
        let calls = display.calls();
        let panel = Panel::new(Some(display));

        panel.render("22.5C");
        panel.mute();
        panel.render("72.5F");
        panel.init(1.0);
        panel.close();

        assert_eq!(
            calls.take(),
            vec![DisplayCall::Text("22.5C".to_string()), DisplayCall::Close]
        );
    }

    #[test]
    fn test_driver_errors_are_not_fatal() {
        let display = MockDisplay::failing();
        let calls = display.calls();
        let panel = Panel::new(Some(display));

        panel.init(0.5);
        panel.render("0.99A");
        panel.render("0.99A");
        panel.close();

        assert_eq!(calls.borrow().len(), 6);
    }

    #[test]
    fn test_missing_display_is_tolerated() {
        let panel = Panel::new(None);
        panel.init(1.0);
        panel.render("20.0C");
        panel.close();
        assert!(panel.is_closed());
    }
}
