//! Unit conversion and display text rendering.
//!
//! Everything in here is pure: the same reading, unit and capacity always
//! produce the same text.

use core::fmt::Write;

use heapless::String;

use crate::reading::{Reading, ReadingKind};
use crate::state::UnitPreference;

/// Largest display the renderer supports, in characters
pub const MAX_DISPLAY_CHARS: usize = 16;

/// Smallest usable display: one value character plus the unit suffix
pub const MIN_DISPLAY_CHARS: usize = 2;

/// Standard atmosphere in hPa
const STANDARD_ATMOSPHERE_HPA: f32 = 1013.25;

/// Text ready to be written to the alphanumeric display.
pub type DisplayString = String<MAX_DISPLAY_CHARS>;

/// A value expressed in the unit chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Converted {
    pub value: f32,
    pub suffix: char,
}

/// Convert a raw sensor value into the preferred unit system.
///
/// | kind        | primary          | alternate              |
/// |-------------|------------------|------------------------|
/// | Temperature | °C, `C`          | °F, `F`                |
/// | Pressure    | hPa / 10, `P`    | atmospheres, `A`       |
pub fn convert(kind: ReadingKind, value: f32, unit: UnitPreference) -> Converted {
    let (value, suffix) = match (kind, unit) {
        (ReadingKind::Temperature, UnitPreference::Primary) => (value, 'C'),
        (ReadingKind::Temperature, UnitPreference::Alternate) => (value * 9.0 / 5.0 + 32.0, 'F'),
        (ReadingKind::Pressure, UnitPreference::Primary) => (value / 10.0, 'P'),
        (ReadingKind::Pressure, UnitPreference::Alternate) => (value / STANDARD_ATMOSPHERE_HPA, 'A'),
        (ReadingKind::Unknown, _) => (0.0, 'U'),
    };

    Converted { value, suffix }
}

/// Render `reading` for a display that fits `capacity` characters.
///
/// The last character is the unit suffix. The value gets the rest, with as
/// many rounded decimals as fit. Values that cannot fit even without decimals
/// are shown as dashes.
pub fn display_string(reading: &Reading, unit: UnitPreference, capacity: usize) -> DisplayString {
    let capacity = capacity.clamp(MIN_DISPLAY_CHARS, MAX_DISPLAY_CHARS);
    let converted = convert(reading.kind(), reading.value(), unit);

    let mut text = DisplayString::new();
    write_value(&mut text, converted.value, capacity - 1);
    // Capacity was clamped so the suffix always has room
    let _ = text.push(converted.suffix);
    text
}

fn write_value(out: &mut DisplayString, value: f32, width: usize) {
    if value.is_finite() {
        // "d.dd" needs two characters besides the decimals
        let mut decimals = width.saturating_sub(2);
        loop {
            let mut field = DisplayString::new();
            if write!(field, "{:.*}", decimals, value).is_ok() && field.len() <= width {
                let _ = out.push_str(&field);
                return;
            }
            if decimals == 0 {
                break;
            }
            decimals -= 1;
        }
    }

    for _ in 0..width {
        let _ = out.push('-');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_convert_table() {
        let c = convert(ReadingKind::Temperature, 20.0, UnitPreference::Primary);
        assert!(approx(c.value, 20.0));
        assert_eq!(c.suffix, 'C');

        let f = convert(ReadingKind::Temperature, 20.0, UnitPreference::Alternate);
        assert!(approx(f.value, 68.0));
        assert_eq!(f.suffix, 'F');

        let p = convert(ReadingKind::Pressure, 1013.25, UnitPreference::Primary);
        assert!(approx(p.value, 101.325));
        assert_eq!(p.suffix, 'P');

        let a = convert(ReadingKind::Pressure, 1013.25, UnitPreference::Alternate);
        assert!(approx(a.value, 1.0));
        assert_eq!(a.suffix, 'A');
    }

    #[test]
    fn test_display_strings_for_five_characters() {
        let cases = [
            (Reading::temperature(22.5), UnitPreference::Primary, "22.5C"),
            (Reading::temperature(20.0), UnitPreference::Primary, "20.0C"),
            (Reading::temperature(20.0), UnitPreference::Alternate, "68.0F"),
            (Reading::temperature(-40.0), UnitPreference::Alternate, "-40F"),
            (Reading::pressure(1000.0), UnitPreference::Primary, "100P"),
            (Reading::pressure(1000.0), UnitPreference::Alternate, "0.99A"),
            (Reading::pressure(1013.25), UnitPreference::Alternate, "1.00A"),
        ];

        for (reading, unit, expected) in cases {
            assert_eq!(
                display_string(&reading, unit, 5).as_str(),
                expected,
                "{:?} in {:?}",
                reading,
                unit
            );
        }
    }

    #[test]
    fn test_wider_display_keeps_more_decimals() {
        let text = display_string(&Reading::pressure(1013.25), UnitPreference::Primary, 8);
        assert_eq!(text.as_str(), "101.325P");
    }

    #[test]
    fn test_overflow_renders_dashes() {
        let text = display_string(&Reading::temperature(12345.0), UnitPreference::Primary, 5);
        assert_eq!(text.as_str(), "----C");
    }

    #[test]
    fn test_capacity_is_clamped() {
        let tiny = display_string(&Reading::temperature(7.0), UnitPreference::Primary, 0);
        assert_eq!(tiny.as_str(), "7C");

        let huge = display_string(&Reading::temperature(7.0), UnitPreference::Primary, 100);
        assert!(huge.len() <= MAX_DISPLAY_CHARS);
    }

    #[test]
    fn test_same_input_same_output() {
        let reading = Reading::pressure(987.654);
        let first = display_string(&reading, UnitPreference::Alternate, 6);
        let second = display_string(&reading, UnitPreference::Alternate, 6);
        assert_eq!(first, second);
    }
}
