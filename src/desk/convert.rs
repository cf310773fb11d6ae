//! Height unit conversion.
//!
//! The desk reports and stores heights as u16 tenths of a millimeter
//! counted from its lowest mechanical position ("raw"). Callers think in
//! millimeters from the floor; the calibrated offset (floor to lowest
//! position) bridges the two.

/// Upper clamp for raw heights. `0xFFFF` stays reserved as the memory-cell
/// "unset" sentinel, so the converter never produces it.
pub const RAW_HEIGHT_MAX: u16 = u16::MAX - 1;

/// Raw tenths-of-a-millimeter to millimeters.
pub fn mm_from_raw(raw: u16) -> f32 {
    raw as f32 / 10.0
}

/// Millimeters to raw tenths, clamped to `[0, RAW_HEIGHT_MAX]`.
pub fn raw_from_mm(mm: f32) -> u16 {
    let raw = mm * 10.0;
    if raw <= 0.0 {
        0
    } else if raw >= RAW_HEIGHT_MAX as f32 {
        RAW_HEIGHT_MAX
    } else {
        raw.round() as u16
    }
}

/// Floor-relative height in mm from the calibrated offset and a sensor
/// reading, both raw.
pub fn floor_mm(offset_raw: u16, sensor_raw: u16) -> f32 {
    mm_from_raw(offset_raw) + mm_from_raw(sensor_raw)
}

/// Translate a floor-relative target in mm into the raw table-relative
/// height the desk understands.
pub fn raw_from_floor_mm(offset_raw: u16, floor_mm: f32) -> u16 {
    raw_from_mm(floor_mm - mm_from_raw(offset_raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mm_from_raw() {
        assert_eq!(mm_from_raw(0), 0.0);
        assert_eq!(mm_from_raw(650), 65.0);
        assert_eq!(mm_from_raw(10500), 1050.0);
    }

    #[test]
    fn test_raw_from_mm_clamps() {
        assert_eq!(raw_from_mm(-10.0), 0);
        assert_eq!(raw_from_mm(0.0), 0);
        assert_eq!(raw_from_mm(999_999.0), RAW_HEIGHT_MAX);
        assert_eq!(raw_from_mm(6553.4), RAW_HEIGHT_MAX);
    }

    #[test]
    fn test_round_trip_within_one_tenth() {
        for raw in [0u16, 1, 9, 10, 650, 6500, 12345, 65000, RAW_HEIGHT_MAX] {
            let back = raw_from_mm(mm_from_raw(raw));
            assert!(
                back.abs_diff(raw) <= 1,
                "raw {} round-tripped to {}",
                raw,
                back
            );
        }
    }

    #[test]
    fn test_floor_relative() {
        // offset 70.0mm + sensor 5.0mm = 75.0mm above the floor
        assert_eq!(floor_mm(700, 50), 75.0);
        assert_eq!(raw_from_floor_mm(700, 75.0), 50);
        // targets below the mechanical minimum clamp to the bottom
        assert_eq!(raw_from_floor_mm(700, 50.0), 0);
    }
}
