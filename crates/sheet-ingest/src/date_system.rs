use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 86_400;

// Day numbers (counted from 0001-01-01 = 1) of 1899-12-31, 1900-03-01 and 1904-01-01.
const EPOCH_1900_CE: i64 = 693_595;
const LEAP_BUG_CUTOVER_CE: i64 = 693_655;
const EPOCH_1904_CE: i64 = 695_056;

/// Excel workbook date system used to interpret serial date values.
///
/// - `Excel1900` (default on Windows; includes the Lotus 1-2-3 leap year bug)
/// - `Excel1904` (default on older Mac versions)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateSystem {
    #[default]
    #[serde(rename = "excel1900")]
    Excel1900,
    #[serde(rename = "excel1904")]
    Excel1904,
}

impl DateSystem {
    /// Convert a serial date/time into a calendar timestamp.
    ///
    /// Returns `None` for negative or non-finite serials, for values past the
    /// range chrono can represent, and for the fictitious 1900-02-29 (serial 60
    /// in the 1900 system).
    pub fn serial_to_datetime(self, serial: f64) -> Option<NaiveDateTime> {
        if !serial.is_finite() || serial < 0.0 {
            return None;
        }

        let mut days = serial.floor() as i64;
        let frac = serial - days as f64;
        let mut seconds = (frac * SECONDS_PER_DAY as f64).round() as i64;
        if seconds >= SECONDS_PER_DAY {
            seconds = 0;
            days = days.checked_add(1)?;
        }

        let date = match self {
            DateSystem::Excel1900 => {
                if days == 60 {
                    return None;
                }
                // Serials past the phantom leap day are shifted by one.
                let base = if days < 60 {
                    NaiveDate::from_ymd_opt(1899, 12, 31)?
                } else {
                    NaiveDate::from_ymd_opt(1899, 12, 30)?
                };
                base.checked_add_signed(Duration::try_days(days)?)?
            }
            DateSystem::Excel1904 => {
                NaiveDate::from_ymd_opt(1904, 1, 1)?.checked_add_signed(Duration::try_days(days)?)?
            }
        };

        date.and_hms_opt(0, 0, 0)?
            .checked_add_signed(Duration::try_seconds(seconds)?)
    }

    /// Convert a calendar timestamp into a serial date/time.
    pub fn datetime_to_serial(self, datetime: NaiveDateTime) -> f64 {
        let day = i64::from(datetime.date().num_days_from_ce());
        let days = match self {
            DateSystem::Excel1900 if day >= LEAP_BUG_CUTOVER_CE => day - EPOCH_1900_CE + 1,
            DateSystem::Excel1900 => day - EPOCH_1900_CE,
            DateSystem::Excel1904 => day - EPOCH_1904_CE,
        };
        let seconds = datetime.time().num_seconds_from_midnight();
        days as f64 + f64::from(seconds) / SECONDS_PER_DAY as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd_hms(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn excel_1900_serials_skip_the_phantom_leap_day() {
        let sys = DateSystem::Excel1900;
        assert_eq!(sys.serial_to_datetime(1.0), Some(ymd_hms(1900, 1, 1, 0, 0, 0)));
        assert_eq!(sys.serial_to_datetime(59.0), Some(ymd_hms(1900, 2, 28, 0, 0, 0)));
        assert_eq!(sys.serial_to_datetime(60.0), None);
        assert_eq!(sys.serial_to_datetime(61.0), Some(ymd_hms(1900, 3, 1, 0, 0, 0)));
        assert_eq!(sys.serial_to_datetime(45292.0), Some(ymd_hms(2024, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn fractional_serials_carry_the_time_of_day() {
        let sys = DateSystem::Excel1900;
        assert_eq!(
            sys.serial_to_datetime(45292.75),
            Some(ymd_hms(2024, 1, 1, 18, 0, 0))
        );
        // Rounding up to a full day rolls over to midnight of the next day.
        assert_eq!(
            sys.serial_to_datetime(45292.999_999_9),
            Some(ymd_hms(2024, 1, 2, 0, 0, 0))
        );
    }

    #[test]
    fn excel_1904_serials_start_in_1904() {
        let sys = DateSystem::Excel1904;
        assert_eq!(sys.serial_to_datetime(0.0), Some(ymd_hms(1904, 1, 1, 0, 0, 0)));
        assert_eq!(sys.serial_to_datetime(43830.0), Some(ymd_hms(2024, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn invalid_serials_are_rejected() {
        assert_eq!(DateSystem::Excel1900.serial_to_datetime(-1.0), None);
        assert_eq!(DateSystem::Excel1900.serial_to_datetime(f64::NAN), None);
        assert_eq!(DateSystem::Excel1900.serial_to_datetime(f64::INFINITY), None);
    }

    #[test]
    fn serials_round_trip_through_datetimes() {
        for sys in [DateSystem::Excel1900, DateSystem::Excel1904] {
            let dt = ymd_hms(2023, 7, 14, 6, 30, 0);
            let serial = sys.datetime_to_serial(dt);
            assert_eq!(sys.serial_to_datetime(serial), Some(dt));
        }
    }
}
