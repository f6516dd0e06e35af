use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// 频道直播时段
///
/// `start_hour..end_hour` 为本地时间（UTC + `utc_offset_hours`），结束小时不含。
/// `start_hour > end_hour` 表示跨零点，`start_hour == end_hour` 表示全天。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSchedule {
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,

    #[serde(default = "default_end_hour")]
    pub end_hour: u32,

    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
}

fn default_start_hour() -> u32 {
    6
}

fn default_end_hour() -> u32 {
    22
}

fn default_utc_offset() -> i32 {
    7
}

impl Default for LiveSchedule {
    fn default() -> Self {
        Self {
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
            utc_offset_hours: default_utc_offset(),
        }
    }
}

impl LiveSchedule {
    pub fn new(start_hour: u32, end_hour: u32, utc_offset_hours: i32) -> Self {
        Self {
            start_hour,
            end_hour,
            utc_offset_hours,
        }
    }

    /// UTC 小时换算为本地小时
    pub fn local_hour(&self, utc_hour: u32) -> u32 {
        (utc_hour as i32 + self.utc_offset_hours).rem_euclid(24) as u32
    }

    /// 本地小时是否在直播时段内
    pub fn contains_local(&self, local_hour: u32) -> bool {
        match self.start_hour.cmp(&self.end_hour) {
            std::cmp::Ordering::Less => local_hour >= self.start_hour && local_hour < self.end_hour,
            std::cmp::Ordering::Greater => local_hour >= self.start_hour || local_hour < self.end_hour,
            std::cmp::Ordering::Equal => true,
        }
    }

    pub fn contains_utc_hour(&self, utc_hour: u32) -> bool {
        self.contains_local(self.local_hour(utc_hour))
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.contains_utc_hour(now.hour())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.start_hour > 23 || self.end_hour > 23 {
            return Err(format!(
                "live window {}..{} is not within a day",
                self.start_hour, self.end_hour
            ));
        }
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(format!("utc offset {} out of range", self.utc_offset_hours));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_local_hour_wraps() {
        let schedule = LiveSchedule::default();
        assert_eq!(schedule.local_hour(0), 7);
        assert_eq!(schedule.local_hour(20), 3);

        let west = LiveSchedule::new(6, 22, -5);
        assert_eq!(west.local_hour(2), 21);
    }

    #[test]
    fn test_default_window() {
        let schedule = LiveSchedule::default();
        // 05 UTC = 12 本地
        assert!(schedule.contains_utc_hour(5));
        // 15 UTC = 22 本地，结束小时不含
        assert!(!schedule.contains_utc_hour(15));
        // 23 UTC = 06 本地
        assert!(schedule.contains_utc_hour(23));
        assert!(!schedule.contains_utc_hour(20));
    }

    #[test]
    fn test_overnight_window() {
        let schedule = LiveSchedule::new(22, 2, 0);
        assert!(schedule.contains_local(23));
        assert!(schedule.contains_local(1));
        assert!(!schedule.contains_local(2));
        assert!(!schedule.contains_local(12));
    }

    #[test]
    fn test_full_day_window() {
        let schedule = LiveSchedule::new(0, 0, 0);
        assert!((0..24).all(|h| schedule.contains_local(h)));
    }

    #[test]
    fn test_is_live_at() {
        let schedule = LiveSchedule::default();
        let noon_local = Utc.with_ymd_and_hms(2024, 1, 2, 5, 30, 0).unwrap();
        let night_local = Utc.with_ymd_and_hms(2024, 1, 2, 18, 0, 0).unwrap();
        assert!(schedule.is_live_at(noon_local));
        assert!(!schedule.is_live_at(night_local));
    }

    #[test]
    fn test_validate() {
        assert!(LiveSchedule::default().validate().is_ok());
        assert!(LiveSchedule::new(25, 3, 0).validate().is_err());
        assert!(LiveSchedule::new(6, 22, 20).validate().is_err());
    }
}
