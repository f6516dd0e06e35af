use crate::schedule::LiveSchedule;
use airwave_storage::ObjectMeta;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// 一小时的采集时间桶（UTC）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeBucket {
    pub channel: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

impl TimeBucket {
    pub fn new(channel: impl Into<String>, year: i32, month: u32, day: u32, hour: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)?;
        if hour > 23 {
            return None;
        }
        Some(Self {
            channel: channel.into(),
            year,
            month,
            day,
            hour,
        })
    }

    pub fn containing(channel: impl Into<String>, at: DateTime<Utc>) -> Self {
        use chrono::{Datelike, Timelike};
        Self {
            channel: channel.into(),
            year: at.year(),
            month: at.month(),
            day: at.day(),
            hour: at.hour(),
        }
    }

    /// 解析热存储分片键 `channel/YYYY/MM/DD/HH_MM_SS_micro_<stem>.<ext>`
    pub fn from_segment_key(key: &str) -> Option<Self> {
        let mut parts = key.split('/');
        let channel = parts.next()?;
        let year = parts.next()?.parse().ok()?;
        let month = parts.next()?.parse().ok()?;
        let day = parts.next()?.parse().ok()?;
        let filename = parts.next()?;
        if parts.next().is_some() || channel.is_empty() {
            return None;
        }

        let hour_part = filename.split('_').next()?;
        if hour_part.len() != 2 || !filename.contains('_') {
            return None;
        }
        let hour = hour_part.parse().ok()?;

        Self::new(channel, year, month, day, hour)
    }

    /// 解析归档键 `channel/YYYY/MM/DD/HH.tar.gz`
    pub fn from_archive_key(key: &str) -> Option<Self> {
        let stem = key.strip_suffix(".tar.gz")?;
        let mut parts = stem.split('/');
        let channel = parts.next()?;
        let year = parts.next()?.parse().ok()?;
        let month = parts.next()?.parse().ok()?;
        let day = parts.next()?.parse().ok()?;
        let hour = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Self::new(channel, year, month, day, hour)
    }

    /// 桶起始时间
    pub fn start(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(self.year, self.month, self.day, self.hour, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn id(&self) -> String {
        format!(
            "{}|{:04}|{:02}|{:02}|{:02}",
            self.channel, self.year, self.month, self.day, self.hour
        )
    }

    pub fn day_prefix(&self) -> String {
        format!("{}/{:04}/{:02}/{:02}", self.channel, self.year, self.month, self.day)
    }

    pub fn archive_key(&self) -> String {
        format!("{}/{:02}.tar.gz", self.day_prefix(), self.hour)
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// 分类参数
#[derive(Debug, Clone, Copy)]
pub struct ClassifyPolicy {
    pub schedule: LiveSchedule,

    /// 桶起始时间早于 `now - min_age` 才可压缩
    pub min_age: Duration,

    /// 超过 TTL 的对象作为垃圾删除
    pub ttl: Duration,
}

/// 热存储对象分类结果
#[derive(Debug, Default)]
pub struct Classification {
    /// 可压缩的桶及其分片键（有序）
    pub eligible: BTreeMap<TimeBucket, Vec<String>>,

    /// 待删除的对象键
    pub garbage: Vec<String>,

    /// 无法解析的键数量
    pub unparsed: usize,
}

/// 对频道的热存储对象分类
///
/// - 本地小时不在直播时段内：垃圾
/// - 时段内且桶已超过 `min_age`：可压缩
/// - 时段内且超过 TTL：同时也是垃圾
pub fn classify(
    channel: &str,
    objects: &[ObjectMeta],
    policy: &ClassifyPolicy,
    now: DateTime<Utc>,
) -> Classification {
    let mut result = Classification::default();

    for object in objects {
        let bucket = match TimeBucket::from_segment_key(&object.key) {
            Some(bucket) if bucket.channel == channel => bucket,
            _ => {
                warn!(channel = %channel, key = %object.key, "Skipping unrecognized key");
                result.unparsed += 1;
                continue;
            }
        };

        if !policy.schedule.contains_utc_hour(bucket.hour) {
            result.garbage.push(object.key.clone());
            continue;
        }

        let age = now - bucket.start();
        if age > policy.min_age {
            result
                .eligible
                .entry(bucket)
                .or_default()
                .push(object.key.clone());
        }
        if age > policy.ttl {
            result.garbage.push(object.key.clone());
        }
    }

    for keys in result.eligible.values_mut() {
        keys.sort();
    }

    debug!(
        channel = %channel,
        eligible = result.eligible.len(),
        garbage = result.garbage.len(),
        "Hot tier classified"
    );
    result
}
