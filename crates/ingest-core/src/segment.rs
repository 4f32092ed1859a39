use std::fmt;
use std::sync::LazyLock;

use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::manifest::ParseError;

/// Digits immediately preceding the `.ts` extension.
static SEGMENT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.ts").expect("valid segment id regex"));

/// `media_<year>-<month>-<day>_<id>.ts`, unpadded.
static LOCAL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^media_(\d{1,4})-(\d{1,2})-(\d{1,2})_(\d+)\.ts$").expect("valid local name regex")
});

/// Stable on-disk name of a segment, e.g. `media_2024-3-5_1001.ts`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalSegmentName(String);

impl LocalSegmentName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Acquisition date and numeric id, if `name` has the local naming shape.
    pub fn parse_key(name: &str) -> Option<(NaiveDate, u64)> {
        let caps = LOCAL_NAME.captures(name)?;
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        let id = caps[4].parse().ok()?;
        Some((NaiveDate::from_ymd_opt(year, month, day)?, id))
    }
}

impl fmt::Display for LocalSegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LocalSegmentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Numeric sequence id of a remote segment, e.g. `media_w158319480_25373.ts` -> 25373.
pub fn extract_media_id(segment: &str) -> Result<u64, ParseError> {
    let malformed = || ParseError::MalformedSegmentId {
        segment: segment.to_string(),
    };
    let caps = SEGMENT_ID.captures(segment).ok_or_else(malformed)?;
    caps[1].parse().map_err(|_| malformed())
}

/// Local name for `segment` acquired on `date`.
///
/// Deterministic: the same remote id on the same calendar day always maps to
/// the same name, which is what makes the file system usable for dedup.
pub fn resolve(segment: &str, date: NaiveDate) -> Result<LocalSegmentName, ParseError> {
    let id = extract_media_id(segment)?;
    Ok(LocalSegmentName(format!(
        "media_{}-{}-{}_{}.ts",
        date.year(),
        date.month(),
        date.day(),
        id
    )))
}

/// Source of the acquisition date.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local calendar date of the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn extracts_sequential_suffix() {
        assert_eq!(extract_media_id("media_w158319480_25373.ts").unwrap(), 25373);
        assert_eq!(extract_media_id("media_w1_0042.ts").unwrap(), 42);
    }

    #[test]
    fn resolve_formats_unpadded_date() {
        let name = resolve("media_w1_1001.ts", date(2024, 3, 5)).unwrap();
        assert_eq!(name.as_str(), "media_2024-3-5_1001.ts");
    }

    #[test]
    fn resolve_is_deterministic() {
        let d = date(2024, 11, 23);
        assert_eq!(
            resolve("media_w9_77.ts", d).unwrap(),
            resolve("media_w9_77.ts", d).unwrap()
        );
    }

    #[test]
    fn random_prefix_does_not_affect_name() {
        let d = date(2024, 3, 5);
        assert_eq!(
            resolve("media_w111_500.ts", d).unwrap(),
            resolve("media_w222_500.ts", d).unwrap()
        );
    }

    #[test]
    fn distinct_ids_do_not_collide() {
        let d = date(2024, 3, 5);
        assert_ne!(
            resolve("media_w1_1001.ts", d).unwrap(),
            resolve("media_w1_1002.ts", d).unwrap()
        );
    }

    #[test]
    fn name_without_digits_is_malformed() {
        assert_eq!(
            resolve("media_badname.ts", date(2024, 3, 5)),
            Err(ParseError::MalformedSegmentId {
                segment: "media_badname.ts".into()
            })
        );
    }

    #[test]
    fn overflowing_id_is_malformed() {
        assert!(extract_media_id("media_w1_99999999999999999999999.ts").is_err());
    }

    #[test]
    fn parse_key_round_trips_resolved_names() {
        let name = resolve("media_w1_1001.ts", date(2024, 3, 5)).unwrap();
        assert_eq!(
            LocalSegmentName::parse_key(name.as_str()),
            Some((date(2024, 3, 5), 1001))
        );
        assert_eq!(LocalSegmentName::parse_key("media_2024-3-5_1001.ts.part"), None);
        assert_eq!(LocalSegmentName::parse_key("notes.txt"), None);
    }

    #[test]
    fn fixed_clock_reports_its_date() {
        assert_eq!(FixedClock(date(2024, 3, 5)).today(), date(2024, 3, 5));
    }
}
