//! Read-side views over the scan log used by the dashboard.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::identity::extract_identity;
use crate::types::{ScanEvent, ScanStatus};

/// A scan as shown in the attendance table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRow {
    /// Name taken from the payload, or the whole payload if it did not parse.
    pub name: String,
    pub roll_no: Option<String>,
    pub scan_time: String,
    pub status: ScanStatus,
}

impl From<&ScanEvent> for AttendanceRow {
    fn from(event: &ScanEvent) -> Self {
        Self {
            name: extract_identity(&event.payload).name,
            roll_no: event.roll_no.clone(),
            scan_time: event.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            status: event.status,
        }
    }
}

/// Count Present scans per calendar day (UTC), oldest day first.
pub fn daily_present_counts(events: &[ScanEvent]) -> BTreeMap<NaiveDate, usize> {
    let mut counts = BTreeMap::new();
    for event in events.iter().filter(|e| e.status == ScanStatus::Present) {
        *counts.entry(event.timestamp.date_naive()).or_insert(0) += 1;
    }
    counts
}

/// Order events for the export report: by roll number ascending, events
/// without a roll number last. Ties keep their original order.
pub fn sort_for_export(events: &mut [ScanEvent]) {
    events.sort_by(|a, b| match (&a.roll_no, &b.roll_no) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(id: i64, payload: &str, roll: Option<&str>, day: u32, status: ScanStatus) -> ScanEvent {
        ScanEvent {
            id,
            payload: payload.into(),
            roll_no: roll.map(str::to_string),
            timestamp: Utc.with_ymd_and_hms(2024, 3, day, 9, 30, 0).unwrap(),
            status,
        }
    }

    #[test]
    fn test_daily_counts_only_present() {
        let events = vec![
            event(1, "Alice - 101", Some("101"), 4, ScanStatus::Present),
            event(2, "Bob - 102", Some("102"), 4, ScanStatus::Present),
            event(3, "Eve - 999", Some("999"), 4, ScanStatus::Invalid),
            event(4, "Alice - 101", Some("101"), 5, ScanStatus::Present),
        ];
        let counts = daily_present_counts(&events);
        let days: Vec<_> = counts.iter().map(|(d, c)| (d.to_string(), *c)).collect();
        assert_eq!(
            days,
            vec![("2024-03-04".to_string(), 2), ("2024-03-05".to_string(), 1)]
        );
    }

    #[test]
    fn test_daily_counts_empty() {
        assert!(daily_present_counts(&[]).is_empty());
    }

    #[test]
    fn test_export_order() {
        let mut events = vec![
            event(1, "garbage", None, 1, ScanStatus::Invalid),
            event(2, "Bob - 205", Some("205"), 1, ScanStatus::Present),
            event(3, "Alice - 101", Some("101"), 1, ScanStatus::Present),
        ];
        sort_for_export(&mut events);
        let ids: Vec<_> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_row_uses_extracted_name() {
        let row = AttendanceRow::from(&event(1, "Alice - 101", Some("101"), 2, ScanStatus::Present));
        assert_eq!(row.name, "Alice");
        assert_eq!(row.scan_time, "2024-03-02 09:30:00");

        let row = AttendanceRow::from(&event(2, "garbage-text", None, 2, ScanStatus::Invalid));
        assert_eq!(row.name, "garbage-text");
        assert_eq!(row.roll_no, None);
    }

    #[test]
    fn test_row_name_matches_scanner_parse() {
        let row = AttendanceRow::from(&event(1, "A - 1 - 23", Some("23"), 2, ScanStatus::Invalid));
        assert_eq!(row.name, "A - 1");

        let row = AttendanceRow::from(&event(2, "Alice - 101\n", Some("101"), 2, ScanStatus::Present));
        assert_eq!(row.name, "Alice");
    }
}
