//! Dashboard state and the operations behind each command.
//!
//! Everything goes through the shared database; the dashboard holds no
//! other state.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rollcall_core::anomaly::{scan_features, train_anomaly_detector};
use rollcall_core::report::{daily_present_counts, sort_for_export, AttendanceRow};
use rollcall_core::{EnrollmentRecord, ScanEvent};
use rollcall_store::Database;
use std::path::{Path, PathBuf};

const TREND_BAR_WIDTH: usize = 40;

pub struct Dashboard {
    db: Database,
}

/// What `export` did.
#[derive(Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Nothing to export; no file written.
    Empty,
    Written { path: PathBuf, records: usize },
}

/// Result of fitting the anomaly model over the scan history.
pub enum AnomalyReport {
    InsufficientData { present: usize },
    Trained {
        events: usize,
        threshold: f64,
        flagged: Vec<(ScanEvent, f64)>,
    },
}

impl Dashboard {
    pub fn open(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)
            .with_context(|| format!("failed to open database {}", db_path.display()))?;
        Ok(Self { db })
    }

    pub fn db_path(&self) -> &Path {
        self.db.path()
    }

    /// Attendance table rows, newest scan first.
    pub fn rows(&self) -> Result<Vec<AttendanceRow>> {
        Ok(self.db.list_scans()?.iter().map(AttendanceRow::from).collect())
    }

    pub fn clear(&self) -> Result<usize> {
        Ok(self.db.clear_scans()?)
    }

    /// Write every scan as a JSON array sorted by roll number.
    pub fn export(&self, path: &Path) -> Result<ExportOutcome> {
        let mut events = self.db.list_scans()?;
        if events.is_empty() {
            return Ok(ExportOutcome::Empty);
        }
        sort_for_export(&mut events);

        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &events)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), records = events.len(), "attendance exported");

        Ok(ExportOutcome::Written {
            path: path.to_path_buf(),
            records: events.len(),
        })
    }

    /// Present scans per day, oldest first.
    pub fn trends(&self) -> Result<Vec<(NaiveDate, usize)>> {
        let events = self.db.present_scans()?;
        Ok(daily_present_counts(&events).into_iter().collect())
    }

    pub fn anomalies(&self) -> Result<AnomalyReport> {
        let history = self.db.present_scans()?;
        let Some(model) = train_anomaly_detector(&history) else {
            return Ok(AnomalyReport::InsufficientData {
                present: history.len(),
            });
        };

        let events = history.len();
        let flagged = history
            .into_iter()
            .filter_map(|event| {
                let features = scan_features(&event.payload, event.timestamp);
                model
                    .is_outlier(&features)
                    .then(|| {
                        let score = model.score(&features);
                        (event, score)
                    })
            })
            .collect();

        Ok(AnomalyReport::Trained {
            events,
            threshold: model.threshold(),
            flagged,
        })
    }

    pub fn enroll(&self, name: &str, roll_no: &str) -> Result<EnrollmentRecord> {
        Ok(self.db.enroll(name, roll_no)?)
    }

    pub fn enrollments(&self) -> Result<Vec<EnrollmentRecord>> {
        Ok(self.db.enrollments()?)
    }
}

/// Text bar chart, one line per day, bars scaled to the busiest day.
pub fn render_trends(days: &[(NaiveDate, usize)]) -> String {
    let max = days.iter().map(|(_, n)| *n).max().unwrap_or(0);
    let mut out = String::new();
    for (day, count) in days {
        let width = if max == 0 {
            0
        } else {
            (count * TREND_BAR_WIDTH).div_ceil(max)
        };
        out.push_str(&format!("{day} | {} {count}\n", "#".repeat(width)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::ScanStatus;

    fn dashboard() -> (tempfile::TempDir, Dashboard) {
        let dir = tempfile::tempdir().unwrap();
        let dash = Dashboard::open(&dir.path().join("attendance.db")).unwrap();
        (dir, dash)
    }

    #[test]
    fn test_rows_show_names() {
        let (_dir, dash) = dashboard();
        dash.db.log_scan("Alice - 101", Some("101"), ScanStatus::Present).unwrap();
        dash.db.log_scan("garbage-text", None, ScanStatus::Invalid).unwrap();

        let rows = dash.rows().unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["garbage-text", "Alice"]);
    }

    #[test]
    fn test_export_empty_writes_nothing() {
        let (dir, dash) = dashboard();
        let path = dir.path().join("report.json");
        assert_eq!(dash.export(&path).unwrap(), ExportOutcome::Empty);
        assert!(!path.exists());
    }

    #[test]
    fn test_export_sorted_by_roll_number() {
        let (dir, dash) = dashboard();
        dash.db.log_scan("Bob - 205", Some("205"), ScanStatus::Invalid).unwrap();
        dash.db.log_scan("garbage", None, ScanStatus::Invalid).unwrap();
        dash.db.log_scan("Alice - 101", Some("101"), ScanStatus::Present).unwrap();

        let path = dir.path().join("report.json");
        let outcome = dash.export(&path).unwrap();
        assert_eq!(
            outcome,
            ExportOutcome::Written {
                path: path.clone(),
                records: 3
            }
        );

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let rolls: Vec<_> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["roll_no"].clone())
            .collect();
        assert_eq!(
            rolls,
            vec![
                serde_json::json!("101"),
                serde_json::json!("205"),
                serde_json::Value::Null
            ]
        );
        assert_eq!(json[0]["status"], "Present");
    }

    #[test]
    fn test_clear() {
        let (_dir, dash) = dashboard();
        dash.db.log_scan("Alice - 101", Some("101"), ScanStatus::Present).unwrap();
        assert_eq!(dash.clear().unwrap(), 1);
        assert!(dash.rows().unwrap().is_empty());
    }

    #[test]
    fn test_anomalies_need_history() {
        let (_dir, dash) = dashboard();
        for _ in 0..5 {
            dash.db.log_scan("Alice - 101", Some("101"), ScanStatus::Present).unwrap();
        }
        assert!(matches!(
            dash.anomalies().unwrap(),
            AnomalyReport::InsufficientData { present: 5 }
        ));

        dash.db.log_scan("Alice - 101", Some("101"), ScanStatus::Present).unwrap();
        match dash.anomalies().unwrap() {
            AnomalyReport::Trained { events, flagged, .. } => {
                assert_eq!(events, 6);
                assert!(flagged.len() <= 1);
            }
            AnomalyReport::InsufficientData { .. } => panic!("expected a trained model"),
        }
    }

    #[test]
    fn test_render_trends() {
        let d1 = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let text = render_trends(&[(d1, 4), (d2, 2)]);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], format!("2024-03-04 | {} 4", "#".repeat(40)));
        assert_eq!(lines[1], format!("2024-03-05 | {} 2", "#".repeat(20)));
    }
}
