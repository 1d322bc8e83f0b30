use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::identity::IdentityClaim;

/// Outcome assigned to a scan event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanStatus {
    /// The extracted (name, roll number) matched an enrollment exactly.
    Present,
    /// Unparsable payload or an identity that is not enrolled.
    Invalid,
}

impl ScanStatus {
    /// Classify a verification result.
    pub fn from_verified(verified: bool) -> Self {
        if verified {
            ScanStatus::Present
        } else {
            ScanStatus::Invalid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Present => "Present",
            ScanStatus::Invalid => "Invalid",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scan status: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for ScanStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Present" => Ok(ScanStatus::Present),
            "Invalid" => Ok(ScanStatus::Invalid),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A pre-registered identity a badge payload is checked against.
///
/// `code` is the claimed display name carried by the badge, so it doubles
/// as the display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub code: String,
    pub roll_no: String,
    pub created_at: String,
}

impl EnrollmentRecord {
    pub fn display_name(&self) -> &str {
        &self.code
    }
}

/// One logged scan. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub id: i64,
    pub payload: String,
    pub roll_no: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: ScanStatus,
}

/// Checks an extracted identity claim against the enrollment list.
///
/// Implementations must answer `false` for a claim without a roll number
/// and must not have side effects.
pub trait Verifier {
    type Error: std::error::Error + Send + Sync + 'static;

    fn verify(&self, claim: &IdentityClaim) -> Result<bool, Self::Error>;
}

/// Appends classified scans to the attendance log.
pub trait ScanLogger {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append one event stamped with the time of the write and return it.
    fn write(
        &self,
        payload: &str,
        roll_no: Option<&str>,
        status: ScanStatus,
    ) -> Result<ScanEvent, Self::Error>;
}
