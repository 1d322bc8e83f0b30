//! Badge payload parsing.
//!
//! Badges carry a plain `Name - RollNo` string. The roll number is the run
//! of ASCII digits that ends the payload (one trailing newline is allowed
//! after it); it must be preceded by a dash, optionally padded with
//! whitespace on either side.

use serde::Serialize;

/// Identity claimed by a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityClaim {
    pub name: String,
    /// `None` when the payload did not match `Name - digits`.
    pub roll_no: Option<String>,
}

impl IdentityClaim {
    pub fn is_parsed(&self) -> bool {
        self.roll_no.is_some()
    }
}

/// Split a raw payload into name and roll number.
///
/// Never fails: an unparsable payload comes back whole as the name with no
/// roll number.
pub fn extract_identity(raw: &str) -> IdentityClaim {
    match split_claim(raw) {
        Some((name, roll_no)) => IdentityClaim {
            name: name.to_string(),
            roll_no: Some(roll_no.to_string()),
        },
        None => IdentityClaim {
            name: raw.to_string(),
            roll_no: None,
        },
    }
}

fn split_claim(raw: &str) -> Option<(&str, &str)> {
    let body = raw.strip_suffix('\n').unwrap_or(raw);
    let digits_start = body
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    let (head, roll_no) = body.split_at(digits_start);

    let head = head.trim_end();
    let prefix = head.strip_suffix('-')?;

    // The name needs at least one character and must stay on one line;
    // whitespace (newlines included) may separate it from the dash.
    let name = prefix.trim_end();
    let valid = if name.is_empty() {
        !prefix.is_empty() && !prefix.starts_with('\n')
    } else {
        !name.contains('\n')
    };
    if !valid {
        return None;
    }
    Some((name.trim_start(), roll_no))
}
