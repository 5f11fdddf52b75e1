// backy2 output parsing
//
// backy2 only talks through free text on stdout/stderr. The formats below are
// treated as a semi-stable protocol; fixtures in the tests pin them down.

use crate::domain::{BackupStatus, ToolId, UNKNOWN_SIZE};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

/// `INFO: New version: 5c1e…-… (Tags: [...])`
static NEW_VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"New version: ([\-a-z0-9]+) \(Tags").expect("constant regex pattern is valid")
});

/// `INFO: Removed backup version 5c1e…-… with 1234 blocks.`
static REMOVED_VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Removed backup version ([\-a-z0-9]+) with")
        .expect("constant regex pattern is valid")
});

/// Printed by backy2 once a backup is fully written
pub const COMPLETE_MARKER: &str = "Backy complete";

// `-m ls` columns:
// type|date|name|snapshot_name|size|size_bytes|uid|valid|protected|tags|expire
const COL_TYPE: usize = 0;
const COL_DATE: usize = 1;
const COL_NAME: usize = 2;
const COL_SIZE_BYTES: usize = 5;
const COL_UID: usize = 6;
const COL_VALID: usize = 7;
const MIN_COLUMNS: usize = COL_VALID + 1;
const HEADER_TYPE: &str = "type";

/// One version row of the machine-readable listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub tool_id: ToolId,
    pub name: String,
    pub date: String,
    pub size_bytes: i64,
    pub status: BackupStatus,
}

/// Removal output that does not confirm the requested version
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfirmationError {
    #[error("Couldn't find remove info in tool output")]
    MissingMarker,

    #[error("Removed version {found} differs from requested {expected}")]
    Mismatch { expected: String, found: String },
}

/// Extract the new version id from backup output.
///
/// Both the version line and the completion phrase must be present; either
/// one alone is treated as a failed backup.
pub fn parse_completion_marker(output: &str) -> Option<ToolId> {
    let tool_id = NEW_VERSION_PATTERN
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())?;

    if !output.contains(COMPLETE_MARKER) {
        debug!(tool_id = %tool_id, "Version line found without completion marker");
        return None;
    }
    Some(tool_id)
}

/// Parse `backy2 -m ls` output, skipping the header and malformed rows
pub fn parse_listing(output: &str) -> Vec<ListingEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(parse_listing_row)
        .collect()
}

/// Find one version in `backy2 -m ls` output
pub fn find_in_listing(output: &str, tool_id: &str) -> Option<ListingEntry> {
    parse_listing(output)
        .into_iter()
        .find(|entry| entry.tool_id == tool_id)
}

fn parse_listing_row(line: &str) -> Option<ListingEntry> {
    let columns: Vec<&str> = line.split('|').collect();
    if columns.len() < MIN_COLUMNS {
        debug!(line = %line, "Skipping short listing row");
        return None;
    }
    if columns[COL_TYPE] == HEADER_TYPE {
        return None;
    }

    let tool_id = columns[COL_UID].trim();
    if tool_id.is_empty() {
        debug!(line = %line, "Skipping listing row without uid");
        return None;
    }

    let status = match columns[COL_VALID].trim() {
        "1" => BackupStatus::Available,
        "0" => BackupStatus::Running,
        other => {
            debug!(line = %line, valid = %other, "Skipping listing row with unknown valid flag");
            return None;
        }
    };

    let size_bytes = parse_size(columns[COL_SIZE_BYTES], tool_id);

    Some(ListingEntry {
        tool_id: tool_id.to_string(),
        name: columns[COL_NAME].to_string(),
        date: columns[COL_DATE].to_string(),
        size_bytes,
        status,
    })
}

fn parse_size(raw: &str, tool_id: &str) -> i64 {
    match raw.trim().parse::<i64>() {
        Ok(size) => size,
        Err(e) => {
            warn!(tool_id = %tool_id, raw = %raw, error = %e, "Couldn't get size from backy2 listing");
            UNKNOWN_SIZE
        }
    }
}

/// Check removal output confirms exactly `expected_tool_id`
pub fn parse_deletion_confirmation(
    output: &str,
    expected_tool_id: &str,
) -> Result<(), ConfirmationError> {
    let found = REMOVED_VERSION_PATTERN
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or(ConfirmationError::MissingMarker)?;

    if found != expected_tool_id {
        return Err(ConfirmationError::Mismatch {
            expected: expected_tool_id.to_string(),
            found: found.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKUP_OUTPUT: &str = "\
    INFO: $ /usr/bin/backy2 backup file:///src file:///src
    INFO: Backed up 1/1 blocks (100.0%)
    INFO: New version: 4d6ac2a4-3d3a-11e8-9e5c-0242ac110002 (Tags: [b_daily,b_weekly])
    INFO: Backy complete.";

    const LISTING: &str = "\
type|date|name|snapshot_name|size|size_bytes|uid|valid|protected|tags|expire
version|2018-04-11 12:01:02|file:///src||1|4194304|4d6ac2a4-3d3a-11e8-9e5c-0242ac110002|1|0|b_daily|
version|2018-04-11 12:05:00|file:///src||1|notanumber|77aa0000-3d3a-11e8-9e5c-0242ac110002|1|0||
version|2018-04-11 12:06:00|file:///src||1|1024|88bb0000-3d3a-11e8-9e5c-0242ac110002|0|0||
broken|row
version|2018-04-11 12:07:00|file:///src||1|1024|99cc0000-3d3a-11e8-9e5c-0242ac110002|x|0||
";

    #[test]
    fn test_completion_marker_extracts_id() {
        assert_eq!(
            parse_completion_marker(BACKUP_OUTPUT).as_deref(),
            Some("4d6ac2a4-3d3a-11e8-9e5c-0242ac110002")
        );
    }

    #[test]
    fn test_completion_requires_both_markers() {
        let without_complete = BACKUP_OUTPUT.replace("Backy complete.", "Done.");
        assert_eq!(parse_completion_marker(&without_complete), None);

        let without_version = "INFO: Backy complete.";
        assert_eq!(parse_completion_marker(without_version), None);
    }

    #[test]
    fn test_listing_skips_header_and_malformed_rows() {
        let entries = parse_listing(LISTING);
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].tool_id, "4d6ac2a4-3d3a-11e8-9e5c-0242ac110002");
        assert_eq!(entries[0].size_bytes, 4_194_304);
        assert_eq!(entries[0].status, BackupStatus::Available);
        assert_eq!(entries[0].name, "file:///src");
    }

    #[test]
    fn test_listing_unparsable_size_degrades_to_unknown() {
        let entry = find_in_listing(LISTING, "77aa0000-3d3a-11e8-9e5c-0242ac110002").unwrap();
        assert_eq!(entry.size_bytes, UNKNOWN_SIZE);
        assert_eq!(entry.status, BackupStatus::Available);
    }

    #[test]
    fn test_listing_invalid_flag_maps_to_running() {
        let entry = find_in_listing(LISTING, "88bb0000-3d3a-11e8-9e5c-0242ac110002").unwrap();
        assert_eq!(entry.status, BackupStatus::Running);

        assert!(find_in_listing(LISTING, "99cc0000-3d3a-11e8-9e5c-0242ac110002").is_none());
        assert!(find_in_listing(LISTING, "missing").is_none());
    }

    #[test]
    fn test_deletion_confirmation() {
        let output = "INFO: Removed backup version 4d6ac2a4-3d3a with 12 blocks.";
        assert_eq!(parse_deletion_confirmation(output, "4d6ac2a4-3d3a"), Ok(()));

        assert_eq!(
            parse_deletion_confirmation(output, "ffff0000"),
            Err(ConfirmationError::Mismatch {
                expected: "ffff0000".to_string(),
                found: "4d6ac2a4-3d3a".to_string(),
            })
        );

        assert_eq!(
            parse_deletion_confirmation("INFO: nothing to do", "4d6ac2a4-3d3a"),
            Err(ConfirmationError::MissingMarker)
        );
    }
}
