//! CSV gradebook loader.
//!
//! Reads an export with a header row, checks the profile's required columns,
//! and materializes one [`Recipient`] per row with a first name.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

use coursemail_core::error::{CourseMailError, Result};
use coursemail_core::{ActivityMark, Recipient};

use crate::address::partition_addresses;
use crate::profile::ProfileLayout;

/// A loaded gradebook.
#[derive(Debug, Clone)]
pub struct Roster {
    pub recipients: Vec<Recipient>,
    /// Activity columns named by the profile but absent from the file.
    pub absent_activity_columns: Vec<String>,
    /// Rows dropped because the first-name cell was empty.
    pub skipped_rows: usize,
}

/// Load a roster from a CSV file on disk.
pub fn load_roster(path: &Path, layout: &ProfileLayout) -> Result<Roster> {
    let file = std::fs::File::open(path)
        .map_err(|e| CourseMailError::Roster(format!("Open {}: {e}", path.display())))?;
    let roster = parse_roster(file, layout)?;
    tracing::info!(
        "📋 Loaded {} recipient(s) from {}",
        roster.recipients.len(),
        path.display()
    );
    Ok(roster)
}

/// Parse a roster from any CSV reader.
pub fn parse_roster<R: Read>(reader: R, layout: &ProfileLayout) -> Result<Roster> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| CourseMailError::Roster(format!("Read header: {e}")))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, h) in headers.iter().enumerate() {
        index.entry(h.as_str()).or_insert(i);
    }

    let missing: Vec<String> = layout
        .required_columns()
        .into_iter()
        .filter(|c| !index.contains_key(c))
        .map(String::from)
        .collect();
    if !missing.is_empty() {
        return Err(CourseMailError::MissingColumns(missing));
    }

    let absent_activity_columns: Vec<String> = layout
        .activities()
        .filter(|(col, _)| !index.contains_key(col))
        .map(|(col, _)| col.to_string())
        .collect();
    for col in &absent_activity_columns {
        tracing::warn!("⚠️ Activity column not found, counted as not completed: {col}");
    }

    let mut recipients = Vec::new();
    let mut skipped_rows = 0;

    for (row_idx, record) in rdr.records().enumerate() {
        let record = record
            .map_err(|e| CourseMailError::Roster(format!("Row {}: {e}", row_idx + 1)))?;
        let cell = |col: &str| cell_at(&record, &index, col);

        let first_name = cell(&layout.profile.first_name_column).to_string();
        if first_name.is_empty() {
            skipped_rows += 1;
            continue;
        }
        let last_name = layout
            .last_name_column()
            .map(|c| cell(c).to_string())
            .filter(|s| !s.is_empty());

        let (addresses, rejected_addresses) =
            partition_addresses(layout.profile.address_columns.iter().map(|c| cell(c)));

        let activities = layout
            .activities()
            .map(|(col, name)| ActivityMark {
                name: name.to_string(),
                completed: index.contains_key(col) && cell_number(cell(col)) > 0.0,
            })
            .collect();

        let attributes: BTreeMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .filter(|(h, _)| !h.is_empty())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();

        recipients.push(Recipient {
            row: row_idx + 1,
            first_name,
            last_name,
            addresses,
            rejected_addresses,
            attributes,
            activities,
        });
    }

    if skipped_rows > 0 {
        tracing::debug!("Skipped {skipped_rows} row(s) without a first name");
    }

    Ok(Roster {
        recipients,
        absent_activity_columns,
        skipped_rows,
    })
}

fn cell_at<'r>(record: &'r csv::StringRecord, index: &HashMap<&str, usize>, col: &str) -> &'r str {
    index
        .get(col)
        .and_then(|&i| record.get(i))
        .unwrap_or_default()
}

/// Coerce a gradebook cell to a number. Blank, dash, and other non-numeric
/// cells are 0; a comma decimal separator is accepted.
pub fn cell_number(cell: &str) -> f64 {
    let cell = cell.trim();
    if cell.is_empty() {
        return 0.0;
    }
    let normalized = if cell.contains(',') && !cell.contains('.') {
        cell.replace(',', ".")
    } else {
        cell.to_string()
    };
    match normalized.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}
