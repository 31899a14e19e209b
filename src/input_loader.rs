use std::fs::File;
use std::path::Path;
use log::{info, warn};
use calamine::{open_workbook_auto, Reader};

use crate::error::SetupError;

/// Column names tried when the configured one is absent.
const FALLBACK_COLUMNS: [&str; 6] = ["apn", "APN", "Apn", "parcel", "Parcel", "PARCEL"];

/// Loads the APN column from a CSV file or the first sheet of a workbook.
/// Blank cells are skipped; every other value is returned in file order.
pub fn load_apns<P: AsRef<Path>>(filename: P, column: &str) -> Result<Vec<String>, SetupError> {
    let path_ref = filename.as_ref();

    if !path_ref.exists() {
        return Err(SetupError::InputMissing(path_ref.to_path_buf()));
    }

    let is_excel = path_ref
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xls"));

    let (headers, rows) = if is_excel {
        read_excel(path_ref)?
    } else {
        read_csv(path_ref)?
    };

    let idx = find_column(&headers, column).ok_or_else(|| SetupError::ColumnMissing {
        column: column.to_string(),
        available: headers.clone(),
    })?;
    if headers[idx] != column {
        info!("Using column '{}' for APNs", headers[idx]);
    }

    let mut apns = Vec::with_capacity(rows.len());
    for (row_no, row) in rows.iter().enumerate() {
        let value = row.get(idx).map(|v| v.trim()).unwrap_or_default();
        if value.is_empty() || value.eq_ignore_ascii_case("nan") || value.eq_ignore_ascii_case("none") {
            warn!("Skipping blank APN on data row {}", row_no + 1);
            continue;
        }
        apns.push(value.to_string());
    }

    info!("Loaded {} APNs from {:?}", apns.len(), path_ref);
    Ok(apns)
}

fn find_column(headers: &[String], column: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h == column)
        .or_else(|| {
            FALLBACK_COLUMNS
                .iter()
                .find_map(|candidate| headers.iter().position(|h| h == *candidate))
        })
}

fn unreadable(path: &Path, reason: impl ToString) -> SetupError {
    SetupError::InputUnreadable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), SetupError> {
    let file = File::open(path).map_err(|e| unreadable(path, e))?;

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(file);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| unreadable(path, e))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| unreadable(path, e))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok((headers, rows))
}

fn read_excel(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), SetupError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| unreadable(path, e))?;

    let range = match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => range,
        Some(Err(e)) => return Err(unreadable(path, e)),
        None => return Err(unreadable(path, "workbook has no sheets")),
    };

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string().trim().to_string()).collect::<Vec<_>>());
    let headers = rows.next().unwrap_or_default();
    Ok((headers, rows.collect()))
}

/// Canonical `XXX-XX-XXX-XXX` form for 11-digit APNs; anything else is returned trimmed.
pub fn format_apn(apn: &str) -> String {
    let digits: String = apn.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 11 {
        format!("{}-{}-{}-{}", &digits[..3], &digits[3..5], &digits[5..8], &digits[8..])
    } else {
        apn.trim().to_string()
    }
}

/// Clark County APNs carry 11 digits.
pub fn is_valid_apn(apn: &str) -> bool {
    apn.chars().filter(|c| c.is_ascii_digit()).count() == 11
}
