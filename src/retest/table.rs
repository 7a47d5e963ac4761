//! Parameter-optimization table parsing
//!
//! The optimization container decompresses to a tabular text body whose
//! `parameters_json` column is written unquoted, so a naive comma split
//! shreds it. The field splitter glues JSON objects (and stray key=value
//! parameter lists) back together before columns are mapped.

use tracing::{debug, warn};

/// One optimization run row. Date fields are empty strings when the table
/// does not carry the corresponding column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptRow {
    pub run: u32,
    pub parameters_json: String,
    pub is_start: String,
    pub is_end: String,
    pub os_start: String,
    pub os_end: String,
}

/// Parses the decompressed tabular text into run rows.
///
/// Returns an empty vec when the header lacks the `run` or
/// `parameters_json` column: that is a regular optimization table, not
/// walk-forward output. Rows missing either value are skipped with a warning.
pub fn parse_table(text: &str) -> Vec<OptRow> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let Some(header_line) = lines.next() else {
        return Vec::new();
    };

    let header = split_fields(header_line);
    let col = |wanted: &[&str]| {
        header
            .iter()
            .position(|h| wanted.iter().any(|w| h.trim().eq_ignore_ascii_case(w)))
    };
    let Some(run_idx) = col(&["run", "run_number"]) else {
        debug!("table has no run column, not walk-forward output");
        return Vec::new();
    };
    let Some(params_idx) = col(&["parameters_json", "parameters json"]) else {
        debug!("table has no parameters_json column, not walk-forward output");
        return Vec::new();
    };
    let is_start_idx = col(&["is_start_date"]);
    let is_end_idx = col(&["is_end_date"]);
    let os_start_idx = col(&["os_start_date"]);
    let os_end_idx = col(&["os_end_date"]);

    let mut rows = Vec::new();
    for (line_no, line) in lines.enumerate() {
        let fields = split_fields(line);
        let run = fields
            .get(run_idx)
            .and_then(|f| f.trim().parse::<u32>().ok());
        let params = fields.get(params_idx).map(|f| f.trim().to_string());
        let (Some(run), Some(params)) = (run, params) else {
            warn!(row = line_no + 1, "skipping row without run number or parameters");
            continue;
        };
        if params.is_empty() {
            warn!(row = line_no + 1, "skipping row with empty parameters");
            continue;
        }

        let date_at = |idx: Option<usize>| {
            idx.and_then(|i| fields.get(i))
                .map(|f| f.trim().to_string())
                .unwrap_or_default()
        };
        rows.push(OptRow {
            run,
            parameters_json: params,
            is_start: date_at(is_start_idx),
            is_end: date_at(is_end_idx),
            os_start: date_at(os_start_idx),
            os_end: date_at(os_end_idx),
        });
    }
    rows
}

/// Splits one line on commas, then merges back fields that were split inside
/// an unquoted JSON object or a key=value parameter list.
pub fn split_fields(line: &str) -> Vec<String> {
    let parts: Vec<&str> = line.split(',').collect();
    let mut fields = Vec::with_capacity(parts.len());
    let mut i = 0;

    while i < parts.len() {
        let mut field = parts[i].to_string();

        if field.contains('{') && !field.contains('}') {
            // JSON object split mid-way: merge until the closing brace
            while i + 1 < parts.len() && !field.contains('}') {
                i += 1;
                field.push(',');
                field.push_str(parts[i]);
            }
        } else if field.contains('=') && !field.contains('{') {
            // key=value list: glue while the following parts look the same
            while i + 1 < parts.len() && parts[i + 1].contains('=') && !parts[i + 1].contains('{') {
                i += 1;
                field.push(',');
                field.push_str(parts[i]);
            }
        }

        fields.push(field.trim().to_string());
        i += 1;
    }
    fields
}
