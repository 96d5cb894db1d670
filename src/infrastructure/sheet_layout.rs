use crate::domain::models::{Day, MonthSelection, TimeOfDay};
use crate::infrastructure::config::SheetSettings;

const FIRST_DATA_ROW: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetGrid {
    pub range: String,
    pub rows: Vec<Vec<String>>,
}

pub fn spreadsheet_title(settings: &SheetSettings, month: &MonthSelection) -> String {
    format!("{} - {}", settings.title_prefix, month)
}

/// Header row, one row per interval with a worked-hours formula, then a TOTAL row.
/// Rows are meant to be written with `USER_ENTERED` so the formulas evaluate.
pub fn build_grid(settings: &SheetSettings, days: &[Day]) -> SheetGrid {
    let mut rows = Vec::new();
    rows.push(settings.headers.to_vec());

    let mut row_index = FIRST_DATA_ROW;
    for day in days {
        for interval in &day.intervals {
            rows.push(vec![
                day.date.format("%Y-%m-%d").to_string(),
                time_cell(interval.clock_in),
                time_cell(interval.clock_out),
                worked_hours_formula(row_index),
            ]);
            row_index += 1;
        }
    }

    let last_data_row = row_index - 1;
    rows.push(vec![
        String::new(),
        String::new(),
        settings.total_label.clone(),
        format!("=SUM(D{FIRST_DATA_ROW}:D{last_data_row})"),
    ]);

    SheetGrid {
        range: a1_range(&settings.sheet_name, rows.len()),
        rows,
    }
}

fn time_cell(value: Option<TimeOfDay>) -> String {
    value.map(|time| time.to_string()).unwrap_or_default()
}

fn worked_hours_formula(row: usize) -> String {
    format!(r#"=IF(AND(B{row}<>"", C{row}<>""), (C{row}-B{row})*24, "")"#)
}

fn a1_range(sheet_name: &str, row_count: usize) -> String {
    format!("'{}'!A1:D{row_count}", sheet_name.replace('\'', "''"))
}
