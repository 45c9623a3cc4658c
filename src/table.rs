//! Markdown table schema and row rendering.
//!
//! The schema is fixed for the lifetime of a sync run: column order
//! determines cell order, and the header generated here is what the
//! structure validator later compares existing files against.

use crate::config::ThresholdRange;
use crate::metrics::MetricsSnapshot;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cell alignment for the table separator row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    /// Left-aligned cells (`---`).
    Left,
    /// Center-aligned cells (`:-:`).
    Center,
    /// Right-aligned cells (`--:`).
    Right,
}

impl Default for Alignment {
    fn default() -> Self {
        Self::Left
    }
}

/// What a column renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// The entry date, formatted per the schema's date format.
    Date,
    /// A metric value looked up by `metric_key`.
    Metric,
    /// Always empty; reserved for manual edits in the vault.
    Custom,
}

/// One column definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name as it appears in the header row.
    pub name: String,

    /// What the column renders.
    pub kind: ColumnKind,

    /// Metric key, required iff `kind` is `metric`.
    #[serde(default)]
    pub metric_key: Option<String>,

    /// Decimal places for metric values (0-5; 0 rounds to integer).
    #[serde(default)]
    pub decimal_places: u8,
}

/// Ordered column set plus date format and alignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    /// Date format tokens (`MM`, `DD`).
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Columns in render order.
    pub columns: Vec<ColumnSpec>,

    /// Separator-row alignment.
    #[serde(default)]
    pub alignment: Alignment,
}

fn default_date_format() -> String {
    "MM/DD".to_string()
}

impl TableSchema {
    /// Validate the column set: non-empty, at least one date column,
    /// metric columns carry a key, decimal places within bounds.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.columns.is_empty() {
            return Err("table.columns cannot be empty".into());
        }
        if !self.columns.iter().any(|c| c.kind == ColumnKind::Date) {
            return Err("table.columns must include at least one column of kind 'date'".into());
        }
        for col in &self.columns {
            if col.kind == ColumnKind::Metric && col.metric_key.is_none() {
                return Err(format!(
                    "column '{}' of kind 'metric' must have metric_key",
                    col.name
                ));
            }
            if col.decimal_places > 5 {
                return Err(format!(
                    "column '{}' decimal_places must be between 0 and 5",
                    col.name
                ));
            }
        }
        Ok(())
    }

    /// Column names in header order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Format a date per the schema's format tokens.
    pub fn format_date(&self, date: NaiveDate) -> String {
        let fmt = self.date_format.replace("MM", "%m").replace("DD", "%d");
        date.format(&fmt).to_string()
    }

    /// Format a metric value for a table cell.
    ///
    /// `None` renders as an empty cell. Zero decimal places rounds to the
    /// nearest integer.
    pub fn format_metric(value: Option<f64>, decimal_places: u8) -> String {
        match value {
            None => String::new(),
            Some(v) if decimal_places == 0 => format!("{}", v.round() as i64),
            Some(v) => format!("{:.*}", decimal_places as usize, v),
        }
    }

    /// Title line for a fresh monthly file.
    pub fn file_header(month: &str, year: i32) -> String {
        format!("# Health Metrics - {month} {year}\n\n")
    }

    /// Header row plus alignment separator row.
    pub fn table_header(&self) -> String {
        let header_row = format!("| {} |", self.column_names().join(" | "));

        let separators: Vec<String> = self
            .columns
            .iter()
            .map(|col| {
                // Separator length tracks the column name length.
                let len = col.name.chars().count();
                match self.alignment {
                    Alignment::Left => "-".repeat(len),
                    Alignment::Center => {
                        format!(":{}:", "-".repeat(len.saturating_sub(2)))
                    }
                    Alignment::Right => format!("{}:", "-".repeat(len.saturating_sub(1))),
                }
            })
            .collect();
        let separator_row = format!("|{}|", separators.join("|"));

        format!("{header_row}\n{separator_row}\n")
    }

    /// Complete content for a freshly created monthly file.
    pub fn empty_file(&self, month: &str, year: i32) -> String {
        format!("{}{}", Self::file_header(month, year), self.table_header())
    }

    /// Render one table row for a date and snapshot.
    ///
    /// Cells follow schema order. Metric cells with a configured threshold
    /// band get an indicator appended after the value; absent values stay
    /// blank either way.
    pub fn render_row(
        &self,
        date: NaiveDate,
        snapshot: &MetricsSnapshot,
        thresholds: &BTreeMap<String, ThresholdRange>,
    ) -> String {
        let cells: Vec<String> = self
            .columns
            .iter()
            .map(|col| match col.kind {
                ColumnKind::Date => self.format_date(date),
                ColumnKind::Metric => {
                    let key = col.metric_key.as_deref().unwrap_or_default();
                    let value = snapshot.metric(key);
                    let mut cell = Self::format_metric(value, col.decimal_places);
                    if let (Some(v), Some(range)) = (value, thresholds.get(key)) {
                        if let Some(indicator) = range.indicator(v) {
                            cell.push(' ');
                            cell.push_str(indicator);
                        }
                    }
                    cell
                }
                ColumnKind::Custom => String::new(),
            })
            .collect();

        format!("| {} |", cells.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
        TableSchema {
            date_format: "MM/DD".to_string(),
            alignment: Alignment::Left,
            columns: vec![
                ColumnSpec {
                    name: "Date".to_string(),
                    kind: ColumnKind::Date,
                    metric_key: None,
                    decimal_places: 0,
                },
                ColumnSpec {
                    name: "Sleep Score".to_string(),
                    kind: ColumnKind::Metric,
                    metric_key: Some("sleep_score".to_string()),
                    decimal_places: 0,
                },
                ColumnSpec {
                    name: "Recovery".to_string(),
                    kind: ColumnKind::Metric,
                    metric_key: Some("recovery_score".to_string()),
                    decimal_places: 0,
                },
                ColumnSpec {
                    name: "Notes".to_string(),
                    kind: ColumnKind::Custom,
                    metric_key: None,
                    decimal_places: 0,
                },
            ],
        }
    }

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            sleep_score: Some(85.0),
            recovery_score: Some(72.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_row_exact() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 5).unwrap();
        let row = schema().render_row(date, &snapshot(), &BTreeMap::new());
        assert_eq!(row, "| 12/05 | 85 | 72 |  |");
    }

    #[test]
    fn test_missing_metric_renders_blank_cell() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 5).unwrap();
        let partial = MetricsSnapshot {
            sleep_score: Some(85.0),
            ..Default::default()
        };
        let row = schema().render_row(date, &partial, &BTreeMap::new());
        assert_eq!(row, "| 12/05 | 85 |  |  |");
    }

    #[test]
    fn test_threshold_decoration() {
        let mut thresholds = BTreeMap::new();
        thresholds.insert(
            "recovery_score".to_string(),
            ThresholdRange {
                green: [67.0, 100.0],
                yellow: [34.0, 66.0],
                red: [0.0, 33.0],
            },
        );
        let date = NaiveDate::from_ymd_opt(2024, 12, 5).unwrap();
        let row = schema().render_row(date, &snapshot(), &thresholds);
        assert_eq!(row, "| 12/05 | 85 | 72 \u{1F7E2} |  |");
    }

    #[test]
    fn test_format_metric_rounding() {
        assert_eq!(TableSchema::format_metric(Some(85.4), 0), "85");
        assert_eq!(TableSchema::format_metric(Some(85.5), 0), "86");
        assert_eq!(TableSchema::format_metric(Some(7.25), 2), "7.25");
        assert_eq!(TableSchema::format_metric(Some(7.0), 1), "7.0");
        assert_eq!(TableSchema::format_metric(None, 2), "");
    }

    #[test]
    fn test_format_date_tokens() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 5).unwrap();
        assert_eq!(schema().format_date(date), "12/05");

        let mut dashed = schema();
        dashed.date_format = "DD-MM".to_string();
        assert_eq!(dashed.format_date(date), "05-12");
    }

    #[test]
    fn test_table_header_left() {
        let header = schema().table_header();
        assert_eq!(
            header,
            "| Date | Sleep Score | Recovery | Notes |\n|----|-----------|--------|-----|\n"
        );
    }

    #[test]
    fn test_table_header_center_and_right() {
        let mut s = schema();
        s.alignment = Alignment::Center;
        let sep_line = s.table_header().lines().nth(1).unwrap().to_string();
        assert_eq!(sep_line, "|:--:|:---------:|:------:|:---:|");

        s.alignment = Alignment::Right;
        let sep_line = s.table_header().lines().nth(1).unwrap().to_string();
        assert_eq!(sep_line, "|---:|----------:|-------:|----:|");
    }

    #[test]
    fn test_empty_file_layout() {
        let content = schema().empty_file("December", 2024);
        assert!(content.starts_with("# Health Metrics - December 2024\n\n"));
        assert!(content.contains("| Date | Sleep Score | Recovery | Notes |"));
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_schema_validation() {
        let mut s = schema();
        assert!(s.validate().is_ok());

        s.columns[1].metric_key = None;
        assert!(s.validate().is_err());

        let no_date = TableSchema {
            date_format: "MM/DD".to_string(),
            alignment: Alignment::Left,
            columns: vec![ColumnSpec {
                name: "Notes".to_string(),
                kind: ColumnKind::Custom,
                metric_key: None,
                decimal_places: 0,
            }],
        };
        assert!(no_date.validate().is_err());

        let empty = TableSchema {
            date_format: "MM/DD".to_string(),
            alignment: Alignment::Left,
            columns: vec![],
        };
        assert!(empty.validate().is_err());
    }
}
