use std::fmt;

use serde::Serialize;
use unicode_width::UnicodeWidthStr;

use querydesk_core::payload::{Scalar, Table};

pub const DEFAULT_POINT_LIMIT: usize = 50;
const BAR_WIDTH: usize = 40;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Line,
    Area,
    Bar,
    Column,
}

impl ChartKind {
    /// Unknown names fall back to a line chart.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "area" => Self::Area,
            "bar" => Self::Bar,
            "column" => Self::Column,
            _ => Self::Line,
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Line => "line",
            Self::Area => "area",
            Self::Bar => "bar",
            Self::Column => "column",
        })
    }
}

/// One chart series built from two columns of a result table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub x_key: String,
    pub y_key: String,
    pub categories: Vec<String>,
    pub values: Vec<Scalar>,
}

impl ChartSpec {
    /// Chart the first `limit` rows of `table`. `None` without rows or when
    /// either key is not a column.
    pub fn build(table: &Table, kind: ChartKind, x_key: &str, y_key: &str, limit: usize) -> Option<Self> {
        if table.is_empty() || x_key.is_empty() || y_key.is_empty() {
            return None;
        }
        let x = table.column_index(x_key)?;
        let y = table.column_index(y_key)?;

        let rows = &table.rows[..table.len().min(limit.max(1))];
        let categories = rows
            .iter()
            .map(|row| row.get(x).map(ToString::to_string).unwrap_or_default())
            .collect();
        let values: Vec<Scalar> = rows
            .iter()
            .map(|row| row.get(y).cloned().unwrap_or(Scalar::Null))
            .collect();

        Some(Self {
            kind,
            title: format!("Showing only top {} data points", values.len()),
            x_key: x_key.to_string(),
            y_key: y_key.to_string(),
            categories,
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Text rendering: one bar per point, scaled to the largest value.
    pub fn to_text(&self) -> String {
        let max = self
            .values
            .iter()
            .filter_map(Scalar::as_f64)
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let label_width = self.categories.iter().map(|c| c.width()).max().unwrap_or(0);

        let mut out = format!("{} ({} chart, {} by {})", self.title, self.kind, self.y_key, self.x_key);
        for (label, value) in self.categories.iter().zip(&self.values) {
            let bar = match value.as_f64() {
                Some(v) if max > 0.0 => {
                    let n = ((v.abs() / max) * BAR_WIDTH as f64).round() as usize;
                    "#".repeat(n)
                }
                _ => String::new(),
            };
            let pad = " ".repeat(label_width.saturating_sub(label.width()));
            out.push('\n');
            out.push_str(&format!("{label}{pad} | {bar} {value}"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querydesk_core::payload::QueryResult;
    use serde_json::json;

    fn plans(n: usize) -> Table {
        let rows: Vec<_> = (0..n).map(|i| json!({"plan": format!("P{i}"), "members": i * 10})).collect();
        QueryResult::decode(json!(rows)).unwrap().as_table().cloned().unwrap()
    }

    #[test]
    fn kind_parse_defaults_to_line() {
        assert_eq!(ChartKind::parse("column"), ChartKind::Column);
        assert_eq!(ChartKind::parse(" Area "), ChartKind::Area);
        assert_eq!(ChartKind::parse("pie"), ChartKind::Line);
        assert_eq!(ChartKind::default(), ChartKind::Line);
    }

    #[test]
    fn limits_points_and_titles_with_count() {
        let spec = ChartSpec::build(&plans(80), ChartKind::Bar, "plan", "members", DEFAULT_POINT_LIMIT).unwrap();
        assert_eq!(spec.len(), 50);
        assert_eq!(spec.title, "Showing only top 50 data points");
        assert_eq!(spec.categories[0], "P0");
        assert_eq!(spec.values[49], Scalar::Int(490));
    }

    #[test]
    fn small_tables_keep_every_row() {
        let spec = ChartSpec::build(&plans(3), ChartKind::Line, "plan", "members", 50).unwrap();
        assert_eq!(spec.title, "Showing only top 3 data points");
    }

    #[test]
    fn no_chart_without_data_or_keys() {
        assert!(ChartSpec::build(&Table::default(), ChartKind::Line, "plan", "members", 50).is_none());
        assert!(ChartSpec::build(&plans(3), ChartKind::Line, "", "members", 50).is_none());
        assert!(ChartSpec::build(&plans(3), ChartKind::Line, "plan", "missing", 50).is_none());
    }

    #[test]
    fn text_rendering_scales_bars() {
        let spec = ChartSpec::build(&plans(3), ChartKind::Column, "plan", "members", 50).unwrap();
        let text = spec.to_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Showing only top 3 data points (column chart, members by plan)");
        assert_eq!(lines[1], "P0 |  0");
        assert!(lines[3].starts_with(&format!("P2 | {}", "#".repeat(BAR_WIDTH))));
    }

    #[test]
    fn text_aligns_wide_labels() {
        let table = QueryResult::decode(json!([
            {"city": "東京", "members": 4},
            {"city": "NYC", "members": 2}
        ]))
        .unwrap()
        .as_table()
        .cloned()
        .unwrap();
        let chart = ChartSpec::build(&table, ChartKind::Bar, "city", "members", 10).unwrap();
        let text = chart.to_text();
        let label_widths: Vec<usize> = text
            .lines()
            .skip(1)
            .map(|line| line.split(" | ").next().unwrap().width())
            .collect();
        assert_eq!(label_widths, vec![4, 4]);
    }
}
