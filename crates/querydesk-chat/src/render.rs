//! Projection from a message to what a view shows for it.

use std::fmt;

use unicode_width::UnicodeWidthStr;

use querydesk_core::messages::{Message, MessageContent, MessageKind};
use querydesk_core::payload::{QueryResult, Scalar, Table};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    pub text: String,
    pub align: Align,
}

impl Cell {
    fn from_scalar(value: &Scalar) -> Self {
        Self {
            text: value.to_string(),
            align: if value.is_numeric() { Align::Right } else { Align::Left },
        }
    }

    fn width(&self) -> usize {
        UnicodeWidthStr::width(self.text.as_str())
    }
}

/// A table laid out for fixed-width display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn from_table(table: &Table) -> Self {
        Self {
            headers: table.columns.clone(),
            rows: table
                .rows
                .iter()
                .map(|row| row.iter().map(Cell::from_scalar).collect())
                .collect(),
        }
    }

    /// Display width of each column: the widest of header and cells.
    pub fn column_widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(Cell::width)
                    .fold(UnicodeWidthStr::width(header.as_str()), usize::max)
            })
            .collect()
    }
}

fn pad(out: &mut String, text: &str, width: usize, align: Align) {
    let fill = width.saturating_sub(UnicodeWidthStr::width(text));
    match align {
        Align::Left => {
            out.push_str(text);
            out.extend(std::iter::repeat(' ').take(fill));
        }
        Align::Right => {
            out.extend(std::iter::repeat(' ').take(fill));
            out.push_str(text);
        }
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.headers.is_empty() {
            return f.write_str("(no rows)");
        }
        let widths = self.column_widths();

        let mut line = String::new();
        for (i, (header, width)) in self.headers.iter().zip(&widths).enumerate() {
            if i > 0 {
                line.push_str(" | ");
            }
            pad(&mut line, header, *width, Align::Left);
        }
        writeln!(f, "{}", line.trim_end())?;

        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        write!(f, "{}", rule.join("-+-"))?;

        for row in &self.rows {
            line.clear();
            for (i, width) in widths.iter().enumerate() {
                if i > 0 {
                    line.push_str(" | ");
                }
                match row.get(i) {
                    Some(cell) => pad(&mut line, &cell.text, *width, cell.align),
                    None => pad(&mut line, "", *width, Align::Left),
                }
            }
            write!(f, "\n{}", line.trim_end())?;
        }
        Ok(())
    }
}

/// What a message looks like on screen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fragment {
    Text { text: String, streaming: bool },
    Sql { sql: String },
    Grid(Grid),
    Scalar { value: String },
    Error { text: String },
}

/// Pure projection of a message's shape.
pub fn project(message: &Message) -> Fragment {
    if message.is_failure() {
        return Fragment::Error {
            text: message.text().unwrap_or_default().to_string(),
        };
    }
    match (&message.content, message.kind) {
        (MessageContent::Text { text }, MessageKind::GeneratedSql) => Fragment::Sql { sql: text.clone() },
        (MessageContent::Text { text }, _) => Fragment::Text {
            text: text.clone(),
            streaming: message.in_progress,
        },
        (MessageContent::Result { result }, _) => match result {
            QueryResult::Table { table } => Fragment::Grid(Grid::from_table(table)),
            QueryResult::Scalar { value } => Fragment::Scalar {
                value: value.to_string(),
            },
            QueryResult::Text { text } => Fragment::Text {
                text: text.clone(),
                streaming: false,
            },
        },
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { text, streaming } => {
                f.write_str(text)?;
                if *streaming {
                    f.write_str("▌")?;
                }
                Ok(())
            }
            Self::Sql { sql } => write!(f, "```sql\n{sql}\n```"),
            Self::Grid(grid) => fmt::Display::fmt(grid, f),
            Self::Scalar { value } => f.write_str(value),
            Self::Error { text } => write!(f, "! {text}"),
        }
    }
}
