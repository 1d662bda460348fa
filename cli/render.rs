//! Plain-text rendering of tables and summary charts for the terminal.

use campaign_optimizer::data::RawTable;
use campaign_optimizer::summary::{CorrelationMatrix, OutcomeCount, ScatterPoint, SummaryConfig};
use itertools::Itertools;
use std::collections::BTreeMap;

const BAR_WIDTH: usize = 40;
const PLOT_WIDTH: usize = 60;
const PLOT_HEIGHT: usize = 16;
const GLYPHS: [char; 10] = ['o', 'x', '+', '*', '#', '@', '%', '&', '=', '~'];

/// Prints a table with aligned columns, optionally followed by a label column.
pub fn print_table(table: &RawTable, labels: Option<(&str, &[String])>) {
    let mut header: Vec<String> = table.columns().to_vec();
    if let Some((name, _)) = labels {
        header.push(name.to_string());
    }

    let rows: Vec<Vec<String>> = table
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut cells: Vec<String> = row.iter().map(|cell| cell.to_string()).collect();
            if let Some((_, values)) = labels {
                cells.push(values.get(i).cloned().unwrap_or_default());
            }
            cells
        })
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|j| {
            rows.iter()
                .map(|row| row[j].chars().count())
                .chain(std::iter::once(header[j].chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_row = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .join(" | ")
    };

    println!("{}", format_row(&header));
    println!("{}", widths.iter().map(|w| "-".repeat(*w)).join("-+-"));
    for row in &rows {
        println!("{}", format_row(row));
    }
    println!("({} rows)", rows.len());
}

/// Horizontal bar chart with counts and shares, which also stands in for the pie chart.
pub fn print_distribution(distribution: &[OutcomeCount]) {
    let label_width = distribution
        .iter()
        .map(|c| c.label.chars().count())
        .max()
        .unwrap_or(0);
    let max_count = distribution.iter().map(|c| c.count).max().unwrap_or(1).max(1);
    for outcome in distribution {
        let bar_len = outcome.count * BAR_WIDTH / max_count;
        println!(
            "{:<label_width$} | {:<BAR_WIDTH$} {:>5} ({:.1}%)",
            outcome.label,
            "#".repeat(bar_len),
            outcome.count,
            outcome.share * 100.0
        );
    }
}

/// Correlation matrix with two decimals; NaN cells print as blanks.
pub fn print_correlation(matrix: &CorrelationMatrix) {
    let name_width = matrix
        .columns
        .iter()
        .map(|c| c.chars().count())
        .max()
        .unwrap_or(0);
    let cell_width = matrix
        .columns
        .iter()
        .map(|c| c.chars().count())
        .max()
        .unwrap_or(0)
        .max(5);

    let header = matrix
        .columns
        .iter()
        .map(|c| format!("{c:>cell_width$}"))
        .join(" ");
    println!("{:name_width$} {header}", "");
    for (i, name) in matrix.columns.iter().enumerate() {
        let cells = matrix
            .values
            .row(i)
            .iter()
            .map(|r| {
                if r.is_nan() {
                    format!("{:>cell_width$}", "")
                } else {
                    format!("{r:>cell_width$.2}")
                }
            })
            .join(" ");
        println!("{name:<name_width$} {cells}");
    }
}

/// ASCII scatter plot; each label gets its own glyph, listed in the legend.
pub fn print_scatter(points: &[ScatterPoint], config: &SummaryConfig) {
    if points.is_empty() {
        println!("No rows with numeric values in both columns.");
        return;
    }

    let glyphs = glyph_map(points);
    let (x_min, x_max) = bounds(points.iter().map(|p| p.x));
    let (y_min, y_max) = bounds(points.iter().map(|p| p.y));
    let mut grid = vec![vec![' '; PLOT_WIDTH]; PLOT_HEIGHT];
    for point in points {
        let col = scale(point.x, x_min, x_max, PLOT_WIDTH);
        let row = PLOT_HEIGHT - 1 - scale(point.y, y_min, y_max, PLOT_HEIGHT);
        grid[row][col] = glyphs[point.label.as_str()];
    }

    println!("{} ({:.2} .. {:.2})", config.scatter_y, y_min, y_max);
    for line in grid {
        println!("|{}", line.into_iter().collect::<String>());
    }
    println!("+{}", "-".repeat(PLOT_WIDTH));
    println!("{} ({:.2} .. {:.2})", config.scatter_x, x_min, x_max);

    let legend = glyphs
        .iter()
        .map(|(label, glyph)| format!("{glyph} = {label}"))
        .join(", ");
    println!("Legend: {legend}");
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn scale(value: f64, min: f64, max: f64, cells: usize) -> usize {
    if max <= min {
        return cells / 2;
    }
    let fraction = (value - min) / (max - min);
    ((fraction * (cells - 1) as f64).round() as usize).min(cells - 1)
}

/// One glyph per distinct label, assigned in sorted label order.
fn glyph_map(points: &[ScatterPoint]) -> BTreeMap<&str, char> {
    points
        .iter()
        .map(|p| p.label.as_str())
        .unique()
        .sorted()
        .enumerate()
        .map(|(i, label)| (label, GLYPHS[i % GLYPHS.len()]))
        .collect()
}
