use std::fmt::Write;

use chrono::NaiveDate;
use clap::ValueEnum;

use crate::error::CoreResult;
use crate::models::{Dataset, StudentProfile};
use crate::pipelines::{self, Cell, PipelineName, Table, TableRow};
use crate::ranking::{round2, Component, RankedStudent};

/// Rows shown per pipeline in the markdown report.
pub const REPORT_ROW_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    #[default]
    Text,
    Csv,
    Json,
}

impl TableRow for StudentProfile {
    const COLUMNS: &'static [&'static str] = &[
        "student_id",
        "name",
        "course_batch",
        "city",
        "languages",
        "problems_solved",
        "project_score",
        "soft_skill_avg",
        "mock_interview_score",
        "internships_completed",
        "placement_status",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.student_id().into(),
            self.student.name.as_str().into(),
            self.student.course_batch.as_str().into(),
            self.student.city.as_str().into(),
            self.languages.join(", ").into(),
            self.problems_solved().into(),
            self.project_score().into(),
            self.soft_skill_average().map(round2).into(),
            self.mock_interview_score().into(),
            self.internships_completed().into(),
            self.placement_status().into(),
        ]
    }
}

impl TableRow for RankedStudent {
    const COLUMNS: &'static [&'static str] = &[
        "rank",
        "student_id",
        "name",
        "course_batch",
        "city",
        "score",
        "weakest_component",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.rank.into(),
            self.profile.student_id().into(),
            self.profile.student.name.as_str().into(),
            self.profile.student.course_batch.as_str().into(),
            self.profile.student.city.as_str().into(),
            self.score.into(),
            self.components
                .weakest()
                .map(|(component, _)| Component::name(component))
                .into(),
        ]
    }
}

/// Renders typed rows, at most `limit` of them.
pub fn render_rows<R: TableRow>(
    format: Format,
    rows: &[R],
    limit: Option<usize>,
) -> anyhow::Result<String> {
    let cells: Vec<Vec<Cell>> = rows
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(TableRow::cells)
        .collect();
    render(format, R::COLUMNS, &cells)
}

pub fn render_table(format: Format, table: &Table) -> anyhow::Result<String> {
    render(format, &table.columns, &table.rows)
}

pub fn render(format: Format, columns: &[&str], rows: &[Vec<Cell>]) -> anyhow::Result<String> {
    match format {
        Format::Text => Ok(render_text(columns, rows)),
        Format::Csv => render_csv(columns, rows),
        Format::Json => render_json(columns, rows),
    }
}

/// Column-aligned plain text with a header rule.
pub fn render_text(columns: &[&str], rows: &[Vec<Cell>]) -> String {
    let rendered: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(Cell::to_string).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &rendered {
        for (width, value) in widths.iter_mut().zip(row) {
            *width = (*width).max(value.chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", padded(columns.iter().copied(), &widths));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(output, "{}", rule.join("  "));
    for row in &rendered {
        let _ = writeln!(output, "{}", padded(row.iter().map(String::as_str), &widths));
    }
    output
}

fn padded<'a>(values: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    values
        .zip(widths)
        .map(|(value, width)| format!("{value:<width$}", width = *width))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

pub fn render_csv(columns: &[&str], rows: &[Vec<Cell>]) -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    {
        let mut writer = csv::Writer::from_writer(&mut buffer);
        writer.write_record(columns)?;
        for row in rows {
            writer.write_record(row.iter().map(Cell::to_string))?;
        }
        writer.flush()?;
    }
    Ok(String::from_utf8(buffer)?)
}

/// One JSON object per row; absent values are `null`.
pub fn render_json(columns: &[&str], rows: &[Vec<Cell>]) -> anyhow::Result<String> {
    let objects: Vec<serde_json::Map<String, serde_json::Value>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .zip(row)
                .map(|(column, cell)| Ok((column.to_string(), serde_json::to_value(cell)?)))
                .collect::<Result<_, serde_json::Error>>()
        })
        .collect::<Result<_, _>>()?;
    Ok(serde_json::to_string_pretty(&objects)?)
}

fn markdown_cell(cell: &Cell) -> String {
    match cell {
        Cell::Null => "-".to_string(),
        other => other.to_string().replace('|', "\\|"),
    }
}

/// Markdown insights report running every pipeline over `dataset`.
pub fn build_report(dataset: &Dataset, generated: NaiveDate) -> CoreResult<String> {
    let summary = pipelines::program_effectiveness(dataset);

    let mut output = String::new();
    let _ = writeln!(output, "# Placement Insights Report");
    let _ = writeln!(output, "Generated on {generated}");
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "{} students, {} with a placement record, {} placed ({:.1}% placement rate).",
        summary.students,
        summary.students_with_placement,
        summary.placed,
        summary.placement_rate * 100.0
    );

    for name in PipelineName::ALL {
        let table = pipelines::run_pipeline(name, dataset)?;
        let _ = writeln!(output);
        let _ = writeln!(output, "## {}. {}", name.number(), name);

        if table.is_empty() {
            let _ = writeln!(output, "No data for this pipeline.");
            continue;
        }

        let _ = writeln!(output, "| {} |", table.columns.join(" | "));
        let rule: Vec<&str> = table.columns.iter().map(|_| "---").collect();
        let _ = writeln!(output, "| {} |", rule.join(" | "));
        for row in table.rows.iter().take(REPORT_ROW_LIMIT) {
            let cells: Vec<String> = row.iter().map(markdown_cell).collect();
            let _ = writeln!(output, "| {} |", cells.join(" | "));
        }
        if table.len() > REPORT_ROW_LIMIT {
            let _ = writeln!(
                output,
                "\n_{} more rows not shown._",
                table.len() - REPORT_ROW_LIMIT
            );
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Vec<&'static str>, Vec<Vec<Cell>>) {
        (
            vec!["city", "placed", "placement_rate", "avg_package"],
            vec![
                vec![
                    Cell::from("Pune"),
                    Cell::from(3_i64),
                    Cell::from(0.75),
                    Cell::Null,
                ],
                vec![
                    Cell::from("Navi Mumbai, MH"),
                    Cell::from(12_i64),
                    Cell::from(0.5),
                    Cell::from(650_000.0),
                ],
            ],
        )
    }

    #[test]
    fn text_output_aligns_columns() {
        let (columns, rows) = sample();
        let text = render_text(&columns, &rows);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("city             placed"));
        assert!(lines[1].starts_with("---------------"));
        assert!(lines[2].starts_with("Pune             3"));
    }

    #[test]
    fn csv_output_quotes_and_leaves_nulls_empty() {
        let (columns, rows) = sample();
        let csv = render_csv(&columns, &rows).expect("csv");
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "city,placed,placement_rate,avg_package");
        assert_eq!(lines[1], "Pune,3,0.75,");
        assert_eq!(lines[2], "\"Navi Mumbai, MH\",12,0.50,650000.00");
    }

    #[test]
    fn json_output_keeps_types() {
        let (columns, rows) = sample();
        let json = render_json(&columns, &rows).expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value[0]["city"], "Pune");
        assert_eq!(value[0]["placed"], 3);
        assert!(value[0]["avg_package"].is_null());
        assert_eq!(value[1]["avg_package"], 650_000.0);
    }

    #[test]
    fn report_lists_every_pipeline() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).expect("date");
        let report = build_report(&Dataset::default(), date).expect("report");
        assert!(report.starts_with("# Placement Insights Report"));
        assert!(report.contains("Generated on 2025-06-02"));
        for name in PipelineName::ALL {
            assert!(report.contains(&format!("## {}. {}", name.number(), name)));
        }
        assert!(report.contains("No data for this pipeline."));
        assert!(report.contains("0 students"));
    }
}
