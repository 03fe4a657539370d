//! CSV loading and the text context handed to the model for data questions.

use std::fmt::{self, Write as _};
use std::io::Read;
use std::path::Path;

use crate::constants::limits::{CSV_HEAD_ROWS, CSV_LARGE_ROWS};
use crate::error::{ChatError, Result};

/// Cell values read as missing, after trimming.
const MISSING_MARKERS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
    /// Every value is missing.
    Empty,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
            ColumnType::Empty => "empty",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetInfo {
    pub rows: usize,
    pub columns: usize,
    pub column_names: Vec<String>,
    pub column_types: Vec<ColumnType>,
    /// Missing cells per column, same order as `column_names`.
    pub missing: Vec<usize>,
    /// Bytes held by cell text.
    pub memory_bytes: usize,
}

impl DatasetInfo {
    pub fn has_nulls(&self) -> bool {
        self.missing.iter().any(|m| *m > 0)
    }
}

/// Summary statistics of one numeric column.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericSummary {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

/// A parsed CSV table. Ragged rows are padded or cut to the header width.
#[derive(Debug, Clone)]
pub struct CsvDataset {
    source: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvDataset {
    pub fn from_reader<R: Read>(source: impl Into<String>, reader: R) -> Result<Self> {
        let source = source.into();
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(ChatError::Csv("The CSV file contains no data".to_string()));
        }

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(ChatError::Csv("The CSV file is empty".to_string()));
        }

        tracing::info!(
            "CSV loaded from {source}: {} rows, {} columns",
            rows.len(),
            headers.len()
        );
        if rows.len() > CSV_LARGE_ROWS {
            tracing::warn!("Large CSV detected: {} rows", rows.len());
        }

        Ok(Self {
            source,
            headers,
            rows,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ChatError::Csv(format!("File not found: {}", path.display()))
            } else {
                ChatError::Io(e)
            }
        })?;
        Self::from_reader(path.display().to_string(), file)
    }

    pub async fn fetch(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ChatError::Csv("Please provide a valid URL".to_string()));
        }
        tracing::info!("Loading CSV from URL ({} chars)", url.len());
        let bytes = reqwest::get(url).await?.error_for_status()?.bytes().await?;
        Self::from_reader(url, bytes.as_ref())
    }

    /// Load from an `http(s)://` URL or a local path.
    pub async fn load(source: &str) -> Result<Self> {
        let source = source.trim();
        if source.starts_with("http://") || source.starts_with("https://") {
            Self::fetch(source).await
        } else {
            Self::from_path(Path::new(source))
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn is_large(&self) -> bool {
        self.rows.len() > CSV_LARGE_ROWS
    }

    fn column(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows.iter().map(move |r| r[index].as_str())
    }

    pub fn info(&self) -> DatasetInfo {
        let column_types = (0..self.headers.len())
            .map(|i| infer_type(self.column(i)))
            .collect();
        let missing = (0..self.headers.len())
            .map(|i| self.column(i).filter(|c| is_missing(c)).count())
            .collect();
        let memory_bytes = self
            .rows
            .iter()
            .flat_map(|r| r.iter())
            .map(String::len)
            .sum::<usize>()
            + self.headers.iter().map(String::len).sum::<usize>();

        DatasetInfo {
            rows: self.rows.len(),
            columns: self.headers.len(),
            column_names: self.headers.clone(),
            column_types,
            missing,
            memory_bytes,
        }
    }

    /// Describe-style statistics for every integer or float column.
    pub fn numeric_summaries(&self) -> Vec<NumericSummary> {
        let info = self.info();
        self.headers
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                matches!(
                    info.column_types[*i],
                    ColumnType::Integer | ColumnType::Float
                )
            })
            .filter_map(|(i, name)| {
                let values: Vec<f64> = self
                    .column(i)
                    .filter(|c| !is_missing(c))
                    .filter_map(|c| c.trim().parse::<f64>().ok())
                    .collect();
                summarize(name, values)
            })
            .collect()
    }

    pub fn format_summary(&self) -> String {
        let info = self.info();
        format!(
            "**Dataset Summary:**\n\
             - **Rows:** {}\n\
             - **Columns:** {}\n\
             - **Memory:** {:.2} KB\n\
             - **Has Missing Values:** {}\n\n\
             **Columns:** {}",
            group_thousands(info.rows),
            info.columns,
            info.memory_bytes as f64 / 1024.0,
            if info.has_nulls() { "Yes" } else { "No" },
            info.column_names.join(", ")
        )
    }

    /// Full analyst context: schema, statistics, sample and up to `max_rows`
    /// rows of data, plus a missing-value report.
    pub fn generate_context(&self, max_rows: usize) -> String {
        let info = self.info();
        let rows = info.rows;
        let rows_to_send = rows.min(max_rows);

        let mut context = String::new();
        let _ = write!(
            context,
            "You are a helpful data analyst. A user has loaded a CSV, and they want to ask questions about it.\n\n\
             Here is the data's schema and summary statistics:\n\n\
             **Dataset Overview:**\n\
             - Total Rows: {}\n\
             - Columns: {}\n\
             - Column Names: {}\n\n",
            group_thousands(rows),
            info.columns,
            info.column_names.join(", ")
        );

        let _ = write!(
            context,
            "**Data Schema:**\n```\n{}```\n\n",
            self.render_schema(&info)
        );
        let _ = write!(
            context,
            "**Statistical Summary:**\n```\n{}```\n\n",
            self.render_describe()
        );
        let _ = write!(
            context,
            "**First {} Rows:**\n```\n{}```\n\n",
            CSV_HEAD_ROWS.min(rows),
            self.render_rows(CSV_HEAD_ROWS)
        );
        let _ = write!(
            context,
            "**Complete Dataset ({} of {} rows):**\n```\n{}```\n",
            group_thousands(rows_to_send),
            group_thousands(rows),
            self.render_rows(rows_to_send)
        );

        context.push_str("\n**Missing Values Analysis:**\n");
        let mut missing: Vec<(&String, usize)> = info
            .column_names
            .iter()
            .zip(info.missing.iter().copied())
            .filter(|(_, count)| *count > 0)
            .collect();
        if missing.is_empty() {
            context.push_str("- No missing values found in any column\n");
        } else {
            missing.sort_by(|a, b| b.1.cmp(&a.1));
            for (column, count) in missing {
                let _ = writeln!(
                    context,
                    "- {column}: {count} missing values ({:.1}%)",
                    count as f64 / rows as f64 * 100.0
                );
            }
        }

        if rows > max_rows {
            let _ = writeln!(
                context,
                "\n**Note:** Dataset truncated to {} rows for AI analysis. Full dataset has {} rows.",
                group_thousands(max_rows),
                group_thousands(rows)
            );
        }

        context
    }

    fn render_schema(&self, info: &DatasetInfo) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "RangeIndex: {} entries, 0 to {}",
            info.rows,
            info.rows.saturating_sub(1)
        );
        let _ = writeln!(out, "Data columns (total {} columns):", info.columns);

        let header = vec![
            "#".to_string(),
            "Column".to_string(),
            "Non-Null Count".to_string(),
            "Type".to_string(),
        ];
        let body: Vec<Vec<String>> = info
            .column_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                vec![
                    i.to_string(),
                    name.clone(),
                    format!("{} non-null", info.rows - info.missing[i]),
                    info.column_types[i].to_string(),
                ]
            })
            .collect();
        out.push_str(&render_table(&header, &body));
        out
    }

    fn render_describe(&self) -> String {
        let summaries = self.numeric_summaries();
        if summaries.is_empty() {
            return "No numeric columns\n".to_string();
        }

        let mut header = vec![String::new()];
        header.extend(summaries.iter().map(|s| s.column.clone()));

        let stat_rows: [(&str, fn(&NumericSummary) -> String); 8] = [
            ("count", |s| s.count.to_string()),
            ("mean", |s| format_float(s.mean)),
            ("std", |s| format_float(s.std)),
            ("min", |s| format_float(s.min)),
            ("25%", |s| format_float(s.q25)),
            ("50%", |s| format_float(s.median)),
            ("75%", |s| format_float(s.q75)),
            ("max", |s| format_float(s.max)),
        ];
        let body: Vec<Vec<String>> = stat_rows
            .iter()
            .map(|(label, stat)| {
                let mut row = vec![label.to_string()];
                row.extend(summaries.iter().map(stat));
                row
            })
            .collect();
        render_table(&header, &body)
    }

    fn render_rows(&self, limit: usize) -> String {
        let mut header = vec![String::new()];
        header.extend(self.headers.iter().cloned());
        let body: Vec<Vec<String>> = self
            .rows
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, row)| {
                let mut line = vec![i.to_string()];
                line.extend(row.iter().cloned());
                line
            })
            .collect();
        render_table(&header, &body)
    }
}

pub fn is_missing(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell.trim())
}

fn infer_type<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut seen = false;
    let mut all_int = true;
    let mut all_float = true;
    let mut all_bool = true;

    for value in values.filter(|v| !is_missing(v)) {
        seen = true;
        let v = value.trim();
        all_int &= v.parse::<i64>().is_ok();
        all_float &= v.parse::<f64>().is_ok();
        all_bool &= matches!(v.to_ascii_lowercase().as_str(), "true" | "false");
    }

    match (seen, all_int, all_float, all_bool) {
        (false, ..) => ColumnType::Empty,
        (true, true, _, _) => ColumnType::Integer,
        (true, _, true, _) => ColumnType::Float,
        (true, _, _, true) => ColumnType::Boolean,
        _ => ColumnType::Text,
    }
}

fn summarize(column: &str, mut values: Vec<f64>) -> Option<NumericSummary> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    let std = if count > 1 {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        var.sqrt()
    } else {
        f64::NAN
    };

    Some(NumericSummary {
        column: column.to_string(),
        count,
        mean,
        std,
        min: values[0],
        q25: percentile(&values, 0.25),
        median: percentile(&values, 0.5),
        q75: percentile(&values, 0.75),
        max: values[count - 1],
    })
}

/// Linear interpolation between closest ranks on sorted input.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn format_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else {
        format!("{v:.6}")
    }
}

/// Right-aligned plain text table.
fn render_table(header: &[String], body: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in body {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();
    for row in std::iter::once(header).chain(body.iter().map(Vec::as_slice)) {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{cell:>w$}", w = *w))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    }
    out
}

fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
