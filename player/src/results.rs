use quadview_common::ResultsError;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Tracking metrics compared between two result tables, in display order.
pub const COMPARED_METRICS: [&str; 3] = ["HOTA", "MOTA", "IDF1"];

/// A header row plus data rows, all kept as text.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl MetricTable {
    /// Parse comma-separated text. Blank lines are skipped, double-quoted
    /// fields may contain commas, and every row must match the header width.
    pub fn parse_csv(text: &str) -> Result<Self, ResultsError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let (_, header_line) = lines.next().ok_or(ResultsError::EmptyTable)?;
        let headers = split_fields(header_line);

        let mut rows = Vec::new();
        for (index, line) in lines {
            let fields = split_fields(line);
            if fields.len() != headers.len() {
                return Err(ResultsError::RaggedRow {
                    line: index + 1,
                    expected: headers.len(),
                    actual: fields.len(),
                });
            }
            rows.push(fields);
        }

        debug!("Parsed metrics table: {} column(s), {} row(s)", headers.len(), rows.len());
        Ok(Self { headers, rows })
    }

    pub async fn load(path: &Path) -> Result<Self, ResultsError> {
        let text = tokio::fs::read_to_string(path).await?;
        let table = Self::parse_csv(&text)?;
        info!("Loaded {} result row(s) from {:?}", table.row_count(), path);
        Ok(table)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Mean of a column, skipping empty cells.
    ///
    /// `None` if the column is absent, has no values, or holds any
    /// non-numeric cell.
    pub fn column_mean(&self, name: &str) -> Option<f64> {
        let column = self.headers.iter().position(|h| h == name)?;

        let mut sum = 0.0;
        let mut count = 0usize;
        for row in &self.rows {
            let cell = row[column].trim();
            if cell.is_empty() {
                continue;
            }
            sum += cell.parse::<f64>().ok()?;
            count += 1;
        }

        (count > 0).then(|| sum / count as f64)
    }

    /// Means of the compared metrics that this table can provide
    pub fn metric_means(&self) -> Vec<(&'static str, f64)> {
        COMPARED_METRICS
            .iter()
            .filter_map(|metric| self.column_mean(metric).map(|mean| (*metric, mean)))
            .collect()
    }
}

fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// How one metric moved from the baseline to the improved table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricChange {
    /// Signed relative change in percent
    Percent(f64),
    /// Baseline mean was zero; carries the new mean
    FromZero(f64),
    /// Both means were zero
    Unchanged,
    NoData,
}

impl MetricChange {
    pub fn between(baseline: Option<f64>, improved: Option<f64>) -> Self {
        match (baseline, improved) {
            (Some(old), Some(new)) if old != 0.0 => {
                MetricChange::Percent((new - old) / old.abs() * 100.0)
            }
            (Some(_), Some(new)) if new != 0.0 => MetricChange::FromZero(new),
            (Some(_), Some(_)) => MetricChange::Unchanged,
            _ => MetricChange::NoData,
        }
    }
}

impl fmt::Display for MetricChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricChange::Percent(percent) => write!(f, "{:+.2}%", percent),
            MetricChange::FromZero(new) => write!(f, "(N/A → {:.3})", new),
            MetricChange::Unchanged => f.write_str("(0.00%)"),
            MetricChange::NoData => f.write_str("(no data)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonSummary {
    pub changes: Vec<(&'static str, MetricChange)>,
}

impl ComparisonSummary {
    pub fn compare(baseline: &MetricTable, improved: &MetricTable) -> Self {
        let changes = COMPARED_METRICS
            .iter()
            .map(|metric| {
                let change =
                    MetricChange::between(baseline.column_mean(metric), improved.column_mean(metric));
                (*metric, change)
            })
            .collect();
        Self { changes }
    }
}

impl fmt::Display for ComparisonSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Compared to baseline: ")?;
        for (i, (metric, change)) in self.changes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", metric, change)?;
        }
        Ok(())
    }
}

/// Summary line for whatever tables are loaded so far.
pub fn summary_text(baseline: Option<&MetricTable>, improved: Option<&MetricTable>) -> String {
    match (baseline, improved) {
        (Some(baseline), Some(improved)) => ComparisonSummary::compare(baseline, improved).to_string(),
        _ => "Load both result files to compare.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BASELINE: &str = "Sequence,HOTA,MOTA,IDF1\nseq-01,0.80,0.70,0.0\nseq-02,0.90,0.80,0.0\n";

    #[test]
    fn test_column_mean() {
        let table = MetricTable::parse_csv(BASELINE).unwrap();

        assert_eq!(table.row_count(), 2);
        assert!((table.column_mean("HOTA").unwrap() - 0.85).abs() < 1e-9);
        assert_eq!(table.column_mean("Missing"), None);
        // Text column
        assert_eq!(table.column_mean("Sequence"), None);
    }

    #[test]
    fn test_empty_cells_are_skipped() {
        let table = MetricTable::parse_csv("HOTA,MOTA\n0.5,\n0.7,\n").unwrap();

        assert!((table.column_mean("HOTA").unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(table.column_mean("MOTA"), None);
    }

    #[test]
    fn test_quoted_fields_and_bom() {
        let table =
            MetricTable::parse_csv("\u{feff}\"Name, full\",HOTA\n\"a \"\"b\"\"\",0.25\n").unwrap();

        assert_eq!(table.headers(), &["Name, full".to_string(), "HOTA".to_string()]);
        assert_eq!(table.column_mean("HOTA"), Some(0.25));
    }

    #[test]
    fn test_malformed_tables() {
        assert!(matches!(
            MetricTable::parse_csv("\n\n"),
            Err(ResultsError::EmptyTable)
        ));
        assert!(matches!(
            MetricTable::parse_csv("HOTA,MOTA\n0.1\n"),
            Err(ResultsError::RaggedRow { line: 2, expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_metric_change_cases() {
        assert_eq!(MetricChange::between(Some(0.8), Some(0.9)).to_string(), "+12.50%");
        assert_eq!(MetricChange::between(Some(0.8), Some(0.4)).to_string(), "-50.00%");
        assert_eq!(MetricChange::between(Some(-0.5), Some(-0.25)).to_string(), "+50.00%");
        assert_eq!(MetricChange::between(Some(0.0), Some(0.8)).to_string(), "(N/A → 0.800)");
        assert_eq!(MetricChange::between(Some(0.0), Some(0.0)), MetricChange::Unchanged);
        assert_eq!(MetricChange::between(None, Some(0.8)), MetricChange::NoData);
    }

    #[test]
    fn test_comparison_summary_text() {
        let baseline = MetricTable::parse_csv(BASELINE).unwrap();
        let improved = MetricTable::parse_csv("HOTA,IDF1\n0.935,0.5\n").unwrap();

        let summary = summary_text(Some(&baseline), Some(&improved));

        assert_eq!(
            summary,
            "Compared to baseline: HOTA +10.00%, MOTA (no data), IDF1 (N/A → 0.500)"
        );
    }

    #[test]
    fn test_summary_needs_both_tables() {
        let baseline = MetricTable::parse_csv(BASELINE).unwrap();
        assert_eq!(summary_text(Some(&baseline), None), "Load both result files to compare.");
        assert_eq!(summary_text(None, None), "Load both result files to compare.");
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BASELINE.as_bytes()).unwrap();

        let table = MetricTable::load(file.path()).await.unwrap();

        assert_eq!(table.metric_means().len(), 3);
        assert!(MetricTable::load(Path::new("/no/such/results.csv")).await.is_err());
    }
}
