//! Results collection.
//!
//! The native client appends one row per measured problem/solution pair to a CSV results file.
//! This module extracts one metric column from such a file and reduces it to summary statistics,
//! printed back as CSV so several summaries can be pasted into the same spreadsheet.

use crate::error::{ClientError, Result};

use statistical::{mean, standard_deviation};
use tracing::debug;

use std::{
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

/// Statistics of one metric column of a client results file.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultsSummary {
    /// Results file the values were read from.
    source: PathBuf,
    /// Name of the metric column, as spelled in the file.
    metric: String,
    /// Number of rows holding a numeric value.
    count: usize,
    min: f64,
    median: f64,
    max: f64,
    mean: f64,
    /// Sample standard deviation, zero with fewer than two values.
    stddev: f64,
}

impl ResultsSummary {
    pub fn print_csv_header(output: &mut dyn Write) -> io::Result<()> {
        writeln!(output, "file,metric,count,min,median,max,mean,stddev")
    }

    /// Summarizes the values of `metric_column` in the results file at `path`.
    ///
    /// The column is matched case-insensitively. Rows whose value is not a number, such as the
    /// rows of solutions the client skipped, are ignored.
    pub fn from_csv(path: &Path, metric_column: &str) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| ClientError::file(path, e))?;
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());

        let header = lines.next().ok_or_else(|| {
            ClientError::MissingArtifact(format!("results file {} is empty", path.display()))
        })?;
        let (column, metric) = split_row(header)
            .enumerate()
            .find(|(_, name)| name.eq_ignore_ascii_case(metric_column))
            .map(|(idx, name)| (idx, name.to_string()))
            .ok_or_else(|| {
                ClientError::MissingArtifact(format!(
                    "no `{metric_column}` column in {}",
                    path.display()
                ))
            })?;

        let mut values = Vec::new();
        for (row, line) in lines.enumerate() {
            match split_row(line).nth(column).map(str::parse::<f64>) {
                Some(Ok(value)) => values.push(value),
                _ => debug!("Skipping row {} of {}", row + 1, path.display()),
            }
        }

        Self::from_values(path, metric, &mut values).ok_or_else(|| {
            ClientError::MissingArtifact(format!(
                "no `{metric_column}` values in {}",
                path.display()
            ))
        })
    }

    /// Summary of `values`, or `None` when there are none.
    fn from_values(source: &Path, metric: String, values: &mut [f64]) -> Option<Self> {
        // Sort values to avoid having to do two passes to get both min and max elements
        values.sort_by(f64::total_cmp);

        let min = *values.first()?;
        let max = *values.last()?;
        let median = values[values.len() / 2];
        let mean = mean(values);
        let stddev = match values.len() {
            0 | 1 => 0.0,
            _ => standard_deviation(values, Some(mean)),
        };

        Some(Self {
            source: source.to_path_buf(),
            metric,
            count: values.len(),
            min,
            median,
            max,
            mean,
            stddev,
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn median(&self) -> f64 {
        self.median
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn stddev(&self) -> f64 {
        self.stddev
    }
}

/// Cells of a CSV row, trimmed of whitespace and quotes.
fn split_row(line: &str) -> impl Iterator<Item = &str> {
    line.split(',').map(|cell| cell.trim().trim_matches('"'))
}

impl fmt::Display for ResultsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{:.6},{:.6}",
            self.source.display(),
            self.metric,
            self.count,
            self.min,
            self.median,
            self.max,
            self.mean,
            self.stddev,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS: &str = "\
run,problem-progress,solution-progress,operation,problem-sizes,solution,validation,time-us,GFlops,empty,total-gran
0,0/2,0/3,Contraction_l_Ailk_Bljk_Cijk_Dijk,128x128x1x512,Cijk_MT64x64,PASSED,10.0,1000,,1
0,0/2,1/3,Contraction_l_Ailk_Bljk_Cijk_Dijk,128x128x1x512,Cijk_MT128x64,PASSED,5.0,3000,,1
0,0/2,2/3,Contraction_l_Ailk_Bljk_Cijk_Dijk,128x128x1x512,Cijk_MT32x32,SKIPPED,,,,
0,1/2,0/3,Contraction_l_Ailk_Bljk_Cijk_Dijk,256x256x1x512,Cijk_MT64x64,PASSED,20.0,2000,,1
";

    fn results_file(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn summarizes_the_metric_column() {
        let (_dir, path) = results_file(RESULTS);
        let summary = ResultsSummary::from_csv(&path, "gflops").unwrap();

        assert_eq!(summary.count(), 3);
        assert_eq!(summary.min(), 1000.0);
        assert_eq!(summary.median(), 2000.0);
        assert_eq!(summary.max(), 3000.0);
        assert_eq!(summary.mean(), 2000.0);
        assert!((summary.stddev() - 1000.0).abs() < 1e-9);
        assert!(summary.to_string().ends_with(",GFlops,3,1000,2000,3000,2000.000000,1000.000000"));
    }

    #[test]
    fn single_value_has_no_spread() {
        let (_dir, path) = results_file("time-us,gflops\n4.5,12.5\n");
        let summary = ResultsSummary::from_csv(&path, "time-us").unwrap();
        assert_eq!(summary.count(), 1);
        assert_eq!(summary.stddev(), 0.0);
        assert_eq!(summary.median(), 4.5);
    }

    #[test]
    fn missing_column_or_values_are_reported() {
        let (_dir, path) = results_file(RESULTS);
        assert!(matches!(
            ResultsSummary::from_csv(&path, "bandwidth"),
            Err(ClientError::MissingArtifact(_))
        ));
        assert!(matches!(
            ResultsSummary::from_csv(&path, "empty"),
            Err(ClientError::MissingArtifact(_))
        ));

        let (_dir, empty) = results_file("\n");
        assert!(ResultsSummary::from_csv(&empty, "gflops").is_err());
    }

    #[test]
    fn header_lists_display_fields() {
        let mut out = Vec::new();
        ResultsSummary::print_csv_header(&mut out).unwrap();
        let header = String::from_utf8(out).unwrap();
        assert_eq!(header.trim_end().split(',').count(), 8);
    }
}
