use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

use crate::error::ReportError;
use crate::percentile::{PercentileSummary, Thresholds};

/// A result row: one [`PercentileSummary`] with the caller's label values and the
/// wall-clock window it was measured in.
///
/// The timestamps are passed in explicitly; reporters keep no clock state between
/// rows.
#[derive(Debug, Serialize)]
pub struct ReportRow<'a> {
    pub started: DateTime<Local>,
    pub finished: DateTime<Local>,
    pub summary: &'a PercentileSummary,
    pub labels: Vec<String>,
}

/// A [`Reporter`] owns presentation: it turns summaries into text for some sink.
///
/// The engine never prints; drivers call a reporter with what a run produced. A
/// benchmark table is a title, an environment line describing the configuration, a
/// header of label names and one row per run.
///
/// # Example
/// ```rust
/// use dockbench::{Reporter, ReportError, report::ReportRow};
///
/// struct Silent;
///
/// impl Reporter for Silent {
///     fn title(&mut self, _: &str) -> Result<(), ReportError> { Ok(()) }
///     fn environment(&mut self, _: &[(&str, String)]) -> Result<(), ReportError> { Ok(()) }
///     fn labels(&mut self, _: &[&str]) -> Result<(), ReportError> { Ok(()) }
///     fn result(&mut self, _: &ReportRow<'_>) -> Result<(), ReportError> { Ok(()) }
/// }
/// ```
pub trait Reporter {
    fn title(&mut self, title: &str) -> Result<(), ReportError>;

    /// Describe the configuration a table was produced with.
    fn environment(&mut self, vars: &[(&str, String)]) -> Result<(), ReportError>;

    /// Names of the caller-supplied label columns that follow the percentiles.
    fn labels(&mut self, labels: &[&str]) -> Result<(), ReportError>;

    fn result(&mut self, row: &ReportRow<'_>) -> Result<(), ReportError>;
}

const TIME_FORMAT: &str = "%d:%H:%M:%S";

/// Tab-separated table, values in milliseconds with two decimals. The last column
/// counts the failed calls of the run.
///
/// ```text
/// time	%50	%75	%95	%99	#workers	qps	failures
/// 16:10:04:00	5.00	5.00	5.00	5.00	4	100.0000	0
/// 16:10:04:02	5.00	5.00	5.00	5.00	4	100.0000	0
/// ```
///
/// Each row is printed twice, stamped with the start and the end of its run, so a
/// plot over time shows how long every measurement lasted.
pub struct TableReporter<W> {
    out: W,
    thresholds: Thresholds,
}

impl<W: Write> TableReporter<W> {
    pub fn new(out: W, thresholds: Thresholds) -> Self {
        Self { out, thresholds }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for TableReporter<W> {
    fn title(&mut self, title: &str) -> Result<(), ReportError> {
        writeln!(self.out)?;
        writeln!(self.out, "{title}")?;
        Ok(())
    }

    fn environment(&mut self, vars: &[(&str, String)]) -> Result<(), ReportError> {
        let sorted: BTreeMap<_, _> = vars.iter().map(|(k, v)| (*k, v)).collect();
        for (k, v) in sorted {
            write!(self.out, "{k}={v} ")?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    fn labels(&mut self, labels: &[&str]) -> Result<(), ReportError> {
        let mut columns = vec!["time".to_string()];
        columns.extend(self.thresholds.labels());
        columns.extend(labels.iter().map(|l| l.to_string()));
        columns.push("failures".to_string());
        writeln!(self.out, "{}", columns.join("\t"))?;
        Ok(())
    }

    fn result(&mut self, row: &ReportRow<'_>) -> Result<(), ReportError> {
        let mut cells: Vec<String> = row
            .summary
            .values_ms
            .iter()
            .map(|v| format!("{v:.2}"))
            .collect();
        cells.extend(row.labels.iter().cloned());
        cells.push(row.summary.failures.to_string());
        let line = cells.join("\t");
        for at in [row.started, row.finished] {
            writeln!(self.out, "{}\t{line}", at.format(TIME_FORMAT))?;
        }
        Ok(())
    }
}

/// JSON lines: one object per call.
pub struct JsonReporter<W> {
    out: W,
    title: Option<String>,
    label_names: Vec<String>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JsonLine<'a> {
    Environment {
        title: Option<&'a str>,
        vars: BTreeMap<&'a str, &'a str>,
    },
    Result {
        title: Option<&'a str>,
        started: DateTime<Local>,
        finished: DateTime<Local>,
        percentiles_ms: BTreeMap<String, f64>,
        samples: usize,
        failures: u64,
        labels: BTreeMap<&'a str, &'a str>,
    },
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            title: None,
            label_names: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, line: &JsonLine<'_>) -> Result<(), ReportError> {
        serde_json::to_writer(&mut self.out, line)?;
        writeln!(self.out)?;
        Ok(())
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn title(&mut self, title: &str) -> Result<(), ReportError> {
        self.title = Some(title.to_string());
        Ok(())
    }

    fn environment(&mut self, vars: &[(&str, String)]) -> Result<(), ReportError> {
        let title = self.title.clone();
        let line = JsonLine::Environment {
            title: title.as_deref(),
            vars: vars.iter().map(|(k, v)| (*k, v.as_str())).collect(),
        };
        self.emit(&line)
    }

    fn labels(&mut self, labels: &[&str]) -> Result<(), ReportError> {
        self.label_names = labels.iter().map(|l| l.to_string()).collect();
        Ok(())
    }

    fn result(&mut self, row: &ReportRow<'_>) -> Result<(), ReportError> {
        let title = self.title.clone();
        let names = std::mem::take(&mut self.label_names);
        let line = JsonLine::Result {
            title: title.as_deref(),
            started: row.started,
            finished: row.finished,
            percentiles_ms: row
                .summary
                .thresholds
                .labels()
                .into_iter()
                .zip(row.summary.values_ms.iter().copied())
                .collect(),
            samples: row.summary.samples,
            failures: row.summary.failures,
            labels: names
                .iter()
                .map(String::as_str)
                .zip(row.labels.iter().map(String::as_str))
                .collect(),
        };
        let res = self.emit(&line);
        self.label_names = names;
        res
    }
}
