//! Offline charts of the cross run results file.
use super::{
    chart::{Chart, Series},
    Error, Result,
};
use csv::{ReaderBuilder, Trim};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Results file contents, columns named by its header row.
#[derive(Debug)]
pub struct Table {
    /// Column names.
    headers: Vec<String>,

    /// Fully numeric rows.
    rows: Vec<Vec<f64>>,
}

impl Table {
    /// Reads a tab delimited results file.
    ///
    /// `#` lines are skipped, the first remaining row names the columns and
    /// any later row that is not fully numeric, such as the header of a later
    /// sweep, is dropped.
    pub fn read(path: &Path) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .trim(Trim::All)
            .from_path(path)?;
        let mut records = rdr.records();
        let headers: Vec<String> = match records.next() {
            Some(record) => record?.iter().map(str::to_owned).collect(),
            None => return Err(Error::MissingHeader(path.to_owned())),
        };
        if headers.iter().all(|h| h.parse::<f64>().is_ok()) {
            return Err(Error::MissingHeader(path.to_owned()));
        }
        let mut rows = Vec::new();
        for record in records {
            let record = record?;
            let row: std::result::Result<Vec<f64>, _> = record.iter().map(str::parse).collect();
            match row {
                Ok(row) if row.len() == headers.len() => rows.push(row),
                _ => debug!(?record, "skipping row"),
            }
        }
        Ok(Self { headers, rows })
    }

    /// Column names.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of numeric rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no numeric rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of the named column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let i = self.headers.iter().position(|h| h == name)?;
        Some(self.rows.iter().map(|r| r[i]).collect())
    }

    /// Plots every column whose name contains `family` against column `x`.
    pub fn chart(&self, x: &str, family: &str, title: &str) -> Result<Chart> {
        let xs = self
            .column(x)
            .ok_or_else(|| Error::Config(format!("no column named {}", x)))?;
        let mut chart = Chart::new(title)
            .x_label(x)
            .y_label("Losses/Errors")
            .stroke_width(5.0);
        for name in self.headers.iter().filter(|h| h.contains(family) && *h != x) {
            if let Some(ys) = self.column(name) {
                chart = chart.series(Series::new(name.as_str(), xs.clone(), ys));
            }
        }
        Ok(chart)
    }
}

/// Renders the loss and displacement charts of a results file into `dir`.
pub fn render(path: &Path, dir: &Path, x: &str) -> Result<Vec<PathBuf>> {
    let table = Table::read(path)?;
    info!(path = %path.display(), rows = table.len(), "read results");
    if table.is_empty() {
        warn!(path = %path.display(), "results file holds no numeric rows");
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut ret = Vec::new();
    for (prefix, family) in &[("avg_loss", "loss"), ("disp_loss", "displacement")] {
        let title = format!("{} v/s {}", family, x);
        let out = dir.join(format!("{}_{}.svg", prefix, stem));
        table.chart(x, family, &title)?.save(&out)?;
        info!(path = %out.display(), "plot saved");
        ret.push(out);
    }
    Ok(ret)
}
