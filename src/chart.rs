//! Line charts rendered as SVG documents.
use super::Result;
use std::{fmt::Write as _, fs, path::Path};

/// Stroke colors, assigned to series in order.
const PALETTE: [&str; 8] = [
    "#1f77b4", "#d62728", "#2ca02c", "#000000", "#ff7f0e", "#9467bd", "#8c564b", "#e377c2",
];

/// Space around the plot area: left, right, top, bottom.
const MARGIN: (f64, f64, f64, f64) = (70.0, 210.0, 40.0, 50.0);

/// Number of intervals between axis ticks.
const TICKS: usize = 5;

/// One labelled line.
#[derive(Clone, Debug)]
pub struct Series {
    label: String,
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Series {
    /// Pairs x and y values, dropping any unpaired tail.
    pub fn new(label: impl Into<String>, x: Vec<f64>, y: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            x,
            y,
        }
    }

    /// Finite points of the line.
    fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x
            .iter()
            .zip(&self.y)
            .map(|(x, y)| (*x, *y))
            .filter(|(x, y)| x.is_finite() && y.is_finite())
    }
}

/// A titled set of lines sharing axes.
#[derive(Clone, Debug)]
pub struct Chart {
    title: String,
    x_label: String,
    y_label: String,
    series: Vec<Series>,
    y_range: Option<(f64, f64)>,
    stroke_width: f64,
    size: (f64, f64),
}

/// Escapes text for use inside an SVG element.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Widens a degenerate range so it can be scaled.
fn span(lo: f64, hi: f64) -> (f64, f64) {
    if !lo.is_finite() || !hi.is_finite() {
        (0.0, 1.0)
    } else if lo == hi {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}

/// Compact tick label.
fn tick(v: f64) -> String {
    if v != 0.0 && (v.abs() >= 1e4 || v.abs() < 1e-2) {
        format!("{:.1e}", v)
    } else {
        let s = format!("{:.2}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_owned()
    }
}

impl Chart {
    /// Starts an empty chart.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            x_label: Default::default(),
            y_label: Default::default(),
            series: Default::default(),
            y_range: None,
            stroke_width: 2.0,
            size: (900.0, 500.0),
        }
    }

    /// Adds a line.
    pub fn series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    /// Labels the horizontal axis.
    pub fn x_label(mut self, label: impl Into<String>) -> Self {
        self.x_label = label.into();
        self
    }

    /// Labels the vertical axis.
    pub fn y_label(mut self, label: impl Into<String>) -> Self {
        self.y_label = label.into();
        self
    }

    /// Fixes the vertical axis, clipping lines outside it.
    pub fn y_range(mut self, lo: f64, hi: f64) -> Self {
        self.y_range = Some((lo, hi));
        self
    }

    /// Sets the line thickness.
    pub fn stroke_width(mut self, width: f64) -> Self {
        self.stroke_width = width;
        self
    }

    /// Data bounds as ((x lo, x hi), (y lo, y hi)).
    fn bounds(&self) -> ((f64, f64), (f64, f64)) {
        let fold = |(lo, hi): (f64, f64), v: f64| (lo.min(v), hi.max(v));
        let init = (f64::INFINITY, f64::NEG_INFINITY);
        let points = || self.series.iter().flat_map(Series::points);
        let (x0, x1) = points().map(|p| p.0).fold(init, fold);
        let (y0, y1) = match self.y_range {
            Some(r) => r,
            None => points().map(|p| p.1).fold(init, fold),
        };
        (span(x0, x1), span(y0, y1))
    }

    /// Renders the chart as an SVG document.
    pub fn to_svg(&self) -> Result<String> {
        let (width, height) = self.size;
        let (left, right, top, bottom) = MARGIN;
        let (plot_w, plot_h) = (width - left - right, height - top - bottom);
        let ((x0, x1), (y0, y1)) = self.bounds();
        let sx = |x: f64| left + (x - x0) / (x1 - x0) * plot_w;
        let sy = |y: f64| top + plot_h - (y - y0) / (y1 - y0) * plot_h;

        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" font-family="sans-serif" font-size="12">"#,
            width, height
        );
        write!(
            svg,
            r#"<rect width="{}" height="{}" fill="white"/><clipPath id="plot"><rect x="{}" y="{}" width="{}" height="{}"/></clipPath>"#,
            width, height, left, top, plot_w, plot_h
        )?;
        write!(
            svg,
            r#"<text x="{}" y="24" text-anchor="middle" font-size="16">{}</text>"#,
            left + plot_w / 2.0,
            escape(&self.title)
        )?;

        for i in 0..=TICKS {
            let f = i as f64 / TICKS as f64;
            let (xv, yv) = (x0 + f * (x1 - x0), y0 + f * (y1 - y0));
            let (px, py) = (sx(xv), sy(yv));
            write!(
                svg,
                r##"<line x1="{px:.2}" y1="{}" x2="{px:.2}" y2="{}" stroke="#dddddd"/><text x="{px:.2}" y="{}" text-anchor="middle">{}</text>"##,
                top,
                top + plot_h,
                top + plot_h + 18.0,
                tick(xv),
                px = px
            )?;
            write!(
                svg,
                r##"<line x1="{}" y1="{py:.2}" x2="{}" y2="{py:.2}" stroke="#dddddd"/><text x="{}" y="{py:.2}" text-anchor="end" dominant-baseline="middle">{}</text>"##,
                left,
                left + plot_w,
                left - 6.0,
                tick(yv),
                py = py
            )?;
        }
        write!(
            svg,
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="none" stroke="black"/>"#,
            left, top, plot_w, plot_h
        )?;
        write!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle">{}</text>"#,
            left + plot_w / 2.0,
            height - 10.0,
            escape(&self.x_label)
        )?;
        write!(
            svg,
            r#"<text x="16" y="{y}" text-anchor="middle" transform="rotate(-90 16 {y})">{}</text>"#,
            escape(&self.y_label),
            y = top + plot_h / 2.0
        )?;

        for (i, series) in self.series.iter().enumerate() {
            let color = PALETTE[i % PALETTE.len()];
            let points: Vec<String> = series
                .points()
                .map(|(x, y)| format!("{:.2},{:.2}", sx(x), sy(y)))
                .collect();
            write!(
                svg,
                r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="{}" clip-path="url(#plot)"/>"#,
                points.join(" "),
                color,
                self.stroke_width
            )?;
            let ly = top + 10.0 + 20.0 * i as f64;
            let lx = width - right + 15.0;
            write!(
                svg,
                r#"<rect x="{}" y="{}" width="18" height="4" fill="{}"/><text x="{}" y="{}" dominant-baseline="middle">{}</text>"#,
                lx,
                ly - 2.0,
                color,
                lx + 24.0,
                ly,
                escape(&series.label)
            )?;
        }
        svg.push_str("</svg>");
        Ok(svg)
    }

    /// Writes the SVG document, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, self.to_svg()?)?;
        Ok(())
    }
}
