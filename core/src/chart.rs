//! Predicted-weight line chart, as SVG for the web form and as text for the
//! terminal.

use std::fmt::Write;

use chrono::NaiveDate;

const MARGIN_LEFT: f64 = 56.0;
const MARGIN_RIGHT: f64 = 16.0;
const MARGIN_TOP: f64 = 16.0;
const MARGIN_BOTTOM: f64 = 32.0;
/// Minimum visible weight range so a flat line is not stretched to the edges.
const MIN_SPAN_KG: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bounds {
    first: NaiveDate,
    days: i64,
    min_kg: f64,
    max_kg: f64,
}

impl Bounds {
    fn of(points: &[(NaiveDate, f64)]) -> Option<Self> {
        let first = points.iter().map(|(d, _)| *d).min()?;
        let last = points.iter().map(|(d, _)| *d).max()?;
        let mut min_kg = points.iter().map(|(_, kg)| *kg).fold(f64::INFINITY, f64::min);
        let mut max_kg = points
            .iter()
            .map(|(_, kg)| *kg)
            .fold(f64::NEG_INFINITY, f64::max);
        let span = max_kg - min_kg;
        if span < MIN_SPAN_KG {
            let pad = (MIN_SPAN_KG - span) / 2.0;
            min_kg -= pad;
            max_kg += pad;
        }
        Some(Self {
            first,
            days: (last - first).num_days(),
            min_kg,
            max_kg,
        })
    }

    /// Horizontal position in `0.0..=1.0`; a single day sits in the middle.
    #[allow(clippy::cast_precision_loss)]
    fn x_fraction(&self, date: NaiveDate) -> f64 {
        if self.days == 0 {
            return 0.5;
        }
        (date - self.first).num_days() as f64 / self.days as f64
    }

    /// Vertical position in `0.0..=1.0`, 1.0 being the heaviest.
    fn y_fraction(&self, kg: f64) -> f64 {
        (kg - self.min_kg) / (self.max_kg - self.min_kg)
    }
}

/// Render the series as a standalone SVG document. Returns `None` for an
/// empty series.
#[must_use]
pub fn render_svg(points: &[(NaiveDate, f64)], width: u32, height: u32) -> Option<String> {
    let bounds = Bounds::of(points)?;
    let (w, h) = (f64::from(width), f64::from(height));
    let plot_w = w - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = h - MARGIN_TOP - MARGIN_BOTTOM;
    let px = |date: NaiveDate| MARGIN_LEFT + bounds.x_fraction(date) * plot_w;
    let py = |kg: f64| MARGIN_TOP + (1.0 - bounds.y_fraction(kg)) * plot_h;

    let mut svg = String::new();
    let _ = write!(
        svg,
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}" role="img" aria-label="Predicted weight over time">"##
    );
    let _ = write!(
        svg,
        r##"<rect x="0" y="0" width="{width}" height="{height}" fill="#ffffff"/>"##
    );

    // Axes
    let (x0, y0, x1, y1) = (MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT + plot_w, MARGIN_TOP + plot_h);
    let _ = write!(
        svg,
        r##"<path d="M{x0:.1} {y0:.1} L{x0:.1} {y1:.1} L{x1:.1} {y1:.1}" stroke="#888888" fill="none"/>"##
    );

    // Weight labels and gridlines at min, mid, max
    for step in 0..=2 {
        let kg = bounds.min_kg + (bounds.max_kg - bounds.min_kg) * f64::from(step) / 2.0;
        let y = py(kg);
        let _ = write!(
            svg,
            r##"<line x1="{x0:.1}" y1="{y:.1}" x2="{x1:.1}" y2="{y:.1}" stroke="#eeeeee"/><text x="{:.1}" y="{:.1}" font-size="11" text-anchor="end" fill="#555555">{kg:.1}</text>"##,
            x0 - 6.0,
            y + 4.0
        );
    }

    // Date labels at both ends
    let last = points.iter().map(|(d, _)| *d).max().unwrap_or(bounds.first);
    let _ = write!(
        svg,
        r##"<text x="{x0:.1}" y="{:.1}" font-size="11" fill="#555555">{}</text>"##,
        y1 + 18.0,
        bounds.first.format("%Y-%m-%d")
    );
    if last != bounds.first {
        let _ = write!(
            svg,
            r##"<text x="{x1:.1}" y="{:.1}" font-size="11" text-anchor="end" fill="#555555">{}</text>"##,
            y1 + 18.0,
            last.format("%Y-%m-%d")
        );
    }

    let mut sorted = points.to_vec();
    sorted.sort_by_key(|(date, _)| *date);
    let coords: Vec<String> = sorted
        .iter()
        .map(|(date, kg)| format!("{:.1},{:.1}", px(*date), py(*kg)))
        .collect();
    let _ = write!(
        svg,
        r##"<polyline points="{}" fill="none" stroke="#1f77b4" stroke-width="2"/>"##,
        coords.join(" ")
    );
    for (date, kg) in &sorted {
        let _ = write!(
            svg,
            r##"<circle cx="{:.1}" cy="{:.1}" r="3" fill="#1f77b4"><title>{}: {kg:.2} kg</title></circle>"##,
            px(*date),
            py(*kg),
            date.format("%Y-%m-%d")
        );
    }
    svg.push_str("</svg>");
    Some(svg)
}

/// Render the series as a character grid with a weight axis on the left and
/// the first and last dates underneath. Returns `None` for an empty series.
#[must_use]
pub fn render_text(points: &[(NaiveDate, f64)], width: usize, height: usize) -> Option<String> {
    let bounds = Bounds::of(points)?;
    let width = width.max(2);
    let height = height.max(2);
    let mut grid = vec![vec![' '; width]; height];

    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
    let cell = |frac: f64, cells: usize| ((frac * (cells - 1) as f64).round() as usize).min(cells - 1);

    for (date, kg) in points {
        let col = cell(bounds.x_fraction(*date), width);
        let row = height - 1 - cell(bounds.y_fraction(*kg), height);
        grid[row][col] = '*';
    }

    let mut out = String::new();
    for (idx, row) in grid.iter().enumerate() {
        let label = if idx == 0 {
            format!("{:>7.2}", bounds.max_kg)
        } else if idx == height - 1 {
            format!("{:>7.2}", bounds.min_kg)
        } else {
            " ".repeat(7)
        };
        let line: String = row.iter().collect();
        let _ = writeln!(out, "{label} |{}", line.trim_end());
    }
    let _ = writeln!(out, "{} +{}", " ".repeat(7), "-".repeat(width));

    let first = bounds.first.format("%Y-%m-%d").to_string();
    let last = points.iter().map(|(d, _)| *d).max().unwrap_or(bounds.first);
    if last == bounds.first {
        let _ = writeln!(out, "{}  {first}", " ".repeat(7));
    } else {
        let last = last.format("%Y-%m-%d").to_string();
        let gap = width.saturating_sub(first.len() + last.len()).max(1);
        let _ = writeln!(out, "{}  {first}{}{last}", " ".repeat(7), " ".repeat(gap));
    }
    Some(out)
}
