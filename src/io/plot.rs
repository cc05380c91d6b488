//! SVG defect plots.
//!
//! Every plot is a fixed-size panel: a title, a legend column on the left,
//! and the surface area where each defect is drawn at `(x_pct, y_pct)`
//! with its color taken from the top/bottom face and its marker shape from
//! the FM size class. Panels can be saved alone or tiled into a grid.

use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use svg::Document;
use svg::node::element::{Circle, Group, Image, Line, Polygon, Rectangle, Text};
use thiserror::Error;

use super::report::{TopBottomCounts, TransitionReport};
use crate::algorithms::MarkerShape;
use crate::config::PlotSection;
use crate::core::{DefectRecord, TopBottom};

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PlotError>;

mod colors {
    pub const UNKNOWN: &str = "#888888";
    pub const BEFORE_AFTER: &str = "#1f77b4";
    pub const STAYED: &str = "#2ca02c";
    pub const REMOVED: &str = "#d62728";
    pub const ADDED: &str = "#9467bd";
}

/// Share of the panel width reserved for legend and summary.
const LEGEND_FRACTION: f64 = 0.15;
const TITLE_HEIGHT: f64 = 50.0;
const PADDING: f64 = 20.0;

/// A rendered panel and its size.
#[derive(Debug, Clone)]
pub struct Panel {
    pub group: Group,
    pub width: f64,
    pub height: f64,
}

pub struct PlotRenderer {
    style: PlotSection,
}

impl PlotRenderer {
    pub fn new(style: PlotSection) -> Self {
        Self { style }
    }

    fn width(&self) -> f64 {
        f64::from(self.style.panel_width)
    }

    fn height(&self) -> f64 {
        f64::from(self.style.panel_height)
    }

    /// Surface area inside the panel: (x, y, width, height).
    fn plot_area(&self) -> (f64, f64, f64, f64) {
        let x = self.width() * LEGEND_FRACTION + PADDING;
        let y = TITLE_HEIGHT;
        (
            x,
            y,
            (self.width() - x - PADDING).max(1.0),
            (self.height() - y - PADDING).max(1.0),
        )
    }

    fn side_color(&self, side: TopBottom) -> &str {
        match side {
            TopBottom::Top => &self.style.top_color,
            TopBottom::Bottom => &self.style.bottom_color,
            TopBottom::Unknown => colors::UNKNOWN,
        }
    }

    /// Position plot of `records`.
    pub fn position_panel(&self, title: &str, records: &[&DefectRecord]) -> Panel {
        let (ax, ay, aw, ah) = self.plot_area();

        let mut group = Group::new()
            .set("class", "position-plot")
            .add(
                Rectangle::new()
                    .set("width", self.width())
                    .set("height", self.height())
                    .set("fill", "white"),
            )
            .add(title_text(title, self.width() / 2.0));

        if let Some(background) = &self.style.background_image {
            group = group.add(
                Image::new()
                    .set("href", background.to_string_lossy().into_owned())
                    .set("x", ax)
                    .set("y", ay)
                    .set("width", aw)
                    .set("height", ah)
                    .set("preserveAspectRatio", "none"),
            );
        }
        group = group.add(
            Rectangle::new()
                .set("x", ax)
                .set("y", ay)
                .set("width", aw)
                .set("height", ah)
                .set("fill", "none")
                .set("stroke", "#333333")
                .set("stroke-width", 1),
        );

        let mut points = Group::new().set("class", "defects");
        for record in records {
            let cx = ax + record.x_pct * aw;
            let cy = ay + record.y_pct * ah;
            let class = self.style.size_classes.classify(record.fm_size);
            points = points.add(marker(
                class.marker,
                cx,
                cy,
                self.style.marker_size,
                self.side_color(record.top_bottom),
            ));
        }
        group = group.add(points);

        let counts = TopBottomCounts::from_records(records.iter().copied());
        group = group
            .add(self.legend(PADDING, TITLE_HEIGHT))
            .add(self.summary_box(&counts, PADDING, self.height() * 0.65));

        Panel {
            group,
            width: self.width(),
            height: self.height(),
        }
    }

    fn legend(&self, x: f64, y: f64) -> Group {
        let mut group = Group::new().set("class", "legend");
        let line_height = 22.0;
        let mut row_y = y + 16.0;

        group = group.add(
            Text::new("Legend")
                .set("x", x)
                .set("y", row_y)
                .set("font-size", 14)
                .set("font-family", "sans-serif")
                .set("font-weight", "bold"),
        );
        row_y += line_height;

        for (label, color) in [
            ("Top", self.style.top_color.as_str()),
            ("Bottom", self.style.bottom_color.as_str()),
        ] {
            group = group
                .add(
                    Line::new()
                        .set("x1", x)
                        .set("y1", row_y - 4.0)
                        .set("x2", x + 20.0)
                        .set("y2", row_y - 4.0)
                        .set("stroke", color)
                        .set("stroke-width", 4),
                )
                .add(legend_label(label, x + 28.0, row_y));
            row_y += line_height;
        }

        for class in self.style.size_classes.legend() {
            group = group
                .add(marker(class.marker, x + 10.0, row_y - 4.0, 6.0, "black"))
                .add(legend_label(class.label, x + 28.0, row_y));
            row_y += line_height;
        }
        group
    }

    fn summary_box(&self, counts: &TopBottomCounts, x: f64, y: f64) -> Group {
        let mut lines = vec![
            "--- Summary ---".to_string(),
            format!("Top Points:    {}", counts.top),
            format!("Bottom Points: {}", counts.bottom),
        ];
        if counts.unknown > 0 {
            lines.push(format!("Unknown:       {}", counts.unknown));
        }
        lines.push(format!("Total Points:  {}", counts.total()));

        let line_height = 16.0;
        let mut group = Group::new().set("class", "summary").add(
            Rectangle::new()
                .set("x", x - 6.0)
                .set("y", y - 14.0)
                .set("width", self.width() * LEGEND_FRACTION - 4.0)
                .set("height", line_height * lines.len() as f64 + 10.0)
                .set("rx", 6)
                .set("fill", "white")
                .set("fill-opacity", 0.7)
                .set("stroke", "#333333"),
        );
        for (i, line) in lines.into_iter().enumerate() {
            group = group.add(mono_text(line, x, y + line_height * i as f64, 12));
        }
        group
    }

    /// Text report on the upper half, Before / Changes / After bars below.
    pub fn summary_panel(&self, report: &TransitionReport) -> Panel {
        let (w, h) = (self.width(), self.height());
        let mut group = Group::new().set("class", "summary-plot").add(
            Rectangle::new()
                .set("width", w)
                .set("height", h)
                .set("fill", "white"),
        );

        let lines = report.lines();
        let line_height = 24.0;
        let text_top = h * 0.27 - line_height * lines.len() as f64 / 2.0;
        let mut text = Group::new()
            .set("class", "report")
            .set("text-anchor", "middle");
        for (i, line) in lines.into_iter().enumerate() {
            text = text.add(mono_text(line, w / 2.0, text_top + line_height * i as f64, 16));
        }
        group = group.add(text);

        group = group.add(self.bar_chart(report, w * 0.1, h * 0.55, w * 0.8, h * 0.35));

        Panel {
            group,
            width: w,
            height: h,
        }
    }

    fn bar_chart(&self, report: &TransitionReport, x: f64, y: f64, w: f64, h: f64) -> Group {
        let before = report.before.total();
        let after = report.after.total();
        let segments = [
            ("Stayed", report.stayed.total(), colors::STAYED),
            ("Removed", report.removed.total(), colors::REMOVED),
            ("Added", report.added.total(), colors::ADDED),
        ];
        let stacked: usize = segments.iter().map(|s| s.1).sum();
        let max = before.max(after).max(stacked).max(1) as f64;
        // headroom for value labels
        let scale = h / (max * 1.15);
        let bar_w = w * 0.12;
        let slot = w / 3.0;
        let base = y + h;

        let mut group = Group::new()
            .set("class", "bar-chart")
            .add(
                Text::new("Summary of Changes")
                    .set("x", x + w / 2.0)
                    .set("y", y - 12.0)
                    .set("text-anchor", "middle")
                    .set("font-size", 16)
                    .set("font-family", "sans-serif")
                    .set("font-weight", "bold"),
            )
            .add(
                Line::new()
                    .set("x1", x)
                    .set("y1", base)
                    .set("x2", x + w)
                    .set("y2", base)
                    .set("stroke", "black"),
            );

        for (i, (label, value)) in [("Before", before), ("After", after)].into_iter().enumerate() {
            let cx = x + slot * if i == 0 { 0.5 } else { 2.5 };
            let bar_h = value as f64 * scale;
            group = group
                .add(bar(cx - bar_w / 2.0, base - bar_h, bar_w, bar_h, colors::BEFORE_AFTER))
                .add(value_label(value, cx, base - bar_h - 4.0, "black"))
                .add(axis_label(label, cx, base + 18.0));
        }

        let cx = x + slot * 1.5;
        let mut top = base;
        for (label, value, color) in segments {
            let seg_h = value as f64 * scale;
            top -= seg_h;
            group = group.add(
                bar(cx - bar_w / 2.0, top, bar_w, seg_h, color).set("data-label", label),
            );
            if value > 0 {
                group = group.add(value_label(value, cx, top + seg_h / 2.0 + 5.0, "white"));
            }
        }
        group = group.add(axis_label("Changes", cx, base + 18.0));

        let mut legend_y = y + 8.0;
        for (label, _, color) in segments {
            group = group
                .add(bar(x + w - 90.0, legend_y - 10.0, 12.0, 12.0, color))
                .add(legend_label(label, x + w - 72.0, legend_y));
            legend_y += 18.0;
        }
        group
    }

    /// Standalone document for one panel.
    pub fn document(&self, panel: Panel) -> Document {
        Document::new()
            .set("width", panel.width)
            .set("height", panel.height)
            .set("viewBox", (0.0, 0.0, panel.width, panel.height))
            .add(panel.group)
    }

    /// Tile panels row-major into one document.
    pub fn grid_document(&self, panels: Vec<Panel>, columns: usize) -> Document {
        let columns = columns.max(1);
        let cell_w = panels.iter().map(|p| p.width).fold(0.0, f64::max);
        let cell_h = panels.iter().map(|p| p.height).fold(0.0, f64::max);
        let rows = panels.len().div_ceil(columns);
        let width = cell_w * columns as f64;
        let height = cell_h * rows as f64;

        let mut doc = Document::new()
            .set("width", width)
            .set("height", height)
            .set("viewBox", (0.0, 0.0, width, height));
        for (i, panel) in panels.into_iter().enumerate() {
            let x = cell_w * (i % columns) as f64;
            let y = cell_h * (i / columns) as f64;
            doc = doc.add(
                Group::new()
                    .set("transform", format!("translate({x},{y})"))
                    .add(panel.group),
            );
        }
        doc
    }
}

/// Write a document, creating parent directories.
pub fn save(path: &Path, document: &Document) -> Result<()> {
    let io_error = |source| PlotError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    svg::save(path, document).map_err(io_error)
}

/// Regular polygon (or circle) centered on `(cx, cy)`.
fn marker(shape: MarkerShape, cx: f64, cy: f64, radius: f64, color: &str) -> Group {
    let group = Group::new().set("fill", color);
    match shape.vertex_count() {
        None => group.add(
            Circle::new()
                .set("cx", cx)
                .set("cy", cy)
                .set("r", radius),
        ),
        Some(n) => {
            let points = (0..n)
                .map(|k| {
                    let angle = -PI / 2.0 + 2.0 * PI * k as f64 / n as f64;
                    format!("{:.2},{:.2}", cx + radius * angle.cos(), cy + radius * angle.sin())
                })
                .collect::<Vec<_>>()
                .join(" ");
            group.add(Polygon::new().set("points", points))
        }
    }
}

fn bar(x: f64, y: f64, w: f64, h: f64, color: &str) -> Rectangle {
    Rectangle::new()
        .set("x", x)
        .set("y", y)
        .set("width", w)
        .set("height", h)
        .set("fill", color)
}

fn title_text(title: &str, cx: f64) -> Text {
    Text::new(title)
        .set("x", cx)
        .set("y", 32)
        .set("text-anchor", "middle")
        .set("font-size", 20)
        .set("font-family", "sans-serif")
        .set("font-weight", "bold")
}

fn legend_label(label: &str, x: f64, y: f64) -> Text {
    Text::new(label)
        .set("x", x)
        .set("y", y)
        .set("font-size", 12)
        .set("font-family", "sans-serif")
}

fn axis_label(label: &str, cx: f64, y: f64) -> Text {
    Text::new(label)
        .set("x", cx)
        .set("y", y)
        .set("text-anchor", "middle")
        .set("font-size", 12)
        .set("font-family", "sans-serif")
}

fn value_label(value: usize, cx: f64, y: f64, color: &str) -> Text {
    Text::new(value.to_string())
        .set("x", cx)
        .set("y", y)
        .set("text-anchor", "middle")
        .set("font-size", 12)
        .set("font-family", "sans-serif")
        .set("font-weight", "bold")
        .set("fill", color)
}

fn mono_text(line: String, x: f64, y: f64, size: u32) -> Text {
    Text::new(line)
        .set("x", x)
        .set("y", y)
        .set("font-size", size)
        .set("font-family", "monospace")
        .set("xml:space", "preserve")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{MatchConfig, StateMatcher};
    use tempfile::TempDir;

    fn record(row_id: u64, side: TopBottom, fm_size: f64) -> DefectRecord {
        DefectRecord {
            row_id,
            fov_id: "R_1_C_1".to_string(),
            tile_row_index: 1,
            tile_column_index: 1,
            pos_x_px: 0.0,
            pos_y_px: 0.0,
            fm_size,
            state: "S".to_string(),
            group_key: "foil1".to_string(),
            top_bottom: side,
            x_pct: 0.5,
            y_pct: 0.25,
            fov_number: 1,
        }
    }

    fn renderer() -> PlotRenderer {
        PlotRenderer::new(PlotSection::default())
    }

    #[test]
    fn test_position_plot_contents() {
        let a = record(1, TopBottom::Top, 150.0);
        let b = record(2, TopBottom::Bottom, 650.0);
        let r = renderer();
        let doc = r.document(r.position_panel("foil1 | Before", &[&a, &b]));
        let svg = doc.to_string();

        assert!(svg.contains("foil1 | Before"));
        assert!(svg.contains("<polygon"));
        assert!(svg.contains("<circle"));
        assert!(svg.contains("Top Points:    1"));
        assert!(svg.contains("Total Points:  2"));
        assert!(svg.contains("fill=\"red\""));
        assert!(svg.contains("fill=\"blue\""));
        assert!(!svg.contains("<image"));
    }

    #[test]
    fn test_background_image_reference() {
        let style = PlotSection {
            background_image: Some(PathBuf::from("data/original_resize.jpg")),
            ..Default::default()
        };
        let r = PlotRenderer::new(style);
        let svg = r.document(r.position_panel("t", &[])).to_string();
        assert!(svg.contains("<image"));
        assert!(svg.contains("data/original_resize.jpg"));
    }

    #[test]
    fn test_summary_grid_saved() {
        let b = record(1, TopBottom::Top, 150.0);
        let a = record(2, TopBottom::Top, 250.0);
        let before = vec![&b];
        let after = vec![&a];
        let changes = StateMatcher::new(MatchConfig::default())
            .unwrap()
            .classify(&before, &after);
        let report = TransitionReport::new("foil1", "B", "A", &before, &after, &changes);

        let r = renderer();
        let panels = vec![
            r.position_panel("before", &before),
            r.position_panel("after", &after),
            r.summary_panel(&report),
            r.position_panel("added", &changes.added),
            r.position_panel("removed", &changes.removed),
            r.position_panel("stayed", &changes.stayed),
        ];
        let doc = r.grid_document(panels, 3);
        let text = doc.to_string();
        assert!(text.contains("translate(3400,1200)"));
        assert!(text.contains("Summary of Changes"));
        assert!(text.contains("Analysis Report for: foil1"));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plots").join("grid.svg");
        save(&path, &doc).unwrap();
        assert!(path.exists());
    }
}
