//! Analysis run orchestration.
//!
//! One [`Analysis`] holds the validated settings and the components built
//! from them. Each command walks the configured samples or the unified
//! table, records per-sample failures in a [`RunSummary`] and keeps going;
//! only configuration problems and unwritable outputs abort a command.
//!
//! Output layout:
//!
//! ```text
//! <output>/<analysis_name>/
//!   <analysis_name>.csv
//!   Combined white and red images/*.png
//!   Combined different foil images/*.png
//!   Plot FM summary/*.svg
//!   Plot compare FM summary/*.svg, *.txt
//! ```

use std::path::PathBuf;

use image::RgbImage;

use super::error::{AnalysisError, Result};
use super::run_summary::RunSummary;
use super::table::{DefectTable, RecordFilter, SizeRange};
use crate::algorithms::{CoordinateNormalizer, StateMatcher};
use crate::config::Settings;
use crate::core::{DefectRecord, TopBottom};
use crate::io::imagery::{self, CropWindow, Direction, ImageLocator};
use crate::io::plot::{self, PlotRenderer};
use crate::io::{
    TransitionReport, discover_samples, load_sample, read_table, write_table,
    write_table_with_links,
};

const WHITE_RED_DIR: &str = "Combined white and red images";
const BACKGROUND_DIR: &str = "Combined different foil images";
const POSITION_PLOT_DIR: &str = "Plot FM summary";
const COMPARE_DIR: &str = "Plot compare FM summary";

/// Result of [`Analysis::combine`].
#[derive(Debug)]
pub struct CombineOutcome {
    /// Every normalized record, regardless of size.
    pub table: DefectTable,
    pub table_path: PathBuf,
    pub summary: RunSummary,
}

/// Result of [`Analysis::compare`].
#[derive(Debug)]
pub struct CompareOutcome {
    pub reports: Vec<TransitionReport>,
    pub summary: RunSummary,
}

pub struct Analysis {
    settings: Settings,
    normalizer: CoordinateNormalizer,
    matcher: StateMatcher,
    locator: ImageLocator,
    renderer: PlotRenderer,
}

impl Analysis {
    /// Validate settings and build the components. Nothing is read yet.
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let normalizer = CoordinateNormalizer::new(settings.layout.clone())?;
        let matcher = StateMatcher::new(settings.matching.clone())?;
        let locator = ImageLocator::new(&settings.imagery.image_extensions);
        let renderer = PlotRenderer::new(settings.plot.clone());
        Ok(Self {
            settings,
            normalizer,
            matcher,
            locator,
            renderer,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn size_range(&self) -> SizeRange {
        SizeRange::new(self.settings.filter.min_fm_size, self.settings.filter.max_fm_size)
    }

    fn in_range(&self) -> RecordFilter {
        RecordFilter::new().size_range(self.size_range())
    }

    /// Ingest every configured sample and export the unified table.
    ///
    /// A sample that cannot be read is recorded and skipped. The command
    /// fails only when no sample at all could be read.
    pub fn combine(&self) -> Result<CombineOutcome> {
        let mut summary = RunSummary::new("combine");
        let mut rows = Vec::new();

        for sample in discover_samples(&self.settings.data) {
            match load_sample(&sample) {
                Ok(sample_rows) => {
                    rows.extend(sample_rows);
                    summary.record_success();
                }
                Err(e) => summary.record_failure(sample.label(), e),
            }
        }
        if summary.succeeded == 0 {
            summary.log();
            return Err(AnalysisError::NothingCombined);
        }

        let built = DefectTable::build(rows, &self.normalizer);
        summary.rejected_rows = built.rejected.len();

        let table_path = self.settings.data.table_path();
        let kept = built.table.select(&self.in_range());
        let written = if self.settings.imagery.link_crops_in_table {
            let crop_dir = self.settings.data.analysis_dir().join(WHITE_RED_DIR);
            let crop_dir = std::path::absolute(&crop_dir).unwrap_or(crop_dir);
            write_table_with_links(&table_path, kept.iter().copied(), |r| {
                imagery::png_path(&crop_dir, &crop_file_name(r))
            })?
        } else {
            write_table(&table_path, kept.iter().copied())?
        };
        summary.outputs.push(table_path.clone());
        log::info!(
            "Combined {} samples: {} records, {} within FM size {:?}",
            summary.succeeded,
            built.table.len(),
            written,
            self.size_range()
        );

        Ok(CombineOutcome {
            table: built.table,
            table_path,
            summary,
        })
    }

    /// Read the exported (possibly hand-edited) table back.
    pub fn load_table(&self) -> Result<DefectTable> {
        let path = self.settings.data.table_path();
        let read = read_table(&path, &self.normalizer)?;
        if read.rejected > 0 {
            log::warn!("{} rows of {} were rejected", read.rejected, path.display());
        }
        Ok(DefectTable::from_records(read.records)?)
    }

    /// Crop the white and red image of every record side by side.
    ///
    /// `start..end` slices the table in row order before filtering.
    pub fn crop_white_red(
        &self,
        table: &DefectTable,
        start: usize,
        end: Option<usize>,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::new("crop");
        let records = table.records();
        let end = end.unwrap_or(records.len()).min(records.len());
        let start = start.min(end);
        let filter = self
            .in_range()
            .exclude_fovs(&self.settings.filter.excluded_fov_numbers);
        let out_dir = self.settings.data.analysis_dir().join(WHITE_RED_DIR);

        let selected = records[start..end].iter().filter(|r| filter.matches(r));
        let groups = group_in_order(selected, |r| {
            (r.state.as_str(), r.group_key.as_str(), r.fov_number)
        });

        for ((state, foil, fov_number), group) in groups {
            let label = format!("{state}/{foil} FOV {fov_number}");
            let sample_dir = self.settings.data.sample_dir(state, foil);

            let (Some(white_path), Some(red_path)) =
                self.locator.white_red_pair(&sample_dir, fov_number)
            else {
                summary.record_failure(label, "white/red image pair not found");
                continue;
            };
            let (white, red) = match (imagery::load(&white_path), imagery::load(&red_path)) {
                (Ok(white), Ok(red)) => (white, red),
                (Err(e), _) | (_, Err(e)) => {
                    summary.record_failure(label, e);
                    continue;
                }
            };

            for record in group {
                let crops = [
                    self.annotated_crop(&white, record, 1.0),
                    self.annotated_crop(&red, record, 1.0),
                ];
                let combined = imagery::combine(&crops, Direction::Horizontal)?;
                let composite =
                    imagery::resize_to_width(&combined, self.settings.imagery.target_width);
                match imagery::save_png(&composite, &out_dir, &crop_file_name(record)) {
                    Ok(path) => summary.record_output(path),
                    Err(e) => summary.record_failure(format!("row {}", record.row_id), e),
                }
            }
        }

        Ok(summary)
    }

    /// Crop the same spot from the white images of every foil in the state,
    /// to tell real defects from ones already present on the background.
    ///
    /// Only records classified top or bottom are processed.
    pub fn crop_background(&self, table: &DefectTable) -> Result<RunSummary> {
        let mut summary = RunSummary::new("background");
        let imagery_cfg = &self.settings.imagery;
        let filter = self
            .in_range()
            .sides(&[TopBottom::Top, TopBottom::Bottom])
            .exclude_fovs(&self.settings.filter.excluded_fov_numbers);
        let out_dir = self.settings.data.analysis_dir().join(BACKGROUND_DIR);

        let records = table.select(&filter);
        let groups = group_in_order(records, |r| (r.state.as_str(), r.fov_number));

        for ((state, fov_number), group) in groups {
            let label = format!("{state} FOV {fov_number}");
            let mut paths = self
                .locator
                .white_images(&self.settings.data.root.join(state), fov_number);
            paths.truncate(imagery_cfg.max_background_images);

            let images: Vec<RgbImage> = paths
                .iter()
                .filter_map(|path| match imagery::load(path) {
                    Ok(img) => Some(img),
                    Err(e) => {
                        log::warn!("Skipping {}: {}", path.display(), e);
                        None
                    }
                })
                .collect();
            if images.is_empty() {
                summary.record_failure(label, "no white images found");
                continue;
            }

            for record in group {
                let zoomed_in: Vec<RgbImage> = images
                    .iter()
                    .map(|img| self.annotated_crop(img, record, 1.0))
                    .collect();
                // Zoomed-out row on top, zoomed-in row below
                let mut cells: Vec<RgbImage> = images
                    .iter()
                    .zip(&zoomed_in)
                    .map(|(img, near)| {
                        let far = self.annotated_crop(img, record, imagery_cfg.zoom_out_factor);
                        imagery::resize_to_width(&far, near.width())
                    })
                    .collect();
                cells.extend(zoomed_in);

                let combined = imagery::grid(&cells, images.len() as u32)?;
                let composite = imagery::resize_to_width(&combined, imagery_cfg.target_width);
                match imagery::save_png(&composite, &out_dir, &crop_file_name(record)) {
                    Ok(path) => summary.record_output(path),
                    Err(e) => summary.record_failure(format!("row {}", record.row_id), e),
                }
            }
        }

        Ok(summary)
    }

    /// Crop around a record with the defect outlined.
    fn annotated_crop(&self, image: &RgbImage, record: &DefectRecord, zoom: f64) -> RgbImage {
        let cfg = &self.settings.imagery;
        let half = record.fm_size * cfg.crop_scale * zoom;
        let window = imagery::crop_window(
            image.width(),
            image.height(),
            record.pos_x_px,
            record.pos_y_px,
            half,
        );
        let mut crop = imagery::crop_around(image, record.pos_x_px, record.pos_y_px, half);

        let mark = record.fm_size.max(1.0);
        let left = (record.pos_x_px - f64::from(window.x) - mark).round().max(0.0) as u32;
        let top = (record.pos_y_px - f64::from(window.y) - mark).round().max(0.0) as u32;
        let side = (2.0 * mark).round() as u32;
        imagery::outline(
            &mut crop,
            CropWindow {
                x: left,
                y: top,
                width: side,
                height: side,
            },
            cfg.outline_color,
            cfg.outline_thickness,
        );
        crop
    }

    /// One position plot per configured sample.
    pub fn plot_positions(&self, table: &DefectTable) -> Result<RunSummary> {
        let mut summary = RunSummary::new("plot");
        let out_dir = self.settings.data.analysis_dir().join(POSITION_PLOT_DIR);

        for sample in discover_samples(&self.settings.data) {
            let filter = self
                .in_range()
                .group(&sample.foil)
                .state(&sample.state)
                .sides(&self.settings.plot.sides);
            let records = table.select(&filter);

            let title = format!("Name(s): {} | State: {}", sample.foil, sample.state);
            let document = self
                .renderer
                .document(self.renderer.position_panel(&title, &records));
            let file_name = format!("{} {} plot.svg", sample.state, sample.foil);
            let path = out_dir.join(imagery::sanitize_file_name(&file_name));
            match plot::save(&path, &document) {
                Ok(()) => {
                    log::info!("Plotted {} ({} records)", sample.label(), records.len());
                    summary.record_output(path);
                }
                Err(e) => summary.record_failure(sample.label(), e),
            }
        }

        Ok(summary)
    }

    /// Classify every foil between `compare.before_state` and
    /// `compare.after_state` and render the six-panel summary.
    pub fn compare(&self, table: &DefectTable) -> Result<CompareOutcome> {
        let cmp = &self.settings.compare;
        let (Some(before_state), Some(after_state)) = (&cmp.before_state, &cmp.after_state) else {
            return Err(AnalysisError::MissingCompareStates);
        };

        let mut summary = RunSummary::new("compare");
        let mut reports = Vec::new();
        let out_dir = self.settings.data.analysis_dir().join(COMPARE_DIR);

        let before_foils = table.groups_in_state(before_state);
        let after_foils = table.groups_in_state(after_state);
        let foils: Vec<String> = match self.settings.data.samples.get(before_state) {
            Some(foils) => foils.clone(),
            None => before_foils.iter().map(|f| f.to_string()).collect(),
        };

        for foil in foils {
            if !before_foils.contains(&foil.as_str()) || !after_foils.contains(&foil.as_str()) {
                summary.record_failure(
                    foil.as_str(),
                    format!("not present in both {before_state} and {after_state}, skipped"),
                );
                continue;
            }
            log::info!("Comparing foil {foil:?} from {before_state:?} to {after_state:?}");

            let before = table.select(&self.in_range().group(&foil).state(before_state));
            let after = table.select(&self.in_range().group(&foil).state(after_state));
            let changes = self.matcher.classify(&before, &after);
            let report =
                TransitionReport::new(&foil, before_state, after_state, &before, &after, &changes);
            for line in report.lines() {
                log::info!("{line}");
            }

            let change_title =
                |kind: &str| format!("{kind} FM for {foil} from {before_state} to {after_state}");
            let r = &self.renderer;
            let panels = vec![
                r.position_panel(&format!("Name(s): {foil} | State: {before_state}"), &before),
                r.position_panel(&format!("Name(s): {foil} | State: {after_state}"), &after),
                r.summary_panel(&report),
                r.position_panel(&change_title("Added"), &changes.added),
                r.position_panel(&change_title("Removed"), &changes.removed),
                r.position_panel(&change_title("Stayed"), &changes.stayed),
            ];
            let document = r.grid_document(panels, 3);

            let stem =
                imagery::sanitize_file_name(&format!("{foil} {before_state} to {after_state} summary"));
            let svg_path = out_dir.join(format!("{stem}.svg"));
            let text_path = out_dir.join(format!("{stem}.txt"));
            let saved = plot::save(&svg_path, &document)
                .map_err(AnalysisError::from)
                .and_then(|()| report.save(&text_path).map_err(AnalysisError::from));
            match saved {
                Ok(()) => {
                    summary.record_output(svg_path);
                    summary.outputs.push(text_path);
                }
                Err(e) => summary.record_failure(foil.as_str(), e),
            }
            reports.push(report);
        }

        Ok(CompareOutcome { reports, summary })
    }

    /// Every step in order: combine, crop, background, plot, compare.
    ///
    /// Comparison is skipped when no states are configured for it.
    pub fn run(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::new("run");

        let combined = self.combine()?;
        summary.merge(combined.summary);
        let table = &combined.table;

        summary.merge(self.crop_white_red(table, 0, None)?);
        summary.merge(self.crop_background(table)?);
        summary.merge(self.plot_positions(table)?);

        let cmp = &self.settings.compare;
        if cmp.before_state.is_some() && cmp.after_state.is_some() {
            summary.merge(self.compare(table)?.summary);
        } else {
            log::info!("No compare states configured, skipping comparison");
        }

        Ok(summary)
    }
}

/// Group records by key, keeping first-seen key order and record order.
fn group_in_order<'a, K: PartialEq>(
    records: impl IntoIterator<Item = &'a DefectRecord>,
    key: impl Fn(&'a DefectRecord) -> K,
) -> Vec<(K, Vec<&'a DefectRecord>)> {
    let mut groups: Vec<(K, Vec<&'a DefectRecord>)> = Vec::new();
    for record in records {
        let k = key(record);
        match groups.iter_mut().find(|(g, _)| *g == k) {
            Some((_, members)) => members.push(record),
            None => groups.push((k, vec![record])),
        }
    }
    groups
}

fn crop_file_name(record: &DefectRecord) -> String {
    format!(
        "{} {} {} FOV Number_{} X_{} Y_{} FMsize_{}",
        record.row_id,
        record.state,
        record.group_key,
        record.fov_number,
        record.pos_x_px,
        record.pos_y_px,
        record.fm_size
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DefectError;

    #[test]
    fn test_new_fails_fast_on_invalid_layout() {
        let mut settings = Settings::default();
        settings.layout.surface_width_px = -5.0;
        let err = Analysis::new(settings).err().unwrap();
        assert!(matches!(
            err,
            AnalysisError::Defect(DefectError::InvalidConfiguration(_))
        ));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_compare_requires_states() {
        let analysis = Analysis::new(Settings::default()).unwrap();
        let err = analysis.compare(&DefectTable::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingCompareStates));
    }

    #[test]
    fn test_group_in_order() {
        let mk = |row_id, state: &str| DefectRecord {
            row_id,
            fov_id: "R_1_C_1".to_string(),
            tile_row_index: 1,
            tile_column_index: 1,
            pos_x_px: 0.0,
            pos_y_px: 0.0,
            fm_size: 150.0,
            state: state.to_string(),
            group_key: "foil1".to_string(),
            top_bottom: TopBottom::Unknown,
            x_pct: 0.0,
            y_pct: 0.0,
            fov_number: 1,
        };
        let records = [mk(1, "B"), mk(2, "A"), mk(3, "B")];
        let groups = group_in_order(&records, |r| r.state.as_str());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "B");
        let ids: Vec<u64> = groups[0].1.iter().map(|r| r.row_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_crop_file_name() {
        let record = DefectRecord {
            row_id: 12,
            fov_id: "R_2_C_3".to_string(),
            tile_row_index: 2,
            tile_column_index: 3,
            pos_x_px: 10.5,
            pos_y_px: 20.0,
            fm_size: 150.0,
            state: "After".to_string(),
            group_key: "foil1".to_string(),
            top_bottom: TopBottom::Unknown,
            x_pct: 0.0,
            y_pct: 0.0,
            fov_number: 8,
        };
        assert_eq!(
            crop_file_name(&record),
            "12 After foil1 FOV Number_8 X_10.5 Y_20 FMsize_150"
        );
    }
}
