//! Sample discovery and measurement CSV reading.
//!
//! Raw data is laid out one directory per state and foil:
//!
//! ```text
//! <root>/
//!   BeforeDetach/
//!     foil1/  ...  export.csv      (exactly one .csv, any depth)
//!     foil2/
//!   AfterDetach/
//!     foil1/
//! ```
//!
//! Each measurement CSV has no header and four fields per line:
//! `FOV, FM SIZE, POS X, POS Y`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use super::csv::split_fields;
use crate::config::DataSection;
use crate::core::{RawRow, TopBottom};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("sample directory {0} not found")]
    MissingDirectory(PathBuf),

    #[error("no CSV file found under {0}")]
    NoCsvFile(PathBuf),

    #[error("{count} CSV files found under {dir}, expected exactly one")]
    MultipleCsvFiles { dir: PathBuf, count: usize },

    #[error("{kind} name {name:?} contains a line break")]
    LineBreakInName { kind: &'static str, name: String },
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// One `(state, foil)` sample to ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSource {
    pub state: String,
    pub foil: String,
    pub dir: PathBuf,
}

impl SampleSource {
    /// Human-readable name used in logs and run summaries.
    pub fn label(&self) -> String {
        format!("{}/{}", self.state, self.foil)
    }
}

/// All configured samples, states in sorted order, foils as listed.
pub fn discover_samples(data: &DataSection) -> Vec<SampleSource> {
    data.samples
        .iter()
        .flat_map(|(state, foils)| {
            foils.iter().map(move |foil| SampleSource {
                state: state.clone(),
                foil: foil.clone(),
                dir: data.sample_dir(state, foil),
            })
        })
        .collect()
}

/// Locate the single measurement CSV of a sample.
pub fn find_sample_csv(dir: &Path) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(IngestError::MissingDirectory(dir.to_path_buf()));
    }

    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), "csv"))
        .map(|e| e.into_path())
        .collect();

    match found.len() {
        0 => Err(IngestError::NoCsvFile(dir.to_path_buf())),
        1 => Ok(found.remove(0)),
        count => Err(IngestError::MultipleCsvFiles {
            dir: dir.to_path_buf(),
            count,
        }),
    }
}

fn reject_line_breaks(kind: &'static str, name: &str) -> Result<()> {
    if name.contains(['\n', '\r']) {
        return Err(IngestError::LineBreakInName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(wanted))
}

/// Read every row of one sample.
///
/// State and foil names are written into every table row, which holds one
/// record per line, so names with line breaks are refused.
pub fn load_sample(sample: &SampleSource) -> Result<Vec<RawRow>> {
    reject_line_breaks("state", &sample.state)?;
    reject_line_breaks("foil", &sample.foil)?;
    let path = find_sample_csv(&sample.dir)?;
    let file = File::open(&path).map_err(|source| IngestError::Io {
        path: path.clone(),
        source,
    })?;
    let rows = parse_measurements(BufReader::new(file), &path, &sample.state, &sample.foil)?;
    log::info!(
        "Read {} rows for {} from {}",
        rows.len(),
        sample.label(),
        path.display()
    );
    Ok(rows)
}

/// Parse headerless `FOV, FM SIZE, POS X, POS Y` lines.
///
/// Blank lines are skipped. Any other malformed line fails the whole file.
pub fn parse_measurements<R: BufRead>(
    reader: R,
    path: &Path,
    state: &str,
    foil: &str,
) -> Result<Vec<RawRow>> {
    let mut rows = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let parse_error = |message: String| IngestError::Parse {
            path: path.to_path_buf(),
            line: line_no,
            message,
        };

        let fields = split_fields(&line);
        let [fov_id, fm_size, pos_x, pos_y] = fields.as_slice() else {
            return Err(parse_error(format!(
                "expected 4 fields, found {}",
                fields.len()
            )));
        };

        let number = |name: &str, value: &str| {
            value
                .parse::<f64>()
                .map_err(|e| parse_error(format!("{name} {value:?}: {e}")))
        };

        rows.push(RawRow {
            fov_id: fov_id.clone(),
            fm_size: number("FM SIZE", fm_size)?,
            pos_x_px: number("POS X", pos_x)?,
            pos_y_px: number("POS Y", pos_y)?,
            state: state.to_string(),
            group_key: foil.to_string(),
            top_bottom: TopBottom::Unknown,
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn parse(text: &str) -> Result<Vec<RawRow>> {
        parse_measurements(text.as_bytes(), Path::new("m.csv"), "BeforeDetach", "foil1")
    }

    #[test]
    fn test_parse_rows() {
        let rows = parse("R_1_C_2,150.5,10,20\n\nR_3_C_4,250,1.5,2.5\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fov_id, "R_1_C_2");
        assert_eq!(rows[0].fm_size, 150.5);
        assert_eq!(rows[1].pos_y_px, 2.5);
        assert_eq!(rows[1].state, "BeforeDetach");
        assert_eq!(rows[1].group_key, "foil1");
        assert_eq!(rows[1].top_bottom, TopBottom::Unknown);
    }

    #[test]
    fn test_parse_wrong_field_count() {
        let err = parse("R_1_C_2,150.5,10\n").unwrap_err();
        assert!(matches!(err, IngestError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_parse_bad_number_reports_line() {
        let err = parse("R_1_C_2,150.5,10,20\nR_1_C_3,big,10,20\n").unwrap_err();
        match err {
            IngestError::Parse { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("FM SIZE"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_fov_id_is_not_an_ingest_error() {
        // id validation belongs to the normalizer
        let rows = parse("AB,150,1,1\n").unwrap();
        assert_eq!(rows[0].fov_id, "AB");
    }

    #[test]
    fn test_find_sample_csv() {
        let dir = TempDir::new().unwrap();
        let sample = dir.path().join("foil1");
        fs::create_dir_all(sample.join("nested")).unwrap();

        assert!(matches!(
            find_sample_csv(&dir.path().join("missing")),
            Err(IngestError::MissingDirectory(_))
        ));
        assert!(matches!(
            find_sample_csv(&sample),
            Err(IngestError::NoCsvFile(_))
        ));

        fs::write(sample.join("nested").join("export.CSV"), "").unwrap();
        fs::write(sample.join("notes.txt"), "").unwrap();
        assert_eq!(
            find_sample_csv(&sample).unwrap(),
            sample.join("nested").join("export.CSV")
        );

        fs::write(sample.join("second.csv"), "").unwrap();
        assert!(matches!(
            find_sample_csv(&sample),
            Err(IngestError::MultipleCsvFiles { count: 2, .. })
        ));
    }

    #[test]
    fn test_discover_samples() {
        let mut samples = BTreeMap::new();
        samples.insert("B".to_string(), vec!["foil2".to_string(), "foil1".to_string()]);
        samples.insert("A".to_string(), vec!["foil1".to_string()]);
        let data = DataSection {
            root: PathBuf::from("raw"),
            samples,
            ..Default::default()
        };

        let found = discover_samples(&data);
        let labels: Vec<String> = found.iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["A/foil1", "B/foil2", "B/foil1"]);
        assert_eq!(found[1].dir, PathBuf::from("raw/B/foil2"));
    }

    #[test]
    fn test_load_sample() {
        let dir = TempDir::new().unwrap();
        let sample_dir = dir.path().join("S").join("foil1");
        fs::create_dir_all(&sample_dir).unwrap();
        fs::write(sample_dir.join("m.csv"), "R_1_C_1,120,5,6\n").unwrap();

        let sample = SampleSource {
            state: "S".to_string(),
            foil: "foil1".to_string(),
            dir: sample_dir,
        };
        let rows = load_sample(&sample).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pos_x_px, 5.0);
    }

    #[test]
    fn test_load_sample_refuses_line_break_in_name() {
        let dir = TempDir::new().unwrap();
        let foil_dir = dir.path().join("foil1");
        fs::create_dir_all(&foil_dir).unwrap();
        fs::write(foil_dir.join("m.csv"), "R_1_C_1,150,1,1\n").unwrap();

        let sample = SampleSource {
            state: "Before\nDetach".to_string(),
            foil: "foil1".to_string(),
            dir: foil_dir.clone(),
        };
        let err = load_sample(&sample).unwrap_err();
        assert!(matches!(err, IngestError::LineBreakInName { kind: "state", .. }));

        let sample = SampleSource {
            state: "Before".to_string(),
            foil: "foil\r1".to_string(),
            dir: foil_dir.clone(),
        };
        let err = load_sample(&sample).unwrap_err();
        assert!(matches!(err, IngestError::LineBreakInName { kind: "foil", .. }));

        let sample = SampleSource {
            state: "Before".to_string(),
            foil: "foil1".to_string(),
            dir: foil_dir,
        };
        assert_eq!(load_sample(&sample).unwrap().len(), 1);
    }
}
