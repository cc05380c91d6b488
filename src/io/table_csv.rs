//! Unified table persistence.
//!
//! The table is written as a headered CSV so operators can review it and
//! fill in the `TOP BOTTOM` column by hand. Reading it back recomputes the
//! derived columns from the tile layout; a row whose stored tile indices
//! disagree with its FOV id is rejected.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::csv::{join_fields, split_fields};
use super::ingest::{IngestError, Result};
use crate::algorithms::CoordinateNormalizer;
use crate::core::{DefectRecord, RawRow, TopBottom};

pub const COLUMNS: [&str; 13] = [
    "ROW ID",
    "FOV",
    "FM SIZE",
    "POS X",
    "POS Y",
    "STATE",
    "FOIL",
    "TOP BOTTOM",
    "ROW INDEX",
    "COLUMN INDEX",
    "X PERCENTAGE",
    "Y PERCENTAGE",
    "FOV NUMBER",
];

/// Optional trailing column holding the path of each row's white/red crop.
pub const IMAGE_LINK_COLUMN: &str = "WHITE RED IMAGE HYPERLINK";

/// Records read back from a table file.
#[derive(Debug, Clone, Default)]
pub struct TableRead {
    pub records: Vec<DefectRecord>,
    /// Rows skipped because they failed normalization or their stored
    /// tile indices disagreed with the FOV id.
    pub rejected: usize,
}

/// Write records as a headered CSV, creating parent directories.
pub fn write_table<'a>(
    path: &Path,
    records: impl IntoIterator<Item = &'a DefectRecord>,
) -> Result<usize> {
    write_rows(path, records, None)
}

/// Like [`write_table`], with an [`IMAGE_LINK_COLUMN`] filled in by `link`.
pub fn write_table_with_links<'a>(
    path: &Path,
    records: impl IntoIterator<Item = &'a DefectRecord>,
    link: impl Fn(&DefectRecord) -> PathBuf,
) -> Result<usize> {
    write_rows(path, records, Some(&link))
}

fn write_rows<'a>(
    path: &Path,
    records: impl IntoIterator<Item = &'a DefectRecord>,
    link: Option<&dyn Fn(&DefectRecord) -> PathBuf>,
) -> Result<usize> {
    let io_error = |source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let mut out = BufWriter::new(File::create(path).map_err(io_error)?);

    let mut header = COLUMNS.to_vec();
    if link.is_some() {
        header.push(IMAGE_LINK_COLUMN);
    }
    writeln!(out, "{}", join_fields(&header)).map_err(io_error)?;
    let mut count = 0;
    for r in records {
        let top_bottom = if r.top_bottom.is_known() {
            r.top_bottom.as_str()
        } else {
            ""
        };
        let mut fields = vec![
            r.row_id.to_string(),
            r.fov_id.clone(),
            r.fm_size.to_string(),
            r.pos_x_px.to_string(),
            r.pos_y_px.to_string(),
            r.state.clone(),
            r.group_key.clone(),
            top_bottom.to_string(),
            r.tile_row_index.to_string(),
            r.tile_column_index.to_string(),
            r.x_pct.to_string(),
            r.y_pct.to_string(),
            r.fov_number.to_string(),
        ];
        if let Some(link) = link {
            fields.push(link(r).display().to_string());
        }
        writeln!(out, "{}", join_fields(&fields)).map_err(io_error)?;
        count += 1;
    }
    out.flush().map_err(io_error)?;

    log::info!("Wrote {} records to {}", count, path.display());
    Ok(count)
}

/// Read a table written by [`write_table`], possibly edited by hand.
///
/// Columns are located by header name; extra columns are ignored.
pub fn read_table(path: &Path, normalizer: &CoordinateNormalizer) -> Result<TableRead> {
    let file = File::open(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_table(BufReader::new(file), path, normalizer)
}

pub fn parse_table<R: BufRead>(
    reader: R,
    path: &Path,
    normalizer: &CoordinateNormalizer,
) -> Result<TableRead> {
    let mut lines = reader.lines().enumerate();

    let header = match lines.next() {
        Some((_, line)) => split_fields(&line.map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?),
        None => {
            return Err(IngestError::Parse {
                path: path.to_path_buf(),
                line: 1,
                message: "empty table file".to_string(),
            });
        }
    };

    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| IngestError::Parse {
                path: path.to_path_buf(),
                line: 1,
                message: format!("missing column {name:?}"),
            })
    };
    let row_id_col = column("ROW ID")?;
    let fov_col = column("FOV")?;
    let size_col = column("FM SIZE")?;
    let x_col = column("POS X")?;
    let y_col = column("POS Y")?;
    let state_col = column("STATE")?;
    let foil_col = column("FOIL")?;
    let side_col = column("TOP BOTTOM").ok();
    let row_index_col = column("ROW INDEX").ok();
    let column_index_col = column("COLUMN INDEX").ok();

    let mut read = TableRead::default();

    for (index, line) in lines {
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
        let field = |col: usize| fields.get(col).map(String::as_str).unwrap_or("");
        let number = |col: usize| {
            field(col)
                .parse::<f64>()
                .map_err(|e| parse_error(format!("{} {:?}: {e}", header[col], field(col))))
        };

        let row_id = field(row_id_col)
            .parse::<u64>()
            .map_err(|e| parse_error(format!("ROW ID {:?}: {e}", field(row_id_col))));
        let (row_id, raw) = match (row_id, number(size_col), number(x_col), number(y_col)) {
            (Ok(row_id), Ok(fm_size), Ok(pos_x_px), Ok(pos_y_px)) => (
                row_id,
                RawRow {
                    fov_id: field(fov_col).to_string(),
                    fm_size,
                    pos_x_px,
                    pos_y_px,
                    state: field(state_col).to_string(),
                    group_key: field(foil_col).to_string(),
                    top_bottom: side_col.map(|c| TopBottom::parse(field(c))).unwrap_or_default(),
                },
            ),
            (Err(e), ..) | (_, Err(e), ..) | (_, _, Err(e), _) | (.., Err(e)) => {
                log::warn!("{}, excluding row", e);
                read.rejected += 1;
                continue;
            }
        };

        let record = match normalizer.normalize(row_id, raw) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("{}:{}: excluding row {}: {}", path.display(), line_no, row_id, e);
                read.rejected += 1;
                continue;
            }
        };

        let stored_matches = |col: Option<usize>, expected: u32| {
            col.is_none_or(|c| field(c).parse::<u32>().is_ok_and(|v| v == expected))
        };
        if !stored_matches(row_index_col, record.tile_row_index)
            || !stored_matches(column_index_col, record.tile_column_index)
        {
            log::warn!(
                "{}:{}: row {} tile indices disagree with FOV {:?}, excluding",
                path.display(),
                line_no,
                row_id,
                record.fov_id
            );
            read.rejected += 1;
            continue;
        }

        read.records.push(record);
    }

    log::info!(
        "Read {} records from {} ({} rejected)",
        read.records.len(),
        path.display(),
        read.rejected
    );
    Ok(read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::TileLayout;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    fn normalizer() -> CoordinateNormalizer {
        CoordinateNormalizer::new(TileLayout::default()).unwrap()
    }

    fn record(row_id: u64, fov_id: &str, foil: &str) -> DefectRecord {
        let raw = RawRow {
            fov_id: fov_id.to_string(),
            fm_size: 180.5,
            pos_x_px: 1000.25,
            pos_y_px: 2000.0,
            state: "Before Detach".to_string(),
            group_key: foil.to_string(),
            top_bottom: TopBottom::Unknown,
        };
        normalizer().normalize(row_id, raw).unwrap()
    }

    #[test]
    fn test_write_then_read_preserves_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Gap Analysis").join("Gap Analysis.csv");
        let records = vec![record(3, "R_2_C_3", "foil, A"), record(7, "R_1_C_1", "foil2")];

        assert_eq!(write_table(&path, &records).unwrap(), 2);
        let read = read_table(&path, &normalizer()).unwrap();

        assert_eq!(read.rejected, 0);
        assert_eq!(read.records, records);
    }

    #[test]
    fn test_header_is_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        write_table(&path, &[record(1, "R_1_C_1", "foil1")]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.starts_with("ROW ID,FOV,FM SIZE,POS X,POS Y,STATE,FOIL,TOP BOTTOM"));
        assert!(header.ends_with("FOV NUMBER"));
    }

    #[test]
    fn test_image_link_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        let records = vec![record(3, "R_2_C_3", "foil1"), record(7, "R_1_C_1", "foil2")];

        write_table_with_links(&path, &records, |r| {
            PathBuf::from("crops").join(format!("{}.png", r.row_id))
        })
        .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().ends_with(",FOV NUMBER,WHITE RED IMAGE HYPERLINK"));
        assert!(lines.next().unwrap().ends_with(",8,crops/3.png"));

        // the link column is ignored on the way back in
        let read = read_table(&path, &normalizer()).unwrap();
        assert_eq!(read.records, records);
    }

    #[test]
    fn test_hand_edited_table() {
        // reordered columns, extra column, top/bottom filled in
        let text = "FOV,ROW ID,NOTES,FM SIZE,POS X,POS Y,STATE,FOIL,TOP BOTTOM\n\
                    R_2_C_3,10,checked,150,0,0,S,foil1,Top\n\
                    R_1_C_1,11,,150,0,0,S,foil1,\n";
        let read = parse_table(text.as_bytes(), Path::new("t.csv"), &normalizer()).unwrap();
        assert_eq!(read.records.len(), 2);
        assert_eq!(read.records[0].row_id, 10);
        assert_eq!(read.records[0].top_bottom, TopBottom::Top);
        assert_eq!(read.records[0].fov_number, 8);
        assert_relative_eq!(read.records[0].x_pct, 2.0 * 13264.0 / 66320.0);
        assert_eq!(read.records[1].top_bottom, TopBottom::Unknown);
    }

    #[test]
    fn test_mismatched_tile_indices_are_rejected() {
        let text = "ROW ID,FOV,FM SIZE,POS X,POS Y,STATE,FOIL,TOP BOTTOM,ROW INDEX,COLUMN INDEX\n\
                    1,R_2_C_3,150,0,0,S,foil1,,2,3\n\
                    2,R_2_C_3,150,0,0,S,foil1,,2,4\n\
                    3,AB,150,0,0,S,foil1,,1,1\n";
        let read = parse_table(text.as_bytes(), Path::new("t.csv"), &normalizer()).unwrap();
        assert_eq!(read.records.len(), 1);
        assert_eq!(read.records[0].row_id, 1);
        assert_eq!(read.rejected, 2);
    }

    #[test]
    fn test_unparseable_row_is_rejected() {
        let text = "ROW ID,FOV,FM SIZE,POS X,POS Y,STATE,FOIL\n\
                    1,R_1_C_1,big,0,0,S,foil1\n\
                    x,R_1_C_1,150,0,0,S,foil1\n\
                    3,R_1_C_1,150,0,0,S,foil1\n";
        let read = parse_table(text.as_bytes(), Path::new("t.csv"), &normalizer()).unwrap();
        assert_eq!(read.records.len(), 1);
        assert_eq!(read.records[0].row_id, 3);
        assert_eq!(read.rejected, 2);
    }

    #[test]
    fn test_missing_column() {
        let text = "ROW ID,FOV,FM SIZE\n1,R_1_C_1,150\n";
        let err = parse_table(text.as_bytes(), Path::new("t.csv"), &normalizer()).unwrap_err();
        assert!(matches!(err, IngestError::Parse { line: 1, .. }));
    }
}
