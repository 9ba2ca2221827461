//! CSV winner log and winner-list import.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{catalog::PrizeCatalog, error::RecordError, prize::PrizeCategory};

/// One row of a structured result log; also the import schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerRow {
    pub name: String,
    pub category: String,
    pub category_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleWinnerRow {
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLayout {
    /// `name,category`
    Simple,
    /// `name,category,category_id`
    Structured,
}

/// Appends committed winners to `<prefix>_<YYYYMMDD_HHMMSS>.csv`.
///
/// The file is created on the first write and never overwritten; the header
/// is written exactly once.
#[derive(Debug)]
pub struct ResultRecorder {
    dir: PathBuf,
    prefix: String,
    layout: LogLayout,
    path: Option<PathBuf>,
}

impl ResultRecorder {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, layout: LogLayout) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            layout,
            path: None,
        }
    }

    /// Path of the log, once something has been written.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn layout(&self) -> LogLayout {
        self.layout
    }

    pub fn record(
        &mut self,
        category: &PrizeCategory,
        winners: &[String],
    ) -> Result<usize, RecordError> {
        if winners.is_empty() {
            return Ok(0);
        }
        let path = self.ensure_file()?;
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|source| RecordError::Io {
                path: path.clone(),
                source,
            })?;
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        for name in winners {
            match self.layout {
                LogLayout::Structured => wtr.serialize(WinnerRow {
                    name: name.clone(),
                    category: category.full_name.clone(),
                    category_id: category.id.clone(),
                })?,
                LogLayout::Simple => wtr.serialize(SimpleWinnerRow {
                    name: name.clone(),
                    category: category.display_name.clone(),
                })?,
            }
        }
        wtr.flush().map_err(|source| RecordError::Io { path, source })?;
        Ok(winners.len())
    }

    fn ensure_file(&mut self) -> Result<PathBuf, RecordError> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut attempt = 0u32;
        let (path, file) = loop {
            let name = match attempt {
                0 => format!("{}_{}.csv", self.prefix, stamp),
                n => format!("{}_{}_{}.csv", self.prefix, stamp, n),
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => return Err(RecordError::Io { path, source }),
            }
        };
        write_header(file, self.layout, &path)?;
        info!(path = %path.display(), "result log created");
        self.path = Some(path.clone());
        Ok(path)
    }
}

fn write_header(file: File, layout: LogLayout, path: &Path) -> Result<(), RecordError> {
    let mut wtr = csv::Writer::from_writer(file);
    match layout {
        LogLayout::Structured => wtr.write_record(["name", "category", "category_id"])?,
        LogLayout::Simple => wtr.write_record(["name", "category"])?,
    }
    wtr.flush().map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    /// Rows naming someone already recorded as a winner.
    pub already_present: usize,
    /// Unparseable rows, unknown category ids and non-candidates.
    pub skipped: Vec<String>,
}

/// Unions the winners listed in a structured result log into `catalog`.
///
/// Bad rows are skipped; failing to open or read the file leaves the catalog
/// untouched.
pub fn import_winners(
    catalog: &mut PrizeCatalog,
    path: impl AsRef<Path>,
) -> Result<ImportReport, RecordError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    // Parse everything before touching the catalog.
    let mut rows = Vec::new();
    let mut report = ImportReport::default();
    for (line, result) in rdr.deserialize::<WinnerRow>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => report.skipped.push(format!("row {}: {e}", line + 2)),
        }
    }

    for row in rows {
        let name = row.name.trim_start_matches('\u{feff}');
        let Some(category) = catalog.get_mut(&row.category_id) else {
            report.skipped.push(format!("{name}: unknown category id `{}`", row.category_id));
            continue;
        };
        if category.is_winner(name) {
            report.already_present += 1;
            continue;
        }
        if category.record_winners([name]).is_empty() {
            report.skipped.push(format!("{name}: not a candidate of `{}`", row.category_id));
        } else {
            report.imported += 1;
        }
    }
    for reason in &report.skipped {
        warn!(file = %path.display(), reason, "import row skipped");
    }
    info!(
        file = %path.display(),
        imported = report.imported,
        already_present = report.already_present,
        skipped = report.skipped.len(),
        "winners imported"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prize::BandFormat;
    use std::fs;

    fn catalog() -> PrizeCatalog {
        let mut catalog = PrizeCatalog::new();
        let names = ["Amy", "Bo", "Cy", "Di"].iter().map(|s| s.to_string()).collect();
        let band = BandFormat::default();
        let cat = PrizeCategory::structured("R1", "First", "First Prize", 2, band, names);
        catalog.insert(cat, "1_First.txt").unwrap();
        catalog
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog();
        let cat = catalog.get("R1").unwrap();
        let mut recorder = ResultRecorder::new(dir.path(), "winners", LogLayout::Structured);
        assert_eq!(recorder.record(cat, &[]).unwrap(), 0);
        assert!(recorder.path().is_none());
        recorder.record(cat, &["Amy".to_string()]).unwrap();
        recorder.record(cat, &["Bo".to_string(), "Cy".to_string()]).unwrap();
        let path = recorder.path().unwrap().to_path_buf();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("winners_") && name.ends_with(".csv"));
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "name,category,category_id",
                "Amy,First Prize,R1",
                "Bo,First Prize,R1",
                "Cy,First Prize,R1",
            ]
        );
    }

    #[test]
    fn test_simple_layout() {
        let dir = tempfile::tempdir().unwrap();
        let cat = PrizeCategory::simple("Lucky", vec!["Amy".into()]);
        let mut recorder = ResultRecorder::new(dir.path(), "log", LogLayout::Simple);
        recorder.record(&cat, &["Amy".to_string()]).unwrap();
        let text = fs::read_to_string(recorder.path().unwrap()).unwrap();
        assert_eq!(text.lines().collect::<Vec<_>>(), vec!["name,category", "Amy,Lucky"]);
    }

    #[test]
    fn test_second_recorder_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog();
        let cat = catalog.get("R1").unwrap();
        let mut a = ResultRecorder::new(dir.path(), "w", LogLayout::Structured);
        let mut b = ResultRecorder::new(dir.path(), "w", LogLayout::Structured);
        a.record(cat, &["Amy".to_string()]).unwrap();
        b.record(cat, &["Bo".to_string()]).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(fs::read_to_string(a.path().unwrap()).unwrap().contains("Amy"));
    }

    #[test]
    fn test_import_skips_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.csv");
        fs::write(
            &path,
            "name,category,category_id\n\
             Amy,First Prize,R1\n\
             Zed,First Prize,R1\n\
             Bo,Other,R404\n\
             Amy,First Prize,R1\n",
        )
        .unwrap();
        let mut catalog = catalog();
        let report = import_winners(&mut catalog, &path).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.already_present, 1);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(catalog.get("R1").unwrap().winners(), &["Amy"]);
    }

    #[test]
    fn test_import_missing_file() {
        let mut catalog = catalog();
        let err = import_winners(&mut catalog, "/nonexistent/winners.csv").unwrap_err();
        assert!(matches!(err, RecordError::Io { .. }));
        assert!(catalog.get("R1").unwrap().winners().is_empty());
    }
}
