//! Prize definition loading.
//!
//! One `.txt` file per category. A file whose first line starts with
//! `FullName,` is structured:
//!
//! ```text
//! FullName,Grand Prize
//! PickNum,3
//! RainbowFormat,22
//! RewardID,R001
//! Alice
//! Bob
//! ```
//!
//! and its file stem is `Index_ShowName`. Anything else is a plain list of
//! names with the file stem as the category name.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::error::CatalogError;
use crate::prize::{BandFormat, PrizeCategory};

const HEADER_KEYS: [&str; 4] = ["FullName", "PickNum", "RainbowFormat", "RewardID"];

#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub rejected: Vec<CatalogError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[derive(Debug, Default, Clone)]
pub struct PrizeCatalog {
    categories: Vec<PrizeCategory>,
}

impl PrizeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `.txt` file in `dir`. Bad files are reported, not fatal;
    /// only an unreadable directory fails the whole load.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<(Self, LoadReport), CatalogError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|source| CatalogError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
            .collect();
        files.sort();

        let mut catalog = Self::new();
        let mut report = LoadReport::default();
        for path in files {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let parsed = fs::read_to_string(&path)
                .map_err(|source| CatalogError::Io {
                    path: path.clone(),
                    source,
                })
                .and_then(|contents| parse_definition(&file_name, &contents))
                .and_then(|category| catalog.insert(category, &file_name));
            match parsed {
                Ok(id) => report.loaded.push(id),
                Err(err) => {
                    warn!(file = %file_name, error = %err, "prize definition rejected");
                    report.rejected.push(err);
                }
            }
        }
        catalog.sort();
        info!(
            loaded = report.loaded.len(),
            rejected = report.rejected.len(),
            dir = %dir.display(),
            "prize catalog loaded"
        );
        Ok((catalog, report))
    }

    /// Adds a category; ids must be unique.
    pub fn insert(
        &mut self,
        category: PrizeCategory,
        source: &str,
    ) -> Result<String, CatalogError> {
        if self.get(&category.id).is_some() {
            return Err(CatalogError::DuplicateId {
                file: source.to_string(),
                id: category.id,
            });
        }
        let id = category.id.clone();
        self.categories.push(category);
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<&PrizeCategory> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut PrizeCategory> {
        self.categories.iter_mut().find(|c| c.id == id)
    }

    pub fn categories(&self) -> &[PrizeCategory] {
        &self.categories
    }

    pub fn ids(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    fn sort(&mut self) {
        self.categories.sort_by(|a, b| {
            let key = |c: &PrizeCategory| {
                let index = c.index.as_deref();
                (
                    index.is_none(),
                    index.and_then(|i| i.parse::<u64>().ok()).unwrap_or(u64::MAX),
                    index.unwrap_or_default().to_string(),
                    c.id.clone(),
                )
            };
            key(a).cmp(&key(b))
        });
    }
}

/// Parses one definition file; `file_name` includes the `.txt` extension.
pub fn parse_definition(file_name: &str, contents: &str) -> Result<PrizeCategory, CatalogError> {
    let stem = file_name.strip_suffix(".txt").unwrap_or(file_name);
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);
    let lines: Vec<&str> = contents.lines().collect();

    let structured = lines
        .first()
        .is_some_and(|l| l.trim_start().starts_with("FullName,"));
    if !structured {
        return Ok(PrizeCategory::simple(stem, to_names(&lines)));
    }

    let malformed = |reason: String| CatalogError::Malformed {
        file: file_name.to_string(),
        reason,
    };

    let (index, show_name) = stem
        .split_once('_')
        .ok_or_else(|| malformed(format!("file name `{stem}` is not Index_ShowName")))?;
    if lines.len() < HEADER_KEYS.len() {
        return Err(malformed(format!(
            "expected {} header lines, found {}",
            HEADER_KEYS.len(),
            lines.len()
        )));
    }

    let mut values = Vec::with_capacity(HEADER_KEYS.len());
    for (line_no, (line, key)) in lines.iter().zip(HEADER_KEYS).enumerate() {
        let (found, value) = line
            .split_once(',')
            .ok_or_else(|| malformed(format!("line {}: expected `{key},<value>`", line_no + 1)))?;
        if found.trim() != key {
            return Err(malformed(format!(
                "line {}: expected key `{key}`, found `{}`",
                line_no + 1,
                found.trim()
            )));
        }
        values.push(value.trim());
    }

    let quota = values[1]
        .parse::<usize>()
        .map_err(|_| malformed(format!("PickNum `{}` is not an integer", values[1])))?;
    let band_format = BandFormat::parse(values[2]).map_err(|e| malformed(e.to_string()))?;
    let id = if values[3].is_empty() { stem } else { values[3] };

    let mut category = PrizeCategory::structured(
        id,
        show_name,
        values[0],
        quota,
        band_format,
        to_names(&lines[HEADER_KEYS.len()..]),
    );
    category.index = Some(index.to_string());
    Ok(category)
}

fn to_names(lines: &[&str]) -> Vec<String> {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
