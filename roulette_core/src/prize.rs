use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::CatalogError;

/// Run-length band grouping for the winner display.
///
/// Each character is a run length: `1`-`9`, or `A`-`Z` for 10-35.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandFormat {
    runs: Vec<usize>,
}

impl BandFormat {
    pub fn parse(encoded: &str) -> Result<Self, CatalogError> {
        let runs = encoded
            .trim()
            .chars()
            .map(|c| match c {
                '1'..='9' => Ok(c as usize - '0' as usize),
                'A'..='Z' => Ok(c as usize - 'A' as usize + 10),
                other => Err(CatalogError::BandFormat(other)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { runs })
    }

    pub fn runs(&self) -> &[usize] {
        &self.runs
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Band index of the winner at `position`; the pattern repeats once exhausted.
    pub fn band_of(&self, position: usize) -> usize {
        let period: usize = self.runs.iter().sum();
        if period == 0 {
            return 0;
        }
        let mut offset = position % period;
        for (band, &run) in self.runs.iter().enumerate() {
            if offset < run {
                return band;
            }
            offset -= run;
        }
        0
    }

    pub fn encode(&self) -> String {
        self.runs
            .iter()
            .map(|&run| match run {
                1..=9 => char::from(b'0' + run as u8),
                _ => char::from(b'A' + (run - 10) as u8),
            })
            .collect()
    }
}

/// Where a category definition came from; decides the result log layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefinitionFormat {
    Simple,
    Structured,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrizeCategory {
    pub id: String,
    pub display_name: String,
    pub full_name: String,
    pub quota: usize,
    pub band_format: BandFormat,
    pub format: DefinitionFormat,
    /// Ordering key within the catalog (structured files only).
    pub index: Option<String>,
    candidates: Vec<String>,
    winners: Vec<String>,
}

impl PrizeCategory {
    /// Category from a plain list of names. Quota defaults to the pool size.
    pub fn simple(name: impl Into<String>, candidates: Vec<String>) -> Self {
        let name = name.into();
        let candidates = dedup_candidates(&name, candidates);
        Self {
            id: name.clone(),
            display_name: name.clone(),
            full_name: name,
            quota: candidates.len(),
            band_format: BandFormat::default(),
            format: DefinitionFormat::Simple,
            index: None,
            candidates,
            winners: Vec::new(),
        }
    }

    pub fn structured(
        id: impl Into<String>,
        display_name: impl Into<String>,
        full_name: impl Into<String>,
        quota: usize,
        band_format: BandFormat,
        candidates: Vec<String>,
    ) -> Self {
        let id = id.into();
        let candidates = dedup_candidates(&id, candidates);
        Self {
            id,
            display_name: display_name.into(),
            full_name: full_name.into(),
            quota,
            band_format,
            format: DefinitionFormat::Structured,
            index: None,
            candidates,
            winners: Vec::new(),
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn winners(&self) -> &[String] {
        &self.winners
    }

    pub fn candidate(&self, index: usize) -> Option<&str> {
        self.candidates.get(index).map(String::as_str)
    }

    pub fn is_winner(&self, name: &str) -> bool {
        self.winners.iter().any(|w| w == name)
    }

    pub fn eligible_indices(&self) -> Vec<usize> {
        let won: HashSet<&str> = self.winners.iter().map(String::as_str).collect();
        self.candidates
            .iter()
            .enumerate()
            .filter(|(_, name)| !won.contains(name.as_str()))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn eligible_count(&self) -> usize {
        self.candidates.len() - self.winners.len()
    }

    pub fn remaining_quota(&self) -> usize {
        self.quota.saturating_sub(self.winners.len())
    }

    pub fn would_exceed_quota(&self, count: usize) -> bool {
        self.winners.len() + count > self.quota
    }

    /// Unions `names` into the winner list, skipping non-candidates and repeats.
    /// Returns the names actually added, in order.
    pub fn record_winners<I, S>(&mut self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = Vec::new();
        for name in names {
            let name = name.as_ref();
            if self.is_winner(name) || !self.candidates.iter().any(|c| c == name) {
                continue;
            }
            self.winners.push(name.to_string());
            added.push(name.to_string());
        }
        added
    }

    /// `(winner, band)` pairs in commit order.
    pub fn winner_bands(&self) -> Vec<(&str, usize)> {
        self.winners
            .iter()
            .enumerate()
            .map(|(i, w)| (w.as_str(), self.band_format.band_of(i)))
            .collect()
    }
}

fn dedup_candidates(category: &str, candidates: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(candidates.len());
    for name in candidates {
        let name = name.trim().to_string();
        if name.is_empty() {
            continue;
        }
        if !seen.insert(name.clone()) {
            tracing::warn!(category, candidate = %name, "duplicate candidate dropped");
            continue;
        }
        out.push(name);
    }
    out
}
