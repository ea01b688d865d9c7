//! Joint dataset collections.
//!
//! [`Datasets`] is an ordered list of spectrum datasets treated as one
//! likelihood: the joint statistic is the sum of the members' statistics, so
//! member order never changes a fit result.

use std::fmt;

use crate::datasets::dataset::SpectrumDataset;
use crate::error::AppError;
use crate::models::ModelHandle;

#[derive(Debug, Clone, Default)]
pub struct Datasets {
    datasets: Vec<SpectrumDataset>,
}

impl Datasets {
    pub fn new(datasets: Vec<SpectrumDataset>) -> Self {
        Self { datasets }
    }

    /// Concatenate per-instrument sequences into one collection.
    ///
    /// Sequences are appended in the order given and keep their internal order.
    /// No deduplication and no energy-grid compatibility check is done here.
    pub fn concat<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = Vec<SpectrumDataset>>,
    {
        let datasets = parts.into_iter().flatten().collect();
        Self { datasets }
    }

    /// Bind one shared model to every member, replacing earlier bindings.
    pub fn set_models(&mut self, model: &ModelHandle) {
        for ds in &mut self.datasets {
            ds.set_models(model);
        }
    }

    /// Distinct models bound to the members, in first-seen order.
    pub fn models(&self) -> Vec<ModelHandle> {
        let mut out: Vec<ModelHandle> = Vec::new();
        for ds in &self.datasets {
            if let Some(handle) = ds.models() {
                if !out.iter().any(|h| ModelHandle::ptr_eq(h, handle)) {
                    out.push(handle.clone());
                }
            }
        }
        out
    }

    /// Joint statistic: sum of the members' Cash statistics.
    pub fn stat_sum(&self) -> Result<f64, AppError> {
        let mut total = 0.0;
        for ds in &self.datasets {
            total += ds.stat_sum()?;
        }
        Ok(total)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SpectrumDataset> {
        self.datasets.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&SpectrumDataset> {
        self.datasets.get(idx)
    }

    pub fn names(&self) -> Vec<&str> {
        self.datasets.iter().map(|d| d.name.as_str()).collect()
    }

    /// Instrument names in first-seen order.
    pub fn instruments(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for ds in &self.datasets {
            if !out.contains(&ds.instrument) {
                out.push(ds.instrument.clone());
            }
        }
        out
    }
}

impl IntoIterator for Datasets {
    type Item = SpectrumDataset;
    type IntoIter = std::vec::IntoIter<SpectrumDataset>;

    fn into_iter(self) -> Self::IntoIter {
        self.datasets.into_iter()
    }
}

impl<'a> IntoIterator for &'a Datasets {
    type Item = &'a SpectrumDataset;
    type IntoIter = std::slice::Iter<'a, SpectrumDataset>;

    fn into_iter(self) -> Self::IntoIter {
        self.datasets.iter()
    }
}

impl fmt::Display for Datasets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Datasets")?;
        writeln!(f, "--------")?;
        writeln!(f)?;
        for (idx, ds) in self.datasets.iter().enumerate() {
            let model = ds.models().map(|m| m.name()).unwrap_or_else(|| "-".to_string());
            writeln!(f, "Dataset {idx}:")?;
            writeln!(f)?;
            writeln!(f, "  Type       : SpectrumDataset")?;
            writeln!(f, "  Name       : {}", ds.name)?;
            writeln!(f, "  Instrument : {}", ds.instrument)?;
            writeln!(f, "  Models     : {model}")?;
            writeln!(f)?;
        }
        Ok(())
    }
}
