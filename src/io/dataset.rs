//! Read/write spectrum datasets as JSON.
//!
//! The file holds the binned data only; model bindings are made at run time.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::datasets::SpectrumDataset;
use crate::domain::EnergyEdges;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetFile {
    pub name: String,
    pub instrument: String,
    /// Bin edges in TeV.
    pub energy_edges: EnergyEdges,
    pub counts: Vec<f64>,
    /// Exposure per bin (cm² s).
    pub exposure: Vec<f64>,
    /// Expected background counts per bin.
    pub background: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_safe: Option<Vec<bool>>,
}

impl From<&SpectrumDataset> for DatasetFile {
    fn from(ds: &SpectrumDataset) -> Self {
        let mask = ds.mask_safe();
        Self {
            name: ds.name.clone(),
            instrument: ds.instrument.clone(),
            energy_edges: ds.edges().clone(),
            counts: ds.counts().to_vec(),
            exposure: ds.exposure().to_vec(),
            background: ds.background().to_vec(),
            mask_safe: if mask.iter().all(|m| *m) { None } else { Some(mask.to_vec()) },
        }
    }
}

impl DatasetFile {
    pub fn into_dataset(self) -> Result<SpectrumDataset, AppError> {
        let ds = SpectrumDataset::new(
            self.name,
            self.instrument,
            self.energy_edges,
            self.counts,
            self.exposure,
            self.background,
        )?;
        match self.mask_safe {
            Some(mask) => ds.with_mask_safe(mask),
            None => Ok(ds),
        }
    }
}

pub fn read_dataset_json(path: &Path) -> Result<SpectrumDataset, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open dataset '{}': {e}", path.display())))?;
    let raw: DatasetFile = serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid dataset JSON '{}': {e}", path.display())))?;
    raw.into_dataset()
        .map_err(|e| e.context(format!("dataset '{}'", path.display())))
}

pub fn write_dataset_json(path: &Path, dataset: &SpectrumDataset) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create dataset '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &DatasetFile::from(dataset))
        .map_err(|e| AppError::new(2, format!("Failed to write dataset JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_survives_a_file_round_trip() {
        let edges = EnergyEdges::new(vec![1.0, 2.0, 4.0]).unwrap();
        let ds = SpectrumDataset::new("L1", "LST", edges, vec![3.0, 1.0], vec![1e11, 2e11], vec![0.5, 0.25])
            .unwrap()
            .with_mask_safe(vec![true, false])
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l1.json");
        write_dataset_json(&path, &ds).unwrap();
        let back = read_dataset_json(&path).unwrap();

        assert_eq!(back.name, "L1");
        assert_eq!(back.counts(), ds.counts());
        assert_eq!(back.mask_safe(), &[true, false]);
        assert!(back.models().is_none());
    }

    #[test]
    fn invalid_lengths_are_reported() {
        let json = r#"{"name":"x","instrument":"HESS","energy_edges":[1,2,4],
            "counts":[1],"exposure":[1,1],"background":[0,0]}"#;
        let raw: DatasetFile = serde_json::from_str(json).unwrap();
        let err = raw.into_dataset().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
