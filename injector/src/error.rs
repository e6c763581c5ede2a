use crate::{
    energy_pdf::EnergyPdfError, rotation::RotationError, storage::StorageError,
    time_pdf::TimePdfError,
};
use flarestack_common::SampleError;
use std::path::PathBuf;
use thiserror::Error;

pub type InjectorResult<T> = Result<T, InjectorError>;

#[derive(Debug, Error)]
pub enum InjectorError {
    #[error("Energy PDF Error: {0}")]
    EnergyPdf(#[from] EnergyPdfError),
    #[error("Time PDF Error: {0}")]
    TimePdf(#[from] TimePdfError),
    #[error("Sample Error: {0}")]
    Sample(#[from] SampleError),
    #[error("Rotation Error: {0}")]
    Rotation(#[from] RotationError),
    #[error("Storage Error: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid Event Weights for Source {source_name}: {error}")]
    Sampling {
        source_name: String,
        error: rand::distr::weighted::Error,
    },
    #[error("Invalid Expected Event Count {n_inj} for Source {source_name}: {error}")]
    Poisson {
        source_name: String,
        n_inj: f64,
        error: rand_distr::PoissonError,
    },
    #[error("Cannot Read {}: {error}", path.display())]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("Cannot Parse {}: {error}", path.display())]
    Json {
        path: PathBuf,
        error: serde_json::Error,
    },
    #[error("Source {0} appears more than once in the catalogue")]
    DuplicateSource(String),
    #[error("Invalid Source {name}: {reason}")]
    InvalidSource { name: String, reason: &'static str },
    #[error("Energy PDF returned {found} weights for {expected} simulated events")]
    WeightLength { expected: usize, found: usize },
    #[error("Attempting to create a dataset from unblinded data for season {0}")]
    Unblinded(String),
}
