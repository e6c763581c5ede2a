//! Reads season tables from, and writes generated datasets to, HDF5 files.
//!
//! Every column is a one-dimensional `f64` dataset in the group it belongs to,
//! named as in the detector tables (`ra`, `sinDec`, `dec`, `sigma`, `logE`,
//! `timeMJD`, and for simulation `trueRa`, `trueDec`, `trueE`, `ow`).
use flarestack_common::{EventSample, McSample, SampleError};
use hdf5::{File, Group, H5Type};
use ndarray::Array1;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("HDF5 Error: {error} at {hdf5_path}")]
    HDF5 {
        error: hdf5::Error,
        hdf5_path: String,
    },
    #[error("{0}")]
    Sample(#[from] SampleError),
}

pub(crate) trait ConvertResult<T> {
    fn err_at(self, hdf5_path: &str) -> StorageResult<T>;
}

impl<T> ConvertResult<T> for hdf5::Result<T> {
    fn err_at(self, hdf5_path: &str) -> StorageResult<T> {
        self.map_err(|error| StorageError::HDF5 {
            error,
            hdf5_path: hdf5_path.to_owned(),
        })
    }
}

fn column_path(group: &Group, name: &str) -> String {
    format!("{}/{name}", group.name().trim_end_matches('/'))
}

fn read_column(group: &Group, name: &str) -> StorageResult<Array1<f64>> {
    let path = column_path(group, name);
    group
        .dataset(name)
        .and_then(|dataset| dataset.read_1d::<f64>())
        .err_at(&path)
}

fn read_events(group: &Group) -> StorageResult<EventSample> {
    let dec = if group.link_exists("dec") {
        Some(read_column(group, "dec")?)
    } else {
        None
    };
    Ok(EventSample::new(
        read_column(group, "ra")?,
        read_column(group, "sinDec")?,
        dec,
        read_column(group, "sigma")?,
        read_column(group, "logE")?,
        read_column(group, "timeMJD")?,
    )?)
}

/// Loads the experimental events of a season.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_events(path: &Path) -> StorageResult<EventSample> {
    let file = File::open(path).err_at(&path.display().to_string())?;
    let events = read_events(&file)?;
    info!(events = events.len(), "Loaded experimental data");
    Ok(events)
}

/// Loads the simulated events of a season, including the Monte-Carlo truth.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_mc(path: &Path) -> StorageResult<McSample> {
    let file = File::open(path).err_at(&path.display().to_string())?;
    let mc = McSample::new(
        read_events(&file)?,
        read_column(&file, "trueRa")?,
        read_column(&file, "trueDec")?,
        read_column(&file, "trueE")?,
        read_column(&file, "ow")?,
    )?;
    info!(events = mc.len(), "Loaded simulation");
    Ok(mc)
}

fn write_column(group: &Group, name: &str, column: &Array1<f64>) -> StorageResult<()> {
    let path = column_path(group, name);
    group
        .new_dataset_builder()
        .with_data(column)
        .create(name)
        .err_at(&path)?;
    Ok(())
}

fn write_attribute<T: H5Type>(group: &Group, name: &str, value: &T) -> StorageResult<()> {
    let path = format!("{}@{name}", group.name());
    group
        .new_attr::<T>()
        .create(name)
        .and_then(|attr| attr.write_scalar(value))
        .err_at(&path)
}

/// Writes generated datasets, one group per trial.
pub struct DatasetWriter {
    file: File,
}

impl DatasetWriter {
    pub fn create(path: &Path) -> StorageResult<Self> {
        let file = File::create(path).err_at(&path.display().to_string())?;
        Ok(Self { file })
    }

    #[instrument(skip(self, events), fields(events = events.len()))]
    pub fn write_trial(
        &self,
        trial: usize,
        seed: u64,
        scale: f64,
        events: &EventSample,
    ) -> StorageResult<()> {
        let name = format!("trial_{trial}");
        let group = self.file.create_group(&name).err_at(&name)?;
        write_attribute(&group, "seed", &seed)?;
        write_attribute(&group, "scale", &scale)?;

        write_column(&group, "ra", &events.ra)?;
        write_column(&group, "sinDec", &events.sin_dec)?;
        if let Some(dec) = &events.dec {
            write_column(&group, "dec", dec)?;
        }
        write_column(&group, "sigma", &events.sigma)?;
        write_column(&group, "logE", &events.log_e)?;
        write_column(&group, "timeMJD", &events.time_mjd)?;
        debug!("Trial written");
        Ok(())
    }
}
