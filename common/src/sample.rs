//! Columnar event samples.
//!
//! An [EventSample] holds the columns shared by detector data and
//! simulation, an [McSample] additionally carries the Monte-Carlo truth.
//! Converting an [McSample] into an [EventSample] drops the truth columns,
//! so events emitted from simulation are structurally identical to data.
use ndarray::{Array1, Axis, ShapeError, concatenate};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Column {column} has length {found}, expected {expected}")]
    ColumnLength {
        column: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Mask has length {found}, expected {expected}")]
    MaskLength { expected: usize, found: usize },
    #[error("Cannot join samples with and without a dec column")]
    MismatchedLayout,
    #[error("Index {index} out of range for sample of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Shape Error: {0}")]
    Shape(#[from] ShapeError),
}

fn check_length(
    column: &'static str,
    values: &Array1<f64>,
    expected: usize,
) -> Result<(), SampleError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(SampleError::ColumnLength {
            column,
            expected,
            found: values.len(),
        })
    }
}

fn join<'a>(columns: impl Iterator<Item = &'a Array1<f64>>) -> Result<Array1<f64>, SampleError> {
    let views = columns.map(|column| column.view()).collect::<Vec<_>>();
    Ok(concatenate(Axis(0), &views)?)
}

/// Events as seen by the detector, one entry per event in every column.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventSample {
    pub ra: Array1<f64>,
    pub sin_dec: Array1<f64>,
    pub dec: Option<Array1<f64>>,
    pub sigma: Array1<f64>,
    pub log_e: Array1<f64>,
    pub time_mjd: Array1<f64>,
}

impl EventSample {
    /// Creates a sample, checking that every column has the same length as `ra`.
    pub fn new(
        ra: Array1<f64>,
        sin_dec: Array1<f64>,
        dec: Option<Array1<f64>>,
        sigma: Array1<f64>,
        log_e: Array1<f64>,
        time_mjd: Array1<f64>,
    ) -> Result<Self, SampleError> {
        let sample = Self {
            ra,
            sin_dec,
            dec,
            sigma,
            log_e,
            time_mjd,
        };
        sample.validate()?;
        Ok(sample)
    }

    pub fn validate(&self) -> Result<(), SampleError> {
        let len = self.len();
        check_length("sinDec", &self.sin_dec, len)?;
        if let Some(dec) = &self.dec {
            check_length("dec", dec, len)?;
        }
        check_length("sigma", &self.sigma, len)?;
        check_length("logE", &self.log_e, len)?;
        check_length("timeMJD", &self.time_mjd, len)
    }

    pub fn len(&self) -> usize {
        self.ra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ra.is_empty()
    }

    /// Declination of each event, read from `dec` if present, otherwise from `sinDec`.
    pub fn declination(&self) -> Array1<f64> {
        match &self.dec {
            Some(dec) => dec.clone(),
            None => self.sin_dec.mapv(f64::asin),
        }
    }

    /// Gathers the events at the given indices, repeats allowed.
    pub fn select(&self, indices: &[usize]) -> Result<Self, SampleError> {
        let len = self.len();
        if let Some(&index) = indices.iter().find(|&&i| i >= len) {
            return Err(SampleError::IndexOutOfRange { index, len });
        }
        Ok(Self {
            ra: self.ra.select(Axis(0), indices),
            sin_dec: self.sin_dec.select(Axis(0), indices),
            dec: self.dec.as_ref().map(|dec| dec.select(Axis(0), indices)),
            sigma: self.sigma.select(Axis(0), indices),
            log_e: self.log_e.select(Axis(0), indices),
            time_mjd: self.time_mjd.select(Axis(0), indices),
        })
    }

    /// Appends `other` after `self`. Both samples must share the same layout.
    pub fn concatenate(&self, other: &Self) -> Result<Self, SampleError> {
        self.concatenate_all(std::slice::from_ref(other))
    }

    /// Appends every sample in `others` after `self`, in order, copying each column once.
    pub fn concatenate_all(&self, others: &[Self]) -> Result<Self, SampleError> {
        let parts = || std::iter::once(self).chain(others);
        let dec = match &self.dec {
            Some(_) => {
                let columns = parts()
                    .map(|part| part.dec.as_ref().ok_or(SampleError::MismatchedLayout))
                    .collect::<Result<Vec<_>, _>>()?;
                Some(join(columns.into_iter())?)
            }
            None if others.iter().any(|other| other.dec.is_some()) => {
                return Err(SampleError::MismatchedLayout);
            }
            None => None,
        };
        Ok(Self {
            ra: join(parts().map(|part| &part.ra))?,
            sin_dec: join(parts().map(|part| &part.sin_dec))?,
            dec,
            sigma: join(parts().map(|part| &part.sigma))?,
            log_e: join(parts().map(|part| &part.log_e))?,
            time_mjd: join(parts().map(|part| &part.time_mjd))?,
        })
    }

    /// An empty sample with the same layout as `self`.
    pub fn empty_like(&self) -> Self {
        Self {
            dec: self.dec.as_ref().map(|_| Array1::zeros(0)),
            ..Self::default()
        }
    }
}

/// Simulated events, carrying the Monte-Carlo truth alongside the reconstructed values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct McSample {
    pub events: EventSample,
    pub true_ra: Array1<f64>,
    pub true_dec: Array1<f64>,
    pub true_e: Array1<f64>,
    /// OneWeight of each simulated event.
    pub ow: Array1<f64>,
}

impl McSample {
    pub fn new(
        events: EventSample,
        true_ra: Array1<f64>,
        true_dec: Array1<f64>,
        true_e: Array1<f64>,
        ow: Array1<f64>,
    ) -> Result<Self, SampleError> {
        let sample = Self {
            events,
            true_ra,
            true_dec,
            true_e,
            ow,
        };
        sample.validate()?;
        Ok(sample)
    }

    pub fn validate(&self) -> Result<(), SampleError> {
        self.events.validate()?;
        let len = self.len();
        check_length("trueRa", &self.true_ra, len)?;
        check_length("trueDec", &self.true_dec, len)?;
        check_length("trueE", &self.true_e, len)?;
        check_length("ow", &self.ow, len)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn select(&self, indices: &[usize]) -> Result<Self, SampleError> {
        Ok(Self {
            events: self.events.select(indices)?,
            true_ra: self.true_ra.select(Axis(0), indices),
            true_dec: self.true_dec.select(Axis(0), indices),
            true_e: self.true_e.select(Axis(0), indices),
            ow: self.ow.select(Axis(0), indices),
        })
    }

    /// Keeps only the events for which `mask` is true.
    pub fn select_mask(&self, mask: &Array1<bool>) -> Result<Self, SampleError> {
        if mask.len() != self.len() {
            return Err(SampleError::MaskLength {
                expected: self.len(),
                found: mask.len(),
            });
        }
        let indices = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect::<Vec<_>>();
        self.select(&indices)
    }

    /// Discards the truth columns.
    pub fn into_events(self) -> EventSample {
        self.events
    }
}

impl From<McSample> for EventSample {
    fn from(sample: McSample) -> Self {
        sample.into_events()
    }
}
