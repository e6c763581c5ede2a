use flarestack_common::McSample;
use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnergyPdfError {
    #[error("Spectral index must be finite, got {0}")]
    InvalidGamma(f64),
    #[error("Energy bound {0} must be finite and positive")]
    InvalidBound(f64),
    #[error("Energy range is empty: E Min {e_min} >= E Max {e_max}")]
    EmptyRange { e_min: f64, e_max: f64 },
}

/// Weights simulated events according to an assumed neutrino spectrum.
pub trait EnergyPdf: Debug + Send + Sync {
    /// Returns one weight per event, aligned index for index with `mc`.
    fn weight_mc(&self, mc: &McSample) -> Array1<f64>;
}

fn default_gamma() -> f64 {
    2.0
}

/// This enum is created from the `Injection Energy PDF` entry of the configuration.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "Name")]
pub enum EnergyPdfConfig {
    #[serde(rename = "Power Law")]
    PowerLaw {
        #[serde(rename = "Gamma", default = "default_gamma")]
        gamma: f64,
        #[serde(rename = "E Min", default)]
        e_min: Option<f64>,
        #[serde(rename = "E Max", default)]
        e_max: Option<f64>,
    },
}

impl EnergyPdfConfig {
    pub fn create(&self) -> Result<Box<dyn EnergyPdf>, EnergyPdfError> {
        match *self {
            Self::PowerLaw {
                gamma,
                e_min,
                e_max,
            } => Ok(Box::new(PowerLaw::new(gamma, e_min, e_max)?)),
        }
    }
}

/// An unbroken power law `E^-gamma`, optionally restricted to `[e_min, e_max]`.
#[derive(Clone, Debug, PartialEq)]
pub struct PowerLaw {
    gamma: f64,
    e_min: f64,
    e_max: f64,
}

impl PowerLaw {
    pub fn new(gamma: f64, e_min: Option<f64>, e_max: Option<f64>) -> Result<Self, EnergyPdfError> {
        if !gamma.is_finite() {
            return Err(EnergyPdfError::InvalidGamma(gamma));
        }
        for bound in e_min.iter().chain(e_max.iter()) {
            if !bound.is_finite() || *bound <= 0.0 {
                return Err(EnergyPdfError::InvalidBound(*bound));
            }
        }
        let e_min = e_min.unwrap_or(0.0);
        let e_max = e_max.unwrap_or(f64::INFINITY);
        if e_min >= e_max {
            return Err(EnergyPdfError::EmptyRange { e_min, e_max });
        }
        Ok(Self {
            gamma,
            e_min,
            e_max,
        })
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Differential flux shape at energy `e`, zero outside the energy range.
    pub fn f(&self, e: f64) -> f64 {
        if (self.e_min..=self.e_max).contains(&e) {
            e.powf(-self.gamma)
        } else {
            0.0
        }
    }
}

impl EnergyPdf for PowerLaw {
    fn weight_mc(&self, mc: &McSample) -> Array1<f64> {
        Zip::from(&mc.ow)
            .and(&mc.true_e)
            .map_collect(|&ow, &true_e| ow * self.f(true_e))
    }
}
