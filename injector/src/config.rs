use crate::{
    energy_pdf::EnergyPdfConfig,
    error::{InjectorError, InjectorResult},
    time_pdf::TimePdfConfig,
};
use flarestack_common::Source;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{collections::HashSet, f64::consts::FRAC_PI_2, fs::File, io::BufReader, path::Path};

fn default_poisson_smear() -> bool {
    true
}

/// Options recognised when constructing an injector.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InjectorConfig {
    #[serde(rename = "Injection Energy PDF")]
    pub energy_pdf: EnergyPdfConfig,
    #[serde(rename = "Injection Time PDF")]
    pub time_pdf: TimePdfConfig,
    /// Draw the number of injected events from a Poisson distribution
    /// rather than rounding the expectation down.
    #[serde(rename = "Poisson Smear?", default = "default_poisson_smear")]
    pub poisson_smear: bool,
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> InjectorResult<T> {
    let file = File::open(path).map_err(|error| InjectorError::Io {
        path: path.to_owned(),
        error,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|error| InjectorError::Json {
        path: path.to_owned(),
        error,
    })
}

/// Checks that source names are unique and that every source is physical.
pub fn validate_catalogue(sources: &[Source]) -> InjectorResult<()> {
    let mut names = HashSet::new();
    for source in sources {
        if !names.insert(source.name.as_str()) {
            return Err(InjectorError::DuplicateSource(source.name.clone()));
        }
        let reason = if !(-FRAC_PI_2..=FRAC_PI_2).contains(&source.dec) {
            Some("declination outside [-pi/2, pi/2]")
        } else if !source.ra.is_finite() {
            Some("right ascension is not finite")
        } else if !source.injection_flux_scale.is_finite() || source.injection_flux_scale < 0.0 {
            Some("injection flux scale must be finite and non-negative")
        } else if !source.weight_distance.is_finite() || source.weight_distance < 0.0 {
            Some("distance weight must be finite and non-negative")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(InjectorError::InvalidSource {
                name: source.name.clone(),
                reason,
            });
        }
    }
    Ok(())
}

pub fn load_catalogue(path: &Path) -> InjectorResult<Vec<Source>> {
    let sources: Vec<Source> = read_json(path)?;
    validate_catalogue(&sources)?;
    Ok(sources)
}
