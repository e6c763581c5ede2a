use crate::{Mjd, Radians};
use serde::{Deserialize, Serialize};

/// Sources are keyed by name throughout a run.
pub type SourceName = String;

fn default_weight_distance() -> f64 {
    1.0
}

/// A point source into which signal is injected. Sources are treated as
/// immutable for the lifetime of an injector.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Source {
    #[serde(rename = "Name")]
    pub name: SourceName,
    pub ra: Radians,
    pub dec: Radians,
    /// Flux normalisation, in units of `k`.
    #[serde(rename = "injection flux scale")]
    pub injection_flux_scale: f64,
    #[serde(rename = "weight_distance", default = "default_weight_distance")]
    pub weight_distance: f64,
    /// Reference time used by windowed time profiles.
    #[serde(rename = "Ref Time (MJD)", default)]
    pub ref_time_mjd: Option<Mjd>,
}
