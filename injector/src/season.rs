use flarestack_common::{Mjd, SECONDS_PER_DAY, Seconds};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A period of detector operation, with the tables holding its
/// experimental data and its simulation.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Season {
    #[serde(rename = "Name")]
    pub name: String,
    pub exp_path: PathBuf,
    pub mc_path: PathBuf,
    #[serde(rename = "Start (MJD)")]
    pub start_mjd: Mjd,
    #[serde(rename = "End (MJD)")]
    pub end_mjd: Mjd,
}

impl Season {
    pub fn livetime(&self) -> Seconds {
        (self.end_mjd - self.start_mjd).max(0.0) * SECONDS_PER_DAY
    }
}
