use crate::season::Season;
use flarestack_common::{Mjd, SECONDS_PER_DAY, Seconds, Source};
use ndarray::Array1;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimePdfError {
    #[error("Season ends ({end}) before it starts ({start})")]
    InvalidSeason { start: Mjd, end: Mjd },
    #[error("Time window {name} must be finite and non-negative, got {value}")]
    InvalidWindow { name: &'static str, value: f64 },
    #[error("Source {0} has no reference time")]
    MissingRefTime(String),
    #[error("Cannot draw {n} times for source {source_name}: window does not overlap the season")]
    EmptyWindow { source_name: String, n: usize },
}

/// Models when a source emits neutrinos.
pub trait TimePdf: Debug + Send + Sync {
    /// Overlap between the season live-time and the emission window of `source`, in seconds.
    fn effective_injection_time(&self, source: &Source) -> Result<Seconds, TimePdfError>;

    /// Draws `n` arrival times (MJD) for events from `source`.
    fn simulate_times(
        &self,
        source: &Source,
        n: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Array1<f64>, TimePdfError>;
}

/// This enum is created from the `Injection Time PDF` entry of the configuration.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "Name")]
pub enum TimePdfConfig {
    Steady,
    #[serde(rename = "Box")]
    BoxWindow {
        /// Days before the reference time.
        #[serde(rename = "Pre-Window", default)]
        pre_window: f64,
        /// Days after the reference time.
        #[serde(rename = "Post-Window", default)]
        post_window: f64,
    },
}

impl TimePdfConfig {
    pub fn create(&self, season: &Season) -> Result<Box<dyn TimePdf>, TimePdfError> {
        if season.start_mjd.is_nan()
            || season.end_mjd.is_nan()
            || season.end_mjd < season.start_mjd
        {
            return Err(TimePdfError::InvalidSeason {
                start: season.start_mjd,
                end: season.end_mjd,
            });
        }
        match *self {
            Self::Steady => Ok(Box::new(Steady::new(season))),
            Self::BoxWindow {
                pre_window,
                post_window,
            } => Ok(Box::new(BoxWindow::new(season, pre_window, post_window)?)),
        }
    }
}

fn draw_uniform(start: Mjd, end: Mjd, n: usize, rng: &mut dyn RngCore) -> Array1<f64> {
    if start < end {
        Array1::from_shape_simple_fn(n, || rng.random_range(start..end))
    } else {
        Array1::from_elem(n, start)
    }
}

/// Emission is constant over the whole season.
#[derive(Clone, Debug, PartialEq)]
pub struct Steady {
    start: Mjd,
    end: Mjd,
}

impl Steady {
    pub fn new(season: &Season) -> Self {
        Self {
            start: season.start_mjd,
            end: season.end_mjd,
        }
    }
}

impl TimePdf for Steady {
    fn effective_injection_time(&self, _source: &Source) -> Result<Seconds, TimePdfError> {
        Ok((self.end - self.start) * SECONDS_PER_DAY)
    }

    fn simulate_times(
        &self,
        _source: &Source,
        n: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Array1<f64>, TimePdfError> {
        Ok(draw_uniform(self.start, self.end, n, rng))
    }
}

/// Emission is constant within a window around each source's reference time,
/// and zero outside it.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxWindow {
    season_start: Mjd,
    season_end: Mjd,
    pre_window: f64,
    post_window: f64,
}

impl BoxWindow {
    pub fn new(season: &Season, pre_window: f64, post_window: f64) -> Result<Self, TimePdfError> {
        for (name, value) in [("Pre-Window", pre_window), ("Post-Window", post_window)] {
            if !value.is_finite() || value < 0.0 {
                return Err(TimePdfError::InvalidWindow { name, value });
            }
        }
        Ok(Self {
            season_start: season.start_mjd,
            season_end: season.end_mjd,
            pre_window,
            post_window,
        })
    }

    /// The part of the source window that lies within the season, if any.
    fn overlap(&self, source: &Source) -> Result<Option<(Mjd, Mjd)>, TimePdfError> {
        let ref_time = source
            .ref_time_mjd
            .ok_or_else(|| TimePdfError::MissingRefTime(source.name.clone()))?;
        let start = (ref_time - self.pre_window).max(self.season_start);
        let end = (ref_time + self.post_window).min(self.season_end);
        Ok((start < end).then_some((start, end)))
    }
}

impl TimePdf for BoxWindow {
    fn effective_injection_time(&self, source: &Source) -> Result<Seconds, TimePdfError> {
        Ok(self
            .overlap(source)?
            .map(|(start, end)| (end - start) * SECONDS_PER_DAY)
            .unwrap_or_default())
    }

    fn simulate_times(
        &self,
        source: &Source,
        n: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Array1<f64>, TimePdfError> {
        match self.overlap(source)? {
            Some((start, end)) => Ok(draw_uniform(start, end, n, rng)),
            None if n == 0 => Ok(Array1::zeros(0)),
            None => Err(TimePdfError::EmptyWindow {
                source_name: source.name.clone(),
                n,
            }),
        }
    }
}
