//! Selects between the ordinary blinded injector and the unblinded one,
//! which holds the real data but refuses to turn it into a dataset.
use crate::{
    error::{InjectorError, InjectorResult},
    injector::Injector,
    season::Season,
    storage,
};
use flarestack_common::EventSample;
use rand::Rng;
use strum::Display;
use tracing::{error, info};

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum Blinding {
    Blinded,
    Unblinded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnblindedState {
    Constructed,
    /// A dataset was requested and refused.
    Blocked,
}

/// Holds the unscrambled experimental data of a season.
#[derive(Clone, Debug)]
pub struct UnblindedInjector {
    season: Season,
    raw_data: EventSample,
    state: UnblindedState,
}

impl UnblindedInjector {
    pub fn new(season: Season) -> InjectorResult<Self> {
        info!("Initialising unblinded Injector for {}", season.name);
        let raw_data = storage::load_events(&season.exp_path)?;
        Self::from_sample(season, raw_data)
    }

    pub fn from_sample(season: Season, raw_data: EventSample) -> InjectorResult<Self> {
        raw_data.validate()?;
        Ok(Self {
            season,
            raw_data,
            state: UnblindedState::Constructed,
        })
    }

    pub fn season(&self) -> &Season {
        &self.season
    }

    pub fn state(&self) -> UnblindedState {
        self.state
    }

    pub fn n_events(&self) -> usize {
        self.raw_data.len()
    }

    /// Always fails. Real data must never leave the injector unscrambled.
    pub fn create_dataset(&mut self) -> InjectorResult<EventSample> {
        self.state = UnblindedState::Blocked;
        error!(season = %self.season.name, "Refusing to create a dataset from unblinded data");
        Err(InjectorError::Unblinded(self.season.name.clone()))
    }
}

#[derive(Clone, Debug)]
pub enum InjectorVariant {
    Blinded(Injector),
    Unblinded(UnblindedInjector),
}

impl InjectorVariant {
    pub fn blinding(&self) -> Blinding {
        match self {
            Self::Blinded(_) => Blinding::Blinded,
            Self::Unblinded(_) => Blinding::Unblinded,
        }
    }

    pub fn season(&self) -> &Season {
        match self {
            Self::Blinded(injector) => injector.season(),
            Self::Unblinded(injector) => injector.season(),
        }
    }

    pub fn create_dataset<R: Rng>(
        &mut self,
        scale: f64,
        rng: &mut R,
    ) -> InjectorResult<EventSample> {
        match self {
            Self::Blinded(injector) => injector.create_dataset(scale, rng),
            Self::Unblinded(injector) => injector.create_dataset(),
        }
    }
}
