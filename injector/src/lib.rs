pub mod band;
pub mod config;
pub mod dataset;
pub mod energy_pdf;
pub mod error;
pub mod flux;
pub mod injector;
pub mod rotation;
pub mod scramble;
pub mod season;
pub mod storage;
pub mod time_pdf;
pub mod trials;
pub mod variant;

pub use config::InjectorConfig;
pub use error::{InjectorError, InjectorResult};
pub use injector::{Injector, RefFluxes, ScaleKey};
pub use season::Season;
pub use trials::{TrialOutcome, TrialSettings, TrialSummary, run_trials};
pub use variant::{Blinding, InjectorVariant, UnblindedInjector, UnblindedState};
