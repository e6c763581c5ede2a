pub mod metrics;
mod sample;
mod source;
mod tracer;

pub use sample::{EventSample, McSample, SampleError};
pub use source::{Source, SourceName};
pub use tracer::init_tracer;

/// Angles on the sky are always carried in radians.
pub type Radians = f64;
/// Modified Julian Date.
pub type Mjd = f64;
pub type Seconds = f64;

pub const SECONDS_PER_DAY: Seconds = 86_400.0;
