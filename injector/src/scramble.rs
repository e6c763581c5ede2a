use flarestack_common::EventSample;
use ndarray::Array1;
use rand::{Rng, seq::SliceRandom};
use std::f64::consts::TAU;

/// Blinds experimental data: every right ascension is redrawn uniformly
/// on `[0, 2pi)` and the arrival times are shuffled among the events.
/// All other columns, and so their marginal distributions, are untouched.
pub fn scramble<R: Rng + ?Sized>(raw_data: &EventSample, rng: &mut R) -> EventSample {
    let mut times = raw_data.time_mjd.to_vec();
    times.shuffle(rng);
    EventSample {
        ra: Array1::from_shape_simple_fn(raw_data.len(), || rng.random_range(0.0..TAU)),
        time_mjd: Array1::from_vec(times),
        ..raw_data.clone()
    }
}
