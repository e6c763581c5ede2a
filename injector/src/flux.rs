//! Flux normalisations are quoted in units of `k`, where `k = 1` corresponds
//! to a flux of 1e-9 GeV^-1 cm^-2 s^-1.

const K_UNIT: f64 = 1e-9;

pub fn k_to_flux(k: f64) -> f64 {
    k * K_UNIT
}

pub fn flux_to_k(flux: f64) -> f64 {
    flux / K_UNIT
}
