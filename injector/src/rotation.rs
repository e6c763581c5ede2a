//! Rigid rotations on the celestial sphere.
//!
//! Simulated events are generated all over the sky. To inject them at a
//! source each event is first rotated so that its true direction sits on
//! the pole, then every event is carried from the pole onto the source by
//! one shared rotation. The offset between reconstructed and true direction
//! of every event is preserved.
use flarestack_common::{EventSample, McSample, Radians, SampleError};
use nalgebra::{Rotation3, Vector3};
use ndarray::Array1;
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("Rotation inputs have mismatched lengths: ra {ra}, dec {dec}, true ra {true_ra}, true dec {true_dec}")]
    Length {
        ra: usize,
        dec: usize,
        true_ra: usize,
        true_dec: usize,
    },
    #[error("{0}")]
    Sample(#[from] SampleError),
}

/// Right ascension and declination to the (zenith, azimuth) convention
/// where `phi = ra - pi` and `zen = pi/2 - dec`.
fn to_unit_vector(ra: Radians, dec: Radians) -> Vector3<f64> {
    let phi = ra - PI;
    let zen = FRAC_PI_2 - dec;
    Vector3::new(zen.sin() * phi.cos(), zen.sin() * phi.sin(), zen.cos())
}

fn from_unit_vector(v: &Vector3<f64>) -> (Radians, Radians) {
    let zen = v.x.hypot(v.y).atan2(v.z);
    let phi = v.y.atan2(v.x);
    ((phi + PI).rem_euclid(TAU), FRAC_PI_2 - zen)
}

/// The rotation carrying direction (ra, dec) onto the pole.
fn to_pole(ra: Radians, dec: Radians) -> Rotation3<f64> {
    let phi = ra - PI;
    let zen = FRAC_PI_2 - dec;
    Rotation3::from_axis_angle(&Vector3::y_axis(), -zen)
        * Rotation3::from_axis_angle(&Vector3::z_axis(), -phi)
}

/// Rotates batches of events onto a single target direction.
#[derive(Clone, Debug)]
pub struct SphericalRotator {
    from_pole: Rotation3<f64>,
}

impl SphericalRotator {
    /// Creates a rotator whose shared stage carries the pole onto (ra, dec).
    pub fn new(ra: Radians, dec: Radians) -> Self {
        let phi = ra - PI;
        let zen = FRAC_PI_2 - dec;
        Self {
            from_pole: Rotation3::from_axis_angle(&Vector3::z_axis(), phi)
                * Rotation3::from_axis_angle(&Vector3::y_axis(), zen),
        }
    }

    /// Rotates a single direction `(ra, dec)`, whose true direction is
    /// `(true_ra, true_dec)`, so that the true direction lands on the target.
    pub fn rotate_one(
        &self,
        ra: Radians,
        dec: Radians,
        true_ra: Radians,
        true_dec: Radians,
    ) -> (Radians, Radians) {
        let rotated = self.from_pole * to_pole(true_ra, true_dec) * to_unit_vector(ra, dec);
        from_unit_vector(&rotated)
    }

    /// Rotates parallel columns of directions, returning the new (ra, dec) columns.
    pub fn rotate(
        &self,
        ra: &Array1<f64>,
        dec: &Array1<f64>,
        true_ra: &Array1<f64>,
        true_dec: &Array1<f64>,
    ) -> Result<(Array1<f64>, Array1<f64>), RotationError> {
        let len = ra.len();
        if dec.len() != len || true_ra.len() != len || true_dec.len() != len {
            return Err(RotationError::Length {
                ra: len,
                dec: dec.len(),
                true_ra: true_ra.len(),
                true_dec: true_dec.len(),
            });
        }
        let (new_ra, new_dec): (Vec<_>, Vec<_>) = ra
            .iter()
            .zip(dec)
            .zip(true_ra)
            .zip(true_dec)
            .map(|(((&ra, &dec), &true_ra), &true_dec)| self.rotate_one(ra, dec, true_ra, true_dec))
            .unzip();
        Ok((Array1::from_vec(new_ra), Array1::from_vec(new_dec)))
    }

    /// Moves simulated events onto the target direction and strips the
    /// Monte-Carlo truth, so that the result looks like detector data.
    pub fn rotate_events(&self, mc: McSample) -> Result<EventSample, RotationError> {
        let (ra, dec) = self.rotate(
            &mc.events.ra,
            &mc.events.declination(),
            &mc.true_ra,
            &mc.true_dec,
        )?;
        let mut events = mc.into_events();
        events.sin_dec = dec.mapv(f64::sin);
        if events.dec.is_some() {
            events.dec = Some(dec);
        }
        events.ra = ra;
        events.validate()?;
        Ok(events)
    }
}

/// Rotates `(ra1, dec1)` in such a way that `(ra2, dec2)` maps exactly onto `(ra3, dec3)`.
pub fn rotate(
    ra1: &Array1<f64>,
    dec1: &Array1<f64>,
    ra2: &Array1<f64>,
    dec2: &Array1<f64>,
    ra3: Radians,
    dec3: Radians,
) -> Result<(Array1<f64>, Array1<f64>), RotationError> {
    SphericalRotator::new(ra3, dec3).rotate(ra1, dec1, ra2, dec2)
}
