use flarestack_common::{McSample, Radians, SampleError, Source, SourceName};
use ndarray::Array1;
use std::{
    collections::HashMap,
    f64::consts::{FRAC_PI_2, TAU},
};
use tracing::debug;

/// Half width of the declination band around each source, in degrees.
pub const BAND_HALF_WIDTH_DEG: f64 = 5.0;

/// A band of declination, clipped to the physical range `[-pi/2, pi/2]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeclinationBand {
    pub min_dec: Radians,
    pub max_dec: Radians,
}

impl DeclinationBand {
    pub fn around(dec: Radians) -> Self {
        let half_width = BAND_HALF_WIDTH_DEG.to_radians();
        Self {
            min_dec: (dec - half_width).max(-FRAC_PI_2),
            max_dec: (dec + half_width).min(FRAC_PI_2),
        }
    }

    /// Solid angle covered by the band, in steradians.
    pub fn solid_angle(&self) -> f64 {
        TAU * (self.max_dec.sin() - self.min_dec.sin())
    }

    /// Band edges are excluded.
    pub fn contains(&self, dec: Radians) -> bool {
        self.min_dec < dec && dec < self.max_dec
    }

    pub fn mask(&self, true_dec: &Array1<f64>) -> Array1<bool> {
        true_dec.mapv(|dec| self.contains(dec))
    }
}

/// The simulated events lying in the band around one source.
pub struct BandSelection<'a> {
    pub mc: McSample,
    pub solid_angle: f64,
    pub mask: &'a Array1<bool>,
}

/// Selects simulated events by true declination, remembering the mask of every source.
///
/// Masks are computed on the first request for a source name and returned
/// unchanged on every later request for that name, even if a different
/// table is supplied. Band membership only depends on the true declination,
/// which never changes for the table an injector owns, so the cache is only
/// valid for as long as that table is. Build a new selector for a new table.
#[derive(Clone, Debug, Default)]
pub struct DeclinationBandSelector {
    masks: HashMap<SourceName, Array1<bool>>,
}

impl DeclinationBandSelector {
    pub fn select<'a>(
        &'a mut self,
        mc: &McSample,
        source: &Source,
    ) -> Result<BandSelection<'a>, SampleError> {
        let band = DeclinationBand::around(source.dec);
        let mask = self.masks.entry(source.name.clone()).or_insert_with(|| {
            debug!(source = %source.name, "Computing declination band mask");
            band.mask(&mc.true_dec)
        });
        Ok(BandSelection {
            mc: mc.select_mask(mask)?,
            solid_angle: band.solid_angle(),
            mask,
        })
    }

    pub fn mask(&self, name: &str) -> Option<&Array1<bool>> {
        self.masks.get(name)
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use flarestack_common::EventSample;

    fn mc_with_true_dec(true_dec: Array1<f64>) -> McSample {
        let n = true_dec.len();
        let events = EventSample::new(
            Array1::zeros(n),
            true_dec.mapv(f64::sin),
            None,
            Array1::from_elem(n, 0.01),
            Array1::from_elem(n, 3.0),
            Array1::zeros(n),
        )
        .unwrap();
        McSample::new(
            events,
            Array1::zeros(n),
            true_dec,
            Array1::from_elem(n, 1e4),
            Array1::ones(n),
        )
        .unwrap()
    }

    fn source(name: &str, dec: f64) -> Source {
        Source {
            name: name.to_owned(),
            ra: 0.0,
            dec,
            injection_flux_scale: 1.0,
            weight_distance: 1.0,
            ref_time_mjd: None,
        }
    }

    #[test]
    fn equatorial_solid_angle() {
        let band = DeclinationBand::around(0.0);
        let expected = TAU * (5f64.to_radians().sin() - (-5f64).to_radians().sin());
        assert_approx_eq!(band.solid_angle(), expected, 1e-12);
    }

    #[test]
    fn band_clips_at_pole() {
        let band = DeclinationBand::around(85f64.to_radians());
        assert_eq!(band.max_dec, FRAC_PI_2);
        assert_approx_eq!(band.min_dec, 80f64.to_radians(), 1e-12);
        let expected = TAU * (1.0 - 80f64.to_radians().sin());
        assert_approx_eq!(band.solid_angle(), expected, 1e-12);
    }

    #[test]
    fn edges_are_excluded() {
        let band = DeclinationBand::around(0.0);
        assert!(!band.contains(band.max_dec));
        assert!(!band.contains(band.min_dec));
        assert!(band.contains(0.0));
    }

    #[test]
    fn selects_events_inside_band() {
        let mc = mc_with_true_dec(Array1::from_vec(
            [-10.0, -4.0, 0.0, 4.9, 6.0, 30.0]
                .iter()
                .map(|d: &f64| d.to_radians())
                .collect(),
        ));
        let mut selector = DeclinationBandSelector::default();
        let selection = selector.select(&mc, &source("a", 0.0)).unwrap();
        assert_eq!(selection.mc.len(), 3);
        assert_eq!(
            selection.mask.to_vec(),
            vec![false, true, true, true, false, false]
        );
    }

    #[test]
    fn masks_are_cached_per_source() {
        let mc = mc_with_true_dec(Array1::linspace(-1.5, 1.5, 301));
        let mut selector = DeclinationBandSelector::default();

        let first = selector.select(&mc, &source("a", 0.2)).unwrap().mask.clone();
        let second = selector.select(&mc, &source("a", 0.2)).unwrap().mask.clone();
        assert_eq!(first, second);

        let other = selector.select(&mc, &source("b", -0.7)).unwrap().mask.clone();
        assert_ne!(first, other);
        assert_eq!(selector.mask("a"), Some(&first));
        assert_eq!(selector.len(), 2);
    }

    #[test]
    fn cached_mask_ignores_new_table() {
        let mc = mc_with_true_dec(Array1::linspace(-1.5, 1.5, 301));
        let mut selector = DeclinationBandSelector::default();
        let first = selector.select(&mc, &source("a", 0.2)).unwrap().mask.clone();

        let shifted = mc_with_true_dec(Array1::linspace(-1.5, 1.5, 301).mapv(|d| d * 0.5));
        let again = selector.select(&shifted, &source("a", 0.2)).unwrap().mask.clone();
        assert_eq!(first, again);
    }
}
