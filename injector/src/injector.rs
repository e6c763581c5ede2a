//! Builds pseudo-experiments for one season: scrambled experimental data as
//! background, plus signal drawn from simulation and moved onto each source.
use crate::{
    band::{BandSelection, DeclinationBandSelector},
    config::{InjectorConfig, validate_catalogue},
    dataset::assemble,
    energy_pdf::EnergyPdf,
    error::{InjectorError, InjectorResult},
    flux::k_to_flux,
    rotation::SphericalRotator,
    scramble::scramble,
    season::Season,
    storage,
    time_pdf::TimePdf,
};
use flarestack_common::{
    EventSample, McSample, SampleError, Source, SourceName, metrics::names,
};
use metrics::counter;
use ndarray::Array1;
use rand::{Rng, distr::weighted::WeightedIndex};
use rand_distr::{Distribution, Poisson};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info, instrument, warn};

/// Injection scales keyed by bit pattern, so that they can index a map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScaleKey(u64);

impl From<f64> for ScaleKey {
    fn from(scale: f64) -> Self {
        // Adding zero maps -0.0 onto 0.0
        Self((scale + 0.0).to_bits())
    }
}

impl ScaleKey {
    pub fn scale(&self) -> f64 {
        f64::from_bits(self.0)
    }
}

/// Expected number of injected events per source, for each injection scale.
pub type RefFluxes = HashMap<ScaleKey, HashMap<SourceName, f64>>;

/// Draws the number of events to inject given the expectation `n_inj`.
fn draw_count<R: Rng + ?Sized>(
    source: &Source,
    n_inj: f64,
    poisson_smear: bool,
    rng: &mut R,
) -> InjectorResult<usize> {
    if !poisson_smear {
        return Ok(n_inj.floor() as usize);
    }
    if n_inj <= 0.0 {
        return Ok(0);
    }
    let poisson = Poisson::new(n_inj).map_err(|error| InjectorError::Poisson {
        source_name: source.name.clone(),
        n_inj,
        error,
    })?;
    let n_s: f64 = poisson.sample(rng);
    Ok(n_s as usize)
}

/// The injector of a single season.
///
/// The experimental data, simulation and energy weights are read-only and
/// shared between clones. The band mask cache and the reference flux cache
/// belong to each instance, so every worker should own its own clone.
#[derive(Clone, Debug)]
pub struct Injector {
    season: Season,
    raw_data: Arc<EventSample>,
    mc: Arc<McSample>,
    sources: Arc<[Source]>,
    mc_weights: Arc<Array1<f64>>,
    time_pdf: Arc<dyn TimePdf>,
    poisson_smear: bool,
    band_selector: DeclinationBandSelector,
    ref_fluxes: RefFluxes,
    n_tot_exp: f64,
}

impl Injector {
    /// Loads the season's tables and creates the injector.
    pub fn new(
        season: Season,
        sources: Vec<Source>,
        config: &InjectorConfig,
    ) -> InjectorResult<Self> {
        info!("Initialising Injector for {}", season.name);
        let raw_data = storage::load_events(&season.exp_path)?;
        let mc = storage::load_mc(&season.mc_path)?;
        Self::from_samples(season, raw_data, mc, sources, config)
    }

    /// Creates the injector from tables already in memory.
    pub fn from_samples(
        season: Season,
        raw_data: EventSample,
        mc: McSample,
        sources: Vec<Source>,
        config: &InjectorConfig,
    ) -> InjectorResult<Self> {
        let energy_pdf = config.energy_pdf.create()?;
        let time_pdf = config.time_pdf.create(&season)?;
        Self::with_models(
            season,
            raw_data,
            mc,
            sources,
            energy_pdf.as_ref(),
            Arc::from(time_pdf),
            config.poisson_smear,
        )
    }

    /// Creates the injector with explicitly supplied energy and time models.
    pub fn with_models(
        season: Season,
        raw_data: EventSample,
        mc: McSample,
        sources: Vec<Source>,
        energy_pdf: &dyn EnergyPdf,
        time_pdf: Arc<dyn TimePdf>,
        poisson_smear: bool,
    ) -> InjectorResult<Self> {
        validate_catalogue(&sources)?;
        raw_data.validate()?;
        mc.validate()?;
        if raw_data.dec.is_some() != mc.events.dec.is_some() {
            return Err(SampleError::MismatchedLayout.into());
        }

        let mc_weights = energy_pdf.weight_mc(&mc);
        if mc_weights.len() != mc.len() {
            return Err(InjectorError::WeightLength {
                expected: mc.len(),
                found: mc_weights.len(),
            });
        }
        debug!(
            season = %season.name,
            data = raw_data.len(),
            mc = mc.len(),
            sources = sources.len(),
            poisson_smear,
            "Injector ready"
        );

        Ok(Self {
            season,
            raw_data: Arc::new(raw_data),
            mc: Arc::new(mc),
            sources: sources.into(),
            mc_weights: Arc::new(mc_weights),
            time_pdf,
            poisson_smear,
            band_selector: DeclinationBandSelector::default(),
            ref_fluxes: RefFluxes::default(),
            n_tot_exp: 0.0,
        })
    }

    pub fn season(&self) -> &Season {
        &self.season
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn poisson_smear(&self) -> bool {
        self.poisson_smear
    }

    pub fn ref_fluxes(&self) -> &RefFluxes {
        &self.ref_fluxes
    }

    /// Sum of the expected number of events over all sources, from the last injection.
    pub fn n_tot_exp(&self) -> f64 {
        self.n_tot_exp
    }

    pub fn band_mask(&self, name: &str) -> Option<&Array1<bool>> {
        self.band_selector.mask(name)
    }

    /// Scrambles the experimental data to blind it.
    pub fn scramble<R: Rng + ?Sized>(&self, rng: &mut R) -> EventSample {
        scramble(&self.raw_data, rng)
    }

    /// Draws signal events for every source, with the source fluxes multiplied by `scale`.
    /// The returned events carry no Monte-Carlo truth.
    #[instrument(skip(self, rng), fields(season = %self.season.name))]
    pub fn inject<R: Rng>(&mut self, scale: f64, rng: &mut R) -> InjectorResult<EventSample> {
        let mut injected = Vec::with_capacity(self.sources.len());
        let mut expectations = HashMap::with_capacity(self.sources.len());
        let mut n_tot_exp = 0.0;

        for source in self.sources.iter() {
            let BandSelection {
                mc: source_mc,
                solid_angle,
                mask,
            } = self.band_selector.select(&self.mc, source)?;

            let eff_inj_time = self.time_pdf.effective_injection_time(source)?;
            let fluence = k_to_flux(source.injection_flux_scale) * eff_inj_time * scale;

            // Rescale the energy weights of the band to expected event counts for this source
            let ow = self
                .mc_weights
                .iter()
                .zip(mask.iter())
                .filter_map(|(&weight, &in_band)| in_band.then_some(weight))
                .map(|weight| fluence * source.weight_distance * (weight / solid_angle))
                .collect::<Array1<f64>>();

            let n_inj = ow.sum();
            n_tot_exp += n_inj;
            expectations.insert(source.name.clone(), n_inj);

            if source_mc.is_empty() {
                warn!(source = %source.name, "No simulated events in declination band");
            }

            let n_s = draw_count(source, n_inj, self.poisson_smear, rng)?;
            debug!(source = %source.name, n_inj, n_s, "Expected {n_inj} events, injecting {n_s}");
            if n_s < 1 {
                counter!(names::SOURCES_SKIPPED).increment(1);
                continue;
            }

            let distribution =
                WeightedIndex::new(ow.iter().copied()).map_err(|error| InjectorError::Sampling {
                    source_name: source.name.clone(),
                    error,
                })?;
            let indices = (0..n_s)
                .map(|_| distribution.sample(rng))
                .collect::<Vec<_>>();

            let rotator = SphericalRotator::new(source.ra, source.dec);
            let mut events = rotator.rotate_events(source_mc.select(&indices)?)?;
            events.time_mjd = self.time_pdf.simulate_times(source, n_s, rng)?;
            events.validate()?;

            injected.push(events);
            counter!(names::SIGNAL_EVENTS_INJECTED).increment(n_s as u64);
        }

        let signal = self.mc.events.empty_like().concatenate_all(&injected)?;
        debug!(n_tot_exp, injected = signal.len(), "Injection complete");
        self.n_tot_exp = n_tot_exp;
        self.ref_fluxes.insert(ScaleKey::from(scale), expectations);
        Ok(signal)
    }

    /// Creates a pseudo-experiment: scrambled background plus injected signal.
    pub fn create_dataset<R: Rng>(
        &mut self,
        scale: f64,
        rng: &mut R,
    ) -> InjectorResult<EventSample> {
        let background = self.scramble(rng);
        let signal = self.inject(scale, rng)?;
        Ok(assemble(background, &signal)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        energy_pdf::{EnergyPdfConfig, PowerLaw},
        time_pdf::{Steady, TimePdfConfig},
    };
    use assert_approx_eq::assert_approx_eq;
    use flarestack_common::SECONDS_PER_DAY;
    use rand::{SeedableRng, rngs::StdRng};
    use std::f64::consts::{FRAC_PI_2, TAU};

    pub(crate) fn season() -> Season {
        Season {
            name: "IC86-2012".to_owned(),
            exp_path: "exp.h5".into(),
            mc_path: "mc.h5".into(),
            start_mjd: 56000.0,
            end_mjd: 56100.0,
        }
    }

    pub(crate) fn source(name: &str, ra: f64, dec: f64, k: f64) -> Source {
        Source {
            name: name.to_owned(),
            ra,
            dec,
            injection_flux_scale: k,
            weight_distance: 1.0,
            ref_time_mjd: None,
        }
    }

    pub(crate) fn raw_data(n: usize) -> EventSample {
        EventSample::new(
            Array1::linspace(0.0, 6.0, n),
            Array1::linspace(-0.9, 0.9, n),
            None,
            Array1::from_elem(n, 0.01),
            Array1::linspace(2.0, 5.0, n),
            Array1::linspace(56000.0, 56100.0, n),
        )
        .unwrap()
    }

    /// Simulation spread evenly in declination, each event reconstructed
    /// slightly away from its true direction.
    pub(crate) fn mc(n: usize, ow: f64) -> McSample {
        let true_dec = Array1::linspace(-1.5, 1.5, n);
        let true_ra = Array1::linspace(0.0, 6.2, n);
        let dec = true_dec.mapv(|d: f64| (d + 0.01).min(FRAC_PI_2));
        let events = EventSample::new(
            true_ra.mapv(|r: f64| (r + 0.01) % TAU),
            dec.mapv(f64::sin),
            None,
            Array1::from_elem(n, 0.01),
            Array1::linspace(2.0, 7.0, n),
            Array1::zeros(n),
        )
        .unwrap();
        McSample::new(
            events,
            true_ra,
            true_dec,
            Array1::linspace(1e2, 1e6, n),
            Array1::from_elem(n, ow),
        )
        .unwrap()
    }

    fn config(poisson_smear: bool) -> InjectorConfig {
        InjectorConfig {
            energy_pdf: EnergyPdfConfig::PowerLaw {
                gamma: 0.0,
                e_min: None,
                e_max: None,
            },
            time_pdf: TimePdfConfig::Steady,
            poisson_smear,
        }
    }

    /// One-weight that makes a unit-`k` source at the equator expect `n_inj` events.
    fn ow_for(n_inj: f64, n: usize) -> f64 {
        let selection_fraction = {
            let mut selector = DeclinationBandSelector::default();
            selector
                .select(&mc(n, 1.0), &source("probe", 0.0, 0.0, 1.0))
                .unwrap()
                .mc
                .len() as f64
        };
        let solid_angle = crate::band::DeclinationBand::around(0.0).solid_angle();
        let fluence = k_to_flux(1.0) * 100.0 * SECONDS_PER_DAY;
        n_inj * solid_angle / (fluence * selection_fraction)
    }

    fn injector(sources: Vec<Source>, n_inj: f64, poisson_smear: bool) -> Injector {
        Injector::from_samples(
            season(),
            raw_data(200),
            mc(3000, ow_for(n_inj, 3000)),
            sources,
            &config(poisson_smear),
        )
        .unwrap()
    }

    #[test]
    fn expected_count_matches_fluence() {
        let sources = vec![source("a", 1.0, 0.0, 1.0)];
        let mut injector = injector(sources, 12.5, false);
        let mut rng = StdRng::seed_from_u64(0);
        let signal = injector.inject(1.0, &mut rng).unwrap();
        assert_approx_eq!(injector.n_tot_exp(), 12.5, 1e-9);
        assert_eq!(signal.len(), 12);
    }

    #[test]
    fn weight_conservation() {
        let mut src = source("a", 2.0, 0.3, 2.0);
        src.weight_distance = 0.25;
        let mc = mc(2000, 3.0);
        let energy_pdf = PowerLaw::new(2.0, None, None).unwrap();
        let mc_weights = energy_pdf.weight_mc(&mc);
        let mut injector = Injector::with_models(
            season(),
            raw_data(10),
            mc,
            vec![src],
            &energy_pdf,
            Arc::new(Steady::new(&season())),
            false,
        )
        .unwrap();
        injector.inject(0.5, &mut StdRng::seed_from_u64(1)).unwrap();

        let mask = injector.band_mask("a").unwrap();
        let band_weight: f64 = mc_weights
            .iter()
            .zip(mask.iter())
            .filter_map(|(&w, &m)| m.then_some(w))
            .sum();
        let solid_angle = crate::band::DeclinationBand::around(0.3).solid_angle();
        let fluence = k_to_flux(2.0) * 100.0 * SECONDS_PER_DAY * 0.5;
        let expected = fluence * 0.25 * band_weight / solid_angle;
        let n_inj = injector.ref_fluxes()[&ScaleKey::from(0.5)]["a"];
        assert_approx_eq!(n_inj, expected, expected * 1e-12);
    }

    #[test]
    fn injected_events_sit_near_source() {
        let sources = vec![source("a", 1.0, 0.5, 1.0), source("b", 4.0, -0.8, 1.0)];
        let mut injector = injector(sources, 20.0, false);
        let signal = injector.inject(1.0, &mut StdRng::seed_from_u64(2)).unwrap();

        let expected = &injector.ref_fluxes()[&ScaleKey::from(1.0)];
        let n_a = expected["a"].floor() as usize;
        let n_b = expected["b"].floor() as usize;
        assert!(n_a > 0 && n_b > 0);
        assert_eq!(signal.len(), n_a + n_b);
        assert!(signal.dec.is_none());

        for (i, &dec) in signal.declination().iter().enumerate() {
            let target = if i < n_a { 0.5 } else { -0.8 };
            assert_approx_eq!(dec, target, 0.02);
        }
        assert!(signal.time_mjd.iter().all(|t| (56000.0..56100.0).contains(t)));
    }

    #[test]
    fn many_sources_keep_catalogue_order() {
        let sources = (0..25)
            .map(|i| source(&format!("s{i}"), 0.1 + 0.2 * i as f64, 0.0, 1.0))
            .collect::<Vec<_>>();
        let mut injector = injector(sources, 3.5, false);
        let signal = injector.inject(1.0, &mut StdRng::seed_from_u64(8)).unwrap();
        assert_eq!(signal.len(), 25 * 3);
        assert_approx_eq!(injector.n_tot_exp(), 25.0 * 3.5, 1e-6);

        for (i, chunk) in signal.ra.exact_chunks(3).into_iter().enumerate() {
            for &ra in chunk {
                assert_approx_eq!(ra, 0.1 + 0.2 * i as f64, 0.02);
            }
        }
    }

    #[test]
    fn zero_scale_injects_nothing() {
        let sources = vec![source("a", 1.0, 0.0, 1.0)];
        let mut injector = injector(sources, 50.0, true);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(injector.inject(0.0, &mut rng).unwrap().is_empty());
        assert_eq!(injector.n_tot_exp(), 0.0);

        let mut background_rng = StdRng::seed_from_u64(4);
        let background = injector.scramble(&mut background_rng);
        let dataset = injector
            .create_dataset(0.0, &mut StdRng::seed_from_u64(4))
            .unwrap();
        assert_eq!(dataset, background);
    }

    #[test]
    fn empty_band_contributes_nothing() {
        // Simulation confined to the southern sky
        let mut mc = mc(500, 1.0);
        mc.true_dec.mapv_inplace(|d| -d.abs() - 0.2);
        let mut injector = Injector::from_samples(
            season(),
            raw_data(10),
            mc,
            vec![source("north", 0.0, 1.2, 1e6)],
            &config(true),
        )
        .unwrap();
        let signal = injector.inject(1.0, &mut StdRng::seed_from_u64(5)).unwrap();
        assert!(signal.is_empty());
        assert_eq!(injector.ref_fluxes()[&ScaleKey::from(1.0)]["north"], 0.0);
    }

    #[test]
    fn floor_without_smearing() {
        let sources = vec![source("a", 1.0, 0.0, 1.0)];
        let mut injector = injector(sources, 0.99, false);
        for seed in 0..20 {
            let signal = injector.inject(1.0, &mut StdRng::seed_from_u64(seed)).unwrap();
            assert!(signal.is_empty());
        }
        let signal = injector.inject(3.2, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(signal.len(), 3);
    }

    #[test]
    fn poisson_mean_converges() {
        let sources = vec![source("a", 1.0, 0.0, 1.0)];
        let mut injector = injector(sources, 4.0, true);
        let mut rng = StdRng::seed_from_u64(6);
        let trials = 10_000;
        let total: usize = (0..trials)
            .map(|_| injector.inject(1.0, &mut rng).unwrap().len())
            .sum();
        let mean = total as f64 / trials as f64;
        // Standard error of the mean is sqrt(4 / 10000) = 0.02
        assert_approx_eq!(mean, 4.0, 0.1);
    }

    #[test]
    fn ref_fluxes_are_overwritten_per_scale() {
        let sources = vec![source("a", 1.0, 0.0, 1.0), source("b", 2.0, 0.4, 2.0)];
        let mut injector = injector(sources, 5.0, true);
        let mut rng = StdRng::seed_from_u64(7);
        injector.inject(1.0, &mut rng).unwrap();
        let first = injector.ref_fluxes()[&ScaleKey::from(1.0)].clone();
        injector.inject(1.0, &mut rng).unwrap();
        injector.inject(2.0, &mut rng).unwrap();

        assert_eq!(injector.ref_fluxes().len(), 2);
        assert_eq!(injector.ref_fluxes()[&ScaleKey::from(1.0)], first);
        assert_approx_eq!(
            injector.ref_fluxes()[&ScaleKey::from(2.0)]["a"],
            2.0 * first["a"],
            1e-9
        );
    }

    #[test]
    fn same_seed_reproduces_dataset() {
        let sources = vec![source("a", 1.0, 0.2, 1.0)];
        let mut a = injector(sources, 8.0, true);
        let mut b = a.clone();
        let first = a.create_dataset(1.0, &mut StdRng::seed_from_u64(99)).unwrap();
        let second = b.create_dataset(1.0, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_reference_time_propagates() {
        let config = InjectorConfig {
            time_pdf: TimePdfConfig::BoxWindow {
                pre_window: 1.0,
                post_window: 1.0,
            },
            ..config(true)
        };
        let mut injector = Injector::from_samples(
            season(),
            raw_data(10),
            mc(100, 1.0),
            vec![source("a", 0.0, 0.0, 1.0)],
            &config,
        )
        .unwrap();
        assert!(matches!(
            injector.inject(1.0, &mut StdRng::seed_from_u64(0)),
            Err(InjectorError::TimePdf(_))
        ));
    }

    #[test]
    fn mismatched_layout_rejected() {
        let mut raw = raw_data(10);
        raw.dec = Some(Array1::zeros(10));
        let result = Injector::from_samples(
            season(),
            raw,
            mc(100, 1.0),
            vec![source("a", 0.0, 0.0, 1.0)],
            &config(true),
        );
        assert!(matches!(
            result,
            Err(InjectorError::Sample(SampleError::MismatchedLayout))
        ));
    }

    #[test]
    fn scale_key_normalises_negative_zero() {
        assert_eq!(ScaleKey::from(-0.0), ScaleKey::from(0.0));
        assert_eq!(ScaleKey::from(2.5).scale(), 2.5);
    }
}
