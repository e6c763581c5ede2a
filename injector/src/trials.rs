use crate::{dataset::assemble, error::InjectorResult, injector::Injector};
use flarestack_common::{EventSample, metrics::names};
use metrics::counter;
use rand::{SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use tracing::{debug, info, instrument};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrialSettings {
    pub scale: f64,
    pub n_trials: usize,
    /// Trial `n` is generated from `seed + n`.
    pub seed: u64,
    /// Number of trials generated before their outcomes are handed on.
    /// At most this many datasets are held in memory at once.
    pub chunk_size: usize,
}

impl TrialSettings {
    pub fn new(scale: f64, n_trials: usize, seed: u64) -> Self {
        Self {
            scale,
            n_trials,
            seed,
            chunk_size: 4 * rayon::current_num_threads(),
        }
    }

    pub fn trial_seed(&self, trial: usize) -> u64 {
        self.seed.wrapping_add(trial as u64)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrialOutcome {
    pub trial: usize,
    pub seed: u64,
    pub dataset: EventSample,
    pub n_signal: usize,
    pub n_expected: f64,
}

/// Running totals over every trial handed to the sink.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrialSummary {
    pub n_trials: usize,
    pub n_signal: usize,
    pub n_expected: f64,
}

impl TrialSummary {
    fn record(&mut self, outcome: &TrialOutcome) {
        self.n_trials += 1;
        self.n_signal += outcome.n_signal;
        self.n_expected += outcome.n_expected;
    }

    pub fn mean_signal(&self) -> Option<f64> {
        (self.n_trials > 0).then(|| self.n_signal as f64 / self.n_trials as f64)
    }

    pub fn mean_expected(&self) -> Option<f64> {
        (self.n_trials > 0).then(|| self.n_expected / self.n_trials as f64)
    }
}

fn run_trial(
    injector: &mut Injector,
    settings: &TrialSettings,
    trial: usize,
) -> InjectorResult<TrialOutcome> {
    let seed = settings.trial_seed(trial);
    let mut rng = StdRng::seed_from_u64(seed);
    let background = injector.scramble(&mut rng);
    let signal = injector.inject(settings.scale, &mut rng)?;
    let n_signal = signal.len();
    counter!(names::TRIALS_GENERATED).increment(1);
    Ok(TrialOutcome {
        trial,
        seed,
        dataset: assemble(background, &signal)?,
        n_signal,
        n_expected: injector.n_tot_exp(),
    })
}

/// Generates `n_trials` independent datasets in parallel, handing each
/// outcome to `sink` in trial order.
///
/// Trials are generated a chunk at a time, and a chunk is dropped once the
/// sink has consumed it. Each rayon worker owns a clone of `injector`, so
/// caches are never shared between threads. Every trial draws from its own
/// generator, which makes the outcome independent of how trials are spread
/// over the workers and of the chunk size.
#[instrument(skip(injector, sink), fields(season = %injector.season().name))]
pub fn run_trials<F>(
    injector: &Injector,
    settings: &TrialSettings,
    mut sink: F,
) -> InjectorResult<TrialSummary>
where
    F: FnMut(TrialOutcome) -> InjectorResult<()>,
{
    let mut summary = TrialSummary::default();
    let chunk_size = settings.chunk_size.max(1);

    for start in (0..settings.n_trials).step_by(chunk_size) {
        let end = (start + chunk_size).min(settings.n_trials);
        let outcomes = (start..end)
            .into_par_iter()
            .map_init(
                || injector.clone(),
                |injector, trial| run_trial(injector, settings, trial),
            )
            .collect::<InjectorResult<Vec<_>>>()?;
        debug!(start, end, "Chunk generated");

        for outcome in outcomes {
            summary.record(&outcome);
            sink(outcome)?;
        }
    }

    info!(
        trials = summary.n_trials,
        n_signal = summary.n_signal,
        "Trials generated"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::InjectorConfig,
        energy_pdf::EnergyPdfConfig,
        error::InjectorError,
        injector::tests::{mc, raw_data, season, source},
        time_pdf::TimePdfConfig,
    };
    use assert_approx_eq::assert_approx_eq;

    fn injector() -> Injector {
        let config = InjectorConfig {
            energy_pdf: EnergyPdfConfig::PowerLaw {
                gamma: 0.0,
                e_min: None,
                e_max: None,
            },
            time_pdf: TimePdfConfig::Steady,
            poisson_smear: true,
        };
        Injector::from_samples(
            season(),
            raw_data(100),
            mc(1000, 10.0),
            vec![source("a", 1.0, 0.1, 1.0), source("b", 3.0, -0.4, 2.0)],
            &config,
        )
        .unwrap()
    }

    fn collect(
        injector: &Injector,
        settings: &TrialSettings,
    ) -> (Vec<TrialOutcome>, TrialSummary) {
        let mut outcomes = Vec::new();
        let summary = run_trials(injector, settings, |outcome| {
            outcomes.push(outcome);
            Ok(())
        })
        .unwrap();
        (outcomes, summary)
    }

    #[test]
    fn parallel_matches_sequential() {
        let injector = injector();
        let settings = TrialSettings {
            chunk_size: 5,
            ..TrialSettings::new(1.0, 16, 1234)
        };
        let (outcomes, summary) = collect(&injector, &settings);
        assert_eq!(outcomes.len(), 16);
        assert_eq!(summary.n_trials, 16);

        for (trial, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.trial, trial);
            assert_eq!(outcome.seed, 1234 + trial as u64);
            let mut sequential = injector.clone();
            let dataset = sequential
                .create_dataset(1.0, &mut StdRng::seed_from_u64(outcome.seed))
                .unwrap();
            assert_eq!(outcome.dataset, dataset);
            assert_eq!(outcome.dataset.len(), 100 + outcome.n_signal);
        }
    }

    #[test]
    fn chunk_size_does_not_change_outcomes() {
        let injector = injector();
        let (whole, _) = collect(
            &injector,
            &TrialSettings {
                chunk_size: 64,
                ..TrialSettings::new(2.0, 10, 7)
            },
        );
        let (chunked, _) = collect(
            &injector,
            &TrialSettings {
                chunk_size: 3,
                ..TrialSettings::new(2.0, 10, 7)
            },
        );
        let (single, _) = collect(
            &injector,
            &TrialSettings {
                chunk_size: 0,
                ..TrialSettings::new(2.0, 10, 7)
            },
        );
        assert_eq!(whole, chunked);
        assert_eq!(whole, single);
    }

    #[test]
    fn summary_without_retaining_datasets() {
        let injector = injector();
        let settings = TrialSettings {
            chunk_size: 4,
            ..TrialSettings::new(1.0, 50, 3)
        };
        let mut n_signal = 0;
        let mut n_expected = 0.0;
        let summary = run_trials(&injector, &settings, |outcome| {
            n_signal += outcome.n_signal;
            n_expected += outcome.n_expected;
            Ok(())
        })
        .unwrap();

        assert_eq!(summary.n_trials, 50);
        assert_eq!(summary.n_signal, n_signal);
        assert_approx_eq!(summary.n_expected, n_expected, 1e-9);
        assert_approx_eq!(summary.mean_signal().unwrap(), n_signal as f64 / 50.0, 1e-12);
        assert_approx_eq!(summary.mean_expected().unwrap(), n_expected / 50.0, 1e-12);
    }

    #[test]
    fn sink_error_stops_the_run() {
        let injector = injector();
        let settings = TrialSettings {
            chunk_size: 2,
            ..TrialSettings::new(1.0, 10, 0)
        };
        let mut seen = Vec::new();
        let result = run_trials(&injector, &settings, |outcome| {
            seen.push(outcome.trial);
            if outcome.trial == 3 {
                Err(InjectorError::Unblinded("sink".to_owned()))
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(InjectorError::Unblinded(_))));
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn no_trials() {
        let mut calls = 0;
        let summary = run_trials(&injector(), &TrialSettings::new(1.0, 0, 0), |_| {
            calls += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(calls, 0);
        assert_eq!(summary, TrialSummary::default());
        assert!(summary.mean_signal().is_none());
    }
}
