use std::path::PathBuf;

use epifit::{config::Config, prelude::*};

fn manifest_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

fn school() -> Observations {
    Observations::from_path(manifest_path("data/boarding-school.csv"), 763.0).unwrap()
}

#[test]
fn loads_boarding_school_data() {
    let obs = school();
    assert_eq!(obs.len(), 15);
    assert_eq!(obs.times()[0], 0.0);
    assert_eq!(obs.times()[14], 14.0);
    assert!((obs.first() - 1.0 / 763.0).abs() < 1e-15);
}

#[test]
fn closed_sir_fit_matches_published_rates() {
    let obs = school();
    let i0 = obs.first();
    let y0 = [1.0 - i0, i0, 0.0];
    let res = Estimator::default()
        .fit(&Model::ClosedSIR, &y0, &obs, &RateParams::sir(1.0, 1.0))
        .unwrap();

    assert!(res.converged());
    let RateParams { beta, gamma, .. } = *res.params();
    assert!(beta >= 1.5 && beta <= 2.0, "beta = {}", beta);
    assert!(gamma >= 0.4 && gamma <= 0.5, "gamma = {}", gamma);
    assert!(res.residual() < 0.01);
    assert!(res.r0() > 3.0 && res.r0() < 4.5);

    let rss = Estimator::default()
        .residual_sum_of_squares(&Model::ClosedSIR, &y0, &obs, res.params())
        .unwrap();
    assert!((rss - res.residual()).abs() < 1e-12);
}

#[test]
fn fit_leaves_the_zero_bound() {
    let obs = school();
    let i0 = obs.first();
    let y0 = [1.0 - i0, i0, 0.0];
    for guess in [RateParams::sir(0.0, 0.0), RateParams::sir(0.1, 0.1)].iter() {
        let res = Estimator::default()
            .fit(&Model::ClosedSIR, &y0, &obs, guess)
            .unwrap();
        assert!(res.converged(), "from {}", guess);
        assert!((res.params().beta - 1.662).abs() < 0.01, "from {}: {}", guess, res.params());
        assert!((res.params().gamma - 0.451).abs() < 0.01, "from {}: {}", guess, res.params());
        assert!(res.residual() < 0.007);
    }
}

#[test]
fn closed_seir_fit_of_school_outbreak() {
    let obs = school();
    let i0 = obs.first();
    let initial = InitialFractions::seeded_exposed(i0, i0);
    let y0 = Model::ClosedSEIR.initial_state(&initial).unwrap();
    let res = Estimator::default()
        .fit(&Model::ClosedSEIR, &y0, &obs, &RateParams::seir(1.0, 1.0, 1.0))
        .unwrap();

    assert!(res.converged());
    assert!(res.residual() < 0.01);
    assert!(res.values().iter().all(|&p| p > 0.0));
    let traj = res.trajectory().as_ref().unwrap();
    assert_eq!(traj.compartments(), &["S", "E", "I", "R"]);
    assert!(traj.is_physical(1e-9));
}

#[test]
fn single_observation_is_rejected_before_integration() {
    let obs = Observations::from_records(&[CaseRecord::new(0.0, 1.0)], 763.0).unwrap();
    let err = Estimator::default()
        .fit(
            &Model::ClosedSIR,
            &[0.999, 0.001, 0.0],
            &obs,
            &RateParams::sir(1.0, 1.0),
        )
        .unwrap_err();
    assert!(err.is_config());
}

#[test]
fn fit_from_configuration_file() {
    let mut cfg = Config::from_path(manifest_path("conf.toml")).unwrap();
    cfg.data = Some(manifest_path("data/boarding-school.csv"));

    let obs = cfg.observations().unwrap().unwrap();
    let initial = cfg.fit_initial_fractions(&obs);
    let y0 = cfg.model.initial_state(&initial).unwrap();
    let res = cfg.estimator().fit(&cfg.model, &y0, &obs, &cfg.rates).unwrap();
    assert!(res.converged());
    assert!((res.params().beta - 1.66).abs() < 0.05);
}

#[test]
fn simulate_from_default_configuration() {
    let cfg = Config::default();
    let grid = cfg.time_grid().unwrap();
    let tr = simulate(&cfg.model, &cfg.initial, &cfg.rates, &grid, &cfg.solver).unwrap();
    let csv = tr.render_csv().unwrap();
    assert_eq!(csv.lines().next(), Some("t,S,I,R"));
    assert_eq!(csv.lines().count(), 121);
    for total in tr.totals().iter() {
        assert!((total - 1.0).abs() < 1e-6);
    }
}

#[test]
fn demographic_examples_stay_normalized() {
    let grid = TimeGrid::range(0.0, 3650.0, 5.0).unwrap();
    let runs = [
        (
            Model::DemographicSIR { mu: 0.0003 },
            InitialFractions::new(0.1, 0.0, 0.0001, 0.8999),
            RateParams::sir(1.3, 0.333),
        ),
        (
            Model::DemographicSEIR { mu: 0.0000391 },
            InitialFractions::new(0.1, 0.0001, 0.0001, 0.8998),
            RateParams::seir(1.56, 0.1428, 0.071),
        ),
    ];
    for (model, initial, rates) in runs.iter() {
        let tr = simulate(model, initial, rates, &grid, &SolverOptions::default()).unwrap();
        assert!(tr.is_physical(1e-9));
        let last = tr.totals()[tr.len() - 1];
        assert!((last - 1.0).abs() < 1e-6, "{}: total = {}", model.name(), last);
    }
}
