//! Statistical and contract properties of the estimators, checked on seeded toys.

use std::f64::consts::PI;

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};

use paramfit::data::{linear_dataset, sample_density, sample_histogram, seeded_rng};
use paramfit::domain::{Bound, ObservationSet, Uncertainty};
use paramfit::error::FitError;
use paramfit::fit::{
    BinnedPoissonNll, LevenbergMarquardt, MaximumLikelihood, NonlinearSolver, UnbinnedNll, fit_linear, linspace,
    profile_scan,
};
use paramfit::io::{Columns, read_observations};
use paramfit::math::{Basis, design_matrix};
use paramfit::models::{
    CurveModel, Density, ExponentialDecay, Mixture, TruncatedExponential, TruncatedGaussian, Window,
};
use paramfit::optim::NelderMead;

fn mean_and_sd(v: &[f64]) -> (f64, f64) {
    let n = v.len() as f64;
    let mean = v.iter().sum::<f64>() / n;
    let var = v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

#[test]
fn noiseless_polynomial_is_recovered_exactly() {
    let basis = Basis::parse_list("1, x, x^2").unwrap();
    let x = linspace(-2.0, 3.0, 12);
    let y: Vec<f64> = x.iter().map(|x| 1.0 - 2.0 * x + 0.5 * x * x).collect();
    let fit = fit_linear(&ObservationSet::with_sigma(x, y, vec![0.1; 12]).unwrap(), &basis).unwrap();
    for (got, want) in fit.estimate.values.iter().zip([1.0, -2.0, 0.5]) {
        assert_relative_eq!(*got, want, epsilon = 1e-10);
    }
    assert!(fit.reduced_chi2().unwrap() < 1e-18);
}

#[test]
fn noiseless_curve_is_recovered_exactly() {
    let x = linspace(0.0, 5.0, 25);
    let y = ExponentialDecay.predict(&x, &[3.0, 1.2, -0.4]);
    let obs = ObservationSet::with_sigma(x, y, vec![0.01; 25]).unwrap();
    let fit = LevenbergMarquardt::default().fit(&ExponentialDecay, &obs, Some(&[1.0, 0.5, 0.0])).unwrap();
    for (got, want) in fit.estimate.values.iter().zip([3.0, 1.2, -0.4]) {
        assert_relative_eq!(*got, want, epsilon = 1e-6);
    }
    assert!(fit.reduced_chi2().unwrap() < 1e-10);
}

#[test]
fn sin_cos_scenario_solves_the_normal_equations() {
    let x = vec![0.0, PI / 2.0, PI, 3.0 * PI / 2.0];
    let y = vec![1.0, 2.0, -1.0, 0.0];
    let basis = Basis::parse_list("1, sin, cos").unwrap();
    let fit = fit_linear(&ObservationSet::unweighted(x.clone(), y.clone()).unwrap(), &basis).unwrap();

    for (got, want) in fit.estimate.values.iter().zip([0.5, 1.0, 1.0]) {
        assert_relative_eq!(*got, want, epsilon = 1e-12);
    }
    // Residual orthogonal to every column: Aᵀ(y − Aθ) = 0.
    let a = design_matrix(&x, &basis).unwrap();
    let r = DVector::from_vec(y) - DVector::from_vec(fit.fitted.clone());
    assert!((a.transpose() * r).norm() < 1e-12);
    assert_eq!(fit.ndf, 1);
    assert_relative_eq!(fit.chi2, 1.0, epsilon = 1e-12);
}

#[test]
fn monte_carlo_spread_matches_reported_covariance() {
    let basis = Basis::parse_list("1, x").unwrap();
    let truth = [0.5, 1.5];
    let x = linspace(0.0, 9.0, 20);
    let sigma: Vec<f64> = x.iter().map(|x| 0.2 + 0.05 * x).collect();
    let mut rng = seeded_rng(1234);

    let (mut slopes, mut reduced) = (Vec::new(), Vec::new());
    let mut reported = 0.0;
    for _ in 0..2000 {
        let obs = linear_dataset(&mut rng, &basis, &truth, &x, &sigma).unwrap();
        let fit = fit_linear(&obs, &basis).unwrap();
        slopes.push(fit.estimate.values[1]);
        reduced.push(fit.reduced_chi2().unwrap());
        reported = fit.estimate.errors()[1];
    }

    let (mean, sd) = mean_and_sd(&slopes);
    assert!((mean - truth[1]).abs() < 4.0 * sd / (slopes.len() as f64).sqrt());
    assert_relative_eq!(sd, reported, max_relative = 0.08);

    let (mean_reduced, _) = mean_and_sd(&reduced);
    assert!((mean_reduced - 1.0).abs() < 0.05, "mean chi2/ndf {mean_reduced}");
}

#[test]
fn repeated_fits_are_identical() {
    let w = Window::new(0.0, 10.0).unwrap();
    let model = TruncatedGaussian::new(w);
    let events = sample_density(&mut seeded_rng(7), &model, &[4.0, 1.5], 800).unwrap();
    let nll = UnbinnedNll::new(&model, &events).unwrap();
    let fitter = MaximumLikelihood::<NelderMead>::default();
    let a = fitter.fit_unbinned(&nll, &[5.0, 2.0]).unwrap();
    let b = fitter.fit_unbinned(&nll, &[5.0, 2.0]).unwrap();
    assert_eq!(a.estimate.values, b.estimate.values);
    assert_eq!(a.estimate.covariance, b.estimate.covariance);

    let basis = Basis::parse_list("1, x").unwrap();
    let obs = ObservationSet::unweighted(vec![0.0, 1.0, 2.0], vec![0.1, 0.9, 2.2]).unwrap();
    assert_eq!(
        fit_linear(&obs, &basis).unwrap().estimate.values,
        fit_linear(&obs, &basis).unwrap().estimate.values
    );
}

#[test]
fn binned_poisson_fits_have_unit_pulls() {
    let w = Window::new(0.0, 10.0).unwrap();
    let model = TruncatedExponential::new(w);
    let truth = 0.35;
    let mut rng = seeded_rng(99);
    let fitter = MaximumLikelihood::<NelderMead>::default();

    let pulls: Vec<f64> = (0..150)
        .map(|_| {
            let hist = sample_histogram(&mut rng, &model, &[truth], 1000, 40).unwrap();
            let nll = BinnedPoissonNll::new(&model, &hist).unwrap();
            let fit = fitter.fit_binned(&nll, &[1.0]).unwrap();
            (fit.estimate.values[0] - truth) / fit.estimate.errors()[0]
        })
        .collect();

    let (mean, sd) = mean_and_sd(&pulls);
    assert!(mean.abs() < 0.3, "pull mean {mean}");
    assert!((sd - 1.0).abs() < 0.2, "pull width {sd}");
}

#[test]
fn binned_mixture_recovers_every_parameter() {
    let w = Window::new(0.0, 10.0).unwrap();
    let model = Mixture::new(TruncatedGaussian::new(w), TruncatedExponential::new(w)).unwrap();
    let truth = [0.3, 5.0, 0.5, 0.3];
    let start = [0.5, 4.5, 1.0, 0.1];
    let mut rng = seeded_rng(2024);
    let fitter = MaximumLikelihood::<NelderMead>::default();

    let mut pulls = vec![Vec::new(); truth.len()];
    for _ in 0..40 {
        let hist = sample_histogram(&mut rng, &model, &truth, 5000, 40).unwrap();
        let nll = BinnedPoissonNll::new(&model, &hist).unwrap();
        let fit = fitter.fit_binned(&nll, &start).unwrap();
        for (k, column) in pulls.iter_mut().enumerate() {
            column.push((fit.estimate.values[k] - truth[k]) / fit.estimate.errors()[k]);
        }
    }

    for (k, column) in pulls.iter().enumerate() {
        let (mean, sd) = mean_and_sd(column);
        assert!(mean.abs() < 0.5, "parameter {k}: pull mean {mean}");
        assert!((sd - 1.0).abs() < 0.35, "parameter {k}: pull width {sd}");
    }
}

#[test]
fn profile_minimum_sits_at_the_estimate() {
    let w = Window::new(0.0, 10.0).unwrap();
    let model = TruncatedGaussian::new(w);
    let events = sample_density(&mut seeded_rng(5), &model, &[5.0, 1.0], 2000).unwrap();
    let nll = UnbinnedNll::new(&model, &events).unwrap();
    let fitter = MaximumLikelihood::<NelderMead>::default();
    let fit = fitter.fit_unbinned(&nll, &[4.0, 2.0]).unwrap();

    let (mu, err) = (fit.estimate.values[0], fit.estimate.errors()[0]);
    let grid = linspace(mu - 2.0 * err, mu + 2.0 * err, 9);
    let scan = profile_scan(fitter.minimizer(), &nll, &fit.estimate.values, &model.default_bounds(), 0, &grid).unwrap();

    let best = scan.iter().min_by(|a, b| a.nll.total_cmp(&b.nll)).unwrap();
    assert_relative_eq!(best.value, mu, epsilon = 1e-12);
    // ±1σ and ±2σ give Δ(-ln L) of ½ and 2 in the Gaussian limit.
    assert_relative_eq!(scan[2].delta_nll, 0.5, epsilon = 0.1);
    assert_relative_eq!(scan[8].delta_nll, 2.0, epsilon = 0.3);
}

#[test]
fn rank_deficient_design_is_singular() {
    let basis = vec![Basis::monomial(1), Basis::monomial(1), Basis::constant()];
    let obs = ObservationSet::unweighted(vec![1.0, 2.0, 3.0], vec![1.0, 2.0, 3.0]).unwrap();
    assert!(matches!(fit_linear(&obs, &basis), Err(FitError::SingularMatrix(_))));

    let too_few = ObservationSet::unweighted(vec![1.0, 2.0], vec![1.0, 2.0]).unwrap();
    let quad = Basis::parse_list("1, x, x^2").unwrap();
    assert!(matches!(fit_linear(&too_few, &quad), Err(FitError::SingularMatrix(_))));
}

#[test]
fn non_positive_definite_weights_are_singular() {
    let cov = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 0.0, 2.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    let obs = ObservationSet::new(vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 2.0], Uncertainty::Covariance(cov)).unwrap();
    let basis = Basis::parse_list("1, x").unwrap();
    assert!(matches!(fit_linear(&obs, &basis), Err(FitError::SingularMatrix(_))));
}

#[test]
fn invalid_bounds_fail_before_fitting() {
    let f = |p: &[f64]| (p[0] - 1.0).powi(2);
    let fitter = MaximumLikelihood::<NelderMead>::default();
    let err = fitter.fit(&f, &[2.0], &[Bound::between(0.0, 1.0)], vec![]).unwrap_err();
    assert!(matches!(err, FitError::InvalidBounds(_)));
}

#[test]
fn ingest_rejects_malformed_rows() {
    let csv = "x,y,sigma\n0,1,0.1\n1,abc,0.1\n";
    let err = read_observations(csv.as_bytes(), &Columns::default()).unwrap_err();
    assert!(err.to_string().contains("line 3"), "{err}");

    let missing = "x,y\n0,1\n";
    assert!(read_observations(missing.as_bytes(), &Columns::default()).is_err());
    assert!(read_observations(missing.as_bytes(), &Columns::default().without_sigma()).is_ok());

    let bad_sigma = "x,y,sigma\n0,1,0\n";
    assert!(read_observations(bad_sigma.as_bytes(), &Columns::default()).is_err());
}
