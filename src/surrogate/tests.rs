#![cfg(test)]

use crate::error::SessionError;
use crate::surrogate::{GaussianProcess, Point};

fn grid() -> Vec<Point> {
    let mut points = Vec::new();
    for onset in [-2.0, 0.0, 2.0] {
        for intensity in [5.0, 8.0] {
            points.push([onset, onset * 0.5, intensity]);
        }
    }
    points
}

// ============ Gaussian Process Tests ============

#[test]
fn test_predict_before_fit() {
    let gp = GaussianProcess::new(1.0, 1e-6);
    assert!(!gp.is_fitted());
    assert_eq!(gp.predict(&[0.0, 0.0, 5.0]), Err(SessionError::ModelNotFitted));
}

#[test]
fn test_flat_function_round_trip() {
    let inputs = grid();
    let outputs = vec![-3.0; inputs.len()];
    let mut gp = GaussianProcess::new(1.0, 1e-6);
    gp.fit(&inputs, &outputs).unwrap();
    assert_eq!(gp.observation_count(), inputs.len());
    for (input, output) in inputs.iter().zip(&outputs) {
        let (mean, std) = gp.predict(input).unwrap();
        assert!((mean - output).abs() < 1e-3, "Mean {mean} at {input:?}");
        assert!(std < 1e-2, "Std {std} at {input:?}");
    }
}

#[test]
fn test_uncertainty_grows_away_from_data() {
    let mut gp = GaussianProcess::new(1.0, 1e-6);
    gp.fit(&grid(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let (_, near) = gp.predict(&[0.0, 0.0, 5.0]).unwrap();
    let (far_mean, far) = gp.predict(&[25.0, -25.0, 15.0]).unwrap();
    assert!(near < far);
    assert!((far - 1.0).abs() < 1e-6, "Prior std far from data, got {far}");
    assert!(far_mean.abs() < 1e-6, "Prior mean far from data, got {far_mean}");
}

#[test]
fn test_failed_fit_keeps_previous_model() {
    let mut gp = GaussianProcess::new(1.0, 0.0);
    gp.fit(&[[0.0, 0.0, 5.0]], &[2.0]).unwrap();
    let duplicate = [[1.0, 1.0, 5.0], [1.0, 1.0, 5.0]];
    assert_eq!(gp.fit(&duplicate, &[1.0, 1.0]), Err(SessionError::SingularMatrix));
    assert_eq!(gp.observation_count(), 1);
    let (mean, _) = gp.predict(&[0.0, 0.0, 5.0]).unwrap();
    assert!((mean - 2.0).abs() < 1e-9);
}

#[test]
fn test_fit_rejects_bad_data() {
    let mut gp = GaussianProcess::new(1.0, 1e-6);
    assert!(matches!(gp.fit(&[], &[]), Err(SessionError::InvalidConfig(_))));
    assert!(matches!(
        gp.fit(&[[0.0, 0.0, 5.0]], &[1.0, 2.0]),
        Err(SessionError::InvalidConfig(_))
    ));
    assert!(!gp.is_fitted());
}

#[test]
fn test_batch_prediction_matches_pointwise() {
    let mut gp = GaussianProcess::new(1.5, 1e-6);
    gp.fit(&grid(), &[1.0, -2.0, 0.5, 3.0, -1.0, 2.0]).unwrap();
    let queries = [[0.0, 0.0, 5.0], [1.0, -0.5, 6.5], [-3.0, 2.0, 9.0], [30.0, 30.0, 30.0]];
    let batch = gp.predict_batch(&queries).unwrap();
    assert_eq!(batch.len(), queries.len());
    for (query, (mean, std)) in queries.iter().zip(batch) {
        let (expected_mean, expected_std) = gp.predict(query).unwrap();
        assert!((mean - expected_mean).abs() < 1e-9, "Mean at {query:?}");
        assert!((std - expected_std).abs() < 1e-9, "Std at {query:?}");
    }
    assert_eq!(
        GaussianProcess::new(1.0, 1e-6).predict_batch(&queries),
        Err(SessionError::ModelNotFitted)
    );
}

#[test]
fn test_singular_covariance_detected() {
    let mut gp = GaussianProcess::new(1.0, 0.0);
    let duplicate = [[0.0, 0.0, 5.0], [0.0, 0.0, 5.0]];
    assert_eq!(gp.fit(&duplicate, &[1.0, 2.0]), Err(SessionError::SingularMatrix));
    assert!(!gp.is_fitted());
}
