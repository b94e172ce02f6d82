use fenris_forms::quadrature::{gauss, tensor_gauss};
use matrixcompare::assert_scalar_eq;

#[test]
fn gauss_weights_sum_to_interval_length() {
    for n in 1..=6 {
        let (weights, points) = gauss::<f64>(n);
        assert_eq!(weights.len(), n);
        assert_eq!(points.len(), n);
        assert_scalar_eq!(weights.iter().sum::<f64>(), 2.0, comp = abs, tol = 1e-13);
        assert!(points.iter().all(|x| x.abs() < 1.0));
    }
}

#[test]
fn tensor_gauss_integrates_polynomials_exactly() {
    let rule = tensor_gauss::<f64>(3, 2).unwrap();
    assert_eq!(rule.len(), 8);
    assert_scalar_eq!(rule.weights().iter().sum::<f64>(), 8.0, comp = abs, tol = 1e-13);

    // x^2 y^2 z^2 on [-1, 1]^3
    let integral = rule.integrate(|p| p[0].powi(2) * p[1].powi(2) * p[2].powi(2));
    assert_scalar_eq!(integral, 8.0 / 27.0, comp = abs, tol = 1e-13);

    let rule = tensor_gauss::<f64>(2, 3).unwrap();
    // x^4 y^2 on [-1, 1]^2
    let integral = rule.integrate(|p| p[0].powi(4) * p[1].powi(2));
    assert_scalar_eq!(integral, (2.0 / 5.0) * (2.0 / 3.0), comp = abs, tol = 1e-13);
}

#[test]
fn tensor_gauss_ordering_is_lexicographic() {
    let rule = tensor_gauss::<f64>(2, 2).unwrap();
    let points = rule.points();
    // First coordinate varies fastest
    assert!(points[0][0] < points[1][0]);
    assert_eq!(points[0][1], points[1][1]);
    assert_eq!(points[0][0], points[2][0]);
    assert!(points[0][1] < points[2][1]);
}

#[test]
fn tensor_gauss_rejects_invalid_input() {
    assert!(tensor_gauss::<f64>(0, 2).is_err());
    assert!(tensor_gauss::<f64>(4, 2).is_err());
    assert!(tensor_gauss::<f64>(2, 0).is_err());
}
