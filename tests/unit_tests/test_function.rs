use fenris_forms::accessor::IntegrationFlags;
use fenris_forms::error::FormError;
use fenris_forms::evaluation::{FieldBasis, LagrangeEvaluation};
use fenris_forms::field::FieldFunction;
use fenris_forms::grid::CartesianGrid;
use fenris_forms::shape::Shape;
use fenris_forms::test_function::{TestFunction, TestKind};

fn scalar_test() -> TestFunction {
    TestFunction::value(0, Shape::scalar(2))
}

fn vector_test() -> TestFunction {
    TestFunction::value(1, Shape::vector(2))
}

fn scalar_only_error() -> FormError {
    FormError::UnsupportedConfiguration("Unsupported operator for scalar-valued test function.".to_string())
}

#[test]
fn vector_operators_on_scalar_test_function_are_unsupported() {
    assert_eq!(scalar_test().divergence().unwrap_err(), scalar_only_error());
    assert_eq!(scalar_test().symmetric_gradient().unwrap_err(), scalar_only_error());
    assert_eq!(scalar_test().curl().unwrap_err(), scalar_only_error());
}

#[test]
fn derived_shapes() {
    let v = vector_test();
    assert_eq!(v.divergence().unwrap().shape(), &Shape::scalar(2));
    assert_eq!(v.gradient().unwrap().shape(), &Shape::new(2, 2));
    assert!(v.symmetric_gradient().unwrap().shape().is_symmetric());
    assert_eq!(v.curl().unwrap().shape(), &Shape::scalar(2));
    assert_eq!(
        TestFunction::value(0, Shape::vector(3)).curl().unwrap().shape(),
        &Shape::vector(3)
    );

    let grad = scalar_test().gradient().unwrap();
    assert_eq!(grad.kind(), TestKind::Gradient);
    assert_eq!(grad.shape(), &Shape::vector(2));
    assert_eq!(grad.base_shape(), &Shape::scalar(2));
    assert_eq!(grad.gradient().unwrap().kind(), TestKind::Hessian);

    // Derivatives apply to the test function itself only
    assert!(v.divergence().unwrap().divergence().is_err());
    assert!(v.divergence().unwrap().gradient().is_err());
}

#[test]
fn integration_flags() {
    assert_eq!(scalar_test().integration_flags(), IntegrationFlags::VALUES);
    assert_eq!(scalar_test().gradient().unwrap().integration_flags(), IntegrationFlags::GRADIENTS);
    assert_eq!(vector_test().divergence().unwrap().integration_flags(), IntegrationFlags::GRADIENTS);
    assert_eq!(vector_test().symmetric_gradient().unwrap().integration_flags(), IntegrationFlags::GRADIENTS);
    assert_eq!(vector_test().curl().unwrap().integration_flags(), IntegrationFlags::GRADIENTS);
}

#[test]
fn validate_against_accessor() {
    let grid = CartesianGrid::unit_cube(2, 1).unwrap();
    let evaluation = LagrangeEvaluation::<f64>::new(grid, &[FieldBasis::Scalar, FieldBasis::Vector], 2).unwrap();

    assert!(scalar_test().validate(&evaluation).is_ok());
    assert!(vector_test().divergence().unwrap().validate(&evaluation).is_ok());

    let hessian = scalar_test().gradient().unwrap().gradient().unwrap();
    assert!(matches!(
        hessian.validate(&evaluation),
        Err(FormError::UnsupportedConfiguration(_))
    ));

    assert!(matches!(
        TestFunction::value(1, Shape::scalar(2)).validate(&evaluation),
        Err(FormError::BasisMismatch { slot: 1, basis_rank: 1, .. })
    ));
    assert!(matches!(
        TestFunction::value(5, Shape::scalar(2)).validate(&evaluation),
        Err(FormError::InternalConsistency(_))
    ));
}

#[test]
fn pairing_with_expression_builds_term() {
    let u = FieldFunction::<f64>::new(0, Shape::scalar(2));
    let term = scalar_test().gradient().unwrap() * u.gradient().unwrap();
    assert_eq!(term.test().kind(), TestKind::Gradient);
    assert_eq!(term.expression().shape(), &Shape::vector(2));
}

#[test]
#[should_panic(expected = "Shape mismatch in form term")]
fn pairing_mismatched_shapes_panics() {
    let u = FieldFunction::<f64>::new(0, Shape::scalar(2));
    let _ = scalar_test() * u.gradient().unwrap();
}
