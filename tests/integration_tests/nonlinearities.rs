use super::{arbitrary_vector, operator, Operator};
use fenris_forms::error::FormError;
use fenris_forms::evaluation::FieldBasis;
use fenris_forms::field::FieldFunction;
use fenris_forms::form::Form;
use fenris_forms::grid::CartesianGrid;
use fenris_forms::matrix_free::MatrixFreeSettings;
use fenris_forms::shape::Shape;
use fenris_forms::test_function::TestFunction;
use fenris_forms::vector::BlockVector;
use matrixcompare::assert_matrix_eq;
use nalgebra::DVector;

/// A coupled two-field form: (q, a + 2 b) + (grad r, grad b) + (r, a).
fn coupled_form() -> Form<f64> {
    let a = FieldFunction::named("a", 0, Shape::scalar(2));
    let b = FieldFunction::named("b", 1, Shape::scalar(2));
    let q = TestFunction::value(0, Shape::scalar(2));
    let r = TestFunction::value(1, Shape::scalar(2));
    q * (a.clone() + b.scale(2.0)) + r.gradient().unwrap() * b.gradient().unwrap() + r * a
}

fn coupled_operator() -> Operator {
    let grid = CartesianGrid::unit_cube(2, 3).unwrap();
    let settings = MatrixFreeSettings::default().with_cells_per_range(2);
    operator(grid, &[FieldBasis::Scalar, FieldBasis::Scalar], coupled_form(), settings).unwrap()
}

#[test]
fn flagged_block_is_copied_and_frozen_reference_is_applied() {
    let linear = coupled_operator();
    let mut operator = coupled_operator();

    let src = arbitrary_vector(&[16, 16]);
    let reference = BlockVector::from_blocks(vec![
        DVector::from_fn(16, |i, _| (i as f64 * 0.3).cos()),
        DVector::from_fn(16, |i, _| 100.0 + i as f64),
    ]);
    operator
        .set_nonlinearities(vec![true, false], reference.clone())
        .unwrap();
    assert_eq!(operator.nonlinear_blocks(), &[true, false]);

    let mut dst = operator.initialize_dof_vector();
    operator.vmult(&mut dst, &src).unwrap();

    // The flagged block is passed through verbatim
    assert_eq!(dst.block(0), src.block(0));

    // The unflagged block sees the reference in place of the flagged block
    let mut frozen_input = src.clone();
    frozen_input.block_mut(0).copy_from(reference.block(0));
    let mut expected = linear.initialize_dof_vector();
    linear.vmult(&mut expected, &frozen_input).unwrap();
    assert_matrix_eq!(dst.block(1).clone(), expected.block(1).clone(), comp = abs, tol = 1e-12);

    // vmult_add adds the same result
    let mut accumulated = dst.clone();
    operator.vmult_add(&mut accumulated, &src).unwrap();
    let mut doubled = dst.clone();
    doubled.axpy(1.0, &dst);
    assert_matrix_eq!(accumulated.block(0).clone(), doubled.block(0).clone(), comp = abs, tol = 1e-12);
    assert_matrix_eq!(accumulated.block(1).clone(), doubled.block(1).clone(), comp = abs, tol = 1e-12);

    // Clearing restores the linear operator
    operator.clear_nonlinearities();
    assert!(operator.nonlinear_blocks().is_empty());
    operator.vmult(&mut dst, &src).unwrap();
    let mut linear_result = linear.initialize_dof_vector();
    linear.vmult(&mut linear_result, &src).unwrap();
    assert_matrix_eq!(dst.block(0).clone(), linear_result.block(0).clone(), comp = abs, tol = 1e-12);
    assert_matrix_eq!(dst.block(1).clone(), linear_result.block(1).clone(), comp = abs, tol = 1e-12);
}

#[test]
fn flag_count_must_match_block_count() {
    let mut operator = coupled_operator();
    let reference = operator.initialize_dof_vector();
    let err = operator
        .set_nonlinearities(vec![true], reference.clone())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FormError>(),
        Some(FormError::UnsupportedConfiguration(_))
    ));
    assert!(operator.nonlinear_blocks().is_empty());

    let wrong_reference = BlockVector::zeros(&[16]);
    assert!(operator
        .set_nonlinearities(vec![false, true], wrong_reference)
        .is_err());
}
