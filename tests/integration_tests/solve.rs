use super::{flatten, probe_matrix};
use fenris_forms::evaluation::{FieldBasis, LagrangeEvaluation};
use fenris_forms::field::FieldFunction;
use fenris_forms::grid::CartesianGrid;
use fenris_forms::integrator::MatrixFreeIntegrator;
use fenris_forms::matrix_free::{MatrixFreeData, MatrixFreeSettings};
use fenris_forms::shape::Shape;
use fenris_forms::solver::{CgSettings, ConjugateGradient, JacobiPreconditioner};
use fenris_forms::test_function::TestFunction;
use matrixcompare::assert_matrix_eq;

#[test]
fn poisson_with_homogeneous_dirichlet_conditions() {
    // -lap u = 1 on the unit square, u = 0 on the boundary
    let grid = CartesianGrid::unit_cube(2, 6).unwrap();
    let evaluation = LagrangeEvaluation::new(grid, &[FieldBasis::Scalar], 2).unwrap();
    let boundary = evaluation.boundary_dofs(0);
    let data = MatrixFreeData::from_accessor(&evaluation, MatrixFreeSettings::default().with_cells_per_range(4))
        .with_constrained_dofs(0, boundary.clone())
        .unwrap();

    let u = FieldFunction::named("u", 0, Shape::scalar(2));
    let v = TestFunction::value(0, Shape::scalar(2));
    let laplace = (v.gradient().unwrap() * u.gradient().unwrap()).into_form();
    let mut operator = MatrixFreeIntegrator::initialize(data.clone(), laplace, evaluation.clone()).unwrap();
    operator.compute_diagonal().unwrap();

    // Load vector (v, 1) from the mass operator applied to ones
    let mass = MatrixFreeIntegrator::initialize(data, (v * u).into_form(), evaluation).unwrap();
    let mut ones = mass.initialize_dof_vector();
    ones.fill(1.0);
    let mut b = mass.initialize_dof_vector();
    mass.apply_add(&mut b, &ones).unwrap();
    operator.data().zero_constrained_entries(&mut b);

    let preconditioner = JacobiPreconditioner::from_integrator(&operator).unwrap();
    let mut x = operator.initialize_dof_vector();
    let output = ConjugateGradient::new(&operator)
        .with_preconditioner(preconditioner)
        .with_settings(CgSettings::default().with_tolerance(1e-12))
        .solve_with_guess(&b, &mut x)
        .unwrap();
    assert!(output.num_iterations > 0);
    assert!(output.num_iterations < 30);

    for &dof in &boundary {
        assert_eq!(x.block(0)[dof], 0.0);
    }
    assert!((0..x.len())
        .filter(|dof| !boundary.contains(dof))
        .all(|dof| x.block(0)[dof] > 0.0));

    // Compare with a dense solve of the probed operator
    let matrix = probe_matrix(&operator);
    let x_dense = matrix
        .cholesky()
        .expect("Constrained Laplace operator must be positive definite")
        .solve(&flatten(&b));
    assert_matrix_eq!(flatten(&x), x_dense, comp = abs, tol = 1e-9);

    // The discrete maximum at the center is close to the continuous one, about 0.0737
    let center = x.block(0)[3 * 7 + 3];
    assert!((center - 0.0737).abs() < 5e-3);
}
