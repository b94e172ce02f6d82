use fenris_forms::accessor::{CellAccessor, EvaluationFlags};
use fenris_forms::error::FormError;
use fenris_forms::evaluation::LagrangeEvaluation;
use fenris_forms::expression::{Expression, Product, Sum};
use fenris_forms::field::FieldFunction;
use fenris_forms::grid::CartesianGrid;
use fenris_forms::proptest::{coefficient, dof_vector, scalar_functional, two_field_layout, vector_functional};
use fenris_forms::shape::Shape;
use fenris_forms::tensor::Tensor;
use fenris_forms::vector::BlockVector;
use matrixcompare::assert_matrix_eq;
use nalgebra::DVector;
use proptest::prelude::*;

fn p() -> FieldFunction<f64> {
    FieldFunction::named("p", 0, Shape::scalar(2))
}

fn u() -> FieldFunction<f64> {
    FieldFunction::named("u", 1, Shape::vector(2))
}

const BLOCK_SIZES: [usize; 2] = [9, 18];

/// An evaluation of the two-field layout on the last cell of a 2x2 grid, with every
/// quantity evaluated for the given dof values.
fn evaluated_cell(dofs: &BlockVector<f64>) -> LagrangeEvaluation<f64> {
    let grid = CartesianGrid::unit_cube(2, 2).unwrap();
    let mut evaluation = LagrangeEvaluation::new(grid, &two_field_layout(), 2).unwrap();
    assert_eq!(dofs.block_sizes(), BLOCK_SIZES);
    let all = EvaluationFlags::VALUES | EvaluationFlags::GRADIENTS | EvaluationFlags::HESSIANS;
    for slot in 0..2 {
        evaluation.set_evaluation_flags(slot, all);
    }
    evaluation.reinit(3);
    evaluation.read_dof_values(dofs);
    evaluation.evaluate();
    evaluation
}

fn assert_values_eq(a: &Expression<f64>, b: &Expression<f64>, evaluation: &LagrangeEvaluation<f64>) {
    for q in 0..evaluation.n_q_points() {
        let x = a.value(evaluation, q).unwrap();
        let y = b.value(evaluation, q).unwrap();
        assert_eq!(x.shape(), y.shape());
        assert_matrix_eq!(x.into_components(), y.into_components(), comp = abs, tol = 1e-9);
    }
}

#[test]
fn sums_are_flattened() {
    let sum = (p() + p().scale(2.0)) + (p().scale(3.0) + p().scale(4.0));
    match sum {
        Expression::Sum(sum) => {
            assert_eq!(sum.terms().len(), 4);
            let coefficients: Vec<_> = sum
                .terms()
                .iter()
                .map(|term| match term {
                    Expression::Field(field) => field.coefficient(),
                    _ => panic!("Flattened sums only contain fields"),
                })
                .collect();
            assert_eq!(coefficients, vec![1.0, 2.0, 3.0, 4.0]);
        }
        _ => panic!("Expected a sum"),
    }

    let explicit = Sum::new(vec![p().into(), Expression::from(p() + p())]).unwrap();
    assert_eq!(explicit.terms().len(), 3);
    assert!(Sum::<f64>::new(vec![]).is_err());
}

#[test]
fn construction_rejects_mismatched_shapes() {
    let err = Expression::from(p()).try_add(u()).unwrap_err();
    assert_eq!(
        err,
        FormError::ShapeMismatch {
            left: Shape::scalar(2),
            right: Some(Shape::vector(2)),
            operation: "sum"
        }
    );
    assert!(Expression::from(p()).try_sub(u()).is_err());
    assert!(matches!(
        Expression::from(p()).try_mul(u()),
        Err(FormError::ShapeMismatch { operation: "product", .. })
    ));
    assert!(Product::new(vec![u().into(), p().into()]).is_err());
}

#[test]
#[should_panic(expected = "Shape mismatch in sum")]
fn adding_mismatched_shapes_panics() {
    let _ = p() + u();
}

#[test]
fn product_shapes() {
    // grad p . u is a scalar
    let dot = p().gradient().unwrap() * u();
    assert_eq!(dot.shape(), &Shape::scalar(2));

    // grad u . grad u is a rank-2 tensor
    let grad_u = u().gradient().unwrap();
    let product = grad_u.clone() * grad_u.clone();
    assert_eq!(product.shape(), &Shape::new(2, 2));

    // Appending to a product keeps a flat factor list
    let triple = product * grad_u.clone();
    match &triple {
        Expression::Product(product) => {
            assert_eq!(product.factors().len(), 3);
            assert_eq!(product.factor_shape(), &Shape::new(2, 2));
        }
        _ => panic!("Expected a product"),
    }
    assert_eq!(triple.shape(), &Shape::new(2, 2));

    // (grad p . u) u: the vector factor is appended to the product of vectors
    let appended = Expression::from(dot.clone()).try_mul(u()).unwrap();
    assert_eq!(appended.shape(), &Shape::vector(2));
    assert!(matches!(&appended, Expression::Product(product) if product.factors().len() == 3));

    // A scalar factor cannot join a product of vectors, so a new product is created
    let scalar_product = dot * p();
    assert_eq!(scalar_product.shape(), &Shape::scalar(2));
    assert!(matches!(&scalar_product, Expression::Product(product) if product.factors().len() == 2));
}

#[test]
fn symmetry_survives_only_symmetric_combinations() {
    let eps = u().symmetric_gradient().unwrap();
    let grad = u().gradient().unwrap();

    assert!((eps.clone() + eps.clone()).shape().is_symmetric());
    let mixed = eps.clone() + grad.clone();
    assert!(!mixed.shape().is_symmetric());
    assert!(mixed.shape().compatible(&Shape::new(2, 2)));
    assert!(!(grad + eps).shape().is_symmetric());
}

#[test]
fn negating_product_scales_first_factor_only() {
    let product = p().gradient().unwrap().with_coefficient(2.0) * u().with_coefficient(3.0);
    let negated = -product;
    match negated {
        Expression::Product(product) => {
            let coefficients: Vec<_> = product
                .factors()
                .iter()
                .map(|factor| factor.fields()[0].coefficient())
                .collect();
            assert_eq!(coefficients, vec![-2.0, 3.0]);
        }
        _ => panic!("Expected a product"),
    }
}

#[test]
fn requirements_are_unions_per_slot() {
    let expression = p().diagonal_hessian().unwrap() + u().scale(2.0) + p().gradient().unwrap();
    let requirements = expression.requirements();
    assert_eq!(requirements.len(), 2);
    assert_eq!(requirements[&0], EvaluationFlags::GRADIENTS | EvaluationFlags::HESSIANS);
    assert_eq!(requirements[&1], EvaluationFlags::VALUES);

    let fields = expression.fields();
    let names: Vec<_> = fields.iter().map(|field| field.name()).collect();
    assert_eq!(names, vec![Some("p"), Some("u"), Some("p")]);
}

#[test]
fn product_evaluates_to_contraction() {
    let dofs = BlockVector::from_blocks(vec![
        DVector::from_fn(9, |i, _| (i as f64).sin()),
        DVector::from_fn(18, |i, _| (i as f64).cos()),
    ]);
    let evaluation = evaluated_cell(&dofs);
    let grad_p = p().gradient().unwrap().scale(2.0);
    let grad_u = u().gradient().unwrap();
    let product = grad_u.clone() * grad_p.clone();
    for q in 0..evaluation.n_q_points() {
        let expected = grad_u
            .retrieve(&evaluation, q)
            .unwrap()
            .contract(&grad_p.retrieve(&evaluation, q).unwrap());
        let value = product.value(&evaluation, q).unwrap();
        assert_matrix_eq!(value.into_components(), expected.into_components(), comp = abs, tol = 1e-12);
    }
}

fn arbitrary_dofs() -> BlockVector<f64> {
    BlockVector::from_blocks(vec![
        DVector::from_fn(9, |i, _| (i as f64).sin()),
        DVector::from_fn(18, |i, _| (1.5 * i as f64).cos()),
    ])
}

#[test]
fn symmetric_gradients_contract_both_indices() {
    let evaluation = evaluated_cell(&arbitrary_dofs());
    let eps = u().symmetric_gradient().unwrap();
    let grad = u().gradient().unwrap();

    // eps(u) : eps(u) is a scalar
    let energy = eps.clone() * eps.clone();
    assert_eq!(energy.shape(), &Shape::scalar(2));
    // A general tensor factor keeps the single contraction
    let mixed = eps.clone() * grad.clone();
    assert_eq!(mixed.shape(), &Shape::new(2, 2));
    // The scalar energy scales the appended factor
    let scaled = energy.clone() * eps.clone();
    assert_eq!(scaled.shape(), &Shape::new(2, 2));
    assert!(matches!(&scaled, Expression::Product(product) if product.factors().len() == 3));

    for q in 0..evaluation.n_q_points() {
        let e = eps.retrieve(&evaluation, q).unwrap();
        let g = grad.retrieve(&evaluation, q).unwrap();
        let expected_energy = e.components().dot(e.components());

        let value = energy.value(&evaluation, q).unwrap();
        assert_eq!(value.rank(), 0);
        assert!((value.as_scalar().unwrap() - expected_energy).abs() < 1e-12);

        let value = mixed.value(&evaluation, q).unwrap();
        assert_matrix_eq!(value.into_components(), e.contract(&g).into_components(), comp = abs, tol = 1e-12);

        let value = scaled.value(&evaluation, q).unwrap();
        assert_matrix_eq!(value.into_components(), e.scale(expected_energy).into_components(), comp = abs, tol = 1e-12);
    }
}

#[test]
fn lifted_scalar_value_is_isotropic() {
    let evaluation = evaluated_cell(&arbitrary_dofs());
    let pressure = p().scale(3.0).lift_divergence().unwrap();
    let expression = Expression::from(pressure.clone());
    assert_eq!(expression.shape(), &Shape::new(2, 2));
    assert_eq!(expression.requirements()[&0], EvaluationFlags::VALUES);

    for q in 0..evaluation.n_q_points() {
        let value = p().retrieve(&evaluation, q).unwrap().as_scalar().unwrap();
        let expected = Tensor::identity(2).scale(3.0 * value);
        let lifted = expression.value(&evaluation, q).unwrap();
        assert_matrix_eq!(lifted.into_components(), expected.into_components(), comp = abs, tol = 1e-12);
    }

    // The lifted pressure combines with symmetric gradients into a stress
    let stress = u().symmetric_gradient().unwrap().scale(2.0) - pressure;
    assert_eq!(stress.shape(), &Shape::new(2, 2));
    assert_eq!(stress.requirements()[&0], EvaluationFlags::VALUES);
    assert_eq!(stress.requirements()[&1], EvaluationFlags::GRADIENTS);
}

proptest! {
    #[test]
    fn sum_is_independent_of_order(
        dofs in dof_vector(BLOCK_SIZES.to_vec()),
        a in vector_functional(),
        b in vector_functional(),
        c in vector_functional(),
    ) {
        let evaluation = evaluated_cell(&dofs);
        let left = (a.clone() + b.clone()) + c.clone();
        let right = a.clone() + (c.clone() + b.clone());
        let reversed = c.clone() + b.clone() + a.clone();
        assert_values_eq(&left, &right, &evaluation);
        assert_values_eq(&left, &reversed, &evaluation);

        for q in 0..evaluation.n_q_points() {
            let expected = &(&a.retrieve(&evaluation, q).unwrap() + &b.retrieve(&evaluation, q).unwrap())
                + &c.retrieve(&evaluation, q).unwrap();
            let value = left.value(&evaluation, q).unwrap();
            assert_matrix_eq!(value.into_components(), expected.into_components(), comp = abs, tol = 1e-9);
        }
    }

    #[test]
    fn adding_negation_gives_zero(dofs in dof_vector(BLOCK_SIZES.to_vec()), a in scalar_functional()) {
        let evaluation = evaluated_cell(&dofs);
        let zero = a.clone() + (-a.clone());
        for q in 0..evaluation.n_q_points() {
            let value = zero.value(&evaluation, q).unwrap();
            let expected = Tensor::zeros_like_shape(a.shape());
            assert_matrix_eq!(value.into_components(), expected.into_components(), comp = abs, tol = 1e-12);
        }
    }

    #[test]
    fn scalar_multiplication_is_associative(
        dofs in dof_vector(BLOCK_SIZES.to_vec()),
        a in vector_functional(),
        s in coefficient(),
        t in coefficient(),
    ) {
        let evaluation = evaluated_cell(&dofs);
        let nested = Expression::from(s * (t * a.clone()));
        let combined = Expression::from((s * t) * a.clone());
        assert_values_eq(&nested, &combined, &evaluation);
    }

    #[test]
    fn scaling_preserves_requirements(a in scalar_functional(), b in vector_functional(), s in coefficient()) {
        prop_assert_eq!(a.scale(s).requirements(), a.requirements());

        let expression = b.clone() * b.clone() + a.clone();
        prop_assert_eq!(expression.scale(s).requirements(), expression.requirements());
        prop_assert_eq!((-expression.clone()).requirements(), expression.requirements());
    }

    #[test]
    fn scaling_product_scales_value_once(
        dofs in dof_vector(BLOCK_SIZES.to_vec()),
        a in vector_functional(),
        b in vector_functional(),
        s in coefficient(),
    ) {
        let evaluation = evaluated_cell(&dofs);
        let product = a.clone() * b.clone();
        let scaled = product.clone() * s;
        for q in 0..evaluation.n_q_points() {
            let expected = product.value(&evaluation, q).unwrap().scale(s);
            let value = scaled.value(&evaluation, q).unwrap();
            assert_matrix_eq!(value.into_components(), expected.into_components(), comp = abs, tol = 1e-9);
        }
    }

    #[test]
    fn mixing_scalar_and_vector_fails_at_construction(a in scalar_functional(), b in vector_functional()) {
        let is_mismatch = |result: Result<Expression<f64>, FormError>| {
            matches!(result, Err(FormError::ShapeMismatch { .. }))
        };
        prop_assert!(is_mismatch(Expression::from(a.clone()).try_add(b.clone())));
        prop_assert!(is_mismatch(Expression::from(b.clone()).try_sub(a.clone())));
        prop_assert!(is_mismatch(Expression::from(a.clone()).try_mul(b.clone())));
    }
}
