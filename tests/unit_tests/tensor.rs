use fenris_forms::shape::Shape;
use fenris_forms::tensor::Tensor;
use matrixcompare::assert_scalar_eq;

fn a() -> Tensor<f64> {
    // [[1, 2], [3, 4]]
    Tensor::from_slice(2, 2, &[1.0, 2.0, 3.0, 4.0])
}

#[test]
fn construction() {
    let t = a();
    assert_eq!(t.rank(), 2);
    assert_eq!(t.dim(), 2);
    assert_eq!(t.shape(), Shape::new(2, 2));
    assert_eq!(t.entry(&[0, 1]), 2.0);
    assert_eq!(t.entry(&[1, 0]), 3.0);
    assert_eq!(t.as_scalar(), None);

    let s = Tensor::from_scalar(3, 5.0);
    assert_eq!(s.as_scalar(), Some(5.0));
    assert_eq!(s.shape(), Shape::scalar(3));

    let id = Tensor::<f64>::identity(3);
    for i in 0..3 {
        for j in 0..3 {
            assert_eq!(id.entry(&[i, j]), if i == j { 1.0 } else { 0.0 });
        }
    }
    assert_eq!(Tensor::<f64>::zeros(3, 2).components().len(), 8);
}

#[test]
fn contract_matrices_and_vectors() {
    let v = Tensor::from_slice(1, 2, &[5.0, 6.0]);

    // A v
    assert_eq!(a().contract(&v).components().as_slice(), &[17.0, 39.0]);
    // v A
    assert_eq!(v.contract(&a()).components().as_slice(), &[23.0, 34.0]);
    // A A
    assert_eq!(a().contract(&a()).components().as_slice(), &[7.0, 10.0, 15.0, 22.0]);
    // v . v
    assert_eq!(v.contract(&v).as_scalar(), Some(61.0));
    // Scalars scale
    let two = Tensor::from_scalar(2, 2.0);
    assert_eq!(two.contract(&a()), a().scale(2.0));
    assert_eq!(a().contract(&two), a().scale(2.0));
}

#[test]
fn contract_rank_three() {
    // t[i][j][k] = i + 2j + 4k in 2D, contracted over k with v = [1, -1]
    let components: Vec<f64> = (0..8).map(|n| n as f64).collect();
    let t = Tensor::from_slice(3, 2, &components);
    let v = Tensor::from_slice(1, 2, &[1.0, -1.0]);
    let result = t.contract(&v);
    assert_eq!(result.shape(), Shape::new(2, 2));
    for i in 0..2 {
        for j in 0..2 {
            let expected = t.entry(&[i, j, 0]) - t.entry(&[i, j, 1]);
            assert_eq!(result.entry(&[i, j]), expected);
        }
    }
}

#[test]
fn operations_on_last_two_indices() {
    let t = a();
    assert_eq!(t.trace_last_two().as_scalar(), Some(5.0));
    assert_eq!(t.diagonal_last_two().components().as_slice(), &[1.0, 4.0]);
    assert_eq!(t.transpose_last_two().components().as_slice(), &[1.0, 3.0, 2.0, 4.0]);
    assert_eq!(t.symmetrize_last_two().components().as_slice(), &[1.0, 2.5, 2.5, 4.0]);
}

#[test]
fn double_contraction() {
    // A : A for A = [[1, 2], [3, 4]]
    assert_eq!(a().double_contract(&a()).as_scalar(), Some(30.0));
    assert_eq!(a().double_contract(&Tensor::identity(2)).as_scalar(), Some(5.0));
}

#[test]
#[should_panic(expected = "Double contraction requires rank-2 operands")]
fn double_contraction_of_vectors_panics() {
    let v = Tensor::from_slice(1, 2, &[1.0, 2.0]);
    v.double_contract(&v);
}

#[test]
fn lift_diagonal() {
    let s = Tensor::from_scalar(2, 3.0);
    assert_eq!(s.lift_diagonal().components().as_slice(), &[3.0, 0.0, 0.0, 3.0]);

    let v = Tensor::from_slice(1, 2, &[1.0, 2.0]);
    let lifted = v.lift_diagonal();
    assert_eq!(lifted.shape(), Shape::new(3, 2));
    assert_eq!(lifted.components().as_slice(), &[1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0]);

    // Tracing a lifted scalar recovers dim times the scalar
    assert_eq!(Tensor::from_scalar(3, 2.0).lift_diagonal().trace_last_two().as_scalar(), Some(6.0));
}

#[test]
fn arithmetic() {
    let t = a();
    let sum = &t + &t;
    assert_eq!(sum, t.scale(2.0));
    assert_eq!(&sum - &t, t);
    assert_eq!(-t.clone() + t.clone(), Tensor::zeros(2, 2));
    assert_eq!(t.clone() * 3.0, t.scale(3.0));
    assert_eq!(&t * &t, t.contract(&t));

    let mut acc = Tensor::zeros(2, 2);
    acc += &t;
    acc += &t;
    assert_eq!(acc, sum);

    assert_scalar_eq!(t.norm(), 30.0f64.sqrt(), comp = abs, tol = 1e-14);
}

#[test]
#[should_panic]
fn adding_mismatched_tensors_panics() {
    let _ = &Tensor::<f64>::zeros(1, 2) + &Tensor::zeros(2, 2);
}
