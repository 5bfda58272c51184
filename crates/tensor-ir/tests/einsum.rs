mod common;

use common::{assert_close, random_tensor, random_vec, seeded_rng, tensor_f32};
use tensor_ir::{
    validate_and_infer, DType, DimSymbol, Dimension, EinsumSpec, Graph, OpBuilder, OpError,
    Operation, Shape, TensorSpec,
};

fn einsum_op(equation: &str) -> Operation {
    Operation::Einsum(EinsumSpec {
        equation: equation.to_string(),
    })
}

fn infer_einsum(equation: &str, x_dims: &[usize], y_dims: &[usize]) -> Result<TensorSpec, OpError> {
    validate_and_infer(
        &einsum_op(equation),
        &[
            TensorSpec::from_static(DType::F32, x_dims),
            TensorSpec::from_static(DType::F32, y_dims),
        ],
    )
}

fn arange(len: usize) -> Vec<f32> {
    (0..len).map(|v| v as f32).collect()
}

#[test]
fn einsum_rank4_matches_reference_values() {
    let x = tensor_f32(&[2, 1, 3, 2], &arange(12));
    let y = tensor_f32(&[2, 2, 3, 4], &arange(48));

    let mut graph = Graph::new();
    let mut builder = OpBuilder::new(&mut graph);
    let id = builder
        .einsum("abcd,adce->abce", x, y)
        .expect("rank-4 einsum");
    let value = graph.folded_value(id).expect("folded value");
    assert_eq!(
        value.spec(),
        &TensorSpec::from_static(DType::F32, &[2, 1, 3, 4])
    );
    let expected = [
        12.0, 13.0, 14.0, 15.0, 56.0, 61.0, 66.0, 71.0, 132.0, 141.0, 150.0, 159.0, 396.0, 409.0,
        422.0, 435.0, 584.0, 601.0, 618.0, 635.0, 804.0, 825.0, 846.0, 867.0,
    ];
    assert_close(&expected, value.as_f32().expect("f32 payload"));
}

#[test]
fn einsum_rank3_matches_reference_values() {
    let x = tensor_f32(&[1, 3, 2], &arange(6));
    let y = tensor_f32(&[2, 3, 4], &arange(24));

    let mut graph = Graph::new();
    let mut builder = OpBuilder::new(&mut graph);
    let id = builder.einsum("bcd,dce->bce", x, y).expect("rank-3 einsum");
    let value = graph.folded_value(id).expect("folded value");
    assert_eq!(
        value.spec(),
        &TensorSpec::from_static(DType::F32, &[1, 3, 4])
    );
    let expected = [
        12.0, 13.0, 14.0, 15.0, 56.0, 61.0, 66.0, 71.0, 132.0, 141.0, 150.0, 159.0,
    ];
    assert_close(&expected, value.as_f32().expect("f32 payload"));
}

#[test]
fn einsum_broadcasts_carried_labels() {
    // c is carried through both inputs; x holds a 1 there and broadcasts.
    let x = tensor_f32(&[1, 1, 2], &[10.0, 20.0]);
    let y = tensor_f32(&[2, 3, 4], &arange(24));

    let mut graph = Graph::new();
    let mut builder = OpBuilder::new(&mut graph);
    let id = builder
        .einsum("bcd,dce->bce", x, y)
        .expect("carried label broadcasts");
    let value = graph.folded_value(id).expect("folded value");
    assert_eq!(
        value.spec(),
        &TensorSpec::from_static(DType::F32, &[1, 3, 4])
    );
    let expected = [
        240.0, 270.0, 300.0, 330.0, 360.0, 390.0, 420.0, 450.0, 480.0, 510.0, 540.0, 570.0,
    ];
    assert_close(&expected, value.as_f32().expect("f32 payload"));
}

#[test]
fn einsum_broadcasts_contracted_labels() {
    // b is contracted; x holds a 1 there and is reused across the sum.
    let x = tensor_f32(&[2, 1], &[2.0, 5.0]);
    let y = tensor_f32(&[3, 4], &[1.0; 12]);

    let mut graph = Graph::new();
    let mut builder = OpBuilder::new(&mut graph);
    let id = builder
        .einsum("ab,bc->ac", x, y)
        .expect("contracted label broadcasts");
    let value = graph.folded_value(id).expect("folded value");
    assert_eq!(
        value.spec(),
        &TensorSpec::from_static(DType::F32, &[2, 4])
    );
    assert_close(
        &[6.0, 6.0, 6.0, 6.0, 15.0, 15.0, 15.0, 15.0],
        value.as_f32().expect("f32 payload"),
    );
}

#[test]
fn einsum_agrees_with_matmul() {
    let mut rng = seeded_rng(3);
    let x = random_tensor(&mut rng, &[4, 3]);
    let y = random_tensor(&mut rng, &[3, 5]);

    let mut graph = Graph::new();
    let mut builder = OpBuilder::new(&mut graph);
    let einsum = builder
        .einsum("ab,bc->ac", x.clone(), y.clone())
        .expect("einsum");
    let matmul = builder.matmul(x, y, false, false).expect("matmul");
    let einsum_value = graph.folded_value(einsum).expect("folded einsum");
    let matmul_value = graph.folded_value(matmul).expect("folded matmul");
    assert_eq!(einsum_value.spec(), matmul_value.spec());
    assert_close(
        matmul_value.as_f32().expect("f32 payload"),
        einsum_value.as_f32().expect("f32 payload"),
    );
}

#[test]
fn einsum_agrees_with_batched_matmul_when_one_side_broadcasts() {
    let mut rng = seeded_rng(5);
    let x = random_tensor(&mut rng, &[2, 4, 3]);
    let y_values = random_vec(&mut rng, 15);

    let mut graph = Graph::new();
    let mut builder = OpBuilder::new(&mut graph);
    let einsum = builder
        .einsum(
            "vnm,mno->vno",
            x.clone(),
            tensor_f32(&[3, 1, 5], &y_values),
        )
        .expect("einsum with broadcast n");
    let matmul = builder
        .matmul(x, tensor_f32(&[3, 5], &y_values), false, false)
        .expect("matmul against the squeezed operand");
    let einsum_value = graph.folded_value(einsum).expect("folded einsum");
    let matmul_value = graph.folded_value(matmul).expect("folded matmul");
    assert_eq!(
        einsum_value.spec(),
        &TensorSpec::from_static(DType::F32, &[2, 4, 5])
    );
    assert_close(
        matmul_value.as_f32().expect("f32 payload"),
        einsum_value.as_f32().expect("f32 payload"),
    );
}

#[test]
fn einsum_respects_output_label_order() {
    let x = tensor_f32(&[2, 2], &[1.0, 2.0, 3.0, 4.0]);
    let y = tensor_f32(&[2, 2], &[5.0, 6.0, 7.0, 8.0]);

    let mut graph = Graph::new();
    let mut builder = OpBuilder::new(&mut graph);
    let id = builder
        .einsum("ab,bc->ca", x, y)
        .expect("permuted output labels");
    let value = graph.folded_value(id).expect("folded value");
    // transpose of the plain product [[19, 22], [43, 50]]
    assert_close(
        &[19.0, 43.0, 22.0, 50.0],
        value.as_f32().expect("f32 payload"),
    );
}

#[test]
fn einsum_resolves_broadcast_output_dims() {
    let spec = infer_einsum("abcd,adce->abce", &[1, 5, 3, 2], &[4, 2, 3, 6])
        .expect("broadcast on the leading label");
    assert_eq!(spec, TensorSpec::from_static(DType::F32, &[4, 5, 3, 6]));
}

#[test]
fn einsum_accepts_whitespace_in_equations() {
    let spec = infer_einsum(" ab , bc -> ac ", &[2, 3], &[3, 4]).expect("spaces are cosmetic");
    assert_eq!(spec, TensorSpec::from_static(DType::F32, &[2, 4]));
}

#[test]
fn einsum_prefers_concrete_extents_over_symbols() {
    let contract = DimSymbol::fresh();
    let x = TensorSpec::new(
        DType::F32,
        Shape::new(vec![Dimension::Static(2), Dimension::Dynamic(contract)]),
    );
    let y = TensorSpec::from_static(DType::F32, &[3, 4]);
    let spec = validate_and_infer(&einsum_op("ab,bc->ac"), &[x, y])
        .expect("symbolic label pairs with a concrete extent");
    assert_eq!(spec, TensorSpec::from_static(DType::F32, &[2, 4]));
}

#[test]
fn einsum_rejects_more_than_two_operands() {
    let err = infer_einsum("ab,bc,cd->ad", &[2, 2], &[2, 2]).expect_err("three subscripts");
    assert!(matches!(err, OpError::Unsupported { .. }), "got {err}");
    assert_eq!(err.op(), "einsum");
}

#[test]
fn einsum_rejects_missing_arrow() {
    let err = infer_einsum("ab,bc", &[2, 3], &[3, 4]).expect_err("no output subscript");
    assert!(matches!(err, OpError::Unsupported { .. }), "got {err}");
}

#[test]
fn einsum_rejects_repeated_labels_within_a_subscript() {
    let err = infer_einsum("aab,bc->ac", &[2, 2, 3], &[3, 4]).expect_err("diagonal subscript");
    assert!(matches!(err, OpError::Unsupported { .. }), "got {err}");
}

#[test]
fn einsum_rejects_non_alphabetic_labels() {
    let err = infer_einsum("a1,bc->ac", &[2, 3], &[3, 4]).expect_err("digit label");
    assert!(matches!(err, OpError::Unsupported { .. }), "got {err}");
}

#[test]
fn einsum_rejects_output_labels_missing_from_inputs() {
    let err = infer_einsum("ab,bc->ad", &[2, 3], &[3, 4]).expect_err("d appears nowhere");
    assert!(matches!(err, OpError::Shape { .. }), "got {err}");
}

#[test]
fn einsum_rejects_dropped_single_side_labels() {
    // b lives only in x; dropping it from the output would be a reduction.
    let err = infer_einsum("abc,cd->ad", &[2, 3, 4], &[4, 5]).expect_err("b is dropped");
    assert!(matches!(err, OpError::Shape { .. }), "got {err}");
}

#[test]
fn einsum_rejects_rank_mismatch() {
    let err = infer_einsum("ab,bc->ac", &[2, 3, 4], &[3, 4]).expect_err("x rank disagrees");
    assert!(matches!(err, OpError::Shape { .. }), "got {err}");
}

#[test]
fn einsum_rejects_incompatible_shared_extents() {
    let err = infer_einsum("ab,bc->ac", &[2, 3], &[4, 5]).expect_err("b extents disagree");
    assert!(matches!(err, OpError::Shape { .. }), "got {err}");
}
