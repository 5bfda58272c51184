mod common;

use common::{assert_close, random_tensor, seeded_rng, tensor_f32};
use half::f16;
use tensor_ir::{
    DType, DimSymbol, Dimension, Graph, OpBuilder, OpError, Operand, Shape, Tensor, TensorSpec,
};

#[test]
fn linear_matches_reference_values() {
    let mut graph = Graph::new();
    let mut builder = OpBuilder::new(&mut graph);
    let x = tensor_f32(&[2, 2], &[-4.7182, 11.94, -3.3939, 9.2166]);
    let weight = tensor_f32(&[2, 2], &[1.2313, -0.095, -1.4075, -0.8816]);
    let bias = tensor_f32(&[2], &[1.0, 2.0]);
    let id = builder
        .linear(x, weight, Some(bias.into()))
        .expect("linear over static operands");
    let value = graph.folded_value(id).expect("folded value");
    assert_eq!(value.spec(), &TensorSpec::from_static(DType::F32, &[2, 2]));
    assert_close(
        &[-5.9438195, -1.8854373, -4.054486, -1.3484411],
        value.as_f32().expect("f32 payload"),
    );
}

#[test]
fn linear_agrees_with_transposed_matmul() {
    let mut rng = seeded_rng(11);
    let x = random_tensor(&mut rng, &[3, 4, 5]);
    let weight = random_tensor(&mut rng, &[6, 5]);

    let mut graph = Graph::new();
    let mut builder = OpBuilder::new(&mut graph);
    let linear = builder
        .linear(x.clone(), weight.clone(), None)
        .expect("linear with default bias");
    let matmul = builder
        .matmul(x, weight, false, true)
        .expect("matmul against transposed weight");
    let linear_value = graph.folded_value(linear).expect("folded linear");
    let matmul_value = graph.folded_value(matmul).expect("folded matmul");
    assert_eq!(linear_value.spec(), matmul_value.spec());
    assert_close(
        matmul_value.as_f32().expect("f32 payload"),
        linear_value.as_f32().expect("f32 payload"),
    );
}

#[test]
fn linear_synthesizes_zero_bias_matching_promoted_dtype() {
    for dtype in [DType::I32, DType::F16, DType::F32] {
        let mut graph = Graph::new();
        let mut builder = OpBuilder::new(&mut graph);
        let x = builder.input(TensorSpec::from_static(DType::F32, &[1, 2]));
        let x = builder.cast(x, dtype).expect("cast to target dtype");
        let weight = match dtype {
            DType::F32 => tensor_f32(&[3, 2], &[0.5; 6]),
            DType::F16 => {
                Tensor::from_f16(&[3, 2], vec![f16::from_f32(0.5); 6]).expect("f16 weight")
            }
            DType::I32 => Tensor::from_i32(&[3, 2], vec![1; 6]).expect("i32 weight"),
        };
        let id = builder
            .linear(x, weight, None)
            .expect("linear with default bias");
        let node = graph.node(id).expect("linear node");
        assert_eq!(node.operands.len(), 3, "default bias recorded for {dtype}");
        let Operand::Value(bias) = &node.operands[2] else {
            panic!("default bias should be a value operand");
        };
        assert_eq!(bias.dtype(), dtype);
        assert_eq!(bias.spec().shape, Shape::from_static(&[3]));
        assert!(bias.to_f32_vec().iter().all(|&v| v == 0.0));
    }
}

#[test]
fn linear_skips_default_bias_for_symbolic_out_channels() {
    let mut graph = Graph::new();
    let mut builder = OpBuilder::new(&mut graph);
    let out_channels = DimSymbol::fresh();
    let x = builder.input(TensorSpec::from_static(DType::F32, &[4, 3]));
    let weight = builder.input(TensorSpec::new(
        DType::F32,
        Shape::new(vec![
            Dimension::Dynamic(out_channels),
            Dimension::Static(3),
        ]),
    ));
    let id = builder
        .linear(x, weight, None)
        .expect("linear with symbolic weight");
    let node = graph.node(id).expect("linear node");
    assert_eq!(node.operands.len(), 2);
    assert_eq!(
        node.output.shape.dims(),
        &[Dimension::Static(4), Dimension::Dynamic(out_channels)]
    );
    assert!(node.value.is_none());
}

#[test]
fn linear_keeps_symbolic_leading_dims() {
    let mut graph = Graph::new();
    let mut builder = OpBuilder::new(&mut graph);
    let batch = DimSymbol::fresh();
    let x = builder.input(TensorSpec::new(
        DType::F32,
        Shape::new(vec![Dimension::Dynamic(batch), Dimension::Static(5)]),
    ));
    let weight = tensor_f32(&[7, 5], &[0.0; 35]);
    let id = builder.linear(x, weight, None).expect("symbolic batch");
    let spec = graph.output_spec(id).expect("output spec");
    assert_eq!(
        spec.shape.dims(),
        &[Dimension::Dynamic(batch), Dimension::Static(7)]
    );
}

#[test]
fn linear_rejects_inner_dimension_mismatch() {
    let mut graph = Graph::new();
    let mut builder = OpBuilder::new(&mut graph);
    let x = tensor_f32(&[2, 3], &[0.0; 6]);
    let weight = tensor_f32(&[4, 2], &[0.0; 8]);
    let err = builder
        .linear(x, weight, None)
        .expect_err("inner dims disagree");
    assert!(matches!(err, OpError::Shape { .. }), "got {err}");
    assert_eq!(err.op(), "linear");
    assert!(graph.is_empty());
}

#[test]
fn linear_rejects_mixed_dtypes_without_cast() {
    let mut graph = Graph::new();
    let mut builder = OpBuilder::new(&mut graph);
    let x = tensor_f32(&[2, 2], &[0.0; 4]);
    let weight = Tensor::from_i32(&[3, 2], vec![0; 6]).expect("i32 weight");
    let err = builder
        .linear(x, weight, None)
        .expect_err("mixed dtypes need an explicit cast");
    assert!(matches!(err, OpError::Type { .. }), "got {err}");
}

#[test]
fn linear_rejects_bad_bias_operands() {
    let x = tensor_f32(&[2, 3], &[0.0; 6]);
    let weight = tensor_f32(&[4, 3], &[0.0; 12]);

    let mut graph = Graph::new();
    let mut builder = OpBuilder::new(&mut graph);
    let err = builder
        .linear(
            x.clone(),
            weight.clone(),
            Some(tensor_f32(&[5], &[0.0; 5]).into()),
        )
        .expect_err("bias length disagrees with out_channels");
    assert!(matches!(err, OpError::Shape { .. }), "got {err}");

    let err = builder
        .linear(
            x.clone(),
            weight.clone(),
            Some(tensor_f32(&[2, 2], &[0.0; 4]).into()),
        )
        .expect_err("bias must be rank 1");
    assert!(matches!(err, OpError::Shape { .. }), "got {err}");

    let int_bias = Tensor::from_i32(&[4], vec![0; 4]).expect("i32 bias");
    let err = builder
        .linear(x, weight, Some(int_bias.into()))
        .expect_err("bias dtype disagrees with output");
    assert!(matches!(err, OpError::Type { .. }), "got {err}");
    assert!(graph.is_empty());
}

#[test]
fn linear_rejects_scalar_x() {
    let mut graph = Graph::new();
    let mut builder = OpBuilder::new(&mut graph);
    let x = tensor_f32(&[], &[1.0]);
    let weight = tensor_f32(&[2, 2], &[0.0; 4]);
    let err = builder.linear(x, weight, None).expect_err("scalar x");
    assert!(matches!(err, OpError::Shape { .. }), "got {err}");
}
