//! Compilation cache tests: at-most-once, signature keying, single-flight

#[cfg(test)]
mod tests {
    use crate::fixtures::{ensure_state_registered, State};
    use crate::utils::*;
    use arrayctx_core::{
        get_or_compile, map_scalar, ArrayContext, BinaryOp, ContainerFn, StructuralSignature,
        Value, ValueSeq,
    };
    use arrayctx_eager::EagerContext;
    use arrayctx_lazy::LazyContext;

    fn double() -> ContainerFn {
        ContainerFn::new("double", |ctx, v| map_scalar(ctx, BinaryOp::Mul, v, 2.0))
    }

    // ============ signatures ============

    #[test]
    fn test_signature_ignores_leaf_values() {
        let ctx = EagerContext::new();
        let a = leaf(&ctx, vec![1.0, 2.0, 3.0]);
        let b = leaf(&ctx, vec![9.0, 8.0, 7.0]);
        assert_eq!(
            StructuralSignature::of(&a).unwrap(),
            StructuralSignature::of(&b).unwrap()
        );
    }

    #[test]
    fn test_signature_distinguishes_shapes_and_nesting() {
        let ctx = EagerContext::new();
        ensure_state_registered();
        let flat = leaf(&ctx, vec![1.0, 2.0]);
        let longer = leaf(&ctx, vec![1.0, 2.0, 3.0]);
        let record = State {
            pos: flat.as_array().unwrap().clone(),
            vel: flat.as_array().unwrap().clone(),
        };
        use arrayctx_core::ContainerField;
        let record = record.to_value();

        let sig = |v: &Value| StructuralSignature::of(v).unwrap();
        assert_ne!(sig(&flat), sig(&longer));
        assert_ne!(sig(&flat), sig(&record));
    }

    // ============ at-most-once ============

    #[test]
    fn test_second_call_with_equal_signature_is_a_hit() {
        let ctx = EagerContext::new();
        let f = double();
        let first_example = leaf(&ctx, vec![1.0, 2.0]);
        let second_example = leaf(&ctx, vec![40.0, 50.0]);

        let compiled_a = get_or_compile(&ctx, &f, &first_example).unwrap();
        // Same shape and dtype, different values: must not recompile.
        let compiled_b = get_or_compile(&ctx, &f, &second_example).unwrap();
        assert_eq!(ctx.compile_count(), 1);
        assert_eq!(ctx.compilation_cache().len(), 1);

        let out_a = compiled_a.call(&second_example).unwrap();
        let out_b = compiled_b.call(&second_example).unwrap();
        assert_eq!(leaf_data(&ctx, &out_a), vec![80.0, 100.0]);
        assert_eq!(leaf_data(&ctx, &out_b), vec![80.0, 100.0]);
    }

    #[test]
    fn test_new_signature_creates_fresh_entry() {
        let ctx = EagerContext::new();
        let f = double();
        get_or_compile(&ctx, &f, &leaf(&ctx, vec![1.0, 2.0])).unwrap();
        get_or_compile(&ctx, &f, &leaf(&ctx, vec![1.0, 2.0, 3.0])).unwrap();
        assert_eq!(ctx.compile_count(), 2);
        assert_eq!(ctx.compilation_cache().len(), 2);
    }

    #[test]
    fn test_distinct_functions_do_not_collide() {
        let ctx = EagerContext::new();
        let f = double();
        let g = ContainerFn::new("halve", |ctx, v| map_scalar(ctx, BinaryOp::Div, v, 2.0));
        let example = leaf(&ctx, vec![1.0]);
        let fc = get_or_compile(&ctx, &f, &example).unwrap();
        let gc = get_or_compile(&ctx, &g, &example).unwrap();
        assert_eq!(ctx.compile_count(), 2);

        let input = leaf(&ctx, vec![8.0]);
        assert_eq!(leaf_data(&ctx, &fc.call(&input).unwrap()), vec![16.0]);
        assert_eq!(leaf_data(&ctx, &gc.call(&input).unwrap()), vec![4.0]);
    }

    #[test]
    fn test_cloned_function_shares_cache_identity() {
        let ctx = EagerContext::new();
        let f = double();
        let g = f.clone();
        let example = leaf(&ctx, vec![1.0]);
        get_or_compile(&ctx, &f, &example).unwrap();
        get_or_compile(&ctx, &g, &example).unwrap();
        assert_eq!(ctx.compile_count(), 1);
    }

    #[test]
    fn test_caches_are_per_context() {
        let ctx_a = EagerContext::new();
        let ctx_b = EagerContext::new();
        let f = double();
        get_or_compile(&ctx_a, &f, &leaf(&ctx_a, vec![1.0])).unwrap();
        get_or_compile(&ctx_b, &f, &leaf(&ctx_b, vec![1.0])).unwrap();
        assert_eq!(ctx_a.compile_count(), 1);
        assert_eq!(ctx_b.compile_count(), 1);
    }

    // ============ single-flight ============

    #[test]
    fn test_concurrent_same_key_compiles_once() {
        let ctx = EagerContext::new();
        let f = double();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let ctx = &ctx;
                let f = &f;
                scope.spawn(move || {
                    let example = leaf(ctx, vec![1.0, 2.0, 3.0]);
                    let compiled = get_or_compile(ctx, f, &example).unwrap();
                    let out = compiled.call(&example).unwrap();
                    assert_eq!(leaf_data(ctx, &out), vec![2.0, 4.0, 6.0]);
                });
            }
        });

        assert_eq!(ctx.compile_count(), 1);
        assert_eq!(ctx.compilation_cache().len(), 1);
    }

    // ============ lazy backend ============

    #[test]
    fn test_lazy_compiled_equals_uncompiled() {
        let ctx = LazyContext::new();
        let f = double();
        let example = leaf(&ctx, vec![1.0, 2.0]);
        let compiled = get_or_compile(&ctx, &f, &example).unwrap();

        let input = leaf(&ctx, vec![3.5, -1.0]);
        let via_compiled = compiled.call(&input).unwrap();
        let via_direct = f.call(&ctx, &input).unwrap();
        assert_eq!(
            leaf_data(&ctx, &via_compiled),
            leaf_data(&ctx, &via_direct)
        );
        assert_eq!(ctx.compile_count(), 1);
    }

    #[test]
    fn test_scalar_leaf_value_is_part_of_the_key() {
        let ctx = LazyContext::new();
        // Reads its scalar leaf, so the trace bakes that scalar in as a
        // constant; equal-shaped inputs with different scalars must get
        // distinct cache entries.
        let scale = ContainerFn::new("scale_by_tail", |ctx, v| {
            let seq: &ValueSeq = v.downcast().unwrap();
            let a = seq.get(0).unwrap().as_array().unwrap();
            let s = seq.get(1).unwrap().as_scalar().unwrap();
            Ok(Value::Array(ctx.binary_scalar(BinaryOp::Mul, a, s)?))
        });
        let with_scale = |s: f64| {
            let mut seq = ValueSeq::new();
            seq.push(leaf(&ctx, vec![1.0]));
            seq.push(Value::Scalar(s));
            Value::container(seq)
        };

        let doubled = with_scale(2.0);
        let tenfold = with_scale(10.0);
        assert_ne!(
            StructuralSignature::of(&doubled).unwrap(),
            StructuralSignature::of(&tenfold).unwrap()
        );

        let compiled = get_or_compile(&ctx, &scale, &doubled).unwrap();
        assert_eq!(leaf_data(&ctx, &compiled.call(&doubled).unwrap()), vec![2.0]);

        let compiled = get_or_compile(&ctx, &scale, &tenfold).unwrap();
        assert_eq!(
            leaf_data(&ctx, &compiled.call(&tenfold).unwrap()),
            leaf_data(&ctx, &scale.call(&ctx, &tenfold).unwrap())
        );
        assert_eq!(ctx.compile_count(), 2);
    }

    #[test]
    fn test_dropped_function_identity_never_aliases() {
        let ctx = LazyContext::new();
        let example = leaf(&ctx, vec![1.0]);
        let times =
            |k: f64| ContainerFn::new("times", move |ctx, v| map_scalar(ctx, BinaryOp::Mul, v, k));

        let f = times(2.0);
        let compiled = get_or_compile(&ctx, &f, &example).unwrap();
        assert_eq!(leaf_data(&ctx, &compiled.call(&example).unwrap()), vec![2.0]);
        drop(f);

        // The cache pins the functions it has keyed, so fresh allocations
        // can never land on a cached identity and inherit its artifact.
        for _ in 0..32 {
            let g = times(3.0);
            let compiled = get_or_compile(&ctx, &g, &example).unwrap();
            assert_eq!(leaf_data(&ctx, &compiled.call(&example).unwrap()), vec![3.0]);
        }
        assert_eq!(ctx.compile_count(), 33);
    }

    #[test]
    fn test_lazy_record_scenario_through_cache() {
        let ctx = LazyContext::new();
        ensure_state_registered();
        use arrayctx_core::ContainerField;

        let f = double();
        let example = State {
            pos: leaf(&ctx, vec![1.0, 2.0, 3.0]).as_array().unwrap().clone(),
            vel: leaf(&ctx, vec![0.0, 0.0, 0.0]).as_array().unwrap().clone(),
        };
        let compiled = get_or_compile(&ctx, &f, &example.to_value()).unwrap();
        let out = compiled.call(&example.to_value()).unwrap();
        let out: &State = out.downcast().unwrap();
        assert_eq!(
            ctx.to_host(&out.pos).unwrap().as_slice().unwrap(),
            &[2.0, 4.0, 6.0]
        );
        assert_eq!(
            ctx.to_host(&out.vel).unwrap().as_slice().unwrap(),
            &[0.0, 0.0, 0.0]
        );

        // Same record shape again: still one trace.
        get_or_compile(&ctx, &f, &example.to_value()).unwrap();
        assert_eq!(ctx.compile_count(), 1);
    }
}
