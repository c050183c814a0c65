//! End-to-end tests of kernel fusion and invoke wrapping over the sample
//! bundle, linked into a fresh destination module as the driver does it.

use compiler::bundle::{BundleFormat, KernelBundle};
use compiler::config::FusionConfig;
use compiler::fusion::{
    fuse_kernels, reconcile, wrap_invoke, FusionChain, FusionError, Fuser, InvokeRef, KernelRef,
    ReconcileError,
};
use compiler::ir::dump::dump_module;
use compiler::ir::validation::validate_module;
use compiler::ir::{IrFunction, IrId, IrInstruction, IrModule, IrTerminator, IrType};
use compiler::metadata::{
    ForEachSignature, EXPORT_FOREACH_MD, EXPORT_FOREACH_NAME_MD, EXPORT_FUNC_MD,
};
use compiler::{logging, samples};

fn setup() -> (KernelBundle, IrModule) {
    logging::init_test();
    let bundle = samples::sample_bundle().unwrap();
    let dest = bundle.link("dest").unwrap();
    (bundle, dest)
}

fn image(bundle: &KernelBundle) -> &IrModule {
    bundle.module("image").unwrap()
}

fn extra(bundle: &KernelBundle) -> &IrModule {
    bundle.module("extra").unwrap()
}

/// Calls of the single entry block as (callee name, args, result)
fn calls(dest: &IrModule, f: &IrFunction) -> Vec<(String, Vec<IrId>, Option<IrId>)> {
    let block = f.cfg.get_block(f.entry_block()).unwrap();
    block
        .instructions
        .iter()
        .map(|inst| match inst {
            IrInstruction::CallDirect {
                dest: result,
                func_id,
                args,
            } => (
                dest.get_function(*func_id).unwrap().name.clone(),
                args.clone(),
                *result,
            ),
            other => panic!("unexpected instruction {other:?}"),
        })
        .collect()
}

fn returned(f: &IrFunction) -> Option<IrId> {
    match f.cfg.get_block(f.entry_block()).unwrap().terminator {
        IrTerminator::Return { value } => value,
        ref other => panic!("unexpected terminator {other:?}"),
    }
}

#[test]
fn test_three_stage_chain() {
    let (bundle, mut dest) = setup();
    let chain = FusionChain::from_slots(&[image(&bundle); 3], &[0, 1, 2]).unwrap();

    let fused = fuse_kernels(&chain, "pipeline", &mut dest).unwrap();
    assert_eq!(fused.stages, 3);

    let f = dest.get_function(fused.id).unwrap();
    let names: Vec<_> = f.signature.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["in", "x", "y"]);
    assert_eq!(
        f.signature.param_types(),
        vec![IrType::F32, IrType::U32, IrType::U32]
    );
    assert_eq!(f.return_type(), &IrType::F32);

    let input = f.get_param_reg(0).unwrap();
    let x = f.get_param_reg(1).unwrap();
    let y = f.get_param_reg(2).unwrap();

    let calls = calls(&dest, f);
    assert_eq!(calls.len(), 3);
    let (a, a_args, a_out) = &calls[0];
    let (b, b_args, b_out) = &calls[1];
    let (c, c_args, c_out) = &calls[2];
    assert_eq!((a.as_str(), b.as_str(), c.as_str()), ("scale_x", "offset", "bias_y"));
    assert_eq!(a_args, &vec![input, x]);
    assert_eq!(b_args, &vec![a_out.unwrap()]);
    assert_eq!(c_args, &vec![b_out.unwrap(), y]);
    assert_eq!(returned(f), *c_out);

    validate_module(&dest).unwrap();
    assert!(dump_module(&dest).contains("define f32 @pipeline("));
}

#[test]
fn test_fusion_appends_one_export_record() {
    let (bundle, mut dest) = setup();
    dest.append_named_metadata(EXPORT_FOREACH_NAME_MD, "existing");
    dest.append_named_metadata(EXPORT_FOREACH_MD, "35");
    dest.append_named_metadata(EXPORT_FUNC_MD, "setup");
    let funcs_before = dest.named_metadata(EXPORT_FUNC_MD).to_vec();

    let chain = FusionChain::from_slots(&[image(&bundle); 2], &[0, 2]).unwrap();
    let fused = fuse_kernels(&chain, "xy", &mut dest).unwrap();

    let expected = ForEachSignature::KERNEL
        | ForEachSignature::IN
        | ForEachSignature::OUT
        | ForEachSignature::X
        | ForEachSignature::Y;
    assert_eq!(fused.signature, expected);
    assert_eq!(dest.named_metadata(EXPORT_FOREACH_NAME_MD), ["existing", "xy"]);
    assert_eq!(dest.named_metadata(EXPORT_FOREACH_MD), ["35", "59"]);
    assert_eq!(dest.named_metadata(EXPORT_FUNC_MD), funcs_before.as_slice());
    assert_eq!(dest.named_metadata.len(), 3);
}

#[test]
fn test_wrap_invoke_passes_argument_through() {
    let (bundle, mut dest) = setup();
    let target = InvokeRef::new(image(&bundle), 0);

    let id = wrap_invoke(&target, "setup_group", &mut dest).unwrap();

    let f = dest.get_function(id).unwrap();
    assert_eq!(f.return_type(), &IrType::Void);
    assert_eq!(f.signature.param_types(), vec![IrType::ptr(IrType::U8)]);

    let calls = calls(&dest, f);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "setup");
    assert_eq!(calls[0].1, vec![f.get_param_reg(0).unwrap()]);
    assert_eq!(returned(f), None);

    assert_eq!(dest.named_metadata(EXPORT_FUNC_MD), ["setup_group"]);
    assert!(dest.named_metadata(EXPORT_FOREACH_NAME_MD).is_empty());
    validate_module(&dest).unwrap();
}

#[test]
fn test_wrap_invoke_keeps_non_void_result() {
    let (bundle, mut dest) = setup();
    let id = wrap_invoke(&InvokeRef::new(extra(&bundle), 0), "reset_all", &mut dest).unwrap();

    let f = dest.get_function(id).unwrap();
    assert_eq!(f.return_type(), &IrType::Void);
    assert!(calls(&dest, f)[0].2.is_some());
    validate_module(&dest).unwrap();
}

#[test]
fn test_repeated_fusion_reuses_materialized_stages() {
    let (bundle, mut dest) = setup();
    let chain = FusionChain::from_slots(&[image(&bundle); 2], &[0, 1]).unwrap();

    let first = fuse_kernels(&chain, "first", &mut dest).unwrap();
    let functions = dest.functions.len();
    let second = fuse_kernels(&chain, "second", &mut dest).unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(dest.functions.len(), functions + 1);
    assert_eq!(reconcile(&chain).unwrap(), reconcile(&chain).unwrap());

    let first_calls = calls(&dest, dest.get_function(first.id).unwrap());
    let second_calls = calls(&dest, dest.get_function(second.id).unwrap());
    let callees = |c: &Vec<(String, Vec<IrId>, Option<IrId>)>| {
        c.iter().map(|(name, _, _)| name.clone()).collect::<Vec<_>>()
    };
    assert_eq!(callees(&first_calls), callees(&second_calls));
}

#[test]
fn test_multi_input_stage_rejected_at_any_position() {
    let (bundle, dest) = setup();
    let image = image(&bundle);
    let pair = KernelRef::new(extra(&bundle), 2);

    for position in 0..3 {
        let mut stages = vec![KernelRef::new(image, 0), KernelRef::new(image, 1)];
        stages.insert(position, pair);
        let chain = FusionChain::new(stages).unwrap();

        let mut attempt = dest.clone();
        let err = fuse_kernels(&chain, "bad", &mut attempt).unwrap_err();
        assert!(err.is_reconciliation());
        match err {
            FusionError::Reconciliation(ReconcileError::UnsupportedInput {
                stage, count, ..
            }) => {
                assert_eq!(stage, position);
                assert_eq!(count, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(attempt, dest);
    }
}

#[test]
fn test_context_kernel_rejected() {
    let (bundle, mut dest) = setup();
    let chain = FusionChain::new(vec![
        KernelRef::new(image(&bundle), 1),
        KernelRef::new(extra(&bundle), 3),
    ])
    .unwrap();

    let err = fuse_kernels(&chain, "ctx", &mut dest).unwrap_err();
    assert!(matches!(
        err,
        FusionError::Reconciliation(ReconcileError::UnsupportedSignatureBit {
            stage: 1,
            unexpected,
            ..
        }) if unexpected == ForEachSignature::CTXT
    ));
    assert!(!dest.has_symbol("ctx"));
}

#[test]
fn test_generator_first_stage_has_no_input() {
    let (bundle, mut dest) = setup();
    let chain = FusionChain::new(vec![
        KernelRef::new(extra(&bundle), 0),
        KernelRef::new(image(&bundle), 1),
    ])
    .unwrap();

    let fused = fuse_kernels(&chain, "generate", &mut dest).unwrap();
    assert!(!fused.signature.has_input());
    assert!(fused.signature.has_output() && fused.signature.has_x());

    let f = dest.get_function(fused.id).unwrap();
    assert_eq!(f.signature.param_types(), vec![IrType::U32]);
    let calls = calls(&dest, f);
    assert_eq!(calls[0].1, vec![f.get_param_reg(0).unwrap()]);
    assert_eq!(calls[1].1, vec![calls[0].2.unwrap()]);
}

#[test]
fn test_generator_after_input_stage_drops_carried_value() {
    let (bundle, mut dest) = setup();
    let chain = FusionChain::new(vec![
        KernelRef::new(image(&bundle), 0),
        KernelRef::new(extra(&bundle), 0),
    ])
    .unwrap();

    let fused = fuse_kernels(&chain, "regenerate", &mut dest).unwrap();
    assert_eq!(fused.signature.bits(), 0x2b);

    let f = dest.get_function(fused.id).unwrap();
    assert_eq!(f.signature.param_types(), vec![IrType::F32, IrType::U32]);
    let input = f.get_param_reg(0).unwrap();
    let x = f.get_param_reg(1).unwrap();

    let calls = calls(&dest, f);
    assert_eq!(calls[0].0, "scale_x");
    assert_eq!(calls[0].1, vec![input, x]);
    assert_eq!(calls[1].0, "fill");
    assert_eq!(calls[1].1, vec![x]);
    assert_eq!(returned(f), calls[1].2);
    validate_module(&dest).unwrap();
}

#[test]
fn test_void_last_stage_gives_void_kernel() {
    let (bundle, mut dest) = setup();
    let chain = FusionChain::new(vec![
        KernelRef::new(image(&bundle), 0),
        KernelRef::new(extra(&bundle), 1),
    ])
    .unwrap();

    let fused = fuse_kernels(&chain, "consume", &mut dest).unwrap();
    assert!(!fused.signature.has_output());

    let f = dest.get_function(fused.id).unwrap();
    assert_eq!(f.return_type(), &IrType::Void);
    assert_eq!(returned(f), None);
    validate_module(&dest).unwrap();
}

#[test]
fn test_precondition_failures_leave_destination_untouched() {
    let (bundle, dest) = setup();
    let image = image(&bundle);

    let mut attempt = dest.clone();
    let chain = FusionChain::from_slots(&[image, image], &[0, 1]).unwrap();
    assert_eq!(
        fuse_kernels(&chain, "offset", &mut attempt).unwrap_err(),
        FusionError::NameCollision {
            name: "offset".to_string(),
            module: "dest".to_string()
        }
    );
    assert_eq!(attempt, dest);

    let chain = FusionChain::from_slots(&[image, image], &[0, 3]).unwrap();
    let err = fuse_kernels(&chain, "unused", &mut attempt).unwrap_err();
    assert!(matches!(err, FusionError::UnnamedKernel { stage: 1, slot: 3, .. }));

    let chain = FusionChain::from_slots(&[image], &[7]).unwrap();
    let err = fuse_kernels(&chain, "missing", &mut attempt).unwrap_err();
    assert!(matches!(
        err,
        FusionError::Reconciliation(ReconcileError::Metadata { stage: 0, .. })
    ));

    let err = wrap_invoke(&InvokeRef::new(image, 0), "scale_x", &mut attempt).unwrap_err();
    assert!(matches!(err, FusionError::NameCollision { .. }));
    assert!(attempt.named_metadata.is_empty());
}

#[test]
fn test_stage_missing_from_destination() {
    let (bundle, _) = setup();
    let mut dest = KernelBundle::new(vec![extra(&bundle).clone()]).link("partial").unwrap();
    let chain = FusionChain::from_slots(&[image(&bundle)], &[1]).unwrap();

    let err = fuse_kernels(&chain, "f", &mut dest).unwrap_err();
    assert_eq!(
        err,
        FusionError::UnresolvedFunction {
            name: "offset".to_string(),
            module: "partial".to_string()
        }
    );
}

#[test]
fn test_config_sets_coordinate_type_and_label() {
    let (bundle, mut dest) = setup();
    let config =
        FusionConfig::from_toml_str("coordinate_type = \"I32\"\nentry_label = \"fused\"").unwrap();
    let chain = FusionChain::from_slots(&[image(&bundle)], &[2]).unwrap();

    let fused = Fuser::new(&config).fuse(&chain, "biased", &mut dest).unwrap();
    let f = dest.get_function(fused.id).unwrap();
    assert_eq!(f.signature.param_types(), vec![IrType::F32, IrType::I32]);
    let entry = f.cfg.get_block(f.entry_block()).unwrap();
    assert_eq!(entry.label.as_deref(), Some("fused"));
}

#[test]
fn test_fusion_from_decoded_bundle() {
    logging::init_test();
    let bundle = samples::sample_bundle().unwrap();

    for format in [BundleFormat::Json, BundleFormat::Postcard] {
        let bytes = bundle.encode(format).unwrap();
        let decoded = KernelBundle::decode(&bytes).unwrap();
        assert_eq!(decoded, bundle);

        let mut dest = decoded.link("dest").unwrap();
        let depth = decoded.module("extra").unwrap();
        let chain = FusionChain::from_slots(&[depth, depth], &[4, 4]).unwrap();
        let fused = fuse_kernels(&chain, "zz", &mut dest).unwrap();
        assert!(fused.signature.has_z());
        validate_module(&dest).unwrap();
    }
}
