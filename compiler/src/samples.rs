//! Sample kernel modules
//!
//! Two small hand-built modules used by `kfuse sample` and by tests.
//!
//! `image`:
//!
//! | slot | kernel    | signature              |
//! |------|-----------|------------------------|
//! | 0    | `scale_x` | in, out, x             |
//! | 1    | `offset`  | in, out                |
//! | 2    | `bias_y`  | in, out, y             |
//! | 3    | (unused)  |                        |
//!
//! plus the invokable `setup(ptr<u8>)`.
//!
//! `extra`:
//!
//! | slot | kernel     | signature              |
//! |------|------------|------------------------|
//! | 0    | `fill`     | out, x                 |
//! | 1    | `sink`     | in                     |
//! | 2    | `pair`     | two inputs, out        |
//! | 3    | `with_ctx` | in, out, x, context    |
//! | 4    | `depth_z`  | in, out, z             |
//!
//! plus the invokable `reset(i32) -> i32`.

use crate::bundle::KernelBundle;
use crate::ir::{
    BinaryOp, CallingConvention, IrBuilder, IrFunctionId, IrFunctionSignature, IrId, IrModule,
    IrType, IrValue, Linkage, UnaryOp,
};
use crate::metadata::{export_foreach, export_func, ForEachSignature};

const IN: ForEachSignature = ForEachSignature::IN;
const OUT: ForEachSignature = ForEachSignature::OUT;
const KERNEL: ForEachSignature = ForEachSignature::KERNEL;

/// Define a single-block function whose body is produced by `body`.
fn define<'m>(
    builder: &mut IrBuilder<'m>,
    name: &str,
    params: &[(&str, IrType)],
    ret: IrType,
    cc: CallingConvention,
    body: impl FnOnce(&mut IrBuilder<'m>) -> Option<Option<IrId>>,
) -> Option<IrFunctionId> {
    let sig = IrFunctionSignature::new(params.iter().cloned(), ret, cc);
    let id = builder.start_function(name, sig, Linkage::Public);
    builder.set_block_label("entry")?;
    let value = body(builder)?;
    builder.build_return(value)?;
    builder.finish_function();
    Some(id)
}

/// `in <op> f32(coord)`
fn combine_coord(b: &mut IrBuilder<'_>, op: BinaryOp) -> Option<Option<IrId>> {
    let input = b.param_reg(0)?;
    let coord = b.param_reg(1)?;
    let coord = b.build_cast(coord, IrType::U32, IrType::F32)?;
    Some(Some(b.build_binop(op, input, coord)?))
}

pub fn image_module() -> Option<IrModule> {
    let mut module = IrModule::new("image");
    let mut b = IrBuilder::new(&mut module);
    let f32_x = [("in", IrType::F32), ("x", IrType::U32)];
    let f32_y = [("in", IrType::F32), ("y", IrType::U32)];

    define(&mut b, "scale_x", &f32_x, IrType::F32, CallingConvention::Kernel, |b| {
        combine_coord(b, BinaryOp::FMul)
    })?;
    define(
        &mut b,
        "offset",
        &[("in", IrType::F32)],
        IrType::F32,
        CallingConvention::Kernel,
        |b| {
            let input = b.param_reg(0)?;
            let one = b.build_const(IrValue::F32(1.0))?;
            Some(Some(b.build_binop(BinaryOp::FAdd, input, one)?))
        },
    )?;
    define(&mut b, "bias_y", &f32_y, IrType::F32, CallingConvention::Kernel, |b| {
        combine_coord(b, BinaryOp::FAdd)
    })?;
    define(
        &mut b,
        "setup",
        &[("params", IrType::ptr(IrType::U8))],
        IrType::Void,
        CallingConvention::C,
        |_| Some(None),
    )?;

    export_foreach(&mut module, "scale_x", KERNEL | IN | OUT | ForEachSignature::X);
    export_foreach(&mut module, "offset", KERNEL | IN | OUT);
    export_foreach(&mut module, "bias_y", KERNEL | IN | OUT | ForEachSignature::Y);
    export_foreach(&mut module, "", ForEachSignature::empty());
    export_func(&mut module, "setup");
    Some(module)
}

pub fn extra_module() -> Option<IrModule> {
    let mut module = IrModule::new("extra");
    let mut b = IrBuilder::new(&mut module);

    define(
        &mut b,
        "fill",
        &[("x", IrType::U32)],
        IrType::F32,
        CallingConvention::Kernel,
        |b| {
            let x = b.param_reg(0)?;
            Some(Some(b.build_cast(x, IrType::U32, IrType::F32)?))
        },
    )?;
    define(
        &mut b,
        "sink",
        &[("in", IrType::F32)],
        IrType::Void,
        CallingConvention::Kernel,
        |_| Some(None),
    )?;
    define(
        &mut b,
        "pair",
        &[("a", IrType::F32), ("b", IrType::F32)],
        IrType::F32,
        CallingConvention::Kernel,
        |b| {
            let lhs = b.param_reg(0)?;
            let rhs = b.param_reg(1)?;
            Some(Some(b.build_binop(BinaryOp::FAdd, lhs, rhs)?))
        },
    )?;
    define(
        &mut b,
        "with_ctx",
        &[
            ("in", IrType::F32),
            ("ctx", IrType::ptr(IrType::U8)),
            ("x", IrType::U32),
        ],
        IrType::F32,
        CallingConvention::Kernel,
        |b| Some(Some(b.param_reg(0)?)),
    )?;
    define(
        &mut b,
        "depth_z",
        &[("in", IrType::F32), ("z", IrType::U32)],
        IrType::F32,
        CallingConvention::Kernel,
        |b| combine_coord(b, BinaryOp::FMul),
    )?;
    define(
        &mut b,
        "reset",
        &[("count", IrType::I32)],
        IrType::I32,
        CallingConvention::C,
        |b| {
            let count = b.param_reg(0)?;
            Some(Some(b.build_unop(UnaryOp::Neg, count)?))
        },
    )?;

    export_foreach(&mut module, "fill", KERNEL | OUT | ForEachSignature::X);
    export_foreach(&mut module, "sink", KERNEL | IN);
    export_foreach(&mut module, "pair", KERNEL | IN | OUT);
    export_foreach(
        &mut module,
        "with_ctx",
        KERNEL | IN | OUT | ForEachSignature::X | ForEachSignature::CTXT,
    );
    export_foreach(&mut module, "depth_z", KERNEL | IN | OUT | ForEachSignature::Z);
    export_func(&mut module, "reset");
    Some(module)
}

/// Both sample modules, `image` first
pub fn sample_bundle() -> Option<KernelBundle> {
    Some(KernelBundle::new(vec![image_module()?, extra_module()?]))
}
