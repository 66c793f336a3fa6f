//! Structural and type verification of emitted IR.
//!
//! Emission must never produce a module that the backend would reject, so
//! every function is checked after its body is built and the whole module is
//! checked once more before printing. The checks are deliberately local:
//! single definition per temporary, terminated blocks, resolvable branch
//! targets and agreeing operand types.

use crate::ir::{Block, CastOp, FnSig, Function, Inst, Module, Ty, Value};
#[cfg(test)]
use crate::ir::BinOp;
use std::collections::{HashMap, HashSet};

pub fn verify_module(module: &Module) -> Result<(), String> {
    let mut callables: HashMap<&str, &FnSig> = HashMap::new();
    let sigs: Vec<(String, FnSig)> = module
        .functions
        .iter()
        .map(|f| (f.name.clone(), f.sig()))
        .collect();
    for (name, sig) in &module.extern_fns {
        callables.insert(name, sig);
    }
    for (name, sig) in &sigs {
        callables.insert(name, sig);
    }

    let mut globals: HashSet<&str> = HashSet::new();
    for global in &module.globals {
        if !globals.insert(global.name.as_str()) {
            return Err(format!("duplicate global '@{}'", global.name));
        }
    }
    for (name, _) in &module.extern_globals {
        if !globals.insert(name.as_str()) {
            return Err(format!("duplicate global '@{name}'"));
        }
    }

    let mut seen = HashSet::new();
    for function in &module.functions {
        if !seen.insert(&function.name) {
            return Err(format!("duplicate function '@{}'", function.name));
        }
        verify_function(function, &callables, &globals)?;
    }
    Ok(())
}

pub fn verify_function(
    function: &Function,
    callables: &HashMap<&str, &FnSig>,
    globals: &HashSet<&str>,
) -> Result<(), String> {
    let ctx = |msg: String| format!("in function '@{}': {msg}", function.name);

    if function.blocks.is_empty() {
        return Err(ctx("function has no blocks".to_string()));
    }

    let mut labels = HashSet::new();
    for block in &function.blocks {
        if !labels.insert(block.label.as_str()) {
            return Err(ctx(format!("duplicate block label '{}'", block.label)));
        }
    }

    // Single-definition pass over the whole function. Dominance is not
    // checked; the lowerer routes merged values through slots, never phis.
    let mut defs: HashMap<&str, Ty> = HashMap::new();
    for (name, ty) in &function.params {
        if defs.insert(name, *ty).is_some() {
            return Err(ctx(format!("duplicate parameter '%{name}'")));
        }
    }
    for block in &function.blocks {
        for inst in &block.insts {
            if let Some((name, ty)) = inst.def() {
                if defs.insert(name, ty).is_some() {
                    return Err(ctx(format!("temporary '%{name}' defined twice")));
                }
            }
        }
    }

    for block in &function.blocks {
        verify_block(function, block, &defs, &labels, callables, globals).map_err(&ctx)?;
    }
    Ok(())
}

fn verify_block(
    function: &Function,
    block: &Block,
    defs: &HashMap<&str, Ty>,
    labels: &HashSet<&str>,
    callables: &HashMap<&str, &FnSig>,
    globals: &HashSet<&str>,
) -> Result<(), String> {
    let ctx = |msg: String| format!("block '{}': {msg}", block.label);

    match block.insts.last() {
        Some(last) if last.is_terminator() => {}
        _ => return Err(ctx("block is not terminated".to_string())),
    }
    for inst in &block.insts[..block.insts.len() - 1] {
        if inst.is_terminator() {
            return Err(ctx("terminator in the middle of a block".to_string()));
        }
    }

    for inst in &block.insts {
        for value in inst.operands() {
            match value {
                Value::Temp(name, ty) => match defs.get(name.as_str()) {
                    None => return Err(ctx(format!("use of undefined temporary '%{name}'"))),
                    Some(def_ty) if def_ty != ty => {
                        return Err(ctx(format!(
                            "temporary '%{name}' used as {ty} but defined as {def_ty}"
                        )))
                    }
                    Some(_) => {}
                },
                Value::Global(name) => {
                    if !globals.contains(name.as_str()) {
                        return Err(ctx(format!("use of undefined global '@{name}'")));
                    }
                }
                _ => {}
            }
        }
        verify_inst(function, inst, labels, callables).map_err(&ctx)?;
    }
    Ok(())
}

fn verify_inst(
    function: &Function,
    inst: &Inst,
    labels: &HashSet<&str>,
    callables: &HashMap<&str, &FnSig>,
) -> Result<(), String> {
    match inst {
        Inst::Alloca { .. } | Inst::AllocaArray { .. } => Ok(()),
        Inst::Load { ty, ptr, .. } => {
            expect(ptr.ty() == Ty::Ptr, "load from a non-pointer")?;
            expect(*ty != Ty::Void, "load of void")
        }
        Inst::Store { val, ptr } => {
            expect(ptr.ty() == Ty::Ptr, "store through a non-pointer")?;
            expect(val.ty() != Ty::Void, "store of void")
        }
        Inst::Bin { op, ty, lhs, rhs, .. } => {
            if op.is_float() {
                expect(*ty == Ty::F64, "float op on a non-double type")?;
            } else {
                expect(ty.is_integer(), "integer op on a non-integer type")?;
            }
            expect(
                lhs.ty() == *ty && rhs.ty() == *ty,
                "binary operand types disagree",
            )
        }
        Inst::FNeg { val, .. } => expect(val.ty() == Ty::F64, "fneg of a non-double"),
        Inst::FCmp { lhs, rhs, .. } => expect(
            lhs.ty() == Ty::F64 && rhs.ty() == Ty::F64,
            "fcmp of non-doubles",
        ),
        Inst::ICmp { ty, lhs, rhs, .. } => {
            expect(
                ty.is_integer() || *ty == Ty::Ptr,
                "icmp on a non-integer type",
            )?;
            expect(
                lhs.ty() == *ty && rhs.ty() == *ty,
                "icmp operand types disagree",
            )
        }
        Inst::Select {
            cond,
            ty,
            on_true,
            on_false,
            ..
        } => {
            expect(cond.ty() == Ty::I1, "select condition is not i1")?;
            expect(
                on_true.ty() == *ty && on_false.ty() == *ty,
                "select arm types disagree",
            )
        }
        Inst::Cast { op, val, to, .. } => {
            let from = val.ty();
            let ok = match op {
                CastOp::SiToFp | CastOp::UiToFp => from.is_integer() && *to == Ty::F64,
                CastOp::FpToSi => from == Ty::F64 && to.is_integer(),
                CastOp::Zext | CastOp::Trunc => from.is_integer() && to.is_integer(),
                CastOp::PtrToInt => from == Ty::Ptr && to.is_integer(),
            };
            expect(ok, "cast between incompatible types")
        }
        Inst::Gep { base, index, .. } => {
            expect(base.ty() == Ty::Ptr, "gep base is not a pointer")?;
            expect(index.ty().is_integer(), "gep index is not an integer")
        }
        Inst::Call { callee, sig, args, .. } => {
            let declared = callables
                .get(callee.as_str())
                .ok_or_else(|| format!("call to undeclared '@{callee}'"))?;
            expect(*declared == sig, &format!("signature mismatch calling '@{callee}'"))?;
            if sig.variadic {
                expect(
                    args.len() >= sig.params.len(),
                    &format!("too few arguments calling '@{callee}'"),
                )?;
            } else {
                expect(
                    args.len() == sig.params.len(),
                    &format!("argument count mismatch calling '@{callee}'"),
                )?;
            }
            for (arg, param) in args.iter().zip(&sig.params) {
                expect(
                    arg.ty() == *param,
                    &format!("argument type mismatch calling '@{callee}'"),
                )?;
            }
            Ok(())
        }
        Inst::Br { target } => expect(
            labels.contains(target.as_str()),
            &format!("branch to unknown block '{target}'"),
        ),
        Inst::CondBr {
            cond,
            then_target,
            else_target,
        } => {
            expect(cond.ty() == Ty::I1, "conditional branch on a non-i1")?;
            expect(
                labels.contains(then_target.as_str()),
                &format!("branch to unknown block '{then_target}'"),
            )?;
            expect(
                labels.contains(else_target.as_str()),
                &format!("branch to unknown block '{else_target}'"),
            )
        }
        Inst::Ret { val } => match (function.ret, val) {
            (Ty::Void, None) => Ok(()),
            (Ty::Void, Some(_)) => Err("return with a value from a void function".to_string()),
            (_, None) => Err("bare return from a non-void function".to_string()),
            (ret, Some(val)) => expect(
                val.ty() == ret,
                &format!("returning {} from a function returning {ret}", val.ty()),
            ),
        },
    }
}

fn expect(cond: bool, msg: &str) -> Result<(), String> {
    if cond {
        Ok(())
    } else {
        Err(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Value;

    fn empty_tables() -> (HashMap<&'static str, &'static FnSig>, HashSet<&'static str>) {
        (HashMap::new(), HashSet::new())
    }

    fn function_with(insts: Vec<Inst>) -> Function {
        Function {
            name: "main".to_string(),
            params: Vec::new(),
            ret: Ty::I32,
            internal: false,
            blocks: vec![Block {
                label: "entry".to_string(),
                insts,
            }],
        }
    }

    #[test]
    fn accepts_a_minimal_function() {
        let f = function_with(vec![Inst::Ret {
            val: Some(Value::Int(Ty::I32, 0)),
        }]);
        let (callables, globals) = empty_tables();
        assert!(verify_function(&f, &callables, &globals).is_ok());
    }

    #[test]
    fn rejects_unterminated_blocks() {
        let f = function_with(vec![Inst::Alloca {
            dst: "x".to_string(),
            ty: Ty::F64,
        }]);
        let (callables, globals) = empty_tables();
        let err = verify_function(&f, &callables, &globals).unwrap_err();
        assert!(err.contains("not terminated"), "{err}");
    }

    #[test]
    fn rejects_use_of_undefined_temporary() {
        let f = function_with(vec![
            Inst::Store {
                val: Value::Temp("ghost".to_string(), Ty::F64),
                ptr: Value::Temp("x".to_string(), Ty::Ptr),
            },
            Inst::Ret {
                val: Some(Value::Int(Ty::I32, 0)),
            },
        ]);
        let (callables, globals) = empty_tables();
        let err = verify_function(&f, &callables, &globals).unwrap_err();
        assert!(err.contains("undefined temporary"), "{err}");
    }

    #[test]
    fn rejects_operand_type_disagreement() {
        let f = function_with(vec![
            Inst::Bin {
                dst: "t0".to_string(),
                op: BinOp::FAdd,
                ty: Ty::F64,
                lhs: Value::F64(1.0),
                rhs: Value::Int(Ty::I32, 1),
            },
            Inst::Ret {
                val: Some(Value::Int(Ty::I32, 0)),
            },
        ]);
        let (callables, globals) = empty_tables();
        let err = verify_function(&f, &callables, &globals).unwrap_err();
        assert!(err.contains("disagree"), "{err}");
    }

    #[test]
    fn rejects_return_type_mismatch() {
        let f = function_with(vec![Inst::Ret {
            val: Some(Value::F64(0.0)),
        }]);
        let (callables, globals) = empty_tables();
        assert!(verify_function(&f, &callables, &globals).is_err());
    }

    #[test]
    fn rejects_branch_to_unknown_block() {
        let f = function_with(vec![Inst::Br {
            target: "nowhere".to_string(),
        }]);
        let (callables, globals) = empty_tables();
        let err = verify_function(&f, &callables, &globals).unwrap_err();
        assert!(err.contains("unknown block"), "{err}");
    }
}
