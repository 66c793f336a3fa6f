//! The typed IR the lowerer targets.
//!
//! The model is deliberately small: named values, named blocks, and the
//! instruction subset the lowerer actually emits. `Display` renders a
//! syntactically valid textual LLVM module, which is what the external
//! backend tools (`opt`, `llc`) consume.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ty {
    F64,
    I1,
    I8,
    I32,
    I64,
    Ptr,
    Void,
}

impl Ty {
    pub fn is_integer(self) -> bool {
        matches!(self, Ty::I1 | Ty::I8 | Ty::I32 | Ty::I64)
    }

    /// Size of a stored value in bytes.
    pub fn size(self) -> u64 {
        match self {
            Ty::I1 | Ty::I8 => 1,
            Ty::I32 => 4,
            Ty::F64 | Ty::I64 | Ty::Ptr => 8,
            Ty::Void => 0,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Ty::F64 => "double",
            Ty::I1 => "i1",
            Ty::I8 => "i8",
            Ty::I32 => "i32",
            Ty::I64 => "i64",
            Ty::Ptr => "ptr",
            Ty::Void => "void",
        };
        write!(f, "{s}")
    }
}

/// An operand. Temporaries carry their type so instruction printing and
/// verification never need a symbol table.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    F64(f64),
    Int(Ty, i64),
    Null,
    Temp(String, Ty),
    Global(String),
}

impl Value {
    pub fn ty(&self) -> Ty {
        match self {
            Value::F64(_) => Ty::F64,
            Value::Int(ty, _) => *ty,
            Value::Null => Ty::Ptr,
            Value::Temp(_, ty) => *ty,
            Value::Global(_) => Ty::Ptr,
        }
    }

    /// `ty value` operand spelling.
    pub fn typed(&self) -> String {
        format!("{} {}", self.ty(), self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::F64(x) => write!(f, "{}", fmt_f64(*x)),
            Value::Int(Ty::I1, v) => write!(f, "{}", if *v != 0 { "true" } else { "false" }),
            Value::Int(_, v) => write!(f, "{v}"),
            Value::Null => write!(f, "null"),
            Value::Temp(name, _) => write!(f, "%{name}"),
            Value::Global(name) => write!(f, "@{name}"),
        }
    }
}

/// Render a double so that LLVM's parser reads back the identical bits.
/// Rust's `{:e}` prints the shortest round-tripping form; LLVM additionally
/// requires a decimal point in the mantissa.
pub fn fmt_f64(x: f64) -> String {
    let mut s = format!("{x:e}");
    if let Some(epos) = s.find('e') {
        if !s[..epos].contains('.') {
            s.insert_str(epos, ".0");
        }
    }
    s
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
    Add,
    Sub,
    Mul,
    SRem,
    And,
    Or,
    Xor,
    LShr,
}

impl BinOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
            BinOp::FRem => "frem",
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SRem => "srem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::LShr => "lshr",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv | BinOp::FRem
        )
    }
}

/// Ordered float predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FPred {
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
}

impl fmt::Display for FPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FPred::Oeq => "oeq",
            FPred::One => "one",
            FPred::Olt => "olt",
            FPred::Ole => "ole",
            FPred::Ogt => "ogt",
            FPred::Oge => "oge",
        };
        write!(f, "{s}")
    }
}

/// Signed integer (and pointer equality) predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl fmt::Display for IPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IPred::Eq => "eq",
            IPred::Ne => "ne",
            IPred::Slt => "slt",
            IPred::Sle => "sle",
            IPred::Sgt => "sgt",
            IPred::Sge => "sge",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    SiToFp,
    FpToSi,
    UiToFp,
    Zext,
    Trunc,
    PtrToInt,
}

impl CastOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CastOp::SiToFp => "sitofp",
            CastOp::FpToSi => "fptosi",
            CastOp::UiToFp => "uitofp",
            CastOp::Zext => "zext",
            CastOp::Trunc => "trunc",
            CastOp::PtrToInt => "ptrtoint",
        }
    }
}

/// A callee signature. Variadic signatures are spelled out at the call site
/// as LLVM requires.
#[derive(Debug, Clone, PartialEq)]
pub struct FnSig {
    pub params: Vec<Ty>,
    pub ret: Ty,
    pub variadic: bool,
}

impl FnSig {
    pub fn new(params: Vec<Ty>, ret: Ty) -> Self {
        Self {
            params,
            ret,
            variadic: false,
        }
    }

    pub fn variadic(params: Vec<Ty>, ret: Ty) -> Self {
        Self {
            params,
            ret,
            variadic: true,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Inst {
    Alloca {
        dst: String,
        ty: Ty,
    },
    /// Scratch buffer: `alloca [len x elem]`.
    AllocaArray {
        dst: String,
        elem: Ty,
        len: u64,
    },
    Load {
        dst: String,
        ty: Ty,
        ptr: Value,
    },
    Store {
        val: Value,
        ptr: Value,
    },
    Bin {
        dst: String,
        op: BinOp,
        ty: Ty,
        lhs: Value,
        rhs: Value,
    },
    FNeg {
        dst: String,
        val: Value,
    },
    FCmp {
        dst: String,
        pred: FPred,
        lhs: Value,
        rhs: Value,
    },
    ICmp {
        dst: String,
        pred: IPred,
        ty: Ty,
        lhs: Value,
        rhs: Value,
    },
    Select {
        dst: String,
        cond: Value,
        ty: Ty,
        on_true: Value,
        on_false: Value,
    },
    Cast {
        dst: String,
        op: CastOp,
        val: Value,
        to: Ty,
    },
    /// `getelementptr inbounds elem, ptr base, i64 index`
    Gep {
        dst: String,
        elem: Ty,
        base: Value,
        index: Value,
    },
    Call {
        dst: Option<String>,
        callee: String,
        sig: FnSig,
        args: Vec<Value>,
    },
    Br {
        target: String,
    },
    CondBr {
        cond: Value,
        then_target: String,
        else_target: String,
    },
    Ret {
        val: Option<Value>,
    },
}

impl Inst {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Inst::Br { .. } | Inst::CondBr { .. } | Inst::Ret { .. })
    }

    /// The temporary this instruction defines, with its type.
    pub fn def(&self) -> Option<(&str, Ty)> {
        match self {
            Inst::Alloca { dst, .. } | Inst::AllocaArray { dst, .. } => {
                Some((dst.as_str(), Ty::Ptr))
            }
            Inst::Load { dst, ty, .. } => Some((dst.as_str(), *ty)),
            Inst::Bin { dst, ty, .. } => Some((dst.as_str(), *ty)),
            Inst::FNeg { dst, .. } => Some((dst.as_str(), Ty::F64)),
            Inst::FCmp { dst, .. } | Inst::ICmp { dst, .. } => Some((dst.as_str(), Ty::I1)),
            Inst::Select { dst, ty, .. } => Some((dst.as_str(), *ty)),
            Inst::Cast { dst, to, .. } => Some((dst.as_str(), *to)),
            Inst::Gep { dst, .. } => Some((dst.as_str(), Ty::Ptr)),
            Inst::Call { dst: Some(dst), sig, .. } => Some((dst.as_str(), sig.ret)),
            _ => None,
        }
    }

    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Inst::Alloca { .. } | Inst::AllocaArray { .. } | Inst::Br { .. } => Vec::new(),
            Inst::Load { ptr, .. } => vec![ptr],
            Inst::Store { val, ptr } => vec![val, ptr],
            Inst::Bin { lhs, rhs, .. }
            | Inst::FCmp { lhs, rhs, .. }
            | Inst::ICmp { lhs, rhs, .. } => vec![lhs, rhs],
            Inst::FNeg { val, .. } | Inst::Cast { val, .. } => vec![val],
            Inst::Select {
                cond,
                on_true,
                on_false,
                ..
            } => vec![cond, on_true, on_false],
            Inst::Gep { base, index, .. } => vec![base, index],
            Inst::Call { args, .. } => args.iter().collect(),
            Inst::CondBr { cond, .. } => vec![cond],
            Inst::Ret { val } => val.iter().collect(),
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Alloca { dst, ty } => write!(f, "%{dst} = alloca {ty}"),
            Inst::AllocaArray { dst, elem, len } => {
                write!(f, "%{dst} = alloca [{len} x {elem}]")
            }
            Inst::Load { dst, ty, ptr } => write!(f, "%{dst} = load {ty}, ptr {ptr}"),
            Inst::Store { val, ptr } => write!(f, "store {}, ptr {ptr}", val.typed()),
            Inst::Bin {
                dst,
                op,
                ty,
                lhs,
                rhs,
            } => write!(f, "%{dst} = {} {ty} {lhs}, {rhs}", op.mnemonic()),
            Inst::FNeg { dst, val } => write!(f, "%{dst} = fneg double {val}"),
            Inst::FCmp {
                dst,
                pred,
                lhs,
                rhs,
            } => write!(f, "%{dst} = fcmp {pred} double {lhs}, {rhs}"),
            Inst::ICmp {
                dst,
                pred,
                ty,
                lhs,
                rhs,
            } => write!(f, "%{dst} = icmp {pred} {ty} {lhs}, {rhs}"),
            Inst::Select {
                dst,
                cond,
                ty,
                on_true,
                on_false,
            } => write!(
                f,
                "%{dst} = select i1 {cond}, {ty} {on_true}, {ty} {on_false}"
            ),
            Inst::Cast { dst, op, val, to } => {
                write!(f, "%{dst} = {} {} to {to}", op.mnemonic(), val.typed())
            }
            Inst::Gep {
                dst,
                elem,
                base,
                index,
            } => write!(
                f,
                "%{dst} = getelementptr inbounds {elem}, ptr {base}, i64 {index}"
            ),
            Inst::Call {
                dst,
                callee,
                sig,
                args,
            } => {
                if let Some(dst) = dst {
                    write!(f, "%{dst} = ")?;
                }
                if sig.variadic {
                    let params = sig
                        .params
                        .iter()
                        .map(Ty::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    write!(f, "call {} ({params}, ...) @{callee}(", sig.ret)?;
                } else {
                    write!(f, "call {} @{callee}(", sig.ret)?;
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg.typed())?;
                }
                write!(f, ")")
            }
            Inst::Br { target } => write!(f, "br label %{target}"),
            Inst::CondBr {
                cond,
                then_target,
                else_target,
            } => write!(
                f,
                "br i1 {cond}, label %{then_target}, label %{else_target}"
            ),
            Inst::Ret { val: Some(val) } => write!(f, "ret {}", val.typed()),
            Inst::Ret { val: None } => write!(f, "ret void"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub label: String,
    pub insts: Vec<Inst>,
}

impl Block {
    pub fn new(label: String) -> Self {
        Self {
            label,
            insts: Vec::new(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.insts.last().is_some_and(Inst::is_terminator)
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<(String, Ty)>,
    pub ret: Ty,
    pub internal: bool,
    pub blocks: Vec<Block>,
}

impl Function {
    pub fn sig(&self) -> FnSig {
        FnSig::new(self.params.iter().map(|(_, ty)| *ty).collect(), self.ret)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let linkage = if self.internal { "internal " } else { "" };
        write!(f, "define {linkage}{} @{}(", self.ret, self.name)?;
        for (i, (name, ty)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{ty} %{name}")?;
        }
        writeln!(f, ") {{")?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.label)?;
            for inst in &block.insts {
                writeln!(f, "  {inst}")?;
            }
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    Private,
    Internal,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Linkage::Private => write!(f, "private"),
            Linkage::Internal => write!(f, "internal"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum GlobalInit {
    /// NUL-terminated byte contents of a string constant.
    Bytes(Vec<u8>),
    /// A string constant preceded by its value-tag word, laid out as
    /// `{ i64, [N x i8] }`. Language-level strings are always tagged.
    TaggedBytes(i64, Vec<u8>),
    Int(Ty, i64),
}

#[derive(Debug, Clone)]
pub struct GlobalDef {
    pub name: String,
    pub linkage: Linkage,
    pub constant: bool,
    pub init: GlobalInit,
}

impl fmt::Display for GlobalDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{} = {}", self.name, self.linkage)?;
        if self.constant {
            write!(f, " unnamed_addr constant")?;
        } else {
            write!(f, " global")?;
        }
        match &self.init {
            GlobalInit::Bytes(bytes) => {
                write!(f, " [{} x i8] c\"{}\"", bytes.len(), escape_bytes(bytes))
            }
            GlobalInit::TaggedBytes(tag, bytes) => {
                let n = bytes.len();
                write!(
                    f,
                    " {{ i64, [{n} x i8] }} {{ i64 {tag}, [{n} x i8] c\"{}\" }}",
                    escape_bytes(bytes)
                )
            }
            GlobalInit::Int(Ty::I1, v) => {
                write!(f, " i1 {}", if *v != 0 { "true" } else { "false" })
            }
            GlobalInit::Int(ty, v) => write!(f, " {ty} {v}"),
        }
    }
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\5C"),
            b'"' => out.push_str("\\22"),
            0x20..=0x7E => out.push(b as char),
            _ => {
                out.push_str(&format!("\\{b:02X}"));
            }
        }
    }
    out
}

/// A complete compilation unit.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub globals: Vec<GlobalDef>,
    pub extern_globals: Vec<(String, Ty)>,
    pub extern_fns: Vec<(String, FnSig)>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            globals: Vec::new(),
            extern_globals: Vec::new(),
            extern_fns: Vec::new(),
            functions: Vec::new(),
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        writeln!(f, "source_filename = \"{}.tw\"", self.name)?;

        if !self.globals.is_empty() {
            writeln!(f)?;
            for global in &self.globals {
                writeln!(f, "{global}")?;
            }
        }

        if !self.extern_globals.is_empty() {
            writeln!(f)?;
            for (name, ty) in &self.extern_globals {
                writeln!(f, "@{name} = external global {ty}")?;
            }
        }

        if !self.extern_fns.is_empty() {
            writeln!(f)?;
            for (name, sig) in &self.extern_fns {
                let params = sig
                    .params
                    .iter()
                    .map(Ty::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                if sig.variadic {
                    writeln!(f, "declare {} @{name}({params}, ...)", sig.ret)?;
                } else {
                    writeln!(f, "declare {} @{name}({params})", sig.ret)?;
                }
            }
        }

        for function in &self.functions {
            writeln!(f)?;
            writeln!(f, "{function}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_always_carry_a_decimal_point() {
        assert_eq!(fmt_f64(2.0), "2.0e0");
        assert_eq!(fmt_f64(14.0), "1.4e1");
        assert_eq!(fmt_f64(0.5), "5.0e-1");
        assert_eq!(fmt_f64(-3.25), "-3.25e0");
        assert_eq!(fmt_f64(0.0), "0.0e0");
    }

    #[test]
    fn string_constants_are_escaped() {
        let g = GlobalDef {
            name: ".str".to_string(),
            linkage: Linkage::Private,
            constant: true,
            init: GlobalInit::Bytes(b"a\"b\\\n\0".to_vec()),
        };
        assert_eq!(
            g.to_string(),
            "@.str = private unnamed_addr constant [6 x i8] c\"a\\22b\\5C\\0A\\00\""
        );
    }

    #[test]
    fn variadic_calls_spell_out_the_signature() {
        let call = Inst::Call {
            dst: None,
            callee: "printf".to_string(),
            sig: FnSig::variadic(vec![Ty::Ptr], Ty::I32),
            args: vec![Value::Global(".str".to_string()), Value::F64(1.0)],
        };
        assert_eq!(
            call.to_string(),
            "call i32 (ptr, ...) @printf(ptr @.str, double 1.0e0)"
        );
    }

    #[test]
    fn negative_gep_index() {
        let gep = Inst::Gep {
            dst: "t0".to_string(),
            elem: Ty::F64,
            base: Value::Temp("a".to_string(), Ty::Ptr),
            index: Value::Int(Ty::I64, -1),
        };
        assert_eq!(
            gep.to_string(),
            "%t0 = getelementptr inbounds double, ptr %a, i64 -1"
        );
    }
}
