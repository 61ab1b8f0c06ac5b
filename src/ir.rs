//! Translation unit definitions for the MiniAPL backend
//!
//! A [`TranslationUnit`] is what code generation hands to the execution
//! engine: a set of functions, each a flat list of array instructions over
//! write-once registers. Every register holds a contiguous buffer of `i32`
//! elements whose length is fixed when the register is created.

use serde::{Deserialize, Serialize};

use crate::ast::element_count;
use crate::error::{EngineError, EngineResult};

/// A write-once virtual register holding one array buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reg(pub u32);

impl Reg {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Elementwise binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
}

impl BinaryOp {
    /// Apply to one pair of elements; overflow wraps
    pub fn apply(self, lhs: i32, rhs: i32) -> i32 {
        match self {
            BinaryOp::Add => lhs.wrapping_add(rhs),
            BinaryOp::Sub => lhs.wrapping_sub(rhs),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
        }
    }
}

/// A single backend instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// `dst` = one-element buffer holding `value`
    Const { dst: Reg, value: i32 },
    /// `dst` = zero-initialised buffer of `len` elements
    Alloc { dst: Reg, len: usize },
    /// `dst[i]` = sum of `src[i * inner .. (i + 1) * inner]` for `i < outer`
    Reduce {
        dst: Reg,
        src: Reg,
        outer: usize,
        inner: usize,
    },
    /// `dst[i]` = `lhs[i] op rhs[i]` for `i < len`
    Binary {
        op: BinaryOp,
        dst: Reg,
        lhs: Reg,
        rhs: Reg,
        len: usize,
    },
    /// Write `src` to the output, laid out by `dims`
    Print { src: Reg, dims: Vec<usize> },
    Ret,
}

impl Instruction {
    /// Register written by this instruction
    pub fn def(&self) -> Option<Reg> {
        match self {
            Instruction::Const { dst, .. }
            | Instruction::Alloc { dst, .. }
            | Instruction::Reduce { dst, .. }
            | Instruction::Binary { dst, .. } => Some(*dst),
            Instruction::Print { .. } | Instruction::Ret => None,
        }
    }

    /// Registers read by this instruction
    pub fn uses(&self) -> Vec<Reg> {
        match self {
            Instruction::Reduce { src, .. } | Instruction::Print { src, .. } => vec![*src],
            Instruction::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            Instruction::Const { .. } | Instruction::Alloc { .. } | Instruction::Ret => vec![],
        }
    }

    /// True if removing the instruction could change observable behaviour
    pub fn has_side_effects(&self) -> bool {
        matches!(self, Instruction::Print { .. } | Instruction::Ret)
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Const { dst, value } => write!(f, "{} = const i32 {}", dst, value),
            Instruction::Alloc { dst, len } => write!(f, "{} = alloc [{} x i32]", dst, len),
            Instruction::Reduce {
                dst,
                src,
                outer,
                inner,
            } => write!(
                f,
                "{} = reduce.sum [{} x i32] {}, [{} x i32]",
                dst,
                outer * inner,
                src,
                outer
            ),
            Instruction::Binary {
                op,
                dst,
                lhs,
                rhs,
                len,
            } => write!(f, "{} = {} [{} x i32] {}, {}", dst, op.mnemonic(), len, lhs, rhs),
            Instruction::Print { src, dims } => write!(f, "print {} {:?}", src, dims),
            Instruction::Ret => write!(f, "ret void"),
        }
    }
}

/// A function taking no arguments and returning nothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    /// Buffer length of each register, indexed by register number
    pub registers: Vec<usize>,
    pub body: Vec<Instruction>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Create a fresh register holding `len` elements
    pub fn fresh(&mut self, len: usize) -> Reg {
        let reg = Reg(self.registers.len() as u32);
        self.registers.push(len);
        reg
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.body.push(instruction);
    }

    pub fn register_len(&self, reg: Reg) -> Option<usize> {
        self.registers.get(reg.index()).copied()
    }

    /// Check register discipline and buffer lengths
    pub fn verify(&self) -> EngineResult<()> {
        let mut defined = vec![false; self.registers.len()];
        let fail = |index: usize, msg: String| {
            EngineError::verify(format!(
                "function `{}`, instruction {}: {}",
                self.name, index, msg
            ))
        };

        for (index, inst) in self.body.iter().enumerate() {
            for reg in inst.uses() {
                if !defined.get(reg.index()).copied().unwrap_or(false) {
                    return Err(fail(index, format!("{} used before definition", reg)));
                }
            }

            let len = |reg: Reg| self.registers.get(reg.index()).copied().unwrap_or(0);
            let lengths_ok = match inst {
                Instruction::Const { dst, .. } => len(*dst) == 1,
                Instruction::Alloc { dst, len: n } => len(*dst) == *n,
                Instruction::Reduce {
                    dst,
                    src,
                    outer,
                    inner,
                } => len(*dst) == *outer && outer.checked_mul(*inner) == Some(len(*src)),
                Instruction::Binary {
                    dst, lhs, rhs, len: n, ..
                } => len(*dst) == *n && len(*lhs) == *n && len(*rhs) == *n,
                Instruction::Print { src, dims } => element_count(dims) == Some(len(*src)),
                Instruction::Ret => index + 1 == self.body.len(),
            };
            if !lengths_ok {
                return Err(fail(index, format!("malformed instruction `{}`", inst)));
            }

            if let Some(dst) = inst.def() {
                match defined.get_mut(dst.index()) {
                    Some(slot) if !*slot => *slot = true,
                    Some(_) => return Err(fail(index, format!("{} defined twice", dst))),
                    None => return Err(fail(index, format!("{} is not declared", dst))),
                }
            }
        }

        match self.body.last() {
            Some(Instruction::Ret) => Ok(()),
            _ => Err(EngineError::verify(format!(
                "function `{}` does not end with `ret`",
                self.name
            ))),
        }
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "define void @{}() {{", self.name)?;
        writeln!(f, "entry:")?;
        for inst in &self.body {
            writeln!(f, "  {}", inst)?;
        }
        writeln!(f, "}}")
    }
}

/// The complete generated program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub name: String,
    /// Set by the optimization pipeline from the execution engine
    pub target_triple: Option<String>,
    pub functions: Vec<Function>,
}

impl TranslationUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_triple: None,
            functions: Vec::new(),
        }
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Total number of instructions across all functions
    pub fn instruction_count(&self) -> usize {
        self.functions.iter().map(|f| f.body.len()).sum()
    }

    /// Verify every function in the unit
    pub fn verify(&self) -> EngineResult<()> {
        for (i, function) in self.functions.iter().enumerate() {
            if self.functions[..i].iter().any(|f| f.name == function.name) {
                return Err(EngineError::verify(format!(
                    "function `{}` defined twice",
                    function.name
                )));
            }
            function.verify()?;
        }
        Ok(())
    }

    /// Export to JSON format
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Display for TranslationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        if let Some(triple) = &self.target_triple {
            writeln!(f, "target triple = \"{}\"", triple)?;
        }
        for function in &self.functions {
            writeln!(f)?;
            write!(f, "{}", function)?;
        }
        Ok(())
    }
}
