//! Execution engine interface and the in-process virtual machine
//!
//! The driver only talks to an engine through [`ExecutionEngine`]: link a
//! finished translation unit, look up the entry symbol, invoke it.
//! [`VirtualMachine`] is the engine shipped with the crate. It interprets
//! the instruction set directly and writes printed values to any
//! [`Write`] sink.

use std::collections::HashMap;
use std::io::Write;

use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::ast::element_count;
use crate::ir::{BinaryOp, Instruction, Reg, TranslationUnit};

/// A resolved, invocable function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint {
    module: usize,
    function: usize,
}

/// Backend that links and runs translation units
pub trait ExecutionEngine {
    /// `<arch>-<vendor>-<os>` of the code this engine runs
    fn target_triple(&self) -> &str;

    /// Link a translation unit, making its functions visible to `lookup`
    fn add_module(&mut self, unit: TranslationUnit) -> EngineResult<()>;

    /// Find a linked function by name
    fn lookup(&self, symbol: &str) -> EngineResult<EntryPoint>;

    /// Call a function with no arguments and no return value
    fn invoke(&mut self, entry: EntryPoint) -> EngineResult<()>;
}

/// Interpreter for linked translation units
pub struct VirtualMachine<W: Write> {
    triple: String,
    modules: Vec<TranslationUnit>,
    symbols: HashMap<String, EntryPoint>,
    out: W,
}

impl<W: Write> VirtualMachine<W> {
    /// Initialize an engine for the host target, printing to `out`
    pub fn create(out: W) -> EngineResult<Self> {
        let arch = std::env::consts::ARCH;
        let os = std::env::consts::OS;
        if arch.is_empty() || os.is_empty() {
            return Err(EngineError::Init("unable to determine the host target".to_string()));
        }

        Ok(Self {
            triple: format!("{}-unknown-{}", arch, os),
            modules: Vec::new(),
            symbols: HashMap::new(),
            out,
        })
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }
}

impl<W: Write> ExecutionEngine for VirtualMachine<W> {
    fn target_triple(&self) -> &str {
        &self.triple
    }

    fn add_module(&mut self, unit: TranslationUnit) -> EngineResult<()> {
        if let Some(triple) = &unit.target_triple {
            if *triple != self.triple {
                return Err(EngineError::Link(format!(
                    "module `{}` targets {} but the engine runs {}",
                    unit.name, triple, self.triple
                )));
            }
        }

        let module = self.modules.len();
        let mut defined = Vec::with_capacity(unit.functions.len());
        for (function, f) in unit.functions.iter().enumerate() {
            if self.symbols.contains_key(&f.name) || defined.iter().any(|(name, _)| name == &f.name) {
                return Err(EngineError::Link(format!(
                    "duplicate definition of symbol `{}`",
                    f.name
                )));
            }
            defined.push((f.name.clone(), EntryPoint { module, function }));
        }

        debug!(module = %unit.name, symbols = defined.len(), "linked module");
        self.symbols.extend(defined);
        self.modules.push(unit);
        Ok(())
    }

    fn lookup(&self, symbol: &str) -> EngineResult<EntryPoint> {
        self.symbols
            .get(symbol)
            .copied()
            .ok_or_else(|| EngineError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
    }

    fn invoke(&mut self, entry: EntryPoint) -> EngineResult<()> {
        let function = self
            .modules
            .get(entry.module)
            .and_then(|m| m.functions.get(entry.function))
            .ok_or_else(|| EngineError::runtime("invalid entry point"))?;

        debug!(symbol = %function.name, instructions = function.body.len(), "invoking");

        // Every buffer lives until the function returns
        let mut frame: Vec<Option<Vec<i32>>> = vec![None; function.registers.len()];

        for inst in &function.body {
            match inst {
                Instruction::Const { dst, value } => write_reg(&mut frame, *dst, vec![*value])?,

                Instruction::Alloc { dst, len } => write_reg(&mut frame, *dst, zeroed(*len)?)?,

                Instruction::Reduce {
                    dst,
                    src,
                    outer,
                    inner,
                } => {
                    let count = outer
                        .checked_mul(*inner)
                        .ok_or_else(|| EngineError::runtime(format!("`{}` overflows the address space", inst)))?;
                    let sums = reduce_rows(read_reg(&frame, *src, count)?, *outer, *inner)?;
                    write_reg(&mut frame, *dst, sums)?;
                }

                Instruction::Binary {
                    op,
                    dst,
                    lhs,
                    rhs,
                    len,
                } => {
                    let lhs = read_reg(&frame, *lhs, *len)?;
                    let rhs = read_reg(&frame, *rhs, *len)?;
                    let result = elementwise(*op, lhs, rhs, *len)?;
                    write_reg(&mut frame, *dst, result)?;
                }

                Instruction::Print { src, dims } => {
                    let count = element_count(dims)
                        .ok_or_else(|| EngineError::runtime(format!("`{}` overflows the address space", inst)))?;
                    let data = read_reg(&frame, *src, count)?;
                    writeln!(self.out, "{}", format_array(data, dims))?;
                }

                Instruction::Ret => {
                    self.out.flush()?;
                    return Ok(());
                }
            }
        }

        Err(EngineError::runtime(format!(
            "function `{}` fell off the end without `ret`",
            function.name
        )))
    }
}

/// Zero-filled buffer of `len` elements; allocation failure is a runtime fault
fn zeroed(len: usize) -> EngineResult<Vec<i32>> {
    let mut data = with_capacity(len)?;
    data.resize(len, 0);
    Ok(data)
}

fn with_capacity(len: usize) -> EngineResult<Vec<i32>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|e| EngineError::runtime(format!("cannot allocate {} elements: {}", len, e)))?;
    Ok(data)
}

/// Sum each of the `outer` consecutive rows of `inner` elements in `src`
fn reduce_rows(src: &[i32], outer: usize, inner: usize) -> EngineResult<Vec<i32>> {
    if inner == 0 {
        return zeroed(outer);
    }
    let mut sums = with_capacity(outer)?;
    sums.extend(
        src.chunks(inner)
            .take(outer)
            .map(|row| row.iter().fold(0i32, |acc, v| acc.wrapping_add(*v))),
    );
    Ok(sums)
}

/// Apply `op` to the first `len` pairs of `lhs` and `rhs`
fn elementwise(op: BinaryOp, lhs: &[i32], rhs: &[i32], len: usize) -> EngineResult<Vec<i32>> {
    let mut result = with_capacity(len)?;
    result.extend(lhs.iter().zip(rhs).take(len).map(|(a, b)| op.apply(*a, *b)));
    Ok(result)
}

/// Read a register that must hold at least `len` elements
fn read_reg(frame: &[Option<Vec<i32>>], reg: Reg, len: usize) -> EngineResult<&[i32]> {
    let data = frame
        .get(reg.index())
        .and_then(Option::as_deref)
        .ok_or_else(|| EngineError::runtime(format!("{} read before it was written", reg)))?;
    if data.len() < len {
        return Err(EngineError::runtime(format!(
            "{} holds {} elements, {} required",
            reg,
            data.len(),
            len
        )));
    }
    Ok(data)
}

fn write_reg(frame: &mut [Option<Vec<i32>>], reg: Reg, data: Vec<i32>) -> EngineResult<()> {
    let slot = frame
        .get_mut(reg.index())
        .ok_or_else(|| EngineError::runtime(format!("{} is not declared", reg)))?;
    *slot = Some(data);
    Ok(())
}

/// Row-major nested rendering: `[[1, 2], [3, 4]]`; 0-D prints the bare value
pub fn format_array(data: &[i32], dims: &[usize]) -> String {
    match dims.split_first() {
        None => data.first().map(|v| v.to_string()).unwrap_or_default(),
        Some((&len, rest)) => {
            let stride = rest.iter().product::<usize>().max(1);
            let parts: Vec<String> = data
                .chunks(stride)
                .take(len)
                .map(|chunk| format_array(chunk, rest))
                .collect();
            format!("[{}]", parts.join(", "))
        }
    }
}
