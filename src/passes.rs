//! Optimization pipeline run between code generation and linking
//!
//! Passes rewrite a [`TranslationUnit`] in place and never change what
//! the program prints.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ir::{Function, TranslationUnit};

/// How much optimization to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OptLevel {
    /// No passes
    O0,
    #[default]
    O1,
}

impl OptLevel {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(OptLevel::O0),
            1 => Some(OptLevel::O1),
            _ => None,
        }
    }
}

/// A transformation over a whole translation unit
pub trait ModulePass {
    fn name(&self) -> &'static str;

    /// Returns true if the unit was changed
    fn run(&self, unit: &mut TranslationUnit) -> bool;
}

/// Removes instructions whose result is never read
pub struct DeadValueElimination;

impl DeadValueElimination {
    fn run_on_function(function: &mut Function) -> bool {
        let mut changed = false;
        loop {
            let used: HashSet<_> = function.body.iter().flat_map(|inst| inst.uses()).collect();
            let before = function.body.len();
            function.body.retain(|inst| {
                inst.has_side_effects() || inst.def().map_or(true, |dst| used.contains(&dst))
            });
            if function.body.len() == before {
                return changed;
            }
            changed = true;
        }
    }
}

impl ModulePass for DeadValueElimination {
    fn name(&self) -> &'static str {
        "dead-value-elimination"
    }

    fn run(&self, unit: &mut TranslationUnit) -> bool {
        let mut changed = false;
        for function in &mut unit.functions {
            changed |= Self::run_on_function(function);
        }
        changed
    }
}

/// Runs the passes selected by an optimization level
pub struct PassManager {
    passes: Vec<Box<dyn ModulePass>>,
}

impl PassManager {
    pub fn new(level: OptLevel) -> Self {
        let passes: Vec<Box<dyn ModulePass>> = match level {
            OptLevel::O0 => Vec::new(),
            OptLevel::O1 => vec![Box::new(DeadValueElimination)],
        };
        Self { passes }
    }

    /// Configure the unit for the target and run every pass once
    pub fn run(&self, unit: &mut TranslationUnit, target_triple: &str) {
        unit.target_triple = Some(target_triple.to_string());

        for pass in &self.passes {
            let before = unit.instruction_count();
            let changed = pass.run(unit);
            debug!(
                pass = pass.name(),
                changed,
                removed = before - unit.instruction_count(),
                "ran pass"
            );
        }
    }
}
