//! Instruction lists

use super::instructions::Instruction;

/// Ordered list of instructions
///
/// Cloning deep-copies every nested plan.
#[derive(Clone, Default)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.instructions.get(pc)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn describe(&self, depth: usize, out: &mut String) {
        for instruction in &self.instructions {
            instruction.describe(depth, out);
        }
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.instructions.iter().map(|i| i.name()))
            .finish()
    }
}
