//! Component C: the register pool and temp-memory name generator (spec
//! §4.C), grounded on `examples/original_source/web/python/SharedFunc.py`'s
//! `CompileHelper`. One instance lives for the whole program; it is reset
//! after each function declaration finishes lowering.

use crate::opcode::{Command, CommandOperand, Opcode, Operand, RawExpr};
use std::collections::BinaryHeap;
use std::cmp::Reverse;

pub const REGISTER_PREFIX: char = '#';
pub const TEMP_MEMORY_PREFIX: char = '-';

pub struct CompileHelper {
    dead_temps: BinaryHeap<Reverse<u32>>,
    call_temp: u32,
}

impl CompileHelper {
    pub fn new() -> CompileHelper {
        let mut dead_temps = BinaryHeap::new();
        dead_temps.push(Reverse(0));
        CompileHelper {
            dead_temps,
            call_temp: 0,
        }
    }

    /// Returns a register placeholder name, e.g. `"#3"`. The digits after
    /// `#` are the actual physical register index once allocation resolves
    /// the placeholder (spec §4.E).
    pub fn get_reg(&mut self) -> String {
        let Reverse(temp) = self.dead_temps.pop().expect("heap is never empty");
        if self.dead_temps.is_empty() {
            self.dead_temps.push(Reverse(temp + 1));
        }
        format!("{}{}", REGISTER_PREFIX, temp)
    }

    pub fn free_reg(&mut self, reg: u32) {
        self.dead_temps.push(Reverse(reg));
    }

    /// A temp-memory placeholder name, e.g. `"-2-call temp"`. These are
    /// allocated as ordinary stack slots once they reach the allocator.
    pub fn get_temp_ram(&mut self) -> String {
        self.call_temp += 1;
        format!("{}{}-call temp", TEMP_MEMORY_PREFIX, self.call_temp)
    }

    /// Called once per statement: clears the call-temp counter. Registers
    /// are freed individually via [`CompileHelper::free_reg`] as each binary
    /// operation consumes its operands, so this only needs to reset the
    /// temp-memory naming sequence.
    pub fn free_all_reg(&mut self) {
        self.call_temp = 0;
    }

    /// Called once per function: restores the register heap and the
    /// temp-memory counter to their initial state.
    pub fn reset(&mut self) {
        self.dead_temps = BinaryHeap::new();
        self.dead_temps.push(Reverse(0));
        self.call_temp = 0;
    }
}

impl Default for CompileHelper {
    fn default() -> CompileHelper {
        CompileHelper::new()
    }
}

/// Folds a [`RawExpr`] into a plain operand name (or constant), appending
/// any commands it depends on ahead of `commands`. A `Computed` expression
/// whose last command is `CALL_HELPER` gets rewritten to stash its result in
/// a fresh temp-memory slot first, since `CALL_HELPER`'s destination list is
/// filled in later by the allocator (spec §4.C).
pub fn extract_variable_and_commands(
    helper: &mut CompileHelper,
    expr: RawExpr,
    commands: &mut Vec<Command>,
) -> Operand {
    match expr {
        RawExpr::Int(n) => Operand::Int(n),
        RawExpr::Bare(operand) => operand,
        RawExpr::Computed(operand, mut cmds) => {
            let last_is_call = matches!(cmds.last(), Some(c) if c.operand == Opcode::CallHelper);
            if last_is_call {
                let temp_name = helper.get_temp_ram();
                let temp_operand = Operand::Name(temp_name);
                let last = cmds.last_mut().expect("checked above");
                last.destination = CommandOperand::Names(vec![temp_operand.to_string()]);
                commands.splice(0..0, cmds);
                temp_operand
            } else {
                commands.extend(cmds.drain(..));
                operand
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn register_heap_reuses_freed_registers() {
        let mut helper = CompileHelper::new();
        assert_eq!(helper.get_reg(), "#0");
        assert_eq!(helper.get_reg(), "#1");
        helper.free_reg(0);
        assert_eq!(helper.get_reg(), "#0");
    }

    #[test]
    fn temp_ram_names_increment() {
        let mut helper = CompileHelper::new();
        assert_eq!(helper.get_temp_ram(), "-1-call temp");
        assert_eq!(helper.get_temp_ram(), "-2-call temp");
        helper.free_all_reg();
        assert_eq!(helper.get_temp_ram(), "-1-call temp");
    }

    #[test]
    fn bare_expr_passes_through_untouched() {
        let mut helper = CompileHelper::new();
        let mut commands = Vec::new();
        let result = extract_variable_and_commands(
            &mut helper,
            RawExpr::Bare(Operand::Name("a".into())),
            &mut commands,
        );
        assert_eq!(result, Operand::Name("a".into()));
        assert!(commands.is_empty());
    }
}
