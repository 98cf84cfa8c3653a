//! Component E: the per-function stack-frame allocator (spec §4.E),
//! grounded on `examples/original_source/web/python/MemoryManager.py`.
//!
//! One [`MemoryManager`] is built per function declaration; [`helper::CompileHelper`]
//! and [`function_table::SharedFunctionTable`] are threaded in by reference
//! since they are shared across every function in the program.
//!
//! The `VIDEO` built-in's channel expansion is corrected here: the original
//! reused the X/Y channel's already-computed `variable1`/`variable2` for the
//! `VID_X`/`VID_Y` commands instead of the freshly computed `variable3`/
//! `variable4`, silently dropping two of the five argument expressions.

use crate::error::{Error, Result};
use crate::function_table::SharedFunctionTable;
use crate::helper::{
    extract_variable_and_commands, CompileHelper, REGISTER_PREFIX, TEMP_MEMORY_PREFIX,
};
use crate::jump::JumpManager;
use crate::opcode::{base_pointer, stack_pointer, Command, CommandOperand, Opcode, Operand, RawExpr};
use std::collections::HashMap;

pub struct MemoryManager {
    scopes: Vec<HashMap<String, i32>>,
    lifetimes: HashMap<String, i32>,
    lifetimes_stack: Vec<(String, i32)>,
    stack_offset: i32,
    return_offset: i32,
}

impl MemoryManager {
    pub fn new(function_name: &str, shared: &SharedFunctionTable) -> MemoryManager {
        let stack_offset = 2;
        let return_offset = shared.return_count(function_name) as i32 + stack_offset;
        MemoryManager {
            scopes: vec![HashMap::new()],
            lifetimes: HashMap::new(),
            lifetimes_stack: Vec::new(),
            stack_offset,
            return_offset,
        }
    }

    pub fn inner_start(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn inner_end(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    fn get_var(&self, name: &str) -> Option<i32> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    fn get_min(&self) -> i32 {
        let mut values: Vec<i32> = self.scopes.iter().flat_map(|s| s.values().copied()).collect();
        values.sort_unstable();
        let mut expected = self.return_offset;
        for value in values {
            if value > expected {
                return expected;
            }
            expected = value + 1;
        }
        expected
    }

    fn set_var(&mut self, name: String) -> i32 {
        let min_num = self.get_min();
        self.scopes
            .last_mut()
            .expect("root scope always present")
            .insert(name, min_num);
        min_num
    }

    pub fn set_arguments(&mut self, args: &[String]) {
        for (index, arg) in args.iter().enumerate() {
            self.scopes[0].insert(arg.clone(), index as i32 + self.return_offset);
        }
    }

    pub fn get_stack_pointer(&self) -> i32 {
        self.scopes
            .iter()
            .flat_map(|s| s.values().copied())
            .max()
            .unwrap_or(0)
            + 1
    }

    fn record_lifetime(&mut self, name: String, instruction: i32) {
        self.lifetimes.insert(name, instruction);
    }

    fn compute_lifetimes_value(&mut self, op: &Operand, instruction: i32) {
        if let Operand::Name(name) = op {
            if !name.starts_with(REGISTER_PREFIX) {
                self.record_lifetime(name.clone(), instruction);
            }
        }
    }

    fn compute_lifetimes_raw(&mut self, expr: &RawExpr, instruction: i32) {
        match expr {
            RawExpr::Int(_) => {}
            RawExpr::Bare(op) => self.compute_lifetimes_value(op, instruction),
            RawExpr::Computed(_, cmds) => {
                for cmd in cmds {
                    self.compute_lifetimes_operand(&cmd.destination, instruction);
                    self.compute_lifetimes_operand(&cmd.source, instruction);
                }
            }
        }
    }

    fn compute_lifetimes_operand(&mut self, operand: &CommandOperand, instruction: i32) {
        match operand {
            CommandOperand::None => {}
            CommandOperand::Operand(op) => self.compute_lifetimes_value(op, instruction),
            CommandOperand::Names(names) => {
                for name in names {
                    if !name.starts_with(REGISTER_PREFIX) {
                        self.record_lifetime(name.clone(), instruction);
                    }
                }
            }
            CommandOperand::Exprs(exprs) => {
                for expr in exprs {
                    self.compute_lifetimes_raw(expr, instruction);
                }
            }
        }
    }

    /// Public entry point used both per-command (statements) and for a
    /// single argument name (`compute_lifetimes(arg, -1)` in the original).
    pub fn compute_lifetimes(&mut self, name: &str, instruction: i32) {
        if !name.starts_with(REGISTER_PREFIX) {
            self.record_lifetime(name.to_string(), instruction);
        }
    }

    pub fn compute_lifetimes_list(&mut self, commands: &[Command]) {
        for (index, cmd) in commands.iter().enumerate() {
            self.compute_lifetimes_operand(&cmd.destination, index as i32);
            self.compute_lifetimes_operand(&cmd.source, index as i32);
        }
        self.lifetimes_stack = self.lifetimes.iter().map(|(k, v)| (k.clone(), *v)).collect();
        self.lifetimes_stack.sort_by(|a, b| b.1.cmp(&a.1));
    }

    fn remove_dead_vars(&mut self, instruction: i32) {
        while let Some(&(_, death)) = self.lifetimes_stack.last() {
            if death < instruction {
                let (var, _) = self.lifetimes_stack.pop().expect("checked by while-let");
                self.scopes
                    .last_mut()
                    .expect("root scope always present")
                    .remove(&var);
            } else {
                break;
            }
        }
    }

    /// Resolves a pre-allocation [`Operand::Name`] into a concrete
    /// register or stack-frame slot. Non-`Name` operands pass through
    /// unchanged. `op` governs whether a never-seen plain variable may be
    /// created here (only `MOV`'s destination may) or must already exist.
    fn allocate_helper(&mut self, var: Operand, op: Opcode) -> Result<Operand> {
        let name = match var {
            Operand::Name(name) => name,
            other => return Ok(other),
        };

        if let Some(rest) = name.strip_prefix(REGISTER_PREFIX) {
            let reg: u8 = rest
                .parse()
                .expect("register placeholders are always `#<digits>`");
            return Ok(Operand::Reg(reg));
        }

        match self.get_var(&name) {
            Some(location) => Ok(Operand::Ram(location)),
            None => {
                if op != Opcode::Mov && !name.starts_with(TEMP_MEMORY_PREFIX) {
                    return Err(Error::UseBeforeInit { name });
                }
                let location = self.set_var(name);
                Ok(Operand::Ram(location))
            }
        }
    }

    /// Flattens a raw expression into an allocated operand plus the
    /// (fully allocated) commands that compute it.
    fn complex_commands_helper(
        &mut self,
        expr: RawExpr,
        instruction: i32,
        function_name: &str,
        helper: &mut CompileHelper,
        shared: &mut SharedFunctionTable,
        jumps: &mut JumpManager,
    ) -> Result<(Operand, Vec<Command>)> {
        let mut raw_commands = Vec::new();
        let variable = extract_variable_and_commands(helper, expr, &mut raw_commands);

        let mut allocated = Vec::new();
        for cmd in raw_commands {
            allocated.extend(self.allocate_command(cmd, instruction, function_name, helper, shared, jumps)?);
        }

        let temp_var = self.allocate_helper(variable, Opcode::Mov)?;
        Ok((temp_var, allocated))
    }

    /// Allocates every variable referenced by `cmd`, expanding
    /// `RETURN_HELPER`/`CALL_HELPER` into their real instruction sequences.
    /// See the frame layout table in `SPEC_FULL.md` §4.E for the stack-slot
    /// numbering this produces.
    pub fn allocate_command(
        &mut self,
        cmd: Command,
        instruction: i32,
        function_name: &str,
        helper: &mut CompileHelper,
        shared: &mut SharedFunctionTable,
        jumps: &mut JumpManager,
    ) -> Result<Vec<Command>> {
        self.remove_dead_vars(instruction);

        if cmd.operand == Opcode::ReturnHelper {
            let args = match cmd.destination {
                CommandOperand::Exprs(exprs) => exprs,
                _ => Vec::new(),
            };
            shared.validate_return(function_name, args.len())?;

            let mut final_command = Vec::new();
            for (index, arg) in args.into_iter().enumerate() {
                let (variable, var_lists) =
                    self.complex_commands_helper(arg, instruction, function_name, helper, shared, jumps)?;
                final_command.extend(var_lists);
                final_command.push(Command::with_operands(
                    Opcode::Mov,
                    Operand::Ram(index as i32 + self.stack_offset),
                    variable,
                ));
            }

            final_command.push(Command::with_operands(Opcode::Mov, stack_pointer(), base_pointer()));
            final_command.push(Command::with_operands(Opcode::Mov, base_pointer(), Operand::Ram(0)));
            final_command.push(Command::new(Opcode::Rtrn));
            return Ok(final_command);
        }

        if cmd.operand == Opcode::CallHelper {
            let call_label = cmd
                .call_label
                .clone()
                .expect("CALL_HELPER always carries a call_label");
            let destination_names = match &cmd.destination {
                CommandOperand::Names(names) => names.clone(),
                _ => Vec::new(),
            };
            let source_args = match cmd.source {
                CommandOperand::Exprs(exprs) => exprs,
                _ => Vec::new(),
            };

            shared.validate_return(&call_label, destination_names.len())?;
            shared.validate_arg(&call_label, source_args.len())?;

            let sp = self.get_stack_pointer();
            let arg_offset = destination_names.len() as i32 + sp + self.stack_offset;

            if call_label == "VID" {
                return Ok(vec![Command::new(Opcode::Vid)]);
            }

            if matches!(
                call_label.as_str(),
                "VID_RED" | "VID_GREEN" | "VID_BLUE" | "VID_X" | "VID_Y"
            ) {
                let mut args = source_args.into_iter();
                let arg0 = args.next().expect("single-channel video calls take one argument");
                let (variable, var_lists) =
                    self.complex_commands_helper(arg0, instruction, function_name, helper, shared, jumps)?;
                let opcode = match call_label.as_str() {
                    "VID_RED" => Opcode::VidRed,
                    "VID_GREEN" => Opcode::VidGreen,
                    "VID_BLUE" => Opcode::VidBlue,
                    "VID_X" => Opcode::VidX,
                    "VID_Y" => Opcode::VidY,
                    _ => unreachable!(),
                };
                let mut result = var_lists;
                result.push(Command::with_dest(opcode, variable));
                return Ok(result);
            }

            if call_label == "VIDEO" {
                let mut args = source_args.into_iter();
                let channels = [
                    (Opcode::VidRed, args.next()),
                    (Opcode::VidGreen, args.next()),
                    (Opcode::VidBlue, args.next()),
                    (Opcode::VidX, args.next()),
                    (Opcode::VidY, args.next()),
                ];
                let mut result = Vec::new();
                for (opcode, arg) in channels {
                    let arg = arg.expect("VIDEO takes exactly five arguments");
                    let (variable, var_lists) =
                        self.complex_commands_helper(arg, instruction, function_name, helper, shared, jumps)?;
                    result.extend(var_lists);
                    result.push(Command::with_dest(opcode, variable));
                }
                result.push(Command::new(Opcode::Vid));
                return Ok(result);
            }

            let mut final_command = Vec::new();
            for (index, arg) in source_args.into_iter().enumerate() {
                let (variable, var_lists) =
                    self.complex_commands_helper(arg, instruction, function_name, helper, shared, jumps)?;
                final_command.extend(var_lists);
                final_command.push(Command::with_operands(
                    Opcode::Mov,
                    Operand::Ram(arg_offset + index as i32),
                    variable,
                ));
            }

            for (index, name) in destination_names.iter().enumerate() {
                let return_offset = sp + index as i32 + 1;
                match self.get_var(name) {
                    None => {
                        self.scopes
                            .last_mut()
                            .expect("root scope always present")
                            .insert(name.clone(), return_offset);
                    }
                    Some(location) => {
                        final_command.push(Command::with_operands(
                            Opcode::Mov,
                            Operand::Ram(location),
                            Operand::Ram(return_offset),
                        ));
                    }
                }
            }

            final_command.push(Command::with_operands(Opcode::Add, stack_pointer(), Operand::Int(sp)));
            let mut call_cmd = Command::new(Opcode::Call);
            call_cmd.jump_label = Some(jumps.get_function(&call_label));
            final_command.push(call_cmd);
            return Ok(final_command);
        }

        let mut cmd = cmd;
        let operand = cmd.operand;
        cmd.destination = self
            .allocate_helper(take_operand(cmd.destination), operand)?
            .into();
        cmd.source = self
            .allocate_helper(take_operand(cmd.source), operand)?
            .into();
        Ok(vec![cmd])
    }
}

fn take_operand(co: CommandOperand) -> Operand {
    match co {
        CommandOperand::Operand(op) => op,
        CommandOperand::None => Operand::None,
        _ => Operand::None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn frame_slots_grow_from_the_return_offset() {
        let shared = SharedFunctionTable::new();
        let mut mem = MemoryManager::new("main", &shared);
        let a = mem.allocate_helper(Operand::Name("a".into()), Opcode::Mov).unwrap();
        let b = mem.allocate_helper(Operand::Name("b".into()), Opcode::Mov).unwrap();
        assert_eq!(a, Operand::Ram(2));
        assert_eq!(b, Operand::Ram(3));
    }

    #[test]
    fn use_before_init_is_rejected() {
        let shared = SharedFunctionTable::new();
        let mut mem = MemoryManager::new("main", &shared);
        let err = mem.allocate_helper(Operand::Name("a".into()), Opcode::Add);
        assert!(err.is_err());
    }

    #[test]
    fn register_placeholders_resolve_by_their_digits() {
        let shared = SharedFunctionTable::new();
        let mut mem = MemoryManager::new("main", &shared);
        let r = mem.allocate_helper(Operand::Name("#3".into()), Opcode::Mov).unwrap();
        assert_eq!(r, Operand::Reg(3));
    }
}
