//! Component F: lowers an [`ast::Program`] into one flat IR command stream
//! (spec §4.F), grounded on
//! `examples/original_source/web/python/Parser.py`'s `Parser` transformer.
//!
//! `Lowerer` owns the program-wide [`CompileHelper`] and
//! [`SharedFunctionTable`] (shared across every function) and the
//! [`JumpManager`] (shared across the whole program, since labels must be
//! globally unique). A fresh [`MemoryManager`] is built per function.

use crate::ast;
use crate::error::{Error, Result};
use crate::function_table::SharedFunctionTable;
use crate::helper::{extract_variable_and_commands, CompileHelper};
use crate::jump::{JumpManager, LabelId};
use crate::memory::MemoryManager;
use crate::opcode::{base_pointer, stack_pointer, Command, CommandOperand, Compare, Opcode, Operand, RawExpr};

pub struct Lowerer {
    helper: CompileHelper,
    shared: SharedFunctionTable,
    jumps: JumpManager,
}

/// The result of lowering a boolean condition: the commands that compute
/// it, the label (if any) each side of a short-circuit chain should jump
/// to, and which of the three shapes from spec §4.F it produced.
struct CondResult {
    commands: Vec<Command>,
    fail_label: Option<LabelId>,
    true_label: Option<LabelId>,
    compare_type: Compare,
}

impl Lowerer {
    pub fn new() -> Lowerer {
        Lowerer {
            helper: CompileHelper::new(),
            shared: SharedFunctionTable::new(),
            jumps: JumpManager::new(),
        }
    }

    /// Lowers every function and prepends the program-entry jump to `main`
    /// (supplemented feature, see `SPEC_FULL.md` §4.1). Returns the command
    /// stream together with the `JumpManager` that knows every label's name.
    pub fn lower(mut self, program: &ast::Program) -> Result<(Vec<Command>, JumpManager)> {
        let mut body = Vec::new();
        for function in &program.functions {
            body.extend(self.lower_function(function)?);
        }
        let entry_label = self.jumps.get_function("main");
        let mut commands = vec![Command::jump(Opcode::Jmp, entry_label)];
        commands.extend(body);
        Ok((commands, self.jumps))
    }

    fn lower_function(&mut self, function: &ast::Function) -> Result<Vec<Command>> {
        if SharedFunctionTable::is_reserved(&function.name) {
            return Err(Error::ReservedName {
                name: function.name.clone(),
            });
        }

        let mut main_block = Vec::new();
        for stmt in &function.body {
            main_block.extend(self.lower_stmt(stmt)?);
        }

        let mut found_return = false;
        for cmd in &main_block {
            if cmd.operand == Opcode::ReturnHelper {
                let count = match &cmd.destination {
                    CommandOperand::Exprs(exprs) => exprs.len(),
                    _ => 0,
                };
                self.shared.validate_return(&function.name, count)?;
                found_return = true;
            }
        }
        if !found_return {
            self.shared.validate_return(&function.name, 0)?;
        }
        self.shared.validate_arg(&function.name, function.args.len())?;

        let mut mem = MemoryManager::new(&function.name, &self.shared);
        mem.set_arguments(&function.args);

        let function_label = self.jumps.get_function(&function.name);
        let mut final_block = vec![
            Command::label(function_label),
            Command::with_dest(Opcode::Push, base_pointer()),
            Command::with_operands(Opcode::Mov, base_pointer(), stack_pointer()),
        ];
        if !function.args.is_empty() {
            final_block.push(Command::with_operands(
                Opcode::Add,
                stack_pointer(),
                Operand::Int(function.args.len() as i32),
            ));
        }

        mem.compute_lifetimes_list(&main_block);
        for arg in &function.args {
            mem.compute_lifetimes(arg, -1);
        }

        for (index, item) in main_block.into_iter().enumerate() {
            match item.operand {
                Opcode::InnerStart => mem.inner_start(),
                Opcode::InnerEnd => mem.inner_end(),
                _ => {
                    let expanded = mem.allocate_command(
                        item,
                        index as i32,
                        &function.name,
                        &mut self.helper,
                        &mut self.shared,
                        &mut self.jumps,
                    )?;
                    final_block.extend(expanded);
                }
            }
        }

        if function.name == "main" {
            final_block.push(Command::new(Opcode::Halt));
        }

        self.helper.reset();
        Ok(final_block)
    }

    fn lower_stmt(&mut self, stmt: &ast::Stmt) -> Result<Vec<Command>> {
        match stmt {
            ast::Stmt::Assign(name, expr) => {
                let source = self.lower_expr(expr);
                Ok(self.process_assignment(RawExpr::name(name.clone()), source, Opcode::Mov))
            }
            ast::Stmt::CompoundAssign(op, name, expr) => {
                let source = self.lower_expr(expr);
                Ok(self.process_assignment(RawExpr::name(name.clone()), source, bin_op_opcode(op)))
            }
            ast::Stmt::Increment(name) => Ok(vec![Command::with_operands(
                Opcode::Add,
                Operand::Name(name.clone()),
                Operand::Int(1),
            )]),
            ast::Stmt::Decrement(name) => Ok(vec![Command::with_operands(
                Opcode::Sub,
                Operand::Name(name.clone()),
                Operand::Int(1),
            )]),
            ast::Stmt::MultiAssign(names, exprs) => self.lower_multi_assign(names, exprs),
            ast::Stmt::Call(expr) => match self.lower_expr(expr) {
                RawExpr::Computed(_, cmds) => Ok(cmds),
                _ => Ok(Vec::new()),
            },
            ast::Stmt::Return(exprs) => {
                let raw_exprs = exprs.iter().map(|e| self.lower_expr(e)).collect();
                Ok(vec![Command {
                    operand: Opcode::ReturnHelper,
                    destination: CommandOperand::Exprs(raw_exprs),
                    source: CommandOperand::None,
                    jump_label: None,
                    call_label: None,
                }])
            }
            ast::Stmt::If { arms, else_body } => self.lower_if(arms, else_body),
            ast::Stmt::For { init, cond, step, body } => self.lower_for(init, cond, step, body),
            ast::Stmt::While { cond, body } => self.lower_while(cond, body),
            ast::Stmt::DoWhile { body, cond } => self.lower_do_while(body, cond),
        }
    }

    fn process_assignment(&mut self, dest: RawExpr, source: RawExpr, op: Opcode) -> Vec<Command> {
        let mut commands = Vec::new();
        let product2 = extract_variable_and_commands(&mut self.helper, source, &mut commands);
        let product1 = extract_variable_and_commands(&mut self.helper, dest, &mut commands);
        self.helper.free_all_reg();
        commands.push(Command::with_operands(op, product1, product2));
        commands
    }

    fn lower_multi_assign(&mut self, names: &[String], exprs: &[ast::Expr]) -> Result<Vec<Command>> {
        if names.len() < exprs.len() {
            return Err(Error::TooFewReceivers {
                names: names.len(),
                values: exprs.len(),
            });
        }

        let mut final_commands = Vec::new();
        let mut var_offset = 0usize;
        let mut size_function = names.len() - exprs.len() + 1;

        for (i, expr) in exprs.iter().enumerate() {
            match self.lower_expr(expr) {
                RawExpr::Int(n) => {
                    final_commands.push(Command::with_operands(
                        Opcode::Mov,
                        Operand::Name(names[i + var_offset].clone()),
                        Operand::Int(n),
                    ));
                }
                RawExpr::Bare(operand) => {
                    final_commands.push(Command::with_operands(
                        Opcode::Mov,
                        Operand::Name(names[i + var_offset].clone()),
                        operand,
                    ));
                }
                RawExpr::Computed(operand, mut cmds) => {
                    let is_call_result = matches!(&operand, Operand::Name(n) if n.is_empty());
                    if is_call_result {
                        let count = size_function;
                        let dest_names = names[i + var_offset..i + var_offset + count].to_vec();
                        cmds.last_mut()
                            .expect("a call's lowering always carries at least one command")
                            .destination = CommandOperand::Names(dest_names);
                        if size_function != 1 {
                            var_offset += size_function - 1;
                            size_function = 1;
                        }
                        final_commands.extend(cmds);
                    } else {
                        final_commands.extend(cmds);
                        final_commands.push(Command::with_operands(
                            Opcode::Mov,
                            Operand::Name(names[i + var_offset].clone()),
                            operand,
                        ));
                    }
                }
            }
        }

        Ok(final_commands)
    }

    fn lower_expr(&mut self, expr: &ast::Expr) -> RawExpr {
        match expr {
            ast::Expr::Int(n) => RawExpr::Int(*n),
            ast::Expr::Var(name) => RawExpr::name(name.clone()),
            ast::Expr::Call(name, args) => {
                let raw_args = args.iter().map(|a| self.lower_expr(a)).collect();
                let cmd = Command {
                    operand: Opcode::CallHelper,
                    destination: CommandOperand::Names(Vec::new()),
                    source: CommandOperand::Exprs(raw_args),
                    jump_label: None,
                    call_label: Some(name.clone()),
                };
                RawExpr::Computed(Operand::Name(String::new()), vec![cmd])
            }
            ast::Expr::Unary(op, inner) => self.lower_unary(op, inner),
            ast::Expr::Binary(op, lhs, rhs) => self.lower_binary(op, lhs, rhs),
        }
    }

    fn lower_unary(&mut self, op: &ast::UnaryOp, inner: &ast::Expr) -> RawExpr {
        let inner_raw = self.lower_expr(inner);
        if let RawExpr::Int(n) = inner_raw {
            return RawExpr::Int(match op {
                ast::UnaryOp::Not => !n,
                ast::UnaryOp::Neg => (!n).wrapping_add(1),
            });
        }

        let mut commands = Vec::new();
        let operand = extract_variable_and_commands(&mut self.helper, inner_raw, &mut commands);
        let temp_name = self.helper.get_temp_ram();
        let opcode = match op {
            ast::UnaryOp::Not => Opcode::Not,
            ast::UnaryOp::Neg => Opcode::Neg,
        };
        commands.push(Command::with_operands(opcode, Operand::Name(temp_name.clone()), operand));
        RawExpr::Computed(Operand::Name(temp_name), commands)
    }

    fn lower_binary(&mut self, op: &ast::BinOp, lhs: &ast::Expr, rhs: &ast::Expr) -> RawExpr {
        let raw2 = self.lower_expr(rhs);
        let raw1 = self.lower_expr(lhs);

        let mut commands = Vec::new();
        let product2 = extract_variable_and_commands(&mut self.helper, raw2, &mut commands);
        let product1 = extract_variable_and_commands(&mut self.helper, raw1, &mut commands);

        if let (Operand::Int(a), Operand::Int(b)) = (&product1, &product2) {
            return RawExpr::Int(fold_constants(op, *a, *b));
        }

        let is_reg1 = product1.is_register_placeholder();
        let is_reg2 = product2.is_register_placeholder();
        let opcode = bin_op_opcode(op);

        let return_var = match (is_reg1, is_reg2) {
            (true, true) => {
                self.helper.free_reg(register_index(&product2));
                commands.push(Command::with_operands(opcode, product1.clone(), product2));
                product1
            }
            (false, true) => {
                self.helper.free_reg(register_index(&product2));
                commands.push(Command::with_operands(opcode, product2.clone(), product1));
                product2
            }
            (true, false) => {
                commands.push(Command::with_operands(opcode, product1.clone(), product2));
                product1
            }
            (false, false) => {
                let temp_reg = Operand::Name(self.helper.get_reg());
                commands.push(Command::with_operands(Opcode::Mov, temp_reg.clone(), product1));
                commands.push(Command::with_operands(opcode, temp_reg.clone(), product2));
                temp_reg
            }
        };

        RawExpr::Computed(return_var, commands)
    }

    fn lower_cond(&mut self, cond: &ast::Cond) -> Result<CondResult> {
        match cond {
            ast::Cond::Compare(op, lhs, rhs) => {
                let lhs_raw = self.lower_expr(lhs);
                let rhs_raw = self.lower_expr(rhs);
                let mut commands = self.process_assignment(lhs_raw, rhs_raw, Opcode::Cmp);
                commands.push(Command::new(compare_jump_opcode(op)));
                Ok(CondResult {
                    commands,
                    fail_label: None,
                    true_label: None,
                    compare_type: Compare::Simple,
                })
            }
            ast::Cond::ZeroCompare(expr) => {
                let raw = self.lower_expr(expr);
                let mut commands = self.process_assignment(raw, RawExpr::Int(0), Opcode::Cmp);
                commands.push(Command::new(Opcode::Jne));
                Ok(CondResult {
                    commands,
                    fail_label: None,
                    true_label: None,
                    compare_type: Compare::Simple,
                })
            }
            ast::Cond::And(a, b) => {
                let r1 = self.lower_cond(a)?;
                let r2 = self.lower_cond(b)?;
                let mut block1 = r1.commands;
                let mut block2 = r2.commands;

                let final_fail = self.jumps.remove_duplicate(r2.fail_label, r1.fail_label);

                if r1.compare_type == Compare::Simple {
                    let last = block1.last_mut().expect("a compare always produces a command");
                    last.jump_label = Some(final_fail);
                    last.negate_jump()?;
                }
                if r2.compare_type == Compare::Simple {
                    let last = block2.last_mut().expect("a compare always produces a command");
                    last.jump_label = Some(final_fail);
                    last.negate_jump()?;
                }

                if let Some(true_label1) = r1.true_label {
                    block1.push(Command::label(true_label1));
                }

                let final_true = if r1.compare_type != Compare::Simple && r2.compare_type != Compare::Simple {
                    r2.true_label
                } else {
                    None
                };

                block1.extend(block2);
                Ok(CondResult {
                    commands: block1,
                    fail_label: Some(final_fail),
                    true_label: final_true,
                    compare_type: Compare::LogicalAnd,
                })
            }
            ast::Cond::Or(a, b) => {
                let r1 = self.lower_cond(a)?;
                let r2 = self.lower_cond(b)?;
                let mut block1 = r1.commands;
                let mut block2 = r2.commands;

                let final_true = self.jumps.remove_duplicate(r1.true_label, r2.true_label);
                let final_fail = self.jumps.remove_duplicate(r2.fail_label, None);

                block1.last_mut().expect("a compare always produces a command").jump_label = Some(final_true);
                if r1.compare_type != Compare::Simple {
                    block1.last_mut().expect("checked above").negate_jump()?;
                }

                if r2.compare_type == Compare::Simple {
                    let last = block2.last_mut().expect("a compare always produces a command");
                    last.jump_label = Some(final_fail);
                    last.negate_jump()?;
                }

                if let Some(fail_label1) = r1.fail_label {
                    block1.push(Command::label(fail_label1));
                }

                block1.extend(block2);
                Ok(CondResult {
                    commands: block1,
                    fail_label: Some(final_fail),
                    true_label: Some(final_true),
                    compare_type: Compare::LogicalOr,
                })
            }
        }
    }

    fn loop_helper(
        &mut self,
        true_label: Option<LabelId>,
        fail_label: Option<LabelId>,
        condition_block: &mut Vec<Command>,
        compare_type: Compare,
    ) -> Result<LabelId> {
        let true_label = true_label.unwrap_or_else(|| self.jumps.get_jump());
        condition_block
            .last_mut()
            .expect("a loop condition always produces a command")
            .jump_label = Some(true_label);
        if compare_type != Compare::Simple {
            condition_block.last_mut().expect("checked above").negate_jump()?;
        }
        if let Some(fail) = fail_label {
            condition_block.push(Command::label(fail));
        }
        Ok(true_label)
    }

    fn if_helper(
        &mut self,
        compare_type: Compare,
        mut fail_label: Option<LabelId>,
        true_label: Option<LabelId>,
        mut compare_block: Vec<Command>,
        mut main_block: Vec<Command>,
    ) -> Result<Vec<Command>> {
        if compare_type == Compare::Simple {
            compare_block
                .last_mut()
                .expect("a compare always produces a command")
                .negate_jump()?;
            let new_fail = self.jumps.get_jump();
            compare_block.last_mut().expect("checked above").jump_label = Some(new_fail);
            fail_label = Some(new_fail);
        }

        main_block.push(Command::label(
            fail_label.expect("every compare chain resolves a fail label by the time if_helper runs"),
        ));
        if let Some(true_label) = true_label {
            compare_block.push(Command::label(true_label));
        }

        let mut out = vec![Command::new(Opcode::InnerStart)];
        out.extend(compare_block);
        out.extend(main_block);
        out.push(Command::new(Opcode::InnerEnd));
        Ok(out)
    }

    fn lower_if(&mut self, arms: &[(ast::Cond, Vec<ast::Stmt>)], else_body: &Option<Vec<ast::Stmt>>) -> Result<Vec<Command>> {
        let mut rendered_blocks = Vec::new();
        for (cond, body) in arms {
            let cond_result = self.lower_cond(cond)?;
            let mut block = Vec::new();
            for stmt in body {
                block.extend(self.lower_stmt(stmt)?);
            }
            rendered_blocks.push(self.if_helper(
                cond_result.compare_type,
                cond_result.fail_label,
                cond_result.true_label,
                cond_result.commands,
                block,
            )?);
        }

        if let Some(body) = else_body {
            let mut block = Vec::new();
            for stmt in body {
                block.extend(self.lower_stmt(stmt)?);
            }
            let mut out = vec![Command::new(Opcode::InnerStart)];
            out.extend(block);
            out.push(Command::new(Opcode::InnerEnd));
            rendered_blocks.push(out);
        }

        let final_jump_label = self.jumps.get_jump();
        let mut blocks = rendered_blocks.into_iter();
        let mut final_commands = blocks.next().expect("an `if` always has at least one arm");
        for block in blocks {
            // `final_commands` currently ends `..., LABEL(fail), INNER_END`;
            // the jump to the end must land before that trailing fail label,
            // not after it, or control would fall straight through the label
            // into `end` instead of skipping to the next arm's body.
            let insert_at = final_commands.len() - 2;
            final_commands.insert(insert_at, Command::jump(Opcode::Jmp, final_jump_label));
            final_commands.extend(block);
        }
        final_commands.push(Command::label(final_jump_label));
        Ok(final_commands)
    }

    fn lower_for(&mut self, init: &ast::Stmt, cond: &ast::Cond, step: &ast::Stmt, body: &[ast::Stmt]) -> Result<Vec<Command>> {
        let init_cmds = self.lower_stmt(init)?;
        let mut cond_result = self.lower_cond(cond)?;
        let step_cmds = self.lower_stmt(step)?;
        let mut main_block = Vec::new();
        for stmt in body {
            main_block.extend(self.lower_stmt(stmt)?);
        }

        let start_loop_label = self.jumps.get_jump();
        let true_label = self.loop_helper(
            cond_result.true_label,
            cond_result.fail_label,
            &mut cond_result.commands,
            cond_result.compare_type,
        )?;

        let mut out = vec![Command::new(Opcode::InnerStart)];
        out.extend(init_cmds);
        out.push(Command::jump(Opcode::Jmp, start_loop_label));
        out.push(Command::label(true_label));
        out.extend(main_block);
        out.extend(step_cmds);
        out.push(Command::label(start_loop_label));
        out.extend(cond_result.commands);
        out.push(Command::new(Opcode::InnerEnd));
        Ok(out)
    }

    fn lower_while(&mut self, cond: &ast::Cond, body: &[ast::Stmt]) -> Result<Vec<Command>> {
        let mut cond_result = self.lower_cond(cond)?;
        let mut main_block = Vec::new();
        for stmt in body {
            main_block.extend(self.lower_stmt(stmt)?);
        }

        let start_loop_label = self.jumps.get_jump();
        let true_label = self.loop_helper(
            cond_result.true_label,
            cond_result.fail_label,
            &mut cond_result.commands,
            cond_result.compare_type,
        )?;

        let mut out = vec![
            Command::new(Opcode::InnerStart),
            Command::jump(Opcode::Jmp, start_loop_label),
            Command::label(true_label),
        ];
        out.extend(main_block);
        out.push(Command::label(start_loop_label));
        out.extend(cond_result.commands);
        out.push(Command::new(Opcode::InnerEnd));
        Ok(out)
    }

    fn lower_do_while(&mut self, body: &[ast::Stmt], cond: &ast::Cond) -> Result<Vec<Command>> {
        let mut cond_result = self.lower_cond(cond)?;
        let mut main_block = Vec::new();
        for stmt in body {
            main_block.extend(self.lower_stmt(stmt)?);
        }

        let true_label = self.loop_helper(
            cond_result.true_label,
            cond_result.fail_label,
            &mut cond_result.commands,
            cond_result.compare_type,
        )?;

        let mut out = vec![Command::new(Opcode::InnerStart), Command::label(true_label)];
        out.extend(main_block);
        out.extend(cond_result.commands);
        out.push(Command::new(Opcode::InnerEnd));
        Ok(out)
    }
}

impl Default for Lowerer {
    fn default() -> Lowerer {
        Lowerer::new()
    }
}

fn register_index(operand: &Operand) -> u32 {
    match operand {
        Operand::Name(n) => n
            .strip_prefix(crate::helper::REGISTER_PREFIX)
            .expect("checked by is_register_placeholder")
            .parse()
            .expect("register placeholders are always `#<digits>`"),
        _ => unreachable!("register_index is only called on register placeholders"),
    }
}

fn bin_op_opcode(op: &ast::BinOp) -> Opcode {
    match op {
        ast::BinOp::Add => Opcode::Add,
        ast::BinOp::Sub => Opcode::Sub,
        ast::BinOp::Mult => Opcode::Mult,
        ast::BinOp::Div => Opcode::Div,
        ast::BinOp::Quot => Opcode::Quot,
        ast::BinOp::And => Opcode::And,
        ast::BinOp::Or => Opcode::Or,
        ast::BinOp::Xor => Opcode::Xor,
        ast::BinOp::Shl => Opcode::Shl,
        ast::BinOp::Shr => Opcode::Shr,
    }
}

fn compare_jump_opcode(op: &ast::CompareOp) -> Opcode {
    match op {
        ast::CompareOp::Eq => Opcode::Jeq,
        ast::CompareOp::Ne => Opcode::Jne,
        ast::CompareOp::Ge => Opcode::Jge,
        ast::CompareOp::Le => Opcode::Jle,
        ast::CompareOp::Gt => Opcode::Jg,
        ast::CompareOp::Lt => Opcode::Jl,
    }
}

/// Constant folding for two integer literals, matching Python's operator
/// semantics from the original prototype: truncating division (same as
/// Rust's `/`) but floored modulo (unlike Rust's `%`, which is truncated).
fn fold_constants(op: &ast::BinOp, a: i32, b: i32) -> i32 {
    match op {
        ast::BinOp::Add => a + b,
        ast::BinOp::Sub => a - b,
        ast::BinOp::Mult => a * b,
        ast::BinOp::Div => a / b,
        ast::BinOp::Quot => floor_mod(a, b),
        ast::BinOp::And => a & b,
        ast::BinOp::Or => a | b,
        ast::BinOp::Xor => a ^ b,
        ast::BinOp::Shl => a << b,
        ast::BinOp::Shr => a >> b,
    }
}

fn floor_mod(a: i32, b: i32) -> i32 {
    ((a % b) + b) % b
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn folds_constant_arithmetic() {
        let mut lowerer = Lowerer::new();
        let expr = ast::Expr::Binary(ast::BinOp::Add, Box::new(ast::Expr::Int(2)), Box::new(ast::Expr::Int(3)));
        assert_eq!(lowerer.lower_expr(&expr), RawExpr::Int(5));
    }

    #[test]
    fn floored_modulo_matches_python() {
        assert_eq!(floor_mod(-7, 2), 1);
        assert_eq!(floor_mod(7, -2), -1);
    }

    #[test]
    fn program_entry_jumps_to_main() {
        let program = ast::Program {
            functions: vec![ast::Function {
                name: "main".to_string(),
                args: vec![],
                body: vec![ast::Stmt::Return(vec![])],
            }],
        };
        let (commands, jumps) = Lowerer::new().lower(&program).unwrap();
        assert_eq!(commands[0].operand, Opcode::Jmp);
        let label = commands[0].jump_label.unwrap();
        assert_eq!(jumps.get_name(label), ".main");
    }
}
