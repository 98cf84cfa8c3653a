//! Compiler for a small C-like imperative language, targeting assembly and
//! fixed-width hex machine code for a custom 16-bit word-addressed
//! instruction set built for an educational Logisim-evolution CPU.
//!
//! The pipeline is a straight line from source text to the two artifacts a
//! caller wants:
//!
//! 1. [`parser::parse`] — a [pest] grammar (`grammar.pest`) walks source text
//!    into an [`ast::Program`].
//! 2. [`lower::Lowerer::lower`] — lowers the parse tree into one linear
//!    stream of [`opcode::Command`]s, fully allocated onto per-function
//!    stack frames by [`memory::MemoryManager`] and labeled by
//!    [`jump::JumpManager`].
//! 3. [`driver::emit`] — assigns label positions, then renders the assembly
//!    listing and the hex machine code.
//!
//! [`compile`] wires all three stages together. Callers who only need the
//! parse tree (e.g. to print it for debugging) can call [`parser::parse`]
//! directly.

pub mod ast;
pub mod driver;
pub mod error;
pub mod function_table;
pub mod helper;
pub mod jump;
pub mod lower;
pub mod memory;
pub mod opcode;
pub mod parser;

pub use driver::CompileOutput;
pub use error::{Error, Result};

/// Runs the full pipeline: parse, lower, and emit. A fresh
/// [`lower::Lowerer`] (and the [`function_table::SharedFunctionTable`],
/// [`helper::CompileHelper`] and [`jump::JumpManager`] it owns) is built for
/// every call, so repeated calls never leak state between programs (spec
/// §5).
pub fn compile(source: &str) -> Result<CompileOutput> {
    let program = parser::parse(source)?;
    let (commands, jumps) = lower::Lowerer::new().lower(&program)?;
    driver::emit(commands, jumps)
}

/// Parses `source` and renders its parse tree for debugging (one of the
/// "driver outputs" of spec §6 the CLI can optionally dump with `--tree`).
pub fn pretty_print_tree(source: &str) -> Result<String> {
    let program = parser::parse(source)?;
    Ok(format!("{:#?}", program))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn simple_conditional_emits_the_expected_compare_and_jump_shape() {
        let out = compile("def main(){ if (a == 1) { b = 2; } }").unwrap();
        let body: Vec<&str> = out
            .assembly
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        let cmp_idx = body.iter().position(|l| l.starts_with("CMP")).unwrap();
        assert_eq!(body[cmp_idx], "CMP, [bp + 2], 1");
        assert!(body[cmp_idx + 1].starts_with("JNE, ."));
        assert_eq!(body[cmp_idx + 2], "MOV, [bp + 3], 2");
        let label_line = &body[cmp_idx + 3];
        assert!(label_line.starts_with('.') && label_line.ends_with(':'));
    }

    #[test]
    fn while_loop_tests_the_condition_after_the_body() {
        let out = compile("def main(){ i = 0; while (i < 10) { i += 1; } }").unwrap();
        let body: Vec<&str> = out
            .assembly
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        assert!(body.contains(&"MOV, [bp + 2], 0"));
        let add_idx = body.iter().position(|l| l.starts_with("ADD")).unwrap();
        assert_eq!(body[add_idx], "ADD, [bp + 2], 1");
        let cmp_idx = body.iter().position(|l| l.starts_with("CMP")).unwrap();
        assert!(cmp_idx > add_idx);
        assert_eq!(body[cmp_idx], "CMP, [bp + 2], 10");
        assert_eq!(body[cmp_idx + 1].split(", ").next().unwrap(), "JL");
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let err = compile("def f(x){ return x; } def main(){ a = f(); }").unwrap_err();
        assert!(matches!(err, Error::ArityMismatch { .. }));
    }

    #[test]
    fn reserved_names_cannot_be_redeclared() {
        let err = compile("def HALT(){ return; } def main(){ return; }").unwrap_err();
        assert!(matches!(err, Error::ReservedName { .. }));
    }

    #[test]
    fn multi_return_call_binds_receivers_without_explicit_moves() {
        let out = compile("def f(){ return 1,2; } def main(){ a,b = f(); }").unwrap();
        assert!(out.assembly.contains("CALL, .f"));
    }

    #[test]
    fn pretty_tree_reports_parsed_function_names() {
        let tree = pretty_print_tree("def main(){ return; }").unwrap();
        assert!(tree.contains("\"main\""));
    }
}
