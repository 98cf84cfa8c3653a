//! Component D: shared arity bookkeeping for every function and built-in
//! (spec §4.D), grounded on
//! `examples/original_source/web/python/SharedFunc.py`'s `SharedFunc`. One
//! instance lives for the whole program.
//!
//! The built-in table follows spec.md's normative names
//! (`VID, VID_RED, VID_GREEN, VID_BLUE, VID_X, VID_Y, VIDEO, HALT, main`)
//! rather than the original prototype's table, which has a stale `"VID_V"`
//! entry that doesn't match any real opcode.

use crate::error::{Error, Result};
use std::collections::HashMap;

pub struct SharedFunctionTable {
    return_count: HashMap<String, usize>,
    arg_count: HashMap<String, usize>,
}

impl SharedFunctionTable {
    pub fn new() -> SharedFunctionTable {
        let return_count = [
            ("main", 0),
            ("VID", 0),
            ("VID_RED", 0),
            ("VID_GREEN", 0),
            ("VID_BLUE", 0),
            ("VID_X", 0),
            ("VID_Y", 0),
            ("VIDEO", 0),
            ("HALT", 0),
        ]
        .iter()
        .map(|(name, count)| (name.to_string(), *count))
        .collect();

        let arg_count = [
            ("main", 0),
            ("VID", 0),
            ("VID_RED", 1),
            ("VID_GREEN", 1),
            ("VID_BLUE", 1),
            ("VID_X", 1),
            ("VID_Y", 1),
            ("VIDEO", 5),
            ("HALT", 0),
        ]
        .iter()
        .map(|(name, count)| (name.to_string(), *count))
        .collect();

        SharedFunctionTable {
            return_count,
            arg_count,
        }
    }

    /// The return arity recorded for `name`, or `0` if never seen yet.
    pub fn return_count(&self, name: &str) -> usize {
        self.return_count.get(name).copied().unwrap_or(0)
    }

    pub fn is_reserved(name: &str) -> bool {
        matches!(
            name,
            "VID" | "VID_RED" | "VID_GREEN" | "VID_BLUE" | "VID_X" | "VID_Y" | "VIDEO" | "HALT"
        )
    }

    /// Records (or checks) how many values a call to `func_name` returns.
    pub fn validate_return(&mut self, func_name: &str, amount_returned: usize) -> Result<()> {
        match self.return_count.get(func_name) {
            None => {
                self.return_count
                    .insert(func_name.to_string(), amount_returned);
                Ok(())
            }
            Some(&expected) if expected == amount_returned => Ok(()),
            Some(&expected) => Err(Error::ArityMismatch {
                name: func_name.to_string(),
                kind: "returned",
                found: amount_returned,
                expected,
            }),
        }
    }

    /// Records (or checks) how many arguments a call to `func_name` passes.
    pub fn validate_arg(&mut self, func_name: &str, amount_argument: usize) -> Result<()> {
        match self.arg_count.get(func_name) {
            None => {
                self.arg_count
                    .insert(func_name.to_string(), amount_argument);
                Ok(())
            }
            Some(&expected) if expected == amount_argument => Ok(()),
            Some(&expected) => Err(Error::ArityMismatch {
                name: func_name.to_string(),
                kind: "passed",
                found: amount_argument,
                expected,
            }),
        }
    }
}

impl Default for SharedFunctionTable {
    fn default() -> SharedFunctionTable {
        SharedFunctionTable::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_use_establishes_the_arity() {
        let mut table = SharedFunctionTable::new();
        table.validate_arg("add_two", 2).unwrap();
        assert!(table.validate_arg("add_two", 2).is_ok());
        assert!(table.validate_arg("add_two", 3).is_err());
    }

    #[test]
    fn builtins_are_pre_registered() {
        let mut table = SharedFunctionTable::new();
        assert!(table.validate_arg("VIDEO", 5).is_ok());
        assert!(table.validate_arg("VIDEO", 4).is_err());
    }
}
