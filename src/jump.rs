//! Component B: label/jump bookkeeping (spec §4.B).
//!
//! Grounded on `examples/original_source/jump_manager.py`, with two of its
//! bugs corrected rather than ported: `get_function` compared `val == key`
//! instead of `val == jump_name`, so it never actually reused an existing
//! function label; and `set_pos` used position `0` as an "unset" sentinel,
//! which collides with a label that legitimately lands at index 0. Here
//! "unset" is `None`, and name reuse is a real lookup.

use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct LabelId(u32);

#[derive(Default)]
pub struct JumpManager {
    counter: u32,
    names: HashMap<u32, String>,
    positions: HashMap<String, Option<u32>>,
    verified: HashSet<String>,
}

impl JumpManager {
    pub fn new() -> JumpManager {
        JumpManager::default()
    }

    fn allocate(&mut self, name: String) -> LabelId {
        let id = self.counter;
        self.positions.insert(name.clone(), None);
        self.names.insert(id, name);
        self.counter += 1;
        LabelId(id)
    }

    /// A fresh, anonymous numeric label.
    pub fn get_jump(&mut self) -> LabelId {
        let name = self.counter.to_string();
        self.allocate(name)
    }

    /// A label bound to a function name; reuses the existing id if this
    /// name was already requested.
    pub fn get_function(&mut self, jump_name: &str) -> LabelId {
        if let Some((&id, _)) = self.names.iter().find(|(_, name)| name.as_str() == jump_name) {
            return LabelId(id);
        }
        self.allocate(jump_name.to_string())
    }

    fn name_of(&self, id: LabelId) -> &str {
        self.names
            .get(&id.0)
            .expect("LabelId always originates from this JumpManager")
    }

    /// The printed label name: `.L<n>` for anonymous numeric labels,
    /// `.<name>` for named (function) labels.
    pub fn get_name(&self, id: LabelId) -> String {
        let name = self.name_of(id);
        if name.chars().all(|c| c.is_ascii_digit()) {
            format!(".L{}", name)
        } else {
            format!(".{}", name)
        }
    }

    pub fn position(&self, id: LabelId) -> Option<u32> {
        *self
            .positions
            .get(self.name_of(id))
            .expect("every allocated label has a position slot")
    }

    /// Allocates or merges two (possibly absent) label references into one:
    /// both `None` allocates a fresh label; one present passes through;
    /// both present merges `id2` into `id1` (every name pointing at `id2`
    /// is repointed to `id1`'s name, and `id2`'s position slot is dropped).
    pub fn remove_duplicate(&mut self, id1: Option<LabelId>, id2: Option<LabelId>) -> LabelId {
        match (id1, id2) {
            (None, None) => self.get_jump(),
            (Some(id), None) => id,
            (None, Some(id)) => id,
            (Some(id1), Some(id2)) => {
                let name1 = self.name_of(id1).to_string();
                let name2 = self.name_of(id2).to_string();
                log::debug!("merging duplicate label {} into {}", name2, name1);
                self.positions.remove(&name2);
                for name in self.names.values_mut() {
                    if *name == name2 {
                        *name = name1.clone();
                    }
                }
                id1
            }
        }
    }

    /// Sets the instruction-position a label refers to. Fails if this
    /// label's position has already been set.
    pub fn set_pos(&mut self, id: LabelId, pos: u32) -> Result<()> {
        let name = self.name_of(id).to_string();
        let slot = self
            .positions
            .get_mut(&name)
            .expect("every allocated label has a position slot");
        if slot.is_some() {
            return Err(Error::DuplicateLabelPosition { name });
        }
        *slot = Some(pos);
        Ok(())
    }

    /// Marks a label as actually referenced, so the assembly-text pass
    /// doesn't print unused synthetic labels.
    pub fn set_verify(&mut self, id: LabelId) {
        let name = self.name_of(id).to_string();
        self.verified.insert(name);
    }

    /// Named (function) labels are always printed; synthetic numeric
    /// labels only if [`JumpManager::set_verify`] was called for them.
    pub fn verify(&self, id: LabelId) -> bool {
        let name = self.name_of(id);
        if !name.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
        self.verified.contains(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn function_labels_are_reused_by_name() {
        let mut jumps = JumpManager::new();
        let a = jumps.get_function("main");
        let b = jumps.get_function("main");
        assert_eq!(a, b);
        assert_eq!(jumps.get_name(a), ".main");
    }

    #[test]
    fn anonymous_labels_get_dotted_numeric_names() {
        let mut jumps = JumpManager::new();
        let a = jumps.get_jump();
        assert_eq!(jumps.get_name(a), ".L0");
    }

    #[test]
    fn position_may_legitimately_be_zero() {
        let mut jumps = JumpManager::new();
        let a = jumps.get_jump();
        jumps.set_pos(a, 0).unwrap();
        assert_eq!(jumps.position(a), Some(0));
        assert!(jumps.set_pos(a, 1).is_err());
    }

    #[test]
    fn remove_duplicate_merges_names() {
        let mut jumps = JumpManager::new();
        let a = jumps.get_jump();
        let b = jumps.get_jump();
        jumps.set_pos(b, 7).unwrap();
        let merged = jumps.remove_duplicate(Some(a), Some(b));
        assert_eq!(merged, a);
        assert_eq!(jumps.get_name(a), jumps.get_name(b));
    }

    #[test]
    fn synthetic_labels_are_unverified_until_referenced() {
        let mut jumps = JumpManager::new();
        let a = jumps.get_jump();
        assert!(!jumps.verify(a));
        jumps.set_verify(a);
        assert!(jumps.verify(a));

        let f = jumps.get_function("main");
        assert!(jumps.verify(f));
    }
}
