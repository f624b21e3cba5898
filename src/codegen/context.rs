//! Generation state threaded through every codegen function

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

use super::asm::{DataDef, Inst};
use crate::ast::Param;
use crate::error::Warning;

/// Cell width on the 32-bit stack
pub const SLOT_SIZE: i32 = 4;

/// What a slot was initialized from. Only `print` looks at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Int,
    Str,
}

impl SlotKind {
    /// `str` and `String` annotations mark string slots; any other annotation is numeric.
    pub fn from_annotation(ty: Option<&str>) -> Option<SlotKind> {
        ty.map(|ty| match ty {
            "str" | "String" => SlotKind::Str,
            _ => SlotKind::Int,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Signed displacement from `ebp`
    pub offset: i32,
    pub kind: SlotKind,
}

/// Stack layout of the function being generated
#[derive(Debug, Clone, Default)]
pub struct Frame {
    slots: HashMap<String, Slot>,
    locals: i32,
    high_water: i32,
}

impl Frame {
    /// Parameters sit above the saved `ebp` and return address.
    pub fn with_params(params: &[Param]) -> Self {
        let mut frame = Frame::default();
        for (i, param) in params.iter().enumerate() {
            let offset = 2 * SLOT_SIZE + SLOT_SIZE * i as i32;
            let kind = SlotKind::from_annotation(param.ty.as_deref()).unwrap_or(SlotKind::Int);
            frame.slots.insert(param.name.clone(), Slot { offset, kind });
        }
        frame
    }

    /// Allocate a fresh slot and bind `name` to it, shadowing any earlier binding.
    pub fn declare(&mut self, name: &str, kind: SlotKind) -> i32 {
        self.locals += 1;
        self.high_water = self.high_water.max(self.locals);
        let offset = -SLOT_SIZE * self.locals;
        self.slots.insert(name.to_string(), Slot { offset, kind });
        offset
    }

    pub fn lookup(&self, name: &str) -> Option<Slot> {
        self.slots.get(name).copied()
    }

    /// Bytes to reserve below `ebp`
    pub fn size(&self) -> i32 {
        self.high_water * SLOT_SIZE
    }
}

/// Mints `__rx_<prefix>_<n>` labels from one counter shared by every prefix
#[derive(Debug, Default)]
pub struct LabelCounter {
    next: usize,
}

impl LabelCounter {
    pub fn mint(&mut self, prefix: &str) -> String {
        let label = format!("__rx_{}_{}", prefix, self.next);
        self.next += 1;
        label
    }

    pub fn minted(&self) -> usize {
        self.next
    }
}

#[derive(Debug, Default)]
pub struct GenContext {
    pub labels: LabelCounter,
    pub frame: Frame,
    pub data: IndexMap<String, DataDef>,
    pub text: Vec<Inst>,
    pub warnings: Vec<Warning>,
    /// User functions declared anywhere in the unit
    pub functions: HashSet<String>,
}

impl GenContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, inst: Inst) {
        self.text.push(inst);
    }

    pub fn emit_all(&mut self, insts: impl IntoIterator<Item = Inst>) {
        self.text.extend(insts);
    }

    /// Intern a fresh string constant and return its label
    pub fn string_constant(&mut self, prefix: &str, raw: &str) -> String {
        let label = self.labels.mint(prefix);
        self.data.insert(label.clone(), DataDef::string(label.clone(), raw));
        label
    }

    /// Define a fixed-label constant the first time it is asked for
    pub fn shared_constant(&mut self, label: &str, raw: &str) -> String {
        self.data
            .entry(label.to_string())
            .or_insert_with(|| DataDef::string(label, raw));
        label.to_string()
    }

    pub fn buffer(&mut self, size: usize) -> String {
        let label = self.labels.mint("buf");
        self.data.insert(label.clone(), DataDef::zeroed(label.clone(), size));
        label
    }
}
