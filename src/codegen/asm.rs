//! NASM instruction model
//!
//! Codegen never writes assembly text directly. It builds `Inst` and
//! `DataDef` values and the `Display` impls here are the only place that
//! knows NASM spelling.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    Eax,
    Ebx,
    Esp,
    Ebp,
    Al,
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reg::Eax => "eax",
            Reg::Ebx => "ebx",
            Reg::Esp => "esp",
            Reg::Ebp => "ebp",
            Reg::Al => "al",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg),
    Imm(i32),
    /// Address of a data or code label
    Label(String),
    /// `[base+disp]`, always a dword access
    Mem { base: Reg, disp: i32 },
}

impl Operand {
    pub fn label(name: impl Into<String>) -> Self {
        Operand::Label(name.into())
    }

    pub fn frame(disp: i32) -> Self {
        Operand::Mem { base: Reg::Ebp, disp }
    }
}

impl From<Reg> for Operand {
    fn from(reg: Reg) -> Self {
        Operand::Reg(reg)
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Imm(value)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{}", reg),
            Operand::Imm(value) => write!(f, "{}", value),
            Operand::Label(name) => f.write_str(name),
            Operand::Mem { base, disp } if *disp < 0 => write!(f, "[{}-{}]", base, -(*disp as i64)),
            Operand::Mem { base, disp } if *disp > 0 => write!(f, "[{}+{}]", base, disp),
            Operand::Mem { base, .. } => write!(f, "[{}]", base),
        }
    }
}

/// Condition codes used by `setcc` and `jcc`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    E,
    Ne,
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Cond::E => "e",
            Cond::Ne => "ne",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    Global(String),
    Label(String),
    Mov(Operand, Operand),
    Movzx(Reg, Reg),
    Push(Operand),
    Pop(Reg),
    Add(Operand, Operand),
    Sub(Operand, Operand),
    Imul(Reg, Reg),
    Cdq,
    Idiv(Reg),
    Cmp(Operand, Operand),
    Set(Cond, Reg),
    Jmp(String),
    Jcc(Cond, String),
    Call(String),
    Ret,
}

impl Inst {
    /// The label this instruction defines, if any
    pub fn defines(&self) -> Option<&str> {
        match self {
            Inst::Label(name) => Some(name),
            _ => None,
        }
    }

    /// The label this instruction refers to, if any
    pub fn references(&self) -> Option<&str> {
        match self {
            Inst::Jmp(target) | Inst::Jcc(_, target) | Inst::Call(target) => Some(target),
            Inst::Push(Operand::Label(name)) | Inst::Mov(_, Operand::Label(name)) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Global(name) => write!(f, "global {}", name),
            Inst::Label(name) => write!(f, "{}:", name),
            Inst::Mov(dst, src) => write!(f, "    mov {}, {}", dst, src),
            Inst::Movzx(dst, src) => write!(f, "    movzx {}, {}", dst, src),
            Inst::Push(op @ Operand::Mem { .. }) => write!(f, "    push dword {}", op),
            Inst::Push(op) => write!(f, "    push {}", op),
            Inst::Pop(reg) => write!(f, "    pop {}", reg),
            Inst::Add(dst, src) => write!(f, "    add {}, {}", dst, src),
            Inst::Sub(dst, src) => write!(f, "    sub {}, {}", dst, src),
            Inst::Imul(dst, src) => write!(f, "    imul {}, {}", dst, src),
            Inst::Cdq => f.write_str("    cdq"),
            Inst::Idiv(reg) => write!(f, "    idiv {}", reg),
            Inst::Cmp(lhs, rhs) => write!(f, "    cmp {}, {}", lhs, rhs),
            Inst::Set(cond, reg) => write!(f, "    set{} {}", cond, reg),
            Inst::Jmp(target) => write!(f, "    jmp {}", target),
            Inst::Jcc(cond, target) => write!(f, "    j{} {}", cond, target),
            Inst::Call(target) => write!(f, "    call {}", target),
            Inst::Ret => f.write_str("    ret"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataItem {
    /// Run of printable ASCII, rendered inside quotes
    Text(String),
    Byte(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataBody {
    Bytes(Vec<DataItem>),
    Zeroed(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDef {
    pub label: String,
    pub body: DataBody,
}

impl DataDef {
    /// Zero-terminated string constant from raw literal text
    pub fn string(label: impl Into<String>, raw: &str) -> Self {
        Self {
            label: label.into(),
            body: DataBody::Bytes(encode_string(raw)),
        }
    }

    pub fn zeroed(label: impl Into<String>, size: usize) -> Self {
        Self {
            label: label.into(),
            body: DataBody::Zeroed(size),
        }
    }

    /// Decoded bytes, terminator included
    pub fn bytes(&self) -> Vec<u8> {
        match &self.body {
            DataBody::Bytes(items) => items
                .iter()
                .flat_map(|item| match item {
                    DataItem::Text(s) => s.as_bytes().to_vec(),
                    DataItem::Byte(b) => vec![*b],
                })
                .collect(),
            DataBody::Zeroed(size) => vec![0; *size],
        }
    }
}

impl fmt::Display for DataDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            DataBody::Zeroed(size) => write!(f, "{}: times {} db 0", self.label, size),
            DataBody::Bytes(items) => {
                write!(f, "{}: db ", self.label)?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match item {
                        DataItem::Text(s) => write!(f, "\"{}\"", s)?,
                        DataItem::Byte(b) => write!(f, "{}", b)?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Translate the escapes a literal may carry. Unknown escapes are kept
/// verbatim, backslash included.
pub fn unescape(raw: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('r') => out.push(b'\r'),
            Some('"') => out.push(b'"'),
            Some('\\') => out.push(b'\\'),
            Some(other) => {
                out.push(b'\\');
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => out.push(b'\\'),
        }
    }
    out
}

/// Split decoded bytes into quoted printable runs and numeric bytes, then
/// append the terminator.
pub fn encode_string(raw: &str) -> Vec<DataItem> {
    let mut items = Vec::new();
    let mut run = String::new();
    for byte in unescape(raw) {
        if (0x20..0x7f).contains(&byte) && byte != b'"' {
            run.push(byte as char);
        } else {
            if !run.is_empty() {
                items.push(DataItem::Text(std::mem::take(&mut run)));
            }
            items.push(DataItem::Byte(byte));
        }
    }
    if !run.is_empty() {
        items.push(DataItem::Text(run));
    }
    items.push(DataItem::Byte(0));
    items
}
