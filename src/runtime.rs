//! Kernel runtime preamble
//!
//! Every program is assembled together with `runtime/kernel.asm`, which owns
//! the multiboot entry point and the routines built-ins call into.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use crate::error::{RachetError, RachetResult};

pub const KERNEL_ASM: &str = include_str!("runtime/kernel.asm");

pub const ENTRY: &str = "_start";
pub const PRINT_THUNK: &str = "print_thunk";
pub const PRINT_NUMBER_THUNK: &str = "print_number_thunk";
pub const INPUT_THUNK: &str = "input_thunk";
pub const STR_EQ: &str = "str_eq";
pub const OS_SHUTDOWN: &str = "os_shutdown";
pub const OS_REBOOT: &str = "os_reboot";
pub const OS_HALT: &str = "os_halt";

/// Every symbol the preamble defines, labels and `equ` constants alike
pub const RUNTIME_SYMBOLS: &[&str] = &[
    ENTRY,
    PRINT_THUNK,
    PRINT_NUMBER_THUNK,
    INPUT_THUNK,
    STR_EQ,
    OS_SHUTDOWN,
    OS_REBOOT,
    OS_HALT,
    "multiboot_header",
    "vga_clear",
    "vga_scroll",
    "vga_putc",
    "vga_cursor",
    "scancode_ascii",
    "kernel_stack_bottom",
    "kernel_stack_top",
    "MULTIBOOT_MAGIC",
    "MULTIBOOT_FLAGS",
    "MULTIBOOT_CHECKSUM",
    "VGA_BASE",
    "VGA_COLS",
    "VGA_ROWS",
    "VGA_ATTR",
    "VGA_BLANK",
    "KBD_STATUS",
    "KBD_DATA",
    "SCANCODE_TABLE_LEN",
];

pub fn is_runtime_symbol(name: &str) -> bool {
    RUNTIME_SYMBOLS.contains(&name)
}

/// The embedded preamble, or a replacement read from `path`
pub fn load_preamble(path: Option<&Path>) -> RachetResult<Cow<'static, str>> {
    match path {
        None => Ok(Cow::Borrowed(KERNEL_ASM)),
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| {
                RachetError::config(format!("cannot read kernel preamble {}: {}", path.display(), e))
            })?;
            Ok(Cow::Owned(text))
        }
    }
}
