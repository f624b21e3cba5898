//! Built-in calls with hand-written lowering

use super::asm::{Inst, Operand};
use super::context::{GenContext, SlotKind};
use super::emit_call;
use crate::ast::{Argument, Call};
use crate::error::{RachetError, RachetResult};
use crate::runtime;

/// Bytes reserved for each `input(...)` call site
pub const INPUT_BUFFER_SIZE: usize = 256;

/// Newline printed after every number
pub const NEWLINE_LABEL: &str = "__rx_newline";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Input,
    Os,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "print" => Some(Builtin::Print),
            "input" => Some(Builtin::Input),
            "os" => Some(Builtin::Os),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Input => "input",
            Builtin::Os => "os",
        }
    }

    pub fn emit(self, ctx: &mut GenContext, call: &Call) -> RachetResult<()> {
        match self {
            Builtin::Print => emit_print(ctx, call),
            Builtin::Input => emit_input(ctx, call),
            Builtin::Os => emit_os(ctx, call),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsAction {
    Shutdown,
    Reboot,
    Halt,
}

impl OsAction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "shutdown" => Some(OsAction::Shutdown),
            "reboot" => Some(OsAction::Reboot),
            "halt" => Some(OsAction::Halt),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            OsAction::Shutdown => runtime::OS_SHUTDOWN,
            OsAction::Reboot => runtime::OS_REBOOT,
            OsAction::Halt => runtime::OS_HALT,
        }
    }
}

fn emit_print(ctx: &mut GenContext, call: &Call) -> RachetResult<()> {
    let [arg] = call.args.as_slice() else {
        return Err(RachetError::codegen(
            format!("`print` takes exactly one argument, got {}", call.args.len()),
            call.span,
        ));
    };

    match arg {
        Argument::Str { value, .. } => {
            let label = ctx.string_constant("str", value);
            emit_call(ctx, runtime::PRINT_THUNK, vec![Operand::label(label)]);
        }
        Argument::Number { value, .. } => print_number(ctx, Operand::Imm(*value)),
        Argument::Ident { name, span } => {
            let slot = ctx
                .frame
                .lookup(name)
                .ok_or_else(|| RachetError::undefined_variable(name.clone(), *span))?;
            match slot.kind {
                SlotKind::Str => emit_call(ctx, runtime::PRINT_THUNK, vec![Operand::frame(slot.offset)]),
                SlotKind::Int => print_number(ctx, Operand::frame(slot.offset)),
            }
        }
    }
    Ok(())
}

fn print_number(ctx: &mut GenContext, value: Operand) {
    emit_call(ctx, runtime::PRINT_NUMBER_THUNK, vec![value]);
    let newline = ctx.shared_constant(NEWLINE_LABEL, r"\n");
    emit_call(ctx, runtime::PRINT_THUNK, vec![Operand::label(newline)]);
}

fn emit_input(ctx: &mut GenContext, call: &Call) -> RachetResult<()> {
    let prompt = match call.args.as_slice() {
        [] => None,
        [Argument::Str { value, .. }] => Some(value),
        _ => {
            return Err(RachetError::codegen(
                "`input` takes at most one argument, a string prompt",
                call.span,
            ))
        }
    };

    if let Some(prompt) = prompt {
        let label = ctx.string_constant("str", prompt);
        emit_call(ctx, runtime::PRINT_THUNK, vec![Operand::label(label)]);
    }

    let buffer = ctx.buffer(INPUT_BUFFER_SIZE);
    // input_thunk returns the buffer address in eax
    emit_call(
        ctx,
        runtime::INPUT_THUNK,
        vec![Operand::label(buffer), Operand::Imm(INPUT_BUFFER_SIZE as i32)],
    );
    Ok(())
}

fn emit_os(ctx: &mut GenContext, call: &Call) -> RachetResult<()> {
    let action = match call.args.as_slice() {
        [Argument::Ident { name, .. }] => OsAction::from_name(name),
        _ => None,
    };
    let Some(action) = action else {
        return Err(RachetError::codegen(
            "`os` expects exactly one of `shutdown`, `reboot` or `halt`",
            call.span,
        ));
    };
    ctx.emit(Inst::Call(action.symbol().to_string()));
    Ok(())
}
