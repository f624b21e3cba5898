//! Rachet Code Generation - AST to 32-bit NASM
//!
//! A single tree walk. Expressions leave their value in `eax`, `ebx` is the
//! only scratch register, and every intermediate lives on the stack.

pub mod asm;
pub mod builtins;
pub mod context;

use indexmap::IndexMap;
use std::mem;
use tracing::{debug, warn};

use crate::ast::*;
use crate::error::{RachetError, RachetResult, Warning};
use crate::runtime;
use asm::{Cond, DataDef, Inst, Operand, Reg};
use builtins::Builtin;
use context::{Frame, GenContext, SlotKind, SLOT_SIZE};

/// Both output sections of one compilation unit
#[derive(Debug, Clone)]
pub struct Generated {
    pub target: CrateTarget,
    pub data: IndexMap<String, DataDef>,
    pub text: Vec<Inst>,
    pub warnings: Vec<Warning>,
}

impl Generated {
    pub fn data_asm(&self) -> String {
        render_lines(self.data.values())
    }

    pub fn text_asm(&self) -> String {
        render_lines(self.text.iter())
    }
}

fn render_lines<T: std::fmt::Display>(items: impl Iterator<Item = T>) -> String {
    let mut out = String::new();
    for item in items {
        out.push_str(&item.to_string());
        out.push('\n');
    }
    out
}

pub fn generate(program: &Program) -> RachetResult<Generated> {
    let mut ctx = GenContext::new();
    declare_functions(&mut ctx, program)?;

    for func in program.functions() {
        gen_function(&mut ctx, func)?;
    }

    debug!(
        functions = ctx.functions.len(),
        instructions = ctx.text.len(),
        constants = ctx.data.len(),
        labels = ctx.labels.minted(),
        "code generation finished"
    );

    Ok(Generated {
        target: program.target(),
        data: ctx.data,
        text: ctx.text,
        warnings: ctx.warnings,
    })
}

fn declare_functions(ctx: &mut GenContext, program: &Program) -> RachetResult<()> {
    for func in program.functions() {
        let name = func.name.as_str();
        if name.starts_with("__rx_") || runtime::is_runtime_symbol(name) || Builtin::from_name(name).is_some() {
            return Err(RachetError::codegen(
                format!("function name `{}` is reserved", name),
                func.span,
            ));
        }
        if !ctx.functions.insert(func.name.clone()) {
            return Err(RachetError::codegen(
                format!("function `{}` is defined more than once", name),
                func.span,
            ));
        }
    }

    if !ctx.functions.contains("main") {
        return Err(RachetError::codegen("program has no `main` function", program.span));
    }
    Ok(())
}

/// User functions are written with NASM's `$` prefix so names such as `add`
/// or `eax` read as identifiers. The object symbol is still the bare name.
pub fn function_symbol(name: &str) -> String {
    format!("${}", name)
}

fn gen_function(ctx: &mut GenContext, func: &FunctionDecl) -> RachetResult<()> {
    debug!(name = %func.name, params = func.params.len(), "generating function");
    let saved = mem::replace(&mut ctx.frame, Frame::with_params(&func.params));
    let symbol = function_symbol(&func.name);

    ctx.emit_all([
        Inst::Global(symbol.clone()),
        Inst::Label(symbol),
        Inst::Push(Reg::Ebp.into()),
        Inst::Mov(Reg::Ebp.into(), Reg::Esp.into()),
    ]);
    // Frame size is only known after the body
    let reserve = ctx.text.len();
    ctx.emit(Inst::Sub(Reg::Esp.into(), Operand::Imm(0)));

    let body = gen_block(ctx, &func.body);

    match ctx.frame.size() {
        0 => {
            ctx.text.remove(reserve);
        }
        size => ctx.text[reserve] = Inst::Sub(Reg::Esp.into(), Operand::Imm(size)),
    }
    ctx.emit_all([
        Inst::Mov(Reg::Esp.into(), Reg::Ebp.into()),
        Inst::Pop(Reg::Ebp),
        Inst::Ret,
    ]);

    ctx.frame = saved;
    body
}

fn gen_block(ctx: &mut GenContext, block: &Block) -> RachetResult<()> {
    for stmt in &block.stmts {
        gen_stmt(ctx, stmt)?;
    }
    Ok(())
}

fn gen_stmt(ctx: &mut GenContext, stmt: &Stmt) -> RachetResult<()> {
    match stmt {
        Stmt::Let { name, ty, value, .. } => {
            gen_expr(ctx, value)?;
            let kind = SlotKind::from_annotation(ty.as_deref()).unwrap_or_else(|| slot_kind(ctx, value));
            let offset = ctx.frame.declare(name, kind);
            ctx.emit(Inst::Mov(Operand::frame(offset), Reg::Eax.into()));
            Ok(())
        }
        Stmt::If(stmt) => gen_if(ctx, stmt),
        Stmt::Match { scrutinee, arms, .. } => gen_match(ctx, scrutinee, arms),
        Stmt::Call(call) => gen_call(ctx, call),
    }
}

/// Strings stay strings through `let`; everything else prints as a number.
fn slot_kind(ctx: &GenContext, value: &Expr) -> SlotKind {
    match value {
        Expr::Str { .. } => SlotKind::Str,
        Expr::Call(call) if Builtin::from_name(&call.callee) == Some(Builtin::Input) => SlotKind::Str,
        Expr::Variable { name, .. } => ctx.frame.lookup(name).map_or(SlotKind::Int, |slot| slot.kind),
        _ => SlotKind::Int,
    }
}

fn gen_if(ctx: &mut GenContext, stmt: &IfStmt) -> RachetResult<()> {
    gen_expr(ctx, &stmt.condition)?;
    let else_label = ctx.labels.mint("else");
    let end_label = ctx.labels.mint("endif");

    ctx.emit(Inst::Cmp(Reg::Eax.into(), Operand::Imm(0)));
    ctx.emit(Inst::Jcc(Cond::E, else_label.clone()));
    gen_block(ctx, &stmt.then_branch)?;
    ctx.emit(Inst::Jmp(end_label.clone()));
    ctx.emit(Inst::Label(else_label));

    match &stmt.else_branch {
        Some(ElseBranch::Else(block)) => gen_block(ctx, block)?,
        Some(ElseBranch::ElseIf(nested)) => gen_if(ctx, nested)?,
        None => {}
    }

    ctx.emit(Inst::Label(end_label));
    Ok(())
}

fn gen_match(ctx: &mut GenContext, scrutinee: &Expr, arms: &[MatchArm]) -> RachetResult<()> {
    gen_expr(ctx, scrutinee)?;
    if arms.is_empty() {
        return Ok(());
    }

    let end_label = ctx.labels.mint("match_end");
    ctx.emit(Inst::Push(Reg::Eax.into()));

    for arm in arms {
        let case = ctx.string_constant("case", &arm.pattern);
        let next = ctx.labels.mint("next");
        // [esp] holds the scrutinee; after pushing the case it is at [esp+4]
        ctx.emit_all([
            Inst::Push(Operand::label(case)),
            Inst::Push(Operand::Mem { base: Reg::Esp, disp: SLOT_SIZE }),
            Inst::Call(runtime::STR_EQ.to_string()),
            Inst::Add(Reg::Esp.into(), Operand::Imm(2 * SLOT_SIZE)),
            Inst::Cmp(Reg::Eax.into(), Operand::Imm(0)),
            Inst::Jcc(Cond::E, next.clone()),
        ]);
        gen_block(ctx, &arm.body)?;
        ctx.emit(Inst::Jmp(end_label.clone()));
        ctx.emit(Inst::Label(next));
    }

    ctx.emit(Inst::Label(end_label));
    ctx.emit(Inst::Add(Reg::Esp.into(), Operand::Imm(SLOT_SIZE)));
    Ok(())
}

fn gen_expr(ctx: &mut GenContext, expr: &Expr) -> RachetResult<()> {
    match expr {
        Expr::Number { value, .. } => ctx.emit(Inst::Mov(Reg::Eax.into(), Operand::Imm(*value))),
        Expr::Str { value, .. } => {
            let label = ctx.string_constant("str", value);
            ctx.emit(Inst::Mov(Reg::Eax.into(), Operand::label(label)));
        }
        Expr::Variable { name, span } => {
            let slot = ctx
                .frame
                .lookup(name)
                .ok_or_else(|| RachetError::undefined_variable(name.clone(), *span))?;
            ctx.emit(Inst::Mov(Reg::Eax.into(), Operand::frame(slot.offset)));
        }
        Expr::Binary { left, op, right, .. } => gen_binary(ctx, left, *op, right)?,
        Expr::Unary { op: UnaryOp::Not, operand, .. } => {
            gen_expr(ctx, operand)?;
            ctx.emit_all([
                Inst::Cmp(Reg::Eax.into(), Operand::Imm(0)),
                Inst::Set(Cond::E, Reg::Al),
                Inst::Movzx(Reg::Eax, Reg::Al),
            ]);
        }
        Expr::Call(call) => gen_call(ctx, call)?,
    }
    Ok(())
}

fn gen_binary(ctx: &mut GenContext, left: &Expr, op: BinaryOp, right: &Expr) -> RachetResult<()> {
    gen_expr(ctx, left)?;
    ctx.emit(Inst::Push(Reg::Eax.into()));
    gen_expr(ctx, right)?;
    ctx.emit(Inst::Mov(Reg::Ebx.into(), Reg::Eax.into()));
    ctx.emit(Inst::Pop(Reg::Eax));

    match op {
        BinaryOp::Add => ctx.emit(Inst::Add(Reg::Eax.into(), Reg::Ebx.into())),
        BinaryOp::Sub => ctx.emit(Inst::Sub(Reg::Eax.into(), Reg::Ebx.into())),
        BinaryOp::Mul => ctx.emit(Inst::Imul(Reg::Eax, Reg::Ebx)),
        BinaryOp::Div => ctx.emit_all([Inst::Cdq, Inst::Idiv(Reg::Ebx)]),
        BinaryOp::Eq | BinaryOp::Ne => {
            let cond = if op == BinaryOp::Eq { Cond::E } else { Cond::Ne };
            ctx.emit_all([
                Inst::Cmp(Reg::Eax.into(), Reg::Ebx.into()),
                Inst::Set(cond, Reg::Al),
                Inst::Movzx(Reg::Eax, Reg::Al),
            ]);
        }
        BinaryOp::And => {
            let is_false = ctx.labels.mint("and_false");
            let end = ctx.labels.mint("and_end");
            ctx.emit_all([
                Inst::Cmp(Reg::Eax.into(), Operand::Imm(0)),
                Inst::Jcc(Cond::E, is_false.clone()),
                Inst::Cmp(Reg::Ebx.into(), Operand::Imm(0)),
                Inst::Jcc(Cond::E, is_false.clone()),
                Inst::Mov(Reg::Eax.into(), Operand::Imm(1)),
                Inst::Jmp(end.clone()),
                Inst::Label(is_false),
                Inst::Mov(Reg::Eax.into(), Operand::Imm(0)),
                Inst::Label(end),
            ]);
        }
        BinaryOp::Or => {
            let is_true = ctx.labels.mint("or_true");
            let end = ctx.labels.mint("or_end");
            ctx.emit_all([
                Inst::Cmp(Reg::Eax.into(), Operand::Imm(0)),
                Inst::Jcc(Cond::Ne, is_true.clone()),
                Inst::Cmp(Reg::Ebx.into(), Operand::Imm(0)),
                Inst::Jcc(Cond::Ne, is_true.clone()),
                Inst::Mov(Reg::Eax.into(), Operand::Imm(0)),
                Inst::Jmp(end.clone()),
                Inst::Label(is_true),
                Inst::Mov(Reg::Eax.into(), Operand::Imm(1)),
                Inst::Label(end),
            ]);
        }
    }
    Ok(())
}

fn gen_call(ctx: &mut GenContext, call: &Call) -> RachetResult<()> {
    if let Some(builtin) = Builtin::from_name(&call.callee) {
        return builtin.emit(ctx, call);
    }
    if !ctx.functions.contains(&call.callee) {
        return Err(RachetError::codegen(
            format!("call to undefined function `{}`", call.callee),
            call.span,
        ));
    }

    let mut operands = Vec::with_capacity(call.args.len());
    for arg in &call.args {
        match argument_operand(ctx, arg) {
            Ok(operand) => operands.push(operand),
            Err(err) => {
                let warning = Warning::unsupported(
                    format!("argument to `{}` replaced with 0: {}", call.callee, err),
                    arg.span(),
                );
                warn!("{}", warning);
                ctx.warnings.push(warning);
                operands.push(Operand::Imm(0));
            }
        }
    }
    emit_call(ctx, &function_symbol(&call.callee), operands);
    Ok(())
}

fn argument_operand(ctx: &mut GenContext, arg: &Argument) -> RachetResult<Operand> {
    match arg {
        Argument::Number { value, .. } => Ok(Operand::Imm(*value)),
        Argument::Str { value, .. } => Ok(Operand::label(ctx.string_constant("str", value))),
        Argument::Ident { name, span } => ctx
            .frame
            .lookup(name)
            .map(|slot| Operand::frame(slot.offset))
            .ok_or_else(|| RachetError::undefined_variable(name.clone(), *span)),
    }
}

/// cdecl call: push right to left, caller pops
pub(crate) fn emit_call(ctx: &mut GenContext, target: &str, args: Vec<Operand>) {
    let count = args.len() as i32;
    for arg in args.into_iter().rev() {
        ctx.emit(Inst::Push(arg));
    }
    ctx.emit(Inst::Call(target.to_string()));
    if count > 0 {
        ctx.emit(Inst::Add(Reg::Esp.into(), Operand::Imm(SLOT_SIZE * count)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn gen(source: &str) -> RachetResult<Generated> {
        generate(&parse(&tokenize(source).unwrap()).unwrap())
    }

    fn lines(generated: &Generated) -> Vec<String> {
        generated.text.iter().map(|i| i.to_string().trim().to_string()).collect()
    }

    #[test]
    fn test_prologue_reserves_frame() {
        let out = gen("fn main() { let a = 1; let b = 2; }").unwrap();
        assert_eq!(
            lines(&out),
            vec![
                "global $main",
                "$main:",
                "push ebp",
                "mov ebp, esp",
                "sub esp, 8",
                "mov eax, 1",
                "mov [ebp-4], eax",
                "mov eax, 2",
                "mov [ebp-8], eax",
                "mov esp, ebp",
                "pop ebp",
                "ret",
            ]
        );
    }

    #[test]
    fn test_params_read_above_ebp() {
        let out = gen("fn show(a, b) { print(b); } fn main() { show(1, 2); }").unwrap();
        let text = lines(&out);
        assert!(text.contains(&"push dword [ebp+12]".to_string()));
        let call_at = text.iter().position(|l| l == "call $show").unwrap();
        assert_eq!(&text[call_at - 2..=call_at + 1], ["push 2", "push 1", "call $show", "add esp, 8"]);
    }

    #[test]
    fn test_mnemonic_function_names_escaped() {
        let out = gen("fn add(a, b) { print(a); } fn eax() { } fn main() { add(1, 2); eax(); }").unwrap();
        let text = lines(&out);
        for expected in ["global $add", "$add:", "call $add", "global $eax", "$eax:", "call $eax"] {
            assert!(text.contains(&expected.to_string()), "missing `{expected}`");
        }
        assert!(!text.iter().any(|l| l == "add:" || l == "call add" || l == "eax:"));
        assert!(text.contains(&"call print_number_thunk".to_string()));
    }

    #[test]
    fn test_empty_frame_skips_reserve() {
        let out = gen("fn main() { print(1); }").unwrap();
        let text = lines(&out);
        assert!(!text.iter().any(|l| l.starts_with("sub esp")));
        assert_eq!(&text[..4], ["global $main", "$main:", "push ebp", "mov ebp, esp"]);
    }

    #[test]
    fn test_str_annotation_prints_as_string() {
        let out = gen(r#"fn greet(who: str, n: i32) { print(who); print(n); } fn main() { greet("bob", 3); }"#)
            .unwrap();
        let text = lines(&out);
        let who = text.iter().position(|l| l == "push dword [ebp+8]").unwrap();
        assert_eq!(text[who + 1], "call print_thunk");
        let n = text.iter().position(|l| l == "push dword [ebp+12]").unwrap();
        assert_eq!(text[n + 1], "call print_number_thunk");
    }

    #[test]
    fn test_let_annotation_overrides_inferred_kind() {
        let out = gen("fn name() { } fn main() { let s: String = name(); print(s); let n: i32 = input(); print(n); }")
            .unwrap();
        let text = lines(&out);
        let s = text.iter().position(|l| l == "push dword [ebp-4]").unwrap();
        assert_eq!(text[s + 1], "call print_thunk");
        let n = text.iter().position(|l| l == "push dword [ebp-8]").unwrap();
        assert_eq!(text[n + 1], "call print_number_thunk");
    }

    #[test]
    fn test_division_sign_extends() {
        let out = gen("fn main() { let q = 7 / 2; }").unwrap();
        let text = lines(&out);
        let div = text.iter().position(|l| l == "idiv ebx").unwrap();
        assert_eq!(text[div - 1], "cdq");
    }

    #[test]
    fn test_not_normalizes() {
        let out = gen("fn main() { let f = not 3; }").unwrap();
        let text = lines(&out);
        assert!(text.windows(3).any(|w| w == ["cmp eax, 0", "sete al", "movzx eax, al"]));
    }

    #[test]
    fn test_logical_and_evaluates_both_sides() {
        let out = gen("fn main() { let a = 0 && 1; }").unwrap();
        let text = lines(&out);
        assert!(text.contains(&"mov eax, 1".to_string()));
        assert!(text.contains(&"__rx_and_false_0:".to_string()));
        assert!(text.contains(&"__rx_and_end_1:".to_string()));
    }

    #[test]
    fn test_match_layout() {
        let out = gen(r#"fn main() { let c = input(); match c { "a" => { print("A"); } "b" => { print("B"); } } }"#)
            .unwrap();
        let text = lines(&out);
        assert_eq!(text.iter().filter(|l| *l == "call str_eq").count(), 2);
        assert_eq!(text.iter().filter(|l| *l == "push dword [esp+4]").count(), 2);
        let end = text.iter().position(|l| l.starts_with("__rx_match_end_")).unwrap();
        assert_eq!(text[end + 1], "add esp, 4");
        let case_bytes: Vec<_> = out
            .data
            .values()
            .filter(|d| d.label.starts_with("__rx_case_"))
            .map(|d| d.bytes())
            .collect();
        assert_eq!(case_bytes, vec![b"a\0".to_vec(), b"b\0".to_vec()]);
    }

    #[test]
    fn test_input_variable_prints_as_string() {
        let out = gen(r#"fn main() { let name = input("? "); let again = name; print(again); }"#).unwrap();
        let text = lines(&out);
        let last_print = text.iter().rposition(|l| l == "push dword [ebp-8]").unwrap();
        assert_eq!(text[last_print + 1], "call print_thunk");
        assert!(!text.contains(&"call print_number_thunk".to_string()));
    }

    #[test]
    fn test_undefined_variable() {
        let err = gen("fn main() { let y = x + 1; }").unwrap_err();
        assert!(matches!(err, RachetError::UndefinedVariable { ref name, .. } if name == "x"));
    }

    #[test]
    fn test_unresolved_user_argument_warns() {
        let out = gen("fn f(a) { } fn main() { f(missing); }").unwrap();
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].kind, crate::error::WarningKind::UnsupportedConstruct);
        let text = lines(&out);
        let call_at = text.iter().position(|l| l == "call $f").unwrap();
        assert_eq!(text[call_at - 1], "push 0");
    }

    #[test]
    fn test_duplicate_function() {
        let err = gen("fn f() { } fn f() { } fn main() { }").unwrap_err();
        assert!(matches!(err, RachetError::Codegen { .. }));
    }

    #[test]
    fn test_runtime_name_reserved() {
        for name in ["print_thunk", "str_eq", "print", "__rx_x"] {
            let err = gen(&format!("fn {}() {{ }} fn main() {{ }}", name)).unwrap_err();
            assert!(matches!(err, RachetError::Codegen { .. }), "{name} should be reserved");
        }
    }

    #[test]
    fn test_missing_main() {
        assert!(matches!(gen("fn helper() { }"), Err(RachetError::Codegen { .. })));
    }

    #[test]
    fn test_call_to_unknown_function() {
        assert!(matches!(gen("fn main() { nope(); }"), Err(RachetError::Codegen { .. })));
    }

    #[test]
    fn test_forward_call() {
        assert!(gen("fn main() { later(); } fn later() { }").is_ok());
    }

    #[test]
    fn test_data_asm_rendering() {
        let out = gen(r#"fn main() { print("Hi\n"); }"#).unwrap();
        assert_eq!(out.data_asm(), "__rx_str_0: db \"Hi\", 10, 0\n");
    }
}
