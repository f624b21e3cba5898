//! End-to-end compilation scenarios, source text in, assembly sections out

use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use rachet::codegen::asm::{Inst, Operand};
use rachet::{compile, CrateTarget, Generated, RachetError};

fn text_lines(generated: &Generated) -> Vec<String> {
    generated.text.iter().map(|i| i.to_string().trim().to_string()).collect()
}

/// Labels minted by the generator, with how often each is defined
fn minted_definitions(generated: &Generated) -> HashMap<String, usize> {
    let mut defined = HashMap::new();
    for label in generated.text.iter().filter_map(Inst::defines).filter(|l| l.starts_with("__rx_")) {
        *defined.entry(label.to_string()).or_insert(0) += 1;
    }
    defined
}

fn referenced(generated: &Generated, label: &str) -> bool {
    generated.text.iter().any(|inst| inst.references() == Some(label))
}

#[test]
fn hello_on_bin() {
    let out = compile(r#"use crate::bin; fn main() { print("Hello"); }"#).unwrap();
    assert_eq!(out.target, CrateTarget::Bin);
    assert_eq!(out.data.len(), 1);

    let (label, def) = out.data.first().unwrap();
    assert_eq!(def.bytes(), b"Hello\0".to_vec());

    let text = text_lines(&out);
    let push = text.iter().position(|l| *l == format!("push {}", label)).unwrap();
    assert_eq!(text[push + 1], "call print_thunk");
    assert_eq!(text[push + 2], "add esp, 4");
}

#[test]
fn multiplication_on_iso() {
    let out = compile("use crate::iso; fn main() { let x = 5 * 5; print(x); }").unwrap();
    assert_eq!(out.target, CrateTarget::Iso);

    let text = text_lines(&out);
    let imul = text.iter().position(|l| l == "imul eax, ebx").unwrap();
    let store = text.iter().position(|l| l == "mov [ebp-4], eax").unwrap();
    assert!(imul < store);
    assert!(text.contains(&"sub esp, 4".to_string()));
    assert!(text.contains(&"push dword [ebp-4]".to_string()));
    assert!(text.contains(&"call print_number_thunk".to_string()));
}

#[test]
fn if_else_uses_two_labels() {
    let out = compile(r#"fn main() { if (1 == 1) { print("yes"); } else { print("no"); } }"#).unwrap();
    let control: Vec<_> = minted_definitions(&out)
        .into_keys()
        .filter(|l| l.starts_with("__rx_else_") || l.starts_with("__rx_endif_"))
        .collect();
    assert_eq!(control.len(), 2);

    let text = text_lines(&out);
    let yes_label = out
        .data
        .values()
        .find(|d| d.bytes() == b"yes\0")
        .map(|d| d.label.clone())
        .unwrap();
    let yes = text.iter().position(|l| *l == format!("push {}", yes_label)).unwrap();
    let jmp = text.iter().position(|l| l.starts_with("jmp __rx_endif_")).unwrap();
    assert!(yes < jmp);
}

#[test]
fn undeclared_variable_is_reported() {
    let err = compile("fn main() { let a = b; }").unwrap_err();
    match err {
        RachetError::UndefinedVariable { name, span } => {
            assert_eq!(name, "b");
            assert_eq!(span.start, 20);
        }
        other => panic!("expected undefined variable, got {other:?}"),
    }
}

#[test]
fn locals_do_not_leak_between_functions() {
    let err = compile("fn helper() { let secret = 1; } fn main() { print(secret); }").unwrap_err();
    assert!(matches!(err, RachetError::UndefinedVariable { ref name, .. } if name == "secret"));
}

#[test]
fn frames_are_sized_per_function() {
    let out = compile("fn two() { let a = 1; let b = 2; } fn main() { let c = 3; two(); }").unwrap();
    let reserves: Vec<_> = text_lines(&out).into_iter().filter(|l| l.starts_with("sub esp,")).collect();
    assert_eq!(reserves, vec!["sub esp, 8", "sub esp, 4"]);
}

#[test]
fn every_minted_label_defined_once_and_used() {
    let source = r#"
        fn check(n) {
            if (n == 1 || n == 2) { print("small"); } else if (n != 3 && not n) { print("zero"); }
        }
        fn main() {
            let a = input("> ");
            match a {
                "x" => { check(1); },
                "y" => { check(2); }
            }
            let b = input();
            print(b);
            check(3);
        }
    "#;
    let out = compile(source).unwrap();

    for (label, count) in minted_definitions(&out) {
        assert_eq!(count, 1, "{label} defined {count} times");
        assert!(referenced(&out, &label), "{label} is never referenced");
    }
    for label in out.data.keys() {
        assert!(referenced(&out, label), "data label {label} is never referenced");
    }
}

#[test]
fn shadowing_allocates_fresh_slot() {
    let out = compile("fn main() { let x = 1; let x = x + 1; print(x); }").unwrap();
    let text = text_lines(&out);
    assert!(text.contains(&"mov eax, [ebp-4]".to_string()));
    assert!(text.contains(&"mov [ebp-8], eax".to_string()));
    assert!(text.contains(&"push dword [ebp-8]".to_string()));
}

#[test]
fn generation_is_deterministic() {
    let source = fs::read_to_string("demos/shell.rx").unwrap();
    let first = compile(&source).unwrap();
    let second = compile(&source).unwrap();
    assert_eq!(first.text_asm(), second.text_asm());
    assert_eq!(first.data_asm(), second.data_asm());
}

#[test]
fn user_call_pushes_string_labels() {
    let out = compile(r#"fn greet(who: str) { print(who); } fn main() { greet("bob"); }"#).unwrap();
    let call = out.text.iter().position(|i| *i == Inst::Call("$greet".into())).unwrap();
    assert!(matches!(&out.text[call - 1], Inst::Push(Operand::Label(l)) if l.starts_with("__rx_str_")));

    let text = text_lines(&out);
    let arg = text.iter().position(|l| l == "push dword [ebp+8]").unwrap();
    assert_eq!(text[arg + 1], "call print_thunk");
    assert!(!text.contains(&"call print_number_thunk".to_string()));
}

#[test]
fn demos_compile_cleanly() {
    let mut seen = 0;
    for entry in fs::read_dir(Path::new("demos")).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) != Some("rx") {
            continue;
        }
        let source = fs::read_to_string(&path).unwrap();
        let out = compile(&source).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
        assert!(out.warnings.is_empty(), "{}: {:?}", path.display(), out.warnings);
        seen += 1;
    }
    assert!(seen >= 3);
}
