use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_source(dir: &TempDir, name: &str, source: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, source).unwrap();
    path
}

#[test]
fn test_help_flag() {
    let mut cmd = Command::cargo_bin("glc").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("NASM assembly"));
}

#[test]
fn test_missing_input_file() {
    let mut cmd = Command::cargo_bin("glc").unwrap();
    cmd.arg("nonexistent.g");
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error reading file"));
}

#[test]
fn test_compile_to_default_output() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "answer.g", "fn main() -> i32 { return 42; }");

    let mut cmd = Command::cargo_bin("glc").unwrap();
    cmd.arg(&input);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Compiled"));

    let asm = fs::read_to_string(dir.path().join("answer.asm")).unwrap();
    assert!(asm.starts_with("BITS 32\nglobal main\nextern memcpy\n"));
    assert!(asm.contains("main:\n    push ebp\n    mov ebp, esp\n"));
    assert!(asm.contains("    push DWORD 42\n    pop eax\n    jmp .__return\n"));
}

#[test]
fn test_compile_to_explicit_output() {
    let dir = TempDir::new().unwrap();
    let input = write_source(
        &dir,
        "hello.g",
        r#"extern fn puts(s: u8*) -> i32;
           fn main() -> i32 {
               puts("Hello, G\n");
               return 0;
           }"#,
    );
    let output = dir.path().join("out.s");

    let mut cmd = Command::cargo_bin("glc").unwrap();
    cmd.arg(&input).arg("-o").arg(&output);
    cmd.assert().success();

    let asm = fs::read_to_string(&output).unwrap();
    assert!(asm.contains("extern puts\n"));
    assert!(asm.contains("__str0: db \"Hello, G\", 0xA, 0\n"));
    assert!(asm.contains("    push __str0\n    call puts\n"));
    assert!(!dir.path().join("hello.asm").exists());
}

#[test]
fn test_lex_only_flag() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "lex.g", "fn main() { return; }");

    let mut cmd = Command::cargo_bin("glc").unwrap();
    cmd.arg("--lex-only").arg(&input);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1:1 fn"))
        .stdout(predicate::str::contains("Identifier(main)"))
        .stdout(predicate::str::contains("EOF"));

    assert!(!dir.path().join("lex.asm").exists());
}

#[test]
fn test_parse_only_flag() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "parse.g", "fn main() { var x: i32 = 1; }");

    let mut cmd = Command::cargo_bin("glc").unwrap();
    cmd.arg("--parse-only").arg(&input);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Program"))
        .stdout(predicate::str::contains("Function(main)"))
        .stdout(predicate::str::contains("VarDecl(x: i32)"));
}

#[test]
fn test_syntax_error_shows_source_context() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "broken.g", "fn main() {\n    return 42\n}\n");

    let mut cmd = Command::cargo_bin("glc").unwrap();
    cmd.arg(&input);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Expected ';', got '}'"))
        .stderr(predicate::str::contains("broken.g:3:1"))
        .stderr(predicate::str::contains("return 42"));

    assert!(!dir.path().join("broken.asm").exists());
}

#[test]
fn test_backend_errors_are_all_reported() {
    let dir = TempDir::new().unwrap();
    let input = write_source(
        &dir,
        "bad.g",
        "fn one() { y = 1; }
         fn two() { var v: Vec; }
         fn main() { }",
    );

    let mut cmd = Command::cargo_bin("glc").unwrap();
    cmd.arg(&input);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("undefined symbol 'y'"))
        .stderr(predicate::str::contains("unknown type 'Vec'"))
        .stderr(predicate::str::contains("in 'two'"));

    assert!(!dir.path().join("bad.asm").exists());
}

#[test]
fn test_verbose_logging_goes_to_stderr() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "log.g", "fn main() { var x: i32 = 1; }");

    let mut cmd = Command::cargo_bin("glc").unwrap();
    cmd.arg("-vv").arg(&input);
    cmd.assert()
        .success()
        .stderr(predicate::str::contains("placed symbol"))
        .stderr(predicate::str::contains("generated function"));
}
