use std::collections::BTreeMap;

use intscript::vm::{Program, TestingDevice};
use intscript::{asm, compiler};

fn statements(source: &str) -> Vec<asm::Statement> {
    let module = compiler::parse("test.is", source).unwrap();
    let mut modules = BTreeMap::new();
    modules.insert("test.is".to_string(), module);
    compiler::generate(&modules).unwrap()
}

fn compile(source: &str) -> Vec<i64> {
    asm::encode(&statements(source)).unwrap()
}

fn compile_error(source: &str) -> compiler::Error {
    let module = compiler::parse("test.is", source).unwrap();
    let mut modules = BTreeMap::new();
    modules.insert("test.is".to_string(), module);
    compiler::generate(&modules).unwrap_err()
}

fn parse_error(source: &str) -> String {
    match compiler::parse("test.is", source).unwrap_err() {
        compiler::Error::Syntax(e) => e.message,
        other => panic!("expected a syntax error, got {}", other),
    }
}

fn run_with(source: &str, input: &str) -> String {
    let image = compile(source);
    let mut device = TestingDevice::new(input);
    Program::new(&image).run(&mut device).unwrap();
    device.output_str()
}

fn run(source: &str) -> String {
    run_with(source, "")
}

#[test]
fn counts_through_the_alphabet() {
    let source = "\
function main() {
    var i = 0;
    while i < 5 {
        output 65 + i;
        i += 1;
    }
}
";
    assert_eq!(run(source), "ABCDE");
}

#[test]
fn echoes_until_the_terminator() {
    let source = "\
function main() {
    var c = input;
    while c != 0 {
        output c;
        c = input;
    }
}
";
    assert_eq!(run_with(source, "hi\0"), "hi");
}

#[test]
fn sums_two_inputs() {
    let source = "\
function main() {
    var a = input;
    var b = input;
    output a + b;
}
";
    let image = compile(source);
    let mut device = TestingDevice::new_raw(vec![2, 3]);
    Program::new(&image).run(&mut device).unwrap();
    assert_eq!(device.output, vec![5]);
}

#[test]
fn logical_and_short_circuits() {
    let source = "\
function f() {
    output 70;
    return 0;
}
function g() {
    output 71;
    return 1;
}
function main() {
    if f() && g() {
        output 63;
    } else {
        output 33;
    }
}
";
    assert_eq!(run(source), "F!");
}

#[test]
fn logical_or_short_circuits() {
    let source = "\
function g() {
    output 71;
    return 1;
}
function main() {
    if 1 || g() {
        output 33;
    }
}
";
    assert_eq!(run(source), "!");
}

#[test]
fn arrays_initialise_and_read_back() {
    let source = "\
function main() {
    var a[3];
    a[0] = 49;
    a[1] = 50;
    a[2] = 51;
    var i = 0;
    while i < 3 {
        output a[i];
        i += 1;
    }
}
";
    assert_eq!(run(source), "123");
}

#[test]
fn array_elements_take_compound_assignment() {
    let source = "\
function main() {
    var a[2];
    a[1] = 40;
    a[1] += 9;
    output a[1];
}
";
    assert_eq!(run(source), "1");
}

#[test]
fn break_and_continue_target_the_nearest_loop() {
    let source = "\
function main() {
    var i = 0;
    while 1 {
        i += 1;
        if i == 3 {
            continue;
        }
        if i == 5 {
            break;
        }
        output 48 + i;
    }
}
";
    assert_eq!(run(source), "124");
}

#[test]
fn halt_stops_without_returning() {
    let source = "\
function main() {
    output 88;
    halt;
    output 89;
}
";
    assert_eq!(run(source), "X");
}

#[test]
fn constants_fold_at_compile_time() {
    let source = "\
const N = 2 * 3 + 1;
function main() {
    output N + 58;
}
";
    assert_eq!(run(source), "A");
}

#[test]
fn string_literals_are_zero_terminated() {
    let source = "\
function main() {
    const s = \"AB\";
    var i = 0;
    while *(s + i) != 0 {
        output *(s + i);
        i += 1;
    }
}
";
    assert_eq!(run(source), "AB");
}

#[test]
fn globals_persist_across_calls() {
    let source = "\
var total;
function bump(n) {
    total = total + n;
    return 0;
}
function main() {
    bump(3);
    bump(4);
    output 48 + total;
}
";
    assert_eq!(run(source), "7");
}

#[test]
fn functions_pass_arguments_and_return_values() {
    let source = "\
function max(a, b) {
    if a < b {
        return b;
    }
    return a;
}
function main() {
    output max(65, 66);
    output max(68, 67);
}
";
    assert_eq!(run(source), "BD");
}

#[test]
fn comparison_desugarings_behave() {
    let source = "\
function main() {
    if 3 <= 3 {
        output 97;
    }
    if 4 >= 5 {
        output 98;
    }
    if 5 > 4 {
        output 99;
    }
    if 4 != 4 {
        output 100;
    }
}
";
    assert_eq!(run(source), "ac");
}

#[test]
fn inner_scopes_shadow_outer_constants() {
    let source = "\
function main() {
    const x = 1;
    if 1 {
        const x = 2;
        output 48 + x;
    }
    output 48 + x;
}
";
    assert_eq!(run(source), "21");
}

#[test]
fn duplicate_constants_in_one_scope_are_fatal() {
    let error = compile_error(
        "\
function main() {
    const x = 1;
    const x = 2;
}
",
    );
    assert_eq!(
        error,
        compiler::Error::DuplicateLocal {
            name: "x".to_string(),
            function: "main".to_string()
        }
    );
}

#[test]
fn duplicate_globals_are_fatal() {
    let error = compile_error("var g;\nvar g;\nfunction main() {\n}\n");
    assert_eq!(
        error,
        compiler::Error::DuplicateGlobal {
            name: "g".to_string()
        }
    );
}

#[test]
fn undefined_names_are_fatal() {
    let error = compile_error("function main() {\n    output y;\n}\n");
    assert_eq!(
        error,
        compiler::Error::Undefined {
            name: "y".to_string(),
            function: "main".to_string()
        }
    );
}

#[test]
fn constants_cannot_be_assigned() {
    let error = compile_error("function main() {\n    const c = 1;\n    c = 2;\n}\n");
    assert_eq!(
        error,
        compiler::Error::ConstantAsLvalue {
            name: "c".to_string(),
            function: "main".to_string()
        }
    );
}

#[test]
fn break_outside_a_loop_is_fatal() {
    let error = compile_error("function main() {\n    break;\n}\n");
    assert_eq!(
        error,
        compiler::Error::IllegalBreak {
            function: "main".to_string()
        }
    );
}

#[test]
fn array_sizes_must_fold() {
    let error = compile_error("function main() {\n    var n;\n    var a[n];\n}\n");
    assert_eq!(
        error,
        compiler::Error::ArraySizeNotConstant {
            name: "a".to_string()
        }
    );
}

#[test]
fn assignment_targets_must_be_lvalues() {
    assert_eq!(
        parse_error("function main() {\n    1 = 2;\n}\n"),
        "1 is not an lvalue."
    );
    assert_eq!(
        parse_error("function main() {\n    f() = 3;\n}\n"),
        "f() is not an lvalue."
    );
    assert_eq!(
        parse_error("function main() {\n    (a + b) = 4;\n}\n"),
        "(a + b) is not an lvalue."
    );
}

#[test]
fn dereferences_are_valid_assignment_targets() {
    let source = "\
function main() {
    *5000 = 77;
    output *5000;
    var p = 5000;
    *p += 1;
    output *p;
}
";
    assert_eq!(run(source), "MN");
}

#[test]
fn only_calls_can_stand_as_statements() {
    assert_eq!(
        parse_error("function main() {\n    1 + 2;\n}\n"),
        "Only call expressions can be performed as statements."
    );
}

#[test]
fn var_lists_declare_and_initialise() {
    let source = "\
function main() {
    var a, b = 49, c;
    c = 50;
    a = 48;
    output a;
    output b;
    output c;
}
";
    assert_eq!(run(source), "012");
}

#[test]
fn multiline_source_reports_positions() {
    let message = compiler::parse("test.is", "function main() {\n    var 9x;\n}\n").unwrap_err();
    let rendered = message.to_string();
    assert!(rendered.starts_with("test.is:2:9: error:"), "{}", rendered);
    assert!(rendered.contains('^'), "{}", rendered);
}

#[test]
fn recursive_calls_link_against_the_static_frame() {
    // Frames are static, so this compiles; running it would corrupt the
    // caller's frame.
    let source = "\
function f(n) {
    if n == 0 {
        return 0;
    }
    return f(n - 1);
}
function main() {
    output 48 + f(3);
}
";
    assert!(!compile(source).is_empty());
}

#[test]
fn modules_link_in_dependency_order() {
    let root = format!("{}/tests/programs/main.is", env!("CARGO_MANIFEST_DIR"));
    let modules = compiler::load(&root).unwrap();
    assert_eq!(modules.len(), 2);
    let image = asm::encode(&compiler::generate(&modules).unwrap()).unwrap();
    let mut device = TestingDevice::default();
    Program::new(&image).run(&mut device).unwrap();
    assert_eq!(device.output_str(), "5");
}

#[test]
fn import_cycles_are_reported() {
    let mut modules = BTreeMap::new();
    modules.insert(
        "d/x.is".to_string(),
        compiler::parse("d/x.is", "import y;\n").unwrap(),
    );
    modules.insert(
        "d/y.is".to_string(),
        compiler::parse("d/y.is", "import x;\n").unwrap(),
    );
    assert_eq!(
        compiler::generate(&modules).unwrap_err(),
        compiler::Error::ImportCycle(vec!["d/x.is".to_string(), "d/y.is".to_string()])
    );
}

#[test]
fn missing_modules_are_reported() {
    let error = compiler::load("no/such/module.is").unwrap_err();
    assert!(matches!(error, compiler::Error::Io { .. }));
}

#[test]
fn listings_reassemble_to_the_same_image() {
    let statements = statements(
        "\
function main() {
    var i = 0;
    while i < 3 {
        output 65 + i;
        i += 1;
    }
}
",
    );
    let listing: String = statements.iter().map(|s| format!("{}\n", s)).collect();
    let reparsed = asm::parse("listing.asm", &listing).unwrap();
    assert_eq!(
        asm::encode(&reparsed).unwrap(),
        asm::encode(&statements).unwrap()
    );
}

#[test]
fn compiled_images_decode_and_reencode() {
    let image = compile(
        "\
function main() {
    output 72;
}
",
    );
    let program = Program::new(&image);
    let mut pc = 0i64;
    let mut decoded = Vec::new();
    while pc < image.len() as i64 {
        let instruction = program.decode(pc);
        pc += instruction.size();
        decoded.push(asm::Statement::Instruction(instruction));
    }
    assert_eq!(asm::encode(&decoded).unwrap(), image);
}
