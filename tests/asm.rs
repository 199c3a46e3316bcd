use intscript::asm::{self, Immediate, Instruction, Statement};
use intscript::vm::{Program, TestingDevice};

fn assemble(source: &str) -> Vec<i64> {
    asm::encode(&asm::parse("test.asm", source).unwrap()).unwrap()
}

fn assemble_error(source: &str) -> asm::Error {
    asm::encode(&asm::parse("test.asm", source).unwrap()).unwrap_err()
}

fn run(image: &[i64]) -> TestingDevice {
    let mut device = TestingDevice::default();
    Program::new(image).run(&mut device).unwrap();
    device
}

#[test]
fn encodes_instruction_heads() {
    assert_eq!(assemble("  add 1, 2, *0\n"), vec![1101, 1, 2, 0]);
    assert_eq!(assemble("  mul 3, *4, base[5]\n"), vec![20102, 3, 4, 5]);
    assert_eq!(assemble("  out 42\n"), vec![104, 42]);
    assert_eq!(assemble("  in base[0]\n"), vec![203, 0]);
    assert_eq!(assemble("  arb -7\n"), vec![109, -7]);
    assert_eq!(assemble("  halt\n"), vec![99]);
}

#[test]
fn resolves_labels_to_offsets() {
    let image = assemble(
        "start:\n  jz 0, end\n  out 65\nend:\n  halt\n",
    );
    assert_eq!(image, vec![1106, 0, 5, 104, 65, 99]);
}

#[test]
fn binds_operand_labels_to_their_cells() {
    // The b operand of the add is cell 1; "out patch" reads that offset.
    let image = assemble("  add 0, 0 @ patch, *target\n  out patch\ntarget:\n  .int 0\n");
    assert_eq!(image, vec![1101, 0, 0, 6, 104, 2, 0]);
}

#[test]
fn patched_operands_flow_at_runtime() {
    // The add writes into the out instruction's operand cell.
    let image = assemble("  add 0, 42, *cell\n  out 0 @ cell\n  halt\n");
    assert_eq!(run(&image).output, vec![42]);
}

#[test]
fn substitutes_macro_defines() {
    let image = assemble(".define FOO *loc\n  out FOO\nloc:\n  .int 9\n");
    assert_eq!(image, vec![4, 2, 9]);
    assert_eq!(run(&image).output, vec![9]);
}

#[test]
fn defines_emit_no_cells() {
    assert_eq!(assemble(".define X 1\n  halt\n"), vec![99]);
}

#[test]
fn encodes_ascii_with_terminator() {
    assert_eq!(
        assemble("msg:\n  .ascii \"hi\\n\"\n"),
        vec![104, 105, 10, 0]
    );
}

#[test]
fn accepts_comments_and_blank_lines() {
    let image = assemble("# a comment\n\n  out 1  # trailing\n  halt\n");
    assert_eq!(image, vec![104, 1, 99]);
}

#[test]
fn last_statement_may_omit_the_newline() {
    assert_eq!(assemble("  halt"), vec![99]);
}

#[test]
fn rejects_duplicate_labels() {
    assert_eq!(
        assemble_error("a:\na:\n  halt\n"),
        asm::Error::DuplicateDefinition("a".to_string())
    );
}

#[test]
fn rejects_duplicate_defines() {
    assert_eq!(
        assemble_error(".define X 1\n.define X 2\n"),
        asm::Error::DuplicateDefinition("X".to_string())
    );
}

#[test]
fn rejects_unresolved_names() {
    assert_eq!(
        assemble_error("  out missing\n"),
        asm::Error::UnresolvedName("missing".to_string())
    );
}

#[test]
fn reports_unknown_mnemonics_with_position() {
    let error = asm::parse("test.asm", "  halt\n  frob 1\n").unwrap_err();
    assert_eq!(error.line, 2);
    assert_eq!(error.message, "Unknown op \"frob\".");
    let rendered = error.to_string();
    assert!(rendered.starts_with("test.asm:2:"), "{}", rendered);
    assert!(rendered.contains("error: Unknown op \"frob\"."), "{}", rendered);
}

#[test]
fn rejects_immediate_destinations() {
    let error = asm::parse("test.asm", "  in 5\n").unwrap_err();
    assert_eq!(error.message, "Expected *x or base[x].");
}

#[test]
fn encoding_is_deterministic() {
    let statements =
        asm::parse("test.asm", "loop:\n  add *x, 1, *x\n  jnz *x, loop\nx:\n  .int 3\n").unwrap();
    assert_eq!(
        asm::encode(&statements).unwrap(),
        asm::encode(&statements).unwrap()
    );
}

#[test]
fn emitted_cells_match_instruction_sizes() {
    let statements = asm::parse(
        "test.asm",
        "  add 1, 2, *0\n  jz 0, 0\n  in *0\n  out 0\n  arb 1\n  halt\n",
    )
    .unwrap();
    for statement in &statements {
        if let Statement::Instruction(instruction) = statement {
            let image = asm::encode(std::slice::from_ref(statement)).unwrap();
            assert_eq!(image.len() as i64, instruction.size(), "{}", instruction);
        }
    }
}

#[test]
fn listing_output_reassembles_identically() {
    let source = "start:\n  add *x, 2, base[3] @ spot\n  out spot\n  jz 0, start\nx:\n  .int -7\n  .ascii \"a\\\"b\"\n";
    let statements = asm::parse("test.asm", source).unwrap();
    let listing: String = statements
        .iter()
        .map(|s| format!("{}\n", s))
        .collect();
    let reparsed = asm::parse("listing.asm", &listing).unwrap();
    assert_eq!(
        asm::encode(&reparsed).unwrap(),
        asm::encode(&statements).unwrap()
    );
}

#[test]
fn integer_directives_resolve_names() {
    let image = assemble("  halt\nhere:\n  .int here\n");
    assert_eq!(image, vec![99, 1]);
}

#[test]
fn parses_negative_and_named_operands() {
    let statements = asm::parse("test.asm", "  out -12\n").unwrap();
    assert_eq!(
        statements,
        vec![Statement::Instruction(Instruction::Output(
            asm::InputParam::immediate(Immediate::Literal(-12))
        ))]
    );
}
