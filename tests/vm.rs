use intscript::asm::{self, Statement};
use intscript::vm::{self, Program, State, TestingDevice};

fn run_raw(image: &[i64], input: Vec<i64>) -> Vec<i64> {
    let mut device = TestingDevice::new_raw(input);
    Program::new(image).run(&mut device).unwrap();
    device.output
}

#[test]
fn add_and_multiply() {
    // Overwrites cell 4 with 99 and halts there.
    assert_eq!(run_raw(&[1002, 4, 3, 4, 33], vec![]), Vec::<i64>::new());
    assert_eq!(run_raw(&[1101, 2, 3, 0, 4, 0, 99], vec![]), vec![5]);
}

#[test]
fn input_writes_and_output_reads() {
    assert_eq!(run_raw(&[3, 0, 4, 0, 99], vec![42]), vec![42]);
}

#[test]
fn compares_against_eight() {
    // Position-mode equals and less-than.
    for (program, hit) in [
        (vec![3, 9, 8, 9, 10, 9, 4, 9, 99, -1, 8], 8),
        (vec![3, 9, 7, 9, 10, 9, 4, 9, 99, -1, 8], 7),
        (vec![3, 3, 1108, -1, 8, 3, 4, 3, 99], 8),
        (vec![3, 3, 1107, -1, 8, 3, 4, 3, 99], 7),
    ] {
        assert_eq!(run_raw(&program, vec![hit]), vec![1]);
        assert_eq!(run_raw(&program, vec![hit + 1]), vec![0]);
    }
}

#[test]
fn jumps_test_for_zero() {
    for program in [
        vec![3, 12, 6, 12, 15, 1, 13, 14, 13, 4, 13, 99, -1, 0, 1, 9],
        vec![3, 3, 1105, -1, 9, 1101, 0, 0, 12, 4, 12, 99, 1],
    ] {
        assert_eq!(run_raw(&program, vec![0]), vec![0]);
        assert_eq!(run_raw(&program, vec![5]), vec![1]);
    }
}

#[test]
fn three_way_compare_against_eight() {
    let program = vec![
        3, 21, 1008, 21, 8, 20, 1005, 20, 22, 107, 8, 21, 20, 1006, 20, 31, 1106, 0, 36, 98, 0, 0,
        1002, 21, 125, 20, 4, 20, 1105, 1, 46, 104, 999, 1105, 1, 46, 1101, 1000, 1, 20, 4, 20,
        1105, 1, 46, 98, 99,
    ];
    assert_eq!(run_raw(&program, vec![7]), vec![999]);
    assert_eq!(run_raw(&program, vec![8]), vec![1000]);
    assert_eq!(run_raw(&program, vec![9]), vec![1001]);
}

#[test]
fn relative_base_quine() {
    let quine = vec![
        109, 1, 204, -1, 1001, 100, 1, 100, 1008, 100, 16, 101, 1006, 101, 0, 99,
    ];
    assert_eq!(run_raw(&quine, vec![]), quine);
}

#[test]
fn sixty_four_bit_values() {
    assert_eq!(
        run_raw(&[1102, 34915192, 34915192, 7, 4, 7, 99, 0], vec![]),
        vec![1219070632396864]
    );
    assert_eq!(
        run_raw(&[104, 1125899906842624, 99], vec![]),
        vec![1125899906842624]
    );
}

#[test]
fn memory_is_sparse_and_far_writes_work() {
    // Write 10 far beyond the loaded image, then read it back.
    let image = [1101, 5, 5, 1000000, 4, 1000000, 99];
    assert_eq!(run_raw(&image, vec![]), vec![10]);
}

#[test]
fn coroutine_protocol_steps() {
    let mut program = Program::new(&[3, 0, 4, 0, 99]);
    assert_eq!(program.resume().unwrap(), State::WaitingForInput);
    program.provide_input(7);
    assert_eq!(program.resume().unwrap(), State::Output);
    assert_eq!(program.get_output(), 7);
    assert_eq!(program.resume().unwrap(), State::Halt);
    assert!(program.done());
}

#[test]
#[should_panic]
fn provide_input_requires_a_suspension() {
    Program::new(&[99]).provide_input(1);
}

#[test]
fn traps_illegal_opcodes() {
    let mut program = Program::new(&[98, 0, 0, 0]);
    assert_eq!(
        program.resume().unwrap_err(),
        vm::Error::IllegalInstruction { value: 98, pc: 0 }
    );
    let mut program = Program::new(&[-1]);
    assert!(matches!(
        program.resume().unwrap_err(),
        vm::Error::IllegalInstruction { .. }
    ));
}

#[test]
fn traps_immediate_destinations() {
    let mut program = Program::new(&[10001, 0, 0, 0, 99]);
    assert_eq!(
        program.resume().unwrap_err(),
        vm::Error::IllegalInstruction { value: 10001, pc: 0 }
    );
}

#[test]
fn traps_negative_addresses() {
    let mut program = Program::new(&[1, -5, 0, 0, 99]);
    assert_eq!(
        program.resume().unwrap_err(),
        vm::Error::AddressOutOfRange { address: -5, pc: 0 }
    );
}

#[test]
fn decode_classifies_heads() {
    for head in [1101, 2, 1002, 21101, 3, 203, 104, 1105, 1106, 7, 21107, 8, 109, 99] {
        let program = Program::new(&[head]);
        assert!(
            !matches!(program.decode(0), asm::Instruction::Literal(_)),
            "{} should decode",
            head
        );
    }
    for head in [0, 33, 98, 100, 103, 302, 10001, 29998, 30000, -4] {
        let program = Program::new(&[head]);
        assert!(
            matches!(program.decode(0), asm::Instruction::Literal(_)),
            "{} should not decode",
            head
        );
    }
}

fn decode_program(image: &[i64]) -> Vec<Statement> {
    let program = Program::new(image);
    let mut statements = Vec::new();
    let mut pc = 0i64;
    while pc < image.len() as i64 {
        let instruction = program.decode(pc);
        pc += instruction.size();
        statements.push(Statement::Instruction(instruction));
    }
    statements
}

#[test]
fn decode_then_encode_round_trips() {
    for image in [
        vec![1, 0, 0, 0, 99],
        vec![1101, 2, 3, 5, 4, 0, 99],
        vec![109, 1, 204, -1, 1001, 100, 1, 100, 1008, 100, 16, 101, 1006, 101, 0, 99],
    ] {
        let statements = decode_program(&image);
        assert_eq!(asm::encode(&statements).unwrap(), image);
    }
}

#[test]
fn parses_the_textual_image_format() {
    assert_eq!(vm::parse_image("1,2,3\n").unwrap(), vec![1, 2, 3]);
    assert_eq!(
        vm::parse_image(" 104 , -50 ,99 ").unwrap(),
        vec![104, -50, 99]
    );
    assert!(matches!(
        vm::parse_image("1,,2"),
        Err(vm::Error::MalformedIntcode(_))
    ));
    assert!(matches!(
        vm::parse_image("pearl"),
        Err(vm::Error::MalformedIntcode(_))
    ));
}

#[test]
fn device_runs_out_of_input() {
    let mut device = TestingDevice::default();
    let error = Program::new(&[3, 0, 99]).run(&mut device).unwrap_err();
    assert_eq!(error, vm::Error::Device("ran out of input".to_string()));
}
