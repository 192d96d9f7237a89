use super::*;

#[test]
fn test_branches_select_by_truthiness() {
    // if a then 1 else 2 end
    let method = CompiledMethod::new(
        "choose",
        vec![
            Instruction::PushLocal { index: 0 },
            Instruction::GotoIfFalse { target: 8 },
            Instruction::PushInt { value: 1 },
            Instruction::Goto { target: 10 },
            Instruction::PushInt { value: 2 },
            Instruction::Ret,
        ],
    )
    .with_locals(1, 1);

    let mut vm = MockVm::new();
    assert_eq!(run(&method, &mut vm, value::Q_NIL, &[value::Q_TRUE]), fix(1));
    assert_eq!(run(&method, &mut vm, value::Q_NIL, &[fix(0)]), fix(1));
    assert_eq!(run(&method, &mut vm, value::Q_NIL, &[value::Q_NIL]), fix(2));
    assert_eq!(run(&method, &mut vm, value::Q_NIL, &[value::Q_FALSE]), fix(2));
}

#[test]
fn test_countdown_loop_stays_in_compiled_code() {
    let method = CompiledMethod::new(
        "countdown",
        vec![
            Instruction::PushInt { value: 3 },
            Instruction::SetLocal { index: 0 },
            Instruction::Pop,
            Instruction::PushLocal { index: 0 },
            Instruction::MetaPush0,
            Instruction::MetaSendOpGt,
            Instruction::GotoIfFalse { target: 21 },
            Instruction::PushLocal { index: 0 },
            Instruction::MetaPush1,
            Instruction::MetaSendOpMinus,
            Instruction::SetLocal { index: 0 },
            Instruction::Pop,
            Instruction::CheckInterrupts,
            Instruction::Goto { target: 5 },
            Instruction::PushLocal { index: 0 },
            Instruction::Ret,
        ],
    )
    .with_locals(1, 0);

    let mut vm = MockVm::new();
    assert_eq!(run(&method, &mut vm, value::Q_NIL, &[]), fix(0));
    assert_eq!(vm.dispatches, 0);
    assert_eq!(vm.called(RuntimeHelper::CheckInterrupts), 3);
}

#[test]
fn test_pending_interrupt_leaves_the_loop() {
    let method = CompiledMethod::new(
        "spin",
        vec![Instruction::CheckInterrupts, Instruction::Goto { target: 0 }],
    );
    let mut vm = MockVm::new();
    let error = vm.object(class::EXCEPTION);
    vm.interrupt = Some(error);
    assert_eq!(run(&method, &mut vm, value::Q_NIL, &[]), value::NULL);
    assert_eq!(vm.pending, Some(Pending::Raise(error)));
}

#[test]
fn test_mismatched_depths_are_rejected() {
    let method = CompiledMethod::new(
        "lopsided",
        vec![
            Instruction::PushTrue,
            Instruction::GotoIfTrue { target: 4 },
            Instruction::PushNil,
            Instruction::Ret,
        ],
    );
    assert_eq!(
        compile_err(&method),
        JitError::StackDepthMismatch {
            ip: 4,
            expected: 0,
            found: 1
        }
    );
}

#[test]
fn test_target_after_dead_code_takes_its_depth_from_the_back_edge() {
    // The block at 3 follows a goto; only the branch at 7 enters it.
    let method = CompiledMethod::new(
        "backwards",
        vec![
            Instruction::PushNil,
            Instruction::Goto { target: 5 },
            Instruction::PushNil,
            Instruction::Ret,
            Instruction::Pop,
            Instruction::PushTrue,
            Instruction::GotoIfTrue { target: 3 },
            Instruction::PushNil,
            Instruction::Ret,
        ],
    );
    let mut vm = MockVm::new();
    assert_eq!(run(&method, &mut vm, value::Q_NIL, &[]), value::Q_NIL);
}

#[test]
fn test_falling_off_the_end_is_rejected() {
    let method = CompiledMethod::new("open", vec![Instruction::PushNil]);
    assert_eq!(compile_err(&method), JitError::FallsOffEnd);
}

#[test]
fn test_code_after_return_is_tolerated() {
    let method = CompiledMethod::new(
        "trailing",
        vec![Instruction::PushNil, Instruction::Ret, Instruction::PushTrue],
    );
    let mut vm = MockVm::new();
    assert_eq!(run(&method, &mut vm, value::Q_NIL, &[]), value::Q_NIL);
}

#[test]
fn test_branch_into_an_instruction_is_rejected() {
    let method = CompiledMethod::new(
        "split",
        vec![
            Instruction::PushNil,
            Instruction::Goto { target: 2 },
            Instruction::Ret,
        ],
    );
    assert_eq!(
        compile_err(&method),
        JitError::InvalidBranchTarget { ip: 1, target: 2 }
    );
}

#[test]
fn test_unsupported_instruction_names_itself() {
    let method = CompiledMethod::new("noop", vec![Instruction::Noop, Instruction::PushNil, Instruction::Ret]);
    assert_eq!(
        compile_err(&method),
        JitError::UnsupportedInstruction { ip: 0, name: "noop" }
    );
}

#[test]
fn test_underflow_reports_the_ip() {
    let method = CompiledMethod::new("empty", vec![Instruction::PushNil, Instruction::Pop, Instruction::Ret]);
    assert!(matches!(
        compile_err(&method),
        JitError::StackUnderflow { ip: 2, needed: 1, depth: 0 }
    ));
}

#[test]
fn test_ip_is_published_to_the_frame() {
    let method = CompiledMethod::new(
        "ips",
        vec![
            Instruction::PushInt { value: 4 },
            Instruction::PushNil,
            Instruction::Pop,
            Instruction::Ret,
        ],
    );
    let artifact = compile(&method);
    let mut harness = Harness::new(&method);
    let mut vm = MockVm::new();
    let result = harness.run(&artifact.function, &mut vm, value::Q_NIL, &[]).unwrap();
    assert_eq!(result, fix(4));
    assert_eq!(harness.frame_word(layout::call_frame::IP), 4);
}

#[test]
fn test_rotate_reverses_and_move_down_sinks_the_top() {
    let rotate = CompiledMethod::new(
        "rotate",
        vec![
            Instruction::MetaPush1,
            Instruction::MetaPush2,
            Instruction::PushInt { value: 3 },
            Instruction::Rotate { count: 3 },
            Instruction::Ret,
        ],
    );
    let move_down = CompiledMethod::new(
        "move_down",
        vec![
            Instruction::MetaPush1,
            Instruction::MetaPush2,
            Instruction::PushInt { value: 3 },
            Instruction::MoveDown { positions: 2 },
            Instruction::Pop,
            Instruction::Pop,
            Instruction::Ret,
        ],
    );
    let swap = CompiledMethod::new(
        "swap",
        vec![
            Instruction::MetaPush1,
            Instruction::MetaPush2,
            Instruction::SwapStack,
            Instruction::Ret,
        ],
    );

    let mut vm = MockVm::new();
    assert_eq!(run(&rotate, &mut vm, value::Q_NIL, &[]), fix(1));
    assert_eq!(run(&move_down, &mut vm, value::Q_NIL, &[]), fix(3));
    assert_eq!(run(&swap, &mut vm, value::Q_NIL, &[]), fix(1));
}

#[test]
fn test_parent_scope_locals() {
    let method = CompiledMethod::new(
        "closure",
        vec![
            Instruction::PushLocalDepth { depth: 1, index: 0 },
            Instruction::MetaPush1,
            Instruction::MetaSendOpPlus,
            Instruction::SetLocalDepth { depth: 1, index: 1 },
            Instruction::Ret,
        ],
    );
    let artifact = compile(&method);
    let mut harness = Harness::new(&method);
    harness.memory.store(harness.outer_locals, fix(41)).unwrap();

    let mut vm = MockVm::new();
    let result = harness.run(&artifact.function, &mut vm, value::Q_NIL, &[]).unwrap();
    assert_eq!(result, fix(42));
    assert_eq!(harness.memory.load(harness.outer_locals + 8).unwrap(), fix(42));
    assert_eq!(vm.called(RuntimeHelper::WriteBarrier), 1);
}

#[test]
fn test_deep_and_self_depth_locals() {
    let method = CompiledMethod::new(
        "deep",
        vec![
            Instruction::PushLocalDepth { depth: 0, index: 0 },
            Instruction::PushLocalDepth { depth: 3, index: 2 },
            Instruction::Pop,
            Instruction::Ret,
        ],
    )
    .with_locals(1, 1);

    let artifact = compile(&method);
    assert_eq!(artifact.anomalies.len(), 1);
    assert!(artifact.anomalies[0].starts_with("ip 0:"));
    assert_eq!(artifact.function.count_calls(RuntimeHelper::PushLocalDepth), 1);

    let mut vm = MockVm::new();
    let result = Harness::new(&method)
        .run(&artifact.function, &mut vm, value::Q_NIL, &[fix(8)])
        .unwrap();
    assert_eq!(result, fix(8));
}

#[test]
fn test_heap_literals_come_from_the_literal_tuple() {
    let method = CompiledMethod::new(
        "literals",
        vec![Instruction::PushLiteral { literal: 1 }, Instruction::Ret],
    )
    .with_literals(vec![Literal::Fixnum(3), Literal::Object("\"hello\"".into())]);

    let artifact = compile(&method);
    let mut harness = Harness::new(&method);
    let mut vm = MockVm::new();
    let result = harness.run(&artifact.function, &mut vm, value::Q_NIL, &[]).unwrap();
    assert_eq!(result, harness.memory.load(harness.literals + 8).unwrap());

    let immediate = CompiledMethod::new(
        "immediate",
        vec![Instruction::PushLiteral { literal: 0 }, Instruction::Ret],
    )
    .with_literals(vec![Literal::Fixnum(3)]);
    assert_eq!(run(&immediate, &mut vm, value::Q_NIL, &[]), fix(3));
}

#[test]
fn test_passed_arg_and_is_nil() {
    let method = CompiledMethod::new(
        "optional",
        vec![
            Instruction::PassedArg { index: 1 },
            Instruction::Ret,
        ],
    )
    .with_locals(2, 1);
    let mut vm = MockVm::new();
    assert_eq!(run(&method, &mut vm, value::Q_NIL, &[fix(1)]), value::Q_FALSE);
    assert_eq!(run(&method, &mut vm, value::Q_NIL, &[fix(1), fix(2)]), value::Q_TRUE);

    let nil_check = CompiledMethod::new(
        "nil?",
        vec![Instruction::PushLocal { index: 0 }, Instruction::IsNil, Instruction::Ret],
    )
    .with_locals(1, 1);
    assert_eq!(run(&nil_check, &mut vm, value::Q_NIL, &[value::Q_NIL]), value::Q_TRUE);
    assert_eq!(run(&nil_check, &mut vm, value::Q_NIL, &[value::Q_FALSE]), value::Q_FALSE);
}

#[test]
fn test_ir_output_is_a_module() {
    let method = CompiledMethod::new("tiny", vec![Instruction::PushNil, Instruction::Ret]);
    let artifact = compile(&method);
    assert!(artifact.ir.contains("define i64 @tiny("));
    assert!(artifact.ir.contains("declare"));
    assert!(artifact.optimised_ir.is_none());
    assert_eq!(artifact.sends_done, 0);
}
