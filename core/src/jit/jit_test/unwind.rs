use super::*;

/// begin; self.risky; rescue; $!; end
fn rescuing(site: &Arc<InlineCache>) -> CompiledMethod {
    CompiledMethod::new(
        "guarded",
        vec![
            Instruction::SetupUnwind {
                target: 8,
                kind: UnwindKind::Rescue,
            },
            Instruction::PushSelf,
            Instruction::SendMethod { cache: 0 },
            Instruction::PopUnwind,
            Instruction::Ret,
            Instruction::PushException,
            Instruction::ClearException,
            Instruction::Ret,
        ],
    )
    .with_caches(vec![site.clone()])
}

#[test]
fn test_pop_without_setup_is_rejected() {
    let method = CompiledMethod::new(
        "underflow",
        vec![Instruction::PopUnwind, Instruction::PushNil, Instruction::Ret],
    );
    assert_eq!(compile_err(&method), JitError::HandlerUnderflow { ip: 0 });
}

#[test]
fn test_setup_without_pop_is_rejected() {
    let method = CompiledMethod::new(
        "unbalanced",
        vec![
            Instruction::SetupUnwind {
                target: 5,
                kind: UnwindKind::Ensure,
            },
            Instruction::PushNil,
            Instruction::Ret,
            Instruction::PushTrue,
            Instruction::Ret,
        ],
    );
    assert_eq!(compile_err(&method), JitError::UnbalancedHandlers { open: 1 });
}

#[test]
fn test_raise_is_routed_to_the_rescue() {
    let site = cache("risky");
    let method = rescuing(&site);
    let mut vm = MockVm::new();
    vm.track(&site);
    let error = vm.object(class::EXCEPTION);
    vm.define(class::NIL, sym("risky"), Reply::Raise(error));

    assert_eq!(run(&method, &mut vm, value::Q_NIL, &[]), error);
    assert_eq!(vm.pending, None);
    assert_eq!(vm.called(RuntimeHelper::RaisingException), 1);
}

#[test]
fn test_rescue_is_skipped_without_a_raise() {
    let site = cache("risky");
    let method = rescuing(&site);
    let mut vm = MockVm::new();
    vm.track(&site);
    vm.define(class::NIL, sym("risky"), Reply::Value(fix(1)));

    assert_eq!(run(&method, &mut vm, value::Q_NIL, &[]), fix(1));
    assert_eq!(vm.called(RuntimeHelper::RaisingException), 0);
}

#[test]
fn test_raise_through_block_send_reaches_the_rescue() {
    let site = cache("each");
    let method = CompiledMethod::new(
        "guarded_each",
        vec![
            Instruction::SetupUnwind {
                target: 10,
                kind: UnwindKind::Rescue,
            },
            Instruction::PushSelf,
            Instruction::PushNil,
            Instruction::SendStackWithBlock { cache: 0, args: 0 },
            Instruction::PopUnwind,
            Instruction::Ret,
            Instruction::PushException,
            Instruction::Ret,
        ],
    )
    .with_caches(vec![site.clone()]);

    let mut vm = MockVm::new();
    vm.track(&site);
    let error = vm.object(class::EXCEPTION);
    vm.define(class::NIL, sym("each"), Reply::Raise(error));
    assert_eq!(run(&method, &mut vm, value::Q_NIL, &[]), error);
    assert_eq!(vm.called(RuntimeHelper::BreakToHere), 1);
    assert_eq!(vm.called(RuntimeHelper::RaisingException), 1);
}

#[test]
fn test_raise_return_is_claimed_by_the_gate() {
    let method = CompiledMethod::new(
        "early",
        vec![Instruction::PushInt { value: 5 }, Instruction::RaiseReturn],
    );
    let mut vm = MockVm::new();
    assert_eq!(run(&method, &mut vm, value::Q_NIL, &[]), fix(5));
    assert_eq!(vm.pending, None);
    assert_eq!(vm.called(RuntimeHelper::ReturnToHere), 1);
    assert_eq!(vm.called(RuntimeHelper::ClearRaiseValue), 1);
}

#[test]
fn test_raise_break_leaves_the_frame() {
    let method = CompiledMethod::new(
        "block_body",
        vec![Instruction::PushInt { value: 2 }, Instruction::RaiseBreak],
    );
    let mut vm = MockVm::new();
    let result = run(&method, &mut vm, value::Q_NIL, &[]);
    assert_eq!(result, value::NULL);
    assert_eq!(vm.pending, Some(Pending::Break(fix(2))));
    assert_eq!(ExitOutcome::classify(result, true), ExitOutcome::Pending);
}

#[test]
fn test_ensure_runs_before_a_return_continues() {
    // begin; return 7; ensure; @x = 1; end
    let method = CompiledMethod::new(
        "ensured",
        vec![
            Instruction::SetupUnwind {
                target: 8,
                kind: UnwindKind::Ensure,
            },
            Instruction::PushInt { value: 7 },
            Instruction::EnsureReturn,
            Instruction::Pop,
            Instruction::PopUnwind,
            Instruction::MetaPush1,
            Instruction::SetIvar { name: 0 },
            Instruction::Pop,
            Instruction::Reraise,
        ],
    )
    .with_literals(vec![Literal::Symbol("@x".into())]);

    let mut vm = MockVm::new();
    assert_eq!(run(&method, &mut vm, value::Q_NIL, &[]), fix(7));
    assert_eq!(vm.called(RuntimeHelper::SetIvar), 1);
    assert_eq!(vm.pending, None);
}

#[test]
fn test_uncaught_reraise_exits_with_null() {
    let method = CompiledMethod::new("reraise", vec![Instruction::Reraise]);
    let mut vm = MockVm::new();
    let error = vm.object(class::EXCEPTION);
    vm.pending = Some(Pending::Raise(error));
    assert_eq!(run(&method, &mut vm, value::Q_NIL, &[]), value::NULL);
    assert_eq!(vm.pending, Some(Pending::Raise(error)));
}

#[test]
fn test_full_scope_is_flushed_on_every_exit() {
    let method = CompiledMethod::new(
        "captured",
        vec![Instruction::PushNil, Instruction::Ret],
    );
    let options = JitOptions {
        use_full_scope: true,
        ..JitOptions::default()
    };
    let artifact = compile_with(&method, options);
    // The return plus both gate exits.
    assert_eq!(artifact.function.count_calls(RuntimeHelper::FlushScope), 3);

    let mut vm = MockVm::new();
    Harness::new(&method)
        .run(&artifact.function, &mut vm, value::Q_NIL, &[])
        .unwrap();
    assert_eq!(vm.called(RuntimeHelper::FlushScope), 1);
}

#[test]
fn test_profiling_hook_respects_the_flag() {
    let method = CompiledMethod::new("profiled", vec![Instruction::PushNil, Instruction::Ret]);
    let always = compile_with(
        &method,
        JitOptions {
            include_profiling: true,
            ..JitOptions::default()
        },
    );
    assert_eq!(always.function.count_calls(RuntimeHelper::EndProfiling), 1);

    let flag = 0x9000;
    let gated = compile_with(
        &method,
        JitOptions {
            include_profiling: true,
            profiling_flag_address: Some(flag),
            ..JitOptions::default()
        },
    );
    for (enabled, calls) in [(0, 0), (1, 1)] {
        let mut vm = MockVm::new();
        vm.externals.insert(flag, enabled);
        Harness::new(&method)
            .run(&gated.function, &mut vm, value::Q_NIL, &[])
            .unwrap();
        assert_eq!(vm.called(RuntimeHelper::EndProfiling), calls);
    }
}
