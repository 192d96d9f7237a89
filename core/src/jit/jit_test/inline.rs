use super::*;

const ADD_ONE_METHOD: u64 = 0xadd1;

fn add_one() -> Arc<CompiledMethod> {
    Arc::new(
        CompiledMethod::new(
            "add_one",
            vec![
                Instruction::PushLocal { index: 0 },
                Instruction::MetaPush1,
                Instruction::MetaSendOpPlus,
                Instruction::Ret,
            ],
        )
        .with_locals(1, 1),
    )
}

/// `self.add_one(arg)` through a cache that has only seen `klass`.
fn caller_of(callee: Arc<CompiledMethod>, klass: i64) -> (CompiledMethod, Arc<InlineCache>) {
    let site = cache("add_one");
    site.record(klass, ADD_ONE_METHOD, Some(callee));
    let method = CompiledMethod::new(
        "caller",
        vec![
            Instruction::PushSelf,
            Instruction::PushLocal { index: 0 },
            Instruction::SendStack { cache: 0, args: 1 },
            Instruction::Ret,
        ],
    )
    .with_locals(1, 1)
    .with_caches(vec![site.clone()]);
    (method, site)
}

#[test]
fn test_guard_hit_runs_the_spliced_body() {
    let (method, site) = caller_of(add_one(), class::OBJECT);
    let artifact = compile(&method);
    assert_eq!(artifact.inlined, 1);
    assert_eq!(artifact.function.count_calls(RuntimeHelper::ClassId), 1);
    assert_eq!(artifact.function.count_calls(RuntimeHelper::ContinueUncommon), 1);

    let mut vm = MockVm::new();
    vm.track(&site);
    let recv = vm.object(class::OBJECT);
    let result = Harness::new(&method)
        .run(&artifact.function, &mut vm, recv, &[fix(4)])
        .unwrap();
    assert_eq!(result, fix(5));
    assert_eq!(vm.dispatches, 0);
    assert_eq!(vm.uncommon_traps, 0);
    assert_eq!(site.hits(), 0);
}

#[test]
fn test_guard_miss_resumes_in_the_interpreter() {
    let (method, site) = caller_of(add_one(), class::OBJECT);
    let mut vm = MockVm::new();
    vm.track(&site);
    vm.resume = Some((sym("add_one"), 1));
    let recv = vm.object(class::ARRAY);
    vm.define(class::ARRAY, sym("add_one"), Reply::Value(fix(100)));

    assert_eq!(run(&method, &mut vm, recv, &[fix(4)]), fix(100));
    assert_eq!(vm.uncommon_traps, 1);
    assert_eq!(vm.dispatches, 1);
}

#[test]
fn test_guard_miss_hands_the_rest_of_the_method_to_the_interpreter() {
    // self.add_one(arg) + 1
    let site = cache("add_one");
    site.record(class::OBJECT, ADD_ONE_METHOD, Some(add_one()));
    let method = CompiledMethod::new(
        "caller",
        vec![
            Instruction::PushSelf,
            Instruction::PushLocal { index: 0 },
            Instruction::SendStack { cache: 0, args: 1 },
            Instruction::MetaPush1,
            Instruction::MetaSendOpPlus,
            Instruction::Ret,
        ],
    )
    .with_locals(1, 1)
    .with_caches(vec![site.clone()]);
    let artifact = compile(&method);
    assert_eq!(artifact.inlined, 1);

    let mut vm = MockVm::new();
    vm.track(&site);
    vm.resume = Some((sym("add_one"), 1));
    vm.finish = Some(|sent| value::fixnum(value::fixnum_value(sent) + 1).unwrap_or(value::Q_NIL));
    let recv = vm.object(class::ARRAY);
    vm.define(class::ARRAY, sym("add_one"), Reply::Value(fix(100)));

    let result = Harness::new(&method)
        .run(&artifact.function, &mut vm, recv, &[fix(4)])
        .unwrap();
    assert_eq!(result, fix(101));
    assert_eq!(vm.uncommon_traps, 1);
    assert_eq!(vm.dispatches, 1);

    let recv = vm.object(class::OBJECT);
    let result = Harness::new(&method)
        .run(&artifact.function, &mut vm, recv, &[fix(4)])
        .unwrap();
    assert_eq!(result, fix(6));
    assert_eq!(vm.uncommon_traps, 1);
}

#[test]
fn test_inlined_and_generic_results_agree() {
    let (method, site) = caller_of(add_one(), class::OBJECT);
    let generic = JitCompiler::with_policy(JitOptions::default(), Arc::new(NeverInline))
        .compile(&method)
        .unwrap();
    let inlined = compile(&method);
    assert_eq!(generic.inlined, 0);
    assert_eq!(generic.function.count_calls(RuntimeHelper::ClassId), 0);

    for n in [-3, 0, 41] {
        let mut vm = MockVm::new();
        vm.track(&site);
        let recv = vm.object(class::OBJECT);
        vm.define(class::OBJECT, sym("add_one"), Reply::Value(fix(n + 1)));
        let sent = Harness::new(&method)
            .run(&generic.function, &mut vm, recv, &[fix(n)])
            .unwrap();
        let spliced = Harness::new(&method)
            .run(&inlined.function, &mut vm, recv, &[fix(n)])
            .unwrap();
        assert_eq!(sent, spliced);
        assert_eq!(vm.dispatches, 1);
    }
}

#[test]
fn test_inlining_can_be_switched_off() {
    let (method, _site) = caller_of(add_one(), class::OBJECT);
    let options = JitOptions {
        inlining: false,
        ..JitOptions::default()
    };
    assert_eq!(compile_with(&method, options).inlined, 0);

    let options = JitOptions {
        max_inline_size: 2,
        ..JitOptions::default()
    };
    assert_eq!(compile_with(&method, options).inlined, 0);
}

#[test]
fn test_active_handler_blocks_inlining() {
    let site = cache("add_one");
    site.record(class::OBJECT, ADD_ONE_METHOD, Some(add_one()));
    let method = CompiledMethod::new(
        "guarded",
        vec![
            Instruction::SetupUnwind {
                target: 10,
                kind: UnwindKind::Rescue,
            },
            Instruction::PushSelf,
            Instruction::MetaPush2,
            Instruction::SendStack { cache: 0, args: 1 },
            Instruction::PopUnwind,
            Instruction::Ret,
            Instruction::PushNil,
            Instruction::Ret,
        ],
    )
    .with_caches(vec![site]);
    let artifact = compile(&method);
    assert_eq!(artifact.inlined, 0);
    assert_eq!(artifact.sends_done, 1);
}

#[test]
fn test_sites_that_cannot_be_spliced_are_sent() {
    // Arity mismatch.
    let site = cache("add_one");
    site.record(class::OBJECT, ADD_ONE_METHOD, Some(add_one()));
    let zero_args = CompiledMethod::new(
        "caller",
        vec![
            Instruction::PushSelf,
            Instruction::SendMethod { cache: 0 },
            Instruction::Ret,
        ],
    )
    .with_caches(vec![site]);
    assert_eq!(compile(&zero_args).inlined, 0);

    // Callee reads its caller's frame.
    let scoped = Arc::new(
        CompiledMethod::new("scoped", vec![Instruction::PushScope, Instruction::Ret]).with_locals(1, 1),
    );
    let (method, _) = caller_of(scoped, class::OBJECT);
    assert_eq!(compile(&method).inlined, 0);

    // Polymorphic site.
    let (method, site) = caller_of(add_one(), class::OBJECT);
    site.record(class::ARRAY, ADD_ONE_METHOD, None);
    assert_eq!(compile(&method).inlined, 0);
}

#[test]
fn test_raise_inside_the_spliced_body_reaches_the_caller() {
    let inner = cache("explode");
    let callee = Arc::new(
        CompiledMethod::new(
            "explode_with",
            vec![
                Instruction::PushSelf,
                Instruction::SendMethod { cache: 0 },
                Instruction::Ret,
            ],
        )
        .with_locals(1, 1)
        .with_caches(vec![inner.clone()]),
    );
    let (method, site) = caller_of(callee, class::OBJECT);
    let artifact = compile(&method);
    assert_eq!(artifact.inlined, 1);
    assert_eq!(artifact.sends_done, 1);

    let mut vm = MockVm::new();
    vm.track(&site);
    vm.track(&inner);
    let recv = vm.object(class::OBJECT);
    let error = vm.object(class::EXCEPTION);
    vm.define(class::OBJECT, sym("explode"), Reply::Raise(error));
    let result = Harness::new(&method)
        .run(&artifact.function, &mut vm, recv, &[fix(1)])
        .unwrap();
    assert_eq!(result, value::NULL);
    assert_eq!(vm.pending, Some(Pending::Raise(error)));
    assert_eq!(inner.hits(), 1);
}

#[test]
fn test_only_one_level_is_spliced() {
    let inner_site = cache("add_one");
    inner_site.record(class::OBJECT, ADD_ONE_METHOD, Some(add_one()));
    let middle = Arc::new(
        CompiledMethod::new(
            "middle",
            vec![
                Instruction::PushSelf,
                Instruction::PushLocal { index: 0 },
                Instruction::SendStack { cache: 0, args: 1 },
                Instruction::Ret,
            ],
        )
        .with_locals(1, 1)
        .with_caches(vec![inner_site.clone()]),
    );
    let (method, site) = caller_of(middle, class::OBJECT);
    let artifact = compile(&method);
    assert_eq!(artifact.inlined, 1);
    assert_eq!(artifact.function.count_calls(RuntimeHelper::ClassId), 1);

    let mut vm = MockVm::new();
    vm.track(&site);
    vm.track(&inner_site);
    let recv = vm.object(class::OBJECT);
    vm.define(class::OBJECT, sym("add_one"), Reply::Value(fix(8)));
    let result = Harness::new(&method)
        .run(&artifact.function, &mut vm, recv, &[fix(7)])
        .unwrap();
    assert_eq!(result, fix(8));
    assert_eq!(vm.dispatches, 1);
}
