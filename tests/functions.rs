use std::rc::Rc;

use ophid::bytecode::{Code, CodeBuilder, CompareOp, Opcode};
use ophid::{CollectStringPrint, ExcType, RunError, Runtime, Value};

fn run(code: Rc<Code>) -> (Result<Value, RunError>, String) {
    let mut rt = Runtime::with_print(CollectStringPrint::new());
    let result = rt.run(code);
    let output = rt.print_writer().output().to_string();
    (result, output)
}

fn run_value(code: Rc<Code>) -> Value {
    match run(code) {
        (Ok(value), _) => value,
        (Err(e), output) => panic!("program failed: {e}\noutput so far: {output}"),
    }
}

fn expect_exc(code: Rc<Code>) -> ophid::SimpleException {
    match run(code).0 {
        Err(RunError::Exc(exc)) => exc,
        other => panic!("expected an exception, got {other:?}"),
    }
}

/// `def add(a, b=10): return a + b`
fn add_code() -> Rc<Code> {
    let mut f = CodeBuilder::new("add");
    f.param("a").param("b");
    f.emit_arg(Opcode::LoadFast, 0);
    f.emit_arg(Opcode::LoadFast, 1);
    f.emit(Opcode::BinaryAdd);
    f.emit(Opcode::ReturnValue);
    f.build()
}

/// Module prologue binding `add` with one default (b=10).
fn bind_add(b: &mut CodeBuilder) -> u32 {
    let ten = b.const_int(10);
    let fc = b.const_code(add_code());
    let add = b.name("add");
    b.emit_arg(Opcode::LoadConst, ten);
    b.emit_arg(Opcode::LoadConst, fc);
    b.emit_arg(Opcode::MakeFunction, 1);
    b.emit_arg(Opcode::StoreName, add);
    add
}

#[test]
fn test_default_argument_fills_missing() {
    let mut b = CodeBuilder::new("<module>");
    let add = bind_add(&mut b);
    let one = b.const_int(1);
    b.emit_arg(Opcode::LoadName, add);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::CallFunction, 1);
    b.emit(Opcode::ReturnValue);
    assert_eq!(run_value(b.build()), Value::Int(11));
}

#[test]
fn test_positional_overrides_default() {
    let mut b = CodeBuilder::new("<module>");
    let add = bind_add(&mut b);
    let one = b.const_int(1);
    let two = b.const_int(2);
    b.emit_arg(Opcode::LoadName, add);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, two);
    b.emit_arg(Opcode::CallFunction, 2);
    b.emit(Opcode::ReturnValue);
    assert_eq!(run_value(b.build()), Value::Int(3));
}

#[test]
fn test_keyword_argument_binds_by_name() {
    // add(1, b=7)
    let mut b = CodeBuilder::new("<module>");
    let add = bind_add(&mut b);
    let one = b.const_int(1);
    let b_key = b.const_str("b");
    let seven = b.const_int(7);
    b.emit_arg(Opcode::LoadName, add);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, b_key);
    b.emit_arg(Opcode::LoadConst, seven);
    b.emit_arg(Opcode::CallFunction, (1 << 8) | 1);
    b.emit(Opcode::ReturnValue);
    assert_eq!(run_value(b.build()), Value::Int(8));
}

#[test]
fn test_duplicate_keyword_argument() {
    // add(1, a=2)
    let mut b = CodeBuilder::new("<module>");
    let add = bind_add(&mut b);
    let one = b.const_int(1);
    let a_key = b.const_str("a");
    let two = b.const_int(2);
    b.emit_arg(Opcode::LoadName, add);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, a_key);
    b.emit_arg(Opcode::LoadConst, two);
    b.emit_arg(Opcode::CallFunction, (1 << 8) | 1);
    b.emit(Opcode::ReturnValue);
    let exc = expect_exc(b.build());
    assert_eq!(exc.exc_type(), ExcType::TypeError);
    assert_eq!(
        exc.arg(),
        Some("add() got multiple values for keyword argument 'a'")
    );
}

#[test]
fn test_unexpected_keyword_argument() {
    let mut b = CodeBuilder::new("<module>");
    let add = bind_add(&mut b);
    let one = b.const_int(1);
    let c_key = b.const_str("c");
    let two = b.const_int(2);
    b.emit_arg(Opcode::LoadName, add);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, c_key);
    b.emit_arg(Opcode::LoadConst, two);
    b.emit_arg(Opcode::CallFunction, (1 << 8) | 1);
    b.emit(Opcode::ReturnValue);
    let exc = expect_exc(b.build());
    assert_eq!(
        exc.arg(),
        Some("add() got an unexpected keyword argument 'c'")
    );
}

#[test]
fn test_arg_count_errors() {
    // add() -> at least 1 (has a default); f() with no defaults -> exactly.
    let mut b = CodeBuilder::new("<module>");
    let add = bind_add(&mut b);
    b.emit_arg(Opcode::LoadName, add);
    b.emit_arg(Opcode::CallFunction, 0);
    b.emit(Opcode::ReturnValue);
    let exc = expect_exc(b.build());
    assert_eq!(exc.arg(), Some("add() takes at least 1 argument (0 given)"));

    let mut b = CodeBuilder::new("<module>");
    let add = bind_add(&mut b);
    let one = b.const_int(1);
    b.emit_arg(Opcode::LoadName, add);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::CallFunction, 3);
    b.emit(Opcode::ReturnValue);
    let exc = expect_exc(b.build());
    assert_eq!(exc.arg(), Some("add() takes at most 2 arguments (3 given)"));

    // def f(x): pass — called with no arguments.
    let mut f = CodeBuilder::new("f");
    f.param("x");
    let none = f.const_none();
    f.emit_arg(Opcode::LoadConst, none);
    f.emit(Opcode::ReturnValue);
    let f_code = f.build();
    let mut b = CodeBuilder::new("<module>");
    let fc = b.const_code(f_code);
    b.emit_arg(Opcode::LoadConst, fc);
    b.emit_arg(Opcode::MakeFunction, 0);
    b.emit_arg(Opcode::CallFunction, 0);
    b.emit(Opcode::ReturnValue);
    let exc = expect_exc(b.build());
    assert_eq!(exc.arg(), Some("f() takes exactly 1 argument (0 given)"));
}

#[test]
fn test_varargs_collects_extras() {
    // def count(*args): return len(args)
    let mut f = CodeBuilder::new("count");
    f.varargs("args");
    let len_n = f.name("len");
    f.emit_arg(Opcode::LoadGlobal, len_n);
    f.emit_arg(Opcode::LoadFast, 0);
    f.emit_arg(Opcode::CallFunction, 1);
    f.emit(Opcode::ReturnValue);
    let f_code = f.build();

    let mut b = CodeBuilder::new("<module>");
    let fc = b.const_code(f_code);
    let one = b.const_int(1);
    b.emit_arg(Opcode::LoadConst, fc);
    b.emit_arg(Opcode::MakeFunction, 0);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::CallFunction, 3);
    b.emit(Opcode::ReturnValue);
    assert_eq!(run_value(b.build()), Value::Int(3));
}

#[test]
fn test_varkeywords_collects_extras() {
    // def kw(**opts): return len(opts)
    let mut f = CodeBuilder::new("kw");
    f.varkeywords("opts");
    let len_n = f.name("len");
    f.emit_arg(Opcode::LoadGlobal, len_n);
    f.emit_arg(Opcode::LoadFast, 0);
    f.emit_arg(Opcode::CallFunction, 1);
    f.emit(Opcode::ReturnValue);
    let f_code = f.build();

    // kw(x=1, y=2)
    let mut b = CodeBuilder::new("<module>");
    let fc = b.const_code(f_code);
    let x_key = b.const_str("x");
    let y_key = b.const_str("y");
    let one = b.const_int(1);
    let two = b.const_int(2);
    b.emit_arg(Opcode::LoadConst, fc);
    b.emit_arg(Opcode::MakeFunction, 0);
    b.emit_arg(Opcode::LoadConst, x_key);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, y_key);
    b.emit_arg(Opcode::LoadConst, two);
    b.emit_arg(Opcode::CallFunction, 2 << 8);
    b.emit(Opcode::ReturnValue);
    assert_eq!(run_value(b.build()), Value::Int(2));
}

#[test]
fn test_star_call_spreads_sequence() {
    // add(*(3, 4))
    let mut b = CodeBuilder::new("<module>");
    let add = bind_add(&mut b);
    let three = b.const_int(3);
    let four = b.const_int(4);
    b.emit_arg(Opcode::LoadName, add);
    b.emit_arg(Opcode::LoadConst, three);
    b.emit_arg(Opcode::LoadConst, four);
    b.emit_arg(Opcode::BuildTuple, 2);
    b.emit_arg(Opcode::CallFunctionVar, 0);
    b.emit(Opcode::ReturnValue);
    assert_eq!(run_value(b.build()), Value::Int(7));
}

#[test]
fn test_double_star_call_spreads_mapping() {
    // d = {"b": 5}; add(1, **d)
    let mut b = CodeBuilder::new("<module>");
    let add = bind_add(&mut b);
    let one = b.const_int(1);
    let five = b.const_int(5);
    let b_key = b.const_str("b");
    let d = b.name("d");
    b.emit_arg(Opcode::BuildMap, 0);
    b.emit_arg(Opcode::StoreName, d);
    b.emit_arg(Opcode::LoadConst, five);
    b.emit_arg(Opcode::LoadName, d);
    b.emit_arg(Opcode::LoadConst, b_key);
    b.emit(Opcode::StoreSubscr);
    b.emit_arg(Opcode::LoadName, add);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadName, d);
    b.emit_arg(Opcode::CallFunctionKw, 1);
    b.emit(Opcode::ReturnValue);
    assert_eq!(run_value(b.build()), Value::Int(6));
}

#[test]
fn test_star_arg_must_be_sequence() {
    let mut b = CodeBuilder::new("<module>");
    let add = bind_add(&mut b);
    let one = b.const_int(1);
    b.emit_arg(Opcode::LoadName, add);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::CallFunctionVar, 0);
    b.emit(Opcode::ReturnValue);
    let exc = expect_exc(b.build());
    assert_eq!(exc.arg(), Some("argument after * must be a sequence, not int"));
}

#[test]
fn test_calling_a_non_callable() {
    let mut b = CodeBuilder::new("<module>");
    let one = b.const_int(1);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::CallFunction, 0);
    b.emit(Opcode::ReturnValue);
    let exc = expect_exc(b.build());
    assert_eq!(exc.exc_type(), ExcType::TypeError);
    assert_eq!(exc.arg(), Some("'int' object is not callable"));
}

#[test]
fn test_closure_captures_enclosing_variable() {
    // def make_adder(n):
    //     def add(m): return n + m
    //     return add
    // print(make_adder(3)(4))
    let mut inner = CodeBuilder::new("add");
    inner.param("m");
    let n_free = inner.freevar("n");
    inner.emit_arg(Opcode::LoadDeref, n_free);
    inner.emit_arg(Opcode::LoadFast, 0);
    inner.emit(Opcode::BinaryAdd);
    inner.emit(Opcode::ReturnValue);
    let inner_code = inner.build();

    let mut outer = CodeBuilder::new("make_adder");
    outer.param("n");
    let n_cell = outer.cellvar("n");
    let ic = outer.const_code(inner_code);
    outer.emit_arg(Opcode::LoadClosure, n_cell);
    outer.emit_arg(Opcode::BuildTuple, 1);
    outer.emit_arg(Opcode::LoadConst, ic);
    outer.emit_arg(Opcode::MakeClosure, 0);
    outer.emit(Opcode::ReturnValue);
    let outer_code = outer.build();

    let mut b = CodeBuilder::new("<module>");
    let oc = b.const_code(outer_code);
    let three = b.const_int(3);
    let four = b.const_int(4);
    b.emit_arg(Opcode::LoadConst, oc);
    b.emit_arg(Opcode::MakeFunction, 0);
    b.emit_arg(Opcode::LoadConst, three);
    b.emit_arg(Opcode::CallFunction, 1);
    b.emit_arg(Opcode::LoadConst, four);
    b.emit_arg(Opcode::CallFunction, 1);
    b.emit(Opcode::ReturnValue);
    assert_eq!(run_value(b.build()), Value::Int(7));
}

#[test]
fn test_closure_cell_is_shared() {
    // def make():
    //     def get(): return x
    //     x = 1
    //     return get
    // make()()   — the cell write after the closure was made is visible.
    let mut inner = CodeBuilder::new("get");
    let x_free = inner.freevar("x");
    inner.emit_arg(Opcode::LoadDeref, x_free);
    inner.emit(Opcode::ReturnValue);
    let inner_code = inner.build();

    let mut outer = CodeBuilder::new("make");
    let x_cell = outer.cellvar("x");
    let ic = outer.const_code(inner_code);
    let one = outer.const_int(1);
    outer.emit_arg(Opcode::LoadClosure, x_cell);
    outer.emit_arg(Opcode::BuildTuple, 1);
    outer.emit_arg(Opcode::LoadConst, ic);
    outer.emit_arg(Opcode::MakeClosure, 0);
    outer.emit_arg(Opcode::LoadConst, one);
    outer.emit_arg(Opcode::StoreDeref, x_cell);
    outer.emit(Opcode::ReturnValue);
    let outer_code = outer.build();

    let mut b = CodeBuilder::new("<module>");
    let oc = b.const_code(outer_code);
    b.emit_arg(Opcode::LoadConst, oc);
    b.emit_arg(Opcode::MakeFunction, 0);
    b.emit_arg(Opcode::CallFunction, 0);
    b.emit_arg(Opcode::CallFunction, 0);
    b.emit(Opcode::ReturnValue);
    assert_eq!(run_value(b.build()), Value::Int(1));
}

#[test]
fn test_unbound_free_variable() {
    // The cell exists but nothing ever stored into it.
    let mut inner = CodeBuilder::new("get");
    let x_free = inner.freevar("x");
    inner.emit_arg(Opcode::LoadDeref, x_free);
    inner.emit(Opcode::ReturnValue);
    let inner_code = inner.build();

    let mut outer = CodeBuilder::new("make");
    let x_cell = outer.cellvar("x");
    let ic = outer.const_code(inner_code);
    outer.emit_arg(Opcode::LoadClosure, x_cell);
    outer.emit_arg(Opcode::BuildTuple, 1);
    outer.emit_arg(Opcode::LoadConst, ic);
    outer.emit_arg(Opcode::MakeClosure, 0);
    outer.emit(Opcode::ReturnValue);
    let outer_code = outer.build();

    let mut b = CodeBuilder::new("<module>");
    let oc = b.const_code(outer_code);
    b.emit_arg(Opcode::LoadConst, oc);
    b.emit_arg(Opcode::MakeFunction, 0);
    b.emit_arg(Opcode::CallFunction, 0);
    b.emit_arg(Opcode::CallFunction, 0);
    b.emit(Opcode::ReturnValue);
    let exc = expect_exc(b.build());
    assert_eq!(exc.exc_type(), ExcType::NameError);
    assert_eq!(
        exc.arg(),
        Some("free variable 'x' referenced before assignment in enclosing scope")
    );
}

#[test]
fn test_recursion_limit() {
    // def f(): return f()
    let mut f = CodeBuilder::new("f");
    let f_g = f.name("f");
    f.emit_arg(Opcode::LoadGlobal, f_g);
    f.emit_arg(Opcode::CallFunction, 0);
    f.emit(Opcode::ReturnValue);
    let f_code = f.build();

    let mut b = CodeBuilder::new("<module>");
    let fc = b.const_code(f_code);
    let f_n = b.name("f");
    b.emit_arg(Opcode::LoadConst, fc);
    b.emit_arg(Opcode::MakeFunction, 0);
    b.emit_arg(Opcode::StoreName, f_n);
    b.emit_arg(Opcode::LoadName, f_n);
    b.emit_arg(Opcode::CallFunction, 0);
    b.emit(Opcode::ReturnValue);

    let mut rt = Runtime::with_print(CollectStringPrint::new());
    rt.set_recursion_limit(50);
    let err = rt.run(b.build()).unwrap_err();
    let exc = err.as_exc().unwrap();
    assert_eq!(exc.exc_type(), ExcType::RecursionError);
    assert_eq!(exc.arg(), Some("maximum recursion depth exceeded"));
}

#[test]
fn test_deep_recursion_within_limit() {
    // def down(n): return n if n == 0 else down(n - 1)
    // 900 frames deep finishes cleanly under the default limit; call depth
    // lives on the interpreter's own frame stack, not the host stack.
    let mut f = CodeBuilder::new("down");
    f.param("n");
    let zero = f.const_int(0);
    let one = f.const_int(1);
    let down_g = f.name("down");
    let recurse = f.new_label();
    f.emit_arg(Opcode::LoadFast, 0);
    f.emit_arg(Opcode::LoadConst, zero);
    f.emit_compare(CompareOp::Eq);
    f.jump(Opcode::PopJumpIfFalse, recurse);
    f.emit_arg(Opcode::LoadFast, 0);
    f.emit(Opcode::ReturnValue);
    f.bind(recurse);
    f.emit_arg(Opcode::LoadGlobal, down_g);
    f.emit_arg(Opcode::LoadFast, 0);
    f.emit_arg(Opcode::LoadConst, one);
    f.emit(Opcode::BinarySubtract);
    f.emit_arg(Opcode::CallFunction, 1);
    f.emit(Opcode::ReturnValue);
    let f_code = f.build();

    let mut b = CodeBuilder::new("<module>");
    let fc = b.const_code(f_code);
    let depth = b.const_int(900);
    let down_n = b.name("down");
    b.emit_arg(Opcode::LoadConst, fc);
    b.emit_arg(Opcode::MakeFunction, 0);
    b.emit_arg(Opcode::StoreName, down_n);
    b.emit_arg(Opcode::LoadName, down_n);
    b.emit_arg(Opcode::LoadConst, depth);
    b.emit_arg(Opcode::CallFunction, 1);
    b.emit(Opcode::ReturnValue);
    assert_eq!(run_value(b.build()), Value::Int(0));
}

#[test]
fn test_recursive_function_terminates() {
    // def fib(n): return n if n < 2 else fib(n-1) + fib(n-2)
    let mut f = CodeBuilder::new("fib");
    f.param("n");
    let two = f.const_int(2);
    let one = f.const_int(1);
    let fib_g = f.name("fib");
    let recurse = f.new_label();
    f.emit_arg(Opcode::LoadFast, 0);
    f.emit_arg(Opcode::LoadConst, two);
    f.emit_compare(CompareOp::Lt);
    f.jump(Opcode::PopJumpIfFalse, recurse);
    f.emit_arg(Opcode::LoadFast, 0);
    f.emit(Opcode::ReturnValue);
    f.bind(recurse);
    f.emit_arg(Opcode::LoadGlobal, fib_g);
    f.emit_arg(Opcode::LoadFast, 0);
    f.emit_arg(Opcode::LoadConst, one);
    f.emit(Opcode::BinarySubtract);
    f.emit_arg(Opcode::CallFunction, 1);
    f.emit_arg(Opcode::LoadGlobal, fib_g);
    f.emit_arg(Opcode::LoadFast, 0);
    f.emit_arg(Opcode::LoadConst, two);
    f.emit(Opcode::BinarySubtract);
    f.emit_arg(Opcode::CallFunction, 1);
    f.emit(Opcode::BinaryAdd);
    f.emit(Opcode::ReturnValue);
    let f_code = f.build();

    let mut b = CodeBuilder::new("<module>");
    let fc = b.const_code(f_code);
    let ten = b.const_int(10);
    let fib_n = b.name("fib");
    b.emit_arg(Opcode::LoadConst, fc);
    b.emit_arg(Opcode::MakeFunction, 0);
    b.emit_arg(Opcode::StoreName, fib_n);
    b.emit_arg(Opcode::LoadName, fib_n);
    b.emit_arg(Opcode::LoadConst, ten);
    b.emit_arg(Opcode::CallFunction, 1);
    b.emit(Opcode::ReturnValue);
    assert_eq!(run_value(b.build()), Value::Int(55));
}

#[test]
fn test_unbound_local() {
    // def f(): return x   — where x is a local that was never assigned.
    let mut f = CodeBuilder::new("f");
    let x = f.varname("x");
    f.emit_arg(Opcode::LoadFast, x);
    f.emit(Opcode::ReturnValue);
    let f_code = f.build();

    let mut b = CodeBuilder::new("<module>");
    let fc = b.const_code(f_code);
    b.emit_arg(Opcode::LoadConst, fc);
    b.emit_arg(Opcode::MakeFunction, 0);
    b.emit_arg(Opcode::CallFunction, 0);
    b.emit(Opcode::ReturnValue);
    let exc = expect_exc(b.build());
    assert_eq!(exc.exc_type(), ExcType::UnboundLocalError);
    assert_eq!(
        exc.arg(),
        Some("local variable 'x' referenced before assignment")
    );
}

#[test]
fn test_embedder_call_api() {
    // The module returns `add`; the embedder calls it directly.
    let mut b = CodeBuilder::new("<module>");
    let add = bind_add(&mut b);
    b.emit_arg(Opcode::LoadName, add);
    b.emit(Opcode::ReturnValue);

    let mut rt = Runtime::with_print(CollectStringPrint::new());
    let func = rt.run(b.build()).unwrap();
    let result = rt.call(func, vec![Value::Int(30), Value::Int(12)]).unwrap();
    assert_eq!(result, Value::Int(42));
}
