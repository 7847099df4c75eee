use std::rc::Rc;

use ophid::bytecode::{Code, CodeBuilder, CodeFlags, CompareOp, Const, Opcode};
use ophid::{CollectStringPrint, ExcType, RunError, Runtime, Value};

fn run(code: Rc<Code>) -> (Result<Value, RunError>, String) {
    let mut rt = Runtime::with_print(CollectStringPrint::new());
    let result = rt.run(code);
    let output = rt.print_writer().output().to_string();
    (result, output)
}

fn run_ok(code: Rc<Code>) -> String {
    let (result, output) = run(code);
    match result {
        Ok(_) => output,
        Err(e) => panic!("program failed: {e}\noutput so far: {output}"),
    }
}

/// Emits `print(<expr>)` where the expression values are already evaluated by
/// `emit_args`, then the module epilogue.
fn finish_print(mut b: CodeBuilder, argc: u32) -> Rc<Code> {
    b.emit_arg(Opcode::CallFunction, argc);
    b.emit(Opcode::PopTop);
    let none = b.const_none();
    b.emit_arg(Opcode::LoadConst, none);
    b.emit(Opcode::ReturnValue);
    b.build()
}

#[test]
fn test_floor_division_and_modulo() {
    // x = 10; y = 3; print(x // y, x % y)
    let mut b = CodeBuilder::new("<module>");
    let ten = b.const_int(10);
    let three = b.const_int(3);
    let x = b.name("x");
    let y = b.name("y");
    let print = b.name("print");
    b.emit_arg(Opcode::LoadConst, ten);
    b.emit_arg(Opcode::StoreName, x);
    b.emit_arg(Opcode::LoadConst, three);
    b.emit_arg(Opcode::StoreName, y);
    b.emit_arg(Opcode::LoadName, print);
    b.emit_arg(Opcode::LoadName, x);
    b.emit_arg(Opcode::LoadName, y);
    b.emit(Opcode::BinaryFloorDivide);
    b.emit_arg(Opcode::LoadName, x);
    b.emit_arg(Opcode::LoadName, y);
    b.emit(Opcode::BinaryModulo);
    assert_eq!(run_ok(finish_print(b, 2)), "3 1\n");
}

#[test]
fn test_negative_floor_division_rounds_down() {
    // print(-10 // 3, -10 % 3)
    let mut b = CodeBuilder::new("<module>");
    let print = b.name("print");
    let minus_ten = b.const_int(-10);
    let three = b.const_int(3);
    b.emit_arg(Opcode::LoadName, print);
    b.emit_arg(Opcode::LoadConst, minus_ten);
    b.emit_arg(Opcode::LoadConst, three);
    b.emit(Opcode::BinaryFloorDivide);
    b.emit_arg(Opcode::LoadConst, minus_ten);
    b.emit_arg(Opcode::LoadConst, three);
    b.emit(Opcode::BinaryModulo);
    assert_eq!(run_ok(finish_print(b, 2)), "-4 2\n");
}

#[test]
fn test_overflow_promotes_to_long() {
    // print(9223372036854775807 + 1)
    let mut b = CodeBuilder::new("<module>");
    let print = b.name("print");
    let max = b.const_int(i64::MAX);
    let one = b.const_int(1);
    b.emit_arg(Opcode::LoadName, print);
    b.emit_arg(Opcode::LoadConst, max);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit(Opcode::BinaryAdd);
    assert_eq!(run_ok(finish_print(b, 1)), "9223372036854775808\n");
}

#[test]
fn test_unary_negation_of_min_promotes() {
    let mut b = CodeBuilder::new("<module>");
    let print = b.name("print");
    let min = b.const_int(i64::MIN);
    b.emit_arg(Opcode::LoadName, print);
    b.emit_arg(Opcode::LoadConst, min);
    b.emit(Opcode::UnaryNegative);
    assert_eq!(run_ok(finish_print(b, 1)), "9223372036854775808\n");
}

#[test]
fn test_invert_promoted_int() {
    // print(~(1 << 70)) — the operand only exists in the heap representation.
    let mut b = CodeBuilder::new("<module>");
    let print = b.name("print");
    let one = b.const_int(1);
    let seventy = b.const_int(70);
    b.emit_arg(Opcode::LoadName, print);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, seventy);
    b.emit(Opcode::BinaryLshift);
    b.emit(Opcode::UnaryInvert);
    assert_eq!(run_ok(finish_print(b, 1)), "-1180591620717411303425\n");
}

#[test]
fn test_unary_ops() {
    // print(-5, ~5, not 0)
    let mut b = CodeBuilder::new("<module>");
    let print = b.name("print");
    let five = b.const_int(5);
    let zero = b.const_int(0);
    b.emit_arg(Opcode::LoadName, print);
    b.emit_arg(Opcode::LoadConst, five);
    b.emit(Opcode::UnaryNegative);
    b.emit_arg(Opcode::LoadConst, five);
    b.emit(Opcode::UnaryInvert);
    b.emit_arg(Opcode::LoadConst, zero);
    b.emit(Opcode::UnaryNot);
    assert_eq!(run_ok(finish_print(b, 3)), "-5 -6 True\n");
}

#[test]
fn test_integer_power_is_exact() {
    // print(2 ** 100)
    let mut b = CodeBuilder::new("<module>");
    let print = b.name("print");
    let two = b.const_int(2);
    let hundred = b.const_int(100);
    b.emit_arg(Opcode::LoadName, print);
    b.emit_arg(Opcode::LoadConst, two);
    b.emit_arg(Opcode::LoadConst, hundred);
    b.emit(Opcode::BinaryPower);
    assert_eq!(
        run_ok(finish_print(b, 1)),
        "1267650600228229401496703205376\n"
    );
}

#[test]
fn test_float_arithmetic_and_repr() {
    // print(7.0 / 2, 1.0 + 2, 2.5 * 2.0)
    let mut b = CodeBuilder::new("<module>");
    let print = b.name("print");
    let seven = b.add_const(Const::Float(7.0));
    let two = b.const_int(2);
    let one = b.add_const(Const::Float(1.0));
    let half = b.add_const(Const::Float(2.5));
    let two_f = b.add_const(Const::Float(2.0));
    b.emit_arg(Opcode::LoadName, print);
    b.emit_arg(Opcode::LoadConst, seven);
    b.emit_arg(Opcode::LoadConst, two);
    b.emit(Opcode::BinaryTrueDivide);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, two);
    b.emit(Opcode::BinaryAdd);
    b.emit_arg(Opcode::LoadConst, half);
    b.emit_arg(Opcode::LoadConst, two_f);
    b.emit(Opcode::BinaryMultiply);
    assert_eq!(run_ok(finish_print(b, 3)), "3.5 3.0 5.0\n");
}

#[test]
fn test_float_modulo_sign_follows_divisor() {
    // print(-7.0 % 2.0, 7.0 % -2.0)
    let mut b = CodeBuilder::new("<module>");
    let print = b.name("print");
    let neg = b.add_const(Const::Float(-7.0));
    let pos = b.add_const(Const::Float(7.0));
    let two = b.add_const(Const::Float(2.0));
    let neg_two = b.add_const(Const::Float(-2.0));
    b.emit_arg(Opcode::LoadName, print);
    b.emit_arg(Opcode::LoadConst, neg);
    b.emit_arg(Opcode::LoadConst, two);
    b.emit(Opcode::BinaryModulo);
    b.emit_arg(Opcode::LoadConst, pos);
    b.emit_arg(Opcode::LoadConst, neg_two);
    b.emit(Opcode::BinaryModulo);
    assert_eq!(run_ok(finish_print(b, 2)), "1.0 -1.0\n");
}

#[test]
fn test_classic_division_floors_ints() {
    // Without the future-division flag, 7 / 2 floors and 7.0 / 2 is true.
    let mut b = CodeBuilder::new("<module>");
    let print = b.name("print");
    let seven = b.const_int(7);
    let seven_f = b.add_const(Const::Float(7.0));
    let two = b.const_int(2);
    b.emit_arg(Opcode::LoadName, print);
    b.emit_arg(Opcode::LoadConst, seven);
    b.emit_arg(Opcode::LoadConst, two);
    b.emit(Opcode::BinaryDivide);
    b.emit_arg(Opcode::LoadConst, seven_f);
    b.emit_arg(Opcode::LoadConst, two);
    b.emit(Opcode::BinaryDivide);
    assert_eq!(run_ok(finish_print(b, 2)), "3 3.5\n");
}

#[test]
fn test_future_division_flag() {
    let mut b = CodeBuilder::new("<module>");
    b.add_flag(CodeFlags::FUTURE_DIVISION);
    let print = b.name("print");
    let seven = b.const_int(7);
    let two = b.const_int(2);
    b.emit_arg(Opcode::LoadName, print);
    b.emit_arg(Opcode::LoadConst, seven);
    b.emit_arg(Opcode::LoadConst, two);
    b.emit(Opcode::BinaryDivide);
    assert_eq!(run_ok(finish_print(b, 1)), "3.5\n");
}

#[test]
fn test_division_by_zero() {
    let mut b = CodeBuilder::new("<module>");
    let one = b.const_int(1);
    let zero = b.const_int(0);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, zero);
    b.emit(Opcode::BinaryFloorDivide);
    b.emit(Opcode::ReturnValue);
    let (result, _) = run(b.build());
    let Err(RunError::Exc(exc)) = result else {
        panic!("expected an exception");
    };
    assert_eq!(exc.exc_type(), ExcType::ZeroDivisionError);
    assert_eq!(exc.arg(), Some("integer division or modulo by zero"));
}

#[test]
fn test_shifts_and_bitwise() {
    // print(1 << 40, 1 << 80, -1 >> 100, 12 & 10, 12 | 10, 12 ^ 10)
    let mut b = CodeBuilder::new("<module>");
    let print = b.name("print");
    let one = b.const_int(1);
    let neg_one = b.const_int(-1);
    let forty = b.const_int(40);
    let eighty = b.const_int(80);
    let hundred = b.const_int(100);
    let twelve = b.const_int(12);
    let ten = b.const_int(10);
    b.emit_arg(Opcode::LoadName, print);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, forty);
    b.emit(Opcode::BinaryLshift);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, eighty);
    b.emit(Opcode::BinaryLshift);
    b.emit_arg(Opcode::LoadConst, neg_one);
    b.emit_arg(Opcode::LoadConst, hundred);
    b.emit(Opcode::BinaryRshift);
    b.emit_arg(Opcode::LoadConst, twelve);
    b.emit_arg(Opcode::LoadConst, ten);
    b.emit(Opcode::BinaryAnd);
    b.emit_arg(Opcode::LoadConst, twelve);
    b.emit_arg(Opcode::LoadConst, ten);
    b.emit(Opcode::BinaryOr);
    b.emit_arg(Opcode::LoadConst, twelve);
    b.emit_arg(Opcode::LoadConst, ten);
    b.emit(Opcode::BinaryXor);
    assert_eq!(
        run_ok(finish_print(b, 6)),
        "1099511627776 1208925819614629174706176 -1 8 14 6\n"
    );
}

#[test]
fn test_comparisons() {
    // print(1 < 2, 2 <= 1, 1 == 1.0, 1 != True, 3 > 2.5)
    let mut b = CodeBuilder::new("<module>");
    let print = b.name("print");
    let one = b.const_int(1);
    let two = b.const_int(2);
    let one_f = b.add_const(Const::Float(1.0));
    let truthy = b.add_const(Const::Bool(true));
    let three = b.const_int(3);
    let half = b.add_const(Const::Float(2.5));
    b.emit_arg(Opcode::LoadName, print);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, two);
    b.emit_compare(CompareOp::Lt);
    b.emit_arg(Opcode::LoadConst, two);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_compare(CompareOp::Le);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, one_f);
    b.emit_compare(CompareOp::Eq);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, truthy);
    b.emit_compare(CompareOp::Ne);
    b.emit_arg(Opcode::LoadConst, three);
    b.emit_arg(Opcode::LoadConst, half);
    b.emit_compare(CompareOp::Gt);
    assert_eq!(run_ok(finish_print(b, 5)), "True False True False True\n");
}

#[test]
fn test_incomparable_types_is_type_error() {
    let mut b = CodeBuilder::new("<module>");
    let one = b.const_int(1);
    let s = b.const_str("x");
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, s);
    b.emit_compare(CompareOp::Lt);
    b.emit(Opcode::ReturnValue);
    let (result, _) = run(b.build());
    let Err(RunError::Exc(exc)) = result else {
        panic!("expected an exception");
    };
    assert_eq!(exc.exc_type(), ExcType::TypeError);
    assert_eq!(
        exc.arg(),
        Some("'<' not supported between instances of 'int' and 'str'")
    );
}

#[test]
fn test_boolean_short_circuit_keeps_operand() {
    // print(1 and 2, 0 or 3)
    let mut b = CodeBuilder::new("<module>");
    let print = b.name("print");
    let one = b.const_int(1);
    let two = b.const_int(2);
    let zero = b.const_int(0);
    let three = b.const_int(3);
    b.emit_arg(Opcode::LoadName, print);
    let and_end = b.new_label();
    b.emit_arg(Opcode::LoadConst, one);
    b.jump(Opcode::JumpIfFalseOrPop, and_end);
    b.emit_arg(Opcode::LoadConst, two);
    b.bind(and_end);
    let or_end = b.new_label();
    b.emit_arg(Opcode::LoadConst, zero);
    b.jump(Opcode::JumpIfTrueOrPop, or_end);
    b.emit_arg(Opcode::LoadConst, three);
    b.bind(or_end);
    assert_eq!(run_ok(finish_print(b, 2)), "2 3\n");
}

#[test]
fn test_bool_bitwise_stays_bool() {
    // print(True & False, True | False, True ^ True)
    let mut b = CodeBuilder::new("<module>");
    let print = b.name("print");
    let t = b.add_const(Const::Bool(true));
    let f = b.add_const(Const::Bool(false));
    b.emit_arg(Opcode::LoadName, print);
    b.emit_arg(Opcode::LoadConst, t);
    b.emit_arg(Opcode::LoadConst, f);
    b.emit(Opcode::BinaryAnd);
    b.emit_arg(Opcode::LoadConst, t);
    b.emit_arg(Opcode::LoadConst, f);
    b.emit(Opcode::BinaryOr);
    b.emit_arg(Opcode::LoadConst, t);
    b.emit_arg(Opcode::LoadConst, t);
    b.emit(Opcode::BinaryXor);
    assert_eq!(run_ok(finish_print(b, 3)), "False True False\n");
}

#[test]
fn test_extended_arg_reaches_wide_constants() {
    let mut b = CodeBuilder::new("<module>");
    for i in 0..70_000 {
        b.const_int(i);
    }
    b.emit_arg(Opcode::LoadConst, 69_999);
    b.emit(Opcode::ReturnValue);
    let (result, _) = run(b.build());
    assert_eq!(result.unwrap(), Value::Int(69_999));
}

#[test]
fn test_instruction_trace_interleaves_with_output() {
    // print(7) with tracing on: the trace names each opcode and the program's
    // own output still comes through the same writer.
    let mut b = CodeBuilder::new("<module>");
    let print = b.name("print");
    let seven = b.const_int(7);
    let none = b.const_none();
    b.emit_arg(Opcode::LoadName, print);
    b.emit_arg(Opcode::LoadConst, seven);
    b.emit_arg(Opcode::CallFunction, 1);
    b.emit(Opcode::PopTop);
    b.emit_arg(Opcode::LoadConst, none);
    b.emit(Opcode::ReturnValue);

    let mut rt = Runtime::with_print(CollectStringPrint::new());
    rt.set_trace(true);
    rt.run(b.build()).unwrap();
    let output = rt.print_writer().output();
    assert!(output.contains("LoadName"));
    assert!(output.contains("CallFunction 1"));
    assert!(output.contains("ReturnValue"));
    assert!(output.contains("7\n"));
}

#[test]
fn test_mixed_long_float_comparison_is_exact() {
    // (1 << 60) + 1 > float(1 << 60), even though f64 cannot represent the
    // left side.
    let mut b = CodeBuilder::new("<module>");
    let print = b.name("print");
    let one = b.const_int(1);
    let sixty = b.const_int(60);
    let f = b.add_const(Const::Float((1u64 << 60) as f64));
    b.emit_arg(Opcode::LoadName, print);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit_arg(Opcode::LoadConst, sixty);
    b.emit(Opcode::BinaryLshift);
    b.emit_arg(Opcode::LoadConst, one);
    b.emit(Opcode::BinaryAdd);
    b.emit_arg(Opcode::LoadConst, f);
    b.emit_compare(CompareOp::Gt);
    assert_eq!(run_ok(finish_print(b, 1)), "True\n");
}
