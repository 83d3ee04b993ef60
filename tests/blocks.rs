#[cfg(test)]
mod block_tests {
    use minibasic as basic;

    use basic::block;
    use basic::error::BasicError;
    use basic::exec::Runtime;
    use basic::value::Value;

    /// Run a program to completion, returning the runtime for inspection.
    fn run(source: &str) -> Runtime {
        let mut rt = Runtime::new();
        let root = rt.root();
        let nodes = block::parse_program(source).unwrap();
        rt.execute(root, &nodes).unwrap();
        rt
    }

    /// Run a program expected to fail, returning the error and the runtime
    /// as it stood at the failure point.
    fn run_err(source: &str) -> (BasicError, Runtime) {
        let mut rt = Runtime::new();
        let root = rt.root();
        let nodes = block::parse_program(source).unwrap();
        let err = rt.execute(root, &nodes).unwrap_err();
        (err, rt)
    }

    fn global(rt: &Runtime, name: &str) -> Value {
        rt.scopes.get_variable(rt.root(), name).unwrap()
    }

    #[test]
    fn test_blocks_01_while_reevaluates_condition_each_iteration() {
        let rt = run("x$ = 0\nWHILE x$ < 3\nx$ = x$ + 1\nENDWHILE");
        assert_eq!(global(&rt, "x"), Value::Number(3.0));
    }

    #[test]
    fn test_blocks_02_do_loop_body_runs_at_least_once() {
        let rt = run("x$ = 0\nDO\nx$ = x$ + 1\nLOOP UNTIL TRUE");
        assert_eq!(global(&rt, "x"), Value::Number(1.0));

        let rt = run("x$ = 0\nDO\nx$ = x$ + 1\nLOOP WHILE x$ < 3");
        assert_eq!(global(&rt, "x"), Value::Number(3.0));
    }

    #[test]
    fn test_blocks_03_if_else_branches() {
        let rt = run("IF 1 < 2 THEN\nr$ = \"then\"\nELSE\nr$ = \"else\"\nENDIF");
        assert_eq!(global(&rt, "r"), Value::Str("then".to_string()));

        let rt = run("IF 1 > 2 THEN\nr$ = \"then\"\nELSE\nr$ = \"else\"\nENDIF");
        assert_eq!(global(&rt, "r"), Value::Str("else".to_string()));
    }

    #[test]
    fn test_blocks_04_select_dispatches_and_falls_to_default() {
        let src = "\
x$ = 2
SELECT x$
CASE 1
r$ = \"one\"
CASE 2
r$ = \"two\"
DEFAULT
r$ = \"other\"
ENDSELECT";
        assert_eq!(global(&run(src), "r"), Value::Str("two".to_string()));

        let rt = run(&src.replace("x$ = 2", "x$ = 99"));
        assert_eq!(global(&rt, "r"), Value::Str("other".to_string()));
    }

    #[test]
    fn test_blocks_05_select_duplicate_values_fatal_even_without_match() {
        // Labels differ textually but evaluate to the same value; the
        // selector matches neither arm.
        let src = "\
x$ = 99
SELECT x$
CASE 1 + 0
r$ = \"a\"
CASE 2 - 1
r$ = \"b\"
ENDSELECT";
        let (err, _) = run_err(src);
        assert!(matches!(err, BasicError::DuplicateCase { .. }));
    }

    #[test]
    fn test_blocks_06_function_call_and_return_value() {
        let src = "\
FUNCTION add(a$, b$)
RETURN a$ + b$
ENDFUNCTION
r$ = add(2, 3)";
        assert_eq!(global(&run(src), "r"), Value::Number(5.0));
    }

    #[test]
    fn test_blocks_07_function_without_return_yields_null() {
        let src = "\
FUNCTION noop()
x$ = 1
ENDFUNCTION
r$ = noop()";
        assert_eq!(global(&run(src), "r"), Value::Null);
    }

    #[test]
    fn test_blocks_08_locals_shadow_globals_and_vanish_after_the_call() {
        let src = "\
x$ = 1
FUNCTION f()
x$ = 2
RETURN x$
ENDFUNCTION
r$ = f()";
        let rt = run(src);
        assert_eq!(global(&rt, "r"), Value::Number(2.0));
        assert_eq!(global(&rt, "x"), Value::Number(1.0));
    }

    #[test]
    fn test_blocks_09_function_reads_enclosing_scope() {
        let src = "\
g$ = 10
FUNCTION f()
RETURN g$ + 1
ENDFUNCTION
r$ = f()";
        assert_eq!(global(&run(src), "r"), Value::Number(11.0));
    }

    #[test]
    fn test_blocks_10_return_unwinds_through_loops() {
        let src = "\
FUNCTION first()
i$ = 0
WHILE TRUE
IF i$ = 2 THEN
RETURN i$
ENDIF
i$ = i$ + 1
ENDWHILE
RETURN -1
ENDFUNCTION
r$ = first()";
        assert_eq!(global(&run(src), "r"), Value::Number(2.0));
    }

    #[test]
    fn test_blocks_11_arity_mismatch_before_any_side_effect() {
        let src = "\
FUNCTION bump()
RAISE 500
RETURN 1
ENDFUNCTION
r$ = abs(bump(), 2)";
        let (err, rt) = run_err(src);
        assert!(matches!(err, BasicError::ArgumentCount { .. }));
        // bump() never ran, so the status channel is untouched.
        assert_eq!(rt.status, 200);
    }

    #[test]
    fn test_blocks_12_break_exits_innermost_loop_only() {
        let src = "\
total$ = 0
i$ = 0
WHILE i$ < 3
j$ = 0
WHILE TRUE
j$ = j$ + 1
IF j$ = 2 THEN
BREAK
ENDIF
ENDWHILE
total$ = total$ + j$
i$ = i$ + 1
ENDWHILE";
        let rt = run(src);
        assert_eq!(global(&rt, "total"), Value::Number(6.0));
        assert_eq!(global(&rt, "i"), Value::Number(3.0));
    }

    #[test]
    fn test_blocks_13_exit_stops_the_program() {
        let rt = run("x$ = 1\nEXIT\nx$ = 2");
        assert_eq!(global(&rt, "x"), Value::Number(1.0));
        assert!(rt.exit_request);
    }

    #[test]
    fn test_blocks_14_return_outside_function_is_an_error() {
        let (err, _) = run_err("RETURN 1");
        assert!(matches!(err, BasicError::OutsideFunction { .. }));

        let (err, _) = run_err("RAISE 404");
        assert!(matches!(err, BasicError::OutsideFunction { .. }));
    }

    #[test]
    fn test_blocks_15_raise_sets_status_read_back_by_error_macro() {
        let src = "\
FUNCTION fail()
RAISE 404
RETURN 0
ENDFUNCTION
x$ = fail()
IF @error = 404 THEN
handled$ = TRUE
ENDIF";
        let rt = run(src);
        assert_eq!(rt.status, 404);
        assert_eq!(global(&rt, "handled"), Value::Bool(true));

        // Codes outside the 0..=65535 range are rejected, not wrapped.
        for bad in ["RAISE -5", "RAISE 70000", "RAISE 1.5"] {
            let src = format!("FUNCTION f()\n{}\nENDFUNCTION\nx$ = f()", bad);
            let (err, rt) = run_err(&src);
            assert!(matches!(err, BasicError::ArgumentType { .. }));
            assert_eq!(rt.status, 200);
        }
    }

    #[test]
    fn test_blocks_16_short_circuit_skips_side_effecting_call() {
        let src = "\
FUNCTION eff()
RAISE 500
RETURN TRUE
ENDFUNCTION
a$ = FALSE AND eff()
b$ = TRUE OR eff()";
        let rt = run(src);
        assert_eq!(global(&rt, "a"), Value::Bool(false));
        assert_eq!(global(&rt, "b"), Value::Bool(true));
        assert_eq!(rt.status, 200);
    }

    #[test]
    fn test_blocks_17_constants_are_write_once() {
        let rt = run("CONST pi$ = 3.14\nr$ = pi$ * 2");
        assert_eq!(global(&rt, "r"), Value::Number(6.28));

        let (err, _) = run_err("CONST pi$ = 3.14\nCONST pi$ = 3");
        assert!(matches!(err, BasicError::ConstantRedefined(_)));

        // Plain assignment is rejected too, and the binding stays intact.
        let (err, rt) = run_err("CONST pi$ = 3.14\npi$ = 5\nr$ = pi$");
        assert!(matches!(err, BasicError::ConstantRedefined(_)));
        assert_eq!(global(&rt, "pi"), Value::Number(3.14));
    }

    #[test]
    fn test_blocks_18_array_allocation_and_element_assignment() {
        let src = "\
a$ = array(3)
a$[0] = 5
a$[2] = a$[0] + 1
n$ = len(a$)";
        let rt = run(src);
        assert_eq!(global(&rt, "n"), Value::Number(3.0));
        assert_eq!(
            global(&rt, "a"),
            Value::Array(vec![Value::Number(5.0), Value::Null, Value::Number(6.0)])
        );

        let (err, _) = run_err("a$ = array(2)\na$[5] = 1");
        assert!(matches!(err, BasicError::IndexOutOfRange { .. }));
    }

    #[test]
    fn test_blocks_19_class_instantiation_and_members() {
        let src = "\
CLASS Point
x$ = 0
y$ = 0
FUNCTION mag2()
RETURN x$ * x$ + y$ * y$
ENDFUNCTION
ENDCLASS
p$ = NEW Point()
p$.x$ = 3
p$.y$ = 4
m$ = p$.mag2()
zero$ = NEW Point()
z$ = zero$.x$";
        let rt = run(src);
        assert_eq!(global(&rt, "m"), Value::Number(25.0));
        // A second instance gets its own fresh fields.
        assert_eq!(global(&rt, "z"), Value::Number(0.0));
    }

    #[test]
    fn test_blocks_20_class_inheritance_and_override() {
        let src = "\
CLASS Animal
legs$ = 4
FUNCTION speak()
RETURN \"...\"
ENDFUNCTION
ENDCLASS
CLASS Dog EXTENDS Animal
FUNCTION speak()
RETURN \"woof\"
ENDFUNCTION
ENDCLASS
d$ = NEW Dog()
legs$ = d$.legs$
sound$ = d$.speak()";
        let rt = run(src);
        assert_eq!(global(&rt, "legs"), Value::Number(4.0));
        assert_eq!(global(&rt, "sound"), Value::Str("woof".to_string()));
    }

    #[test]
    fn test_blocks_21_member_access_on_non_instance_fails() {
        let (err, _) = run_err("n$ = 1\nn$.x$ = 2");
        assert!(matches!(err, BasicError::OperatorNotApplicable { .. }));

        let (err, _) = run_err("n$ = 1\ny$ = n$.x$");
        assert!(matches!(err, BasicError::OperatorNotApplicable { .. }));
    }

    #[test]
    fn test_blocks_22_new_requires_a_defined_class() {
        let (err, _) = run_err("p$ = NEW Ghost()");
        assert!(matches!(err, BasicError::UndefinedObject(_)));
    }

    #[test]
    fn test_blocks_23_function_names_are_case_insensitive() {
        let src = "\
FUNCTION Greet()
RETURN \"hi\"
ENDFUNCTION
r$ = GREET()";
        assert_eq!(global(&run(src), "r"), Value::Str("hi".to_string()));
    }

    #[test]
    fn test_blocks_24_let_is_plain_assignment() {
        let rt = run("LET x$ = 7\ny$ = x$ + 1");
        assert_eq!(global(&rt, "y"), Value::Number(8.0));
    }

    #[test]
    fn test_blocks_25_user_function_arity_mismatch() {
        let src = "\
FUNCTION add(a$, b$)
RETURN a$ + b$
ENDFUNCTION
r$ = add(1)";
        let (err, _) = run_err(src);
        match err {
            BasicError::ArgumentCount { expected, got, .. } => {
                assert_eq!(expected, 2);
                assert_eq!(got, 1);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_blocks_26_single_equals_without_lvalue_is_equality() {
        // `1 = 1` is a bare expression statement, and the same spelling
        // still compares inside an IF condition.
        let rt = run("1 = 1\nIF 2 + 2 = 4 THEN\nok$ = TRUE\nENDIF");
        assert_eq!(global(&rt, "ok"), Value::Bool(true));
    }
}
