#[cfg(test)]
mod evaluator_tests {
    use minibasic as basic;

    use basic::error::BasicError;
    use basic::evaluator::Evaluator;
    use basic::exec::Runtime;
    use basic::value::Value;

    fn eval(source: &str) -> Value {
        let mut rt = Runtime::new();
        eval_in(&mut rt, source)
    }

    fn eval_in(rt: &mut Runtime, source: &str) -> Value {
        let root = rt.root();
        Evaluator::new(source, 1).evaluate(rt, root).unwrap()
    }

    fn eval_err(source: &str) -> BasicError {
        let mut rt = Runtime::new();
        let root = rt.root();
        Evaluator::new(source, 1).evaluate(&mut rt, root).unwrap_err()
    }

    #[test]
    fn test_eval_01_precedence_over_flat_token_list() {
        assert_eq!(eval("2 + 3 * 4"), Value::Number(14.0));
        assert_eq!(eval("(2 + 3) * 4"), Value::Number(20.0));
        assert_eq!(eval("10 - 2 - 3"), Value::Number(5.0));
    }

    #[test]
    fn test_eval_02_unary_minus_against_binary_minus() {
        assert_eq!(eval("3 - -2"), Value::Number(5.0));
        assert_eq!(eval("- -2"), Value::Number(2.0));
        assert_eq!(eval("-(1 + 2)"), Value::Number(-3.0));
    }

    #[test]
    fn test_eval_03_string_concatenation() {
        assert_eq!(eval("\"foo\" + 123"), Value::Str("foo123".to_string()));
        assert_eq!(eval("\"a\" + \"b\" + \"c\""), Value::Str("abc".to_string()));

        // An all-digit concatenation narrows to a number at the end.
        assert_eq!(eval("123 + \"4\""), Value::Number(1234.0));
    }

    #[test]
    fn test_eval_04_equality_is_comparison_in_expressions() {
        assert_eq!(eval("1 = 1"), Value::Bool(true));
        assert_eq!(eval("1 == 2"), Value::Bool(false));
        assert_eq!(eval("\"abc\" = \"abc\""), Value::Bool(true));
        assert_eq!(eval("1 <> 2"), Value::Bool(true));
        assert_eq!(eval("1 ~= 1"), Value::Bool(false));
        assert_eq!(eval("1 != 1"), Value::Bool(false));
    }

    #[test]
    fn test_eval_05_comparison_spellings() {
        assert_eq!(eval("1 <= 1"), Value::Bool(true));
        assert_eq!(eval("1 =< 2"), Value::Bool(true));
        assert_eq!(eval("2 => 2"), Value::Bool(true));
        assert_eq!(eval("\"abc\" < \"abd\""), Value::Bool(true));
    }

    #[test]
    fn test_eval_06_not_applies_to_truthiness() {
        assert_eq!(eval("NOT TRUE"), Value::Bool(false));
        assert_eq!(eval("NOT (1 = 1)"), Value::Bool(false));
        assert_eq!(eval("NOT 0"), Value::Bool(true));
        assert_eq!(eval("not \"\""), Value::Bool(true));
    }

    #[test]
    fn test_eval_07_short_circuit_never_forces_right_group() {
        // The right operand would divide by zero if evaluated.
        assert_eq!(eval("FALSE AND (1 / 0 = 1)"), Value::Bool(false));
        assert_eq!(eval("TRUE OR (1 / 0 = 1)"), Value::Bool(true));

        assert!(matches!(
            eval_err("TRUE AND (1 / 0 = 1)"),
            BasicError::DivisionByZero { .. }
        ));
    }

    #[test]
    fn test_eval_08_division_and_modulo_by_zero() {
        assert!(matches!(eval_err("1 / 0"), BasicError::DivisionByZero { .. }));
        assert!(matches!(eval_err("1 MOD 0"), BasicError::DivisionByZero { .. }));
        assert_eq!(eval("7 MOD 3"), Value::Number(1.0));
    }

    #[test]
    fn test_eval_09_bitwise_and_shifts() {
        assert_eq!(eval("6 & 3"), Value::Number(2.0));
        assert_eq!(eval("6 | 3"), Value::Number(7.0));
        assert_eq!(eval("6 ^ 3"), Value::Number(5.0));
        assert_eq!(eval("1 << 3"), Value::Number(8.0));
        assert_eq!(eval("16 >> 2"), Value::Number(4.0));
        assert_eq!(eval("~0"), Value::Number(-1.0));
    }

    #[test]
    fn test_eval_10_hex_literals() {
        assert_eq!(eval("0x10 + 1"), Value::Number(17.0));
    }

    #[test]
    fn test_eval_11_type_errors_carry_operator_and_types() {
        match eval_err("TRUE * 2") {
            BasicError::OperatorNotApplicable { op, lhs, rhs, .. } => {
                assert_eq!(op, "*");
                assert_eq!(lhs, "boolean");
                assert_eq!(rhs, "number");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_eval_12_adjacent_operands_are_fatal() {
        assert!(matches!(
            eval_err("1 2"),
            BasicError::MissingBinaryOperator { .. }
        ));
        assert!(matches!(
            eval_err("\"a\" \"b\""),
            BasicError::MissingBinaryOperator { .. }
        ));
    }

    #[test]
    fn test_eval_13_dangling_operators_are_fatal() {
        assert!(matches!(eval_err("1 +"), BasicError::DanglingOperator { .. }));
        assert!(matches!(eval_err("NOT"), BasicError::DanglingOperator { .. }));
    }

    #[test]
    fn test_eval_14_variables_resolve_through_scope_chain() {
        let mut rt = Runtime::new();
        let root = rt.root();
        rt.scopes.set_variable(root, "x", Value::Number(5.0)).unwrap();

        assert_eq!(eval_in(&mut rt, "x$ + 1"), Value::Number(6.0));
        assert_eq!(eval_in(&mut rt, "X$ + 1"), Value::Number(6.0));

        assert!(matches!(
            Evaluator::new("nope$", 1).evaluate(&mut rt, root),
            Err(BasicError::UndefinedObject(_))
        ));
    }

    #[test]
    fn test_eval_15_array_indexing() {
        let mut rt = Runtime::new();
        let root = rt.root();
        rt.scopes
            .set_variable(
                root,
                "a",
                Value::Array(vec![Value::Number(10.0), Value::Number(20.0)]),
            )
            .unwrap();

        assert_eq!(eval_in(&mut rt, "a$[1]"), Value::Number(20.0));
        assert_eq!(eval_in(&mut rt, "a$[0] + a$[1]"), Value::Number(30.0));

        assert!(matches!(
            Evaluator::new("a$[5]", 1).evaluate(&mut rt, root),
            Err(BasicError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            Evaluator::new("a$[-1]", 1).evaluate(&mut rt, root),
            Err(BasicError::InvalidIndex(_))
        ));
    }

    #[test]
    fn test_eval_16_builtin_calls() {
        assert_eq!(eval("len(\"abc\")"), Value::Number(3.0));
        assert_eq!(eval("abs(-5)"), Value::Number(5.0));
        assert_eq!(eval("val(\"2.5\")"), Value::Number(2.5));

        // A numeric string from str() narrows back to a number at the
        // end of the expression; a non-numeric result stays a string.
        assert_eq!(eval("str(12)"), Value::Number(12.0));
        assert_eq!(eval("str(12) + \"a\""), Value::Str("12a".to_string()));
    }

    #[test]
    fn test_eval_17_builtin_arity_checked_before_arguments() {
        match eval_err("abs(1, 2)") {
            BasicError::ArgumentCount { name, expected, got } => {
                assert_eq!(name, "abs");
                assert_eq!(expected, 1);
                assert_eq!(got, 2);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_eval_18_error_macro_reads_status() {
        assert_eq!(eval("@error"), Value::Number(200.0));
        assert_eq!(eval("@error = 200"), Value::Bool(true));

        assert!(matches!(
            eval_err("@bogus"),
            BasicError::UndefinedObject(_)
        ));
    }

    #[test]
    fn test_eval_19_empty_expression_is_a_parse_error() {
        assert!(matches!(eval_err("   "), BasicError::Parse { .. }));
    }

    #[test]
    fn test_eval_20_word_operators_are_case_insensitive() {
        assert_eq!(eval("TRUE and TRUE"), Value::Bool(true));
        assert_eq!(eval("FALSE or TRUE"), Value::Bool(true));
        assert_eq!(eval("7 mod 3"), Value::Number(1.0));
    }

    #[test]
    fn test_eval_21_memoized_parse_survives_reevaluation() {
        let mut rt = Runtime::new();
        let root = rt.root();
        rt.scopes.set_variable(root, "x", Value::Number(1.0)).unwrap();

        let mut expr = Evaluator::new("x$ + 1", 1);
        assert_eq!(expr.evaluate(&mut rt, root).unwrap(), Value::Number(2.0));

        // Same parse, new variable value.
        rt.scopes.set_variable(root, "x", Value::Number(10.0)).unwrap();
        assert_eq!(expr.evaluate(&mut rt, root).unwrap(), Value::Number(11.0));
    }

    #[test]
    fn test_eval_22_integral_numbers_display_without_fraction() {
        assert_eq!(eval("1 + 2").to_string(), "3");
        assert_eq!(eval("5 / 2").to_string(), "2.5");
        assert_eq!(eval("\"n=\" + 4"), Value::Str("n=4".to_string()));
    }
}
