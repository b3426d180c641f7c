use proptest::prelude::*;
use sf::host::Host;
use sf::script::value::parse_c_double;
use sf::script::{Interpreter, ScriptEngine, Value};

fn eval(src: &str) -> Option<Value> {
    ScriptEngine::default().eval(src).ok()
}

proptest! {
    /// Integers survive `get_string` and evaluation as a literal.
    #[test]
    fn integer_literal_round_trip(n in 0i64..i64::MAX) {
        let text = Value::Int(n).get_string();
        prop_assert_eq!(eval(&text), Some(Value::Int(n)));
    }
}

proptest! {
    /// Floats survive `get_string` up to the printed digit budget.
    #[test]
    fn float_text_round_trip(x in -1.0e12f64..1.0e12f64) {
        let text = Value::Float(x).get_string();
        let (back, used) = parse_c_double(&text);
        prop_assert_eq!(used, text.len());
        let tolerance = x.abs().max(1.0) * 1e-13;
        prop_assert!((back - x).abs() <= tolerance, "{} -> {} -> {}", x, text, back);
    }
}

proptest! {
    /// The evaluator returns Ok or Err but never panics.
    #[test]
    fn engine_does_not_panic(s in "\\PC*") {
        let _ = ScriptEngine::default().eval(&s);
    }

    /// Nor does the statement compiler.
    #[test]
    fn compiler_does_not_panic(s in "\\PC*") {
        let mut interp = Interpreter::with_host(Host::shared());
        let _ = interp.compile(&s);
    }
}

proptest! {
    /// Grouped expressions follow integer arithmetic; ungrouped ones nest
    /// to the right.
    #[test]
    fn grouping_matches_integer_arithmetic(a in 0i64..10_000, b in 0i64..10_000, c in 0i64..10_000) {
        prop_assert_eq!(eval(&format!("({a}*{b})+{c}")), Some(Value::Int(a * b + c)));
        prop_assert_eq!(eval(&format!("{a}*{b}+{c}")), Some(Value::Int(a * (b + c))));
        prop_assert_eq!(eval(&format!("({a}+{b})-({c})")), Some(Value::Int(a + b - c)));
    }
}

proptest! {
    /// substr never grows its input and returns a contiguous piece of it.
    #[test]
    fn substr_properties(s in "[a-z ]{0,40}", start in 0i64..50, len in -1i64..50) {
        let out = eval(&format!("substr(\"{s}\", {start}, {len})")).map(|v| v.get_string());
        prop_assert!(out.is_some());
        let out = out.unwrap_or_default();
        prop_assert!(out.len() <= s.len());
        prop_assert!(s.contains(&out));
    }
}
