//! End-to-end scenarios through the public API: the engine with a function
//! registry, the interpreter and the host binding layer.

use std::cell::Cell;
use std::rc::Rc;

use sf::host::{Host, SharedHost};
use sf::script::calc::{calculate_float, calculator};
use sf::script::{ErrorKind, ExecMode, FunctionRegistry, Interpreter, ScriptEngine, State, Value};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn eval(src: &str) -> Result<Value, ErrorKind> {
    ScriptEngine::default().eval(src).map_err(|e| e.kind)
}

fn int(src: &str) -> i64 {
    eval(src).map(|v| v.get_integer()).unwrap_or_else(|e| panic!("{src}: {e}"))
}

fn pump_host() -> SharedHost {
    let host = Host::shared();
    host.borrow_mut()
        .define_variable("42,Plant|Pump|Speed,rpm,,Pump speed,INTEGER,,,0,0,3000")
        .unwrap();
    host.borrow_mut().take_events();
    host
}

// ── Engine ────────────────────────────────────────────────────────────────────

#[test]
fn evaluation_is_right_recursive() {
    assert_eq!(int("2*3+4"), 14);
    assert_eq!(int("2+3*4"), 14);
    assert_eq!(int("(2*3)+4"), 10);
}

#[test]
fn division_by_zero_leaves_result_alone() {
    let mut engine = ScriptEngine::default();
    let mut v = Value::Int(-1);
    assert!(!engine.calculate("1/0", &mut sf::script::NoScope, &mut v));
    assert_eq!(engine.error(), ErrorKind::DivisionByZero);
    assert_eq!(v, Value::Int(-1));
    assert!(!engine.calculate("1.5%0.0", &mut sf::script::NoScope, &mut v));
    assert_eq!(engine.error(), ErrorKind::DivisionByZero);
    assert_eq!(v, Value::Int(-1));
}

#[test]
fn string_literals() {
    assert_eq!(eval(r#""he said \"hi\"""#).map(|v| v.get_string()), Ok("he said \"hi\"".to_owned()));
    assert_eq!(eval(r#""foo" "bar""#).map(|v| v.get_string()), Ok("foobar".to_owned()));
}

#[test]
fn registry_checks_parameter_counts_before_calling() {
    let calls = Rc::new(Cell::new(0));
    let mut reg = FunctionRegistry::new();
    let counter = Rc::clone(&calls);
    reg.register("sum2", "adds two numbers", 2, move |a| {
        counter.set(counter.get() + 1);
        Ok(a[0].add(&a[1]))
    });
    let counter = Rc::clone(&calls);
    reg.register("atleast1", "first parameter", -1, move |a| {
        counter.set(counter.get() + 1);
        Ok(a[0].clone())
    });
    let mut engine = ScriptEngine::new(Rc::new(reg));

    assert_eq!(engine.eval("sum2(1, 2)").map(|v| v.get_integer()), Ok(3));
    assert_eq!(engine.eval("sum2(1)").map_err(|e| e.kind), Err(ErrorKind::TooFewParameters));
    assert_eq!(engine.eval("sum2(1, 2, 3)").map_err(|e| e.kind), Err(ErrorKind::TooManyParameters));
    assert_eq!(engine.eval("atleast1(4, 5, 6)").map(|v| v.get_integer()), Ok(4));
    assert_eq!(engine.eval("atleast1()").map_err(|e| e.kind), Err(ErrorKind::TooFewParameters));
    assert_eq!(calls.get(), 2);
}

#[test]
fn failing_host_function_is_a_function_error() {
    let mut reg = FunctionRegistry::new();
    reg.register("fails", "always fails", 0, |_| Err(ErrorKind::UnknownSymbol));
    let mut engine = ScriptEngine::new(Rc::new(reg));
    let err = engine.eval("fails()").unwrap_err();
    assert_eq!(err.kind, ErrorKind::FunctionError);
    assert_eq!(err.reason, "fails");
}

#[test]
fn assignment_errors() {
    assert_eq!(eval("3 = 1"), Err(ErrorKind::NotLValue));
    assert_eq!(eval("PI = 3"), Err(ErrorKind::AssignConstant));
}

#[test]
fn calculator_scope() {
    assert_eq!(calculator("1/0", &Value::Int(7)), Value::Int(7));
    assert_eq!(calculator("6*7", &Value::Int(7)), Value::Int(42));
    assert_eq!(calculate_float("x*y", 0.0, 2.0, 4.0, 0.0), 8.0);
    assert_eq!(calculate_float("1/0", -1.0, 0.0, 0.0, 0.0), -1.0);
}

// ── Interpreter ───────────────────────────────────────────────────────────────

#[test]
fn registry_functions_are_visible_to_scripts() {
    let mut reg = FunctionRegistry::new();
    reg.register("square", "n*n", 1, |a| Ok(a[0].mul(&a[0])));
    let mut interp: Interpreter = Interpreter::new(Rc::new(reg), ());
    assert!(interp.compile("int n; n = square(9); print(n);"));
    interp.execute(ExecMode::Init);
    assert_eq!(interp.execute(ExecMode::Run), State::Ready);
    assert_eq!(interp.output(), ["81"]);
}

#[test]
fn calculate_sees_script_variables() {
    let mut interp = Interpreter::<()>::default();
    assert!(interp.compile("int a; a = 5;"));
    interp.execute(ExecMode::Init);
    interp.execute(ExecMode::Run);
    let mut v = Value::Undefined;
    assert!(interp.calculate("a*2", &mut v));
    assert_eq!(v, Value::Int(10));
}

// ── Binding ───────────────────────────────────────────────────────────────────

#[test]
fn import_on_change_links_the_label() {
    let host = pump_host();
    let mut interp = Interpreter::with_host(Rc::clone(&host));
    let src = "import X,42;\non_change X MyLabel;\nreturn;\n:main;\nreturn;\n:MyLabel;\nprint(\"X is\", X);\nreturn;\n";
    assert!(interp.compile(src), "{}", interp.debug_text());
    assert!(interp.label_ip("MyLabel").is_some_and(|ip| ip > 0));
    assert_eq!(interp.execute(ExecMode::Init), State::Ready);

    host.borrow_mut().set_variable_value(42, &Value::Int(1500));
    assert_eq!(interp.dispatch_events(), 1);
    assert_eq!(interp.take_output(), vec!["X is 1500"]);
}

#[test]
fn undefined_change_label_names_the_label() {
    let host = pump_host();
    let mut interp = Interpreter::with_host(host);
    assert!(!interp.compile("import X,42; on_change X Missing;"));
    let err = interp.last_error().unwrap();
    assert_eq!(err.kind, ErrorKind::LabelNotFound);
    assert_eq!(err.reason, "Missing");
    assert_eq!(interp.state(), State::Empty);
}

#[test]
fn import_before_the_host_defines_the_variable() {
    let host = Host::shared();
    let mut interp = Interpreter::with_host(Rc::clone(&host));
    let src = "object v; v = Variable(77); v.OnId = Defined; return; :main; return; :Defined; print(v.Name(0)); return;";
    assert!(interp.compile(src));
    interp.execute(ExecMode::Init);
    host.borrow_mut()
        .define_variable("77,Late|Arrival,,,,STRING,,,")
        .unwrap();
    assert_eq!(interp.dispatch_events(), 1);
    assert_eq!(interp.take_output(), vec!["Late|Arrival"]);
}

#[test]
fn script_error_blocks_events() {
    let host = pump_host();
    let mut interp = Interpreter::with_host(Rc::clone(&host));
    let src = "import X,42; on_change X Changed; int z; return; :main; z = 1/0; return; :Changed; print(X); return;";
    assert!(interp.compile(src));
    interp.execute(ExecMode::Init);
    assert_eq!(interp.execute(ExecMode::Run), State::Error);
    host.borrow_mut().set_variable_value(42, &Value::Int(3));
    assert_eq!(interp.dispatch_events(), 0);
    assert!(interp.output().is_empty());
}
