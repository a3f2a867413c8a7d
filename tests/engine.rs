//! End-to-end evaluation through the s-expression front-end.
#![cfg(feature = "sexpr")]
#![expect(clippy::unwrap_used)] // test code OK

use pretty_assertions::assert_eq;
use slicelisp::ast::sym;
use slicelisp::sexpr::parse_sexpr;
use slicelisp::{Error, ErrorKind, Interpreter, Outcome, SymbolTable, Value, compile};

enum Expected {
    /// Result written as s-expression data
    Is(&'static str),
    Fails(fn(&ErrorKind) -> bool),
}
use Expected::*;

fn run_program_tests(test_cases: &[(&str, Expected)]) {
    for (i, (source, expected)) in test_cases.iter().enumerate() {
        let interpreter = Interpreter::new();
        let test_id = format!("#{} {source}", i + 1);
        let result = interpreter.eval_str(source);
        match expected {
            Is(data) => assert_eq!(result, Ok(parse_sexpr(data).unwrap()), "{test_id}"),
            Fails(check) => match result {
                Err(e) => assert!(check(&e.kind), "{test_id}: unexpected error {e}"),
                Ok(v) => panic!("{test_id}: expected an error, got {v}"),
            },
        }
    }
}

#[test]
fn test_core_programs() {
    run_program_tests(&[
        ("(+ 1 2 3)", Is("6")),
        ("(car [])", Is("nil")),
        ("(car '(7 8))", Is("7")),
        ("(cdr [1 2 3])", Is("(2 3)")),
        ("(cons 0 [1 2])", Is("(0 1 2)")),
        ("(if t 1 2)", Is("1")),
        ("(if nil 1 2)", Is("2")),
        ("(if () 1 2)", Is("2")),
        ("(if nil 1)", Is("nil")),
        ("(progn 1 2 3)", Is("3")),
        ("(let ((x 2) (y 3)) (* x y))", Is("6")),
        ("(let* ((x 2) (y (+ x 1))) (* x y))", Is("6")),
        ("(and 1 2 3)", Is("3")),
        ("(and 1 nil 3)", Is("nil")),
        ("(or nil 2)", Is("2")),
        ("(or)", Is("nil")),
        ("(and)", Is("t")),
        ("((lambda (x) (* x x)) 7)", Is("49")),
        ("((if t + *) 2 3)", Is("5")),
        ("(apply + [1 2 3])", Is("6")),
        ("(call (lambda (a b) (- a b)) 10 4)", Is("6")),
        ("(length (list 1 2 3))", Is("3")),
        ("(= [] nil)", Is("t")),
        ("(nth 1 [10 20 30])", Is("20")),
        ("(nth 5 [1 2])", Fails(|k| matches!(k, ErrorKind::IndexOutOfBounds { len: 2, .. }))),
        ("(/ 1 0)", Fails(|k| matches!(k, ErrorKind::DivisionByZero))),
        ("(car 5)", Fails(|k| matches!(k, ErrorKind::TypeError(_)))),
        ("(undefined 1)", Fails(|k| matches!(k, ErrorKind::UnboundVariable(_)))),
        ("(1 2)", Fails(|k| matches!(k, ErrorKind::IllegalCall(_)))),
        ("(error 'boom)", Fails(|k| matches!(k, ErrorKind::EvalError(m) if m == "boom"))),
        ("(lambda (x x) x)", Fails(|k| matches!(k, ErrorKind::EvalError(_)))),
        ("(lambda (1) 1)", Fails(|k| matches!(k, ErrorKind::TypeError(_)))),
    ]);
}

#[test]
fn test_reserved_names_cannot_be_bound() {
    run_program_tests(&[
        ("(lambda (&rest &rest) 1)", Fails(|k| matches!(k, ErrorKind::ReservedSymbol(s) if s == "&rest"))),
        ("(lambda (a &rest t) a)", Fails(|k| matches!(k, ErrorKind::ReservedSymbol(s) if s == "t"))),
        ("(lambda (t) t)", Fails(|k| matches!(k, ErrorKind::ReservedSymbol(s) if s == "t"))),
        ("(let ((nil 1)) 2)", Fails(|k| matches!(k, ErrorKind::ReservedSymbol(s) if s == "nil"))),
        ("(export ((t 1)))", Fails(|k| matches!(k, ErrorKind::ReservedSymbol(s) if s == "t"))),
        ("(export ((&rest 1)))", Fails(|k| matches!(k, ErrorKind::ReservedSymbol(s) if s == "&rest"))),
        // `recur` is an ordinary root binding (nil), so exporting it collides
        ("(export ((recur 1)))", Fails(|k| matches!(k, ErrorKind::AlreadyDefined(s) if s == "recur"))),
        ("(progn (export ((recur 1))) recur)", Fails(|k| matches!(k, ErrorKind::AlreadyDefined(_)))),
        ("recur", Is("nil")),
    ]);
}

#[test]
fn test_closure_argument_policy() {
    run_program_tests(&[
        // Missing positional arguments bind nil, extra ones are ignored
        ("((lambda (a b) (list a b)) 1)", Is("(1 nil)")),
        ("((lambda (a) a) 1 2 3)", Is("1")),
        ("((lambda (a &rest r) r) 1 2 3)", Is("(2 3)")),
        ("((lambda (a &rest r) r) 1)", Is("nil")),
        ("((lambda (&rest) 1) 2 3)", Is("1")),
        ("((lambda (a b) b))", Is("nil")),
    ]);
}

#[test]
fn test_closures_capture_their_scope() {
    run_program_tests(&[
        ("(let ((make (lambda (n) (lambda (x) (+ x n))))) ((make 10) 5))", Is("15")),
        // Shadowing a library name only affects the inner scope
        ("(let ((car (lambda (l) 42))) (car [1]))", Is("42")),
        ("(progn (let ((car 1)) car) (car [1]))", Is("1")),
    ]);
}

#[test]
fn test_tail_recursion_does_not_grow_host_stack() {
    let interpreter = Interpreter::new();
    let source = "(let ((f (lambda (n acc) (if (= n 0) acc (recur (- n 1) (+ acc n))))))
                    (f 50000 0))";
    assert_eq!(interpreter.eval_str(source), Ok(Value::from(1_250_025_000)));
}

#[test]
fn test_failure_deep_in_a_continuation_chain() {
    // Every continuation captures the scope holding the previous one
    let source = "(let ((f (lambda (n k)
                           (if (= n 0)
                               (k (car 5))
                               (recur (- n 1) (lambda (x) (k (+ x 1))))))))
                    (f 20000 (lambda (x) x)))";
    let interpreter = Interpreter::new();

    let error = interpreter.eval_str(source).unwrap_err();
    assert!(matches!(error.kind, ErrorKind::TypeError(_)), "{error}");
    assert_eq!(error.backtrace().first(), Some(&parse_sexpr("(car 5)").unwrap()));

    let unwound = interpreter.eval_str(&source.replace("(car 5)", "0"));
    assert_eq!(unwound, Ok(Value::from(20000)));
}

#[test]
fn test_deeply_nested_results() {
    let interpreter = Interpreter::new();
    let source = "(let ((f (lambda (n) (if (= n 0) nil (list (recur (- n 1)))))))
                    (length (f 100000)))";
    assert_eq!(interpreter.eval_str(source), Ok(Value::from(1)));
}

#[test]
fn test_mutual_recursion_through_exports() {
    let interpreter = Interpreter::new();
    interpreter
        .eval_str(
            "(export ((even? (lambda (n) (if (= n 0) t (odd? (- n 1)))))
                      (odd? (lambda (n) (if (= n 0) nil (even? (- n 1)))))))",
        )
        .unwrap();
    assert_eq!(interpreter.eval_str("(even? 10001)"), Ok(Value::Nil));
    assert_eq!(interpreter.eval_str("(odd? 10001)"), Ok(Value::True));
}

#[test]
fn test_repeated_execution_is_deterministic() {
    let interpreter = Interpreter::new();
    let expr = parse_sexpr("(let ((sq (lambda (x) (* x x)))) (list (sq 3) (sq 4) (car [])))").unwrap();
    let thunk = interpreter.compile(&expr);

    let first = interpreter.execute(&thunk);
    let second = interpreter.execute(&thunk);
    assert_eq!(first, Ok(parse_sexpr("(9 16 nil)").unwrap()));
    assert_eq!(first, second);

    let failing = interpreter.compile(&parse_sexpr("(list 1 (nth 3 [1]))").unwrap());
    assert_eq!(interpreter.execute(&failing), interpreter.execute(&failing));
}

#[test]
fn test_export_declares_once() {
    let interpreter = Interpreter::new();
    assert_eq!(interpreter.eval_str("(export ((x 1) (y (+ x 1))))"), Ok(Value::True));
    assert_eq!(interpreter.eval_str("(+ x y)"), Ok(Value::from(3)));

    let again = interpreter.eval_str("(export ((x 5)))").map_err(|e| e.kind);
    assert_eq!(again, Err(ErrorKind::AlreadyDefined("x".into())));
    assert_eq!(interpreter.eval_str("x"), Ok(Value::from(1)));
}

#[test]
fn test_host_extensions() {
    fn twice(args: &[Value]) -> Result<Value, Error> {
        match args {
            [Value::Number(n)] => Ok(Value::from(n * 2.0)),
            _ => Err(Error::type_error("twice takes one number")),
        }
    }

    let mut extensions = SymbolTable::new();
    extensions.register_builtin_function("twice", twice);
    let interpreter = Interpreter::builder().extensions(extensions).build();

    assert_eq!(interpreter.eval_str("(twice (twice 3))"), Ok(Value::from(12)));
    assert!(matches!(
        interpreter.eval_str("(twice t)").map_err(|e| e.kind),
        Err(ErrorKind::TypeError(_))
    ));
}

#[test]
fn test_error_backtrace_rendering() {
    let interpreter = Interpreter::new();
    let error = interpreter.eval_str("(list (+ 1 2) (car 5))").unwrap_err();

    assert_eq!(error.backtrace().first(), Some(&parse_sexpr("(car 5)").unwrap()));
    assert!(error.backtrace().contains(&parse_sexpr("(+ 1 2)").unwrap()));

    let rendered = error.to_string();
    assert!(rendered.starts_with("Type error: "), "{rendered}");
    assert!(rendered.contains(" at\n  (car 5)\n"), "{rendered}");
}

#[test]
fn test_compile_errors_report_origin() {
    let interpreter = Interpreter::new();
    let error = interpreter.eval_str("(+ 1 (missing 2))").unwrap_err();
    assert_eq!(error.kind, ErrorKind::UnboundVariable("missing".into()));
    assert!(!error.backtrace().is_empty());
}

#[test]
fn test_host_special_forms_and_macros() {
    let mut extensions = SymbolTable::new();
    // (when cond body...) only compiles its body once the condition held
    extensions.register_special_form("when", |args, env| {
        let Some((condition, body)) = args.split_first() else {
            return Err(Error::arity_error(1, 0));
        };
        let branch = Value::List([sym("progn")].into_iter().chain(body.iter().cloned()).collect());
        let expr = Value::List(vec![sym("if"), condition.clone(), branch]);
        Ok(Outcome::Thunk(compile(env, &expr)))
    });
    // (flip op a b) => (op b a)
    extensions.register_macro("flip", |args, _env| match args {
        [op, a, b] => Ok(Value::List(vec![op.clone(), b.clone(), a.clone()])),
        _ => Err(Error::arity_error(3, args.len())),
    });
    let interpreter = Interpreter::builder().extensions(extensions).build();

    let test_cases = [
        ("(when (> 2 1) 'yes)", Is("yes")),
        ("(when (< 2 1) (undefined))", Is("nil")),
        ("(when t 1 2 3)", Is("3")),
        ("(flip - 1 10)", Is("9")),
        ("(flip cons [2] 1)", Is("(1 2)")),
        ("(let ((x 5)) (when (= x 5) (flip list x 0)))", Is("(0 5)")),
        ("(flip 1 2)", Fails(|k| matches!(k, ErrorKind::ArityError { expected: 3, got: 2 }))),
        ("(when)", Fails(|k| matches!(k, ErrorKind::ArityError { .. }))),
    ];
    for (source, expected) in test_cases {
        let result = interpreter.eval_str(source);
        match expected {
            Is(data) => assert_eq!(result, Ok(parse_sexpr(data).unwrap()), "{source}"),
            Fails(check) => match result {
                Err(e) => assert!(check(&e.kind), "{source}: unexpected error {e}"),
                Ok(v) => panic!("{source}: expected an error, got {v}"),
            },
        }
    }
}
