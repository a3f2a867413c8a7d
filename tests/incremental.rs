//! Time-sliced execution through `Task`.
#![cfg(feature = "sexpr")]
#![expect(clippy::unwrap_used)] // test code OK

use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use pretty_assertions::assert_eq;
use slicelisp::sexpr::parse_sexpr;
use slicelisp::{ErrorKind, Interpreter, InterpreterConfig, Progress, Thunk, Value};

const COUNTDOWN: &str = "(let ((f (lambda (n acc) (if (= n 0) acc (recur (- n 1) (+ acc 1))))))
                           (f 20000 0))";

fn compile(source: &str) -> Thunk {
    Interpreter::new().compile(&parse_sexpr(source).unwrap())
}

#[test]
fn test_zero_budget_yields_after_one_batch() {
    let thunk = compile("(+ 1 2)");
    let mut task = thunk.execute_incremental(Duration::ZERO, 1);

    assert_eq!(task.resume(), Progress::Yielded);
    assert!(!task.is_finished());
    assert_eq!(task.resume(), Progress::Yielded);
    assert_eq!(task.resume(), Progress::Done(Ok(Value::from(3))));
    assert!(task.is_finished());
    assert_eq!(task.slices(), 3);
}

#[test]
fn test_generous_budget_finishes_in_one_slice() {
    let mut task = compile("(* 6 7)").execute_incremental(Duration::from_secs(60), 1000);
    assert_eq!(task.resume(), Progress::Done(Ok(Value::from(42))));
    assert_eq!(task.slices(), 1);
}

#[test]
fn test_incremental_matches_synchronous_result() {
    let thunk = compile(COUNTDOWN);
    let expected = thunk.execute();
    assert_eq!(expected, Ok(Value::from(20000)));

    for min_ops in [1, 7, 100, 5000] {
        let mut task = thunk.execute_incremental(Duration::ZERO, min_ops);
        let result = loop {
            if let Progress::Done(result) = task.resume() {
                break result;
            }
        };
        assert_eq!(result, expected, "min_ops {min_ops}");
        assert!(task.slices() > 1, "min_ops {min_ops}");
    }
}

#[test]
fn test_long_run_yields_under_a_small_budget() {
    let source = "(let ((f (lambda (n acc) (if (= n 0) acc (recur (- n 1) (+ acc 1))))))
                    (f 300000 0))";
    let mut task = compile(source).execute_incremental(Duration::from_millis(1), 100);
    let result = loop {
        if let Progress::Done(result) = task.resume() {
            break result;
        }
    };
    assert_eq!(result, Ok(Value::from(300000)));
    assert!(task.slices() > 1, "finished in {} slice(s)", task.slices());
}

#[test]
fn test_zero_min_ops_still_makes_progress() {
    let task = compile("(list 1 2 3)").execute_incremental(Duration::ZERO, 0);
    assert_eq!(task.run_to_completion(), Ok(parse_sexpr("(1 2 3)").unwrap()));
}

#[test]
fn test_errors_are_delivered_through_the_task() {
    let mut task = compile("(list 1 (car 5))").execute_incremental(Duration::ZERO, 1);
    let result = loop {
        if let Progress::Done(result) = task.resume() {
            break result;
        }
    };
    assert!(matches!(result.map_err(|e| e.kind), Err(ErrorKind::TypeError(_))));

    // A finished task cannot be resumed
    assert!(matches!(
        task.resume(),
        Progress::Done(Err(e)) if matches!(e.kind, ErrorKind::Internal(_))
    ));
}

#[test]
fn test_compile_errors_surface_on_first_slice() {
    let mut task = compile("(undefined 1)").execute_incremental(Duration::from_secs(60), 10);
    assert!(matches!(
        task.resume(),
        Progress::Done(Err(e)) if e.kind == ErrorKind::UnboundVariable("undefined".into())
    ));
}

#[test]
fn test_task_as_future() {
    let mut task = compile(COUNTDOWN).execute_incremental(Duration::ZERO, 50);
    let mut cx = Context::from_waker(Waker::noop());

    let mut pending = 0;
    let result = loop {
        match Pin::new(&mut task).poll(&mut cx) {
            Poll::Ready(result) => break result,
            Poll::Pending => pending += 1,
        }
    };

    assert_eq!(result, Ok(Value::from(20000)));
    assert!(pending > 0);
    assert_eq!(task.slices(), pending + 1);
}

#[test]
fn test_interpreter_config_drives_tasks() {
    let interpreter = Interpreter::builder()
        .config(
            InterpreterConfig::default()
                .with_slice_budget(Duration::ZERO)
                .with_min_ops_per_check(10)
                .with_max_backtrace(1),
        )
        .build();

    let mut task = interpreter.evaluate_incremental(&parse_sexpr(COUNTDOWN).unwrap());
    assert_eq!(task.resume(), Progress::Yielded);
    assert_eq!(task.run_to_completion(), Ok(Value::from(20000)));

    let failing = interpreter.evaluate_incremental(&parse_sexpr("(list (+ 1 2) (car 5))").unwrap());
    let error = failing.run_to_completion().unwrap_err();
    assert_eq!(error.backtrace().len(), 1);
}

#[test]
fn test_dropping_a_task_leaves_interpreter_usable() {
    let interpreter = Interpreter::new();
    let mut task = interpreter
        .compile(&parse_sexpr(COUNTDOWN).unwrap())
        .execute_incremental(Duration::ZERO, 10);
    assert_eq!(task.resume(), Progress::Yielded);
    drop(task);

    assert_eq!(interpreter.eval_str("(+ 1 1)"), Ok(Value::from(2)));
}
