//! Instruction streams and the trampoline that executes them.
//!
//! A [`Thunk`] is a flat sequence of frames produced by the compiler. It is
//! consumed from the end: value frames push onto a value stack, call frames
//! pop their arguments and invoke a callable, error frames terminate the run.
//! When a callable answers with another thunk, its frames are spliced onto
//! the remaining work instead of being executed by a nested call, so user
//! recursion never grows the host stack.
//!
//! Runs always operate on a private copy of the frames, so one compiled
//! thunk can be executed any number of times.
//!
//! [`Task`] wraps a paused run for cooperative, time-sliced execution.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::DEFAULT_MAX_BACKTRACE;
use crate::ast::{Callable, Outcome, Value};
use crate::error::Error;

/// One instruction of a compiled stream.
#[derive(Clone)]
pub enum Frame {
    /// A ready value to push
    Value(Value),
    /// Pops `argc` values and invokes `callable`; `origin` is the expression
    /// the frame was compiled from
    Call {
        callable: Callable,
        argc: usize,
        origin: Value,
    },
    /// Terminates the run
    Error(Error),
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frame::Value(value) => write!(f, "Value({value})"),
            Frame::Call {
                callable,
                argc,
                origin,
            } => write!(f, "Call({callable}, {argc}, {origin})"),
            Frame::Error(error) => write!(f, "Error({})", error.message()),
        }
    }
}

/// A compiled unit: a linear stream of frames.
#[derive(Clone, Default, Debug)]
pub struct Thunk {
    frames: Vec<Frame>,
    failed: bool,
}

impl Thunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-frame stream producing `value`.
    pub fn value(value: Value) -> Self {
        let mut thunk = Thunk::new();
        thunk.push_value(value);
        thunk
    }

    pub fn push_value(&mut self, value: Value) {
        self.frames.push(Frame::Value(value));
    }

    pub fn push_call(&mut self, callable: Callable, argc: usize, origin: Value) {
        self.frames.push(Frame::Call {
            callable,
            argc,
            origin,
        });
    }

    pub fn push_error(&mut self, error: Error) {
        self.failed = true;
        self.frames.push(Frame::Error(error));
    }

    /// Appends `other` to the end of this stream, so its frames run first.
    pub fn merge(&mut self, other: Thunk) {
        self.failed |= other.failed;
        self.frames.extend(other.frames);
    }

    /// Whether compiling this stream hit an error.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Runs the stream to completion on the current thread.
    pub fn execute(&self) -> Result<Value, Error> {
        self.execute_with_backtrace(DEFAULT_MAX_BACKTRACE)
    }

    /// Runs the stream to completion, keeping at most `max_backtrace`
    /// expressions in a failure's backtrace.
    pub fn execute_with_backtrace(&self, max_backtrace: usize) -> Result<Value, Error> {
        Machine::new(self, max_backtrace).run()
    }

    /// Starts a cooperative run. Each [`Task::resume`] executes frames in
    /// batches of `min_ops_per_check` until `slice_budget` has elapsed.
    pub fn execute_incremental(&self, slice_budget: Duration, min_ops_per_check: usize) -> Task {
        Task::new(
            Machine::new(self, DEFAULT_MAX_BACKTRACE),
            slice_budget,
            min_ops_per_check,
        )
    }
}

/// Paused or running state of one execution.
struct Machine {
    frames: Vec<Frame>,
    stack: Vec<Value>,
    /// Origins of executed call frames, most recent first
    trace: VecDeque<Value>,
    max_backtrace: usize,
    ops: u64,
}

impl Machine {
    fn new(thunk: &Thunk, max_backtrace: usize) -> Self {
        Machine {
            frames: thunk.frames.clone(),
            stack: Vec::new(),
            trace: VecDeque::new(),
            max_backtrace: max_backtrace.max(1),
            ops: 0,
        }
    }

    fn run(&mut self) -> Result<Value, Error> {
        loop {
            if let Some(result) = self.step() {
                return result;
            }
        }
    }

    /// Executes batches of `min_ops` frames until the run finishes or
    /// `budget` is used up. `None` means the run yielded.
    fn run_slice(&mut self, budget: Duration, min_ops: usize) -> Option<Result<Value, Error>> {
        let started = Instant::now();
        let start_ops = self.ops;
        loop {
            for _ in 0..min_ops {
                if let Some(result) = self.step() {
                    return Some(result);
                }
            }
            let elapsed = started.elapsed();
            if elapsed >= budget {
                trace!(
                    "yielding after {} ops in {:?} ({} frames pending)",
                    self.ops - start_ops,
                    elapsed,
                    self.frames.len()
                );
                return None;
            }
        }
    }

    /// Executes one frame. Returns the final result once the stream is
    /// consumed or fails.
    fn step(&mut self) -> Option<Result<Value, Error>> {
        let Some(frame) = self.frames.pop() else {
            return Some(self.finish());
        };
        self.ops += 1;

        match frame {
            Frame::Value(value) => self.stack.push(value),
            Frame::Error(error) => return Some(Err(self.fail(error))),
            Frame::Call {
                callable,
                argc,
                origin,
            } => {
                if self.stack.len() < argc {
                    let error = Error::internal(format!(
                        "call frame expects {argc} arguments but the stack holds {}",
                        self.stack.len()
                    ));
                    return Some(Err(self.fail(error)));
                }
                let args = self.stack.split_off(self.stack.len() - argc);

                self.trace.push_front(origin);
                self.trace.truncate(self.max_backtrace);

                match callable.invoke(args) {
                    Ok(Outcome::Value(value)) => self.stack.push(value),
                    Ok(Outcome::Thunk(more)) => {
                        trace!("splicing {} frames", more.len());
                        self.frames.extend(more.frames);
                    }
                    Err(error) => return Some(Err(self.fail(error))),
                }
            }
        }

        if self.frames.is_empty() {
            Some(self.finish())
        } else {
            None
        }
    }

    fn finish(&mut self) -> Result<Value, Error> {
        match (self.stack.pop(), self.stack.is_empty()) {
            (Some(value), true) => Ok(value),
            (None, _) => Err(Error::internal("stream finished without a value")),
            (Some(_), false) => Err(Error::internal(format!(
                "stream finished with {} values on the stack",
                self.stack.len() + 1
            ))),
        }
    }

    fn fail(&mut self, mut error: Error) -> Error {
        error.extend_backtrace(self.trace.drain(..), self.max_backtrace);
        self.frames.clear();
        self.stack.clear();
        error
    }
}

/// Result of resuming a [`Task`].
#[derive(Debug, PartialEq)]
pub enum Progress {
    /// The slice budget ran out before the stream was consumed
    Yielded,
    Done(Result<Value, Error>),
}

/// Resumable, time-sliced execution of a thunk.
///
/// Drive it by calling [`Task::resume`] from the host's scheduler, or await
/// it: each poll runs one slice and wakes itself before returning
/// `Pending`. Dropping a task cancels the run.
pub struct Task {
    machine: Option<Machine>,
    slice_budget: Duration,
    min_ops_per_check: usize,
    slices: usize,
}

impl Task {
    fn new(machine: Machine, slice_budget: Duration, min_ops_per_check: usize) -> Self {
        debug!(
            "starting incremental run of {} frames (slice {:?}, check every {} ops)",
            machine.frames.len(),
            slice_budget,
            min_ops_per_check
        );
        Task {
            machine: Some(machine),
            slice_budget,
            min_ops_per_check: min_ops_per_check.max(1),
            slices: 0,
        }
    }

    /// Caps the backtrace of a failure at `max_backtrace` expressions.
    pub fn with_max_backtrace(mut self, max_backtrace: usize) -> Self {
        if let Some(machine) = &mut self.machine {
            machine.max_backtrace = max_backtrace.max(1);
        }
        self
    }

    /// Runs one slice.
    pub fn resume(&mut self) -> Progress {
        let Some(machine) = &mut self.machine else {
            return Progress::Done(Err(Error::internal("task resumed after completion")));
        };
        self.slices += 1;

        match machine.run_slice(self.slice_budget, self.min_ops_per_check) {
            None => Progress::Yielded,
            Some(result) => {
                debug!(
                    "incremental run finished after {} slices and {} ops",
                    self.slices, machine.ops
                );
                self.machine = None;
                Progress::Done(result)
            }
        }
    }

    /// Resumes until the run completes, blocking the caller.
    pub fn run_to_completion(mut self) -> Result<Value, Error> {
        loop {
            if let Progress::Done(result) = self.resume() {
                return result;
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.machine.is_none()
    }

    /// Number of slices run so far.
    pub fn slices(&self) -> usize {
        self.slices
    }
}

impl Future for Task {
    type Output = Result<Value, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut().resume() {
            Progress::Done(result) => Poll::Ready(result),
            Progress::Yielded => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{sym, val};
    use crate::error::ErrorKind;

    fn add() -> Callable {
        Callable::native("+", |args| {
            let mut sum = 0.0;
            for arg in args {
                let n: f64 = arg.try_into()?;
                sum += n;
            }
            Ok(Outcome::Value(val(sum)))
        })
    }

    #[test]
    fn test_single_value_frame() {
        for atom in [val(42), Value::Nil, Value::True] {
            let thunk = Thunk::value(atom.clone());
            assert_eq!(thunk.len(), 1);
            assert_eq!(thunk.execute(), Ok(atom));
        }
    }

    #[test]
    fn test_call_receives_arguments_in_order() {
        let list = Callable::native("list", |args| Ok(Outcome::Value(Value::List(args))));
        // Frames run from the end: 1 is pushed first, 3 last
        let mut thunk = Thunk::new();
        thunk.push_call(list, 3, sym("origin"));
        thunk.push_value(val(3));
        thunk.push_value(val(2));
        thunk.push_value(val(1));

        assert_eq!(thunk.execute(), Ok(val([1, 2, 3])));
        // The original stream is untouched and can run again
        assert_eq!(thunk.len(), 4);
        assert_eq!(thunk.execute(), Ok(val([1, 2, 3])));
    }

    #[test]
    fn test_returned_thunk_is_spliced() {
        let twice = Callable::native("twice", |args| {
            let mut more = Thunk::new();
            more.push_call(add(), 2, sym("inner"));
            more.push_value(args[0].clone());
            more.push_value(args[0].clone());
            Ok(Outcome::Thunk(more))
        });
        let mut thunk = Thunk::new();
        thunk.push_call(twice, 1, sym("outer"));
        thunk.push_value(val(21));

        assert_eq!(thunk.execute(), Ok(val(42)));
    }

    #[test]
    fn test_error_collects_backtrace() {
        let mut thunk = Thunk::new();
        thunk.push_call(add(), 2, val(vec![sym("+"), val(1), sym("x")]));
        thunk.push_value(sym("x"));
        thunk.push_value(val(1));

        let error = thunk.execute().err();
        assert!(matches!(error.as_ref().map(|e| &e.kind), Some(ErrorKind::TypeError(_))));
        assert_eq!(
            error.map(|e| e.backtrace().to_vec()),
            Some(vec![val(vec![sym("+"), val(1), sym("x")])])
        );
    }

    #[test]
    fn test_error_frame_terminates_run() {
        let mut thunk = Thunk::new();
        thunk.push_value(val(1));
        thunk.push_error(Error::unbound("y"));
        assert!(thunk.is_failed());
        assert_eq!(thunk.execute(), Err(Error::unbound("y")));
    }

    #[test]
    fn test_stack_underflow_is_internal_error() {
        let mut thunk = Thunk::new();
        thunk.push_call(add(), 2, sym("broken"));
        thunk.push_value(val(1));

        assert!(matches!(
            thunk.execute().map_err(|e| e.kind),
            Err(ErrorKind::Internal(_))
        ));
    }

    #[test]
    fn test_task_matches_synchronous_result() {
        let mut thunk = Thunk::new();
        for _ in 0..500 {
            thunk.push_call(add(), 2, sym("step"));
            thunk.push_value(val(1));
        }
        thunk.push_value(val(0));

        let mut task = thunk.execute_incremental(Duration::ZERO, 10);
        let mut yields = 0;
        let result = loop {
            match task.resume() {
                Progress::Yielded => yields += 1,
                Progress::Done(result) => break result,
            }
        };

        assert!(yields > 0);
        assert!(task.is_finished());
        assert_eq!(result, thunk.execute());
        assert_eq!(result, Ok(val(500)));
        assert!(matches!(
            task.resume(),
            Progress::Done(Err(Error {
                kind: ErrorKind::Internal(_),
                ..
            }))
        ));
    }
}
