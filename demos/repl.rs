use std::env;
use std::io::Write;
use std::process;

use log::{LevelFilter, debug};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use simple_logger::SimpleLogger;
use slicelisp::json::{parse_json, to_json};
use slicelisp::sexpr::{ParseConfig, parse_program};
use slicelisp::{Arity, Environment, Error, Interpreter, Progress, SymbolTable, Value, ValueIter};

fn main() {
    let level = env::var("SLICELISP_LOG")
        .ok()
        .and_then(|level| level.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Warn);
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("Could not initialize logging: {e}");
    }

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Could not initialize REPL: {e}");
            process::exit(1);
        }
    };

    println!("slicelisp REPL");
    println!("Enter S-expressions like: (+ 1 2)");
    println!("Enter JSON arrays like: [\"+\", 1, 2]");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let interpreter = Interpreter::builder().extensions(repl_extensions()).build();
    let mut json_mode = false;

    loop {
        match rl.readline("slicelisp> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(interpreter.root());
                        continue;
                    }
                    ":json" => {
                        json_mode = !json_mode;
                        println!("Results shown as {}", if json_mode { "JSON" } else { "S-expressions" });
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                match read_input(line) {
                    Ok(exprs) => {
                        for expr in exprs {
                            match run(&interpreter, &expr) {
                                Ok(result) => print_result(&result, json_mode),
                                Err(e) => println!("Error: {e}"),
                            }
                        }
                    }
                    Err(e) => println!("Error: {e}"),
                }
            }
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

/// JSON arrays are tried first; anything else, including `[a b]` data
/// shorthand that is not valid JSON, is read as s-expressions.
fn read_input(line: &str) -> Result<Vec<Value>, Error> {
    if line.starts_with('[')
        && let Ok(expr) = parse_json(line)
    {
        println!("→ {expr}");
        return Ok(vec![expr]);
    }
    parse_program(
        line,
        ParseConfig {
            handle_comments: true,
        },
    )
}

/// Drives an incremental run the way a host event loop would, one slice
/// per turn.
fn run(interpreter: &Interpreter, expr: &Value) -> Result<Value, Error> {
    let mut task = interpreter.evaluate_incremental(expr);
    loop {
        match task.resume() {
            Progress::Yielded => debug!("slice {} yielded", task.slices()),
            Progress::Done(result) => return result,
        }
    }
}

fn print_result(result: &Value, json_mode: bool) {
    if json_mode {
        match to_json(result) {
            Ok(json) => println!("{json}"),
            Err(_) => println!("{result}"),
        }
    } else {
        println!("{result}");
    }
}

fn repl_extensions() -> SymbolTable {
    let mut extensions = SymbolTable::new();
    extensions.register_variadic_builtin_operation::<(ValueIter<'static>,), _>(
        "print",
        Arity::Any,
        print_values,
    );
    extensions.register_builtin_operation::<(), _>("clear", clear_screen);
    extensions
}

fn print_values(values: ValueIter<'_>) -> Value {
    let parts: Vec<String> = values.map(ToString::to_string).collect();
    println!("{}", parts.join(" "));
    Value::True
}

fn clear_screen() -> Value {
    print!("\x1B[2J\x1B[1;1H");
    let _ = std::io::stdout().flush();
    Value::True
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show root environment bindings");
    println!("  :json      - Toggle JSON output of results");
    println!("  :quit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Syntax:");
    println!("  Numbers: 42, -5, 2.5");
    println!("  Markers: nil (also the empty list), t");
    println!("  Quoting: 'x, '(1 2), [1 2]");
    println!("  Comments: ; to end of line");
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (let ((x 2) (y 3)) (* x y))");
    println!("  (export ((square (lambda (x) (* x x)))))");
    println!("  (let ((f (lambda (n) (if (= n 0) 'done (recur (- n 1)))))) (f 100000))");
    println!("  [\"if\", \"t\", 1, 2]");
    println!("  (print 'hello (+ 1 2))");
    println!();
    println!("Set SLICELISP_LOG=debug to trace incremental slices.");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();
    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    let mut callables = Vec::new();
    let mut values = Vec::new();
    for (name, value) in bindings {
        match value {
            Value::Callable(_) => callables.push(name),
            _ => values.push((name, value)),
        }
    }

    if !callables.is_empty() {
        println!("Callables ({}):", callables.len());
        for row in callables.chunks(4) {
            for name in row {
                print!("  {name:<15}");
            }
            println!();
        }
        println!();
    }

    if !values.is_empty() {
        println!("Values ({}):", values.len());
        for (name, value) in values {
            println!("  {name} = {value}");
        }
    }
}
