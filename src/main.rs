use course_scheduler::{run_optimization, run_what_if, QueryConstraint, SolveOptions, WhatIfOptions};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(std::env::args().skip(1).collect()) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<String, String> {
    let mut input_path = None;
    let mut queries_path = None;
    let mut original_objective = None;
    let mut solve = SolveOptions::default();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--what-if" => {
                queries_path = Some(iter.next().ok_or("--what-if needs a file path")?);
            }
            "--original-objective" => {
                let raw = iter.next().ok_or("--original-objective needs a value")?;
                original_objective =
                    Some(raw.parse::<f64>().map_err(|e| format!("bad objective: {e}"))?);
            }
            "--time-limit" => {
                let raw = iter.next().ok_or("--time-limit needs seconds")?;
                solve.time_limit_seconds =
                    raw.parse::<f64>().map_err(|e| format!("bad time limit: {e}"))?;
            }
            "--threads" => {
                let raw = iter.next().ok_or("--threads needs a count")?;
                solve.threads = raw.parse::<u32>().map_err(|e| format!("bad thread count: {e}"))?;
            }
            "--verbose-solver" => solve.log_to_console = true,
            other if input_path.is_none() => input_path = Some(other.to_string()),
            other => return Err(format!("unexpected argument '{other}'")),
        }
    }

    let input_path = input_path.ok_or_else(usage)?;
    let raw = std::fs::read_to_string(&input_path)
        .map_err(|e| format!("cannot read {input_path}: {e}"))?;
    let input = serde_json::from_str(&raw).map_err(|e| format!("invalid input: {e}"))?;

    if let Some(queries_path) = queries_path {
        let original = original_objective
            .ok_or("--what-if also needs --original-objective from the baseline run")?;
        let raw = std::fs::read_to_string(&queries_path)
            .map_err(|e| format!("cannot read {queries_path}: {e}"))?;
        let queries: Vec<QueryConstraint> =
            serde_json::from_str(&raw).map_err(|e| format!("invalid queries: {e}"))?;
        let opts = WhatIfOptions { solve, ..WhatIfOptions::default() };
        let out = run_what_if(&input, &queries, original, &opts);
        serde_json::to_string_pretty(&out).map_err(|e| e.to_string())
    } else {
        let out = run_optimization(&input, &solve).map_err(|e| e.to_string())?;
        serde_json::to_string_pretty(&out).map_err(|e| e.to_string())
    }
}

fn usage() -> String {
    "usage: course-scheduler <input.json> [--time-limit S] [--threads N] [--verbose-solver] \
     [--what-if queries.json --original-objective F]"
        .to_string()
}
