use atty::Stream;
use color_eyre::Result;
use serde_json::Value;
use yoink_core::{CommandStatus, ExecutionOutcome};

use crate::style::Style;

#[derive(Clone, Copy, Debug)]
pub struct OutputOptions {
    pub quiet: bool,
    pub json: bool,
    pub no_color: bool,
}

/// Renders `outcome` and returns the process exit code.
///
/// The target program owns stdout, so failures and hints go to stderr.
pub fn emit_output(opts: &OutputOptions, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.exit_code();

    if opts.json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(code);
    }

    if let CommandStatus::Ok = outcome.status {
        if !opts.quiet && !is_passthrough(&outcome.details) {
            let style = Style::new(opts.no_color, atty::is(Stream::Stdout));
            println!("{}", style.status(&outcome.status, &outcome.message));
        }
        return Ok(code);
    }

    let style = Style::new(opts.no_color, atty::is(Stream::Stderr));
    eprintln!("{}", style.status(&outcome.status, &outcome.message));
    if let Some(diagnostics) = string_detail(&outcome.details, "diagnostics") {
        eprintln!("{}", style.diagnostics(diagnostics));
    }
    if let Some(hint) = string_detail(&outcome.details, "hint") {
        eprintln!("{}", style.hint(hint));
    }
    Ok(code)
}

fn string_detail<'a>(details: &'a Value, key: &str) -> Option<&'a str> {
    details
        .as_object()
        .and_then(|map| map.get(key))
        .and_then(Value::as_str)
}

fn is_passthrough(details: &Value) -> bool {
    details
        .as_object()
        .and_then(|map| map.get("passthrough"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
