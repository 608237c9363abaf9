use clap::Parser;
use color_eyre::Result;
use serde_json::json;
use yoink_core::{
    purge_cache, run_package, CommandContext, ExecutionOutcome, GlobalOptions, RunRequest,
    PRE_EXEC_FAILURE_CODE,
};

mod cli;
mod output;
mod style;

use cli::YoinkCli;
use output::{emit_output, OutputOptions};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = YoinkCli::parse();
    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
    };
    let opts = OutputOptions {
        quiet: cli.quiet,
        json: cli.json,
        no_color: cli.no_color,
    };

    let outcome = match CommandContext::new(&global) {
        Ok(ctx) => {
            let env_verbose = u8::from(ctx.config().verbose());
            init_tracing(cli.trace, cli.verbose.max(env_verbose), cli.quiet);
            execute(&cli, &ctx)
        }
        Err(err) => {
            init_tracing(cli.trace, cli.verbose, cli.quiet);
            ExecutionOutcome::failure(
                format!("{err:#}"),
                json!({ "reason": "config", "exit_code": PRE_EXEC_FAILURE_CODE }),
            )
        }
    };

    let code = emit_output(&opts, &outcome)?;
    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn execute(cli: &YoinkCli, ctx: &CommandContext) -> ExecutionOutcome {
    if cli.purge_cache {
        return purge_cache(ctx);
    }
    let request = RunRequest {
        spec: cli.spec.clone().unwrap_or_default(),
        args: cli.args.clone(),
    };
    run_package(ctx, &request)
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("yoink={level},yoink_core={level},yoink_cli={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
