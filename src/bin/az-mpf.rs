use anyhow::Result;
use az_mpf::{
    cli::{self, Command},
    error::PartialFailure,
    logging, output, run,
};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = cli::load()?;
    logging::setup_logging(&args.verbosity)?;

    if matches!(args.command, Command::Readme) {
        print!("{}", cli::render_readme());
        return Ok(ExitCode::SUCCESS);
    }

    match run::run(&args).await {
        Ok(result) => {
            print_result(&args, &result);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            // spec.md §7: a partial result, if any permissions were
            // discovered before the abort, is still printed before exit.
            if let Some(failure) = err.downcast_ref::<PartialFailure>() {
                if !failure.result.is_empty() {
                    print_result(&args, &failure.result);
                }
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_result(args: &cli::Cli, result: &az_mpf::models::result::MpfResult) {
    if args.common.json_output {
        println!("{}", output::format_json(result));
    } else {
        print!("{}", output::format_text(result, args.common.show_detailed_output));
    }
}
