use std::process::ExitCode;

use clap::Parser;
use hexsim_runner::cli::{Cli, Command};
use hexsim_runner::{
    ctrl_c, describe_status, init_tracing, monitor, send_command, serve, RunnerError,
};

/// Exit code of `hexsim send` when the controller rejects the command.
const EXIT_NO_ACK: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, RunnerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Command::Serve(args) => {
            let config = args.load_config(cli.log_filter.as_deref())?;
            init_tracing(&config.logging.filter)?;
            let shutdown = ctrl_c()?;
            runtime.block_on(serve(config, shutdown))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Monitor(args) => {
            init_tracing(cli.log_filter.as_deref().unwrap_or("warn"))?;
            let mut stdout = std::io::stdout().lock();
            runtime.block_on(monitor(args.addr.as_str(), args.count, &mut stdout))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Send(args) => {
            init_tracing(cli.log_filter.as_deref().unwrap_or("warn"))?;
            let status =
                runtime.block_on(send_command(args.addr.as_str(), args.code, args.params()))?;
            println!("{}", describe_status(&status));
            if status.is_ack() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_NO_ACK))
            }
        }
    }
}
