mod cli;
mod error;

use clap::Parser;
use cli::Cli;
use ddmin_command_template::CommandTemplate;
use ddmin_engine::DdminEngine;
use ddmin_failure_predicate::FailurePredicateBuilder;
use ddmin_oracle::Oracle;
use error::{CliError, Result};
use std::io::{IsTerminal, Read, Write};
use std::os::unix::io::AsRawFd;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::new().filter_level(cli.log_level()).init();

    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            std::process::ExitCode::FAILURE
        }
    }
}

/// Configuration errors are red-highlighted on a TTY (spec.md §7); everything
/// else is reported plainly.
fn report(err: &CliError) {
    if err.is_config_error() && std::io::stderr().is_terminal() {
        eprintln!("\x1b[31merror: {}\x1b[0m", err);
    } else {
        eprintln!("error: {}", err);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let original = read_input(&cli)?;
    if original.is_empty() {
        return Err(CliError::EmptyInput);
    }

    let mut raw_command = cli.command.clone();
    if cli.write_to_stdin {
        if cli.shell {
            return Err(CliError::StdinWithShell);
        }
        raw_command.push_str(" <@");
    }
    let template = CommandTemplate::parse(&raw_command, cli.shell)?;

    let predicate = build_predicate(&cli)?;
    let oracle = Oracle::new(original.clone(), template, predicate);
    let engine = DdminEngine::new(&oracle, original.len());
    let result = engine.run().await?;

    let minimized = result.materialize(&original);
    write_output(&cli, &minimized)?;
    Ok(())
}

fn build_predicate(cli: &Cli) -> Result<ddmin_failure_predicate::FailurePredicate> {
    let mut builder = FailurePredicateBuilder::new().shell(cli.shell);

    for s in &cli.status {
        builder = builder.status(s.clone());
    }
    for s in &cli.signal {
        builder = builder.signal(s.clone());
    }
    if cli.segfaults {
        builder = builder.segfaults();
    }
    for pair in cli.writes_to.chunks(2) {
        let [fd, substring] = pair else {
            return Err(CliError::InvalidWritesTo(cli.writes_to.join(" ")));
        };
        let fd: i32 = fd
            .parse()
            .map_err(|_| CliError::InvalidWritesTo(format!("{} {}", fd, substring)))?;
        builder = builder.write(fd, substring.clone());
    }
    if let Some(s) = &cli.writes {
        builder = builder.write(1, s.clone());
    }
    if let Some(s) = &cli.writes_to_stderr {
        builder = builder.write(2, s.clone());
    }
    if let Some(ms) = cli.timeout {
        builder = builder.timeout_ms(ms);
    }

    Ok(builder.build()?)
}

fn read_input(cli: &Cli) -> Result<Vec<u8>> {
    match &cli.input {
        Some(path) => Ok(std::fs::read(path)?),
        None => {
            let stdin = std::io::stdin();
            if nix::unistd::lseek(stdin.as_raw_fd(), 0, nix::unistd::Whence::SeekCur).is_err() {
                return Err(CliError::UnseekableInput);
            }
            let mut buf = Vec::new();
            stdin.lock().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

fn write_output(cli: &Cli, bytes: &[u8]) -> Result<()> {
    match &cli.output {
        Some(path) => std::fs::write(path, bytes)?,
        None => std::io::stdout().write_all(bytes)?,
    }
    Ok(())
}
