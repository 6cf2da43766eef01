//! chartgate - push charts to a ChartMuseum registry behind an access gateway
//!
//! Installed as the Helm `push` plugin; also registered as the downloader
//! for `cm://` repository URLs.

use clap::Parser;
use std::io::Write;

use chartgate_repo::{HelmMajorVersion, RegistryResolver};

mod commands;
mod error;
mod exit_codes;
mod logging;
mod settings;

use commands::push::PushOrchestrator;
use error::{CliError, Result};
use settings::{EnvSettings, Invocation, PushArgs};

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let args = match PushArgs::try_parse() {
        Ok(args) => args,
        // --help keeps clap's own output and exit status
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => {
            eprint!("{}", err);
            std::process::exit(exit_codes::ERROR);
        }
    };
    let env = EnvSettings::from_env();
    logging::setup_logging(args.debug || env.debug);

    let code = match run(args, &env) {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };

    std::process::exit(code);
}

fn run(args: PushArgs, env: &EnvSettings) -> Result<()> {
    match Invocation::from_args(args, env)? {
        Invocation::CheckHelmVersion => {
            println!("{}", HelmMajorVersion::detect());
            Ok(())
        }

        Invocation::Download(options) => {
            let mut stdout = std::io::stdout().lock();
            runtime()?.block_on(commands::download::run(&options, &mut stdout))
        }

        Invocation::Push(options) => {
            let helm_version = HelmMajorVersion::detect();
            let paths = env.helm_paths(helm_version)?;
            tracing::debug!(helm = %helm_version, repositories = %paths.repository_config.display(), "starting push");

            let push = PushOrchestrator::new(
                options,
                RegistryResolver::new(paths.repository_config),
                helm_version,
            );

            let mut stdout = std::io::stdout().lock();
            let result = runtime()?.block_on(push.run(&mut stdout));
            stdout.flush()?;
            result
        }
    }
}

/// One command per process, driven on the current thread
fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::io(format!("cannot start async runtime: {}", e)))
}
