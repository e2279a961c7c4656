//! # apack CLI Entry Point
//!
//! Assembles subcommands and dispatches to handler modules.

use std::path::PathBuf;
use std::process::ExitCode;

use apack_cli::load::CliConfig;
use apack_cli::OutputOptions;
use clap::Parser;

/// Achievement content pack toolchain.
///
/// Validates pack directories and inspects the objects they define.
#[derive(Parser, Debug)]
#[command(name = "apack", version, about)]
struct Cli {
    /// Emit JSON output and JSON logs.
    #[arg(long, global = true)]
    json: bool,

    /// Preferred language for localized names.
    #[arg(long, global = true, default_value = "en")]
    lang: String,

    /// Loader configuration file (JSON or YAML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Load a pack and report data, reference and resource errors.
    Validate(apack_cli::validate::ValidateArgs),
    /// Print the objects of a loaded pack.
    Inspect(apack_cli::inspect::InspectArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if cli.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = CliConfig::load(cli.config.as_deref())?;
    let output = OutputOptions {
        json: cli.json,
        lang: cli.lang,
    };

    match cli.command {
        Commands::Validate(args) => {
            let result = apack_cli::validate::run(&args, &config, &output).await?;
            println!("{}", result.text);
            if !result.passed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Inspect(args) => {
            let text = apack_cli::inspect::run(&args, &config, &output).await?;
            print!("{text}");
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from(["apack", "inspect", "packs/core", "--json", "--lang", "de"])
            .unwrap();
        assert!(cli.json);
        assert_eq!(cli.lang, "de");
        assert!(matches!(cli.command, Commands::Inspect(ref a) if a.reference.is_none()));
    }
}
