//! # Command-Line Interface Module
//!
//! Builds the `cluster-runner` command line and dispatches to the `run`,
//! `plan` and `init` commands.

use anyhow::Result;
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{env, path::PathBuf};

use crate::core::config::DEFAULT_CONFIG_FILE;
use crate::infra::t;

pub mod commands;

use commands::{CommonArgs, init::InitArgs, run::RunArgs};

/// Pre-parses the command line arguments to find the language setting.
/// This allows i18n to be initialized before the full CLI is built.
fn pre_parse_language() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    args.iter()
        .position(|arg| arg == "--lang")
        .and_then(|pos| args.get(pos + 1))
        .cloned()
}

/// Arguments shared by every command that classifies a test tree.
fn discovery_args(command: Command, locale: &str) -> Command {
    command
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help(t!("arg_config", locale = locale).to_string())
                .value_name("CONFIG")
                .default_value(DEFAULT_CONFIG_FILE)
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-root")
                .long("test-root")
                .help(t!("arg_test_root", locale = locale).to_string())
                .value_name("TEST_ROOT")
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("single-test")
                .short('t')
                .long("single-test")
                .help(t!("arg_single_test", locale = locale).to_string())
                .value_name("TEST_FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("exclude")
                .short('e')
                .long("exclude")
                .help(t!("arg_exclude", locale = locale).to_string())
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Append),
        )
}

fn build_cli(locale: &str) -> Command {
    Command::new("cluster-runner")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli_about", locale = locale).to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli_lang", locale = locale).to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .subcommand(
            discovery_args(
                Command::new("run").about(t!("cmd_run_about", locale = locale).to_string()),
                locale,
            )
            .arg(
                Arg::new("jobs")
                    .short('j')
                    .long("jobs")
                    .help(t!("arg_jobs", locale = locale).to_string())
                    .value_name("JOBS")
                    .value_parser(clap::value_parser!(usize))
                    .action(ArgAction::Set),
            )
            .arg(
                Arg::new("timeout")
                    .long("timeout")
                    .help(t!("arg_timeout", locale = locale).to_string())
                    .value_name("SECONDS")
                    .value_parser(clap::value_parser!(u64))
                    .action(ArgAction::Set),
            )
            .arg(
                Arg::new("log-dir")
                    .long("log-dir")
                    .help(t!("arg_log_dir", locale = locale).to_string())
                    .value_name("LOG_DIR")
                    .value_parser(clap::value_parser!(PathBuf))
                    .action(ArgAction::Set),
            )
            .arg(
                Arg::new("json")
                    .long("json")
                    .help(t!("arg_json", locale = locale).to_string())
                    .value_name("JSON")
                    .value_parser(clap::value_parser!(PathBuf))
                    .action(ArgAction::Set),
            ),
        )
        .subcommand(discovery_args(
            Command::new("plan").about(t!("cmd_plan_about", locale = locale).to_string()),
            locale,
        ))
        .subcommand(
            Command::new("init")
                .about(t!("cmd_init_about", locale = locale).to_string())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help(t!("arg_init_output", locale = locale).to_string())
                        .value_name("OUTPUT")
                        .default_value(DEFAULT_CONFIG_FILE)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help(t!("arg_init_force", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help(t!("arg_init_non_interactive", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn common_args(matches: &ArgMatches, lang: Option<String>) -> CommonArgs {
    CommonArgs {
        // `config` always has a value because of its default.
        config: matches
            .get_one::<PathBuf>("config")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
        config_explicit: matches.value_source("config") == Some(ValueSource::CommandLine),
        test_root: matches.get_one::<PathBuf>("test-root").cloned(),
        single_test: matches.get_one::<PathBuf>("single-test").cloned(),
        excluded: matches
            .get_many::<PathBuf>("exclude")
            .map(|values| values.cloned().collect())
            .unwrap_or_default(),
        lang,
    }
}

/// Parses the command line and runs the selected command.
pub async fn run() -> Result<()> {
    // Pre-parse language and initialize i18n first.
    let explicit_lang = pre_parse_language();
    let language = explicit_lang
        .as_deref()
        .map(crate::resolve_locale)
        .unwrap_or_else(crate::detect_locale);
    rust_i18n::set_locale(&language);

    let matches = build_cli(&language).get_matches();

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let args = RunArgs {
                common: common_args(run_matches, explicit_lang),
                jobs: run_matches.get_one::<usize>("jobs").copied(),
                timeout_secs: run_matches.get_one::<u64>("timeout").copied(),
                log_dir: run_matches.get_one::<PathBuf>("log-dir").cloned(),
                json: run_matches.get_one::<PathBuf>("json").cloned(),
            };
            commands::run::execute(args).await
        }
        Some(("plan", plan_matches)) => {
            commands::plan::execute(common_args(plan_matches, explicit_lang))
        }
        Some(("init", init_matches)) => {
            let args = InitArgs {
                output: init_matches
                    .get_one::<PathBuf>("output")
                    .cloned()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
                force: init_matches.get_flag("force"),
                non_interactive: init_matches.get_flag("non-interactive"),
            };
            commands::init::execute(args, &language)
        }
        // `subcommand_required` makes clap print help and exit before this.
        _ => Ok(()),
    }
}
