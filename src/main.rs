//! tensile-client - Configuration writer and orchestrator of the Tensile benchmarking client
//!
//! # About
//! The Tensile client is a native executable that loads a library of GEMM kernels, runs them on
//! a set of problem sizes and writes the measured performance to CSV. It is driven by two inputs
//! generated from the logic files produced by a tuning run:
//! - an INI configuration listing the problem type, the problem sizes, the data initialization
//!   and validation modes and the benchmark options;
//! - a `ClientParameters.h` header describing every problem type and solution the client is
//!   compiled against.
//!
//! This crate writes both, along with the `build.sh` and `run.sh` scripts replaying the library
//! build and the client runs, drives the library builder and the client as child processes, and
//! summarizes the results files the client writes.
//!
//! # Quickstart
//! ## Build
//! As any Rust-based project, it is built and run with `cargo`:
//! ```sh
//! cargo build --release
//! ```
//!
//! ## Help
//! To see the help usage:
//! ```sh
//! cargo run -- help
//!
//! Usage: tensile-client [OPTIONS] <COMMAND>
//!
//! Commands:
//!   library-client  Build the library of every logic file and run the client on each of them
//!   write-config    Write the client configuration of a logic file
//!   write-header    Write `ClientParameters.h` for logic files
//!   bench-config    Write a benchmark configuration against an already built library
//!   build-script    Write `build.sh` calling the library builder
//!   run-script      Write `run.sh` calling the client on configuration files
//!   run             Run the client once on a configuration file
//!   summarize       Summarize a metric column of client results files
//!   settings        Print the default settings as TOML
//!   help            Print this message or the help of the given subcommand(s)
//! ```
//!
//! ## Settings
//! Every command reads its settings from a TOML file given with `--settings`. The defaults are
//! printed by:
//! ```sh
//! cargo run -- settings > client.toml
//! ```
//!
//! ## Example run
//! To build the library of the logic files under `<working path>/3_LibraryLogic` and run the
//! client on each of them:
//! ```sh
//! cargo run --release -- --settings client.toml library-client
//! ```
//!
//! Logging goes to `stderr` and is filtered by `RUST_LOG` or `-v`.

pub mod cli;
pub mod consts;
pub mod drivers;
pub mod error;
pub mod perf_report;
pub mod problem;
pub mod settings;
pub mod solution;
pub mod utils;
pub mod writers;

use crate::cli::{CliArgs, ClientCmd};
use crate::drivers::{
    library_client, library_step, logic_problem_sizes, run_new_client, write_logic_config,
    Collaborators, ProcessBuildTool, ProcessClientRunner,
};
use crate::perf_report::ResultsSummary;
use crate::problem::{parse_size_list, ProblemSizes, ProblemType};
use crate::settings::ClientSettings;
use crate::solution::{JsonLogicReader, LogicFile, LogicReader, MinimalSolutionNamer};
use crate::writers::{
    create_library_command, default_config_paths, header::BenchmarkHeader,
    write_benchmark_config_for_sizes, write_build_script, write_client_parameters,
    write_run_script, HeaderMode, RunMode,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use std::{
    fs::OpenOptions,
    io::{stdout, Write},
    path::Path,
};

fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.verbose);

    let settings = match &args.settings {
        Some(path) => ClientSettings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => ClientSettings::default(),
    };

    let code = dispatch(&settings, args.command)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs a command and returns the exit code of the process.
fn dispatch(settings: &ClientSettings, command: ClientCmd) -> Result<i32> {
    match command {
        ClientCmd::LibraryClient => {
            let runner = ProcessClientRunner::new(&settings.paths.client_executable);
            let tools = Collaborators {
                reader: &JsonLogicReader,
                build_tool: &ProcessBuildTool,
                runner: &runner,
            };
            let outcome = library_client(settings, &tools).context("library client step")?;
            if !outcome.summaries.is_empty() {
                print_summaries(&outcome.summaries, None)?;
            }
            Ok(outcome.exit_code)
        }
        ClientCmd::WriteConfig {
            logic_file,
            output_dir,
            sizes,
            benchmark,
            granularity,
            library_file,
            code_objects,
        } => {
            let logic = read_logic(&logic_file)?;
            let sizes = problem_sizes(&logic, sizes.as_deref())?;
            let mut step = library_step(&output_dir, &logic.problem_type);
            step.tile_aware_selection = granularity;
            let path = write_logic_config(
                settings,
                &logic,
                &sizes,
                &step,
                benchmark,
                &code_objects,
                library_file.as_deref(),
            )?;
            println!("{}", path.display());
            Ok(0)
        }
        ClientCmd::WriteHeader {
            logic_files,
            output_dir,
            benchmark,
            sizes,
            step_name,
        } => {
            let path = match benchmark {
                true => {
                    let [logic_file] = logic_files.as_slice() else {
                        bail!("benchmark headers are written for exactly one logic file");
                    };
                    let logic = read_logic(logic_file)?;
                    let sizes = problem_sizes(&logic, sizes.as_deref())?;
                    let summation = summation_sizes(&logic.problem_type, &sizes);
                    let step_name =
                        step_name.unwrap_or_else(|| logic.problem_type.to_string());
                    let mode = HeaderMode::Benchmark(BenchmarkHeader {
                        problem_type: &logic.problem_type,
                        solutions: &logic.solutions,
                        problem_sizes: &sizes,
                        summation_sizes: &summation,
                        namer: &MinimalSolutionNamer,
                        step_name: &step_name,
                        step_base_dir: &output_dir,
                    });
                    write_client_parameters(settings, &mode, &output_dir)?
                }
                false => {
                    let functions = logic_files
                        .iter()
                        .map(|path| {
                            read_logic(path).map(|logic| (logic.schedule_name, logic.problem_type))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    write_client_parameters(
                        settings,
                        &HeaderMode::Library {
                            functions: &functions,
                        },
                        &output_dir,
                    )?
                }
            };
            println!("{}", path.display());
            Ok(0)
        }
        ClientCmd::BenchConfig {
            library_root,
            sizes,
            data_file,
            config_file,
            logic_file,
        } => {
            let problems = parse_size_list(&sizes)
                .with_context(|| format!("parsing problem sizes `{sizes}`"))?;
            let logic = logic_file.as_deref().map(read_logic).transpose()?;
            let problem_type = logic.as_ref().map(|l| &l.problem_type);
            let sizes = match problem_type {
                Some(pt) => ProblemSizes::new(pt, problems),
                None => ProblemSizes {
                    problems,
                    ..ProblemSizes::default()
                },
            };
            write_benchmark_config_for_sizes(
                settings,
                &library_root,
                &sizes,
                &data_file,
                &config_file,
                problem_type,
            )?;
            println!("{}", config_file.display());
            Ok(0)
        }
        ClientCmd::BuildScript {
            logic_path,
            output_dir,
        } => {
            let logic_path = logic_path.unwrap_or_else(|| settings.library_logic_dir());
            let output_dir = output_dir.unwrap_or_else(|| settings.library_client_dir());
            let invocation = create_library_command(settings, &logic_path, &output_dir);
            let path = write_build_script(&output_dir, &invocation)?;
            println!("{}", path.display());
            Ok(0)
        }
        ClientCmd::RunScript {
            config_files,
            output_dir,
            library,
            granularity,
        } => {
            let mode = match library {
                true => RunMode::Library,
                false => RunMode::Benchmark,
            };
            let configs = match config_files.is_empty() {
                true => default_config_paths(&output_dir, granularity),
                false => config_files,
            };
            let path = write_run_script(settings, mode, &configs, &output_dir)?;
            println!("{}", path.display());
            Ok(0)
        }
        ClientCmd::Run { config_file } => {
            let runner = ProcessClientRunner::new(&settings.paths.client_executable);
            Ok(run_new_client(settings, &runner, &config_file)?)
        }
        ClientCmd::Summarize {
            results,
            metric,
            output_file,
        } => {
            let summaries = results
                .iter()
                .map(|path| ResultsSummary::from_csv(path, &metric))
                .collect::<Result<Vec<_>, _>>()?;
            print_summaries(&summaries, output_file.as_deref())?;
            Ok(0)
        }
        ClientCmd::Settings => {
            print!("{}", ClientSettings::default_toml()?);
            Ok(0)
        }
    }
}

fn read_logic(path: &Path) -> Result<LogicFile> {
    JsonLogicReader
        .read(path)
        .with_context(|| format!("reading logic file {}", path.display()))
}

/// Problems given on the command line, or those of the logic file.
fn problem_sizes(logic: &LogicFile, sizes: Option<&str>) -> Result<ProblemSizes> {
    match sizes {
        Some(sizes) => {
            let problems = parse_size_list(sizes)
                .with_context(|| format!("parsing problem sizes `{sizes}`"))?;
            Ok(ProblemSizes::new(&logic.problem_type, problems))
        }
        None => Ok(logic_problem_sizes(logic)),
    }
}

/// Distinct extents of the summation indices over all problems.
fn summation_sizes(problem_type: &ProblemType, sizes: &ProblemSizes) -> Vec<usize> {
    let summation = problem_type.indices_summation();
    let mut values: Vec<usize> = sizes
        .problems
        .iter()
        .flat_map(|p| summation.iter().filter_map(|&idx| p.sizes.get(idx).copied()))
        .collect();
    values.sort_unstable();
    values.dedup();
    values
}

fn print_summaries(summaries: &[ResultsSummary], output_file: Option<&Path>) -> Result<()> {
    let mut output: Box<dyn Write> = match output_file {
        Some(name) => Box::new(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(name)
                .with_context(|| format!("opening {}", name.display()))?,
        ),
        None => Box::new(stdout()),
    };

    ResultsSummary::print_csv_header(&mut output)?;
    for summary in summaries {
        writeln!(output, "{summary}")?;
    }
    if let Some(name) = output_file {
        info!("Wrote {} summaries to {}", summaries.len(), name.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{DataType, Problem};

    #[test]
    fn summation_sizes_are_distinct_and_sorted() {
        let pt = ProblemType::gemm(DataType::Single, false, false);
        let sizes = ProblemSizes::new(
            &pt,
            vec![
                Problem::new(vec![64, 64, 1, 512]),
                Problem::new(vec![128, 128, 1, 256]),
                Problem::new(vec![32, 32, 1, 512]),
            ],
        );
        assert_eq!(summation_sizes(&pt, &sizes), [256, 512]);
    }

    #[test]
    fn summaries_are_written_as_csv() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results.csv");
        std::fs::write(&results, "gflops\n1\n3\n").unwrap();
        let summary = ResultsSummary::from_csv(&results, "gflops").unwrap();

        let out = dir.path().join("summary.csv");
        print_summaries(&[summary], Some(&out)).unwrap();
        let content = std::fs::read_to_string(out).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "file,metric,count,min,median,max,mean,stddev");
        assert!(lines[1].ends_with(",gflops,2,1,3,3,2.000000,1.414214"));
    }
}
