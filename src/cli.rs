//! Command-Line Interface related code.
//!
//! This module handles the parsing of CLI arguments using the [`clap`][1] crate.
//! It defines the availables runtime options and subcommands.
//!
//! [1]: https://crates.io/crates/clap

use crate::consts;

use clap::{ArgAction, Parser, Subcommand};

use std::path::PathBuf;

/// Configuration writer and orchestrator of the Tensile benchmarking client.
///
/// Renders logic files into client configuration files and the generated `ClientParameters.h`
/// header, drives the library builder and the client executable, and summarizes the results the
/// client writes.
#[derive(Clone, Debug, Parser)]
#[command(name = "tensile-client", version)]
pub struct CliArgs {
    /// Settings file (TOML), built-in defaults if unspecified.
    #[arg(short, long, global = true, value_name = "TOML")]
    pub settings: Option<PathBuf>,

    /// Increase logging verbosity (`-v` for debug, `-vv` for trace). `RUST_LOG` takes
    /// precedence when set.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Command to run.
    #[command(subcommand)]
    pub command: ClientCmd,
}

/// List of available commands.
#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum ClientCmd {
    /// Build the library of every logic file and run the client on each of them
    LibraryClient,
    /// Write the client configuration of a logic file
    WriteConfig {
        /// Logic file (JSON).
        logic_file: PathBuf,

        /// Directory the configuration is written to.
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Problem sizes, e.g. `1024,1024,1,512;256,256,1,64`. Defaults to the exact sizes of
        /// the logic file.
        #[arg(long)]
        sizes: Option<String>,

        /// Write a benchmark configuration rather than a library one.
        #[arg(short, long)]
        benchmark: bool,

        /// Write the configuration of the tile-aware selection pass.
        #[arg(long)]
        granularity: bool,

        /// Library file the client loads.
        #[arg(long)]
        library_file: Option<PathBuf>,

        /// Code object the client loads, may be repeated.
        #[arg(long = "code-object", value_name = "CODE_OBJECT")]
        code_objects: Vec<PathBuf>,
    },
    /// Write `ClientParameters.h` for logic files
    WriteHeader {
        /// Logic files (JSON).
        #[arg(required = true, num_args = 1..)]
        logic_files: Vec<PathBuf>,

        /// Directory the header is written to.
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Benchmark the solutions of a single logic file rather than dispatching to a library.
        #[arg(short, long)]
        benchmark: bool,

        /// Problem sizes of the benchmark. Defaults to the exact sizes of the logic file.
        #[arg(long)]
        sizes: Option<String>,

        /// Name of the benchmark step, which names its results files.
        #[arg(long)]
        step_name: Option<String>,
    },
    /// Write a benchmark configuration against an already built library
    BenchConfig {
        /// Directory holding the `library` directory of the build.
        library_root: PathBuf,

        /// Problem sizes, e.g. `1024,1024,1,512;256,256,1,64`.
        #[arg(long, required = true)]
        sizes: String,

        /// Results file the client writes.
        #[arg(short, long)]
        data_file: PathBuf,

        /// Configuration file to write.
        #[arg(short, long)]
        config_file: PathBuf,

        /// Logic file providing the problem type, read from the library metadata otherwise.
        #[arg(long)]
        logic_file: Option<PathBuf>,
    },
    /// Write `build.sh` calling the library builder
    BuildScript {
        /// Logic directory, the configured one if unspecified.
        #[arg(long)]
        logic_path: Option<PathBuf>,

        /// Build directory, the library client directory if unspecified.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Write `run.sh` calling the client on configuration files
    RunScript {
        /// Client configurations (INI). Defaults to the client parameters of `../source`.
        config_files: Vec<PathBuf>,

        /// Build directory the script is written to.
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Only run the best solution of each problem.
        #[arg(long)]
        library: bool,

        /// Also run the tile-aware selection configuration (default configurations only).
        #[arg(long)]
        granularity: bool,
    },
    /// Run the client once on a configuration file
    Run {
        /// Client configuration (INI).
        config_file: PathBuf,
    },
    /// Summarize a metric column of client results files
    Summarize {
        /// Results files (CSV).
        #[arg(required = true, num_args = 1..)]
        results: Vec<PathBuf>,

        /// Metric column.
        #[arg(short, long, default_value = consts::DEFAULT_METRIC_COLUMN)]
        metric: String,

        /// Output file, defaults to `stdout` if unspecified.
        #[arg(short, long)]
        output_file: Option<PathBuf>,
    },
    /// Print the default settings as TOML
    Settings,
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn global_options_follow_subcommands() {
        let args = CliArgs::try_parse_from([
            "tensile-client",
            "write-header",
            "a.json",
            "b.json",
            "-vv",
            "--settings",
            "client.toml",
        ])
        .unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.settings, Some(PathBuf::from("client.toml")));
        assert!(matches!(
            args.command,
            ClientCmd::WriteHeader { ref logic_files, benchmark: false, .. } if logic_files.len() == 2
        ));
    }

    #[test]
    fn summarize_defaults_to_gflops() {
        let args = CliArgs::try_parse_from(["tensile-client", "summarize", "r.csv"]).unwrap();
        match args.command {
            ClientCmd::Summarize { metric, .. } => assert_eq!(metric, "gflops"),
            other => panic!("unexpected command {other:?}"),
        }
        assert!(CliArgs::try_parse_from(["tensile-client", "summarize"]).is_err());
    }

    #[test]
    fn run_script_configurations_are_optional() {
        let args =
            CliArgs::try_parse_from(["tensile-client", "run-script", "--library", "-o", "build"])
                .unwrap();
        assert_eq!(
            args.command,
            ClientCmd::RunScript {
                config_files: Vec::new(),
                output_dir: PathBuf::from("build"),
                library: true,
                granularity: false,
            }
        );
    }
}
