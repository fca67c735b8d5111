//! Process drivers.
//!
//! This module chains the writers with the external tools: the library builder, which compiles
//! logic files into code objects and a master library, and the native client, which loads them
//! and benchmarks or validates every problem of a configuration file. Both tools are reached
//! through the [`BuildTool`] and [`ClientRunner`] traits so that the flow can be driven without a
//! GPU or a compiler.
//!
//! # High-level approach of the library client step
//! ## 1. Library build
//! The logic files found under the library-logic directory are compiled by the library builder
//! into `<library client dir>/library`. A `build.sh` replaying the call is left next to it.
//!
//! ## 2. Configuration
//! One client configuration is written per logic file under `<library client dir>/source`,
//! referencing the code objects and the library file produced by the build, along with a
//! `ClientParameters.h` header listing every function of the library.
//!
//! ## 3. Client runs
//! The client is run once per configuration, asking for the best solution of each problem. Runs
//! are serialized by a [`ClientExecutionLock`]. A non-zero exit code is reported as a warning and
//! the first one is returned; it is never retried.
//!
//! ## 4. Post-processing
//! The results file of each configuration, when the client produced one, is reduced to a
//! [`ResultsSummary`].

mod build;
mod client;

pub use build::{BuildTool, ProcessBuildTool};
pub use client::{ClientExecutionLock, ClientRunner, ExecutionGuard, ProcessClientRunner};

use crate::{
    consts::{CLIENT_PARAMETERS_BASE, DEFAULT_METRIC_COLUMN},
    error::{ClientError, Result},
    perf_report::ResultsSummary,
    problem::{ProblemSizes, ProblemType},
    settings::{ClientSettings, LibraryFormat},
    solution::{find_logic_files, LogicFile, LogicReader},
    utils::{has_extension, list_files},
    writers::{
        create_library_command, write_build_script, write_client_config, write_client_parameters,
        write_run_script, ClientConfig, ConfigStep, HeaderMode, RunMode,
    },
};

use tracing::{debug, info, warn};

use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// External tools used by the library client step.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub reader: &'a dyn LogicReader,
    pub build_tool: &'a dyn BuildTool,
    pub runner: &'a dyn ClientRunner,
}

/// Outcome of the library client step.
#[derive(Clone, Debug, PartialEq)]
pub struct LibraryClientOutcome {
    /// First non-zero client exit code, or zero.
    ///
    /// Every configuration is run even after a failure, so that each problem type gets its
    /// results. The `run.sh` written next to the build runs under `set -e` and stops at the
    /// first failing configuration instead.
    pub exit_code: i32,
    pub configs: Vec<PathBuf>,
    pub summaries: Vec<ResultsSummary>,
}

/// Builds the library of every logic file and runs the client on each of them.
pub fn library_client(
    settings: &ClientSettings,
    tools: &Collaborators,
) -> Result<LibraryClientOutcome> {
    let logic_dir = settings.library_logic_dir();
    let step_dir = settings.library_client_dir();
    let source_dir = step_dir.join("source");
    let build_dir = step_dir.join("build");

    let logic_files = find_logic_files(&logic_dir, tools.reader)?;
    if logic_files.is_empty() {
        return Err(ClientError::MissingArtifact(format!(
            "no logic files (*.{}) in {}",
            tools.reader.extensions().join(", *."),
            logic_dir.display()
        )));
    }
    info!("Found {} logic files in {}", logic_files.len(), logic_dir.display());

    let invocation = create_library_command(settings, &logic_dir, &step_dir);
    write_build_script(&step_dir, &invocation)?;
    let code = tools.build_tool.create_library(&invocation)?;
    if code != 0 {
        warn!("Library build exited with code {code}");
    }

    let library_dir = step_dir.join("library");
    let code_objects = list_files(&library_dir, |p| has_extension(p, "co"))?;
    let library_file = find_library_file(&library_dir, settings.library.library_format)?;
    debug!(
        "Library {} with {} code objects",
        library_file.display(),
        code_objects.len()
    );

    let mut functions = Vec::with_capacity(logic_files.len());
    let mut configs = Vec::with_capacity(logic_files.len());
    let mut results = Vec::with_capacity(logic_files.len());
    for path in &logic_files {
        let logic = tools.reader.read(path)?;
        let step = library_step(&source_dir, &logic.problem_type);
        let sizes = logic_problem_sizes(&logic);
        configs.push(write_logic_config(
            settings,
            &logic,
            &sizes,
            &step,
            false,
            &code_objects,
            Some(&library_file),
        )?);
        results.push(step.results_path());
        functions.push((logic.schedule_name, logic.problem_type));
    }
    write_client_parameters(settings, &HeaderMode::Library { functions: &functions }, &source_dir)?;

    if settings.library.force_redo_library_client {
        clobber(&build_dir)?;
    }
    write_run_script(settings, RunMode::Library, &configs, &build_dir)?;

    let mut args = settings.benchmark.client_args();
    args.extend(["--best-solution".to_string(), "1".to_string()]);

    let mut exit_code = 0;
    {
        let lock = ClientExecutionLock::new(settings.paths.execution_lock.clone());
        let _guard = lock.acquire()?;
        for config in &configs {
            let code = tools.runner.run(config, &args)?;
            if code != 0 {
                warn!("Client exited with code {code} on {}", config.display());
                if exit_code == 0 {
                    exit_code = code;
                }
            }
        }
    }

    let summaries = results
        .iter()
        .filter(|path| path.is_file())
        .filter_map(|path| match ResultsSummary::from_csv(path, DEFAULT_METRIC_COLUMN) {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("Could not summarize {}: {e}", path.display());
                None
            }
        })
        .collect();

    Ok(LibraryClientOutcome {
        exit_code,
        configs,
        summaries,
    })
}

/// Runs the client once on `config_file`, under the execution lock.
///
/// A non-zero exit code is logged and returned.
pub fn run_new_client(
    settings: &ClientSettings,
    runner: &dyn ClientRunner,
    config_file: &Path,
) -> Result<i32> {
    let lock = ClientExecutionLock::new(settings.paths.execution_lock.clone());
    let _guard = lock.acquire()?;
    let code = runner.run(config_file, &[])?;
    if code != 0 {
        warn!("Client exited with code {code} on {}", config_file.display());
    }
    Ok(code)
}

/// Naming of the configuration written for one problem type of the library.
pub fn library_step(source_dir: &Path, problem_type: &ProblemType) -> ConfigStep {
    ConfigStep {
        output_dir: source_dir.to_path_buf(),
        config_base: format!("{CLIENT_PARAMETERS_BASE}_{problem_type}"),
        step_name: problem_type.to_string(),
        step_base_dir: source_dir.to_path_buf(),
        tile_aware_selection: false,
    }
}

/// Problems of a logic file: its exact sizes, or a placeholder problem when it has none.
pub fn logic_problem_sizes(logic: &LogicFile) -> ProblemSizes {
    match logic.exact_logic.is_empty() {
        true => ProblemSizes::dummy(&logic.problem_type),
        false => ProblemSizes::from_exact_logic(&logic.problem_type, &logic.exact_logic),
    }
}

/// Writes the client configuration of a logic file over `sizes`.
///
/// The bias type is the first one the problem type supports; activations are only listed for
/// problem types built for every activation.
pub fn write_logic_config(
    settings: &ClientSettings,
    logic: &LogicFile,
    sizes: &ProblemSizes,
    step: &ConfigStep,
    for_benchmark: bool,
    code_objects: &[PathBuf],
    library_file: Option<&Path>,
) -> Result<PathBuf> {
    let pt = &logic.problem_type;
    let library_client = &settings.library_client;
    let activation_args = match pt.activation_type.is_for_all() {
        true => library_client.activation_args.clone(),
        false => Vec::new(),
    };

    let config = ClientConfig {
        for_benchmark,
        problem_type: pt,
        problem_sizes: sizes,
        bias_type_args: pt.bias_data_type_list.first().copied().into_iter().collect(),
        factor_dim_args: library_client.factor_dim_args.clone(),
        activation_args,
        icache_flush_args: library_client.icache_flush_args.clone(),
        source_dir: step.output_dir.clone(),
        code_object_files: code_objects.to_vec(),
        library_file: library_file.map(Path::to_path_buf),
    };
    write_client_config(settings, &config, logic.solutions.len(), step)
}

/// Master library of a build: the file named after the format if present, otherwise the first
/// file with the format's extension.
fn find_library_file(library_dir: &Path, format: LibraryFormat) -> Result<PathBuf> {
    let master = library_dir.join(format.library_file_name());
    if master.is_file() {
        return Ok(master);
    }
    let extension = match format {
        LibraryFormat::Yaml => "yaml",
        LibraryFormat::Msgpack => "dat",
    };
    list_files(library_dir, |p| has_extension(p, extension))?
        .into_iter()
        .next()
        .ok_or_else(|| {
            ClientError::MissingArtifact(format!(
                "no {} library file in {}",
                format.as_str(),
                library_dir.display()
            ))
        })
}

/// Removes a previous client build.
fn clobber(build_dir: &Path) -> Result<()> {
    match fs::remove_dir_all(build_dir) {
        Ok(()) => {
            debug!("Removed {}", build_dir.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ClientError::file(build_dir, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        consts::CLIENT_PARAMETERS_HEADER,
        problem::{DataType, ExactLogicEntry},
        solution::{JsonLogicReader, Solution},
        writers::CreateLibraryInvocation,
    };

    use std::cell::RefCell;

    /// Produces a library the way the builder lays it out.
    struct FakeBuildTool {
        library_files: &'static [&'static str],
        calls: RefCell<Vec<CreateLibraryInvocation>>,
    }

    impl FakeBuildTool {
        fn new(library_files: &'static [&'static str]) -> Self {
            Self {
                library_files,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl BuildTool for FakeBuildTool {
        fn create_library(&self, invocation: &CreateLibraryInvocation) -> Result<i32> {
            let library = invocation.cwd.join("library");
            fs::create_dir_all(&library)?;
            for name in self.library_files {
                fs::write(library.join(name), "")?;
            }
            self.calls.borrow_mut().push(invocation.clone());
            Ok(0)
        }
    }

    /// Writes a results file for each run and exits with the queued codes.
    struct FakeRunner {
        codes: RefCell<Vec<i32>>,
        runs: RefCell<Vec<(PathBuf, Vec<String>)>>,
    }

    impl FakeRunner {
        fn new(codes: &[i32]) -> Self {
            Self {
                codes: RefCell::new(codes.iter().rev().copied().collect()),
                runs: RefCell::new(Vec::new()),
            }
        }
    }

    impl ClientRunner for FakeRunner {
        fn run(&self, config_file: &Path, args: &[String]) -> Result<i32> {
            let ini = fs::read_to_string(config_file)?;
            if let Some(results) = ini.lines().find_map(|l| l.strip_prefix("results-file=")) {
                let results = Path::new(results);
                if let Some(parent) = results.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(results, "run,gflops\n0,100\n0,300\n")?;
            }
            self.runs
                .borrow_mut()
                .push((config_file.to_path_buf(), args.to_vec()));
            Ok(self.codes.borrow_mut().pop().unwrap_or(0))
        }
    }

    fn write_logic(dir: &Path, name: &str, problem_type: ProblemType, exact: bool) {
        let logic = LogicFile {
            schedule_name: "aldebaran".to_string(),
            architecture: "gfx90a".to_string(),
            problem_type,
            solutions: vec![Solution::new([16, 16, 1], [4, 4])],
            exact_logic: match exact {
                true => vec![ExactLogicEntry(vec![64, 64, 1, 256], (0, 100.0))],
                false => Vec::new(),
            },
        };
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), serde_json::to_string(&logic).unwrap()).unwrap();
    }

    fn workspace() -> (tempfile::TempDir, ClientSettings) {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = ClientSettings::default();
        settings.paths.working_path = dir.path().to_path_buf();
        settings.benchmark.client_args = "--device-idx 0".to_string();

        let logic_dir = settings.library_logic_dir();
        write_logic(
            &logic_dir,
            "aldebaran_Cijk_Alik_Bljk_SB.json",
            ProblemType::gemm(DataType::Single, true, false),
            true,
        );
        write_logic(
            &logic_dir,
            "aldebaran_Cijk_Ailk_Bljk_DB.json",
            ProblemType::gemm(DataType::Double, false, false),
            false,
        );
        (dir, settings)
    }

    #[test]
    fn library_client_builds_configures_and_runs() {
        let (_dir, settings) = workspace();
        let build_tool = FakeBuildTool::new(&["Kernels.co", "TensileLibrary.yaml"]);
        let runner = FakeRunner::new(&[0, 0]);
        let tools = Collaborators {
            reader: &JsonLogicReader,
            build_tool: &build_tool,
            runner: &runner,
        };

        let outcome = library_client(&settings, &tools).unwrap();
        assert_eq!(outcome.exit_code, 0);

        let step_dir = settings.library_client_dir();
        let calls = build_tool.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].cwd, step_dir);
        assert!(step_dir.join("build.sh").is_file());
        assert!(step_dir.join("build/run.sh").is_file());

        // Logic files are visited in path order.
        let source = step_dir.join("source");
        assert_eq!(
            outcome.configs,
            [
                source.join("ClientParameters_Cijk_Ailk_Bljk_DB.ini"),
                source.join("ClientParameters_Cijk_Alik_Bljk_SB.ini"),
            ]
        );
        let ini = fs::read_to_string(&outcome.configs[1]).unwrap();
        assert!(ini.starts_with(&format!(
            "library-file={}\ncode-object={}\n",
            step_dir.join("library/TensileLibrary.yaml").display(),
            step_dir.join("library/Kernels.co").display()
        )));
        assert!(ini.contains("\nproblem-size=64,64,1,256\n"));

        let header = fs::read_to_string(source.join(CLIENT_PARAMETERS_HEADER)).unwrap();
        assert!(header.contains("const unsigned int numFunctions = 2;\n"));

        let runs = runner.runs.borrow();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].1, ["--device-idx", "0", "--best-solution", "1"]);

        assert_eq!(outcome.summaries.len(), 2);
        assert_eq!(outcome.summaries[0].mean(), 200.0);
    }

    #[test]
    fn first_failing_exit_code_is_returned() {
        let (_dir, settings) = workspace();
        let build_tool = FakeBuildTool::new(&["Kernels.co", "TensileLibrary.yaml"]);
        let runner = FakeRunner::new(&[0, 7]);
        let tools = Collaborators {
            reader: &JsonLogicReader,
            build_tool: &build_tool,
            runner: &runner,
        };
        let outcome = library_client(&settings, &tools).unwrap();
        assert_eq!(outcome.exit_code, 7);
        assert_eq!(runner.runs.borrow().len(), 2);
        assert_eq!(outcome.summaries.len(), 2);

        // The replay script stops at the first failure.
        let run_sh = fs::read_to_string(settings.library_client_dir().join("build/run.sh")).unwrap();
        assert!(run_sh.starts_with("#!/bin/bash\n\nset -ex\n"));
    }

    #[test]
    fn missing_library_file_is_fatal() {
        let (_dir, settings) = workspace();
        let build_tool = FakeBuildTool::new(&["Kernels.co"]);
        let runner = FakeRunner::new(&[]);
        let tools = Collaborators {
            reader: &JsonLogicReader,
            build_tool: &build_tool,
            runner: &runner,
        };
        assert!(matches!(
            library_client(&settings, &tools),
            Err(ClientError::MissingArtifact(_))
        ));
        assert!(runner.runs.borrow().is_empty());
    }

    #[test]
    fn forced_redo_clobbers_the_previous_build() {
        let (_dir, settings) = workspace();
        let stale = settings.library_client_dir().join("build/stale.o");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "").unwrap();

        let build_tool = FakeBuildTool::new(&["TensileLibrary.yaml"]);
        let runner = FakeRunner::new(&[]);
        let tools = Collaborators {
            reader: &JsonLogicReader,
            build_tool: &build_tool,
            runner: &runner,
        };
        library_client(&settings, &tools).unwrap();
        assert!(!stale.exists());
    }

    #[test]
    fn library_file_lookup_prefers_the_master_library() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Extra.dat", "TensileLibrary.dat", "TensileLibrary.yaml"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        assert_eq!(
            find_library_file(dir.path(), LibraryFormat::Msgpack).unwrap(),
            dir.path().join("TensileLibrary.dat")
        );
        fs::remove_file(dir.path().join("TensileLibrary.yaml")).unwrap();
        assert!(find_library_file(dir.path(), LibraryFormat::Yaml).is_err());
    }

    #[test]
    fn no_logic_files_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = ClientSettings::default();
        settings.paths.working_path = dir.path().to_path_buf();
        fs::create_dir_all(settings.library_logic_dir()).unwrap();

        let build_tool = FakeBuildTool::new(&[]);
        let runner = FakeRunner::new(&[]);
        let tools = Collaborators {
            reader: &JsonLogicReader,
            build_tool: &build_tool,
            runner: &runner,
        };
        let err = library_client(&settings, &tools).unwrap_err();
        assert!(err.to_string().contains("(*.json)"));
        assert!(build_tool.calls.borrow().is_empty());
    }

    #[test]
    fn single_run_returns_the_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("ClientParameters.ini");
        fs::write(&config, "problem-size=1,1,1,1\n").unwrap();

        let runner = FakeRunner::new(&[3]);
        assert_eq!(
            run_new_client(&ClientSettings::default(), &runner, &config).unwrap(),
            3
        );
        assert!(runner.runs.borrow()[0].1.is_empty());
    }
}
