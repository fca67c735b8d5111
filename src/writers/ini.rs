//! Client configuration files.
//!
//! The client reads a flat list of `key=value` lines. Keys are written in a fixed order, and
//! multi-valued arguments (`code-object`, `bias-type-args`, `factor-dim-args`,
//! `icache-flush-args`, `activation-enum-args` and the per-problem size keys) repeat their key
//! once per value, in source order.

use crate::{
    consts::LIBRARY_METADATA,
    error::{ClientError, Result},
    problem::{
        strides::{problem_size_params, Param},
        ActivationType, DataType, ProblemSizes, ProblemType,
    },
    settings::ClientSettings,
    utils::{has_extension, join, list_files, write_file, IniValue},
};

use serde::Deserialize;
use tracing::{debug, info};

use std::{
    fs,
    path::{Path, PathBuf},
};

/// Everything a client configuration describes besides the settings.
#[derive(Clone, Debug)]
pub struct ClientConfig<'a> {
    /// Benchmark configurations validate `NumElementsToValidate` elements; library configurations
    /// also account for the winner's validation.
    pub for_benchmark: bool,
    pub problem_type: &'a ProblemType,
    pub problem_sizes: &'a ProblemSizes,
    pub bias_type_args: Vec<DataType>,
    pub factor_dim_args: Vec<u32>,
    pub activation_args: Vec<ActivationType>,
    pub icache_flush_args: Vec<bool>,
    /// Directory the code objects and the default library file are relative to.
    pub source_dir: PathBuf,
    pub code_object_files: Vec<PathBuf>,
    /// Defaults to the master library under `<source_dir>/library`.
    pub library_file: Option<PathBuf>,
}

/// Location and naming of a written configuration.
#[derive(Clone, Debug)]
pub struct ConfigStep {
    /// Directory the `.ini` file is written to.
    pub output_dir: PathBuf,
    /// File name without extension, e.g. `ClientParameters_Cijk_Ailk_Bljk_SB`.
    pub config_base: String,
    /// Names the results file.
    pub step_name: String,
    /// Results are written to `<step_base_dir>/../Data`.
    pub step_base_dir: PathBuf,
    pub tile_aware_selection: bool,
}

impl ConfigStep {
    pub fn config_path(&self) -> PathBuf {
        let name = match self.tile_aware_selection {
            true => format!("{}_Granularity.ini", self.config_base),
            false => format!("{}.ini", self.config_base),
        };
        self.output_dir.join(name)
    }

    pub fn results_path(&self) -> PathBuf {
        let name = match self.tile_aware_selection {
            true => format!("{}_Granularity.csv", self.step_name),
            false => format!("{}.csv", self.step_name),
        };
        self.step_base_dir.join("..").join("Data").join(name)
    }
}

/// Ordered parameters of a client configuration.
pub fn client_config_params(
    settings: &ClientSettings,
    config: &ClientConfig,
    results_file: &Path,
) -> Result<Vec<Param>> {
    let pt = config.problem_type;
    let mut params: Vec<Param> = Vec::new();
    let mut param = |key: &'static str, value: &dyn IniValue| params.push((key, value.ini()));

    let library_file = match &config.library_file {
        Some(file) => file.clone(),
        None => config
            .source_dir
            .join("library")
            .join(settings.library.library_format.library_file_name()),
    };
    param("library-file", &library_file);

    let gfx = settings.library.current_isa.as_deref();
    for co in &config.code_object_files {
        let name = co.to_string_lossy();
        let matches_target = match gfx {
            Some(gfx) => !name.contains("gfx") || name.contains(gfx),
            None => true,
        };
        if matches_target {
            param("code-object", &config.source_dir.join(co));
        } else {
            debug!("Skipping code object {} built for another target", co.display());
        }
    }

    param("results-file", &results_file);
    param(
        "performance-metric",
        &settings.benchmark.performance_metric,
    );
    param("problem-identifier", &pt.operation_identifier());
    param("compute-input-type", &pt.compute_input_type().to_enum());
    param("a-type", &pt.a_type().to_enum());
    param("b-type", &pt.b_type().to_enum());
    param("c-type", &pt.c_type().to_enum());
    param("d-type", &pt.d_type().to_enum());
    if pt.use_e {
        param("e-type", &pt.e_type().to_enum());
    }
    if pt.output_amax_d {
        param("amaxD-type", &pt.amax_d_type().to_enum());
    }
    param("alpha-type", &pt.alpha_type().to_enum());
    param("beta-type", &pt.beta_type().to_enum());
    param("f32-xdl-math-op", &pt.f32_xdl_math_op().to_enum());
    param(
        "activation-compute-type",
        &pt.activation_compute_type().to_enum(),
    );
    param("use-gradient", &pt.use_gradient);
    param("use-bias", &pt.use_bias);
    param("bias-source", &pt.bias_source());
    param("use-e", &pt.use_e);
    param("output-amaxD", &pt.output_amax_d);
    param("use-scaleAB", &pt.use_scale_ab);
    param("use-scaleCD", &pt.use_scale_cd);
    param("use-scaleAlphaVec", &pt.use_scale_alpha_vec);
    param("swizzle-tensor-a", &pt.swizzle_tensor_a);
    param("swizzle-tensor-b", &pt.swizzle_tensor_b);
    for bias_type in &config.bias_type_args {
        param("bias-type-args", &bias_type.to_enum());
    }
    for factor_dim in &config.factor_dim_args {
        param("factor-dim-args", factor_dim);
    }
    for flush in &config.icache_flush_args {
        param("icache-flush-args", flush);
    }
    param("sparse", &pt.sparse);
    param(
        "high-precision-accumulate",
        &pt.high_precision_accumulate,
    );
    param("strided-batched", &pt.strided_batched);
    param("grouped-gemm", &pt.grouped_gemm);

    for problem in &config.problem_sizes.problems {
        for (key, value) in problem_size_params(pt, problem, &config.factor_dim_args)? {
            param(key, &value);
        }
    }

    for activation in &config.activation_args {
        param("activation-enum-args", &activation.to_enum());
    }
    param("activation-type", &pt.activation_type.to_enum());
    param("activation-no-guard", &pt.activation_no_guard);
    let additional = &settings.data_init.activation_args;
    if !additional.is_empty() {
        let values: Vec<String> = additional.iter().map(IniValue::ini).collect();
        param("activation-additional-args", &values.join(","));
    }

    let bench = &settings.benchmark;
    let validation = &settings.validation;

    param("device-idx", &bench.device);
    param("init-seed", &settings.data_init.seed);
    for (key, init) in settings.data_init.params(pt.use_beta) {
        param(key, &init.name());
    }
    param("c-equal-d", &validation.c_equal_d);

    for (key, enabled) in [
        ("print-tensor-a", validation.print_tensor_a),
        ("print-tensor-b", validation.print_tensor_b),
        ("print-tensor-c", validation.print_tensor_c),
        ("print-tensor-d", validation.print_tensor_d),
        ("print-tensor-ref", validation.print_tensor_ref),
        ("print-tensor-bias", validation.print_tensor_bias),
        ("print-tensor-amaxd", validation.print_tensor_amax_d),
        ("dump-tensors", validation.dump_tensors),
        ("exit-on-error", validation.exit_on_fails > 1),
    ] {
        if enabled {
            param(key, &1);
        }
    }

    param("prune-mode", &validation.prune_sparse_mode.name());
    param("bounds-check", &validation.bounds_check.name());
    param("print-valids", &validation.print_valids);
    param("print-max", &validation.max_to_print);
    param("num-benchmarks", &bench.num_benchmarks);

    let num_elements = validation.num_elements_to_validate;
    let winner = validation.num_elements_to_validate_winner;
    let num_elements = match config.for_benchmark {
        true => num_elements,
        false if winner == -1 || num_elements == -1 => -1,
        false => winner.max(num_elements),
    };
    param("num-elements-to-validate", &num_elements);
    param("num-enqueues-per-sync", &bench.enqueues_per_sync);
    param("max-enqueues-per-sync", &bench.max_enqueues_per_sync);
    param("num-syncs-per-benchmark", &bench.syncs_per_benchmark);
    param("skip-slow-solution-ratio", &bench.skip_slow_solution_ratio);
    param("use-gpu-timer", &bench.kernel_time);
    param("hardware-monitor", &bench.hardware_monitor);
    param("num-warmups", &bench.num_warmups);
    param("min-flops-per-sync", &bench.min_flops_per_sync);
    param("sleep-percent", &bench.sleep_percent);
    param("perf-l2-read-hits", &bench.perf_model_l2_read_hits);
    param("perf-l2-write-hits", &bench.perf_model_l2_write_hits);
    param("perf-l2-read-bw-mul", &bench.perf_model_l2_read_bw_mul);
    param("perf-read-efficiency", &bench.perf_model_read_efficiency);
    param("csv-export-extra-cols", &bench.csv_export_winner);
    param("csv-merge-same-problems", &bench.csv_merge_same_problem_id);
    param("log-level", &bench.client_log_level.name());
    param("max-workspace-size", &bench.max_workspace_size);
    param("PrintWinnersOnly", &validation.print_winners_only);
    param("granularity-threshold", &bench.granularity_threshold);
    param("pristine-on-gpu", &bench.pristine_on_gpu);
    param("library-update-file", &bench.library_update_file);
    param("library-update-comment", &bench.library_update_comment);
    param("use-user-args", &bench.use_user_args);
    param("rotating-buffer-size", &bench.rotating_buffer_size);
    param("rotating-buffer-mode", &bench.rotating_mode);

    Ok(params)
}

/// Renders a client configuration as INI text.
pub fn client_config_ini(
    settings: &ClientSettings,
    config: &ClientConfig,
    results_file: &Path,
) -> Result<String> {
    let params = client_config_params(settings, config, results_file)?;
    Ok(params
        .iter()
        .map(|(key, value)| format!("{key}={value}\n"))
        .collect())
}

/// Writes the configuration of one step and returns its path.
///
/// A step without any solution cannot be run and is rejected.
pub fn write_client_config(
    settings: &ClientSettings,
    config: &ClientConfig,
    num_solutions: usize,
    step: &ConfigStep,
) -> Result<PathBuf> {
    if num_solutions == 0 {
        return Err(ClientError::NoSolutions(step.step_name.clone()));
    }
    let path = step.config_path();
    let ini = client_config_ini(settings, config, &step.results_path())?;
    write_file(&path, &ini)?;
    info!("Wrote client config {}", path.display());
    Ok(path)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LibraryMetadata {
    problem_type: ProblemType,
}

/// Writes a benchmark configuration for `problem_sizes` against an already built library under
/// `<library_root>/library`.
///
/// The problem type is read from the library's metadata file unless one is given.
pub fn write_benchmark_config_for_sizes(
    settings: &ClientSettings,
    library_root: &Path,
    problem_sizes: &ProblemSizes,
    data_file: &Path,
    config_file: &Path,
    problem_type: Option<&ProblemType>,
) -> Result<()> {
    let library_dir = library_root.join("library");
    let code_object_files = list_files(&library_dir, |p| has_extension(p, "co"))?;

    let metadata;
    let problem_type = match problem_type {
        Some(pt) => pt,
        None => {
            let path = library_dir.join(LIBRARY_METADATA);
            if !path.is_file() {
                return Err(ClientError::MissingArtifact(format!(
                    "meta data file {} does not exist",
                    path.display()
                )));
            }
            let content = fs::read_to_string(&path).map_err(|e| ClientError::file(&path, e))?;
            metadata = serde_json::from_str::<LibraryMetadata>(&content)
                .map_err(|source| ClientError::Logic { path, source })?;
            &metadata.problem_type
        }
    };
    debug!(
        "Benchmark config for {problem_type} with code objects [{}]",
        join(
            &code_object_files
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>(),
            ", "
        )
    );

    let config = ClientConfig {
        for_benchmark: true,
        problem_type,
        problem_sizes,
        bias_type_args: Vec::new(),
        factor_dim_args: Vec::new(),
        activation_args: Vec::new(),
        icache_flush_args: Vec::new(),
        source_dir: library_root.to_path_buf(),
        code_object_files,
        library_file: None,
    };
    write_file(
        config_file,
        &client_config_ini(settings, &config, data_file)?,
    )?;
    info!("Wrote benchmark config {}", config_file.display());
    Ok(())
}
