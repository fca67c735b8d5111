//! Client settings.
//!
//! Every formatting and orchestration function takes a [`ClientSettings`] explicitly. Settings
//! are loaded from a TOML file in which every key is optional:
//!
//! ```toml
//! [paths]
//! working_path = "build/tensile"
//! client_executable = "/opt/tensile/bin/tensile_client"
//!
//! [library]
//! architecture = "gfx90a"
//! merge_files = false
//!
//! [data_init]
//! a = "Random"
//! beta = 0            # numeric codes are accepted too
//!
//! [library_client]
//! activation_args = ["none", "relu"]
//! ```

use crate::{
    consts::INDEX_CHARS,
    error::{ClientError, Result},
    problem::ActivationType,
};

use serde::{Deserialize, Serialize};

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

/// Raw form of an enumerated setting: its name, or its numeric code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NameOrCode {
    Code(i64),
    Name(String),
}

/// Declares an enumerated setting whose name is what the client reads, and which can be given by
/// name or by numeric code.
macro_rules! client_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(try_from = "NameOrCode", into = "NameOrCode")]
        pub enum $name {
            $($variant = $code),*
        }

        impl $name {
            /// Name understood by the client.
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant)),*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.name())
            }
        }

        impl TryFrom<NameOrCode> for $name {
            type Error = String;

            fn try_from(value: NameOrCode) -> std::result::Result<Self, String> {
                match value {
                    NameOrCode::Name(name) => match name.as_str() {
                        $(stringify!($variant) => Ok(Self::$variant),)*
                        _ => Err(format!("unknown {} `{name}`", stringify!($name))),
                    },
                    NameOrCode::Code(code) => match code {
                        $($code => Ok(Self::$variant),)*
                        _ => Err(format!("unknown {} code {code}", stringify!($name))),
                    },
                }
            }
        }

        impl From<$name> for NameOrCode {
            fn from(value: $name) -> Self {
                NameOrCode::Name(value.name().to_string())
            }
        }
    };
}

client_enum!(
    /// Initialization pattern of a tensor or scalar.
    DataInitName {
        Zero = 0,
        One = 1,
        Two = 2,
        Random = 3,
        NaN = 4,
        Inf = 5,
        BadInput = 6,
        BadOutput = 7,
        SerialIdx = 8,
        SerialDim0 = 9,
        SerialDim1 = 10,
        Identity = 11,
        TrigSin = 12,
        TrigCos = 13,
        TrigAbsSin = 14,
        TrigAbsCos = 15,
        RandomNarrow = 16,
        NegOne = 17,
        Max = 18,
        DenormMin = 19,
        DenormMax = 20,
        RandomNegPosLimited = 21,
        TrigIndSin = 23,
        TrigIndCos = 24,
        TrigIndAbsSin = 25,
        TrigIndAbsCos = 26,
    }
);

client_enum!(
    /// Out-of-bounds detection performed by the client.
    BoundsCheckMode {
        Disable = 0,
        NaN = 1,
        GuardPageFront = 2,
        GuardPageBack = 3,
        GuardPageAll = 4,
    }
);

client_enum!(
    /// Pruning pattern applied to sparse inputs.
    PruneMode {
        PruneRandom = 0,
        PruneXX00 = 1,
        PruneX0X0 = 2,
        Prune0XX0 = 3,
        PruneX00X = 4,
        Prune0X0X = 5,
        Prune00XX = 6,
    }
);

client_enum!(
    /// Verbosity of the client.
    ClientLogLevel {
        Error = 0,
        Terse = 1,
        Verbose = 2,
        Debug = 3,
    }
);

/// Serialization format of the generated library.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryFormat {
    #[default]
    Yaml,
    Msgpack,
}

impl LibraryFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Msgpack => "msgpack",
        }
    }

    /// File name of the master library in this format.
    pub fn library_file_name(self) -> &'static str {
        match self {
            Self::Yaml => "TensileLibrary.yaml",
            Self::Msgpack => "TensileLibrary.dat",
        }
    }
}

/// Runtime the kernels are launched with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeLanguage {
    #[default]
    #[serde(rename = "HIP", alias = "hip")]
    Hip,
    #[serde(rename = "OCL", alias = "ocl")]
    Ocl,
}

impl fmt::Display for RuntimeLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hip => write!(f, "HIP"),
            Self::Ocl => write!(f, "OCL"),
        }
    }
}

/// Client settings, all sections optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub paths: PathSettings,
    pub library: LibrarySettings,
    pub data_init: DataInitSettings,
    pub validation: ValidationSettings,
    pub benchmark: BenchmarkSettings,
    pub library_client: LibraryClientSettings,
}

impl ClientSettings {
    /// Loads settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ClientError::file(path, e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Renders the settings as TOML.
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// The default settings as a TOML document, a starting point for a settings file.
    pub fn default_toml() -> std::result::Result<String, toml::ser::Error> {
        Self::default().to_toml()
    }

    /// Directory holding the logic files.
    pub fn library_logic_dir(&self) -> PathBuf {
        self.paths
            .working_path
            .join(&self.paths.library_logic_path)
    }

    /// Directory of the library client step.
    pub fn library_client_dir(&self) -> PathBuf {
        self.paths
            .working_path
            .join(&self.paths.library_client_path)
    }
}

/// Locations of inputs, outputs and external tools.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub working_path: PathBuf,
    pub library_logic_path: PathBuf,
    pub library_client_path: PathBuf,
    /// The create-library tool.
    pub create_library: PathBuf,
    /// The prebuilt client executable.
    pub client_executable: PathBuf,
    /// Lock file serializing client runs across processes.
    pub execution_lock: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            working_path: PathBuf::from("."),
            library_logic_path: PathBuf::from("3_LibraryLogic"),
            library_client_path: PathBuf::from("4_LibraryClient"),
            create_library: PathBuf::from("TensileCreateLibrary"),
            client_executable: PathBuf::from("tensile_client"),
            execution_lock: None,
        }
    }
}

/// Flags forwarded to the create-library tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    pub merge_files: bool,
    pub short_names: bool,
    pub library_print_debug: bool,
    pub asm_debug: bool,
    pub keep_build_tmp: bool,
    pub architecture: String,
    pub code_object_version: String,
    pub library_format: LibraryFormat,
    pub runtime_language: RuntimeLanguage,
    pub cxx_compiler: String,
    pub c_compiler: String,
    /// Target of the current run, e.g. `gfx90a`; code objects built for other targets are
    /// skipped.
    pub current_isa: Option<String>,
    /// Clobber the client build directory before building.
    pub force_redo_library_client: bool,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            merge_files: true,
            short_names: false,
            library_print_debug: false,
            asm_debug: false,
            keep_build_tmp: false,
            architecture: "all".to_string(),
            code_object_version: "4".to_string(),
            library_format: LibraryFormat::Yaml,
            runtime_language: RuntimeLanguage::Hip,
            cxx_compiler: "amdclang++".to_string(),
            c_compiler: "amdclang".to_string(),
            current_isa: None,
            force_redo_library_client: true,
        }
    }
}

/// Data initialization of every tensor and scalar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataInitSettings {
    /// Fallback for `a` and `b`.
    pub ab: DataInitName,
    pub a: Option<DataInitName>,
    pub b: Option<DataInitName>,
    pub c: DataInitName,
    pub d: DataInitName,
    pub e: DataInitName,
    pub alpha: DataInitName,
    pub beta: DataInitName,
    pub bias: DataInitName,
    pub scale_a: DataInitName,
    pub scale_b: DataInitName,
    pub scale_c: DataInitName,
    pub scale_d: DataInitName,
    pub scale_alpha_vec: DataInitName,
    pub seed: i64,
    /// Extra arguments of the activation function.
    pub activation_args: Vec<f64>,
}

impl Default for DataInitSettings {
    fn default() -> Self {
        Self {
            ab: DataInitName::Random,
            a: None,
            b: None,
            c: DataInitName::Random,
            d: DataInitName::Zero,
            e: DataInitName::Zero,
            alpha: DataInitName::Two,
            beta: DataInitName::Two,
            bias: DataInitName::Random,
            scale_a: DataInitName::Two,
            scale_b: DataInitName::Two,
            scale_c: DataInitName::Two,
            scale_d: DataInitName::Two,
            scale_alpha_vec: DataInitName::Random,
            seed: 0,
            activation_args: vec![2.0, 2.0],
        }
    }
}

impl DataInitSettings {
    /// The `init-*` parameters, in client order. Beta is zeroed for problem types without beta.
    pub fn params(&self, use_beta: bool) -> [(&'static str, DataInitName); 13] {
        let beta = match use_beta {
            true => self.beta,
            false => DataInitName::Zero,
        };
        [
            ("init-a", self.a.unwrap_or(self.ab)),
            ("init-b", self.b.unwrap_or(self.ab)),
            ("init-c", self.c),
            ("init-d", self.d),
            ("init-e", self.e),
            ("init-alpha", self.alpha),
            ("init-beta", beta),
            ("init-bias", self.bias),
            ("init-scaleA", self.scale_a),
            ("init-scaleB", self.scale_b),
            ("init-scaleC", self.scale_c),
            ("init-scaleD", self.scale_d),
            ("init-scaleAlphaVec", self.scale_alpha_vec),
        ]
    }
}

/// Validation and debugging options of the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub print_tensor_a: bool,
    pub print_tensor_b: bool,
    pub print_tensor_c: bool,
    pub print_tensor_d: bool,
    pub print_tensor_ref: bool,
    pub print_tensor_bias: bool,
    pub print_tensor_amax_d: bool,
    pub dump_tensors: bool,
    pub exit_on_fails: u32,
    pub c_equal_d: bool,
    pub bounds_check: BoundsCheckMode,
    pub prune_sparse_mode: PruneMode,
    pub print_valids: bool,
    pub max_to_print: u32,
    /// Elements validated per problem, -1 for all.
    pub num_elements_to_validate: i64,
    /// Elements validated for the winning solution, -1 for all.
    pub num_elements_to_validate_winner: i64,
    pub print_winners_only: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            print_tensor_a: false,
            print_tensor_b: false,
            print_tensor_c: false,
            print_tensor_d: false,
            print_tensor_ref: false,
            print_tensor_bias: false,
            print_tensor_amax_d: false,
            dump_tensors: false,
            exit_on_fails: 1,
            c_equal_d: false,
            bounds_check: BoundsCheckMode::Disable,
            prune_sparse_mode: PruneMode::PruneRandom,
            print_valids: false,
            max_to_print: 4,
            num_elements_to_validate: 128,
            num_elements_to_validate_winner: 0,
            print_winners_only: false,
        }
    }
}

/// Benchmarking scalars and client invocation options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkSettings {
    pub device: u32,
    pub performance_metric: String,
    pub num_benchmarks: u32,
    pub enqueues_per_sync: u32,
    pub max_enqueues_per_sync: i64,
    pub syncs_per_benchmark: u32,
    pub skip_slow_solution_ratio: f64,
    pub kernel_time: bool,
    pub hardware_monitor: bool,
    pub num_warmups: u32,
    pub min_flops_per_sync: u64,
    pub sleep_percent: u32,
    pub perf_model_l2_read_hits: f64,
    pub perf_model_l2_write_hits: f64,
    pub perf_model_l2_read_bw_mul: f64,
    pub perf_model_read_efficiency: f64,
    pub csv_export_winner: bool,
    pub csv_merge_same_problem_id: bool,
    pub client_log_level: ClientLogLevel,
    pub max_workspace_size: u64,
    pub granularity_threshold: f64,
    pub pristine_on_gpu: bool,
    pub library_update_file: String,
    pub library_update_comment: bool,
    pub use_user_args: bool,
    pub rotating_buffer_size: u64,
    pub rotating_mode: u32,
    /// Extra arguments passed to every client invocation.
    pub client_args: String,
    /// Pin GPU clocks with rocm-smi around benchmark runs.
    pub pin_clocks: bool,
    pub rocm_smi_path: Option<PathBuf>,
    /// Characters naming the problem indices in generated code.
    pub index_chars: String,
}

impl Default for BenchmarkSettings {
    fn default() -> Self {
        Self {
            device: 0,
            performance_metric: "DeviceEfficiency".to_string(),
            num_benchmarks: 1,
            enqueues_per_sync: 1,
            max_enqueues_per_sync: -1,
            syncs_per_benchmark: 1,
            skip_slow_solution_ratio: 0.0,
            kernel_time: true,
            hardware_monitor: true,
            num_warmups: 0,
            min_flops_per_sync: 1,
            sleep_percent: 300,
            perf_model_l2_read_hits: 0.0,
            perf_model_l2_write_hits: 0.15,
            perf_model_l2_read_bw_mul: 2.0,
            perf_model_read_efficiency: 0.85,
            csv_export_winner: false,
            csv_merge_same_problem_id: false,
            client_log_level: ClientLogLevel::Debug,
            max_workspace_size: 32 * 1024 * 1024,
            granularity_threshold: 0.0,
            pristine_on_gpu: true,
            library_update_file: String::new(),
            library_update_comment: false,
            use_user_args: false,
            rotating_buffer_size: 0,
            rotating_mode: 0,
            client_args: String::new(),
            pin_clocks: false,
            rocm_smi_path: None,
            index_chars: INDEX_CHARS.to_string(),
        }
    }
}

impl BenchmarkSettings {
    /// `client_args` split into individual arguments.
    pub fn client_args(&self) -> Vec<String> {
        self.client_args
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

/// Runtime arguments of the library client step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryClientSettings {
    /// Activations exercised by kernels built for every activation.
    pub activation_args: Vec<ActivationType>,
    pub factor_dim_args: Vec<u32>,
    pub icache_flush_args: Vec<bool>,
}

impl Default for LibraryClientSettings {
    fn default() -> Self {
        Self {
            activation_args: vec![ActivationType::Relu],
            factor_dim_args: vec![0],
            icache_flush_args: vec![false],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let settings = ClientSettings::from_toml("").unwrap();
        assert_eq!(settings, ClientSettings::default());
        assert_eq!(settings.benchmark.index_chars, INDEX_CHARS);
    }

    #[test]
    fn enumerated_settings_accept_names_and_codes() {
        let settings = ClientSettings::from_toml(
            r#"
            [data_init]
            a = "NaN"
            beta = 0
            c = 23

            [validation]
            bounds_check = "GuardPageAll"
            prune_sparse_mode = 3

            [benchmark]
            client_log_level = "Terse"
            "#,
        )
        .unwrap();
        assert_eq!(settings.data_init.a, Some(DataInitName::NaN));
        assert_eq!(settings.data_init.beta, DataInitName::Zero);
        assert_eq!(settings.data_init.c, DataInitName::TrigIndSin);
        assert_eq!(settings.validation.bounds_check, BoundsCheckMode::GuardPageAll);
        assert_eq!(settings.validation.prune_sparse_mode, PruneMode::Prune0XX0);
        assert_eq!(settings.benchmark.client_log_level, ClientLogLevel::Terse);
        // Defaults still apply to everything else.
        assert!(settings.library.merge_files);
    }

    #[test]
    fn error_log_level_round_trips() {
        let by_name = ClientSettings::from_toml("[benchmark]\nclient_log_level = \"Error\"\n").unwrap();
        let by_code = ClientSettings::from_toml("[benchmark]\nclient_log_level = 0\n").unwrap();
        assert_eq!(by_name.benchmark.client_log_level, ClientLogLevel::Error);
        assert_eq!(by_code, by_name);
        assert!(by_name.to_toml().unwrap().contains("client_log_level = \"Error\""));
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert!(ClientSettings::from_toml("[data_init]\nc = 22\n").is_err());
        assert!(ClientSettings::from_toml("[data_init]\nc = \"Seven\"\n").is_err());
    }

    #[test]
    fn data_init_params_fall_back_and_zero_beta() {
        let mut init = DataInitSettings::default();
        init.ab = DataInitName::One;
        init.b = Some(DataInitName::Identity);

        let params = init.params(false);
        assert_eq!(params[0], ("init-a", DataInitName::One));
        assert_eq!(params[1], ("init-b", DataInitName::Identity));
        assert_eq!(params[6], ("init-beta", DataInitName::Zero));
        assert_eq!(init.params(true)[6], ("init-beta", DataInitName::Two));
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let mut settings = ClientSettings::default();
        settings.paths.execution_lock = Some(PathBuf::from("/tmp/client.lock"));
        settings.library.runtime_language = RuntimeLanguage::Ocl;
        let text = settings.to_toml().unwrap();
        assert_eq!(ClientSettings::from_toml(&text).unwrap(), settings);
    }

    #[test]
    fn client_args_split_on_whitespace() {
        let mut bench = BenchmarkSettings::default();
        bench.client_args = " --print-valids  --verbose ".to_string();
        assert_eq!(bench.client_args(), ["--print-valids", "--verbose"]);
    }
}
