//! Generated `ClientParameters.h`.
//!
//! The header is compiled into the client and describes, as C++ array and struct literals, the
//! data types, problem types and functions (or solutions) the client dispatches to. Two layouts
//! exist:
//!
//! - [`HeaderMode::Library`]: one entry point per `(schedule, problem type)` function of a built
//!   library. Functions are grouped by data type (sorted), then problem type (sorted by name),
//!   then schedule (sorted); each data type gets a dispatch trampoline branching on the
//!   function's index within that data type.
//! - [`HeaderMode::Benchmark`]: the solutions of a single problem type, called directly with the
//!   problem sizes of the benchmark.

use crate::{
    consts::{
        CLIENT_PARAMETERS_HEADER, C_HEADER, MAX_K_TILES, MAX_MN_TILES, NUM_INDICES_LD,
        WORKSPACE_FACTOR,
    },
    error::{ClientError, Result},
    problem::{DataType, ProblemSizes, ProblemType},
    settings::{ClientSettings, RuntimeLanguage},
    solution::{max_solution_sizes, Solution, SolutionNamer},
    utils::{cpp_bool, join, list_to_initializer, write_file},
};

use tracing::info;

use std::{
    fmt::{self, Write},
    path::{Path, PathBuf},
};

/// What the header is generated for.
#[derive(Clone, Copy)]
pub enum HeaderMode<'a> {
    /// `(schedule name, problem type)` functions of a built library.
    Library {
        functions: &'a [(String, ProblemType)],
    },
    Benchmark(BenchmarkHeader<'a>),
}

/// Solutions of one problem type benchmarked over a set of problem sizes.
#[derive(Clone, Copy)]
pub struct BenchmarkHeader<'a> {
    pub problem_type: &'a ProblemType,
    pub solutions: &'a [Solution],
    pub problem_sizes: &'a ProblemSizes,
    pub summation_sizes: &'a [usize],
    pub namer: &'a dyn SolutionNamer,
    pub step_name: &'a str,
    pub step_base_dir: &'a Path,
}

/// Problem types of one data type, each with its schedules.
struct DataTypeGroup<'a> {
    data_type: DataType,
    dest: DataType,
    compute: DataType,
    problem_types: Vec<(&'a ProblemType, Vec<&'a str>)>,
}

impl<'a> DataTypeGroup<'a> {
    fn new(problem_type: &ProblemType) -> Self {
        Self {
            data_type: problem_type.data_type,
            dest: problem_type.dest_type(),
            compute: problem_type.compute_type(),
            problem_types: Vec::new(),
        }
    }

    /// `(schedule, problem type)` pairs of this data type, in dispatch order.
    fn functions(&self) -> impl Iterator<Item = (&'a str, &'a ProblemType)> + '_ {
        self.problem_types
            .iter()
            .flat_map(|(pt, schedules)| schedules.iter().map(move |s| (*s, *pt)))
    }
}

/// Groups library functions by data type, problem type and schedule, each level sorted.
fn group_functions(functions: &[(String, ProblemType)]) -> Vec<DataTypeGroup<'_>> {
    let mut groups: Vec<DataTypeGroup> = Vec::new();
    for (schedule, pt) in functions {
        let idx = match groups.iter().position(|g| g.data_type == pt.data_type) {
            Some(idx) => idx,
            None => {
                groups.push(DataTypeGroup::new(pt));
                groups.len() - 1
            }
        };
        let group = &mut groups[idx];
        match group.problem_types.iter_mut().find(|(p, _)| *p == pt) {
            Some((_, schedules)) => schedules.push(schedule.as_str()),
            None => group.problem_types.push((pt, vec![schedule.as_str()])),
        }
    }

    groups.sort_by_key(|g| g.data_type);
    for group in &mut groups {
        group
            .problem_types
            .sort_by_cached_key(|(pt, _)| pt.to_string());
        for (_, schedules) in &mut group.problem_types {
            schedules.sort_unstable();
        }
    }
    groups
}

/// Rows of the `functionInfo` table: `dataTypeIdxSerial, problemTypeIdxForDataType,
/// problemTypeIdxSerial, functionIdxSerial, functionIdxForDataType, functionIdxForProblemType`.
fn function_info(groups: &[DataTypeGroup]) -> Vec<[usize; 6]> {
    let mut rows = Vec::new();
    let mut problem_type_serial = 0;
    for (data_type_idx, group) in groups.iter().enumerate() {
        let mut function_for_data_type = 0;
        for (problem_type_idx, (_, schedules)) in group.problem_types.iter().enumerate() {
            for function_for_problem_type in 0..schedules.len() {
                rows.push([
                    data_type_idx,
                    problem_type_idx,
                    problem_type_serial,
                    rows.len(),
                    function_for_data_type,
                    function_for_problem_type,
                ]);
                function_for_data_type += 1;
            }
            problem_type_serial += 1;
        }
    }
    rows
}

/// Size list of a problem completed with its leading dimensions `ldd, ldc, lda, ldb`; when the
/// list carries none, the packed ones are used.
fn sizes_with_leading_dims(problem_type: &ProblemType, sizes: &[usize]) -> Result<Vec<usize>> {
    let total = problem_type.total_indices();
    if sizes.len() == total + NUM_INDICES_LD {
        return Ok(sizes.to_vec());
    }
    if sizes.len() != total {
        return Err(ClientError::InvalidProblemSize {
            got: sizes.len(),
            expected: total,
            sizes: join(sizes, ", "),
        });
    }
    let extent = |idx: Option<&usize>| idx.and_then(|&i| sizes.get(i)).copied().unwrap_or(0);
    let first_c = extent(Some(&0));
    let mut row = sizes.to_vec();
    row.extend([
        first_c,
        first_c,
        extent(problem_type.index_assignments_a.first()),
        extent(problem_type.index_assignments_b.first()),
    ]);
    Ok(row)
}

/// Comma-separated per-problem-type values.
fn per_type(pts: &[&ProblemType], value: impl Fn(&ProblemType) -> String) -> String {
    pts.iter()
        .map(|pt| value(pt))
        .collect::<Vec<_>>()
        .join(", ")
}

struct HeaderWriter<'a> {
    settings: &'a ClientSettings,
    groups: Vec<DataTypeGroup<'a>>,
    problem_types: Vec<&'a ProblemType>,
    /// Problem type whose per-header properties (leading-dimension indices, high-precision
    /// accumulation) are emitted.
    last: &'a ProblemType,
    chars: Vec<char>,
}

impl<'a> HeaderWriter<'a> {
    fn new(settings: &'a ClientSettings, groups: Vec<DataTypeGroup<'a>>) -> Result<Self> {
        let problem_types: Vec<&ProblemType> = groups
            .iter()
            .flat_map(|g| g.problem_types.iter().map(|(pt, _)| *pt))
            .collect();
        let Some(&last) = problem_types.last() else {
            return Err(ClientError::NoSolutions(
                "no problem type to generate a header for".to_string(),
            ));
        };
        for pt in &problem_types {
            pt.validate()?;
        }

        let chars: Vec<char> = settings.benchmark.index_chars.chars().collect();
        let max_total = problem_types
            .iter()
            .map(|pt| pt.total_indices())
            .max()
            .unwrap_or(0);
        if chars.len() < max_total {
            return Err(ClientError::InvalidProblemType(format!(
                "{max_total} indices exceed the {} configured index characters",
                chars.len()
            )));
        }

        Ok(Self {
            settings,
            groups,
            problem_types,
            last,
            chars,
        })
    }

    fn is_ocl(&self) -> bool {
        self.settings.library.runtime_language == RuntimeLanguage::Ocl
    }

    fn includes(&self, h: &mut String, mode: &HeaderMode) -> fmt::Result {
        match mode {
            HeaderMode::Benchmark(bench) => {
                if self.settings.library.merge_files {
                    writeln!(h, "#include \"Solutions.h\"")?;
                } else {
                    for solution in bench.solutions {
                        let name = bench.namer.solution_name(bench.problem_type, solution);
                        writeln!(h, "#include \"{name}.h\"")?;
                        writeln!(h, "#include \"Solutions.h\"")?;
                    }
                }
                writeln!(h, "#include \"ReferenceCPU.h\"")?;
                writeln!(h)
            }
            HeaderMode::Library { .. } => {
                writeln!(h, "#include \"Solutions.h\"")?;
                writeln!(h, "#include \"Tensile.h\"")
            }
        }
    }

    fn preamble(&self, h: &mut String) -> fmt::Result {
        h.push_str(
            "typedef enum {\n    enum_float,\n    enum_double,\n    enum_TensileComplexFloat,\n    \
             enum_TensileComplexDouble\n#ifdef Tensile_ENABLE_HALF\n    ,enum_TensileHalf\n\
             #endif\n    ,enum_TensileInt8x4\n    ,enum_TensileInt32\n    ,enum_tensile_bfloat16\n\
             } DataTypeEnum;\n\n",
        );

        let validation = &self.settings.validation;
        writeln!(h, "// Debug Params")?;
        for (name, flag) in [
            ("printTensorA", validation.print_tensor_a),
            ("printTensorB", validation.print_tensor_b),
            ("printTensorC", validation.print_tensor_c),
            ("printTensorD", validation.print_tensor_d),
        ] {
            writeln!(h, "const unsigned {name}={:x};", u8::from(flag))?;
        }
        writeln!(
            h,
            "const bool printWinnersOnly={};",
            cpp_bool(validation.print_winners_only)
        )?;
        writeln!(h)?;

        writeln!(
            h,
            "const char indexChars[{}] = \"{}\";",
            self.chars.len() + 1,
            self.settings.benchmark.index_chars
        )?;
        writeln!(h, "unsigned int functionIdx;")?;
        writeln!(h, "unsigned int dataTypeIdx;")?;
        writeln!(h, "unsigned int problemTypeIdx;")?;
        writeln!(h)
    }

    fn data_types(&self, h: &mut String) -> fmt::Result {
        let data_types: Vec<DataType> = self.groups.iter().map(|g| g.data_type).collect();
        writeln!(h, "/* data types */")?;
        writeln!(h, "const unsigned int numDataTypes = {};", data_types.len())?;

        let enums: Vec<String> = data_types
            .iter()
            .map(|dt| format!("enum_{}", dt.to_cpp()))
            .collect();
        writeln!(
            h,
            "const DataTypeEnum dataTypeEnums[numDataTypes] = {{ {} }};",
            enums.join(", ")
        )?;

        let bytes: Vec<usize> = data_types.iter().map(|dt| dt.num_bytes()).collect();
        writeln!(
            h,
            "const unsigned int bytesPerElement[numDataTypes] = {{ {} }};",
            join(&bytes, ", ")
        )?;

        let flops: Vec<usize> = data_types
            .iter()
            .enumerate()
            .map(|(idx, dt)| match idx == 0 && dt.is_int8x4() {
                true => 8,
                false => dt.flops_per_mac(),
            })
            .collect();
        writeln!(
            h,
            "const unsigned int numFlopsPerMac[numDataTypes] = {{ {} }};",
            join(&flops, ", ")
        )?;

        for dt in &data_types {
            writeln!(h, "#define Tensile_DATA_TYPE_{}", dt.to_cpp().to_uppercase())?;
        }
        Ok(())
    }

    fn problem_type_arrays(&self, h: &mut String) -> fmt::Result {
        let pts = &self.problem_types;

        writeln!(h, "/* problem types */")?;
        writeln!(h, "const unsigned int numProblemTypes = {};", pts.len())?;
        writeln!(
            h,
            "const unsigned int numIndicesC[numProblemTypes] = {{ {} }};",
            per_type(pts, |pt| pt.num_indices_c.to_string())
        )?;

        let max_a = pts.iter().map(|pt| pt.num_indices_a()).max().unwrap_or(0);
        let max_b = pts.iter().map(|pt| pt.num_indices_b()).max().unwrap_or(0);
        writeln!(
            h,
            "const unsigned int numIndicesA[numProblemTypes] = {{ {} }};",
            per_type(pts, |pt| pt.num_indices_a().to_string())
        )?;
        writeln!(h, "const unsigned int maxNumIndicesA = {max_a};")?;
        writeln!(
            h,
            "const unsigned int numIndicesB[numProblemTypes] = {{ {} }};",
            per_type(pts, |pt| pt.num_indices_b().to_string())
        )?;
        writeln!(h, "const unsigned int maxNumIndicesB = {max_b};")?;

        for (tensor, max) in [('A', max_a), ('B', max_b)] {
            writeln!(
                h,
                "const unsigned int indexAssignments{tensor}[numProblemTypes][maxNumIndices{tensor}] = {{"
            )?;
            let rows: Vec<String> = pts
                .iter()
                .map(|pt| {
                    let indices = match tensor {
                        'A' => &pt.index_assignments_a,
                        _ => &pt.index_assignments_b,
                    };
                    let cells: Vec<String> = (0..max)
                        .map(|i| match indices.get(i) {
                            Some(idx) => idx.to_string(),
                            None => "static_cast<unsigned int>(-1)".to_string(),
                        })
                        .collect();
                    format!("  {{ {} }}", cells.join(", "))
                })
                .collect();
            writeln!(h, "{}", rows.join(",\n"))?;
            writeln!(h, "}};")?;
        }

        writeln!(
            h,
            "const unsigned int numIndicesLD = {};",
            self.last.num_indices_ld()
        )?;
        let ld = self.last.index_assignments_ld();
        match ld.is_empty() {
            true => writeln!(h, "const unsigned int indexAssignmentsLD[numIndicesLD] = {{}};")?,
            false => writeln!(
                h,
                "const unsigned int indexAssignmentsLD[numIndicesLD] = {{ {}}};",
                join(&ld, ", ")
            )?,
        }

        writeln!(
            h,
            "bool useBeta[numProblemTypes] = {{ {} }};",
            per_type(pts, |pt| cpp_bool(pt.use_beta).to_string())
        )?;
        writeln!(
            h,
            "const bool complexConjugateA[numProblemTypes] = {{ {} }};",
            per_type(pts, |pt| cpp_bool(pt.complex_conjugate_a).to_string())
        )?;
        writeln!(
            h,
            "const bool complexConjugateB[numProblemTypes] = {{ {} }};",
            per_type(pts, |pt| cpp_bool(pt.complex_conjugate_b).to_string())
        )?;
        writeln!(h)
    }

    fn function_info_table(&self, h: &mut String) -> fmt::Result {
        writeln!(h, "// dataTypeIdxSerial, problemTypeIdxForDataType, problemTypeIdxSerial, functionIdxSerial, functionIdxForDataType, functionIdxForProblemType")?;
        writeln!(h, "const unsigned int functionInfo[numFunctions][6] = {{")?;
        let rows: Vec<String> = function_info(&self.groups)
            .iter()
            .map(|row| format!("  {{ {} }}", join(row, ", ")))
            .collect();
        writeln!(h, "{} }};", rows.join(",\n"))
    }

    fn index_totals(&self, h: &mut String, benchmark: bool) -> fmt::Result {
        let totals: Vec<usize> = self
            .problem_types
            .iter()
            .map(|pt| pt.total_indices())
            .collect();
        let max_total = match benchmark {
            true => totals[0],
            false => totals.iter().copied().max().unwrap_or(0),
        };
        writeln!(h, "const unsigned int maxNumIndices = {max_total};")?;
        writeln!(
            h,
            "const unsigned int totalIndices[numProblemTypes] = {{ {} }};",
            join(&totals, ", ")
        )?;
        if !benchmark {
            writeln!(h, "unsigned int userSizes[maxNumIndices];")?;
            writeln!(
                h,
                "unsigned int minStrides[{max_total}] = {{{}}};",
                join(&vec![0; max_total], ", ")
            )?;
        }
        Ok(())
    }

    fn problem_sizes(&self, h: &mut String, bench: &BenchmarkHeader, rows: &[Vec<usize>]) -> fmt::Result {
        let total = bench.problem_type.total_indices();
        writeln!(h, "const unsigned int numProblems = {};", rows.len())?;
        writeln!(
            h,
            "const unsigned int problemSizes[numProblems][{}] = {{",
            total + NUM_INDICES_LD
        )?;
        let lines: Vec<String> = rows
            .iter()
            .map(|row| {
                let cells: Vec<String> = row.iter().map(|v| format!("{v:5}")).collect();
                format!("  {{{} }}", cells.join(","))
            })
            .collect();
        writeln!(h, "{}}};", lines.join(","))?;
        writeln!(
            h,
            "const unsigned int minStrides[{total}] = {{{}}};",
            join(&bench.problem_sizes.min_strides, ", ")
        )?;
        writeln!(h, "/* problem sizes */")
    }

    fn max_sizes(&self, h: &mut String, bench: Option<&BenchmarkHeader>) -> fmt::Result {
        match bench {
            Some(bench) => {
                let sizes = bench.problem_sizes;
                let [mt0, mt1, k] = max_solution_sizes(bench.solutions, bench.summation_sizes);
                let max_mn = MAX_MN_TILES.saturating_mul(mt0).saturating_mul(mt1);
                let max_mk = MAX_K_TILES.saturating_mul(mt0).saturating_mul(k);
                let max_nk = MAX_K_TILES.saturating_mul(mt1).saturating_mul(k);

                writeln!(h, "size_t maxSizeD = {};", sizes.max_d.max(max_mn))?;
                writeln!(h, "size_t maxSizeC = {};", sizes.max_c.max(max_mn))?;
                writeln!(h, "size_t maxSizeA = {};", sizes.max_a.max(max_mk))?;
                writeln!(h, "size_t maxSizeB = {};", sizes.max_b.max(max_nk))?;
                writeln!(
                    h,
                    "size_t maxSizeW = {};",
                    sizes.max_d.saturating_mul(WORKSPACE_FACTOR).max(max_mn)
                )?;
            }
            None => {
                for tensor in ["D", "C", "A", "B", "W"] {
                    writeln!(h, "size_t maxSize{tensor};")?;
                }
            }
        }
        writeln!(h)?;
        writeln!(h, "/* current problem size */")?;
        writeln!(h)
    }

    fn solutions(&self, h: &mut String, bench: &BenchmarkHeader) -> fmt::Result {
        let pt = bench.problem_type;
        writeln!(h, "/* solutions */")?;
        writeln!(
            h,
            "const unsigned int maxNumSolutions = {};",
            bench.solutions.len()
        )?;
        writeln!(
            h,
            "float solutionPerf[numProblems][maxNumSolutions]; // milliseconds"
        )?;
        writeln!(h)?;

        writeln!(h, "static const SolutionInfo solutions[maxNumSolutions] = {{")?;
        let rows: Vec<String> = bench
            .solutions
            .iter()
            .map(|solution| {
                let name = bench.namer.solution_name(pt, solution);
                format!(
                    "  {{(void*){name}, \"{name}\", {{{}, {}, {}, false}} }}",
                    solution.assert_summation_element_multiple,
                    solution.assert_free0_element_multiple,
                    solution.assert_free1_element_multiple,
                )
            })
            .collect();
        writeln!(h, "{}", rows.join(",\n"))?;
        writeln!(h, " }};")?;
        writeln!(h)?;

        writeln!(
            h,
            "const unsigned int numSummations = {};",
            bench.summation_sizes.len()
        )?;
        writeln!(
            h,
            "const unsigned int summations[numSummations] = {{{}}};",
            join(bench.summation_sizes, ", ")
        )?;

        writeln!(h, "const unsigned int solutionMetaData[maxNumSolutions][10] = {{")?;
        let rows: Vec<String> = bench
            .solutions
            .iter()
            .map(|s| {
                let [mt0, mt1] = s.macro_tile();
                let values = [
                    mt0,
                    mt1,
                    s.thread_tile[0],
                    s.thread_tile[1],
                    s.work_group[0],
                    s.work_group[1],
                    usize::from(pt.transpose_a),
                    usize::from(pt.transpose_b),
                    s.global_split_u,
                    s.local_split_u(),
                ];
                format!("  {{{}}}", join(&values, ", "))
            })
            .collect();
        writeln!(h, "{}", rows.join(",\n"))?;
        writeln!(h, " }};")?;
        writeln!(h)
    }

    fn function_names(&self, h: &mut String) -> fmt::Result {
        let names: Vec<String> = self
            .groups
            .iter()
            .flat_map(|g| g.functions())
            .map(|(_, pt)| format!("    \"tensile_{pt}\""))
            .collect();
        writeln!(h, "const char *functionNames[numFunctions] = {{")?;
        writeln!(h, "{}", names.join(",\n"))?;
        writeln!(h, " }};")
    }

    fn runtime(&self, h: &mut String) -> fmt::Result {
        writeln!(h, "/* runtime structures */")?;
        writeln!(h, "TensileStatus status;")?;
        match self.is_ocl() {
            true => h.push_str(
                "cl_platform_id platform;\ncl_device_id device;\ncl_context context;\n\
                 cl_command_queue stream;\n",
            ),
            false => writeln!(h, "hipStream_t stream;")?,
        }
        writeln!(h)?;
        for buffer in ["WS", "D", "C", "A", "B"] {
            writeln!(h, "void *device{buffer};")?;
        }

        writeln!(h, "\n/* benchmarking parameters */")?;
        writeln!(h, "size_t validationStride;")?;
        writeln!(
            h,
            "static bool useHighPrecisionAccumulate = {};",
            cpp_bool(self.last.high_precision_accumulate)
        )?;
        writeln!(h)
    }

    fn reference_call(&self, h: &mut String) -> fmt::Result {
        h.push_str(REFERENCE_CALL);
        Ok(())
    }

    fn c(&self, idx: usize) -> char {
        self.chars[idx]
    }

    /// Packed strides of one tensor for the benchmark entry point, honouring const strides.
    fn benchmark_strides(
        &self,
        h: &mut String,
        tensor: char,
        ld: &str,
        indices: &[usize],
        const_strides: Option<&[(usize, i64)]>,
    ) -> fmt::Result {
        let lower = tensor.to_ascii_lowercase();
        let mut last_const = None;
        for (i, &idx) in indices.iter().enumerate() {
            last_const = const_strides.and_then(|cs| {
                cs.iter()
                    .filter(|(index, _)| *index == idx)
                    .map(|(_, stride)| *stride)
                    .last()
            });
            if let Some(stride) = last_const {
                writeln!(
                    h,
                    "  unsigned int stride{tensor}{i}{} = {stride}; //SetConstStride{tensor}",
                    self.c(idx)
                )?;
                continue;
            }
            write!(h, "  unsigned int stride{tensor}{i}{} = 1", self.c(idx))?;
            if matches!(tensor, 'C') {
                h.push(' ');
            }
            for (j, &prev) in indices[..i].iter().enumerate() {
                h.push_str(" * (");
                if j == 0 {
                    write!(h, "({ld} != std::numeric_limits<unsigned int>::max()) ? {ld} : ")?;
                }
                write!(h, "std::max(minStrides[{prev}], sizes[{prev}]))")?;
            }
            writeln!(h, ";")?;
        }

        let last = indices.len() - 1;
        // A pinned last stride of A is never overridden; B always is.
        if tensor != 'A' || last_const.is_none() {
            writeln!(
                h,
                "  if (stride_{lower} != std::numeric_limits<unsigned int>::max())  stride{tensor}{last}{} = stride_{lower};",
                self.c(indices[last])
            )?;
        }
        Ok(())
    }

    /// Stride and size arguments of a solution call, each followed by `sep`.
    fn stride_args(&self, pt: &ProblemType, prefix: &str, sep: &str) -> Vec<String> {
        let first = usize::from(!pt.use_initial_strides_ab);
        let c_indices: Vec<usize> = (0..pt.num_indices_c).collect();
        let mut args = Vec::new();
        for (tensor, indices) in [
            ('D', &c_indices),
            ('C', &c_indices),
            ('A', &pt.index_assignments_a),
            ('B', &pt.index_assignments_b),
        ] {
            for (i, &idx) in indices.iter().enumerate().skip(first) {
                args.push(format!("{prefix}stride{tensor}{i}{}{sep}", self.c(idx)));
            }
        }
        args
    }

    fn call_to_solution(&self, h: &mut String, bench: &BenchmarkHeader) -> fmt::Result {
        let pt = bench.problem_type;
        let group = &self.groups[0];
        writeln!(h, "/* generated call to solution */")?;
        writeln!(h, "template<typename ComputeDataType, class SolutionInfoType>")?;
        writeln!(h, "TensileStatus generatedCallToSolution(")?;
        h.push_str(
            "    const SolutionInfoType &solution,\n    SolutionLock *solutionLock,\n    \
             const unsigned int *sizes,\n    const unsigned int *minStrides,\n",
        );
        for arg in ["lda", "ldb", "ldc", "ldd", "stride_a", "stride_b", "stride_c", "stride_d"] {
            writeln!(h, "    const unsigned int {arg},")?;
        }
        h.push_str("    ComputeDataType alpha,\n    ComputeDataType beta,\n    unsigned int numEvents = 0,\n");
        match self.is_ocl() {
            true => h.push_str(
                "    cl_event *event_wait_list = NULL,\n    cl_event *outputEvent = NULL ) {\n",
            ),
            false => h.push_str(
                "    hipEvent_t *startEvent = NULL,\n    hipEvent_t *stopEvent = NULL ) {\n",
            ),
        }

        writeln!(h, "  // calculate parameters assuming packed data")?;
        let c_indices: Vec<usize> = (0..pt.num_indices_c).collect();
        self.benchmark_strides(h, 'D', "ldd", &c_indices, None)?;
        self.benchmark_strides(h, 'C', "ldc", &c_indices, None)?;
        self.benchmark_strides(
            h,
            'A',
            "lda",
            &pt.index_assignments_a,
            Some(pt.set_const_stride_a.as_slice()),
        )?;
        self.benchmark_strides(
            h,
            'B',
            "ldb",
            &pt.index_assignments_b,
            Some(pt.set_const_stride_b.as_slice()),
        )?;
        for i in 0..pt.total_indices() {
            writeln!(h, "  unsigned int size{} = sizes[{i}];", self.c(i))?;
        }
        writeln!(h)?;

        writeln!(h, "  // Check assertions,")?;
        let first = usize::from(!pt.use_initial_strides_ab);
        writeln!(
            h,
            "  typedef ProblemDims<{first},{},{},{},{},{}> ProblemDims_{pt};",
            pt.num_indices_c,
            pt.num_indices_c,
            pt.num_indices_a(),
            pt.num_indices_b(),
            pt.total_indices()
        )?;
        writeln!(
            h,
            "  static const ProblemType problemType( {}, {}, {}, {}, {});",
            list_to_initializer(&pt.indices_free()),
            list_to_initializer(&pt.indices_summation()),
            list_to_initializer(&pt.indices_batch()),
            list_to_initializer(&pt.index_assignments_a),
            list_to_initializer(&pt.index_assignments_b),
        )?;
        let mut dims = self.stride_args(pt, "", "");
        dims.extend((0..pt.total_indices()).map(|i| format!("size{}", self.c(i))));
        writeln!(h, "  ProblemDims_{pt} pdims({});", dims.join(", "))?;
        writeln!(h, "  if (!ProblemProperties(pdims,&problemType).validForSolution(solution._assertionRequirements))")?;
        writeln!(h, "    return tensileStatusAssertFailure;  // problem dims did not meet requirements for solution")?;
        writeln!(h)?;

        writeln!(h, "  // call solution function")?;
        writeln!(h, "  TensileSolutionPointer_{pt} f = reinterpret_cast<TensileSolutionPointer_{pt}> (solution._functionPtr);")?;
        match self.is_ocl() {
            true => writeln!(h, "  return f(solutionLock, static_cast<cl_mem>(deviceD), static_cast<cl_mem>(deviceC), static_cast<cl_mem>(deviceA), static_cast<cl_mem>(deviceB),")?,
            false => {
                let (ty, dest) = (group.data_type.to_cpp(), group.dest.to_cpp());
                writeln!(h, "  return f(solutionLock,")?;
                writeln!(h, "      static_cast<{dest} *>(deviceD),")?;
                writeln!(h, "      static_cast<{dest} *>(deviceC),")?;
                writeln!(h, "      static_cast<{ty} *>(deviceA),")?;
                writeln!(h, "      static_cast<{ty} *>(deviceB),")?;
            }
        }
        writeln!(h, "      alpha,")?;
        if pt.use_beta {
            writeln!(h, "      beta,")?;
        }
        for arg in self.stride_args(pt, "      ", ",\n") {
            h.push_str(&arg);
        }
        for i in 0..pt.total_indices() {
            writeln!(h, "      size{},", self.c(i))?;
        }
        writeln!(h, "      stream,")?;
        match self.is_ocl() {
            true => writeln!(h, "      numEvents, event_wait_list, outputEvent ); // events")?,
            false => h.push_str(
                "      numEvents,\n      startEvent,\n      stopEvent,\n      \
                 static_cast<float *>(deviceWS)); // events\n",
            ),
        }
        writeln!(h, "}};")?;
        writeln!(h)
    }

    /// Dispatch trampolines of a library: `generatedCallTo_tensile` and
    /// `generatedCallTo_tensileGetSolutionName`, specialised per data type.
    fn calls_to_functions(&self, h: &mut String) -> fmt::Result {
        for enqueue in [true, false] {
            let (function, ret) = match enqueue {
                true => ("tensile", "TensileStatus"),
                false => ("tensileGetSolutionName", "const char *"),
            };
            writeln!(h, "/* generated call to function */")?;
            writeln!(
                h,
                "template<typename DataType, typename DestDataType, typename ComputeDataType>"
            )?;
            writeln!(h, "{ret} generatedCallTo_{function}(")?;
            h.push_str(TRAMPOLINE_ARGS);
            writeln!(h, "    unsigned int numEvents = 0,")?;
            match self.is_ocl() {
                true => h.push_str(
                    "    cl_event *event_wait_list = NULL,\n    cl_event *outputEvent = NULL );\n\n",
                ),
                false => h.push_str(
                    "    hipEvent_t *startEvent = NULL,\n    hipEvent_t *stopEvent = NULL );\n\n",
                ),
            }

            for group in &self.groups {
                self.trampoline(h, group, function, ret, enqueue)?;
            }
        }
        Ok(())
    }

    fn trampoline(
        &self,
        h: &mut String,
        group: &DataTypeGroup,
        function: &str,
        ret: &str,
        enqueue: bool,
    ) -> fmt::Result {
        let (ty, dest, compute) = (
            group.data_type.to_cpp(),
            group.dest.to_cpp(),
            group.compute.to_cpp(),
        );
        writeln!(h, "template<>")?;
        writeln!(
            h,
            "inline {ret} generatedCallTo_{function}<{ty}, {dest}, {compute}>("
        )?;
        writeln!(h, "    unsigned int *sizes,")?;
        writeln!(h, "    unsigned int *minStrides,")?;
        writeln!(h, "    {compute} alpha,")?;
        writeln!(h, "    {compute} beta,")?;
        for arg in [
            "lda", "ldb", "ldc", "ldd", "strideA", "strideB", "strideC", "strideD",
        ] {
            writeln!(h, "    unsigned int {arg},")?;
        }
        writeln!(h, "    unsigned int numEvents, ")?;
        match self.is_ocl() {
            true => h.push_str("    cl_event *event_wait_list,\n    cl_event *outputEvent ) {\n\n"),
            false => h.push_str("    hipEvent_t *startEvent,\n    hipEvent_t *stopEvent ) {\n\n"),
        }
        writeln!(
            h,
            "    unsigned int functionIdxForDataType = functionInfo[functionIdx][4];"
        )?;

        let functions: Vec<(&str, &ProblemType)> = group.functions().collect();
        let branching = functions.len() > 1;
        for (idx, (_, pt)) in functions.iter().enumerate() {
            if branching {
                match idx {
                    0 => writeln!(h, "  if (functionIdxForDataType == {idx}) {{")?,
                    _ if idx == functions.len() - 1 => writeln!(h, "  }} else {{")?,
                    _ => writeln!(h, "  }} else if (functionIdxForDataType == {idx}) {{")?,
                }
            }
            self.function_body(h, pt, function, enqueue, ty, dest)?;
        }
        if branching {
            writeln!(h, "  }}")?;
        }
        writeln!(h, "}};")
    }

    fn function_body(
        &self,
        h: &mut String,
        pt: &ProblemType,
        function: &str,
        enqueue: bool,
        ty: &str,
        dest: &str,
    ) -> fmt::Result {
        let c_indices: Vec<usize> = (0..pt.num_indices_c).collect();
        for (tensor, indices) in [
            ('D', &c_indices),
            ('C', &c_indices),
            ('A', &pt.index_assignments_a),
            ('B', &pt.index_assignments_b),
        ] {
            for (i, &idx) in indices.iter().enumerate() {
                write!(h, "    unsigned int stride{tensor}{i}{} = 1", self.c(idx))?;
                for prev in &indices[..i] {
                    write!(h, "*sizes[{prev}]")?;
                }
                writeln!(h, ";")?;
            }
            let last = indices.len() - 1;
            writeln!(
                h,
                "    if (stride{tensor} != std::numeric_limits<unsigned int>::max())  stride{tensor}{last}{} = stride{tensor};",
                self.c(indices[last])
            )?;
        }
        let total = pt.total_indices();
        for i in 0..total {
            writeln!(h, "    unsigned int size{} = sizes[{i}];", self.c(i))?;
        }

        writeln!(h, "    // call solution function")?;
        writeln!(h, "    return {function}_{pt}(")?;
        if enqueue {
            match self.is_ocl() {
                true => {
                    for buffer in ["D", "C", "A", "B"] {
                        writeln!(h, "        static_cast<cl_mem>(device{buffer}),")?;
                    }
                }
                false => {
                    writeln!(h, "        static_cast<{dest} *>(deviceD),")?;
                    writeln!(h, "        static_cast<{dest} *>(deviceC),")?;
                    writeln!(h, "        static_cast<{ty} *>(deviceA),")?;
                    writeln!(h, "        static_cast<{ty} *>(deviceB),")?;
                }
            }
            writeln!(h, "        alpha,")?;
            if pt.use_beta {
                writeln!(h, "        beta,")?;
            }
        }
        for arg in self.stride_args(pt, "        ", ",\n") {
            h.push_str(&arg);
        }
        for i in 0..total {
            let sep = if i + 1 == total { "" } else { "," };
            writeln!(h, "        size{}{sep}", self.c(i))?;
        }
        if enqueue {
            match self.is_ocl() {
                true => h.push_str(", stream, numEvents, event_wait_list, outputEvent"),
                false => h.push_str(
                    ", stream, numEvents, startEvent, stopEvent, static_cast<float *>(deviceWS)",
                ),
            }
        }
        writeln!(h, ");")
    }

    fn results_files(&self, h: &mut String, bench: &BenchmarkHeader) -> fmt::Result {
        let data_dir = bench.step_base_dir.join("..").join("Data");
        let escape = |p: PathBuf| p.display().to_string().replace('\\', "\\\\");
        writeln!(h, "/* results file name */")?;
        writeln!(
            h,
            "const char *resultsFileName = \"{}\";",
            escape(data_dir.join(format!("{}.csv", bench.step_name)))
        )?;
        writeln!(
            h,
            "const char *granularityFileName = \"{}\";",
            escape(data_dir.join(format!("{}_Granularity.csv", bench.step_name)))
        )
    }
}

const TRAMPOLINE_ARGS: &str = "    unsigned int *sizes,
    unsigned int *minStrides,
    ComputeDataType alpha,
    ComputeDataType beta,
    unsigned int lda,
    unsigned int ldb,
    unsigned int ldc,
    unsigned int ldd,
    unsigned int strideA,
    unsigned int strideB,
    unsigned int strideC,
    unsigned int strideD,
";

const REFERENCE_CALL: &str = "/* generated call to reference */
template<typename DataType, typename DestDataType, typename ComputeDataType>
TensileStatus generatedCallToReferenceCPU(
    const unsigned int *sizes,
    const unsigned int *minStrides,
    DestDataType *referenceD,
    DestDataType *referenceC,
    DataType *initialA,
    DataType *initialB,
    const unsigned int lda,
    const unsigned int ldb,
    const unsigned int ldc,
    const unsigned int ldd,
    const unsigned int stride_a,
    const unsigned int stride_b,
    const unsigned int stride_c,
    const unsigned int stride_d,
    ComputeDataType alpha,
    ComputeDataType beta,
    bool useHighPrecisionAccumulate) {
  return tensileReferenceCPU(
      referenceD,
      referenceC,
      initialA,
      initialB,
      lda,
      ldb,
      ldc,
      ldd,
      stride_a,
      stride_b,
      stride_c,
      stride_d,
      alpha,
      beta,
      totalIndices[problemTypeIdx],
      sizes,
      minStrides,
      numIndicesC[problemTypeIdx],
      numIndicesA[problemTypeIdx],
      numIndicesB[problemTypeIdx],
      indexAssignmentsA[problemTypeIdx],
      indexAssignmentsB[problemTypeIdx],
      complexConjugateA[problemTypeIdx],
      complexConjugateB[problemTypeIdx],
      validationStride,
      useHighPrecisionAccumulate);
};

";

/// Renders `ClientParameters.h`.
pub fn client_parameters_header(settings: &ClientSettings, mode: &HeaderMode) -> Result<String> {
    let (groups, bench) = match mode {
        HeaderMode::Library { functions } => (group_functions(functions), None),
        HeaderMode::Benchmark(bench) => {
            if bench.solutions.is_empty() {
                return Err(ClientError::NoSolutions(bench.step_name.to_string()));
            }
            let mut group = DataTypeGroup::new(bench.problem_type);
            group.problem_types.push((bench.problem_type, Vec::new()));
            (vec![group], Some(bench))
        }
    };
    let writer = HeaderWriter::new(settings, groups)?;

    // Problem sizes are checked before anything is rendered.
    let size_rows = match bench {
        Some(bench) => bench
            .problem_sizes
            .problems
            .iter()
            .map(|p| sizes_with_leading_dims(bench.problem_type, &p.sizes))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let mut h = String::from(C_HEADER);
    writer.includes(&mut h, mode)?;
    writer.preamble(&mut h)?;
    if bench.is_none() {
        writeln!(h, "const unsigned int numFunctions = {};", function_info(&writer.groups).len())?;
    }
    writer.data_types(&mut h)?;
    writer.problem_type_arrays(&mut h)?;
    if bench.is_none() {
        writer.function_info_table(&mut h)?;
    }
    writer.index_totals(&mut h, bench.is_some())?;
    if let Some(bench) = bench {
        writer.problem_sizes(&mut h, bench, &size_rows)?;
    }
    writer.max_sizes(&mut h, bench)?;
    match bench {
        Some(bench) => writer.solutions(&mut h, bench)?,
        None => writer.function_names(&mut h)?,
    }
    writer.runtime(&mut h)?;
    writer.reference_call(&mut h)?;
    match bench {
        Some(bench) => {
            writer.call_to_solution(&mut h, bench)?;
            writer.results_files(&mut h, bench)?;
        }
        None => writer.calls_to_functions(&mut h)?,
    }
    Ok(h)
}

/// Writes `ClientParameters.h` to `output_dir` and returns its path.
pub fn write_client_parameters(
    settings: &ClientSettings,
    mode: &HeaderMode,
    output_dir: &Path,
) -> Result<PathBuf> {
    let path = output_dir.join(CLIENT_PARAMETERS_HEADER);
    write_file(&path, &client_parameters_header(settings, mode)?)?;
    info!("Wrote client header {}", path.display());
    Ok(path)
}
