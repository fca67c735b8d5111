//! Solutions and logic files.
//!
//! A logic file maps one problem type to its candidate solutions and, optionally, to the exact
//! problem sizes each solution was selected for. Reading logic files and naming solutions belong
//! to other components; they are reached through the [`LogicReader`] and [`SolutionNamer`]
//! traits so that the writers can be driven by any implementation.

use crate::{
    error::{ClientError, Result},
    problem::{ExactLogicEntry, ProblemType},
    utils::{has_extension, list_files},
};

use serde::{Deserialize, Serialize};

use std::{
    fs,
    path::{Path, PathBuf},
};

/// A kernel configuration solving a problem type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Solution {
    /// Work-group shape; the third dimension is the local split-U.
    pub work_group: [usize; 3],
    pub thread_tile: [usize; 2],
    #[serde(default = "one")]
    pub global_split_u: usize,
    #[serde(default = "one")]
    pub assert_summation_element_multiple: usize,
    #[serde(default = "one")]
    pub assert_free0_element_multiple: usize,
    #[serde(default = "one")]
    pub assert_free1_element_multiple: usize,
    /// Name given by the logic file, if any.
    #[serde(default, alias = "SolutionNameMin")]
    pub name: Option<String>,
}

fn one() -> usize {
    1
}

impl Solution {
    pub fn new(work_group: [usize; 3], thread_tile: [usize; 2]) -> Self {
        Self {
            work_group,
            thread_tile,
            global_split_u: 1,
            assert_summation_element_multiple: 1,
            assert_free0_element_multiple: 1,
            assert_free1_element_multiple: 1,
            name: None,
        }
    }

    /// Macro tile `[MT0, MT1]`: the work-group extent times the thread tile in each free
    /// dimension.
    pub fn macro_tile(&self) -> [usize; 2] {
        [
            self.work_group[0] * self.thread_tile[0],
            self.work_group[1] * self.thread_tile[1],
        ]
    }

    pub fn local_split_u(&self) -> usize {
        self.work_group[2]
    }
}

/// Largest macro tile over `solutions` and largest summation size: `[maxMT0, maxMT1, maxK]`.
pub fn max_solution_sizes(solutions: &[Solution], summation_sizes: &[usize]) -> [usize; 3] {
    let max_k = summation_sizes.iter().copied().max().unwrap_or(0);
    let (max_mt0, max_mt1) = solutions
        .iter()
        .map(Solution::macro_tile)
        .fold((0, 0), |(m0, m1), [mt0, mt1]| (m0.max(mt0), m1.max(mt1)));
    [max_mt0, max_mt1, max_k]
}

/// Contents of a logic file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogicFile {
    /// Device family the logic was tuned on, e.g. `vega20`.
    pub schedule_name: String,
    #[serde(default)]
    pub architecture: String,
    pub problem_type: ProblemType,
    #[serde(default)]
    pub solutions: Vec<Solution>,
    #[serde(default)]
    pub exact_logic: Vec<ExactLogicEntry>,
}

/// Reader of logic files.
pub trait LogicReader {
    fn read(&self, path: &Path) -> Result<LogicFile>;

    /// File extensions of the logic files this reader understands, without the dot.
    fn extensions(&self) -> &[&str];
}

/// Reads logic files stored as JSON documents.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonLogicReader;

impl LogicReader for JsonLogicReader {
    fn read(&self, path: &Path) -> Result<LogicFile> {
        let content = fs::read_to_string(path).map_err(|e| ClientError::file(path, e))?;
        serde_json::from_str(&content).map_err(|source| ClientError::Logic {
            path: path.to_path_buf(),
            source,
        })
    }

    fn extensions(&self) -> &[&str] {
        &["json"]
    }
}

/// Lists the logic files of `dir` that `reader` understands, sorted by path.
pub fn find_logic_files(dir: &Path, reader: &dyn LogicReader) -> Result<Vec<PathBuf>> {
    let extensions = reader.extensions();
    list_files(dir, |p| extensions.iter().any(|ext| has_extension(p, ext)))
}

/// Gives solutions the name of the kernel entry point compiled for them.
pub trait SolutionNamer {
    fn solution_name(&self, problem_type: &ProblemType, solution: &Solution) -> String;
}

/// Uses the name carried by the logic file, or derives a short one from the tiling parameters.
#[derive(Clone, Copy, Debug, Default)]
pub struct MinimalSolutionNamer;

impl SolutionNamer for MinimalSolutionNamer {
    fn solution_name(&self, problem_type: &ProblemType, solution: &Solution) -> String {
        if let Some(name) = &solution.name {
            return name.clone();
        }
        let [mt0, mt1] = solution.macro_tile();
        let [wg0, wg1, wg2] = solution.work_group;
        format!(
            "{problem_type}_MT{mt0}x{mt1}_WG{wg0}_{wg1}_{wg2}_GSU{}",
            solution.global_split_u
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::DataType;

    const LOGIC: &str = r#"{
        "ScheduleName": "aldebaran",
        "Architecture": "gfx90a",
        "ProblemType": {
            "DataType": "s",
            "IndexAssignmentsA": [0, 3, 2],
            "IndexAssignmentsB": [3, 1, 2],
            "NumIndicesC": 3
        },
        "Solutions": [
            { "WorkGroup": [16, 16, 1], "ThreadTile": [4, 4], "SolutionNameMin": "Cijk_MT64x64" },
            { "WorkGroup": [8, 32, 2], "ThreadTile": [8, 2], "GlobalSplitU": 4 }
        ],
        "ExactLogic": [[[1024, 1024, 1, 512], [1, 9000.0]]]
    }"#;

    #[test]
    fn reads_json_logic_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aldebaran_Cijk_Ailk_Bljk_SB.json");
        fs::write(&path, LOGIC).unwrap();

        let logic = JsonLogicReader.read(&path).unwrap();
        assert_eq!(logic.schedule_name, "aldebaran");
        assert_eq!(logic.problem_type.to_string(), "Cijk_Ailk_Bljk_SB");
        assert_eq!(logic.solutions.len(), 2);
        assert_eq!(logic.solutions[1].global_split_u, 4);
        assert_eq!(logic.solutions[1].assert_free0_element_multiple, 1);
        assert_eq!(logic.exact_logic[0].1, (1, 9000.0));
    }

    #[test]
    fn malformed_logic_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ \"ScheduleName\": 3 }").unwrap();

        let err = JsonLogicReader.read(&path).unwrap_err();
        assert!(matches!(err, ClientError::Logic { .. }));
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn finds_only_json_logic_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["vega20_b.json", "vega20_a.json", "vega20_c.yaml", "notes.md"] {
            fs::write(dir.path().join(name), LOGIC).unwrap();
        }
        let files = find_logic_files(dir.path(), &JsonLogicReader).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("vega20_a.json"));
    }

    /// Stands in for a reader of the YAML logic files written by the tuning run.
    struct YamlLogicReader;

    impl LogicReader for YamlLogicReader {
        fn read(&self, path: &Path) -> Result<LogicFile> {
            JsonLogicReader.read(path)
        }

        fn extensions(&self) -> &[&str] {
            &["yaml", "yml"]
        }
    }

    #[test]
    fn discovery_follows_the_reader() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["aldebaran_Cijk_Ailk_Bljk_SB.yaml", "aldebaran_Cijk_Alik_Bljk_SB.yml"] {
            fs::write(dir.path().join(name), LOGIC).unwrap();
        }
        let files = find_logic_files(dir.path(), &YamlLogicReader).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("aldebaran_Cijk_Ailk_Bljk_SB.yaml"));
        assert!(find_logic_files(dir.path(), &JsonLogicReader).unwrap().is_empty());
    }

    #[test]
    fn max_sizes_take_the_largest_tiles() {
        let solutions = [
            Solution::new([16, 16, 1], [4, 4]),
            Solution::new([8, 32, 2], [8, 2]),
        ];
        assert_eq!(solutions[1].macro_tile(), [64, 64]);
        assert_eq!(max_solution_sizes(&solutions, &[256, 1024, 512]), [64, 64, 1024]);
        assert_eq!(max_solution_sizes(&[], &[]), [0, 0, 0]);
    }

    #[test]
    fn minimal_names() {
        let pt = ProblemType::gemm(DataType::Single, false, false);
        let mut solution = Solution::new([8, 32, 2], [8, 2]);
        assert_eq!(
            MinimalSolutionNamer.solution_name(&pt, &solution),
            "Cijk_Ailk_Bljk_SB_MT64x64_WG8_32_2_GSU1"
        );
        solution.name = Some("Custom".to_string());
        assert_eq!(MinimalSolutionNamer.solution_name(&pt, &solution), "Custom");
    }
}
