//! Problem sizes to benchmark.

use super::{IndexRole, ProblemType};
use crate::consts::{DUMMY_FREE_SIZE, DUMMY_SUMMATION_SIZE, NUM_INDICES_LD};

use serde::{Deserialize, Serialize};

use std::{num::ParseIntError, str::FromStr};

/// One problem instance: the extent of every problem index, optionally followed by the four
/// leading dimensions `ldd, ldc, lda, ldb`, and optional explicit strides per tensor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub sizes: Vec<usize>,
    #[serde(default)]
    pub strides_a: Option<Vec<i64>>,
    #[serde(default)]
    pub strides_b: Option<Vec<i64>>,
    #[serde(default)]
    pub strides_c: Option<Vec<i64>>,
    #[serde(default)]
    pub strides_d: Option<Vec<i64>>,
}

impl Problem {
    pub fn new(sizes: Vec<usize>) -> Self {
        Self {
            sizes,
            ..Self::default()
        }
    }

    /// Leading dimensions `[ldd, ldc, lda, ldb]` when the size list carries them.
    pub fn leading_dims(&self, total_indices: usize) -> Option<[usize; NUM_INDICES_LD]> {
        match self.sizes.get(total_indices..) {
            Some(&[ldd, ldc, lda, ldb]) => Some([ldd, ldc, lda, ldb]),
            _ => None,
        }
    }
}

/// Parses a comma-separated size list, e.g. `1024,1024,1,512`.
impl FromStr for Problem {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sizes = s
            .split(',')
            .map(|v| v.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(sizes))
    }
}

/// Parses several size lists separated by `;`, e.g. `64,64,1,256;128,128,1,512`.
pub fn parse_size_list(s: &str) -> Result<Vec<Problem>, ParseIntError> {
    s.split(';')
        .filter(|p| !p.trim().is_empty())
        .map(str::parse)
        .collect()
}

/// Entry of a logic file's exact-size table: the size list and the `[solution index, performance]`
/// pair selected for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExactLogicEntry(pub Vec<usize>, pub (usize, f64));

/// Set of problems to run, with the largest tensor footprint over all of them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProblemSizes {
    pub problems: Vec<Problem>,
    pub min_strides: Vec<usize>,
    /// Largest element count of A.
    pub max_a: usize,
    /// Largest element count of B.
    pub max_b: usize,
    /// Largest element count of C.
    pub max_c: usize,
    /// Largest element count of D.
    pub max_d: usize,
}

impl ProblemSizes {
    pub fn new(problem_type: &ProblemType, problems: Vec<Problem>) -> Self {
        let total = problem_type.total_indices();
        let c_indices: Vec<usize> = (0..problem_type.num_indices_c).collect();

        let (mut max_a, mut max_b, mut max_c, mut max_d) = (0, 0, 0, 0);
        for problem in &problems {
            let ld = problem.leading_dims(total);
            let lds = |i: usize| ld.map(|l| l[i]);
            max_d = max_d.max(elements(&c_indices, &problem.sizes, lds(0)));
            max_c = max_c.max(elements(&c_indices, &problem.sizes, lds(1)));
            max_a = max_a.max(elements(
                &problem_type.index_assignments_a,
                &problem.sizes,
                lds(2),
            ));
            max_b = max_b.max(elements(
                &problem_type.index_assignments_b,
                &problem.sizes,
                lds(3),
            ));
        }

        Self {
            problems,
            min_strides: vec![0; total],
            max_a,
            max_b,
            max_c,
            max_d,
        }
    }

    /// Problems of a logic file's exact-size table.
    pub fn from_exact_logic(problem_type: &ProblemType, entries: &[ExactLogicEntry]) -> Self {
        let problems = entries
            .iter()
            .map(|ExactLogicEntry(sizes, _)| Problem::new(sizes.clone()))
            .collect();
        Self::new(problem_type, problems)
    }

    /// A single placeholder problem, used when a logic file has no exact sizes.
    pub fn dummy(problem_type: &ProblemType) -> Self {
        let sizes = (0..problem_type.total_indices())
            .map(|idx| match problem_type.index_role(idx) {
                Some(IndexRole::Batch { .. }) => 1,
                Some(IndexRole::Bound { .. }) => DUMMY_SUMMATION_SIZE,
                _ => DUMMY_FREE_SIZE,
            })
            .collect();
        Self::new(problem_type, vec![Problem::new(sizes)])
    }

    pub fn total_problem_sizes(&self) -> usize {
        self.problems.len()
    }
}

/// Element count of a packed tensor whose dimensions follow `indices`, the first one optionally
/// padded to a leading dimension.
fn elements(indices: &[usize], sizes: &[usize], ld: Option<usize>) -> usize {
    let extent = |idx: usize| sizes.get(idx).copied().unwrap_or(0);
    indices
        .iter()
        .enumerate()
        .map(|(pos, &idx)| match (pos, ld) {
            (0, Some(ld)) => ld.max(extent(idx)),
            _ => extent(idx),
        })
        .fold(1, usize::saturating_mul)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::DataType;

    #[test]
    fn parses_size_lists() {
        let p: Problem = "128, 64,1,32".parse().unwrap();
        assert_eq!(p.sizes, [128, 64, 1, 32]);
        assert!("128,x".parse::<Problem>().is_err());
    }

    #[test]
    fn parses_several_size_lists() {
        let problems = parse_size_list("64,64,1,256; 128,128,1,512;").unwrap();
        assert_eq!(problems.len(), 2);
        assert_eq!(problems[1].sizes, [128, 128, 1, 512]);
    }

    #[test]
    fn leading_dims_only_with_four_extra_entries() {
        let p = Problem::new(vec![4, 5, 1, 6, 10, 11, 12, 13]);
        assert_eq!(p.leading_dims(4), Some([10, 11, 12, 13]));
        assert_eq!(Problem::new(vec![4, 5, 1, 6]).leading_dims(4), None);
        assert_eq!(Problem::new(vec![4, 5, 1, 6, 7]).leading_dims(4), None);
    }

    #[test]
    fn maxima_cover_every_problem() {
        let pt = ProblemType::gemm(DataType::Single, false, false);
        let sizes = ProblemSizes::new(
            &pt,
            vec![
                Problem::new(vec![4, 8, 2, 16]),
                Problem::new(vec![32, 2, 1, 4, 32, 40, 64, 8]),
            ],
        );
        // A is i,l,k ; B is l,j,k ; C/D are i,j,k.
        assert_eq!(sizes.max_a, (4 * 16 * 2).max(64 * 4));
        assert_eq!(sizes.max_b, (16 * 8 * 2).max(8 * 2));
        assert_eq!(sizes.max_c, (4 * 8 * 2).max(40 * 2));
        assert_eq!(sizes.max_d, 64);
        assert_eq!(sizes.min_strides, [0, 0, 0, 0]);
        assert_eq!(sizes.total_problem_sizes(), 2);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn maxima_saturate_on_huge_problems() {
        let pt = ProblemType::gemm(DataType::Single, false, false);
        let sizes = ProblemSizes::new(&pt, vec![Problem::new(vec![1 << 32, 1 << 32, 1, 1 << 32])]);
        assert_eq!(sizes.max_a, usize::MAX);
        assert_eq!(sizes.max_d, usize::MAX);
    }

    #[test]
    fn dummy_problem_uses_role_extents() {
        let pt = ProblemType::gemm(DataType::Half, true, false);
        let sizes = ProblemSizes::dummy(&pt);
        assert_eq!(sizes.problems[0].sizes, [128, 128, 1, 512]);
    }

    #[test]
    fn exact_logic_entries_deserialize() {
        let pt = ProblemType::gemm(DataType::Single, false, false);
        let entries: Vec<ExactLogicEntry> =
            serde_json::from_str("[[[64, 64, 1, 256], [0, 1234.5]]]").unwrap();
        let sizes = ProblemSizes::from_exact_logic(&pt, &entries);
        assert_eq!(sizes.problems[0].sizes, [64, 64, 1, 256]);
    }
}
