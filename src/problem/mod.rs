//! Problem descriptions.
//!
//! A [`ProblemType`] describes a tensor contraction `D = alpha * A * B + beta * C` by assigning
//! problem indices to the dimensions of each tensor. Indices `0..NumIndicesC` are the dimensions
//! of C and D; an index below `NumIndicesC` present in only one of A and B is a *free* index, one
//! present in both is a *batch* index, and every index from `NumIndicesC` upwards is a
//! *summation* (bound) index shared by A and B.
//!
//! The problem type is a pass-through record: it is read from a logic file and only rendered
//! into the client's textual formats, never mutated.

pub mod data_type;
pub mod sizes;
pub mod strides;

pub use data_type::{ActivationType, DataType};
pub use sizes::{parse_size_list, ExactLogicEntry, Problem, ProblemSizes};

use crate::{
    consts::{INDEX_CHARS, NUM_INDICES_LD},
    error::{ClientError, Result},
};

use serde::{Deserialize, Serialize};

use std::fmt;

/// Role of a problem index in the contraction, with its position in the tensors holding it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexRole {
    /// Index of C/D present in exactly one of A (`in_a`) or B, at position `pos`.
    Free { in_a: bool, pos: usize },
    /// Index of C/D present in both A and B.
    Batch { a: usize, b: usize },
    /// Summation index, present in both A and B.
    Bound { a: usize, b: usize },
}

/// Pinned stride of a problem index: `[index, stride]`.
pub type ConstStride = (usize, i64);

/// Description of a contraction problem type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProblemType {
    pub data_type: DataType,
    #[serde(default)]
    pub dest_data_type: Option<DataType>,
    #[serde(default)]
    pub compute_data_type: Option<DataType>,
    #[serde(default)]
    pub data_type_a: Option<DataType>,
    #[serde(default)]
    pub data_type_b: Option<DataType>,
    #[serde(default)]
    pub data_type_e: Option<DataType>,
    #[serde(default)]
    pub data_type_amax_d: Option<DataType>,
    #[serde(default)]
    pub f32_xdl_math_op: Option<DataType>,
    #[serde(default)]
    pub activation_compute_data_type: Option<DataType>,

    pub index_assignments_a: Vec<usize>,
    pub index_assignments_b: Vec<usize>,
    pub num_indices_c: usize,

    #[serde(default = "default_true")]
    pub use_beta: bool,
    #[serde(default)]
    pub use_bias: bool,
    #[serde(default)]
    pub use_e: bool,
    #[serde(default)]
    pub use_gradient: bool,
    #[serde(default)]
    pub output_amax_d: bool,
    #[serde(default, rename = "UseScaleAB")]
    pub use_scale_ab: String,
    #[serde(default, rename = "UseScaleCD")]
    pub use_scale_cd: bool,
    #[serde(default)]
    pub use_scale_alpha_vec: u32,
    #[serde(default)]
    pub swizzle_tensor_a: bool,
    #[serde(default)]
    pub swizzle_tensor_b: bool,
    #[serde(default)]
    pub sparse: u32,
    #[serde(default)]
    pub high_precision_accumulate: bool,
    #[serde(default = "default_true")]
    pub strided_batched: bool,
    #[serde(default)]
    pub grouped_gemm: bool,
    #[serde(default)]
    pub complex_conjugate_a: bool,
    #[serde(default)]
    pub complex_conjugate_b: bool,
    #[serde(default, rename = "UseInitialStridesAB")]
    pub use_initial_strides_ab: bool,
    #[serde(default, rename = "UseInitialStridesCD")]
    pub use_initial_strides_cd: bool,
    #[serde(default)]
    pub transpose_a: bool,
    #[serde(default)]
    pub transpose_b: bool,

    #[serde(default)]
    pub set_const_stride_a: Vec<ConstStride>,
    #[serde(default)]
    pub set_const_stride_b: Vec<ConstStride>,
    #[serde(default)]
    pub set_const_stride_bias: Vec<ConstStride>,

    #[serde(default)]
    pub bias_src_white_list: Vec<String>,
    #[serde(default)]
    pub bias_data_type_list: Vec<DataType>,
    #[serde(default)]
    pub activation_type: ActivationType,
    #[serde(default)]
    pub activation_no_guard: bool,
}

fn default_true() -> bool {
    true
}

impl ProblemType {
    /// Creates a problem type from its index assignments, every flag at its default.
    pub fn new(
        data_type: DataType,
        index_assignments_a: Vec<usize>,
        index_assignments_b: Vec<usize>,
        num_indices_c: usize,
    ) -> Self {
        Self {
            data_type,
            dest_data_type: None,
            compute_data_type: None,
            data_type_a: None,
            data_type_b: None,
            data_type_e: None,
            data_type_amax_d: None,
            f32_xdl_math_op: None,
            activation_compute_data_type: None,
            index_assignments_a,
            index_assignments_b,
            num_indices_c,
            use_beta: true,
            use_bias: false,
            use_e: false,
            use_gradient: false,
            output_amax_d: false,
            use_scale_ab: String::new(),
            use_scale_cd: false,
            use_scale_alpha_vec: 0,
            swizzle_tensor_a: false,
            swizzle_tensor_b: false,
            sparse: 0,
            high_precision_accumulate: false,
            strided_batched: true,
            grouped_gemm: false,
            complex_conjugate_a: false,
            complex_conjugate_b: false,
            use_initial_strides_ab: false,
            use_initial_strides_cd: false,
            transpose_a: false,
            transpose_b: false,
            set_const_stride_a: Vec::new(),
            set_const_stride_b: Vec::new(),
            set_const_stride_bias: Vec::new(),
            bias_src_white_list: Vec::new(),
            bias_data_type_list: Vec::new(),
            activation_type: ActivationType::None,
            activation_no_guard: false,
        }
    }

    /// Batched GEMM problem type (`Cijk`), with the usual index assignments for the given
    /// transposes.
    pub fn gemm(data_type: DataType, transpose_a: bool, transpose_b: bool) -> Self {
        let a = match transpose_a {
            false => vec![0, 3, 2],
            true => vec![3, 0, 2],
        };
        let b = match transpose_b {
            false => vec![3, 1, 2],
            true => vec![1, 3, 2],
        };
        Self {
            transpose_a,
            transpose_b,
            ..Self::new(data_type, a, b, 3)
        }
    }

    pub fn dest_type(&self) -> DataType {
        self.dest_data_type.unwrap_or(self.data_type)
    }

    pub fn compute_type(&self) -> DataType {
        self.compute_data_type.unwrap_or_else(|| self.dest_type())
    }

    pub fn a_type(&self) -> DataType {
        self.data_type_a.unwrap_or(self.data_type)
    }

    pub fn b_type(&self) -> DataType {
        self.data_type_b.unwrap_or(self.data_type)
    }

    /// Type the inputs are converted to before the multiply.
    pub fn compute_input_type(&self) -> DataType {
        self.data_type
    }

    pub fn c_type(&self) -> DataType {
        self.dest_type()
    }

    pub fn d_type(&self) -> DataType {
        self.dest_type()
    }

    pub fn e_type(&self) -> DataType {
        self.data_type_e.unwrap_or_else(|| self.compute_type())
    }

    pub fn amax_d_type(&self) -> DataType {
        self.data_type_amax_d.unwrap_or_else(|| self.compute_type())
    }

    pub fn alpha_type(&self) -> DataType {
        self.compute_type()
    }

    pub fn beta_type(&self) -> DataType {
        self.compute_type()
    }

    pub fn f32_xdl_math_op(&self) -> DataType {
        self.f32_xdl_math_op.unwrap_or(DataType::Single)
    }

    pub fn activation_compute_type(&self) -> DataType {
        self.activation_compute_data_type
            .unwrap_or_else(|| self.compute_type())
    }

    /// First allowed source of the bias vector.
    pub fn bias_source(&self) -> &str {
        self.bias_src_white_list
            .first()
            .map(String::as_str)
            .unwrap_or("D")
    }

    /// Number of problem indices.
    pub fn total_indices(&self) -> usize {
        self.index_assignments_a
            .iter()
            .chain(&self.index_assignments_b)
            .map(|&i| i + 1)
            .max()
            .unwrap_or(0)
            .max(self.num_indices_c)
    }

    pub fn num_indices_a(&self) -> usize {
        self.index_assignments_a.len()
    }

    pub fn num_indices_b(&self) -> usize {
        self.index_assignments_b.len()
    }

    pub fn num_indices_ld(&self) -> usize {
        NUM_INDICES_LD
    }

    /// Positions of `ldd`, `ldc`, `lda` and `ldb` in an exact size list.
    pub fn index_assignments_ld(&self) -> Vec<usize> {
        let total = self.total_indices();
        (total..total + NUM_INDICES_LD).collect()
    }

    pub fn indices_free(&self) -> Vec<usize> {
        (0..self.num_indices_c)
            .filter(|&i| matches!(self.index_role(i), Some(IndexRole::Free { .. })))
            .collect()
    }

    pub fn indices_batch(&self) -> Vec<usize> {
        (0..self.num_indices_c)
            .filter(|&i| matches!(self.index_role(i), Some(IndexRole::Batch { .. })))
            .collect()
    }

    pub fn indices_summation(&self) -> Vec<usize> {
        (self.num_indices_c..self.total_indices()).collect()
    }

    /// Classifies `idx`, or returns `None` when neither A nor B holds it.
    pub fn index_role(&self, idx: usize) -> Option<IndexRole> {
        let pos_a = self.index_assignments_a.iter().position(|&i| i == idx);
        let pos_b = self.index_assignments_b.iter().position(|&i| i == idx);
        match (pos_a, pos_b) {
            (Some(a), Some(b)) if idx < self.num_indices_c => Some(IndexRole::Batch { a, b }),
            (Some(a), Some(b)) => Some(IndexRole::Bound { a, b }),
            (Some(pos), None) => Some(IndexRole::Free { in_a: true, pos }),
            (None, Some(pos)) => Some(IndexRole::Free { in_a: false, pos }),
            (None, None) => None,
        }
    }

    /// Checks the index assignments are self-consistent.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ClientError::InvalidProblemType(msg));

        if self.num_indices_c == 0 {
            return invalid("NumIndicesC must be at least 1".into());
        }
        if self.index_assignments_a.is_empty() || self.index_assignments_b.is_empty() {
            return invalid("IndexAssignmentsA and IndexAssignmentsB must not be empty".into());
        }
        let total = self.total_indices();
        if total > INDEX_CHARS.len() {
            return invalid(format!(
                "{total} indices exceed the {} available index characters",
                INDEX_CHARS.len()
            ));
        }
        for (name, assignments) in [
            ('A', &self.index_assignments_a),
            ('B', &self.index_assignments_b),
        ] {
            for (pos, idx) in assignments.iter().enumerate() {
                if assignments[..pos].contains(idx) {
                    return invalid(format!("index {idx} repeated in IndexAssignments{name}"));
                }
            }
        }
        for idx in 0..total {
            match self.index_role(idx) {
                None => return invalid(format!("index {idx} is not assigned to A or B")),
                Some(IndexRole::Free { .. }) if idx >= self.num_indices_c => {
                    return invalid(format!("summation index {idx} must appear in A and B"))
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Identifier of the contraction in the client's problem-identifier syntax.
    pub fn operation_identifier(&self) -> String {
        let sum: String = self
            .indices_summation()
            .into_iter()
            .map(index_char)
            .collect();
        let c: String = (0..self.num_indices_c).map(index_char).collect();
        format!(
            "Contraction_{sum}_A{}{}_B{}{}_C{c}_D{c}",
            index_chars(&self.index_assignments_a),
            if self.complex_conjugate_a { "C" } else { "" },
            index_chars(&self.index_assignments_b),
            if self.complex_conjugate_b { "C" } else { "" },
        )
    }
}

/// Lower-case character naming index `idx`.
fn index_char(idx: usize) -> char {
    INDEX_CHARS
        .as_bytes()
        .get(idx)
        .map(|c| c.to_ascii_lowercase() as char)
        .unwrap_or('?')
}

fn index_chars(indices: &[usize]) -> String {
    indices.iter().map(|&i| index_char(i)).collect()
}

/// Canonical problem-type name, e.g. `Cijk_Ailk_Bljk_SB`.
///
/// The name is the key problem types are sorted by, and it names the generated client functions
/// and configuration files.
impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c: String = (0..self.num_indices_c).map(index_char).collect();
        write!(f, "C{c}_A{}", index_chars(&self.index_assignments_a))?;
        if self.complex_conjugate_a {
            write!(f, "C")?;
        }
        write!(f, "_B{}", index_chars(&self.index_assignments_b))?;
        if self.complex_conjugate_b {
            write!(f, "C")?;
        }

        write!(f, "_{}", self.data_type.to_char())?;
        if self.dest_type() != self.data_type {
            write!(f, "{}", self.dest_type().to_char())?;
        }
        if self.compute_type() != self.dest_type() {
            write!(f, "{}", self.compute_type().to_char())?;
        }
        if self.use_beta {
            write!(f, "B")?;
        }

        if self.high_precision_accumulate {
            write!(f, "_HPA")?;
        }
        if self.use_bias {
            write!(f, "_Bias")?;
        }
        if self.use_e {
            write!(f, "_E")?;
        }
        if self.use_gradient {
            write!(f, "_Grad")?;
        }
        if self.output_amax_d {
            write!(f, "_AmaxD")?;
        }
        if !self.use_scale_ab.is_empty() {
            write!(f, "_SAB")?;
        }
        if self.use_scale_cd {
            write!(f, "_SCD")?;
        }
        if self.use_scale_alpha_vec != 0 {
            write!(f, "_SAV")?;
        }
        match self.sparse {
            0 => {}
            1 => write!(f, "_SPA")?,
            _ => write!(f, "_SPB")?,
        }
        if self.grouped_gemm {
            write!(f, "_GG")?;
        }
        if self.activation_type != ActivationType::None {
            write!(f, "_{}", self.activation_type.to_enum())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemm_index_classification() {
        let pt = ProblemType::gemm(DataType::Single, false, false);
        assert_eq!(pt.total_indices(), 4);
        assert_eq!(pt.indices_free(), [0, 1]);
        assert_eq!(pt.indices_batch(), [2]);
        assert_eq!(pt.indices_summation(), [3]);
        assert_eq!(pt.index_assignments_ld(), [4, 5, 6, 7]);

        assert_eq!(
            pt.index_role(0),
            Some(IndexRole::Free { in_a: true, pos: 0 })
        );
        assert_eq!(
            pt.index_role(1),
            Some(IndexRole::Free {
                in_a: false,
                pos: 1
            })
        );
        assert_eq!(pt.index_role(2), Some(IndexRole::Batch { a: 2, b: 2 }));
        assert_eq!(pt.index_role(3), Some(IndexRole::Bound { a: 1, b: 0 }));
        assert_eq!(pt.index_role(9), None);
    }

    #[test]
    fn names_and_identifiers() {
        let pt = ProblemType::gemm(DataType::Single, false, false);
        assert_eq!(pt.to_string(), "Cijk_Ailk_Bljk_SB");
        assert_eq!(pt.operation_identifier(), "Contraction_l_Ailk_Bljk_Cijk_Dijk");

        let mut hpa = ProblemType::gemm(DataType::Half, true, false);
        hpa.compute_data_type = Some(DataType::Single);
        hpa.high_precision_accumulate = true;
        hpa.use_bias = true;
        assert_eq!(hpa.to_string(), "Cijk_Alik_Bljk_HSB_HPA_Bias");
    }

    #[test]
    fn deserializes_logic_keys() {
        let pt: ProblemType = serde_json::from_str(
            r#"{
                "DataType": "h",
                "DestDataType": "s",
                "IndexAssignmentsA": [0, 3, 2],
                "IndexAssignmentsB": [3, 1, 2],
                "NumIndicesC": 3,
                "UseBeta": false,
                "UseScaleAB": "Scalar",
                "SetConstStrideA": [[0, 1]]
            }"#,
        )
        .unwrap();
        assert_eq!(pt.dest_type(), DataType::Single);
        assert_eq!(pt.compute_type(), DataType::Single);
        assert_eq!(pt.a_type(), DataType::Half);
        assert!(!pt.use_beta);
        assert!(pt.strided_batched);
        assert_eq!(pt.use_scale_ab, "Scalar");
        assert_eq!(pt.set_const_stride_a, [(0, 1)]);
        assert_eq!(pt.bias_source(), "D");
    }

    #[test]
    fn validate_rejects_unassigned_and_one_sided_summation() {
        assert!(ProblemType::gemm(DataType::Double, true, true)
            .validate()
            .is_ok());

        let missing = ProblemType::new(DataType::Single, vec![0, 3], vec![3, 2], 3);
        assert!(matches!(
            missing.validate(),
            Err(ClientError::InvalidProblemType(_))
        ));

        let one_sided = ProblemType::new(DataType::Single, vec![0, 3, 2], vec![1, 2], 3);
        assert!(one_sided.validate().is_err());

        let repeated = ProblemType::new(DataType::Single, vec![0, 0, 3], vec![3, 1], 2);
        assert!(repeated.validate().is_err());
    }
}
