//! Element data types and activation kinds.

use serde::{Deserialize, Serialize};

use std::fmt;

/// Element data type of a tensor or scalar.
///
/// The declaration order is the order data types are grouped in when generating the client
/// header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "S", alias = "s", alias = "single")]
    Single,
    #[serde(rename = "D", alias = "d", alias = "double")]
    Double,
    #[serde(rename = "C", alias = "c", alias = "complexSingle")]
    ComplexSingle,
    #[serde(rename = "Z", alias = "z", alias = "complexDouble")]
    ComplexDouble,
    #[serde(rename = "H", alias = "h", alias = "half")]
    Half,
    #[serde(rename = "4xi8", alias = "int8x4")]
    Int8x4,
    #[serde(rename = "I", alias = "i", alias = "int32")]
    Int32,
    #[serde(rename = "B", alias = "b", alias = "bfloat16")]
    BFloat16,
    #[serde(rename = "I8", alias = "i8", alias = "int8")]
    Int8,
    #[serde(rename = "X", alias = "x", alias = "xfloat32")]
    XFloat32,
    #[serde(rename = "F8", alias = "f8", alias = "float8")]
    Float8,
    #[serde(rename = "B8", alias = "b8", alias = "bfloat8")]
    BFloat8,
}

impl DataType {
    /// Short tag used in problem-type names.
    pub fn to_char(self) -> &'static str {
        match self {
            Self::Single => "S",
            Self::Double => "D",
            Self::ComplexSingle => "C",
            Self::ComplexDouble => "Z",
            Self::Half => "H",
            Self::Int8x4 => "4xi8",
            Self::Int32 => "I",
            Self::BFloat16 => "B",
            Self::Int8 => "I8",
            Self::XFloat32 => "X",
            Self::Float8 => "F8",
            Self::BFloat8 => "B8",
        }
    }

    /// Enumerator name understood by the client configuration parser.
    pub fn to_enum(self) -> &'static str {
        match self {
            Self::Single => "Float",
            Self::Double => "Double",
            Self::ComplexSingle => "ComplexFloat",
            Self::ComplexDouble => "ComplexDouble",
            Self::Half => "Half",
            Self::Int8x4 => "Int8x4",
            Self::Int32 => "Int32",
            Self::BFloat16 => "BFloat16",
            Self::Int8 => "Int8",
            Self::XFloat32 => "XFloat32",
            Self::Float8 => "Float8",
            Self::BFloat8 => "BFloat8",
        }
    }

    /// C++ type name used by the generated header.
    pub fn to_cpp(self) -> &'static str {
        match self {
            Self::Single => "float",
            Self::Double => "double",
            Self::ComplexSingle => "TensileComplexFloat",
            Self::ComplexDouble => "TensileComplexDouble",
            Self::Half => "TensileHalf",
            Self::Int8x4 => "TensileInt8x4",
            Self::Int32 => "TensileInt32",
            Self::BFloat16 => "tensile_bfloat16",
            Self::Int8 => "int8_t",
            Self::XFloat32 => "float",
            Self::Float8 => "tensile_float8",
            Self::BFloat8 => "tensile_bfloat8",
        }
    }

    /// Size of one element in bytes.
    pub fn num_bytes(self) -> usize {
        match self {
            Self::Int8 | Self::Float8 | Self::BFloat8 => 1,
            Self::Half | Self::BFloat16 => 2,
            Self::Single | Self::Int8x4 | Self::Int32 | Self::XFloat32 => 4,
            Self::Double | Self::ComplexSingle => 8,
            Self::ComplexDouble => 16,
        }
    }

    pub fn is_real(self) -> bool {
        !matches!(self, Self::ComplexSingle | Self::ComplexDouble)
    }

    pub fn is_half(self) -> bool {
        self == Self::Half
    }

    pub fn is_int8x4(self) -> bool {
        self == Self::Int8x4
    }

    /// Floating-point operations per multiply-accumulate.
    pub fn flops_per_mac(self) -> usize {
        match self.is_real() {
            true => 2,
            false => 8,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// Activation applied to the output of a contraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationType {
    #[default]
    None,
    Abs,
    Clippedrelu,
    Exp,
    Gelu,
    Leakyrelu,
    Relu,
    Sigmoid,
    Tanh,
    Dgelu,
    Geluscaling,
    Silu,
    Swish,
    All,
    #[serde(rename = "hipblaslt_all")]
    HipblasltAll,
}

impl ActivationType {
    /// Enumerator name understood by the client configuration parser.
    pub fn to_enum(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Abs => "Abs",
            Self::Clippedrelu => "Clippedrelu",
            Self::Exp => "Exp",
            Self::Gelu => "Gelu",
            Self::Leakyrelu => "Leakyrelu",
            Self::Relu => "Relu",
            Self::Sigmoid => "Sigmoid",
            Self::Tanh => "Tanh",
            Self::Dgelu => "DGelu",
            Self::Geluscaling => "Geluscaling",
            Self::Silu => "Silu",
            Self::Swish => "Swish",
            Self::All => "All",
            Self::HipblasltAll => "Hipblaslt_all",
        }
    }

    /// Whether a kernel built for this activation can run any activation at runtime.
    pub fn is_for_all(self) -> bool {
        matches!(self, Self::All | Self::HipblasltAll)
    }
}

impl fmt::Display for ActivationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_enum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_types_parse_from_short_tags() {
        let types: Vec<DataType> = serde_json::from_str(r#"["S", "h", "4xi8", "B8"]"#).unwrap();
        assert_eq!(
            types,
            [
                DataType::Single,
                DataType::Half,
                DataType::Int8x4,
                DataType::BFloat8
            ]
        );
    }

    #[test]
    fn data_type_order_follows_declaration() {
        let mut types = vec![DataType::Half, DataType::Double, DataType::Single];
        types.sort();
        assert_eq!(types, [DataType::Single, DataType::Double, DataType::Half]);
    }

    #[test]
    fn complex_types_count_eight_flops_per_mac() {
        assert_eq!(DataType::ComplexDouble.flops_per_mac(), 8);
        assert_eq!(DataType::Half.flops_per_mac(), 2);
        assert_eq!(DataType::ComplexDouble.num_bytes(), 16);
    }

    #[test]
    fn activation_all_variants() {
        let act: ActivationType = serde_json::from_str(r#""hipblaslt_all""#).unwrap();
        assert!(act.is_for_all());
        assert!(!ActivationType::Relu.is_for_all());
        assert_eq!(ActivationType::Dgelu.to_enum(), "DGelu");
    }
}
