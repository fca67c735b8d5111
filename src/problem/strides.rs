//! Stride derivation for client problem descriptions.
//!
//! Each tensor's strides come, in order of precedence, from:
//! 1. explicit per-problem strides (negative entries mean "unset"),
//! 2. strides pinned by the problem type (`SetConstStrideA`/`SetConstStrideB`),
//! 3. the leading dimensions trailing an exact size list, which fill stride position 1,
//! 4. packed defaults: each stride is the product of the extents of the preceding dimensions,
//!    the first extent being replaced by the leading dimension when one was supplied.
//!
//! A leading dimension that disagrees with a value already set for A or B is an error; for C
//! and D it is simply ignored.

use super::{ConstStride, IndexRole, Problem, ProblemType};
use crate::{
    error::{ClientError, Result},
    utils::join,
};

/// Ordered `key=value` pair of a client configuration.
pub type Param = (&'static str, String);

/// Computes the size and stride parameters of one problem, in the order the client expects them:
/// `problem-size`, `a-strides`, `b-strides`, `c-strides`, `d-strides`, then `e-strides` and
/// `bias-strides` when the problem type uses them.
pub fn problem_size_params(
    problem_type: &ProblemType,
    problem: &Problem,
    factor_dims: &[u32],
) -> Result<Vec<Param>> {
    problem_type.validate()?;

    let total = problem_type.total_indices();
    let num_c = problem_type.num_indices_c;
    let a_indices = &problem_type.index_assignments_a;
    let b_indices = &problem_type.index_assignments_b;
    let c_indices: Vec<usize> = (0..num_c).collect();

    let mut a = explicit('A', problem.strides_a.as_deref(), a_indices.len())?;
    pin(problem_type, &mut a, &problem_type.set_const_stride_a, 'A')?;
    let mut b = explicit('B', problem.strides_b.as_deref(), b_indices.len())?;
    pin(problem_type, &mut b, &problem_type.set_const_stride_b, 'B')?;
    let mut c = explicit('C', problem.strides_c.as_deref(), num_c)?;
    let mut d = explicit('D', problem.strides_d.as_deref(), num_c)?;

    if problem.sizes.len() != total && problem.sizes.len() != total + problem_type.num_indices_ld()
    {
        return Err(ClientError::InvalidProblemSize {
            got: problem.sizes.len(),
            expected: total,
            sizes: join(&problem.sizes, ", "),
        });
    }

    let overflow = |tensor: &'static str| ClientError::StrideOverflow {
        tensor,
        sizes: join(&problem.sizes, ", "),
    };

    let ld = problem.leading_dims(total);
    if let Some([ldd, ldc, lda, ldb]) = ld {
        let stride =
            |v: usize, tensor: &'static str| i64::try_from(v).map_err(|_| overflow(tensor));
        fill_leading(&mut a, stride(lda, "A")?, Some(('A', "lda")))?;
        fill_leading(&mut b, stride(ldb, "B")?, Some(('B', "ldb")))?;
        fill_leading(&mut c, stride(ldc, "C")?, None)?;
        fill_leading(&mut d, stride(ldd, "D")?, None)?;
    }
    let lds = |i: usize| ld.map(|l| l[i]);

    let sizes = &problem.sizes[..total];
    let a = resolve(&a, a_indices, sizes, lds(2)).ok_or_else(|| overflow("A"))?;
    let b = resolve(&b, b_indices, sizes, lds(3)).ok_or_else(|| overflow("B"))?;
    let c = resolve(&c, &c_indices, sizes, lds(1)).ok_or_else(|| overflow("C"))?;
    let d = resolve(&d, &c_indices, sizes, lds(0)).ok_or_else(|| overflow("D"))?;

    let mut params = vec![
        ("problem-size", join(sizes, ",")),
        ("a-strides", join(&a, ",")),
        ("b-strides", join(&b, ",")),
    ];
    if !c.is_empty() {
        params.push(("c-strides", join(&c, ",")));
    }
    if !d.is_empty() {
        params.push(("d-strides", join(&d, ",")));
        if problem_type.use_e {
            params.push(("e-strides", join(&d, ",")));
        }
    }
    if problem_type.use_bias {
        let bias = bias_strides(problem_type, sizes, factor_dims)?;
        params.push(("bias-strides", join(&bias, ",")));
    }

    Ok(params)
}

/// Strides given by the problem itself, if any.
fn explicit(tensor: char, strides: Option<&[i64]>, dims: usize) -> Result<Vec<Option<i64>>> {
    match strides {
        None => Ok(vec![None; dims]),
        Some(strides) if strides.len() != dims => Err(ClientError::StrideCount {
            tensor,
            expected: dims,
            got: strides.len(),
        }),
        Some(strides) => Ok(strides
            .iter()
            .map(|&s| if s < 0 { None } else { Some(s) })
            .collect()),
    }
}

/// Applies the strides pinned by the problem type for `tensor` ('A' or 'B').
fn pin(
    problem_type: &ProblemType,
    strides: &mut [Option<i64>],
    pins: &[ConstStride],
    tensor: char,
) -> Result<()> {
    for &(idx, value) in pins {
        let pos = match (problem_type.index_role(idx), tensor) {
            (Some(IndexRole::Free { in_a: true, pos }), 'A')
            | (Some(IndexRole::Free { in_a: false, pos }), 'B') => pos,
            (Some(IndexRole::Batch { a, .. } | IndexRole::Bound { a, .. }), 'A') => a,
            (Some(IndexRole::Batch { b, .. } | IndexRole::Bound { b, .. }), 'B') => b,
            _ => {
                return Err(ClientError::InvalidProblemType(format!(
                    "setConstStride{tensor} pins index {idx}, which is not a dimension of {tensor}"
                )))
            }
        };
        strides[pos] = Some(value);
    }
    Ok(())
}

/// Fills stride position 1 with a leading dimension. With `check`, a different value already
/// present is a conflict.
fn fill_leading(
    strides: &mut [Option<i64>],
    ld: i64,
    check: Option<(char, &'static str)>,
) -> Result<()> {
    let Some(slot) = strides.get_mut(1) else {
        return Ok(());
    };
    match (*slot, check) {
        (None, _) => *slot = Some(ld),
        (Some(pinned), Some((tensor, name))) if pinned != ld => {
            return Err(ClientError::StrideConflict {
                ld: name,
                tensor,
                value: ld,
                pinned,
            })
        }
        _ => {}
    }
    Ok(())
}

/// Completes a stride list with packed defaults, or `None` when a packed default needed by the
/// list does not fit in an `i64`.
fn resolve(
    strides: &[Option<i64>],
    indices: &[usize],
    sizes: &[usize],
    ld: Option<usize>,
) -> Option<Vec<i64>> {
    // `None` once the running product has overflowed; only an error if a later stride needs it.
    let mut packed = Some(1i64);
    strides
        .iter()
        .zip(indices)
        .enumerate()
        .map(|(pos, (stride, &idx))| {
            let value = stride.or(packed)?;
            let extent = match (pos, ld) {
                (0, Some(ld)) => ld,
                _ => sizes[idx],
            };
            packed = packed
                .zip(i64::try_from(extent).ok())
                .and_then(|(p, e)| p.checked_mul(e));
            Some(value)
        })
        .collect()
}

/// Bias strides `[1, length, batch stride]`.
fn bias_strides(
    problem_type: &ProblemType,
    sizes: &[usize],
    factor_dims: &[u32],
) -> Result<[i64; 3]> {
    let (m, n) = (sizes[0], sizes.get(1).copied().unwrap_or(0));
    let (mut length, mut bound) = (m, "M");
    if problem_type.sparse != 0 {
        if factor_dims.len() > 1 {
            length = m.max(n);
            bound = "max(M,N)";
        } else if factor_dims.contains(&1) {
            length = n;
            bound = "N";
        }
    }
    let length = i64::try_from(length).map_err(|_| ClientError::StrideOverflow {
        tensor: "bias",
        sizes: join(sizes, ", "),
    })?;

    let mut strides = [1, length, 0];
    for &(idx, value) in &problem_type.set_const_stride_bias {
        if let Some(IndexRole::Batch { .. }) = problem_type.index_role(idx) {
            strides[2] = value;
        }
    }
    if strides[2] == -1 {
        strides[2] = length;
    } else if strides[2] != 0 && strides[2] < length {
        return Err(ClientError::BiasStride {
            stride: strides[2],
            bound,
            length,
        });
    }
    Ok(strides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::DataType;

    fn gemm() -> ProblemType {
        ProblemType::gemm(DataType::Single, false, false)
    }

    fn value<'a>(params: &'a [Param], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn packed_defaults_without_explicit_strides() {
        let params = problem_size_params(&gemm(), &Problem::new(vec![4, 8, 2, 16]), &[0]).unwrap();
        let keys: Vec<_> = params.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            ["problem-size", "a-strides", "b-strides", "c-strides", "d-strides"]
        );
        assert_eq!(value(&params, "problem-size"), Some("4,8,2,16"));
        // A is i,l,k ; B is l,j,k ; C/D are i,j,k.
        assert_eq!(value(&params, "a-strides"), Some("1,4,64"));
        assert_eq!(value(&params, "b-strides"), Some("1,16,128"));
        assert_eq!(value(&params, "c-strides"), Some("1,4,32"));
        assert_eq!(value(&params, "d-strides"), Some("1,4,32"));
    }

    #[test]
    fn leading_dimensions_fill_second_stride() {
        let problem = Problem::new(vec![4, 8, 2, 16, 6, 5, 20, 18]);
        let params = problem_size_params(&gemm(), &problem, &[0]).unwrap();
        assert_eq!(value(&params, "problem-size"), Some("4,8,2,16"));
        assert_eq!(value(&params, "d-strides"), Some("1,6,48"));
        assert_eq!(value(&params, "c-strides"), Some("1,5,40"));
        assert_eq!(value(&params, "a-strides"), Some("1,20,320"));
        assert_eq!(value(&params, "b-strides"), Some("1,18,144"));
    }

    #[test]
    fn pinned_strides_override_defaults() {
        let mut pt = gemm();
        pt.set_const_stride_a = vec![(2, 0), (3, 7)];
        pt.set_const_stride_b = vec![(1, 9)];
        let params = problem_size_params(&pt, &Problem::new(vec![4, 8, 2, 16]), &[0]).unwrap();
        assert_eq!(value(&params, "a-strides"), Some("1,7,0"));
        assert_eq!(value(&params, "b-strides"), Some("1,9,128"));
    }

    #[test]
    fn pinned_stride_conflicting_with_leading_dimension() {
        let mut pt = gemm();
        pt.set_const_stride_a = vec![(3, 7)];

        let agreeing = Problem::new(vec![4, 8, 2, 16, 4, 4, 7, 16]);
        let params = problem_size_params(&pt, &agreeing, &[0]).unwrap();
        assert_eq!(value(&params, "a-strides"), Some("1,7,112"));

        // The problem value is reported first and the pinned one second, matching the labels.
        let conflicting = Problem::new(vec![4, 8, 2, 16, 4, 4, 10, 16]);
        let err = problem_size_params(&pt, &conflicting, &[0]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "problem-specified lda(10) conflicts with setConstStrideA(7)"
        );

        let mut pt = gemm();
        pt.set_const_stride_b = vec![(1, 3)];
        let err = problem_size_params(&pt, &conflicting, &[0]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "problem-specified ldb(16) conflicts with setConstStrideB(3)"
        );
    }

    #[test]
    fn invalid_size_list_length() {
        let err = problem_size_params(&gemm(), &Problem::new(vec![4, 8, 2, 16, 3]), &[0])
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidProblemSize {
                got: 5,
                expected: 4,
                ..
            }
        ));
        assert!(err
            .to_string()
            .starts_with("Invalid number of problem type indices: 5 - Indices: 4"));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn packed_stride_overflow_is_reported() {
        let huge = Problem::new(vec![1 << 32, 1 << 32, 1, 1 << 32]);
        let err = problem_size_params(&gemm(), &huge, &[0]).unwrap_err();
        assert!(matches!(err, ClientError::StrideOverflow { tensor: "A", .. }));

        // Only strides that are written need to fit: the product past the last C dimension is
        // never used.
        let large = Problem::new(vec![1 << 31, 1 << 31, 1 << 10, 1]);
        let params = problem_size_params(&gemm(), &large, &[0]).unwrap();
        assert_eq!(
            value(&params, "c-strides"),
            Some("1,2147483648,4611686018427387904")
        );

        let wide_ld = Problem::new(vec![4, 8, 2, 16, 4, 4, usize::MAX, 16]);
        let err = problem_size_params(&gemm(), &wide_ld, &[0]).unwrap_err();
        assert!(matches!(err, ClientError::StrideOverflow { tensor: "A", .. }));
    }

    #[test]
    fn explicit_strides_are_kept() {
        let mut problem = Problem::new(vec![4, 8, 2, 16]);
        problem.strides_a = Some(vec![1, 32, -1]);
        let params = problem_size_params(&gemm(), &problem, &[0]).unwrap();
        assert_eq!(value(&params, "a-strides"), Some("1,32,64"));

        problem.strides_c = Some(vec![1, 4]);
        let err = problem_size_params(&gemm(), &problem, &[0]).unwrap_err();
        assert!(matches!(
            err,
            ClientError::StrideCount {
                tensor: 'C',
                expected: 3,
                got: 2
            }
        ));
    }

    #[test]
    fn pinning_a_foreign_free_index_is_rejected() {
        let mut pt = gemm();
        pt.set_const_stride_a = vec![(1, 1)];
        let err = problem_size_params(&pt, &Problem::new(vec![4, 8, 2, 16]), &[0]).unwrap_err();
        assert!(matches!(err, ClientError::InvalidProblemType(_)));
    }

    #[test]
    fn e_strides_mirror_d() {
        let mut pt = gemm();
        pt.use_e = true;
        let params = problem_size_params(&pt, &Problem::new(vec![4, 8, 2, 16]), &[0]).unwrap();
        assert_eq!(value(&params, "e-strides"), value(&params, "d-strides"));
    }

    #[test]
    fn bias_strides() {
        let mut pt = gemm();
        pt.use_bias = true;
        let problem = Problem::new(vec![4, 8, 2, 16]);

        let params = problem_size_params(&pt, &problem, &[0]).unwrap();
        assert_eq!(params.last().unwrap().0, "bias-strides");
        assert_eq!(value(&params, "bias-strides"), Some("1,4,0"));

        pt.set_const_stride_bias = vec![(2, -1)];
        let params = problem_size_params(&pt, &problem, &[0]).unwrap();
        assert_eq!(value(&params, "bias-strides"), Some("1,4,4"));

        pt.set_const_stride_bias = vec![(2, 2)];
        let err = problem_size_params(&pt, &problem, &[0]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "problem-specified bias stride(2) must >= M (4)"
        );

        pt.set_const_stride_bias = vec![(2, -1)];
        pt.sparse = 1;
        let params = problem_size_params(&pt, &problem, &[0, 1]).unwrap();
        assert_eq!(value(&params, "bias-strides"), Some("1,8,8"));
        let params = problem_size_params(&pt, &problem, &[1]).unwrap();
        assert_eq!(value(&params, "bias-strides"), Some("1,8,8"));
    }
}
