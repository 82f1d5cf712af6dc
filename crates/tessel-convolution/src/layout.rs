use tessel_layout::{Index, LayoutError, TensorDescriptor, Transform};

use crate::{ConvLayout, ConvSetupError, ConvolutionProblem};

#[derive(Clone, Debug)]
/// The convolution tensors viewed as the operands of a matmul.
///
/// `lhs` is `(GemmK, GemmM)`, `rhs` is `(GemmK, GemmN)` and `out` is `(GemmM, GemmN)`. Input
/// views address the padding of the image, where they are invalid and read zeros.
pub struct ImplicitGemmViews {
    pub lhs: TensorDescriptor,
    pub rhs: TensorDescriptor,
    pub out: TensorDescriptor,
}

impl ImplicitGemmViews {
    pub fn new(problem: &ConvolutionProblem) -> Result<Self, ConvSetupError> {
        let out_shape = problem.out_shape()?;
        let views = match problem.layout {
            ConvLayout::Nhwc => Self {
                lhs: input_nhwc_k_m(problem, out_shape)?,
                rhs: weight_k_by_filter(problem)?,
                out: output_nhwk_m_n(problem, out_shape)?,
            },
            ConvLayout::Nchw => Self {
                lhs: weight_k_by_filter(problem)?,
                rhs: input_nchw_k_n(problem, out_shape)?,
                out: output_nkhw_m_n(problem, out_shape)?,
            },
        };
        Ok(views)
    }
}

fn index(values: [usize; 2]) -> [Index; 2] {
    values.map(|v| v as Index)
}

/// Pads both spatial dims of a packed 4D input, then splits each into `(kernel, out)` pairs.
///
/// `spatial_dims` are the positions of `H` and `W` in memory order. The result has six
/// dimensions, each spatial one replaced in place by its pair.
fn input_windows(
    problem: &ConvolutionProblem,
    out_shape: [usize; 2],
    spatial_dims: [usize; 2],
) -> Result<TensorDescriptor, LayoutError> {
    let desc = TensorDescriptor::packed(problem.input_shape().map(|v| v as Index))?;
    let lengths = desc.lengths();
    let [hi, wi] = index(problem.in_shape);
    let [left_h, left_w] = index(problem.padding_left);
    let [right_h, right_w] = index(problem.padding_right);

    let mut transforms = Vec::with_capacity(4);
    let mut lower = Vec::with_capacity(4);
    for dim in 0..4 {
        let transform = if dim == spatial_dims[0] {
            Transform::pad(hi, left_h, right_h)?
        } else if dim == spatial_dims[1] {
            Transform::pad(wi, left_w, right_w)?
        } else {
            Transform::pass_through(lengths[dim])?
        };
        transforms.push(transform);
        lower.push(vec![dim]);
    }
    let padded = desc.transform(transforms, lower.clone(), lower)?;

    let [y, x] = index(problem.kernel_size);
    let [ho, wo] = index(out_shape);
    let [dy, dx] = index(problem.dilation);
    let [sy, sx] = index(problem.stride);

    // Each spatial dim becomes two, shifting the later dims by one per split before them.
    let mut transforms = Vec::with_capacity(4);
    let mut lower = Vec::with_capacity(4);
    let mut upper = Vec::with_capacity(4);
    let mut position = 0;
    for dim in 0..4 {
        if dim == spatial_dims[0] {
            transforms.push(Transform::embed(vec![y, ho], vec![dy, sy], 0)?);
            upper.push(vec![position, position + 1]);
            position += 2;
        } else if dim == spatial_dims[1] {
            transforms.push(Transform::embed(vec![x, wo], vec![dx, sx], 0)?);
            upper.push(vec![position, position + 1]);
            position += 2;
        } else {
            transforms.push(Transform::pass_through(lengths[dim])?);
            upper.push(vec![position]);
            position += 1;
        }
        lower.push(vec![dim]);
    }
    padded.transform(transforms, lower, upper)
}

/// NHWC input as `(Y·X·C, N·Ho·Wo)`.
fn input_nhwc_k_m(
    problem: &ConvolutionProblem,
    out_shape: [usize; 2],
) -> Result<TensorDescriptor, LayoutError> {
    // (N, Y, Ho, X, Wo, C)
    let windows = input_windows(problem, out_shape, [1, 2])?;
    let [y, x] = index(problem.kernel_size);
    let [ho, wo] = index(out_shape);
    let (n, c) = (problem.batches as Index, problem.in_channels as Index);

    windows.transform(
        vec![
            Transform::merge(vec![y, x, c])?,
            Transform::merge(vec![n, ho, wo])?,
        ],
        vec![vec![1, 3, 5], vec![0, 2, 4]],
        vec![vec![0], vec![1]],
    )
}

/// NCHW input as `(C·Y·X, N·Ho·Wo)`.
fn input_nchw_k_n(
    problem: &ConvolutionProblem,
    out_shape: [usize; 2],
) -> Result<TensorDescriptor, LayoutError> {
    // (N, C, Y, Ho, X, Wo)
    let windows = input_windows(problem, out_shape, [2, 3])?;
    let [y, x] = index(problem.kernel_size);
    let [ho, wo] = index(out_shape);
    let (n, c) = (problem.batches as Index, problem.in_channels as Index);

    windows.transform(
        vec![
            Transform::merge(vec![c, y, x])?,
            Transform::merge(vec![n, ho, wo])?,
        ],
        vec![vec![1, 2, 4], vec![0, 3, 5]],
        vec![vec![0], vec![1]],
    )
}

/// KYXC or KCYX weight as `(GemmK, K)`: each filter is a contiguous run of the reduction.
fn weight_k_by_filter(problem: &ConvolutionProblem) -> Result<TensorDescriptor, LayoutError> {
    let [y, x] = problem.kernel_size;
    let filter = (y * x * problem.in_channels) as Index;
    TensorDescriptor::naive([filter, problem.out_channels as Index], [1, filter])
}

/// NHWK output as `(N·Ho·Wo, K)`.
fn output_nhwk_m_n(
    problem: &ConvolutionProblem,
    out_shape: [usize; 2],
) -> Result<TensorDescriptor, LayoutError> {
    let pixels = (problem.batches * out_shape[0] * out_shape[1]) as Index;
    TensorDescriptor::packed([pixels, problem.out_channels as Index])
}

/// NKHW output as `(K, N·Ho·Wo)`.
fn output_nkhw_m_n(
    problem: &ConvolutionProblem,
    out_shape: [usize; 2],
) -> Result<TensorDescriptor, LayoutError> {
    let (n, k) = (problem.batches as Index, problem.out_channels as Index);
    let spatial = (out_shape[0] * out_shape[1]) as Index;

    TensorDescriptor::packed([n, k, spatial])?.transform(
        vec![
            Transform::pass_through(k)?,
            Transform::merge(vec![n, spatial])?,
        ],
        vec![vec![1], vec![0, 2]],
        vec![vec![0], vec![1]],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tessel_layout::MultiIndex;

    fn problem() -> ConvolutionProblem {
        // Ho = (5 + 1 + 1 - 3) / 2 + 1 = 3, Wo = (6 + 1 + 1 - 3) / 1 + 1 = 6
        ConvolutionProblem::new(2, 4, 8, [5, 6], [3, 3])
            .with_stride([2, 1])
            .with_padding([1, 1])
    }

    #[test]
    fn nhwc_input_view_maps_windows_and_flags_padding() {
        let problem = problem();
        let views = ImplicitGemmViews::new(&problem).unwrap();
        assert_eq!(views.lhs.lengths(), MultiIndex::from([36, 36]));

        // k = (y=1, x=2, c=3), m = (n=1, ho=2, wo=4): hi = 2*2 + 1 - 1 = 4, wi = 4 + 2 - 1 = 5
        let k = (3 + 2) * 4 + 3;
        let m = 18 + 2 * 6 + 4;
        assert!(views.lhs.is_valid(&[k, m]));
        assert_eq!(views.lhs.calculate_offset(&[k, m]), ((5 + 4) * 6 + 5) * 4 + 3);

        // y=0, ho=0 lands in the top padding row.
        assert!(!views.lhs.is_valid(&[0, 0]));
        // y=1, x=1, ho=0, wo=0 is the first pixel.
        assert!(views.lhs.is_valid(&[(3 + 1) * 4, 0]));
        assert_eq!(views.lhs.calculate_offset(&[(3 + 1) * 4, 0]), 0);
    }

    #[test]
    fn nchw_views_put_the_weight_on_the_left() {
        let problem = problem().with_layout(ConvLayout::Nchw);
        let views = ImplicitGemmViews::new(&problem).unwrap();
        assert_eq!(views.lhs.lengths(), MultiIndex::from([36, 8]));
        assert_eq!(views.rhs.lengths(), MultiIndex::from([36, 36]));
        assert_eq!(views.out.lengths(), MultiIndex::from([8, 36]));

        // Weight (k=5, c=2, y=1, x=0).
        assert_eq!(views.lhs.calculate_offset(&[2 * 9 + 3, 5]), 5 * 36 + 2 * 9 + 3);

        // k = (c=2, y=2, x=0), n = (n=1, ho=1, wo=3): hi = 2 + 2 - 1 = 3, wi = 3 - 1 = 2
        let k = 2 * 9 + 2 * 3;
        let n = 18 + 6 + 3;
        assert!(views.rhs.is_valid(&[k, n]));
        assert_eq!(views.rhs.calculate_offset(&[k, n]), ((4 + 2) * 5 + 3) * 6 + 2);

        // Output (k=5, n=1, p=7) is at ((1 * 8) + 5) * 18 + 7.
        assert_eq!(views.out.calculate_offset(&[5, 18 + 7]), 13 * 18 + 7);
    }
}
