use serde::{Deserialize, Serialize};
use tessel_matmul::components::{FormattedConfigError, MatmulProblemSize};

use crate::ConvSetupError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Memory layouts of the three convolution tensors.
pub enum ConvLayout {
    /// Input `NHWC`, weight `KYXC`, output `NHWK`.
    ///
    /// The GEMM is `M = N·Ho·Wo`, `N = K`, `K = Y·X·C`, with the input as lhs.
    #[default]
    Nhwc,
    /// Input `NCHW`, weight `KCYX`, output `NKHW`.
    ///
    /// The GEMM is `M = K`, `N = N·Ho·Wo`, `K = C·Y·X`, with the weight as lhs.
    Nchw,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// A 2D forward convolution, regardless of actual data.
///
/// Spatial pairs are `[height, width]`. Every tensor is contiguous in its [ConvLayout].
pub struct ConvolutionProblem {
    pub batches: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub in_shape: [usize; 2],
    pub kernel_size: [usize; 2],
    pub stride: [usize; 2],
    pub dilation: [usize; 2],
    pub padding_left: [usize; 2],
    pub padding_right: [usize; 2],
    pub layout: ConvLayout,
}

impl ConvolutionProblem {
    /// Unpadded, unit stride and dilation convolution.
    pub fn new(
        batches: usize,
        in_channels: usize,
        out_channels: usize,
        in_shape: [usize; 2],
        kernel_size: [usize; 2],
    ) -> Self {
        Self {
            batches,
            in_channels,
            out_channels,
            in_shape,
            kernel_size,
            stride: [1, 1],
            dilation: [1, 1],
            padding_left: [0, 0],
            padding_right: [0, 0],
            layout: ConvLayout::Nhwc,
        }
    }

    pub fn with_stride(mut self, stride: [usize; 2]) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_dilation(mut self, dilation: [usize; 2]) -> Self {
        self.dilation = dilation;
        self
    }

    /// Same padding on both sides of each spatial dimension.
    pub fn with_padding(self, padding: [usize; 2]) -> Self {
        self.with_asymmetric_padding(padding, padding)
    }

    pub fn with_asymmetric_padding(mut self, left: [usize; 2], right: [usize; 2]) -> Self {
        self.padding_left = left;
        self.padding_right = right;
        self
    }

    pub fn with_layout(mut self, layout: ConvLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Extent covered by the dilated kernel along a spatial dimension.
    pub fn dilated_kernel_size(&self, dim: usize) -> usize {
        (self.kernel_size[dim] - 1) * self.dilation[dim] + 1
    }

    /// Padded extent of the input along a spatial dimension.
    pub fn padded_in_size(&self, dim: usize) -> usize {
        self.padding_left[dim] + self.in_shape[dim] + self.padding_right[dim]
    }

    /// Spatial shape `[Ho, Wo]` of the output.
    ///
    /// `Ho = (Hi + LeftPad + RightPad - ((Y - 1) * Dy + 1)) / Sy + 1`, likewise for `Wo`.
    pub fn out_shape(&self) -> Result<[usize; 2], ConvSetupError> {
        self.check()?;
        Ok([0, 1].map(|dim| {
            (self.padded_in_size(dim) - self.dilated_kernel_size(dim)) / self.stride[dim] + 1
        }))
    }

    /// Extents of the implicit GEMM.
    pub fn gemm_size(&self) -> Result<MatmulProblemSize, ConvSetupError> {
        let [ho, wo] = self.out_shape()?;
        let [y, x] = self.kernel_size;
        let pixels = self.batches * ho * wo;
        let reduction = y * x * self.in_channels;

        Ok(match self.layout {
            ConvLayout::Nhwc => MatmulProblemSize::new(pixels, self.out_channels, reduction),
            ConvLayout::Nchw => MatmulProblemSize::new(self.out_channels, pixels, reduction),
        })
    }

    /// Shape of the input in memory order.
    pub fn input_shape(&self) -> [usize; 4] {
        let [hi, wi] = self.in_shape;
        match self.layout {
            ConvLayout::Nhwc => [self.batches, hi, wi, self.in_channels],
            ConvLayout::Nchw => [self.batches, self.in_channels, hi, wi],
        }
    }

    /// Shape of the weight in memory order.
    pub fn weight_shape(&self) -> [usize; 4] {
        let [y, x] = self.kernel_size;
        match self.layout {
            ConvLayout::Nhwc => [self.out_channels, y, x, self.in_channels],
            ConvLayout::Nchw => [self.out_channels, self.in_channels, y, x],
        }
    }

    /// Shape of the output in memory order.
    pub fn output_shape(&self) -> Result<[usize; 4], ConvSetupError> {
        let [ho, wo] = self.out_shape()?;
        Ok(match self.layout {
            ConvLayout::Nhwc => [self.batches, ho, wo, self.out_channels],
            ConvLayout::Nchw => [self.batches, self.out_channels, ho, wo],
        })
    }

    fn check(&self) -> Result<(), ConvSetupError> {
        let extents = [
            ("batches", self.batches),
            ("in_channels", self.in_channels),
            ("out_channels", self.out_channels),
            ("input height", self.in_shape[0]),
            ("input width", self.in_shape[1]),
            ("kernel height", self.kernel_size[0]),
            ("kernel width", self.kernel_size[1]),
            ("stride height", self.stride[0]),
            ("stride width", self.stride[1]),
            ("dilation height", self.dilation[0]),
            ("dilation width", self.dilation[1]),
        ];
        if let Some((name, _)) = extents.iter().find(|(_, extent)| *extent == 0) {
            let name = *name;
            return Err(ConvSetupError::InvalidProblem(FormattedConfigError::new(
                move || format!("The {name} of a convolution must be positive"),
            )));
        }

        for dim in 0..2 {
            let kernel = self.dilated_kernel_size(dim);
            let padded = self.padded_in_size(dim);
            if kernel > padded {
                return Err(ConvSetupError::InvalidProblem(FormattedConfigError::new(
                    move || {
                        format!(
                            "Dilated kernel extent {kernel} exceeds the padded input extent {padded} on spatial dim {dim}"
                        )
                    },
                )));
            }
        }

        Ok(())
    }
}
