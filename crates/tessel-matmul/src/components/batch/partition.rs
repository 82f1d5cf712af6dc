use tessel_layout::{Index, LayoutError, TensorAdaptor, Transform, chain_tensor_adaptors};

use crate::components::selection::BlockCluster;

#[derive(Clone, Debug)]
/// Maps the linear id of a cube to the output tile it computes.
///
/// Tiles are visited in clusters of `M01 × N01` so that consecutive cubes reuse the same rows
/// of lhs and columns of rhs. Tiles of the right and bottom strips that don't fill a whole
/// cluster are visited in row-major order after the clusters.
pub struct BlockToTileMap {
    m0: usize,
    n0: usize,
    full_m: usize,
    full_n: usize,
    cluster_adaptor: Option<TensorAdaptor>,
}

impl BlockToTileMap {
    pub fn new(m0: usize, n0: usize, cluster: BlockCluster) -> Result<Self, LayoutError> {
        let m01 = cluster.m01.max(1);
        let n01 = cluster.n01.max(1);
        let m00 = m0 / m01;
        let n00 = n0 / n01;
        let full_m = m00 * m01;
        let full_n = n00 * n01;

        let cluster_adaptor = if full_m * full_n > 0 {
            let [m00, n00, m01, n01] = [m00, n00, m01, n01].map(|v| v as Index);
            let split = TensorAdaptor::identity([full_m as Index, full_n as Index]).transform(
                vec![
                    Transform::unmerge(vec![m00, m01])?,
                    Transform::unmerge(vec![n00, n01])?,
                ],
                vec![vec![0], vec![1]],
                vec![vec![0, 2], vec![1, 3]],
            )?;
            let linear = TensorAdaptor::identity([m00, n00, m01, n01]).transform(
                vec![Transform::merge(vec![m00, n00, m01, n01])?],
                vec![vec![0, 1, 2, 3]],
                vec![vec![0]],
            )?;
            Some(chain_tensor_adaptors(&split, &linear)?)
        } else {
            None
        };

        Ok(Self {
            m0,
            n0,
            full_m,
            full_n,
            cluster_adaptor,
        })
    }

    /// Number of output tiles.
    pub fn num_tiles(&self) -> usize {
        self.m0 * self.n0
    }

    /// Tile `(m_block, n_block)` computed by the cube with linear id `tile_id`.
    pub fn tile(&self, tile_id: usize) -> (usize, usize) {
        let clustered = self.full_m * self.full_n;
        if tile_id < clustered {
            if let Some(adaptor) = &self.cluster_adaptor {
                let index = adaptor.calculate_bottom_index(&[tile_id as Index]);
                return (index[0] as usize, index[1] as usize);
            }
        }

        let rest = tile_id - clustered;
        let right_width = self.n0 - self.full_n;
        let right_strip = self.full_m * right_width;
        if rest < right_strip {
            (rest / right_width, self.full_n + rest % right_width)
        } else {
            let rest = rest - right_strip;
            (self.full_m + rest / self.n0, rest % self.n0)
        }
    }
}
