use burn::prelude::*;
use burn::tensor::activation::relu;

/// Sparsemax over the last dimension of a `(batch, n)` tensor.
///
/// Projects every row onto the probability simplex. Unlike softmax the result
/// can contain exact zeros. With `S` the support set,
///
/// ```text
/// tau      = (sum_{j in S} z_j - 1) / |S|
/// output_j = max(z_j - tau, 0)
/// ```
///
/// `j` belongs to `S` iff `1 + k_j * z_j > s_j`, where `k_j` counts the row
/// entries `>= z_j` and `s_j` is their sum. The support is found on detached
/// values by pairwise comparison; `tau` is built from the live input so the
/// backward pass yields the sparsemax Jacobian `diag(s) - s s^T / |S|`.
pub fn sparsemax<B: Backend>(z: Tensor<B, 2>) -> Tensor<B, 2> {
    let [batch, n] = z.dims();
    let values = z.clone().detach();

    // (b, i, j) = z_i and z_j respectively.
    let z_i = values.clone().unsqueeze_dim::<3>(2).expand([batch, n, n]);
    let z_j = values.clone().unsqueeze_dim::<3>(1).expand([batch, n, n]);
    let at_least = z_i.clone().greater_equal(z_j).float();

    let counts: Tensor<B, 2> = at_least.clone().sum_dim(1).squeeze::<2>(1);
    let sums: Tensor<B, 2> = (at_least * z_i).sum_dim(1).squeeze::<2>(1);

    let support = (counts * values).add_scalar(1.0).greater(sums).float();
    let support_size = support.clone().sum_dim(1);
    let tau = ((z.clone() * support).sum_dim(1).sub_scalar(1.0)) / support_size;

    relu(z - tau)
}
