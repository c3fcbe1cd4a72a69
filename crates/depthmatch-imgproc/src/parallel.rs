use rayon::prelude::*;

use depthmatch_image::Image;

/// Apply a function to each row of the destination image in parallel.
///
/// The closure receives the row index and the mutable row buffer of `dst`.
pub fn par_iter_rows_mut<T, const C: usize>(
    dst: &mut Image<T, C>,
    f: impl Fn(usize, &mut [T]) + Send + Sync,
) where
    T: Send,
{
    let row_len = (dst.width() * C).max(1);
    dst.as_slice_mut()
        .par_chunks_exact_mut(row_len)
        .enumerate()
        .for_each(|(r, row)| f(r, row));
}
