//! Bounded-parallelism evaluation for grid candidates.

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::SelectError;

/// Map `eval` over `items` on a dedicated pool of `degree` workers.
///
/// Every item is evaluated even when some fail; the first error in input
/// order is returned.
pub(crate) fn parallel_map<I, T, F>(
    items: Vec<I>,
    degree: usize,
    eval: F,
) -> Result<Vec<T>, SelectError>
where
    I: Send,
    T: Send,
    F: Fn(I) -> Result<T, SelectError> + Send + Sync,
{
    if degree == 0 {
        return Err(SelectError::InvalidParallelism { degree });
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(degree)
        .build()
        .map_err(|source| SelectError::ThreadPool { source })?;
    let results: Vec<Result<T, SelectError>> =
        pool.install(|| items.into_par_iter().map(eval).collect());
    results.into_iter().collect()
}
