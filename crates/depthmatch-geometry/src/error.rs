/// Errors returned by the two-view geometry utilities.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum GeometryError {
    /// Input correspondences are invalid or insufficient.
    #[error("Need at least {required} correspondences and equal lengths, got {left} and {right}")]
    InvalidInput {
        /// Minimum required correspondences for the chosen model.
        required: usize,
        /// Number of points in the first view.
        left: usize,
        /// Number of points in the second view.
        right: usize,
    },

    /// The solver produced a matrix with non finite entries.
    #[error("The estimated model is not finite")]
    NonFiniteModel,
}
