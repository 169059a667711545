use crate::analysis::result::{Category, Likelihood, SafeSearch};

/// Any category at or above this level blocks the picture.
pub const REJECT_AT: Likelihood = Likelihood::Likely;

/// Admit only when no category reaches [`REJECT_AT`].
pub fn admits(safe: &SafeSearch) -> bool {
    Category::ALL.iter().all(|&c| safe.get(c) < REJECT_AT)
}

/// The categories responsible for a rejection, in declaration order.
pub fn flagged(safe: &SafeSearch) -> Vec<Category> {
    Category::ALL
        .iter()
        .copied()
        .filter(|&c| safe.get(c) >= REJECT_AT)
        .collect()
}
