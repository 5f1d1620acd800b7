//! Recipient classifier.

use coursemail_core::{Category, Recipient};

/// Assign a category from a progress count and the cycle's required count.
///
/// `required == 0` makes every non-zero count complete; broadcast runs
/// should skip classification instead of relying on that.
pub fn classify(progress: u32, required: u32) -> Category {
    if progress == 0 {
        Category::None
    } else if progress < required {
        Category::Partial
    } else {
        Category::Complete
    }
}

/// Split recipients into (complete, partial, none), preserving row order.
pub fn group_by_category(
    recipients: &[Recipient],
    required: u32,
) -> (Vec<&Recipient>, Vec<&Recipient>, Vec<&Recipient>) {
    let mut complete = Vec::new();
    let mut partial = Vec::new();
    let mut none = Vec::new();
    for r in recipients {
        match classify(r.progress_count(), required) {
            Category::Complete => complete.push(r),
            Category::Partial => partial.push(r),
            Category::None => none.push(r),
        }
    }
    (complete, partial, none)
}
