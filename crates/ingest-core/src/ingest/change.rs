/// Whether the playlist points at a chunklist we have not processed yet.
///
/// Only the chunklist name is compared; an unchanged name says nothing about
/// whether the chunklist body itself changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Changed,
    Unchanged,
}

pub fn detect(new_reference: &str, previous: Option<&str>) -> Change {
    match previous {
        Some(prev) if prev == new_reference => Change::Unchanged,
        _ => Change::Changed,
    }
}
