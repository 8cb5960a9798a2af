/// Direction of a key-ordered traversal.
///
/// # Examples
///
/// ```rust
/// use entity_index::common::SortOrder;
///
/// assert_eq!(SortOrder::Ascending.reverse(), SortOrder::Descending);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest key first
    Ascending,
    /// Largest key first
    Descending,
}

impl SortOrder {
    pub fn reverse(self) -> SortOrder {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }
}
