use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::CoreError;

/// Sort direction for an [`Order`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

/// A single sort criterion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Property to sort on
    pub property: String,

    /// Sort direction
    #[serde(default)]
    pub direction: Direction,
}

impl Order {
    /// Ascending order on a property
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Asc,
        }
    }

    /// Descending order on a property
    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Desc,
        }
    }
}

/// Paging request: which slice of a result set to return, and in which order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pageable {
    /// Zero-based index of the first item
    pub start_index: usize,

    /// Maximum number of items in the page
    pub max_items: usize,

    /// Sort criteria, applied in sequence. Empty means insertion order.
    #[serde(default)]
    pub order: Vec<Order>,
}

impl Pageable {
    /// Page starting at `start_index` holding at most `max_items` items
    pub fn of(start_index: usize, max_items: usize) -> Self {
        Self {
            start_index,
            max_items,
            order: Vec::new(),
        }
    }

    /// Add a sort criterion
    pub fn with_order(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    /// Check the request against the configured maximum page size
    pub fn validate(&self, max_page_size: usize) -> Result<(), CoreError> {
        if self.max_items == 0 {
            return Err(CoreError::ValidationError(
                "Page size must be greater than zero".to_string(),
            ));
        }

        if self.max_items > max_page_size {
            return Err(CoreError::ValidationError(format!(
                "Page size {} exceeds the maximum of {}",
                self.max_items, max_page_size
            )));
        }

        Ok(())
    }
}

/// A read-only slice of a larger result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in this page, in result order
    pub content: Vec<T>,

    /// Number of items in the whole result set
    pub total_count: usize,

    /// Requested page size
    pub page_size: usize,

    /// Index of the first item of this page within the result set
    pub start_index: usize,
}

impl<T> Page<T> {
    /// Cut a page out of an already ordered result set
    pub fn from_ordered(items: Vec<T>, pageable: &Pageable) -> Self {
        let total_count = items.len();
        let content = items
            .into_iter()
            .skip(pageable.start_index)
            .take(pageable.max_items)
            .collect();

        Self {
            content,
            total_count,
            page_size: pageable.max_items,
            start_index: pageable.start_index,
        }
    }

    /// Number of items in this page
    #[inline]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether this page holds no items
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Whether more items exist after this page
    pub fn has_more(&self) -> bool {
        self.start_index + self.content.len() < self.total_count
    }

    /// Transform the items of this page, keeping the paging information
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            total_count: self.total_count,
            page_size: self.page_size,
            start_index: self.start_index,
        }
    }
}

/// Comparable value extracted from an item for sorting
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    /// Integer property
    Int(i64),
    /// Text property
    Text(String),
    /// Timestamp property
    Time(DateTime<Utc>),
}

/// Items that can be ordered by named properties
pub trait Sortable {
    /// Whether `property` names a sortable property of this type
    fn is_sortable_by(property: &str) -> bool;

    /// Value of `property` for this item. `None` sorts before any value.
    fn sort_key(&self, property: &str) -> Option<SortKey>;
}

/// Stable sort of `items` by the pageable's order. Ties, and an empty order,
/// keep the incoming (insertion) order.
pub fn apply_order<T: Sortable>(items: &mut [T], order: &[Order]) -> Result<(), CoreError> {
    if let Some(unknown) = order.iter().find(|o| !T::is_sortable_by(&o.property)) {
        return Err(CoreError::ValidationError(format!(
            "Unsupported sort property: {}",
            unknown.property
        )));
    }

    if order.is_empty() {
        return Ok(());
    }

    items.sort_by(|a, b| {
        for criterion in order {
            let ordering = a
                .sort_key(&criterion.property)
                .cmp(&b.sort_key(&criterion.property));
            let ordering = match criterion.direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    Ok(())
}
