//! Land-holding classes by total area in hectares.

use std::fmt;

/// Land-holding class. Ranges are half-open and partition `[0, ∞)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// `[0, 1)`
    Marginal,
    /// `[1, 2)`
    Small,
    /// `[2, 4)`
    SemiMedium,
    /// `[4, 10)`
    Medium,
    /// `[10, ∞)`
    Large,
}

impl Category {
    /// All classes in ascending order.
    pub const ALL: [Category; 5] = [
        Category::Marginal,
        Category::Small,
        Category::SemiMedium,
        Category::Medium,
        Category::Large,
    ];

    /// Inclusive lower and exclusive upper bound in hectares.
    #[must_use]
    pub fn bounds(self) -> (f64, f64) {
        match self {
            Category::Marginal => (0.0, 1.0),
            Category::Small => (1.0, 2.0),
            Category::SemiMedium => (2.0, 4.0),
            Category::Medium => (4.0, 10.0),
            Category::Large => (10.0, f64::INFINITY),
        }
    }

    /// Column label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Category::Marginal => "Marginal",
            Category::Small => "Small",
            Category::SemiMedium => "Semi-medium",
            Category::Medium => "Medium",
            Category::Large => "Large",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Class of an area, or `None` for negative and NaN values.
#[must_use]
pub fn categorize(area: f64) -> Option<Category> {
    Category::ALL.into_iter().find(|category| {
        let (low, high) = category.bounds();
        low <= area && area < high
    })
}

/// Area sum and parcel count per class.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BucketTotals {
    sums: [f64; 5],
    counts: [usize; 5],
}

impl BucketTotals {
    /// Count `area` in its class. Returns `false` if it falls in none.
    pub fn add(&mut self, area: f64) -> bool {
        match categorize(area) {
            Some(category) => {
                self.sums[category.slot()] += area;
                self.counts[category.slot()] += 1;
                true
            }
            None => false,
        }
    }

    /// Summed area of a class.
    #[must_use]
    pub fn sum(&self, category: Category) -> f64 {
        self.sums[category.slot()]
    }

    /// Parcel count of a class.
    #[must_use]
    pub fn count(&self, category: Category) -> usize {
        self.counts[category.slot()]
    }
}
