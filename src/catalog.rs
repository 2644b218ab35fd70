//! Expense and income categories offered when entering transactions.
//!
//! The catalog is separate from stored data: transactions embed a copy of
//! their category, so renaming or removing a category here leaves existing
//! records as they were written.

use crate::error::{Result, StoreError};
use crate::types::Category;
use crate::view::{ListenerId, Observable};
use std::sync::Arc;
use tracing::debug;

/// Categories a fresh catalog starts with, as `(name, icon)`.
pub const DEFAULT_CATEGORIES: [(&str, &str); 11] = [
    ("Alimentation", "shopping_cart"),
    ("Services publics", "flash_on"),
    ("Transport", "directions_car"),
    ("Santé", "local_hospital"),
    ("Divertissement", "movie"),
    ("Restauration", "restaurant"),
    ("Éducation", "school"),
    ("Soins personnels", "spa"),
    ("Vêtements", "checkroom"),
    ("Logement", "home"),
    ("Autre", "more_horiz"),
];

/// Glyph shown for a symbolic icon name. Unknown icons get a folder.
pub fn icon_glyph(icon: &str) -> &'static str {
    match icon {
        "shopping_cart" => "🛒",
        "flash_on" => "⚡",
        "directions_car" => "🚗",
        "local_hospital" => "🏥",
        "movie" => "🎬",
        "restaurant" => "🍽️",
        "school" => "🎓",
        "spa" => "💆",
        "checkroom" => "👕",
        "home" => "🏠",
        "more_horiz" => "⋯",
        _ => "📁",
    }
}

/// Observable list of categories, unique by name.
#[derive(Debug)]
pub struct CategoryCatalog {
    categories: Observable<Vec<Category>>,
}

impl CategoryCatalog {
    /// Catalog seeded with [`DEFAULT_CATEGORIES`].
    pub fn new() -> Self {
        Self::with_categories(
            DEFAULT_CATEGORIES
                .iter()
                .map(|(name, icon)| Category::new(*name, *icon))
                .collect(),
        )
    }

    pub fn with_categories(categories: Vec<Category>) -> Self {
        Self {
            categories: Observable::new(categories),
        }
    }

    pub fn categories(&self) -> Arc<Vec<Category>> {
        self.categories.get()
    }

    pub fn get(&self, name: &str) -> Option<Category> {
        self.categories.get().iter().find(|c| c.name == name).cloned()
    }

    /// Append a category. Fails with `CategoryExists` if the name is taken.
    pub fn add(&self, category: Category) -> Result<()> {
        let name = category.name.clone();
        let added = self.categories.try_update(|current| {
            if current.iter().any(|c| c.name == category.name) {
                return None;
            }
            let mut next = current.clone();
            next.push(category);
            Some(next)
        });

        if !added {
            return Err(StoreError::CategoryExists(name));
        }
        debug!(category = %name, "Added category");
        Ok(())
    }

    /// Replace the category named `original_name`, keeping its position.
    ///
    /// Returns false if there is no such category, and `CategoryExists` if
    /// the new name belongs to another category.
    pub fn update(&self, original_name: &str, category: Category) -> Result<bool> {
        let mut conflict = false;
        let updated = self.categories.try_update(|current| {
            let position = current.iter().position(|c| c.name == original_name)?;
            if category.name != original_name && current.iter().any(|c| c.name == category.name) {
                conflict = true;
                return None;
            }
            let mut next = current.clone();
            next[position] = category.clone();
            Some(next)
        });

        if conflict {
            return Err(StoreError::CategoryExists(category.name));
        }
        if updated {
            debug!(from = original_name, to = %category.name, "Updated category");
        }
        Ok(updated)
    }

    /// Returns false if there is no such category.
    pub fn remove(&self, name: &str) -> bool {
        self.categories.try_update(|current| {
            current
                .iter()
                .any(|c| c.name == name)
                .then(|| current.iter().filter(|c| c.name != name).cloned().collect())
        })
    }

    pub fn subscribe(&self, listener: impl Fn(&[Category]) + Send + Sync + 'static) -> ListenerId {
        self.categories
            .subscribe(move |categories: &Vec<Category>| listener(categories.as_slice()))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.categories.unsubscribe(id)
    }
}

impl Default for CategoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}
