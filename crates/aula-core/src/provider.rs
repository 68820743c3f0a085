use crate::{Catalog, CoreError, RawSearchRecord};

pub trait CatalogProvider: Send + Sync {
    fn load_catalog(&self) -> Result<Catalog, CoreError>;
}

pub trait SearchHistoryProvider: Send + Sync {
    /// Returns raw history rows. `window_days` is a hint; callers still filter by age.
    fn load_history(&self, window_days: Option<u32>) -> Result<Vec<RawSearchRecord>, CoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    catalog: Catalog,
}

impl StaticCatalog {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }
}

impl CatalogProvider for StaticCatalog {
    fn load_catalog(&self) -> Result<Catalog, CoreError> {
        Ok(self.catalog.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticSearchHistory {
    records: Vec<RawSearchRecord>,
}

impl StaticSearchHistory {
    pub fn new(records: Vec<RawSearchRecord>) -> Self {
        Self { records }
    }
}

impl SearchHistoryProvider for StaticSearchHistory {
    fn load_history(&self, _window_days: Option<u32>) -> Result<Vec<RawSearchRecord>, CoreError> {
        Ok(self.records.clone())
    }
}
