use std::collections::HashMap;
use std::sync::Arc;

use super::{Driver, DriverRef};
use crate::error::ArrowSqlError;
use crate::types::Dialect;

/// Explicit map from dialect to the driver that serves it.
///
/// Connections look their driver up here at construction time; nothing is loaded
/// dynamically. [`DriverRegistry::with_default_drivers`] registers the adapters compiled in
/// through the `sqlite` and `postgres` features; other dialects (Flight SQL) need a driver
/// registered by the caller.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<Dialect, DriverRef>,
}

impl DriverRegistry {
    /// A registry with no drivers.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with every bundled driver enabled in this build.
    #[must_use]
    pub fn with_default_drivers() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::empty();
        #[cfg(feature = "sqlite")]
        {
            registry = registry.with_driver(Arc::new(super::sqlite::SqliteDriver));
        }
        #[cfg(feature = "postgres")]
        {
            registry = registry.with_driver(Arc::new(super::postgres::PostgresDriver));
        }
        registry
    }

    /// Register `driver` for its dialect, replacing any previous one.
    #[must_use]
    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.register(driver);
        self
    }

    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        self.drivers.insert(driver.dialect(), driver);
    }

    /// Look up the driver for `dialect`.
    ///
    /// # Errors
    /// Returns `ArrowSqlError::DriverUnavailableError` if none is registered.
    pub fn driver_for(&self, dialect: Dialect) -> Result<DriverRef, ArrowSqlError> {
        self.drivers.get(&dialect).cloned().ok_or_else(|| {
            ArrowSqlError::DriverUnavailableError(format!(
                "no {dialect} driver is registered in this build"
            ))
        })
    }

    #[must_use]
    pub fn supports(&self, dialect: Dialect) -> bool {
        self.drivers.contains_key(&dialect)
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dialects: Vec<_> = self.drivers.keys().map(|d| d.name()).collect();
        dialects.sort_unstable();
        f.debug_struct("DriverRegistry")
            .field("dialects", &dialects)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_has_no_drivers() {
        let registry = DriverRegistry::empty();
        let err = registry.driver_for(Dialect::FlightSql).unwrap_err();
        assert!(matches!(err, ArrowSqlError::DriverUnavailableError(_)));
    }

    #[test]
    fn default_registry_follows_features() {
        let registry = DriverRegistry::with_default_drivers();
        assert_eq!(registry.supports(Dialect::Sqlite), cfg!(feature = "sqlite"));
        assert_eq!(registry.supports(Dialect::Postgres), cfg!(feature = "postgres"));
        assert!(!registry.supports(Dialect::FlightSql));
    }
}
