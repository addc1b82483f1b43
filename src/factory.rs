//! API factory and registration system.

use crate::native::CredentialApi;
use crate::{Config, CredStoreError, CredentialManager, Result};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Factory function type for creating credential APIs.
pub type ApiFactory = fn(&Config) -> Result<Arc<dyn CredentialApi>>;

static API_REGISTRY: OnceLock<RwLock<HashMap<String, ApiFactory>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, ApiFactory>> {
    API_REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers a credential API factory.
///
/// Built-in APIs are registered by [`crate::init`]. Registering a name
/// twice replaces the earlier factory.
///
/// # Example
///
/// ```
/// use credstore::factory::register_api;
/// use credstore::native::{CredentialApi, MockCredentialApi};
/// use credstore::{Config, Result};
/// use std::sync::Arc;
///
/// fn seeded(_config: &Config) -> Result<Arc<dyn CredentialApi>> {
///     Ok(Arc::new(MockCredentialApi::new()))
/// }
///
/// register_api("seeded", seeded);
/// ```
pub fn register_api(name: &str, factory: ApiFactory) {
    let mut reg = registry().write().unwrap_or_else(PoisonError::into_inner);
    reg.insert(name.to_string(), factory);
}

/// Creates a credential API from configuration.
///
/// # Errors
///
/// Returns an error if the API is not registered (missing feature flag) or
/// its factory fails, e.g. the Win32 API on a non-Windows host.
pub fn new_api(config: &Config) -> Result<Arc<dyn CredentialApi>> {
    crate::init();
    let api_name = config.api.to_string();

    let factory = {
        let reg = registry().read().unwrap_or_else(PoisonError::into_inner);
        reg.get(&api_name).copied().ok_or_else(|| {
            CredStoreError::Other(anyhow::anyhow!(
                "unknown credential API: {} (did you enable the '{}' feature flag?)",
                api_name,
                api_name
            ))
        })?
    };

    factory(config)
}

/// Creates a credential manager from configuration.
///
/// # Example
///
/// ```
/// use credstore::{factory, ApiType, Config, CredentialType};
///
/// let manager = factory::new_manager(Config::new(ApiType::Mock))?;
/// assert!(manager.find("svc@host", CredentialType::Generic)?.is_none());
/// # Ok::<(), credstore::CredStoreError>(())
/// ```
pub fn new_manager(config: Config) -> Result<CredentialManager> {
    let api = new_api(&config)?;
    tracing::debug!(api = %config.api, "creating credential manager");

    Ok(CredentialManager::new(api)
        .with_default_type(config.default_type)
        .with_default_persistence(config.default_persistence))
}
