//! Public client facade.
//!
//! Every operation spawns its own tokio task and registers the task's
//! abort handle. [`MfaClient::cancel`] aborts everything still in
//! flight; a caller awaiting a cancelled operation gets
//! [`MfaError::Cancelled`] instead of a result. Operations are not
//! serialized against each other; concurrent calls race at the store's
//! consistency boundary.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::AbortHandle;
use tracing::{debug, error};

use crate::config::MfaConfig;
use crate::device::DeviceRegistrar;
use crate::error::MfaError;
use crate::manager::FactorManager;
use crate::net::{Gateway, ProviderApi};
use crate::vault::{KeyProvider, OsKeychainProvider, SeedVault};
use crate::web_login::WebLoginFlow;
use mfakit_store::{Factor, FactorStore};

/// Issuer tag on factors the refresh reconciliation applies to.
const PROVIDER_ISSUER: &str = "OneLogin";

/// Result of one refresh pass over the provider-native factors.
#[derive(Debug, Default, Clone)]
pub struct RefreshOutcome {
    /// Factors the server no longer recognizes, removed locally.
    pub unpaired_factors: Vec<Factor>,
    /// Number of removed factors.
    pub unpaired_count: usize,
    /// Factors whose policy settings drifted and were rewritten.
    pub updated_factors: Vec<Factor>,
    /// Number of rewritten factors.
    pub updated_count: usize,
}

/// Handle to one configured MFA engine.
///
/// Cheap to clone; clones share the store, vault, and task registry.
#[derive(Clone)]
pub struct MfaClient {
    manager: Arc<FactorManager>,
    registrar: DeviceRegistrar,
    tasks: Arc<Mutex<Vec<AbortHandle>>>,
}

impl MfaClient {
    /// Opens or creates the factor database at `db_path` and wires up a
    /// client using the OS keychain for the vault key.
    ///
    /// # Errors
    /// Store failures opening the database.
    pub fn new(config: MfaConfig, db_path: impl AsRef<Path>) -> Result<Self, MfaError> {
        let store = Arc::new(FactorStore::open(db_path)?);
        Ok(Self::with_key_provider(
            config,
            store,
            Box::new(OsKeychainProvider::default()),
        ))
    }

    /// Wires up a client over an already-open store and a caller-chosen
    /// vault key provider.
    #[must_use]
    pub fn with_key_provider(
        config: MfaConfig,
        store: Arc<FactorStore>,
        key_provider: Box<dyn KeyProvider>,
    ) -> Self {
        let vault = Arc::new(SeedVault::new(key_provider, Arc::clone(&store)));
        let gateway = Gateway::new();
        let registrar = DeviceRegistrar::new(ProviderApi::new(gateway.clone(), &config));
        let web_login = WebLoginFlow::new(gateway, config);
        let manager = Arc::new(FactorManager::new(
            store,
            vault,
            registrar.clone(),
            web_login,
        ));
        Self {
            manager,
            registrar,
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Registers a factor from a scanned or manually entered code.
    ///
    /// # Errors
    /// [`MfaError::InvalidInput`] for a blank or malformed code or an
    /// unsupported algorithm; network errors from the registration
    /// handshake; [`MfaError::DataIntegrity`] when the seed cannot be
    /// encrypted; [`MfaError::Cancelled`] when aborted.
    pub async fn register_factor(&self, registration_code: &str) -> Result<i64, MfaError> {
        let manager = Arc::clone(&self.manager);
        let registration_code = registration_code.to_string();
        self.run(async move { manager.register_factor(&registration_code).await })
            .await
    }

    /// Registers a provider-native factor through the tenant web login.
    ///
    /// # Errors
    /// Everything [`register_factor`](Self::register_factor) returns,
    /// plus the web-login handshake's own step failures.
    pub async fn register_factor_by_web_login(
        &self,
        subdomain: &str,
        username: &str,
        password: &str,
    ) -> Result<i64, MfaError> {
        let manager = Arc::clone(&self.manager);
        let (subdomain, username, password) = (
            subdomain.to_string(),
            username.to_string(),
            password.to_string(),
        );
        self.run(async move {
            manager
                .register_factor_by_web_login(&subdomain, &username, &password)
                .await
        })
        .await
    }

    /// All stored factors, decrypted, in display order.
    ///
    /// # Errors
    /// Store failures, or [`MfaError::Cancelled`].
    pub async fn get_factors(&self) -> Result<Vec<Factor>, MfaError> {
        let manager = Arc::clone(&self.manager);
        self.run(async move { manager.get_factors() }).await
    }

    /// One factor by row id.
    ///
    /// # Errors
    /// Store failures, or [`MfaError::Cancelled`].
    pub async fn get_factor_by_id(&self, id: i64) -> Result<Option<Factor>, MfaError> {
        let manager = Arc::clone(&self.manager);
        self.run(async move { manager.get_factor_by_id(id) }).await
    }

    /// One factor by remote credential id.
    ///
    /// # Errors
    /// Store failures, or [`MfaError::Cancelled`].
    pub async fn get_factor_by_credential_id(
        &self,
        credential_id: &str,
    ) -> Result<Option<Factor>, MfaError> {
        let manager = Arc::clone(&self.manager);
        let credential_id = credential_id.to_string();
        self.run(async move { manager.get_factor_by_credential_id(&credential_id) })
            .await
    }

    /// Removes one factor, returning the number of deleted rows.
    ///
    /// # Errors
    /// Store failures, or [`MfaError::Cancelled`].
    pub async fn remove_factor(&self, factor: Factor) -> Result<usize, MfaError> {
        let manager = Arc::clone(&self.manager);
        self.run(async move { manager.remove_factor(&factor) }).await
    }

    /// Removes every stored factor.
    ///
    /// # Errors
    /// Store failures, or [`MfaError::Cancelled`].
    pub async fn remove_all_factors(&self) -> Result<usize, MfaError> {
        let manager = Arc::clone(&self.manager);
        self.run(async move { manager.remove_all_factors() }).await
    }

    /// Removes one factor by row id.
    ///
    /// # Errors
    /// Store failures, or [`MfaError::Cancelled`].
    pub async fn remove_factor_by_id(&self, id: i64) -> Result<usize, MfaError> {
        let manager = Arc::clone(&self.manager);
        self.run(async move { manager.remove_factor_by_id(id) }).await
    }

    /// Removes one factor by remote credential id.
    ///
    /// # Errors
    /// Store failures, or [`MfaError::Cancelled`].
    pub async fn remove_factor_by_credential_id(
        &self,
        credential_id: &str,
    ) -> Result<usize, MfaError> {
        let manager = Arc::clone(&self.manager);
        let credential_id = credential_id.to_string();
        self.run(async move { manager.remove_factor_by_credential_id(&credential_id) })
            .await
    }

    /// Reconciles every provider-native factor against the server.
    ///
    /// Factors the server reports unpaired (or fails) are removed
    /// locally; factors whose policy settings drifted are rewritten with
    /// the server's values. Both buckets come back in the outcome.
    ///
    /// # Errors
    /// The first network or store failure aborts the pass.
    pub async fn refresh_factors(&self) -> Result<RefreshOutcome, MfaError> {
        let manager = Arc::clone(&self.manager);
        let registrar = self.registrar.clone();
        self.run(async move { refresh(&manager, &registrar).await })
            .await
    }

    /// Aborts every operation still in flight. Callers awaiting an
    /// aborted operation get [`MfaError::Cancelled`]; already-completed
    /// operations are unaffected.
    pub fn cancel(&self) {
        let mut tasks = self.lock_tasks();
        debug!(pending = tasks.len(), "cancelling outstanding tasks");
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    async fn run<T, F>(&self, operation: F) -> Result<T, MfaError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, MfaError>> + Send + 'static,
    {
        // Spawn under the registry lock so a concurrent `cancel` cannot
        // slip between the spawn and the handle registration.
        let handle = {
            let mut tasks = self.lock_tasks();
            tasks.retain(|task| !task.is_finished());
            let handle = tokio::spawn(operation);
            tasks.push(handle.abort_handle());
            handle
        };
        match handle.await {
            Ok(result) => result,
            Err(join_error) if join_error.is_cancelled() => Err(MfaError::Cancelled),
            Err(join_error) => {
                error!(error = %join_error, "operation task panicked");
                std::panic::resume_unwind(join_error.into_panic())
            }
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<AbortHandle>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn refresh(
    manager: &FactorManager,
    registrar: &DeviceRegistrar,
) -> Result<RefreshOutcome, MfaError> {
    let mut outcome = RefreshOutcome::default();

    for mut factor in manager.get_factors_by_issuer(PROVIDER_ISSUER)? {
        let response = registrar.check_device_settings(&factor).await?;

        if !response.success || response.unpaired {
            factor.paired = false;
            manager.remove_factor(&factor)?;
            outcome.unpaired_count += 1;
            outcome.unpaired_factors.push(factor);
            continue;
        }

        let settings = response.settings;
        // allow_root stores the inverted server flag, so equality is the
        // drift signal for that pair.
        let drifted = settings.disallow_jailbroken_or_rooted == factor.allow_root
            || settings.force_lock_protection != factor.force_lock
            || settings.biometric_verification != factor.require_biometrics;
        if drifted {
            factor.allow_root = !settings.disallow_jailbroken_or_rooted;
            factor.force_lock = settings.force_lock_protection;
            factor.require_biometrics = settings.biometric_verification;
            manager.update_factor(factor.clone())?;
            outcome.updated_count += 1;
            outcome.updated_factors.push(factor);
        }
    }

    debug!(
        unpaired = outcome.unpaired_count,
        updated = outcome.updated_count,
        "refreshed provider factors"
    );
    Ok(outcome)
}
