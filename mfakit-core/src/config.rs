/// Client configuration.
///
/// An [`MfaClient`](crate::MfaClient) is bound to one configuration at
/// construction; there is no ambient global. The base-URL overrides exist
/// for tests and on-premise deployments and bypass the shard/tenant host
/// rewriting when set.
#[derive(Debug, Clone)]
pub struct MfaConfig {
    /// Provider apex domain used for shard and tenant host rewriting.
    pub provider_domain: String,
    /// Fixed base URL for the provider (shard-routed) API. Disables shard
    /// routing when set.
    pub provider_api_override: Option<String>,
    /// Fixed base URL for the tenant (subdomain-routed) API. Disables
    /// tenant host rewriting when set.
    pub tenant_api_override: Option<String>,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            provider_domain: "onelogin.com".to_string(),
            provider_api_override: None,
            tenant_api_override: None,
        }
    }
}

impl MfaConfig {
    /// Product user-agent attached to every outgoing request.
    #[must_use]
    pub fn user_agent() -> String {
        format!("mfakit-core/{}", env!("CARGO_PKG_VERSION"))
    }
}
