//! Authentication-related types and data structures
//!
//! This module defines the request, result and failure types shared by the
//! acquisition engine, the account resolver and provider implementations.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use signet_common::auth_constants::{
    DEFAULT_CALLBACK_TIMEOUT_SECS, DEFAULT_INSTANCE, DEFAULT_REDIRECT_URI,
};
use std::fmt;
use std::str::FromStr;

/// Result type for caller-facing authentication operations
pub type AuthResult<T> = Result<T, ClassifiedFailure>;

/// Result type for identity provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Machine-readable error codes the classifier and providers agree on
pub mod codes {
    /// The user closed the sign-in window or the caller cancelled
    pub const AUTHENTICATION_CANCELED: &str = "authentication_canceled";
    /// The cached credential cannot be used without the user
    pub const INTERACTION_REQUIRED: &str = "interaction_required";
    /// The browser never came back to the loopback listener
    pub const AUTHENTICATION_TIMEOUT: &str = "authentication_timeout";
    /// The provider answered without an ID token so the account is unknown
    pub const MISSING_ID_TOKEN: &str = "missing_id_token";
    /// The provider client could not be constructed for an authority
    pub const PROVIDER_UNAVAILABLE: &str = "provider_unavailable";
}

/// Which identity population the authority accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Personal (consumer) accounts only
    #[serde(alias = "consumers")]
    Personal,
    /// Work or school accounts only
    #[serde(alias = "organizations")]
    Organizational,
    /// Either population
    #[default]
    #[serde(alias = "common")]
    Either,
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown account type '{0}'. Expected personal, organizational or either")]
pub struct AccountTypeError(String);

impl AccountType {
    /// Path segment appended to the instance URL to form the authority
    pub fn authority_suffix(&self) -> &'static str {
        match self {
            Self::Personal => "consumers",
            Self::Organizational => "organizations",
            Self::Either => "common",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Personal => "personal",
            Self::Organizational => "organizational",
            Self::Either => "either",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for AccountType {
    type Err = AccountTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "personal" | "consumers" | "consumer" => Ok(Self::Personal),
            "organizational" | "organizations" | "work" | "business" => Ok(Self::Organizational),
            "either" | "common" | "any" => Ok(Self::Either),
            _ => Err(AccountTypeError(s.to_string())),
        }
    }
}

/// Authority URL: base instance plus the account-type suffix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Authority {
    url: String,
    account_type: AccountType,
}

impl Authority {
    pub fn new(instance: &str, account_type: AccountType) -> Self {
        let base = instance.trim();
        let separator = if base.ends_with('/') { "" } else { "/" };
        Self {
            url: format!("{}{}{}", base, separator, account_type.authority_suffix()),
            account_type,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    /// OAuth 2.0 v2 authorization endpoint under this authority
    pub fn authorize_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/authorize", self.url)
    }

    /// OAuth 2.0 v2 token endpoint under this authority
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.url)
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Error type for scope set validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopesError {
    #[error("At least one scope is required")]
    Empty,
    #[error("Scopes must not be blank")]
    Blank,
}

/// A validated, non-empty, ordered set of scope strings
///
/// Duplicates are dropped while keeping the first occurrence, so the order
/// the caller asked for is the order sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Scopes(Vec<String>);

impl Scopes {
    pub fn new<I, S>(scopes: I) -> Result<Self, ScopesError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered: Vec<String> = Vec::new();
        for scope in scopes {
            let scope = scope.as_ref().trim();
            if scope.is_empty() {
                return Err(ScopesError::Blank);
            }
            if !ordered.iter().any(|s| s == scope) {
                ordered.push(scope.to_string());
            }
        }

        if ordered.is_empty() {
            return Err(ScopesError::Empty);
        }

        Ok(Self(ordered))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Space-delimited form used in OAuth `scope` parameters
    pub fn joined(&self) -> String {
        self.0.join(" ")
    }
}

impl fmt::Display for Scopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.joined())
    }
}

impl FromStr for Scopes {
    type Err = ScopesError;

    /// Accepts space- or comma-separated scope lists
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(
            s.split(|c: char| c == ',' || c.is_whitespace())
                .filter(|part| !part.is_empty()),
        )
    }
}

impl TryFrom<Vec<String>> for Scopes {
    type Error = ScopesError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Scopes> for Vec<String> {
    fn from(scopes: Scopes) -> Self {
        scopes.0
    }
}

/// An identity the provider's token cache knows about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable username, matched against the remembered identifier
    pub username: String,
    /// Opaque provider-internal handle
    pub home_account_id: String,
}

impl Account {
    pub fn new(username: impl Into<String>, home_account_id: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            home_account_id: home_account_id.into(),
        }
    }
}

/// What a provider hands back from a successful silent or interactive attempt
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticationResult {
    pub access_token: String,
    pub expires_on: DateTime<Utc>,
    pub account: Account,
}

impl fmt::Debug for AuthenticationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationResult")
            .field("access_token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .field("account", &self.account)
            .finish()
    }
}

/// Bearer token returned to callers
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub expires_on: DateTime<Utc>,
    /// Username the token was issued to, when known
    pub username: Option<String>,
}

impl Token {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_on
    }

    /// Check if the token expires within the given duration
    pub fn expires_within(&self, duration: Duration) -> bool {
        Utc::now() + duration >= self.expires_on
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.expires_on.signed_duration_since(Utc::now())
    }

    /// Value for an `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .field("username", &self.username)
            .finish()
    }
}

/// Closed taxonomy of acquisition failures surfaced to callers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifiedFailure {
    /// Cached credentials need the user; absorbed by the engine
    #[error("User interaction required")]
    InteractionRequired,

    /// Neither attempt produced a result and nothing was raised
    #[error("Cannot authenticate")]
    CannotAuthenticate,

    /// The identity provider backend rejected the request
    #[error("Identity provider rejected the request: {code}")]
    ProviderServiceError { code: String },

    /// The request was malformed on the client side (e.g. bad redirect URI)
    #[error("Identity provider client error: {code}")]
    ProviderClientError { code: String },

    /// The provider claimed success but returned no usable token
    #[error("Identity provider returned no usable token")]
    ProviderContractViolation,

    /// The user or caller aborted the interactive step
    #[error("Authentication cancelled")]
    Cancelled,

    /// Unclassified provider failure
    #[error("Identity provider error: {code}")]
    ProviderError { code: String },
}

impl ClassifiedFailure {
    /// Original provider code, when the classification carries one
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::ProviderServiceError { code }
            | Self::ProviderClientError { code }
            | Self::ProviderError { code } => Some(code),
            _ => None,
        }
    }

    /// Whether this failure should bias the next call toward interactive
    /// sign-in
    pub fn demotes_silent(&self) -> bool {
        matches!(
            self,
            Self::ProviderServiceError { .. } | Self::ProviderClientError { .. }
        )
    }
}

/// Error conditions raised by an identity provider client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Cached refresh material is expired, revoked or needs the user
    #[error("Interaction required ({code})")]
    InteractionRequired { code: String },

    /// The provider backend rejected the request
    #[error("Service error {code}: {message}")]
    Service { code: String, message: String },

    /// The request could not be built or sent
    #[error("Client error {code}: {message}")]
    Client { code: String, message: String },

    /// Anything else the provider raised
    #[error("Provider error {code}: {message}")]
    Other { code: String, message: String },
}

impl ProviderError {
    pub fn interaction_required(code: impl Into<String>) -> Self {
        Self::InteractionRequired { code: code.into() }
    }

    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn client(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Client {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn other(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Other {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Machine-readable discriminant
    pub fn code(&self) -> &str {
        match self {
            Self::InteractionRequired { code }
            | Self::Service { code, .. }
            | Self::Client { code, .. }
            | Self::Other { code, .. } => code,
        }
    }
}

/// Identity provider client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Application (client) ID registered with the identity platform
    pub client_id: String,
    /// Base instance URL; the account-type suffix is appended per call
    pub instance: String,
    /// Loopback redirect URI registered for the public client
    pub redirect_uri: String,
    /// How long to wait for the browser to return, in seconds
    pub callback_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            instance: DEFAULT_INSTANCE.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            callback_timeout_secs: DEFAULT_CALLBACK_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderConfigError {
    #[error("Client ID is required")]
    MissingClientId,

    #[error("Invalid {field}: {reason}")]
    InvalidUrl { field: &'static str, reason: String },

    #[error("Callback timeout must be greater than zero")]
    ZeroTimeout,
}

impl ProviderConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn with_callback_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.callback_timeout_secs = timeout.as_secs();
        self
    }

    pub fn callback_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.callback_timeout_secs)
    }

    pub fn authority(&self, account_type: AccountType) -> Authority {
        Authority::new(&self.instance, account_type)
    }

    /// Validate the configuration before a provider is built from it
    pub fn validate(&self) -> Result<(), ProviderConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ProviderConfigError::MissingClientId);
        }

        let instance = url::Url::parse(&self.instance).map_err(|e| {
            ProviderConfigError::InvalidUrl {
                field: "instance",
                reason: e.to_string(),
            }
        })?;
        if !matches!(instance.scheme(), "http" | "https") {
            return Err(ProviderConfigError::InvalidUrl {
                field: "instance",
                reason: format!("unsupported scheme '{}'", instance.scheme()),
            });
        }

        let redirect = url::Url::parse(&self.redirect_uri).map_err(|e| {
            ProviderConfigError::InvalidUrl {
                field: "redirect_uri",
                reason: e.to_string(),
            }
        })?;
        if redirect.scheme() != "http" || redirect.port_or_known_default().is_none() {
            return Err(ProviderConfigError::InvalidUrl {
                field: "redirect_uri",
                reason: "must be an http loopback URI with a port".to_string(),
            });
        }

        if self.callback_timeout_secs == 0 {
            return Err(ProviderConfigError::ZeroTimeout);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authority_appends_suffix() {
        let authority = Authority::new("https://login.example.com/", AccountType::Personal);
        assert_eq!(authority.as_str(), "https://login.example.com/consumers");

        let authority = Authority::new("https://login.example.com", AccountType::Organizational);
        assert_eq!(authority.as_str(), "https://login.example.com/organizations");
        assert_eq!(
            authority.token_endpoint(),
            "https://login.example.com/organizations/oauth2/v2.0/token"
        );

        let authority = Authority::new("https://login.example.com/", AccountType::Either);
        assert_eq!(authority.to_string(), "https://login.example.com/common");
    }

    #[test]
    fn test_account_type_parsing() {
        assert_eq!("personal".parse::<AccountType>().unwrap(), AccountType::Personal);
        assert_eq!("consumers".parse::<AccountType>().unwrap(), AccountType::Personal);
        assert_eq!(
            "Organizations".parse::<AccountType>().unwrap(),
            AccountType::Organizational
        );
        assert_eq!("common".parse::<AccountType>().unwrap(), AccountType::Either);
        assert!("tenant".parse::<AccountType>().is_err());
        assert_eq!(AccountType::default(), AccountType::Either);
    }

    #[test]
    fn test_scopes_keep_order_and_drop_duplicates() {
        let scopes = Scopes::new(["User.Read", "Mail.Read", "User.Read"]).unwrap();
        assert_eq!(scopes.as_slice(), &["User.Read", "Mail.Read"]);
        assert_eq!(scopes.joined(), "User.Read Mail.Read");
    }

    #[test]
    fn test_scopes_reject_empty_and_blank() {
        let none: [&str; 0] = [];
        assert_eq!(Scopes::new(none), Err(ScopesError::Empty));
        assert_eq!(Scopes::new(["User.Read", "  "]), Err(ScopesError::Blank));
        assert_eq!("".parse::<Scopes>(), Err(ScopesError::Empty));
    }

    #[test]
    fn test_scopes_from_str_accepts_commas_and_spaces() {
        let scopes: Scopes = "User.Read, Mail.Send  Calendars.Read".parse().unwrap();
        assert_eq!(scopes.len(), 3);
        assert_eq!(scopes.iter().last(), Some("Calendars.Read"));
    }

    #[test]
    fn test_scopes_deserialize_validates() {
        let scopes: Scopes = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(scopes.len(), 2);
        assert!(serde_json::from_str::<Scopes>("[]").is_err());
    }

    #[test]
    fn test_failure_codes_and_demotion() {
        let service = ClassifiedFailure::ProviderServiceError {
            code: "invalid_client".to_string(),
        };
        assert_eq!(service.code(), Some("invalid_client"));
        assert!(service.demotes_silent());

        assert!(!ClassifiedFailure::Cancelled.demotes_silent());
        assert!(!ClassifiedFailure::ProviderError {
            code: "unknown".to_string()
        }
        .demotes_silent());
        assert_eq!(ClassifiedFailure::CannotAuthenticate.code(), None);
    }

    #[test]
    fn test_token_debug_redacts_secret() {
        let token = Token {
            access_token: "secret-value".to_string(),
            expires_on: Utc::now() + Duration::hours(1),
            username: Some("ada@example.com".to_string()),
        };
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("secret-value"));
        assert!(rendered.contains("ada@example.com"));
        assert_eq!(token.bearer(), "Bearer secret-value");
        assert!(!token.is_expired());
        assert!(token.expires_within(Duration::hours(2)));
    }

    #[test]
    fn test_provider_config_validation() {
        assert_eq!(
            ProviderConfig::default().validate(),
            Err(ProviderConfigError::MissingClientId)
        );

        let config = ProviderConfig::new("client-123");
        assert!(config.validate().is_ok());

        let bad_instance = ProviderConfig::new("client-123").with_instance("not a url");
        assert!(matches!(
            bad_instance.validate(),
            Err(ProviderConfigError::InvalidUrl { field: "instance", .. })
        ));

        let bad_redirect =
            ProviderConfig::new("client-123").with_redirect_uri("ms-app://callback");
        assert!(matches!(
            bad_redirect.validate(),
            Err(ProviderConfigError::InvalidUrl { field: "redirect_uri", .. })
        ));

        let zero = ProviderConfig::new("client-123")
            .with_callback_timeout(std::time::Duration::from_secs(0));
        assert_eq!(zero.validate(), Err(ProviderConfigError::ZeroTimeout));
    }
}
