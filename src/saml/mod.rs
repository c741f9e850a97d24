//! SAML exchange with the upstream identity providers.
//!
//! One `SamlIdentityProvider` per configured IdP. The front channel issues
//! AuthnRequests over the POST or Redirect binding (or points at the local
//! mock IdP); the back channel trades the returned artifact for the signed
//! assertion over SOAP.

mod mock;
mod provider;

pub use mock::{decode_mock_artifact, encode_mock_artifact};
pub use provider::{AuthnRequestEnvelope, ResolvedIdentity, SamlIdentityProvider};

#[derive(Debug, thiserror::Error)]
pub enum SamlError {
    /// Delegated authorization was requested against a provider that does
    /// not permit scoping attributes.
    #[error("scoping attributes are not allowed for this identity provider")]
    ScopingAttributesNotAllowed,

    /// The upstream response could not be validated. The detail is logged,
    /// never returned to the caller.
    #[error("artifact could not be resolved to a valid assertion")]
    Unauthorized,

    /// The back channel to the identity provider failed at the transport
    /// level.
    #[error("identity provider unreachable: {0}")]
    ProviderUnreachable(String),

    #[error("saml provider error: {0}")]
    Internal(String),
}
