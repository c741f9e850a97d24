//! OIDC provider surface: wire types, token signing, the orchestrator, and
//! the error-to-response mapping.

mod error;
mod provider;
mod token;
mod types;

pub use error::OidcError;
pub use provider::{AuthorizeOutcome, OidcProvider};
pub use token::{TokenSigner, compute_at_hash, verify_pkce_s256};
pub use types::{AuthorizeRequest, ProviderMetadata, TokenRequest, TokenResponse};
