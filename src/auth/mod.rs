//! Identity verification: credential transport, verification and the gate.

mod claims;
mod cookie;
mod gate;
mod jwt;
mod verifier;

pub use claims::AccessClaims;
pub use cookie::{session_cookie, CookieCredential, CredentialLookup, ACCESS_TOKEN_COOKIE};
pub use gate::{AuthRejection, AuthenticationGate, Caller, DEFAULT_VERIFY_TIMEOUT};
pub use jwt::{JwtVerifier, TokenIssuer, DEFAULT_TOKEN_TTL};
pub use verifier::{CredentialError, CredentialVerifier};
