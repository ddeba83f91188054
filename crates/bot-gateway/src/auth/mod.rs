//! Identity verification: bearer credentials resolved to principals.

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod principal;

pub use jwt::{AuthError, Claims, IdentityVerifier, IssuedToken, TokenIssuer};
pub use middleware::require_principal;
pub use password::PasswordService;
pub use principal::{DirectoryError, InMemoryDirectory, Principal, PrincipalDirectory};
