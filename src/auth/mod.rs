//! Authentication and ownership authorization.
//!
//! # Request Flow
//! ```text
//! Authorization: Bearer <jwt>
//!     → authenticator.rs (token → claims → principal, required or optional)
//!     → ownership.rs (principal + {kind, id} → loader → owner comparison)
//!     → handler sees Principal / OwnedResource in request extensions
//! ```

pub mod authenticator;
pub mod ownership;
pub mod principal;
pub mod token;

pub use authenticator::{optional_auth, require_auth, Authenticator};
pub use ownership::{
    require_owner, OwnedResource, OwnershipAuthorizer, OwnershipGuard, RegistryError,
    ResourceLoader, StoreLoader,
};
pub use principal::{MaybePrincipal, Principal};
pub use token::{Claims, JwtCodec, TokenError, TokenVerifier};
