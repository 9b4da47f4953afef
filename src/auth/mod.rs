//! Authentication and identity enforcement module

pub mod gateway;
pub mod grpc;
pub mod identity;
pub mod jwt;
pub mod middleware;
pub mod password;

pub use grpc::{ExemptMethods, GrpcIdentityInterceptor, GrpcIdentityLayer, UserIdExt};
pub use identity::{IdentityError, UserId};
pub use jwt::{Claims, TokenError, TokenManager};
pub use middleware::identity_middleware;
pub use password::{validate_password_policy, CredentialError, PasswordHasher};
