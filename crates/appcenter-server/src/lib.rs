pub mod cache;
pub mod clients;
pub mod config;
pub mod handlers;
pub mod membership;
pub mod metrics;
pub mod observability;
pub mod provision;
pub mod server;
pub mod service;

pub use cache::{MembershipStores, create_membership_stores};
pub use config::{AppConfig, MembershipConfig, RedisConfig, ServerConfig};
pub use membership::{MembershipError, MembershipService};
pub use observability::init_tracing;
pub use server::{AppCenterServer, AppState, ServerBuilder, build_app, build_state};
pub use service::{AppService, ServiceError};
