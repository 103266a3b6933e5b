pub mod app;
pub mod error;
pub mod id;
pub mod page;
pub mod relation;
pub mod scope;
pub mod time;

pub use app::{App, AppStatus, AppUpdate, DelFlag};
pub use error::CoreError;
pub use id::{DEFAULT_ID_LENGTH, generate_id, validate_id};
pub use page::{Page, PageRequest};
pub use relation::AdminRelation;
pub use scope::{AppScope, ScopeType};
pub use time::{now_unix, unix_after_days};
