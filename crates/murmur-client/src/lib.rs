pub mod api;
pub mod error;
pub mod types;

pub use api::{ApiClient, VoiceApi, DEFAULT_BASE_URL};
pub use error::{ClientError, RequestFailure};
pub use types::{Role, Turn};
