// nimbus-api: Async Rust client for the ActronAir Nimbus cloud API

pub mod client;
pub mod error;
pub mod models;
pub mod session;
pub mod stream;
pub mod transport;

pub use client::{CONTINUOUS_FAN_SUFFIX, ClientConfig, DEFAULT_BASE_URL, NimbusClient};
pub use error::Error;
pub use models::{
    AcSystem, ChangeEvent, EventMode, EventPage, PairingRequest, SettingsCommand, StatusSnapshot,
};
pub use session::{AccessToken, TOKEN_LEEWAY, TokenManager};
pub use stream::EventStream;
pub use transport::{
    ApiRequest, ApiResponse, RequestExecutor, RetryPolicy, TransportConfig, retry_with_backoff,
};
