use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::Client;

const MEDIA_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared client for attachment downloads. Falls back to a default client
/// if the tuned builder cannot be constructed.
static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(MEDIA_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("voice_relay_bot/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
});

pub fn get_http_client() -> &'static Client {
    &HTTP_CLIENT
}
