use std::{sync::OnceLock, time::Duration};

use tracing::debug;

use crate::Result;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the client shared by the poller and the uploader.
///
/// Both timeouts bound every call, so a scheduler tick always returns.
pub fn build_client(connect_timeout: Duration, request_timeout: Duration) -> Result<reqwest::Client> {
    install_rustls_provider();

    let client = reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .user_agent(concat!("codewatch-agent/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
