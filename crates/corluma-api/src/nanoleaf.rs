// Nanoleaf controller endpoints.

use url::Url;

use crate::address::http_base;
use crate::error::Error;

/// `http://<host>:<port>/api/v1/new`
pub fn credentials_url(host: &str, port: u16) -> Result<Url, Error> {
    Ok(Url::parse(&format!("{}/api/v1/new", http_base(host, port)))?)
}

/// `http://<host>:<port>/api/v1/<token>/`
pub fn state_url(host: &str, port: u16, token: &str) -> Result<Url, Error> {
    Ok(Url::parse(&format!(
        "{}/api/v1/{token}/",
        http_base(host, port)
    ))?)
}
