// Hue bridge endpoints.

use serde::Serialize;
use url::Url;

use crate::address::http_base;
use crate::error::Error;

/// Body of the pairing request: `{"devicetype": "<app>#corluma device"}`.
#[derive(Debug, Serialize)]
pub struct PairRequest<'a> {
    pub devicetype: &'a str,
}

impl<'a> PairRequest<'a> {
    pub fn new(devicetype: &'a str) -> Self {
        Self { devicetype }
    }
}

pub(crate) fn device_type(app_name: &str) -> String {
    format!("{app_name}#corluma device")
}

/// `http://<host>/api`
pub fn credentials_url(host: &str, port: u16) -> Result<Url, Error> {
    Ok(Url::parse(&format!("{}/api", http_base(host, port)))?)
}

/// `http://<host>/api/<username>`
pub fn state_url(host: &str, port: u16, username: &str) -> Result<Url, Error> {
    Ok(Url::parse(&format!(
        "{}/api/{username}",
        http_base(host, port)
    ))?)
}
