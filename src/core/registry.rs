//! Process-wide default client and the convenience functions that read it.
//!
//! Prefer passing a [`Client`] explicitly. The default exists for code that
//! cannot thread a client through, and every read or write of it goes through
//! one lock.

use crate::core::client::Client;
use crate::core::lookup::FromConfigValue;
use crate::error::{ConfigError, Fallback, Result};
use parking_lot::{Mutex, const_mutex};
use serde::de::DeserializeOwned;

static DEFAULT_CLIENT: Mutex<Option<Client>> = const_mutex(None);

/// Make `client` the process-wide default, returning the previous one.
pub fn set_default_client(client: Client) -> Option<Client> {
    DEFAULT_CLIENT.lock().replace(client)
}

/// The current default client, if any.
pub fn default_client() -> Option<Client> {
    DEFAULT_CLIENT.lock().clone()
}

/// Remove the default client, returning it.
pub fn clear_default_client() -> Option<Client> {
    DEFAULT_CLIENT.lock().take()
}

/// [`Client::get`] on the default client.
///
/// # Errors
///
/// Returns [`ConfigError::NoDefaultClient`] if none is registered, otherwise
/// whatever the client returns.
pub fn get<T: DeserializeOwned>(name: &str) -> Result<T> {
    default_client().ok_or(ConfigError::NoDefaultClient)?.get(name)
}

/// [`Client::get_config`] on the default client.
///
/// `default` is written to `out` on every failure, including when no default
/// client is registered.
///
/// # Errors
///
/// Returns [`ConfigError::NoDefaultClient`] if none is registered, otherwise
/// whatever the client returns.
pub fn get_config<T: DeserializeOwned>(name: &str, out: &mut T, default: T) -> Result<()> {
    match default_client() {
        Some(client) => client.get_config(name, out, default),
        None => {
            *out = default;
            Err(ConfigError::NoDefaultClient)
        }
    }
}

/// [`Client::get_typed`] on the default client.
pub fn get_typed<T: FromConfigValue>(name: &str, default: T) -> std::result::Result<T, Fallback<T>> {
    match default_client() {
        Some(client) => client.get_typed(name, default),
        None => Err(Fallback::new(default, ConfigError::NoDefaultClient)),
    }
}

/// [`Client::get_string`] on the default client.
pub fn get_string(name: &str, default: impl Into<String>) -> std::result::Result<String, Fallback<String>> {
    get_typed(name, default.into())
}

/// [`Client::get_int`] on the default client.
pub fn get_int(name: &str, default: i64) -> std::result::Result<i64, Fallback<i64>> {
    get_typed(name, default)
}

/// [`Client::get_float`] on the default client.
pub fn get_float(name: &str, default: f64) -> std::result::Result<f64, Fallback<f64>> {
    get_typed(name, default)
}

/// [`Client::get_bool`] on the default client.
pub fn get_bool(name: &str, default: bool) -> std::result::Result<bool, Fallback<bool>> {
    get_typed(name, default)
}

/// [`Client::get_string_array`] on the default client.
pub fn get_string_array(
    name: &str,
    default: Vec<String>,
) -> std::result::Result<Vec<String>, Fallback<Vec<String>>> {
    get_typed(name, default)
}
