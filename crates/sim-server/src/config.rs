use std::{
    env,
    net::{AddrParseError, Ipv4Addr, SocketAddr, SocketAddrV4},
};

use runtime::EngineOptions;
use thiserror::Error;

const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 7500));
const DEFAULT_ANNOUNCE_DISCONNECT: bool = true;
const DEFAULT_EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub announce_disconnect: bool,
    pub event_buffer: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SIM_SERVER_ADDR is not a valid socket address: {0}")]
    InvalidListenAddr(#[source] AddrParseError),
    #[error("SIM_ANNOUNCE_DISCONNECT must be true or false")]
    InvalidAnnounceDisconnect,
    #[error("SIM_EVENT_BUFFER must be a positive integer")]
    InvalidEventBuffer,
    #[error("SIM_SERVER_ADDR contains non-unicode data")]
    NonUnicodeListenAddr,
    #[error("SIM_ANNOUNCE_DISCONNECT contains non-unicode data")]
    NonUnicodeAnnounceDisconnect,
    #[error("SIM_EVENT_BUFFER contains non-unicode data")]
    NonUnicodeEventBuffer,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = match env::var("SIM_SERVER_ADDR") {
            Ok(value) => value.parse().map_err(ConfigError::InvalidListenAddr)?,
            Err(env::VarError::NotPresent) => DEFAULT_LISTEN_ADDR,
            Err(env::VarError::NotUnicode(_)) => {
                return Err(ConfigError::NonUnicodeListenAddr);
            }
        };

        let announce_disconnect = parse_env(
            "SIM_ANNOUNCE_DISCONNECT",
            DEFAULT_ANNOUNCE_DISCONNECT,
            parse_bool,
            ConfigError::InvalidAnnounceDisconnect,
            ConfigError::NonUnicodeAnnounceDisconnect,
        )?;

        let event_buffer = parse_env(
            "SIM_EVENT_BUFFER",
            DEFAULT_EVENT_BUFFER,
            parse_positive,
            ConfigError::InvalidEventBuffer,
            ConfigError::NonUnicodeEventBuffer,
        )?;

        Ok(Self {
            listen_addr,
            announce_disconnect,
            event_buffer,
        })
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            announce_disconnect: self.announce_disconnect,
            event_buffer: self.event_buffer,
            ..EngineOptions::default()
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn parse_positive(value: &str) -> Option<usize> {
    value.parse::<usize>().ok().filter(|parsed| *parsed > 0)
}

fn parse_env<T>(
    key: &str,
    default_value: T,
    parse: fn(&str) -> Option<T>,
    invalid_error: ConfigError,
    non_unicode_error: ConfigError,
) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => parse(value.trim()).ok_or(invalid_error),
        Err(env::VarError::NotPresent) => Ok(default_value),
        Err(env::VarError::NotUnicode(_)) => Err(non_unicode_error),
    }
}
