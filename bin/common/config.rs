//! `start` command configuration
//!
//! Values come from three layers: built-in defaults, command-line flags, and
//! an optional JSON config file. The file wins for every field it sets;
//! unknown keys in it are ignored.

use std::{
    fs,
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

use clap::ArgMatches;
use serde::Deserialize;
use thiserror::Error;

use hopper::{
    config::Config,
    crypto::{CipherKind, CryptoError},
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file `{path}`: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("cannot parse config file `{path}`: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("cannot resolve address `{0}`")]
    AddrResolve(String),
    #[error("invalid duration `{0}`")]
    BadDuration(String),
    #[error("no next hop provided")]
    NoNextHops,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// A duration as it may appear in the JSON file: bare seconds or a literal
/// like `"90s"`.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum DurationValue {
    Secs(u64),
    Literal(String),
}

/// On-disk JSON document. Every field is optional.
#[derive(Deserialize, Debug, Default)]
struct FileConfig {
    listen: Option<String>,
    nexthops: Option<Vec<String>>,
    sockbuf: Option<usize>,
    timeout: Option<DurationValue>,
    ki: Option<String>,
    ko: Option<String>,
    ci: Option<String>,
    co: Option<String>,
}

impl FileConfig {
    fn load(path: &str) -> Result<FileConfig, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        FileConfig::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    fn parse(content: &str) -> Result<FileConfig, serde_json::Error> {
        serde_json::from_str(content)
    }
}

/// Accepts `90`, `90s`, `1500ms`, `2m` or `1h`.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| ConfigError::BadDuration(s.to_owned()))?;
    let (digits, unit) = s.split_at(split);
    let value = digits
        .parse::<u64>()
        .map_err(|_| ConfigError::BadDuration(s.to_owned()))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(ConfigError::BadDuration(s.to_owned())),
    }
}

/// Resolves `host:port`; a bare `:port` binds every interface.
pub fn resolve_addr(s: &str) -> Result<SocketAddr, ConfigError> {
    let candidate = match s.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port),
        None => s.to_owned(),
    };

    candidate
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::AddrResolve(s.to_owned()))
}

fn cli_string(matches: &ArgMatches, id: &str, default: &str) -> String {
    matches
        .get_one::<String>(id)
        .cloned()
        .unwrap_or_else(|| default.to_owned())
}

/// Builds the validated relay configuration from the parsed command line,
/// folding in the JSON file when `--config` is given.
pub fn build(matches: &ArgMatches) -> Result<Config, ConfigError> {
    let file = match matches.get_one::<String>("config") {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let listen_raw = match file.listen {
        Some(listen) => listen,
        None => cli_string(matches, "listen", ":1234"),
    };
    let listen = resolve_addr(&listen_raw)?;

    let hops_raw: Vec<String> = match file.nexthops {
        Some(hops) => hops,
        None => matches
            .get_many::<String>("nexthops")
            .map(|hops| hops.cloned().collect())
            .unwrap_or_default(),
    };
    if hops_raw.is_empty() {
        return Err(ConfigError::NoNextHops);
    }
    let mut next_hops = Vec::with_capacity(hops_raw.len());
    for hop in &hops_raw {
        next_hops.push(resolve_addr(hop)?);
    }

    let sockbuf = match file.sockbuf {
        Some(sockbuf) => sockbuf,
        None => matches.get_one::<usize>("sockbuf").copied().unwrap_or(1024 * 1024),
    };

    let timeout = match file.timeout {
        Some(DurationValue::Secs(secs)) => Duration::from_secs(secs),
        Some(DurationValue::Literal(lit)) => parse_duration(&lit)?,
        None => parse_duration(&cli_string(matches, "timeout", "60s"))?,
    };

    let cipher_in = file
        .ci
        .unwrap_or_else(|| cli_string(matches, "ci", "aes"))
        .parse::<CipherKind>()?;
    let cipher_out = file
        .co
        .unwrap_or_else(|| cli_string(matches, "co", "aes"))
        .parse::<CipherKind>()?;

    let key_in = file
        .ki
        .unwrap_or_else(|| cli_string(matches, "ki", hopper::config::DEFAULT_PASSPHRASE));
    let key_out = file
        .ko
        .unwrap_or_else(|| cli_string(matches, "ko", hopper::config::DEFAULT_PASSPHRASE));

    Ok(Config {
        listen,
        next_hops,
        sockbuf,
        timeout,
        cipher_in,
        key_in,
        cipher_out,
        key_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("60").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("1500ms").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn addresses() {
        assert_eq!(
            resolve_addr(":1234").unwrap(),
            "0.0.0.0:1234".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            resolve_addr("127.0.0.1:3000").unwrap(),
            "127.0.0.1:3000".parse::<SocketAddr>().unwrap()
        );
        assert!(resolve_addr("no port at all").is_err());
    }

    #[test]
    fn file_overrides_and_ignores_unknown_keys() {
        let file = FileConfig::parse(
            r#"{
                "listen": ":4321",
                "nexthops": ["127.0.0.1:5000", "127.0.0.1:5001"],
                "timeout": "90s",
                "ci": "salsa20",
                "some-future-key": true
            }"#,
        )
        .unwrap();

        assert_eq!(file.listen.as_deref(), Some(":4321"));
        assert_eq!(file.nexthops.as_ref().map(|h| h.len()), Some(2));
        assert!(matches!(file.timeout, Some(DurationValue::Literal(ref lit)) if lit == "90s"));
        assert_eq!(file.ci.as_deref(), Some("salsa20"));
        assert!(file.ko.is_none());
    }

    #[test]
    fn file_timeout_accepts_bare_seconds() {
        let file = FileConfig::parse(r#"{ "timeout": 90 }"#).unwrap();
        assert!(matches!(file.timeout, Some(DurationValue::Secs(90))));
    }
}
