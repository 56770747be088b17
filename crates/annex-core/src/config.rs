//! Optional config from .annexrc or ~/.annexrc (JSON). Merged with env and CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::digest::HashKind;
use crate::error::{AnnexError, AnnexResult};
use crate::http_client::DEFAULT_TIMEOUT_SECS;
use crate::utils;

pub const CONFIG_FILE: &str = ".annexrc";

/// Where a store lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreSpec {
    /// Local or network-mounted directory.
    Directory(PathBuf),
    /// HTTP(S) origin serving `<origin>/<identifier>`.
    Server(String),
}

impl StoreSpec {
    /// Classify an address by scheme; plain paths are directories.
    pub fn parse(address: &str) -> AnnexResult<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(AnnexError::Config("empty annex address".to_string()));
        }
        if address.starts_with("http://") || address.starts_with("https://") {
            return Ok(StoreSpec::Server(address.to_string()));
        }
        if let Some(path) = address.strip_prefix("file://") {
            return Ok(StoreSpec::Directory(utils::expand_home(path)));
        }
        if let Some((scheme, _)) = address.split_once("://") {
            return Err(AnnexError::Config(format!(
                "unsupported annex scheme '{}' in {}",
                scheme, address
            )));
        }
        Ok(StoreSpec::Directory(utils::expand_home(address)))
    }

    fn from_typed(kind: &str, address: &str) -> AnnexResult<Self> {
        match kind {
            "directory" => {
                let path = address.strip_prefix("file://").unwrap_or(address);
                Ok(StoreSpec::Directory(utils::expand_home(path)))
            }
            "server" => Ok(StoreSpec::Server(address.to_string())),
            other => Err(AnnexError::Config(format!("unknown annex type '{}'", other))),
        }
    }

    fn from_value(key: &str, v: &Value) -> AnnexResult<Self> {
        if let Some(s) = v.as_str() {
            return Self::parse(s);
        }
        let address = v.get("address").and_then(|x| x.as_str());
        match (v.get("type").and_then(|x| x.as_str()), address) {
            (Some(kind), Some(address)) => Self::from_typed(kind, address),
            (None, Some(address)) => Self::parse(address),
            _ => Err(AnnexError::Config(format!("'{}' has no address", key))),
        }
    }
}

/// Store configuration. CLI and env override file values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnnexConfig {
    pub annex: Option<StoreSpec>,
    pub staging: Option<StoreSpec>,
    pub restore_cache: Option<PathBuf>,
    pub http_timeout_secs: Option<u64>,
    pub digest: Option<HashKind>,
}

impl AnnexConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn hash_kind(&self) -> HashKind {
        self.digest.unwrap_or_default()
    }

    /// Parse a `.annexrc` document.
    pub fn from_json(v: &Value) -> AnnexResult<Self> {
        let mut cfg = AnnexConfig::default();
        if let Some(a) = v.get("annex") {
            cfg.annex = Some(StoreSpec::from_value("annex", a)?);
        }
        if let Some(s) = v.get("staging_annex") {
            cfg.staging = Some(StoreSpec::from_value("staging_annex", s)?);
        }
        if let Some(c) = v.get("annex_restore_cache").and_then(|x| x.as_str()) {
            cfg.restore_cache = Some(utils::expand_home(c));
        }
        if let Some(t) = v.get("http_timeout_secs").and_then(|x| x.as_u64()) {
            cfg.http_timeout_secs = Some(t);
        }
        if let Some(d) = v.get("digest").and_then(|x| x.as_str()) {
            cfg.digest = Some(parse_digest(d)?);
        }
        Ok(cfg)
    }

    /// Apply `ANNEX_*` environment overrides.
    pub fn apply_env(&mut self) -> AnnexResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> AnnexResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(a) = get("ANNEX_PATH") {
            self.annex = Some(StoreSpec::parse(&a)?);
        }
        if let Some(s) = get("ANNEX_STAGING") {
            self.staging = Some(StoreSpec::parse(&s)?);
        }
        if let Some(c) = get("ANNEX_RESTORE_CACHE") {
            self.restore_cache = Some(utils::expand_home(&c));
        }
        if let Some(t) = get("ANNEX_HTTP_TIMEOUT") {
            let secs = t.trim().parse::<u64>().map_err(|_| {
                AnnexError::Config(format!("ANNEX_HTTP_TIMEOUT is not a number: {}", t))
            })?;
            self.http_timeout_secs = Some(secs);
        }
        if let Some(d) = get("ANNEX_DIGEST") {
            self.digest = Some(parse_digest(&d)?);
        }
        Ok(())
    }
}

fn parse_digest(name: &str) -> AnnexResult<HashKind> {
    HashKind::parse(name).ok_or_else(|| AnnexError::Config(format!("unknown digest '{}'", name)))
}

/// Load config from .annexrc in `dir`, then ~/.annexrc. The first file found
/// wins; an unreadable or non-JSON file counts as empty.
pub fn load_config(dir: &Path) -> AnnexResult<AnnexConfig> {
    let mut candidates = vec![dir.join(CONFIG_FILE)];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(CONFIG_FILE));
    }
    for path in &candidates {
        if !path.is_file() {
            continue;
        }
        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str::<Value>(&s).map_err(|e| e.to_string()));
        return match parsed {
            Ok(v) => AnnexConfig::from_json(&v),
            Err(e) => {
                warn!("Ignoring {}: {}", path.display(), e);
                Ok(AnnexConfig::default())
            }
        };
    }
    Ok(AnnexConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_address_schemes() {
        assert_eq!(
            StoreSpec::parse("https://src.example.org/repo/pkgs").unwrap(),
            StoreSpec::Server("https://src.example.org/repo/pkgs".into())
        );
        assert_eq!(
            StoreSpec::parse("file:///srv/annex").unwrap(),
            StoreSpec::Directory(PathBuf::from("/srv/annex"))
        );
        assert_eq!(
            StoreSpec::parse("/srv/annex").unwrap(),
            StoreSpec::Directory(PathBuf::from("/srv/annex"))
        );
        assert!(matches!(
            StoreSpec::parse("ftp://host/annex"),
            Err(AnnexError::Config(_))
        ));
        assert!(StoreSpec::parse("  ").is_err());
    }

    #[test]
    fn test_from_json() {
        let v: Value = serde_json::from_str(
            r#"{
                "annex": "/srv/annex",
                "staging_annex": {"type": "directory", "address": "file:///srv/staging"},
                "annex_restore_cache": "/var/cache/annex",
                "http_timeout_secs": 30,
                "digest": "md5"
            }"#,
        )
        .unwrap();
        let cfg = AnnexConfig::from_json(&v).unwrap();
        assert_eq!(cfg.annex, Some(StoreSpec::Directory("/srv/annex".into())));
        assert_eq!(cfg.staging, Some(StoreSpec::Directory("/srv/staging".into())));
        assert_eq!(cfg.restore_cache, Some(PathBuf::from("/var/cache/annex")));
        assert_eq!(cfg.http_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.hash_kind(), HashKind::Md5);
    }

    #[test]
    fn test_defaults() {
        let cfg = AnnexConfig::default();
        assert!(cfg.annex.is_none());
        assert_eq!(cfg.http_timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(cfg.hash_kind(), HashKind::Sha3_256);
    }

    #[test]
    fn test_bad_typed_store() {
        let v: Value = serde_json::from_str(r#"{"annex": {"type": "s3", "address": "x"}}"#).unwrap();
        assert!(matches!(AnnexConfig::from_json(&v), Err(AnnexError::Config(_))));
        let v: Value = serde_json::from_str(r#"{"annex": {"type": "server"}}"#).unwrap();
        assert!(AnnexConfig::from_json(&v).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ANNEX_PATH", "https://annex.example/pkgs"),
            ("ANNEX_STAGING", "/srv/staging"),
            ("ANNEX_HTTP_TIMEOUT", "5"),
            ("ANNEX_DIGEST", "sha3"),
            ("ANNEX_RESTORE_CACHE", ""),
        ]
        .into_iter()
        .collect();
        let mut cfg = AnnexConfig {
            annex: Some(StoreSpec::Directory("/srv/annex".into())),
            restore_cache: Some("/cache".into()),
            digest: Some(HashKind::Md5),
            ..Default::default()
        };
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(
            cfg.annex,
            Some(StoreSpec::Server("https://annex.example/pkgs".into()))
        );
        assert_eq!(cfg.staging, Some(StoreSpec::Directory("/srv/staging".into())));
        assert_eq!(cfg.restore_cache, Some(PathBuf::from("/cache")));
        assert_eq!(cfg.http_timeout_secs, Some(5));
        assert_eq!(cfg.hash_kind(), HashKind::Sha3_256);

        let mut cfg = AnnexConfig::default();
        assert!(cfg
            .apply_overrides(|k| (k == "ANNEX_HTTP_TIMEOUT").then(|| "soon".to_string()))
            .is_err());
    }

    #[test]
    fn test_load_config_from_dir() {
        let td = tempfile::tempdir().unwrap();
        std::fs::write(
            td.path().join(CONFIG_FILE),
            r#"{"annex": "file:///srv/annex"}"#,
        )
        .unwrap();
        let cfg = load_config(td.path()).unwrap();
        assert_eq!(cfg.annex, Some(StoreSpec::Directory("/srv/annex".into())));
    }

    #[test]
    fn test_load_config_invalid_json_is_default() {
        let td = tempfile::tempdir().unwrap();
        std::fs::write(td.path().join(CONFIG_FILE), "{not json").unwrap();
        assert_eq!(load_config(td.path()).unwrap(), AnnexConfig::default());
    }
}
