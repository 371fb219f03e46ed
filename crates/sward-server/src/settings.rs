//! Runtime server settings, deserialised from `config.toml` and `SWARD_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use sward_api::{AuthConfig, ReferralPolicy};
use sward_core::referral::{Amount, DEFAULT_REWARD_VALIDITY_DAYS, MAX_LIFETIME_DAYS};
use sward_store_sqlite::LedgerConfig;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                     String,
  pub port:                     u16,
  pub store_path:               PathBuf,
  pub referrals_enabled:        bool,
  pub require_known_referrer:   bool,
  pub referee_discount_percent: u8,
  pub reward_amount_cents:      i64,
  pub reward_validity_days:     u32,
  pub code_expiration_days:     Option<u32>,
  pub admin_username:           String,
  pub admin_password_hash:      Option<String>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                     "127.0.0.1".to_string(),
      port:                     8080,
      store_path:               PathBuf::from("~/.local/share/sward/ledger.db"),
      referrals_enabled:        true,
      require_known_referrer:   false,
      referee_discount_percent: 15,
      reward_amount_cents:      2000,
      reward_validity_days:     DEFAULT_REWARD_VALIDITY_DAYS,
      code_expiration_days:     None,
      admin_username:           "admin".to_string(),
      admin_password_hash:      None,
    }
  }
}

impl ServerConfig {
  /// Layer the optional TOML file at `path` under the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    Self::from_builder(
      config::Config::builder()
        .add_source(config::File::from(path).required(false)),
    )
  }

  fn from_builder(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> anyhow::Result<Self> {
    let settings = builder
      .add_source(config::Environment::with_prefix("SWARD").try_parsing(true))
      .build()
      .context("failed to read config")?;

    let cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")?;

    if cfg.reward_amount_cents < 0 {
      anyhow::bail!("reward_amount_cents must not be negative");
    }
    if cfg.referee_discount_percent > 100 {
      anyhow::bail!("referee_discount_percent must be at most 100");
    }
    if cfg.reward_validity_days > MAX_LIFETIME_DAYS {
      anyhow::bail!("reward_validity_days must be at most {MAX_LIFETIME_DAYS}");
    }
    if cfg.code_expiration_days.is_some_and(|d| d > MAX_LIFETIME_DAYS) {
      anyhow::bail!("code_expiration_days must be at most {MAX_LIFETIME_DAYS}");
    }
    Ok(cfg)
  }

  pub fn ledger(&self) -> LedgerConfig {
    LedgerConfig {
      store_path:             expand_tilde(&self.store_path),
      require_known_referrer: self.require_known_referrer,
    }
  }

  pub fn policy(&self) -> ReferralPolicy {
    ReferralPolicy {
      enabled:                  self.referrals_enabled,
      referee_discount_percent: self.referee_discount_percent,
      reward_amount:            Amount::from_cents(self.reward_amount_cents),
      reward_validity_days:     self.reward_validity_days,
      code_expiration_days:     self.code_expiration_days,
    }
  }

  pub fn auth(&self) -> AuthConfig {
    AuthConfig {
      username:      self.admin_username.clone(),
      password_hash: self.admin_password_hash.clone(),
    }
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(toml: &str) -> anyhow::Result<ServerConfig> {
    ServerConfig::from_builder(
      config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml)),
    )
  }

  #[test]
  fn empty_file_yields_defaults() {
    let cfg = parse("").unwrap();
    assert_eq!(cfg.port, 8080);
    assert!(cfg.referrals_enabled);
    assert_eq!(cfg.policy().reward_amount, Amount::from_cents(2000));
    assert_eq!(cfg.policy().reward_validity_days, 180);
    assert_eq!(cfg.policy().referee_discount_percent, 15);
    assert!(cfg.auth().password_hash.is_none());
  }

  #[test]
  fn file_values_override_defaults() {
    let cfg = parse(
      r#"
        port = 9000
        referrals_enabled = false
        reward_amount_cents = 2500
        code_expiration_days = 30
        store_path = "/var/lib/sward/ledger.db"
      "#,
    )
    .unwrap();
    assert_eq!(cfg.address(), "127.0.0.1:9000");
    assert!(!cfg.policy().enabled);
    assert_eq!(cfg.policy().reward_amount.to_string(), "25.00");
    assert_eq!(cfg.policy().code_expiration_days, Some(30));
    assert_eq!(cfg.ledger().store_path, PathBuf::from("/var/lib/sward/ledger.db"));
  }

  #[test]
  fn negative_reward_is_refused() {
    assert!(parse("reward_amount_cents = -5").is_err());
  }

  #[test]
  fn discount_above_100_is_refused() {
    assert!(parse("referee_discount_percent = 150").is_err());
  }

  #[test]
  fn lifetimes_beyond_the_maximum_are_refused() {
    assert!(parse(&format!("reward_validity_days = {MAX_LIFETIME_DAYS}")).is_ok());
    assert!(parse("reward_validity_days = 4294967295").is_err());
    assert!(parse("code_expiration_days = 100000000").is_err());
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(
      expand_tilde(Path::new("~/ledger.db")),
      PathBuf::from(home).join("ledger.db"),
    );
    assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
  }
}
