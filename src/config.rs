use anyhow::{Context, Result};

use crate::recommend::{default_curriculum, RegenerationPolicy};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://portfolio.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub curriculum: Vec<String>,
    pub policy: RegenerationPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            curriculum: default_curriculum(),
            policy: RegenerationPolicy::Reset,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let keep_completed = match std::env::var("PORTFOLIO_KEEP_COMPLETED") {
            Ok(value) => value
                .trim()
                .parse::<bool>()
                .context("PORTFOLIO_KEEP_COMPLETED must be true or false")?,
            Err(_) => false,
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            curriculum: std::env::var("PORTFOLIO_CURRICULUM")
                .map(|value| parse_curriculum(&value))
                .unwrap_or(defaults.curriculum),
            policy: if keep_completed {
                RegenerationPolicy::KeepCompleted
            } else {
                RegenerationPolicy::Reset
            },
        })
    }
}

pub fn parse_curriculum(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|subject| !subject.is_empty())
        .map(String::from)
        .collect()
}
