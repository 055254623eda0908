// src/config.rs
use crate::domain::errors::{AppError, AppResult};
use dotenv::dotenv;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Seed prices for the symbols the service knows out of the box.
pub const DEFAULT_BASE_PRICES: [(&str, Decimal); 10] = [
    ("RELIANCE", dec!(2450.50)),
    ("TCS", dec!(3680.75)),
    ("INFY", dec!(1520.30)),
    ("HDFCBANK", dec!(1650.90)),
    ("ICICIBANK", dec!(985.25)),
    ("SBIN", dec!(625.80)),
    ("BHARTIARTL", dec!(1180.45)),
    ("ITC", dec!(455.60)),
    ("KOTAKBANK", dec!(1725.35)),
    ("LT", dec!(3420.70)),
];

/// Stock reward service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage configuration
    pub database: DatabaseConfig,

    /// Reward validation limits
    pub rewards: RewardsConfig,

    /// Price oracle configuration
    pub pricing: PricingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path, or ":memory:"
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Largest quantity accepted for a single grant
    pub max_quantity: Decimal,
}

/// Price oracle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Base price per symbol for synthetic generation
    pub base_prices: BTreeMap<String, Decimal>,

    /// Samples older than this are regenerated
    pub staleness_minutes: i64,

    /// Period of the background price refresh
    pub refresh_interval_secs: u64,

    /// Scale holdings by configured split multipliers when valuing
    pub apply_split_multipliers: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key/value source, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let database_config = DatabaseConfig {
            path: lookup("DATABASE_PATH").unwrap_or(defaults.database.path),
        };

        let max_quantity = match lookup("MAX_REWARD_QUANTITY") {
            Some(raw) => {
                let value = Decimal::from_str(raw.trim()).map_err(|e| {
                    AppError::Config(format!("Invalid MAX_REWARD_QUANTITY {:?}: {}", raw, e))
                })?;
                if value <= Decimal::ZERO {
                    return Err(AppError::Config(
                        "MAX_REWARD_QUANTITY must be positive".to_string(),
                    ));
                }
                value
            }
            None => defaults.rewards.max_quantity,
        };

        let base_prices = match lookup("STOCK_BASE_PRICES") {
            Some(raw) => parse_base_prices(&raw)?,
            None => defaults.pricing.base_prices,
        };

        let pricing_config = PricingConfig {
            base_prices,
            staleness_minutes: lookup("PRICE_STALENESS_MINUTES")
                .and_then(|v| v.trim().parse().ok())
                .filter(|minutes: &i64| *minutes > 0)
                .unwrap_or(defaults.pricing.staleness_minutes),
            refresh_interval_secs: lookup("PRICE_REFRESH_INTERVAL_SECS")
                .and_then(|v| v.trim().parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .unwrap_or(defaults.pricing.refresh_interval_secs),
            apply_split_multipliers: lookup("APPLY_SPLIT_MULTIPLIERS")
                .unwrap_or_else(|| "false".to_string())
                .parse()
                .unwrap_or(false),
        };

        // Create Logging config
        let logging_config = LoggingConfig {
            level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            to_file: lookup("LOG_TO_FILE")
                .unwrap_or_else(|| "false".to_string())
                .parse()
                .unwrap_or(false),
            file_path: lookup("LOG_FILE_PATH"),
        };

        Ok(Config {
            database: database_config,
            rewards: RewardsConfig { max_quantity },
            pricing: pricing_config,
            logging: logging_config,
        })
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut file = File::open(path).map_err(|e| {
            AppError::Config(format!("Failed to open config file: {}", e))
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| {
            AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file: {}", e))
        })?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            AppError::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, contents).map_err(|e| {
            AppError::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();

        // Set log level
        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        };

        builder.filter_level(log_level);

        // Configure output
        if self.logging.to_file {
            if let Some(file_path) = &self.logging.file_path {
                let file = File::create(file_path).map_err(|e| {
                    AppError::Config(format!("Failed to create log file: {}", e))
                })?;

                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }

        builder.try_init().map_err(|e| {
            AppError::Config(format!("Failed to initialize logger: {}", e))
        })?;

        Ok(())
    }
}

/// Parse `SYMBOL:PRICE,SYMBOL:PRICE` into a base price table.
pub fn parse_base_prices(raw: &str) -> AppResult<BTreeMap<String, Decimal>> {
    let mut prices = BTreeMap::new();

    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (symbol, price) = pair.split_once(':').ok_or_else(|| {
            AppError::Config(format!("Invalid base price entry {:?}: expected SYMBOL:PRICE", pair))
        })?;

        let symbol = symbol.trim().to_string();
        let price = Decimal::from_str(price.trim()).map_err(|e| {
            AppError::Config(format!("Invalid base price for {}: {}", symbol, e))
        })?;

        if symbol.is_empty() || price <= Decimal::ZERO {
            return Err(AppError::Config(format!(
                "Invalid base price entry {:?}",
                pair
            )));
        }

        prices.insert(symbol, price);
    }

    Ok(prices)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: "stock_rewards.db".to_string(),
            },
            rewards: RewardsConfig {
                max_quantity: dec!(10000),
            },
            pricing: PricingConfig {
                base_prices: DEFAULT_BASE_PRICES
                    .iter()
                    .map(|(symbol, price)| (symbol.to_string(), *price))
                    .collect(),
                staleness_minutes: 120,
                refresh_interval_secs: 3600,
                apply_split_multipliers: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                to_file: false,
                file_path: None,
            },
        }
    }
}
