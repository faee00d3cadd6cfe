use std::fmt;
use std::io::{self, BufRead, Write};

use crate::error::{Result, TradingError};

/// API key pair used to sign venue requests
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

// Never print the secret
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("api_secret", &"***")
            .finish()
    }
}

fn mask(key: &str) -> String {
    if key.chars().count() <= 4 {
        return "***".to_string();
    }
    format!("{}***", key.chars().take(4).collect::<String>())
}

/// Use configured credentials, prompting the operator for anything missing
pub fn resolve_credentials<R: BufRead, W: Write>(
    api_key: &str,
    api_secret: &str,
    input: &mut R,
    output: &mut W,
) -> Result<Credentials> {
    let api_key = match api_key.trim() {
        "" => prompt(input, output, "Enter API key: ")?,
        key => key.to_string(),
    };
    let api_secret = match api_secret.trim() {
        "" => prompt(input, output, "Enter API secret: ")?,
        secret => secret.to_string(),
    };

    if api_key.is_empty() || api_secret.is_empty() {
        return Err(TradingError::InvalidConfig(
            "API key and secret are required for live trading".to_string(),
        ));
    }

    Ok(Credentials {
        api_key,
        api_secret,
    })
}

/// Use the configured symbol or prompt for one; always upper-cased
pub fn resolve_symbol<R: BufRead, W: Write>(
    configured: &str,
    input: &mut R,
    output: &mut W,
) -> Result<String> {
    let symbol = match configured.trim() {
        "" => prompt(input, output, "Enter trading symbol (e.g. BTCUSDT): ")?,
        symbol => symbol.to_string(),
    };

    let symbol = symbol.to_uppercase();
    if symbol.is_empty() {
        return Err(TradingError::InvalidConfig(
            "a trading symbol is required".to_string(),
        ));
    }

    Ok(symbol)
}

fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, label: &str) -> Result<String> {
    write!(output, "{}", label).and_then(|_| output.flush()).map_err(io_error)?;

    let mut line = String::new();
    input.read_line(&mut line).map_err(io_error)?;
    Ok(line.trim().to_string())
}

fn io_error(e: io::Error) -> TradingError {
    TradingError::InvalidConfig(format!("failed to read operator input: {}", e))
}
