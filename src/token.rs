//! Static metadata for the fungible token distributed alongside the kernel

use serde::Serialize;

/// Name, symbol and decimal precision of a fungible token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenMetadata {
    name: &'static str,
    symbol: &'static str,
    decimals: u8,
}

impl TokenMetadata {
    pub const fn new(name: &'static str, symbol: &'static str, decimals: u8) -> Self {
        Self {
            name,
            symbol,
            decimals,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn symbol(&self) -> &'static str {
        self.symbol
    }

    pub const fn decimals(&self) -> u8 {
        self.decimals
    }
}

/// The ZEP token
pub const ZEP_TOKEN: TokenMetadata = TokenMetadata::new("Zep Token", "ZEP", 18);
