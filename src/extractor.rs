//! Derives relayable price records from upstream frames

use crate::upstream::UpstreamMessage;
use serde::Serialize;

/// Number of leading characters of the price string that form the value.
///
/// Stork encodes prices as fixed-point integer strings; the relay keeps the
/// first ten characters rather than rescaling. This assumes a fixed-width
/// encoding and changes magnitude if the upstream width ever changes.
pub const PRICE_PREFIX_CHARS: usize = 10;

/// Price derived from a single upstream `oracle_prices` frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceRecord {
    pub symbol: String,
    pub value: u64,
}

/// Truncate a price string to its first ten characters and parse it.
///
/// Non-negative values only: a leading `-` (`"-123456789"`) yields `None`.
/// Returns `None` for empty input or a non-integer prefix.
pub fn truncated_price(raw: &str) -> Option<u64> {
    let prefix: String = raw.chars().take(PRICE_PREFIX_CHARS).collect();
    prefix.parse().ok()
}

/// Pulls the configured symbol's price out of upstream messages
#[derive(Debug, Clone)]
pub struct PriceExtractor {
    symbol: String,
}

impl PriceExtractor {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Derive at most one record from a message. Never fails loudly.
    pub fn extract(&self, msg: &UpstreamMessage) -> Option<PriceRecord> {
        let UpstreamMessage::OraclePrices { data } = msg else {
            return None;
        };

        let raw = data.get(&self.symbol)?.price.as_deref()?;
        if raw.is_empty() {
            return None;
        }

        let value = truncated_price(raw)?;
        Some(PriceRecord {
            symbol: self.symbol.clone(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> PriceExtractor {
        PriceExtractor::new("BTCUSD")
    }

    fn decode(text: &str) -> UpstreamMessage {
        UpstreamMessage::decode(text).unwrap()
    }

    #[test]
    fn test_extract_truncates_to_ten_chars() {
        let msg = decode(r#"{"type":"oracle_prices","data":{"BTCUSD":{"price":"6750012345678"}}}"#);
        let record = extractor().extract(&msg).unwrap();
        assert_eq!(
            record,
            PriceRecord {
                symbol: "BTCUSD".to_string(),
                value: 6750012345,
            }
        );
    }

    #[test]
    fn test_extract_short_price_kept_whole() {
        let msg = decode(r#"{"type":"oracle_prices","data":{"BTCUSD":{"price":"42"}}}"#);
        assert_eq!(extractor().extract(&msg).unwrap().value, 42);
    }

    #[test]
    fn test_extract_unsubscribed_symbol() {
        let msg = decode(r#"{"type":"oracle_prices","data":{"ETHUSD":{"price":"300000000"}}}"#);
        assert!(extractor().extract(&msg).is_none());
    }

    #[test]
    fn test_extract_ignores_other_types() {
        let msg = decode(r#"{"type":"subscribe","data":{"BTCUSD":{"price":"6750012345678"}}}"#);
        assert!(extractor().extract(&msg).is_none());
    }

    #[test]
    fn test_extract_missing_or_empty_price() {
        let missing = decode(r#"{"type":"oracle_prices","data":{"BTCUSD":{}}}"#);
        assert!(extractor().extract(&missing).is_none());

        let empty = decode(r#"{"type":"oracle_prices","data":{"BTCUSD":{"price":""}}}"#);
        assert!(extractor().extract(&empty).is_none());
    }

    #[test]
    fn test_extract_non_integer_prefix() {
        // Decimal point lands inside the first ten characters
        let msg = decode(r#"{"type":"oracle_prices","data":{"BTCUSD":{"price":"67500.12345678"}}}"#);
        assert!(extractor().extract(&msg).is_none());

        let msg = decode(r#"{"type":"oracle_prices","data":{"BTCUSD":{"price":"abc"}}}"#);
        assert!(extractor().extract(&msg).is_none());
    }

    #[test]
    fn test_extract_non_integer_suffix_is_cut_off() {
        let msg = decode(r#"{"type":"oracle_prices","data":{"BTCUSD":{"price":"1234567890.5"}}}"#);
        assert_eq!(extractor().extract(&msg).unwrap().value, 1234567890);
    }

    #[test]
    fn test_truncated_price_counts_chars_not_bytes() {
        // Multi-byte characters must not split mid-codepoint
        assert_eq!(truncated_price("12345678901234"), Some(1234567890));
        assert_eq!(truncated_price("€€€€€€€€€€€"), None);
        assert_eq!(truncated_price(""), None);
        assert_eq!(truncated_price("-5"), None);
        assert_eq!(truncated_price("-1234567890"), None);
    }

    #[test]
    fn test_extractor_symbol() {
        assert_eq!(PriceExtractor::new("ETHUSD").symbol(), "ETHUSD");
    }
}
