//! Snapshot polling over HTTP, the fallback when streaming is not wanted.
use price_common::{PriceError, PriceSnapshot, Symbol};
use reqwest::Url;

/// Fetch `GET /prices/{symbol}` from `server_addr`.
pub fn fetch_snapshot(server_addr: &str, symbol: &Symbol) -> Result<PriceSnapshot, PriceError> {
    let url = snapshot_url(server_addr, symbol)?;
    reqwest::blocking::get(url)
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.json::<PriceSnapshot>())
        .map_err(|e| PriceError::Format(format!("snapshot request failed: {}", e)))
}

/// Snapshot URL for `symbol`, with the symbol percent-encoded as one path segment.
fn snapshot_url(server_addr: &str, symbol: &Symbol) -> Result<Url, PriceError> {
    let mut url = Url::parse(&format!("http://{}/", server_addr))
        .map_err(|e| PriceError::Format(format!("bad server address {}: {}", server_addr, e)))?;
    url.path_segments_mut()
        .map_err(|_| PriceError::Format(format!("bad server address {}", server_addr)))?
        .clear()
        .extend(["prices", symbol.as_str()]);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_targets_prices_route() {
        let url = snapshot_url("127.0.0.1:8081", &Symbol::new("aapl").unwrap()).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8081/prices/AAPL");
    }

    #[test]
    fn url_encodes_reserved_characters() {
        let url = snapshot_url("127.0.0.1:8081", &Symbol::new("BTC/USD").unwrap()).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8081/prices/BTC%2FUSD");
    }

    #[test]
    fn unreachable_server_is_an_error() {
        let result = fetch_snapshot("127.0.0.1:1", &Symbol::new("SPY").unwrap());
        assert!(matches!(result, Err(PriceError::Format(_))));
    }
}
