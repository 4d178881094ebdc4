use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use crate::client::config::Config;
use crate::client::consts::API_KEY_HEADER;

pub fn build_request(config: &Config) -> tokio_tungstenite::tungstenite::Result<Request> {
    let mut request = config.base_url().into_client_request()?;
    request.headers_mut()
        .insert(
            API_KEY_HEADER,
            config.api_key().expose_secret().parse()?
        );
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_api_key_header() {
        let config = Config::builder()
            .with_base_url("wss://example.test/live")
            .with_api_key("secret-key")
            .build();
        let request = build_request(&config).unwrap();
        assert_eq!(request.uri().host(), Some("example.test"));
        assert_eq!(request.headers().get(API_KEY_HEADER).unwrap(), "secret-key");
        assert!(request.uri().query().is_none());
    }
}
