//! Startup banner with the agent's public IP and rough location.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

const IP_URL: &str = "https://api.ipify.org";
const GEO_URL: &str = "http://ip-api.com/json";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Subset of the ip-api.com response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Geolocation {
    pub city: String,
    pub country: String,
    pub isp: String,
    /// The IP the lookup was made for.
    pub query: String,
}

impl Geolocation {
    pub fn banner(&self) -> String {
        format!(
            "Monika is running from {}, {} ({} - {})",
            self.city, self.country, self.isp, self.query
        )
    }
}

pub async fn lookup(client: &reqwest::Client) -> anyhow::Result<Geolocation> {
    let ip = client
        .get(IP_URL)
        .timeout(LOOKUP_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let geo = client
        .get(format!("{GEO_URL}/{}", ip.trim()))
        .timeout(LOOKUP_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .json::<Geolocation>()
        .await?;
    Ok(geo)
}

/// Best effort: failures only show up at debug level.
pub async fn log_banner() {
    match lookup(&reqwest::Client::new()).await {
        Ok(geo) => info!("{}", geo.banner()),
        Err(e) => debug!(error = %e, "public location lookup failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ip_api_response() {
        let body = r#"{
            "status": "success",
            "country": "Indonesia",
            "countryCode": "ID",
            "city": "Jakarta",
            "lat": -6.2,
            "lon": 106.8,
            "isp": "Example ISP",
            "query": "203.0.113.7"
        }"#;
        let geo: Geolocation = serde_json::from_str(body).unwrap();
        assert_eq!(
            geo.banner(),
            "Monika is running from Jakarta, Indonesia (Example ISP - 203.0.113.7)"
        );
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let geo: Geolocation = serde_json::from_str(r#"{"status":"fail"}"#).unwrap();
        assert_eq!(geo, Geolocation::default());
    }
}
