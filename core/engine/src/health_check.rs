//! Health probe for the ASR sidecar service.

use reqwest::Client;
use std::time::Duration;

/// Upstream service health status
#[derive(Debug, Clone)]
pub struct ServiceHealth {
    pub is_healthy: bool,
    pub service_name: String,
    pub url: String,
    pub error: Option<String>,
}

pub struct HealthChecker {
    http: Client,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Check the ASR service health endpoint
    pub async fn check_asr_service(&self, base_url: &str) -> ServiceHealth {
        let url = format!("{}/health", base_url);
        match self.http.get(&url).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    ServiceHealth {
                        is_healthy: true,
                        service_name: "ASR".to_string(),
                        url: base_url.to_string(),
                        error: None,
                    }
                } else {
                    ServiceHealth {
                        is_healthy: false,
                        service_name: "ASR".to_string(),
                        url: base_url.to_string(),
                        error: Some(format!("HTTP {}", response.status())),
                    }
                }
            }
            Err(e) => ServiceHealth {
                is_healthy: false,
                service_name: "ASR".to_string(),
                url: base_url.to_string(),
                error: Some(e.to_string()),
            },
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}
