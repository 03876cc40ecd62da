use crate::prelude::*;

use {
    async_trait::async_trait,
    std::time::Duration,
};

/// Raw JSON access to the device bus. Every call returns the payload text
/// unparsed; parsing belongs to the caller so a bad payload can be dropped
/// without touching transport state.
#[async_trait]
pub trait BusTransport: Send + Sync {
    async fn factory_metadata(&self) -> Result<String>;
    async fn config(&self) -> Result<String>;
    async fn categories(&self) -> Result<String>;
    async fn config_metadata(&self) -> Result<String>;
    async fn engine_config(&self) -> Result<String>;
    async fn list_devices(&self) -> Result<String>;
    async fn device_state(&self, device_id: &str) -> Result<String>;
}

// HttpBus {{{
pub struct HttpBus {
    base: url::Url,
    client: reqwest::Client,
}

impl HttpBus {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = url::Url::parse(base_url)?;
        // so that join() appends rather than replaces the last segment
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { base, client })
    }

    async fn get(&self, path: &str) -> Result<String> {
        self.fetch(self.base.join(path)?).await
    }

    async fn fetch(&self, url: url::Url) -> Result<String> {
        debug!("GET {}", url);

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            bail!("GET {} failed: {}", url, status);
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl BusTransport for HttpBus {
    async fn factory_metadata(&self) -> Result<String> {
        self.get("factory").await
    }

    async fn config(&self) -> Result<String> {
        self.get("config").await
    }

    async fn categories(&self) -> Result<String> {
        self.get("config/categories").await
    }

    async fn config_metadata(&self) -> Result<String> {
        self.get("config/metadata").await
    }

    async fn engine_config(&self) -> Result<String> {
        self.get("config/engines").await
    }

    async fn list_devices(&self) -> Result<String> {
        self.get("devices").await
    }

    async fn device_state(&self, device_id: &str) -> Result<String> {
        let mut url = self.base.join("devices/")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("bus url cannot be a base: {}", self.base))?
            .pop_if_empty()
            .push(device_id)
            .push("state");

        self.fetch(url).await
    }
} // }}}
