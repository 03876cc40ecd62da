//! Long-running bus client: one bootstrap pass, then a device-discovery loop
//! and a state-poll loop until stopped.

use crate::bus::BusTransport;
use crate::config::Polling;
use crate::devices::N2kDevices;
use crate::empower::{EmpowerSystem, EngineList};
use crate::model::{EngineConfiguration, FactoryMetadata, N2kConfiguration};
use crate::parser;
use crate::prelude::*;
use crate::processor;
use crate::subject::{lock, Subject, Subscription};

use {
    chrono::Utc,
    std::sync::{Arc, Mutex},
    std::time::Duration,
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    Stopped,
    Starting,
    Running,
}

pub struct N2kClient {
    transport: Arc<dyn BusTransport>,
    polling: Polling,
    devices: N2kDevices,

    config: Subject<Option<Arc<N2kConfiguration>>>,
    empower_system: Subject<Option<Arc<EmpowerSystem>>>,
    engine_config: Subject<Arc<EngineConfiguration>>,
    engine_list: Subject<Option<Arc<EngineList>>>,
    factory_metadata: Subject<Option<Arc<FactoryMetadata>>>,

    state: Mutex<ClientState>,
    cancel: Mutex<Option<CancellationToken>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl N2kClient {
    pub fn new(transport: Arc<dyn BusTransport>, polling: Polling) -> Self {
        Self {
            transport,
            polling,
            devices: N2kDevices::new(),
            config: Subject::new(None),
            empower_system: Subject::new(None),
            engine_config: Subject::new(Arc::new(EngineConfiguration::default())),
            engine_list: Subject::new(None),
            factory_metadata: Subject::new(None),
            state: Mutex::new(ClientState::Stopped),
            cancel: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> ClientState {
        *lock(&self.state)
    }

    fn set_state(&self, state: ClientState) {
        debug!("client state -> {:?}", state);
        *lock(&self.state) = state;
    }

    // Lifecycle {{{
    /// Bootstraps from the bus, then launches both poll loops. Fails if the
    /// client is not stopped or if the configuration cannot be loaded.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = lock(&self.state);
            if *state != ClientState::Stopped {
                bail!("client already {:?}", *state);
            }
            *state = ClientState::Starting;
        }

        if let Err(e) = self.bootstrap().await {
            self.set_state(ClientState::Stopped);
            return Err(e);
        }

        let cancel = CancellationToken::new();

        let device_loop = tokio::spawn(run_loop(
            "device discovery",
            self.polling.device_interval(),
            cancel.clone(),
            {
                let transport = self.transport.clone();
                let devices = self.devices.clone();
                move || {
                    let transport = transport.clone();
                    let devices = devices.clone();
                    async move { poll_devices(transport.as_ref(), &devices).await.map(|_| ()) }
                }
            },
        ));

        let state_loop = tokio::spawn(run_loop(
            "state poll",
            self.polling.state_interval(),
            cancel.clone(),
            {
                let transport = self.transport.clone();
                let devices = self.devices.clone();
                move || {
                    let transport = transport.clone();
                    let devices = devices.clone();
                    async move { poll_state(transport.as_ref(), &devices).await.map(|_| ()) }
                }
            },
        ));

        *lock(&self.cancel) = Some(cancel);
        lock(&self.handles).extend([device_loop, state_loop]);
        self.set_state(ClientState::Running);

        info!("n2k client running");
        Ok(())
    }

    /// Cancels both loops and waits for them to finish.
    pub async fn stop(&self) {
        if let Some(cancel) = lock(&self.cancel).take() {
            cancel.cancel();
        }

        let handles: Vec<JoinHandle<()>> = lock(&self.handles).drain(..).collect();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("poll loop ended abnormally: {}", e);
            }
        }

        self.set_state(ClientState::Stopped);
        info!("n2k client stopped");
    }

    async fn bootstrap(&self) -> Result<()> {
        if let Err(e) = self.refresh_factory_metadata().await {
            warn!("factory metadata unavailable: {}", e);
        }

        self.refresh_config().await?;

        if let Err(e) = self.refresh_engines().await {
            warn!("engine configuration unavailable: {}", e);
        }

        // one discovery pass so the first state poll has something to ask for
        if let Err(e) = poll_devices(self.transport.as_ref(), &self.devices).await {
            warn!("initial device discovery failed: {}", e);
        }

        Ok(())
    } // }}}

    // Refresh {{{
    pub async fn refresh_factory_metadata(&self) -> Result<()> {
        let json = self.transport.factory_metadata().await?;
        let metadata = parser::parse_factory_metadata(&json)?;
        self.factory_metadata.publish(Some(Arc::new(metadata)));
        Ok(())
    }

    /// Re-reads the configuration and rebuilds the empower system. On any
    /// failure the previously published configuration and system stay.
    pub async fn refresh_config(&self) -> Result<()> {
        let config_json = self.transport.config().await?;
        let categories_json = self.transport.categories().await?;
        let metadata_json = match self.transport.config_metadata().await {
            Ok(json) => json,
            Err(e) => {
                warn!("config metadata unavailable: {}", e);
                String::new()
            }
        };

        let config = parser::parse_config(&config_json, &categories_json, &metadata_json)?;
        let system = processor::build_empower_system(&config, &self.devices)?;

        self.config.publish(Some(Arc::new(config)));
        self.empower_system.publish(Some(Arc::new(system)));
        Ok(())
    }

    /// Merges newly reported engines into the engine configuration and
    /// rebuilds the engine list.
    pub async fn refresh_engines(&self) -> Result<()> {
        let json = self.transport.engine_config().await?;
        let existing = self.engine_config.latest();
        let engines = parser::parse_engine_configuration(&json, &existing)?;
        let list = processor::build_engine_list(&engines, &self.devices)?;

        self.engine_config.publish(Arc::new(engines));
        self.engine_list.publish(Some(Arc::new(list)));
        Ok(())
    } // }}}

    // Accessors {{{
    pub fn devices(&self) -> &N2kDevices {
        &self.devices
    }

    pub fn config(&self) -> Option<Arc<N2kConfiguration>> {
        self.config.latest()
    }

    pub fn subscribe_config(&self) -> Subscription<Option<Arc<N2kConfiguration>>> {
        self.config.subscribe()
    }

    pub fn empower_system(&self) -> Option<Arc<EmpowerSystem>> {
        self.empower_system.latest()
    }

    pub fn subscribe_empower_system(&self) -> Subscription<Option<Arc<EmpowerSystem>>> {
        self.empower_system.subscribe()
    }

    pub fn engine_config(&self) -> Arc<EngineConfiguration> {
        self.engine_config.latest()
    }

    pub fn subscribe_engine_config(&self) -> Subscription<Arc<EngineConfiguration>> {
        self.engine_config.subscribe()
    }

    pub fn engine_list(&self) -> Option<Arc<EngineList>> {
        self.engine_list.latest()
    }

    pub fn subscribe_engine_list(&self) -> Subscription<Option<Arc<EngineList>>> {
        self.engine_list.subscribe()
    }

    pub fn factory_metadata(&self) -> Option<Arc<FactoryMetadata>> {
        self.factory_metadata.latest()
    }

    pub fn subscribe_factory_metadata(&self) -> Subscription<Option<Arc<FactoryMetadata>>> {
        self.factory_metadata.subscribe()
    }

    /// Everything currently published, as one JSON document.
    pub fn to_dump_json(&self) -> serde_json::Value {
        serde_json::json!({
            "system": self.empower_system().map(|s| s.to_config_dict()),
            "engines": self.engine_list().map(|l| l.to_config_dict()),
            "mobile": self.devices.to_mobile_dict(),
        })
    } // }}}
}

/// Runs `poll` every `interval` until cancelled. A failed iteration is
/// logged and retried at the next interval.
async fn run_loop<F, Fut>(name: &'static str, interval: Duration, cancel: CancellationToken, poll: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    debug!("{} loop starting, interval {:?}", name, interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = poll() => {
                if let Err(e) = result {
                    error!("{} failed: {}", name, e);
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    debug!("{} loop stopped", name);
}

/// One discovery pass. Returns how many devices were new.
pub async fn poll_devices(transport: &dyn BusTransport, devices: &N2kDevices) -> Result<usize> {
    let json = transport.list_devices().await?;
    let listed = parser::parse_device_list(&json)?;
    Ok(devices.add_devices(&listed))
}

/// One state pass over every known device, merged as a single snapshot.
/// A device that fails to answer is skipped for this pass. Returns the
/// number of channel values merged.
pub async fn poll_state(transport: &dyn BusTransport, devices: &N2kDevices) -> Result<usize> {
    let snapshot = devices.snapshot();
    let mut updates = Vec::new();

    for device_key in snapshot.keys() {
        let state = match transport.device_state(device_key).await {
            Ok(json) => parser::parse_device_state(device_key, &json).map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };
        match state {
            Ok(device_updates) => updates.extend(device_updates),
            Err(e) => warn!("state for {} unavailable: {}", device_key, e),
        }
    }

    devices.merge_state(&updates, Some(Utc::now()));
    Ok(updates.len())
}
