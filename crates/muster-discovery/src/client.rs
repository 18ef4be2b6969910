//! Discovery client
//!
//! Two independent background loops:
//! - heartbeat: `POST /register` every heartbeat interval, shortened to half
//!   the TTL the registry reports when the configured interval is too long
//! - refresh: `GET /services` every refresh interval, replacing the local
//!   cache wholesale
//!
//! Failures in either loop are logged and retried on the next tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use muster_api::{RegisterRequest, RegisterResponse, ServiceInstance};
use muster_common::local_hostname;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::{InstanceCache, InstanceResolver};
use crate::error::DiscoveryError;
use crate::http::RegistryHttpClient;
use crate::options::DiscoveryOptions;

const MIN_HEARTBEAT: Duration = Duration::from_secs(1);

/// Registration track
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    Unstarted,
    /// Heartbeat loop running, no successful registration yet
    Registering,
    /// At least one registration accepted
    Active,
    Stopped,
}

/// Cache track, independent of registration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheState {
    Stale,
    Fresh,
}

/// How this process registers itself
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub name: String,
    pub host: String,
    pub port: u16,
}

pub struct DiscoveryClient {
    options: DiscoveryOptions,
    http: RegistryHttpClient,
    cache: Arc<InstanceCache>,
    state: RwLock<ClientState>,
    identity: RwLock<Option<ServiceIdentity>>,
    heartbeat_ms: AtomicU64,
    stop: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DiscoveryClient {
    pub fn new(options: DiscoveryOptions) -> Result<Arc<Self>, DiscoveryError> {
        let http = RegistryHttpClient::new(&options.registry_url, options.request_timeout())?;
        let (stop, _) = watch::channel(false);
        let heartbeat_ms = options.heartbeat_interval().as_millis() as u64;

        Ok(Arc::new(Self {
            options,
            http,
            cache: Arc::new(InstanceCache::new()),
            state: RwLock::new(ClientState::Unstarted),
            identity: RwLock::new(None),
            heartbeat_ms: AtomicU64::new(heartbeat_ms),
            stop,
            tasks: Mutex::new(Vec::new()),
        }))
    }

    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    pub fn cache(&self) -> Arc<InstanceCache> {
        self.cache.clone()
    }

    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    pub fn cache_state(&self) -> CacheState {
        if self.cache.is_fresh() {
            CacheState::Fresh
        } else {
            CacheState::Stale
        }
    }

    pub fn identity(&self) -> Option<ServiceIdentity> {
        self.identity.read().clone()
    }

    /// Interval the heartbeat loop currently sleeps between registrations.
    pub fn effective_heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.load(Ordering::Relaxed))
    }

    /// Work out the advertised identity: configured name; configured host,
    /// else `localhost` when requested, else the machine hostname; configured
    /// port, else `listen_port`.
    pub fn resolve_identity(&self, listen_port: u16) -> Result<ServiceIdentity, DiscoveryError> {
        let name = self.options.service_name.trim();
        if name.is_empty() {
            return Err(DiscoveryError::IncompleteIdentity(
                "service name is not configured".to_string(),
            ));
        }

        let host = match self.options.host.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() => host.to_string(),
            _ if self.options.use_localhost_as_host => "localhost".to_string(),
            _ => local_hostname(),
        };

        let port = self.options.port.unwrap_or(listen_port);
        if port == 0 {
            return Err(DiscoveryError::IncompleteIdentity(
                "listen port is not known".to_string(),
            ));
        }

        Ok(ServiceIdentity {
            name: name.to_string(),
            host,
            port,
        })
    }

    /// Start both loops. `listen_port` is the port the process actually
    /// bound. Calling `start` again is a no-op.
    pub fn start(self: &Arc<Self>, listen_port: u16) {
        let mut tasks = self.tasks.lock();
        {
            let mut state = self.state.write();
            if *state != ClientState::Unstarted || !tasks.is_empty() {
                warn!(state = ?*state, "Discovery client already started");
                return;
            }

            match self.resolve_identity(listen_port) {
                Ok(identity) => {
                    info!(
                        service = %identity.name,
                        host = %identity.host,
                        port = identity.port,
                        registry = %self.http.base_url(),
                        "Discovery client starting"
                    );
                    *self.identity.write() = Some(identity);
                    *state = ClientState::Registering;
                }
                Err(e) => {
                    warn!("Registration skipped: {}", e);
                }
            }
        }

        if self.identity.read().is_some() {
            let client = self.clone();
            let stop = self.stop.subscribe();
            tasks.push(tokio::spawn(async move { client.heartbeat_loop(stop).await }));
        }
        let client = self.clone();
        let stop = self.stop.subscribe();
        tasks.push(tokio::spawn(async move { client.refresh_loop(stop).await }));
    }

    /// Register once with the resolved identity.
    pub async fn register_now(&self) -> Result<RegisterResponse, DiscoveryError> {
        let identity = self.identity().ok_or_else(|| {
            DiscoveryError::IncompleteIdentity("client not started with an identity".to_string())
        })?;

        let request = RegisterRequest::new(&identity.name, &identity.host, identity.port);
        let response = self.http.register(&request).await?;
        self.size_heartbeat(response.expires_in);

        let mut state = self.state.write();
        if *state == ClientState::Registering {
            info!(service = %identity.name, expires_in = response.expires_in, "Registered with registry");
            *state = ClientState::Active;
        }
        Ok(response)
    }

    /// Pull the full membership into the cache once. Returns the number of
    /// instances cached.
    pub async fn refresh_now(&self) -> Result<usize, DiscoveryError> {
        let instances = self.http.list_all().await?;
        let count = instances.len();
        self.cache.replace_all(instances);
        debug!(instances = count, "Discovery cache refreshed");
        Ok(count)
    }

    /// Stop both loops and wait for them to exit.
    pub async fn stop(&self) {
        let _ = self.stop.send(true);
        *self.state.write() = ClientState::Stopped;

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                debug!("Discovery task ended abnormally: {}", e);
            }
        }
        info!("Discovery client stopped");
    }

    fn size_heartbeat(&self, expires_in_secs: u64) {
        let configured = self.options.heartbeat_interval();
        let effective = if expires_in_secs == 0 {
            configured
        } else {
            configured
                .min(Duration::from_secs(expires_in_secs) / 2)
                .max(MIN_HEARTBEAT)
        };

        let previous = self
            .heartbeat_ms
            .swap(effective.as_millis() as u64, Ordering::Relaxed);
        if previous != effective.as_millis() as u64 {
            info!(
                heartbeat_ms = effective.as_millis() as u64,
                expires_in = expires_in_secs,
                "Heartbeat interval adjusted to registry TTL"
            );
        }
    }

    async fn heartbeat_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        loop {
            if let Err(e) = self.register_now().await {
                warn!(registry = %self.http.base_url(), "Heartbeat failed, retrying next tick: {}", e);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.effective_heartbeat()) => {}
                _ = stopped(&mut stop) => break,
            }
        }
        debug!("Heartbeat loop exited");
    }

    async fn refresh_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.options.refresh_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh_now().await {
                        warn!(registry = %self.http.base_url(), "Discovery refresh failed, keeping previous cache: {}", e);
                    }
                }
                _ = stopped(&mut stop) => break,
            }
        }
        debug!("Refresh loop exited");
    }
}

/// Resolves once the stop flag is raised or its sender is gone. The watch
/// guard is dropped here so loop futures stay `Send`.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

impl InstanceResolver for DiscoveryClient {
    fn resolve(&self, name: &str) -> Vec<ServiceInstance> {
        self.cache.resolve(name)
    }

    fn resolve_one(&self, name: &str) -> Option<ServiceInstance> {
        self.cache.resolve_one(name)
    }
}
