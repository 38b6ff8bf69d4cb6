use super::handle::{HandleParts, LedgerHandle};
use super::metadata::{InMemoryMetadataStore, LedgerMetadata, LedgerMetadataStore};
use super::transport::BookieClient;
use super::ClientError;
use crate::codec::{self, DigestType};
use crate::config::client::validate_quorum;
use crate::config::ClientConfig;
use crate::node::BookieId;
use crate::telemetry::{NullStats, StatsSink};
use log::{info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

const CLIENT_WORKER_THREADS: usize = 2;

pub struct LedgerClientBuilder {
    config: ClientConfig,
    bookies: Vec<Arc<dyn BookieClient>>,
    metadata: Option<Arc<dyn LedgerMetadataStore>>,
    stats: Arc<dyn StatsSink>,
}

impl LedgerClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            bookies: Vec::new(),
            metadata: None,
            stats: Arc::new(NullStats),
        }
    }

    pub fn bookie(mut self, bookie: Arc<dyn BookieClient>) -> Self {
        self.bookies.push(bookie);
        self
    }

    pub fn bookies<I>(mut self, bookies: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn BookieClient>>,
    {
        self.bookies.extend(bookies);
        self
    }

    /// Shares one metadata store between several clients.
    pub fn metadata_store(mut self, store: Arc<dyn LedgerMetadataStore>) -> Self {
        self.metadata = Some(store);
        self
    }

    pub fn stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = stats;
        self
    }

    pub fn build(self) -> Result<LedgerClient, ClientError> {
        self.config
            .validate()
            .map_err(|err| ClientError::InvalidConfig(err.to_string()))?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(CLIENT_WORKER_THREADS)
            .thread_name("ledgerstore-client")
            .enable_time()
            .build()
            .map_err(|err| ClientError::InvalidConfig(format!("client runtime: {}", err)))?;
        info!(
            "event=ledger_client_started bookies={} ensemble_size={} write_quorum={} ack_quorum={}",
            self.bookies.len(),
            self.config.ensemble_size,
            self.config.write_quorum,
            self.config.ack_quorum
        );
        Ok(LedgerClient {
            runtime: Some(runtime),
            config: self.config,
            bookies: RwLock::new(self.bookies),
            metadata: self
                .metadata
                .unwrap_or_else(|| Arc::new(InMemoryMetadataStore::new())),
            stats: self.stats,
        })
    }
}

/// Entry point for creating and opening ledgers over a set of nodes.
pub struct LedgerClient {
    runtime: Option<Runtime>,
    config: ClientConfig,
    bookies: RwLock<Vec<Arc<dyn BookieClient>>>,
    metadata: Arc<dyn LedgerMetadataStore>,
    stats: Arc<dyn StatsSink>,
}

impl std::fmt::Debug for LedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerClient")
            .field("config", &self.config)
            .field("bookies", &self.bookies.read().len())
            .finish()
    }
}

impl LedgerClient {
    pub fn builder(config: ClientConfig) -> LedgerClientBuilder {
        LedgerClientBuilder::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn metadata_store(&self) -> &Arc<dyn LedgerMetadataStore> {
        &self.metadata
    }

    pub fn add_bookie(&self, bookie: Arc<dyn BookieClient>) {
        self.bookies.write().push(bookie);
    }

    /// Creates a ledger with the configured quorums and digest.
    pub fn create_ledger(&self, password: &[u8]) -> Result<LedgerHandle, ClientError> {
        self.create_ledger_with(
            self.config.ensemble_size,
            self.config.write_quorum,
            self.config.ack_quorum,
            self.config.digest_type,
            password,
        )
    }

    pub fn create_ledger_with(
        &self,
        ensemble_size: usize,
        write_quorum: usize,
        ack_quorum: usize,
        digest_type: DigestType,
        password: &[u8],
    ) -> Result<LedgerHandle, ClientError> {
        validate_quorum(ensemble_size, write_quorum, ack_quorum)
            .map_err(|err| ClientError::IncorrectParameter(err.to_string()))?;
        let ensemble = self.select_ensemble(ensemble_size)?;
        let ledger_id = self.metadata.next_ledger_id()?;
        let master_key = codec::master_key_from_password(password);
        let metadata = LedgerMetadata::new(
            ledger_id,
            ensemble.iter().map(|bookie| bookie.bookie_id().clone()).collect(),
            write_quorum,
            ack_quorum,
            digest_type,
            &master_key,
        );
        self.metadata.create(metadata.clone())?;
        info!(
            "event=ledger_created ledger_id={} ensemble={:?} write_quorum={} ack_quorum={}",
            ledger_id, metadata.ensemble, write_quorum, ack_quorum
        );
        self.handle(metadata, ensemble, master_key, false)
    }

    /// Opens a ledger for reading after fencing it and recovering its tail;
    /// the ledger is closed afterwards, so its writer can no longer add.
    pub fn open_ledger(&self, ledger_id: i64, password: &[u8]) -> Result<LedgerHandle, ClientError> {
        let (metadata, ensemble, master_key) = self.prepare_open(ledger_id, password)?;
        let closed = metadata.is_closed();
        let handle = self.handle(metadata, ensemble, master_key, true)?;
        if !closed {
            let last = handle.recover()?;
            info!(
                "event=ledger_opened_with_recovery ledger_id={} last_entry_id={}",
                ledger_id, last
            );
        }
        Ok(handle)
    }

    /// Opens a ledger for reading without disturbing a live writer.
    pub fn open_ledger_no_recovery(
        &self,
        ledger_id: i64,
        password: &[u8],
    ) -> Result<LedgerHandle, ClientError> {
        let (metadata, ensemble, master_key) = self.prepare_open(ledger_id, password)?;
        self.handle(metadata, ensemble, master_key, true)
    }

    fn prepare_open(
        &self,
        ledger_id: i64,
        password: &[u8],
    ) -> Result<(LedgerMetadata, Vec<Arc<dyn BookieClient>>, Vec<u8>), ClientError> {
        let metadata = self.metadata.read(ledger_id)?;
        let master_key = codec::master_key_from_password(password);
        if !metadata.accepts_key(&master_key) {
            warn!("event=ledger_open_unauthorized ledger_id={}", ledger_id);
            return Err(ClientError::Unauthorized(ledger_id));
        }
        let ensemble = self.resolve_ensemble(&metadata.ensemble)?;
        Ok((metadata, ensemble, master_key))
    }

    fn select_ensemble(&self, size: usize) -> Result<Vec<Arc<dyn BookieClient>>, ClientError> {
        let bookies = self.bookies.read();
        let available: Vec<Arc<dyn BookieClient>> = bookies
            .iter()
            .filter(|bookie| bookie.is_available())
            .take(size)
            .cloned()
            .collect();
        if available.len() < size {
            return Err(ClientError::NotEnoughBookies(format!(
                "ensemble of {} requested, {} of {} nodes available",
                size,
                available.len(),
                bookies.len()
            )));
        }
        Ok(available)
    }

    fn resolve_ensemble(&self, ids: &[BookieId]) -> Result<Vec<Arc<dyn BookieClient>>, ClientError> {
        let bookies = self.bookies.read();
        ids.iter()
            .map(|id| {
                bookies
                    .iter()
                    .find(|bookie| bookie.bookie_id() == id)
                    .cloned()
                    .ok_or_else(|| ClientError::BookieHandleNotAvailable(id.clone()))
            })
            .collect()
    }

    fn handle(
        &self,
        metadata: LedgerMetadata,
        ensemble: Vec<Arc<dyn BookieClient>>,
        master_key: Vec<u8>,
        read_only: bool,
    ) -> Result<LedgerHandle, ClientError> {
        let runtime = self
            .runtime
            .as_ref()
            .map(|runtime| runtime.handle().clone())
            .ok_or_else(|| ClientError::IllegalOp("client has been shut down".into()))?;
        Ok(LedgerHandle::new(HandleParts {
            metadata,
            ensemble,
            master_key,
            read_only,
            runtime,
            add_timeout: self.config.add_entry_timeout(),
            read_timeout: self.config.read_timeout(),
            explicit_lac_interval: self.config.explicit_lac_interval(),
            stats: Arc::clone(&self.stats),
            store: Arc::clone(&self.metadata),
        }))
    }

    /// Stops the client's timers and background tasks. Handles created by
    /// this client can no longer time out requests afterwards.
    pub fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            info!("event=ledger_client_stopped");
        }
    }
}

impl Drop for LedgerClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
