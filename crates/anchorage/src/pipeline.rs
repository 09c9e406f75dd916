//! The integrity pipeline: authenticate, verify, store, anchor.
//!
//! Each stage gates the next. A request that fails a stage stops there and
//! never touches the stages after it.

use anchorage_core::{
    payload_digest, Cid, DeviceId, DevicePublicKey, SensorData, Sha256Digest, TxHash,
};
use anchorage_ledger::{AnchorService, HttpLedger, LedgerRpc};
use anchorage_store::{
    ContentClient, ContentStore, DeviceRegistry, IpfsContentStore, StoredPayload, SqliteRegistry,
};

use crate::config::{AnchorageConfig, ConfigError, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::state::{PipelineState, Progress};
use crate::verifier::{verify_with_key, SignatureVerifier};

/// Linkage returned for a completed request.
///
/// Carries no ledger index. Anchors from concurrent requests are mined in
/// whatever order the node picks, so a caller cannot tell which
/// [`get_commitment`](Pipeline::get_commitment) index belongs to this result;
/// correlate by `tx_hash` or `cid` instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineResult {
    pub device_id: DeviceId,
    pub cid: Cid,
    pub tx_hash: TxHash,
    pub block_number: u64,
    /// Canonical payload digest committed on the ledger.
    pub data_hash: Sha256Digest,
}

/// A ledger commitment resolved back to its stored payload.
#[derive(Clone, Debug)]
pub struct CommitmentReport {
    pub index: u64,
    pub cid: Cid,
    pub payload: StoredPayload,
    /// Digest recomputed from the stored payload.
    pub digest: Sha256Digest,
}

impl CommitmentReport {
    /// Whether the stored payload still hashes to `expected`.
    pub fn matches(&self, expected: &Sha256Digest) -> bool {
        self.digest == *expected
    }
}

/// The orchestrator.
///
/// Generic over the registry, content store and ledger backends; see
/// [`Pipeline::connect`] for the production wiring.
pub struct Pipeline<R, S, L> {
    verifier: SignatureVerifier<R>,
    content: ContentClient<S>,
    anchor: AnchorService<L>,
    config: PipelineConfig,
}

impl<R, S, L> Pipeline<R, S, L>
where
    R: DeviceRegistry,
    S: ContentStore,
    L: LedgerRpc,
{
    pub fn new(
        registry: R,
        content: ContentClient<S>,
        anchor: AnchorService<L>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            verifier: SignatureVerifier::new(registry),
            content,
            anchor,
            config,
        }
    }

    pub fn registry(&self) -> &R {
        self.verifier.registry()
    }

    pub fn verifier(&self) -> &SignatureVerifier<R> {
        &self.verifier
    }

    pub fn content(&self) -> &ContentClient<S> {
        &self.content
    }

    pub fn anchor(&self) -> &AnchorService<L> {
        &self.anchor
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Enrol a device, replacing any key it already had.
    pub async fn register_device(
        &self,
        device_id: &DeviceId,
        public_key: &DevicePublicKey,
    ) -> Result<()> {
        if let Some(prefix) = &self.config.device_id_prefix {
            if !device_id.as_str().starts_with(prefix.as_str()) {
                return Err(PipelineError::InvalidInput(format!(
                    "device_id {} must start with {:?}",
                    device_id, prefix
                )));
            }
        }
        self.registry().register(device_id, public_key).await?;
        tracing::info!(device_id = %device_id, "device registered");
        Ok(())
    }

    /// Run one payload through every stage.
    ///
    /// `signature` is base64 over the canonical payload digest. The digest
    /// that is verified is the digest that gets anchored; `data` is not
    /// re-read or re-encoded in between.
    pub async fn submit(
        &self,
        device_id: &DeviceId,
        data: &SensorData,
        signature: &str,
    ) -> Result<PipelineResult> {
        let mut progress = Progress::new();
        self.submit_tracked(&mut progress, device_id, data, signature)
            .await
    }

    /// [`submit`](Self::submit), recording every state the request enters
    /// in `progress`, which must be fresh.
    ///
    /// On error, `progress` ends in the error's
    /// [`outcome`](PipelineError::outcome) when it has one.
    pub async fn submit_tracked(
        &self,
        progress: &mut Progress,
        device_id: &DeviceId,
        data: &SensorData,
        signature: &str,
    ) -> Result<PipelineResult> {
        tracing::debug!(device_id = %device_id, state = %progress.state(), "payload received");
        match self.run_stages(progress, device_id, data, signature).await {
            Ok(result) => Ok(result),
            Err(err) => {
                if let Some(outcome) = err.outcome() {
                    step(progress, device_id, outcome);
                }
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        progress: &mut Progress,
        device_id: &DeviceId,
        data: &SensorData,
        signature: &str,
    ) -> Result<PipelineResult> {
        let key = match self.registry().lookup(device_id).await {
            Ok(key) => key,
            Err(e) => {
                let err = PipelineError::from(e);
                tracing::warn!(device_id = %device_id, error = %err, "authentication failed");
                return Err(err);
            }
        };
        advance(progress, device_id);

        if !verify_with_key(&key, data, signature) {
            tracing::warn!(device_id = %device_id, "signature rejected");
            return Err(PipelineError::Signature(device_id.clone()));
        }
        let device_address = match device_id.as_address() {
            Some(address) => address,
            None => key
                .address()
                .map_err(|_| PipelineError::Signature(device_id.clone()))?,
        };
        advance(progress, device_id);

        let data_hash = payload_digest(data);
        let record = match self.content.upload(device_id, data).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(device_id = %device_id, error = %e, "storage failed");
                return Err(PipelineError::Storage(e));
            }
        };
        advance(progress, device_id);

        let anchored = self
            .anchor
            .anchor(&record.cid, &self.config.data_type, device_address, &data_hash)
            .await;
        let anchored = match anchored {
            Ok(anchored) => anchored,
            Err(source) => {
                tracing::warn!(
                    device_id = %device_id,
                    cid = %record.cid,
                    reason = source.reason(),
                    error = %source,
                    "anchoring failed; stored content is orphaned"
                );
                return Err(PipelineError::Ledger {
                    orphaned_cid: Some(record.cid),
                    source,
                });
            }
        };
        advance(progress, device_id);
        advance(progress, device_id);

        tracing::info!(
            device_id = %device_id,
            cid = %record.cid,
            tx_hash = %anchored.tx_hash,
            block_number = anchored.block_number,
            state = %progress.state(),
            "payload anchored"
        );

        Ok(PipelineResult {
            device_id: device_id.clone(),
            cid: record.cid,
            tx_hash: anchored.tx_hash,
            block_number: anchored.block_number,
            data_hash,
        })
    }

    /// The cid anchored at `index`.
    pub async fn get_commitment(&self, index: u64) -> Result<Cid> {
        Ok(self.anchor.get_commitment(index).await?)
    }

    /// Resolve the commitment at `index` to its stored payload and recompute
    /// the payload digest.
    pub async fn verify_commitment(&self, index: u64) -> Result<CommitmentReport> {
        let cid = self.get_commitment(index).await?;
        let payload = self.content.fetch(&cid).await?;
        let digest = payload_digest(&payload.data);
        Ok(CommitmentReport {
            index,
            cid,
            payload,
            digest,
        })
    }
}

impl Pipeline<SqliteRegistry, IpfsContentStore, HttpLedger> {
    /// Build the production pipeline.
    ///
    /// Validates the configuration and contacts the ledger node; any failure
    /// here is a [`ConfigError`] and the service must not start.
    pub async fn connect(config: AnchorageConfig) -> Result<Self> {
        let ledger = config.ledger.resolve()?;
        let content_url = config.content.endpoint()?;

        let rpc = HttpLedger::new(ledger.provider_url.as_str(), ledger.rpc_timeout)
            .map_err(|_| ConfigError::InvalidUrl {
                field: "provider_url",
                value: ledger.provider_url.to_string(),
            })?;
        let chain_id = rpc
            .chain_id()
            .await
            .map_err(|e| ConfigError::Unreachable(e.to_string()))?;
        if let Some(expected) = ledger.chain_id {
            if expected != chain_id {
                return Err(ConfigError::ChainMismatch {
                    expected,
                    actual: chain_id,
                }
                .into());
            }
        }

        let account = ledger.key.address();
        match rpc.balance(&account).await {
            Ok(0) => tracing::warn!(account = %account, "service account has no funds"),
            Ok(_) => {}
            Err(e) => tracing::warn!(account = %account, error = %e, "balance check failed"),
        }

        let registry = match &config.registry.database_path {
            Some(path) => SqliteRegistry::open(path),
            None => SqliteRegistry::open_memory(),
        }
        .map_err(|e| ConfigError::Registry(e.to_string()))?;

        let store = IpfsContentStore::new(content_url.as_str(), config.content.timeout())
            .map_err(|e| ConfigError::ContentStore(e.to_string()))?;

        tracing::info!(
            chain_id,
            account = %account,
            contract = %ledger.contract,
            content = %content_url,
            "pipeline connected"
        );

        let anchor = AnchorService::new(rpc, ledger.key, ledger.contract, chain_id, ledger.anchor);
        Ok(Pipeline::new(
            registry,
            ContentClient::with_timeout(store, config.content.timeout()),
            anchor,
            config.pipeline,
        ))
    }
}

impl<R, S, L> std::fmt::Debug for Pipeline<R, S, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("anchor", &self.anchor)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn step(progress: &mut Progress, device_id: &DeviceId, next: PipelineState) {
    let from = progress.state();
    if progress.enter(next) {
        tracing::debug!(device_id = %device_id, %from, to = %next, "state changed");
    } else {
        tracing::error!(device_id = %device_id, %from, to = %next, "illegal state transition refused");
    }
}

/// Step along the success path.
fn advance(progress: &mut Progress, device_id: &DeviceId) {
    if let Some(next) = progress.state().successor() {
        step(progress, device_id, next);
    }
}
