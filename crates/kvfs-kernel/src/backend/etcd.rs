//! etcd v3 backend (also works against xline).
//!
//! A read reports the key's `mod_revision` as its version. Commit conditions
//! become `Compare::mod_revision(key) == v`, or `Compare::version(key) == 0`
//! for [`Version::ABSENT`], and the whole batch goes out as one etcd `Txn`.

use async_trait::async_trait;
use etcd_client::{Client, Compare, CompareOp, KvClient, Txn, TxnOp};

use kvfs_types::Version;

use super::{BackendResult, CommitBatch, CommitOutcome, KvBackend, Versioned, WriteOp};

/// etcd-backed store. Every inode key is stored as `<prefix><hex id>`.
#[derive(Clone)]
pub struct EtcdKv {
    kv: KvClient,
    prefix: String,
}

impl std::fmt::Debug for EtcdKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdKv")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl EtcdKv {
    /// Connect to a cluster. `prefix` namespaces every key (may be empty).
    pub async fn connect<E: AsRef<str>>(endpoints: &[E], prefix: impl Into<String>) -> BackendResult<Self> {
        let client = Client::connect(endpoints, None).await?;
        let prefix = prefix.into();
        tracing::info!(endpoints = endpoints.len(), prefix = %prefix, "kv.etcd: connected");
        Ok(Self::from_client(client, prefix))
    }

    /// Wrap an already connected client.
    pub fn from_client(client: Client, prefix: impl Into<String>) -> Self {
        Self {
            kv: client.kv_client(),
            prefix: prefix.into(),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl KvBackend for EtcdKv {
    async fn get(&self, key: &str) -> BackendResult<Option<Versioned>> {
        let mut kv = self.kv.clone();
        let resp = kv.get(self.full_key(key), None).await?;
        Ok(resp.kvs().first().map(|entry| Versioned {
            value: entry.value().to_vec(),
            version: Version::new(entry.mod_revision()),
        }))
    }

    #[tracing::instrument(level = "debug", skip_all, name = "kv.commit", fields(backend = "etcd", writes = batch.writes.len()))]
    async fn commit(&self, batch: CommitBatch) -> BackendResult<CommitOutcome> {
        let compares: Vec<Compare> = batch
            .conditions
            .iter()
            .map(|cond| {
                let key = self.full_key(&cond.key);
                if cond.expected.is_absent() {
                    Compare::version(key, CompareOp::Equal, 0)
                } else {
                    Compare::mod_revision(key, CompareOp::Equal, cond.expected.as_raw())
                }
            })
            .collect();

        let ops: Vec<TxnOp> = batch
            .writes
            .into_iter()
            .map(|write| match write {
                WriteOp::Put { key, value } => TxnOp::put(self.full_key(&key), value, None),
                WriteOp::Delete { key } => TxnOp::delete(self.full_key(&key), None),
            })
            .collect();

        let txn = Txn::new().when(compares).and_then(ops);
        let mut kv = self.kv.clone();
        let resp = kv.txn(txn).await?;

        if resp.succeeded() {
            Ok(CommitOutcome::Committed)
        } else {
            tracing::debug!("kv.etcd: txn compare failed");
            Ok(CommitOutcome::Conflict)
        }
    }

    fn name(&self) -> &'static str {
        "etcd"
    }
}
