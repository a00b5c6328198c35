//! Probabilistic fault injection with a seedable RNG.

use std::{future::Future, sync::Mutex};

use nutype::nutype;
use rand::{random, rngs::StdRng, Rng, SeedableRng};
use searchcore_types::{
    Acknowledged, ClusterError, DocumentId, DocumentVersion, IndexAck, IndexName, MappingSchema,
    OpType, SearchCluster, SearchHits, SearchQuery, StoredDocument,
};
use serde_json::Value;

/// Probability value for chaos engineering injection rates.
///
/// `Probability` represents a value in the range `[0.0, 1.0]` where 0.0 means
/// never inject failures and 1.0 means always inject failures.
///
/// # Examples
///
/// ```ignore
/// use searchcore_testing::chaos::Probability;
///
/// let never = Probability::try_new(0.0).unwrap();
/// let always = Probability::try_new(1.0).unwrap();
///
/// // Values outside the range are rejected
/// assert!(Probability::try_new(1.5).is_err());
/// ```
#[nutype(
    validate(greater_or_equal = 0.0, less_or_equal = 1.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Display, Into)
)]
pub struct Probability(f32);

impl Probability {
    fn clamped(probability: f32) -> Self {
        Self::try_new(probability.clamp(0.0, 1.0)).expect("clamped value is always valid")
    }
}

/// Injection rates and RNG seeding for a [`ChaosCluster`].
///
/// The default injects nothing and seeds from system randomness.
#[derive(Debug, Clone)]
pub struct ChaosConfig {
    deterministic_seed: Option<u64>,
    transient_probability: Probability,
    lost_ack_probability: Probability,
}

impl ChaosConfig {
    /// Config seeded with 0, so every run makes the same decisions.
    pub fn deterministic() -> Self {
        Self {
            deterministic_seed: Some(0),
            ..Self::default()
        }
    }

    /// Seed the RNG with `seed`.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.deterministic_seed = Some(seed);
        self
    }

    /// Chance that a call fails with a transient node error before reaching
    /// the wrapped cluster.
    #[must_use]
    pub fn with_transient_probability(mut self, probability: f32) -> Self {
        self.transient_probability = Probability::clamped(probability);
        self
    }

    /// Chance that a successful write has its acknowledgement replaced by a
    /// node disconnect.
    #[must_use]
    pub fn with_lost_ack_probability(mut self, probability: f32) -> Self {
        self.lost_ack_probability = Probability::clamped(probability);
        self
    }
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            deterministic_seed: None,
            transient_probability: Probability::try_new(0.0).expect("0.0 is valid probability"),
            lost_ack_probability: Probability::try_new(0.0).expect("0.0 is valid probability"),
        }
    }
}

/// Wrap any cluster in a [`ChaosCluster`].
pub trait ChaosClusterExt: Sized {
    /// Inject faults into calls to `self` according to `config`.
    fn with_chaos(self, config: ChaosConfig) -> ChaosCluster<Self>;
}

/// What chaos decided for one call.
enum Injection {
    None,
    Transient(ClusterError),
    LostAck(ClusterError),
}

/// Cluster wrapper that fails calls and drops write acknowledgements at
/// random.
pub struct ChaosCluster<C> {
    cluster: C,
    config: ChaosConfig,
    rng: Mutex<StdRng>,
}

impl<C> ChaosCluster<C> {
    /// Wrap `cluster`, injecting faults according to `config`.
    pub fn new(cluster: C, config: ChaosConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.deterministic_seed.unwrap_or_else(random));

        Self {
            cluster,
            config,
            rng: Mutex::new(rng),
        }
    }

    /// The wrapped cluster.
    pub const fn inner(&self) -> &C {
        &self.cluster
    }

    fn should_inject(&self, probability: Probability) -> bool {
        let prob_f32: f32 = probability.into();

        if prob_f32 <= 0.0 {
            return false;
        }

        if prob_f32 >= 1.0 {
            return true;
        }

        let mut rng = self
            .rng
            .lock()
            .expect("chaos RNG mutex should not be poisoned");

        rng.random_bool(f64::from(prob_f32))
    }

    fn transient_error(&self) -> ClusterError {
        let pick = self
            .rng
            .lock()
            .expect("chaos RNG mutex should not be poisoned")
            .random_range(0..4);

        match pick {
            0 => ClusterError::node_disconnected("chaos-node"),
            1 => ClusterError::no_node_available(),
            2 => ClusterError::no_shard_available("chaos"),
            _ => ClusterError::cluster_blocked("SERVICE_UNAVAILABLE/2/no master"),
        }
    }

    fn read_injection(&self) -> Injection {
        if self.should_inject(self.config.transient_probability) {
            Injection::Transient(self.transient_error())
        } else {
            Injection::None
        }
    }

    fn write_injection(&self) -> Injection {
        if self.should_inject(self.config.transient_probability) {
            Injection::Transient(self.transient_error())
        } else if self.should_inject(self.config.lost_ack_probability) {
            Injection::LostAck(ClusterError::node_disconnected("chaos-node"))
        } else {
            Injection::None
        }
    }
}

async fn inject<T, F>(injection: Injection, call: F) -> Result<T, ClusterError>
where
    F: Future<Output = Result<T, ClusterError>> + Send,
    T: Send,
{
    match injection {
        Injection::None => call.await,
        Injection::Transient(error) => Err(error),
        Injection::LostAck(error) => call.await.and(Err(error)),
    }
}

impl<C> SearchCluster for ChaosCluster<C>
where
    C: SearchCluster + Sync,
{
    fn attempt_index(
        &self,
        index: &IndexName,
        id: &DocumentId,
        source: &Value,
        op_type: OpType,
        expected_version: Option<DocumentVersion>,
    ) -> impl Future<Output = Result<IndexAck, ClusterError>> + Send {
        inject(
            self.write_injection(),
            self.cluster
                .attempt_index(index, id, source, op_type, expected_version),
        )
    }

    fn attempt_get(
        &self,
        index: &IndexName,
        id: &DocumentId,
        realtime: bool,
    ) -> impl Future<Output = Result<Option<StoredDocument>, ClusterError>> + Send {
        inject(
            self.read_injection(),
            self.cluster.attempt_get(index, id, realtime),
        )
    }

    fn attempt_update(
        &self,
        index: &IndexName,
        id: &DocumentId,
        source: &Value,
        expected_version: Option<DocumentVersion>,
    ) -> impl Future<Output = Result<IndexAck, ClusterError>> + Send {
        inject(
            self.write_injection(),
            self.cluster
                .attempt_update(index, id, source, expected_version),
        )
    }

    fn attempt_delete(
        &self,
        index: &IndexName,
        id: &DocumentId,
        expected_version: Option<DocumentVersion>,
    ) -> impl Future<Output = Result<IndexAck, ClusterError>> + Send {
        inject(
            self.write_injection(),
            self.cluster.attempt_delete(index, id, expected_version),
        )
    }

    fn attempt_search(
        &self,
        index: &IndexName,
        query: &SearchQuery,
    ) -> impl Future<Output = Result<SearchHits, ClusterError>> + Send {
        inject(self.read_injection(), self.cluster.attempt_search(index, query))
    }

    fn attempt_put_mapping(
        &self,
        index: &IndexName,
        schema: &MappingSchema,
    ) -> impl Future<Output = Result<Acknowledged, ClusterError>> + Send {
        inject(
            self.write_injection(),
            self.cluster.attempt_put_mapping(index, schema),
        )
    }

    fn attempt_flush(
        &self,
        index: &IndexName,
    ) -> impl Future<Output = Result<Acknowledged, ClusterError>> + Send {
        inject(self.read_injection(), self.cluster.attempt_flush(index))
    }
}

impl<C> ChaosClusterExt for C
where
    C: SearchCluster + Sync,
{
    fn with_chaos(self, config: ChaosConfig) -> ChaosCluster<Self> {
        ChaosCluster::new(self, config)
    }
}
