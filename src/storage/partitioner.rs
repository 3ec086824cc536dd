use crate::config::{ConfigError, RouterConfig};
use crate::roster::types::TenantKey;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// Logical routing unit in `[0, partitions)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionId(pub u32);

/// Physical routing unit in `[0, shards)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardId(pub u32);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Where every storage call for a tenant goes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Route {
    pub partition: PartitionId,
    pub shard: ShardId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterDistribution {
    pub total: u64,
    pub shards: Vec<u64>,
    pub partitions: Vec<u64>,
}

/// 32-bit FNV-1a over the raw bytes.
///
/// Changing this function re-homes every tenant, so it must stay fixed for the
/// lifetime of the stored data.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Maps tenant keys to partitions, and partitions to shards by contiguous ranges.
///
/// Routing is pure apart from the distribution counters.
pub struct PartitionRouter {
    num_partitions: u32,
    num_shards: u32,
    partitions_per_shard: u32,
    shard_hits: Vec<AtomicU64>,
    partition_hits: Vec<AtomicU64>,
}

impl PartitionRouter {
    pub fn new(config: &RouterConfig) -> Result<Self, ConfigError> {
        let RouterConfig { partitions, shards } = *config;
        if partitions == 0 {
            return Err(ConfigError::NoPartitions);
        }
        if shards == 0 || shards > partitions {
            return Err(ConfigError::InvalidShardCount { partitions, shards });
        }
        if partitions % shards != 0 {
            return Err(ConfigError::UnevenShards { partitions, shards });
        }

        Ok(Self {
            num_partitions: partitions,
            num_shards: shards,
            partitions_per_shard: partitions / shards,
            shard_hits: (0..shards).map(|_| AtomicU64::new(0)).collect(),
            partition_hits: (0..partitions).map(|_| AtomicU64::new(0)).collect(),
        })
    }

    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    pub fn num_shards(&self) -> u32 {
        self.num_shards
    }

    pub fn partition_for(&self, key: &TenantKey) -> PartitionId {
        PartitionId(fnv1a_32(key.as_str().as_bytes()) % self.num_partitions)
    }

    /// # Panics
    /// If `partition` lies outside `[0, partitions)`. Only a caller bug can get here.
    pub fn shard_for_partition(&self, partition: PartitionId) -> ShardId {
        assert!(
            partition.0 < self.num_partitions,
            "partition {} out of range 0..{}",
            partition.0,
            self.num_partitions
        );
        ShardId(partition.0 / self.partitions_per_shard)
    }

    pub fn route(&self, key: &TenantKey) -> Route {
        let partition = self.partition_for(key);
        let shard = self.shard_for_partition(partition);

        self.shard_hits[shard.0 as usize].fetch_add(1, Ordering::Relaxed);
        self.partition_hits[partition.0 as usize].fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Routed tenant {} -> {} / {}", key, partition, shard);

        Route { partition, shard }
    }

    /// The partition range owned by each shard, indexed by shard id.
    pub fn shard_ranges(&self) -> Vec<Range<u32>> {
        (0..self.num_shards)
            .map(|shard| {
                let start = shard * self.partitions_per_shard;
                start..start + self.partitions_per_shard
            })
            .collect()
    }

    pub fn distribution(&self) -> RouterDistribution {
        let shards: Vec<u64> = self
            .shard_hits
            .iter()
            .map(|hits| hits.load(Ordering::Relaxed))
            .collect();
        let partitions = self
            .partition_hits
            .iter()
            .map(|hits| hits.load(Ordering::Relaxed))
            .collect();

        RouterDistribution {
            total: shards.iter().sum(),
            shards,
            partitions,
        }
    }

    pub fn reset_counters(&self) {
        for hits in self.shard_hits.iter().chain(self.partition_hits.iter()) {
            hits.store(0, Ordering::Relaxed);
        }
    }
}
