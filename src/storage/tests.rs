//! Storage Module Tests
//!
//! ## Test Scopes
//! - **Partitioner**: stable routing, contiguous exhaustive shard ranges, counters.
//! - **InMemoryRosterStore**: per-shard placement, history close/open, fault injection.

#[cfg(test)]
mod tests {
    use crate::config::{ConfigError, RouterConfig};
    use crate::fixtures;
    use crate::roster::types::{EpochRef, Roster, RosterKey, TenantKey};
    use crate::storage::memory::InMemoryRosterStore;
    use crate::storage::partitioner::{PartitionId, PartitionRouter, ShardId};
    use crate::storage::protocol::RosterStore;

    fn router() -> PartitionRouter {
        PartitionRouter::new(&RouterConfig::default()).unwrap()
    }

    fn roster(tenant: &str, team_no: u32, epoch: EpochRef) -> Roster {
        let draft = fixtures::valid_draft();
        Roster {
            key: RosterKey::new(TenantKey::new(tenant), team_no),
            epoch,
            main_slots: draft.main_slots,
            reserve_slots: draft.reserve_slots,
            valuation: 68.0,
            remaining_budget: 32.0,
            captain_id: draft.captain_id,
            vice_captain_id: draft.vice_captain_id,
            booster: None,
            transfers_allowed: 5,
            transfers_made: 0,
            updated_at: 0,
        }
    }

    // ============================================================
    // PARTITIONER TESTS
    // ============================================================

    #[test]
    fn test_route_is_stable() {
        let router = router();

        for user_id in 0..500 {
            let key = fixtures::tenant_key(user_id);
            let first = router.route(&key);
            let second = router.route(&key);
            assert_eq!(first, second, "Routing for {} should not change", key);
        }
    }

    #[test]
    fn test_partitions_stay_in_range() {
        let router = router();

        for i in 0..1000 {
            let key = TenantKey::new(format!("tenant_{}", i));
            let route = router.route(&key);
            assert!(route.partition.0 < router.num_partitions());
            assert!(route.shard.0 < router.num_shards());
        }
    }

    #[test]
    fn test_shard_ranges_are_contiguous_and_exhaustive() {
        // ARRANGE
        let router = router();

        // ACT
        let ranges = router.shard_ranges();

        // ASSERT: 0..10, 10..20, 20..30 with no gaps or overlaps
        assert_eq!(ranges, vec![0..10, 10..20, 20..30]);
        for partition in 0..router.num_partitions() {
            let owners: Vec<usize> = ranges
                .iter()
                .enumerate()
                .filter(|(_, range)| range.contains(&partition))
                .map(|(shard, _)| shard)
                .collect();
            assert_eq!(owners.len(), 1, "partition {} must have exactly one owner", partition);
            assert_eq!(
                router.shard_for_partition(PartitionId(partition)),
                ShardId(owners[0] as u32)
            );
        }
    }

    #[test]
    fn test_shard_mapping_uses_ranges_not_modulo() {
        let router = router();

        assert_eq!(router.shard_for_partition(PartitionId(1)), ShardId(0));
        assert_eq!(router.shard_for_partition(PartitionId(9)), ShardId(0));
        assert_eq!(router.shard_for_partition(PartitionId(10)), ShardId(1));
        assert_eq!(router.shard_for_partition(PartitionId(29)), ShardId(2));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_partition_is_fatal() {
        let router = router();
        router.shard_for_partition(PartitionId(30));
    }

    #[test]
    fn test_distribution_counts_every_route() {
        // ARRANGE
        let router = router();

        // ACT
        for user_id in 0..300 {
            router.route(&fixtures::tenant_key(user_id));
        }
        let distribution = router.distribution();

        // ASSERT
        assert_eq!(distribution.total, 300);
        assert_eq!(distribution.shards.len(), 3);
        assert_eq!(distribution.partitions.len(), 30);
        assert_eq!(distribution.partitions.iter().sum::<u64>(), 300);
        assert!(distribution.shards.iter().all(|hits| *hits > 0));

        router.reset_counters();
        assert_eq!(router.distribution().total, 0);
    }

    #[test]
    fn test_router_rejects_uneven_config() {
        let result = PartitionRouter::new(&RouterConfig {
            partitions: 31,
            shards: 3,
        });

        assert!(matches!(
            result,
            Err(ConfigError::UnevenShards {
                partitions: 31,
                shards: 3
            })
        ));
    }

    // ============================================================
    // IN-MEMORY STORE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_put_and_get_on_routed_shard() {
        // ARRANGE
        let router = router();
        let store = InMemoryRosterStore::new();
        let epoch = EpochRef::new(2025, 1, 1);
        let team = roster("fb_000000001", 1, epoch);
        let route = router.route(&team.key.tenant);

        // ACT
        store.put_roster_latest(route, &team, &epoch).await.unwrap();

        // ASSERT
        let loaded = store.get_roster(route, &team.key).await.unwrap();
        assert_eq!(loaded, Some(team.clone()));
        assert!(store.has_shard(route.shard.0));
        assert_eq!(store.roster_count(), 1);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_list_rosters_filters_by_tenant() {
        let router = router();
        let store = InMemoryRosterStore::new();
        let epoch = EpochRef::new(2025, 1, 1);
        let tenant = TenantKey::new("ap_000000002");
        let route = router.route(&tenant);

        for team_no in [2, 1] {
            store
                .put_roster_latest(route, &roster(tenant.as_str(), team_no, epoch), &epoch)
                .await
                .unwrap();
        }
        // Same shard, different tenant.
        store
            .put_roster_latest(route, &roster("someone_else", 1, epoch), &epoch)
            .await
            .unwrap();

        let listed = store.list_rosters(route, &tenant).await.unwrap();

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].key.team_no, 1);
        assert_eq!(listed[1].key.team_no, 2);
    }

    #[tokio::test]
    async fn test_close_history_marks_open_snapshot() {
        // ARRANGE
        let router = router();
        let store = InMemoryRosterStore::new();
        let first = EpochRef::new(2025, 1, 1);
        let second = EpochRef::new(2025, 2, 1);
        let team = roster("tw_000000003", 1, first);
        let route = router.route(&team.key.tenant);
        store.append_roster_history(route, &first, &team).await.unwrap();

        // ACT
        let closed = store
            .close_roster_history(route, &team.key, &first, &second)
            .await
            .unwrap();
        let again = store
            .close_roster_history(route, &team.key, &first, &second)
            .await
            .unwrap();

        // ASSERT: closing is a no-op once nothing is open
        assert!(closed);
        assert!(!again);
        let history = store.roster_history(route, &team.key).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].to_epoch, Some(second));
        assert!(!history[0].is_open());
    }

    #[tokio::test]
    async fn test_close_history_without_rows_is_noop() {
        let router = router();
        let store = InMemoryRosterStore::new();
        let key = RosterKey::new(TenantKey::new("fb_000000008"), 1);
        let route = router.route(&key.tenant);
        let epoch = EpochRef::new(2025, 1, 1);

        let closed = store
            .close_roster_history(route, &key, &epoch, &EpochRef::new(2025, 2, 1))
            .await
            .unwrap();

        assert!(!closed);
    }

    #[tokio::test]
    async fn test_injected_write_failure_hits_exactly_one_write() {
        // ARRANGE
        let router = router();
        let store = InMemoryRosterStore::new();
        let epoch = EpochRef::new(2025, 1, 1);
        let team = roster("gg_000000005", 1, epoch);
        let route = router.route(&team.key.tenant);
        store.fail_write_after(1);

        // ACT
        let first = store.put_roster_latest(route, &team, &epoch).await;
        let second = store.append_roster_history(route, &epoch, &team).await;
        let third = store.append_roster_history(route, &epoch, &team).await;

        // ASSERT
        assert!(first.is_ok());
        assert!(second.is_err());
        assert!(third.is_ok());
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_injected_read_failure() {
        let router = router();
        let store = InMemoryRosterStore::new();
        let key = RosterKey::new(TenantKey::new("fb_000000012"), 1);
        let route = router.route(&key.tenant);
        store.set_fail_reads(true);

        let result = store.get_roster(route, &key).await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("get_roster"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_latency_delays_calls() {
        let router = router();
        let store = InMemoryRosterStore::new().with_latency(std::time::Duration::from_millis(25));
        let key = RosterKey::new(TenantKey::new("fb_000000016"), 1);
        let route = router.route(&key.tenant);

        let started = tokio::time::Instant::now();
        store.get_roster(route, &key).await.unwrap();

        assert!(started.elapsed() >= std::time::Duration::from_millis(25));
        assert_eq!(store.read_count(), 1);
    }
}
