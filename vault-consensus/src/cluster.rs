//! Clustering algorithm and leader election.

use crate::types::{Cluster, ClusterConfig};
use chrono::Utc;
use vault_core::PartitionStatus;

/// Deterministic tiebreak: lexicographically smallest agent id is
/// elected leader. Documented placeholder: a real election protocol
/// (e.g. Raft-style term voting) can replace this without the rest of
/// the engine changing, since callers only ever see
/// `leader_id`/`backup_leader_id` strings.
fn elect_leader(members: &[String]) -> String {
    members.iter().min().cloned().expect("cluster must have at least one member")
}

fn elect_backup(members: &[String], leader: &str) -> Option<String> {
    members.iter().filter(|m| m.as_str() != leader).min().cloned()
}

/// "Clustering": partition greedily into clusters of size
/// `optimal`, respecting `min`/`max`, with a tail-rebalance rule: if the
/// final remainder would be `< min`, merge it into the preceding cluster
/// and split that merged group in half, unless halving would itself
/// produce an undersized half (e.g. 13 agents -> 6/7), in which case the
/// merged group is kept as a single cluster instead.
pub fn partition_into_clusters(mut agent_ids: Vec<String>, config: &ClusterConfig) -> Vec<Cluster> {
    agent_ids.sort();
    if agent_ids.is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<Vec<String>> = Vec::new();
    let mut rest = agent_ids.as_slice();
    while !rest.is_empty() {
        let take = config.optimal_size.min(rest.len());
        let (chunk, remainder) = rest.split_at(take);
        chunks.push(chunk.to_vec());
        rest = remainder;
    }

    if chunks.len() > 1 {
        let last_len = chunks.last().unwrap().len();
        if last_len < config.min_size {
            let tail = chunks.pop().unwrap();
            let mut prev = chunks.pop().unwrap();
            prev.extend(tail);
            let half = prev.len() / 2;
            if half >= config.min_size {
                // Splitting in half keeps both halves within bounds.
                let (a, b) = prev.split_at(half);
                chunks.push(a.to_vec());
                chunks.push(b.to_vec());
            } else {
                // Halving would leave one side under-sized (e.g. 13
                // agents -> 6/7). The merged chunk itself is always
                // <= optimal + (min_size - 1) <= max_size, since only
                // the final chunk before this merge could be
                // undersized, so keep it as one cluster instead.
                chunks.push(prev);
            }
        }
    }

    chunks
        .into_iter()
        .enumerate()
        .map(|(idx, members)| {
            let leader = elect_leader(&members);
            let backup = elect_backup(&members, &leader);
            Cluster {
                cluster_id: format!("cluster-{idx:04}"),
                leader_id: leader,
                backup_leader_id: backup,
                members: members.into_iter().collect(),
                last_heartbeat: Utc::now(),
                health: 1.0,
                partition_status: PartitionStatus::Connected,
            }
        })
        .collect()
}

/// "Maintain inter-cluster coordinators = set of leaders
/// (plus up to three backup leaders when cluster count > 5)".
pub fn coordinators(clusters: &[Cluster]) -> Vec<String> {
    let mut coords: Vec<String> = clusters.iter().map(|c| c.leader_id.clone()).collect();
    if clusters.len() > 5 {
        coords.extend(clusters.iter().filter_map(|c| c.backup_leader_id.clone()).take(3));
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("agent-{i:04}")).collect()
    }

    #[test]
    fn every_cluster_respects_bounds() {
        let config = ClusterConfig::default();
        let clusters = partition_into_clusters(ids(57), &config);
        for cluster in &clusters {
            assert!(cluster.size() >= config.min_size, "cluster too small: {}", cluster.size());
            assert!(cluster.size() <= config.max_size, "cluster too large: {}", cluster.size());
        }
    }

    #[test]
    fn tail_rebalance_avoids_undersized_last_cluster() {
        let config = ClusterConfig::default();
        // 12 + 12 + 2 would leave an undersized tail; rebalance should
        // fold it into two clusters of 13 each instead.
        let clusters = partition_into_clusters(ids(26), &config);
        assert!(clusters.iter().all(|c| c.size() >= config.min_size));
    }

    #[test]
    fn leader_and_backup_are_always_members() {
        let config = ClusterConfig::default();
        let clusters = partition_into_clusters(ids(40), &config);
        for cluster in &clusters {
            assert!(cluster.members.contains(&cluster.leader_id));
            if let Some(backup) = &cluster.backup_leader_id {
                assert!(cluster.members.contains(backup));
                assert_ne!(backup, &cluster.leader_id);
            }
        }
    }

    #[test]
    fn assignment_is_exclusive_and_complete() {
        let config = ClusterConfig::default();
        let agents = ids(30);
        let clusters = partition_into_clusters(agents.clone(), &config);
        let mut seen = std::collections::HashSet::new();
        for cluster in &clusters {
            for member in &cluster.members {
                assert!(seen.insert(member.clone()), "agent assigned to more than one cluster");
            }
        }
        assert_eq!(seen.len(), agents.len());
    }

    #[test]
    fn tail_of_one_merges_into_single_cluster_instead_of_undersized_halves() {
        // 12 + 1 would naively merge-and-halve into 6/7, violating
        // min_size=7. 13 is also the default pool's total agent count
        // (5 + 3 + 3 + 2), so this is the configuration every other
        // engine test implicitly exercises.
        let config = ClusterConfig::default();
        let clusters = partition_into_clusters(ids(13), &config);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].size(), 13);
        assert!(clusters.iter().all(|c| c.invariant_holds(config.min_size, config.max_size)));
    }

    #[test]
    fn larger_tail_of_one_cases_stay_within_bounds() {
        let config = ClusterConfig::default();
        for n in [25usize, 37] {
            let clusters = partition_into_clusters(ids(n), &config);
            for cluster in &clusters {
                assert!(cluster.size() >= config.min_size, "n={n}: cluster too small: {}", cluster.size());
                assert!(cluster.size() <= config.max_size, "n={n}: cluster too large: {}", cluster.size());
            }
            let total: usize = clusters.iter().map(|c| c.size()).sum();
            assert_eq!(total, n);
        }
    }

    #[test]
    fn single_undersized_cluster_is_allowed_when_it_is_the_only_one() {
        // Fewer agents than `min` total: one cluster, necessarily
        // under-sized. The bound is only guaranteed when enough agents
        // exist to split into >= min-sized groups.
        let config = ClusterConfig::default();
        let clusters = partition_into_clusters(ids(3), &config);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].size(), 3);
    }
}
