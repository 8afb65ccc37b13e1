use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::RingError;
use crate::{ClusterMember, NodeId, Role};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Hashes a routing key with the 32 bit FNV-1a hash.
pub fn hash_key(key: &[u8]) -> u32 {
    key.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ *byte as u32).wrapping_mul(FNV_PRIME)
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A single partition of the ring.
///
/// The entry owns every hash above the previous entry's bound up to,
/// but not including, its own bound.
pub struct RingEntry {
    node_id: NodeId,
    bound: u32,
}

impl RingEntry {
    #[inline]
    /// The node owning the partition.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    #[inline]
    /// The exclusive upper bound of the partition.
    pub fn bound(&self) -> u32 {
        self.bound
    }
}

#[derive(Debug, Default)]
/// Splits the 32 bit hash space into equally sized partitions, one per ring member.
///
/// Every time a member joins or leaves, the partitions are recomputed from
/// scratch over the current members in the order they joined. This keeps the
/// load perfectly balanced but means any change may move the owner of any key.
pub struct Ring {
    entries: RwLock<Vec<RingEntry>>,
}

impl Ring {
    /// Seeds the ring from a snapshot of currently known nodes.
    ///
    /// Only [Role::RingMember] nodes are added.
    pub fn join<'a>(&self, members: impl IntoIterator<Item = &'a ClusterMember>) {
        for member in members {
            self.notify_join(member);
        }
    }

    /// Adds a node to the ring if it is a ring member and not already present.
    pub fn notify_join(&self, member: &ClusterMember) {
        if member.role != Role::RingMember {
            debug!(
                node_id = %member.node_id,
                role = %member.role,
                "Ignoring join of node which is not a ring member."
            );
            return;
        }

        let mut entries = self.entries.write();
        if entries.iter().any(|e| e.node_id == member.node_id) {
            return;
        }

        entries.push(RingEntry {
            node_id: member.node_id.clone(),
            bound: 0,
        });
        compute_ring(&mut entries);

        info!(
            node_id = %member.node_id,
            num_entries = entries.len(),
            "Node has joined the ring."
        );
    }

    /// Removes a node from the ring, recomputing the remaining partitions.
    pub fn notify_leave(&self, member: &ClusterMember) {
        if member.role != Role::RingMember {
            return;
        }

        let mut entries = self.entries.write();
        let idx = match entries.iter().position(|e| e.node_id == member.node_id) {
            Some(idx) => idx,
            None => return,
        };

        entries.remove(idx);
        compute_ring(&mut entries);

        info!(
            node_id = %member.node_id,
            num_entries = entries.len(),
            "Node has left the ring."
        );
    }

    /// Role changes are not supported, a node keeps the ring status it joined with.
    pub fn notify_update(&self, member: &ClusterMember) {
        debug!(
            node_id = %member.node_id,
            role = %member.role,
            "Ignoring node update."
        );
    }

    /// Gets the ID of the node owning the given key.
    pub fn get_node_id(&self, key: &[u8]) -> Result<NodeId, RingError> {
        self.get_node_id_for_hash(hash_key(key))
    }

    pub(crate) fn get_node_id_for_hash(&self, hash: u32) -> Result<NodeId, RingError> {
        let entries = self.entries.read();

        if entries.is_empty() {
            return Err(RingError::EmptyRing);
        }

        // The first entry with a bound strictly above the hash, wrapping
        // around to the start when the hash is past every bound.
        let idx = entries.partition_point(|e| e.bound <= hash);
        let idx = if idx == entries.len() { 0 } else { idx };

        Ok(entries[idx].node_id.clone())
    }

    /// A snapshot of the current ring entries, sorted by bound.
    pub fn entries(&self) -> Vec<RingEntry> {
        self.entries.read().clone()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Assigns each entry the bound `i * floor((2^32 - 1) / N)` for `i = 1..=N`,
/// preserving the existing order of the entries.
fn compute_ring(entries: &mut [RingEntry]) {
    if entries.is_empty() {
        return;
    }

    let interval = u32::MAX / entries.len() as u32;
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.bound = interval * (i as u32 + 1);
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use rand::Rng;

    use super::*;

    fn member(name: &str, role: Role) -> ClusterMember {
        let addr: SocketAddr = "127.0.0.1:7946".parse().unwrap();
        ClusterMember::new(name.to_string(), addr, addr, role)
    }

    fn ring_of(names: &[&str]) -> Ring {
        let members = names
            .iter()
            .map(|name| member(name, Role::RingMember))
            .collect::<Vec<_>>();
        let ring = Ring::default();
        ring.join(&members);
        ring
    }

    fn bounds(ring: &Ring) -> Vec<(String, u32)> {
        ring.entries()
            .into_iter()
            .map(|e| (e.node_id, e.bound))
            .collect()
    }

    fn assert_partitioned(ring: &Ring) {
        let entries = ring.entries();
        for pair in entries.windows(2) {
            assert!(
                pair[0].bound < pair[1].bound,
                "Bounds should be strictly increasing: {:?}",
                entries
            );
        }
        if let Some(last) = entries.last() {
            let interval = u32::MAX / entries.len() as u32;
            assert_eq!(last.bound, interval * entries.len() as u32);
        }
    }

    #[test]
    fn test_fnv1a_vectors() {
        assert_eq!(hash_key(b""), 0x811c9dc5);
        assert_eq!(hash_key(b"a"), 0xe40c292c);
        assert_eq!(hash_key(b"foo"), 0xa9f37ed7);
        assert_eq!(hash_key(b"foobar"), 0xbf9cf968);
    }

    #[test]
    fn test_empty_ring() {
        let ring = Ring::default();
        assert_eq!(ring.get_node_id(b"foo"), Err(RingError::EmptyRing));
        assert!(ring.is_empty());
    }

    #[test]
    fn test_single_member_owns_everything() {
        let ring = ring_of(&["A"]);
        assert_eq!(bounds(&ring), vec![("A".to_string(), u32::MAX)]);
        assert_eq!(ring.get_node_id_for_hash(0).unwrap(), "A");
        assert_eq!(ring.get_node_id_for_hash(u32::MAX).unwrap(), "A");
    }

    #[test]
    fn test_three_members_then_leave() {
        let ring = ring_of(&["A", "B", "C"]);
        assert_eq!(
            bounds(&ring),
            vec![
                ("A".to_string(), 1431655765),
                ("B".to_string(), 2863311530),
                ("C".to_string(), 4294967295),
            ]
        );

        ring.notify_leave(&member("B", Role::RingMember));
        assert_eq!(
            bounds(&ring),
            vec![("A".to_string(), 2147483647), ("C".to_string(), 4294967294)],
            "All bounds should be recomputed over the survivors in join order."
        );
    }

    #[test]
    fn test_round_trip_lookup() {
        let ring = ring_of(&["A", "B", "C"]);
        let hash = hash_key(b"foo");

        let expected = ring
            .entries()
            .into_iter()
            .find(|e| e.bound() > hash)
            .map(|e| e.node_id)
            .unwrap_or_else(|| "A".to_string());

        assert_eq!(ring.get_node_id(b"foo").unwrap(), expected);
        assert_eq!(expected, "B", "fnv1a(foo) = 2851307223 sits in B's partition.");
        assert_eq!(ring.get_node_id(b"abc").unwrap(), "A");
    }

    #[test]
    fn test_bound_is_exclusive() {
        let ring = ring_of(&["A", "B", "C"]);
        assert_eq!(ring.get_node_id_for_hash(1431655764).unwrap(), "A");
        assert_eq!(ring.get_node_id_for_hash(1431655765).unwrap(), "B");
        assert_eq!(ring.get_node_id_for_hash(2863311530).unwrap(), "C");
    }

    #[test]
    fn test_wrap_around() {
        let ring = ring_of(&["A", "B"]);
        // The final bound is 4294967294 so the very top of the hash space wraps.
        assert_eq!(ring.get_node_id_for_hash(u32::MAX).unwrap(), "A");
        assert_eq!(ring.get_node_id_for_hash(4294967294).unwrap(), "A");
        assert_eq!(ring.get_node_id_for_hash(4294967293).unwrap(), "B");
    }

    #[test]
    fn test_determinism() {
        let ring = ring_of(&["A", "B", "C", "D", "E"]);
        for i in 0..1_000u32 {
            let key = format!("key-{i}");
            let first = ring.get_node_id(key.as_bytes()).unwrap();
            let second = ring.get_node_id(key.as_bytes()).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_join_is_idempotent() {
        let ring = ring_of(&["A", "B"]);
        let before = bounds(&ring);

        ring.notify_join(&member("A", Role::RingMember));
        ring.join(&[member("B", Role::RingMember)]);
        assert_eq!(bounds(&ring), before);
    }

    #[test]
    fn test_non_members_ignored() {
        let ring = ring_of(&["A"]);
        ring.notify_join(&member("gateway", Role::Watcher));
        ring.notify_join(&member("mystery", Role::Unknown));
        assert_eq!(ring.len(), 1);

        ring.notify_leave(&member("gateway", Role::Watcher));
        ring.notify_leave(&member("missing", Role::RingMember));
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_update_is_noop() {
        let ring = ring_of(&["A", "B"]);
        let before = bounds(&ring);

        ring.notify_update(&member("A", Role::Watcher));
        assert_eq!(bounds(&ring), before, "Role changes are not applied.");
    }

    #[test]
    fn test_partition_invariant_random_churn() {
        let mut rng = rand::thread_rng();
        let ring = Ring::default();
        let mut expected: Vec<String> = Vec::new();

        for _ in 0..500 {
            let name = format!("node-{}", rng.gen_range(0..16));
            if rng.gen_bool(0.6) {
                ring.notify_join(&member(&name, Role::RingMember));
                if !expected.contains(&name) {
                    expected.push(name);
                }
            } else {
                ring.notify_leave(&member(&name, Role::RingMember));
                expected.retain(|n| n != &name);
            }

            assert_eq!(ring.len(), expected.len());
            let order = ring
                .entries()
                .into_iter()
                .map(|e| e.node_id)
                .collect::<Vec<_>>();
            assert_eq!(order, expected, "Entries should keep join order.");
            assert_partitioned(&ring);

            let key = format!("probe-{}", rng.gen::<u64>());
            match ring.get_node_id(key.as_bytes()) {
                Ok(node_id) => assert!(expected.contains(&node_id)),
                Err(e) => {
                    assert_eq!(e, RingError::EmptyRing);
                    assert!(expected.is_empty());
                },
            }
        }
    }
}
