use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Strategy selecting one address from a resolved candidate set
pub trait LoadBalancer: Send + Sync {
    fn select(&self, candidates: &[SocketAddr]) -> Option<SocketAddr>;
}

/// Uniform-random selection, the default strategy
#[derive(Debug, Default)]
pub struct RandomBalancer;

impl RandomBalancer {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for RandomBalancer {
    fn select(&self, candidates: &[SocketAddr]) -> Option<SocketAddr> {
        if candidates.is_empty() {
            return None;
        }

        use rand::Rng;
        let mut rng = rand::thread_rng();
        let index = rng.gen_range(0..candidates.len());
        Some(candidates[index])
    }
}

/// Round-robin selection with rotation state scoped to this instance.
///
/// The counter is atomic, so concurrent calls each take a distinct slot: for
/// a stable candidate set of size N, N consecutive calls visit every
/// candidate exactly once in list order, starting from wherever the rotation
/// currently stands.
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    counter: AtomicUsize,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobinBalancer {
    fn select(&self, candidates: &[SocketAddr]) -> Option<SocketAddr> {
        if candidates.is_empty() {
            return None;
        }

        let slot = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(candidates[slot % candidates.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(ports: &[u16]) -> Vec<SocketAddr> {
        ports
            .iter()
            .map(|p| format!("127.0.0.1:{}", p).parse().unwrap())
            .collect()
    }

    #[test]
    fn test_round_robin_cycles_through_all_candidates() {
        let balancer = RoundRobinBalancer::new();
        let candidates = addrs(&[8080, 8081, 8082]);

        let first = balancer.select(&candidates).unwrap();
        let second = balancer.select(&candidates).unwrap();
        let third = balancer.select(&candidates).unwrap();
        let fourth = balancer.select(&candidates).unwrap();

        // One full cycle visits each candidate exactly once
        let mut cycle = vec![first, second, third];
        cycle.sort();
        let mut expected = candidates.clone();
        expected.sort();
        assert_eq!(cycle, expected);

        // The fourth call restarts the cycle
        assert_eq!(fourth, first);
    }

    #[test]
    fn test_round_robin_follows_list_order() {
        let balancer = RoundRobinBalancer::new();
        let candidates = addrs(&[1, 2, 3]);

        let first = balancer.select(&candidates).unwrap();
        let start = candidates.iter().position(|a| *a == first).unwrap();

        let second = balancer.select(&candidates).unwrap();
        assert_eq!(second, candidates[(start + 1) % candidates.len()]);
    }

    #[test]
    fn test_rotation_state_is_per_instance() {
        let candidates = addrs(&[1, 2]);
        let a = RoundRobinBalancer::new();
        let b = RoundRobinBalancer::new();

        let first_a = a.select(&candidates).unwrap();
        let first_b = b.select(&candidates).unwrap();
        // Fresh instances start from the same offset; advancing one does not
        // advance the other
        assert_eq!(first_a, first_b);
        a.select(&candidates);
        assert_eq!(b.select(&candidates).unwrap(), candidates[1]);
    }

    #[test]
    fn test_random_selects_a_member() {
        let balancer = RandomBalancer::new();
        let candidates = addrs(&[1, 2, 3]);

        for _ in 0..20 {
            let selected = balancer.select(&candidates).unwrap();
            assert!(candidates.contains(&selected));
        }
    }

    #[test]
    fn test_empty_candidates() {
        assert!(RandomBalancer::new().select(&[]).is_none());
        assert!(RoundRobinBalancer::new().select(&[]).is_none());
    }
}
