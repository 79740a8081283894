//! User-Agent identity pool.
//!
//! Provides sequential (round-robin) and random selection over a set of
//! browser identity strings so consecutive requests do not present a single
//! static identity.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

/// Realistic set of modern desktop browser User-Agents used when no custom
/// list is supplied.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    // Chrome Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    // Chrome Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    // Firefox Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    // Firefox Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
    // Safari Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15",
    // Edge Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

/// A collection of User-Agent strings retrievable sequentially or at random.
/// Safe for concurrent use.
pub struct UaPool {
    uas: Vec<String>,
    counter: AtomicU64,
}

impl UaPool {
    /// Creates a new pool. An empty input falls back to
    /// [`DEFAULT_USER_AGENTS`], so the pool is never empty.
    pub fn new(uas: Vec<String>) -> Self {
        let uas = if uas.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
        } else {
            uas
        };
        UaPool {
            uas,
            counter: AtomicU64::new(0),
        }
    }

    /// Returns the next User-Agent in round-robin order.
    pub fn sequential(&self) -> &str {
        let idx = self.counter.fetch_add(1, Ordering::Relaxed);
        &self.uas[(idx % self.uas.len() as u64) as usize]
    }

    /// Returns a random User-Agent from the pool.
    pub fn random(&self) -> &str {
        let idx = rand::thread_rng().gen_range(0..self.uas.len());
        &self.uas[idx]
    }

    /// Returns a copy of all User-Agents in the pool.
    pub fn all(&self) -> Vec<String> {
        self.uas.clone()
    }
}

impl Default for UaPool {
    fn default() -> Self {
        UaPool::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_falls_back_to_defaults() {
        let pool = UaPool::new(Vec::new());
        assert_eq!(pool.all().len(), DEFAULT_USER_AGENTS.len());
    }

    #[test]
    fn test_sequential_round_robin() {
        let pool = UaPool::new(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(pool.sequential(), "a");
        assert_eq!(pool.sequential(), "b");
        assert_eq!(pool.sequential(), "c");
        assert_eq!(pool.sequential(), "a");
    }

    #[test]
    fn test_random_is_member() {
        let uas = vec!["x".to_string(), "y".to_string()];
        let pool = UaPool::new(uas.clone());
        for _ in 0..20 {
            assert!(uas.contains(&pool.random().to_string()));
        }
    }
}
