//! Round-robin workload assignment.

/// Partitions `items` across `workers` buckets: item `i` lands in bucket
/// `i % workers`. Every item is assigned exactly once and bucket sizes
/// differ by at most one. A zero worker count yields no buckets; callers
/// validate it away before this point.
pub fn round_robin<T: Clone>(items: &[T], workers: usize) -> Vec<Vec<T>> {
    if workers == 0 {
        return Vec::new();
    }
    let mut buckets = vec![Vec::new(); workers];
    for (i, item) in items.iter().enumerate() {
        buckets[i % workers].push(item.clone());
    }
    buckets
}
