use std::collections::{BTreeSet, HashMap};

/// All `k`-element subsets of `pool`.
///
/// `k == 0` yields exactly one (empty) subset, `k > pool.len()` yields none.
pub fn combinations<T: Ord + Clone>(pool: &BTreeSet<T>, k: usize) -> BTreeSet<BTreeSet<T>> {
    let items: Vec<T> = pool.iter().cloned().collect();
    let mut memo = HashMap::new();
    index_combinations(items.len(), 0, k, &mut memo)
        .iter()
        .map(|indices| indices.iter().map(|&i| items[i].clone()).collect())
        .collect()
}

/// Index subsets of `offset..n` of size `k`, memoized on `(offset, k)`.
fn index_combinations(
    n: usize,
    offset: usize,
    k: usize,
    memo: &mut HashMap<(usize, usize), Vec<Vec<usize>>>,
) -> Vec<Vec<usize>> {
    if k == 0 {
        return vec![Vec::new()];
    }
    if n - offset < k {
        return Vec::new();
    }
    if let Some(cached) = memo.get(&(offset, k)) {
        return cached.clone();
    }
    let mut result = Vec::new();
    for mut rest in index_combinations(n, offset + 1, k - 1, memo) {
        rest.insert(0, offset);
        result.push(rest);
    }
    result.extend(index_combinations(n, offset + 1, k, memo));
    memo.insert((offset, k), result.clone());
    result
}

/// Binomial coefficient, saturating at `u128::MAX`.
pub fn binomial(n: usize, k: usize) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 0..k {
        result = match result.checked_mul((n - i) as u128) {
            Some(product) => product / (i as u128 + 1),
            None => return u128::MAX,
        };
    }
    result
}
