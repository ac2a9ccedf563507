use crate::transition::{Batch, Transition};

/// Fixed-capacity ring of transitions with uniform sampling.
///
/// Once full, every insert overwrites the oldest entry.
pub struct ReplayBuffer {
    storage: Vec<Transition>,
    capacity: usize,
    /// Slot the next insert writes once the buffer is full
    next: usize,
    rng: fastrand::Rng,
}

impl ReplayBuffer {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize, seed: u64) -> Self {
        assert!(capacity > 0, "replay buffer capacity must be positive");
        Self {
            storage: Vec::with_capacity(capacity.min(1 << 16)),
            capacity,
            next: 0,
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    pub fn store(&mut self, transition: Transition) {
        if self.storage.len() < self.capacity {
            self.storage.push(transition);
        } else {
            self.storage[self.next] = transition;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    /// Draws `n` transitions uniformly from the occupied range, or `None`
    /// while fewer than `n` are stored.
    ///
    /// Draws are independent between calls; within one batch no transition
    /// appears twice, so sampling a full buffer returns all of it.
    pub fn sample(&mut self, n: usize) -> Option<Batch> {
        let picked = self.sample_indices(n)?;
        Some(Batch::from_transitions(picked.iter().map(|&i| &self.storage[i])))
    }

    /// Storage indices for one batch, chosen with Floyd's algorithm.
    fn sample_indices(&mut self, n: usize) -> Option<Vec<usize>> {
        let len = self.storage.len();
        if n == 0 || len < n {
            return None;
        }
        let mut picked: Vec<usize> = Vec::with_capacity(n);
        for j in len - n..len {
            let t = self.rng.usize(..=j);
            if picked.contains(&t) {
                picked.push(j);
            } else {
                picked.push(t);
            }
        }
        Some(picked)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.storage.clear();
        self.next = 0;
    }

    /// Stored transitions, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        let split = if self.storage.len() < self.capacity { 0 } else { self.next };
        self.storage[split..].iter().chain(&self.storage[..split])
    }
}
