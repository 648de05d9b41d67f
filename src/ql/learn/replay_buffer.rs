use std::collections::VecDeque;
use std::ops::Range;
use std::rc::Rc;

use anyhow::Result;
use rand::prelude::ThreadRng;

use crate::ql::prelude::{Action, DqlError};

/// One recorded environment step.
///
/// `state` and `next_state` are snapshots taken at observation time, so they
/// stay valid independently of the live environment.
/// `terminal` is retained on the record, although the learner stores
/// non-terminal transitions only (see [ReplayBuffer]).
pub struct Transition<S, A> {
    pub state: Rc<S>,
    pub action: A,
    pub reward: f32,
    pub next_state: Rc<S>,
    pub terminal: bool,
}

/// A batch of sampled transitions, rearranged into per-column arrays as the
/// model functions expect them
pub struct TransitionBatch<'a, S, A, const N: usize> {
    pub state: [&'a Rc<S>; N],
    pub action: [A; N],
    pub reward: [f32; N],
    pub next_state: [&'a Rc<S>; N],
    pub terminal: [bool; N],
}

/// Experience replay buffer with ring semantics: once `max_buffer_len` is
/// reached, each insert evicts the oldest entry first.
pub struct ReplayBuffer<S, A>
where A: Action
{
    max_buffer_len: usize,
    buffer: VecDeque<Transition<S, A>>,
}

impl<S, A> ReplayBuffer<S, A>
where A: Action
{
    pub fn new(max_buffer_len: usize) -> Self {
        assert!(max_buffer_len > 0);
        Self {
            max_buffer_len,
            buffer: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn add(&mut self, transition: Transition<S, A>) {
        if (self.buffer.len() + 1) > self.max_buffer_len {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition<S, A>> {
        self.buffer.iter()
    }

    /// Draws `N` distinct transitions uniformly at random.
    /// Fails when the buffer holds fewer than `N` entries - callers are
    /// expected to check [Self::len] first.
    pub fn sample<const N: usize>(
        &self,
        rng: &mut ThreadRng,
    ) -> Result<TransitionBatch<'_, S, A, N>> {
        if self.buffer.len() < N {
            return Err(DqlError::InsufficientData(format!(
                "requested a batch of {} from a buffer holding {} transitions",
                N,
                self.buffer.len()
            ))
            .into());
        }
        let indices: [usize; N] = generate_distinct_random_ids(rng, 0..self.buffer.len());
        Ok(self.get_many(&indices))
    }

    /// Rearranges the transitions at `indices` into per-column arrays
    pub fn get_many<const N: usize>(
        &self,
        indices: &[usize; N],
    ) -> TransitionBatch<'_, S, A, N> {
        debug_assert!(!indices.iter().any(|&e| e >= self.buffer.len()));
        TransitionBatch {
            state: indices.map(|i| &self.buffer[i].state),
            action: indices.map(|i| self.buffer[i].action),
            reward: indices.map(|i| self.buffer[i].reward),
            next_state: indices.map(|i| &self.buffer[i].next_state),
            terminal: indices.map(|i| self.buffer[i].terminal),
        }
    }
}

fn generate_distinct_random_ids<const N: usize>(
    rng: &mut ThreadRng,
    range: Range<usize>,
) -> [usize; N] {
    use rand::distributions::{Distribution, Uniform};

    assert!(range.end - range.start >= N);
    let mut result = [0_usize; N];

    let distribution = Uniform::from(range);

    for i in 0..N {
        result[i] = loop {
            let x = distribution.sample(rng);
            if !result[0..i].contains(&x) {
                break x;
            }
        }
    }
    result
}
