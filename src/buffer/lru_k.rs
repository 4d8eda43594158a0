//! # LRU-K Replacement Policy
//!
//! This module selects eviction victims for the buffer pool using the LRU-K
//! policy: a frame's priority is its backward K-distance, the time since its
//! K-th most recent access. Frames with fewer than K recorded accesses have
//! infinite K-distance and are always preferred as victims.
//!
//! ## Why LRU-K Instead of LRU?
//!
//! Plain LRU lets a single sequential scan flush the entire pool: every
//! scanned page becomes "most recently used" once. LRU-K separates frames
//! into two populations:
//!
//! - **history list**: frames with fewer than K accesses (scan traffic)
//! - **cache list**: frames with K or more accesses (genuinely reused pages)
//!
//! Victims come from the history list first; a page only earns a place in
//! the cache list by being touched K times.
//!
//! ## List Discipline
//!
//! Both lists keep the most recent entry at the front. A frame enters the
//! history list on its first access, migrates to the cache-list front when
//! its access count reaches K, and is re-inserted at the cache-list front on
//! every later access. Eviction scans each list from the tail (the least
//! recently positioned end) and takes the first evictable frame.
//!
//! ## Concurrency
//!
//! All state lives behind one internal mutex; every operation holds it for
//! its full duration. The replacer is not reentrant.

use std::collections::VecDeque;

use eyre::{bail, ensure, Result};
use hashbrown::HashMap;
use log::debug;
use parking_lot::Mutex;

use super::FrameId;

struct ReplacerNode {
    access_count: usize,
    evictable: bool,
}

struct ReplacerState {
    nodes: HashMap<FrameId, ReplacerNode>,
    history: VecDeque<FrameId>,
    cache: VecDeque<FrameId>,
    evictable_count: usize,
}

/// LRU-K victim selector over at most `num_frames` tracked frames.
pub struct LruKReplacer {
    state: Mutex<ReplacerState>,
    num_frames: usize,
    k: usize,
}

impl LruKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Result<Self> {
        ensure!(k >= 1, "replacer k must be at least 1, got {}", k);
        Ok(Self {
            state: Mutex::new(ReplacerState {
                nodes: HashMap::with_capacity(num_frames),
                history: VecDeque::new(),
                cache: VecDeque::new(),
                evictable_count: 0,
            }),
            num_frames,
            k,
        })
    }

    /// Records an access to `frame_id`, tracking it if new. New frames start
    /// non-evictable.
    pub fn record_access(&self, frame_id: FrameId) -> Result<()> {
        ensure!(
            frame_id < self.num_frames,
            "frame id {} out of range (num_frames={})",
            frame_id,
            self.num_frames
        );

        let mut state = self.state.lock();
        let node = state.nodes.entry(frame_id).or_insert(ReplacerNode {
            access_count: 0,
            evictable: false,
        });
        node.access_count += 1;
        let count = node.access_count;

        if count == 1 {
            state.history.push_front(frame_id);
        } else if count == self.k {
            detach(&mut state.history, frame_id);
            state.cache.push_front(frame_id);
        } else if count > self.k {
            detach(&mut state.cache, frame_id);
            state.cache.push_front(frame_id);
        }
        Ok(())
    }

    /// Toggles whether `frame_id` may be evicted. No-op for untracked
    /// frames.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()> {
        ensure!(
            frame_id < self.num_frames,
            "frame id {} out of range (num_frames={})",
            frame_id,
            self.num_frames
        );

        let mut state = self.state.lock();
        let changed = match state.nodes.get_mut(&frame_id) {
            Some(node) if node.evictable != evictable => {
                node.evictable = evictable;
                true
            }
            _ => false,
        };
        if changed {
            if evictable {
                state.evictable_count += 1;
            } else {
                state.evictable_count -= 1;
            }
        }
        Ok(())
    }

    /// Chooses and removes a victim, preferring the history list (fewer
    /// than K accesses) and the least recently positioned entry within each
    /// list. Returns `None` when nothing is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let victim = pick_victim(&state.history, &state.nodes)
            .or_else(|| pick_victim(&state.cache, &state.nodes))?;

        detach(&mut state.history, victim);
        detach(&mut state.cache, victim);
        state.nodes.remove(&victim);
        state.evictable_count -= 1;
        debug!("evicting frame {victim}");
        Some(victim)
    }

    /// Drops a tracked frame outright (e.g. when its page is deleted).
    /// Removing a non-evictable frame is a caller bug.
    pub fn remove(&self, frame_id: FrameId) -> Result<()> {
        let mut state = self.state.lock();
        let Some(node) = state.nodes.get(&frame_id) else {
            return Ok(());
        };
        if !node.evictable {
            bail!("cannot remove non-evictable frame {}", frame_id);
        }
        let in_history = node.access_count < self.k;

        if in_history {
            detach(&mut state.history, frame_id);
        } else {
            detach(&mut state.cache, frame_id);
        }
        state.nodes.remove(&frame_id);
        state.evictable_count -= 1;
        Ok(())
    }

    /// Number of tracked frames currently marked evictable.
    pub fn size(&self) -> usize {
        self.state.lock().evictable_count
    }
}

fn pick_victim(list: &VecDeque<FrameId>, nodes: &HashMap<FrameId, ReplacerNode>) -> Option<FrameId> {
    list.iter()
        .rev()
        .copied()
        .find(|frame_id| nodes.get(frame_id).is_some_and(|n| n.evictable))
}

fn detach(list: &mut VecDeque<FrameId>, frame_id: FrameId) {
    if let Some(pos) = list.iter().position(|&f| f == frame_id) {
        list.remove(pos);
    }
}
