//! ID-ordered chunk set operations.
//!
//! The query planner works with chunk sets kept sorted by chunk ID. That
//! ordering makes dedup a linear scan and lets intersection across `k`
//! sets run as an n-way merge: advance whichever set lags, emit only when
//! every head agrees. Linear in the total size of all sets, and no
//! intermediate hash map.

use std::iter::Peekable;
use std::vec::IntoIter;

use crate::chunk::Chunk;

/// Sort by chunk ID and drop duplicates.
pub fn dedup_by_id(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks.sort_by(|a, b| a.id.cmp(&b.id));
    chunks.dedup_by(|a, b| a.id == b.id);
    chunks
}

/// Intersect ID-sorted chunk sets. The result is itself ID-sorted.
pub fn intersect(mut sets: Vec<Vec<Chunk>>) -> Vec<Chunk> {
    if sets.is_empty() {
        return Vec::new();
    }
    if sets.len() == 1 {
        return sets.swap_remove(0);
    }

    let mut heads: Vec<Peekable<IntoIter<Chunk>>> =
        sets.into_iter().map(|s| s.into_iter().peekable()).collect();
    let mut out = Vec::new();

    'scan: loop {
        // The largest current head is the only candidate every set can
        // still contain.
        let mut target: Option<String> = None;
        for head in heads.iter_mut() {
            match head.peek() {
                None => break 'scan,
                Some(chunk) => {
                    if target.as_deref().map_or(true, |t| chunk.id.as_str() > t) {
                        target = Some(chunk.id.clone());
                    }
                }
            }
        }
        let Some(target) = target else { break };

        // Advance every lagging set to the target.
        let mut aligned = true;
        for head in heads.iter_mut() {
            while head.peek().is_some_and(|c| c.id < target) {
                head.next();
            }
            match head.peek() {
                None => break 'scan,
                Some(chunk) if chunk.id != target => aligned = false,
                Some(_) => {}
            }
        }

        if aligned {
            let mut emitted = None;
            for head in heads.iter_mut() {
                emitted = head.next();
            }
            if let Some(chunk) = emitted {
                out.push(chunk);
            }
        }
    }

    out
}
