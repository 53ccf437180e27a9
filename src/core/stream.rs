//! Streaming simplification of sorted index entries
//!
//! Index builders produce `(cell key, value)` pairs in increasing key order,
//! far too many to hold at once. [`StreamSimplifier`] keeps a bounded window
//! of them and, whenever one value shows up often enough in that window,
//! rewrites that value's cells into a simplified covering before they leave
//! the window. Entries reach the sink in increasing key order.

use std::collections::{BTreeMap, VecDeque};

use log::trace;
use serde::{Deserialize, Serialize};

use crate::core::cell_id::CellId;
use crate::core::covering::Covering;
use crate::core::error::{Error, Result};

/// Window configuration for [`StreamSimplifier`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOptions {
    /// Maximum number of buffered entries
    pub window_size: usize,

    /// Occurrences of one value in a full window that trigger simplification
    pub max_duplicates: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            window_size: 1024,
            max_duplicates: 64,
        }
    }
}

impl StreamOptions {
    /// Check that the window can ever trigger a simplification
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(Error::InvalidInput("window size must be positive".to_string()));
        }
        if self.max_duplicates < 3 {
            return Err(Error::InvalidInput(format!(
                "max duplicates must be at least 3, got {}",
                self.max_duplicates
            )));
        }
        if self.max_duplicates > self.window_size {
            return Err(Error::InvalidInput(format!(
                "max duplicates ({}) exceeds window size ({})",
                self.max_duplicates, self.window_size
            )));
        }
        Ok(())
    }
}

/// Simplify a batch of keys of one value
///
/// `ids` must be strictly increasing, hold more than two keys, and all be
/// at least `min_id`. Returns sorted keys, all at least `min_id`, such that
/// every input cell lies in exactly one output cell.
pub fn optimize<const DEPTH: u32>(ids: &[i64], min_id: i64) -> Vec<i64> {
    assert!(ids.len() > 2, "optimize needs more than two ids, got {}", ids.len());
    assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids must be strictly increasing");
    assert!(ids[0] >= min_id, "id {} below floor {min_id}", ids[0]);

    let cells: Vec<CellId<DEPTH>> = ids.iter().map(|&id| CellId::from_int64(id, DEPTH)).collect();
    let mut covering = Covering::from_cells(&cells, min_id);
    covering.simplify(min_id);

    let mut result = covering.to_int64_vec(DEPTH);
    result.sort_unstable();
    debug_assert!(result.windows(2).all(|w| w[0] < w[1]));
    debug_assert!(result.first().map_or(true, |&first| first >= min_id));
    result
}

/// Validating variant of [`optimize`] for externally produced keys
pub fn try_optimize<const DEPTH: u32>(ids: &[i64], min_id: i64) -> Result<Vec<i64>> {
    if ids.len() <= 2 {
        return Err(Error::InvalidInput(format!(
            "optimize needs more than two ids, got {}",
            ids.len()
        )));
    }
    if let Some(w) = ids.windows(2).find(|w| w[0] >= w[1]) {
        return Err(Error::UnorderedInput {
            previous: w[0],
            next: w[1],
        });
    }
    if ids[0] < min_id {
        return Err(Error::InvalidInput(format!("id {} below floor {min_id}", ids[0])));
    }
    for &id in ids {
        CellId::<DEPTH>::try_from_int64(id, DEPTH)?;
    }
    Ok(optimize::<DEPTH>(ids, min_id))
}

/// Bounded-memory simplifier over a strictly increasing `(key, value)` stream
///
/// Keys are pre-order keys at depth `DEPTH`. The sink sees every surviving
/// entry exactly once, in increasing key order. Remaining entries are flushed
/// when the simplifier is dropped.
pub struct StreamSimplifier<const DEPTH: u32, V, F>
where
    V: Ord + Clone,
    F: FnMut(i64, V),
{
    options: StreamOptions,
    buffer: VecDeque<(i64, V)>,
    counts: BTreeMap<V, usize>,
    last_added: Option<(i64, V)>,
    last_emitted: Option<i64>,
    emitted: usize,
    sink: F,
}

impl<const DEPTH: u32, V, F> StreamSimplifier<DEPTH, V, F>
where
    V: Ord + Clone,
    F: FnMut(i64, V),
{
    /// Create a simplifier; panics on invalid options
    pub fn new(options: StreamOptions, sink: F) -> Self {
        if let Err(e) = options.validate() {
            panic!("{e}");
        }
        Self::with_options(options, sink)
    }

    /// Create a simplifier from options that may come from user input
    pub fn try_new(options: StreamOptions, sink: F) -> Result<Self> {
        options.validate()?;
        Ok(Self::with_options(options, sink))
    }

    fn with_options(options: StreamOptions, sink: F) -> Self {
        Self {
            options,
            buffer: VecDeque::with_capacity(options.window_size + 1),
            counts: BTreeMap::new(),
            last_added: None,
            last_emitted: None,
            emitted: 0,
            sink,
        }
    }

    /// Buffered entries
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Entries handed to the sink so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Add the next entry; panics when `(id, value)` does not increase
    pub fn add(&mut self, id: i64, value: V) {
        if let Err(e) = self.try_add(id, value) {
            panic!("{e}");
        }
    }

    /// Add the next entry from an untrusted stream
    pub fn try_add(&mut self, id: i64, value: V) -> Result<()> {
        CellId::<DEPTH>::try_from_int64(id, DEPTH)?;
        if let Some((last_id, last_value)) = &self.last_added {
            if (*last_id, last_value) >= (id, &value) {
                return Err(Error::UnorderedInput {
                    previous: *last_id,
                    next: id,
                });
            }
        }
        self.last_added = Some((id, value.clone()));

        self.buffer.push_back((id, value.clone()));
        let count = self.counts.entry(value.clone()).or_insert(0);
        *count += 1;

        if *count >= self.options.max_duplicates && self.buffer.len() >= self.options.window_size {
            self.process_window(&value);
        }
        while self.buffer.len() >= self.options.window_size {
            self.pop_front();
        }
        Ok(())
    }

    /// Emit everything still buffered
    pub fn flush(&mut self) {
        while !self.buffer.is_empty() {
            self.pop_front();
        }
    }

    /// Replace the buffered cells of `value` by their simplified covering
    fn process_window(&mut self, value: &V) {
        let ids: Vec<i64> = self
            .buffer
            .iter()
            .filter(|(_, v)| v == value)
            .map(|(id, _)| *id)
            .collect();
        if ids.len() <= 2 {
            return;
        }

        let min_id = self.last_emitted.unwrap_or(0);
        let optimized = optimize::<DEPTH>(&ids, min_id);
        trace!("Window simplification: {} -> {} cells", ids.len(), optimized.len());
        if optimized.len() == ids.len() {
            return;
        }

        let mut entries: Vec<(i64, V)> = self.buffer.drain(..).filter(|(_, v)| v != value).collect();
        entries.extend(optimized.iter().map(|&id| (id, value.clone())));
        entries.sort_unstable();
        self.buffer = entries.into();
        self.counts.insert(value.clone(), optimized.len());
    }

    fn pop_front(&mut self) {
        let Some((id, value)) = self.buffer.pop_front() else {
            return;
        };
        if let Some(last) = self.last_emitted {
            assert!(last <= id, "emitted id {id} after {last}");
        }
        self.last_emitted = Some(id);

        if let Some(count) = self.counts.get_mut(&value) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(&value);
            }
        }
        self.emitted += 1;
        (self.sink)(id, value);
    }
}

impl<const DEPTH: u32, V, F> Drop for StreamSimplifier<DEPTH, V, F>
where
    V: Ord + Clone,
    F: FnMut(i64, V),
{
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.flush();
        }
    }
}
