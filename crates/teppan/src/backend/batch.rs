use std::ops::Range;

use super::Token;
use crate::slot::SlotId;

/// Owned scratch buffer holding one scheduler iteration's worth of tokens.
///
/// Each entry carries the token, its position inside its own sequence, the
/// slot it belongs to, and whether the backend should keep logits for it.
/// The buffer is reused across iterations; the backend only ever sees
/// [`BatchView`]s cut from it.
#[derive(Debug, Default)]
pub struct Batch {
    tokens: Vec<Token>,
    positions: Vec<usize>,
    slots: Vec<SlotId>,
    logits: Vec<bool>,
}

impl Batch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(capacity),
            positions: Vec::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            logits: Vec::with_capacity(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
        self.positions.clear();
        self.slots.clear();
        self.logits.clear();
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Appends one entry and returns its batch-local index.
    pub fn push(&mut self, token: Token, position: usize, slot: SlotId, logits: bool) -> usize {
        self.tokens.push(token);
        self.positions.push(position);
        self.slots.push(slot);
        self.logits.push(logits);
        self.tokens.len() - 1
    }

    /// Requests logits for an entry already in the batch.
    pub fn request_logits(&mut self, index: usize) {
        if let Some(flag) = self.logits.get_mut(index) {
            *flag = true;
        }
    }

    /// A view over `range`, clamped to the filled part of the buffer.
    pub fn view(&self, range: Range<usize>) -> BatchView<'_> {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        BatchView {
            offset: start,
            tokens: &self.tokens[start..end],
            positions: &self.positions[start..end],
            slots: &self.slots[start..end],
            logits: &self.logits[start..end],
        }
    }

    /// Splits the buffer into consecutive views of at most `size` entries.
    pub fn chunks(&self, size: usize) -> impl Iterator<Item = BatchView<'_>> {
        let size = size.max(1);
        (0..self.len())
            .step_by(size)
            .map(move |start| self.view(start..start + size))
    }
}

/// A borrowed, contiguous slice of a [`Batch`] handed to the backend's decode.
///
/// Indices passed to [`InferenceBackend::logits`](super::InferenceBackend::logits)
/// are local to the view; [`local_index`](Self::local_index) converts a
/// batch-wide index into one.
#[derive(Debug, Clone, Copy)]
pub struct BatchView<'a> {
    offset: usize,
    tokens: &'a [Token],
    positions: &'a [usize],
    slots: &'a [SlotId],
    logits: &'a [bool],
}

impl<'a> BatchView<'a> {
    /// Batch-wide index of the first entry in this view.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Batch-wide indices covered by this view.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &'a [Token] {
        self.tokens
    }

    pub fn positions(&self) -> &'a [usize] {
        self.positions
    }

    pub fn slots(&self) -> &'a [SlotId] {
        self.slots
    }

    pub fn logits(&self) -> &'a [bool] {
        self.logits
    }

    /// Converts a batch-wide index into an index within this view.
    pub fn local_index(&self, batch_index: usize) -> Option<usize> {
        batch_index
            .checked_sub(self.offset)
            .filter(|local| *local < self.len())
    }
}
