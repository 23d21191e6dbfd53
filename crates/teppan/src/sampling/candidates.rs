use crate::backend::Token;

/// One vocabulary entry under consideration by the sampling pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenData {
    pub id: Token,
    pub logit: f32,
    pub p: f32,
}

/// Owned candidate array the backend's sampling primitives operate on.
///
/// Built from one row of raw logits with every probability set to zero.
/// Primitives are free to reorder, truncate and rescore it; `sorted` records
/// whether the entries are currently in descending-logit order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidates {
    data: Vec<TokenData>,
    sorted: bool,
}

impl Candidates {
    pub fn from_logits(logits: &[f32]) -> Self {
        let data = logits
            .iter()
            .enumerate()
            .map(|(id, logit)| TokenData { id: id as Token, logit: *logit, p: 0.0 })
            .collect();
        Self { data, sorted: false }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[TokenData] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [TokenData] {
        &mut self.data
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn set_sorted(&mut self, sorted: bool) {
        self.sorted = sorted;
    }

    /// Keeps the first `len` entries.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    /// The first entry, which is the most likely one once sorted.
    pub fn first(&self) -> Option<&TokenData> {
        self.data.first()
    }

    /// Sorts by descending logit unless already sorted.
    pub fn sort_by_logit(&mut self) {
        if !self.sorted {
            self.data.sort_by(|a, b| b.logit.total_cmp(&a.logit));
            self.sorted = true;
        }
    }

    /// Id of the highest-logit entry, ignoring sort state.
    pub fn argmax(&self) -> Option<Token> {
        self.data
            .iter()
            .max_by(|a, b| a.logit.total_cmp(&b.logit))
            .map(|d| d.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_logits_zeroes_probabilities() {
        let candidates = Candidates::from_logits(&[0.5, -1.0, 3.0]);
        assert_eq!(candidates.len(), 3);
        assert!(!candidates.is_sorted());
        assert!(candidates.as_slice().iter().all(|d| d.p == 0.0));
        assert_eq!(candidates.as_slice()[2], TokenData { id: 2, logit: 3.0, p: 0.0 });
    }

    #[test]
    fn test_sort_and_argmax() {
        let mut candidates = Candidates::from_logits(&[0.5, -1.0, 3.0, 1.0]);
        assert_eq!(candidates.argmax(), Some(2));

        candidates.sort_by_logit();
        let ids: Vec<Token> = candidates.as_slice().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![2, 3, 0, 1]);
        assert!(candidates.is_sorted());

        candidates.truncate(1);
        assert_eq!(candidates.first().map(|d| d.id), Some(2));
    }

    #[test]
    fn test_empty() {
        let candidates = Candidates::from_logits(&[]);
        assert!(candidates.is_empty());
        assert_eq!(candidates.argmax(), None);
    }
}
