use std::sync::Arc;

/// Per-bin counts of one calculation. Cloning shares the same counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HistogramResult {
    counts: Arc<[u32]>,
}

impl HistogramResult {
    /// All-zero result with `num_bins` bins.
    pub fn zeroed(num_bins: u32) -> Self {
        HistogramResult {
            counts: vec![0; num_bins as usize].into(),
        }
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    pub fn is_all_zero(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }

    /// Index of the fullest bin; the first one on ties.
    pub fn peak_bin(&self) -> Option<usize> {
        self.counts
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(i, _)| i)
    }
}

impl From<&[u32]> for HistogramResult {
    fn from(counts: &[u32]) -> Self {
        HistogramResult {
            counts: counts.into(),
        }
    }
}

impl From<Vec<u32>> for HistogramResult {
    fn from(counts: Vec<u32>) -> Self {
        HistogramResult {
            counts: counts.into(),
        }
    }
}
