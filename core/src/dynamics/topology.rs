//! Segment-aware index maps for a second-order Markov chain
//!
//! A latent sequence is the concatenation of independent segments. Within a
//! segment every sample from the third onwards is predicted from its two
//! predecessors; the first two samples of each segment are covered by the
//! boundary priors instead. No temporal edge ever crosses a segment boundary.
//!
//! ```text
//! segment lengths [4, 3]   (rows 0..4 and 4..7)
//!
//! order3 = [0 1 2]  [1 2 3]  [4 5 6]        (i-2, i-1, i)
//! start2 = [0 1]    [4 5]
//! start1 = 0        4
//! ```
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use serde::{Deserialize, Serialize};

use crate::error::{GpdmError, Result};

/// Validated segment start rows of an N-row latent sequence
///
/// Deserialization applies the same ordering checks as [`Segments::new`];
/// the row bound is checked wherever the segments meet a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>")]
pub struct Segments(Vec<usize>);

impl TryFrom<Vec<usize>> for Segments {
    type Error = GpdmError;

    fn try_from(starts: Vec<usize>) -> Result<Self> {
        match starts.first() {
            Some(0) => {}
            Some(first) => {
                return Err(GpdmError::InvalidArgument(format!(
                    "first segment must start at row 0, got {}",
                    first
                )))
            }
            None => return Err(GpdmError::InvalidArgument("segment list is empty".to_string())),
        }
        if let Some(pair) = starts.windows(2).find(|w| w[0] >= w[1]) {
            return Err(GpdmError::InvalidArgument(format!(
                "segment starts must be strictly increasing, found {} then {}",
                pair[0], pair[1]
            )));
        }
        Ok(Self(starts))
    }
}

impl Segments {
    /// Segment starts must be strictly increasing, begin at 0 and stay below `num_rows`.
    pub fn new(starts: Vec<usize>, num_rows: usize) -> Result<Self> {
        let segments = Self::try_from(starts)?;
        segments.check_rows(num_rows)?;
        Ok(segments)
    }

    /// Fails unless every segment starts inside a sequence of `num_rows` rows.
    pub fn check_rows(&self, num_rows: usize) -> Result<()> {
        match self.0.last() {
            Some(&last) if last >= num_rows => Err(GpdmError::InvalidArgument(format!(
                "segment start {} is outside a sequence of {} rows",
                last, num_rows
            ))),
            _ => Ok(()),
        }
    }

    /// A single segment spanning the whole sequence
    pub fn single() -> Self {
        Self(vec![0])
    }

    /// Segment starts from a list of segment lengths
    pub fn from_lengths(lengths: &[usize]) -> Result<Self> {
        let total: usize = lengths.iter().sum();
        let starts = lengths
            .iter()
            .scan(0usize, |offset, &len| {
                let start = *offset;
                *offset += len;
                Some(start)
            })
            .collect();
        Self::new(starts, total)
    }

    pub fn starts(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lengths of the segments in a sequence of `num_rows` rows
    pub fn lengths(&self, num_rows: usize) -> Result<Vec<usize>> {
        self.check_rows(num_rows)?;
        Ok(self
            .0
            .iter()
            .enumerate()
            .map(|(k, &start)| self.0.get(k + 1).copied().unwrap_or(num_rows) - start)
            .collect())
    }
}

/// Index maps of the second-order chain over a segmented sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTopology {
    order3: Vec<[usize; 3]>,
    start2: Vec<[usize; 2]>,
    start1: Vec<usize>,
    num_rows: usize,
}

impl SegmentTopology {
    /// Build the maps from segment lengths, concatenated in order.
    ///
    /// Fails with `InsufficientData` for any segment shorter than two samples.
    pub fn from_lengths(lengths: &[usize]) -> Result<Self> {
        let num_rows: usize = lengths.iter().sum();
        let num_triples = lengths.iter().map(|&l| l.saturating_sub(2)).sum();

        let mut order3 = Vec::with_capacity(num_triples);
        let mut start2 = Vec::with_capacity(lengths.len());
        let mut start1 = Vec::with_capacity(lengths.len());

        let mut base = 0usize;
        for (segment, &length) in lengths.iter().enumerate() {
            if length < 2 {
                return Err(GpdmError::InsufficientData {
                    segment,
                    length,
                    required: 2,
                });
            }
            order3.extend((0..length - 2).map(|k| [base + k, base + k + 1, base + k + 2]));
            start2.push([base, base + 1]);
            start1.push(base);
            base += length;
        }

        Ok(Self {
            order3,
            start2,
            start1,
            num_rows,
        })
    }

    pub fn from_segments(segments: &Segments, num_rows: usize) -> Result<Self> {
        Self::from_lengths(&segments.lengths(num_rows)?)
    }

    /// `[i-2, i-1, i]` for every predicted row
    #[inline]
    pub fn order3(&self) -> &[[usize; 3]] {
        &self.order3
    }

    /// `[first, first+1]` for every segment
    #[inline]
    pub fn start2(&self) -> &[[usize; 2]] {
        &self.start2
    }

    /// First row of every segment
    #[inline]
    pub fn start1(&self) -> &[usize] {
        &self.start1
    }

    #[inline]
    pub fn num_segments(&self) -> usize {
        self.start1.len()
    }

    #[inline]
    pub fn num_triples(&self) -> usize {
        self.order3.len()
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }
}
