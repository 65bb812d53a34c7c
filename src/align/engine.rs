/// Optimal pairwise alignment under linear gap costs
///
/// Dynamic programming over a (|A|+1)x(|B|+1) cost table followed by a
/// deterministic backtrack. Ties prefer the diagonal move, then deletion
/// (observed symbol against a gap), then insertion (expected symbol against
/// a gap), so identical inputs always produce identical alignments.
use crate::config::types::{CostParams, Substitution};

/// One column of an alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column<'a, T> {
    Match(&'a T),
    /// Observed symbol, expected symbol
    Substitution(&'a T, &'a T),
    /// Present in observed, gap in expected
    ObservedOnly(&'a T),
    /// Present in expected, gap in observed
    ExpectedOnly(&'a T),
}

/// Pair of equal-length gapped sequences plus the total cost
///
/// `None` is the gap. No column holds a gap on both sides; only [`align`]
/// builds alignments, which keeps that true.
///
/// ```compile_fail
/// use gradebox::align::Alignment;
///
/// let forged: Alignment<char> = Alignment {
///     observed: vec![None],
///     expected: vec![None],
///     cost: 0,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment<T> {
    observed: Vec<Option<T>>,
    expected: Vec<Option<T>>,
    cost: u64,
}

impl<T: PartialEq + Clone> Alignment<T> {
    /// Gapped observed side
    pub fn observed(&self) -> &[Option<T>] {
        &self.observed
    }

    /// Gapped expected side
    pub fn expected(&self) -> &[Option<T>] {
        &self.expected
    }

    /// Total cost of the alignment
    pub fn cost(&self) -> u64 {
        self.cost
    }

    pub fn len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = Column<'_, T>> + '_ {
        self.observed
            .iter()
            .zip(self.expected.iter())
            .map(|pair| match pair {
                (Some(o), Some(e)) if o == e => Column::Match(o),
                (Some(o), Some(e)) => Column::Substitution(o, e),
                (Some(o), None) => Column::ObservedOnly(o),
                (None, Some(e)) => Column::ExpectedOnly(e),
                (None, None) => unreachable!("alignment column with gaps on both sides"),
            })
    }

    /// Observed sequence with gaps removed
    pub fn observed_symbols(&self) -> Vec<T> {
        self.observed.iter().flatten().cloned().collect()
    }

    /// Expected sequence with gaps removed
    pub fn expected_symbols(&self) -> Vec<T> {
        self.expected.iter().flatten().cloned().collect()
    }

    pub fn gap_count(&self) -> usize {
        self.observed.iter().filter(|s| s.is_none()).count()
            + self.expected.iter().filter(|s| s.is_none()).count()
    }

    /// True when every column is a match.
    pub fn is_identity(&self) -> bool {
        self.columns().all(|c| matches!(c, Column::Match(_)))
    }
}

impl Alignment<char> {
    /// Aligned (observed, expected) strings with `gap_marker` in gap positions.
    ///
    /// The marker must not occur in genuine program output.
    pub fn render(&self, gap_marker: char) -> (String, String) {
        let render = |side: &[Option<char>]| -> String {
            side.iter().map(|c| c.unwrap_or(gap_marker)).collect()
        };
        (render(&self.observed), render(&self.expected))
    }
}

/// Flattened DP table
struct CostTable {
    cols: usize,
    cells: Vec<u64>,
}

impl CostTable {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            cols,
            cells: vec![0; rows * cols],
        }
    }

    #[inline]
    fn get(&self, i: usize, j: usize) -> u64 {
        self.cells[i * self.cols + j]
    }

    #[inline]
    fn set(&mut self, i: usize, j: usize, value: u64) {
        self.cells[i * self.cols + j] = value;
    }
}

/// Cost of putting `a` and `b` in one column, `None` when not allowed
#[inline]
fn diagonal_cost<T: PartialEq>(a: &T, b: &T, costs: &CostParams) -> Option<u64> {
    if a == b {
        return Some(0);
    }
    match costs.substitution {
        Substitution::Cost(cost) => Some(u64::from(cost)),
        Substitution::Disallowed => None,
    }
}

/// Align `observed` against `expected`, returning one minimum-cost alignment
pub fn align<T: PartialEq + Clone>(
    observed: &[T],
    expected: &[T],
    costs: &CostParams,
) -> Alignment<T> {
    let rows = observed.len() + 1;
    let cols = expected.len() + 1;
    let gap = u64::from(costs.gap);
    let mut table = CostTable::new(rows, cols);

    for i in 1..rows {
        table.set(i, 0, i as u64 * gap);
    }
    for j in 1..cols {
        table.set(0, j, j as u64 * gap);
    }

    for i in 1..rows {
        for j in 1..cols {
            let deletion = table.get(i - 1, j) + gap;
            let insertion = table.get(i, j - 1) + gap;
            let mut best = deletion.min(insertion);
            if let Some(cost) = diagonal_cost(&observed[i - 1], &expected[j - 1], costs) {
                best = best.min(table.get(i - 1, j - 1) + cost);
            }
            table.set(i, j, best);
        }
    }

    let cost = table.get(rows - 1, cols - 1);
    let (observed_aligned, expected_aligned) = backtrack(&table, observed, expected, costs);

    Alignment {
        observed: observed_aligned,
        expected: expected_aligned,
        cost,
    }
}

fn backtrack<T: PartialEq + Clone>(
    table: &CostTable,
    observed: &[T],
    expected: &[T],
    costs: &CostParams,
) -> (Vec<Option<T>>, Vec<Option<T>>) {
    let gap = u64::from(costs.gap);
    let capacity = observed.len() + expected.len();
    let mut observed_aligned = Vec::with_capacity(capacity);
    let mut expected_aligned = Vec::with_capacity(capacity);

    let (mut i, mut j) = (observed.len(), expected.len());
    while i > 0 || j > 0 {
        let here = table.get(i, j);

        if i > 0 && j > 0 {
            if let Some(cost) = diagonal_cost(&observed[i - 1], &expected[j - 1], costs) {
                if here == table.get(i - 1, j - 1) + cost {
                    observed_aligned.push(Some(observed[i - 1].clone()));
                    expected_aligned.push(Some(expected[j - 1].clone()));
                    i -= 1;
                    j -= 1;
                    continue;
                }
            }
        }

        if i > 0 && here == table.get(i - 1, j) + gap {
            observed_aligned.push(Some(observed[i - 1].clone()));
            expected_aligned.push(None);
            i -= 1;
            continue;
        }

        // The cell value came from the left neighbour.
        debug_assert!(j > 0 && here == table.get(i, j - 1) + gap);
        observed_aligned.push(None);
        expected_aligned.push(Some(expected[j - 1].clone()));
        j -= 1;
    }

    observed_aligned.reverse();
    expected_aligned.reverse();
    (observed_aligned, expected_aligned)
}

/// Character-level alignment of two texts
pub fn align_text(observed: &str, expected: &str, costs: &CostParams) -> Alignment<char> {
    let observed: Vec<char> = observed.chars().collect();
    let expected: Vec<char> = expected.chars().collect();
    align(&observed, &expected, costs)
}

/// Line-level alignment; each line keeps its terminator so joining reproduces the input
pub fn align_lines(observed: &str, expected: &str, costs: &CostParams) -> Alignment<String> {
    let split = |text: &str| -> Vec<String> { text.split_inclusive('\n').map(str::to_string).collect() };
    align(&split(observed), &split(expected), costs)
}
