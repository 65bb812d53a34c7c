//! Property tests for the alignment engine and change grouping
//!
//! Costs are checked against an exhaustive enumeration of all alignments for
//! short inputs.

use gradebox::align::{align_text, group_blocks, Alignment, BlockKind, Column, DiffBlock};
use gradebox::config::types::{CostParams, Substitution};

fn cost_grid() -> Vec<CostParams> {
    vec![
        CostParams::gaps_only(1),
        CostParams::levenshtein(),
        CostParams::new(2, Substitution::Cost(3)),
        CostParams::new(3, Substitution::Cost(1)),
        CostParams::gaps_only(2),
    ]
}

/// Minimum over every alignment, enumerated without memoization
fn brute_force_cost(a: &[char], b: &[char], costs: &CostParams) -> u64 {
    let gap = u64::from(costs.gap);
    if a.is_empty() {
        return b.len() as u64 * gap;
    }
    if b.is_empty() {
        return a.len() as u64 * gap;
    }

    let mut best = gap + brute_force_cost(&a[1..], b, costs);
    best = best.min(gap + brute_force_cost(a, &b[1..], costs));
    if a[0] == b[0] {
        best = best.min(brute_force_cost(&a[1..], &b[1..], costs));
    } else if let Substitution::Cost(sub) = costs.substitution {
        best = best.min(u64::from(sub) + brute_force_cost(&a[1..], &b[1..], costs));
    }
    best
}

/// Cost recomputed from the columns of an alignment
fn column_cost(alignment: &Alignment<char>, costs: &CostParams) -> u64 {
    alignment
        .columns()
        .map(|column| match column {
            Column::Match(_) => 0,
            Column::Substitution(_, _) => match costs.substitution {
                Substitution::Cost(sub) => u64::from(sub),
                Substitution::Disallowed => panic!("substitution column under disallowed costs"),
            },
            Column::ObservedOnly(_) | Column::ExpectedOnly(_) => u64::from(costs.gap),
        })
        .sum()
}

/// Every string over `alphabet` up to `max_len` characters
fn all_strings(alphabet: &[char], max_len: usize) -> Vec<String> {
    let mut out = vec![String::new()];
    let mut frontier = vec![String::new()];
    for _ in 0..max_len {
        let mut next = Vec::new();
        for prefix in &frontier {
            for c in alphabet {
                let mut s = prefix.clone();
                s.push(*c);
                next.push(s);
            }
        }
        out.extend(next.iter().cloned());
        frontier = next;
    }
    out
}

fn check_pair(a: &str, b: &str, costs: &CostParams) {
    let alignment = align_text(a, b, costs);
    let chars_a: Vec<char> = a.chars().collect();
    let chars_b: Vec<char> = b.chars().collect();

    assert_eq!(
        alignment.cost(),
        brute_force_cost(&chars_a, &chars_b, costs),
        "cost mismatch for {:?} vs {:?} under {:?}",
        a,
        b,
        costs
    );
    assert_eq!(alignment.cost(), column_cost(&alignment, costs));
    assert_eq!(alignment.observed().len(), alignment.expected().len());
    assert_eq!(alignment.observed_symbols(), chars_a);
    assert_eq!(alignment.expected_symbols(), chars_b);
}

#[test]
fn cost_matches_brute_force_on_all_short_binary_strings() {
    let strings = all_strings(&['a', 'b'], 4);
    for costs in cost_grid() {
        for a in &strings {
            for b in &strings {
                check_pair(a, b, &costs);
            }
        }
    }
}

#[test]
fn cost_matches_brute_force_on_six_character_strings() {
    let pairs = [
        ("abcabc", "cbacba"),
        ("aaaaaa", "a"),
        ("abcdef", "fedcba"),
        ("kitten", "sittin"),
        ("", "abcabc"),
        ("banana", "ananas"),
        ("a?7\nb?", "a?\nb?8"),
    ];
    for costs in cost_grid() {
        for (a, b) in pairs {
            check_pair(a, b, &costs);
            check_pair(b, a, &costs);
        }
    }
}

#[test]
fn identity_has_zero_cost_and_no_gaps() {
    for text in ["", "x", "hello\nworld\n", "tab\tand unicode é"] {
        for costs in cost_grid() {
            let alignment = align_text(text, text, &costs);
            assert_eq!(alignment.cost(), 0);
            assert_eq!(alignment.gap_count(), 0);
            let (observed, expected) = alignment.render('~');
            assert!(!observed.contains('~'));
            assert_eq!(observed, expected);
        }
    }
}

#[test]
fn empty_observed_renders_all_gaps() {
    let alignment = align_text("", "abc", &CostParams::gaps_only(1));
    assert_eq!(alignment.cost(), 3);
    let (observed, expected) = alignment.render('~');
    assert_eq!(expected, "abc");
    assert_eq!(observed, "~~~");
}

#[test]
fn renamed_function_yields_two_change_blocks_at_one_offset() {
    let alignment = align_text(
        "def foobar():\n    pass",
        "def main():\n    pass",
        &CostParams::default(),
    );
    let changes: Vec<DiffBlock> = group_blocks(&alignment)
        .into_iter()
        .filter(DiffBlock::is_change)
        .collect();

    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].kind, BlockKind::DeletionOnly);
    assert_eq!(changes[0].text, "main");
    assert_eq!(changes[1].kind, BlockKind::InsertionOnly);
    assert_eq!(changes[1].text, "foobar");
    assert!(changes.iter().all(|b| b.observed_offset == 4));
}

#[test]
fn blocks_reassemble_both_texts() {
    let observed = "total: 12\nitems: 3\nbye";
    let expected = "total: 15\nitem count: 3\ngoodbye\n";
    let alignment = align_text(observed, expected, &CostParams::default());
    let blocks = group_blocks(&alignment);

    let rebuilt_observed: String = blocks
        .iter()
        .filter(|b| b.kind != BlockKind::DeletionOnly)
        .map(|b| b.text.as_str())
        .collect();
    let rebuilt_expected: String = blocks
        .iter()
        .filter(|b| b.kind != BlockKind::InsertionOnly)
        .map(|b| b.text.as_str())
        .collect();
    assert_eq!(rebuilt_observed, observed);
    assert_eq!(rebuilt_expected, expected);

    // no two neighbouring match blocks
    for pair in blocks.windows(2) {
        assert!(!(pair[0].kind == BlockKind::Match && pair[1].kind == BlockKind::Match));
    }
}
