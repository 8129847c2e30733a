//! End-to-end checks over the reactions + IBOT pipeline with a canned
//! lattice oracle standing in for the external solver.

use std::collections::{BTreeMap, BTreeSet};

use tbn_basis::PolymerBasis;
use tbn_core::parser;
use tbn_lattice::{
    HomogeneousSystem, LatticeSolver, Result as LatticeResult, SliceSolutions, SolveOptions,
    StrictSlice,
};
use tbn_reactions::{ibot, ReactionEngine};

/// Oracle for the system A: a b / B: a* b* with basis {A, B, A+B} and
/// on-target {A+B}. Lifted variables are [P2+, P2-, P0, P1].
struct CannedOracle;

impl LatticeSolver for CannedOracle {
    fn backend_name(&self) -> &'static str {
        "canned"
    }
    fn is_available(&self) -> bool {
        true
    }
    fn hilbert_basis(
        &self,
        _system: &HomogeneousSystem,
        _opts: &SolveOptions<'_>,
    ) -> LatticeResult<Vec<Vec<i64>>> {
        Ok(vec![vec![0, 1, 1, 1], vec![1, 1, 0, 0]])
    }
    fn strict_slice(
        &self,
        slice: &StrictSlice,
        _opts: &SolveOptions<'_>,
    ) -> LatticeResult<SliceSolutions> {
        // Both off-target coordinates are produced by the same minimal
        // solution; the recession direction never touches them.
        assert!(slice.strict_index == 2 || slice.strict_index == 3);
        Ok(SliceSolutions {
            minimal_inhomogeneous: vec![vec![0, 1, 1, 1]],
            recession_basis: vec![vec![1, 1, 0, 0]],
        })
    }
}

fn setup() -> (tbn_core::Tbn, PolymerBasis, BTreeSet<usize>) {
    let tbn = parser::parse_str("A: a b\nB: a* b*\n", &BTreeMap::new())
        .unwrap()
        .tbn;
    let basis = PolymerBasis::from_rows(vec![vec![1, 0], vec![0, 1], vec![1, 1]], 2);
    let on_target = ReactionEngine::resolve_polymer_indices(&basis, &[vec![1, 1]]).unwrap();
    (tbn, basis, on_target)
}

#[test]
fn bounded_mode_agrees_with_full_mode_on_the_reachable_set() {
    let (_tbn, basis, on_target) = setup();
    let engine = ReactionEngine::new(&basis, &on_target);
    let opts = SolveOptions::default();

    let full = engine.enumerate(&CannedOracle, &opts).unwrap();
    let all_off: BTreeSet<usize> = engine.off_target().iter().copied().collect();
    let bounded = engine
        .enumerate_bounded(&CannedOracle, &all_off, &opts)
        .unwrap();
    assert_eq!(full, bounded);

    let full_outcome = ibot::run_ibot(basis.len(), &on_target, &full);
    let bounded_outcome = ibot::run_ibot(basis.len(), &on_target, &bounded);
    assert_eq!(full_outcome.mu, bounded_outcome.mu);
    assert!(full_outcome.unreachable.is_empty());
}

#[test]
fn detailed_balance_holds_and_exponents_split() {
    let (_tbn, basis, on_target) = setup();
    let engine = ReactionEngine::new(&basis, &on_target);
    let reactions = engine.enumerate(&CannedOracle, &SolveOptions::default()).unwrap();

    engine
        .check_on_target_balance(&reactions, &|p| format!("P{p}"))
        .unwrap();

    let outcome = ibot::run_ibot(basis.len(), &on_target, &reactions);
    assert_eq!(outcome.mu_f64(0), Some(0.5));
    assert_eq!(outcome.mu_f64(1), Some(0.5));
    assert_eq!(outcome.mu_f64(2), Some(1.0));
}

#[test]
fn ibot_output_lists_on_target_first_then_mu_ascending() {
    let (tbn, basis, on_target) = setup();
    let engine = ReactionEngine::new(&basis, &on_target);
    let reactions = engine.enumerate(&CannedOracle, &SolveOptions::default()).unwrap();
    let outcome = ibot::run_ibot(basis.len(), &on_target, &reactions);

    let doc = ibot::format_ibot_tbnpolys(&tbn, &basis, &outcome);
    // On-target dimer paragraph (A then B with mu = 1) precedes the
    // off-target singletons (mu = 0.5, basis order).
    let dimer = doc.find("A\nB\n# μ: 1").expect(&doc);
    let first_single = doc.find("A\n# μ: 0.5").expect(&doc);
    let second_single = doc.find("B\n# μ: 0.5").expect(&doc);
    assert!(dimer < first_single, "{doc}");
    assert!(first_single < second_single, "{doc}");
}
