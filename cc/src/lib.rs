#![warn(
    missing_docs,
    future_incompatible,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! Connected components application.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use courier::Env;
use gasmat::{Edge, Empty, Executor, Graph, Hashing, IntWrapper, Value, VertexProgram};
use log::info;
use serde::{Deserialize, Serialize};

/// The "no label yet" accumulator value; above every valid vertex id.
pub const UNSET: u32 = u32::MAX;

/// A component label accumulator, defaulting to unset.
pub type Label = IntWrapper<UNSET>;

/// Per-vertex component label.
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
pub struct CcState {
    /// Smallest vertex id seen in the component so far.
    pub label: u32,
}

impl Value for CcState {}

/// Label propagation: every vertex starts with its own id and repeatedly
/// adopts the minimum label among its neighbors.
#[derive(Debug, Default)]
pub struct CcProgram;

impl VertexProgram for CcProgram {
    type W = Empty;
    type M = u32;
    type A = Label;
    type S = CcState;

    fn init(&self, vid: u32, state: &mut CcState) -> bool {
        state.label = vid;
        true
    }

    fn scatter(&self, state: &CcState) -> u32 {
        state.label
    }

    fn gather(&self, _edge: Edge<'_, Empty>, msg: &u32) -> Label {
        (*msg).into()
    }

    fn combine(&self, y1: Label, y2: &mut Label) {
        *y2 = (*y2).min(y1);
    }

    fn apply(&self, y: &Label, state: &mut CcState) -> bool {
        let before = state.label;
        state.label = state.label.min(y.value);
        before != state.label
    }
}

/// Run connected components and return `sum(label)` for correctness
/// checking.
pub fn run(
    env: &Env,
    filepath: &str,
    nvertices: u32,
    max_iters: u32,
    ntiles: Option<u32>,
) -> anyhow::Result<u64> {
    let mut graph: Graph<Empty> = Graph::new(env.clone());
    if let Some(ntiles) = ntiles {
        graph.set_ntiles(ntiles);
    }
    graph.load_undirected(true, filepath, nvertices, Hashing::Bucket)?;

    let mut vp = Executor::new(&graph, CcProgram);
    vp.initialize();

    env.barrier();
    let t0 = env.now();
    vp.execute(max_iters);
    if env.is_master() {
        info!("CC execution took {:.3} secs", env.now() - t0);
    }

    let checksum: u64 = vp.reduce(|_vid, s: &CcState| s.label as u64, |a, b| *a += b, false);
    if env.is_master() {
        info!("Checksum = {}", checksum);
    }
    Ok(checksum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier::Runtime;
    use gasmat::UNTIL_CONVERGENCE;
    use std::io::Write;

    fn write_unweighted(name: &str, edges: &[(u32, u32)]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for &(r, c) in edges {
            f.write_all(&r.to_le_bytes()).unwrap();
            f.write_all(&c.to_le_bytes()).unwrap();
        }
        path
    }

    /// 0-1, 1-2 plus the isolated vertex 3: labels converge to
    /// [0, 0, 0, 3].
    #[test]
    fn two_components_converge() {
        let path = write_unweighted("gasmat_cc_fixture.bin", &[(0, 1), (1, 2)]);
        let p = path.clone();
        Runtime::launch(1, move |env| {
            let checksum = run(&env, p.to_str().unwrap(), 4, UNTIL_CONVERGENCE, Some(4)).unwrap();
            assert_eq!(checksum, 3);
        });
        std::fs::remove_file(&path).ok();
    }

    /// The single-iteration fast path: one round of label exchange only.
    #[test]
    fn single_iteration_fast_path() {
        let path = write_unweighted("gasmat_cc_single_fixture.bin", &[(0, 1), (1, 2)]);
        let p = path.clone();
        Runtime::launch(1, move |env| {
            // One round of min-combining the initial labels, whatever the
            // arrival order: vertex 1 takes min(1, 0, 2) = 0 while vertex 2
            // still carries min(2, 1) = 1, so labels are [0, 0, 1, 3].
            let checksum = run(&env, p.to_str().unwrap(), 4, 1, Some(4)).unwrap();
            assert_eq!(checksum, 4);
        });
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn multi_rank_agrees() {
        let path = write_unweighted("gasmat_cc_multirank_fixture.bin", &[(0, 1), (1, 2)]);
        let p = path.clone();
        Runtime::launch(4, move |env| {
            let checksum = run(&env, p.to_str().unwrap(), 4, UNTIL_CONVERGENCE, None).unwrap();
            assert_eq!(checksum, 3);
        });
        std::fs::remove_file(&path).ok();
    }
}
