#![warn(
    missing_docs,
    future_incompatible,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! Degree counting application.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use courier::Env;
use gasmat::{Edge, Empty, Executor, Graph, Hashing, LoadWeight, Value, VertexProgram};
use log::info;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Per-vertex degree.
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
pub struct DegState {
    /// In-degree of the vertex (out-degree when the graph is reversed).
    pub degree: u32,
}

impl Value for DegState {}

/// Count in-degrees: every in-edge gathers 1.
/// For out-degrees, reverse the input graph.
#[derive(Debug)]
pub struct DegProgram<W> {
    _weight: PhantomData<W>,
}

impl<W> Default for DegProgram<W> {
    fn default() -> Self {
        DegProgram {
            _weight: PhantomData,
        }
    }
}

impl<W: LoadWeight> VertexProgram for DegProgram<W> {
    type W = W;
    type M = Empty;
    type A = u32;
    type S = DegState;

    const STATIONARY: bool = true;

    fn scatter(&self, _state: &DegState) -> Empty {
        Empty
    }

    fn gather(&self, _edge: Edge<'_, W>, _msg: &Empty) -> u32 {
        1
    }

    fn combine(&self, y1: u32, y2: &mut u32) {
        *y2 += y1;
    }

    fn apply(&self, y: &u32, state: &mut DegState) -> bool {
        state.degree = *y;
        true
    }
}

/// Degree run summary.
#[derive(Debug)]
pub struct DegSummary {
    /// Sum of all degrees (equals the edge count).
    pub checksum: u64,
    /// The k highest-degree vertices.
    pub topk: Vec<(u32, u32)>,
}

/// Compute in-degrees (or out-degrees with `out_degree`) and report the
/// top-k vertices.
pub fn run(
    env: &Env,
    filepath: &str,
    nvertices: u32,
    out_degree: bool,
    k: usize,
) -> anyhow::Result<DegSummary> {
    let mut graph: Graph<Empty> = Graph::new(env.clone());
    graph.load_directed(true, filepath, nvertices, out_degree, false, Hashing::Bucket)?;

    let mut vp = Executor::new(&graph, DegProgram::default());

    env.barrier();
    let t0 = env.now();
    vp.execute(1);
    if env.is_master() {
        info!("Degree execution took {:.3} secs", env.now() - t0);
    }

    let checksum: u64 = vp.reduce(|_vid, s: &DegState| s.degree as u64, |a, b| *a += b, false);
    let topk = vp.topk(
        k,
        |_vid, s: &DegState| s.degree,
        |a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)),
        false,
    );
    if env.is_master() {
        info!("Degree checksum = {}", checksum);
        for (vid, deg) in &topk {
            info!("idx {}: degree {}", vid, deg);
        }
    }
    Ok(DegSummary { checksum, topk })
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier::Runtime;
    use std::io::Write;

    pub(crate) fn write_unweighted(name: &str, edges: &[(u32, u32)]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for &(r, c) in edges {
            f.write_all(&r.to_le_bytes()).unwrap();
            f.write_all(&c.to_le_bytes()).unwrap();
        }
        path
    }

    #[test]
    fn in_degrees_and_topk() {
        let path = write_unweighted("gasmat_degree_fixture.bin", &[(0, 1), (0, 2), (1, 2)]);
        let p = path.clone();
        Runtime::launch(1, move |env| {
            let summary = run(&env, p.to_str().unwrap(), 3, false, 2).unwrap();
            assert_eq!(summary.checksum, 3); // in-degrees [0, 1, 2]
            assert_eq!(summary.topk, vec![(2, 2), (1, 1)]);
        });
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn out_degrees_reverse_the_graph() {
        let path = write_unweighted("gasmat_degree_out_fixture.bin", &[(0, 1), (0, 2), (1, 2)]);
        let p = path.clone();
        Runtime::launch(1, move |env| {
            let summary = run(&env, p.to_str().unwrap(), 3, true, 1).unwrap();
            assert_eq!(summary.checksum, 3); // out-degrees [2, 1, 0]
            assert_eq!(summary.topk, vec![(0, 2)]);
        });
        std::fs::remove_file(&path).ok();
    }
}
