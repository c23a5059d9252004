#![warn(
    missing_docs,
    future_incompatible,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! Single-source shortest paths application.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use courier::Env;
use gasmat::{Edge, Executor, Graph, Hashing, IntWrapper, Value, VertexProgram};
use log::info;
use serde::{Deserialize, Serialize};

/// Unreached distance.
pub const INF: u32 = u32::MAX / 2;

/// A tentative distance, defaulting to infinity.
pub type Dist = IntWrapper<INF>;

/// Per-vertex shortest-path state.
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
pub struct SpState {
    /// Tentative distance from the root.
    pub distance: Dist,
}

impl Value for SpState {}

/// Bellman-Ford-style relaxation: an in-edge contributes the neighbor's
/// distance plus the edge weight; a vertex keeps the minimum.
#[derive(Debug)]
pub struct SpProgram {
    /// Root vertex id.
    pub root: u32,
}

impl VertexProgram for SpProgram {
    type W = u32;
    type M = Dist;
    type A = Dist;
    type S = SpState;

    fn init(&self, vid: u32, state: &mut SpState) -> bool {
        if vid == self.root {
            state.distance = 0.into();
            return true;
        }
        false
    }

    fn scatter(&self, state: &SpState) -> Dist {
        state.distance
    }

    fn gather(&self, edge: Edge<'_, u32>, msg: &Dist) -> Dist {
        (msg.value + edge.weight).into()
    }

    fn combine(&self, y1: Dist, y2: &mut Dist) {
        *y2 = (*y2).min(y1);
    }

    fn apply(&self, y: &Dist, state: &mut SpState) -> bool {
        let before = state.distance;
        state.distance = state.distance.min(*y);
        before != state.distance
    }
}

/// Run SSSP from `root` and return `sum(distance)` over reached vertices.
pub fn run(env: &Env, filepath: &str, nvertices: u32, root: u32) -> anyhow::Result<u64> {
    let mut graph: Graph<u32> = Graph::new(env.clone());
    graph.load_directed(true, filepath, nvertices, false, false, Hashing::Bucket)?;

    let mut vp = Executor::new(&graph, SpProgram { root });
    vp.initialize();

    env.barrier();
    let t0 = env.now();
    vp.execute(gasmat::UNTIL_CONVERGENCE);
    if env.is_master() {
        info!("SSSP execution took {:.3} secs", env.now() - t0);
    }

    let checksum: u64 = vp.reduce(
        |_vid, s: &SpState| {
            if s.distance.value < INF {
                s.distance.value as u64
            } else {
                0
            }
        },
        |a, b| *a += b,
        false,
    );
    if env.is_master() {
        info!("Checksum = {}", checksum);
    }
    Ok(checksum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier::Runtime;
    use std::io::Write;

    fn write_weighted(name: &str, edges: &[(u32, u32, u32)]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for &(r, c, w) in edges {
            f.write_all(&r.to_le_bytes()).unwrap();
            f.write_all(&c.to_le_bytes()).unwrap();
            f.write_all(&w.to_le_bytes()).unwrap();
        }
        path
    }

    /// 0 -> 1 (w 2), 1 -> 2 (w 3), 0 -> 2 (w 10): distances [0, 2, 5].
    #[test]
    fn relaxation_beats_direct_edge() {
        let path =
            write_weighted("gasmat_sssp_fixture.bin", &[(0, 1, 2), (1, 2, 3), (0, 2, 10)]);
        let p = path.clone();
        Runtime::launch(1, move |env| {
            let checksum = run(&env, p.to_str().unwrap(), 3, 0).unwrap();
            assert_eq!(checksum, 7);
        });
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn multi_rank_agrees() {
        let path = write_weighted(
            "gasmat_sssp_multirank_fixture.bin",
            &[(0, 1, 2), (1, 2, 3), (0, 2, 10)],
        );
        let p = path.clone();
        Runtime::launch(4, move |env| {
            let checksum = run(&env, p.to_str().unwrap(), 3, 0).unwrap();
            assert_eq!(checksum, 7);
        });
        std::fs::remove_file(&path).ok();
    }
}
