#![warn(
    missing_docs,
    future_incompatible,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! Breadth-first search application.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use courier::Env;
use gasmat::{Edge, Empty, Executor, Graph, Hashing, Value, VertexProgram};
use log::info;
use serde::{Deserialize, Serialize};

/// Unreached distance.
pub const INF: u8 = u8::MAX;

/// Per-vertex BFS state.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct BfsState {
    /// The neighbor this vertex was first reached from.
    pub parent: u32,
    /// Hop count from the root; `INF` while unreached.
    pub hops: u8,
}

impl Default for BfsState {
    fn default() -> Self {
        BfsState {
            parent: 0,
            hops: INF,
        }
    }
}

impl Value for BfsState {}

/// BFS: the hop count is the iteration a vertex first receives a message;
/// the parent is any neighbor that delivered one.
#[derive(Debug)]
pub struct BfsProgram {
    /// Root vertex id.
    pub root: u32,
}

impl VertexProgram for BfsProgram {
    type W = Empty;
    type M = Empty;
    type A = u32;
    type S = BfsState;

    const APPLY_WITH_ITER: bool = true;

    fn init(&self, vid: u32, state: &mut BfsState) -> bool {
        if vid == self.root {
            state.hops = 0;
            return true;
        }
        false
    }

    fn scatter(&self, _state: &BfsState) -> Empty {
        Empty
    }

    fn gather(&self, edge: Edge<'_, Empty>, _msg: &Empty) -> u32 {
        edge.src // parent's id
    }

    fn combine(&self, y1: u32, y2: &mut u32) {
        *y2 = y1; // just use the last parent's id
    }

    fn apply_with_iter(&self, y: &u32, state: &mut BfsState, iter: u32) -> bool {
        if state.hops != INF {
            return false; // already visited
        }
        state.hops = (iter + 1) as u8;
        state.parent = *y;
        true
    }
}

/// BFS run summary.
#[derive(Debug)]
pub struct BfsSummary {
    /// Vertices reached from the root (the root included).
    pub nreachable: u64,
    /// `sum(hops * parent)` over reached vertices, for correctness checks.
    pub checksum: u64,
}

/// Run BFS from `root`; `reverse` walks the edges backwards.
pub fn run(
    env: &Env,
    filepath: &str,
    nvertices: u32,
    root: u32,
    reverse: bool,
) -> anyhow::Result<BfsSummary> {
    let mut graph: Graph<Empty> = Graph::new(env.clone());
    graph.load_directed(true, filepath, nvertices, reverse, false, Hashing::None)?;

    let mut vp = Executor::new(&graph, BfsProgram { root });
    vp.initialize();

    env.barrier();
    let t0 = env.now();
    vp.execute(gasmat::UNTIL_CONVERGENCE);
    if env.is_master() {
        info!("BFS execution took {:.3} secs", env.now() - t0);
    }

    let nreachable: u64 = vp.reduce(
        |_vid, s: &BfsState| (s.hops != INF) as u64,
        |a, b| *a += b,
        false,
    );
    let checksum: u64 = vp.reduce(
        |_vid, s: &BfsState| {
            if s.hops != INF {
                s.hops as u64 * s.parent as u64
            } else {
                0
            }
        },
        |a, b| *a += b,
        false,
    );
    if env.is_master() {
        info!("Reachable vertices = {}", nreachable);
        info!("Checksum = {}", checksum);
    }
    Ok(BfsSummary {
        nreachable,
        checksum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier::Runtime;
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

    const PATH_EDGES: &[(u32, u32)] = &[(0, 1), (1, 2), (2, 3), (3, 4)];

    /// On the path 0 -> 1 -> 2 -> 3 -> 4: hops = [0, 1, 2, 3, 4],
    /// parent = [0, 0, 1, 2, 3].
    #[test]
    fn path_from_root() {
        let path = write_unweighted("gasmat_bfs_fixture.bin", PATH_EDGES);
        let p = path.clone();
        Runtime::launch(1, move |env| {
            let summary = run(&env, p.to_str().unwrap(), 5, 0, false).unwrap();
            assert_eq!(summary.nreachable, 5);
            // 0*0 + 1*0 + 2*1 + 3*2 + 4*3 = 20
            assert_eq!(summary.checksum, 20);
        });
        std::fs::remove_file(&path).ok();
    }

    /// Reversed edges, starting from 4: hops = [4, 3, 2, 1, 0].
    #[test]
    fn reversed_path_from_tail() {
        let path = write_unweighted("gasmat_bfs_rev_fixture.bin", PATH_EDGES);
        let p = path.clone();
        Runtime::launch(1, move |env| {
            let summary = run(&env, p.to_str().unwrap(), 5, 4, true).unwrap();
            assert_eq!(summary.nreachable, 5);
            // parents [1, 2, 3, 4, 0]: 4*1 + 3*2 + 2*3 + 1*4 + 0*0 = 20
            assert_eq!(summary.checksum, 20);
        });
        std::fs::remove_file(&path).ok();
    }
}
