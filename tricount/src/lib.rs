#![warn(
    missing_docs,
    future_incompatible,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! Triangle counting application.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use courier::Env;
use gasmat::{Edge, Empty, Executor, Graph, Hashing, InitFrom, Value, VertexProgram};
use log::info;
use serde::{Deserialize, Serialize};

/// Phase-one state: the sorted in-neighbor list.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GnState {
    /// In-neighbors, sorted ascending.
    pub neighbors: Vec<u32>,
}

impl Value for GnState {
    const DYNAMIC: bool = true;
}

/// Phase one: gather every vertex's in-neighbors on the acyclic graph.
#[derive(Debug, Default)]
pub struct GnProgram;

impl VertexProgram for GnProgram {
    type W = Empty;
    type M = Empty;
    type A = Vec<u32>;
    type S = GnState;

    const STATIONARY: bool = true;

    fn scatter(&self, _state: &GnState) -> Empty {
        Empty
    }

    fn gather(&self, edge: Edge<'_, Empty>, _msg: &Empty) -> Vec<u32> {
        vec![edge.src]
    }

    fn combine(&self, y1: Vec<u32>, y2: &mut Vec<u32>) {
        y2.extend(y1);
    }

    fn apply(&self, y: &Vec<u32>, state: &mut GnState) -> bool {
        if !y.is_empty() {
            state.neighbors = y.clone();
            state.neighbors.sort_unstable();
        }
        false // no need to scatter
    }
}

/// Phase-two state: the neighbor list plus the triangle count.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CtState {
    /// In-neighbors carried over from phase one.
    pub neighbors: Vec<u32>,
    /// Triangles closed at this vertex.
    pub ntriangles: u32,
}

impl Value for CtState {
    const DYNAMIC: bool = true;
}

/// Phase two: on the reverse acyclic graph, every vertex ships its
/// neighbor list and each receiver counts common entries against its own
/// (mirrored) list.
#[derive(Debug, Default)]
pub struct CtProgram;

impl VertexProgram for CtProgram {
    type W = Empty;
    type M = Vec<u32>;
    type A = u32;
    type S = CtState;

    const STATIONARY: bool = true;
    const GATHER_WITH_STATE: bool = true;

    fn scatter(&self, state: &CtState) -> Vec<u32> {
        state.neighbors.clone()
    }

    fn gather_with_state(&self, _edge: Edge<'_, Empty>, msg: &Vec<u32>, state: &CtState) -> u32 {
        // Sorted intersection count.
        let (a, b) = (&state.neighbors, msg);
        let mut count = 0;
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            if a[i] == b[j] {
                count += 1;
                i += 1;
                j += 1;
            } else if a[i] < b[j] {
                i += 1;
            } else {
                j += 1;
            }
        }
        count
    }

    fn combine(&self, y1: u32, y2: &mut u32) {
        *y2 += y1;
    }

    fn apply(&self, y: &u32, state: &mut CtState) -> bool {
        state.ntriangles = *y;
        false // no need to scatter
    }
}

impl InitFrom<GnState> for CtProgram {
    fn init_from(&self, _vid: u32, other: &GnState, state: &mut CtState) -> bool {
        if other.neighbors.is_empty() {
            return false;
        }
        state.neighbors = other.neighbors.clone();
        true
    }
}

/// Count the triangles in the graph.
pub fn run(env: &Env, filepath: &str, nvertices: u32) -> anyhow::Result<u64> {
    // Load the graph as acyclic, in both directions.
    let mut graph: Graph<Empty> = Graph::new(env.clone());
    graph.load_directed(true, filepath, nvertices, false, true, Hashing::Bucket)?;

    let mut reverse: Graph<Empty> = Graph::new(env.clone());
    reverse.load_directed(true, filepath, nvertices, true, true, Hashing::Bucket)?;

    env.barrier();
    let t0 = env.now();

    // Phase one: in-neighbor lists.
    let mut vp_gn = Executor::new(&graph, GnProgram);
    vp_gn.initialize();
    vp_gn.execute(1);
    if env.is_master() {
        info!("P1 (get neighbors) took {:.3} secs", env.now() - t0);
    }

    // Phase two: count, initialized from phase one.
    let t1 = env.now();
    let mut vp_ct = Executor::new(&reverse, CtProgram);
    vp_ct.initialize_from(&vp_gn);
    drop(vp_gn);
    vp_ct.execute(1);
    if env.is_master() {
        info!("P2 (count triangles) took {:.3} secs", env.now() - t1);
    }

    let ntriangles: u64 = vp_ct.reduce(
        |_vid, s: &CtState| s.ntriangles as u64,
        |a, b| *a += b,
        false,
    );
    if env.is_master() {
        info!("Triangles = {}", ntriangles);
    }
    Ok(ntriangles)
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

    /// The 3-cycle holds exactly one triangle after cycle removal.
    #[test]
    fn one_triangle() {
        let path = write_unweighted("gasmat_tc_fixture.bin", &[(0, 1), (1, 2), (2, 0)]);
        let p = path.clone();
        Runtime::launch(1, move |env| {
            let ntriangles = run(&env, p.to_str().unwrap(), 3).unwrap();
            assert_eq!(ntriangles, 1);
        });
        std::fs::remove_file(&path).ok();
    }

    /// Two triangles sharing the edge 0-1.
    #[test]
    fn shared_edge_triangles() {
        let path = write_unweighted(
            "gasmat_tc2_fixture.bin",
            &[(0, 1), (1, 2), (2, 0), (1, 3), (3, 0)],
        );
        let p = path.clone();
        Runtime::launch(1, move |env| {
            let ntriangles = run(&env, p.to_str().unwrap(), 4).unwrap();
            assert_eq!(ntriangles, 2);
        });
        std::fs::remove_file(&path).ok();
    }
}
