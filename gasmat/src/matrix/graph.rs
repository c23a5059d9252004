//! Graph wrapper: input parsing, hashing, and the matrix pipeline.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use courier::Env;
use log::{info, warn};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use crate::error::{Error, Result};
use crate::matrix::annotated::CscMatrix2D;
use crate::matrix::hashers::{
    ModuloArithmeticHasher, NullHasher, ReversibleHasher, SimpleBucketHasher,
};
use crate::matrix::matrix2d::Matrix2D;
use crate::matrix::tile::Triple;
pub use crate::matrix::Partitioning;
use crate::value::{Empty, Value};

/// Which reversible hasher to apply to vertex IDs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Hashing {
    /// Identity.
    None,
    /// Bucketed striding (default).
    Bucket,
    /// Modular arithmetic.
    Modulo,
}

/// Weights readable from graph input files.
pub trait LoadWeight: Value + Copy {
    /// On-disk size in a binary triple.
    const NBYTES: usize;
    /// Decode from little-endian bytes.
    fn from_bytes(bytes: &[u8]) -> Self;
    /// Parse from an optional text token.
    fn parse(tok: Option<&str>) -> Option<Self>;
}

impl LoadWeight for Empty {
    const NBYTES: usize = 0;
    fn from_bytes(_: &[u8]) -> Self {
        Empty
    }
    fn parse(_: Option<&str>) -> Option<Self> {
        Some(Empty)
    }
}

impl LoadWeight for u32 {
    const NBYTES: usize = 4;
    fn from_bytes(bytes: &[u8]) -> Self {
        let mut b = [0u8; 4];
        b.copy_from_slice(bytes);
        u32::from_le_bytes(b)
    }
    fn parse(tok: Option<&str>) -> Option<Self> {
        tok.and_then(|t| t.parse().ok())
    }
}

impl LoadWeight for f64 {
    const NBYTES: usize = 8;
    fn from_bytes(bytes: &[u8]) -> Self {
        let mut b = [0u8; 8];
        b.copy_from_slice(bytes);
        f64::from_le_bytes(b)
    }
    fn parse(tok: Option<&str>) -> Option<Self> {
        tok.and_then(|t| t.parse().ok())
    }
}

/// A loaded, partitioned, preprocessed graph: the engine's input.
///
/// Vertex IDs are hashed on ingress for load balance; the hasher is
/// reversible so outputs carry original IDs.
#[derive(Debug)]
pub struct Graph<W: LoadWeight> {
    filepath: String,
    nvertices: u32,
    nedges: u64,
    directed: bool,
    bipartite: bool,
    nvertices_left: u32,
    nvertices_right: u32,
    matrix: Option<CscMatrix2D<W>>,
    hasher: Box<dyn ReversibleHasher>,
    ntiles_override: Option<u32>,
    partitioning: Partitioning,
    env: Env,
}

impl<W: LoadWeight> Graph<W> {
    /// An unloaded graph bound to the runtime.
    pub fn new(env: Env) -> Self {
        Graph {
            filepath: String::new(),
            nvertices: 0,
            nedges: 0,
            directed: true,
            bipartite: false,
            nvertices_left: 0,
            nvertices_right: 0,
            matrix: None,
            hasher: Box::new(NullHasher),
            ntiles_override: None,
            partitioning: Partitioning::TwoDim,
            env,
        }
    }

    /// Override the tile count (default: `nranks * nranks`).
    pub fn set_ntiles(&mut self, ntiles: u32) {
        self.ntiles_override = Some(ntiles);
    }

    /// Override the placement strategy (default: 2D).
    pub fn set_partitioning(&mut self, partitioning: Partitioning) {
        self.partitioning = partitioning;
    }

    /// Load a directed graph.  Edges are transposed on ingress so that
    /// messages flow along in-edges, unless `reverse_edges` is requested.
    /// `remove_cycles` keeps only the acyclic half of the edge set.
    pub fn load_directed(
        &mut self,
        binary: bool,
        filepath: &str,
        nvertices: u32,
        reverse_edges: bool,
        remove_cycles: bool,
        hashing: Hashing,
    ) -> Result<()> {
        self.load(
            binary,
            filepath,
            nvertices,
            nvertices,
            true,
            reverse_edges,
            remove_cycles,
            hashing,
        )
    }

    /// Load an undirected graph (every edge inserted in both directions).
    pub fn load_undirected(
        &mut self,
        binary: bool,
        filepath: &str,
        nvertices: u32,
        hashing: Hashing,
    ) -> Result<()> {
        self.load(binary, filepath, nvertices, nvertices, false, false, false, hashing)
    }

    /// Load a bipartite graph; columns are offset by the left vertex count
    /// and both sides share one vertex universe.
    pub fn load_bipartite(
        &mut self,
        binary: bool,
        filepath: &str,
        nvertices: u32,
        mvertices: u32,
        directed: bool,
        reverse_edges: bool,
        hashing: Hashing,
    ) -> Result<()> {
        self.load(
            binary,
            filepath,
            nvertices,
            mvertices,
            directed,
            reverse_edges,
            false,
            hashing,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn load(
        &mut self,
        binary: bool,
        filepath: &str,
        nrows: u32,
        ncols: u32,
        directed: bool,
        reverse_edges: bool,
        remove_cycles: bool,
        hashing: Hashing,
    ) -> Result<()> {
        assert!(self.matrix.is_none(), "graph already loaded");
        self.filepath = filepath.to_string();
        self.directed = directed;

        let t0 = self.env.now();
        if binary {
            self.load_binary(filepath, nrows, ncols, reverse_edges, remove_cycles, hashing)?;
        } else {
            self.load_text(filepath, nrows, ncols, reverse_edges, remove_cycles, hashing)?;
        }

        // Partition the matrix and distribute the tiles.
        if self.env.is_master() {
            info!("Partitioning and distributing ...");
        }
        self.matrix.as_mut().unwrap().distribute();
        if self.env.is_master() {
            info!("Ingress completed in {:.3} secs", self.env.now() - t0);
        }
        Ok(())
    }

    fn make_matrix(&mut self, hashing: Hashing) -> Result<Matrix2D<W>> {
        let nranks = self.env.nranks() as u32;
        let ntiles = self.ntiles_override.unwrap_or(nranks * nranks);
        self.hasher = match hashing {
            Hashing::None => Box::new(NullHasher),
            Hashing::Bucket => {
                Box::new(SimpleBucketHasher::new(self.nvertices as i64, nranks as i64))
            }
            Hashing::Modulo => Box::new(ModuloArithmeticHasher::new(self.nvertices as i64)),
        };
        Matrix2D::new(
            self.nvertices,
            self.nvertices,
            ntiles,
            self.partitioning,
            self.env.clone(),
        )
    }

    fn ingest(
        matrix: &mut Matrix2D<W>,
        hasher: &dyn ReversibleHasher,
        mut triple: Triple<W>,
        bipartite: bool,
        nrows: u32,
        directed: bool,
        reverse_edges: bool,
        remove_cycles: bool,
    ) {
        if bipartite {
            triple.col += nrows;
        }
        // Self-loops are dropped.
        if triple.row == triple.col {
            return;
        }
        // Transpose so y = A^T x processes messages along in-edges, unless
        // the graph is to be reversed.
        if directed && !reverse_edges {
            triple.transpose();
        }
        if remove_cycles
            && ((!reverse_edges && triple.col > triple.row)
                || (reverse_edges && triple.col < triple.row))
        {
            triple.transpose();
        }
        triple.row = hasher.hash(triple.row as i64) as u32;
        triple.col = hasher.hash(triple.col as i64) as u32;
        matrix.insert(triple);
        if !directed {
            triple.transpose();
            matrix.insert(triple);
        }
    }

    fn load_binary(
        &mut self,
        filepath: &str,
        nrows: u32,
        ncols: u32,
        reverse_edges: bool,
        remove_cycles: bool,
        hashing: Hashing,
    ) -> Result<()> {
        let io_err = |e: std::io::Error| Error::Io {
            path: filepath.to_string(),
            source: e,
        };
        let mut file = File::open(filepath).map_err(io_err)?;
        let orig_filesize = file.metadata().map_err(io_err)?.len();

        let (mut nrows, mut ncols) = (nrows, ncols);
        let header_present = nrows == 0;
        let mut offset = 0u64;
        let mut filesize = orig_filesize;

        if header_present {
            // 16-byte header: u32 nrows, u32 ncols, u64 nnz.
            let mut header = [0u8; 16];
            file.read_exact(&mut header).map_err(io_err)?;
            nrows = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            ncols = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            self.nedges = u64::from_le_bytes([
                header[8], header[9], header[10], header[11], header[12], header[13],
                header[14], header[15],
            ]);
            if self.env.is_master() {
                info!(
                    "Read header: nvertices = {}, mvertices = {}, nedges (nnz) = {}",
                    nrows, ncols, self.nedges
                );
            }
            offset += 16;
            filesize -= 16;
        }

        self.bipartite = nrows != ncols;
        self.nvertices_left = nrows;
        self.nvertices_right = if self.bipartite { ncols } else { 0 };
        self.nvertices = if self.bipartite { nrows + ncols } else { nrows };

        let triple_nbytes = (8 + W::NBYTES) as u64;
        let ntriples = (orig_filesize - offset) / triple_nbytes;
        if header_present && self.nedges != ntriples && self.env.is_master() {
            warn!("Number of edges in header does not match number of edges in file.");
        }

        let mut matrix = self.make_matrix(hashing)?;

        // Each rank reads its own byte share of the file body.
        let nranks = self.env.nranks() as u64;
        let rank = self.env.rank() as u64;
        let share = (filesize / nranks) / triple_nbytes * triple_nbytes;
        let mut pos = offset + share * rank;
        let endpos = if rank == nranks - 1 {
            orig_filesize
        } else {
            pos + share
        };

        file.seek(SeekFrom::Start(pos)).map_err(io_err)?;
        let mut reader = BufReader::new(file);
        let mut buf = vec![0u8; triple_nbytes as usize];

        if self.env.is_master() {
            info!("Reading input file ({} edges) ...", ntriples);
        }
        while pos < endpos {
            reader.read_exact(&mut buf).map_err(io_err)?;
            pos += triple_nbytes;
            let triple = Triple {
                row: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
                col: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
                weight: W::from_bytes(&buf[8..]),
            };
            if triple.row >= nrows || triple.col >= ncols {
                return Err(Error::BadInput {
                    path: filepath.to_string(),
                    reason: format!("edge ({}, {}) out of range", triple.row, triple.col),
                });
            }
            Self::ingest(
                &mut matrix,
                self.hasher.as_ref(),
                triple,
                self.bipartite,
                nrows,
                self.directed,
                reverse_edges,
                remove_cycles,
            );
        }
        assert_eq!(pos, endpos);

        self.matrix = Some(CscMatrix2D::annotate(matrix));
        Ok(())
    }

    /// Matrix-Market-style text form: `%` or `#` comment lines, an optional
    /// `n m nnz` size line (required when `nvertices` is 0), then one
    /// `row col [weight]` edge per line, zero-based.
    fn load_text(
        &mut self,
        filepath: &str,
        nrows: u32,
        ncols: u32,
        reverse_edges: bool,
        remove_cycles: bool,
        hashing: Hashing,
    ) -> Result<()> {
        let io_err = |e: std::io::Error| Error::Io {
            path: filepath.to_string(),
            source: e,
        };
        let bad = |reason: String| Error::BadInput {
            path: filepath.to_string(),
            reason,
        };

        let file = File::open(filepath).map_err(io_err)?;
        let reader = BufReader::new(file);

        let (mut nrows, mut ncols) = (nrows, ncols);
        let mut header_seen = nrows != 0;
        let mut matrix: Option<Matrix2D<W>> = None;
        let nranks = self.env.nranks();
        let rank = self.env.rank();
        let mut lineno = 0usize;

        for line in reader.lines() {
            let line = line.map_err(io_err)?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('%') || line.starts_with('#') {
                continue;
            }
            let mut toks = line.split_whitespace();
            if !header_seen {
                // First non-comment line: n m nnz.
                let n: u32 = toks
                    .next()
                    .and_then(|t| t.parse().ok())
                    .ok_or_else(|| bad(format!("bad size line: {}", line)))?;
                let m: u32 = toks
                    .next()
                    .and_then(|t| t.parse().ok())
                    .ok_or_else(|| bad(format!("bad size line: {}", line)))?;
                let nnz: u64 = toks
                    .next()
                    .and_then(|t| t.parse().ok())
                    .ok_or_else(|| bad(format!("bad size line: {}", line)))?;
                nrows = n;
                ncols = m;
                self.nedges = nnz;
                header_seen = true;
                continue;
            }
            if matrix.is_none() {
                self.bipartite = nrows != ncols;
                self.nvertices_left = nrows;
                self.nvertices_right = if self.bipartite { ncols } else { 0 };
                self.nvertices = if self.bipartite { nrows + ncols } else { nrows };
                matrix = Some(self.make_matrix(hashing)?);
            }

            let row: u32 = toks
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| bad(format!("bad edge line: {}", line)))?;
            let col: u32 = toks
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| bad(format!("bad edge line: {}", line)))?;
            let weight =
                W::parse(toks.next()).ok_or_else(|| bad(format!("bad edge weight: {}", line)))?;
            if row >= nrows || col >= ncols {
                return Err(bad(format!("edge ({}, {}) out of range", row, col)));
            }

            // Round-robin the edges; distribute() reshuffles to owners.
            if lineno % nranks == rank {
                Self::ingest(
                    matrix.as_mut().unwrap(),
                    self.hasher.as_ref(),
                    Triple { row, col, weight },
                    self.bipartite,
                    nrows,
                    self.directed,
                    reverse_edges,
                    remove_cycles,
                );
            }
            lineno += 1;
        }

        let matrix = matrix.ok_or_else(|| bad("no edges in input".to_string()))?;
        self.matrix = Some(CscMatrix2D::annotate(matrix));
        Ok(())
    }

    /// Path the graph was loaded from.
    pub fn filepath(&self) -> &str {
        &self.filepath
    }

    /// Number of vertices (both sides combined for bipartite graphs).
    pub fn nvertices(&self) -> u32 {
        self.nvertices
    }

    /// Number of edges as declared by the input header (0 if unknown).
    pub fn nedges(&self) -> u64 {
        self.nedges
    }

    /// Whether the graph was loaded as directed.
    pub fn is_directed(&self) -> bool {
        self.directed
    }

    /// Whether the graph is bipartite.
    pub fn is_bipartite(&self) -> bool {
        self.bipartite
    }

    /// Left-side vertex count of a bipartite graph.
    pub fn nvertices_left(&self) -> u32 {
        self.nvertices_left
    }

    /// Right-side vertex count of a bipartite graph (0 otherwise).
    pub fn nvertices_right(&self) -> u32 {
        self.nvertices_right
    }

    /// The processed matrix.
    pub fn matrix(&self) -> &CscMatrix2D<W> {
        self.matrix.as_ref().expect("graph not loaded")
    }

    /// The ID hasher.
    pub fn hasher(&self) -> &dyn ReversibleHasher {
        self.hasher.as_ref()
    }

    /// The runtime handle this graph is bound to.
    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Drop the matrix, keeping the metadata.
    pub fn free(&mut self) {
        self.matrix = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier::Runtime;
    use std::io::Write;

    fn write_binary_u32(path: &std::path::Path, edges: &[(u32, u32, u32)]) {
        let mut f = File::create(path).unwrap();
        for &(r, c, w) in edges {
            f.write_all(&r.to_le_bytes()).unwrap();
            f.write_all(&c.to_le_bytes()).unwrap();
            f.write_all(&w.to_le_bytes()).unwrap();
        }
    }

    #[test]
    fn binary_weighted_load() {
        let path = std::env::temp_dir().join("gasmat_graph_load_test.bin");
        write_binary_u32(&path, &[(0, 1, 2), (1, 2, 3), (0, 2, 10), (1, 1, 9)]);
        let p = path.clone();
        Runtime::launch(1, move |env| {
            let mut g: Graph<u32> = Graph::new(env);
            g.load_directed(true, p.to_str().unwrap(), 3, false, false, Hashing::None)
                .unwrap();
            assert_eq!(g.nvertices(), 3);
            assert!(g.is_directed());
            // Self-loop (1, 1) dropped; remaining edges transposed.
            let m = g.matrix();
            let total: usize = m
                .base
                .tiles
                .iter()
                .flatten()
                .filter_map(|t| t.csc.as_ref().map(|c| c.nentries()))
                .sum::<usize>()
                + m.base
                    .tiles
                    .iter()
                    .flatten()
                    .filter_map(|t| t.sink_csc.as_ref().map(|c| c.nentries()))
                    .sum::<usize>();
            assert_eq!(total, 3);
        });
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn text_load_with_size_line() {
        let path = std::env::temp_dir().join("gasmat_graph_text_test.mtx");
        {
            let mut f = File::create(&path).unwrap();
            writeln!(f, "% a tiny graph").unwrap();
            writeln!(f, "3 3 3").unwrap();
            writeln!(f, "0 1").unwrap();
            writeln!(f, "1 2").unwrap();
            writeln!(f, "0 2").unwrap();
        }
        let p = path.clone();
        Runtime::launch(1, move |env| {
            let mut g: Graph<Empty> = Graph::new(env);
            g.load_directed(false, p.to_str().unwrap(), 0, false, false, Hashing::None)
                .unwrap();
            assert_eq!(g.nvertices(), 3);
            assert_eq!(g.nedges(), 3);
        });
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn header_supplies_the_dimensions() {
        let path = std::env::temp_dir().join("gasmat_graph_header_test.bin");
        {
            let mut f = File::create(&path).unwrap();
            f.write_all(&4u32.to_le_bytes()).unwrap();
            f.write_all(&4u32.to_le_bytes()).unwrap();
            f.write_all(&2u64.to_le_bytes()).unwrap();
            for &(r, c) in &[(0u32, 1u32), (1, 2)] {
                f.write_all(&r.to_le_bytes()).unwrap();
                f.write_all(&c.to_le_bytes()).unwrap();
            }
        }
        let p = path.clone();
        Runtime::launch(1, move |env| {
            let mut g: Graph<Empty> = Graph::new(env);
            g.load_directed(true, p.to_str().unwrap(), 0, false, false, Hashing::None)
                .unwrap();
            assert_eq!(g.nvertices(), 4);
            assert_eq!(g.nedges(), 2);
        });
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn bipartite_offsets_the_columns() {
        let path = std::env::temp_dir().join("gasmat_graph_bipartite_test.bin");
        {
            let mut f = File::create(&path).unwrap();
            for &(r, c) in &[(0u32, 0u32), (1, 2)] {
                f.write_all(&r.to_le_bytes()).unwrap();
                f.write_all(&c.to_le_bytes()).unwrap();
            }
        }
        let p = path.clone();
        Runtime::launch(1, move |env| {
            let mut g: Graph<Empty> = Graph::new(env);
            g.load_bipartite(true, p.to_str().unwrap(), 2, 3, true, false, Hashing::None)
                .unwrap();
            // Both sides share one universe of 2 + 3 vertices.
            assert!(g.is_bipartite());
            assert_eq!(g.nvertices(), 5);
            assert_eq!(g.nvertices_left(), 2);
            assert_eq!(g.nvertices_right(), 3);
            // Columns are offset past the left side, so the edge (0, 0) is
            // not a self-loop and both edges survive ingress.
            let m = g.matrix();
            let entries: usize = m
                .base
                .tiles
                .iter()
                .flatten()
                .filter_map(|t| t.csc.as_ref().map(|c| c.nentries()))
                .sum::<usize>()
                + m.base
                    .tiles
                    .iter()
                    .flatten()
                    .filter_map(|t| t.sink_csc.as_ref().map(|c| c.nentries()))
                    .sum::<usize>();
            assert_eq!(entries, 2);
        });
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_a_config_error() {
        Runtime::launch(1, |env| {
            let mut g: Graph<Empty> = Graph::new(env);
            let err = g
                .load_undirected(true, "/no/such/file.bin", 4, Hashing::None)
                .unwrap_err();
            assert!(matches!(err, Error::Io { .. }));
        });
    }
}
