//! Engine and lineage tests
