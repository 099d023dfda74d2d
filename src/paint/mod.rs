pub(crate) mod artifact;
pub(crate) mod chunk;
pub(crate) mod chunker;
pub(crate) mod client;
pub(crate) mod controller;
pub(crate) mod item;
pub(crate) mod replay;
pub(crate) mod subsequence;
