pub(crate) mod clip;
pub(crate) mod effect;
pub(crate) mod geometry;
pub(crate) mod scroll;
pub(crate) mod state;
pub(crate) mod transform;
pub(crate) mod tree;
