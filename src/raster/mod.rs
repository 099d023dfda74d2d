pub(crate) mod invalidator;
pub(crate) mod mapper;
pub(crate) mod tracking;
