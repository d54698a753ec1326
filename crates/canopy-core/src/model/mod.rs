pub mod content;
pub mod entity;
pub mod props;
pub mod relation;
pub mod status;
