pub mod mock;
#[cfg(feature = "backend-replay")]
pub mod replay;
