//! Configuration repositories.

mod file;
mod repository;

#[cfg(feature = "remote")]
mod remote;

#[cfg(test)]
pub(crate) mod mock;

pub use file::FileRepository;
pub use repository::Repository;

#[cfg(feature = "remote")]
pub use remote::{HttpRepository, HttpRepositoryBuilder};
